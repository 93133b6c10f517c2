//! The search tree: UCB1/UCT node selection, expansion bookkeeping, and
//! decayed backpropagation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::action::{Action, AgentState, Observation};

pub type NodeId = u64;

/// A single node in the search tree.
///
/// `action`/`observation` are `None` on the root. A freshly expanded child
/// carries an `action` and the parent's (not-yet-updated) `state` until it is
/// simulated — simulation is what assigns its `observation` and folds the
/// step into `state`.
#[derive(Debug, Clone)]
pub struct MctsNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub depth: u32,
    pub action: Option<Action>,
    pub observation: Option<Observation>,
    pub state: AgentState,
    pub visits: u32,
    pub total_value: f64,
    pub terminal: bool,
    pub created_at: DateTime<Utc>,
}

impl MctsNode {
    /// Mean value over visits; 0 for an unvisited node.
    pub fn q_value(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.total_value / self.visits as f64
        }
    }

    pub fn is_solution(&self) -> bool {
        self.terminal && self.observation.as_ref().is_some_and(Observation::is_solution)
    }
}

pub struct Tree {
    nodes: HashMap<NodeId, MctsNode>,
    root_id: NodeId,
    next_id: NodeId,
}

impl Tree {
    pub fn new(initial_state: AgentState) -> Self {
        let root = MctsNode {
            id: 0,
            parent: None,
            children: Vec::new(),
            depth: 0,
            action: None,
            observation: None,
            state: initial_state,
            visits: 0,
            total_value: 0.0,
            terminal: false,
            created_at: Utc::now(),
        };
        let mut nodes = HashMap::new();
        nodes.insert(0, root);
        Self {
            nodes,
            root_id: 0,
            next_id: 1,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    pub fn node(&self, id: NodeId) -> Option<&MctsNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut MctsNode> {
        self.nodes.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Descend from the root choosing the highest-UCT child at each internal
    /// node; stop at a terminal node or a childless leaf. Terminal nodes are
    /// never descended past.
    pub fn select(&self, exploration_constant: f64) -> NodeId {
        let mut current = self.root_id;
        loop {
            let node = &self.nodes[&current];
            if node.terminal || node.children.is_empty() {
                return current;
            }
            match self.best_uct_child(current, exploration_constant) {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    fn uct(&self, child_id: NodeId, parent_visits: u32, c: f64) -> f64 {
        let child = &self.nodes[&child_id];
        if child.visits == 0 {
            return f64::INFINITY;
        }
        let parent_visits = parent_visits.max(1) as f64;
        child.q_value() + c * ((parent_visits.ln()) / child.visits as f64).sqrt()
    }

    /// The child maximising UCT, breaking ties in insertion order (first
    /// strictly-greater value wins, so an equal later candidate does not
    /// displace an earlier one).
    fn best_uct_child(&self, parent_id: NodeId, c: f64) -> Option<NodeId> {
        let parent = &self.nodes[&parent_id];
        let parent_visits = parent.visits;
        let mut best: Option<(NodeId, f64)> = None;
        for &child_id in &parent.children {
            let score = self.uct(child_id, parent_visits, c);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((child_id, score)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Create child nodes for `actions`, each inheriting `leaf`'s state
    /// (pending simulation) at `depth = leaf.depth + 1`. If `actions` is
    /// empty, marks the leaf terminal instead and returns no children.
    pub fn expand(&mut self, leaf_id: NodeId, actions: Vec<Action>) -> Vec<NodeId> {
        if actions.is_empty() {
            if let Some(leaf) = self.nodes.get_mut(&leaf_id) {
                leaf.terminal = true;
            }
            return Vec::new();
        }

        let (leaf_state, leaf_depth) = {
            let leaf = &self.nodes[&leaf_id];
            (leaf.state.clone(), leaf.depth)
        };

        let mut child_ids = Vec::with_capacity(actions.len());
        for action in actions {
            let id = self.next_id;
            self.next_id += 1;
            self.nodes.insert(
                id,
                MctsNode {
                    id,
                    parent: Some(leaf_id),
                    children: Vec::new(),
                    depth: leaf_depth + 1,
                    action: Some(action),
                    observation: None,
                    state: leaf_state.clone(),
                    visits: 0,
                    total_value: 0.0,
                    terminal: false,
                    created_at: Utc::now(),
                },
            );
            child_ids.push(id);
        }

        if let Some(leaf) = self.nodes.get_mut(&leaf_id) {
            leaf.children = child_ids.clone();
        }
        child_ids
    }

    /// Fold a simulated observation into a freshly expanded child, replacing
    /// its pending state with `parent.state.with_step(action, observation)`.
    pub fn apply_simulation(&mut self, child_id: NodeId, observation: Observation, terminal: bool) {
        let parent_id = self.nodes[&child_id].parent;
        let parent_state = parent_id.map(|pid| self.nodes[&pid].state.clone());

        if let Some(child) = self.nodes.get_mut(&child_id) {
            let action = child.action.clone().expect("expanded child always has an action");
            if let Some(parent_state) = parent_state {
                child.state = parent_state.with_step(action, observation.clone());
            }
            child.observation = Some(observation);
            child.terminal = terminal;
        }
    }

    /// Increment visits/total_value at `start_id` and walk up to the root,
    /// decaying `value` by `gamma` at each step.
    pub fn backpropagate(&mut self, start_id: NodeId, mut value: f64, gamma: f64) {
        let mut current = Some(start_id);
        while let Some(id) = current {
            let Some(node) = self.nodes.get_mut(&id) else {
                break;
            };
            node.visits += 1;
            node.total_value += value;
            value *= gamma;
            current = node.parent;
        }
    }

    /// Highest-Q terminal node that is a solution, if any exists.
    pub fn best_solution(&self) -> Option<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.is_solution())
            .max_by(|a, b| a.q_value().partial_cmp(&b.q_value()).unwrap_or(std::cmp::Ordering::Equal))
            .map(|n| n.id)
    }

    /// Highest-Q terminal node, solution or not.
    pub fn best_terminal(&self) -> Option<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.terminal)
            .max_by(|a, b| a.q_value().partial_cmp(&b.q_value()).unwrap_or(std::cmp::Ordering::Equal))
            .map(|n| n.id)
    }

    /// Highest-Q leaf (childless node), used as the final fallback when no
    /// terminal node exists at all.
    pub fn best_leaf(&self) -> Option<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.children.is_empty())
            .max_by(|a, b| a.q_value().partial_cmp(&b.q_value()).unwrap_or(std::cmp::Ordering::Equal))
            .map(|n| n.id)
    }

    /// True iff every leaf is terminal (every path hit max depth or expanded
    /// to zero children).
    pub fn exhausted(&self) -> bool {
        self.nodes.values().filter(|n| n.children.is_empty()).all(|n| n.terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(tool: &str) -> Action {
        Action::new(tool, serde_json::json!({}))
    }

    #[test]
    fn select_on_fresh_tree_returns_root() {
        let tree = Tree::new(AgentState::root("q"));
        assert_eq!(tree.select(1.414), tree.root_id());
    }

    #[test]
    fn expand_with_no_actions_marks_terminal() {
        let mut tree = Tree::new(AgentState::root("q"));
        let children = tree.expand(tree.root_id(), vec![]);
        assert!(children.is_empty());
        assert!(tree.node(tree.root_id()).unwrap().terminal);
    }

    #[test]
    fn expand_assigns_depth_and_parent_linkage() {
        let mut tree = Tree::new(AgentState::root("q"));
        let children = tree.expand(tree.root_id(), vec![action("a"), action("b")]);
        assert_eq!(children.len(), 2);
        for &id in &children {
            let node = tree.node(id).unwrap();
            assert_eq!(node.depth, 1);
            assert_eq!(node.parent, Some(tree.root_id()));
        }
    }

    #[test]
    fn unvisited_child_has_infinite_uct_and_is_selected_first() {
        let mut tree = Tree::new(AgentState::root("q"));
        let children = tree.expand(tree.root_id(), vec![action("a"), action("b")]);
        // Give the first child some visits but leave the second untouched;
        // selection must still prefer the unvisited one.
        tree.backpropagate(children[0], 0.9, 0.95);
        let selected = tree.select(1.414);
        assert_eq!(selected, children[1]);
    }

    #[test]
    fn backpropagate_decays_value_toward_root() {
        let mut tree = Tree::new(AgentState::root("q"));
        let children = tree.expand(tree.root_id(), vec![action("a")]);
        tree.backpropagate(children[0], 1.0, 0.5);

        let child = tree.node(children[0]).unwrap();
        assert_eq!(child.visits, 1);
        assert_eq!(child.total_value, 1.0);

        let root = tree.node(tree.root_id()).unwrap();
        assert_eq!(root.visits, 1);
        assert_eq!(root.total_value, 0.5);
    }

    #[test]
    fn apply_simulation_folds_observation_into_state() {
        let mut tree = Tree::new(AgentState::root("q"));
        let children = tree.expand(tree.root_id(), vec![action("a")]);
        let obs = Observation {
            result: "42".to_string(),
            success: true,
            tokens: 5,
            duration_ms: 0,
        };
        tree.apply_simulation(children[0], obs, false);
        let child = tree.node(children[0]).unwrap();
        assert_eq!(child.state.history.len(), 1);
    }

    #[test]
    fn best_solution_picks_highest_q_among_solutions() {
        let mut tree = Tree::new(AgentState::root("q"));
        let children = tree.expand(tree.root_id(), vec![action("a"), action("b")]);
        tree.apply_simulation(
            children[0],
            Observation { result: "ok".into(), success: true, tokens: 1, duration_ms: 0 },
            true,
        );
        tree.apply_simulation(
            children[1],
            Observation { result: "final_answer: 9".into(), success: true, tokens: 1, duration_ms: 0 },
            true,
        );
        tree.backpropagate(children[0], 0.2, 0.95);
        tree.backpropagate(children[1], 0.9, 0.95);
        assert_eq!(tree.best_solution(), Some(children[1]));
    }

    #[test]
    fn exhausted_true_only_when_all_leaves_terminal() {
        let mut tree = Tree::new(AgentState::root("q"));
        assert!(!tree.exhausted());
        tree.expand(tree.root_id(), vec![]);
        assert!(tree.exhausted());
    }
}
