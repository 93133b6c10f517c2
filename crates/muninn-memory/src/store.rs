//! Hypergraph storage using graphqlite.
//!
//! Stores typed nodes and labeled edges as a SQLite-backed Cypher graph.
//! Mutations are serialized by a tier-counter mutex; reads proceed freely
//! through graphqlite's own connection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use graphqlite::Graph;
use serde::Serialize;

use crate::edge::Edge;
use crate::node::{normalize_content, Node, NodeType, Tier};
use crate::tier::{CapacityWarning, TierLimits};

/// Error type for hypergraph store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] graphqlite::Error),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("edge endpoint does not exist: {0}")]
    DanglingEndpoint(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Graph statistics.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub node_count: i64,
    pub edge_count: i64,
}

/// Result of a node insertion: the stored node plus an optional non-fatal
/// capacity warning for the tier it landed in.
pub type InsertOutcome = (Node, Option<CapacityWarning>);

/// The full set of fields the richer `add_experience` overload accepts,
/// beyond the base `(content, outcome, success)`. All optional fields are
/// stored as node metadata, never required for a valid experience record.
#[derive(Debug, Clone, Default)]
pub struct ExperienceDetails {
    pub task: Option<String>,
    pub approach: Option<String>,
    pub files_modified: Vec<String>,
    pub blockers: Vec<String>,
    pub insights: Vec<String>,
    pub related_decisions: Vec<String>,
    pub duration_secs: Option<f64>,
}

/// The typed hypergraph contract the REPL's memory callbacks and the LATS
/// `memory_query`/`memory_store` tools are built against.
pub trait NodeStore: Send + Sync {
    fn add_fact(&self, tier: Tier, content: &str, confidence: Option<f32>) -> Result<InsertOutcome>;
    fn add_entity(&self, tier: Tier, content: &str, subtype: &str) -> Result<InsertOutcome>;
    fn add_snippet(&self, tier: Tier, content: &str, file: &str, line: usize) -> Result<InsertOutcome>;
    fn add_decision(
        &self,
        tier: Tier,
        content: &str,
        rationale: &str,
        alternatives: &[String],
    ) -> Result<InsertOutcome>;
    fn add_experience(
        &self,
        tier: Tier,
        content: &str,
        outcome: &str,
        success: bool,
    ) -> Result<InsertOutcome>;
    /// The richer overload: same base fields plus task/approach/files/
    /// blockers/insights/related-decisions/duration, all stored as metadata.
    fn add_experience_detailed(
        &self,
        tier: Tier,
        content: &str,
        outcome: &str,
        success: bool,
        details: ExperienceDetails,
    ) -> Result<InsertOutcome>;
    fn search(&self, tier: Tier, query: &str, limit: usize) -> Result<Vec<(Node, f32)>>;
    fn get_context(&self, tier: Tier, limit: usize) -> Result<Vec<Node>>;
    fn get_related(&self, node_id: &str, depth: usize) -> Result<Vec<(Node, usize)>>;
    fn get_facts(&self, tier: Tier) -> Result<Vec<Node>>;
    fn relate(&self, label: &str, subject_id: &str, object_id: &str) -> Result<String>;
    fn has_node(&self, node_id: &str) -> Result<bool>;
    fn get_node(&self, node_id: &str) -> Result<Option<Node>>;
    fn stats(&self) -> Result<GraphStats>;
    fn query_cypher(&self, cypher: &str) -> Result<Vec<HashMap<String, String>>>;
}

/// graphqlite-backed hypergraph store.
pub struct GraphStore {
    graph: Graph,
    limits: TierLimits,
    tier_counts: Mutex<HashMap<Tier, usize>>,
}

impl GraphStore {
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::with_limits(Graph::open(path)?, TierLimits::default())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_limits(Graph::open_in_memory()?, TierLimits::default())
    }

    pub fn with_tier_limits<P: AsRef<std::path::Path>>(path: P, limits: TierLimits) -> Result<Self> {
        Self::with_limits(Graph::open(path)?, limits)
    }

    fn with_limits(graph: Graph, limits: TierLimits) -> Result<Self> {
        let store = Self {
            graph,
            limits,
            tier_counts: Mutex::new(HashMap::new()),
        };
        // seed counters from whatever is already in the database
        for tier in [Tier::Task, Tier::Session, Tier::LongTerm] {
            let cypher = format!("MATCH (n {{tier: '{}'}}) RETURN n.id", tier.as_str());
            let existing = store.graph.query(&cypher)?.iter().count();
            store.tier_counts.lock().unwrap().insert(tier, existing);
        }
        Ok(store)
    }

    fn bump_tier_count(&self, tier: Tier) -> usize {
        let mut counts = self.tier_counts.lock().unwrap();
        let entry = counts.entry(tier).or_insert(0);
        *entry += 1;
        *entry
    }

    fn insert_fresh(&self, node: &Node) -> Result<()> {
        let props = node_to_properties(node);
        self.graph.upsert_node(&node.id, props, label_for(node.node_type))?;
        Ok(())
    }

    fn update_existing(&self, node: &Node) -> Result<()> {
        // upsert_node overwrites properties in place for an existing id.
        let props = node_to_properties(node);
        self.graph.upsert_node(&node.id, props, label_for(node.node_type))?;
        Ok(())
    }

    fn find_dedup_match(&self, node_type: NodeType, content: &str, subtype: &str) -> Result<Option<String>> {
        let dedup_key = format!("{}|{}", normalize_content(content), subtype);
        let cypher = format!(
            "MATCH (n {{node_type: '{}', dedup_key: '{}'}}) RETURN n.id",
            node_type.as_str(),
            graphqlite::escape_string(&dedup_key)
        );
        let result = self.graph.query(&cypher)?;
        Ok(result
            .iter()
            .filter_map(|row| row.get::<String>("n.id").ok())
            .next())
    }

    fn insert_or_dedupe(&self, mut node: Node, subtype_for_key: &str) -> Result<InsertOutcome> {
        if node.node_type.is_deduplicated() {
            if let Some(existing_id) = self.find_dedup_match(node.node_type, &node.content, subtype_for_key)? {
                let mut existing = self
                    .fetch_node(&existing_id)?
                    .ok_or_else(|| StoreError::InvalidData("dedup match vanished".into()))?;
                existing.touch();
                self.update_existing(&existing)?;
                return Ok((existing, None));
            }
        }
        node.metadata.insert(
            "dedup_key".to_string(),
            serde_json::Value::String(format!("{}|{}", normalize_content(&node.content), subtype_for_key)),
        );
        self.insert_fresh(&node)?;
        let count = self.bump_tier_count(node.tier);
        let warning = self.limits.check(node.tier, count);
        Ok((node, warning))
    }

    fn fetch_node(&self, node_id: &str) -> Result<Option<Node>> {
        let cypher = format!(
            "MATCH (n {{id: '{}'}}) RETURN n.id, n.node_type, n.subtype, n.content, n.created_at, \
             n.last_accessed_at, n.access_count, n.confidence, n.tier, n.metadata_json",
            graphqlite::escape_string(node_id)
        );
        let result = self.graph.query(&cypher)?;
        for row in result.iter() {
            return Ok(Some(row_to_node(&row)?));
        }
        Ok(None)
    }
}

impl NodeStore for GraphStore {
    fn add_fact(&self, tier: Tier, content: &str, confidence: Option<f32>) -> Result<InsertOutcome> {
        let node = Node::new(NodeType::Fact, content, tier).with_confidence(confidence.unwrap_or(1.0));
        self.insert_or_dedupe(node, "")
    }

    fn add_entity(&self, tier: Tier, content: &str, subtype: &str) -> Result<InsertOutcome> {
        let node = Node::new(NodeType::Entity, content, tier).with_subtype(subtype);
        self.insert_or_dedupe(node, subtype)
    }

    fn add_snippet(&self, tier: Tier, content: &str, file: &str, line: usize) -> Result<InsertOutcome> {
        let node = Node::new(NodeType::Snippet, content, tier)
            .with_metadata("file", file)
            .with_metadata("line", line);
        self.insert_fresh(&node)?;
        let count = self.bump_tier_count(tier);
        Ok((node, self.limits.check(tier, count)))
    }

    fn add_decision(
        &self,
        tier: Tier,
        content: &str,
        rationale: &str,
        alternatives: &[String],
    ) -> Result<InsertOutcome> {
        let node = Node::new(NodeType::Decision, content, tier)
            .with_metadata("rationale", rationale)
            .with_metadata("alternatives", alternatives);
        self.insert_fresh(&node)?;
        let count = self.bump_tier_count(tier);
        Ok((node, self.limits.check(tier, count)))
    }

    fn add_experience(&self, tier: Tier, content: &str, outcome: &str, success: bool) -> Result<InsertOutcome> {
        let node = Node::new(NodeType::Experience, content, tier)
            .with_metadata("outcome", outcome)
            .with_metadata("success", success);
        self.insert_fresh(&node)?;
        let count = self.bump_tier_count(tier);
        Ok((node, self.limits.check(tier, count)))
    }

    fn add_experience_detailed(
        &self,
        tier: Tier,
        content: &str,
        outcome: &str,
        success: bool,
        details: ExperienceDetails,
    ) -> Result<InsertOutcome> {
        let mut node = Node::new(NodeType::Experience, content, tier)
            .with_metadata("outcome", outcome)
            .with_metadata("success", success);
        if let Some(task) = &details.task {
            node = node.with_metadata("task", task);
        }
        if let Some(approach) = &details.approach {
            node = node.with_metadata("approach", approach);
        }
        if !details.files_modified.is_empty() {
            node = node.with_metadata("files_modified", &details.files_modified);
        }
        if !details.blockers.is_empty() {
            node = node.with_metadata("blockers", &details.blockers);
        }
        if !details.insights.is_empty() {
            node = node.with_metadata("insights", &details.insights);
        }
        if !details.related_decisions.is_empty() {
            node = node.with_metadata("related_decisions", &details.related_decisions);
        }
        if let Some(duration_secs) = details.duration_secs {
            node = node.with_metadata("duration_secs", duration_secs);
        }

        self.insert_fresh(&node)?;
        let count = self.bump_tier_count(tier);
        Ok((node, self.limits.check(tier, count)))
    }

    fn search(&self, tier: Tier, query: &str, limit: usize) -> Result<Vec<(Node, f32)>> {
        let cypher = format!("MATCH (n {{tier: '{}'}}) RETURN n.id", tier.as_str());
        let ids: Vec<String> = self
            .graph
            .query(&cypher)?
            .iter()
            .filter_map(|row| row.get::<String>("n.id").ok())
            .collect();

        let needle = query.to_lowercase();
        let mut scored: Vec<(Node, f32)> = Vec::new();
        for id in ids {
            if let Some(node) = self.fetch_node(&id)? {
                let haystack = node.content.to_lowercase();
                if needle.is_empty() || haystack.contains(&needle) {
                    let score = content_relevance(&haystack, &needle);
                    scored.push((node, score));
                }
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn get_context(&self, tier: Tier, limit: usize) -> Result<Vec<Node>> {
        let cypher = format!("MATCH (n {{tier: '{}'}}) RETURN n.id", tier.as_str());
        let ids: Vec<String> = self
            .graph
            .query(&cypher)?
            .iter()
            .filter_map(|row| row.get::<String>("n.id").ok())
            .collect();

        let mut nodes = Vec::new();
        for id in ids {
            if let Some(node) = self.fetch_node(&id)? {
                nodes.push(node);
            }
        }
        nodes.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
        nodes.truncate(limit);
        Ok(nodes)
    }

    fn get_related(&self, node_id: &str, depth: usize) -> Result<Vec<(Node, usize)>> {
        let mut visited = std::collections::HashSet::new();
        visited.insert(node_id.to_string());

        let mut frontier = VecDeque::new();
        frontier.push_back((node_id.to_string(), 0usize));

        let mut out = Vec::new();
        while let Some((current, current_depth)) = frontier.pop_front() {
            if current_depth >= depth {
                continue;
            }
            let cypher = format!(
                "MATCH (a {{id: '{}'}})-[]->(b) RETURN b.id",
                graphqlite::escape_string(&current)
            );
            let neighbor_ids: Vec<String> = self
                .graph
                .query(&cypher)?
                .iter()
                .filter_map(|row| row.get::<String>("b.id").ok())
                .collect();

            for neighbor_id in neighbor_ids {
                if visited.insert(neighbor_id.clone()) {
                    if let Some(node) = self.fetch_node(&neighbor_id)? {
                        out.push((node, current_depth + 1));
                    }
                    frontier.push_back((neighbor_id, current_depth + 1));
                }
            }
        }
        Ok(out)
    }

    fn get_facts(&self, tier: Tier) -> Result<Vec<Node>> {
        let cypher = format!(
            "MATCH (n {{tier: '{}', node_type: 'fact'}}) RETURN n.id",
            tier.as_str()
        );
        let ids: Vec<String> = self
            .graph
            .query(&cypher)?
            .iter()
            .filter_map(|row| row.get::<String>("n.id").ok())
            .collect();
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = self.fetch_node(&id)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn relate(&self, label: &str, subject_id: &str, object_id: &str) -> Result<String> {
        if !self.has_node(subject_id)? {
            return Err(StoreError::DanglingEndpoint(subject_id.to_string()));
        }
        if !self.has_node(object_id)? {
            return Err(StoreError::DanglingEndpoint(object_id.to_string()));
        }
        let edge = Edge::new(label, subject_id, object_id);
        self.graph.upsert_edge(
            &edge.subject_id,
            &edge.object_id,
            vec![("id", edge.id.clone()), ("created_at", edge.created_at.to_rfc3339())],
            &rel_type_for(label),
        )?;
        Ok(edge.id)
    }

    fn has_node(&self, node_id: &str) -> Result<bool> {
        Ok(self.graph.has_node(node_id)?)
    }

    fn get_node(&self, node_id: &str) -> Result<Option<Node>> {
        self.fetch_node(node_id)
    }

    fn stats(&self) -> Result<GraphStats> {
        let stats = self.graph.stats()?;
        Ok(GraphStats {
            node_count: stats.nodes,
            edge_count: stats.edges,
        })
    }

    fn query_cypher(&self, cypher: &str) -> Result<Vec<HashMap<String, String>>> {
        let result = self.graph.query(cypher)?;
        Ok(result
            .iter()
            .map(|row| row.columns().iter().filter_map(|c| row.get::<String>(c).ok().map(|v| (c.clone(), v))).collect())
            .collect())
    }
}

/// Relationship type derived from a free-form label (uppercased, sanitized for Cypher).
fn rel_type_for(label: &str) -> String {
    let sanitized: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    if sanitized.is_empty() {
        "RELATES_TO".to_string()
    } else {
        sanitized
    }
}

fn label_for(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Fact => "Fact",
        NodeType::Entity => "Entity",
        NodeType::Snippet => "Snippet",
        NodeType::Decision => "Decision",
        NodeType::Experience => "Experience",
    }
}

fn node_to_properties(node: &Node) -> Vec<(&'static str, String)> {
    vec![
        ("id", node.id.clone()),
        ("node_type", node.node_type.as_str().to_string()),
        ("subtype", node.subtype.clone().unwrap_or_default()),
        ("content", node.content.clone()),
        ("created_at", node.created_at.to_rfc3339()),
        ("last_accessed_at", node.last_accessed_at.to_rfc3339()),
        ("access_count", node.access_count.to_string()),
        ("confidence", node.confidence.to_string()),
        ("tier", node.tier.as_str().to_string()),
        (
            "metadata_json",
            serde_json::to_string(&node.metadata).unwrap_or_else(|_| "{}".to_string()),
        ),
    ]
}

fn row_to_node(row: &graphqlite::CypherRow) -> Result<Node> {
    let get = |col: &str| -> Result<String> {
        row.get::<String>(col)
            .map_err(|e| StoreError::InvalidData(format!("missing column {col}: {e}")))
    };

    let node_type = match get("n.node_type")?.as_str() {
        "fact" => NodeType::Fact,
        "entity" => NodeType::Entity,
        "snippet" => NodeType::Snippet,
        "decision" => NodeType::Decision,
        "experience" => NodeType::Experience,
        other => return Err(StoreError::InvalidData(format!("unknown node_type {other}"))),
    };

    let subtype = get("n.subtype").ok().filter(|s| !s.is_empty());
    let tier = match get("n.tier")?.as_str() {
        "task" => Tier::Task,
        "session" => Tier::Session,
        "long_term" => Tier::LongTerm,
        other => return Err(StoreError::InvalidData(format!("unknown tier {other}"))),
    };

    let metadata = serde_json::from_str(&get("n.metadata_json").unwrap_or_else(|_| "{}".to_string()))
        .unwrap_or_default();

    Ok(Node {
        id: get("n.id")?,
        node_type,
        subtype,
        content: get("n.content")?,
        created_at: get("n.created_at")?
            .parse()
            .map_err(|_| StoreError::InvalidData("bad created_at".into()))?,
        last_accessed_at: get("n.last_accessed_at")?
            .parse()
            .map_err(|_| StoreError::InvalidData("bad last_accessed_at".into()))?,
        access_count: get("n.access_count")?
            .parse()
            .map_err(|_| StoreError::InvalidData("bad access_count".into()))?,
        confidence: get("n.confidence")?
            .parse()
            .map_err(|_| StoreError::InvalidData("bad confidence".into()))?,
        tier,
        metadata,
    })
}

/// Term-overlap relevance score in [0, 1]; exact substring match scores highest.
fn content_relevance(haystack: &str, needle: &str) -> f32 {
    if needle.is_empty() {
        return 0.5;
    }
    if haystack == needle {
        return 1.0;
    }
    let needle_terms: Vec<&str> = needle.split_whitespace().collect();
    if needle_terms.is_empty() {
        return 0.5;
    }
    let matched = needle_terms
        .iter()
        .filter(|t| haystack.contains(*t))
        .count();
    0.5 + 0.5 * (matched as f32 / needle_terms.len() as f32)
}
