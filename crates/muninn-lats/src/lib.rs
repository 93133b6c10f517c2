//! LATS (Language Agent Tree Search): MCTS over tool-action sequences.
//!
//! Given a query, an [`Expander`](expander::Expander), and a
//! [`Simulator`](simulator::Simulator), [`LatsController::solve`] runs
//! select → expand → simulate → backpropagate under an iteration/token/time
//! budget and returns the best root-to-terminal path found.

pub mod action;
pub mod budget;
pub mod capability;
pub mod controller;
pub mod error;
pub mod expander;
pub mod oracle;
pub mod repl_tool;
pub mod simulator;
pub mod tools;
pub mod trace;
pub mod tree;
pub mod valuator;

pub use action::{Action, AgentState, Observation};
pub use budget::{BudgetBreach, BudgetTracker, LatsConfig};
pub use capability::{Capability, CapabilityMatcher, QueryAnalyzer, Requirements, ToolProfile};
pub use controller::{LatsController, Solution, TerminationReason};
pub use error::{LatsError, Result};
pub use expander::{Expander, LlmExpander, MockExpander};
pub use oracle::LlmOracle;
pub use repl_tool::ReplExecuteTool;
pub use simulator::{MockSimulator, RealSimulator, SimulationOutcome, Simulator};
pub use tools::{Tool, ToolRegistry, ToolResult};
pub use tree::{MctsNode, NodeId, Tree};
pub use valuator::{HeuristicValuator, LlmValuator, Valuator};
