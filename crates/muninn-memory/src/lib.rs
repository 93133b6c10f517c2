//! Tiered typed hypergraph memory substrate.
//!
//! A [`store::GraphStore`] owns a `graphqlite`-backed Cypher graph of
//! [`node::Node`]s (fact/entity/snippet/decision/experience) connected by
//! labeled [`edge::Edge`]s, partitioned into [`node::Tier`]s (task/session/
//! long_term) each with its own soft capacity via [`tier::TierLimits`].

pub mod edge;
pub mod node;
pub mod store;
pub mod tier;

pub use edge::Edge;
pub use node::{normalize_content, Node, NodeType, Tier};
pub use store::{ExperienceDetails, GraphStats, GraphStore, InsertOutcome, NodeStore, Result, StoreError};
pub use tier::{CapacityWarning, TierLimits};
