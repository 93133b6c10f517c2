//! Hypergraph node types.
//!
//! A node is a typed piece of agent knowledge. Nodes of type `fact` and
//! `entity` are deduplicated on (normalized content, subtype); all other
//! types are always inserted fresh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The kind of knowledge a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// A deduplicated statement believed to be true.
    Fact,
    /// A deduplicated named thing (person, file, concept, ...).
    Entity,
    /// A piece of source text, always inserted fresh.
    Snippet,
    /// A recorded choice with rationale, always inserted fresh.
    Decision,
    /// A recorded outcome of an attempted task, always inserted fresh.
    Experience,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Fact => "fact",
            NodeType::Entity => "entity",
            NodeType::Snippet => "snippet",
            NodeType::Decision => "decision",
            NodeType::Experience => "experience",
        }
    }

    /// Fact and entity nodes dedupe on (normalized content, subtype); the rest never dedupe.
    pub fn is_deduplicated(&self) -> bool {
        matches!(self, NodeType::Fact | NodeType::Entity)
    }
}

/// A memory lifetime class with its own capacity and retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Task,
    Session,
    LongTerm,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Task => "task",
            Tier::Session => "session",
            Tier::LongTerm => "long_term",
        }
    }
}

/// A typed piece of agent knowledge stored in the hypergraph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Opaque, stable for the lifetime of the node.
    pub id: String,
    pub node_type: NodeType,
    pub subtype: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Monotonically nondecreasing.
    pub access_count: u64,
    /// Bounded to [0, 1].
    pub confidence: f32,
    pub tier: Tier,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(node_type: NodeType, content: impl Into<String>, tier: Tier) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            node_type,
            subtype: None,
            content: content.into(),
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
            confidence: 1.0,
            tier,
            metadata: HashMap::new(),
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }

    /// Key used for dedup lookups of `fact`/`entity` nodes: normalized content + subtype.
    pub fn dedup_key(&self) -> Option<(String, String)> {
        if !self.node_type.is_deduplicated() {
            return None;
        }
        Some((
            normalize_content(&self.content),
            self.subtype.clone().unwrap_or_default(),
        ))
    }

    pub fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
        self.access_count += 1;
    }
}

/// Lowercase + collapse whitespace so near-identical facts dedupe.
pub fn normalize_content(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
