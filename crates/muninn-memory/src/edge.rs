//! Hyperedge types: labeled directed relations over node IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A labeled directed relation between a subject and an object node.
///
/// Edges never dangle: both endpoints must exist at the moment of creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub label: String,
    pub subject_id: String,
    pub object_id: String,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        label: impl Into<String>,
        subject_id: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            subject_id: subject_id.into(),
            object_id: object_id.into(),
            created_at: Utc::now(),
        }
    }
}
