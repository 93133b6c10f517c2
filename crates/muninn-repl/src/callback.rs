//! Traits re-entering the host from inside an `Execute` call.
//!
//! The `CallbackHandler`/`MemoryHandler` async traits follow the same
//! `Tool`/`ToolEnvironment` async_trait shape. Callback params are decoded
//! per-callback-name rather than leaking a host type system onto the wire;
//! unknown fields are ignored, missing required fields are a validation error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ReplError, Result};

/// Re-entrant LLM oracle reachable from Python via `llm_call`/`llm_batch`.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn llm_call(&self, prompt: &str, context: &str, model: Option<&str>) -> Result<String>;

    async fn llm_batch(
        &self,
        prompts: &[String],
        contexts: &[String],
        model: Option<&str>,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryAddExperienceParams {
    pub content: String,
    pub outcome: String,
    pub success: bool,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub approach: Option<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub related_decisions: Vec<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// Re-entrant memory substrate callbacks (`memory_*`).
#[async_trait]
pub trait MemoryHandler: Send + Sync {
    async fn query(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    async fn add_fact(&self, content: &str, confidence: f32) -> Result<String>;

    async fn add_experience(&self, params: MemoryAddExperienceParams) -> Result<String>;

    async fn get_context(&self, limit: usize) -> Result<Vec<String>>;

    async fn relate(&self, label: &str, subject_id: &str, object_id: &str) -> Result<String>;
}

/// A decoded callback params payload, typed per callback name.
///
/// This is the boundary where wire JSON is validated against a schema;
/// the host never hands raw `serde_json::Value` into subsystem traits below
/// this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "callback", rename_all = "snake_case")]
pub enum CallbackParams {
    LlmCall {
        prompt: String,
        #[serde(default)]
        context: String,
        #[serde(default)]
        model: Option<String>,
    },
    LlmBatch {
        prompts: Vec<String>,
        #[serde(default)]
        contexts: Vec<String>,
        #[serde(default)]
        model: Option<String>,
    },
    MemoryQuery {
        query: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    MemoryAddFact {
        content: String,
        #[serde(default = "default_confidence")]
        confidence: f32,
    },
    MemoryAddExperience(MemoryAddExperienceParams),
    MemoryGetContext {
        #[serde(default = "default_limit")]
        limit: usize,
    },
    MemoryRelate {
        label: String,
        subject_id: String,
        object_id: String,
    },
    PluginCall {
        function: String,
        #[serde(default)]
        args: Vec<String>,
    },
    PluginList {},
}

fn default_limit() -> usize {
    10
}

fn default_confidence() -> f32 {
    1.0
}

/// Decode a raw callback name + params blob into a typed `CallbackParams`,
/// returning a validation error (never a panic) on a malformed payload.
pub fn decode_callback(name: &str, params: serde_json::Value) -> Result<CallbackParams> {
    let mut tagged = params;
    if let serde_json::Value::Object(ref mut map) = tagged {
        map.insert(
            "callback".to_string(),
            serde_json::Value::String(name.to_string()),
        );
    } else {
        return Err(ReplError::Validation(format!(
            "callback params for '{name}' must be an object"
        )));
    }
    serde_json::from_value(tagged)
        .map_err(|e| ReplError::Validation(format!("bad params for '{name}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_llm_call() {
        let parsed = decode_callback("llm_call", json!({"prompt": "hi", "context": "ctx"})).unwrap();
        match parsed {
            CallbackParams::LlmCall { prompt, context, .. } => {
                assert_eq!(prompt, "hi");
                assert_eq!(context, "ctx");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn missing_required_field_is_validation_error() {
        let err = decode_callback("llm_call", json!({"context": "ctx"})).unwrap_err();
        assert!(matches!(err, ReplError::Validation(_)));
    }

    #[test]
    fn unknown_extra_fields_are_ignored() {
        let parsed =
            decode_callback("memory_query", json!({"query": "q", "limit": 5, "extra": "x"}))
                .unwrap();
        assert!(matches!(parsed, CallbackParams::MemoryQuery { limit: 5, .. }));
    }

    #[test]
    fn memory_add_experience_accepts_rich_fields() {
        let parsed = decode_callback(
            "memory_add_experience",
            json!({
                "content": "did x", "outcome": "worked", "success": true,
                "task": "fix bug", "files_modified": ["a.rs"], "duration_secs": 12.5
            }),
        )
        .unwrap();
        match parsed {
            CallbackParams::MemoryAddExperience(p) => {
                assert_eq!(p.task.as_deref(), Some("fix bug"));
                assert_eq!(p.files_modified, vec!["a.rs".to_string()]);
                assert_eq!(p.duration_secs, Some(12.5));
            }
            _ => panic!("wrong variant"),
        }
    }
}
