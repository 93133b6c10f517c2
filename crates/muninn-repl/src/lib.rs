//! Long-lived sandboxed Python subprocess with a JSON line-framed,
//! bidirectional-callback protocol.
//!
//! A [`ReplSupervisor`] owns exactly one child process for the lifetime of a
//! session: `Start` spawns it, `Execute` round-trips code through it
//! (servicing any `llm_*`/`memory_*`/`plugin_*` callbacks the child raises
//! mid-call), and `Stop` tears it down. See [`supervisor::ReplSupervisor`]
//! for the full operation set.

pub mod bootstrap;
pub mod callback;
pub mod cancel;
pub mod discovery;
pub mod error;
pub mod plugin;
pub mod protocol;
pub mod sandbox;
pub mod supervisor;

pub use callback::{CallbackHandler, CallbackParams, MemoryAddExperienceParams, MemoryHandler};
pub use cancel::CancellationToken;
pub use discovery::{candidates, discover_and_register, plugin_dirs};
pub use error::{ReplError, Result};
pub use plugin::{ParamSchema, Plugin, PluginFunction, PluginManager};
pub use protocol::{CallbackRequest, CallbackResponse, ErrorCode, Request, Response, ResponseError};
pub use sandbox::{ResourceEvent, ResourceMonitor, ResourceSample, SandboxConfig};
pub use supervisor::{ExecuteOutcome, ReplSupervisor, Status, VarValue};
