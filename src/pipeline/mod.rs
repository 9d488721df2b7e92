//! Update and launch pipeline
//!
//! ## Module Organization
//!
//! - `state` - Pipeline states, observer events and commands
//! - `orchestrator` - The state machine driving check, download, install and launch

mod orchestrator;
mod state;

pub use orchestrator::{EVENT_BUFFER, OrchestratorHandle, PipelineSettings, UpdateOrchestrator};
pub use state::{PipelineCommand, PipelineState, StatusEvent};
