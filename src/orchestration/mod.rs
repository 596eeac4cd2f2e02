// Orchestration - stage graph, stages and shared state

pub mod orchestrator;
pub mod stages;
pub mod types;
pub mod workflow;

pub use orchestrator::{
    CompiledOrchestrator, ConfigurationError, DecisionFn, EngineError, Orchestrator, RunReport,
};
pub use stages::{FnStage, Stage, StageError, StageServices};
pub use types::{ClassificationResult, InteractionState, StageId, StateField, StateUpdate, Turn, TurnRole};
pub use workflow::build_workflow;
