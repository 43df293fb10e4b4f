pub mod executor;
pub mod orchestrator;
pub mod reporter;
pub mod scheduler;
pub mod types;

pub use executor::CallExecutor;
pub use orchestrator::ChainOrchestrator;
pub use reporter::ExecutionReporter;
pub use scheduler::{ExecutionHandle, ExecutionScheduler};
pub use types::{ExecutionSchedule, ExecutionSummary, SchedulingConfig};
