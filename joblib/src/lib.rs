mod actors;
pub mod config;
pub mod errors;
mod events;
mod resolve;
pub mod types;

// re-export the coordinator handle as if it is the supervisor itself.
pub use actors::coordinator::SupervisorHandle as Supervisor;
pub use config::SupervisorConfig;
pub use errors::{JobError, Result};
pub use events::{Exit, JobEvent, JobReport, JobStatus, Termination};
pub use resolve::resolve_program;
pub use types::{JobId, JobSpec, OutputLine, Stream};
