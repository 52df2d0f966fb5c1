//! workgrid-supervisor: runs and watches the node's runtime process.
//!
//! # Architecture
//!
//! ```text
//! Supervisor (Arc<Inner>, one async mutex over ProcessState)
//!   ├── start / stop / restart
//!   ├── per-child monitor task
//!   │   ├── waits for exit or a kill request
//!   │   └── on_exit → ExitPolicy (fail-fast | self-healing with backoff)
//!   └── stdout/stderr pumps
//!       └── parse_frame → tracing event + broadcast LogLine
//! ```
//!
//! Fail-fast mode publishes the exit code on [`Supervisor::fatal`]; the
//! binary decides how to terminate. Self-healing mode restarts the last
//! config with exponential backoff.

pub mod command;
pub mod error;
pub mod logs;
pub mod policy;
pub mod supervisor;

pub use command::RuntimeCommand;
pub use error::{SupervisorError, SupervisorResult};
pub use logs::{parse_frame, LogLine, LogSource, Stream};
pub use policy::{ExitPolicy, RestartBackoff};
pub use supervisor::{Phase, Snapshot, Supervisor, SupervisorOptions};
