//! workgrid-reload: keeps the runtime in step with desired state.
//!
//! ```text
//! ReloadTrigger (fs watch | manual)
//!   → ReloadDriver gate
//!     → DesiredState::load(state_dir)
//!     → Configurator: add_worker × N → write_config
//!     → Supervisor::restart(config_path)
//! ```

pub mod driver;
pub mod error;
pub mod state;
pub mod trigger;

pub use driver::{compile, DriverConfig, ReloadDriver, ReloadOutcome};
pub use error::{ReloadError, ReloadResult};
pub use state::{DesiredState, DesiredWorker};
pub use trigger::{FsWatchTrigger, ManualHandle, ManualTrigger, ReloadCause, ReloadTrigger};
