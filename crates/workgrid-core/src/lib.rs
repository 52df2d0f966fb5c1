//! workgrid-core: shared request types for the workgrid worker host.
//!
//! A worker is described once as a [`WorkerSpec`]: its modules, its
//! bindings and the host/path routes it claims. Specs are usually loaded
//! from a `worker.toml` [`Manifest`], which also lowers the high-level
//! capability bindings (kv, site, queue) into base binding shapes.
//!
//! Node-wide settings for the daemon and the dev tool live in
//! [`settings::Settings`].

pub mod capability;
pub mod error;
pub mod manifest;
pub mod settings;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use manifest::Manifest;
pub use settings::Settings;
pub use types::*;
