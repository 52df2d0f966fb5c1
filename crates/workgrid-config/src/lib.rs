//! workgrid-config: builds and writes the runtime configuration.
//!
//! One [`Configurator`] corresponds to one configuration generation: it
//! owns a [`ConfigDocument`] (services, sockets, extensions, workers) and
//! an [`ArtifactStore`] holding every file the rendered document embeds.
//! Tenant workers are added from [`workgrid_core::WorkerSpec`]s and
//! [`Configurator::write_config`] writes artifacts and config together.

pub mod artifacts;
pub mod compile;
pub mod configurator;
pub mod document;
pub mod error;
pub mod names;
mod render;
pub mod router;
pub mod scripts;

pub use artifacts::{Artifact, ArtifactStore};
pub use configurator::Configurator;
pub use document::ConfigDocument;
pub use error::{ConfigError, ConfigResult};
pub use names::Entropy;
pub use router::{RouteEntry, RouterMeta};
