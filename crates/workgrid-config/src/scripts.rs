//! JavaScript sources for the internal router, the tenant entrypoint
//! wrapper, and the capability extensions.

use workgrid_core::capability::{KV_MODULE, QUEUES_MODULE, SITES_MODULE};

pub const ROUTER: &str = include_str!("scripts/router.js");
pub const ENTRY: &str = include_str!("scripts/entry.js");

/// An extension module and the artifact file its source is stored in.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionScript {
    pub module: &'static str,
    pub file: &'static str,
    pub source: &'static str,
}

pub const EXTENSIONS: [ExtensionScript; 3] = [
    ExtensionScript {
        module: KV_MODULE,
        file: "kv.js",
        source: include_str!("scripts/kv.js"),
    },
    ExtensionScript {
        module: SITES_MODULE,
        file: "sites.js",
        source: include_str!("scripts/sites.js"),
    },
    ExtensionScript {
        module: QUEUES_MODULE,
        file: "queues.js",
        source: include_str!("scripts/queues.js"),
    },
];
