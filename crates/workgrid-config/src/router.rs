//! Route table consumed by the internal router worker.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One host claimed by a worker service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub host: String,
    pub paths: Vec<String>,
    /// Service (and router binding) name of the target worker.
    pub service: String,
    /// Display name of the target worker, for logs.
    pub worker_name: String,
}

/// Serialized into the router's `__meta` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterMeta {
    pub id: String,
    pub routes: Vec<RouteEntry>,
}

impl RouterMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            routes: Vec::new(),
        }
    }

    pub fn push(&mut self, route: RouteEntry) {
        self.routes.push(route);
    }

    /// Distinct services referenced by the route table.
    pub fn services(&self) -> BTreeSet<&str> {
        self.routes.iter().map(|r| r.service.as_str()).collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "routes": self.routes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(host: &str, service: &str) -> RouteEntry {
        RouteEntry {
            host: host.to_string(),
            paths: vec!["/".to_string()],
            service: service.to_string(),
            worker_name: service.to_uppercase(),
        }
    }

    #[test]
    fn json_shape() {
        let mut meta = RouterMeta::new("node-1");
        meta.push(route("a.example.com", "a1"));
        let json = meta.to_json();
        assert_eq!(json["id"], "node-1");
        assert_eq!(json["routes"][0]["host"], "a.example.com");
        assert_eq!(json["routes"][0]["worker_name"], "A1");
        assert_eq!(json["routes"][0]["paths"], serde_json::json!(["/"]));
    }

    #[test]
    fn services_are_deduplicated() {
        let mut meta = RouterMeta::new("node-1");
        meta.push(route("a.example.com", "a1"));
        meta.push(route("www.a.example.com", "a1"));
        meta.push(route("b.example.com", "b2"));
        assert_eq!(meta.services().into_iter().collect::<Vec<_>>(), vec!["a1", "b2"]);
    }
}
