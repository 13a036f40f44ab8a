//! Versioned element catalog.
//!
//! The catalog is owned by the executor and exposed read-only elsewhere.
//! It is a pure value: invalidation drops it, rebuild replaces it.

pub mod builder;
pub mod model;
pub mod version;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::browser::BrowserPort;
use crate::errors::AgentResult;

pub use builder::{build_catalog, current_version, structural_fingerprint};
pub use model::{BBox, Catalog, CatalogEntry, EntryState, Section};

/// Holder for the current catalog snapshot.
#[derive(Default)]
pub struct CatalogService {
    current: RwLock<Option<Arc<Catalog>>>,
}

impl CatalogService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot, if one has been built and not invalidated.
    pub fn snapshot(&self) -> Option<Arc<Catalog>> {
        self.current.read().clone()
    }

    pub fn invalidate(&self) {
        *self.current.write() = None;
    }

    /// Rebuild from the live page and install the result.
    pub async fn rebuild(&self, port: &dyn BrowserPort) -> AgentResult<Arc<Catalog>> {
        let catalog = Arc::new(builder::build_catalog(port).await?);
        *self.current.write() = Some(catalog.clone());
        Ok(catalog)
    }

    /// Snapshot if its version still matches the live page; rebuilds
    /// otherwise.
    pub async fn ensure_fresh(&self, port: &dyn BrowserPort) -> AgentResult<Arc<Catalog>> {
        if let Some(snapshot) = self.snapshot() {
            if let Ok(live) = builder::current_version(port).await {
                if live == snapshot.version {
                    return Ok(snapshot);
                }
            }
        }
        self.rebuild(port).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StubBrowser;
    use serde_json::json;

    #[tokio::test]
    async fn ensure_fresh_reuses_matching_snapshot() {
        let stub = StubBrowser::new();
        let service = CatalogService::new();
        let first = service.ensure_fresh(&stub).await.unwrap();
        let second = service.ensure_fresh(&stub).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn ensure_fresh_rebuilds_on_version_drift() {
        let stub = StubBrowser::new();
        let service = CatalogService::new();
        let first = service.ensure_fresh(&stub).await.unwrap();

        stub.set_catalog_payload(json!({
            "url": "https://example.com/changed",
            "viewport": [1280, 900],
            "nodes": [],
        }));
        let second = service.ensure_fresh(&stub).await.unwrap();
        assert_ne!(first.version, second.version);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn invalidate_drops_snapshot() {
        let stub = StubBrowser::new();
        let service = CatalogService::new();
        service.ensure_fresh(&stub).await.unwrap();
        service.invalidate();
        assert!(service.snapshot().is_none());
    }
}
