//! Selector resolution.
//!
//! Walks the rung ladder until an element is located, then waits for
//! readiness: visible, attached, enabled, not readonly, and bounding-box
//! stable for 100 ms. `index=N` targets resolve through the catalog and
//! surface `CATALOG_OUTDATED` on version drift instead of silently
//! re-resolving.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::browser::BrowserPort;
use crate::catalog::{self, CatalogService};
use crate::config::Config;
use crate::dsl::{Selector, Strategy};
use crate::errors::{AgentError, AgentResult};

use super::strategies::{ladder_for, mark_script, Rung};

/// Outcome of a successful resolution: a concrete CSS handle for the
/// tagged element plus provenance.
#[derive(Clone, Debug)]
pub struct ResolvedTarget {
    pub css: String,
    pub strategy: String,
    pub rungs_tried: u32,
}

pub struct SelectorResolver {
    port: Arc<dyn BrowserPort>,
    catalog: Arc<CatalogService>,
    config: Arc<Config>,
}

impl SelectorResolver {
    pub fn new(
        port: Arc<dyn BrowserPort>,
        catalog: Arc<CatalogService>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            port,
            catalog,
            config,
        }
    }

    #[instrument(skip(self), fields(selector = %selector))]
    pub async fn resolve(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> AgentResult<ResolvedTarget> {
        let rungs = match selector.strategy() {
            Strategy::Index(n) => self.rungs_from_catalog(*n).await?,
            _ => ladder_for(selector),
        };
        if rungs.is_empty() {
            return Err(AgentError::validation(format!(
                "selector expands to no strategies: {selector}"
            )));
        }
        self.resolve_ladder(&rungs, timeout).await
    }

    pub async fn exists(&self, selector: &Selector, timeout: Duration) -> AgentResult<bool> {
        match self.resolve(selector, timeout).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind == crate::errors::ErrorKind::ElementNotFound => Ok(false),
            Err(err) if err.kind == crate::errors::ErrorKind::ElementNotInteractable => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Catalog-backed rungs for `index=N`. Version drift is surfaced, not
    /// repaired: the planner's intent may have gone stale with the page.
    async fn rungs_from_catalog(&self, index: usize) -> AgentResult<Vec<Rung>> {
        let snapshot = match self.catalog.snapshot() {
            Some(snapshot) => snapshot,
            None => {
                return Err(AgentError::catalog_outdated(
                    "no element catalog has been built for this page",
                ))
            }
        };

        let live = catalog::current_version(self.port.as_ref()).await?;
        if live != snapshot.version {
            if self.config.relocate_on_stale {
                warn!(index, "catalog stale; relocating against a fresh build");
                let fresh = self.catalog.rebuild(self.port.as_ref()).await?;
                return entry_rungs(&fresh, index);
            }
            return Err(AgentError::catalog_outdated(format!(
                "catalog version {} no longer matches page ({})",
                snapshot.version, live
            )));
        }
        entry_rungs(&snapshot, index)
    }

    async fn resolve_ladder(
        &self,
        rungs: &[Rung],
        timeout: Duration,
    ) -> AgentResult<ResolvedTarget> {
        let deadline = Instant::now() + timeout;
        let token = format!("pp-{}", Uuid::new_v4().simple());
        let mut tried = 0u32;
        let mut pass = 0u32;

        loop {
            for rung in rungs {
                tried += 1;
                let marked = self.try_mark(rung, &token).await;
                match marked {
                    Ok(count) if count > 0 => {
                        if count > 1 {
                            debug!(rung = %rung.describe(), count, "multiple matches; tie-broken");
                        }
                        let css = format!("[data-pp-el=\"{token}\"]");
                        self.await_readiness(&css, deadline).await?;
                        return Ok(ResolvedTarget {
                            css,
                            strategy: rung.describe(),
                            rungs_tried: tried,
                        });
                    }
                    Ok(_) => {}
                    Err(err) => debug!(rung = %rung.describe(), %err, "rung failed"),
                }
            }
            pass += 1;
            if Instant::now() >= deadline || pass > self.config.locator_retries {
                return Err(AgentError::element_not_found(format!(
                    "no strategy matched after {tried} attempts"
                )));
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }

    async fn try_mark(&self, rung: &Rung, token: &str) -> AgentResult<usize> {
        let script = mark_script(rung, token);
        let value = self.port.eval(&script).await?;
        let found = value
            .get("found")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !found {
            return Ok(0);
        }
        Ok(value
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(1) as usize)
    }

    /// Readiness: visible, enabled, not readonly, and bounding box stable
    /// across two reads 100 ms apart. Inline checks, no fixed sleeps
    /// beyond the stability interval itself.
    async fn await_readiness(&self, css: &str, deadline: Instant) -> AgentResult<()> {
        let mut previous_bbox: Option<Vec<f64>> = None;
        loop {
            let report = self.read_readiness(css).await?;
            let found = report
                .get("found")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !found {
                return Err(AgentError::element_not_found(
                    "element detached during readiness wait",
                ));
            }
            let visible = report
                .get("visible")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let enabled = report
                .get("enabled")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            let readonly = report
                .get("readonly")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let bbox: Option<Vec<f64>> = report
                .get("bbox")
                .and_then(|b| serde_json::from_value(b.clone()).ok());

            if visible && enabled && !readonly {
                if let (Some(prev), Some(now)) = (&previous_bbox, &bbox) {
                    if prev == now {
                        return Ok(());
                    }
                }
                previous_bbox = bbox;
            } else {
                previous_bbox = None;
            }

            if Instant::now() >= deadline {
                return Err(AgentError::not_interactable(format!(
                    "element never became ready (visible={visible}, enabled={enabled}, readonly={readonly})"
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn read_readiness(&self, css: &str) -> AgentResult<Value> {
        let args = json!({ "css": css });
        let css_js = serde_json::to_string(css).unwrap_or_default();
        let script = format!(
            r#"/*pp:ready*/ /*args:{args}*/ (() => {{
  const el = document.querySelector({css_js});
  if (!el) return {{ found: false }};
  const st = getComputedStyle(el);
  const r = el.getBoundingClientRect();
  return {{
    found: true,
    visible: st.visibility !== 'hidden' && st.display !== 'none' &&
      parseFloat(st.opacity) !== 0 && r.width > 0 && r.height > 0,
    enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
    readonly: !!el.readOnly,
    bbox: [r.left, r.top, r.width, r.height],
  }};
}})()"#
        );
        self.port.eval(&script).await
    }
}

fn entry_rungs(catalog: &crate::catalog::Catalog, index: usize) -> AgentResult<Vec<Rung>> {
    let entry = catalog.entry(index).ok_or_else(|| {
        AgentError::element_not_found(format!(
            "catalog has {} entries; index {} is out of range",
            catalog.len(),
            index
        ))
    })?;
    let mut rungs = Vec::new();
    for selector in std::iter::once(&entry.primary).chain(entry.fallbacks.iter()) {
        rungs.extend(ladder_for(selector));
    }
    rungs.dedup();
    Ok(rungs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::StubBrowser;
    use crate::errors::ErrorKind;

    fn resolver_with(stub: Arc<StubBrowser>, config: Config) -> (SelectorResolver, Arc<CatalogService>) {
        let catalog = Arc::new(CatalogService::new());
        (
            SelectorResolver::new(stub, catalog.clone(), Arc::new(config)),
            catalog,
        )
    }

    #[tokio::test]
    async fn resolves_css_on_first_rung() {
        let stub = Arc::new(StubBrowser::new());
        let (resolver, _) = resolver_with(stub.clone(), Config::default());
        let sel = Selector::css("#go");
        let target = resolver
            .resolve(&sel, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(target.css.starts_with("[data-pp-el=\"pp-"));
        assert_eq!(target.strategy, "css=#go");
        assert_eq!(target.rungs_tried, 1);
    }

    #[tokio::test]
    async fn escalates_when_primary_misses() {
        let stub = Arc::new(StubBrowser::new());
        // First rung misses, second rung hits.
        stub.queue_eval("resolve", json!({"found": false, "count": 0}));
        let (resolver, _) = resolver_with(stub.clone(), Config::default());
        let sel = Selector::parse("aria-label=Close").unwrap();
        let target = resolver
            .resolve(&sel, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(target.strategy, "text=Close");
        assert_eq!(target.rungs_tried, 2);
    }

    #[tokio::test]
    async fn index_without_catalog_is_outdated() {
        let stub = Arc::new(StubBrowser::new());
        let (resolver, _) = resolver_with(stub.clone(), Config::default());
        let err = resolver
            .resolve(&Selector::index(0), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CatalogOutdated);
    }

    #[tokio::test]
    async fn index_with_version_drift_is_outdated() {
        let stub = Arc::new(StubBrowser::new());
        let (resolver, catalog) = resolver_with(stub.clone(), Config::default());
        catalog.rebuild(stub.as_ref()).await.unwrap();

        // The page moves on under the catalog.
        stub.set_digest_payload(json!({
            "url": "https://example.com/changed",
            "tokens": ["div|button|x|0"],
            "viewport": [1280, 900],
        }));
        let err = resolver
            .resolve(&Selector::index(0), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CatalogOutdated);
    }

    #[tokio::test]
    async fn index_in_range_resolves_through_entry_ladder() {
        let stub = Arc::new(StubBrowser::new());
        let (resolver, catalog) = resolver_with(stub.clone(), Config::default());
        catalog.rebuild(stub.as_ref()).await.unwrap();
        let target = resolver
            .resolve(&Selector::index(0), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(target.css.contains("data-pp-el"));
    }

    #[tokio::test]
    async fn index_out_of_range_is_not_found() {
        let stub = Arc::new(StubBrowser::new());
        let (resolver, catalog) = resolver_with(stub.clone(), Config::default());
        catalog.rebuild(stub.as_ref()).await.unwrap();
        let err = resolver
            .resolve(&Selector::index(99), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ElementNotFound);
    }

    #[tokio::test]
    async fn relocate_on_stale_rebuilds_instead() {
        let stub = Arc::new(StubBrowser::new());
        let config = Config {
            relocate_on_stale: true,
            ..Config::default()
        };
        let (resolver, catalog) = resolver_with(stub.clone(), config);
        catalog.rebuild(stub.as_ref()).await.unwrap();
        stub.set_digest_payload(json!({
            "url": "https://example.com/changed",
            "tokens": ["a|link|home-link|0"],
            "viewport": [1280, 900],
        }));
        let target = resolver
            .resolve(&Selector::index(0), Duration::from_secs(1))
            .await;
        assert!(target.is_ok());
    }

    #[tokio::test]
    async fn exists_maps_not_found_to_false() {
        let stub = Arc::new(StubBrowser::new());
        let config = Config {
            locator_retries: 0,
            ..Config::default()
        };
        let (resolver, _) = resolver_with(stub.clone(), config);
        stub.queue_eval("resolve", json!({"found": false, "count": 0}));
        let exists = resolver
            .exists(&Selector::css("#missing"), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!exists);
    }
}
