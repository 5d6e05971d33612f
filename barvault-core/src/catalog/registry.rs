//! Reconcile the configured ticker list into the monitored-asset registry.

use super::AssetRegistry;
use crate::error::DataError;
use std::collections::BTreeSet;

/// What a sync changed. Per-asset failures are collected, not fatal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<(String, String)>,
    pub reactivated: Vec<(String, String)>,
    pub deactivated: Vec<(String, String)>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Add or reactivate every configured `(ticker, exchange)` and deactivate
/// active assets that are no longer configured.
///
/// `remove_orphans` asks for a hard delete, which is not supported: each
/// orphan is reported as an error and left untouched.
pub fn sync_registry(
    registry: &dyn AssetRegistry,
    configured: &[(String, String)],
    remove_orphans: bool,
) -> Result<SyncReport, DataError> {
    let mut report = SyncReport::default();
    let wanted: BTreeSet<(String, String)> = configured.iter().cloned().collect();

    for (ticker, exchange) in &wanted {
        match registry.get(ticker, exchange)? {
            None => {
                if registry.add(ticker, exchange)? {
                    report.added.push((ticker.clone(), exchange.clone()));
                }
            }
            Some(asset) if !asset.is_active() => {
                registry.reactivate(ticker, exchange)?;
                report.reactivated.push((ticker.clone(), exchange.clone()));
            }
            Some(_) => {}
        }
    }

    for asset in registry.list(true)? {
        let pair = (asset.ticker.clone(), asset.exchange.clone());
        if wanted.contains(&pair) {
            continue;
        }
        if remove_orphans {
            report.errors.push(format!(
                "{}/{}: hard delete not implemented",
                asset.ticker, asset.exchange
            ));
            continue;
        }
        registry.deactivate(&asset.ticker, &asset.exchange)?;
        report.deactivated.push(pair);
    }

    tracing::info!(
        added = report.added.len(),
        reactivated = report.reactivated.len(),
        deactivated = report.deactivated.len(),
        errors = report.errors.len(),
        "registry sync finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;

    fn pair(t: &str, e: &str) -> (String, String) {
        (t.to_string(), e.to_string())
    }

    #[test]
    fn adds_and_deactivates() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.add("dogeusd", "tiingo").unwrap();

        let report = sync_registry(
            &catalog,
            &[pair("btcusd", "tiingo"), pair("ethusd", "tiingo")],
            false,
        )
        .unwrap();

        assert_eq!(report.added.len(), 2);
        assert_eq!(report.deactivated, vec![pair("dogeusd", "tiingo")]);
        assert!(report.is_clean());
        assert!(!catalog.get("dogeusd", "tiingo").unwrap().unwrap().is_active());
    }

    #[test]
    fn reactivates_configured_inactive_asset() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.add("btcusd", "tiingo").unwrap();
        catalog.deactivate("btcusd", "tiingo").unwrap();

        let report = sync_registry(&catalog, &[pair("btcusd", "tiingo")], false).unwrap();
        assert_eq!(report.reactivated, vec![pair("btcusd", "tiingo")]);
        assert!(catalog.get("btcusd", "tiingo").unwrap().unwrap().is_active());
    }

    #[test]
    fn hard_delete_reports_error_and_keeps_asset() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.add("dogeusd", "tiingo").unwrap();

        let report = sync_registry(&catalog, &[], true).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("hard delete not implemented"));
        assert!(catalog.get("dogeusd", "tiingo").unwrap().unwrap().is_active());
    }

    #[test]
    fn second_sync_is_noop() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let configured = [pair("btcusd", "tiingo")];
        sync_registry(&catalog, &configured, false).unwrap();
        let report = sync_registry(&catalog, &configured, false).unwrap();
        assert_eq!(report, SyncReport::default());
    }
}
