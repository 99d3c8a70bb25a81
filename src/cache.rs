//! Insight caching and per-cycle dismissals on top of a pluggable key-value
//! store.
//!
//! Entries are keyed `insights:{userId}:{cycleId}` and dismissal flags
//! `dismissed:{userId}:{cycleId}:{itemId}`, where the cycle id is the
//! `YYYY-MM` month of generation.

use crate::error::{BudgetError, Result};
use crate::insights::{build_insights, InsightMetrics, InsightPayload};
use crate::utils::cycle_id;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const INSIGHT_PREFIX: &str = "insights";
const DISMISSED_PREFIX: &str = "dismissed";
const KEY_SEPARATOR: char = ':';

pub fn insight_key(user_id: &str, cycle_id: &str) -> String {
    format!("{}:{}:{}", INSIGHT_PREFIX, user_id, cycle_id)
}

pub fn dismissal_key(user_id: &str, cycle_id: &str, item_id: &str) -> String {
    format!("{}:{}:{}:{}", DISMISSED_PREFIX, user_id, cycle_id, item_id)
}

/// Persistence collaborator. Reads and writes are assumed reliable per key
/// with no transactional guarantees across keys.
pub trait InsightStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: String) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryInsightStore {
    entries: BTreeMap<String, String>,
}

impl MemoryInsightStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl InsightStore for MemoryInsightStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InsightCacheConfig {
    /// Age after which a cached entry is regenerated even if metrics match.
    pub ttl_seconds: i64,
    /// Entries kept after pruning, across all users.
    pub max_entries: usize,
}

impl Default for InsightCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            max_entries: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRecord {
    pub signature: String,
    pub generated_at: DateTime<Utc>,
    pub payload: InsightPayload,
}

/// In-memory mirror in front of an [`InsightStore`].
pub struct InsightCache<S: InsightStore> {
    store: S,
    mirror: HashMap<String, InsightRecord>,
    config: InsightCacheConfig,
}

impl<S: InsightStore> InsightCache<S> {
    pub fn new(store: S, config: InsightCacheConfig) -> Self {
        Self {
            store,
            mirror: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &InsightCacheConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Looks up a record, falling through to the store on a mirror miss.
    /// A payload that fails to parse is logged and reported as absent.
    pub fn get(&mut self, key: &str) -> Result<Option<InsightRecord>> {
        if let Some(record) = self.mirror.get(key) {
            return Ok(Some(record.clone()));
        }

        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<InsightRecord>(&raw) {
            Ok(record) => {
                self.mirror.insert(key.to_string(), record.clone());
                Ok(Some(record))
            }
            Err(e) => {
                warn!("Ignoring corrupt insight cache entry '{}': {}", key, e);
                Ok(None)
            }
        }
    }

    /// Writes through to the store, then prunes.
    pub fn set(&mut self, key: &str, record: InsightRecord) -> Result<()> {
        let raw = serde_json::to_string(&record)?;
        self.store.set(key, raw)?;
        self.mirror.insert(key.to_string(), record);
        self.prune()?;
        Ok(())
    }

    /// Keeps the `max_entries` most recently generated insight entries and
    /// removes the rest, corrupt entries first. Dismissal flags are untouched.
    /// Returns the number of entries removed.
    pub fn prune(&mut self) -> Result<usize> {
        let prefix = format!("{}:", INSIGHT_PREFIX);
        let mut entries: Vec<(String, Option<DateTime<Utc>>)> = Vec::new();

        for key in self.store.keys()? {
            if !key.starts_with(&prefix) {
                continue;
            }
            let generated_at = match self.mirror.get(&key) {
                Some(record) => Some(record.generated_at),
                None => self
                    .store
                    .get(&key)?
                    .and_then(|raw| serde_json::from_str::<InsightRecord>(&raw).ok())
                    .map(|record| record.generated_at),
            };
            entries.push((key, generated_at));
        }

        if entries.len() <= self.config.max_entries {
            return Ok(0);
        }

        // Newest first; `None` sorts last so corrupt entries go before any valid one.
        entries.sort_by(|a, b| b.1.cmp(&a.1));

        let mut removed = 0;
        for (key, _) in entries.into_iter().skip(self.config.max_entries) {
            self.store.remove(&key)?;
            self.mirror.remove(&key);
            removed += 1;
        }

        debug!(
            "Pruned {} insight cache entries (keeping {})",
            removed, self.config.max_entries
        );
        Ok(removed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightResponse {
    pub payload: InsightPayload,
    /// Whether the payload came from the cache rather than being regenerated.
    pub cached: bool,
    pub cycle_id: String,
    pub generated_at: DateTime<Utc>,
    pub signature: String,
}

/// Insight generation with caching and dismissal tracking. Construct one per
/// process and share it by reference.
pub struct InsightService<S: InsightStore> {
    cache: InsightCache<S>,
}

impl<S: InsightStore> InsightService<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, InsightCacheConfig::default())
    }

    pub fn with_config(store: S, config: InsightCacheConfig) -> Self {
        Self {
            cache: InsightCache::new(store, config),
        }
    }

    pub fn cache(&self) -> &InsightCache<S> {
        &self.cache
    }

    /// Returns insights for `user_id` in the month of `now`.
    ///
    /// The cached payload is reused unless `force_refresh` is set, the metrics
    /// signature changed, or the entry is older than the configured TTL.
    pub fn get_insights(
        &mut self,
        user_id: &str,
        metrics: &InsightMetrics,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<InsightResponse> {
        let user_id = require_user_id(user_id)?;
        let cycle = cycle_id(now);
        let key = insight_key(user_id, &cycle);
        let signature = metrics.signature()?;

        if !force_refresh {
            if let Some(record) = self.cache.get(&key)? {
                let age = now.signed_duration_since(record.generated_at).num_seconds();
                if record.signature == signature && age < self.cache.config().ttl_seconds {
                    debug!("Insight cache hit for '{}' ({}s old)", key, age);
                    return Ok(InsightResponse {
                        payload: record.payload,
                        cached: true,
                        cycle_id: cycle,
                        generated_at: record.generated_at,
                        signature,
                    });
                }
                debug!("Insight cache entry for '{}' is stale", key);
            } else {
                debug!("Insight cache miss for '{}'", key);
            }
        }

        info!(
            "Generating insights for user '{}' in cycle {}{}",
            user_id,
            cycle,
            if force_refresh { " (forced)" } else { "" }
        );

        let payload = build_insights(metrics);
        let record = InsightRecord {
            signature: signature.clone(),
            generated_at: now,
            payload: payload.clone(),
        };
        self.cache.set(&key, record)?;

        Ok(InsightResponse {
            payload,
            cached: false,
            cycle_id: cycle,
            generated_at: now,
            signature,
        })
    }

    /// [`Self::get_insights`] at the current time.
    pub fn get_ai_insights(
        &mut self,
        user_id: &str,
        metrics: &InsightMetrics,
        force_refresh: bool,
    ) -> Result<InsightResponse> {
        self.get_insights(user_id, metrics, force_refresh, Utc::now())
    }

    /// Like [`Self::get_insights`], with the user's dismissed items removed
    /// from the payload.
    pub fn get_visible_insights(
        &mut self,
        user_id: &str,
        metrics: &InsightMetrics,
        force_refresh: bool,
        now: DateTime<Utc>,
    ) -> Result<InsightResponse> {
        let mut response = self.get_insights(user_id, metrics, force_refresh, now)?;
        let dismissed = self.dismissed_items(user_id, &response.cycle_id)?;
        response.payload = response.payload.without_dismissed(&dismissed);
        Ok(response)
    }

    pub fn dismiss_item(&mut self, user_id: &str, cycle_id: &str, item_id: &str) -> Result<()> {
        let user_id = require_user_id(user_id)?;
        debug!("Dismissing '{}' for user '{}' in {}", item_id, user_id, cycle_id);
        self.cache
            .store_mut()
            .set(&dismissal_key(user_id, cycle_id, item_id), "true".to_string())
    }

    pub fn restore_item(&mut self, user_id: &str, cycle_id: &str, item_id: &str) -> Result<()> {
        let user_id = require_user_id(user_id)?;
        self.cache
            .store_mut()
            .remove(&dismissal_key(user_id, cycle_id, item_id))
    }

    pub fn dismissed_items(&self, user_id: &str, cycle_id: &str) -> Result<HashSet<String>> {
        let user_id = require_user_id(user_id)?;
        let prefix = dismissal_key(user_id, cycle_id, "");
        Ok(self
            .cache
            .store()
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .filter(|item_id| !item_id.is_empty())
            .collect())
    }
}

fn require_user_id(user_id: &str) -> Result<&str> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        Err(BudgetError::UserIdRequired)
    } else if trimmed.contains(KEY_SEPARATOR) {
        Err(BudgetError::InvalidUserId(trimmed.to_string()))
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn metrics() -> InsightMetrics {
        InsightMetrics {
            total_income: 4500.0,
            total_expenses: 1520.0,
            balance: 2980.0,
            savings_rate: 66.22,
            expenses_by_category: BTreeMap::from([
                ("Rent".to_string(), 700.0),
                ("Groceries".to_string(), 520.0),
                ("Transport".to_string(), 300.0),
            ]),
            top_expense_category: Some("Rent".to_string()),
            last_7_days: 300.0,
            previous_7_days: 520.0,
            transaction_count: 3,
            avg_transaction_amount: 2006.67,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_second_call_is_cached_and_identical() {
        let mut service = InsightService::new(MemoryInsightStore::new());

        let first = service.get_insights("user-1", &metrics(), false, at(10, 9)).unwrap();
        assert!(!first.cached);
        assert_eq!(first.cycle_id, "2025-03");

        let second = service
            .get_insights("user-1", &metrics(), false, at(10, 9) + Duration::minutes(30))
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.generated_at, first.generated_at);
        assert_eq!(
            serde_json::to_string(&first.payload).unwrap(),
            serde_json::to_string(&second.payload).unwrap()
        );
    }

    #[test]
    fn test_regenerates_after_ttl() {
        let mut service = InsightService::new(MemoryInsightStore::new());
        service.get_insights("user-1", &metrics(), false, at(10, 9)).unwrap();

        let later = service
            .get_insights("user-1", &metrics(), false, at(10, 10))
            .unwrap();
        assert!(!later.cached);
        assert_eq!(later.generated_at, at(10, 10));
    }

    #[test]
    fn test_regenerates_on_signature_change_or_force() {
        let mut service = InsightService::new(MemoryInsightStore::new());
        service.get_insights("user-1", &metrics(), false, at(10, 9)).unwrap();

        let mut changed = metrics();
        changed.total_expenses = 1600.0;
        let response = service.get_insights("user-1", &changed, false, at(10, 9)).unwrap();
        assert!(!response.cached);

        let rounding_only = InsightMetrics {
            total_expenses: 1600.001,
            ..changed.clone()
        };
        let response = service
            .get_insights("user-1", &rounding_only, false, at(10, 9))
            .unwrap();
        assert!(response.cached);

        let forced = service.get_insights("user-1", &changed, true, at(10, 9)).unwrap();
        assert!(!forced.cached);
    }

    #[test]
    fn test_cache_is_scoped_by_user_and_cycle() {
        let mut service = InsightService::new(MemoryInsightStore::new());
        service.get_insights("user-1", &metrics(), false, at(31, 23)).unwrap();

        let other_user = service.get_insights("user-2", &metrics(), false, at(31, 23)).unwrap();
        assert!(!other_user.cached);

        let next_month = service
            .get_insights("user-1", &metrics(), false, at(31, 23) + Duration::minutes(90))
            .unwrap();
        assert_eq!(next_month.cycle_id, "2025-04");
        assert!(!next_month.cached);
    }

    #[test]
    fn test_user_id_is_required() {
        let mut service = InsightService::new(MemoryInsightStore::new());
        let result = service.get_insights("  ", &metrics(), false, at(10, 9));
        assert!(matches!(result, Err(BudgetError::UserIdRequired)));
        assert!(service.dismiss_item("", "2025-03", "x").is_err());
    }

    #[test]
    fn test_user_id_cannot_contain_key_separator() {
        let mut service = InsightService::new(MemoryInsightStore::new());
        service.dismiss_item("alice", "2025-03:x", "tip").unwrap();

        assert!(matches!(
            service.dismissed_items("alice:2025-03", "x"),
            Err(BudgetError::InvalidUserId(_))
        ));
        assert!(matches!(
            service.get_insights("bob:2025-03", &metrics(), false, at(10, 9)),
            Err(BudgetError::InvalidUserId(_))
        ));
        assert!(service.dismiss_item("a:b", "2025-03", "tip").is_err());
    }

    #[test]
    fn test_corrupt_entry_is_treated_as_miss() {
        let mut store = MemoryInsightStore::new();
        store
            .set(&insight_key("user-1", "2025-03"), "{not json".to_string())
            .unwrap();

        let mut service = InsightService::new(store);
        let response = service.get_insights("user-1", &metrics(), false, at(10, 9)).unwrap();
        assert!(!response.cached);

        let again = service.get_insights("user-1", &metrics(), false, at(10, 9)).unwrap();
        assert!(again.cached);
    }

    #[test]
    fn test_prune_keeps_newest_entries() {
        let config = InsightCacheConfig {
            ttl_seconds: 3600,
            max_entries: 3,
        };
        let mut service = InsightService::with_config(MemoryInsightStore::new(), config);
        service.dismiss_item("user-0", "2025-03", "keep-me").unwrap();

        for i in 0..5 {
            service
                .get_insights(&format!("user-{}", i), &metrics(), false, at(1 + i, 9))
                .unwrap();
        }

        let keys = service.cache().store().keys().unwrap();
        let insight_keys: Vec<&String> = keys
            .iter()
            .filter(|k| k.starts_with("insights:"))
            .collect();
        assert_eq!(insight_keys.len(), 3);
        assert!(!keys.contains(&insight_key("user-0", "2025-03")));
        assert!(!keys.contains(&insight_key("user-1", "2025-03")));
        assert!(keys.contains(&insight_key("user-4", "2025-03")));
        assert!(keys.contains(&dismissal_key("user-0", "2025-03", "keep-me")));
    }

    #[test]
    fn test_prune_removes_corrupt_entries_first() {
        let mut store = MemoryInsightStore::new();
        store.set("insights:ghost:2025-03", "garbage".to_string()).unwrap();

        let config = InsightCacheConfig {
            ttl_seconds: 3600,
            max_entries: 1,
        };
        let mut service = InsightService::with_config(store, config);
        service.get_insights("user-1", &metrics(), false, at(10, 9)).unwrap();

        let keys = service.cache().store().keys().unwrap();
        assert_eq!(keys, vec![insight_key("user-1", "2025-03")]);
    }

    #[test]
    fn test_dismissals_filter_visible_payload() {
        let mut service = InsightService::new(MemoryInsightStore::new());
        let full = service.get_insights("user-1", &metrics(), false, at(10, 9)).unwrap();
        let tip = full.payload.savings_tips[0].id.clone();

        service.dismiss_item("user-1", "2025-03", &tip).unwrap();
        service.dismiss_item("user-1", "2025-02", "old-item").unwrap();
        service.dismiss_item("user-2", "2025-03", "someone-else").unwrap();

        let dismissed = service.dismissed_items("user-1", "2025-03").unwrap();
        assert_eq!(dismissed, HashSet::from([tip.clone()]));

        let visible = service
            .get_visible_insights("user-1", &metrics(), false, at(10, 9))
            .unwrap();
        assert!(visible.cached);
        assert!(!visible.payload.item_ids().contains(&tip.as_str()));
        assert_eq!(
            visible.payload.savings_tips.len(),
            full.payload.savings_tips.len() - 1
        );

        service.restore_item("user-1", "2025-03", &tip).unwrap();
        assert!(service.dismissed_items("user-1", "2025-03").unwrap().is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config: InsightCacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, InsightCacheConfig::default());
        assert_eq!(config.ttl_seconds, 3600);
        assert_eq!(config.max_entries, 10);
    }
}
