//! Version gated persistence of resolved mappings.
//!
//! A record is only written after a scan that resolves every rule, and it is
//! only reused while the app version and the rule-set fingerprint both still
//! match. Anything else forces a fresh scan; a record that fails validation
//! is reset so the next attempt starts from a clean slate.

use std::collections::HashMap;

use anyhow::Result;

use crate::matcher::ResolutionMap;
use crate::rule::RuleSet;

pub const KEY_VERSION: &str = "adaptation_version";
pub const KEY_RULES_HASH: &str = "adaptation_rules_hash";
pub const KEY_MAPPING: &str = "adaptation_classes";

/// Minimal key-value persistence backing adaptation records.
pub trait KvStore {
    fn get(&self, key: &str, default: &str) -> String;
    fn set(&mut self, key: &str, value: &str);
}

/// In-memory store for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str, default: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }
}

/// Outcome of a version gated resolve.
#[derive(Clone, Debug)]
pub enum Adaptation {
    /// Valid record reused without scanning.
    Cached(ResolutionMap),
    /// Fresh scan resolved every rule; the record was persisted.
    Adapted(ResolutionMap),
    /// Fresh scan left rules unresolved; nothing was persisted.
    Failed {
        resolved: ResolutionMap,
        unmatched: Vec<String>,
    },
}

impl Adaptation {
    pub fn mapping(&self) -> &ResolutionMap {
        match self {
            Adaptation::Cached(mapping) | Adaptation::Adapted(mapping) => mapping,
            Adaptation::Failed { resolved, .. } => resolved,
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self, Adaptation::Failed { .. })
    }
}

/// Version gated cache around the structural scan.
///
/// Taking `&mut self` makes at most one resolve per cache value possible at
/// a time, which is exactly the concurrency guard the protocol asks for.
pub struct AdaptationCache<S: KvStore> {
    store: S,
}

impl<S: KvStore> AdaptationCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Return the cached mapping when it is still valid for `version` and
    /// `rules`; otherwise run `scan` and apply the persistence protocol.
    pub fn resolve(
        &mut self,
        rules: &RuleSet,
        version: i64,
        scan: impl FnOnce() -> Result<ResolutionMap>,
    ) -> Result<Adaptation> {
        let fingerprint = rules.fingerprint();
        if let Some(mapping) = self.load(rules, version, &fingerprint) {
            return Ok(Adaptation::Cached(mapping));
        }

        let mapping = scan()?;
        if mapping.len() == rules.len() {
            self.persist(version, &fingerprint, &mapping);
            return Ok(Adaptation::Adapted(mapping));
        }

        let unmatched = rules
            .iter()
            .filter(|rule| !mapping.contains_key(&rule.name))
            .map(|rule| rule.name.clone())
            .collect();
        Ok(Adaptation::Failed {
            resolved: mapping,
            unmatched,
        })
    }

    /// Reset the record to the unknown state.
    pub fn clear(&mut self) {
        self.store.set(KEY_VERSION, "0");
        self.store.set(KEY_RULES_HASH, "");
        self.store.set(KEY_MAPPING, "");
    }

    fn load(&mut self, rules: &RuleSet, version: i64, fingerprint: &str) -> Option<ResolutionMap> {
        let saved_version = self
            .store
            .get(KEY_VERSION, "0")
            .parse::<i64>()
            .unwrap_or(0);
        if saved_version == 0 || saved_version != version {
            return None;
        }
        if self.store.get(KEY_RULES_HASH, "") != fingerprint {
            return None;
        }
        let raw = self.store.get(KEY_MAPPING, "");
        match serde_json::from_str::<ResolutionMap>(&raw) {
            Ok(mapping) if mapping.len() == rules.len() => Some(mapping),
            // Undeserializable or wrong-sized records are reset, forcing a
            // full rescan now and on any retry.
            _ => {
                self.clear();
                None
            }
        }
    }

    fn persist(&mut self, version: i64, fingerprint: &str, mapping: &ResolutionMap) {
        let json = serde_json::to_string(mapping).expect("serialize resolution map");
        self.store.set(KEY_VERSION, &version.to_string());
        self.store.set(KEY_RULES_HASH, fingerprint);
        self.store.set(KEY_MAPPING, &json);
    }
}
