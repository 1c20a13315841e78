//! In-memory lookup indexes built from store snapshots

use std::collections::HashMap;
use tracing::{debug, warn};

use super::names::{fold, name_keys, normalize_event_name};
use crate::models::rows::{StoredCircuit, StoredConstructor, StoredDriver};

/// Identity fields a source record carries for a driver
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverReference<'a> {
    pub external_ref: Option<&'a str>,
    pub acronym: Option<&'a str>,
    pub number: Option<i32>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
}

/// Key that maps to one id, or to several when the key is shared
#[derive(Debug, Default)]
struct MultiMap<K> {
    inner: HashMap<K, Vec<i64>>,
}

impl<K: std::hash::Hash + Eq> MultiMap<K> {
    fn insert(&mut self, key: K, id: i64) {
        let ids = self.inner.entry(key).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// The id for `key` when exactly one entity carries it
    fn unique<Q>(&self, key: &Q) -> Option<i64>
    where
        K: std::borrow::Borrow<Q>,
        Q: std::hash::Hash + Eq + ?Sized,
    {
        match self.inner.get(key).map(Vec::as_slice) {
            Some([id]) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DriverIndex {
    by_ref: HashMap<String, i64>,
    by_acronym: MultiMap<String>,
    by_number: MultiMap<i32>,
    by_name: MultiMap<String>,
}

impl DriverIndex {
    pub fn new(drivers: &[StoredDriver]) -> Self {
        let mut index = Self::default();
        for driver in drivers {
            if let Some(external_ref) = &driver.external_ref {
                index.by_ref.insert(external_ref.clone(), driver.id);
            }
            if let Some(acronym) = &driver.acronym {
                index.by_acronym.insert(acronym.clone(), driver.id);
            }
            if let Some(number) = driver.number {
                index.by_number.insert(number, driver.id);
            }
            for key in name_keys(&driver.first_name, &driver.last_name) {
                index.by_name.insert(key, driver.id);
            }
        }
        index
    }

    /// Resolve a driver reference to a stored driver id.
    ///
    /// The external ref and the acronym/number path must agree when both
    /// resolve. The name-key path is a last resort and is always logged.
    pub fn resolve(&self, reference: &DriverReference<'_>) -> Option<i64> {
        let by_ref = reference.external_ref.and_then(|r| self.by_ref.get(r).copied());
        let by_code = reference
            .acronym
            .and_then(|a| self.by_acronym.unique(a))
            .or_else(|| reference.number.and_then(|n| self.by_number.unique(&n)));

        match (by_ref, by_code) {
            (Some(a), Some(b)) if a != b => {
                warn!(
                    external_ref = ?reference.external_ref,
                    acronym = ?reference.acronym,
                    number = ?reference.number,
                    by_ref = a,
                    by_code = b,
                    "Driver identity paths disagree, leaving unmatched"
                );
                None
            },
            (Some(id), _) | (None, Some(id)) => Some(id),
            (None, None) => self.resolve_by_name(reference),
        }
    }

    fn resolve_by_name(&self, reference: &DriverReference<'_>) -> Option<i64> {
        let first = reference.first_name.unwrap_or_default();
        let last = reference.last_name.unwrap_or_default();
        let matched = name_keys(first, last)
            .into_iter()
            .find_map(|key| self.by_name.unique(key.as_str()).map(|id| (key, id)));

        match matched {
            Some((key, id)) => {
                warn!(first, last, key = %key, driver_id = id, "Driver matched by name only");
                Some(id)
            },
            None => {
                debug!(
                    external_ref = ?reference.external_ref,
                    acronym = ?reference.acronym,
                    "Driver not resolved"
                );
                None
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct ConstructorIndex {
    exact: HashMap<String, i64>,
    folded: MultiMap<String>,
}

impl ConstructorIndex {
    pub fn new(constructors: &[StoredConstructor]) -> Self {
        let mut index = Self::default();
        for constructor in constructors {
            index.exact.insert(constructor.name.clone(), constructor.id);
            index.folded.insert(constructor.name.trim().to_lowercase(), constructor.id);
        }
        index
    }

    /// Exact name, then case-insensitive name
    pub fn resolve(&self, name: &str) -> Option<i64> {
        self.exact
            .get(name)
            .copied()
            .or_else(|| self.folded.unique(name.trim().to_lowercase().as_str()))
    }
}

#[derive(Debug, Default)]
pub struct CircuitIndex {
    exact: HashMap<String, i64>,
    normalized: Vec<(String, i64)>,
}

impl CircuitIndex {
    pub fn new(circuits: &[StoredCircuit]) -> Self {
        Self {
            exact: circuits.iter().map(|c| (c.name.clone(), c.id)).collect(),
            normalized: circuits
                .iter()
                .map(|c| (normalize_event_name(&c.name), c.id))
                .collect(),
        }
    }

    /// Exact name, normalized name, then a logged substring match on the
    /// circuit's external id (`"red_bull_ring"` matches `"Red Bull Ring"`)
    pub fn resolve(&self, circuit_name: Option<&str>, circuit_ref: &str) -> Option<i64> {
        if let Some(name) = circuit_name {
            if let Some(id) = self.exact.get(name) {
                return Some(*id);
            }
            let wanted = normalize_event_name(name);
            if let Some((_, id)) = self.normalized.iter().find(|(n, _)| *n == wanted) {
                return Some(*id);
            }
        }

        let needle = fold(&circuit_ref.replace('_', " "));
        if needle.trim().is_empty() {
            return None;
        }
        let mut hits = self.normalized.iter().filter(|(n, _)| n.contains(needle.trim()));
        match (hits.next(), hits.next()) {
            (Some((name, id)), None) => {
                warn!(circuit_ref, matched = %name, circuit_id = id, "Circuit matched by substring");
                Some(*id)
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver(id: i64, external_ref: &str, acronym: Option<&str>, number: Option<i32>, first: &str, last: &str) -> StoredDriver {
        StoredDriver {
            id,
            external_ref: Some(external_ref.to_string()),
            acronym: acronym.map(str::to_string),
            number,
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    fn drivers() -> DriverIndex {
        DriverIndex::new(&[
            driver(1, "max_verstappen", Some("VER"), Some(33), "Max", "Verstappen"),
            driver(2, "perez", Some("PER"), Some(11), "Sergio", "Pérez"),
            driver(3, "michael_schumacher", Some("MSC"), None, "Michael", "Schumacher"),
            driver(4, "mick_schumacher", Some("MSC"), Some(47), "Mick", "Schumacher"),
        ])
    }

    #[test]
    fn test_resolve_by_ref_or_code() {
        let index = drivers();
        let by_ref = DriverReference {
            external_ref: Some("perez"),
            ..Default::default()
        };
        assert_eq!(index.resolve(&by_ref), Some(2));

        let by_acronym = DriverReference {
            acronym: Some("VER"),
            ..Default::default()
        };
        assert_eq!(index.resolve(&by_acronym), Some(1));

        let lowercase = DriverReference {
            acronym: Some("ver"),
            ..Default::default()
        };
        assert_eq!(index.resolve(&lowercase), None);
    }

    #[test]
    fn test_shared_acronym_falls_back_to_number() {
        let index = drivers();
        let reference = DriverReference {
            acronym: Some("MSC"),
            number: Some(47),
            ..Default::default()
        };
        assert_eq!(index.resolve(&reference), Some(4));
    }

    #[test]
    fn test_disagreeing_paths_are_unmatched() {
        let index = drivers();
        let reference = DriverReference {
            external_ref: Some("max_verstappen"),
            acronym: Some("PER"),
            ..Default::default()
        };
        assert_eq!(index.resolve(&reference), None);
    }

    #[test]
    fn test_name_fallback_folds_accents() {
        let index = drivers();
        let reference = DriverReference {
            first_name: Some("Sergio"),
            last_name: Some("Perez"),
            ..Default::default()
        };
        assert_eq!(index.resolve(&reference), Some(2));

        let ambiguous = DriverReference {
            last_name: Some("Schumacher"),
            ..Default::default()
        };
        assert_eq!(index.resolve(&ambiguous), None);
    }

    #[test]
    fn test_constructor_case_insensitive() {
        let index = ConstructorIndex::new(&[StoredConstructor {
            id: 9,
            name: "Red Bull".to_string(),
        }]);
        assert_eq!(index.resolve("Red Bull"), Some(9));
        assert_eq!(index.resolve("red bull"), Some(9));
        assert_eq!(index.resolve("Racing Bulls"), None);
    }

    #[test]
    fn test_circuit_resolution_paths() {
        let index = CircuitIndex::new(&[
            StoredCircuit {
                id: 1,
                name: "Autódromo José Carlos Pace".to_string(),
            },
            StoredCircuit {
                id: 2,
                name: "Red Bull Ring".to_string(),
            },
        ]);
        assert_eq!(index.resolve(Some("Red Bull Ring"), "x"), Some(2));
        assert_eq!(index.resolve(Some("Autodromo Jose Carlos Pace"), "interlagos"), Some(1));
        assert_eq!(index.resolve(None, "red_bull_ring"), Some(2));
        assert_eq!(index.resolve(None, "monza"), None);
    }
}
