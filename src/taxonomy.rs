//! Canonical taxonomy: the raw-label partition and its pure helpers.
//!
//! A [`CategoryMapping`] maps each canonical category to the set of raw
//! labels it subsumes. It is never mutated after the normalizer produces
//! it; consumers derive a raw → canonical lookup with [`invert`] on every
//! run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::models::ExtractionRecord;

/// Canonical category → raw labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMapping {
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

impl CategoryMapping {
    /// Add `raw` labels under `canonical`, merging with an existing group.
    pub fn insert_group<I, S>(&mut self, canonical: impl Into<String>, raw: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .entry(canonical.into())
            .or_default()
            .extend(raw.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Every raw label mentioned by any group.
    pub fn raw_labels(&self) -> BTreeSet<&str> {
        self.groups
            .values()
            .flat_map(|raws| raws.iter().map(String::as_str))
            .collect()
    }
}

/// What to do when one raw label is claimed by several canonical groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The group iterated last (greatest canonical name) wins.
    #[default]
    LastWins,
    /// Refuse the mapping.
    Reject,
}

/// A raw label claimed by more than one canonical group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collision {
    pub label: String,
    /// Claiming groups in iteration order; the last one wins the lookup.
    pub groups: Vec<String>,
}

impl Collision {
    pub fn winner(&self) -> &str {
        self.groups.last().map(String::as_str).unwrap_or_default()
    }
}

/// Raw → canonical lookup built from a mapping.
#[derive(Debug, Clone, Default)]
pub struct Inversion {
    pub lookup: HashMap<String, String>,
    pub collisions: Vec<Collision>,
}

impl Inversion {
    pub fn canonical_for(&self, raw: &str) -> Option<&str> {
        self.lookup.get(raw).map(String::as_str)
    }
}

/// Flatten a mapping into a raw → canonical lookup.
///
/// Groups are visited in canonical-name order; when a raw label appears in
/// several groups the later one overwrites the earlier and the clash is
/// recorded in [`Inversion::collisions`].
pub fn invert(mapping: &CategoryMapping) -> Inversion {
    let mut lookup = HashMap::new();
    let mut claims: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (canonical, raws) in &mapping.groups {
        for raw in raws {
            claims.entry(raw.as_str()).or_default().push(canonical.as_str());
            lookup.insert(raw.clone(), canonical.clone());
        }
    }

    let collisions = claims
        .into_iter()
        .filter(|(_, groups)| groups.len() > 1)
        .map(|(label, groups)| Collision {
            label: label.to_string(),
            groups: groups.into_iter().map(str::to_string).collect(),
        })
        .collect();

    Inversion { lookup, collisions }
}

/// Raw labels from every fragment of every non-unused record, duplicates
/// kept, in record order.
pub fn observed_labels(records: &[ExtractionRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.used_fragments().iter().map(|f| f.category.clone()))
        .collect()
}

/// Result of checking a mapping against the labels actually observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    /// Observed labels that no group claims.
    pub missing: Vec<String>,
    /// Labels the mapping claims that were never observed.
    pub unobserved: Vec<String>,
    pub collisions: Vec<Collision>,
}

impl CoverageReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn check_coverage(mapping: &CategoryMapping, observed: &[String]) -> CoverageReport {
    let claimed = mapping.raw_labels();
    let observed: BTreeSet<&str> = observed.iter().map(String::as_str).collect();

    CoverageReport {
        missing: observed
            .difference(&claimed)
            .map(|s| s.to_string())
            .collect(),
        unobserved: claimed
            .difference(&observed)
            .map(|s| s.to_string())
            .collect(),
        collisions: invert(mapping).collisions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fragment;

    fn mapping(groups: &[(&str, &[&str])]) -> CategoryMapping {
        let mut m = CategoryMapping::default();
        for (canonical, raws) in groups {
            m.insert_group(*canonical, raws.iter().copied());
        }
        m
    }

    #[test]
    fn invert_flattens_groups() {
        let m = mapping(&[
            ("Movies to Watch", &["Films to See", "Movies"]),
            ("Books to Read", &["Reading List"]),
        ]);
        let inv = invert(&m);
        assert_eq!(inv.canonical_for("Films to See"), Some("Movies to Watch"));
        assert_eq!(inv.canonical_for("Reading List"), Some("Books to Read"));
        assert_eq!(inv.canonical_for("Recipes"), None);
        assert!(inv.collisions.is_empty());
    }

    #[test]
    fn invert_later_group_wins_and_reports_collision() {
        let m = mapping(&[("Alpha", &["Shared"]), ("Beta", &["Shared", "Own"])]);
        let inv = invert(&m);
        assert_eq!(inv.canonical_for("Shared"), Some("Beta"));
        assert_eq!(inv.collisions.len(), 1);
        assert_eq!(inv.collisions[0].label, "Shared");
        assert_eq!(inv.collisions[0].groups, vec!["Alpha", "Beta"]);
        assert_eq!(inv.collisions[0].winner(), "Beta");
    }

    #[test]
    fn insert_group_merges_duplicate_canonicals() {
        let mut m = CategoryMapping::default();
        m.insert_group("Gift Ideas", ["Present Ideas"]);
        m.insert_group("Gift Ideas", ["Gift Ideas for Mom"]);
        assert_eq!(m.groups.len(), 1);
        assert_eq!(m.groups["Gift Ideas"].len(), 2);
    }

    #[test]
    fn observed_labels_skip_unused_and_keep_duplicates() {
        let records = vec![
            ExtractionRecord {
                note_id: 0,
                extractions: vec![
                    Fragment {
                        category: "Shopping".into(),
                        content: "milk".into(),
                    },
                    Fragment {
                        category: "Shopping".into(),
                        content: "eggs".into(),
                    },
                ],
                unused: false,
            },
            ExtractionRecord {
                note_id: 1,
                extractions: vec![],
                unused: true,
            },
        ];
        assert_eq!(observed_labels(&records), vec!["Shopping", "Shopping"]);
    }

    #[test]
    fn coverage_reports_missing_and_unobserved() {
        let m = mapping(&[("Movies to Watch", &["Movies", "Films"])]);
        let observed = vec!["Movies".to_string(), "Groceries".to_string()];
        let report = check_coverage(&m, &observed);
        assert!(!report.is_complete());
        assert_eq!(report.missing, vec!["Groceries"]);
        assert_eq!(report.unobserved, vec!["Films"]);
    }

    #[test]
    fn collision_policy_parses_snake_case() {
        #[derive(Deserialize)]
        struct Wrap {
            policy: CollisionPolicy,
        }
        let w: Wrap = toml::from_str("policy = \"reject\"").unwrap();
        assert_eq!(w.policy, CollisionPolicy::Reject);
        assert!(toml::from_str::<Wrap>("policy = \"first_wins\"").is_err());
    }
}
