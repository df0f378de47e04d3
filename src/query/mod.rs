//! Attribute query engine: exact filters plus comparator-based selection
//! with grouping and tie-break semantics.
//!
//! Callers hand in every candidate of the requested type (refreshed from the
//! remote first); [`select`] returns the matching artifacts or explains why
//! the query is ambiguous.

pub mod comparators;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::artifact::ArtifactMetadata;
use comparators::Comparator;

/// Attributes that never participate in grouping: unique per artifact by
/// construction, grouping by them would make every candidate its own group.
const INTRINSIC_UNGROUPED: [&str; 3] = ["name", "description", "pubdate"];

/// Errors from query classification and comparator selection.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    InvalidComparator(String),
    #[error("cannot compare by more than one attribute: {0:?} and {1:?}")]
    MultipleCompared(String, String),
    #[error("{0}")]
    AmbiguousComparison(String),
    #[error("{0}")]
    InvalidDirective(String),
}

enum Classified {
    Plain {
        filters: Vec<(String, String)>,
    },
    Compared {
        filters: Vec<(String, String)>,
        compared_key: String,
        comparator: Comparator,
        ignored: BTreeSet<String>,
        ignore_all_groups: bool,
    },
}

/// Splits query attributes into exact filters, the (single) compared
/// attribute, and grouping directives.
fn classify(attr: &BTreeMap<String, String>) -> Result<Classified, QueryError> {
    let mut filters = Vec::new();
    let mut compared: Option<(String, Comparator)> = None;
    let mut ignored = BTreeSet::new();
    let mut ignore_all_groups = false;

    for (key, value) in attr {
        if key == "@any" {
            if value == "@ignore" {
                ignore_all_groups = true;
            } else {
                return Err(QueryError::InvalidDirective(format!(
                    "the only valid value for @any is @ignore, got {value:?}"
                )));
            }
        } else if key.starts_with('@') {
            return Err(QueryError::InvalidDirective(format!(
                "unknown query directive: {key:?}"
            )));
        } else if value == "@ignore" {
            ignored.insert(key.clone());
        } else if value.starts_with('@') {
            let comparator = Comparator::parse(value)?;
            if let Some((existing, _)) = &compared {
                return Err(QueryError::MultipleCompared(existing.clone(), key.clone()));
            }
            compared = Some((key.clone(), comparator));
        } else {
            filters.push((key.clone(), value.clone()));
        }
    }

    Ok(match compared {
        Some((compared_key, comparator)) => Classified::Compared {
            filters,
            compared_key,
            comparator,
            ignored,
            ignore_all_groups,
        },
        // `@ignore` entries without a compared attribute only relax grouping,
        // and without a comparison there is no grouping to relax.
        None => Classified::Plain { filters },
    })
}

/// Runs a query's attribute portion over the candidates of its type.
pub fn select(
    candidates: Vec<ArtifactMetadata>,
    attr: &BTreeMap<String, String>,
) -> Result<Vec<ArtifactMetadata>, QueryError> {
    match classify(attr)? {
        Classified::Plain { filters } => Ok(candidates
            .into_iter()
            .filter(|candidate| {
                let attrs = candidate.combined_attrs();
                filters.iter().all(|(key, value)| attrs.get(key) == Some(value))
            })
            .collect()),
        Classified::Compared { filters, compared_key, comparator, ignored, ignore_all_groups } => {
            select_compared(candidates, filters, &compared_key, &comparator, &ignored, ignore_all_groups)
        }
    }
}

fn select_compared(
    candidates: Vec<ArtifactMetadata>,
    filters: Vec<(String, String)>,
    compared_key: &str,
    comparator: &Comparator,
    ignored: &BTreeSet<String>,
    ignore_all_groups: bool,
) -> Result<Vec<ArtifactMetadata>, QueryError> {
    // Exact filters first, then the comparator's own filter predicate.
    let mut pool: Vec<(ArtifactMetadata, BTreeMap<String, String>)> = Vec::new();
    for candidate in candidates {
        let attrs = candidate.combined_attrs();
        if !filters.iter().all(|(key, value)| attrs.get(key) == Some(value)) {
            continue;
        }
        let Some(value) = attrs.get(compared_key) else {
            continue;
        };
        if !comparator.filter(value) {
            continue;
        }
        pool.push((candidate, attrs));
    }

    // Grouping attributes: everything observed on the candidates except the
    // intrinsic per-artifact fields, the filtered keys, the ignored keys and
    // the compared key itself.
    let mut grouping: BTreeSet<String> = BTreeSet::new();
    if !ignore_all_groups {
        for (_, attrs) in &pool {
            grouping.extend(attrs.keys().cloned());
        }
        for intrinsic in INTRINSIC_UNGROUPED {
            grouping.remove(intrinsic);
        }
        for (key, _) in &filters {
            grouping.remove(key);
        }
        for key in ignored {
            grouping.remove(key);
        }
        grouping.remove(compared_key);
    }

    // Partition by the grouping-attribute tuple, keeping the compared value.
    let mut groups: BTreeMap<Vec<Option<String>>, Vec<(ArtifactMetadata, String)>> =
        BTreeMap::new();
    for (candidate, attrs) in pool {
        let group_key: Vec<Option<String>> =
            grouping.iter().map(|key| attrs.get(key).cloned()).collect();
        let value = attrs
            .get(compared_key)
            .cloned()
            .unwrap_or_default();
        groups.entry(group_key).or_default().push((candidate, value));
    }

    for members in groups.values_mut() {
        members.sort_by(|(_, a), (_, b)| comparator.compare(a, b));
    }

    // With several groups, all winners must agree under the comparator;
    // otherwise the query has no single answer and the caller must ignore
    // the distinguishing attributes explicitly.
    let winners: Vec<(&Vec<Option<String>>, &str)> = groups
        .iter()
        .filter_map(|(key, members)| members.first().map(|(_, value)| (key, value.as_str())))
        .collect();
    if let Some(((first_key, first_value), rest)) = winners.split_first() {
        for (other_key, other_value) in rest {
            if comparator.compare(first_value, other_value) != Ordering::Equal {
                let differing: Vec<&str> = grouping
                    .iter()
                    .zip(first_key.iter().zip(other_key.iter()))
                    .filter(|(_, (a, b))| a != b)
                    .map(|(name, _)| name.as_str())
                    .collect();
                return Err(QueryError::AmbiguousComparison(format!(
                    "comparison of {compared_key:?} is ambiguous: both {first_value:?} and \
                     {other_value:?} win within their group of artifacts; if an attribute \
                     should not split the candidates, ignore it with -a <attr>=@ignore \
                     (groups differ on: {})",
                    differing.join(", "),
                )));
            }
        }
    }

    // Emit each group's best plus anything tied with it.
    let mut selected = Vec::new();
    for (_, members) in groups {
        let Some((_, best_value)) = members.first() else {
            continue;
        };
        let best_value = best_value.clone();
        for (candidate, value) in members {
            if comparator.compare(&value, &best_value) == Ordering::Equal {
                selected.push(candidate);
            } else {
                break;
            }
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::DateTime;

    use super::{select, QueryError};
    use crate::artifact::{ArtifactMetadata, PathKind};

    fn artifact(attrs: &[(&str, &str)]) -> ArtifactMetadata {
        ArtifactMetadata {
            name: "dummy.txt".to_string(),
            description: String::new(),
            pubdate: DateTime::parse_from_rfc3339("2022-05-01T12:00:00+00:00").unwrap(),
            artifact_type: "foo".to_string(),
            attributes: attrs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            env: BTreeMap::new(),
            path_type: PathKind::File,
            path_hash: None,
            path_location: None,
            mutable_attributes: BTreeMap::new(),
            mutable_env: BTreeMap::new(),
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn plain_filter_matches_exactly() {
        let candidates = vec![
            artifact(&[("arch", "x86_64")]),
            artifact(&[("arch", "arm64")]),
        ];
        let selected = select(candidates, &attrs(&[("arch", "x86_64")])).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].attributes["arch"], "x86_64");
    }

    #[test]
    fn empty_filter_matches_everything() {
        let candidates = vec![artifact(&[("a", "1")]), artifact(&[("a", "2")])];
        assert_eq!(select(candidates, &BTreeMap::new()).unwrap().len(), 2);
    }

    #[test]
    fn semver_selection_scenarios() {
        let versions = ["1.0.0", "1.0.1", "1.0.1-alpha", "1.1.0", "1.2.0", "1.3.0-alpha", "2.0.0"];
        let candidates: Vec<_> =
            versions.iter().map(|version| artifact(&[("attr", version)])).collect();

        let selected =
            select(candidates.clone(), &attrs(&[("attr", "@semver:^1.0.0")])).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].attributes["attr"], "1.2.0");

        let selected =
            select(candidates.clone(), &attrs(&[("attr", "@semver:~1.0.0")])).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].attributes["attr"], "1.0.1");

        let selected = select(candidates, &attrs(&[("attr", "@semver:newest")])).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].attributes["attr"], "2.0.0");
    }

    #[test]
    fn conflicting_groups_raise_ambiguous_comparison() {
        let candidates: Vec<_> = (0..5)
            .map(|i| artifact(&[("a", &i.to_string()), ("b", &(i % 2).to_string())]))
            .collect();

        let err = select(candidates.clone(), &attrs(&[("a", "@num:biggest")])).unwrap_err();
        match err {
            QueryError::AmbiguousComparison(message) => {
                assert!(message.contains("\"4\""), "missing first winner: {message}");
                assert!(message.contains("\"3\""), "missing second winner: {message}");
                assert!(message.contains("@ignore"), "missing suggestion: {message}");
            }
            other => panic!("expected AmbiguousComparison, got {other:?}"),
        }

        let selected = select(
            candidates,
            &attrs(&[("a", "@num:biggest"), ("b", "@ignore")]),
        )
        .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].attributes["a"], "4");
    }

    #[test]
    fn any_ignore_drops_grouping() {
        let candidates: Vec<_> = (0..5)
            .map(|i| artifact(&[("a", &i.to_string()), ("b", &(i % 2).to_string())]))
            .collect();
        let selected = select(
            candidates,
            &attrs(&[("a", "@num:biggest"), ("@any", "@ignore")]),
        )
        .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].attributes["a"], "4");
    }

    #[test]
    fn consistent_groups_each_emit_their_best() {
        // Both groups share the same best value, so no ambiguity: the tied
        // best of each group is returned.
        let candidates = vec![
            artifact(&[("a", "5"), ("b", "0")]),
            artifact(&[("a", "5"), ("b", "1")]),
            artifact(&[("a", "1"), ("b", "1")]),
        ];
        let selected = select(candidates, &attrs(&[("a", "@num:biggest")])).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn glob_emits_all_matches() {
        let candidates = vec![
            artifact(&[("arch", "x86_64")]),
            artifact(&[("arch", "x86")]),
            artifact(&[("arch", "arm64")]),
        ];
        let selected =
            select(candidates, &attrs(&[("arch", "@glob:x86*"), ("@any", "@ignore")])).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn multiple_compared_attributes_rejected() {
        let candidates = vec![artifact(&[("a", "1"), ("b", "2")])];
        let err = select(
            candidates,
            &attrs(&[("a", "@num:biggest"), ("b", "@num:smallest")]),
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::MultipleCompared(..)));
    }

    #[test]
    fn missing_compared_attribute_excludes_candidate() {
        let candidates = vec![artifact(&[("a", "1")]), artifact(&[("other", "x")])];
        let selected = select(candidates, &attrs(&[("a", "@num:biggest")])).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn filter_and_comparator_combine() {
        let candidates = vec![
            artifact(&[("arch", "x86_64"), ("v", "1.0.0")]),
            artifact(&[("arch", "x86_64"), ("v", "2.0.0")]),
            artifact(&[("arch", "arm64"), ("v", "9.0.0")]),
        ];
        let selected = select(
            candidates,
            &attrs(&[("arch", "x86_64"), ("v", "@semver:newest")]),
        )
        .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].attributes["v"], "2.0.0");
    }
}
