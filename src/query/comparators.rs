//! Attribute comparators: the `@<name>:<param>` strategies used in queries.
//!
//! Each comparator is a `filter` predicate plus a `compare` ordering. Tokens
//! are validated when the query is parsed; `compare` on values that already
//! passed `filter` cannot fail.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use semver::Version;

use super::QueryError;

/// Sort direction for `@num`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NumOrder {
    Biggest,
    Smallest,
}

/// Sort direction for `@date`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DateOrder {
    Latest,
    Earliest,
}

/// Selection rule for `@semver`: plain newest/oldest, or a range (which
/// always sorts newest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemverSpec {
    Newest,
    Oldest,
    /// `^X.Y.Z`: at least the version, below the next major.
    Caret(Version),
    /// `~X.Y.Z`: at least the version, below the next minor.
    Tilde(Version),
    /// `>X.Y.Z`.
    Greater(Version),
    /// `<X.Y.Z`.
    Less(Version),
}

/// A parsed, validated comparator expression.
#[derive(Debug, Clone)]
pub enum Comparator {
    Num(NumOrder),
    Date(DateOrder),
    Semver { spec: SemverSpec, allow_prerelease: bool },
    Glob(glob::Pattern),
    Regex(regex::Regex),
}

const NUM_HELP: &str = "Compares numbers, e.g. @num:biggest or @num:smallest";
const DATE_HELP: &str = "Compares dates, e.g. @date:latest or @date:earliest";
const SEMVER_HELP: &str = "Compares semver versions, e.g. @semver:newest or @semver:oldest or \
    @semver:'^1.1.0' or @semver:'~1.1.0' or @semver:'>1.1.0' or @semver:'<1.1.0'. \
    Add `,prerelease` (like so: @semver:newest,prerelease) to allow prerelease versions \
    (like 1.2.3-alpha)";
const GLOB_HELP: &str = "Filters by glob, e.g. @glob:x86* or @glob:mips??32 or @glob:armv[67]*";
const REGEX_HELP: &str = "Filters by regex, e.g. @regex:i386|x86_64 or @regex:^v1.[01234]$";

fn parse_version(value: &str) -> Option<Version> {
    Version::parse(value.strip_prefix('v').unwrap_or(value)).ok()
}

/// Accepts the formats `datetime.fromisoformat` historically let through:
/// RFC-3339, naive datetimes with `T` or space separators, and bare dates.
fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(parsed);
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return parsed.and_hms_opt(0, 0, 0);
    }
    None
}

impl Comparator {
    /// Parses a full `@<name>:<param>` attribute value.
    pub fn parse(token: &str) -> Result<Comparator, QueryError> {
        let Some((name, param)) = token.split_once(':') else {
            return Err(QueryError::InvalidComparator(format!(
                "comparator is missing a parameter: {token:?}"
            )));
        };

        match name {
            "@num" => match param {
                "biggest" => Ok(Comparator::Num(NumOrder::Biggest)),
                "smallest" => Ok(Comparator::Num(NumOrder::Smallest)),
                _ => Err(QueryError::InvalidComparator(format!(
                    "invalid comparator parameter {param:?}: {NUM_HELP}"
                ))),
            },
            "@date" => match param {
                "latest" => Ok(Comparator::Date(DateOrder::Latest)),
                "earliest" => Ok(Comparator::Date(DateOrder::Earliest)),
                _ => Err(QueryError::InvalidComparator(format!(
                    "invalid comparator parameter {param:?}: {DATE_HELP}"
                ))),
            },
            "@semver" => {
                let (order, flag) = match param.split_once(',') {
                    Some((order, flag)) => (order, flag),
                    None => (param, ""),
                };
                let allow_prerelease = match flag {
                    "" => false,
                    "prerelease" => true,
                    _ => {
                        return Err(QueryError::InvalidComparator(format!(
                            "invalid comparator parameter {param:?}: {SEMVER_HELP}"
                        )))
                    }
                };
                let spec = match order {
                    "newest" => SemverSpec::Newest,
                    "oldest" => SemverSpec::Oldest,
                    _ => {
                        let make: fn(Version) -> SemverSpec = match order.chars().next() {
                            Some('^') => SemverSpec::Caret,
                            Some('~') => SemverSpec::Tilde,
                            Some('>') => SemverSpec::Greater,
                            Some('<') => SemverSpec::Less,
                            _ => {
                                return Err(QueryError::InvalidComparator(format!(
                                    "invalid comparator parameter {param:?}: {SEMVER_HELP}"
                                )))
                            }
                        };
                        let version = parse_version(&order[1..]).ok_or_else(|| {
                            QueryError::InvalidComparator(format!(
                                "invalid version in comparator {param:?}: {SEMVER_HELP}"
                            ))
                        })?;
                        make(version)
                    }
                };
                Ok(Comparator::Semver { spec, allow_prerelease })
            }
            "@glob" => glob::Pattern::new(param)
                .map(Comparator::Glob)
                .map_err(|err| {
                    QueryError::InvalidComparator(format!("invalid glob {param:?} ({err}): {GLOB_HELP}"))
                }),
            "@regex" => regex::Regex::new(param)
                .map(Comparator::Regex)
                .map_err(|err| {
                    QueryError::InvalidComparator(format!(
                        "invalid regex {param:?} ({err}): {REGEX_HELP}"
                    ))
                }),
            _ => Err(QueryError::InvalidComparator(format!("unknown comparator: {name:?}"))),
        }
    }

    /// Whether a candidate attribute value participates in the comparison.
    pub fn filter(&self, value: &str) -> bool {
        match self {
            Comparator::Num(_) => value.parse::<f64>().is_ok(),
            Comparator::Date(_) => parse_datetime(value).is_some(),
            Comparator::Semver { spec, allow_prerelease } => {
                let Some(version) = parse_version(value) else {
                    return false;
                };
                if !allow_prerelease && !version.pre.is_empty() {
                    return false;
                }
                match spec {
                    SemverSpec::Newest | SemverSpec::Oldest => true,
                    SemverSpec::Caret(low) => {
                        let high = Version::new(low.major + 1, 0, 0);
                        *low <= version && version < high
                    }
                    SemverSpec::Tilde(low) => {
                        let high = Version::new(low.major, low.minor + 1, 0);
                        *low <= version && version < high
                    }
                    SemverSpec::Greater(low) => version > *low,
                    SemverSpec::Less(high) => version < *high,
                }
            }
            Comparator::Glob(pattern) => pattern.matches(value),
            Comparator::Regex(regex) => {
                regex.find(value).map_or(false, |found| found.start() == 0)
            }
        }
    }

    /// Orders two filtered values; `Less` means `a` wins over `b`.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Comparator::Num(order) => {
                let (a, b) = match (a.parse::<f64>(), b.parse::<f64>()) {
                    (Ok(a), Ok(b)) => (a, b),
                    _ => return Ordering::Equal,
                };
                let ascending = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                match order {
                    NumOrder::Biggest => ascending.reverse(),
                    NumOrder::Smallest => ascending,
                }
            }
            Comparator::Date(order) => {
                let (a, b) = match (parse_datetime(a), parse_datetime(b)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ordering::Equal,
                };
                match order {
                    DateOrder::Latest => a.cmp(&b).reverse(),
                    DateOrder::Earliest => a.cmp(&b),
                }
            }
            Comparator::Semver { spec, .. } => {
                let (a, b) = match (parse_version(a), parse_version(b)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Ordering::Equal,
                };
                match spec {
                    SemverSpec::Oldest => a.cmp(&b),
                    _ => a.cmp(&b).reverse(),
                }
            }
            Comparator::Glob(_) | Comparator::Regex(_) => Ordering::Equal,
        }
    }
}
