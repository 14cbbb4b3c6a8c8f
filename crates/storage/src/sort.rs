//! External sort (`SORT key [BY pattern] [LIMIT off count] [GET pattern ...] [DESC] [ALPHA]`)
//!
//! Elements are weighted either by themselves or by the value a `BY`
//! pattern resolves to. Missing weights count as `0` (numeric) or `""`
//! (alpha). Equal weights fall back to comparing the elements, so the
//! result is deterministic.

use std::cmp::Ordering;
use tessera_core::{Error, Result};

use crate::command::SortSpec;
use crate::keyspace::{Entry, Keyspace};

const NOSORT: &str = "nosort";
const FIELD_SEPARATOR: &str = "->";

#[derive(Debug, Clone, PartialEq)]
enum Weight {
    Number(f64),
    Alpha(String),
}

impl Weight {
    fn compare(&self, other: &Weight) -> Ordering {
        match (self, other) {
            (Weight::Number(a), Weight::Number(b)) => a.total_cmp(b),
            (Weight::Alpha(a), Weight::Alpha(b)) => a.cmp(b),
            // Never mixed within one sort
            _ => Ordering::Equal,
        }
    }
}

fn weight_of(raw: Option<String>, alpha: bool) -> Result<Weight> {
    if alpha {
        return Ok(Weight::Alpha(raw.unwrap_or_default()));
    }
    match raw {
        None => Ok(Weight::Number(0.0)),
        Some(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| !f.is_nan())
            .map(Weight::Number)
            .ok_or_else(|| Error::Store {
                reason: "one or more scores can't be converted into double".to_string(),
            }),
    }
}

fn compare_elements(a: &str, b: &str, alpha: bool) -> Ordering {
    if !alpha {
        if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
            let ord = x.total_cmp(&y);
            if ord != Ordering::Equal {
                return ord;
            }
        }
    }
    a.cmp(b)
}

/// Resolve a `BY`/`GET` pattern for one element
///
/// Unreadable targets (missing key, other type) resolve to `None`.
pub(crate) fn lookup(ks: &Keyspace, pattern: &str, element: &str) -> Option<String> {
    let (key_pattern, field) = match pattern.split_once(FIELD_SEPARATOR) {
        Some((k, f)) if !f.is_empty() => (k, Some(f)),
        _ => (pattern, None),
    };
    let key = key_pattern.replacen('*', element, 1);
    match field {
        Some(field) => ks.hget(&key, field).ok().flatten(),
        None => ks.get(&key).ok().flatten(),
    }
}

pub(crate) fn sort(ks: &Keyspace, key: &str, spec: &SortSpec) -> Result<Vec<Option<String>>> {
    let mut elements: Vec<String> = match ks.entry(key) {
        None => Vec::new(),
        Some(Entry::Set(s)) => s.iter().cloned().collect(),
        Some(Entry::List(l)) => l.iter().cloned().collect(),
        Some(_) => {
            return Err(Error::WrongType {
                key: key.to_string(),
                expected: "set or list".to_string(),
            })
        }
    };

    if spec.by.as_deref() != Some(NOSORT) {
        let mut weighted = elements
            .into_iter()
            .map(|e| {
                let raw = match &spec.by {
                    Some(pattern) => lookup(ks, pattern, &e),
                    None => Some(e.clone()),
                };
                Ok((weight_of(raw, spec.alpha)?, e))
            })
            .collect::<Result<Vec<(Weight, String)>>>()?;

        weighted.sort_by(|(wa, a), (wb, b)| {
            wa.compare(wb)
                .then_with(|| compare_elements(a, b, spec.alpha))
        });
        if spec.descending {
            weighted.reverse();
        }
        elements = weighted.into_iter().map(|(_, e)| e).collect();
    }

    let elements: Vec<String> = match spec.limit {
        Some((offset, count)) => elements.into_iter().skip(offset).take(count).collect(),
        None => elements,
    };

    if spec.get.is_empty() {
        return Ok(elements.into_iter().map(Some).collect());
    }

    Ok(elements
        .iter()
        .flat_map(|e| {
            spec.get.iter().map(move |pattern| {
                if pattern == "#" {
                    Some(e.clone())
                } else {
                    lookup(ks, pattern, e)
                }
            })
        })
        .collect())
}
