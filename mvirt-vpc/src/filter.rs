//! Generic filter evaluation.
//!
//! A filter with several values matches if any value matches; all filters of
//! one request must match. Each resource type provides its vocabulary through
//! [`Filterable::filter_values`], returning the entity's values for a filter
//! name, or `None` when the name is not part of the vocabulary.

use crate::model::tags::Tags;

/// One `Filter.N` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// What to do with a filter name outside a resource's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFilter {
    /// The entity does not match.
    NoMatch,
    /// The filter is ignored.
    Ignore,
}

pub trait Filterable {
    const UNKNOWN_FILTER: UnknownFilter = UnknownFilter::NoMatch;

    fn tags(&self) -> &Tags;

    fn filter_values(&self, name: &str) -> Option<Vec<String>>;
}

/// Single value helper for `filter_values` implementations.
pub fn one(value: impl ToString) -> Option<Vec<String>> {
    Some(vec![value.to_string()])
}

/// Optional value helper: absent values never match.
pub fn maybe(value: Option<impl ToString>) -> Option<Vec<String>> {
    Some(value.map(|v| v.to_string()).into_iter().collect())
}

/// Whether `entity` satisfies one filter.
pub fn matches<T: Filterable>(entity: &T, filter: &Filter) -> bool {
    if let Some(key) = filter.name.strip_prefix("tag:") {
        return entity
            .tags()
            .get(key)
            .is_some_and(|v| any_match(&filter.values, [v]));
    }
    match filter.name.as_str() {
        "tag-key" => any_match(&filter.values, entity.tags().iter().map(|t| t.key.as_str())),
        "tag-value" => any_match(&filter.values, entity.tags().iter().map(|t| t.value.as_str())),
        name => match entity.filter_values(name) {
            Some(values) => any_match(&filter.values, &values),
            None => T::UNKNOWN_FILTER == UnknownFilter::Ignore,
        },
    }
}

fn any_match<S: AsRef<str>>(patterns: &[String], candidates: impl IntoIterator<Item = S>) -> bool {
    candidates
        .into_iter()
        .any(|c| patterns.iter().any(|p| wildcard_match(p, c.as_ref())))
}

/// Whether `entity` satisfies every filter.
pub fn matches_all<T: Filterable>(entity: &T, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(entity, f))
}

/// Keep the entities matching all filters, preserving order.
pub fn apply<'a, T: Filterable + 'a>(
    items: impl IntoIterator<Item = &'a T>,
    filters: &[Filter],
) -> Vec<&'a T> {
    items
        .into_iter()
        .filter(|item| matches_all(*item, filters))
        .collect()
}

/// Match `text` against a pattern where `*` is any run and `?` one character.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    if !pattern.contains(['*', '?']) {
        return pattern == text;
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}
