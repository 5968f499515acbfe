//! The query specification a directive is folded into, and the structured
//! values it holds. Mutation is crate-private: once handed out, a
//! specification is read-only to the query and rendering stages.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::registry::ParameterRegistry;
use crate::title::Title;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PageRef {
    Title(Title),
    Name(String),
}

impl PageRef {
    pub fn as_text(&self) -> &str {
        match self {
            Self::Title(title) => &title.text,
            Self::Name(name) => name,
        }
    }
}

/// Category filter. Each `category=` line adds one group to either the AND or
/// the OR bucket; groups are combined with AND by the query stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorySelector {
    #[serde(rename = "AND", skip_serializing_if = "Vec::is_empty")]
    pub and: Vec<Vec<String>>,
    #[serde(rename = "OR", skip_serializing_if = "Vec::is_empty")]
    pub or: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regexp: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub like: Vec<String>,
}

impl CategorySelector {
    pub fn and_terms(&self) -> Vec<&str> {
        flatten_unique(&self.and)
    }

    pub fn or_terms(&self) -> Vec<&str> {
        flatten_unique(&self.or)
    }

    /// Number of category terms counted against the configured limits.
    pub fn term_count(&self) -> usize {
        self.and.iter().chain(&self.or).map(Vec::len).sum::<usize>()
            + self.regexp.len()
            + self.like.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_count() == 0
    }
}

fn flatten_unique(groups: &[Vec<String>]) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    groups
        .iter()
        .flatten()
        .map(String::as_str)
        .filter(|term| seen.insert(*term))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TitleSelector {
    #[serde(rename = "=", skip_serializing_if = "Vec::is_empty")]
    pub exact: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regexp: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub like: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Distinct {
    Off,
    On,
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenReferences {
    No,
    Yes,
    Missing,
}

impl OpenReferences {
    pub fn is_enabled(self) -> bool {
        self != Self::No
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
    PageGroups(Vec<Vec<PageRef>>),
    Namespaces(BTreeSet<i32>),
    Categories(CategorySelector),
    Titles(TitleSelector),
    Flags(BTreeMap<String, bool>),
    Distinct(Distinct),
    OpenReferences(OpenReferences),
}

impl ParamValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySpecification {
    values: BTreeMap<String, ParamValue>,
    selection_criteria_found: bool,
    open_references_conflict: bool,
    processed_parameters: BTreeSet<String>,
}

impl QuerySpecification {
    /// Fresh specification seeded with the registry defaults.
    pub fn new(registry: &ParameterRegistry) -> Self {
        let mut spec = Self::default();
        for descriptor in registry.descriptors() {
            if let Some(default) = descriptor.seeded_default() {
                spec.values
                    .insert(descriptor.name.to_string(), default.clone());
            }
        }
        spec
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn all_values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    pub fn is_selection_criteria_found(&self) -> bool {
        self.selection_criteria_found
    }

    pub fn is_open_references_conflict(&self) -> bool {
        self.open_references_conflict
    }

    pub fn processed_parameters(&self) -> &BTreeSet<String> {
        &self.processed_parameters
    }

    /// True when the directive named the parameter, as opposed to defaulting it.
    pub fn was_specified(&self, name: &str) -> bool {
        self.processed_parameters.contains(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Boolean parameters that were never set read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ParamValue::Bool(true)))
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(ParamValue::List(items)) => Some(items),
            _ => None,
        }
    }

    pub fn page_groups(&self, name: &str) -> Option<&[Vec<PageRef>]> {
        match self.values.get(name) {
            Some(ParamValue::PageGroups(groups)) => Some(groups),
            _ => None,
        }
    }

    pub fn namespaces(&self, name: &str) -> Option<&BTreeSet<i32>> {
        match self.values.get(name) {
            Some(ParamValue::Namespaces(ids)) => Some(ids),
            _ => None,
        }
    }

    pub fn categories(&self, name: &str) -> Option<&CategorySelector> {
        match self.values.get(name) {
            Some(ParamValue::Categories(selector)) => Some(selector),
            _ => None,
        }
    }

    pub fn titles(&self, name: &str) -> Option<&TitleSelector> {
        match self.values.get(name) {
            Some(ParamValue::Titles(selector)) => Some(selector),
            _ => None,
        }
    }

    pub fn flag_set(&self, name: &str) -> Option<&BTreeMap<String, bool>> {
        match self.values.get(name) {
            Some(ParamValue::Flags(flags)) => Some(flags),
            _ => None,
        }
    }

    pub fn distinct(&self) -> Distinct {
        match self.values.get("distinct") {
            Some(ParamValue::Distinct(value)) => *value,
            _ => Distinct::On,
        }
    }

    pub fn open_references(&self) -> OpenReferences {
        match self.values.get("openreferences") {
            Some(ParamValue::OpenReferences(value)) => *value,
            _ => OpenReferences::No,
        }
    }

    /// Category terms across the inclusion and exclusion selectors.
    pub fn total_category_count(&self) -> usize {
        ["category", "notcategory"]
            .into_iter()
            .filter_map(|name| self.categories(name))
            .map(CategorySelector::term_count)
            .sum()
    }

    pub(crate) fn set(&mut self, name: &str, value: ParamValue) {
        self.values.insert(name.to_string(), value);
    }

    pub(crate) fn mark_processed(&mut self, name: &str) {
        self.processed_parameters.insert(name.to_string());
    }

    pub(crate) fn set_selection_criteria_found(&mut self) {
        self.selection_criteria_found = true;
    }

    pub(crate) fn set_open_references_conflict(&mut self) {
        self.open_references_conflict = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_terms_flatten_without_duplicates() {
        let selector = CategorySelector {
            or: vec![
                vec!["Animals".to_string(), "Plants".to_string()],
                vec!["Plants".to_string(), "Minerals".to_string()],
            ],
            ..CategorySelector::default()
        };
        assert_eq!(selector.or_terms(), vec!["Animals", "Plants", "Minerals"]);
        assert!(selector.and_terms().is_empty());
        assert_eq!(selector.term_count(), 4);
    }

    #[test]
    fn typed_accessors_ignore_mismatched_values() {
        let mut spec = QuerySpecification::default();
        spec.set("count", ParamValue::Int(5));
        spec.set("mode", ParamValue::text("inline"));
        assert_eq!(spec.integer("count"), Some(5));
        assert_eq!(spec.text("count"), None);
        assert_eq!(spec.text("mode"), Some("inline"));
        assert!(!spec.flag("mode"));
        assert!(!spec.flag("never-set"));
    }

    #[test]
    fn specified_parameters_are_tracked_separately_from_values() {
        let mut spec = QuerySpecification::default();
        spec.set("order", ParamValue::text("ascending"));
        assert!(!spec.was_specified("order"));
        spec.mark_processed("order");
        assert!(spec.was_specified("order"));
        assert!(!spec.was_specified("mode"));
    }

    #[test]
    fn serializes_selectors_with_wiki_bucket_names() {
        let selector = CategorySelector {
            and: vec![vec!["A".to_string(), "B".to_string()]],
            ..CategorySelector::default()
        };
        let json = serde_json::to_value(&selector).expect("serialize");
        assert_eq!(json, serde_json::json!({ "AND": [["A", "B"]] }));
    }
}
