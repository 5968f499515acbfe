//! In-memory wiki host described by the `[site]` section of the config file.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::SiteSection;
use crate::host::{
    Capabilities, Diagnostics, NamespaceResolver, RequestContext, SubcategorySource,
    TimestampNormalizer, TitleResolver,
};
use crate::normalize::to_db_key;
use crate::title::{Namespace, Title, capitalize_first, normalize_spaces, parse_title};

const MW_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const MAX_SUBCATEGORY_DEPTH: u8 = 2;

#[derive(Debug, Default)]
pub struct StaticSite {
    custom_namespaces: BTreeMap<String, i32>,
    categories: BTreeMap<String, Vec<String>>,
    request: BTreeMap<String, String>,
    capabilities: BTreeSet<String>,
    verbosity: Cell<Option<u8>>,
}

impl StaticSite {
    pub fn new(section: &SiteSection) -> Self {
        let mut site = Self::default();
        for namespace in &section.custom_namespaces {
            site.custom_namespaces
                .insert(namespace_key(&namespace.name), namespace.id);
        }
        for (parent, children) in &section.categories {
            site = site.with_subcategories(parent, children.iter().map(String::as_str));
        }
        for (key, value) in &section.request {
            site = site.with_request_value(key, value);
        }
        for capability in &section.capabilities {
            site = site.with_capability(capability);
        }
        site
    }

    pub fn with_custom_namespace(mut self, name: &str, id: i32) -> Self {
        self.custom_namespaces.insert(namespace_key(name), id);
        self
    }

    pub fn with_subcategories<'s>(
        mut self,
        parent: &str,
        children: impl IntoIterator<Item = &'s str>,
    ) -> Self {
        let entry = self.categories.entry(category_key(parent)).or_default();
        for child in children {
            let child = category_key(child);
            if !child.is_empty() && !entry.contains(&child) {
                entry.push(child);
            }
        }
        self
    }

    pub fn with_request_value(mut self, key: &str, value: &str) -> Self {
        self.request.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.insert(capability.trim().to_string());
        self
    }

    /// Last level passed to `set_verbosity`, if any.
    pub fn verbosity(&self) -> Option<u8> {
        self.verbosity.get()
    }

    fn direct_children(&self, category: &str) -> &[String] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn namespace_key(name: &str) -> String {
    normalize_spaces(&name.replace('_', " ")).to_lowercase()
}

fn category_key(name: &str) -> String {
    to_db_key(&capitalize_first(&normalize_spaces(&name.replace('_', " "))))
}

impl TitleResolver for StaticSite {
    fn resolve_title(&self, text: &str) -> Option<Title> {
        parse_title(text, |prefix| self.namespace_index(prefix))
    }
}

impl NamespaceResolver for StaticSite {
    fn namespace_index(&self, name: &str) -> Option<i32> {
        Namespace::from_name(name)
            .map(Namespace::id)
            .or_else(|| self.custom_namespaces.get(&namespace_key(name)).copied())
    }
}

impl SubcategorySource for StaticSite {
    fn subcategories_of(&self, category: &str, depth: u8) -> Vec<String> {
        let mut found = Vec::new();
        let mut frontier = vec![category_key(category)];
        for _ in 0..depth.min(MAX_SUBCATEGORY_DEPTH) {
            let mut next = Vec::new();
            for parent in &frontier {
                for child in self.direct_children(parent) {
                    if !found.contains(child) {
                        found.push(child.clone());
                        next.push(child.clone());
                    }
                }
            }
            frontier = next;
        }
        found
    }
}

impl TimestampNormalizer for StaticSite {
    fn normalize_timestamp(&self, text: &str) -> Option<String> {
        normalize_mw_timestamp(text)
    }
}

/// Accepts the 14-digit wiki form, RFC 3339, `YYYY-MM-DD[ HH:MM[:SS]]` and
/// bare `YYYYMMDD`, and renders them as `YYYYMMDDHHMMSS` in UTC. The `T`
/// and `Z` markers are matched case-insensitively.
pub fn normalize_mw_timestamp(text: &str) -> Option<String> {
    let text = text.trim().to_ascii_uppercase();
    let text = text.as_str();
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc().format(MW_TIMESTAMP_FORMAT).to_string());
    }
    for format in [
        MW_TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.format(MW_TIMESTAMP_FORMAT).to_string());
        }
    }
    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|parsed| parsed.format(MW_TIMESTAMP_FORMAT).to_string());
        }
    }
    None
}

impl RequestContext for StaticSite {
    fn request_value(&self, key: &str, default: &str) -> String {
        self.request
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

impl Capabilities for StaticSite {
    fn caller_has_capability(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }
}

impl Diagnostics for StaticSite {
    fn set_verbosity(&self, level: u8) {
        self.verbosity.set(Some(level));
    }
}
