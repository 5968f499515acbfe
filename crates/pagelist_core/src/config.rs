use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FUNCTIONAL_RICHNESS: u8 = 3;
pub const DEFAULT_MAX_CATEGORY_COUNT: usize = 4;
pub const DEFAULT_MAX_RESULT_COUNT: i64 = 500;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PagelistConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub site: SiteSection,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnknownParameterPolicy {
    #[default]
    Warn,
    Abort,
}

impl UnknownParameterPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "warn" => Some(Self::Warn),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub functional_richness: u8,
    pub max_category_count: usize,
    pub min_category_count: usize,
    pub allow_unlimited_categories: bool,
    pub max_result_count: i64,
    pub allow_unlimited_results: bool,
    pub allowed_namespaces: Option<Vec<String>>,
    pub unknown_parameters: UnknownParameterPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            functional_richness: DEFAULT_FUNCTIONAL_RICHNESS,
            max_category_count: DEFAULT_MAX_CATEGORY_COUNT,
            min_category_count: 0,
            allow_unlimited_categories: false,
            max_result_count: DEFAULT_MAX_RESULT_COUNT,
            allow_unlimited_results: false,
            allowed_namespaces: None,
            unknown_parameters: UnknownParameterPolicy::Warn,
        }
    }
}

impl EngineConfig {
    /// Apply `PAGELIST_*` environment overrides: env > config > default.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = read("PAGELIST_FUNCTIONAL_RICHNESS") {
            let level: u8 = value
                .parse()
                .with_context(|| format!("invalid PAGELIST_FUNCTIONAL_RICHNESS `{value}`"))?;
            if level > 4 {
                bail!("PAGELIST_FUNCTIONAL_RICHNESS must be between 0 and 4, got {level}");
            }
            self.functional_richness = level;
        }
        if let Some(value) = read("PAGELIST_MAX_RESULT_COUNT") {
            self.max_result_count = value
                .parse()
                .with_context(|| format!("invalid PAGELIST_MAX_RESULT_COUNT `{value}`"))?;
        }
        if let Some(value) = read("PAGELIST_UNKNOWN_PARAMETERS") {
            self.unknown_parameters = UnknownParameterPolicy::parse(&value).with_context(|| {
                format!("PAGELIST_UNKNOWN_PARAMETERS must be `warn` or `abort`, got `{value}`")
            })?;
        }
        Ok(())
    }

    /// Clamp a requested result count to the configured ceiling.
    pub fn clamp_result_count(&self, count: i64) -> i64 {
        if self.allow_unlimited_results {
            count
        } else {
            count.min(self.max_result_count)
        }
    }

    pub fn namespace_allowed(&self, name: &str) -> bool {
        match &self.allowed_namespaces {
            None => true,
            Some(allowed) => allowed
                .iter()
                .any(|candidate| candidate.trim().eq_ignore_ascii_case(name.trim())),
        }
    }
}

/// Description of the wiki a directive runs against. Consumed by
/// `site::StaticSite`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    #[serde(default)]
    pub custom_namespaces: Vec<CustomNamespace>,
    /// Parent category name to its direct subcategories.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub request: BTreeMap<String, String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomNamespace {
    pub name: String,
    pub id: i32,
}

/// Load and parse a PagelistConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<PagelistConfig> {
    if !config_path.exists() {
        return Ok(PagelistConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: PagelistConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    if parsed.engine.functional_richness > 4 {
        bail!(
            "functional_richness must be between 0 and 4 in {}",
            config_path.display()
        );
    }
    for namespace in &parsed.site.custom_namespaces {
        if namespace.name.trim().is_empty() {
            bail!("custom namespace name cannot be empty");
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_engine_config_matches_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.functional_richness, 3);
        assert_eq!(config.max_category_count, 4);
        assert_eq!(config.min_category_count, 0);
        assert_eq!(config.max_result_count, 500);
        assert!(!config.allow_unlimited_results);
        assert!(config.allowed_namespaces.is_none());
        assert_eq!(config.unknown_parameters, UnknownParameterPolicy::Warn);
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/pagelist.toml")).expect("load config");
        assert_eq!(config, PagelistConfig::default());
    }

    #[test]
    fn load_config_parses_engine_and_site_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("pagelist.toml");
        fs::write(
            &config_path,
            r#"
[engine]
functional_richness = 4
max_result_count = 50
allowed_namespaces = ["", "Help"]
unknown_parameters = "abort"

[site]
capabilities = ["dpl_param_update_rules"]

[[site.custom_namespaces]]
name = "Lore"
id = 3000

[site.categories]
Animals = ["Mammals", "Birds"]
Mammals = ["Cats"]

[site.request]
DPL_count = "5"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.engine.functional_richness, 4);
        assert_eq!(config.engine.max_result_count, 50);
        assert_eq!(config.engine.max_category_count, 4);
        assert_eq!(config.engine.unknown_parameters, UnknownParameterPolicy::Abort);
        assert_eq!(config.site.custom_namespaces[0].id, 3000);
        assert_eq!(config.site.categories["Animals"], vec!["Mammals", "Birds"]);
        assert_eq!(config.site.request["DPL_count"], "5");
        assert_eq!(config.site.capabilities, vec!["dpl_param_update_rules"]);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("pagelist.toml");
        fs::write(&config_path, "[engine\nfunctional_richness = 2").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_out_of_range_richness() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("pagelist.toml");
        fs::write(&config_path, "[engine]\nfunctional_richness = 9\n").expect("write config");
        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn env_overrides_take_precedence_over_file_values() {
        let mut config = EngineConfig {
            max_result_count: 50,
            ..EngineConfig::default()
        };
        config
            .apply_overrides(overrides(&[
                ("PAGELIST_FUNCTIONAL_RICHNESS", "1"),
                ("PAGELIST_MAX_RESULT_COUNT", " 20 "),
                ("PAGELIST_UNKNOWN_PARAMETERS", "ABORT"),
            ]))
            .expect("overrides");
        assert_eq!(config.functional_richness, 1);
        assert_eq!(config.max_result_count, 20);
        assert_eq!(config.unknown_parameters, UnknownParameterPolicy::Abort);
    }

    #[test]
    fn blank_env_values_are_ignored_and_bad_values_fail() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(overrides(&[("PAGELIST_MAX_RESULT_COUNT", "  ")]))
            .expect("blank is ignored");
        assert_eq!(config.max_result_count, 500);

        let error = config
            .apply_overrides(overrides(&[("PAGELIST_UNKNOWN_PARAMETERS", "ignore")]))
            .expect_err("must fail");
        assert!(error.to_string().contains("warn"));
        assert!(
            config
                .apply_overrides(overrides(&[("PAGELIST_FUNCTIONAL_RICHNESS", "7")]))
                .is_err()
        );
    }

    #[test]
    fn result_count_clamp_respects_unlimited_flag() {
        let mut config = EngineConfig::default();
        assert_eq!(config.clamp_result_count(10_000), 500);
        assert_eq!(config.clamp_result_count(12), 12);
        config.allow_unlimited_results = true;
        assert_eq!(config.clamp_result_count(10_000), 10_000);
    }

    #[test]
    fn namespace_allow_list_is_case_insensitive() {
        let mut config = EngineConfig::default();
        assert!(config.namespace_allowed("Anything"));
        config.allowed_namespaces = Some(vec!["Help".to_string(), String::new()]);
        assert!(config.namespace_allowed("help"));
        assert!(config.namespace_allowed(""));
        assert!(!config.namespace_allowed("User"));
    }
}
