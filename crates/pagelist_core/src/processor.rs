//! Folds one `name=value` pair into a [`QuerySpecification`].
//!
//! Parameters either run through the generic coercion pipeline described by
//! their descriptor flags, or are handed to the custom handler named in their
//! dispatch tag. In both cases nothing is written unless the pair is accepted.

use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{ParameterError, ParameterResult};
use crate::handlers::{self, HandlerContext};
use crate::host::Collaborators;
use crate::normalize::{coerce_integer, filter_boolean, resolve_page_name_list, strip_html_tags, to_db_key};
use crate::query::{ParamValue, QuerySpecification};
use crate::registry::{Dispatch, ParameterDescriptor, ParameterRegistry};

pub struct ParameterProcessor<'a> {
    registry: &'a ParameterRegistry,
    config: &'a EngineConfig,
    host: Collaborators<'a>,
}

impl<'a> ParameterProcessor<'a> {
    pub fn new(
        registry: &'a ParameterRegistry,
        config: &'a EngineConfig,
        host: Collaborators<'a>,
    ) -> Self {
        Self {
            registry,
            config,
            host,
        }
    }

    pub fn registry(&self) -> &'a ParameterRegistry {
        self.registry
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    /// Fresh specification seeded with registry defaults. The default `debug`
    /// level is pushed to the diagnostics collaborator as part of seeding.
    pub fn new_specification(&self) -> QuerySpecification {
        let spec = QuerySpecification::new(self.registry);
        if let Some(level) = spec.integer("debug").and_then(|level| u8::try_from(level).ok()) {
            self.host.diagnostics.set_verbosity(level);
        }
        spec
    }

    /// `Ok(())` means the pair was accepted and committed. Validation,
    /// unknown-name and richness errors leave `spec` values untouched;
    /// authorization and structural errors are fatal for the directive.
    pub fn process(
        &self,
        spec: &mut QuerySpecification,
        name: &str,
        raw: &str,
    ) -> ParameterResult<()> {
        if name.is_empty() {
            return Err(ParameterError::structural("parameter name is empty"));
        }
        let descriptor =
            self.registry
                .descriptor_for(name)
                .ok_or_else(|| ParameterError::UnknownParameter {
                    name: name.to_string(),
                })?;

        if descriptor.richness > self.config.functional_richness {
            return Err(ParameterError::NotAvailable {
                name: descriptor.name.to_string(),
                required: descriptor.richness,
                configured: self.config.functional_richness,
            });
        }
        if let Some(capability) = descriptor.permission
            && !self.host.capabilities.caller_has_capability(capability)
        {
            return Err(ParameterError::Authorization {
                name: descriptor.name.to_string(),
                capability: capability.to_string(),
            });
        }

        spec.mark_processed(descriptor.name);

        let accepted = match descriptor.dispatch {
            Dispatch::Custom(handler) => {
                let context = HandlerContext {
                    descriptor,
                    config: self.config,
                    host: self.host,
                };
                handlers::run(handler, &context, spec, raw)
            }
            Dispatch::Pipeline => match self.run_pipeline(descriptor, spec, raw) {
                Some(value) => {
                    trace!(parameter = descriptor.name, ?value, "pipeline value");
                    spec.set(descriptor.name, value);
                    true
                }
                None => false,
            },
        };

        if !accepted {
            debug!(parameter = descriptor.name, value = raw, "rejected parameter");
            return Err(ParameterError::validation(descriptor.name, raw));
        }
        if descriptor.sets_selection_criteria {
            spec.set_selection_criteria_found();
        }
        if descriptor.opens_reference_conflict {
            spec.set_open_references_conflict();
        }
        debug!(parameter = descriptor.name, "accepted parameter");
        Ok(())
    }

    /// Stages run in a fixed order and stop at the first invalid one. Integer,
    /// boolean and page-list stages produce their final typed value; the
    /// pattern and db-key stages only apply to text.
    fn run_pipeline(
        &self,
        descriptor: &ParameterDescriptor,
        spec: &QuerySpecification,
        raw: &str,
    ) -> Option<ParamValue> {
        let mut option = raw.to_string();

        if descriptor.values.is_some() && !descriptor.allows(&option.to_lowercase()) {
            return None;
        }
        if !descriptor.preserve_case && !descriptor.page_name_list {
            option = option.to_lowercase();
        }
        if descriptor.strip_html {
            option = strip_html_tags(&option);
        }
        if descriptor.integer {
            return coerce_integer(&option, descriptor.default_integer()).map(ParamValue::Int);
        }
        if descriptor.boolean {
            return filter_boolean(&option).map(ParamValue::Bool);
        }
        if descriptor.timestamp {
            option = self.host.timestamps.normalize_timestamp(&option)?;
        }
        if descriptor.page_name_list {
            let pages = resolve_page_name_list(
                &option,
                descriptor.page_name_must_exist,
                self.host.titles,
            )?;
            if pages.is_empty() {
                return None;
            }
            let mut groups = spec
                .page_groups(descriptor.name)
                .map(<[_]>::to_vec)
                .unwrap_or_default();
            groups.push(pages);
            return Some(ParamValue::PageGroups(groups));
        }
        if let Some(pattern) = &descriptor.pattern {
            let captures = pattern.captures(&option)?;
            let groups: Vec<String> = captures
                .iter()
                .skip(1)
                .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                .map(|group| {
                    if descriptor.db_format {
                        to_db_key(&group)
                    } else {
                        group
                    }
                })
                .collect();
            return Some(ParamValue::List(groups));
        }
        if descriptor.db_format {
            option = to_db_key(&option);
        }
        Some(ParamValue::Text(option))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Capabilities;
    use crate::query::PageRef;
    use crate::registry::ParameterDescriptor;
    use crate::site::StaticSite;
    use crate::title::{NS_MAIN, Title};

    fn process_all(
        site: &StaticSite,
        config: &EngineConfig,
        pairs: &[(&str, &str)],
    ) -> (QuerySpecification, Vec<ParameterResult<()>>) {
        let registry = ParameterRegistry::standard().expect("registry");
        let processor = ParameterProcessor::new(registry, config, Collaborators::uniform(site));
        let mut spec = processor.new_specification();
        let results = pairs
            .iter()
            .map(|(name, value)| processor.process(&mut spec, name, value))
            .collect();
        (spec, results)
    }

    #[test]
    fn unknown_parameter_is_reported_without_touching_spec() {
        let site = StaticSite::default();
        let (spec, results) = process_all(&site, &EngineConfig::default(), &[("colour", "red")]);
        assert_eq!(
            results[0],
            Err(ParameterError::UnknownParameter {
                name: "colour".to_string()
            })
        );
        assert!(spec.processed_parameters().is_empty());
    }

    #[test]
    fn empty_name_is_structural() {
        let site = StaticSite::default();
        let (_, results) = process_all(&site, &EngineConfig::default(), &[("", "x")]);
        assert!(results[0].as_ref().is_err_and(ParameterError::is_fatal));
    }

    #[test]
    fn richness_above_configuration_is_not_available() {
        let site = StaticSite::default();
        let config = EngineConfig {
            functional_richness: 1,
            ..EngineConfig::default()
        };
        let (spec, results) = process_all(&site, &config, &[("linksto", "Main Page")]);
        assert!(matches!(
            results[0],
            Err(ParameterError::NotAvailable {
                required: 2,
                configured: 1,
                ..
            })
        ));
        assert!(spec.get("linksto").is_none());
    }

    #[test]
    fn missing_capability_is_fatal_and_not_marked_processed() {
        let site = StaticSite::default();
        let config = EngineConfig {
            functional_richness: 4,
            ..EngineConfig::default()
        };
        let (spec, results) = process_all(&site, &config, &[("updaterules", "anything")]);
        let error = results[0].clone().expect_err("must fail");
        assert!(error.is_fatal());
        assert!(matches!(error, ParameterError::Authorization { .. }));
        assert!(!spec.was_specified("updaterules"));
    }

    #[test]
    fn granted_capability_allows_gated_parameter() {
        let site = StaticSite::default().with_capability("dpl_param_update_rules");
        assert!(site.caller_has_capability("dpl_param_update_rules"));
        let config = EngineConfig {
            functional_richness: 4,
            ..EngineConfig::default()
        };
        let (spec, results) = process_all(&site, &config, &[("updaterules", "Keep Case")]);
        assert_eq!(results[0], Ok(()));
        assert_eq!(spec.text("updaterules"), Some("Keep Case"));
    }

    #[test]
    fn allowed_values_are_checked_case_insensitively_then_folded() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("order", "DESCENDING"), ("redirects", "sometimes")],
        );
        assert_eq!(results[0], Ok(()));
        assert_eq!(spec.text("order"), Some("descending"));
        assert!(results[1].is_err());
        assert_eq!(spec.text("redirects"), Some("exclude"));
    }

    #[test]
    fn integers_truncate_and_fall_back_to_defaults() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("offset", "12.7"), ("columns", "many"), ("randomcount", "some")],
        );
        assert_eq!(results[0], Ok(()));
        assert_eq!(spec.integer("offset"), Some(12));
        assert_eq!(results[1], Ok(()));
        assert_eq!(spec.integer("columns"), Some(1));
        assert!(results[2].is_err());
        assert!(spec.get("randomcount").is_none());
    }

    #[test]
    fn booleans_use_conventional_spellings() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("addauthor", "Yes"), ("escapelinks", "off"), ("ignorecase", "perhaps")],
        );
        assert_eq!(results[0], Ok(()));
        assert!(spec.flag("addauthor"));
        assert!(spec.is_open_references_conflict());
        assert!(!spec.flag("escapelinks"));
        assert!(results[2].is_err());
    }

    #[test]
    fn free_text_keeps_case_and_loses_html_tags() {
        let site = StaticSite::default();
        let (spec, _) = process_all(
            &site,
            &EngineConfig::default(),
            &[("resultsheader", "Found <html>%PAGES%</html> Pages")],
        );
        assert_eq!(spec.text("resultsheader"), Some("Found %PAGES% Pages"));
    }

    #[test]
    fn user_filters_keep_case_and_use_db_keys() {
        let site = StaticSite::default();
        let (spec, _) = process_all(&site, &EngineConfig::default(), &[("createdby", "Jane Doe")]);
        assert_eq!(spec.text("createdby"), Some("Jane_Doe"));
        assert!(spec.is_selection_criteria_found());
    }

    #[test]
    fn timestamps_are_normalized_by_the_host() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("firstrevisionsince", "2024-03-01"), ("lastrevisionbefore", "soon")],
        );
        assert_eq!(results[0], Ok(()));
        assert_eq!(spec.text("firstrevisionsince"), Some("20240301000000"));
        assert!(results[1].is_err());
        assert!(spec.get("lastrevisionbefore").is_none());
    }

    #[test]
    fn timestamps_with_time_separator_pass_the_pipeline() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[
                ("firstrevisionsince", "2024-01-02T03:04:05"),
                ("lastrevisionbefore", "2024-01-02T03:04:05Z"),
            ],
        );
        assert_eq!(results, vec![Ok(()), Ok(())]);
        assert_eq!(spec.text("firstrevisionsince"), Some("20240102030405"));
        assert_eq!(spec.text("lastrevisionbefore"), Some("20240102030405"));
    }

    #[test]
    fn page_name_lists_append_groups_across_lines() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("linksto", "main_page|Help:Contents"), ("linksto", "Sandbox")],
        );
        assert!(results.iter().all(Result::is_ok));
        let groups = spec.page_groups("linksto").expect("groups");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0][0], PageRef::Title(Title::new(NS_MAIN, "Main page")));
        assert_eq!(groups[0][1].as_text(), "Contents");
        assert_eq!(groups[1], vec![PageRef::Title(Title::new(NS_MAIN, "Sandbox"))]);
    }

    #[test]
    fn invalid_page_in_list_rejects_whole_line_only() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("uses", "Template:Infobox"), ("uses", "Template:Ok|Bad[name")],
        );
        assert_eq!(results[0], Ok(()));
        assert!(results[1].is_err());
        assert_eq!(spec.page_groups("uses").map(<[_]>::len), Some(1));
    }

    #[test]
    fn external_links_are_kept_verbatim() {
        let site = StaticSite::default();
        let (spec, _) = process_all(
            &site,
            &EngineConfig::default(),
            &[("linkstoexternal", "https://Example.org/%|http://x.test")],
        );
        let groups = spec.page_groups("linkstoexternal").expect("groups");
        assert_eq!(groups[0][0], PageRef::Name("https://Example.org/%".to_string()));
    }

    #[test]
    fn pattern_stores_captured_groups() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("categoriesminmax", "2,5"), ("categoriesminmax", "two")],
        );
        assert_eq!(results[0], Ok(()));
        assert!(results[1].is_err());
        assert_eq!(
            spec.list("categoriesminmax"),
            Some(&["2".to_string(), "5".to_string()][..])
        );
    }

    #[test]
    fn custom_registry_runs_pipeline_flags_in_order() {
        let registry = ParameterRegistry::from_descriptors(vec![
            ParameterDescriptor::new("label", 0)
                .strip_html()
                .db_format()
                .pattern(r"^(\w+) (\w+)$"),
        ])
        .expect("registry");
        let site = StaticSite::default();
        let config = EngineConfig::default();
        let processor = ParameterProcessor::new(&registry, &config, Collaborators::uniform(&site));
        let mut spec = processor.new_specification();
        processor
            .process(&mut spec, "label", "<html>Hello World")
            .expect("accepted");
        assert_eq!(
            spec.list("label"),
            Some(&["hello".to_string(), "world".to_string()][..])
        );
    }

    #[test]
    fn seeding_pushes_default_debug_level() {
        let site = StaticSite::default();
        let (_, _) = process_all(&site, &EngineConfig::default(), &[]);
        assert_eq!(site.verbosity(), Some(2));
    }

    #[test]
    fn failed_pair_leaves_earlier_values_intact() {
        let site = StaticSite::default();
        let (spec, results) = process_all(
            &site,
            &EngineConfig::default(),
            &[("count", "10"), ("count", "ten"), ("mode", "bogus")],
        );
        assert_eq!(results[0], Ok(()));
        assert!(results[1].is_err());
        assert!(results[2].is_err());
        assert_eq!(spec.integer("count"), Some(10));
        assert_eq!(spec.text("mode"), Some("unordered"));
        assert!(spec.was_specified("mode"));
    }
}
