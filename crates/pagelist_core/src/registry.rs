//! Static metadata for every directive parameter. The table is built once per
//! process and never changes afterwards.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ParameterError, ParameterResult};
use crate::query::{Distinct, OpenReferences, ParamValue};

static STANDARD_REGISTRY: OnceLock<ParameterRegistry> = OnceLock::new();

pub const ORDER_METHODS: &[&str] = &[
    "counter",
    "size",
    "category",
    "sortkey",
    "categoryadd",
    "firstedit",
    "lastedit",
    "pagetouched",
    "pagesel",
    "title",
    "titlewithoutnamespace",
    "user",
    "none",
];

pub const MODES: &[&str] = &[
    "category",
    "definition",
    "gallery",
    "inline",
    "none",
    "ordered",
    "subpage",
    "unordered",
    "userformat",
];

/// Flag names understood by `reset` and `eliminate`, plus the two pseudo-tokens.
pub const LINK_TABLE_FLAGS: &[&str] = &["categories", "templates", "links", "images", "all", "none"];

const INCLUDE_EXCLUDE_ONLY: &[&str] = &["include", "exclude", "only"];

/// Parameters whose semantics go beyond the generic coercion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    Category,
    NotCategory,
    CategoryRegexp,
    CategoryMatch,
    NotCategoryRegexp,
    NotCategoryMatch,
    OrderMethod,
    Mode,
    Distinct,
    OrderCollation,
    Format,
    Title,
    NotTitle,
    TitleRegexp,
    TitleMatch,
    NotTitleRegexp,
    NotTitleMatch,
    Namespace,
    NotNamespace,
    Scroll,
    AllowCachedResults,
    FlagSet,
    Include,
    IncludeMatch { parsed: bool, negated: bool },
    Table,
    TableRow,
    SecSeparators,
    MultiSecSeparators,
    Count,
    Debug,
    OpenReferences,
    ReplaceInTitle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Pipeline,
    Custom(Handler),
}

#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub dispatch: Dispatch,
    pub values: Option<&'static [&'static str]>,
    pub preserve_case: bool,
    pub strip_html: bool,
    pub integer: bool,
    pub boolean: bool,
    pub timestamp: bool,
    pub page_name_list: bool,
    pub page_name_must_exist: bool,
    pub db_format: bool,
    pub pattern: Option<Regex>,
    pub default: Option<ParamValue>,
    pub sets_selection_criteria: bool,
    pub opens_reference_conflict: bool,
    pub permission: Option<&'static str>,
    pub richness: u8,
    pattern_source: Option<&'static str>,
}

impl ParameterDescriptor {
    pub fn new(name: &'static str, richness: u8) -> Self {
        Self {
            name,
            dispatch: Dispatch::Pipeline,
            values: None,
            preserve_case: false,
            strip_html: false,
            integer: false,
            boolean: false,
            timestamp: false,
            page_name_list: false,
            page_name_must_exist: false,
            db_format: false,
            pattern: None,
            default: None,
            sets_selection_criteria: false,
            opens_reference_conflict: false,
            permission: None,
            richness,
            pattern_source: None,
        }
    }

    pub fn custom(mut self, handler: Handler) -> Self {
        self.dispatch = Dispatch::Custom(handler);
        self
    }

    pub fn values(mut self, values: &'static [&'static str]) -> Self {
        self.values = Some(values);
        self
    }

    pub fn preserve_case(mut self) -> Self {
        self.preserve_case = true;
        self
    }

    pub fn strip_html(mut self) -> Self {
        self.strip_html = true;
        self
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn boolean(mut self) -> Self {
        self.boolean = true;
        self
    }

    pub fn timestamp(mut self) -> Self {
        self.timestamp = true;
        self
    }

    pub fn page_names(mut self, must_exist: bool) -> Self {
        self.page_name_list = true;
        self.page_name_must_exist = must_exist;
        self
    }

    pub fn db_format(mut self) -> Self {
        self.db_format = true;
        self
    }

    /// The pattern is compiled when the registry is assembled.
    pub fn pattern(mut self, source: &'static str) -> Self {
        self.pattern_source = Some(source);
        self
    }

    pub fn default(mut self, value: ParamValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn criteria(mut self) -> Self {
        self.sets_selection_criteria = true;
        self
    }

    pub fn conflict(mut self) -> Self {
        self.opens_reference_conflict = true;
        self
    }

    pub fn permission(mut self, capability: &'static str) -> Self {
        self.permission = Some(capability);
        self
    }

    pub fn handler(&self) -> Option<Handler> {
        match self.dispatch {
            Dispatch::Pipeline => None,
            Dispatch::Custom(handler) => Some(handler),
        }
    }

    /// Default written into a fresh specification. Boolean parameters that
    /// default to `false` are left unset.
    pub fn seeded_default(&self) -> Option<&ParamValue> {
        match &self.default {
            Some(ParamValue::Bool(false)) if self.boolean => None,
            other => other.as_ref(),
        }
    }

    pub fn default_integer(&self) -> Option<i64> {
        match self.default {
            Some(ParamValue::Int(value)) => Some(value),
            _ => None,
        }
    }

    pub fn allows(&self, value: &str) -> bool {
        self.values.is_none_or(|values| values.contains(&value))
    }
}

#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    descriptors: Vec<ParameterDescriptor>,
    by_name: HashMap<&'static str, usize>,
}

impl ParameterRegistry {
    /// The built-in parameter table, assembled on first use.
    pub fn standard() -> ParameterResult<&'static ParameterRegistry> {
        if let Some(registry) = STANDARD_REGISTRY.get() {
            return Ok(registry);
        }
        let registry = Self::from_descriptors(standard_descriptors())?;
        Ok(STANDARD_REGISTRY.get_or_init(|| registry))
    }

    pub fn from_descriptors(descriptors: Vec<ParameterDescriptor>) -> ParameterResult<Self> {
        let mut compiled = Vec::with_capacity(descriptors.len());
        let mut by_name = HashMap::with_capacity(descriptors.len());
        for mut descriptor in descriptors {
            if let Some(source) = descriptor.pattern_source {
                let regex = Regex::new(source).map_err(|error| {
                    ParameterError::structural(format!(
                        "pattern for `{}` does not compile: {error}",
                        descriptor.name
                    ))
                })?;
                descriptor.pattern = Some(regex);
            }
            if by_name.insert(descriptor.name, compiled.len()).is_some() {
                return Err(ParameterError::structural(format!(
                    "parameter `{}` is registered twice",
                    descriptor.name
                )));
            }
            compiled.push(descriptor);
        }
        Ok(Self {
            descriptors: compiled,
            by_name,
        })
    }

    /// Case-sensitive lookup on the lower-cased canonical name.
    pub fn descriptor_for(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.by_name.get(name).map(|index| &self.descriptors[*index])
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn flags_default(names: &[&str]) -> ParamValue {
    ParamValue::Flags(
        names
            .iter()
            .filter(|name| !matches!(**name, "all" | "none"))
            .map(|name| ((*name).to_string(), false))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn presentation_flag(name: &'static str, richness: u8) -> ParameterDescriptor {
    ParameterDescriptor::new(name, richness)
        .boolean()
        .default(ParamValue::Bool(false))
        .conflict()
}

fn user_filter(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, 2)
        .preserve_case()
        .db_format()
        .criteria()
        .conflict()
}

fn page_filter(name: &'static str, must_exist: bool) -> ParameterDescriptor {
    ParameterDescriptor::new(name, 2)
        .page_names(must_exist)
        .criteria()
        .conflict()
}

fn revision_filter(name: &'static str) -> ParameterDescriptor {
    ParameterDescriptor::new(name, 3)
        .preserve_case()
        .timestamp()
        .criteria()
        .conflict()
}

fn free_text(name: &'static str, richness: u8) -> ParameterDescriptor {
    ParameterDescriptor::new(name, richness)
        .preserve_case()
        .strip_html()
}

pub fn standard_descriptors() -> Vec<ParameterDescriptor> {
    use Handler as H;
    use ParameterDescriptor as P;

    vec![
        // Level 0: basic selection and listing.
        presentation_flag("addfirstcategorydate", 0),
        P::new("category", 0).custom(H::Category).criteria().conflict(),
        P::new("count", 0).custom(H::Count).integer(),
        P::new("hiddencategories", 0)
            .values(INCLUDE_EXCLUDE_ONLY)
            .default(ParamValue::text("include")),
        P::new("mode", 0)
            .custom(H::Mode)
            .values(MODES)
            .default(ParamValue::text("unordered")),
        P::new("namespace", 0).custom(H::Namespace).criteria(),
        P::new("notcategory", 0)
            .custom(H::NotCategory)
            .criteria()
            .conflict(),
        P::new("order", 0)
            .values(&["ascending", "descending"])
            .default(ParamValue::text("ascending")),
        P::new("ordermethod", 0)
            .custom(H::OrderMethod)
            .values(ORDER_METHODS)
            .default(ParamValue::list(["titlewithoutnamespace"])),
        P::new("qualitypages", 0).values(INCLUDE_EXCLUDE_ONLY),
        P::new("redirects", 0)
            .values(INCLUDE_EXCLUDE_ONLY)
            .default(ParamValue::text("exclude")),
        presentation_flag("showcurid", 0),
        P::new("shownamespace", 0)
            .boolean()
            .default(ParamValue::Bool(true)),
        P::new("stablepages", 0).values(INCLUDE_EXCLUDE_ONLY),
        P::new("suppresserrors", 0)
            .boolean()
            .default(ParamValue::Bool(false)),
        // Level 1: layout and paging.
        P::new("allowcachedresults", 1)
            .custom(H::AllowCachedResults)
            .default(ParamValue::Bool(false)),
        P::new("columns", 1).integer().default(ParamValue::Int(1)),
        P::new("debug", 1)
            .custom(H::Debug)
            .values(&["0", "1", "2", "3", "4", "5"])
            .default(ParamValue::Int(2)),
        P::new("distinct", 1)
            .custom(H::Distinct)
            .default(ParamValue::Distinct(Distinct::On)),
        P::new("escapelinks", 1)
            .boolean()
            .default(ParamValue::Bool(true)),
        P::new("execandexit", 1).preserve_case().strip_html(),
        P::new("format", 1).custom(H::Format),
        free_text("inlinetext", 1).default(ParamValue::text("&#160;-&#160;")),
        P::new("listseparators", 1).custom(H::Format),
        free_text("noresultsfooter", 1),
        free_text("noresultsheader", 1),
        P::new("notnamespace", 1).custom(H::NotNamespace).criteria(),
        P::new("offset", 1).integer().default(ParamValue::Int(0)),
        free_text("oneresultfooter", 1),
        free_text("oneresultheader", 1),
        P::new("ordercollation", 1).custom(H::OrderCollation),
        P::new("randomcount", 1).integer(),
        P::new("replaceintitle", 1).custom(H::ReplaceInTitle),
        free_text("resultsfooter", 1),
        free_text("resultsheader", 1),
        free_text("rowcolformat", 1),
        P::new("rows", 1).integer().default(ParamValue::Int(1)),
        P::new("rowsize", 1).integer().default(ParamValue::Int(0)),
        P::new("scroll", 1).custom(H::Scroll).boolean(),
        P::new("title", 1).custom(H::Title).criteria().conflict(),
        P::new("titlegt", 1).preserve_case().db_format(),
        P::new("titlelt", 1).preserve_case().db_format(),
        P::new("titlemaxlength", 1).integer(),
        free_text("userdateformat", 1).default(ParamValue::text("Y-m-d H:i:s")),
        // Level 2: content extraction and link filters.
        presentation_flag("addauthor", 2),
        presentation_flag("addcategories", 2),
        presentation_flag("addcontribution", 2),
        presentation_flag("addeditdate", 2),
        presentation_flag("addexternallink", 2),
        presentation_flag("addlasteditor", 2),
        presentation_flag("addpagecounter", 2),
        presentation_flag("addpagesize", 2),
        presentation_flag("addpagetoucheddate", 2),
        presentation_flag("adduser", 2),
        P::new("categoriesminmax", 2).pattern(r"^(\d*),?(\d*)$"),
        user_filter("createdby"),
        P::new("dominantsection", 2)
            .integer()
            .default(ParamValue::Int(-1)),
        P::new("eliminate", 2)
            .custom(H::FlagSet)
            .values(LINK_TABLE_FLAGS)
            .default(flags_default(LINK_TABLE_FLAGS)),
        P::new("headingcount", 2)
            .boolean()
            .default(ParamValue::Bool(false)),
        P::new("headingmode", 2)
            .values(&["none", "definition", "ordered", "unordered"])
            .default(ParamValue::text("none")),
        free_text("hitemattr", 2),
        free_text("hlistattr", 2),
        P::new("ignorecase", 2)
            .boolean()
            .default(ParamValue::Bool(false)),
        page_filter("imagecontainer", true),
        page_filter("imageused", true),
        P::new("include", 2).custom(H::Include),
        P::new("includematch", 2).custom(H::IncludeMatch {
            parsed: false,
            negated: false,
        }),
        P::new("includematchparsed", 2).custom(H::IncludeMatch {
            parsed: true,
            negated: false,
        }),
        P::new("includemaxlength", 2).integer(),
        P::new("includenotmatch", 2).custom(H::IncludeMatch {
            parsed: false,
            negated: true,
        }),
        P::new("includenotmatchparsed", 2).custom(H::IncludeMatch {
            parsed: true,
            negated: true,
        }),
        P::new("includepage", 2).custom(H::Include),
        P::new("includesubpages", 2)
            .boolean()
            .default(ParamValue::Bool(true)),
        P::new("includetrim", 2)
            .boolean()
            .default(ParamValue::Bool(false)),
        free_text("itemattr", 2),
        user_filter("lastmodifiedby"),
        P::new("linksfrom", 2).page_names(true).criteria(),
        page_filter("linksto", true),
        page_filter("linkstoexternal", false),
        free_text("listattr", 2),
        P::new("minoredits", 2).values(&["include", "exclude"]),
        user_filter("modifiedby"),
        P::new("multisecseparators", 2).custom(H::MultiSecSeparators),
        user_filter("notcreatedby"),
        user_filter("notlastmodifiedby"),
        page_filter("notlinksfrom", true),
        page_filter("notlinksto", true),
        user_filter("notmodifiedby"),
        P::new("nottitle", 2).custom(H::NotTitle).criteria(),
        P::new("nottitlematch", 2).custom(H::NotTitleMatch).criteria(),
        P::new("nottitleregexp", 2)
            .custom(H::NotTitleRegexp)
            .criteria(),
        page_filter("notuses", true),
        P::new("reset", 2)
            .custom(H::FlagSet)
            .values(LINK_TABLE_FLAGS)
            .default(flags_default(LINK_TABLE_FLAGS)),
        P::new("secseparators", 2).custom(H::SecSeparators),
        P::new("skipthispage", 2)
            .boolean()
            .default(ParamValue::Bool(true)),
        P::new("table", 2).custom(H::Table),
        P::new("tablerow", 2).custom(H::TableRow),
        P::new("tablesortcol", 2).integer(),
        P::new("tablesortmethod", 2)
            .values(&["standard", "natural"])
            .default(ParamValue::text("standard")),
        P::new("titlematch", 2).custom(H::TitleMatch).criteria(),
        P::new("titleregexp", 2).custom(H::TitleRegexp).criteria(),
        page_filter("usedby", true),
        page_filter("uses", true),
        // Level 3: expensive revision and pattern filters.
        revision_filter("allrevisionsbefore"),
        revision_filter("allrevisionssince"),
        page_filter("articlecategory", true),
        P::new("categorymatch", 3)
            .custom(H::CategoryMatch)
            .criteria()
            .conflict(),
        P::new("categoryregexp", 3)
            .custom(H::CategoryRegexp)
            .criteria()
            .conflict(),
        revision_filter("firstrevisionsince"),
        P::new("goal", 3)
            .values(&["pages", "categories"])
            .default(ParamValue::text("pages"))
            .conflict(),
        revision_filter("lastrevisionbefore"),
        P::new("maxrevisions", 3).integer(),
        P::new("minrevisions", 3).integer(),
        P::new("notcategorymatch", 3)
            .custom(H::NotCategoryMatch)
            .criteria()
            .conflict(),
        P::new("notcategoryregexp", 3)
            .custom(H::NotCategoryRegexp)
            .criteria()
            .conflict(),
        P::new("openreferences", 3)
            .custom(H::OpenReferences)
            .default(ParamValue::OpenReferences(OpenReferences::No)),
        // Level 4: page-modifying operations.
        P::new("deleterules", 4)
            .preserve_case()
            .permission("dpl_param_delete_rules"),
        P::new("updaterules", 4)
            .preserve_case()
            .permission("dpl_param_update_rules"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_loads_and_is_shared() {
        let first = ParameterRegistry::standard().expect("registry");
        let second = ParameterRegistry::standard().expect("registry");
        assert!(std::ptr::eq(first, second));
        assert!(first.len() > 100);
    }

    #[test]
    fn lookup_is_case_sensitive_on_canonical_names() {
        let registry = ParameterRegistry::standard().expect("registry");
        assert!(registry.descriptor_for("category").is_some());
        assert!(registry.descriptor_for("Category").is_none());
        assert!(registry.descriptor_for("nosuchparameter").is_none());
    }

    #[test]
    fn aliases_share_their_handler() {
        let registry = ParameterRegistry::standard().expect("registry");
        let handler = |name| registry.descriptor_for(name).and_then(|d| d.handler());
        assert_eq!(handler("format"), Some(Handler::Format));
        assert_eq!(handler("listseparators"), Some(Handler::Format));
        assert_eq!(handler("include"), handler("includepage"));
        assert_eq!(handler("order"), None);
    }

    #[test]
    fn boolean_false_defaults_are_not_seeded() {
        let registry = ParameterRegistry::standard().expect("registry");
        let addauthor = registry.descriptor_for("addauthor").expect("addauthor");
        assert!(addauthor.seeded_default().is_none());
        let escapelinks = registry.descriptor_for("escapelinks").expect("escapelinks");
        assert_eq!(escapelinks.seeded_default(), Some(&ParamValue::Bool(true)));
        let allowcached = registry
            .descriptor_for("allowcachedresults")
            .expect("allowcachedresults");
        assert_eq!(allowcached.seeded_default(), Some(&ParamValue::Bool(false)));
    }

    #[test]
    fn patterns_compile_at_load_time() {
        let registry = ParameterRegistry::standard().expect("registry");
        let minmax = registry
            .descriptor_for("categoriesminmax")
            .expect("categoriesminmax");
        assert!(minmax.pattern.as_ref().is_some_and(|re| re.is_match("1,5")));
    }

    #[test]
    fn invalid_pattern_is_a_structural_error() {
        let error = ParameterRegistry::from_descriptors(vec![
            ParameterDescriptor::new("broken", 0).pattern("(unclosed"),
        ])
        .expect_err("must fail");
        assert!(matches!(error, ParameterError::Structural { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let error = ParameterRegistry::from_descriptors(vec![
            ParameterDescriptor::new("twice", 0),
            ParameterDescriptor::new("twice", 1),
        ])
        .expect_err("must fail");
        assert!(error.to_string().contains("registered twice"));
    }

    #[test]
    fn permission_gated_parameters_sit_at_top_richness() {
        let registry = ParameterRegistry::standard().expect("registry");
        for descriptor in registry.descriptors().filter(|d| d.permission.is_some()) {
            assert_eq!(descriptor.richness, 4, "{}", descriptor.name);
        }
    }
}
