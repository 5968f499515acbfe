//! Parameters whose semantics go beyond the generic pipeline.
//!
//! Every handler validates the whole option before writing anything, so a
//! rejected pair never leaves a half-updated value behind. Flags declared on
//! the descriptor are applied by the processor after a handler accepts;
//! handlers only set the ones that depend on the value.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::EngineConfig;
use crate::host::Collaborators;
use crate::normalize::{
    coerce_integer, decode_html_entities, filter_boolean, replace_newline_escapes,
    starts_with_entity, strip_html_tags, to_db_key,
};
use crate::query::{Distinct, OpenReferences, ParamValue, QuerySpecification};
use crate::registry::{Handler, ParameterDescriptor};
use crate::title::capitalize_first;

const INLINE_LINE_BREAK: &str = "<br />";
const TABLE_DEFAULT_CLASS: &str = "class=wikitable";
const TABLE_LINK_CELL: &str = "[[%PAGE%|%TITLE%]]\n|";
const TABLE_ROW_OPEN: &str = "\n|-\n|";
const UNCATEGORIZED: &str = "_none_";

pub(crate) struct HandlerContext<'a> {
    pub descriptor: &'a ParameterDescriptor,
    pub config: &'a EngineConfig,
    pub host: Collaborators<'a>,
}

impl HandlerContext<'_> {
    fn allowed_values(&self) -> &'static [&'static str] {
        self.descriptor.values.unwrap_or_default()
    }
}

/// Returns `true` when the option was accepted and stored.
pub(crate) fn run(
    handler: Handler,
    ctx: &HandlerContext<'_>,
    spec: &mut QuerySpecification,
    option: &str,
) -> bool {
    match handler {
        Handler::Category => category(ctx, spec, option),
        Handler::NotCategory => not_category(ctx, spec, option),
        Handler::CategoryRegexp => category_pattern(spec, "category", Bucket::Regexp, option),
        Handler::CategoryMatch => category_pattern(spec, "category", Bucket::Like, option),
        Handler::NotCategoryRegexp => {
            category_pattern(spec, "notcategory", Bucket::Regexp, option)
        }
        Handler::NotCategoryMatch => category_pattern(spec, "notcategory", Bucket::Like, option),
        Handler::OrderMethod => order_method(ctx, spec, option),
        Handler::Mode => mode(ctx, spec, option),
        Handler::Distinct => distinct(spec, option),
        Handler::OrderCollation => order_collation(spec, option),
        Handler::Format => format(spec, option),
        Handler::Title => title(ctx, spec, option),
        Handler::NotTitle => not_title(ctx, spec, option),
        Handler::TitleRegexp => title_pattern(spec, "title", Bucket::Regexp, option),
        Handler::TitleMatch => title_pattern(spec, "title", Bucket::Like, option),
        Handler::NotTitleRegexp => title_pattern(spec, "nottitle", Bucket::Regexp, option),
        Handler::NotTitleMatch => title_pattern(spec, "nottitle", Bucket::Like, option),
        Handler::Namespace => namespace(ctx, spec, "namespace", option),
        Handler::NotNamespace => namespace(ctx, spec, "notnamespace", option),
        Handler::Scroll => scroll(ctx, spec, option),
        Handler::AllowCachedResults => allow_cached_results(spec, option),
        Handler::FlagSet => flag_set(ctx, spec, option),
        Handler::Include => include(spec, option),
        Handler::IncludeMatch { parsed, negated } => include_match(spec, option, parsed, negated),
        Handler::Table => table(spec, option),
        Handler::TableRow => table_row(spec, option),
        Handler::SecSeparators => separators(spec, "secseparators", option),
        Handler::MultiSecSeparators => separators(spec, "multisecseparators", option),
        Handler::Count => count(ctx, spec, option),
        Handler::Debug => debug_level(ctx, spec, option),
        Handler::OpenReferences => open_references(spec, option),
        Handler::ReplaceInTitle => replace_in_title(spec, option),
    }
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Regexp,
    Like,
}

fn split_list(option: &str, separator: char) -> Vec<String> {
    option.split(separator).map(|item| item.trim().to_string()).collect()
}

fn append_unique(spec: &mut QuerySpecification, name: &str, items: &[String]) {
    let mut list = spec.list(name).map(<[_]>::to_vec).unwrap_or_default();
    for item in items {
        if !list.contains(item) {
            list.push(item.clone());
        }
    }
    spec.set(name, ParamValue::List(list));
}

fn category(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let mut option = option.trim();
    if option.is_empty() {
        return false;
    }

    let heading = match option.chars().next() {
        Some('+') => Some("catheadings"),
        Some('-') => Some("catnotheadings"),
        _ => None,
    };
    if heading.is_some() {
        option = &option[1..];
    }

    // Only a bare `&` is the AND operator; `&amp;` and friends belong to the name.
    let and_terms = split_on_bare_ampersand(option);
    let and_mode = and_terms.len() > 1;
    let terms: Vec<String> = if and_mode {
        and_terms.into_iter().map(decode_html_entities).collect()
    } else {
        option.split('|').map(decode_html_entities).collect()
    };

    let mut categories: Vec<String> = Vec::new();
    let mut include_uncategorized = false;
    for term in terms.iter().map(|term| term.trim()) {
        if term.is_empty() || term == UNCATEGORIZED {
            include_uncategorized = true;
            continue;
        }
        let (depth, name) = if let Some(name) = term.strip_prefix("**") {
            (2, name)
        } else if let Some(name) = term.strip_prefix('*') {
            (1, name)
        } else {
            (0, term)
        };
        let Some(parent) = ctx.host.titles.resolve_title(name.trim()) else {
            continue;
        };
        let parent = parent.db_key();
        if depth > 0 {
            for subcategory in ctx.host.subcategories.subcategories_of(&parent, depth) {
                push_unique(&mut categories, to_db_key(&subcategory));
            }
        }
        push_unique(&mut categories, parent);
    }

    if categories.is_empty() && !include_uncategorized {
        return false;
    }

    if !categories.is_empty() {
        let mut selector = spec.categories("category").cloned().unwrap_or_default();
        if and_mode {
            selector.and.push(categories.clone());
        } else {
            selector.or.push(categories.clone());
        }
        spec.set("category", ParamValue::Categories(selector));
        if let Some(key) = heading {
            append_unique(spec, key, &categories);
        }
    }
    if include_uncategorized {
        spec.set("includeuncat", ParamValue::Bool(true));
    }
    true
}

fn split_on_bare_ampersand(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices('&') {
        if starts_with_entity(&text[index..]) {
            continue;
        }
        parts.push(&text[start..index]);
        start = index + 1;
    }
    parts.push(&text[start..]);
    parts
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// One excluded category per line. Exclusions combine: a page in any of them
/// is dropped.
fn not_category(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let decoded = decode_html_entities(option.trim());
    let Some(title) = ctx.host.titles.resolve_title(&decoded) else {
        return false;
    };
    let mut selector = spec.categories("notcategory").cloned().unwrap_or_default();
    selector.or.push(vec![title.db_key()]);
    spec.set("notcategory", ParamValue::Categories(selector));
    true
}

fn category_pattern(
    spec: &mut QuerySpecification,
    name: &str,
    bucket: Bucket,
    option: &str,
) -> bool {
    let pattern = option.trim();
    let mut selector = spec.categories(name).cloned().unwrap_or_default();
    if !pattern.is_empty() {
        match bucket {
            Bucket::Regexp => selector.regexp.push(pattern.to_string()),
            Bucket::Like => selector.like.push(pattern.to_string()),
        }
    }
    spec.set(name, ParamValue::Categories(selector));
    true
}

fn order_method(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let methods: Vec<String> = split_list(&option.to_lowercase(), ',');
    let allowed = ctx.allowed_values();
    if !methods.iter().all(|method| allowed.contains(&method.as_str())) {
        return false;
    }
    if methods.first().is_some_and(|first| first != "none") {
        spec.set_open_references_conflict();
    }
    spec.set("ordermethod", ParamValue::List(methods));
    true
}

fn mode(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let mode = option.trim().to_lowercase();
    if !ctx.allowed_values().contains(&mode.as_str()) {
        return false;
    }
    match mode.as_str() {
        "none" => {
            spec.set("mode", ParamValue::text("inline"));
            spec.set("inlinetext", ParamValue::text(INLINE_LINE_BREAK));
        }
        "userformat" => {
            spec.set("mode", ParamValue::text("userformat"));
            spec.set("inlinetext", ParamValue::text(""));
        }
        _ => spec.set("mode", ParamValue::Text(mode)),
    }
    true
}

fn distinct(spec: &mut QuerySpecification, option: &str) -> bool {
    let option = option.trim().to_lowercase();
    let value = if option == "strict" {
        Distinct::Strict
    } else {
        match filter_boolean(&option) {
            Some(true) => Distinct::On,
            Some(false) => Distinct::Off,
            None => return false,
        }
    };
    spec.set("distinct", ParamValue::Distinct(value));
    true
}

fn order_collation(spec: &mut QuerySpecification, option: &str) -> bool {
    let option = option.trim();
    if option.is_empty() {
        return false;
    }
    if option.eq_ignore_ascii_case("bridge") {
        spec.set("ordersuitsymbols", ParamValue::Bool(true));
    } else {
        spec.set("ordercollation", ParamValue::text(option));
    }
    true
}

/// Shared by `format` and `listseparators`: up to four separators for the
/// list header, item start, item end and list footer.
fn format(spec: &mut QuerySpecification, option: &str) -> bool {
    let expanded = replace_newline_escapes(&strip_html_tags(option));
    let separators: Vec<String> = expanded.splitn(4, ',').map(str::to_string).collect();
    spec.set("listseparators", ParamValue::List(separators));
    spec.set("mode", ParamValue::text("userformat"));
    spec.set("inlinetext", ParamValue::text(""));
    true
}

fn title(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let Some(title) = ctx.host.titles.resolve_title(option) else {
        return false;
    };
    let mut selector = spec.titles("title").cloned().unwrap_or_default();
    selector.exact.push(title.db_key());
    spec.set("title", ParamValue::Titles(selector));
    spec.set(
        "namespace",
        ParamValue::Namespaces(BTreeSet::from([title.namespace])),
    );
    spec.set("mode", ParamValue::text("userformat"));
    spec.set("ordermethod", ParamValue::List(Vec::new()));
    true
}

fn not_title(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let Some(title) = ctx.host.titles.resolve_title(option) else {
        return false;
    };
    let mut selector = spec.titles("nottitle").cloned().unwrap_or_default();
    selector.exact.push(title.db_key());
    spec.set("nottitle", ParamValue::Titles(selector));
    true
}

/// Stored keys are underscore-separated, so literal spaces in a pattern are
/// written as an escaped underscore.
fn title_pattern(spec: &mut QuerySpecification, name: &str, bucket: Bucket, option: &str) -> bool {
    let patterns: Vec<String> = option
        .split('|')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| pattern.replace(' ', "\\_"))
        .collect();
    if patterns.is_empty() {
        return false;
    }
    let mut selector = spec.titles(name).cloned().unwrap_or_default();
    match bucket {
        Bucket::Regexp => selector.regexp.extend(patterns),
        Bucket::Like => selector.like.extend(patterns),
    }
    spec.set(name, ParamValue::Titles(selector));
    true
}

fn namespace(
    ctx: &HandlerContext<'_>,
    spec: &mut QuerySpecification,
    name: &str,
    option: &str,
) -> bool {
    let mut resolved = BTreeSet::new();
    for entry in option.split('|').map(str::trim) {
        if !ctx.config.namespace_allowed(entry) {
            return false;
        }
        match ctx.host.namespaces.namespace_index(entry) {
            Some(index) => {
                resolved.insert(index);
            }
            None => return false,
        }
    }
    let mut namespaces = spec.namespaces(name).cloned().unwrap_or_default();
    namespaces.extend(resolved);
    spec.set(name, ParamValue::Namespaces(namespaces));
    true
}

fn scroll_title(raw: &str) -> String {
    to_db_key(&capitalize_first(raw.trim()))
}

fn scroll(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let Some(enabled) = filter_boolean(option) else {
        return false;
    };
    spec.set("scroll", ParamValue::Bool(enabled));
    if !enabled {
        return true;
    }

    let request = ctx.host.request;
    let find = request.request_value("DPL_findTitle", "");
    if !find.trim().is_empty() {
        spec.set("titlegt", ParamValue::Text(format!("=_{}", scroll_title(&find))));
    } else {
        let from = request.request_value("DPL_fromTitle", "");
        if !from.trim().is_empty() {
            spec.set("titlegt", ParamValue::Text(scroll_title(&from)));
        }
    }

    let to = request.request_value("DPL_toTitle", "");
    if !to.trim().is_empty() {
        spec.set("titlelt", ParamValue::Text(scroll_title(&to)));
    }

    let direction = request.request_value("DPL_scrollDir", "");
    if !direction.trim().is_empty() {
        spec.set("scrolldir", ParamValue::Text(direction.trim().to_lowercase()));
    }

    let count = request.request_value("DPL_count", "");
    if let Some(count) = coerce_integer(&count, None).filter(|count| *count > 0) {
        spec.set("count", ParamValue::Int(ctx.config.clamp_result_count(count)));
    }
    true
}

fn allow_cached_results(spec: &mut QuerySpecification, option: &str) -> bool {
    if spec.get("execandexit").is_some() {
        spec.set("allowcachedresults", ParamValue::Bool(false));
        return true;
    }
    let option = option.trim().to_lowercase();
    let (allow, warn) = if option == "yes+warn" {
        (true, true)
    } else {
        match filter_boolean(&option) {
            Some(allow) => (allow, false),
            None => return false,
        }
    };
    spec.set("allowcachedresults", ParamValue::Bool(allow));
    if warn {
        spec.set("warncachedresults", ParamValue::Bool(true));
    }
    true
}

/// `reset` and `eliminate`. Tokens are checked against the parameter's own
/// value set; `all` and `none` switch every real flag at once.
fn flag_set(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let allowed = ctx.allowed_values();
    let tokens: Vec<String> = split_list(&option.to_lowercase(), ',')
        .into_iter()
        .filter(|token| !token.is_empty())
        .collect();
    if tokens.is_empty() || !tokens.iter().all(|token| allowed.contains(&token.as_str())) {
        return false;
    }

    let name = ctx.descriptor.name;
    let mut flags: BTreeMap<String, bool> = spec.flag_set(name).cloned().unwrap_or_default();
    let known = allowed
        .iter()
        .filter(|value| !matches!(**value, "all" | "none"));
    for token in &tokens {
        match token.as_str() {
            "all" | "none" => {
                let state = token == "all";
                for flag in known.clone() {
                    flags.insert((*flag).to_string(), state);
                }
            }
            flag => {
                flags.insert(flag.to_string(), true);
            }
        }
    }
    spec.set(name, ParamValue::Flags(flags));
    true
}

fn include(spec: &mut QuerySpecification, option: &str) -> bool {
    if option.trim().is_empty() {
        return false;
    }
    spec.set("seclabels", ParamValue::List(split_list(option, ',')));
    spec.set("incpage", ParamValue::Bool(true));
    true
}

fn include_match(
    spec: &mut QuerySpecification,
    option: &str,
    parsed: bool,
    negated: bool,
) -> bool {
    let key = if negated {
        "seclabelsnotmatch"
    } else {
        "seclabelsmatch"
    };
    let patterns = if option.trim().is_empty() {
        Vec::new()
    } else {
        split_list(option, ',')
    };
    spec.set(key, ParamValue::List(patterns));
    if parsed {
        spec.set("incparsed", ParamValue::Bool(true));
    }
    true
}

fn set_at(items: &mut Vec<String>, index: usize, value: String) {
    if items.len() <= index {
        items.resize(index + 1, String::new());
    }
    items[index] = value;
}

/// Builds a wiki table layout from `class,header1,header2,...`. A `-` as the
/// first header drops the automatic page link column; an empty first header
/// is titled "Article". Section separators are back-filled for every label
/// already declared by `include`.
fn table(spec: &mut QuerySpecification, option: &str) -> bool {
    let mut link_cell = TABLE_LINK_CELL;
    let mut opening = String::new();
    for (index, cell) in option.split(',').enumerate() {
        match index {
            0 => {
                let class = if cell.is_empty() {
                    TABLE_DEFAULT_CLASS
                } else {
                    cell
                };
                opening = format!("{{|{class}");
            }
            1 if cell == "-" => link_cell = "",
            _ => {
                let header = if index == 1 && cell.is_empty() {
                    "Article"
                } else {
                    cell
                };
                opening.push_str("\n!");
                opening.push_str(header);
            }
        }
    }
    let list_separators = vec![opening, String::new(), String::new(), "\n|}".to_string()];

    let labels = spec.list("seclabels").map(<[_]>::to_vec).unwrap_or_default();
    let mut section_separators = spec
        .list("secseparators")
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    let mut multi_separators = spec
        .list("multisecseparators")
        .map(<[_]>::to_vec)
        .unwrap_or_default();
    for (index, label) in labels.iter().enumerate() {
        if index == 0 {
            let row = format!("{TABLE_ROW_OPEN}{link_cell}");
            set_at(&mut section_separators, 0, row.clone());
            set_at(&mut section_separators, 1, String::new());
            set_at(&mut multi_separators, 0, row);
        } else {
            set_at(&mut section_separators, 2 * index, "\n|".to_string());
            set_at(&mut section_separators, 2 * index + 1, String::new());
            let separator = if label.starts_with('#') {
                "\n----\n"
            } else {
                "<br/>\n"
            };
            set_at(&mut multi_separators, index, separator.to_string());
        }
    }

    spec.set("defaulttemplatesuffix", ParamValue::text(""));
    spec.set("mode", ParamValue::text("userformat"));
    spec.set("inlinetext", ParamValue::text(""));
    spec.set("listseparators", ParamValue::List(list_separators));
    if !labels.is_empty() {
        spec.set("secseparators", ParamValue::List(section_separators));
        spec.set("multisecseparators", ParamValue::List(multi_separators));
    }
    spec.set("table", ParamValue::Text(option.replace("%%", "%")));
    true
}

fn table_row(spec: &mut QuerySpecification, option: &str) -> bool {
    let expanded = replace_newline_escapes(option);
    let cells = if expanded.trim().is_empty() {
        Vec::new()
    } else {
        expanded.split(',').map(str::to_string).collect()
    };
    spec.set("tablerow", ParamValue::List(cells));
    true
}

fn separators(spec: &mut QuerySpecification, name: &str, option: &str) -> bool {
    let expanded = replace_newline_escapes(option);
    spec.set(name, ParamValue::list(expanded.split(',')));
    true
}

fn count(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    match coerce_integer(option, None) {
        Some(count) if count > 0 => {
            spec.set("count", ParamValue::Int(ctx.config.clamp_result_count(count)));
            true
        }
        _ => false,
    }
}

fn debug_level(ctx: &HandlerContext<'_>, spec: &mut QuerySpecification, option: &str) -> bool {
    let option = option.trim();
    if !ctx.allowed_values().contains(&option) {
        return false;
    }
    let Ok(level) = option.parse::<u8>() else {
        return false;
    };
    spec.set("debug", ParamValue::Int(i64::from(level)));
    ctx.host.diagnostics.set_verbosity(level);
    true
}

fn open_references(spec: &mut QuerySpecification, option: &str) -> bool {
    let option = option.trim().to_lowercase();
    let value = if option == "missing" {
        OpenReferences::Missing
    } else {
        match filter_boolean(&option) {
            Some(true) => OpenReferences::Yes,
            Some(false) => OpenReferences::No,
            None => return false,
        }
    };
    spec.set("openreferences", ParamValue::OpenReferences(value));
    true
}

/// `pattern,replacement`; the replacement loses HTML tags.
fn replace_in_title(spec: &mut QuerySpecification, option: &str) -> bool {
    let mut parts: Vec<String> = option.splitn(2, ',').map(str::to_string).collect();
    if parts[0].trim().is_empty() {
        return false;
    }
    if let Some(replacement) = parts.get_mut(1) {
        *replacement = strip_html_tags(replacement);
    }
    spec.set("replaceintitle", ParamValue::List(parts));
    true
}
