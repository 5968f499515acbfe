use serde::Serialize;

pub const NS_MAIN: i32 = 0;
pub const NS_FILE: i32 = 6;
pub const NS_TEMPLATE: i32 = 10;
pub const NS_CATEGORY: i32 = 14;

const MAX_TITLE_BYTES: usize = 255;
const ILLEGAL_TITLE_CHARS: &[char] = &['<', '>', '[', ']', '{', '}', '|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Main,
    Talk,
    User,
    UserTalk,
    Project,
    ProjectTalk,
    File,
    FileTalk,
    MediaWiki,
    MediaWikiTalk,
    Template,
    TemplateTalk,
    Help,
    HelpTalk,
    Category,
    CategoryTalk,
    Module,
    ModuleTalk,
}

impl Namespace {
    pub const ALL: [Namespace; 18] = [
        Self::Main,
        Self::Talk,
        Self::User,
        Self::UserTalk,
        Self::Project,
        Self::ProjectTalk,
        Self::File,
        Self::FileTalk,
        Self::MediaWiki,
        Self::MediaWikiTalk,
        Self::Template,
        Self::TemplateTalk,
        Self::Help,
        Self::HelpTalk,
        Self::Category,
        Self::CategoryTalk,
        Self::Module,
        Self::ModuleTalk,
    ];

    pub fn id(self) -> i32 {
        match self {
            Self::Main => NS_MAIN,
            Self::Talk => 1,
            Self::User => 2,
            Self::UserTalk => 3,
            Self::Project => 4,
            Self::ProjectTalk => 5,
            Self::File => NS_FILE,
            Self::FileTalk => 7,
            Self::MediaWiki => 8,
            Self::MediaWikiTalk => 9,
            Self::Template => NS_TEMPLATE,
            Self::TemplateTalk => 11,
            Self::Help => 12,
            Self::HelpTalk => 13,
            Self::Category => NS_CATEGORY,
            Self::CategoryTalk => 15,
            Self::Module => 828,
            Self::ModuleTalk => 829,
        }
    }

    /// Canonical name as used in title prefixes; the main namespace has none.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "",
            Self::Talk => "Talk",
            Self::User => "User",
            Self::UserTalk => "User talk",
            Self::Project => "Project",
            Self::ProjectTalk => "Project talk",
            Self::File => "File",
            Self::FileTalk => "File talk",
            Self::MediaWiki => "MediaWiki",
            Self::MediaWikiTalk => "MediaWiki talk",
            Self::Template => "Template",
            Self::TemplateTalk => "Template talk",
            Self::Help => "Help",
            Self::HelpTalk => "Help talk",
            Self::Category => "Category",
            Self::CategoryTalk => "Category talk",
            Self::Module => "Module",
            Self::ModuleTalk => "Module talk",
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|namespace| namespace.id() == id)
    }

    /// Case-insensitive lookup of a canonical name or alias. Spaces and
    /// underscores are interchangeable; `Main` and `(Main)` name the main namespace.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = normalize_spaces(&name.replace('_', " "));
        if normalized.is_empty()
            || normalized.eq_ignore_ascii_case("main")
            || normalized.eq_ignore_ascii_case("(main)")
        {
            return Some(Self::Main);
        }
        if normalized.eq_ignore_ascii_case("image") {
            return Some(Self::File);
        }
        if normalized.eq_ignore_ascii_case("image talk") {
            return Some(Self::FileTalk);
        }
        Self::ALL
            .into_iter()
            .skip(1)
            .find(|namespace| namespace.as_str().eq_ignore_ascii_case(&normalized))
    }
}

/// A syntactically valid page title: namespace index plus the text after the
/// namespace prefix, space-separated and first-letter capitalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Title {
    pub namespace: i32,
    pub text: String,
}

impl Title {
    pub fn new(namespace: i32, text: impl Into<String>) -> Self {
        Self {
            namespace,
            text: text.into(),
        }
    }

    pub fn db_key(&self) -> String {
        self.text.replace(' ', "_")
    }
}

/// Parse title text the way the wiki does: underscores become spaces, runs of
/// whitespace collapse, a leading `:` is dropped, a `#fragment` is cut off, a
/// recognised namespace prefix is split off and the first letter is upper-cased.
pub fn parse_title<F>(text: &str, namespace_lookup: F) -> Option<Title>
where
    F: Fn(&str) -> Option<i32>,
{
    let mut value = normalize_spaces(&text.replace('_', " "));
    if let Some(stripped) = value.strip_prefix(':') {
        value = stripped.trim_start().to_string();
    }
    if let Some((before, _fragment)) = value.split_once('#') {
        value = before.trim_end().to_string();
    }
    if value.is_empty()
        || value
            .chars()
            .any(|ch| ILLEGAL_TITLE_CHARS.contains(&ch) || ch.is_control())
    {
        return None;
    }

    let mut namespace = NS_MAIN;
    let mut body = value.as_str();
    if let Some((prefix, rest)) = value.split_once(':')
        && let Some(id) = namespace_lookup(prefix.trim())
        && id != NS_MAIN
    {
        namespace = id;
        body = rest.trim();
    }
    if body.is_empty() || body.len() > MAX_TITLE_BYTES {
        return None;
    }

    Some(Title::new(namespace, capitalize_first(body)))
}

pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn normalize_spaces(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }

    output.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(prefix: &str) -> Option<i32> {
        Namespace::from_name(prefix).map(Namespace::id)
    }

    #[test]
    fn namespace_names_resolve_case_insensitively() {
        assert_eq!(Namespace::from_name("category"), Some(Namespace::Category));
        assert_eq!(Namespace::from_name("User_talk"), Some(Namespace::UserTalk));
        assert_eq!(Namespace::from_name("Image"), Some(Namespace::File));
        assert_eq!(Namespace::from_name(""), Some(Namespace::Main));
        assert_eq!(Namespace::from_name("(Main)"), Some(Namespace::Main));
        assert_eq!(Namespace::from_name("Nowhere"), None);
    }

    #[test]
    fn namespace_ids_round_trip() {
        for namespace in Namespace::ALL {
            assert_eq!(Namespace::from_id(namespace.id()), Some(namespace));
        }
        assert_eq!(Namespace::from_id(3000), None);
    }

    #[test]
    fn parse_title_splits_namespace_and_capitalises() {
        let title = parse_title("template:foo_bar  baz", builtin).expect("title");
        assert_eq!(title.namespace, NS_TEMPLATE);
        assert_eq!(title.text, "Foo bar baz");
        assert_eq!(title.db_key(), "Foo_bar_baz");
    }

    #[test]
    fn parse_title_keeps_unknown_prefixes_in_main() {
        let title = parse_title("Goldenlight:Page", builtin).expect("title");
        assert_eq!(title.namespace, NS_MAIN);
        assert_eq!(title.text, "Goldenlight:Page");
    }

    #[test]
    fn parse_title_drops_fragment_and_leading_colon() {
        let title = parse_title(":Category:Animals#Top", builtin).expect("title");
        assert_eq!(title, Title::new(NS_CATEGORY, "Animals"));
    }

    #[test]
    fn parse_title_rejects_invalid_text() {
        assert!(parse_title("", builtin).is_none());
        assert!(parse_title("   ", builtin).is_none());
        assert!(parse_title("A[b]", builtin).is_none());
        assert!(parse_title("Category:", builtin).is_none());
        assert!(parse_title("#only-fragment", builtin).is_none());
    }

    #[test]
    fn capitalize_first_handles_unicode() {
        assert_eq!(capitalize_first("über"), "Über");
        assert_eq!(capitalize_first(""), "");
    }
}
