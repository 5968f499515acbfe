//! Value coercions shared by the generic pipeline and the custom handlers.
//! Every function is total: failures come back as `None`, never as a panic.

use std::sync::OnceLock;

use regex::Regex;

use crate::host::TitleResolver;
use crate::query::PageRef;

static HTML_TAG_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Conventional boolean spellings; anything else is `None`.
pub fn filter_boolean(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Removes tag-like substrings that mention `html`, e.g. `<html>` or
/// `</HTML>`. Other markup is left alone.
pub fn strip_html_tags(text: &str) -> String {
    match HTML_TAG_RE.get_or_init(|| Regex::new(r"(?is)<.*?html.*?>").ok()) {
        Some(re) => re.replace_all(text, "").into_owned(),
        None => text.to_string(),
    }
}

/// Numeric text truncates toward zero; other text falls back to `default`.
pub fn coerce_integer(raw: &str, default: Option<i64>) -> Option<i64> {
    parse_numeric(raw).or(default)
}

fn parse_numeric(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.' | 'e' | 'E'))
        || !trimmed.chars().any(|ch| ch.is_ascii_digit())
    {
        return None;
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    // `as` saturates at the i64 bounds.
    Some(value.trunc() as i64)
}

/// Splits a `|`-separated page list. Entries are trimmed, lose one trailing
/// backslash and are skipped when empty. With `must_exist` every entry has to
/// resolve to a title or the whole list is rejected.
pub fn resolve_page_name_list(
    raw: &str,
    must_exist: bool,
    titles: &dyn TitleResolver,
) -> Option<Vec<PageRef>> {
    let mut pages = Vec::new();
    for entry in raw.trim().split('|') {
        let entry = entry.trim();
        let entry = entry.strip_suffix('\\').unwrap_or(entry);
        if entry.is_empty() {
            continue;
        }
        if must_exist {
            pages.push(PageRef::Title(titles.resolve_title(entry)?));
        } else {
            pages.push(PageRef::Name(entry.to_string()));
        }
    }
    Some(pages)
}

pub fn to_db_key(text: &str) -> String {
    text.replace(' ', "_")
}

/// Turns the two characters `\n` into a real line break.
pub fn replace_newline_escapes(text: &str) -> String {
    text.replace("\\n", "\n")
}

/// Decodes the character references editors use to write a literal `&`,
/// quotes, angle brackets and non-breaking spaces, plus numeric references.
/// Unknown or malformed references are kept verbatim.
pub fn decode_html_entities(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        output.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match candidate.find(';').and_then(|end| {
            decode_entity(&candidate[1..end]).map(|decoded| (decoded, end))
        }) {
            Some((decoded, end)) => {
                output.push(decoded);
                rest = &candidate[end + 1..];
            }
            None => {
                output.push('&');
                rest = &candidate[1..];
            }
        }
    }
    output.push_str(rest);
    output
}

/// True when `text` opens with a character reference `decode_html_entities`
/// would replace.
pub fn starts_with_entity(text: &str) -> bool {
    text.strip_prefix('&')
        .and_then(|rest| rest.find(';').map(|end| &rest[..end]))
        .and_then(decode_entity)
        .is_some()
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}
