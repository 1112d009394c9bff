//! Whitelist HTML sanitizer for externally sourced feed content.

use std::collections::{HashMap, HashSet};

use ammonia::Builder;

/// Elements kept in sanitized content.
pub const ALLOWED_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "a", "b", "em", "i", "strong", "ol", "ul", "li", "hr",
    "blockquote", "p", "span", "pre", "code", "img",
];

/// Attributes kept per element; everything else is dropped.
pub const ALLOWED_ATTRIBUTES: &[(&str, &[&str])] = &[("a", &["href", "title"]), ("img", &["src", "alt"])];

fn whitelist() -> Builder<'static> {
    let tags: HashSet<&str> = ALLOWED_TAGS.iter().copied().collect();
    let tag_attributes: HashMap<&str, HashSet<&str>> = ALLOWED_ATTRIBUTES
        .iter()
        .map(|(tag, attrs)| (*tag, attrs.iter().copied().collect()))
        .collect();

    let mut builder = Builder::default();
    builder
        .tags(tags)
        .tag_attributes(tag_attributes)
        .generic_attributes(HashSet::new())
        .link_rel(None)
        .strip_comments(true);
    builder
}

/// Clean feed HTML against the whitelist.
///
/// Disallowed elements are stripped (their text is kept), never escaped;
/// `script` and `style` lose their contents as well.
pub fn sanitize_html(html: &str) -> String {
    whitelist().clean(html).to_string()
}

/// Remove every tag, keeping only text.
pub fn strip_tags(html: &str) -> String {
    let mut builder = Builder::empty();
    builder.clean_content_tags(["script", "style"].into_iter().collect());
    let cleaned = builder.clean(html).to_string();
    decode_basic_entities(&cleaned)
}

// ammonia escapes text for HTML; titles are stored as plain text.
fn decode_basic_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
