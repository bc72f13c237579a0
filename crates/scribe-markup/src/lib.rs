//! Markup handling for user-supplied text.
//!
//! Titles, post bodies and chat lines are stored as plain text: every tag is
//! stripped on the way in. Post bodies are rendered as markdown for display,
//! and the rendered HTML is cleaned down to a small formatting whitelist.

use std::collections::HashSet;

use ammonia::Builder;
use pulldown_cmark::{Options, Parser, html};

/// Formatting tags a rendered post body may keep.
pub const BODY_TAGS: &[&str] = &[
    "p", "br", "ul", "ol", "li", "strong", "bold", "i", "em", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Tags whose content is dropped along with the tag itself.
const DROP_CONTENT_TAGS: &[&str] = &["script", "style"];

/// Remove all markup, keeping only text.
pub fn strip_all(text: &str) -> String {
    strip_to_allowed(text, &[])
}

/// Remove every tag not in `allowed` and every attribute.
pub fn strip_to_allowed(text: &str, allowed: &[&str]) -> String {
    let tags: HashSet<&str> = allowed.iter().copied().collect();
    let drop_content: HashSet<&str> = DROP_CONTENT_TAGS
        .iter()
        .copied()
        .filter(|tag| !tags.contains(tag))
        .collect();

    let mut builder = Builder::empty();
    builder.tags(tags).clean_content_tags(drop_content);
    builder.clean(text).to_string()
}

/// Render a stored post body as markdown and sanitize the result.
pub fn render_body(body: &str) -> String {
    let parser = Parser::new_ext(body, Options::empty());
    let mut rendered = String::with_capacity(body.len() * 3 / 2);
    html::push_html(&mut rendered, parser);
    strip_to_allowed(&rendered, BODY_TAGS)
}
