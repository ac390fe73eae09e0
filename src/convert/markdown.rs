// src/convert/markdown.rs
// =============================================================================
// This module turns rewritten HTML into Markdown and checks the result.
//
// - `html2md` does the HTML -> Markdown conversion
// - one regex pass strips image titles: ![alt](url "title") -> ![alt](url)
// - another undoes html2md's escaping inside class markers, so a caption
//   reads {.thumb_left} and not {.thumb\_left}
// - `pulldown-cmark` walks the output to find links that still point at the
//   live site, so the coordinator can warn about them
// =============================================================================

use std::sync::LazyLock;

use pulldown_cmark::{Event, Parser, Tag};
use regex::{Captures, Regex};
use url::Url;

use super::links::DomainFilter;

static IMAGE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(!\[[^\]]*\]\([^)\s]*)\s+"[^"]*"\)"#).expect("image title pattern is valid")
});

// A `{.class}` marker, possibly with backslash escapes inside
static CLASS_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\.(?:[^{}\s\\]|\\[[:punct:]])+\}").expect("class marker pattern is valid")
});

// Converts the rewritten root scope to Markdown
pub fn to_markdown(html: &str) -> String {
    let markdown = strip_image_titles(&html2md::parse_html(html));
    unescape_class_markers(&markdown)
}

pub fn strip_image_titles(markdown: &str) -> String {
    IMAGE_TITLE.replace_all(markdown, "${1})").into_owned()
}

// Drops the backslashes html2md puts before punctuation in class markers
pub fn unescape_class_markers(markdown: &str) -> String {
    CLASS_MARKER
        .replace_all(markdown, |caps: &Captures| {
            let mut marker = String::with_capacity(caps[0].len());
            let mut chars = caps[0].chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\\' && chars.peek().is_some_and(|next| next.is_ascii_punctuation()) {
                    continue;
                }
                marker.push(c);
            }
            marker
        })
        .into_owned()
}

// Returns link and image targets that are still absolute same-domain URLs
//
// After rewriting this should always be empty; anything returned means the
// converter produced a link we did not see in the DOM.
pub fn leftover_internal_targets(markdown: &str, filter: &DomainFilter) -> Vec<String> {
    let mut leftovers = Vec::new();

    for event in Parser::new(markdown) {
        let target = match event {
            Event::Start(Tag::Link(_, dest, _)) | Event::Start(Tag::Image(_, dest, _)) => dest,
            _ => continue,
        };

        if Url::parse(&target).is_ok_and(|url| filter.matches(&url)) {
            leftovers.push(target.to_string());
        }
    }

    leftovers
}
