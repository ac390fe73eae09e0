// src/convert/normalize.rs
// =============================================================================
// This module turns a page URL into the local Markdown file name it is
// mirrored under.
//
// How it works:
// 1. Take the URL's path (query string and fragment are ignored)
// 2. Percent-decode it so "Caf%C3%A9" becomes "Café"
// 3. Replace every character outside the allowed charset with '-'
// 4. Collapse runs of '-' and strip them from both ends
// 5. Fall back to "index" when nothing is left, then add the extension
//
// The mapping is deterministic but not injective: "/foo-bar" and "/foo_bar"
// both become "foo-bar.md". Colliding pages are mirrored once.
// =============================================================================

use clap::ValueEnum;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

const SEPARATOR: char = '-';
const INDEX_STEM: &str = "index";

// File extension used for every page of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extension {
    /// Plain Markdown (.md)
    #[default]
    Md,
    /// MDX (.mdx), for documentation generators that expect it
    Mdx,
}

impl Extension {
    pub fn as_str(self) -> &'static str {
        match self {
            Extension::Md => "md",
            Extension::Mdx => "mdx",
        }
    }
}

// Characters that survive transliteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    /// ASCII letters only
    Letters,
    /// ASCII letters and digits plus accented Latin letters (U+00C0 to U+024F)
    #[default]
    Extended,
}

impl Charset {
    fn allows(self, c: char) -> bool {
        match self {
            Charset::Letters => c.is_ascii_alphabetic(),
            Charset::Extended => {
                c.is_ascii_alphanumeric()
                    || (('\u{00C0}'..='\u{024F}').contains(&c) && c != '×' && c != '÷')
            }
        }
    }
}

// Maps URLs to canonical file names
//
// Copy is cheap (two enums), so the rewriter and the coordinator each keep
// their own instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UrlNormalizer {
    charset: Charset,
    extension: Extension,
}

impl UrlNormalizer {
    pub fn new(charset: Charset, extension: Extension) -> Self {
        Self { charset, extension }
    }

    // Parses `raw` and returns its file name
    //
    // Returns None (and logs) when the URL cannot be parsed. An unparsable
    // link is never silently mapped to "index".
    pub fn normalize(&self, raw: &str) -> Option<String> {
        match Url::parse(raw) {
            Ok(url) => Some(self.file_name(&url)),
            Err(e) => {
                warn!(url = raw, error = %e, "Invalid URL, cannot derive a file name");
                None
            }
        }
    }

    pub fn file_name(&self, url: &Url) -> String {
        self.file_name_for_path(url.path())
    }

    pub fn file_name_for_path(&self, path: &str) -> String {
        let decoded = percent_decode_str(path).decode_utf8_lossy();

        let mut stem = String::with_capacity(decoded.len());
        for c in decoded.chars() {
            let c = if self.charset.allows(c) { c } else { SEPARATOR };
            if c == SEPARATOR && stem.ends_with(SEPARATOR) {
                continue;
            }
            stem.push(c);
        }

        let stem = stem.trim_matches(SEPARATOR);
        let stem = if stem.is_empty() { INDEX_STEM } else { stem };

        format!("{}.{}", stem, self.extension.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> UrlNormalizer {
        UrlNormalizer::default()
    }

    #[test]
    fn test_simple_path() {
        let name = normalizer().normalize("https://example.com/Foo-Bar");
        assert_eq!(name.as_deref(), Some("Foo-Bar.md"));
    }

    #[test]
    fn test_nested_path_uses_separator() {
        let name = normalizer().normalize("https://example.com/wiki/Getting_Started/");
        assert_eq!(name.as_deref(), Some("wiki-Getting-Started.md"));
    }

    #[test]
    fn test_root_is_index() {
        assert_eq!(normalizer().normalize("https://example.com/").as_deref(), Some("index.md"));
        assert_eq!(normalizer().normalize("https://example.com").as_deref(), Some("index.md"));
    }

    #[test]
    fn test_only_separators_is_index() {
        assert_eq!(normalizer().file_name_for_path("/--/__/"), "index.md");
        assert_eq!(normalizer().file_name_for_path(""), "index.md");
    }

    #[test]
    fn test_invalid_url_is_none() {
        assert_eq!(normalizer().normalize("not a url"), None);
        assert_eq!(normalizer().normalize("/relative/only"), None);
    }

    #[test]
    fn test_deterministic() {
        let n = normalizer();
        let url = "https://example.com/docs/Install%20Guide?x=1#top";
        assert_eq!(n.normalize(url), n.normalize(url));
    }

    #[test]
    fn test_query_and_fragment_ignored() {
        let n = normalizer();
        assert_eq!(
            n.normalize("https://example.com/page?action=view#intro"),
            n.normalize("https://example.com/page")
        );
    }

    #[test]
    fn test_accepted_collisions() {
        let n = normalizer();
        assert_eq!(n.file_name_for_path("/foo-bar"), n.file_name_for_path("/foo_bar"));
        assert_eq!(n.file_name_for_path("/foo-bar"), "foo-bar.md");
    }

    #[test]
    fn test_separator_runs_collapse() {
        assert_eq!(normalizer().file_name_for_path("/a...b///c"), "a-b-c.md");
    }

    #[test]
    fn test_extended_charset_keeps_accents_and_digits() {
        let n = UrlNormalizer::new(Charset::Extended, Extension::Md);
        assert_eq!(n.file_name_for_path("/Caf%C3%A9/2024"), "Café-2024.md");
    }

    #[test]
    fn test_letters_charset_drops_digits_and_accents() {
        let n = UrlNormalizer::new(Charset::Letters, Extension::Md);
        assert_eq!(n.file_name_for_path("/Caf%C3%A9/2024"), "Caf.md");
        assert_eq!(n.file_name_for_path("/2024"), "index.md");
    }

    #[test]
    fn test_mdx_extension() {
        let n = UrlNormalizer::new(Charset::Extended, Extension::Mdx);
        assert_eq!(n.file_name_for_path("/guide"), "guide.mdx");
        assert_eq!(n.file_name_for_path("/"), "index.mdx");
    }

    #[test]
    fn test_multiplication_sign_is_not_a_letter() {
        assert_eq!(normalizer().file_name_for_path("/4%C3%974"), "4-4.md");
    }
}
