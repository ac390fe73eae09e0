// src/convert/links.rs
// =============================================================================
// This module decides which links belong to the mirrored site and pulls
// them out of raw HTML pages.
//
// We use the `scraper` crate to select <a href> elements and the `url` crate
// to resolve relative and scheme-relative hrefs against the page URL.
//
// A link is "internal" when:
// - its scheme is http or https
// - its host equals the configured domain, ignoring case and an optional
//   "www." prefix on either side
// =============================================================================

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

// The configured domain every reachability decision is made against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFilter {
    // Lowercased, without "www." and without a trailing dot
    domain: String,
}

impl DomainFilter {
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        Self {
            domain: strip_www(&domain).to_string(),
        }
    }

    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        strip_www(&host) == self.domain
    }

    pub fn matches(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some_and(|host| self.matches_host(host))
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

// Resolves an href (absolute, relative or scheme-relative) to an absolute URL
//
// Returns None for in-page anchors, non-navigational schemes and anything
// that does not parse. The fragment is dropped so "/a#x" and "/a#y" are the
// same page.
//
// Examples:
//   base = "https://example.com/docs/page"
//   href = "/about"              -> Some("https://example.com/about")
//   href = "../other"            -> Some("https://example.com/other")
//   href = "//example.com/x"     -> Some("https://example.com/x")
//   href = "#section"            -> None
//   href = "mailto:me@host"      -> None
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base.join(href) {
        Ok(mut url) => {
            url.set_fragment(None);
            Some(url)
        }
        Err(e) => {
            debug!(href, base = %base, error = %e, "Skipping unresolvable link");
            None
        }
    }
}

// Extracts every same-domain link of a page, in document order
//
// Parameters:
//   html: the raw page (the whole document, not just the root scope)
//   page_url: the URL the page was fetched from
//   filter: the configured domain
//
// Duplicates are kept; the crawl state deduplicates by file name.
pub fn extract_same_domain_links(html: &str, page_url: &Url, filter: &DomainFilter) -> Vec<Url> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("'a[href]' is a valid selector");

    let links: Vec<Url> = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(page_url, href))
        .filter(|url| filter.matches(url))
        .collect();

    debug!("Extracted {} same-domain links from {}", links.len(), page_url);
    links
}
