// src/convert/rewrite.rs
// =============================================================================
// This module rewrites a fetched page so it points at mirrored files.
//
// Steps, in this order:
// 1. Select the root scope with a CSS selector (`scraper`)
// 2. Re-parse the scope into a mutable DOM (`html5ever` + `markup5ever_rcdom`)
// 3. Rewrite every <img src> to a local file name, in document order
// 4. Rewrite every same-domain <a href> to the target page's file name
// 5. Serialize the rewritten scope back to HTML
//
// Nothing here touches the network or the disk. The images that need
// downloading come back as a list and the coordinator fetches them.
// =============================================================================

use std::rc::Rc;

use clap::ValueEnum;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use super::links::{resolve_link, DomainFilter};
use super::normalize::UrlNormalizer;

// Characters left unescaped when a local file name is written into src
const FILE_REF: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

// Which images get localized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageScope {
    /// Download every image, whatever host serves it
    #[default]
    All,
    /// Only download images from the mirrored domain; leave others as absolute URLs
    SameDomain,
}

// An image the rewritten page now references locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// Absolute URL to download from
    pub source: Url,
    /// Name of the file on disk, next to the page
    pub file_name: String,
}

#[derive(Debug, Default)]
pub struct RewrittenPage {
    /// The rewritten root scope, serialized back to HTML
    pub html: String,
    /// Every localized image in document order (may contain repeats)
    pub images: Vec<ImageAsset>,
    /// Number of anchors pointed at local file names
    pub links_rewritten: usize,
}

pub struct ContentRewriter {
    filter: DomainFilter,
    normalizer: UrlNormalizer,
    root: Selector,
    root_source: String,
    image_scope: ImageScope,
    class_captions: bool,
}

impl ContentRewriter {
    pub fn new(
        filter: DomainFilter,
        normalizer: UrlNormalizer,
        root: Selector,
        root_source: impl Into<String>,
    ) -> Self {
        Self {
            filter,
            normalizer,
            root,
            root_source: root_source.into(),
            image_scope: ImageScope::default(),
            class_captions: false,
        }
    }

    pub fn with_image_scope(mut self, scope: ImageScope) -> Self {
        self.image_scope = scope;
        self
    }

    pub fn with_class_captions(mut self, enabled: bool) -> Self {
        self.class_captions = enabled;
        self
    }

    pub fn rewrite(&self, html: &str, page_url: &Url) -> RewrittenPage {
        let scope = self.select_root(html);
        let dom = parse_html(scope);

        let Some(body) = first_element(&dom.document, "body") else {
            warn!(url = %page_url, "Page has no <body> after parsing, nothing to convert");
            return RewrittenPage::default();
        };

        let images = self.rewrite_images(&body, page_url);
        let links_rewritten = self.rewrite_links(&body, page_url);

        RewrittenPage {
            html: serialize_children(&body),
            images,
            links_rewritten,
        }
    }

    // Returns the outer HTML of the root scope, falling back to <body>
    fn select_root(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        if let Some(root) = document.select(&self.root).next() {
            return root.html();
        }

        warn!(selector = %self.root_source, "Root selector matched nothing, using <body>");
        let body = Selector::parse("body").expect("'body' is a valid selector");
        document
            .select(&body)
            .next()
            .map(|element| element.html())
            .unwrap_or_default()
    }

    fn rewrite_images(&self, body: &Handle, page_url: &Url) -> Vec<ImageAsset> {
        let mut images = Vec::new();

        for img in elements_by_tag(body, "img") {
            let Some(src) = attribute(&img, "src") else {
                continue;
            };
            let Some(source) = resolve_image(page_url, &src) else {
                debug!(src, "Skipping image without a downloadable source");
                continue;
            };
            if self.image_scope == ImageScope::SameDomain && !self.filter.matches(&source) {
                continue;
            }
            let Some(file_name) = image_file_name(&source) else {
                debug!(src = %source, "Skipping image without a file name");
                continue;
            };

            set_attribute(&img, "src", &utf8_percent_encode(&file_name, FILE_REF).to_string());
            // srcset would still point at the live site
            remove_attribute(&img, "srcset");

            if self.class_captions {
                let classes = attribute(&img, "class").unwrap_or_default();
                let classes: Vec<&str> = classes.split_whitespace().collect();
                if !classes.is_empty() {
                    if let Some(caption) = caption_paragraph(&classes) {
                        insert_after(&img, caption);
                    }
                }
            }

            images.push(ImageAsset { source, file_name });
        }

        images
    }

    fn rewrite_links(&self, body: &Handle, page_url: &Url) -> usize {
        let mut rewritten = 0;

        for anchor in elements_by_tag(body, "a") {
            let Some(href) = attribute(&anchor, "href") else {
                continue;
            };
            let Some(target) = resolve_link(page_url, &href) else {
                continue;
            };
            if !self.filter.matches(&target) {
                continue;
            }

            set_attribute(&anchor, "href", &self.normalizer.file_name(&target));
            rewritten += 1;
        }

        rewritten
    }
}

fn resolve_image(page_url: &Url, src: &str) -> Option<Url> {
    let src = src.trim();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    page_url
        .join(src)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

// Last non-empty path segment, decoded and made safe to use as a file name
fn image_file_name(source: &Url) -> Option<String> {
    let segment = source.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let name: String = decoded
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '-' } else { c })
        .collect();

    match name.trim() {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

fn parse_html(html: String) -> RcDom {
    parse_document(RcDom::default(), ParseOpts::default()).one(html)
}

fn first_element(node: &Handle, tag: &str) -> Option<Handle> {
    if is_element(node, tag) {
        return Some(node.clone());
    }
    node.children
        .borrow()
        .iter()
        .find_map(|child| first_element(child, tag))
}

// All elements named `tag` under `node`, in document order
fn elements_by_tag(node: &Handle, tag: &str) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_elements(node, tag, &mut found);
    found
}

fn collect_elements(node: &Handle, tag: &str, found: &mut Vec<Handle>) {
    if is_element(node, tag) {
        found.push(node.clone());
    }
    for child in node.children.borrow().iter() {
        collect_elements(child, tag, found);
    }
}

fn is_element(node: &Handle, tag: &str) -> bool {
    matches!(&node.data, NodeData::Element { name, .. } if &*name.local == tag)
}

fn attribute(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

fn set_attribute(node: &Handle, name: &str, value: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        if let Some(attr) = attrs
            .borrow_mut()
            .iter_mut()
            .find(|attr| &*attr.name.local == name)
        {
            attr.value = StrTendril::from_slice(value);
        }
    }
}

fn remove_attribute(node: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs.borrow_mut().retain(|attr| &*attr.name.local != name);
    }
}

// Builds a detached <p>{.class} {.other}</p> node
fn caption_paragraph(classes: &[&str]) -> Option<Handle> {
    let tokens = classes
        .iter()
        .map(|class| format!("{{.{}}}", escape_text(class)))
        .collect::<Vec<_>>()
        .join(" ");

    let dom = parse_html(format!("<p>{}</p>", tokens));
    let paragraph = first_element(&dom.document, "p")?;

    // Unlink from the scratch document before it is dropped, otherwise
    // RcDom's drop would empty the paragraph too.
    if let Some(parent) = parent_of(&paragraph) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, &paragraph));
    }
    paragraph.parent.take();

    Some(paragraph)
}

fn insert_after(node: &Handle, sibling: Handle) {
    let Some(parent) = parent_of(node) else {
        return;
    };
    let mut children = parent.children.borrow_mut();
    let Some(index) = children.iter().position(|child| Rc::ptr_eq(child, node)) else {
        return;
    };
    sibling.parent.set(Some(Rc::downgrade(&parent)));
    children.insert(index + 1, sibling);
}

fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|weak| weak.upgrade());
    node.parent.set(weak);
    parent
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn serialize_children(node: &Handle) -> String {
    let mut bytes = Vec::new();
    let handle = SerializableHandle::from(node.clone());
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::ChildrenOnly(None),
        ..Default::default()
    };

    if let Err(e) = serialize(&mut bytes, &handle, opts) {
        warn!(error = %e, "Failed to serialize rewritten HTML");
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewriter(root: &str) -> ContentRewriter {
        ContentRewriter::new(
            DomainFilter::new("example.com"),
            UrlNormalizer::default(),
            Selector::parse(root).unwrap(),
            root,
        )
    }

    fn page_url() -> Url {
        Url::parse("https://example.com/wiki/Home").unwrap()
    }

    // Values of `attr` on every element matching `selector`
    fn attrs(html: &str, selector: &str, attr: &str) -> Vec<String> {
        let fragment = Html::parse_fragment(html);
        let selector = Selector::parse(selector).unwrap();
        fragment
            .select(&selector)
            .filter_map(|el| el.value().attr(attr).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_same_domain_anchor_points_at_file_name() {
        let html = r#"<body><a href="https://example.com/Foo-Bar">x</a></body>"#;
        let page = rewriter("body").rewrite(html, &page_url());

        assert_eq!(attrs(&page.html, "a", "href"), vec!["Foo-Bar.md"]);
        assert_eq!(page.links_rewritten, 1);
    }

    #[test]
    fn test_relative_and_www_anchors_are_rewritten() {
        let html = r#"<body>
            <a href="/docs/Install">a</a>
            <a href="Other">b</a>
            <a href="https://WWW.example.com/About">c</a>
        </body>"#;
        let page = rewriter("body").rewrite(html, &page_url());

        assert_eq!(
            attrs(&page.html, "a", "href"),
            vec!["docs-Install.md", "wiki-Other.md", "About.md"]
        );
    }

    #[test]
    fn test_external_and_fragment_anchors_untouched() {
        let html = r##"<body>
            <a href="https://www.rust-lang.org/learn">rust</a>
            <a href="#top">top</a>
            <a href="mailto:me@example.com">mail</a>
        </body>"##;
        let page = rewriter("body").rewrite(html, &page_url());

        assert_eq!(
            attrs(&page.html, "a", "href"),
            vec!["https://www.rust-lang.org/learn", "#top", "mailto:me@example.com"]
        );
        assert_eq!(page.links_rewritten, 0);
    }

    #[test]
    fn test_images_are_localized_in_document_order() {
        let html = r#"<body>
            <img src="/media/logo.png" alt="logo">
            <img alt="no source">
            <img src="https://cdn.other.net/pics/diagram%20v2.svg">
            <img src="/media/logo.png">
        </body>"#;
        let page = rewriter("body").rewrite(html, &page_url());

        assert_eq!(
            attrs(&page.html, "img[src]", "src"),
            vec!["logo.png", "diagram%20v2.svg", "logo.png"]
        );
        let names: Vec<&str> = page.images.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["logo.png", "diagram v2.svg", "logo.png"]);
        assert_eq!(page.images[0].source.as_str(), "https://example.com/media/logo.png");
    }

    #[test]
    fn test_same_domain_image_scope_leaves_external_images() {
        let html = r#"<body>
            <img src="/a.png">
            <img src="https://cdn.other.net/b.png">
        </body>"#;
        let page = rewriter("body")
            .with_image_scope(ImageScope::SameDomain)
            .rewrite(html, &page_url());

        assert_eq!(
            attrs(&page.html, "img", "src"),
            vec!["a.png", "https://cdn.other.net/b.png"]
        );
        assert_eq!(page.images.len(), 1);
    }

    #[test]
    fn test_data_uri_images_are_skipped() {
        let html = r#"<body><img src="data:image/png;base64,AAAA"></body>"#;
        let page = rewriter("body").rewrite(html, &page_url());
        assert!(page.images.is_empty());
    }

    #[test]
    fn test_srcset_is_dropped_from_localized_images() {
        let html = r#"<body><img src="/a.png" srcset="/a@2x.png 2x"></body>"#;
        let page = rewriter("body").rewrite(html, &page_url());
        assert!(attrs(&page.html, "img", "srcset").is_empty());
    }

    #[test]
    fn test_class_captions_follow_the_image() {
        let html = r#"<body><div><img class="thumb  left" src="/a.png"><span>after</span></div></body>"#;
        let page = rewriter("body")
            .with_class_captions(true)
            .rewrite(html, &page_url());

        assert!(
            page.html.contains(r#"<img class="thumb  left" src="a.png"><p>{.thumb} {.left}</p><span>after</span>"#),
            "unexpected html: {}",
            page.html
        );
    }

    #[test]
    fn test_class_caption_is_literal_in_markdown() {
        let html = r#"<body><p><img class="thumb_left wide" src="/a.png"></p></body>"#;
        let page = rewriter("body")
            .with_class_captions(true)
            .rewrite(html, &page_url());
        let markdown = super::super::markdown::to_markdown(&page.html);

        assert!(markdown.contains("{.thumb_left} {.wide}"), "markdown: {}", markdown);
    }

    #[test]
    fn test_no_caption_without_classes_or_when_disabled() {
        let html = r#"<body><img class="thumb" src="/a.png"><img src="/b.png"></body>"#;

        let disabled = rewriter("body").rewrite(html, &page_url());
        assert!(!disabled.html.contains("<p>"));

        let enabled = rewriter("body")
            .with_class_captions(true)
            .rewrite(html, &page_url());
        assert_eq!(enabled.html.matches("<p>").count(), 1);
    }

    #[test]
    fn test_root_selector_scopes_output() {
        let html = r#"<html><body>
            <nav><a href="/nav-only">nav</a></nav>
            <main id="content"><p>Hello</p><a href="/Page">page</a></main>
        </body></html>"#;
        let page = rewriter("#content").rewrite(html, &page_url());

        assert!(page.html.contains("Hello"));
        assert!(!page.html.contains("nav"));
        assert_eq!(attrs(&page.html, "a", "href"), vec!["Page.md"]);
    }

    #[test]
    fn test_unmatched_root_selector_falls_back_to_body() {
        let html = r#"<html><body><p>Body text</p></body></html>"#;
        let page = rewriter("#missing").rewrite(html, &page_url());
        assert!(page.html.contains("Body text"));
    }

    #[test]
    fn test_no_same_domain_absolute_urls_remain() {
        let html = r#"<body>
            <a href="https://example.com/A">a</a>
            <a href="http://www.example.com/B?x=1">b</a>
            <img src="https://example.com/img/c.png">
            <img src="//example.com/img/d.png">
        </body>"#;
        let page = rewriter("body").rewrite(html, &page_url());
        let filter = DomainFilter::new("example.com");

        let leftovers: Vec<String> = attrs(&page.html, "a", "href")
            .into_iter()
            .chain(attrs(&page.html, "img", "src"))
            .filter(|value| Url::parse(value).is_ok_and(|url| filter.matches(&url)))
            .collect();
        assert!(leftovers.is_empty(), "leftover absolute URLs: {:?}", leftovers);
    }

    #[test]
    fn test_image_file_name() {
        let url = Url::parse("https://example.com/a/b/photo.jpg?size=large").unwrap();
        assert_eq!(image_file_name(&url).as_deref(), Some("photo.jpg"));

        let trailing = Url::parse("https://example.com/a/b/").unwrap();
        assert_eq!(image_file_name(&trailing).as_deref(), Some("b"));

        let root = Url::parse("https://example.com/").unwrap();
        assert_eq!(image_file_name(&root), None);
    }
}
