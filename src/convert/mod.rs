// src/convert/mod.rs
// =============================================================================
// This module turns fetched HTML into mirrored Markdown.
//
// Submodules:
// - normalize: URL -> canonical local file name
// - links: domain filter, href resolution, same-domain link discovery
// - rewrite: pure DOM rewrite of <img src> and <a href>
// - markdown: HTML -> Markdown conversion and post-processing
// =============================================================================

mod links;
mod markdown;
mod normalize;
mod rewrite;

pub use links::{extract_same_domain_links, DomainFilter};
pub use markdown::{leftover_internal_targets, to_markdown};
pub use normalize::{Charset, Extension, UrlNormalizer};
pub use rewrite::{ContentRewriter, ImageAsset, ImageScope};
