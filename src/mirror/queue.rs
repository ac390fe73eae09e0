// src/mirror/queue.rs
// =============================================================================
// This module drives the mirror: it walks the site and writes every page
// once.
//
// How it works:
// 1. Start with the start URL in a queue
// 2. Compute the page's file name and claim it (dedup, ignore patterns,
//    page ceiling; one atomic decision)
// 3. Fetch the page, rewrite it, download its new images, write the Markdown
// 4. Queue every same-domain link of the raw page
// 5. Repeat until the queue is empty, the ceiling is hit or the run is
//    cancelled
//
// Each step is logged; a failing page or image never stops the run.
// =============================================================================

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::report::MirrorReport;
use super::state::{CrawlState, PageClaim};
use crate::config::{ConfigError, MirrorConfig};
use crate::convert::{
    extract_same_domain_links, leftover_internal_targets, to_markdown, ContentRewriter,
    DomainFilter, ImageAsset, UrlNormalizer,
};
use crate::fetch::{FetchError, Fetcher};

// One page waiting to be mirrored
#[derive(Debug, Clone)]
struct CrawlTarget {
    url: Url,
    folder: PathBuf,
}

pub struct Mirror {
    fetcher: Fetcher,
    rewriter: ContentRewriter,
    normalizer: UrlNormalizer,
    filter: DomainFilter,
    ignore: Vec<String>,
    site_folder: PathBuf,
    image_concurrency: usize,
    state: CrawlState,
    cancel: CancellationToken,
}

impl Mirror {
    pub fn new(
        config: &MirrorConfig,
        fetcher: Fetcher,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        let filter = DomainFilter::new(&config.domain);
        let normalizer = UrlNormalizer::new(config.charset, config.extension);
        let rewriter = ContentRewriter::new(
            filter.clone(),
            normalizer,
            config.root_selector()?,
            config.root_selector.clone(),
        )
        .with_image_scope(config.images)
        .with_class_captions(config.class_captions);

        Ok(Self {
            fetcher,
            rewriter,
            normalizer,
            filter,
            ignore: config
                .ignore
                .iter()
                .filter(|pattern| !pattern.is_empty())
                .cloned()
                .collect(),
            site_folder: config.site_folder(),
            image_concurrency: config.image_concurrency.max(1),
            state: CrawlState::new(config.max_pages),
            cancel,
        })
    }

    pub fn site_folder(&self) -> &Path {
        &self.site_folder
    }

    // Creates the site folder, removing it first when `clear` is set
    pub async fn prepare_output(&self, clear: bool) -> std::io::Result<()> {
        if clear && tokio::fs::try_exists(&self.site_folder).await? {
            info!("Clearing {:?}", self.site_folder);
            tokio::fs::remove_dir_all(&self.site_folder).await?;
        }
        tokio::fs::create_dir_all(&self.site_folder).await
    }

    // Mirrors everything reachable from `start`
    //
    // Returns once the queue is empty, the page ceiling is reached or the
    // cancellation token fires. Files already written stay on disk.
    pub async fn run(&self, start: Url) -> MirrorReport {
        let mut report = MirrorReport::default();

        let mut queue = VecDeque::new();
        queue.push_back(CrawlTarget {
            url: start,
            folder: self.site_folder.clone(),
        });

        while let Some(target) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let links = self.visit(&target, &mut report).await;
            if report.limit_reached || report.cancelled {
                break;
            }

            // Every descendant of this page is queued before the next page
            // is taken.
            queue.extend(links.into_iter().map(|url| CrawlTarget {
                url,
                folder: self.site_folder.clone(),
            }));
        }

        info!(
            "Mirror finished: {} page(s) written, {} image(s) downloaded, {} failure(s), {} file name(s) visited",
            report.pages_written,
            report.images_downloaded,
            report.failures(),
            self.state.visited_count()
        );
        report
    }

    // Processes one target and returns the same-domain links it discovered
    async fn visit(&self, target: &CrawlTarget, report: &mut MirrorReport) -> Vec<Url> {
        let Some(file_name) = self.normalizer.normalize(target.url.as_str()) else {
            return Vec::new();
        };

        match self.state.claim_page(&file_name, self.is_ignored(&file_name)) {
            PageClaim::Fetch => {}
            PageClaim::Visited => {
                debug!("Skipping already visited {} ({})", target.url, file_name);
                report.duplicates_skipped += 1;
                return Vec::new();
            }
            PageClaim::Filtered => {
                info!("Ignoring {} ({} matches an ignore pattern)", target.url, file_name);
                report.pages_filtered += 1;
                return Vec::new();
            }
            PageClaim::LimitReached => {
                warn!("Page limit reached, not fetching {}", target.url);
                report.limit_reached = true;
                return Vec::new();
            }
        }

        info!("Mirroring {} -> {}", target.url, file_name);

        let html = match self.cancellable(self.fetcher.fetch_page(&target.url)).await {
            Some(Ok(html)) => html,
            Some(Err(FetchError::NotHtml { content_type, .. })) => {
                info!("Skipping {} ({} is not a page)", target.url, content_type);
                report.pages_not_html += 1;
                return Vec::new();
            }
            Some(Err(e)) => {
                log_fetch_failure("page", &e);
                report.pages_failed += 1;
                return Vec::new();
            }
            None => {
                report.cancelled = true;
                return Vec::new();
            }
        };

        let page = self.rewriter.rewrite(&html, &target.url);
        debug!(
            "Rewrote {} link(s) and {} image reference(s) on {}",
            page.links_rewritten,
            page.images.len(),
            target.url
        );

        if !self
            .download_images(&page.images, &target.folder, report)
            .await
        {
            report.cancelled = true;
            return Vec::new();
        }

        let markdown = to_markdown(&page.html);
        for leftover in leftover_internal_targets(&markdown, &self.filter) {
            warn!("{} still links to the live site: {}", file_name, leftover);
        }

        let path = target.folder.join(&file_name);
        match tokio::fs::write(&path, markdown.as_bytes()).await {
            Ok(()) => {
                debug!("Wrote {} bytes to {:?}", markdown.len(), path);
                report.pages_written += 1;
            }
            Err(e) => {
                error!("Failed to write {:?}: {}", path, e);
                report.pages_failed += 1;
            }
        }

        let links = extract_same_domain_links(&html, &target.url, &self.filter);
        report.links_discovered += links.len();
        links
    }

    // Claims the page's images in document order, then downloads the newly
    // claimed ones with bounded concurrency
    //
    // Two sources can share a local file name (`/a/logo.png`, `/b/logo.png`).
    // Only the first of them is downloaded in a batch so no two downloads
    // write the same file at once; the page references that file for both.
    //
    // Returns false if the run was cancelled mid-way.
    async fn download_images(
        &self,
        images: &[ImageAsset],
        folder: &Path,
        report: &mut MirrorReport,
    ) -> bool {
        let mut claimed = Vec::new();
        let mut batch_names = HashSet::new();
        for image in images {
            if !self.state.claim_image(image.source.as_str()) {
                report.images_reused += 1;
            } else if !batch_names.insert(image.file_name.as_str()) {
                debug!(
                    "{} shares the file name {} with an earlier image, reusing it",
                    image.source, image.file_name
                );
                report.images_reused += 1;
            } else {
                claimed.push(image);
            }
        }
        if claimed.is_empty() {
            return true;
        }

        let downloads = stream::iter(claimed)
            .map(|image| async move {
                let dest = folder.join(&image.file_name);
                (image, self.fetcher.download(&image.source, &dest).await)
            })
            .buffer_unordered(self.image_concurrency)
            .collect::<Vec<_>>();

        let Some(results) = self.cancellable(downloads).await else {
            return false;
        };

        for (image, result) in results {
            match result {
                Ok(bytes) => {
                    debug!("Saved image {} ({} bytes)", image.file_name, bytes);
                    report.images_downloaded += 1;
                }
                Err(e) => {
                    log_fetch_failure("image", &e);
                    report.images_failed += 1;
                }
            }
        }
        true
    }

    fn is_ignored(&self, file_name: &str) -> bool {
        self.ignore
            .iter()
            .any(|pattern| file_name.contains(pattern.as_str()))
    }

    // Runs `future` unless the run is cancelled first
    async fn cancellable<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            output = future => Some(output),
        }
    }
}

fn log_fetch_failure(kind: &str, error: &FetchError) {
    match error {
        FetchError::Io { .. } => error!("Failed to save {}: {}", kind, error),
        _ => warn!("Failed to fetch {}: {}", kind, error),
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why a queue instead of recursion?
//    - An async fn cannot call itself without boxing the future
//    - The queue makes the order explicit: a page's links are all queued
//      before the next page is taken, first in first out
//
// 2. Where is the dedup decision made?
//    - CrawlState::claim_page, under one mutex, before any fetch or write
//    - Images are claimed one by one in document order, and only the claimed
//      ones reach buffer_unordered, at most one per local file name
//
// 3. What does tokio::select! do in cancellable()?
//    - Polls both futures and returns as soon as one finishes
//    - If the token fires first, the request future is dropped, which aborts it
// -----------------------------------------------------------------------------
