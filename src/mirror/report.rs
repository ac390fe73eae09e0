// src/mirror/report.rs
// =============================================================================
// Counters collected while a mirror run progresses.
//
// The report is printed as a summary at the end of the run, or serialized to
// JSON with --json.
// =============================================================================

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    /// Pages fetched, converted and written to disk
    pub pages_written: usize,
    /// Candidates whose file name was already visited
    pub duplicates_skipped: usize,
    /// Pages skipped because their file name matched an ignore pattern
    pub pages_filtered: usize,
    /// Same-domain links that answered with something other than HTML
    pub pages_not_html: usize,
    /// Pages that could not be fetched or written
    pub pages_failed: usize,
    /// Images downloaded to disk
    pub images_downloaded: usize,
    /// Image references that reused an earlier download
    pub images_reused: usize,
    /// Images that could not be downloaded
    pub images_failed: usize,
    /// Same-domain links found across all pages (before deduplication)
    pub links_discovered: usize,
    /// The page ceiling stopped the crawl
    pub limit_reached: bool,
    /// The run was cancelled before the queue drained
    pub cancelled: bool,
}

impl MirrorReport {
    pub fn failures(&self) -> usize {
        self.pages_failed + self.images_failed
    }
}
