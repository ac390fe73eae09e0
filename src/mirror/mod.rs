// src/mirror/mod.rs
// =============================================================================
// This module handles the crawl itself.
//
// Features:
// - FIFO traversal starting from one URL, restricted to the configured domain
// - Every file name is fetched and written at most once per run
// - Ignore patterns, a page ceiling and cancellation
// - A report of what happened, for the final summary
// =============================================================================

mod queue;
mod report;
mod state;

pub use queue::Mirror;
pub use report::MirrorReport;
