// src/mirror/state.rs
// =============================================================================
// This module holds the per-run crawl state.
//
// - visited: file names already claimed (fetched or filtered)
// - images: absolute image URLs already claimed for download
// - pages_claimed: how many pages were claimed for fetching, for the ceiling
//
// Each claim is one check-and-insert under a single mutex, so two callers can
// never both win the same file name or image. The state only grows and is
// dropped with the run.
// =============================================================================

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

// Outcome of asking to process a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClaim {
    /// The caller owns this file name and should fetch the page
    Fetch,
    /// Already visited earlier in the run
    Visited,
    /// Matched an ignore pattern; now marked visited, never fetched
    Filtered,
    /// The page ceiling is reached; nothing else will be fetched
    LimitReached,
}

#[derive(Debug, Default)]
struct Inner {
    visited: HashSet<String>,
    images: HashSet<String>,
    pages_claimed: usize,
}

#[derive(Debug)]
pub struct CrawlState {
    inner: Mutex<Inner>,
    max_pages: usize,
}

impl CrawlState {
    pub fn new(max_pages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_pages,
        }
    }

    // Decides what happens to `file_name`, in this order:
    // already visited -> ignored -> ceiling -> claimed for fetching
    pub fn claim_page(&self, file_name: &str, ignored: bool) -> PageClaim {
        let mut inner = self.lock();

        if inner.visited.contains(file_name) {
            return PageClaim::Visited;
        }
        if ignored {
            inner.visited.insert(file_name.to_string());
            return PageClaim::Filtered;
        }
        if inner.pages_claimed >= self.max_pages {
            return PageClaim::LimitReached;
        }

        inner.visited.insert(file_name.to_string());
        inner.pages_claimed += 1;
        PageClaim::Fetch
    }

    // Returns true exactly once per image URL
    pub fn claim_image(&self, source: &str) -> bool {
        self.lock().images.insert(source.to_string())
    }

    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    // Every update is a single insert, so a poisoned lock still holds
    // consistent sets.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_page_claimed_once() {
        let state = CrawlState::new(10);
        assert_eq!(state.claim_page("a.md", false), PageClaim::Fetch);
        assert_eq!(state.claim_page("a.md", false), PageClaim::Visited);
        assert_eq!(state.claim_page("b.md", false), PageClaim::Fetch);
        assert_eq!(state.visited_count(), 2);
    }

    #[test]
    fn test_filtered_page_is_marked_visited() {
        let state = CrawlState::new(10);
        assert_eq!(state.claim_page("Page-edit.md", true), PageClaim::Filtered);
        assert_eq!(state.claim_page("Page-edit.md", false), PageClaim::Visited);
        assert_eq!(state.visited_count(), 1);
    }

    #[test]
    fn test_visited_wins_over_filter() {
        let state = CrawlState::new(10);
        assert_eq!(state.claim_page("a.md", false), PageClaim::Fetch);
        assert_eq!(state.claim_page("a.md", true), PageClaim::Visited);
    }

    #[test]
    fn test_ceiling_stops_new_pages() {
        let state = CrawlState::new(2);
        assert_eq!(state.claim_page("a.md", false), PageClaim::Fetch);
        assert_eq!(state.claim_page("b.md", false), PageClaim::Fetch);
        assert_eq!(state.claim_page("c.md", false), PageClaim::LimitReached);
        // Filtered pages do not count towards the ceiling
        assert_eq!(state.claim_page("x-edit.md", true), PageClaim::Filtered);
        assert_eq!(state.claim_page("a.md", false), PageClaim::Visited);
    }

    #[test]
    fn test_zero_ceiling_fetches_nothing() {
        let state = CrawlState::new(0);
        assert_eq!(state.claim_page("index.md", false), PageClaim::LimitReached);
    }

    #[test]
    fn test_image_claimed_once() {
        let state = CrawlState::new(10);
        assert!(state.claim_image("https://example.com/a.png"));
        assert!(!state.claim_image("https://example.com/a.png"));
        assert!(state.claim_image("https://example.com/b.png"));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let state = CrawlState::new(100);
        let page_wins = AtomicUsize::new(0);
        let image_wins = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if state.claim_page("shared.md", false) == PageClaim::Fetch {
                        page_wins.fetch_add(1, Ordering::SeqCst);
                    }
                    if state.claim_image("https://example.com/shared.png") {
                        image_wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(page_wins.load(Ordering::SeqCst), 1);
        assert_eq!(image_wins.load(Ordering::SeqCst), 1);
    }
}
