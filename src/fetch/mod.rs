// src/fetch/mod.rs
// =============================================================================
// This module retrieves pages and images over HTTP.
//
// Everything goes through `Fetcher`, which wraps one reqwest client. Errors
// are typed (`FetchError`) so callers can log them and move on.
// =============================================================================

mod http;

pub use http::{FetchError, Fetcher};
