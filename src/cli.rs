// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Every setting is optional on the command line so we can tell "not given"
// apart from "given": flags that are present override the --config file,
// which overrides the built-in defaults.
// =============================================================================

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ConfigError, MirrorConfig};
use crate::convert::{Charset, Extension, ImageScope};

#[derive(Parser, Debug)]
#[command(
    name = "site-mirror",
    version,
    about = "Mirror a documentation or wiki site into offline Markdown files",
    long_about = "site-mirror crawls every page of one domain, converts each page to Markdown, \
                  downloads the images it uses and rewrites internal links so the mirror can be \
                  browsed offline."
)]
pub struct Cli {
    /// Domain to mirror, without scheme (e.g. docs.example.com)
    ///
    /// Can be omitted when the --config file sets it.
    pub domain: Option<String>,

    /// Output root; pages are written to <OUTPUT>/<DOMAIN>/
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// CSS selector of the element converted to Markdown (default: body)
    #[arg(short, long = "root", value_name = "SELECTOR")]
    pub root_selector: Option<String>,

    /// Remove <OUTPUT>/<DOMAIN>/ before mirroring
    #[arg(long)]
    pub clear: bool,

    /// First page to fetch (default: https://<DOMAIN>/)
    #[arg(long, value_name = "URL")]
    pub start_url: Option<String>,

    /// Stop after this many pages have been fetched
    #[arg(long, value_name = "N")]
    pub max_pages: Option<usize>,

    /// Skip pages whose file name contains PATTERN (repeatable)
    ///
    /// Example: --ignore -edit --ignore Special-
    #[arg(long = "ignore", value_name = "PATTERN", allow_hyphen_values = true)]
    pub ignore: Vec<String>,

    /// Extension of the written pages
    #[arg(long, value_enum)]
    pub extension: Option<Extension>,

    /// Characters kept in file names
    #[arg(long, value_enum)]
    pub charset: Option<Charset>,

    /// Which images are downloaded and relinked
    #[arg(long, value_enum)]
    pub images: Option<ImageScope>,

    /// Add a {.class} caption after images that carry CSS classes
    #[arg(long)]
    pub class_captions: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Images of one page downloaded in parallel
    #[arg(long, value_name = "N")]
    pub image_concurrency: Option<usize>,

    /// JSON file with default settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the final report as JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Log debug messages (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    // Builds the run configuration: defaults, then --config, then flags
    pub fn to_config(&self) -> Result<MirrorConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::from_file(path)?,
            None => MirrorConfig::default(),
        };

        if let Some(domain) = &self.domain {
            config.domain = domain.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(selector) = &self.root_selector {
            config.root_selector = selector.clone();
        }
        if let Some(url) = &self.start_url {
            config.start_url = Some(url.clone());
        }
        if let Some(max_pages) = self.max_pages {
            config.max_pages = max_pages;
        }
        if !self.ignore.is_empty() {
            config.ignore.extend(self.ignore.iter().cloned());
        }
        if let Some(extension) = self.extension {
            config.extension = extension;
        }
        if let Some(charset) = self.charset {
            config.charset = charset;
        }
        if let Some(images) = self.images {
            config.images = images;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(concurrency) = self.image_concurrency {
            config.image_concurrency = concurrency;
        }
        config.clear |= self.clear;
        config.class_captions |= self.class_captions;

        Ok(config)
    }
}
