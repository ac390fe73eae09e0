// src/config.rs
// =============================================================================
// This module holds the settings of one mirror run.
//
// Sources, lowest priority first:
// 1. Built-in defaults (`MirrorConfig::default()`)
// 2. An optional JSON file passed with --config
// 3. Flags given on the command line
//
// The merged config is validated once, before anything touches the network.
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use scraper::Selector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::convert::{Charset, Extension, ImageScope};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("domain must be a bare host name like 'docs.example.com' (got '{0}')")]
    Domain(String),

    #[error("invalid root selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("invalid start URL '{url}': {message}")]
    StartUrl { url: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Host name to mirror, without scheme
    pub domain: String,
    /// First page to fetch; defaults to https://<domain>/
    pub start_url: Option<String>,
    /// Output root; pages land in <output>/<domain>/
    pub output: PathBuf,
    /// CSS selector of the element converted to Markdown
    pub root_selector: String,
    pub extension: Extension,
    pub charset: Charset,
    /// File name substrings that are never fetched
    pub ignore: Vec<String>,
    /// Upper bound on pages fetched in one run
    pub max_pages: usize,
    pub images: ImageScope,
    /// Emit a {.class} caption paragraph after images carrying classes
    pub class_captions: bool,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Images of one page downloaded in parallel
    pub image_concurrency: usize,
    /// Remove <output>/<domain>/ before the run
    pub clear: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            start_url: None,
            output: PathBuf::from("mirror"),
            root_selector: "body".to_string(),
            extension: Extension::default(),
            charset: Charset::default(),
            ignore: Vec::new(),
            max_pages: 1000,
            images: ImageScope::default(),
            class_captions: false,
            timeout_secs: 30,
            image_concurrency: 4,
            clear: false,
        }
    }
}

impl MirrorConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    // Checks everything that can be checked without the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        let domain = self.domain.trim();
        if domain.is_empty()
            || domain.contains("://")
            || domain.contains('/')
            || domain.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::Domain(self.domain.clone()));
        }

        self.root_selector()?;
        self.start_url()?;
        Ok(())
    }

    pub fn root_selector(&self) -> Result<Selector, ConfigError> {
        Selector::parse(&self.root_selector).map_err(|e| ConfigError::Selector {
            selector: self.root_selector.clone(),
            message: e.to_string(),
        })
    }

    pub fn start_url(&self) -> Result<Url, ConfigError> {
        let raw = match &self.start_url {
            Some(url) => url.clone(),
            None => format!("https://{}/", self.domain.trim()),
        };

        let url = Url::parse(&raw).map_err(|e| ConfigError::StartUrl {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        if url.host_str().is_none() {
            return Err(ConfigError::StartUrl {
                url: raw,
                message: "URL has no host".to_string(),
            });
        }

        Ok(url)
    }

    // Folder every page and image of the run is written to
    pub fn site_folder(&self) -> PathBuf {
        self.output.join(self.domain.trim().to_ascii_lowercase())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
