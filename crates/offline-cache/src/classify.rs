//! Request classification
//!
//! Maps (URL, mode) to the handling category. Pure and total: every input
//! lands in exactly one category and nothing is read besides the config.

use crate::config::WorkerConfig;
use crate::types::RequestMode;
use serde::Serialize;
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    External,
    Api,
    Navigation,
    StaticAsset,
    OtherPassthrough,
}

impl Classification {
    /// Whether the worker responds to this category itself
    pub fn is_intercepted(&self) -> bool {
        matches!(
            self,
            Classification::Navigation | Classification::StaticAsset
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Classification::External => "external",
            Classification::Api => "api",
            Classification::Navigation => "navigation",
            Classification::StaticAsset => "static-asset",
            Classification::OtherPassthrough => "other-passthrough",
        };
        f.write_str(name)
    }
}

pub fn classify(url: &Url, mode: RequestMode, config: &WorkerConfig) -> Classification {
    if url.origin() != config.origin.origin() {
        return Classification::External;
    }

    let path = url.path();
    if path.starts_with(&config.api_prefix) {
        return Classification::Api;
    }

    if mode == RequestMode::Navigate {
        return Classification::Navigation;
    }

    match path_extension(path) {
        Some(ext) if config.static_extensions.contains(&ext) => Classification::StaticAsset,
        _ => Classification::OtherPassthrough,
    }
}

/// Lowercased extension of the last path segment, if it has one
fn path_extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
