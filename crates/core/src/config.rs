//! Config file parsing for `~/.config/epub-unmangle/config.toml`.
//!
//! Every field is optional. Use [`AppConfig::layout`] and
//! [`AppConfig::security_limits`] to build runtime values with defaults
//! filled in.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::layout::Layout;
use crate::security::SecurityLimits;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub content_root: Option<String>,
    pub package_path: Option<String>,
    pub toc_path: Option<String>,
    pub encryption_path: Option<String>,
    pub chapter_prefix: Option<String>,
    pub chapter_extension: Option<String>,
    pub output_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_size_mb: Option<u64>,
    pub max_compression_ratio: Option<u64>,
    pub max_file_count: Option<u64>,
}

impl AppConfig {
    pub fn layout(&self) -> Layout {
        let c = &self.layout;
        let d = Layout::default();
        Layout {
            content_root: c.content_root.clone().unwrap_or(d.content_root),
            package_path: c.package_path.clone().unwrap_or(d.package_path),
            toc_path: c.toc_path.clone().unwrap_or(d.toc_path),
            encryption_path: c.encryption_path.clone().unwrap_or(d.encryption_path),
            chapter_prefix: c.chapter_prefix.clone().unwrap_or(d.chapter_prefix),
            chapter_extension: c.chapter_extension.clone().unwrap_or(d.chapter_extension),
            output_prefix: c.output_prefix.clone().unwrap_or(d.output_prefix),
        }
    }

    /// Security limits with defaults for any unset value.
    pub fn security_limits(&self) -> SecurityLimits {
        let c = &self.security;
        let mut limits = SecurityLimits::default();
        if let Some(mb) = c.max_file_size_mb {
            limits.max_total_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
        }
        if let Some(r) = c.max_compression_ratio {
            limits.max_compression_ratio = r;
        }
        if let Some(n) = c.max_file_count {
            limits.max_file_count = n;
        }
        limits
    }

    /// Config written by `config init`: every default spelled out.
    pub fn with_defaults() -> Self {
        let layout = Layout::default();
        let limits = SecurityLimits::default();
        Self {
            layout: LayoutConfig {
                content_root: Some(layout.content_root),
                package_path: Some(layout.package_path),
                toc_path: Some(layout.toc_path),
                encryption_path: Some(layout.encryption_path),
                chapter_prefix: Some(layout.chapter_prefix),
                chapter_extension: Some(layout.chapter_extension),
                output_prefix: Some(layout.output_prefix),
            },
            security: SecurityConfig {
                max_file_size_mb: Some(limits.max_total_size_bytes / (1024 * 1024)),
                max_compression_ratio: Some(limits.max_compression_ratio),
                max_file_count: Some(limits.max_file_count),
            },
        }
    }
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("epub-unmangle");
        p.push("config.toml");
        p
    })
}

/// Load config from the default path. Missing or unparsable files yield the
/// defaults; a parse failure is logged.
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

pub fn load_config_from(path: &std::path::Path) -> AppConfig {
    let Ok(content) = std::fs::read_to_string(path) else {
        return AppConfig::default();
    };
    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}
