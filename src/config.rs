//! Runtime configuration
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, then CLI flags / `BOOKSHELF_*` environment variables.

use crate::core::search::GrepOptions;
use crate::error::{BookshelfError, Result};
use crate::store::StoreOptions;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Storage backend selected at startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local filesystem under `storage_root`
    #[default]
    Fs,
    /// Process memory; contents vanish on exit
    Memory,
    /// S3-compatible object storage (requires the `s3` feature)
    S3,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub storage_root: PathBuf,
    pub s3_bucket: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    /// SQLite file for the audit journal, or `:memory:`
    pub database_url: String,
    pub audit_pool_size: usize,
    pub server_host: String,
    pub server_port: u16,
    /// When set, requests must carry a matching `x-api-key` header
    pub api_key: Option<String>,
    pub max_grep_file_size: u64,
    pub max_grep_results: usize,
    /// Zero disables the `list_books` cache
    pub catalog_cache_ttl_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_backend: StorageBackend::Fs,
            storage_root: PathBuf::from("./data"),
            s3_bucket: None,
            s3_endpoint: None,
            s3_region: "us-east-1".to_string(),
            database_url: "./data/audit.db".to_string(),
            audit_pool_size: 4,
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            api_key: None,
            max_grep_file_size: 1024 * 1024,
            max_grep_results: 1000,
            catalog_cache_ttl_secs: 0,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    BookshelfError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&text)
            }
            None => Ok(Config::default()),
        }
    }

    /// Parse TOML; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| BookshelfError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_backend == StorageBackend::S3 && self.s3_bucket.is_none() {
            return Err(BookshelfError::Config(
                "s3 backend requires s3_bucket".to_string(),
            ));
        }
        if self.audit_pool_size == 0 {
            return Err(BookshelfError::Config(
                "audit_pool_size must be at least 1".to_string(),
            ));
        }
        if self.max_grep_file_size == 0 {
            return Err(BookshelfError::Config(
                "max_grep_file_size must be greater than 0".to_string(),
            ));
        }
        if self.max_grep_results == 0 {
            return Err(BookshelfError::Config(
                "max_grep_results must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-operation limits handed to the store
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            grep: GrepOptions {
                max_file_size: self.max_grep_file_size,
                max_results: self.max_grep_results,
            },
            catalog_cache_ttl: Duration::from_secs(self.catalog_cache_ttl_secs),
        }
    }

    /// `host:port` to listen on
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Command-line / environment overrides applied on top of the file config
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Storage backend
    #[arg(long, value_enum, env = "BOOKSHELF_STORAGE_BACKEND")]
    pub storage_backend: Option<StorageBackend>,

    /// Root directory for the fs backend
    #[arg(long, env = "BOOKSHELF_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,

    /// Bucket for the s3 backend
    #[arg(long, env = "BOOKSHELF_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Custom S3 endpoint (MinIO, R2, ...)
    #[arg(long, env = "BOOKSHELF_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    #[arg(long, env = "BOOKSHELF_S3_REGION")]
    pub s3_region: Option<String>,

    /// Audit database path, or `:memory:`
    #[arg(long, env = "BOOKSHELF_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Pooled audit connections
    #[arg(long, env = "BOOKSHELF_AUDIT_POOL_SIZE")]
    pub audit_pool_size: Option<usize>,

    /// Bind address
    #[arg(short = 'H', long = "host", env = "BOOKSHELF_HOST")]
    pub server_host: Option<String>,

    /// Port number
    #[arg(short = 'P', long = "port", env = "BOOKSHELF_PORT")]
    pub server_port: Option<u16>,

    /// Shared secret expected in `x-api-key`
    #[arg(long, env = "BOOKSHELF_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Largest file grep will read, in bytes
    #[arg(long, env = "BOOKSHELF_MAX_GREP_FILE_SIZE")]
    pub max_grep_file_size: Option<u64>,

    /// Matching lines returned before grep stops
    #[arg(long, env = "BOOKSHELF_MAX_GREP_RESULTS")]
    pub max_grep_results: Option<usize>,

    /// Seconds a `list_books` result stays cached (0 disables)
    #[arg(long, env = "BOOKSHELF_CATALOG_CACHE_TTL")]
    pub catalog_cache_ttl_secs: Option<u64>,

    /// Default tracing filter
    #[arg(long, env = "BOOKSHELF_LOG")]
    pub log_level: Option<String>,
}

impl ConfigOverrides {
    /// Overwrite every field that was given
    pub fn apply(self, config: &mut Config) {
        if let Some(v) = self.storage_backend {
            config.storage_backend = v;
        }
        if let Some(v) = self.storage_root {
            config.storage_root = v;
        }
        if self.s3_bucket.is_some() {
            config.s3_bucket = self.s3_bucket;
        }
        if self.s3_endpoint.is_some() {
            config.s3_endpoint = self.s3_endpoint;
        }
        if let Some(v) = self.s3_region {
            config.s3_region = v;
        }
        if let Some(v) = self.database_url {
            config.database_url = v;
        }
        if let Some(v) = self.audit_pool_size {
            config.audit_pool_size = v;
        }
        if let Some(v) = self.server_host {
            config.server_host = v;
        }
        if let Some(v) = self.server_port {
            config.server_port = v;
        }
        if self.api_key.is_some() {
            config.api_key = self.api_key;
        }
        if let Some(v) = self.max_grep_file_size {
            config.max_grep_file_size = v;
        }
        if let Some(v) = self.max_grep_results {
            config.max_grep_results = v;
        }
        if let Some(v) = self.catalog_cache_ttl_secs {
            config.catalog_cache_ttl_secs = v;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
    }
}
