use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::service::StorageSettings;
use crate::storage::naming::normalize_extension;

const DEFAULT_EXTENSIONS: &str =
    "jpg,jpeg,png,gif,webp,svg,ico,pdf,txt,csv,json,md,doc,docx,xls,xlsx,ppt,pptx,zip,mp3,mp4,webm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Upload,
    List,
    Delete,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::List => "list",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "list" => Ok(Self::List),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown permission '{}'", other)),
        }
    }
}

/// An API token, written as `name:key:perm+perm` (e.g. `ci:s3cr3t:upload+list`).
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub name: String,
    pub key: String,
    pub permissions: Vec<Permission>,
}

impl ApiToken {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

// Keep keys out of logs.
impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiToken")
            .field("name", &self.name)
            .field("key", &"[REDACTED]")
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl FromStr for ApiToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, ':');
        let name = parts.next().unwrap_or("").trim();
        let key = parts.next().unwrap_or("").trim();
        let perms = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err("token name is required".into());
        }
        if key.is_empty() {
            return Err(format!("token '{}': key is required", name));
        }
        let permissions = perms
            .split('+')
            .filter(|p| !p.trim().is_empty())
            .map(Permission::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if permissions.is_empty() {
            return Err(format!("token '{}': at least one permission is required", name));
        }
        Ok(Self {
            name: name.to_string(),
            key: key.to_string(),
            permissions,
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cdn-fileserver",
    about = "Tagged file storage server",
    version = env!("CDN_FILESERVER_VERSION")
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "CDN_PORT", default_value = "8080")]
    pub port: u16,

    /// Address to bind to
    #[arg(long, env = "CDN_ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// Storage root directory
    #[arg(long, env = "CDN_DATA_DIR", default_value = "./storage")]
    pub data_dir: String,

    /// Public base URL for file links (default http://localhost:<port>)
    #[arg(long, env = "CDN_BASE_URL")]
    pub base_url: Option<String>,

    /// Maximum upload size in bytes (default 100MB)
    #[arg(long, env = "CDN_MAX_FILE_SIZE", default_value = "104857600")]
    pub max_file_size: u64,

    /// Allowed file extensions, comma separated
    #[arg(
        long,
        env = "CDN_ALLOWED_EXTENSIONS",
        value_delimiter = ',',
        default_value = DEFAULT_EXTENSIONS
    )]
    pub allowed_extensions: Vec<String>,

    /// API token `name:key:perm+perm`; repeat the flag or separate with ';'
    #[arg(long = "token", env = "CDN_TOKENS", value_delimiter = ';')]
    pub tokens: Vec<ApiToken>,

    /// Allowed CORS origins, comma separated ("*" for any)
    #[arg(long, env = "CDN_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Log output format
    #[arg(long, env = "CDN_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.data_dir.trim().is_empty() {
            anyhow::bail!("storage directory is required");
        }
        if self.max_file_size == 0 {
            anyhow::bail!("invalid max file size: 0");
        }
        if self.allowed_extensions().is_empty() {
            anyhow::bail!("no allowed file extensions configured");
        }
        if self.tokens.is_empty() {
            anyhow::bail!("no API tokens configured (use --token name:key:upload+list+delete)");
        }
        Ok(())
    }

    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            _ => format!("http://localhost:{}", self.port),
        }
    }

    pub fn allowed_extensions(&self) -> Vec<String> {
        self.allowed_extensions
            .iter()
            .map(|e| normalize_extension(e))
            .filter(|e| !e.is_empty())
            .collect()
    }

    pub fn storage_settings(&self) -> StorageSettings {
        StorageSettings {
            root: PathBuf::from(&self.data_dir),
            max_file_size: self.max_file_size,
            allowed_extensions: self.allowed_extensions(),
            base_url: self.base_url(),
        }
    }
}
