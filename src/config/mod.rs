use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Relay configuration, loaded from the environment
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Directory that holds uploaded files (default: "./server_files")
    pub upload_dir: PathBuf,

    /// Listen host (default: "0.0.0.0")
    pub bind_host: String,

    /// Listen port (default: 8000)
    pub bind_port: u16,

    /// Base used to build download URLs (default: "http://localhost:<bind_port>")
    pub public_base_url: Option<String>,

    /// Maximum request body size in bytes (default: 1 GB)
    pub max_file_size: usize,

    /// Cleanup threshold when the caller does not supply one (default: 24 hours)
    pub default_cleanup_age_secs: u64,

    /// Landing page served at "/" (default: "web_ui.html")
    pub web_ui_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("server_files"),
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8000,
            public_base_url: None,
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            default_cleanup_age_secs: 86400,
            web_ui_path: PathBuf::from("web_ui.html"),
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            bind_host: env::var("BIND_HOST").unwrap_or(default.bind_host),

            bind_port: env::var("BIND_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.bind_port),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            default_cleanup_age_secs: env::var("DEFAULT_CLEANUP_AGE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.default_cleanup_age_secs),

            web_ui_path: env::var("WEB_UI_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.web_ui_path),
        }
    }

    /// Config for tests and local runs: isolated directory, loopback only
    pub fn development(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8000,
            public_base_url: Some("http://localhost:8000".to_string()),
            max_file_size: 16 * 1024 * 1024,
            default_cleanup_age_secs: 86400,
            web_ui_path: PathBuf::from("web_ui.html"),
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        (self.bind_host.as_str(), self.bind_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("BIND_HOST '{}' did not resolve", self.bind_host))
    }

    /// Download URLs are `<base>/files/<name>`; the base never ends in '/'.
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.bind_port),
        }
    }
}
