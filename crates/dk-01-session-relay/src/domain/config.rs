//! Relay configuration with validation.
//!
//! Values come from `Default`, optionally a serialized config, and finally
//! environment overrides applied by [`RelayConfig::apply_env`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use url::Url;

/// Backend origin used when `BACKEND_URL` is not set.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5224";

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Backend origin every proxied request is rewritten to
    pub backend_url: String,
    /// HTTP listener
    pub http: HttpConfig,
    /// Outbound timeouts
    pub timeouts: TimeoutConfig,
    /// Request limits
    pub limits: LimitsConfig,
    /// Proxied route surface
    pub routes: RouteConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            http: HttpConfig::default(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            routes: RouteConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend_origin()?;

        if self.http.port == 0 {
            return Err(ConfigError::InvalidListener("port cannot be 0".into()));
        }

        if self.timeouts.backend.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "backend timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.connect.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect timeout cannot be 0".into(),
            ));
        }

        if self.limits.max_request_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_request_size cannot be 0".into(),
            ));
        }

        self.routes.validate()?;

        Ok(())
    }

    /// Parsed backend origin. Only http(s) URLs with a host are accepted.
    pub fn backend_origin(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.backend_url.trim())
            .map_err(|e| ConfigError::InvalidBackendUrl(format!("{}: {}", self.backend_url, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBackendUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidBackendUrl(format!(
                "missing host: {}",
                self.backend_url
            )));
        }

        Ok(url)
    }

    /// Get HTTP server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognized keys: `BACKEND_URL`, `DK_HOST`, `DK_PORT`,
    /// `DK_BACKEND_TIMEOUT`, `DK_CONNECT_TIMEOUT`, `DK_MAX_REQUEST_SIZE`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BACKEND_URL").filter(|v| !v.trim().is_empty()) {
            self.backend_url = url.trim().to_string();
        }

        if let Some(host) = lookup("DK_HOST") {
            self.http.host = host
                .parse()
                .map_err(|_| ConfigError::InvalidListener(format!("invalid host: {}", host)))?;
        }

        if let Some(port) = lookup("DK_PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidListener(format!("invalid port: {}", port)))?;
        }

        if let Some(timeout) = lookup("DK_BACKEND_TIMEOUT") {
            self.timeouts.backend = humantime_serde::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidTimeout(format!("{}: {}", timeout, e)))?;
        }

        if let Some(timeout) = lookup("DK_CONNECT_TIMEOUT") {
            self.timeouts.connect = humantime_serde::parse_duration(&timeout)
                .map_err(|e| ConfigError::InvalidTimeout(format!("{}: {}", timeout, e)))?;
        }

        if let Some(size) = lookup("DK_MAX_REQUEST_SIZE") {
            self.limits.max_request_size = size
                .parse()
                .map_err(|_| ConfigError::InvalidLimit(format!("invalid size: {}", size)))?;
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 3000)
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
        }
    }
}

/// Outbound timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole backend exchange, including reading response headers
    #[serde(with = "humantime_serde")]
    pub backend: Duration,
    /// TCP/TLS connect
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            backend: Duration::from_secs(30),
            connect: Duration::from_secs(10),
        }
    }
}

/// Request limits configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max inbound body size in bytes (default: 10MB)
    pub max_request_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Proxied route surface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Everything below this prefix is relayed (default: `/bff`)
    pub bff_prefix: String,
    /// OIDC callback paths relayed for GET and POST
    pub oidc_paths: Vec<String>,
    /// User-facing page that receives relay failures as `?message=`
    pub error_page: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            bff_prefix: "/bff".to_string(),
            oidc_paths: vec![
                "/signin-oidc".to_string(),
                "/signout-callback-oidc".to_string(),
            ],
            error_page: "/error".to_string(),
        }
    }
}

impl RouteConfig {
    /// Prefix as mounted on the router, without a trailing slash
    pub fn prefix(&self) -> &str {
        self.bff_prefix.trim_end_matches('/')
    }

    /// Reject route surfaces the router cannot mount: overlapping paths
    /// panic when the router is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prefix = self.prefix();
        if !prefix.starts_with('/') || prefix.len() < 2 || has_route_syntax(prefix) {
            return Err(ConfigError::InvalidRoute(format!(
                "bff_prefix must be a non-root absolute path: {}",
                self.bff_prefix
            )));
        }
        if let Some(local) = LOCAL_ROUTES.iter().find(|local| overlaps(prefix, local)) {
            return Err(ConfigError::InvalidRoute(format!(
                "bff_prefix {} overlaps local route {}",
                self.bff_prefix, local
            )));
        }

        let mut seen = HashSet::new();
        for path in &self.oidc_paths {
            if !path.starts_with('/') || has_route_syntax(path) {
                return Err(ConfigError::InvalidRoute(format!(
                    "oidc path must be a plain absolute path: {}",
                    path
                )));
            }
            if !seen.insert(path.as_str()) {
                return Err(ConfigError::InvalidRoute(format!(
                    "duplicate oidc path: {}",
                    path
                )));
            }
            if overlaps(path, prefix) {
                return Err(ConfigError::InvalidRoute(format!(
                    "oidc path {} is already relayed under {}",
                    path, prefix
                )));
            }
            if let Some(local) = LOCAL_ROUTES.iter().find(|local| overlaps(path, local)) {
                return Err(ConfigError::InvalidRoute(format!(
                    "oidc path {} overlaps local route {}",
                    path, local
                )));
            }
        }

        Ok(())
    }
}

/// Paths answered by the relay itself, never proxied.
pub const LOCAL_ROUTES: [&str; 3] = ["/health", "/metrics", "/_server"];

/// `a` and `b` are the same path or one lies below the other.
fn overlaps(a: &str, b: &str) -> bool {
    let a = a.trim_end_matches('/');
    let b = b.trim_end_matches('/');
    a == b || is_below(a, b) || is_below(b, a)
}

fn is_below(path: &str, parent: &str) -> bool {
    path.strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn has_route_syntax(path: &str) -> bool {
    path.contains([':', '*', '{', '}'])
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Backend URL is missing, malformed or not http(s)
    #[error("invalid backend url: {0}")]
    InvalidBackendUrl(String),
    /// Listener host/port cannot be used
    #[error("invalid listener: {0}")]
    InvalidListener(String),
    /// Invalid size limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid route surface
    #[error("invalid route: {0}")]
    InvalidRoute(String),
}

/// Humantime serde module for Duration serialization
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            let mins = mins.trim().parse::<u64>().map_err(|_| "invalid minutes")?;
            mins.checked_mul(60)
                .map(Duration::from_secs)
                .ok_or("minutes out of range")
        } else {
            // Plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
