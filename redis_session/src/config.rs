//! Central configuration for the redis_session crate
//!
//! Everything is collected into one [`SessionConfig`] value that is built once at startup and
//! handed to [`SessionContext`](crate::SessionContext). Nothing here is a process-wide static.

use std::fmt;
use std::str::FromStr;

use crate::session::{PayloadFormat, SameSite, is_token_char};

pub const DEFAULT_SESSION_LIFETIME: u64 = 3600;
pub const DEFAULT_KEY_PREFIX: &str = "sessions";
pub const DEFAULT_COOKIE_NAME: &str = "SESSIONID";

/// Which [`CacheStore`](crate::CacheStore) implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    #[default]
    Redis,
    Memory,
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "Unsupported store type: {other}. Supported types are 'redis' and 'memory'"
            )),
        }
    }
}

/// Transport used to reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreScheme {
    #[default]
    Tcp,
    Tls,
    Unix,
}

impl FromStr for StoreScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "tls" => Ok(Self::Tls),
            "unix" => Ok(Self::Unix),
            other => Err(format!("Unsupported store scheme: {other}")),
        }
    }
}

impl fmt::Display for StoreScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Tls => write!(f, "tls"),
            Self::Unix => write!(f, "unix"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub store_type: StoreType,
    pub scheme: StoreScheme,
    /// Host name, or the socket path for [`StoreScheme::Unix`].
    pub host: String,
    pub port: u16,
    /// Full connection URL. Takes precedence over scheme, host and port.
    pub url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::Redis,
            scheme: StoreScheme::Tcp,
            host: "127.0.0.1".to_string(),
            port: 6379,
            url: None,
        }
    }
}

impl StoreConfig {
    /// Connection URL understood by the redis client.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match self.scheme {
            StoreScheme::Tcp => format!("redis://{}:{}/", self.host, self.port),
            StoreScheme::Tls => format!("rediss://{}:{}/", self.host, self.port),
            StoreScheme::Unix => format!("redis+unix://{}", self.host),
        }
    }
}

/// Attributes of the session cookie emitted by [`HttpSessionHost`](crate::HttpSessionHost).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieConfig {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    /// `Max-Age` in seconds; 0 emits a browser-session cookie.
    pub max_age: u64,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            max_age: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Store TTL in seconds, refreshed on every save.
    pub lifetime: u64,
    pub key_prefix: String,
    /// Restriction applied by `start` when the caller does not pick one.
    pub same_site: SameSite,
    pub payload_format: PayloadFormat,
    pub store: StoreConfig,
    pub cookie: CookieConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: DEFAULT_SESSION_LIFETIME,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            same_site: SameSite::default(),
            payload_format: PayloadFormat::default(),
            store: StoreConfig::default(),
            cookie: CookieConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Read the configuration from `SESSION_*` environment variables.
    ///
    /// Loading a `.env` file is left to the binary. Invalid values fall back to their defaults
    /// with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut lifetime = parse_or(&parse, "SESSION_LIFETIME", defaults.lifetime);
        if lifetime == 0 {
            tracing::warn!("SESSION_LIFETIME must be positive, using {DEFAULT_SESSION_LIFETIME}");
            lifetime = DEFAULT_SESSION_LIFETIME;
        }

        let store = StoreConfig {
            store_type: parse_or(&parse, "SESSION_STORE_TYPE", defaults.store.store_type),
            scheme: parse_or(&parse, "SESSION_STORE_SCHEME", defaults.store.scheme),
            host: parse("SESSION_STORE_HOST").unwrap_or(defaults.store.host),
            port: parse_or(&parse, "SESSION_STORE_PORT", defaults.store.port),
            url: parse("SESSION_STORE_URL"),
        };

        let cookie = CookieConfig {
            name: cookie_setting(&parse, "SESSION_COOKIE_NAME", is_token_char)
                .unwrap_or(defaults.cookie.name),
            path: cookie_setting(&parse, "SESSION_COOKIE_PATH", is_attribute_value_char)
                .unwrap_or(defaults.cookie.path),
            domain: cookie_setting(&parse, "SESSION_COOKIE_DOMAIN", is_attribute_value_char),
            secure: parse_flag(&parse, "SESSION_COOKIE_SECURE", defaults.cookie.secure),
            http_only: parse_flag(&parse, "SESSION_COOKIE_HTTP_ONLY", defaults.cookie.http_only),
            max_age: parse_or(&parse, "SESSION_COOKIE_MAX_AGE", defaults.cookie.max_age),
        };

        Self {
            lifetime,
            key_prefix: parse("SESSION_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            same_site: parse_or(&parse, "SESSION_SAME_SITE", defaults.same_site),
            payload_format: parse_or(&parse, "SESSION_PAYLOAD_FORMAT", defaults.payload_format),
            store,
            cookie,
        }
    }
}

fn parse_or<T, F>(lookup: &F, name: &str, default: T) -> T
where
    T: FromStr + fmt::Debug,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!("Invalid {name}={raw:?} ({e}), using default {default:?}");
            default
        }),
        None => default,
    }
}

/// Cookie settings are copied verbatim into `Set-Cookie`, so a value with a character outside
/// `allowed` is dropped with a warning.
fn cookie_setting<F>(lookup: &F, name: &str, allowed: fn(char) -> bool) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    let value = raw.trim();
    if let Some(c) = value.chars().find(|c| !allowed(*c)) {
        tracing::warn!("Invalid {name}={raw:?} (character {c:?} not allowed), using default");
        return None;
    }
    Some(value.to_string())
}

// RFC 6265 av-value: any US-ASCII character except controls and ';'
fn is_attribute_value_char(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control() && c != ';'
}

fn parse_flag<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            tracing::warn!("Invalid {name}={raw:?}, using default {default}");
            default
        }
    }
}
