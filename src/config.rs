//! Configuration for the gateway server.
//!
//! Configuration is a JSON file (path from `--config` / `$CONFIG`, default
//! `config.json`). Any string value may be a literal or a reference to an
//! environment variable, so secrets stay out of the file:
//!
//! ```json
//! {
//!   "upstream": { "base_url": "$API_BASE" },
//!   "tokens": {
//!     "global": "$TOKEN_FIJO",
//!     "vendor_granted": "$TOKEN_VENDEDOR_PERMITIDO",
//!     "vendor_denied": "$TOKEN_VENDEDOR_DENEGADO"
//!   },
//!   "fx": { "api_key": "$TOKEN_FXRATESAPI" },
//!   "stripe": {
//!     "secret_key": "$CLAVE_SECRETA_STRIPE",
//!     "public_key": "$CLAVE_PUBLICA_STRIPE"
//!   },
//!   "accounts": [
//!     { "username": "ignacio_tapia", "password": "$MAINTAINER_PASSWORD", "role": "maintainer" }
//!   ]
//! }
//! ```

use clap::Parser;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::auth::{Account, Role};

/// CLI arguments for the gateway.
#[derive(Parser, Debug)]
#[command(name = "ferremas-gateway")]
#[command(about = "FerreMas unified HTTP gateway")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// `port`, `host` and the timeout fall back to environment variables, then to
/// hardcoded defaults. Every other section is required.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_request_timeout_secs")]
    request_timeout_secs: u64,
    upstream: UpstreamConfig,
    tokens: TokensConfig,
    fx: FxConfig,
    stripe: StripeConfig,
    #[serde(default)]
    accounts: Vec<AccountConfig>,
}

/// The inventory/sales API everything under `/data` is forwarded to.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: LiteralOrEnv<Url>,
}

/// The three static secrets of the two-tier token model.
#[derive(Debug, Clone, Deserialize)]
pub struct TokensConfig {
    #[serde(deserialize_with = "deserialize_token")]
    pub global: LiteralOrEnv<String>,
    #[serde(deserialize_with = "deserialize_token")]
    pub vendor_granted: LiteralOrEnv<String>,
    #[serde(deserialize_with = "deserialize_token")]
    pub vendor_denied: LiteralOrEnv<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FxConfig {
    #[serde(default = "config_defaults::default_fx_url")]
    pub base_url: LiteralOrEnv<Url>,
    pub api_key: LiteralOrEnv<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    #[serde(default = "config_defaults::default_stripe_api")]
    pub api_base: LiteralOrEnv<Url>,
    pub secret_key: LiteralOrEnv<String>,
    /// Publishable key handed to browsers. Unset (or pointing at an unset
    /// variable) makes `GET /stripe/config` answer 500.
    #[serde(default, deserialize_with = "deserialize_optional_env")]
    pub public_key: Option<String>,
    #[serde(default = "config_defaults::default_success_url")]
    pub success_url: String,
    #[serde(default = "config_defaults::default_cancel_url")]
    pub cancel_url: String,
    #[serde(default = "config_defaults::default_payment_method_types")]
    pub payment_method_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    pub password: LiteralOrEnv<String>,
    pub role: Role,
}

impl From<&AccountConfig> for Account {
    fn from(value: &AccountConfig) -> Self {
        Account::new(value.username.clone(), value.password.inner().clone(), value.role)
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};
    use url::Url;

    use super::LiteralOrEnv;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_FX_URL: &str = "https://fxratesapi.com/api/latest";
    pub const DEFAULT_STRIPE_API: &str = "https://api.stripe.com/";
    pub const DEFAULT_SUCCESS_URL: &str = "https://tusitio.com/success";
    pub const DEFAULT_CANCEL_URL: &str = "https://tusitio.com/cancel";

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }

    /// $REQUEST_TIMEOUT_SECS -> 30
    pub fn default_request_timeout_secs() -> u64 {
        env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn default_fx_url() -> LiteralOrEnv<Url> {
        LiteralOrEnv::from_literal(Url::parse(DEFAULT_FX_URL).expect("valid default FX url"))
    }

    pub fn default_stripe_api() -> LiteralOrEnv<Url> {
        LiteralOrEnv::from_literal(
            Url::parse(DEFAULT_STRIPE_API).expect("valid default Stripe url"),
        )
    }

    pub fn default_success_url() -> String {
        DEFAULT_SUCCESS_URL.to_string()
    }

    pub fn default_cancel_url() -> String {
        DEFAULT_CANCEL_URL.to_string()
    }

    pub fn default_payment_method_types() -> Vec<String> {
        vec!["card".to_string()]
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Upper bound for every outbound call (upstream, FX, Stripe).
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn tokens(&self) -> &TokensConfig {
        &self.tokens
    }

    pub fn fx(&self) -> &FxConfig {
        &self.fx
    }

    pub fn stripe(&self) -> &StripeConfig {
        &self.stripe
    }

    /// Accounts in declaration order.
    pub fn accounts(&self) -> &[AccountConfig] {
        &self.accounts
    }

    /// Load configuration from CLI arguments and the JSON file they point to.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"http://localhost:8083"`
/// - Simple env var: `"$API_BASE"`
/// - Braced env var: `"${API_BASE}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &T {
        &self.0
    }
}

/// Returns the variable name if `s` is `$VAR` or `${VAR}`.
fn parse_env_var_syntax(s: &str) -> Option<&str> {
    if let Some(braced) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(braced)
    } else if let Some(var_name) = s.strip_prefix('$') {
        let is_name =
            !var_name.is_empty() && var_name.chars().all(|c| c.is_alphanumeric() || c == '_');
        is_name.then_some(var_name)
    } else {
        None
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = match parse_env_var_syntax(&s) {
            Some(var_name) => std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?,
            None => s,
        };
        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;
        Ok(LiteralOrEnv(parsed))
    }
}

/// A token must not be blank: an empty secret would match an empty header.
fn deserialize_token<'de, D>(deserializer: D) -> Result<LiteralOrEnv<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let token = LiteralOrEnv::<String>::deserialize(deserializer)?;
    if token.trim().is_empty() {
        return Err(serde::de::Error::custom("token must not be empty"));
    }
    Ok(token)
}

/// Like [`LiteralOrEnv<String>`], but a missing variable or an empty value
/// yields `None` instead of failing the whole config.
fn deserialize_optional_env<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let value = match raw {
        None => None,
        Some(s) => match parse_env_var_syntax(&s) {
            Some(var_name) => std::env::var(var_name).ok(),
            None => Some(s),
        },
    };
    Ok(value.filter(|v| !v.trim().is_empty()))
}
