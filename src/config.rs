//! Connection configuration.

use std::time::Duration;

use mongodb::options::ClientOptions;
use serde::Deserialize;
use url::Url;

use crate::error::{FacadeError, FacadeResult};

/// Prefix shared by every environment variable read by [`FacadeConfig::from_env`].
pub const ENV_PREFIX: &str = "MONGO_FACADE_";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 27017;

/// Connection configuration for a [`Client`](crate::Client).
///
/// Only `name` (the database) is required; `host` and `port` default to a
/// local server. Setting `uri` overrides host, port and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FacadeConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Full connection URI; takes precedence over host, port and credentials.
    pub uri: Option<String>,
    /// User name for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Database that holds the user's credentials.
    pub auth_source: Option<String>,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Server selection timeout in milliseconds.
    pub server_selection_timeout_ms: Option<u64>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            name: String::new(),
            uri: None,
            username: None,
            password: None,
            auth_source: None,
            app_name: Some("mongo-facade".to_string()),
            min_pool_size: None,
            max_pool_size: Some(10),
            connect_timeout_ms: Some(10_000),
            server_selection_timeout_ms: Some(30_000),
            direct_connection: None,
        }
    }
}

impl FacadeConfig {
    /// Create a configuration for a database on `host:port`.
    pub fn new(host: impl Into<String>, port: u16, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a configuration from a full connection URI.
    pub fn from_uri(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> FacadeConfigBuilder {
        FacadeConfigBuilder::new()
    }

    /// Parse a configuration from TOML.
    ///
    /// ```toml
    /// host = "db.internal"
    /// port = 27018
    /// name = "orders"
    /// max_pool_size = 20
    /// ```
    pub fn from_toml_str(source: &str) -> FacadeResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| FacadeError::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from `MONGO_FACADE_*` environment variables.
    pub fn from_env() -> FacadeResult<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Load the configuration through a custom variable lookup.
    ///
    /// Reads `HOST`, `PORT`, `DATABASE`, `USERNAME`, `PASSWORD`,
    /// `AUTH_SOURCE` and `URI`, each prefixed with [`ENV_PREFIX`].
    pub fn from_env_with<F>(lookup: F) -> FacadeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut builder = Self::builder();

        if let Some(host) = var("HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = var("PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|e| FacadeError::config(format!("invalid port '{}': {}", port, e)))?;
            builder = builder.port(port);
        }
        if let Some(name) = var("DATABASE") {
            builder = builder.name(name);
        }
        if let Some(username) = var("USERNAME") {
            builder = builder.username(username);
        }
        if let Some(password) = var("PASSWORD") {
            builder = builder.password(password);
        }
        if let Some(auth_source) = var("AUTH_SOURCE") {
            builder = builder.auth_source(auth_source);
        }
        if let Some(uri) = var("URI") {
            builder = builder.uri(uri);
        }

        builder.build()
    }

    /// Check the configuration for missing or contradictory values.
    pub fn validate(&self) -> FacadeResult<()> {
        if self.name.is_empty() {
            return Err(FacadeError::config("database name is required"));
        }
        if self.uri.is_none() && self.host.is_empty() {
            return Err(FacadeError::config("host is required when no URI is given"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(FacadeError::config("password given without a username"));
        }
        if let (Some(min), Some(max)) = (self.min_pool_size, self.max_pool_size) {
            if min > max {
                return Err(FacadeError::config(format!(
                    "min_pool_size ({}) exceeds max_pool_size ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }

    /// Connection timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Server selection timeout as a [`Duration`].
    pub fn server_selection_timeout(&self) -> Option<Duration> {
        self.server_selection_timeout_ms.map(Duration::from_millis)
    }

    /// Render the `mongodb://` URI this configuration connects to.
    ///
    /// Credentials are percent-encoded.
    pub fn connection_uri(&self) -> FacadeResult<String> {
        if let Some(ref uri) = self.uri {
            return Ok(uri.clone());
        }

        let mut url = Url::parse(&format!("mongodb://{}:{}/", self.host, self.port))
            .map_err(|e| FacadeError::config(format!("invalid host '{}': {}", self.host, e)))?;

        if let Some(ref username) = self.username {
            url.set_username(username)
                .map_err(|_| FacadeError::config("cannot set username on connection URI"))?;
            url.set_password(self.password.as_deref())
                .map_err(|_| FacadeError::config("cannot set password on connection URI"))?;
        }

        if let Some(ref auth_source) = self.auth_source {
            url.query_pairs_mut().append_pair("authSource", auth_source);
        }

        Ok(url.to_string())
    }

    /// Convert to MongoDB `ClientOptions`.
    pub async fn to_client_options(&self) -> FacadeResult<ClientOptions> {
        let uri = self.connection_uri()?;
        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|e| FacadeError::config(format!("failed to parse URI: {}", e)))?;

        if let Some(ref app_name) = self.app_name {
            options.app_name = Some(app_name.clone());
        }

        if let Some(min_pool) = self.min_pool_size {
            options.min_pool_size = Some(min_pool);
        }

        if let Some(max_pool) = self.max_pool_size {
            options.max_pool_size = Some(max_pool);
        }

        if let Some(connect_timeout) = self.connect_timeout() {
            options.connect_timeout = Some(connect_timeout);
        }

        if let Some(selection_timeout) = self.server_selection_timeout() {
            options.server_selection_timeout = Some(selection_timeout);
        }

        if let Some(direct) = self.direct_connection {
            options.direct_connection = Some(direct);
        }

        Ok(options)
    }
}

/// Builder for [`FacadeConfig`].
#[derive(Debug, Default)]
pub struct FacadeConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    name: Option<String>,
    uri: Option<String>,
    username: Option<String>,
    password: Option<String>,
    auth_source: Option<String>,
    app_name: Option<String>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
    direct_connection: Option<bool>,
}

impl FacadeConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a full connection URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the user name.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the authentication database.
    pub fn auth_source(mut self, auth_source: impl Into<String>) -> Self {
        self.auth_source = Some(auth_source.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the server selection timeout.
    pub fn server_selection_timeout(mut self, duration: Duration) -> Self {
        self.server_selection_timeout = Some(duration);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> FacadeResult<FacadeConfig> {
        let defaults = FacadeConfig::default();
        let name = self
            .name
            .ok_or_else(|| FacadeError::config("database name is required"))?;

        let config = FacadeConfig {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
            name,
            uri: self.uri,
            username: self.username,
            password: self.password,
            auth_source: self.auth_source,
            app_name: self.app_name.or(defaults.app_name),
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size.or(defaults.max_pool_size),
            connect_timeout_ms: self
                .connect_timeout
                .map(|d| d.as_millis() as u64)
                .or(defaults.connect_timeout_ms),
            server_selection_timeout_ms: self
                .server_selection_timeout
                .map(|d| d.as_millis() as u64)
                .or(defaults.server_selection_timeout_ms),
            direct_connection: self.direct_connection,
        };

        config.validate()?;
        Ok(config)
    }
}
