//! Connection configuration.
//!
//! A [`ConnectionConfig`] is built in code with the `with_*` builders, or
//! loaded explicitly:
//! 1. Default values
//! 2. YAML file (`ConnectionConfig::from_file`, or `SURREAL_CONFIG` in `load`)
//! 3. `SURREAL_*` environment variables (`load` and `from_env` only)

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use surrealdb_rpc_protocol::{Method, Object, Value, DEFAULT_PATH, DEFAULT_PORT};

/// Default capacity of the notification broadcast channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// URL scheme of the RPC endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ws" => Ok(Scheme::Ws),
            "wss" => Ok(Scheme::Wss),
            other => Err(ClientError::Config(format!("unknown scheme '{}'", other))),
        }
    }
}

/// Credentials presented during connection setup.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "lowercase")]
pub enum Credentials {
    /// Root user.
    Root { username: String, password: String },
    /// Namespace user.
    Namespace {
        namespace: String,
        username: String,
        password: String,
    },
    /// Database user.
    Database {
        namespace: String,
        database: String,
        username: String,
        password: String,
    },
    /// Record access method. `signup` creates the record user first.
    Record {
        namespace: String,
        database: String,
        access: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
        #[serde(default)]
        signup: bool,
    },
}

impl Credentials {
    pub fn root(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Root {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the RPC method these credentials are presented with.
    pub fn method(&self) -> Method {
        match self {
            Credentials::Record { signup: true, .. } => Method::Signup,
            _ => Method::Signin,
        }
    }

    /// Builds the single parameter object for `signin`/`signup`.
    pub fn to_value(&self) -> Value {
        let mut params = Object::new();
        match self {
            Credentials::Root { username, password } => {
                params.insert("user", Value::from(username.as_str()));
                params.insert("pass", Value::from(password.as_str()));
            }
            Credentials::Namespace {
                namespace,
                username,
                password,
            } => {
                params.insert("ns", Value::from(namespace.as_str()));
                params.insert("user", Value::from(username.as_str()));
                params.insert("pass", Value::from(password.as_str()));
            }
            Credentials::Database {
                namespace,
                database,
                username,
                password,
            } => {
                params.insert("ns", Value::from(namespace.as_str()));
                params.insert("db", Value::from(database.as_str()));
                params.insert("user", Value::from(username.as_str()));
                params.insert("pass", Value::from(password.as_str()));
            }
            Credentials::Record {
                namespace,
                database,
                access,
                params: extra,
                ..
            } => {
                for (key, value) in extra {
                    params.insert(key.as_str(), Value::from(value.as_str()));
                }
                params.insert("ns", Value::from(namespace.as_str()));
                params.insert("db", Value::from(database.as_str()));
                params.insert("ac", Value::from(access.as_str()));
            }
        }
        Value::Object(params)
    }

    /// Rejects record params that would shadow `ns`, `db` or `ac`.
    pub fn validate(&self) -> Result<(), ClientError> {
        if let Credentials::Record { params, .. } = self {
            if let Some(key) = params.keys().find(|k| RESERVED_PARAMS.contains(&k.as_str())) {
                return Err(ClientError::Config(format!(
                    "record access param '{}' is reserved",
                    key
                )));
            }
        }
        Ok(())
    }
}

const RESERVED_PARAMS: &[&str] = &["ns", "db", "ac"];

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Root { username, .. } => f
                .debug_struct("Root")
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Namespace {
                namespace,
                username,
                ..
            } => f
                .debug_struct("Namespace")
                .field("namespace", namespace)
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Database {
                namespace,
                database,
                username,
                ..
            } => f
                .debug_struct("Database")
                .field("namespace", namespace)
                .field("database", database)
                .field("username", username)
                .finish_non_exhaustive(),
            Credentials::Record {
                namespace,
                database,
                access,
                signup,
                ..
            } => f
                .debug_struct("Record")
                .field("namespace", namespace)
                .field("database", database)
                .field("access", access)
                .field("signup", signup)
                .finish_non_exhaustive(),
        }
    }
}

/// TLS options for the `wss` scheme.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Path to CA certificate for server verification.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - dev only).
    pub insecure: bool,
}

impl TlsOptions {
    /// Sets CA certificate path.
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// Sets client certificate and key for mTLS.
    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    /// Enables insecure mode (skip certificate verification).
    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    fn apply_overrides(&mut self, var: &dyn Fn(&str) -> Option<String>) {
        if let Some(path) = var("SURREAL_TLS_CA") {
            self.ca_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("SURREAL_TLS_CERT") {
            self.client_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var("SURREAL_TLS_KEY") {
            self.client_key_path = Some(PathBuf::from(path));
        }
        if let Some(insecure) = var("SURREAL_TLS_INSECURE") {
            self.insecure = insecure == "1" || insecure.eq_ignore_ascii_case("true");
        }
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub host: String,
    pub port: u16,
    pub scheme: Scheme,
    /// RPC endpoint path.
    pub path: String,
    /// Namespace selected with `use` after sign-in.
    pub namespace: Option<String>,
    /// Database selected with `use` after sign-in.
    pub database: Option<String>,
    pub credentials: Option<Credentials>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Default per-call timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Buffered notifications per subscriber before the oldest are dropped.
    pub notification_capacity: usize,
    pub tls: TlsOptions,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            scheme: Scheme::Ws,
            path: DEFAULT_PATH.to_string(),
            namespace: None,
            database: None,
            credentials: None,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
            tls: TlsOptions::default(),
        }
    }
}

impl ConnectionConfig {
    /// Creates a new connection config for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Loads from `SURREAL_CONFIG` if set, then applies environment overrides.
    pub fn load() -> Result<Self, ClientError> {
        let mut config = match std::env::var("SURREAL_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            ClientError::Config(msg) => ClientError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parses configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ClientError> {
        let config: ConnectionConfig =
            serde_yaml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Applies `SURREAL_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), ClientError> {
        self.apply_overrides(&|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, var: &dyn Fn(&str) -> Option<String>) -> Result<(), ClientError> {
        if let Some(host) = var("SURREAL_HOST") {
            self.host = host;
        }
        if let Some(port) = var("SURREAL_PORT") {
            self.port = parse_var("SURREAL_PORT", &port)?;
        }
        if let Some(scheme) = var("SURREAL_SCHEME") {
            self.scheme = scheme.parse()?;
        }
        if let Some(path) = var("SURREAL_PATH") {
            self.path = path;
        }
        if let Some(ns) = var("SURREAL_NS") {
            self.namespace = Some(ns);
        }
        if let Some(db) = var("SURREAL_DB") {
            self.database = Some(db);
        }
        if let (Some(user), Some(pass)) = (var("SURREAL_USER"), var("SURREAL_PASS")) {
            self.credentials = Some(Credentials::root(user, pass));
        }
        if let Some(ms) = var("SURREAL_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = parse_var("SURREAL_CONNECT_TIMEOUT_MS", &ms)?;
        }
        if let Some(ms) = var("SURREAL_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_var("SURREAL_REQUEST_TIMEOUT_MS", &ms)?;
        }
        self.tls.apply_overrides(var);
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(ClientError::Config(format!(
                "path '{}' must start with '/'",
                self.path
            )));
        }
        if self.notification_capacity == 0 {
            return Err(ClientError::Config(
                "notification_capacity must be greater than zero".to_string(),
            ));
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        if self.tls.insecure && self.scheme == Scheme::Ws {
            tracing::warn!("tls.insecure has no effect with the ws scheme");
        }
        Ok(())
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> String {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        format!("{}://{}:{}{}", self.scheme, host, self.port, self.path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Sets the URL scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the RPC endpoint path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the namespace and database selected after sign-in.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets sign-in credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis(timeout);
        self
    }

    /// Sets request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis(timeout);
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    /// Enables `wss` with the given TLS options.
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.scheme = Scheme::Wss;
        self.tls = tls;
        self
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ClientError>
where
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e| ClientError::Config(format!("invalid {} '{}': {}", name, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("db.local", 8000);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.notification_capacity, 256);
        assert_eq!(config.url(), "ws://db.local:8000/rpc");
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_builders() {
        let config = ConnectionConfig::new("::1", 443)
            .with_tls(TlsOptions::default().with_insecure())
            .with_namespace("test")
            .with_database("app")
            .with_credentials(Credentials::root("root", "secret"))
            .with_request_timeout(Duration::from_millis(250));

        assert_eq!(config.url(), "wss://[::1]:443/rpc");
        assert_eq!(config.namespace.as_deref(), Some("test"));
        assert_eq!(config.database.as_deref(), Some("app"));
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert!(config.tls.insecure);
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
host: surreal.internal
port: 9000
scheme: wss
namespace: prod
database: orders
request_timeout_ms: 5000
credentials:
  level: database
  namespace: prod
  database: orders
  username: app
  password: hunter2
tls:
  ca_cert_path: /etc/surreal/ca.pem
"#;
        let config = ConnectionConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.url(), "wss://surreal.internal:9000/rpc");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.tls.ca_cert_path,
            Some(PathBuf::from("/etc/surreal/ca.pem"))
        );
        assert!(matches!(
            config.credentials,
            Some(Credentials::Database { ref username, .. }) if username == "app"
        ));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = ConnectionConfig::new("localhost", 8000)
            .with_credentials(Credentials::root("root", "root"));
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = ConnectionConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.url(), config.url());
        assert_eq!(parsed.credentials, config.credentials);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ConnectionConfig::from_yaml("port: not-a-number").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));

        let err = ConnectionConfig::from_yaml("notification_capacity: 0").unwrap_err();
        assert!(err.to_string().contains("notification_capacity"));

        let err = ConnectionConfig::from_file("/nonexistent/surreal.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_env_overrides() {
        let env = vars(&[
            ("SURREAL_HOST", "10.0.0.5"),
            ("SURREAL_PORT", "8080"),
            ("SURREAL_SCHEME", "WSS"),
            ("SURREAL_NS", "ns1"),
            ("SURREAL_DB", "db1"),
            ("SURREAL_USER", "root"),
            ("SURREAL_PASS", "pw"),
            ("SURREAL_REQUEST_TIMEOUT_MS", "1500"),
            ("SURREAL_TLS_INSECURE", "true"),
        ]);
        let mut config = ConnectionConfig::default();
        config.apply_overrides(&|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.url(), "wss://10.0.0.5:8080/rpc");
        assert_eq!(config.namespace.as_deref(), Some("ns1"));
        assert_eq!(config.database.as_deref(), Some("db1"));
        assert_eq!(config.credentials, Some(Credentials::root("root", "pw")));
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
        assert!(config.tls.insecure);
    }

    #[test]
    fn test_env_override_errors() {
        let env = vars(&[("SURREAL_PORT", "99999")]);
        let mut config = ConnectionConfig::default();
        let err = config.apply_overrides(&|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("SURREAL_PORT"));

        let env = vars(&[("SURREAL_SCHEME", "http")]);
        let err = config.apply_overrides(&|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("unknown scheme"));
    }

    #[test]
    fn test_credentials_params() {
        let creds = Credentials::root("root", "secret");
        assert_eq!(creds.method(), Method::Signin);
        let value = creds.to_value();
        assert_eq!(value.get("user"), Some(&Value::from("root")));
        assert_eq!(value.get("pass"), Some(&Value::from("secret")));
        assert_eq!(value.get("ns"), None);

        let creds = Credentials::Record {
            namespace: "app".to_string(),
            database: "main".to_string(),
            access: "account".to_string(),
            params: BTreeMap::from([("email".to_string(), "a@b.c".to_string())]),
            signup: true,
        };
        assert_eq!(creds.method(), Method::Signup);
        let value = creds.to_value();
        assert_eq!(value.get("ac"), Some(&Value::from("account")));
        assert_eq!(value.get("email"), Some(&Value::from("a@b.c")));
    }

    #[test]
    fn test_record_params_cannot_shadow_scope() {
        let creds = Credentials::Record {
            namespace: "app".to_string(),
            database: "main".to_string(),
            access: "account".to_string(),
            params: BTreeMap::from([
                ("ns".to_string(), "other".to_string()),
                ("email".to_string(), "a@b.c".to_string()),
            ]),
            signup: false,
        };
        let value = creds.to_value();
        assert_eq!(value.get("ns"), Some(&Value::from("app")));
        assert_eq!(value.get("email"), Some(&Value::from("a@b.c")));

        let err = creds.validate().unwrap_err();
        assert!(err.to_string().contains("'ns'"));

        let config = ConnectionConfig::default().with_credentials(creds);
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let debug = format!("{:?}", Credentials::root("root", "hunter2"));
        assert!(debug.contains("root"));
        assert!(!debug.contains("hunter2"));
    }
}
