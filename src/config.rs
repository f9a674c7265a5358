//! Provider block configuration.
//!
//! The provider block may leave any attribute unset and fall back to an
//! `EC_*` environment variable. The environment is read exactly once, in
//! the binary, into [`EnvDefaults`]; everything below works on explicit
//! values so tests never touch the process environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::schema::{Attribute, Diagnostic, Schema};

/// Endpoint used when neither the block nor the environment sets one.
pub const DEFAULT_ENDPOINT: &str = "https://api.elastic-cloud.com";

pub const DEFAULT_TIMEOUT: &str = "1m";

pub const DEFAULT_VERBOSE_FILE: &str = "request.log";

/// Schema of the `provider "ec"` block.
pub fn provider_schema() -> Schema {
    Schema::v0()
        .with_description("Elastic Cloud provider")
        .with_attribute(
            "endpoint",
            Attribute::optional_string().with_description(format!(
                "Elastic Cloud API endpoint. Defaults to {} or EC_ENDPOINT",
                DEFAULT_ENDPOINT
            )),
        )
        .with_attribute(
            "apikey",
            Attribute::optional_string()
                .sensitive()
                .with_description("API key. Conflicts with username and password"),
        )
        .with_attribute(
            "username",
            Attribute::optional_string().with_description("Username for basic authentication"),
        )
        .with_attribute(
            "password",
            Attribute::optional_string()
                .sensitive()
                .with_description("Password for basic authentication"),
        )
        .with_attribute(
            "insecure",
            Attribute::optional_bool().with_description("Skip TLS certificate verification"),
        )
        .with_attribute(
            "timeout",
            Attribute::optional_string()
                .with_description(format!("HTTP request timeout, e.g. \"90s\". Defaults to {}", DEFAULT_TIMEOUT)),
        )
        .with_attribute(
            "verbose",
            Attribute::optional_bool().with_description("Write every request and response to verbose_file"),
        )
        .with_attribute(
            "verbose_credentials",
            Attribute::optional_bool()
                .with_description("Include the Authorization header in the verbose log"),
        )
        .with_attribute(
            "verbose_file",
            Attribute::optional_string()
                .with_description(format!("Verbose log path. Defaults to {}", DEFAULT_VERBOSE_FILE)),
        )
}

/// `EC_*` environment values captured at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    pub endpoint: Option<String>,
    pub apikey: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: Option<String>,
    pub timeout: Option<String>,
    pub verbose: Option<String>,
    pub verbose_credentials: Option<String>,
    pub verbose_file: Option<String>,
}

impl EnvDefaults {
    /// Capture the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture defaults through a lookup function. For each setting the
    /// first non-empty variable in the list wins.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .find(|value| !value.is_empty())
        };
        Self {
            endpoint: first(&["EC_ENDPOINT", "EC_HOST"]),
            apikey: first(&["EC_API_KEY"]),
            username: first(&["EC_USERNAME", "EC_USER"]),
            password: first(&["EC_PASSWORD", "EC_PASS"]),
            insecure: first(&["EC_INSECURE", "EC_SKIP_TLS_VALIDATION"]),
            timeout: first(&["EC_TIMEOUT"]),
            verbose: first(&["EC_VERBOSE"]),
            verbose_credentials: first(&["EC_VERBOSE_CREDENTIALS"]),
            verbose_file: first(&["EC_VERBOSE_FILE"]),
        }
    }
}

/// The provider block as written by the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProviderBlock {
    endpoint: Option<String>,
    apikey: Option<String>,
    username: Option<String>,
    password: Option<String>,
    insecure: Option<bool>,
    timeout: Option<String>,
    verbose: Option<bool>,
    verbose_credentials: Option<bool>,
    verbose_file: Option<String>,
}

/// How requests authenticate.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Authorization: ApiKey <key>`.
    ApiKey(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<REDACTED>").finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<REDACTED>")
                .finish(),
        }
    }
}

/// Where the verbose request log goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerboseSettings {
    pub file: PathBuf,
    /// Keep the Authorization header in the log.
    pub credentials: bool,
}

/// Fully resolved provider configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub credentials: Credentials,
    pub insecure: bool,
    pub timeout: Duration,
    pub verbose: Option<VerboseSettings>,
}

impl ProviderConfig {
    /// Merge the provider block with the environment defaults and validate
    /// the result. Block values take precedence.
    pub fn resolve(config: &Value, env: &EnvDefaults) -> Result<Self, Vec<Diagnostic>> {
        let block: ProviderBlock = if config.is_null() {
            ProviderBlock::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| {
                vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
            })?
        };

        let mut diagnostics = Vec::new();

        let endpoint = non_empty(block.endpoint)
            .or_else(|| env.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            diagnostics.push(
                Diagnostic::error("Invalid endpoint")
                    .with_detail(format!(
                        "endpoint \"{}\" must be an http:// or https:// URL",
                        endpoint
                    ))
                    .with_attribute("endpoint"),
            );
        }

        let explicit_key = non_empty(block.apikey);
        let explicit_user = non_empty(block.username);
        let explicit_pass = non_empty(block.password);
        let explicit_basic = explicit_user.is_some() || explicit_pass.is_some();

        let credentials = if explicit_key.is_some() && explicit_basic {
            diagnostics.push(
                Diagnostic::error("Conflicting authentication settings")
                    .with_detail("apikey cannot be combined with username and password")
                    .with_attribute("apikey"),
            );
            None
        } else if let Some(key) = explicit_key {
            Some(Credentials::ApiKey(key))
        } else if explicit_basic {
            basic_credentials(
                explicit_user.or_else(|| env.username.clone()),
                explicit_pass.or_else(|| env.password.clone()),
                &mut diagnostics,
            )
        } else if let Some(key) = env.apikey.clone() {
            Some(Credentials::ApiKey(key))
        } else if env.username.is_some() || env.password.is_some() {
            basic_credentials(env.username.clone(), env.password.clone(), &mut diagnostics)
        } else {
            diagnostics.push(
                Diagnostic::error("Missing credentials")
                    .with_detail("set either apikey (EC_API_KEY) or username and password (EC_USERNAME, EC_PASSWORD)"),
            );
            None
        };

        let insecure = resolve_bool("insecure", block.insecure, &env.insecure, &mut diagnostics);
        let verbose = resolve_bool("verbose", block.verbose, &env.verbose, &mut diagnostics);
        let verbose_credentials = resolve_bool(
            "verbose_credentials",
            block.verbose_credentials,
            &env.verbose_credentials,
            &mut diagnostics,
        );

        let timeout_text = non_empty(block.timeout)
            .or_else(|| env.timeout.clone())
            .unwrap_or_else(|| DEFAULT_TIMEOUT.to_string());
        let timeout = match humantime::parse_duration(&timeout_text) {
            Ok(timeout) => timeout,
            Err(e) => {
                diagnostics.push(
                    Diagnostic::error("Invalid timeout")
                        .with_detail(format!("\"{}\": {}", timeout_text, e))
                        .with_attribute("timeout"),
                );
                Duration::ZERO
            },
        };

        let verbose_file = non_empty(block.verbose_file)
            .or_else(|| env.verbose_file.clone())
            .unwrap_or_else(|| DEFAULT_VERBOSE_FILE.to_string());

        match credentials {
            Some(credentials) if diagnostics.is_empty() => Ok(Self {
                endpoint,
                credentials,
                insecure,
                timeout,
                verbose: verbose.then(|| VerboseSettings {
                    file: PathBuf::from(verbose_file),
                    credentials: verbose_credentials,
                }),
            }),
            _ => Err(diagnostics),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn basic_credentials(
    username: Option<String>,
    password: Option<String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Credentials> {
    match (username, password) {
        (Some(username), Some(password)) => Some(Credentials::Basic { username, password }),
        (Some(_), None) => {
            diagnostics.push(
                Diagnostic::error("Missing password")
                    .with_detail("username requires password")
                    .with_attribute("password"),
            );
            None
        },
        (None, _) => {
            diagnostics.push(
                Diagnostic::error("Missing username")
                    .with_detail("password requires username")
                    .with_attribute("username"),
            );
            None
        },
    }
}

fn resolve_bool(
    name: &str,
    explicit: Option<bool>,
    env: &Option<String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    if let Some(value) = explicit {
        return value;
    }
    match env.as_deref().map(parse_bool) {
        None => false,
        Some(Some(value)) => value,
        Some(None) => {
            diagnostics.push(
                Diagnostic::error(format!("Invalid boolean for {}", name))
                    .with_detail(format!(
                        "environment value \"{}\" is not a boolean",
                        env.as_deref().unwrap_or_default()
                    ))
                    .with_attribute(name),
            );
            false
        },
    }
}

/// Accepts the spellings shells and CI systems commonly use.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> EnvDefaults {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvDefaults::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_env_aliases() {
        let defaults = env(&[
            ("EC_HOST", "https://ece.example.com"),
            ("EC_USER", "admin"),
            ("EC_PASS", "secret"),
            ("EC_SKIP_TLS_VALIDATION", "true"),
        ]);
        assert_eq!(defaults.endpoint.as_deref(), Some("https://ece.example.com"));
        assert_eq!(defaults.username.as_deref(), Some("admin"));
        assert_eq!(defaults.insecure.as_deref(), Some("true"));

        let preferred = env(&[("EC_ENDPOINT", "https://a"), ("EC_HOST", "https://b")]);
        assert_eq!(preferred.endpoint.as_deref(), Some("https://a"));

        let empty_skipped = env(&[("EC_ENDPOINT", ""), ("EC_HOST", "https://b")]);
        assert_eq!(empty_skipped.endpoint.as_deref(), Some("https://b"));
    }

    #[test]
    fn test_defaults_with_apikey() {
        let config = ProviderConfig::resolve(&json!({"apikey": "key"}), &EnvDefaults::default())
            .unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.credentials, Credentials::ApiKey("key".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(!config.insecure);
        assert!(config.verbose.is_none());
    }

    #[test]
    fn test_null_block_uses_env() {
        let config = ProviderConfig::resolve(
            &Value::Null,
            &env(&[("EC_API_KEY", "from-env"), ("EC_TIMEOUT", "90s")]),
        )
        .unwrap();
        assert_eq!(config.credentials, Credentials::ApiKey("from-env".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(90));
    }

    #[test]
    fn test_block_wins_over_env() {
        let config = ProviderConfig::resolve(
            &json!({"username": "admin", "password": "pw", "endpoint": "https://ece.local"}),
            &env(&[("EC_API_KEY", "from-env"), ("EC_ENDPOINT", "https://other")]),
        )
        .unwrap();
        assert_eq!(config.endpoint, "https://ece.local");
        assert!(matches!(config.credentials, Credentials::Basic { .. }));
    }

    #[test]
    fn test_apikey_conflicts_with_basic() {
        let diagnostics = ProviderConfig::resolve(
            &json!({"apikey": "key", "username": "admin", "password": "pw"}),
            &EnvDefaults::default(),
        )
        .unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("apikey"));
    }

    #[test]
    fn test_username_requires_password() {
        let diagnostics =
            ProviderConfig::resolve(&json!({"username": "admin"}), &EnvDefaults::default())
                .unwrap_err();
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("password"));
    }

    #[test]
    fn test_missing_credentials() {
        let diagnostics = ProviderConfig::resolve(&json!({}), &EnvDefaults::default()).unwrap_err();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].summary, "Missing credentials");
    }

    #[test]
    fn test_invalid_values() {
        let diagnostics = ProviderConfig::resolve(
            &json!({"apikey": "k", "timeout": "soon", "endpoint": "ftp://x"}),
            &env(&[("EC_VERBOSE", "maybe")]),
        )
        .unwrap_err();
        let attributes: Vec<_> = diagnostics
            .iter()
            .filter_map(|d| d.attribute.as_deref())
            .collect();
        assert_eq!(attributes, vec!["endpoint", "verbose", "timeout"]);
    }

    #[test]
    fn test_unknown_attribute() {
        let diagnostics =
            ProviderConfig::resolve(&json!({"apikey": "k", "region": "x"}), &EnvDefaults::default())
                .unwrap_err();
        assert_eq!(diagnostics[0].summary, "Invalid provider configuration");
    }

    #[test]
    fn test_verbose_settings() {
        let config = ProviderConfig::resolve(
            &json!({"apikey": "k", "verbose": true}),
            &env(&[("EC_VERBOSE_CREDENTIALS", "1"), ("EC_VERBOSE_FILE", "/tmp/ec.log")]),
        )
        .unwrap();
        let verbose = config.verbose.unwrap();
        assert_eq!(verbose.file, PathBuf::from("/tmp/ec.log"));
        assert!(verbose.credentials);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("T"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let debug = format!(
            "{:?}",
            Credentials::Basic {
                username: "admin".into(),
                password: "hunter2".into()
            }
        );
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
        assert!(!format!("{:?}", Credentials::ApiKey("abc123".into())).contains("abc123"));
    }

    #[test]
    fn test_schema_marks_secrets_sensitive() {
        let schema = provider_schema();
        assert!(schema.block.attributes["apikey"].flags.sensitive);
        assert!(schema.block.attributes["password"].flags.sensitive);
        assert!(!schema.block.attributes["username"].flags.sensitive);
    }
}
