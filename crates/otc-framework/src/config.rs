//! # Provider Configuration
//!
//! Process-level settings read once at provider init. Sources, later ones winning:
//!
//! 1. a TOML file (optional),
//! 2. `OS_*` environment variables,
//! 3. the JSON object sent with the engine's `Configure` call.
//!
//! ```toml
//! auth_url = "https://iam.eu-de.otc.t-systems.com/v3"
//! region = "eu-de"
//! domain_name = "OTC00000000001000000001"
//! project_name = "eu-de_demo"
//! access_key = "AK..."
//! secret_key = "SK..."
//! max_retries = 3
//!
//! [endpoints]
//! vpc = "https://vpc.example.internal/"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid {name}: {reason}")]
    Env { name: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub auth_url: Option<String>,
    pub region: Option<String>,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub cacert_file: Option<String>,
    pub insecure: bool,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub http_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    /// Per-service endpoint overrides, keyed by service type (`vpc`, `network`, `rds`, ...).
    pub endpoints: BTreeMap<String, String>,
}

/// How the provider proves its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Token,
    Password,
    AkSk,
}

impl ProviderConfig {
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Applies `OS_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Applies `OS_*` variables from an arbitrary lookup.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let strings: [(&str, &mut Option<String>); 14] = [
            ("OS_AUTH_URL", &mut self.auth_url),
            ("OS_REGION_NAME", &mut self.region),
            ("OS_PROJECT_ID", &mut self.project_id),
            ("OS_PROJECT_NAME", &mut self.project_name),
            ("OS_DOMAIN_ID", &mut self.domain_id),
            ("OS_DOMAIN_NAME", &mut self.domain_name),
            ("OS_USERNAME", &mut self.user_name),
            ("OS_PASSWORD", &mut self.password),
            ("OS_TOKEN", &mut self.token),
            ("OS_ACCESS_KEY", &mut self.access_key),
            ("OS_SECRET_KEY", &mut self.secret_key),
            ("OS_CACERT", &mut self.cacert_file),
            ("OS_CERT", &mut self.cert),
            ("OS_KEY", &mut self.key),
        ];
        for (name, field) in strings {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *field = Some(value);
            }
        }

        if let Some(v) = lookup("OS_INSECURE") {
            self.insecure = parse_env("OS_INSECURE", &v)?;
        }
        if let Some(v) = lookup("OS_HTTP_TIMEOUT") {
            self.http_timeout_secs = Some(parse_env("OS_HTTP_TIMEOUT", &v)?);
        }
        if let Some(v) = lookup("OS_MAX_RETRIES") {
            self.max_retries = Some(parse_env("OS_MAX_RETRIES", &v)?);
        }
        Ok(())
    }

    /// Overlays the fields set in `other`.
    pub fn merge(&mut self, other: ProviderConfig) {
        macro_rules! take {
            ($($field:ident),*) => {$(
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            )*};
        }
        take!(
            auth_url, region, project_id, project_name, domain_id, domain_name, user_name,
            password, token, access_key, secret_key, cacert_file, cert, key, http_timeout_secs,
            max_retries, retry_base_delay_ms
        );
        self.insecure |= other.insecure;
        self.endpoints.extend(other.endpoints);
    }

    pub fn auth_method(&self) -> Option<AuthMethod> {
        if self.access_key.is_some() && self.secret_key.is_some() {
            Some(AuthMethod::AkSk)
        } else if self.token.is_some() {
            Some(AuthMethod::Token)
        } else if self.user_name.is_some() && self.password.is_some() {
            Some(AuthMethod::Password)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |m: &str| Err(ConfigError::Invalid(m.to_owned()));

        if self.auth_url.as_deref().unwrap_or_default().is_empty() {
            return invalid("auth_url must be set");
        }
        if self.access_key.is_some() != self.secret_key.is_some() {
            return invalid("access_key and secret_key must be set together");
        }
        if self.cert.is_some() != self.key.is_some() {
            return invalid("cert and key must be set together");
        }
        if self.auth_method().is_none() {
            return invalid("one of token, user_name + password or access_key + secret_key must be set");
        }
        if self.project_id.is_none() && self.project_name.is_none() {
            return invalid("one of project_id or project_name must be set");
        }
        if let Some(region) = &self.region {
            if region.chars().any(|c| c.is_ascii_uppercase()) {
                return invalid("region must be lowercase");
            }
        }
        Ok(())
    }

    /// Configured region, falling back to the project name prefix (`eu-de_demo` -> `eu-de`).
    pub fn region(&self) -> Option<String> {
        self.region.clone().or_else(|| {
            self.project_name
                .as_deref()
                .and_then(|p| p.split('_').next())
                .filter(|r| !r.is_empty())
                .map(str::to_owned)
        })
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_HTTP_TIMEOUT)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(Self::DEFAULT_MAX_RETRIES)
    }

    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_RETRY_BASE_DELAY)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("auth_url", &self.auth_url)
            .field("region", &self.region)
            .field("project_id", &self.project_id)
            .field("project_name", &self.project_name)
            .field("domain_id", &self.domain_id)
            .field("domain_name", &self.domain_name)
            .field("user_name", &self.user_name)
            .field("password", &redact(&self.password))
            .field("token", &redact(&self.token))
            .field("access_key", &self.access_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("insecure", &self.insecure)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn valid() -> ProviderConfig {
        ProviderConfig {
            auth_url: Some("https://iam.eu-de.otc.t-systems.com/v3".into()),
            project_name: Some("eu-de_demo".into()),
            access_key: Some("AK".into()),
            secret_key: Some("SK".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("provider.toml");
        fs::write(
            &path,
            r#"
auth_url = "https://iam.eu-de.otc.t-systems.com/v3"
region = "eu-nl"
project_id = "p1"
token = "t"
max_retries = 5

[endpoints]
vpc = "http://localhost:8080/"
"#,
        )
        .unwrap();

        let config = ProviderConfig::load(&path).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-nl"));
        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.endpoints["vpc"], "http://localhost:8080/");
        assert_eq!(config.auth_method(), Some(AuthMethod::Token));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "max_retries = \"many\"").unwrap();
        assert!(matches!(ProviderConfig::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            ProviderConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OS_REGION_NAME", "eu-de"),
            ("OS_INSECURE", "true"),
            ("OS_MAX_RETRIES", "7"),
        ]);
        let mut config = valid();
        config.region = Some("eu-nl".into());
        config
            .apply_vars(|name| vars.get(name).map(|v| (*v).to_owned()))
            .unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-de"));
        assert!(config.insecure);
        assert_eq!(config.max_retries(), 7);

        let err = config.apply_vars(|name| (name == "OS_HTTP_TIMEOUT").then(|| "soon".to_owned()));
        assert!(matches!(err, Err(ConfigError::Env { .. })));
    }

    #[test]
    fn test_validate_rules() {
        assert!(valid().validate().is_ok());

        let mut c = valid();
        c.auth_url = None;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.secret_key = None;
        assert!(c.validate().unwrap_err().to_string().contains("together"));

        let mut c = valid();
        c.cert = Some("c.pem".into());
        assert!(c.validate().is_err());

        let mut c = valid();
        c.project_name = None;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.access_key = None;
        c.secret_key = None;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_region_from_project_name() {
        assert_eq!(valid().region().as_deref(), Some("eu-de"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut c = valid();
        c.password = Some("hunter2".into());
        let text = format!("{c:?}");
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("\"SK\""));
        assert!(text.contains("<redacted>"));
    }

    #[test]
    fn test_merge_prefers_later_values() {
        let mut base = valid();
        base.merge(ProviderConfig {
            region: Some("eu-nl".into()),
            ..Default::default()
        });
        assert_eq!(base.region.as_deref(), Some("eu-nl"));
        assert_eq!(base.access_key.as_deref(), Some("AK"));
    }
}
