//! instaflow configuration
//!
//! Settings come from an optional YAML file overlaid with environment
//! variables. Every setting is addressed by its environment variable name,
//! which is also the key reported in [`ConfigError`].
//!
//! Lookup order for the file:
//! 1. `INSTAFLOW_CONFIG` (direct path)
//! 2. `~/.config/instaflow/config.yaml`
//!
//! Presence of credentials and resource fields is not checked here; missing
//! values surface as configuration errors from the first attempt.

pub mod error;

pub use error::*;

use instaflow_cloud::{KeySecret, RawCredentials, ResourceSpec, ShapeConfig};
use instaflow_core::{
    FanoutNotifier, NotificationSink, RetryPolicy, TelegramNotifier, TracingNotifier,
    WebhookNotifier,
};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "INSTAFLOW_CONFIG";
pub const DEFAULT_REGION: &str = "me-abudhabi-1";
pub const DEFAULT_SHAPE: &str = "VM.Standard.A1.Flex";
pub const DEFAULT_OCPUS: f32 = 4.0;
pub const DEFAULT_MEMORY_GB: f32 = 24.0;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 300;

/// instaflow config directory (`~/.config/instaflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("instaflow"))
}

/// Locate the config file, if any
pub fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
        tracing::warn!("{} points to a missing file: {}", CONFIG_PATH_ENV, path.display());
    }

    let global = get_config_dir().ok()?.join("config.yaml");
    global.exists().then_some(global)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Accepts any YAML scalar and keeps its text form
fn scalar<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a scalar value, found {:?}",
            other
        ))),
    }
}

/// API signing credentials
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CredentialSettings {
    #[serde(deserialize_with = "scalar")]
    pub tenancy: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub user: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub fingerprint: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub region: Option<String>,
    /// PEM text, `\n` escapes allowed
    #[serde(deserialize_with = "scalar")]
    pub private_key: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub private_key_base64: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub private_key_path: Option<String>,
}

impl std::fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("CredentialSettings")
            .field("tenancy", &self.tenancy)
            .field("user", &self.user)
            .field("fingerprint", &self.fingerprint)
            .field("region", &self.region)
            .field("private_key", &redacted(&self.private_key))
            .field("private_key_base64", &redacted(&self.private_key_base64))
            .field("private_key_path", &self.private_key_path)
            .finish()
    }
}

/// Instance to provision
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceSettings {
    #[serde(deserialize_with = "scalar")]
    pub compartment_id: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub subnet_id: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub image_id: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub shape: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub ocpus: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub memory_gb: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub boot_volume_gb: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub ssh_public_key: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub display_name: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub availability_domain: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub assign_public_ip: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub adopt_existing: Option<String>,
}

/// Retry schedule
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(deserialize_with = "scalar")]
    pub interval_secs: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub rate_limit_cooldown_secs: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub backoff_multiplier: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub max_delay_secs: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub attempt_timeout_secs: Option<String>,
}

/// Notification targets
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySettings {
    #[serde(deserialize_with = "scalar")]
    pub telegram_bot_token: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub telegram_chat_id: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub webhook_url: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub failures: Option<String>,
}

impl std::fmt::Debug for NotifySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySettings")
            .field(
                "telegram_bot_token",
                &self.telegram_bot_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("telegram_chat_id", &self.telegram_chat_id)
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "[REDACTED]"))
            .field("failures", &self.failures)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    #[serde(deserialize_with = "scalar")]
    pub port: Option<String>,
}

/// Complete instaflow settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub credentials: CredentialSettings,
    pub instance: InstanceSettings,
    pub retry: RetrySettings,
    pub notify: NotifySettings,
    pub server: ServerSettings,

    /// File the settings were read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Settings {
    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut settings = match find_config_file() {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Environment variables only
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env();
        settings
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: Settings = if content.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };
        settings.source = Some(path.to_path_buf());
        tracing::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Override file values with non-empty environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(non_empty_env);
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let c = &mut self.credentials;
        let i = &mut self.instance;
        let r = &mut self.retry;
        let n = &mut self.notify;
        let table: [(&str, &mut Option<String>); 29] = [
            ("OCI_TENANCY", &mut c.tenancy),
            ("OCI_USER", &mut c.user),
            ("OCI_FINGERPRINT", &mut c.fingerprint),
            ("OCI_REGION", &mut c.region),
            ("OCI_PRIVATE_KEY", &mut c.private_key),
            ("OCI_PRIVATE_KEY_BASE64", &mut c.private_key_base64),
            ("OCI_PRIVATE_KEY_PATH", &mut c.private_key_path),
            ("OCI_COMPARTMENT_ID", &mut i.compartment_id),
            ("SUBNET_ID", &mut i.subnet_id),
            ("IMAGE_ID", &mut i.image_id),
            ("OCI_SHAPE", &mut i.shape),
            ("OCI_OCPUS", &mut i.ocpus),
            ("OCI_MEMORY_GB", &mut i.memory_gb),
            ("OCI_BOOT_VOLUME_GB", &mut i.boot_volume_gb),
            ("SSH_PUBLIC_KEY", &mut i.ssh_public_key),
            ("DISPLAY_NAME", &mut i.display_name),
            ("AVAILABILITY_DOMAIN", &mut i.availability_domain),
            ("ASSIGN_PUBLIC_IP", &mut i.assign_public_ip),
            ("ADOPT_EXISTING", &mut i.adopt_existing),
            ("RETRY_INTERVAL_SECS", &mut r.interval_secs),
            ("RATE_LIMIT_COOLDOWN_SECS", &mut r.rate_limit_cooldown_secs),
            ("RETRY_BACKOFF_MULTIPLIER", &mut r.backoff_multiplier),
            ("RETRY_MAX_DELAY_SECS", &mut r.max_delay_secs),
            ("ATTEMPT_TIMEOUT_SECS", &mut r.attempt_timeout_secs),
            ("TELEGRAM_BOT_TOKEN", &mut n.telegram_bot_token),
            ("TELEGRAM_CHAT_ID", &mut n.telegram_chat_id),
            ("NOTIFY_WEBHOOK_URL", &mut n.webhook_url),
            ("NOTIFY_FAILURES", &mut n.failures),
            ("PORT", &mut self.server.port),
        ];
        for (key, slot) in table {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
        }
    }

    /// Raw signing secrets for the credential materializer
    ///
    /// Key sources in priority order: key file path, base64, PEM text.
    pub fn raw_credentials(&self) -> RawCredentials {
        let c = &self.credentials;
        let private_key = if let Some(path) = present(&c.private_key_path) {
            KeySecret::File(PathBuf::from(path))
        } else if let Some(encoded) = present(&c.private_key_base64) {
            KeySecret::base64(encoded)
        } else if let Some(text) = present(&c.private_key) {
            KeySecret::detect(text)
        } else {
            KeySecret::Missing
        };

        RawCredentials {
            tenancy: present(&c.tenancy).unwrap_or_default().to_string(),
            user: present(&c.user).unwrap_or_default().to_string(),
            fingerprint: present(&c.fingerprint).unwrap_or_default().to_string(),
            region: present(&c.region).unwrap_or(DEFAULT_REGION).to_string(),
            private_key,
        }
    }

    /// Instance specification; the compartment defaults to the tenancy
    pub fn resource_spec(&self) -> Result<ResourceSpec> {
        let i = &self.instance;
        let compartment = present(&i.compartment_id)
            .or_else(|| present(&self.credentials.tenancy))
            .unwrap_or_default();

        let ocpus = parse_positive("OCI_OCPUS", &i.ocpus, DEFAULT_OCPUS)?;
        let memory = parse_positive("OCI_MEMORY_GB", &i.memory_gb, DEFAULT_MEMORY_GB)?;
        let shape_config =
            ShapeConfig::new(ocpus, memory).map_err(|e| ConfigError::InvalidNumber {
                key: if e.field() == "ocpus" {
                    "OCI_OCPUS"
                } else {
                    "OCI_MEMORY_GB"
                },
                value: e.to_string(),
            })?;

        let boot_volume = present(&i.boot_volume_gb)
            .map(|v| parse_number::<u32>("OCI_BOOT_VOLUME_GB", v))
            .transpose()?;

        let mut spec = ResourceSpec::new(
            compartment,
            present(&i.shape).unwrap_or(DEFAULT_SHAPE),
            present(&i.image_id).unwrap_or_default(),
            present(&i.subnet_id).unwrap_or_default(),
        )
        .with_shape_config(shape_config)
        .with_availability_domain(i.availability_domain.clone())
        .with_ssh_public_key(i.ssh_public_key.clone())
        .with_boot_volume_size_gbs(boot_volume)
        .with_public_ip(parse_bool("ASSIGN_PUBLIC_IP", &i.assign_public_ip, true)?);
        if let Some(name) = present(&i.display_name) {
            spec = spec.with_display_name(name);
        }
        Ok(spec)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        let r = &self.retry;
        let defaults = RetryPolicy::default();

        let multiplier = match present(&r.backoff_multiplier) {
            Some(v) => {
                let m = parse_number::<f64>("RETRY_BACKOFF_MULTIPLIER", v)?;
                if !m.is_finite() || m < 1.0 {
                    return Err(ConfigError::InvalidNumber {
                        key: "RETRY_BACKOFF_MULTIPLIER",
                        value: v.to_string(),
                    });
                }
                m
            }
            None => defaults.backoff_multiplier,
        };

        Ok(RetryPolicy {
            interval: parse_secs("RETRY_INTERVAL_SECS", &r.interval_secs, defaults.interval)?,
            rate_limit_cooldown: parse_secs(
                "RATE_LIMIT_COOLDOWN_SECS",
                &r.rate_limit_cooldown_secs,
                defaults.rate_limit_cooldown,
            )?,
            backoff_multiplier: multiplier,
            max_delay: parse_secs("RETRY_MAX_DELAY_SECS", &r.max_delay_secs, defaults.max_delay)?,
        })
    }

    pub fn attempt_timeout(&self) -> Result<Duration> {
        parse_secs(
            "ATTEMPT_TIMEOUT_SECS",
            &self.retry.attempt_timeout_secs,
            Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS),
        )
    }

    pub fn adopt_existing(&self) -> Result<bool> {
        parse_bool("ADOPT_EXISTING", &self.instance.adopt_existing, true)
    }

    pub fn notify_failures(&self) -> Result<bool> {
        parse_bool("NOTIFY_FAILURES", &self.notify.failures, false)
    }

    pub fn port(&self) -> Result<u16> {
        match present(&self.server.port) {
            Some(v) => parse_number::<u16>("PORT", v),
            None => Ok(DEFAULT_PORT),
        }
    }

    /// Log sink plus every configured remote sink
    pub fn notifier(&self) -> FanoutNotifier {
        let n = &self.notify;
        let mut fanout = FanoutNotifier::new().with_sink(Arc::new(TracingNotifier));

        match (present(&n.telegram_bot_token), present(&n.telegram_chat_id)) {
            (Some(token), Some(chat_id)) => {
                fanout = fanout.with_sink(Arc::new(TelegramNotifier::new(token, chat_id)));
            }
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID must both be set, Telegram disabled");
            }
            (None, None) => {}
        }

        if let Some(url) = present(&n.webhook_url) {
            fanout = fanout.with_sink(Arc::new(WebhookNotifier::new(url)));
        }
        fanout
    }

    /// Shared handle for [`Settings::notifier`]
    pub fn notification_sink(&self) -> Arc<dyn NotificationSink> {
        Arc::new(self.notifier())
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidNumber {
            key,
            value: value.to_string(),
        })
}

fn parse_positive(key: &'static str, value: &Option<String>, default: f32) -> Result<f32> {
    let Some(raw) = present(value) else {
        return Ok(default);
    };
    let parsed = parse_number::<f32>(key, raw)?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        });
    }
    Ok(parsed)
}

fn parse_secs(key: &'static str, value: &Option<String>, default: Duration) -> Result<Duration> {
    let Some(raw) = present(value) else {
        return Ok(default);
    };
    let secs = parse_number::<u64>(key, raw)?;
    if secs == 0 {
        return Err(ConfigError::InvalidNumber {
            key,
            value: raw.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(key: &'static str, value: &Option<String>, default: bool) -> Result<bool> {
    let Some(raw) = present(value) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: raw.to_string(),
        }),
    }
}
