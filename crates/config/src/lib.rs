use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

pub mod secrets;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "crosstalk.toml",
    "config/crosstalk.toml",
    "crates/config/crosstalk.toml",
    "../crosstalk.toml",
    "../config/crosstalk.toml",
    "server/crosstalk.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            relay: RelayConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "RelayConfig::default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_capacity: Self::default_history_capacity(),
        }
    }
}

impl RelayConfig {
    const fn default_history_capacity() -> usize {
        100
    }
}

/// Optional outbound mail settings for operational notifications.
///
/// The SMTP password may be stored as ciphertext produced by the [`secrets`]
/// module; [`load`] replaces it with the revealed plaintext.
///
/// ```
/// use crosstalk_config::MailConfig;
///
/// let mail = MailConfig::default();
/// assert!(mail.smtp_host.is_none());
/// assert_eq!(mail.smtp_port, 587);
/// assert!(!mail.is_configured());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "MailConfig::default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
}

impl MailConfig {
    const fn default_smtp_port() -> u16 {
        587
    }

    /// True when enough fields are present to attempt SMTP delivery.
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_username.is_some() && self.smtp_password.is_some()
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: Self::default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use crosstalk_config::load;
///
/// std::env::remove_var("CROSSTALK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let history_capacity = defaults.relay.history_capacity as i64;

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("http.address", defaults.http.address.clone())
        .unwrap()
        .set_default("http.port", i64::from(defaults.http.port))
        .unwrap()
        .set_default("relay.history_capacity", history_capacity)
        .unwrap()
        .set_default("mail.smtp_port", i64::from(defaults.mail.smtp_port))
        .unwrap();

    let environment_overrides = config::Environment::with_prefix("CROSSTALK").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("CROSSTALK_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via CROSSTALK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    debug!(?config, "loaded relay configuration");

    if let Some(stored) = config.mail.smtp_password.take() {
        let secrets =
            secrets::Secrets::from_env().context("unable to initialise the secret store")?;
        config.mail.smtp_password = Some(secrets.reveal(&stored));
    }

    Ok(config)
}
