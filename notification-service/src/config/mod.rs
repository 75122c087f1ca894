use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_STARTTLS_PORT: u16 = 587;
const DEFAULT_IMPLICIT_TLS_PORT: u16 = 465;
const DEFAULT_PLAINTEXT_PORTS: &str = "1025";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
const DEFAULT_FROM_EMAIL: &str = "no-reply@example.com";
const DEFAULT_FROM_NAME: &str = "Notification Service";

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub common: core_config::Config,
    pub smtp: SmtpConfig,
    pub notify: NotifyConfig,
}

/// How the SMTP session is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    /// TLS from the first byte (SMTPS, conventionally port 465).
    ImplicitTls,
    /// Plaintext greeting upgraded with STARTTLS.
    StartTls,
    /// No encryption. Only meant for local mail catchers.
    Plaintext,
}

impl std::fmt::Display for TransportSecurity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportSecurity::ImplicitTls => write!(f, "implicit-tls"),
            TransportSecurity::StartTls => write!(f, "starttls"),
            TransportSecurity::Plaintext => write!(f, "plaintext"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    pub from_email: String,
    pub from_name: String,
    pub use_tls: bool,
    pub use_ssl: bool,
    /// Refuse to send anonymously. Checked before any connection is opened.
    pub require_auth: bool,
    /// `None` leaves the session unbounded.
    pub timeout: Option<Duration>,
    pub enabled: bool,
}

impl SmtpConfig {
    /// `use_ssl` wins over `use_tls`.
    pub fn security(&self) -> TransportSecurity {
        if self.use_ssl {
            TransportSecurity::ImplicitTls
        } else if self.use_tls {
            TransportSecurity::StartTls
        } else {
            TransportSecurity::Plaintext
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub admin_email: String,
    /// Also deliver the notification to the registrant's own address.
    pub copy_registrant: bool,
}

impl NotificationConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the service settings from an arbitrary key lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let use_ssl = get("SMTP_USE_SSL")
            .map(|v| parse_bool("SMTP_USE_SSL", &v))
            .transpose()?
            .unwrap_or(false);

        let port = match get("SMTP_PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("SMTP_PORT is not a valid port: {}", e))
            })?,
            None if use_ssl => DEFAULT_IMPLICIT_TLS_PORT,
            None => DEFAULT_STARTTLS_PORT,
        };

        let plaintext_ports = parse_ports(
            "SMTP_PLAINTEXT_PORTS",
            &lookup("SMTP_PLAINTEXT_PORTS").unwrap_or_else(|| DEFAULT_PLAINTEXT_PORTS.to_string()),
        )?;

        let use_tls = match get("SMTP_USE_TLS") {
            Some(v) => parse_bool("SMTP_USE_TLS", &v)?,
            None => !plaintext_ports.contains(&port),
        };

        let require_auth = match get("SMTP_REQUIRE_AUTH") {
            Some(v) => parse_bool("SMTP_REQUIRE_AUTH", &v)?,
            None => use_ssl || use_tls,
        };

        let timeout = match get("SMTP_TIMEOUT_SECS") {
            Some(v) => v.trim().parse::<u64>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!(
                    "SMTP_TIMEOUT_SECS is not a number of seconds: {}",
                    e
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let username = get("SMTP_USERNAME");
        let admin_override = get("ADMIN_EMAIL");

        let admin_email = admin_override
            .clone()
            .or_else(|| username.clone())
            .unwrap_or_else(|| DEFAULT_ADMIN_EMAIL.to_string());
        let from_email = admin_override
            .or_else(|| username.clone())
            .unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string());

        Ok(NotificationConfig {
            common,
            smtp: SmtpConfig {
                host: get("SMTP_SERVER").unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
                port,
                username,
                password: get("SMTP_PASSWORD").map(Secret::new),
                from_email,
                from_name: get("SMTP_FROM_NAME").unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
                use_tls,
                use_ssl,
                require_auth,
                timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
                enabled: get("SMTP_ENABLED")
                    .map(|v| parse_bool("SMTP_ENABLED", &v))
                    .transpose()?
                    .unwrap_or(true),
            },
            notify: NotifyConfig {
                admin_email,
                copy_registrant: get("NOTIFY_COPY_REGISTRANT")
                    .map(|v| parse_bool("NOTIFY_COPY_REGISTRANT", &v))
                    .transpose()?
                    .unwrap_or(false),
            },
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be a boolean, got '{}'",
            key,
            other
        ))),
    }
}

fn parse_ports(key: &str, value: &str) -> Result<Vec<u16>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u16>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("{} contains invalid port '{}': {}", key, p, e))
            })
        })
        .collect()
}
