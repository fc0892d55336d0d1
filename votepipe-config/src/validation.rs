use std::time::Duration;

use thiserror::Error;

use crate::models::{Config, CredentialConfig};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("ballot option {field} has an empty label")]
    EmptyLabel { field: &'static str },
    #[error("queue key must not be empty")]
    EmptyQueueKey,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    for (field, value) in [
        ("WORKER_POLL_INTERVAL", config.worker.poll_interval),
        ("WORKER_RECONNECT_BACKOFF", config.worker.reconnect_backoff),
        ("AGGREGATOR_INTERVAL", config.aggregator.interval),
        ("REDIS_CONNECT_TIMEOUT", config.queue.connect_timeout),
        ("POSTGRES_CONNECT_TIMEOUT", config.store.connect_timeout),
    ] {
        if value.is_zero() {
            return Err(ConfigGuardRailError::ZeroDuration { field });
        }
    }

    for (field, label) in [
        ("OPTION_A", &config.ballot.option_a),
        ("OPTION_B", &config.ballot.option_b),
    ] {
        if label.trim().is_empty() {
            return Err(ConfigGuardRailError::EmptyLabel { field });
        }
    }
    if config.ballot.option_a == config.ballot.option_b {
        warnings.push("OPTION_A and OPTION_B share the same label");
    }

    if config.queue.key.trim().is_empty() {
        return Err(ConfigGuardRailError::EmptyQueueKey);
    }

    check_credentials(
        "POSTGRES",
        "POSTGRES_TOKEN_TTL",
        &config.store.credentials,
        &mut warnings,
    )?;
    check_credentials(
        "REDIS",
        "REDIS_TOKEN_TTL",
        &config.queue.credentials,
        &mut warnings,
    )?;

    if matches!(
        config.store.credentials,
        CredentialConfig::Static {
            password: None,
            password_file: None
        }
    ) {
        warnings.push_with_hint(
            "POSTGRES_PASSWORD not set; connecting to the store without a password",
            "Set POSTGRES_PASSWORD or POSTGRES_PASSWORD_FILE unless the server trusts this host",
        );
    }

    Ok(warnings)
}

fn check_credentials(
    prefix: &str,
    ttl_key: &'static str,
    credentials: &CredentialConfig,
    warnings: &mut ConfigWarnings,
) -> Result<(), ConfigGuardRailError> {
    let (ttl, margin) = match credentials {
        CredentialConfig::Static {
            password: Some(_),
            password_file: Some(path),
        } => {
            warnings.push(format!(
                "{prefix}_PASSWORD and {prefix}_PASSWORD_FILE both set; using {}",
                path.display()
            ));
            return Ok(());
        }
        CredentialConfig::Static { .. } => return Ok(()),
        CredentialConfig::Command { ttl, margin, .. }
        | CredentialConfig::File { ttl, margin, .. } => (*ttl, *margin),
    };

    if ttl.is_zero() {
        return Err(ConfigGuardRailError::ZeroDuration { field: ttl_key });
    }
    if margin > ttl / 2 {
        warnings.push_with_hint(
            format!(
                "{prefix}_TOKEN_MARGIN exceeds half of {prefix}_TOKEN_TTL; it will be clamped to {}",
                humantime::format_duration(ttl / 2)
            ),
            "Tokens are replaced `margin` before they expire",
        );
    }
    if ttl < Duration::from_secs(10) {
        warnings.push(format!(
            "{prefix}_TOKEN_TTL is very short; tokens will be minted constantly"
        ));
    }
    Ok(())
}
