use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
///
/// Durations and enumerations are kept as strings here and parsed while
/// composing, so file and environment values report errors the same way.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub ballot: FileBallotConfig,
    #[serde(default)]
    pub queue: FileQueueConfig,
    #[serde(default)]
    pub store: FileStoreConfig,
    #[serde(default)]
    pub worker: FileWorkerConfig,
    #[serde(default)]
    pub aggregator: FileAggregatorConfig,
    #[serde(default)]
    pub intake: FileIntakeConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBallotConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_a: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_b: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileQueueConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<String>,
    #[serde(default)]
    pub credentials: FileCredentialConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileStoreConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<String>,
    #[serde(default)]
    pub credentials: FileCredentialConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCredentialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_margin: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileWorkerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_backoff: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAggregatorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileIntakeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

/// Credential-related variables sharing one prefix (`REDIS_`, `POSTGRES_`).
#[derive(Debug, Default, Clone)]
pub struct EnvCredentials {
    pub mode: Option<String>,
    pub password: Option<String>,
    pub password_file: Option<PathBuf>,
    pub token_command: Option<String>,
    pub token_file: Option<PathBuf>,
    pub token_ttl: Option<String>,
    pub token_margin: Option<String>,
}

impl EnvCredentials {
    fn gather(prefix: &str, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{prefix}_{suffix}"));
        Self {
            mode: var("CREDENTIAL_MODE"),
            password: var("PASSWORD"),
            password_file: var("PASSWORD_FILE").map(PathBuf::from),
            token_command: var("TOKEN_COMMAND"),
            token_file: var("TOKEN_FILE").map(PathBuf::from),
            token_ttl: var("TOKEN_TTL"),
            token_margin: var("TOKEN_MARGIN"),
        }
    }
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<String>,
    pub option_a: Option<String>,
    pub option_b: Option<String>,
    pub redis_host: Option<String>,
    pub redis_port: Option<String>,
    pub redis_db: Option<String>,
    pub redis_queue_key: Option<String>,
    pub redis_user: Option<String>,
    pub redis_connect_timeout: Option<String>,
    pub redis_credentials: EnvCredentials,
    pub postgres_host: Option<String>,
    pub postgres_port: Option<String>,
    pub postgres_db: Option<String>,
    pub postgres_user: Option<String>,
    pub postgres_upsert: Option<String>,
    pub postgres_connect_timeout: Option<String>,
    pub postgres_credentials: EnvCredentials,
    pub worker_poll_interval: Option<String>,
    pub worker_reconnect_backoff: Option<String>,
    pub aggregator_interval: Option<String>,
    pub intake_fault: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |name: &str| {
            lookup(name).filter(|value| !value.trim().is_empty())
        };

        Self {
            config_path: lookup("VOTEPIPE_CONFIG").map(PathBuf::from),
            server_host: lookup("SERVER_HOST"),
            server_port: lookup("SERVER_PORT"),
            option_a: lookup("OPTION_A"),
            option_b: lookup("OPTION_B"),
            redis_host: lookup("REDIS_HOST"),
            redis_port: lookup("REDIS_PORT"),
            redis_db: lookup("REDIS_DB"),
            redis_queue_key: lookup("REDIS_QUEUE_KEY"),
            redis_user: lookup("REDIS_USER"),
            redis_connect_timeout: lookup("REDIS_CONNECT_TIMEOUT"),
            redis_credentials: EnvCredentials::gather("REDIS", &lookup),
            postgres_host: lookup("POSTGRES_HOST"),
            postgres_port: lookup("POSTGRES_PORT"),
            postgres_db: lookup("POSTGRES_DB"),
            postgres_user: lookup("POSTGRES_USER"),
            postgres_upsert: lookup("POSTGRES_UPSERT"),
            postgres_connect_timeout: lookup("POSTGRES_CONNECT_TIMEOUT"),
            postgres_credentials: EnvCredentials::gather("POSTGRES", &lookup),
            worker_poll_interval: lookup("WORKER_POLL_INTERVAL"),
            worker_reconnect_backoff: lookup("WORKER_RECONNECT_BACKOFF"),
            aggregator_interval: lookup("AGGREGATOR_INTERVAL"),
            intake_fault: lookup("INTAKE_FAULT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn prefixed_credential_keys_are_read_per_endpoint() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("POSTGRES_CREDENTIAL_MODE", "command"),
            ("POSTGRES_TOKEN_COMMAND", "gcloud sql generate-login-token"),
            ("REDIS_PASSWORD", "hunter2"),
            ("OPTION_A", "   "),
        ]);
        let env = EnvConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(env.postgres_credentials.mode.as_deref(), Some("command"));
        assert_eq!(
            env.postgres_credentials.token_command.as_deref(),
            Some("gcloud sql generate-login-token")
        );
        assert_eq!(env.redis_credentials.password.as_deref(), Some("hunter2"));
        assert!(env.redis_credentials.mode.is_none());
        assert!(env.option_a.is_none(), "blank values are unset");
    }
}
