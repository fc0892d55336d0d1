pub mod secret;
pub mod sources;

use std::{path::PathBuf, time::Duration};

use votepipe_core::{IntakeFaults, UpsertStrategy};
use votepipe_model::Choice;

pub use secret::SecretString;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub ballot: BallotConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub worker: WorkerConfig,
    pub aggregator: AggregatorConfig,
    pub intake: IntakeConfig,
    pub metadata: ConfigMetadata,
}

impl Config {
    /// Effective values as `(key, value)` pairs for display, with every
    /// secret redacted.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![
            ("server", format!("{}:{}", self.server.host, self.server.port)),
            ("ballot.option_a", self.ballot.option_a.clone()),
            ("ballot.option_b", self.ballot.option_b.clone()),
            (
                "queue",
                format!(
                    "redis://{}:{}/{} key={}",
                    self.queue.host, self.queue.port, self.queue.db, self.queue.key
                ),
            ),
            (
                "queue.username",
                self.queue.username.clone().unwrap_or_else(|| "-".into()),
            ),
            (
                "queue.connect_timeout",
                humantime::format_duration(self.queue.connect_timeout).to_string(),
            ),
            ("queue.credentials", self.queue.credentials.describe()),
            (
                "store",
                format!(
                    "postgres://{}@{}:{}/{}",
                    self.store.username,
                    self.store.host,
                    self.store.port,
                    self.store.database
                ),
            ),
            ("store.upsert", self.store.upsert.to_string()),
            (
                "store.connect_timeout",
                humantime::format_duration(self.store.connect_timeout).to_string(),
            ),
            ("store.credentials", self.store.credentials.describe()),
            (
                "worker.poll_interval",
                humantime::format_duration(self.worker.poll_interval).to_string(),
            ),
            (
                "worker.reconnect_backoff",
                humantime::format_duration(self.worker.reconnect_backoff)
                    .to_string(),
            ),
            (
                "aggregator.interval",
                humantime::format_duration(self.aggregator.interval).to_string(),
            ),
            ("intake.fault", describe_faults(self.intake.faults)),
        ];
        if let Some(path) = &self.metadata.config_path {
            lines.push(("config_file", path.display().to_string()));
        }
        lines.push(("env_file_loaded", self.metadata.env_file_loaded.to_string()));
        lines
    }
}

fn describe_faults(faults: IntakeFaults) -> String {
    match faults {
        IntakeFaults::Off => "off".to_string(),
        IntakeFaults::RejectSubmissions => "reject".to_string(),
        IntakeFaults::Latency(delay) => {
            format!("latency:{}", humantime::format_duration(delay))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Display labels for the two options.
#[derive(Debug, Clone)]
pub struct BallotConfig {
    pub option_a: String,
    pub option_b: String,
}

impl BallotConfig {
    pub fn label(&self, choice: Choice) -> &str {
        match choice {
            Choice::A => &self.option_a,
            Choice::B => &self.option_b,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub key: String,
    pub username: Option<String>,
    pub connect_timeout: Duration,
    pub credentials: CredentialConfig,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub upsert: UpsertStrategy,
    pub connect_timeout: Duration,
    pub credentials: CredentialConfig,
}

/// How connection secrets are obtained for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialConfig {
    /// Fixed password (inline, from a file, or none at all).
    Static {
        password: Option<SecretString>,
        password_file: Option<PathBuf>,
    },
    /// Short-lived token printed by an external command.
    Command {
        command: String,
        ttl: Duration,
        margin: Duration,
    },
    /// Short-lived token re-read from a file.
    File {
        path: PathBuf,
        ttl: Duration,
        margin: Duration,
    },
}

impl CredentialConfig {
    pub fn is_expiring(&self) -> bool {
        !matches!(self, CredentialConfig::Static { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            CredentialConfig::Static {
                password_file: Some(path),
                ..
            } => format!("static (password file {})", path.display()),
            CredentialConfig::Static {
                password: Some(_), ..
            } => "static (password <redacted>)".to_string(),
            CredentialConfig::Static { .. } => "static (no password)".to_string(),
            CredentialConfig::Command { command, ttl, margin } => format!(
                "command `{}` ttl={} margin={}",
                command.split_whitespace().next().unwrap_or_default(),
                humantime::format_duration(*ttl),
                humantime::format_duration(*margin)
            ),
            CredentialConfig::File { path, ttl, margin } => format!(
                "token file {} ttl={} margin={}",
                path.display(),
                humantime::format_duration(*ttl),
                humantime::format_duration(*margin)
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub reconnect_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub faults: IntakeFaults,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
