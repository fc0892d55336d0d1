pub mod error;

use std::{
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use votepipe_core::{
    DEFAULT_CONNECT_TIMEOUT, IntakeFaults, UpsertStrategy,
    credentials::{DEFAULT_REFRESH_MARGIN, DEFAULT_TOKEN_VALIDITY},
    queue::DEFAULT_QUEUE_KEY,
};

use crate::{
    models::{
        AggregatorConfig, BallotConfig, Config, ConfigMetadata, CredentialConfig,
        IntakeConfig, QueueConfig, SecretString, ServerConfig, StoreConfig,
        WorkerConfig,
        sources::{EnvConfig, EnvCredentials, FileConfig, FileCredentialConfig},
    },
    validation::{self, ConfigWarnings},
};
use error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] =
    ["votepipe.toml", "config/votepipe.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, then layer defaults < config file < process environment.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Same layering as [`ConfigLoader::load`] with an explicit environment
    /// and no `.env` handling.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        Self::compose(
            file_config,
            env,
            ConfigMetadata {
                config_path,
                env_file_loaded: false,
            },
        )
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }

    /// Merge the layers into a validated [`Config`].
    pub fn compose(
        file_config: Option<FileConfig>,
        env: EnvConfig,
        metadata: ConfigMetadata,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        if metadata.config_path.is_none() {
            warnings.push_with_hint(
                "No votepipe.toml detected; using defaults and environment variables",
                "Pass --config or set VOTEPIPE_CONFIG to use a configuration file",
            );
        }

        let file = file_config.unwrap_or_default();
        let FileConfig {
            server: file_server,
            ballot: file_ballot,
            queue: file_queue,
            store: file_store,
            worker: file_worker,
            aggregator: file_aggregator,
            intake: file_intake,
        } = file;

        let server = ServerConfig {
            host: env
                .server_host
                .clone()
                .or(file_server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: layered("SERVER_PORT", env.server_port.as_deref(), file_server.port)?
                .unwrap_or(8080),
        };

        let ballot = BallotConfig {
            option_a: env
                .option_a
                .clone()
                .or(file_ballot.option_a)
                .unwrap_or_else(|| "Cats".to_string()),
            option_b: env
                .option_b
                .clone()
                .or(file_ballot.option_b)
                .unwrap_or_else(|| "Dogs".to_string()),
        };

        let queue = QueueConfig {
            host: env
                .redis_host
                .clone()
                .or(file_queue.host)
                .unwrap_or_else(|| "redis".to_string()),
            port: layered("REDIS_PORT", env.redis_port.as_deref(), file_queue.port)?
                .unwrap_or(6379),
            db: layered("REDIS_DB", env.redis_db.as_deref(), file_queue.db)?
                .unwrap_or(0),
            key: env
                .redis_queue_key
                .clone()
                .or(file_queue.key)
                .unwrap_or_else(|| DEFAULT_QUEUE_KEY.to_string()),
            username: env.redis_user.clone().or(file_queue.username),
            connect_timeout: first_parsed(
                "REDIS_CONNECT_TIMEOUT",
                [
                    env.redis_connect_timeout.as_deref(),
                    file_queue.connect_timeout.as_deref(),
                ],
                parse_duration,
            )?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            credentials: compose_credentials(
                &REDIS_KEYS,
                &env.redis_credentials,
                &file_queue.credentials,
            )?,
        };

        let store = StoreConfig {
            host: env
                .postgres_host
                .clone()
                .or(file_store.host)
                .unwrap_or_else(|| "db".to_string()),
            port: layered(
                "POSTGRES_PORT",
                env.postgres_port.as_deref(),
                file_store.port,
            )?
            .unwrap_or(5432),
            database: env
                .postgres_db
                .clone()
                .or(file_store.database)
                .unwrap_or_else(|| "postgres".to_string()),
            username: env
                .postgres_user
                .clone()
                .or(file_store.username)
                .unwrap_or_else(|| "postgres".to_string()),
            upsert: first_parsed(
                "POSTGRES_UPSERT",
                [env.postgres_upsert.as_deref(), file_store.upsert.as_deref()],
                parse_from_str::<UpsertStrategy>,
            )?
            .unwrap_or_default(),
            connect_timeout: first_parsed(
                "POSTGRES_CONNECT_TIMEOUT",
                [
                    env.postgres_connect_timeout.as_deref(),
                    file_store.connect_timeout.as_deref(),
                ],
                parse_duration,
            )?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            credentials: compose_credentials(
                &POSTGRES_KEYS,
                &env.postgres_credentials,
                &file_store.credentials,
            )?,
        };

        let worker = WorkerConfig {
            poll_interval: first_parsed(
                "WORKER_POLL_INTERVAL",
                [
                    env.worker_poll_interval.as_deref(),
                    file_worker.poll_interval.as_deref(),
                ],
                parse_duration,
            )?
            .unwrap_or(Duration::from_millis(100)),
            reconnect_backoff: first_parsed(
                "WORKER_RECONNECT_BACKOFF",
                [
                    env.worker_reconnect_backoff.as_deref(),
                    file_worker.reconnect_backoff.as_deref(),
                ],
                parse_duration,
            )?
            .unwrap_or(Duration::from_secs(1)),
        };

        let aggregator = AggregatorConfig {
            interval: first_parsed(
                "AGGREGATOR_INTERVAL",
                [
                    env.aggregator_interval.as_deref(),
                    file_aggregator.interval.as_deref(),
                ],
                parse_duration,
            )?
            .unwrap_or(Duration::from_secs(1)),
        };

        let intake = IntakeConfig {
            faults: first_parsed(
                "INTAKE_FAULT",
                [env.intake_fault.as_deref(), file_intake.fault.as_deref()],
                parse_faults,
            )?
            .unwrap_or_default(),
        };

        let config = Config {
            server,
            ballot,
            queue,
            store,
            worker,
            aggregator,
            intake,
            metadata,
        };

        let guard_warnings = validation::apply_guard_rails(&config)?;
        warnings.extend(guard_warnings);

        Ok(ConfigLoad { config, warnings })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Environment names for one endpoint's credential settings.
struct CredentialKeys {
    mode: &'static str,
    password: &'static str,
    token_command: &'static str,
    token_file: &'static str,
    token_ttl: &'static str,
    token_margin: &'static str,
}

const POSTGRES_KEYS: CredentialKeys = CredentialKeys {
    mode: "POSTGRES_CREDENTIAL_MODE",
    password: "POSTGRES_PASSWORD",
    token_command: "POSTGRES_TOKEN_COMMAND",
    token_file: "POSTGRES_TOKEN_FILE",
    token_ttl: "POSTGRES_TOKEN_TTL",
    token_margin: "POSTGRES_TOKEN_MARGIN",
};

const REDIS_KEYS: CredentialKeys = CredentialKeys {
    mode: "REDIS_CREDENTIAL_MODE",
    password: "REDIS_PASSWORD",
    token_command: "REDIS_TOKEN_COMMAND",
    token_file: "REDIS_TOKEN_FILE",
    token_ttl: "REDIS_TOKEN_TTL",
    token_margin: "REDIS_TOKEN_MARGIN",
};

fn compose_credentials(
    keys: &CredentialKeys,
    env: &EnvCredentials,
    file: &FileCredentialConfig,
) -> Result<CredentialConfig, ConfigLoadError> {
    let mode = env
        .mode
        .clone()
        .or_else(|| file.mode.clone())
        .unwrap_or_else(|| "static".to_string());

    let ttl = first_parsed(
        keys.token_ttl,
        [env.token_ttl.as_deref(), file.token_ttl.as_deref()],
        parse_duration,
    )?
    .unwrap_or(DEFAULT_TOKEN_VALIDITY);
    let margin = first_parsed(
        keys.token_margin,
        [env.token_margin.as_deref(), file.token_margin.as_deref()],
        parse_duration,
    )?
    .unwrap_or(DEFAULT_REFRESH_MARGIN);

    let missing = |key: &'static str| ConfigLoadError::MissingCredentialSetting {
        key,
        mode_key: keys.mode,
        mode: mode.clone(),
    };

    match mode.trim().to_ascii_lowercase().as_str() {
        "static" | "password" => {
            let password = env
                .password
                .clone()
                .or_else(|| file.password.clone())
                .map(SecretString::new);
            let password_file =
                env.password_file.clone().or_else(|| file.password_file.clone());
            Ok(CredentialConfig::Static {
                password,
                password_file,
            })
        }
        "command" | "token-command" => {
            let command = env
                .token_command
                .clone()
                .or_else(|| file.token_command.clone())
                .filter(|command| !command.trim().is_empty())
                .ok_or_else(|| missing(keys.token_command))?;
            Ok(CredentialConfig::Command {
                command,
                ttl,
                margin,
            })
        }
        "file" | "token-file" => {
            let path = env
                .token_file
                .clone()
                .or_else(|| file.token_file.clone())
                .ok_or_else(|| missing(keys.token_file))?;
            Ok(CredentialConfig::File { path, ttl, margin })
        }
        _ => Err(ConfigLoadError::InvalidValue {
            key: keys.mode,
            value: mode.clone(),
            reason: format!(
                "expected one of static, command, file (set {} for static)",
                keys.password
            ),
        }),
    }
}

/// Environment string (parsed) over a typed file value.
fn layered<T>(
    key: &'static str,
    env: Option<&str>,
    file: Option<T>,
) -> Result<Option<T>, ConfigLoadError>
where
    T: FromStr,
    T::Err: Display,
{
    match env {
        Some(raw) => parse_from_str(key, raw).map(Some),
        None => Ok(file),
    }
}

/// Parse the first present value, in priority order.
fn first_parsed<T, const N: usize>(
    key: &'static str,
    candidates: [Option<&str>; N],
    parse: fn(&'static str, &str) -> Result<T, ConfigLoadError>,
) -> Result<Option<T>, ConfigLoadError> {
    candidates
        .into_iter()
        .flatten()
        .next()
        .map(|raw| parse(key, raw))
        .transpose()
}

fn invalid(key: &'static str, raw: &str, reason: impl Display) -> ConfigLoadError {
    ConfigLoadError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_from_str<T>(key: &'static str, raw: &str) -> Result<T, ConfigLoadError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|err| invalid(key, raw, err))
}

fn parse_duration(
    key: &'static str,
    raw: &str,
) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(raw.trim()).map_err(|err| invalid(key, raw, err))
}

/// `off`, `reject` or `latency:<duration>`.
fn parse_faults(
    key: &'static str,
    raw: &str,
) -> Result<IntakeFaults, ConfigLoadError> {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "off" | "none" => Ok(IntakeFaults::Off),
        "reject" => Ok(IntakeFaults::RejectSubmissions),
        _ => match value.strip_prefix("latency:") {
            Some(delay) => Ok(IntakeFaults::Latency(parse_duration(key, delay)?)),
            None => Err(invalid(key, raw, "expected off, reject or latency:<duration>")),
        },
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}
