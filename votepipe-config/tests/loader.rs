use std::{collections::HashMap, path::PathBuf, time::Duration};

use anyhow::Result;
use votepipe_config::{
    ConfigGuardRailError, ConfigLoadError, ConfigLoader, ConfigMetadata,
    CredentialConfig, EnvConfig, FileConfig,
};
use votepipe_core::{IntakeFaults, UpsertStrategy};
use votepipe_model::Choice;

fn env(vars: &[(&str, &str)]) -> EnvConfig {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvConfig::from_lookup(|name| vars.get(name).cloned())
}

fn file(toml: &str) -> Result<FileConfig> {
    Ok(toml::from_str(toml)?)
}

fn from_file_metadata() -> ConfigMetadata {
    ConfigMetadata {
        config_path: Some(PathBuf::from("votepipe.toml")),
        env_file_loaded: false,
    }
}

#[test]
fn defaults_match_the_compose_deployment() -> Result<()> {
    let load = ConfigLoader::compose(None, env(&[]), ConfigMetadata::default())?;
    let config = load.config;

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.ballot.label(Choice::A), "Cats");
    assert_eq!(config.ballot.label(Choice::B), "Dogs");
    assert_eq!((config.queue.host.as_str(), config.queue.port), ("redis", 6379));
    assert_eq!(config.queue.key, "votes");
    assert_eq!((config.store.host.as_str(), config.store.port), ("db", 5432));
    assert_eq!(config.store.database, "postgres");
    assert_eq!(config.store.upsert, UpsertStrategy::OnConflict);
    assert_eq!(config.worker.poll_interval, Duration::from_millis(100));
    assert_eq!(config.worker.reconnect_backoff, Duration::from_secs(1));
    assert_eq!(config.aggregator.interval, Duration::from_secs(1));
    assert_eq!(config.intake.faults, IntakeFaults::Off);
    assert!(!config.store.credentials.is_expiring());

    let messages: Vec<_> =
        load.warnings.items.iter().map(|w| w.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("No votepipe.toml")));
    assert!(messages.iter().any(|m| m.contains("POSTGRES_PASSWORD not set")));
    Ok(())
}

#[test]
fn environment_overrides_file_values() -> Result<()> {
    let file = file(
        r#"
        [server]
        port = 9000

        [ballot]
        option_a = "Tabs"
        option_b = "Spaces"

        [queue]
        host = "queue.internal"
        key = "ballots"

        [store]
        host = "pg.internal"
        upsert = "insert-then-update"

        [worker]
        poll_interval = "250ms"
        "#,
    )?;
    let load = ConfigLoader::compose(
        Some(file),
        env(&[
            ("SERVER_PORT", "9100"),
            ("OPTION_B", "Both"),
            ("REDIS_HOST", "redis.local"),
            ("WORKER_POLL_INTERVAL", "50ms"),
        ]),
        from_file_metadata(),
    )?;
    let config = load.config;

    assert_eq!(config.server.port, 9100);
    assert_eq!(config.ballot.option_a, "Tabs");
    assert_eq!(config.ballot.option_b, "Both");
    assert_eq!(config.queue.host, "redis.local");
    assert_eq!(config.queue.key, "ballots");
    assert_eq!(config.store.host, "pg.internal");
    assert_eq!(config.store.upsert, UpsertStrategy::InsertThenUpdate);
    assert_eq!(config.worker.poll_interval, Duration::from_millis(50));
    Ok(())
}

#[test]
fn command_mode_builds_expiring_credentials() -> Result<()> {
    let load = ConfigLoader::compose(
        None,
        env(&[
            ("POSTGRES_CREDENTIAL_MODE", "command"),
            ("POSTGRES_TOKEN_COMMAND", "cloud-cli db generate-token"),
            ("POSTGRES_TOKEN_TTL", "15m"),
        ]),
        ConfigMetadata::default(),
    )?;

    assert_eq!(
        load.config.store.credentials,
        CredentialConfig::Command {
            command: "cloud-cli db generate-token".to_string(),
            ttl: Duration::from_secs(15 * 60),
            margin: Duration::from_secs(60),
        }
    );
    assert!(load.config.store.credentials.is_expiring());
    assert!(!load.config.queue.credentials.is_expiring());
    Ok(())
}

#[test]
fn command_mode_without_command_is_rejected() {
    let err = ConfigLoader::compose(
        None,
        env(&[("POSTGRES_CREDENTIAL_MODE", "command")]),
        ConfigMetadata::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::MissingCredentialSetting {
            key: "POSTGRES_TOKEN_COMMAND",
            ..
        }
    ));
}

#[test]
fn token_file_mode_reads_path_from_file_config() -> Result<()> {
    let file = file(
        r#"
        [queue.credentials]
        mode = "file"
        token_file = "/var/run/secrets/redis-token"
        token_ttl = "5m"
        token_margin = "30s"
        "#,
    )?;
    let load = ConfigLoader::compose(Some(file), env(&[]), from_file_metadata())?;
    assert_eq!(
        load.config.queue.credentials,
        CredentialConfig::File {
            path: PathBuf::from("/var/run/secrets/redis-token"),
            ttl: Duration::from_secs(300),
            margin: Duration::from_secs(30),
        }
    );
    Ok(())
}

#[test]
fn oversized_margin_is_a_warning() -> Result<()> {
    let load = ConfigLoader::compose(
        None,
        env(&[
            ("POSTGRES_CREDENTIAL_MODE", "file"),
            ("POSTGRES_TOKEN_FILE", "/tmp/token"),
            ("POSTGRES_TOKEN_TTL", "2m"),
            ("POSTGRES_TOKEN_MARGIN", "90s"),
        ]),
        ConfigMetadata::default(),
    )?;
    assert!(
        load.warnings
            .items
            .iter()
            .any(|w| w.message.contains("POSTGRES_TOKEN_MARGIN"))
    );
    Ok(())
}

#[test]
fn unknown_values_are_reported_with_their_key() {
    for (key, value) in [
        ("POSTGRES_UPSERT", "merge"),
        ("INTAKE_FAULT", "sometimes"),
        ("AGGREGATOR_INTERVAL", "often"),
        ("REDIS_CREDENTIAL_MODE", "kerberos"),
        ("POSTGRES_PORT", "-1"),
    ] {
        let err = ConfigLoader::compose(None, env(&[(key, value)]), ConfigMetadata::default())
            .unwrap_err();
        assert!(
            err.to_string().contains(key),
            "{key}: unexpected error {err}"
        );
    }
}

#[test]
fn zero_poll_interval_is_rejected() {
    let err = ConfigLoader::compose(
        None,
        env(&[("WORKER_POLL_INTERVAL", "0s")]),
        ConfigMetadata::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroDuration {
            field: "WORKER_POLL_INTERVAL"
        })
    ));
}

#[test]
fn connect_timeouts_are_layered_per_endpoint() -> Result<()> {
    let file = file(
        r#"
        [queue]
        connect_timeout = "2s"

        [store]
        connect_timeout = "10s"
        "#,
    )?;
    let load = ConfigLoader::compose(
        Some(file),
        env(&[("POSTGRES_CONNECT_TIMEOUT", "3s")]),
        from_file_metadata(),
    )?;
    assert_eq!(load.config.queue.connect_timeout, Duration::from_secs(2));
    assert_eq!(load.config.store.connect_timeout, Duration::from_secs(3));

    let defaults = ConfigLoader::compose(None, env(&[]), ConfigMetadata::default())?;
    assert_eq!(defaults.config.queue.connect_timeout, Duration::from_secs(5));
    assert_eq!(defaults.config.store.connect_timeout, Duration::from_secs(5));
    Ok(())
}

#[test]
fn zero_connect_timeout_is_rejected() {
    let err = ConfigLoader::compose(
        None,
        env(&[("REDIS_CONNECT_TIMEOUT", "0s")]),
        ConfigMetadata::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::GuardRail(ConfigGuardRailError::ZeroDuration {
            field: "REDIS_CONNECT_TIMEOUT"
        })
    ));
}

#[test]
fn latency_fault_parses_duration() -> Result<()> {
    let load = ConfigLoader::compose(
        None,
        env(&[("INTAKE_FAULT", "latency:1s 500ms")]),
        ConfigMetadata::default(),
    )?;
    assert_eq!(
        load.config.intake.faults,
        IntakeFaults::Latency(Duration::from_millis(1500))
    );
    Ok(())
}

#[test]
fn loader_reads_explicit_config_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("votepipe.toml");
    std::fs::write(
        &path,
        r#"
        [ballot]
        option_a = "Vim"
        option_b = "Emacs"
        "#,
    )?;

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env(&[]))?;
    assert_eq!(load.config.ballot.option_a, "Vim");
    assert_eq!(load.config.metadata.config_path.as_deref(), Some(path.as_path()));
    Ok(())
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let err = ConfigLoader::new()
        .with_config_path("/nonexistent/votepipe.toml")
        .load_with_env(env(&[]))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_config_file_reports_path() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("votepipe.toml");
    std::fs::write(&path, "[server\nport = ")?;

    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env(&[]))
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { .. }));
    Ok(())
}

#[test]
fn describe_redacts_secrets() -> Result<()> {
    let load = ConfigLoader::compose(
        None,
        env(&[("POSTGRES_PASSWORD", "s3cret"), ("REDIS_PASSWORD", "hunter2")]),
        ConfigMetadata::default(),
    )?;
    let rendered = format!("{:?} {:?}", load.config.describe(), load.config);
    assert!(!rendered.contains("s3cret"));
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("<redacted>"));
    Ok(())
}
