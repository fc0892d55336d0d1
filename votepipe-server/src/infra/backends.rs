//! Builds queue and store links from the loaded configuration.

use anyhow::anyhow;
use votepipe_config::{Config, CredentialConfig, QueueConfig, StoreConfig};
use votepipe_core::{
    CredentialManager, Link, RetryPolicy, WorkerSettings,
    credentials::{CommandToken, FileToken, StaticCredentials},
    queue::RedisQueue,
    store::PostgresStore,
};

pub fn credential_manager(
    username: Option<String>,
    config: &CredentialConfig,
) -> anyhow::Result<CredentialManager> {
    let manager = match config {
        CredentialConfig::Static {
            password_file: Some(path),
            ..
        } => CredentialManager::fixed(StaticCredentials::from_file(username, path)),
        CredentialConfig::Static {
            password: Some(password),
            ..
        } => CredentialManager::fixed(StaticCredentials::new(
            username,
            password.expose(),
        )),
        CredentialConfig::Static { .. } => {
            CredentialManager::fixed(StaticCredentials::anonymous(username))
        }
        CredentialConfig::Command {
            command,
            ttl,
            margin,
        } => {
            let source = CommandToken::from_command_line(username, command)
                .ok_or_else(|| anyhow!("token command is empty"))?;
            CredentialManager::expiring(source, *ttl, *margin)
        }
        CredentialConfig::File { path, ttl, margin } => {
            CredentialManager::expiring(FileToken::new(username, path), *ttl, *margin)
        }
    };
    Ok(manager)
}

pub fn queue_link(config: &QueueConfig) -> anyhow::Result<Link<RedisQueue>> {
    let connector = RedisQueue::new(&config.host, config.port)
        .with_db(config.db)
        .with_key(&config.key);
    let credentials =
        credential_manager(config.username.clone(), &config.credentials)?;
    Ok(Link::new("queue", connector, credentials)
        .with_connect_timeout(config.connect_timeout))
}

pub fn store_link(config: &StoreConfig) -> anyhow::Result<Link<PostgresStore>> {
    let connector = PostgresStore::new(
        &config.host,
        config.port,
        &config.database,
        &config.username,
    )
    .with_strategy(config.upsert);
    let credentials =
        credential_manager(Some(config.username.clone()), &config.credentials)?;
    Ok(Link::new("store", connector, credentials)
        .with_connect_timeout(config.connect_timeout))
}

pub fn worker_settings(config: &Config) -> WorkerSettings {
    let backoff = RetryPolicy::fixed(config.worker.reconnect_backoff);
    WorkerSettings {
        poll_interval: config.worker.poll_interval,
        queue_reconnect: backoff.clone(),
        store_open: backoff,
    }
}
