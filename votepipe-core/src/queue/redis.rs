use async_trait::async_trait;
use redis::{RedisError, aio::MultiplexedConnection};
use url::Url;

use super::{DEFAULT_QUEUE_KEY, QueueConnection};
use crate::{
    credentials::Credential,
    error::{ConnectError, QueueError},
    link::{Connection, Connector},
};

/// Redis list used as the durable queue (`RPUSH` to enqueue, `LPOP` to
/// drain).
#[derive(Debug, Clone)]
pub struct RedisQueue {
    host: String,
    port: u16,
    db: i64,
    key: String,
}

impl RedisQueue {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            db: 0,
            key: DEFAULT_QUEUE_KEY.to_string(),
        }
    }

    pub fn with_db(mut self, db: i64) -> Self {
        self.db = db;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn connection_url(&self, credential: &Credential) -> Result<Url, ConnectError> {
        let mut url = Url::parse(&format!(
            "redis://{}:{}/{}",
            self.host, self.port, self.db
        ))
        .map_err(|err| ConnectError::NotReady {
            endpoint: self.endpoint(),
            reason: format!("invalid redis address: {err}"),
        })?;

        // Redis 6 ACL users need both; legacy AUTH sends only the password.
        if let Some(username) = credential.username() {
            let _ = url.set_username(username);
        }
        if let Some(secret) = credential.secret() {
            let _ = url.set_password(Some(secret));
        }
        Ok(url)
    }

    fn classify(&self, err: RedisError) -> ConnectError {
        if matches!(err.code(), Some("WRONGPASS" | "NOAUTH" | "NOPERM")) {
            ConnectError::Auth {
                endpoint: self.endpoint(),
                reason: err.to_string(),
            }
        } else {
            ConnectError::Transport {
                endpoint: self.endpoint(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Connector for RedisQueue {
    type Conn = RedisQueueConnection;

    fn endpoint(&self) -> String {
        format!("redis://{}:{}/{}#{}", self.host, self.port, self.db, self.key)
    }

    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<RedisQueueConnection, ConnectError> {
        let url = self.connection_url(credential)?;
        let client = redis::Client::open(url.as_str())
            .map_err(|err| self.classify(err))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| self.classify(err))?;

        // The multiplexed connection authenticates lazily on some servers;
        // a PING surfaces bad credentials before the link reports ready.
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|err| self.classify(err))?;

        Ok(RedisQueueConnection {
            conn,
            key: self.key.clone(),
            open: true,
        })
    }
}

pub struct RedisQueueConnection {
    conn: MultiplexedConnection,
    key: String,
    open: bool,
}

impl std::fmt::Debug for RedisQueueConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueueConnection")
            .field("key", &self.key)
            .field("open", &self.open)
            .finish()
    }
}

impl RedisQueueConnection {
    fn fail(&mut self, err: RedisError) -> QueueError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout()
        {
            self.open = false;
            QueueError::Disconnected(err.to_string())
        } else {
            QueueError::Command(err.to_string())
        }
    }
}

#[async_trait]
impl Connection for RedisQueueConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(self) {
        // Multiplexed connections close when the last handle drops.
        drop(self.conn);
    }
}

#[async_trait]
impl QueueConnection for RedisQueueConnection {
    async fn pop(&mut self) -> Result<Option<Vec<u8>>, QueueError> {
        let result = redis::cmd("LPOP")
            .arg(&self.key)
            .query_async::<Option<Vec<u8>>>(&mut self.conn)
            .await;
        result.map_err(|err| self.fail(err))
    }

    async fn push(&mut self, payload: &[u8]) -> Result<(), QueueError> {
        let result = redis::cmd("RPUSH")
            .arg(&self.key)
            .arg(payload)
            .query_async::<i64>(&mut self.conn)
            .await;
        result.map(|_| ()).map_err(|err| self.fail(err))
    }

    async fn ping(&mut self) -> Result<(), QueueError> {
        let result = redis::cmd("PING")
            .query_async::<String>(&mut self.conn)
            .await;
        result.map(|_| ()).map_err(|err| self.fail(err))
    }
}
