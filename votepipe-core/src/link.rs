//! A named network endpoint together with its live connection and the
//! credential used to open it.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    credentials::{Credential, CredentialManager},
    error::ConnectError,
    retry::{Cancelled, RetryPolicy},
};

/// An open connection to a queue or store endpoint.
#[async_trait]
pub trait Connection: Send {
    /// Whether the connection is still believed usable. Implementations flip
    /// this to `false` once a transport-level failure is observed.
    fn is_open(&self) -> bool;

    async fn close(self)
    where
        Self: Sized;
}

/// Opens connections to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// Endpoint description for logs (`host:port/...`), without secrets.
    fn endpoint(&self) -> String;

    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<Self::Conn, ConnectError>;
}

/// Upper bound on a single connect attempt unless overridden.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Link<C: Connector> {
    name: &'static str,
    connector: C,
    credentials: CredentialManager,
    connect_timeout: Duration,
    conn: Option<C::Conn>,
}

impl<C: Connector> fmt::Debug for Link<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("endpoint", &self.connector.endpoint())
            .field("open", &self.is_open())
            .field("connect_timeout", &self.connect_timeout)
            .field("credentials", &self.credentials.describe())
            .finish()
    }
}

impl<C: Connector> Link<C> {
    pub fn new(
        name: &'static str,
        connector: C,
        credentials: CredentialManager,
    ) -> Self {
        Self {
            name,
            connector,
            credentials,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            conn: None,
        }
    }

    /// Bound each connect attempt. An attempt that outlives it fails as a
    /// transport error.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn is_open(&self) -> bool {
        self.conn.as_ref().is_some_and(Connection::is_open)
    }

    /// The live connection, if one is open.
    pub fn connection_mut(&mut self) -> Option<&mut C::Conn> {
        self.conn.as_mut().filter(|conn| conn.is_open())
    }

    /// Return the open connection, making a single attempt to open one if
    /// needed. A missing or due credential is minted first.
    pub async fn ensure_open(&mut self) -> Result<&mut C::Conn, ConnectError> {
        if !self.is_open() {
            self.reopen().await?;
        }
        self.conn.as_mut().ok_or_else(|| ConnectError::NotReady {
            endpoint: self.connector.endpoint(),
            reason: "connection vanished after open".to_string(),
        })
    }

    async fn reopen(&mut self) -> Result<(), ConnectError> {
        self.disconnect().await;

        let limit = self.connect_timeout;
        let credential = self.credentials.ensure_fresh().await?;
        let attempt =
            tokio::time::timeout(limit, self.connector.connect(credential)).await;
        let connected = attempt.unwrap_or_else(|_| {
            Err(ConnectError::Transport {
                endpoint: self.connector.endpoint(),
                reason: format!("connect timed out after {limit:?}"),
            })
        });
        match connected {
            Ok(conn) => {
                info!(
                    link = self.name,
                    endpoint = %self.connector.endpoint(),
                    "connected"
                );
                self.conn = Some(conn);
                Ok(())
            }
            Err(err) => {
                if err.is_auth() {
                    // Reactive fallback: the next attempt mints a new token.
                    self.credentials.invalidate();
                }
                Err(err)
            }
        }
    }

    /// Block until the endpoint accepts a connection, retrying every failure
    /// (transport or auth) on `policy`. Only cancellation ends the loop early.
    pub async fn open_blocking(
        &mut self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let mut backoff = policy.backoff();
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            match self.ensure_open().await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    let delay = backoff.wait(cancel).await?;
                    warn!(
                        link = self.name,
                        error = %err,
                        attempt = backoff.attempts(),
                        waited_ms = delay.as_millis() as u64,
                        "waiting for endpoint"
                    );
                }
            }
        }
    }

    /// Proactively replace an expiring credential: close the connection,
    /// mint a new credential and reopen with it. Returns `Ok(true)` when a
    /// refresh happened. Static credentials are never refreshed here.
    pub async fn refresh_credentials_if_due(
        &mut self,
    ) -> Result<bool, ConnectError> {
        // Nothing held yet: the next open mints lazily.
        if !self.credentials.is_expiring()
            || self.credentials.current().is_none()
            || !self.credentials.needs_refresh(Instant::now())
        {
            return Ok(false);
        }

        info!(link = self.name, "credential nearing expiry; reconnecting");
        self.disconnect().await;
        self.credentials.refresh().await?;
        self.reopen().await?;
        Ok(true)
    }

    /// Forget a connection that is known to be broken without a graceful
    /// close.
    pub fn discard(&mut self) {
        if self.conn.take().is_some() {
            warn!(link = self.name, "discarding broken connection");
        }
    }

    /// Forget the current credential so the next open mints a new one.
    pub fn invalidate_credentials(&mut self) {
        self.credentials.invalidate();
    }

    /// Gracefully close the current connection, if any.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }
    }
}
