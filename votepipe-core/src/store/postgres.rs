use async_trait::async_trait;
use sqlx::{
    Connection as _, PgConnection,
    postgres::{PgConnectOptions, PgSslMode},
};
use tracing::warn;
use votepipe_model::{AggregateSnapshot, Choice, Submission};

use super::{StoreConnection, UpsertOutcome, UpsertStrategy};
use crate::{
    credentials::Credential,
    error::{ConnectError, StoreError},
    link::{Connection, Connector},
};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS votes (
    id VARCHAR(255) NOT NULL PRIMARY KEY,
    vote VARCHAR(255) NOT NULL
)";

const INSERT_VOTE: &str = "INSERT INTO votes (id, vote) VALUES ($1, $2)";

const UPDATE_VOTE: &str = "UPDATE votes SET vote = $2 WHERE id = $1";

// `xmax = 0` only holds for a freshly inserted tuple.
const UPSERT_VOTE: &str = "INSERT INTO votes (id, vote) VALUES ($1, $2)
    ON CONFLICT (id) DO UPDATE SET vote = EXCLUDED.vote
    RETURNING (xmax = 0) AS inserted";

const TALLY_VOTES: &str =
    "SELECT vote, COUNT(id) AS count FROM votes GROUP BY vote";

// SQLSTATE class 28: invalid authorization specification.
fn is_auth_code(code: &str) -> bool {
    matches!(code, "28000" | "28P01")
}

/// PostgreSQL endpoint holding the `votes` table.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    host: String,
    port: u16,
    database: String,
    username: String,
    ssl_mode: PgSslMode,
    strategy: UpsertStrategy,
}

impl PostgresStore {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            ssl_mode: PgSslMode::Prefer,
            strategy: UpsertStrategy::default(),
        }
    }

    pub fn with_ssl_mode(mut self, ssl_mode: PgSslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    pub fn with_strategy(mut self, strategy: UpsertStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> UpsertStrategy {
        self.strategy
    }

    fn connect_options(&self, credential: &Credential) -> PgConnectOptions {
        let username = credential.username().unwrap_or(&self.username);
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(username)
            .ssl_mode(self.ssl_mode);
        match credential.secret() {
            Some(secret) => options.password(secret),
            None => options,
        }
    }

    fn classify(&self, err: sqlx::Error) -> ConnectError {
        let endpoint = self.endpoint();
        match &err {
            sqlx::Error::Database(db)
                if db.code().is_some_and(|code| is_auth_code(&code)) =>
            {
                ConnectError::Auth {
                    endpoint,
                    reason: err.to_string(),
                }
            }
            _ => ConnectError::Transport {
                endpoint,
                reason: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl Connector for PostgresStore {
    type Conn = PostgresStoreConnection;

    fn endpoint(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }

    async fn connect(
        &self,
        credential: &Credential,
    ) -> Result<PostgresStoreConnection, ConnectError> {
        let conn = PgConnection::connect_with(&self.connect_options(credential))
            .await
            .map_err(|err| self.classify(err))?;

        let mut store = PostgresStoreConnection {
            conn: Some(conn),
            strategy: self.strategy,
        };
        store
            .ensure_schema()
            .await
            .map_err(|err| ConnectError::NotReady {
                endpoint: self.endpoint(),
                reason: err.to_string(),
            })?;
        Ok(store)
    }
}

/// One dedicated connection, so credential rotation can close and reopen it
/// deterministically.
#[derive(Debug)]
pub struct PostgresStoreConnection {
    /// `None` once a transport failure has been observed.
    conn: Option<PgConnection>,
    strategy: UpsertStrategy,
}

fn is_disconnect(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

fn is_auth(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().is_some_and(|code| is_auth_code(&code))
        }
        _ => false,
    }
}

impl PostgresStoreConnection {
    fn live(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.conn.as_mut().ok_or_else(|| {
            StoreError::Disconnected("connection already closed".to_string())
        })
    }

    fn fail(&mut self, err: sqlx::Error) -> StoreError {
        if is_auth(&err) {
            self.conn = None;
            StoreError::Auth(err.to_string())
        } else if is_disconnect(&err) {
            self.conn = None;
            StoreError::Disconnected(err.to_string())
        } else {
            StoreError::Query(err.to_string())
        }
    }

    async fn insert_then_update(
        &mut self,
        submission: &Submission,
    ) -> Result<UpsertOutcome, StoreError> {
        let id = submission.voter_id.as_str();
        let vote = submission.vote.as_str();

        let conn = self.live()?;
        let inserted = sqlx::query(INSERT_VOTE)
            .bind(id)
            .bind(vote)
            .execute(&mut *conn)
            .await;

        match inserted {
            Ok(_) => Ok(UpsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let updated = sqlx::query(UPDATE_VOTE)
                    .bind(id)
                    .bind(vote)
                    .execute(&mut *conn)
                    .await;
                match updated {
                    Ok(_) => Ok(UpsertOutcome::Updated),
                    Err(err) => Err(self.fail(err)),
                }
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn on_conflict(
        &mut self,
        submission: &Submission,
    ) -> Result<UpsertOutcome, StoreError> {
        let conn = self.live()?;
        let inserted = sqlx::query_scalar::<_, bool>(UPSERT_VOTE)
            .bind(submission.voter_id.as_str())
            .bind(submission.vote.as_str())
            .fetch_one(&mut *conn)
            .await;

        match inserted {
            Ok(true) => Ok(UpsertOutcome::Inserted),
            Ok(false) => Ok(UpsertOutcome::Updated),
            Err(err) => Err(self.fail(err)),
        }
    }
}

#[async_trait]
impl Connection for PostgresStoreConnection {
    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn close(self) {
        if let Some(conn) = self.conn
            && let Err(err) = conn.close().await
        {
            warn!(error = %err, "error while closing store connection");
        }
    }
}

#[async_trait]
impl StoreConnection for PostgresStoreConnection {
    async fn ensure_schema(&mut self) -> Result<(), StoreError> {
        let conn = self.live()?;
        let result = sqlx::query(CREATE_TABLE).execute(&mut *conn).await;
        result.map(|_| ()).map_err(|err| self.fail(err))
    }

    async fn upsert(
        &mut self,
        submission: &Submission,
    ) -> Result<UpsertOutcome, StoreError> {
        match self.strategy {
            UpsertStrategy::InsertThenUpdate => {
                self.insert_then_update(submission).await
            }
            UpsertStrategy::OnConflict => self.on_conflict(submission).await,
        }
    }

    async fn ping(&mut self) -> Result<(), StoreError> {
        let conn = self.live()?;
        let result = conn.ping().await;
        result.map_err(|err| self.fail(err))
    }

    async fn tally(&mut self) -> Result<AggregateSnapshot, StoreError> {
        let conn = self.live()?;
        let rows = sqlx::query_as::<_, (String, i64)>(TALLY_VOTES)
            .fetch_all(&mut *conn)
            .await;
        let rows = rows.map_err(|err| self.fail(err))?;

        let counts = rows.into_iter().filter_map(|(vote, count)| {
            match Choice::parse(&vote) {
                Ok(choice) => Some((choice, count.max(0) as u64)),
                Err(err) => {
                    warn!(error = %err, count, "ignoring unknown vote value in tally");
                    None
                }
            }
        });
        Ok(AggregateSnapshot::from_counts(counts))
    }
}
