//! Exercises the Redis queue and the PostgreSQL store against real servers.
//!
//! Run with `--features live-backends`; needs `DATABASE_URL` (as for any
//! `sqlx::test`) and a Redis server at `REDIS_HOST`/`REDIS_PORT`
//! (default `localhost:6379`).
#![cfg(feature = "live-backends")]

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use votepipe_core::{
    Connector, CredentialManager, Link, QueueConnection, StoreConnection,
    TickOutcome, UpsertOutcome, UpsertStrategy, Worker, WorkerSettings,
    credentials::StaticCredentials,
    queue::RedisQueue,
    store::PostgresStore,
};
use votepipe_model::{Choice, Submission, VoterId};

fn redis_queue(key: &str) -> RedisQueue {
    let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".into());
    let port = std::env::var("REDIS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379);
    RedisQueue::new(host, port).with_key(key)
}

/// Point a store at the per-test database `sqlx::test` created.
fn store_for(pool: &PgPool, strategy: UpsertStrategy) -> Result<Link<PostgresStore>> {
    let options = pool.connect_options();
    let url = url::Url::parse(&std::env::var("DATABASE_URL")?)?;
    let username = options.get_username().to_string();
    let store = PostgresStore::new(
        options.get_host(),
        options.get_port(),
        options.get_database().context("test database name")?,
        username.clone(),
    )
    .with_strategy(strategy);
    let credentials = match url.password() {
        Some(password) => StaticCredentials::new(Some(username), password),
        None => StaticCredentials::anonymous(Some(username)),
    };
    Ok(Link::new("store", store, CredentialManager::fixed(credentials)))
}

fn submission(voter: &str, vote: Choice) -> Result<Submission> {
    Ok(Submission::new(VoterId::parse(voter)?, vote))
}

async fn votes(pool: &PgPool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query("SELECT id, vote FROM votes ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get("id"), row.get("vote")))
        .collect())
}

#[sqlx::test(migrations = false)]
async fn on_conflict_upsert_reports_insert_then_update(pool: PgPool) -> Result<()> {
    let mut link = store_for(&pool, UpsertStrategy::OnConflict)?;
    let conn = link.ensure_open().await?;

    assert_eq!(
        conn.upsert(&submission("abc", Choice::A)?).await?,
        UpsertOutcome::Inserted
    );
    assert_eq!(
        conn.upsert(&submission("abc", Choice::B)?).await?,
        UpsertOutcome::Updated
    );
    assert_eq!(votes(&pool).await?, vec![("abc".into(), "b".into())]);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn insert_then_update_falls_back_on_duplicate(pool: PgPool) -> Result<()> {
    let mut link = store_for(&pool, UpsertStrategy::InsertThenUpdate)?;
    let conn = link.ensure_open().await?;

    conn.upsert(&submission("abc", Choice::A)?).await?;
    assert_eq!(
        conn.upsert(&submission("abc", Choice::B)?).await?,
        UpsertOutcome::Updated
    );
    // The failed insert must not have poisoned the connection.
    conn.ping().await?;
    assert_eq!(votes(&pool).await?, vec![("abc".into(), "b".into())]);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn tally_groups_by_vote(pool: PgPool) -> Result<()> {
    let mut link = store_for(&pool, UpsertStrategy::OnConflict)?;
    let conn = link.ensure_open().await?;
    for (voter, vote) in [("1", Choice::A), ("2", Choice::A), ("3", Choice::B)] {
        conn.upsert(&submission(voter, vote)?).await?;
    }

    let snapshot = conn.tally().await?;
    assert_eq!(snapshot.count(Choice::A), 2);
    assert_eq!(snapshot.count(Choice::B), 1);
    Ok(())
}

#[sqlx::test(migrations = false)]
async fn worker_moves_redis_entries_into_postgres(pool: PgPool) -> Result<()> {
    let key = format!("votes-test-{}", VoterId::mint());
    let queue = redis_queue(&key);
    let anonymous = CredentialManager::fixed(StaticCredentials::anonymous(None));

    let mut producer = Link::new("producer", queue.clone(), anonymous.clone());
    let conn = producer.ensure_open().await?;
    for (voter, vote) in [("abc", Choice::A), ("abc", Choice::B)] {
        conn.push(&submission(voter, vote)?.to_json()?).await?;
    }

    let mut worker = Worker::new(
        Link::new("queue", queue, anonymous),
        store_for(&pool, UpsertStrategy::OnConflict)?,
        WorkerSettings::default(),
    );
    assert!(matches!(worker.tick().await, TickOutcome::Written(_)));
    assert!(matches!(worker.tick().await, TickOutcome::Written(_)));
    assert_eq!(worker.tick().await, TickOutcome::Idle);

    assert_eq!(votes(&pool).await?, vec![("abc".into(), "b".into())]);
    assert!(!producer.connector().endpoint().contains('@'));
    Ok(())
}
