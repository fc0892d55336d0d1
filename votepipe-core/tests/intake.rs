mod support;

use std::time::Duration;

use anyhow::Result;
use support::{enqueue, queue_link, store_link, voter};
use votepipe_core::{
    Aggregator, Broadcaster, Intake, IntakeError, IntakeFaults, SubmissionSink,
    Worker, WorkerSettings, queue::MemoryQueue, store::MemoryStore,
};
use votepipe_model::{Choice, Submission};

fn intake(queue: &MemoryQueue) -> Intake<MemoryQueue> {
    Intake::new(queue_link(queue), IntakeFaults::Off)
}

fn queued(queue: &MemoryQueue) -> Result<Vec<Submission>> {
    queue
        .entries()
        .iter()
        .map(|payload| Ok(Submission::from_json(payload)?))
        .collect()
}

#[tokio::test]
async fn invalid_choice_is_rejected_before_enqueue() {
    let queue = MemoryQueue::new();
    let intake = intake(&queue);

    for raw in ["c", "", "A"] {
        let err = intake.submit(raw, None).await.unwrap_err();
        assert!(matches!(err, IntakeError::InvalidChoice(_)));
        assert!(!err.is_transient());
    }
    assert!(queue.is_empty());
}

#[tokio::test]
async fn first_submission_mints_identity() -> Result<()> {
    let queue = MemoryQueue::new();
    let intake = intake(&queue);

    let receipt = intake.submit("a", None).await?;
    assert!(receipt.minted);
    assert_eq!(receipt.vote, Choice::A);

    let entries = queued(&queue)?;
    assert_eq!(entries, vec![Submission::new(receipt.voter_id, Choice::A)]);
    Ok(())
}

#[tokio::test]
async fn existing_identity_is_reused() -> Result<()> {
    let queue = MemoryQueue::new();
    let intake = intake(&queue);

    let receipt = intake.submit("b", Some(voter("abc"))).await?;
    assert!(!receipt.minted);
    assert_eq!(receipt.voter_id, voter("abc"));
    assert_eq!(queued(&queue)?[0].voter_id, voter("abc"));
    Ok(())
}

#[tokio::test]
async fn unreachable_queue_is_a_transient_failure() -> Result<()> {
    let queue = MemoryQueue::new();
    let intake = intake(&queue);
    intake.submit("a", None).await?;

    queue.set_available(false);
    let err = intake.submit("a", None).await.unwrap_err();
    assert!(err.is_transient());

    queue.set_available(true);
    intake.submit("b", None).await?;
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.connects(), 2);
    Ok(())
}

#[tokio::test]
async fn reject_fault_fails_every_submission() {
    let queue = MemoryQueue::new();
    let intake = Intake::new(queue_link(&queue), IntakeFaults::RejectSubmissions);

    let err = intake.submit("a", None).await.unwrap_err();
    assert!(err.is_transient());
    assert!(queue.is_empty());

    // Choice validation still comes first.
    let err = intake.submit("z", None).await.unwrap_err();
    assert!(matches!(err, IntakeError::InvalidChoice(_)));
}

#[tokio::test(start_paused = true)]
async fn latency_fault_delays_enqueue() -> Result<()> {
    let queue = MemoryQueue::new();
    let delay = Duration::from_millis(750);
    let intake = Intake::new(queue_link(&queue), IntakeFaults::Latency(delay));

    let started = tokio::time::Instant::now();
    intake.submit("a", None).await?;
    assert!(started.elapsed() >= delay);
    assert_eq!(queue.len(), 1);
    Ok(())
}

#[tokio::test]
async fn sink_trait_object_forwards_to_intake() -> Result<()> {
    let queue = MemoryQueue::new();
    let sink: Box<dyn SubmissionSink> = Box::new(intake(&queue));
    sink.submit("b", None).await?;
    assert_eq!(queue.len(), 1);
    Ok(())
}

/// Submit, drain, aggregate: a voter who changes their mind is counted once
/// with their latest choice.
#[tokio::test]
async fn changed_vote_is_counted_once() -> Result<()> {
    let queue = MemoryQueue::new();
    let store = MemoryStore::new();
    let intake = intake(&queue);

    let first = intake.submit("a", None).await?;
    intake.submit("b", Some(first.voter_id.clone())).await?;
    enqueue(&queue, "other", Choice::A)?;

    let mut worker =
        Worker::new(queue_link(&queue), store_link(&store), WorkerSettings::default());
    for _ in 0..3 {
        worker.tick().await;
    }
    assert_eq!(store.vote_of(&first.voter_id), Some(Choice::B));

    let mut aggregator = Aggregator::new(
        store_link(&store),
        Broadcaster::default(),
        Duration::from_secs(1),
    );
    let snapshot = aggregator.tick().await.expect("snapshot");
    assert_eq!(snapshot.count(Choice::A), 1);
    assert_eq!(snapshot.count(Choice::B), 1);
    Ok(())
}
