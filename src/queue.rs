//! Sequential image processing queue
//!
//! Accepts submitted image payloads as jobs, processes them strictly one at
//! a time in submission order against the shared engine, and republishes
//! every status transition as a [`JobUpdate`] message. Sequential processing
//! is a deliberate simplification: the engine is not safe under concurrent
//! calls, so throughput is traded for bounded resource use.
//!
//! Job completions are delivered by message passing rather than by mutating
//! presentation state from processing continuations, which keeps the
//! failure-isolation and ordering invariants intact under any scheduling
//! model.

use crate::inference::SharedEngine;
use crate::lifecycle::{ModelState, ModelStatus};
use instant::{Duration, Instant};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Unique, monotonically increasing job identifier assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle of a single submitted image; transitions forward only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for its turn on the worker
    Queued,
    /// Inference is in flight for this job
    Processing,
    /// Inference succeeded; the processed payload is attached
    Done,
    /// Inference failed; terminal, never retried automatically
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal status
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One submitted image's end-to-end processing record
#[derive(Debug, Clone)]
pub struct ImageJob {
    /// Identifier assigned at submission
    pub id: JobId,
    /// Caller-owned input payload, immutable after submission
    pub source_file: Vec<u8>,
    /// Output payload; set at most once, on success
    pub processed_file: Option<Vec<u8>>,
    /// Current lifecycle status
    pub status: JobStatus,
    /// Wall-clock inference duration, recorded on success
    pub duration: Option<Duration>,
}

/// Status-transition message posted for consumption by whatever owns the
/// visible job rendering
#[derive(Debug, Clone, Serialize)]
pub struct JobUpdate {
    /// Job this update belongs to
    pub id: JobId,
    /// Status the job transitioned to
    pub status: JobStatus,
    /// Processed payload, present exactly on the `Done` transition
    pub processed_file: Option<Vec<u8>>,
}

/// Sequences per-image inference against the currently ready model
pub struct ImageProcessingQueue {
    jobs: Arc<Mutex<Vec<ImageJob>>>,
    next_id: AtomicU64,
    work_tx: mpsc::UnboundedSender<JobId>,
    updates_tx: mpsc::UnboundedSender<JobUpdate>,
    updates_rx: Option<mpsc::UnboundedReceiver<JobUpdate>>,
}

impl ImageProcessingQueue {
    /// Create the queue and spawn its worker task.
    ///
    /// The worker gates every job on `state_rx` reporting [`ModelStatus::Ready`],
    /// so a model switch pauses (never drains) the queue, and serializes all
    /// engine access through the shared exclusive handle.
    #[must_use]
    pub fn spawn(engine: SharedEngine, state_rx: watch::Receiver<ModelState>) -> Self {
        let jobs = Arc::new(Mutex::new(Vec::new()));
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        tokio::spawn(worker(
            Arc::clone(&jobs),
            engine,
            state_rx,
            work_rx,
            updates_tx.clone(),
        ));

        Self {
            jobs,
            next_id: AtomicU64::new(1),
            work_tx,
            updates_tx,
            updates_rx: Some(updates_rx),
        }
    }

    /// Submit a batch of image payloads.
    ///
    /// One job per payload is created in `Queued` status, appended to the
    /// visible set and handed to the worker in order. Returns the assigned
    /// ids. Jobs from a later batch begin only after every job of earlier
    /// batches reached a terminal status.
    pub fn submit(&self, files: Vec<Vec<u8>>) -> Vec<JobId> {
        let mut ids = Vec::with_capacity(files.len());
        let mut jobs = self.jobs.lock().unwrap();
        for source_file in files {
            let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
            jobs.push(ImageJob {
                id,
                source_file,
                processed_file: None,
                status: JobStatus::Queued,
                duration: None,
            });
            let _ = self.updates_tx.send(JobUpdate {
                id,
                status: JobStatus::Queued,
                processed_file: None,
            });
            // The worker only shuts down when the queue is dropped
            let _ = self.work_tx.send(id);
            ids.push(id);
        }
        debug!(count = ids.len(), "submitted batch");
        ids
    }

    /// Remove a job from the visible set, regardless of its status.
    ///
    /// Idempotent: deleting an unknown or already-deleted id is a no-op.
    /// Does not cancel an in-flight inference call; a result arriving for a
    /// deleted job is discarded by the worker, never resurrected.
    pub fn delete(&self, id: JobId) {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|job| job.id != id);
        if jobs.len() == before {
            debug!(job = %id, "delete of unknown job ignored");
        }
    }

    /// Snapshot of the visible job set, in submission order
    #[must_use]
    pub fn jobs(&self) -> Vec<ImageJob> {
        self.jobs.lock().unwrap().clone()
    }

    /// Take the status-update receiver. Yields `Some` exactly once; the
    /// presentation layer owns the receiver from then on.
    pub fn take_updates(&mut self) -> Option<mpsc::UnboundedReceiver<JobUpdate>> {
        self.updates_rx.take()
    }
}

/// Worker loop: one job at a time, submission order, failures isolated.
async fn worker(
    jobs: Arc<Mutex<Vec<ImageJob>>>,
    engine: SharedEngine,
    mut state_rx: watch::Receiver<ModelState>,
    mut work_rx: mpsc::UnboundedReceiver<JobId>,
    updates_tx: mpsc::UnboundedSender<JobUpdate>,
) {
    while let Some(id) = work_rx.recv().await {
        // Deleted while still queued: nothing to do
        let Some(payload) = lookup_payload(&jobs, id) else {
            debug!(job = %id, "skipping deleted job");
            continue;
        };

        // No job starts unless the model is ready; a switch in flight pauses
        // the queue right here. Sender gone means the session shut down.
        if state_rx
            .wait_for(|state| state.status == ModelStatus::Ready)
            .await
            .is_err()
        {
            break;
        }

        if !transition(&jobs, &updates_tx, id, JobStatus::Processing, None, None) {
            continue;
        }
        debug!(job = %id, "processing started");

        let started = Instant::now();
        let result = engine.lock().await.process_image(&payload).await;
        let elapsed = started.elapsed();

        match result {
            Ok(output) => {
                debug!(job = %id, ?elapsed, "processing finished");
                transition(
                    &jobs,
                    &updates_tx,
                    id,
                    JobStatus::Done,
                    Some(output),
                    Some(elapsed),
                );
            },
            Err(error) => {
                // Isolated: logged and reflected in this job only; the next
                // job proceeds regardless.
                warn!(job = %id, %error, "image processing failed");
                transition(&jobs, &updates_tx, id, JobStatus::Failed, None, None);
            },
        }
    }
}

fn lookup_payload(jobs: &Arc<Mutex<Vec<ImageJob>>>, id: JobId) -> Option<Vec<u8>> {
    let jobs = jobs.lock().unwrap();
    jobs.iter()
        .find(|job| job.id == id)
        .map(|job| job.source_file.clone())
}

/// Apply a status transition if the job is still visible and post the
/// update. Returns `false` when the job was deleted in the meantime, in
/// which case any result is discarded.
fn transition(
    jobs: &Arc<Mutex<Vec<ImageJob>>>,
    updates_tx: &mpsc::UnboundedSender<JobUpdate>,
    id: JobId,
    status: JobStatus,
    output: Option<Vec<u8>>,
    duration: Option<Duration>,
) -> bool {
    let mut jobs = jobs.lock().unwrap();
    let Some(job) = jobs.iter_mut().find(|job| job.id == id) else {
        debug!(job = %id, "discarding result for deleted job");
        return false;
    };
    job.status = status;
    job.duration = duration;
    job.processed_file.clone_from(&output);
    let _ = updates_tx.send(JobUpdate {
        id,
        status,
        processed_file: output,
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockEngine, FAIL_PAYLOAD_MARKER};
    use crate::inference::share_engine;
    use crate::models::ModelId;

    /// Queue wired to a mock engine with a ready model and a hand-held
    /// state channel for pausing tests.
    async fn ready_queue(
        engine: MockEngine,
    ) -> (ImageProcessingQueue, watch::Sender<ModelState>) {
        let shared = share_engine(Box::new(engine));
        shared
            .lock()
            .await
            .initialize_model(ModelId::DEFAULT)
            .await
            .unwrap();
        let (state_tx, state_rx) = watch::channel(ModelState {
            active_model: Some(ModelId::DEFAULT),
            status: ModelStatus::Ready,
        });
        (ImageProcessingQueue::spawn(shared, state_rx), state_tx)
    }

    async fn await_terminal(
        updates: &mut mpsc::UnboundedReceiver<JobUpdate>,
        count: usize,
    ) -> Vec<JobUpdate> {
        let mut terminal = Vec::new();
        while terminal.len() < count {
            let update = updates.recv().await.expect("updates channel closed");
            if update.status.is_terminal() {
                terminal.push(update);
            }
        }
        terminal
    }

    #[tokio::test]
    async fn test_jobs_complete_in_submission_order() {
        let (mut queue, _state) = ready_queue(MockEngine::new()).await;
        let mut updates = queue.take_updates().unwrap();

        let ids = queue.submit(vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        let terminal = await_terminal(&mut updates, 3).await;

        let finished: Vec<JobId> = terminal.iter().map(|update| update.id).collect();
        assert_eq!(finished, ids);
        for update in &terminal {
            assert_eq!(update.status, JobStatus::Done);
            assert!(update.processed_file.as_ref().is_some_and(|f| !f.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_job() {
        let (mut queue, _state) = ready_queue(MockEngine::new()).await;
        let mut updates = queue.take_updates().unwrap();

        let mut failing = FAIL_PAYLOAD_MARKER.to_vec();
        failing.extend_from_slice(b"k");
        let ids = queue.submit(vec![
            b"a".to_vec(),
            failing,
            b"c".to_vec(),
            b"d".to_vec(),
        ]);

        let terminal = await_terminal(&mut updates, 4).await;
        assert_eq!(terminal.len(), 4, "every job must reach a terminal status");

        let statuses: Vec<JobStatus> = terminal.iter().map(|update| update.status).collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Done,
                JobStatus::Failed,
                JobStatus::Done,
                JobStatus::Done
            ]
        );

        // The visible set agrees with the update stream
        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[1].id, ids[1]);
        assert_eq!(jobs[1].status, JobStatus::Failed);
        assert!(jobs[1].processed_file.is_none());
        assert!(jobs[3].processed_file.is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (mut queue, _state) = ready_queue(MockEngine::new()).await;
        let mut updates = queue.take_updates().unwrap();

        let ids = queue.submit(vec![b"a".to_vec()]);
        await_terminal(&mut updates, 1).await;

        queue.delete(ids[0]);
        assert!(queue.jobs().is_empty());
        // Second delete is a no-op, nothing reappears
        queue.delete(ids[0]);
        assert!(queue.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_queued_job_is_never_processed() {
        let engine = MockEngine::new();
        let handle = engine.handle();
        let shared = share_engine(Box::new(engine));
        shared
            .lock()
            .await
            .initialize_model(ModelId::DEFAULT)
            .await
            .unwrap();
        // Gate closed: jobs stay queued
        let (state_tx, state_rx) = watch::channel(ModelState {
            active_model: Some(ModelId::DEFAULT),
            status: ModelStatus::Switching,
        });
        let mut queue = ImageProcessingQueue::spawn(shared, state_rx);
        let mut updates = queue.take_updates().unwrap();

        let ids = queue.submit(vec![b"doomed".to_vec(), b"kept".to_vec()]);
        queue.delete(ids[0]);

        state_tx
            .send(ModelState {
                active_model: Some(ModelId::DEFAULT),
                status: ModelStatus::Ready,
            })
            .unwrap();

        let terminal = await_terminal(&mut updates, 1).await;
        assert_eq!(terminal[0].id, ids[1]);
        // Only the surviving job ever reached the engine
        assert_eq!(handle.inference_calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_result_after_delete_is_discarded() {
        let engine = MockEngine::new().with_latency(Duration::from_millis(100));
        let (mut queue, _state) = ready_queue(engine).await;
        let mut updates = queue.take_updates().unwrap();

        let ids = queue.submit(vec![b"slow".to_vec()]);

        // Wait for processing to start, then delete mid-flight
        let update = updates.recv().await.unwrap();
        assert_eq!(update.status, JobStatus::Queued);
        let update = updates.recv().await.unwrap();
        assert_eq!(update.status, JobStatus::Processing);
        queue.delete(ids[0]);

        // Give the in-flight call time to finish and be discarded
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(queue.jobs().is_empty(), "deleted job must not resurrect");
        assert!(
            updates.try_recv().is_err(),
            "no update may be posted for a deleted job"
        );
    }

    #[tokio::test]
    async fn test_queue_pauses_while_switching() {
        let engine = MockEngine::new();
        let handle = engine.handle();
        let shared = share_engine(Box::new(engine));
        shared
            .lock()
            .await
            .initialize_model(ModelId::DEFAULT)
            .await
            .unwrap();
        let (state_tx, state_rx) = watch::channel(ModelState {
            active_model: Some(ModelId::DEFAULT),
            status: ModelStatus::Switching,
        });
        let mut queue = ImageProcessingQueue::spawn(shared, state_rx);
        let mut updates = queue.take_updates().unwrap();

        queue.submit(vec![b"waits".to_vec()]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.inference_calls(), 0, "no job may start mid-switch");
        assert_eq!(queue.jobs()[0].status, JobStatus::Queued);

        state_tx
            .send(ModelState {
                active_model: Some(ModelId::DEFAULT),
                status: ModelStatus::Ready,
            })
            .unwrap();
        let terminal = await_terminal(&mut updates, 1).await;
        assert_eq!(terminal[0].status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_later_batch_starts_after_earlier_batch_terminates() {
        let engine = MockEngine::new().with_latency(Duration::from_millis(20));
        let (mut queue, _state) = ready_queue(engine).await;
        let mut updates = queue.take_updates().unwrap();

        let first = queue.submit(vec![b"a".to_vec(), b"b".to_vec()]);
        let second = queue.submit(vec![b"c".to_vec()]);

        // Collect the full transition log for all three jobs
        let mut log = Vec::new();
        let mut terminal = 0;
        while terminal < 3 {
            let update = updates.recv().await.unwrap();
            if update.status.is_terminal() {
                terminal += 1;
            }
            log.push((update.id, update.status));
        }

        let processing_order: Vec<JobId> = log
            .iter()
            .filter(|(_, status)| *status == JobStatus::Processing)
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(processing_order, vec![first[0], first[1], second[0]]);

        // The later batch's job started only after both earlier jobs finished
        let second_start = log
            .iter()
            .position(|entry| *entry == (second[0], JobStatus::Processing))
            .unwrap();
        for id in &first {
            let done = log
                .iter()
                .position(|entry| *entry == (*id, JobStatus::Done))
                .unwrap();
            assert!(done < second_start);
        }
    }

    #[test]
    fn test_job_update_serializes_for_presentation() {
        let update = JobUpdate {
            id: JobId(7),
            status: JobStatus::Done,
            processed_file: Some(b"out".to_vec()),
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"status\":\"done\""));

        let update = JobUpdate {
            id: JobId(8),
            status: JobStatus::Failed,
            processed_file: None,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"processed_file\":null"));
    }

    #[tokio::test]
    async fn test_job_records_processing_duration() {
        let engine = MockEngine::new().with_latency(Duration::from_millis(10));
        let (mut queue, _state) = ready_queue(engine).await;
        let mut updates = queue.take_updates().unwrap();

        queue.submit(vec![b"timed".to_vec()]);
        await_terminal(&mut updates, 1).await;

        let jobs = queue.jobs();
        assert!(jobs[0].duration.unwrap() >= Duration::from_millis(10));
    }
}
