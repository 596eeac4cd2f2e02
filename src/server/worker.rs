//! Bounded job queue served by a fixed set of workers.
//!
//! Intake never waits on a run: it enqueues a [`Job`] and returns. Each
//! worker pulls the next job and executes the workflow in its own task, so
//! a panicking stage surfaces as a failed job instead of taking the worker
//! down. Failures have no caller to return to; they are logged, published
//! to the dead-letter routing key, and the session gets a terminal `END`.

use crate::orchestration::{CompiledOrchestrator, InteractionState};
use crate::services::Publisher;
use crate::streaming::DeliveryPipeline;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// One accepted interaction waiting to run
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub accepted_at: DateTime<Utc>,
    pub state: InteractionState,
}

impl Job {
    pub fn new(state: InteractionState) -> Self {
        Self {
            id: Uuid::new_v4(),
            accepted_at: Utc::now(),
            state,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Job queue is full")]
    Full,

    #[error("Worker pool has shut down")]
    Closed,
}

/// Runs one job end to end: workflow, then publication or dead-lettering
pub struct JobRunner {
    workflow: Arc<CompiledOrchestrator>,
    delivery: Arc<DeliveryPipeline>,
    publisher: Arc<dyn Publisher>,
    outgoing_routing_key: String,
    dead_letter_routing_key: String,
}

impl JobRunner {
    pub fn new(
        workflow: Arc<CompiledOrchestrator>,
        delivery: Arc<DeliveryPipeline>,
        publisher: Arc<dyn Publisher>,
        outgoing_routing_key: impl Into<String>,
        dead_letter_routing_key: impl Into<String>,
    ) -> Self {
        Self {
            workflow,
            delivery,
            publisher,
            outgoing_routing_key: outgoing_routing_key.into(),
            dead_letter_routing_key: dead_letter_routing_key.into(),
        }
    }

    /// Execute `job`; true if the run succeeded
    pub async fn process(&self, job: Job) -> bool {
        let workflow = self.workflow.clone();
        let state = job.state.clone();
        let outcome = tokio::spawn(async move { workflow.run(state).await }).await;

        match outcome {
            Ok(Ok(state)) => {
                let llm_response = state.final_response.unwrap_or_default();
                tracing::info!(
                    job_id = %job.id,
                    session_id = %state.session_id,
                    chars = llm_response.len(),
                    "interaction complete"
                );
                self.publisher.publish(
                    &self.outgoing_routing_key,
                    json!({
                        "session_id": state.session_id,
                        "tenant_id": state.tenant_id,
                        "llm_response": llm_response,
                    }),
                );
                true
            }
            Ok(Err(e)) => {
                self.fail(&job, &e.to_string()).await;
                false
            }
            Err(e) if e.is_panic() => {
                self.fail(&job, "run panicked").await;
                false
            }
            Err(e) => {
                self.fail(&job, &e.to_string()).await;
                false
            }
        }
    }

    async fn fail(&self, job: &Job, error: &str) {
        tracing::error!(
            job_id = %job.id,
            session_id = %job.state.session_id,
            error,
            "interaction failed"
        );

        self.publisher.publish(
            &self.dead_letter_routing_key,
            json!({
                "job_id": job.id,
                "session_id": job.state.session_id,
                "tenant_id": job.state.tenant_id,
                "input": job.state.input,
                "accepted_at": job.accepted_at,
                "error": error,
            }),
        );

        self.delivery.terminate(&job.state.session_id).await;
    }
}

/// Fixed-size worker pool over a bounded queue
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(runner: Arc<JobRunner>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker| {
                let runner = runner.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(job) = next else {
                            break;
                        };
                        tracing::debug!(worker, job_id = %job.id, "job picked up");
                        runner.process(job).await;
                    }
                    tracing::debug!(worker, "worker stopped");
                })
            })
            .collect();

        Self { sender, workers }
    }

    /// Enqueue without waiting
    pub fn submit(&self, job: Job) -> Result<(), SubmitError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubmitError::Full,
            mpsc::error::TrySendError::Closed(_) => SubmitError::Closed,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting jobs and wait for the queue to drain
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::{FnStage, Orchestrator, StageError, StateField, StateUpdate};
    use crate::services::{ServiceError, SpeechSynthesizer};
    use crate::streaming::{
        ConnectionHandle, ConnectionRegistry, StreamUnit, Transport, TransportError,
    };
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingPublisher {
        published: StdMutex<Vec<(String, serde_json::Value)>>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, routing_key: &str, payload: serde_json::Value) {
            self.published
                .lock()
                .unwrap()
                .push((routing_key.to_string(), payload));
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: StdMutex<Vec<StreamUnit>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, unit: &StreamUnit) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(unit.clone());
            Ok(())
        }
    }

    struct SilentSynthesizer;

    #[async_trait]
    impl SpeechSynthesizer for SilentSynthesizer {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, ServiceError> {
            Ok(Vec::new())
        }
    }

    fn workflow(outcome: &'static str) -> Arc<CompiledOrchestrator> {
        let mut graph = Orchestrator::new();
        graph.register_stage(
            "answer",
            Arc::new(FnStage::new(&[StateField::FinalResponse], move |_| async move {
                match outcome {
                    "fail" => Err(StageError::Processing("backend down".to_string())),
                    "panic" => panic!("stage exploded"),
                    text => Ok(StateUpdate::final_response(text)),
                }
            })),
        );
        Arc::new(graph.compile().unwrap())
    }

    async fn runner_with(
        outcome: &'static str,
    ) -> (JobRunner, Arc<RecordingPublisher>, Arc<RecordingTransport>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let transport = Arc::new(RecordingTransport::default());
        registry
            .register("chat-1", ConnectionHandle::new(transport.clone()))
            .await;
        let delivery = Arc::new(DeliveryPipeline::new(registry, Arc::new(SilentSynthesizer), 10));
        let publisher = Arc::new(RecordingPublisher::default());
        let runner = JobRunner::new(
            workflow(outcome),
            delivery,
            publisher.clone(),
            "messages.outgoing.send",
            "interactions.dead_letter",
        );
        (runner, publisher, transport)
    }

    fn job() -> Job {
        Job::new(InteractionState::new("chat-1", "acme", "question"))
    }

    #[tokio::test]
    async fn test_success_publishes_final_response() {
        let (runner, publisher, transport) = runner_with("the answer").await;
        assert!(runner.process(job()).await);

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "messages.outgoing.send");
        assert_eq!(published[0].1["llm_response"], "the answer");
        assert_eq!(published[0].1["tenant_id"], "acme");
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_dead_lettered_and_session_terminated() {
        let (runner, publisher, transport) = runner_with("fail").await;
        assert!(!runner.process(job()).await);

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "interactions.dead_letter");
        assert!(
            published[0].1["error"]
                .as_str()
                .unwrap()
                .contains("backend down")
        );
        assert_eq!(*transport.sent.lock().unwrap(), vec![StreamUnit::End]);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (runner, publisher, transport) = runner_with("panic").await;
        assert!(!runner.process(job()).await);
        assert_eq!(publisher.published.lock().unwrap()[0].0, "interactions.dead_letter");
        assert_eq!(*transport.sent.lock().unwrap(), vec![StreamUnit::End]);
    }

    #[tokio::test]
    async fn test_pool_rejects_when_queue_full() {
        let (runner, publisher, _transport) = runner_with("ok").await;
        // One worker, one slot: a burst without yielding overflows the queue
        let pool = WorkerPool::start(Arc::new(runner), 1, 1);
        let mut outcomes = Vec::new();
        for _ in 0..8 {
            outcomes.push(pool.submit(job()));
        }
        assert!(outcomes.iter().any(|o| matches!(o, Err(SubmitError::Full))));

        pool.shutdown().await;
        let accepted = outcomes.iter().filter(|o| o.is_ok()).count();
        assert_eq!(publisher.published.lock().unwrap().len(), accepted);
    }
}
