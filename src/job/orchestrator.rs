//! Batching orchestrator for a transformation job.
//!
//! The catalog is walked in fixed-size batches. Prompts inside a batch run
//! concurrently on the calling task; every call of a batch settles before
//! the next batch starts, so no more than `batch_size` requests are ever in
//! flight. A credential failure stops the job once its batch has settled.
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::{ImageBackend, ReferenceImage};
use crate::catalog::PromptCatalog;
use crate::config::Config;
use crate::error::{AppError, AppResult, CredentialError};
use crate::job::progress::{JobProgress, ProgressEvent, ProgressSink};
use crate::job::{AbortFlag, GeneratedImage, JobReport, RequestExecutor, RetryPolicy};

pub const DEFAULT_BATCH_SIZE: usize = 5;

pub struct TransformationJob {
    catalog: Arc<PromptCatalog>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl TransformationJob {
    pub fn new(
        catalog: Arc<PromptCatalog>,
        policy: RetryPolicy,
        batch_size: usize,
    ) -> AppResult<Self> {
        if batch_size == 0 {
            return Err(AppError::Config("batch size must be at least 1".to_string()));
        }
        Ok(TransformationJob { catalog, policy, batch_size })
    }

    pub fn from_config(
        catalog: Arc<PromptCatalog>,
        backend: Arc<dyn ImageBackend>,
        config: &Config,
    ) -> AppResult<Self> {
        let policy = RetryPolicy::from_config(RequestExecutor::new(backend), config);
        Self::new(catalog, policy, config.batch_size)
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run the whole catalog against `references`.
    ///
    /// Returns the produced images in arrival order. An empty list is a
    /// valid outcome; only a credential failure is an error.
    pub async fn run(
        &self,
        references: &[ReferenceImage],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<GeneratedImage>, CredentialError> {
        let total_prompts = self.catalog.len();
        let total_batches = self.catalog.batch_count(self.batch_size);
        let mut progress = JobProgress { total_prompts, ..JobProgress::default() };
        let mut results: Vec<GeneratedImage> = Vec::with_capacity(total_prompts);
        let aborted = AbortFlag::new();

        tracing::info!(
            total_prompts,
            total_batches,
            references = references.len(),
            "Starting transformation job"
        );
        sink.report(&ProgressEvent::Started { total_prompts, total_batches });

        for (index, batch) in self.catalog.batches(self.batch_size).enumerate() {
            let batch_number = index + 1;
            tracing::info!(
                "Processing batch {} of {} ({} prompts)",
                batch_number,
                total_batches,
                batch.len()
            );
            sink.report(&ProgressEvent::BatchStarted { batch: batch_number, total_batches });

            let abort_flag = &aborted;
            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .map(|prompt| async move {
                    let outcome =
                        self.policy.attempt_unless_aborted(references, prompt, abort_flag).await;
                    (prompt, outcome)
                })
                .collect();

            let mut fatal: Option<CredentialError> = None;
            while let Some((prompt, outcome)) = pending.next().await {
                match outcome {
                    Err(err) => {
                        if fatal.is_none() {
                            tracing::error!(
                                category = %prompt.category,
                                "Credential rejected, aborting job: {}",
                                err
                            );
                            fatal = Some(err);
                        }
                    }
                    Ok(image) if fatal.is_none() => {
                        progress.settled_count += 1;
                        let produced = image.is_some();
                        if let Some(image) = image {
                            results.push(image);
                            progress.completed_count += 1;
                        }
                        sink.report(&ProgressEvent::PromptSettled {
                            category: prompt.category,
                            produced,
                            progress,
                        });
                    }
                    Ok(image) => {
                        if image.is_some() {
                            tracing::debug!(
                                category = %prompt.category,
                                "Discarding image settled after abort"
                            );
                        }
                    }
                }
            }

            if let Some(err) = fatal {
                return Err(err);
            }
        }

        tracing::info!(produced = results.len(), total_prompts, "Transformation job finished");
        sink.report(&ProgressEvent::Finished { produced: results.len(), total_prompts });
        Ok(results)
    }

    /// `run`, wrapped with a job id for callers that keep results around.
    pub async fn run_report(
        &self,
        references: &[ReferenceImage],
        sink: &dyn ProgressSink,
    ) -> Result<JobReport, CredentialError> {
        let images = self.run(references, sink).await?;
        Ok(JobReport { job_id: Uuid::new_v4(), total_prompts: self.catalog.len(), images })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendImage};
    use crate::catalog::{Category, PromptSpec};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers every call the same way and counts calls.
    struct Uniform {
        calls: AtomicUsize,
        answer: Answer,
    }

    #[async_trait]
    impl ImageBackend for Uniform {
        async fn generate(
            &self,
            _: &[ReferenceImage],
            _: &str,
        ) -> Result<Option<BackendImage>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    type Answer = Result<Option<BackendImage>, BackendError>;

    fn job(answer: Answer, catalog: PromptCatalog) -> (TransformationJob, Arc<Uniform>) {
        let backend = Arc::new(Uniform { calls: AtomicUsize::new(0), answer });
        let policy = RetryPolicy::new(RequestExecutor::new(backend.clone()), 3, Duration::ZERO);
        let job = TransformationJob::new(Arc::new(catalog), policy, DEFAULT_BATCH_SIZE).unwrap();
        (job, backend)
    }

    fn png() -> Option<BackendImage> {
        Some(BackendImage { data: "iVBORw0K".to_string(), mime_type: "image/png".to_string() })
    }

    fn collecting_sink() -> (Arc<Mutex<Vec<ProgressEvent>>>, impl ProgressSink) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        (events, move |event: &ProgressEvent| captured.lock().unwrap().push(event.clone()))
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let backend = Arc::new(Uniform { calls: AtomicUsize::new(0), answer: Ok(None) });
        let policy = RetryPolicy::with_defaults(RequestExecutor::new(backend));
        assert!(TransformationJob::new(Arc::new(PromptCatalog::builtin()), policy, 0).is_err());
    }

    #[tokio::test]
    async fn full_success_produces_one_image_per_prompt() {
        let (job, backend) = job(Ok(png()), PromptCatalog::builtin());
        let (events, sink) = collecting_sink();
        let images = job.run(&[], &sink).await.unwrap();

        assert_eq!(images.len(), 15);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 15);
        for category in Category::ALL {
            assert_eq!(images.iter().filter(|i| i.category == category).count(), 5);
        }

        let events = events.lock().unwrap();
        let batches: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::BatchStarted { batch, total_batches } => {
                    Some((*batch, *total_batches))
                }
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![(1, 3), (2, 3), (3, 3)]);
        let started = ProgressEvent::Started { total_prompts: 15, total_batches: 3 };
        let finished = ProgressEvent::Finished { produced: 15, total_prompts: 15 };
        assert_eq!(events.first(), Some(&started));
        assert_eq!(events.last(), Some(&finished));
    }

    #[tokio::test]
    async fn always_absent_completes_empty() {
        let (job, backend) = job(Ok(None), PromptCatalog::builtin());
        let (events, sink) = collecting_sink();
        let images = job.run(&[], &sink).await.unwrap();

        assert!(images.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 45);
        let events = events.lock().unwrap();
        let finished = ProgressEvent::Finished { produced: 0, total_prompts: 15 };
        assert_eq!(events.last(), Some(&finished));
        let settled =
            events.iter().filter(|e| matches!(e, ProgressEvent::PromptSettled { .. })).count();
        assert_eq!(settled, 15);
    }

    #[tokio::test]
    async fn credential_failure_on_first_call_stops_everything() {
        let rejected = Err(BackendError::Credential("API key not valid".into()));
        let (job, backend) = job(rejected, PromptCatalog::builtin());
        let (events, sink) = collecting_sink();
        let err = job.run(&[], &sink).await.unwrap_err();

        assert_eq!(err.reason, "API key not valid");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        let events = events.lock().unwrap();
        assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Finished { .. })));
        let batches =
            events.iter().filter(|e| matches!(e, ProgressEvent::BatchStarted { .. })).count();
        assert_eq!(batches, 1);
    }

    #[tokio::test]
    async fn empty_catalog_finishes_immediately() {
        let (job, backend) = job(Ok(png()), PromptCatalog::from_prompts(vec![]));
        let (events, sink) = collecting_sink();
        assert!(job.run(&[], &sink).await.unwrap().is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn report_outcome_and_short_last_batch() {
        let prompts =
            (0..7).map(|i| PromptSpec::new(format!("p{}", i), Category::Overweight)).collect();
        let (job, _) = job(Ok(png()), PromptCatalog::from_prompts(prompts));
        let report = job.run_report(&[], &crate::job::TracingSink).await.unwrap();
        assert_eq!(report.total_prompts, 7);
        assert_eq!(report.images.len(), 7);
        assert_eq!(report.outcome(), crate::job::Outcome::Complete);
    }
}
