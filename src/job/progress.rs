//! Progress events emitted synchronously by the orchestrator.
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

use crate::catalog::Category;

/// Counters owned by the orchestrator for the duration of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub total_prompts: usize,
    /// Calls that have settled, with or without an image.
    pub settled_count: usize,
    /// Images produced so far.
    pub completed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { total_prompts: usize, total_batches: usize },
    BatchStarted { batch: usize, total_batches: usize },
    PromptSettled { category: Category, produced: bool, progress: JobProgress },
    Finished { produced: usize, total_prompts: usize },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Started { total_prompts, .. } => {
                write!(f, "Starting generation of {} images...", total_prompts)
            }
            ProgressEvent::BatchStarted { batch, total_batches } => {
                write!(f, "Processing batch {} of {}...", batch, total_batches)
            }
            ProgressEvent::PromptSettled { progress, .. } => write!(
                f,
                "Generating images... ({}/{})",
                progress.completed_count, progress.total_prompts
            ),
            ProgressEvent::Finished { produced, .. } => {
                write!(f, "Done! Generated {} images.", produced)
            }
        }
    }
}

/// Observer invoked at each checkpoint of a run.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Logs every event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&self, event: &ProgressEvent) {
        tracing::info!(target: "transform_pack::progress", "{}", event);
    }
}

/// Forwards events to an async consumer. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelSink { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: &ProgressEvent) {
        let _ = self.tx.send(event.clone());
    }
}
