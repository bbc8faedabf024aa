#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use transform_pack::{BackendError, BackendImage, ImageBackend, ReferenceImage};

pub type Answer = Result<Option<BackendImage>, BackendError>;
pub type Responder = dyn Fn(&str, usize) -> Answer + Send + Sync;

/// In-process backend driven by a closure of (prompt, attempt number).
///
/// Records call counts, per-prompt attempts, the peak number of concurrent
/// calls and, for every call, how many calls had already finished when it
/// started.
pub struct ScriptedBackend {
    respond: Box<Responder>,
    latency: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    finished: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    pub starts: Mutex<Vec<(String, usize)>>,
}

impl ScriptedBackend {
    pub fn new<F>(latency: Duration, respond: F) -> Arc<Self>
    where
        F: Fn(&str, usize) -> Result<Option<BackendImage>, BackendError> + Send + Sync + 'static,
    {
        Arc::new(ScriptedBackend {
            respond: Box::new(respond),
            latency,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
            starts: Mutex::new(Vec::new()),
        })
    }

    pub fn always_succeeds(latency: Duration) -> Arc<Self> {
        Self::new(latency, |prompt, _| Ok(Some(png_for(prompt))))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn attempts_for(&self, prompt: &str) -> usize {
        self.attempts.lock().unwrap().get(prompt).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ImageBackend for ScriptedBackend {
    async fn generate(
        &self,
        _references: &[ReferenceImage],
        prompt: &str,
    ) -> Result<Option<BackendImage>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(prompt.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        self.starts
            .lock()
            .unwrap()
            .push((prompt.to_string(), self.finished.load(Ordering::SeqCst)));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        (self.respond)(prompt, attempt)
    }
}

pub fn png_for(prompt: &str) -> BackendImage {
    BackendImage {
        data: general_purpose::STANDARD.encode(format!("png:{}", prompt)),
        mime_type: "image/png".to_string(),
    }
}

pub fn reference() -> Vec<ReferenceImage> {
    vec![ReferenceImage::new(vec![0x89, b'P', b'N', b'G'], "image/png")]
}
