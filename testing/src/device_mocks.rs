//! Scripted decoder and recording audit sink
//!
//! [`ScriptedDecoder`] stands in for the camera: tests push decoded strings
//! into it and the session sees them as frames. [`RecordingAuditSink`] keeps
//! every audit record in memory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use checkin_core::{
    AuditEntry, AuditError, AuditSink, DecodedStream, Decoder, DecoderError, DecoderSettings,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Camera stand-in driven by the test.
///
/// Frames pushed while the decoder is stopped stay queued and are delivered
/// after the next `start`.
///
/// # Example
///
/// ```
/// use checkin_testing::ScriptedDecoder;
///
/// let decoder = ScriptedDecoder::new();
/// decoder.push("TICKET001");
/// assert_eq!(decoder.start_count(), 0);
/// ```
#[derive(Clone)]
pub struct ScriptedDecoder {
    sender: mpsc::UnboundedSender<String>,
    frames: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
    stop_signal: Arc<watch::Sender<u64>>,
    running: Arc<AtomicBool>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<String>>>,
    settings: Arc<Mutex<Vec<DecoderSettings>>>,
}

impl ScriptedDecoder {
    /// Create a decoder with no queued frames
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (stop_signal, _) = watch::channel(0);
        Self {
            sender,
            frames: Arc::new(tokio::sync::Mutex::new(receiver)),
            stop_signal: Arc::new(stop_signal),
            running: Arc::new(AtomicBool::new(false)),
            starts: Arc::new(AtomicUsize::new(0)),
            stops: Arc::new(AtomicUsize::new(0)),
            failure: Arc::new(Mutex::new(None)),
            settings: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a decoder whose `start` fails with `CameraUnavailable(reason)`
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        let decoder = Self::new();
        decoder.fail_start(Some(reason));
        decoder
    }

    /// Set or clear the start failure
    pub fn fail_start(&self, reason: Option<&str>) {
        *self.failure.lock().unwrap() = reason.map(str::to_string);
    }

    /// Queue one decoded frame
    pub fn push(&self, code: &str) {
        let _ = self.sender.send(code.to_string());
    }

    /// Whether the camera is currently open
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Successful and failed `start` calls so far
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// `stop` calls so far
    #[must_use]
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Settings passed to every `start`, oldest first
    #[must_use]
    pub fn settings_seen(&self) -> Vec<DecoderSettings> {
        self.settings.lock().unwrap().clone()
    }
}

impl Default for ScriptedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ScriptedDecoder {
    fn start<'a>(
        &'a self,
        settings: &'a DecoderSettings,
    ) -> Pin<Box<dyn Future<Output = Result<DecodedStream, DecoderError>> + Send + 'a>> {
        Box::pin(async move {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.settings.lock().unwrap().push(settings.clone());

            if let Some(reason) = self.failure.lock().unwrap().clone() {
                return Err(DecoderError::CameraUnavailable(reason));
            }
            if self.running.swap(true, Ordering::SeqCst) {
                return Err(DecoderError::AlreadyStarted);
            }

            let frames = Arc::clone(&self.frames);
            let mut stopped = self.stop_signal.subscribe();
            let stream = async_stream::stream! {
                let mut frames = frames.lock().await;
                loop {
                    let frame = tokio::select! {
                        biased;
                        _ = stopped.changed() => None,
                        frame = frames.recv() => frame,
                    };
                    match frame {
                        Some(frame) => yield frame,
                        None => break,
                    }
                }
            };
            Ok(Box::pin(stream) as DecodedStream)
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.running.swap(false, Ordering::SeqCst) {
                self.stop_signal.send_modify(|generation| *generation += 1);
            }
        })
    }
}

/// Audit sink that keeps every record.
#[derive(Clone, Debug, Default)]
pub struct RecordingAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `record` fail (nothing is kept while failing)
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Records written so far, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record<'a>(
        &'a self,
        entry: &'a AuditEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + 'a>> {
        Box::pin(async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AuditError::Unavailable("injected fault".to_string()));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        })
    }
}
