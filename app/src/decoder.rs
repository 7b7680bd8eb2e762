//! Line-oriented decoder.
//!
//! Treats every line of an async reader as one decoded frame. Backs `checkin
//! scan` on terminals and handheld scanners that type the code followed by
//! Enter, and makes piped input (`cat codes.txt | checkin scan`) work.
//!
//! Nothing is read ahead: a line is read only when the stream is polled, and
//! the scan session polls once per settled frame.

use checkin_core::{DecodedStream, Decoder, DecoderError, DecoderSettings};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::{Mutex, watch};

type LineReader = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// Decoder reading one code per line.
///
/// Stopping keeps the reader; a later `start` continues with the next line
/// once the previous stream has let go of it.
/// Once the reader reaches end of input [`is_exhausted`](Self::is_exhausted)
/// turns true and the stream ends.
#[derive(Clone)]
pub struct LineDecoder {
    lines: Arc<Mutex<LineReader>>,
    stop_signal: Arc<watch::Sender<u64>>,
    running: Arc<AtomicBool>,
    exhausted: Arc<AtomicBool>,
}

impl LineDecoder {
    /// Decode lines from `reader`.
    #[must_use]
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        let (stop_signal, _) = watch::channel(0);
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(reader).lines())),
            stop_signal: Arc::new(stop_signal),
            running: Arc::new(AtomicBool::new(false)),
            exhausted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Decode lines from standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }

    /// Whether the reader has reached end of input.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}

impl Decoder for LineDecoder {
    fn start<'a>(
        &'a self,
        settings: &'a DecoderSettings,
    ) -> Pin<Box<dyn Future<Output = Result<DecodedStream, DecoderError>> + Send + 'a>> {
        Box::pin(async move {
            if self.is_exhausted() {
                return Err(DecoderError::CameraUnavailable("input closed".to_string()));
            }
            if self.running.swap(true, Ordering::SeqCst) {
                return Err(DecoderError::AlreadyStarted);
            }
            tracing::debug!(
                camera_facing = %settings.camera_facing,
                frame_rate = settings.frame_rate,
                decode_region = %settings.decode_region,
                "Line decoder started"
            );

            let lines = Arc::clone(&self.lines);
            let running = Arc::clone(&self.running);
            let exhausted = Arc::clone(&self.exhausted);
            let mut stopped = self.stop_signal.subscribe();

            let stream = async_stream::stream! {
                let mut lines = lines.lock().await;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = stopped.changed() => None,
                        line = lines.next_line() => Some(line),
                    };
                    match next {
                        None => break,
                        Some(Ok(Some(line))) => yield line,
                        Some(Ok(None)) => {
                            exhausted.store(true, Ordering::SeqCst);
                            running.store(false, Ordering::SeqCst);
                            break;
                        },
                        Some(Err(error)) => {
                            tracing::warn!(%error, "Line decoder read failed");
                            exhausted.store(true, Ordering::SeqCst);
                            running.store(false, Ordering::SeqCst);
                            break;
                        },
                    }
                }
            };
            Ok(Box::pin(stream) as DecodedStream)
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.running.swap(false, Ordering::SeqCst) {
                self.stop_signal.send_modify(|generation| *generation += 1);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn yields_one_frame_per_line_until_eof() {
        let decoder = LineDecoder::new(&b"T1\nT2\n"[..]);
        let settings = DecoderSettings::default();

        let frames: Vec<String> = decoder.start(&settings).await.unwrap().collect().await;
        assert_eq!(frames, vec!["T1".to_string(), "T2".to_string()]);
        assert!(decoder.is_exhausted());
        assert!(matches!(
            decoder.start(&settings).await,
            Err(DecoderError::CameraUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn stop_ends_stream_and_restart_continues() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let decoder = LineDecoder::new(reader);
        let settings = DecoderSettings::default();

        let mut frames = decoder.start(&settings).await.unwrap();
        assert!(matches!(decoder.start(&settings).await, Err(DecoderError::AlreadyStarted)));

        tokio::io::AsyncWriteExt::write_all(&mut writer, b"T1\n").await.unwrap();
        assert_eq!(frames.next().await.as_deref(), Some("T1"));

        decoder.stop().await;
        assert_eq!(frames.next().await, None);
        assert!(!decoder.is_exhausted());

        tokio::io::AsyncWriteExt::write_all(&mut writer, b"T2\n").await.unwrap();
        let mut frames = decoder.start(&settings).await.unwrap();
        assert_eq!(frames.next().await.as_deref(), Some("T2"));
    }
}
