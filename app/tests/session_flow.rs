//! Scan sessions driven end to end through the runtime store.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use checkin::decoder::LineDecoder;
use checkin::session::{
    ScanResult, SessionController, SessionEnvironment, SessionState, SessionStatus, VerdictStream,
};
use checkin::verifier::Verifier;
use checkin_core::{
    CameraFacing, CheckInError, DecodedStream, Decoder, DecoderError, DecoderSettings, Verdict,
};
use checkin_testing::{test_clock, ticket, InMemoryTicketStore, RecordingAuditSink, ScriptedDecoder};
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

struct Harness {
    session: SessionController,
    decoder: ScriptedDecoder,
    store: InMemoryTicketStore,
    audit: RecordingAuditSink,
}

fn harness(single_shot: bool) -> Harness {
    let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada"), ticket("T2", "Grace")]);
    let decoder = ScriptedDecoder::new();
    let audit = RecordingAuditSink::new();
    let verifier = Verifier::new(Arc::new(store.clone()), Arc::new(test_clock()))
        .with_audit(Arc::new(audit.clone()));

    let environment = SessionEnvironment::new(
        Arc::new(verifier),
        Arc::new(decoder.clone()),
        Arc::new(test_clock()),
    )
    .with_single_shot(single_shot);

    Harness {
        session: SessionController::new(environment),
        decoder,
        store,
        audit,
    }
}

fn session_over(store: InMemoryTicketStore, decoder: Arc<dyn Decoder>) -> SessionController {
    let verifier = Verifier::new(Arc::new(store), Arc::new(test_clock()));
    SessionController::new(SessionEnvironment::new(
        Arc::new(verifier),
        decoder,
        Arc::new(test_clock()),
    ))
}

async fn wait_for_status(session: &SessionController, status: SessionStatus) -> SessionState {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let state = session.state().await;
            if state.status == status {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("status reached in time")
}

async fn next_result(verdicts: &mut VerdictStream) -> ScanResult {
    tokio::time::timeout(TIMEOUT, verdicts.next())
        .await
        .expect("verdict in time")
        .expect("verdict stream open")
}

#[tokio::test]
async fn scans_become_verdicts() {
    let h = harness(false);
    let mut verdicts = h.session.subscribe_verdicts();

    let state = h.session.start_and_wait(TIMEOUT).await.unwrap();
    assert_eq!(state.status, SessionStatus::Scanning);

    h.decoder.push("T1");
    let first = next_result(&mut verdicts).await;
    assert_eq!(first.attempt.raw_code, "T1");
    assert!(first.verdict.is_valid());

    h.decoder.push("T1");
    assert!(matches!(next_result(&mut verdicts).await.verdict, Verdict::Duplicate { .. }));

    h.decoder.push("NOPE");
    assert_eq!(next_result(&mut verdicts).await.verdict, Verdict::unknown_code());

    let state = h.session.state().await;
    assert_eq!(state.scans, 3);
    assert_eq!(state.last_verdict(), Some(&Verdict::unknown_code()));
    assert!(!state.processing);
    assert_eq!(h.audit.entries().len(), 3);

    h.session.shutdown(TIMEOUT).await.unwrap();
    assert!(!h.decoder.is_running());
}

#[tokio::test]
async fn start_passes_settings_and_is_idempotent() {
    let store = InMemoryTicketStore::new();
    let decoder = ScriptedDecoder::new();
    let settings = DecoderSettings {
        camera_facing: CameraFacing::User,
        ..DecoderSettings::default()
    };
    let environment = SessionEnvironment::new(
        Arc::new(Verifier::new(Arc::new(store), Arc::new(test_clock()))),
        Arc::new(decoder.clone()),
        Arc::new(test_clock()),
    )
    .with_settings(settings.clone());
    let session = SessionController::new(environment);

    session.start_and_wait(TIMEOUT).await.unwrap();
    session.start().await.unwrap();
    session.start_and_wait(TIMEOUT).await.unwrap();

    assert_eq!(decoder.start_count(), 1);
    assert_eq!(decoder.settings_seen(), vec![settings]);

    session.stop().await.unwrap();
    session.stop().await.unwrap();
    session.shutdown(TIMEOUT).await.unwrap();
    assert_eq!(session.state().await.status, SessionStatus::Stopped);
}

#[tokio::test]
async fn camera_failure_is_retained_until_next_start() {
    let h = harness(false);
    h.decoder.fail_start(Some("permission denied"));

    let state = h.session.start_and_wait(TIMEOUT).await.unwrap();
    assert_eq!(state.status, SessionStatus::Stopped);
    assert_eq!(
        state.camera_error,
        Some(CheckInError::CameraUnavailable("permission denied".to_string()))
    );

    h.decoder.fail_start(None);
    let state = h.session.start_and_wait(TIMEOUT).await.unwrap();
    assert_eq!(state.status, SessionStatus::Scanning);
    assert!(state.camera_error.is_none());

    h.session.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn stop_releases_camera_and_restart_resumes() {
    let h = harness(false);
    let mut verdicts = h.session.subscribe_verdicts();

    h.session.start_and_wait(TIMEOUT).await.unwrap();
    h.decoder.push("T1");
    next_result(&mut verdicts).await;

    h.session.stop().await.unwrap();
    tokio::time::timeout(TIMEOUT, async {
        while h.decoder.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // Queued while stopped, delivered after restart
    h.decoder.push("T2");
    let state = h.session.start_and_wait(TIMEOUT).await.unwrap();
    let previous = state.last_result.map(|result| result.attempt.raw_code);
    assert_ne!(previous.as_deref(), Some("T1"));

    let result = next_result(&mut verdicts).await;
    assert_eq!(result.attempt.raw_code, "T2");
    assert!(result.verdict.is_valid());

    h.session.shutdown(TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn single_shot_releases_camera_after_each_code() {
    let h = harness(true);
    let mut verdicts = h.session.subscribe_verdicts();

    h.session.start_and_wait(TIMEOUT).await.unwrap();
    h.decoder.push("T1");
    h.decoder.push("T2");

    let first = next_result(&mut verdicts).await;
    assert_eq!(first.attempt.raw_code, "T1");
    assert!(!h.decoder.is_running());
    assert_eq!(h.session.state().await.status, SessionStatus::Stopped);

    // "Scan next"
    h.session.start_and_wait(TIMEOUT).await.unwrap();
    let second = next_result(&mut verdicts).await;
    assert_eq!(second.attempt.raw_code, "T2");
    assert_eq!(h.decoder.start_count(), 2);

    h.session.shutdown(TIMEOUT).await.unwrap();
    assert!(h.store.get("T2").unwrap().checked_in_at.is_some());
}

/// Camera that takes a while to open.
struct SlowDecoder {
    inner: ScriptedDecoder,
    delay: Duration,
}

impl Decoder for SlowDecoder {
    fn start<'a>(
        &'a self,
        settings: &'a DecoderSettings,
    ) -> Pin<Box<dyn Future<Output = Result<DecodedStream, DecoderError>> + Send + 'a>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner.start(settings).await
        })
    }

    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.inner.stop()
    }
}

#[tokio::test]
async fn quick_restart_while_camera_opens_recovers() {
    let decoder = ScriptedDecoder::new();
    let slow = SlowDecoder {
        inner: decoder.clone(),
        delay: Duration::from_millis(50),
    };
    let session = session_over(InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]), Arc::new(slow));
    let mut verdicts = session.subscribe_verdicts();

    session.start().await.unwrap();
    session.stop().await.unwrap();
    session.start().await.unwrap();

    let state = wait_for_status(&session, SessionStatus::Scanning).await;
    assert_eq!(state.run, 2);
    assert!(state.camera_error.is_none());
    assert!(decoder.is_running());
    assert_eq!(decoder.start_count(), 2);

    decoder.push("T1");
    assert!(next_result(&mut verdicts).await.verdict.is_valid());

    session.stop().await.unwrap();
    wait_for_status(&session, SessionStatus::Stopped).await;
    let state = session.start_and_wait(TIMEOUT).await.unwrap();
    assert_eq!(state.status, SessionStatus::Scanning);

    session.shutdown(TIMEOUT).await.unwrap();
    assert!(!decoder.is_running());
}

#[tokio::test]
async fn piped_lines_are_each_evaluated() {
    let store = InMemoryTicketStore::with_tickets([
        ticket("T1", "Ada"),
        ticket("T2", "Grace"),
        ticket("T3", "Edsger"),
    ]);
    let decoder = LineDecoder::new(&b"T1\nT2\n\nT3\n"[..]);
    let session = session_over(store.clone(), Arc::new(decoder.clone()));
    let mut verdicts = session.subscribe_verdicts();

    session.start_and_wait(TIMEOUT).await.unwrap();

    let mut codes = Vec::new();
    for _ in 0..3 {
        let result = next_result(&mut verdicts).await;
        assert!(result.verdict.is_valid(), "{} was not admitted", result.attempt.raw_code);
        codes.push(result.attempt.raw_code);
    }
    assert_eq!(codes, ["T1", "T2", "T3"]);

    let state = wait_for_status(&session, SessionStatus::Stopped).await;
    assert_eq!(state.scans, 3);
    assert_eq!(state.ignored_frames, 0);
    assert!(decoder.is_exhausted());
    for code in ["T1", "T2", "T3"] {
        assert!(store.get(code).unwrap().checked_in_at.is_some());
    }

    session.shutdown(TIMEOUT).await.unwrap();
}
