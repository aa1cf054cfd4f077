//! Speech capture engine tests
//!
//! Drive `SpeechCapture` with a scripted backend and a paused clock.

use std::time::Duration;

use sathi_voice::Language;
use sathi_voice::voice::{
    CapturePolicy, ListenState, RecognitionErrorKind, ResultSlot, START_FAILED_MESSAGE,
    SpeechCapture, TIMEOUT_MESSAGE,
};

mod common;

use common::{FakeBackend, Recorder};

const NO_SPEECH_MESSAGE: &str = "No speech detected. Please try again.";

fn capture_with(backend: FakeBackend) -> (SpeechCapture<FakeBackend>, Recorder, Recorder) {
    let results = Recorder::default();
    let errors = Recorder::default();
    let capture = SpeechCapture::new(backend, Language::En, results.callback(), errors.callback());
    (capture, results, errors)
}

fn no_speech(capture: &mut SpeechCapture<FakeBackend>) {
    let sink = capture.backend().sink().clone();
    sink.error(RecognitionErrorKind::NoSpeech);
    sink.ended();
    capture.process_pending();
}

#[tokio::test(start_paused = true)]
async fn test_final_result_delivered_and_session_stopped() {
    let (mut capture, results, errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture.process_pending();
    assert!(capture.is_listening());

    capture.backend().sink().result(
        0,
        vec![
            ResultSlot::final_result(" gehu ka ", 0.8),
            ResultSlot::interim("bha"),
            ResultSlot::final_result("bhav batao ", 0.6),
        ],
    );
    capture.process_pending();

    assert_eq!(results.values(), vec!["gehu ka bhav batao"]);
    assert!(errors.values().is_empty());
    assert_eq!(capture.backend().stops, 1);
    assert_eq!(capture.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_interim_results_not_forwarded() {
    let (mut capture, results, _errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture
        .backend()
        .sink()
        .result(0, vec![ResultSlot::interim("kya")]);
    capture.process_pending();

    assert!(results.values().is_empty());
    assert!(capture.is_listening());
}

#[tokio::test(start_paused = true)]
async fn test_start_while_listening_is_noop() {
    let (mut capture, results, errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture.process_pending();
    capture.start_listening();

    assert_eq!(capture.backend().starts.len(), 1);
    assert_eq!(capture.backend().aborts, 0);

    capture
        .backend()
        .sink()
        .result(0, vec![ResultSlot::final_result("hello", 0.9)]);
    capture.process_pending();

    assert_eq!(results.values(), vec!["hello"]);
    assert!(errors.values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_speech_retries_then_surfaces() {
    let (mut capture, _results, errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture.process_pending();

    for attempt in 1..=3 {
        no_speech(&mut capture);
        assert!(errors.values().is_empty(), "attempt {attempt} surfaced early");
        assert_eq!(capture.retry_count(), attempt);
        assert!(capture.is_listening());

        // Retry timer fires and a fresh session begins
        capture.process_next().await;
        capture.process_pending();
        assert_eq!(capture.backend().starts.len(), attempt as usize + 1);
    }

    no_speech(&mut capture);

    assert_eq!(errors.values(), vec![NO_SPEECH_MESSAGE]);
    assert_eq!(capture.backend().starts.len(), 4);
    assert_eq!(capture.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_for_delay() {
    let (mut capture, _results, _errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture.process_pending();
    no_speech(&mut capture);

    let before = tokio::time::Instant::now();
    capture.process_next().await;

    assert!(before.elapsed() >= Duration::from_millis(400));
    assert_eq!(capture.backend().starts.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_cancels_pending_retry() {
    let (mut capture, _results, errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture.process_pending();
    no_speech(&mut capture);
    assert!(capture.is_listening());

    capture.stop_listening();
    assert_eq!(capture.state(), ListenState::Idle);

    tokio::time::sleep(Duration::from_secs(1)).await;
    capture.process_pending();

    assert_eq!(capture.backend().starts.len(), 1);
    assert!(errors.values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_speech_after_manual_stop_suppressed() {
    let mut backend = FakeBackend::new();
    backend.end_on_stop = false;
    let (mut capture, _results, errors) = capture_with(backend);

    capture.start_listening();
    capture.process_pending();
    capture.stop_listening();
    assert_eq!(capture.state(), ListenState::Stopping);
    assert!(!capture.is_listening());

    no_speech(&mut capture);

    assert!(errors.values().is_empty());
    assert_eq!(capture.backend().starts.len(), 1);
    assert_eq!(capture.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_surfaces_and_stops() {
    let (mut capture, results, errors) = capture_with(FakeBackend::new());
    let started = tokio::time::Instant::now();

    capture.start_listening();
    capture.process_pending();
    capture.process_next().await;
    capture.process_pending();

    assert!(started.elapsed() >= Duration::from_secs(15));
    assert_eq!(errors.values(), vec![TIMEOUT_MESSAGE]);
    assert!(results.values().is_empty());
    assert_eq!(capture.backend().stops, 1);
    assert_eq!(capture.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_spans_retries() {
    let policy = CapturePolicy {
        retry_delay: Duration::from_secs(4),
        max_retries: 3,
        session_timeout: Duration::from_secs(10),
    };
    let results = Recorder::default();
    let errors = Recorder::default();
    let mut capture = SpeechCapture::new(
        FakeBackend::new(),
        Language::En,
        results.callback(),
        errors.callback(),
    )
    .with_policy(policy);

    capture.start_listening();
    capture.process_pending();

    // Two no-speech rounds take 8s; the third retry would land after the ceiling
    for _ in 0..3 {
        no_speech(&mut capture);
        capture.process_next().await;
        capture.process_pending();
    }

    assert_eq!(errors.values(), vec![TIMEOUT_MESSAGE]);
    assert_eq!(capture.backend().starts.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stale_session_events_ignored() {
    let (mut capture, results, _errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture.process_pending();
    let old_sink = capture.backend().sink().clone();

    no_speech(&mut capture);
    capture.process_next().await;
    capture.process_pending();
    assert_eq!(capture.backend().starts.len(), 2);

    old_sink.result(0, vec![ResultSlot::final_result("stale words", 1.0)]);
    old_sink.error(RecognitionErrorKind::NetworkError);
    old_sink.ended();
    capture.process_pending();

    assert!(results.values().is_empty());
    assert!(capture.is_listening());
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_reports_once_per_attempt() {
    let (mut capture, _results, errors) = capture_with(FakeBackend::unsupported());

    assert!(!capture.is_supported());
    assert!(errors.values().is_empty());

    capture.start_listening();

    assert_eq!(
        errors.values(),
        vec!["Speech recognition is not supported on this device."]
    );
    assert!(capture.backend().starts.is_empty());
    assert_eq!(capture.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_aborted_after_result_suppressed() {
    let mut backend = FakeBackend::new();
    backend.end_on_stop = false;
    let (mut capture, results, errors) = capture_with(backend);

    capture.start_listening();
    let sink = capture.backend().sink().clone();
    sink.result(0, vec![ResultSlot::final_result("mandi bhav", 0.9)]);
    sink.error(RecognitionErrorKind::Aborted);
    sink.ended();
    capture.process_pending();

    assert_eq!(results.values(), vec!["mandi bhav"]);
    assert!(errors.values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_aborted_without_result_surfaces() {
    let (mut capture, _results, errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture
        .backend()
        .sink()
        .error(RecognitionErrorKind::Aborted);
    capture.process_pending();

    assert_eq!(errors.values(), vec!["Speech recognition stopped."]);
    assert_eq!(capture.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_error_surfaces_immediately() {
    let (mut capture, _results, errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture
        .backend()
        .sink()
        .error(RecognitionErrorKind::PermissionDenied);
    capture.process_pending();

    assert_eq!(errors.values(), vec!["Microphone permission denied."]);
    assert_eq!(capture.retry_count(), 0);
    assert_eq!(capture.backend().starts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_language_reread_each_start() {
    let (mut capture, _results, _errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture
        .backend()
        .sink()
        .result(0, vec![ResultSlot::final_result("hello", 0.9)]);
    capture.process_pending();

    capture.set_language(Language::Hi);
    capture.start_listening();

    let starts = &capture.backend().starts;
    assert_eq!(starts[0].lang_tag, "en-IN");
    assert_eq!(starts[1].lang_tag, "hi-IN");
    assert!(starts[1].continuous && starts[1].interim_results);
    assert_eq!(starts[1].max_alternatives, 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_reported() {
    let mut backend = FakeBackend::new();
    backend.fail_start = true;
    let (mut capture, _results, errors) = capture_with(backend);

    capture.start_listening();

    assert_eq!(errors.values(), vec![START_FAILED_MESSAGE]);
    assert_eq!(capture.state(), ListenState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_stopping_aborts_old_session() {
    let mut backend = FakeBackend::new();
    backend.end_on_stop = false;
    let (mut capture, _results, _errors) = capture_with(backend);

    capture.start_listening();
    capture.process_pending();
    capture.stop_listening();
    assert_eq!(capture.state(), ListenState::Stopping);

    capture.start_listening();

    assert_eq!(capture.backend().aborts, 1);
    assert_eq!(capture.backend().starts.len(), 2);
    assert!(capture.is_listening());
}

#[tokio::test(start_paused = true)]
async fn test_dispose_swallows_abort_failure() {
    let (mut capture, _results, errors) = capture_with(FakeBackend::new());

    capture.start_listening();
    capture.process_pending();
    capture.dispose();

    assert_eq!(capture.backend().aborts, 1);
    assert_eq!(capture.state(), ListenState::Idle);

    // Timers are gone: nothing fires after the ceiling
    tokio::time::sleep(Duration::from_secs(30)).await;
    capture.process_pending();
    assert!(errors.values().is_empty());
}
