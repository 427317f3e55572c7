use super::*;
use crate::config::ServerConfig;
use crate::error::TransportError;
use crate::simulator::{PadSimulator, RunningSimulator, SimulatedPad};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn create_session(url: &str) -> TransportSession {
    let server = ServerConfig {
        url: url.to_string(),
        connect_timeout_ms: 2000,
        request_timeout_ms: 2000,
        ..ServerConfig::default()
    };
    TransportSession::new(server, 0.2)
}

async fn start(simulator: PadSimulator) -> (RunningSimulator, TransportSession) {
    let running = simulator.bind("127.0.0.1:0").await.unwrap();
    let session = create_session(&running.url());
    (running, session)
}

fn test_pad() -> SimulatedPad {
    SimulatedPad {
        display_width: 1000,
        display_height: 400,
        x_resolution: 2000,
        y_resolution: 800,
        sample_rate: 100,
        ..SimulatedPad::default()
    }
}

fn request() -> SignatureRequest {
    SignatureRequest::new("Candidate signature", "Please sign")
}

type Progress = Arc<Mutex<Vec<SignatureProgress>>>;

/// Start a signature in the background, recording progress
fn spawn_signature(
    session: &TransportSession,
    pad: PadHandle,
) -> (
    tokio::task::JoinHandle<Result<SignatureData, TransportError>>,
    Progress,
) {
    let progress: Progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);
    let session = session.clone();
    let task = tokio::spawn(async move {
        session
            .start_signature(pad, request(), move |update| sink.lock().push(update))
            .await
    });
    (task, progress)
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (_simulator, session) = start(PadSimulator::new()).await;
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    session.connect().await.unwrap();
    session.connect().await.unwrap();

    assert!(session.is_connected());
    assert_eq!(session.connection_state(), ConnectionState::Connected);

    session.disconnect().await;
    assert!(!session.is_connected());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);

    // disconnecting twice is harmless
    session.disconnect().await;
}

#[tokio::test]
async fn test_connect_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let session = create_session(&format!("ws://127.0.0.1:{}", port));

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, TransportError::Connection { .. }));
    assert!(err.is_connection_failure());
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_open_pad_before_connect() {
    let session = create_session("ws://127.0.0.1:9");

    let result = timeout(Duration::from_secs(1), session.open_pad(0))
        .await
        .expect("open_pad must not hang");
    let err = result.unwrap_err();
    assert_eq!(err, TransportError::NotConnected);
    assert!(err.is_connection_failure());
}

#[tokio::test]
async fn test_open_pad_without_pads() {
    let (_simulator, session) = start(PadSimulator::with_pads(Vec::new())).await;
    session.connect().await.unwrap();

    let err = session.open_pad(0).await.unwrap_err();
    assert_eq!(err, TransportError::NoPadFound);
    assert!(!session.is_pad_open());
}

#[tokio::test]
async fn test_open_pad_index_out_of_range() {
    let (simulator, session) = start(PadSimulator::new()).await;
    session.connect().await.unwrap();

    let err = session.open_pad(3).await.unwrap_err();
    assert_eq!(err, TransportError::NoPadFound);
    assert_eq!(simulator.handle().command_count("open_pad"), 0);
}

#[tokio::test]
async fn test_search_pads_uses_hid_subset() {
    let (simulator, session) = start(PadSimulator::new()).await;
    session.connect().await.unwrap();

    let pads = session.search_pads().await.unwrap();
    assert_eq!(pads.len(), 1);
    assert_eq!(pads[0].serial, "SIM-0001");
    assert!(simulator.handle().commands().contains(&crate::protocol::Command::SearchPads {
        pad_subset: "HID".to_string(),
    }));
}

#[tokio::test]
async fn test_open_pad_scale_factors_and_points() {
    let (simulator, session) = start(PadSimulator::with_pads(vec![test_pad()])).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();

    let pad = session.open_pad(0).await.unwrap();
    assert_eq!(pad.scale(), ScaleFactors { x: 0.5, y: 0.5 });
    assert_eq!(pad.info().display_width, 1000);
    assert_eq!(pad.info().display_height, 400);
    assert_eq!(pad.sample_rate(), 100);
    assert!(session.is_pad_open());

    let (task, progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    pad_control.draw(&[(1000.0, 400.0, 1)]);
    pad_control.scribble(40);
    pad_control.press_confirm();

    let data = timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(data.counted_points, 41);
    assert!(!data.sign_data.is_empty());

    let progress = progress.lock();
    assert_eq!(
        progress[0],
        SignatureProgress::Point(StrokePoint::new(500.0, 200.0, 1))
    );
    assert_eq!(progress.len(), 41);

    assert!(!session.is_pad_open());
    assert!(!pad_control.is_pad_open());
}

#[tokio::test]
async fn test_second_open_is_rejected() {
    let (_simulator, session) = start(PadSimulator::new()).await;
    session.connect().await.unwrap();

    let _pad = session.open_pad(0).await.unwrap();
    let err = session.open_pad(0).await.unwrap_err();
    assert_eq!(err, TransportError::PadAlreadyOpen);
}

#[tokio::test]
async fn test_close_pad_is_always_safe() {
    let (simulator, session) = start(PadSimulator::new()).await;

    // not connected, nothing open
    session.close_pad().await;
    session.close_pad().await;

    session.connect().await.unwrap();
    session.close_pad().await;

    let _pad = session.open_pad(0).await.unwrap();
    session.close_pad().await;
    session.close_pad().await;
    session.close_pad().await;

    assert!(!session.is_pad_open());
    assert_eq!(simulator.handle().command_count("close_pad"), 1);
}

#[tokio::test]
async fn test_close_pad_swallows_server_errors() {
    let (simulator, session) =
        start(PadSimulator::new().fail_command("close_pad", -7, "device gone")).await;
    session.connect().await.unwrap();

    let _pad = session.open_pad(0).await.unwrap();
    session.close_pad().await;

    assert!(!session.is_pad_open());
    assert_eq!(simulator.handle().command_count("close_pad"), 1);
}

#[tokio::test]
async fn test_short_signature_is_retried() {
    let (simulator, session) = start(PadSimulator::with_pads(vec![test_pad()])).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();

    let (mut task, progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    // 15 points at 100 Hz is a false start
    pad_control.scribble(15);
    pad_control.press_confirm();
    assert!(pad_control.wait_for_command("retry_signature", 1).await);

    assert!(
        timeout(Duration::from_millis(200), &mut task).await.is_err(),
        "a too-short signature must neither resolve nor reject"
    );
    assert!(session.is_pad_open());
    assert_eq!(pad_control.command_count("get_signature_data"), 0);

    pad_control.scribble(50);
    pad_control.press_confirm();

    let data = timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(data.counted_points, 50);
    assert_eq!(data.duration_seconds, Some(0.5));

    let progress = progress.lock();
    assert!(progress
        .iter()
        .any(|p| matches!(p, SignatureProgress::Retried(RetryReason::TooShort { .. }))));
}

#[tokio::test]
async fn test_unknown_sample_rate_accepts_signature() {
    let pad = SimulatedPad {
        sample_rate: 0,
        ..test_pad()
    };
    let (simulator, session) = start(PadSimulator::with_pads(vec![pad])).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();
    assert_eq!(pad.sample_rate(), 0);

    let (task, progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    pad_control.scribble(500);
    pad_control.press_confirm();

    let data = timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(data.counted_points, 500);
    assert_eq!(data.duration_seconds, None);
    assert_eq!(pad_control.command_count("retry_signature"), 0);
    assert_eq!(pad_control.command_count("get_signature_data"), 1);
    assert!(!progress
        .lock()
        .iter()
        .any(|p| matches!(p, SignatureProgress::Retried(_))));
}

#[tokio::test]
async fn test_retry_button() {
    let (simulator, session) = start(PadSimulator::new()).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();

    let (task, progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    pad_control.scribble(100);
    pad_control.press_retry();
    assert!(pad_control.wait_for_command("retry_signature", 1).await);

    pad_control.scribble(100);
    pad_control.press_confirm();

    let data = timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(data.counted_points, 100);

    let progress = progress.lock();
    let retry_at = progress
        .iter()
        .position(|p| *p == SignatureProgress::Retried(RetryReason::PadButton))
        .expect("retry reported");
    assert_eq!(retry_at, 100);
    assert_eq!(progress.len(), 201);
}

#[tokio::test]
async fn test_cancel_button() {
    let (simulator, session) = start(PadSimulator::new()).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();

    let (task, _progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    pad_control.scribble(30);
    pad_control.press_cancel();

    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(result.unwrap_err(), TransportError::Cancelled);
    assert_eq!(pad_control.command_count("cancel_signature"), 1);
    assert_eq!(pad_control.command_count("close_pad"), 1);
    assert!(!session.is_pad_open());
    assert!(!pad_control.is_pad_open());
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_start_failure_closes_pad() {
    let (simulator, session) =
        start(PadSimulator::new().fail_command("start_signature", -21, "display busy")).await;
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();

    let err = session
        .start_signature(pad, request(), |_| {})
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TransportError::Protocol {
            context: "start_signature".to_string(),
            code: -21,
            description: "display busy".to_string(),
        }
    );
    assert!(!session.is_pad_open());
    assert_eq!(simulator.handle().command_count("close_pad"), 1);
}

#[tokio::test]
async fn test_error_event_rejects_signature() {
    let (simulator, session) = start(PadSimulator::new()).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();

    let (task, _progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    pad_control.raise_error("signature", -45, "pen sensor failure");

    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    match result {
        Err(TransportError::Protocol {
            context,
            code,
            description,
        }) => {
            assert_eq!(context, "signature");
            assert_eq!(code, -45);
            assert_eq!(description, "pen sensor failure");
        }
        other => panic!("Expected protocol error, got {:?}", other),
    }
    assert!(!session.is_pad_open());
}

#[tokio::test]
async fn test_close_pad_aborts_signature() {
    let (simulator, session) = start(PadSimulator::new()).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();

    let (task, _progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    session.close_pad().await;

    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(result.unwrap_err(), TransportError::Cancelled);
    assert!(!pad_control.is_pad_open());

    // the pad can be opened again right away
    let _pad = session.open_pad(0).await.unwrap();
}

#[tokio::test]
async fn test_server_disconnect_during_signature() {
    let (simulator, session) = start(PadSimulator::new()).await;
    let pad_control = simulator.handle();
    session.connect().await.unwrap();
    let pad = session.open_pad(0).await.unwrap();

    let (task, _progress) = spawn_signature(&session, pad);
    assert!(pad_control.wait_for_command("start_signature", 1).await);

    pad_control.disconnect_clients();

    let result = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    let err = result.unwrap_err();
    assert!(
        matches!(err, TransportError::Disconnected | TransportError::Cancelled),
        "unexpected error: {:?}",
        err
    );
    assert!(!session.is_connected());
    assert!(!session.is_pad_open());

    // reconnecting works after the loss
    session.connect().await.unwrap();
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_stale_handle_is_rejected() {
    let (_simulator, session) = start(PadSimulator::new()).await;
    session.connect().await.unwrap();

    let stale = session.open_pad(0).await.unwrap();
    session.close_pad().await;
    let _current = session.open_pad(0).await.unwrap();

    let err = session
        .start_signature(stale, request(), |_| {})
        .await
        .unwrap_err();
    assert_eq!(err, TransportError::PadNotOpen);
    assert!(session.is_pad_open());
}

#[tokio::test]
async fn test_close_by_stale_handle_keeps_newer_pad() {
    let (simulator, session) = start(PadSimulator::new()).await;
    session.connect().await.unwrap();

    let stale = session.open_pad(0).await.unwrap();
    session.close_pad().await;
    let current = session.open_pad(0).await.unwrap();

    session.close_pad_handle(stale).await;
    assert!(session.is_pad_open());
    assert!(simulator.handle().is_pad_open());
    assert_eq!(simulator.handle().command_count("close_pad"), 1);

    session.close_pad_handle(current).await;
    assert!(!session.is_pad_open());
    assert_eq!(simulator.handle().command_count("close_pad"), 2);
}
