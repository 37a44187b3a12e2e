//! Ingress message parsing and routing.
//!
//! One handler per message type. Gaze and distance messages are
//! fire-and-forget streams (no response); control commands get an
//! `ok`/`error` response. Malformed payloads are logged, answered with a
//! typed error, and dropped; the pipeline keeps running.

use std::time::Duration;

use calloop::timer::{TimeoutAction, Timer};
use serde::Deserialize;
use tracing::{error, warn};

use crate::pipeline::filter::GazeSample;
use crate::state::DaemonState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Ingress {
    /// One gaze sample, raw or pre-normalized.
    Gaze(GazeIngress),
    /// One face-distance reading (centimeters).
    Distance { distance: f64 },
    StartCalibration,
    EnableTracking,
    DisableTracking,
    Status,
}

/// Wire form of a gaze sample. Upstream producers send either raw pupil
/// coordinates with the eye bounding box, or pre-normalized coordinates.
#[derive(Debug, Deserialize)]
struct GazeIngress {
    #[serde(default)]
    nx: Option<f64>,
    #[serde(default)]
    ny: Option<f64>,
    #[serde(default)]
    px: Option<f64>,
    #[serde(default)]
    py: Option<f64>,
    #[serde(default)]
    eye_w: Option<f64>,
    #[serde(default)]
    eye_h: Option<f64>,
    confidence: f64,
}

impl GazeIngress {
    /// Adapt either wire form to the normalized record the core accepts.
    /// Raw form requires a non-zero eye box.
    fn into_sample(self) -> Option<GazeSample> {
        if let (Some(nx), Some(ny)) = (self.nx, self.ny) {
            return Some(GazeSample {
                nx,
                ny,
                confidence: self.confidence,
            });
        }
        match (self.px, self.py, self.eye_w, self.eye_h) {
            (Some(px), Some(py), Some(w), Some(h)) if w != 0.0 && h != 0.0 => Some(GazeSample {
                nx: px / w,
                ny: py / h,
                confidence: self.confidence,
            }),
            _ => None,
        }
    }
}

/// Parse one JSON message and route it. Returns an optional response
/// payload for the sending client.
pub fn handle_message(state: &mut DaemonState, client_id: u64, raw: &str) -> Option<String> {
    let msg = match serde_json::from_str::<Ingress>(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(client_id, "malformed ingress message: {}", e);
            return Some(error_response(&format!("malformed message: {e}")));
        }
    };

    match msg {
        Ingress::Gaze(gaze) => {
            match gaze.into_sample() {
                Some(sample) => {
                    if let Some(event) = state.pipeline.process_gaze(sample) {
                        state.ipc.broadcast(&event);
                    }
                }
                None => warn!(client_id, "gaze message missing coordinate fields"),
            }
            None
        }
        Ingress::Distance { distance } => {
            for event in state.pipeline.process_distance(distance) {
                state.ipc.broadcast(&event);
            }
            None
        }
        Ingress::StartCalibration => {
            let now = state.clock.now_ms();
            let event = state.pipeline.start_calibration(now);
            state.ipc.broadcast(&event);
            arm_dwell_timer(state);
            Some(ok_response())
        }
        Ingress::EnableTracking => {
            state.pipeline.enable_tracking();
            Some(ok_response())
        }
        Ingress::DisableTracking => {
            for event in state.pipeline.disable_tracking() {
                state.ipc.broadcast(&event);
            }
            Some(ok_response())
        }
        Ingress::Status => {
            let mut value = match serde_json::to_value(state.pipeline.status()) {
                Ok(v) => v,
                Err(e) => {
                    error!("status serialization failed: {}", e);
                    return Some(error_response("internal error"));
                }
            };
            value["type"] = serde_json::Value::from("status");
            Some(value.to_string())
        }
    }
}

/// Arm a repeating dwell timer for the session that was just started.
///
/// The timer captures the session generation; if a later `start` replaced
/// the session, the orphaned timer notices the mismatch and drops itself
/// instead of racing the new run's dataset.
fn arm_dwell_timer(state: &mut DaemonState) {
    let generation = state.pipeline.session.generation();
    let dwell = Duration::from_millis(state.pipeline.session.config.dwell_ms.max(0) as u64);

    let timer = Timer::from_duration(dwell);
    let result = state
        .loop_handle
        .insert_source(timer, move |_deadline, _: &mut (), state| {
            if state.pipeline.session.generation() != generation {
                return TimeoutAction::Drop;
            }
            let now = state.clock.now_ms();
            if let Some(event) = state.pipeline.poll_calibration(now) {
                state.ipc.broadcast(&event);
            }
            if state.pipeline.session.is_active() {
                TimeoutAction::ToDuration(dwell)
            } else {
                TimeoutAction::Drop
            }
        });
    if let Err(e) = result {
        error!("failed to arm calibration timer: {}", e);
        state.pipeline.session.cancel();
    }
}

fn ok_response() -> String {
    r#"{"type":"ok"}"#.to_string()
}

fn error_response(reason: &str) -> String {
    serde_json::json!({ "type": "error", "reason": reason }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::ipc::IpcServer;
    use crate::pipeline::PipelineConfig;
    use calloop::EventLoop;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn test_state(event_loop: &EventLoop<'static, DaemonState>) -> DaemonState {
        DaemonState::new(
            PipelineConfig::default(),
            Arc::new(TestClock::new()),
            IpcServer::new(PathBuf::from("/tmp/gazed-test.sock")),
            event_loop.handle(),
        )
    }

    #[test]
    fn test_parse_normalized_gaze() {
        let msg: Ingress =
            serde_json::from_str(r#"{"type":"gaze","nx":0.4,"ny":0.6,"confidence":0.9}"#).unwrap();
        match msg {
            Ingress::Gaze(g) => {
                let sample = g.into_sample().unwrap();
                assert_eq!(sample.nx, 0.4);
                assert_eq!(sample.ny, 0.6);
                assert_eq!(sample.confidence, 0.9);
            }
            other => panic!("expected gaze, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_raw_gaze_normalizes() {
        let msg: Ingress = serde_json::from_str(
            r#"{"type":"gaze","px":30.0,"py":9.0,"eye_w":60.0,"eye_h":36.0,"confidence":1.0}"#,
        )
        .unwrap();
        match msg {
            Ingress::Gaze(g) => {
                let sample = g.into_sample().unwrap();
                assert_eq!(sample.nx, 0.5);
                assert_eq!(sample.ny, 0.25);
            }
            other => panic!("expected gaze, got {other:?}"),
        }
    }

    #[test]
    fn test_gaze_without_coordinates_rejected() {
        let msg: Ingress =
            serde_json::from_str(r#"{"type":"gaze","confidence":1.0}"#).unwrap();
        match msg {
            Ingress::Gaze(g) => assert!(g.into_sample().is_none()),
            other => panic!("expected gaze, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_eye_box_rejected() {
        let msg: Ingress = serde_json::from_str(
            r#"{"type":"gaze","px":30.0,"py":9.0,"eye_w":0.0,"eye_h":36.0,"confidence":1.0}"#,
        )
        .unwrap();
        match msg {
            Ingress::Gaze(g) => assert!(g.into_sample().is_none()),
            other => panic!("expected gaze, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_message_gets_error_response() {
        let event_loop: EventLoop<'static, DaemonState> = EventLoop::try_new().unwrap();
        let mut state = test_state(&event_loop);
        let resp = handle_message(&mut state, 1, "not json").unwrap();
        assert!(resp.contains(r#""type":"error""#));

        let resp = handle_message(&mut state, 1, r#"{"type":"unknown-verb"}"#).unwrap();
        assert!(resp.contains(r#""type":"error""#));
    }

    #[test]
    fn test_tracking_commands() {
        let event_loop: EventLoop<'static, DaemonState> = EventLoop::try_new().unwrap();
        let mut state = test_state(&event_loop);

        let resp = handle_message(&mut state, 1, r#"{"type":"disable-tracking"}"#).unwrap();
        assert_eq!(resp, r#"{"type":"ok"}"#);
        assert!(!state.pipeline.tracking());

        let resp = handle_message(&mut state, 1, r#"{"type":"enable-tracking"}"#).unwrap();
        assert_eq!(resp, r#"{"type":"ok"}"#);
        assert!(state.pipeline.tracking());
    }

    #[test]
    fn test_start_calibration_activates_session() {
        let event_loop: EventLoop<'static, DaemonState> = EventLoop::try_new().unwrap();
        let mut state = test_state(&event_loop);

        let resp = handle_message(&mut state, 1, r#"{"type":"start-calibration"}"#).unwrap();
        assert_eq!(resp, r#"{"type":"ok"}"#);
        assert!(state.pipeline.session.is_active());
    }

    #[test]
    fn test_status_response_shape() {
        let event_loop: EventLoop<'static, DaemonState> = EventLoop::try_new().unwrap();
        let mut state = test_state(&event_loop);

        let resp = handle_message(&mut state, 1, r#"{"type":"status"}"#).unwrap();
        let value: serde_json::Value = serde_json::from_str(&resp).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["tracking"], true);
        assert_eq!(value["calibrated"], false);
    }

    #[test]
    fn test_gaze_message_produces_no_response() {
        let event_loop: EventLoop<'static, DaemonState> = EventLoop::try_new().unwrap();
        let mut state = test_state(&event_loop);

        let resp = handle_message(
            &mut state,
            1,
            r#"{"type":"gaze","nx":0.5,"ny":0.5,"confidence":1.0}"#,
        );
        assert_eq!(resp, None);
    }
}
