//! Request routing for the preview server, independent of the HTTP library.

use std::str::FromStr;
use std::sync::Arc;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::page::INDEX_HTML;
use super::slot::EncodedFrame;
use super::PreviewState;
use crate::config::Adjustment;
use crate::writer::write_encoded;

/// Largest request body the API reads.
pub const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Request method, as far as routing cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `GET` (and `HEAD`).
    Get,
    /// `POST`.
    Post,
    /// Anything else.
    Other,
}

/// What to send back.
#[derive(Debug)]
pub enum Reply {
    /// The control page.
    Html(&'static str),
    /// JSON body with a status code.
    Json(u16, String),
    /// One JPEG image.
    Jpeg(Arc<EncodedFrame>),
    /// Endless multipart MJPEG stream.
    MjpegStream,
    /// Status code without a body.
    Empty(u16),
}

#[derive(Debug, Serialize)]
struct StateBody {
    brightness: i32,
    contrast: f32,
    night_mode: bool,
    fps: f32,
    frames: u64,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct CaptureBody {
    path: String,
}

fn json<T: Serialize>(status: u16, body: &T) -> Reply {
    match serde_json::to_string(body) {
        Ok(text) => Reply::Json(status, text),
        Err(_) => Reply::Empty(500),
    }
}

fn bad_request(message: &str) -> Reply {
    json(400, &ErrorBody { error: message })
}

fn state_reply(state: &PreviewState, adjustment: Adjustment) -> Reply {
    json(
        200,
        &StateBody {
            brightness: adjustment.brightness,
            contrast: adjustment.contrast,
            night_mode: adjustment.night_mode,
            fps: state.fps(),
            frames: state.slot.published(),
        },
    )
}

/// Route one request.
pub fn handle(state: &PreviewState, verb: Verb, url: &str, body: &[u8]) -> Reply {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));

    match (verb, path) {
        (Verb::Get, "/") => Reply::Html(INDEX_HTML),
        (Verb::Get, "/video_feed") => Reply::MjpegStream,
        (Verb::Get, "/frame.jpg") => state.slot.latest().map_or(Reply::Empty(204), Reply::Jpeg),
        (Verb::Get, "/api/state") => state_reply(state, state.params.snapshot()),
        (Verb::Post, "/api/brightness") => match parameter::<i32>(body, query, "value") {
            Ok(value) => match state.params.set_brightness(value) {
                Ok(adjustment) => state_reply(state, adjustment),
                Err(err) => bad_request(&err.to_string()),
            },
            Err(message) => bad_request(&message),
        },
        (Verb::Post, "/api/contrast") => match parameter::<f32>(body, query, "value") {
            Ok(value) => match state.params.set_contrast(value) {
                Ok(adjustment) => state_reply(state, adjustment),
                Err(err) => bad_request(&err.to_string()),
            },
            Err(message) => bad_request(&message),
        },
        (Verb::Post, "/api/night_mode") => match parameter::<bool>(body, query, "enabled") {
            Ok(enabled) => {
                info!("night mode {}", if enabled { "on" } else { "off" });
                let adjustment = state.params.set_night_mode(enabled);
                state_reply(state, adjustment)
            }
            Err(message) => bad_request(&message),
        },
        (Verb::Post, "/api/capture") => capture(state),
        (
            _,
            "/" | "/video_feed" | "/frame.jpg" | "/api/state" | "/api/brightness"
            | "/api/contrast" | "/api/night_mode" | "/api/capture",
        ) => Reply::Empty(405),
        _ => Reply::Empty(404),
    }
}

fn capture(state: &PreviewState) -> Reply {
    let Some(frame) = state.slot.latest() else {
        return json(
            503,
            &ErrorBody {
                error: "no frame available yet",
            },
        );
    };
    match write_encoded(state.output_dir(), &frame.jpeg) {
        Ok(path) => {
            info!("saved snapshot {}", path.display());
            json(
                200,
                &CaptureBody {
                    path: path.display().to_string(),
                },
            )
        }
        Err(err) => {
            warn!("snapshot failed: {err}");
            json(
                500,
                &ErrorBody {
                    error: &err.to_string(),
                },
            )
        }
    }
}

/// Read `key` from a JSON object body, falling back to the query string.
fn parameter<T>(body: &[u8], query: &str, key: &str) -> std::result::Result<T, String>
where
    T: DeserializeOwned + FromStr,
{
    if !body.iter().all(u8::is_ascii_whitespace) {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|err| format!("invalid JSON body: {err}"))?;
        if let Some(field) = value.get(key) {
            return serde_json::from_value(field.clone())
                .map_err(|err| format!("invalid `{key}`: {err}"));
        }
    }

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == key)
        .ok_or_else(|| format!("missing `{key}`"))
        .and_then(|(_, raw)| {
            raw.parse::<T>()
                .map_err(|_| format!("invalid `{key}`: {raw}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (tempfile::TempDir, PreviewState) {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = PreviewState::new(tmp.path().join("snapshots"));
        (tmp, state)
    }

    fn json_body(reply: Reply) -> (u16, serde_json::Value) {
        let Reply::Json(status, text) = reply else {
            return (0, serde_json::Value::Null);
        };
        (status, serde_json::from_str(&text).expect("valid JSON"))
    }

    #[test]
    fn test_index_and_stream_routes() {
        let (_tmp, state) = state();
        assert!(matches!(handle(&state, Verb::Get, "/", b""), Reply::Html(_)));
        assert!(matches!(
            handle(&state, Verb::Get, "/video_feed", b""),
            Reply::MjpegStream
        ));
        assert!(matches!(
            handle(&state, Verb::Get, "/nope", b""),
            Reply::Empty(404)
        ));
        assert!(matches!(
            handle(&state, Verb::Get, "/api/capture", b""),
            Reply::Empty(405)
        ));
    }

    #[test]
    fn test_frame_jpg_before_and_after_publish() {
        let (_tmp, state) = state();
        assert!(matches!(
            handle(&state, Verb::Get, "/frame.jpg", b""),
            Reply::Empty(204)
        ));
        state.slot.publish(vec![0xff, 0xd8, 0xff, 0xd9]);
        assert!(matches!(
            handle(&state, Verb::Get, "/frame.jpg", b""),
            Reply::Jpeg(frame) if frame.sequence == 1
        ));
    }

    #[test]
    fn test_state_reports_parameters() {
        let (_tmp, state) = state();
        let (status, body) = json_body(handle(&state, Verb::Get, "/api/state", b""));
        assert_eq!(status, 200);
        assert_eq!(body["brightness"], 0);
        assert_eq!(body["contrast"], 1.0);
        assert_eq!(body["night_mode"], false);
        assert_eq!(body["frames"], 0);
    }

    #[test]
    fn test_brightness_from_json_and_query() {
        let (_tmp, state) = state();
        let (status, body) = json_body(handle(
            &state,
            Verb::Post,
            "/api/brightness",
            br#"{"value": -20}"#,
        ));
        assert_eq!(status, 200);
        assert_eq!(body["brightness"], -20);

        let (status, _) = json_body(handle(&state, Verb::Post, "/api/brightness?value=15", b""));
        assert_eq!(status, 200);
        assert_eq!(state.params.snapshot().brightness, 15);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let (_tmp, state) = state();
        let (status, _) = json_body(handle(
            &state,
            Verb::Post,
            "/api/brightness",
            br#"{"value": 75}"#,
        ));
        assert_eq!(status, 400);
        let (status, _) = json_body(handle(&state, Verb::Post, "/api/contrast?value=3.0", b""));
        assert_eq!(status, 400);
        assert_eq!(state.params.snapshot(), Adjustment::IDENTITY);
    }

    #[test]
    fn test_malformed_parameters_are_rejected() {
        let (_tmp, state) = state();
        for (url, body) in [
            ("/api/contrast", &b"{not json"[..]),
            ("/api/contrast", &br#"{"value": "high"}"#[..]),
            ("/api/contrast", &b""[..]),
            ("/api/night_mode?enabled=maybe", &b""[..]),
        ] {
            let (status, body) = json_body(handle(&state, Verb::Post, url, body));
            assert_eq!(status, 400, "{url}");
            assert!(body["error"].is_string());
        }
    }

    #[test]
    fn test_night_mode_toggle() {
        let (_tmp, state) = state();
        let (status, body) = json_body(handle(
            &state,
            Verb::Post,
            "/api/night_mode",
            br#"{"enabled": true}"#,
        ));
        assert_eq!(status, 200);
        assert_eq!(body["night_mode"], true);
        assert_eq!(state.params.effective(), Adjustment::NIGHT_PRESET);
    }

    #[test]
    fn test_capture_writes_next_free_file() {
        let (tmp, state) = state();
        let (status, _) = json_body(handle(&state, Verb::Post, "/api/capture", b""));
        assert_eq!(status, 503);

        state.slot.publish(vec![0xff, 0xd8, 0xff, 0xd9]);
        let (status, body) = json_body(handle(&state, Verb::Post, "/api/capture", b""));
        assert_eq!(status, 200);
        let path = body["path"].as_str().expect("path string");
        assert!(path.ends_with("frame_0000.jpg"));

        handle(&state, Verb::Post, "/api/capture", b"");
        assert!(tmp.path().join("snapshots").join("frame_0001.jpg").exists());
    }
}
