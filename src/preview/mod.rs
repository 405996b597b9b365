//! Live preview over HTTP.
//!
//! One producer thread owns the capture session and publishes encoded
//! frames into a [`FrameSlot`]. Every request is served on its own thread;
//! stream consumers wait on the slot for a newer frame.

pub mod page;
pub mod producer;
pub mod routes;
pub mod slot;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::config::CaptureConfig;
use crate::error::{CameraError, Result};
use crate::params::ParameterStore;
use crate::session::Session;
use producer::ProducerSettings;
use routes::{Reply, Verb, MAX_BODY_BYTES};
pub use slot::{EncodedFrame, FrameSlot};

/// Multipart boundary of `/video_feed`.
pub const BOUNDARY: &str = "frame";

/// How often the accept loop checks the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// State shared by the producer and every request handler.
#[derive(Debug)]
pub struct PreviewState {
    /// Live adjustment parameters.
    pub params: ParameterStore,
    /// Latest encoded frame.
    pub slot: FrameSlot,
    fps_bits: AtomicU32,
    output_dir: PathBuf,
}

impl PreviewState {
    /// Fresh state with identity parameters; snapshots go to `output_dir`.
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            params: ParameterStore::default(),
            slot: FrameSlot::new(),
            fps_bits: AtomicU32::new(0),
            output_dir,
        }
    }

    /// Most recently measured producer frame rate.
    pub fn fps(&self) -> f32 {
        f32::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }

    fn set_fps(&self, fps: f32) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    /// Snapshot directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// `multipart/x-mixed-replace` body that yields each newly published frame.
pub struct MjpegBody {
    state: Arc<PreviewState>,
    last_sequence: u64,
    part: Vec<u8>,
    offset: usize,
}

impl MjpegBody {
    /// Stream frames published after this call.
    pub fn new(state: Arc<PreviewState>) -> Self {
        let last_sequence = state.slot.latest().map_or(0, |frame| frame.sequence - 1);
        Self {
            state,
            last_sequence,
            part: Vec::new(),
            offset: 0,
        }
    }

    fn next_part(&mut self) -> bool {
        loop {
            if let Some(frame) = self.state.slot.wait_newer(self.last_sequence, POLL_INTERVAL) {
                self.last_sequence = frame.sequence;
                self.part.clear();
                self.part.extend_from_slice(
                    format!(
                        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                        frame.jpeg.len()
                    )
                    .as_bytes(),
                );
                self.part.extend_from_slice(&frame.jpeg);
                self.part.extend_from_slice(b"\r\n");
                self.offset = 0;
                return true;
            }
            if self.state.slot.is_closed() {
                return false;
            }
        }
    }
}

impl Read for MjpegBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.part.len() && !self.next_part() {
            return Ok(0);
        }
        let remaining = self.part.get(self.offset..).unwrap_or_default();
        let n = remaining.len().min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), remaining.get(..n)) {
            dst.copy_from_slice(src);
        }
        self.offset += n;
        Ok(n)
    }
}

/// Serve the preview until `shutdown` is set or the producer stops.
pub fn serve(config: &CaptureConfig, bind: &str, shutdown: &Arc<AtomicBool>) -> Result<()> {
    config.validate()?;
    let server = Server::http(bind).map_err(|err| {
        CameraError::Io(io::Error::other(format!("cannot listen on {bind}: {err}")))
    })?;
    info!("preview available at http://{bind}/");

    let open_config = config.clone();
    serve_on(
        server,
        config,
        move || {
            let mut session = Session::open(&open_config)?;
            session.warm_up(
                open_config.settle_delay,
                open_config.warmup_frames,
                open_config.warmup_delay,
            );
            Ok(session)
        },
        shutdown,
    )
}

/// Run the preview on an already bound `server`, with the camera opened by
/// `open` on the producer thread.
pub fn serve_on<F>(
    server: Server,
    config: &CaptureConfig,
    open: F,
    shutdown: &Arc<AtomicBool>,
) -> Result<()>
where
    F: FnOnce() -> Result<Session> + Send + 'static,
{
    let state = Arc::new(PreviewState::new(config.output_dir.clone()));
    state.params.set_night_mode(config.adjustment.night_mode);

    let settings = ProducerSettings {
        quality: config.jpeg_quality,
        night_controls: config.night_controls,
        max_read_failures: config.max_read_failures,
        retry_delay: config.retry_delay,
    };
    let producer = producer::spawn(open, settings, Arc::clone(&state), Arc::clone(shutdown))?;

    while !shutdown.load(Ordering::Relaxed) {
        match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => {
                let state = Arc::clone(&state);
                if let Err(err) = thread::Builder::new()
                    .name("preview-request".into())
                    .spawn(move || respond(&state, request))
                {
                    warn!("cannot spawn request thread: {err}");
                }
            }
            Ok(None) => {}
            Err(err) => warn!("accept failed: {err}"),
        }
    }

    info!("stopping preview server");
    state.slot.close();
    let _ = producer.join();
    Ok(())
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn typed<R: Read>(mut response: Response<R>, content_type: &str) -> Response<R> {
    if let Some(header) = header("Content-Type", content_type) {
        response.add_header(header);
    }
    response
}

fn respond(state: &Arc<PreviewState>, mut request: Request) {
    let verb = match request.method() {
        Method::Get | Method::Head => Verb::Get,
        Method::Post => Verb::Post,
        _ => Verb::Other,
    };
    let mut body = Vec::new();
    if let Err(err) = request
        .as_reader()
        .take(MAX_BODY_BYTES)
        .read_to_end(&mut body)
    {
        debug!("failed to read request body: {err}");
    }
    let url = request.url().to_owned();
    debug!("{:?} {url}", request.method());

    let result = match routes::handle(state, verb, &url, &body) {
        Reply::Html(page) => request.respond(typed(
            Response::from_string(page),
            "text/html; charset=utf-8",
        )),
        Reply::Json(status, text) => request.respond(typed(
            Response::from_string(text).with_status_code(status),
            "application/json",
        )),
        Reply::Jpeg(frame) => request.respond(typed(
            Response::from_data(frame.jpeg.clone()),
            "image/jpeg",
        )),
        Reply::Empty(status) => request.respond(Response::empty(status)),
        Reply::MjpegStream => {
            let headers = [
                header(
                    "Content-Type",
                    &format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
                ),
                header("Cache-Control", "no-cache"),
            ]
            .into_iter()
            .flatten()
            .collect();
            request.respond(Response::new(
                StatusCode(200),
                headers,
                MjpegBody::new(Arc::clone(state)),
                None,
                None,
            ))
        }
    };
    if let Err(err) = result {
        debug!("{url}: client went away: {err}");
    }
}
