//! Producer thread: owns the session, adjusts and encodes frames, and
//! publishes them into the [`FrameSlot`](super::slot::FrameSlot).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use super::PreviewState;
use crate::adjust::adjust;
use crate::config::NightControls;
use crate::error::{CameraError, Result};
use crate::session::Session;
use crate::writer::encode_jpeg;

/// Producer settings copied out of the capture configuration.
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// JPEG quality of published frames.
    pub quality: u8,
    /// Driver controls applied while night mode is on.
    pub night_controls: NightControls,
    /// Consecutive read failures tolerated before the producer stops.
    pub max_read_failures: u32,
    /// Pause after a failed read.
    pub retry_delay: Duration,
}

/// Frames per second over a sliding one-second window.
#[derive(Debug)]
struct FpsMeter {
    window_start: Instant,
    frames: u32,
}

impl FpsMeter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    /// Count a frame; returns a fresh rate once per window.
    fn tick(&mut self) -> Option<f32> {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.window_start = Instant::now();
        Some(fps)
    }
}

/// Start the producer.
///
/// `open` runs on the producer thread, so the session never crosses
/// threads. Returns once the session is open, or with the open error.
pub fn spawn<F>(
    open: F,
    settings: ProducerSettings,
    state: Arc<PreviewState>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>>
where
    F: FnOnce() -> Result<Session> + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
    let handle = thread::Builder::new()
        .name("preview-producer".into())
        .spawn(move || {
            let session = match open() {
                Ok(session) => {
                    let _ = ready_tx.send(Ok(()));
                    session
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            produce(session, &settings, &state, &shutdown);
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err)
        }
        Err(_) => {
            let _ = handle.join();
            Err(CameraError::ReadFailure(
                "preview producer exited before opening the device".to_owned(),
            ))
        }
    }
}

fn produce(
    mut session: Session,
    settings: &ProducerSettings,
    state: &PreviewState,
    shutdown: &AtomicBool,
) {
    info!("preview producer started on {}", session.label());
    let mut meter = FpsMeter::new();
    let mut consecutive_failures = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        let adjustment = state.params.effective();
        if adjustment.night_mode != session.night_active() {
            session.set_night_controls(adjustment.night_mode, &settings.night_controls);
        }

        let frame = match session.read() {
            Ok(frame) => {
                consecutive_failures = 0;
                frame
            }
            Err(err) => {
                consecutive_failures += 1;
                if err.is_fatal() || consecutive_failures >= settings.max_read_failures {
                    error!("preview producer stopping: {err}");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
                warn!("failed to grab frame: {err}");
                thread::sleep(settings.retry_delay);
                continue;
            }
        };

        let adjusted = adjust(&frame, &adjustment);
        match encode_jpeg(&adjusted, settings.quality) {
            Ok(jpeg) => {
                let sequence = state.slot.publish(jpeg);
                if let Some(fps) = meter.tick() {
                    state.set_fps(fps);
                    debug!("preview frame {sequence}, {fps:.1} fps");
                }
            }
            Err(err) => warn!("failed to encode preview frame: {err}"),
        }
    }

    session.close();
    state.slot.close();
    info!("preview producer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::mock::{MockDevice, MockRecorder};
    use crate::traits::CameraControl;

    fn settings() -> ProducerSettings {
        ProducerSettings {
            quality: 80,
            night_controls: NightControls::default(),
            max_read_failures: 3,
            retry_delay: Duration::ZERO,
        }
    }

    fn opener(device: MockDevice) -> impl FnOnce() -> Result<Session> + Send + 'static {
        move || {
            let config = CaptureConfig {
                width: 64,
                height: 48,
                ..CaptureConfig::default()
            };
            Session::with_device(Box::new(device), "mock".to_owned(), &config)
        }
    }

    fn state(dir: &std::path::Path) -> Arc<PreviewState> {
        Arc::new(PreviewState::new(dir.to_path_buf()))
    }

    #[test]
    fn test_producer_publishes_until_shutdown() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = state(tmp.path());
        let shutdown = Arc::new(AtomicBool::new(false));
        let recorder = MockRecorder::default();
        let device = MockDevice::new().with_recorder(recorder.clone());

        let handle = spawn(
            opener(device),
            settings(),
            Arc::clone(&state),
            Arc::clone(&shutdown),
        )
        .expect("producer starts");

        let frame = state
            .slot
            .wait_newer(0, Duration::from_secs(5))
            .expect("a frame is published");
        assert_eq!(frame.jpeg.get(..2), Some(&[0xff, 0xd8][..]));

        shutdown.store(true, Ordering::Relaxed);
        handle.join().expect("producer thread");
        assert!(state.slot.is_closed());
        assert_eq!(recorder.releases(), 1);
    }

    #[test]
    fn test_producer_follows_night_mode() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = state(tmp.path());
        state.params.set_night_mode(true);
        let shutdown = Arc::new(AtomicBool::new(false));
        let recorder = MockRecorder::default();
        let device = MockDevice::new().with_recorder(recorder.clone());

        let handle = spawn(
            opener(device),
            settings(),
            Arc::clone(&state),
            Arc::clone(&shutdown),
        )
        .expect("producer starts");

        let frame = state
            .slot
            .wait_newer(0, Duration::from_secs(5))
            .expect("a frame is published");
        let decoded = image::load_from_memory(&frame.jpeg).expect("valid JPEG");
        assert_eq!(decoded.color(), image::ColorType::L8);

        shutdown.store(true, Ordering::Relaxed);
        handle.join().expect("producer thread");
        assert!(recorder
            .controls()
            .contains(&(CameraControl::ExposureAuto, CameraControl::EXPOSURE_MANUAL)));
    }

    #[test]
    fn test_open_failure_is_returned() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let result = spawn(
            opener(MockDevice::new().without_capture()),
            settings(),
            state(tmp.path()),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(matches!(result, Err(CameraError::DeviceUnavailable { .. })));
    }

    #[test]
    fn test_disconnect_stops_producer() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let state = state(tmp.path());
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = spawn(
            opener(MockDevice::new().disconnect_after(2)),
            settings(),
            Arc::clone(&state),
            Arc::clone(&shutdown),
        )
        .expect("producer starts");

        handle.join().expect("producer thread");
        assert!(shutdown.load(Ordering::Relaxed));
        assert_eq!(state.slot.published(), 2);
    }

    #[test]
    fn test_fps_meter_waits_for_full_window() {
        let mut meter = FpsMeter::new();
        assert!(meter.tick().is_none());
        meter.window_start = Instant::now()
            .checked_sub(Duration::from_secs(2))
            .expect("clock is past two seconds");
        let fps = meter.tick().expect("window elapsed");
        assert!((0.5..=1.5).contains(&fps));
    }
}
