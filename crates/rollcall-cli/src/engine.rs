use rollcall_core::detector::DetectorError;
use rollcall_core::lbph::LbphError;
use rollcall_core::{DetectorOptions, FaceBox, FaceDetect, FaceDetector, Region};
use rollcall_hw::{Camera, CameraError, Frame, FrameSource};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

/// Give up after this many capture errors in a row.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;
const EVENT_CAPACITY: usize = 32;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] LbphError),
    #[error("failed to save sample {path}: {source}")]
    SaveSample {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("preview window failed: {0}")]
    Preview(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// How a face is drawn in the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkKind {
    /// Crop saved as a training sample.
    Sample,
    Known(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceMark {
    pub region: Region,
    pub kind: MarkKind,
}

/// A frame plus the faces found in it, for display.
pub struct PreviewFrame {
    pub frame: Frame,
    pub marks: Vec<FaceMark>,
}

/// Messages from the engine thread to whoever is watching the session.
pub enum SessionEvent {
    Frame(PreviewFrame),
    SampleSaved { sequence: u32, path: PathBuf },
    Recognized { id: u32, name: String, timestamp: String },
}

/// What a job wants done after looking at one frame.
#[derive(Default)]
pub struct FrameReport {
    pub marks: Vec<FaceMark>,
    pub events: Vec<SessionEvent>,
    /// End the session after this frame.
    pub done: bool,
}

/// Per-frame work of a capture or tracking session.
pub trait SessionJob: Send + 'static {
    type Outcome: Send + 'static;

    fn on_frame(&mut self, frame: &Frame, faces: &[FaceBox]) -> Result<FrameReport, EngineError>;

    fn finish(self) -> Self::Outcome;
}

/// How a session ended.
///
/// The job's outcome is always returned, so work done before a failure
/// (saved samples, buffered attendance) is never lost.
#[derive(Debug)]
pub struct SessionEnd<O> {
    pub outcome: O,
    /// The error that cut the session short, if any.
    pub error: Option<EngineError>,
}

/// Everything the engine thread needs besides the job.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub camera_device: String,
    pub detector_path: PathBuf,
    pub warmup_frames: usize,
    pub frame_delay: Duration,
}

/// Caller's side of a running session.
pub struct SessionHandle<O> {
    /// Send `true` to end the session.
    pub stop: watch::Sender<bool>,
    pub events: mpsc::Receiver<SessionEvent>,
    pub outcome: oneshot::Receiver<SessionEnd<O>>,
}

/// Spawn a session on a dedicated OS thread.
///
/// The detector model and the camera are opened here, before the thread
/// starts, so a missing model or camera fails the command immediately.
pub fn spawn_session<J: SessionJob>(
    settings: &EngineSettings,
    job: J,
) -> Result<SessionHandle<J::Outcome>, EngineError> {
    let mut detector = FaceDetector::load(&settings.detector_path, DetectorOptions::default())?;

    let camera = Camera::open(&settings.camera_device)?;
    tracing::info!(
        device = %settings.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
    let (reply_tx, reply_rx) = oneshot::channel();
    let warmup = settings.warmup_frames;
    let delay = settings.frame_delay;

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let end = match camera.stream() {
                Ok(mut stream) => {
                    if warmup > 0 {
                        tracing::info!(count = warmup, "discarding warmup frames");
                        stream.warm_up(warmup);
                    }
                    run_session(&mut stream, &mut detector, job, &stop_rx, &event_tx, delay)
                }
                Err(e) => SessionEnd {
                    outcome: job.finish(),
                    error: Some(e.into()),
                },
            };
            if let Some(e) = &end.error {
                tracing::error!(error = %e, "session failed");
            }
            let _ = reply_tx.send(end);
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(SessionHandle {
        stop: stop_tx,
        events: event_rx,
        outcome: reply_rx,
    })
}

/// Frame loop shared by every session: capture, detect, hand to the job.
///
/// Runs until the job reports `done` or `stop` turns true. A failed capture
/// or detection skips the frame; after `MAX_CONSECUTIVE_FAILURES` in a row,
/// or on a job error, the session ends with that error.
pub fn run_session<S, D, J>(
    source: &mut S,
    detector: &mut D,
    mut job: J,
    stop: &watch::Receiver<bool>,
    events: &mpsc::Sender<SessionEvent>,
    frame_delay: Duration,
) -> SessionEnd<J::Outcome>
where
    S: FrameSource,
    D: FaceDetect,
    J: SessionJob,
{
    let mut failures = 0u32;
    let mut error = None;

    while !*stop.borrow() {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                failures += 1;
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    error = Some(e.into());
                    break;
                }
                tracing::warn!(error = %e, failures, "frame capture failed");
                continue;
            }
        };

        let faces = if frame.is_dark {
            tracing::debug!(seq = frame.sequence, "dark frame, skipping detection");
            Vec::new()
        } else {
            match detector.detect(&frame.data, frame.width, frame.height) {
                Ok(faces) => faces,
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        error = Some(e.into());
                        break;
                    }
                    tracing::warn!(error = %e, seq = frame.sequence, failures, "detection failed");
                    continue;
                }
            }
        };
        failures = 0;

        let report = match job.on_frame(&frame, &faces) {
            Ok(report) => report,
            Err(e) => {
                error = Some(e);
                break;
            }
        };
        for event in report.events {
            notify(events, event);
        }
        notify(
            events,
            SessionEvent::Frame(PreviewFrame {
                frame,
                marks: report.marks,
            }),
        );

        if report.done {
            break;
        }
        if !frame_delay.is_zero() {
            std::thread::sleep(frame_delay);
        }
    }

    SessionEnd {
        outcome: job.finish(),
        error,
    }
}

/// Best-effort delivery: a lagging or absent observer never stalls the camera loop.
fn notify(events: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
        if !matches!(event, SessionEvent::Frame(_)) {
            tracing::debug!("observer lagging, session event dropped");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Plays back a fixed list of frames, then raises the stop flag.
    pub struct ScriptedSource {
        pub frames: VecDeque<Frame>,
        pub stop: watch::Sender<bool>,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Frame, CameraError> {
            let frame = self
                .frames
                .pop_front()
                .ok_or_else(|| CameraError::CaptureFailed("script exhausted".into()))?;
            if self.frames.is_empty() {
                self.stop.send_replace(true);
            }
            Ok(frame)
        }
    }

    /// Reports the same faces for every frame.
    pub struct FixedDetector(pub Vec<FaceBox>);

    /// Reports the same faces, but fails on the listed calls (1-based).
    pub struct FlakyDetector {
        pub faces: Vec<FaceBox>,
        pub fail_on: fn(u32) -> bool,
        pub calls: u32,
    }

    impl FaceDetect for FlakyDetector {
        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<FaceBox>, DetectorError> {
            self.calls += 1;
            if (self.fail_on)(self.calls) {
                return Err(DetectorError::InferenceFailed(format!("call {}", self.calls)));
            }
            Ok(self.faces.clone())
        }
    }

    impl FaceDetect for FixedDetector {
        fn detect(&mut self, _: &[u8], _: u32, _: u32) -> Result<Vec<FaceBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    pub fn face(x: f32, y: f32, w: f32, h: f32) -> FaceBox {
        FaceBox { x, y, width: w, height: h, confidence: 0.9 }
    }

    /// Run `job` over `frames` with zero delay, collecting every event.
    pub fn run_scripted<J: SessionJob>(
        frames: Vec<Frame>,
        faces: Vec<FaceBox>,
        job: J,
    ) -> (SessionEnd<J::Outcome>, Vec<SessionEvent>) {
        run_scripted_with(frames, &mut FixedDetector(faces), job)
    }

    pub fn run_scripted_with<D: FaceDetect, J: SessionJob>(
        frames: Vec<Frame>,
        detector: &mut D,
        job: J,
    ) -> (SessionEnd<J::Outcome>, Vec<SessionEvent>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = mpsc::channel(1024);
        let mut source = ScriptedSource {
            frames: frames.into(),
            stop: stop_tx,
        };
        let end = run_session(
            &mut source,
            detector,
            job,
            &stop_rx,
            &event_tx,
            Duration::ZERO,
        );

        let mut events = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            events.push(event);
        }
        (end, events)
    }

    /// Outcome of a session that must have ended without error.
    pub fn clean<O>(end: SessionEnd<O>) -> O {
        if let Some(e) = end.error {
            panic!("session failed: {e}");
        }
        end.outcome
    }
}
