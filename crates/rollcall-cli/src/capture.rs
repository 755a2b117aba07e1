//! Student registration: save face crops as training samples, then add the
//! student to the roster.

use crate::config::Config;
use crate::engine::{self, EngineError, FaceMark, FrameReport, MarkKind, SessionEvent, SessionJob};
use crate::preview::{self, ObserveMode};
use anyhow::{Context, Result};
use rollcall_core::roster::{self, Roster, RosterEntry};
use rollcall_core::{FaceBox, SampleName};
use rollcall_hw::Frame;
use std::path::PathBuf;

pub struct CaptureJob {
    entry: RosterEntry,
    training_dir: PathBuf,
    target: u32,
    min_face_px: u32,
    saved: u32,
}

impl CaptureJob {
    pub fn new(entry: RosterEntry, training_dir: PathBuf, target: u32, min_face_px: u32) -> Self {
        Self {
            entry,
            training_dir,
            target,
            min_face_px,
            saved: 0,
        }
    }
}

impl SessionJob for CaptureJob {
    /// Number of samples written.
    type Outcome = u32;

    fn on_frame(&mut self, frame: &Frame, faces: &[FaceBox]) -> Result<FrameReport, EngineError> {
        let mut report = FrameReport::default();

        for face in faces {
            let Some(region) = face.region(frame.width, frame.height) else {
                continue;
            };
            if region.min_side() < self.min_face_px {
                tracing::debug!(?region, "face too small for a sample");
                continue;
            }

            let sequence = self.saved + 1;
            let name = SampleName::new(&self.entry.name, self.entry.id, sequence);
            let path = self.training_dir.join(name.to_string());

            let crop = region.crop(&frame.data, frame.width);
            crop.save(&path).map_err(|source| EngineError::SaveSample {
                path: path.display().to_string(),
                source,
            })?;

            self.saved = sequence;
            tracing::debug!(path = %path.display(), "sample saved");
            report.marks.push(FaceMark {
                region,
                kind: MarkKind::Sample,
            });
            report.events.push(SessionEvent::SampleSaved { sequence, path });

            if self.saved >= self.target {
                report.done = true;
                break;
            }
        }

        Ok(report)
    }

    fn finish(self) -> u32 {
        self.saved
    }
}

/// `rollcall capture`: validate, capture samples, register the student.
pub async fn run(config: &Config, id: &str, name: &str, mode: ObserveMode) -> Result<()> {
    let entry = roster::validate_registration(id, name)?;
    let layout = config.layout();

    let job = CaptureJob::new(
        entry.clone(),
        layout.training_dir(),
        config.sample_target,
        config.min_face_px,
    );
    let handle = engine::spawn_session(&config.engine_settings(config.capture_delay_ms), job)
        .context("could not start capture session")?;

    println!(
        "Capturing up to {} samples for {} (ID {}). Press q to stop.",
        config.sample_target, entry.name, entry.id
    );
    let end = preview::observe(handle, "Capturing Faces", mode).await?;
    let saved = end.outcome;

    // samples already on disk are registered even if the session failed
    if saved == 0 {
        println!("No face captured; {} was not registered.", entry.name);
    } else {
        Roster::append(&layout.roster_path(), &entry)?;
        println!("Captured {saved} images for {}", entry.name);
    }

    match end.error {
        Some(e) => Err(e).context("capture session ended early"),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{clean, face, run_scripted};

    fn textured_frame(width: u32, height: u32, seq: u32) -> Frame {
        let data = (0..width * height).map(|i| (i * 7 % 251) as u8).collect();
        Frame::from_gray(data, width, height, seq)
    }

    fn ada() -> RosterEntry {
        RosterEntry { id: 7, name: "Ada".into() }
    }

    #[test]
    fn test_saves_named_samples() {
        let dir = tempfile::tempdir().unwrap();
        let job = CaptureJob::new(ada(), dir.path().to_path_buf(), 100, 10);

        let frames = vec![textured_frame(64, 48, 1), textured_frame(64, 48, 2)];
        let (saved, events) = run_scripted(frames, vec![face(4.0, 4.0, 20.0, 24.0)], job);
        assert_eq!(clean(saved), 2);

        for seq in 1..=2 {
            let path = dir.path().join(format!("Ada.7.{seq}.jpg"));
            let img = image::open(&path).unwrap().into_luma8();
            assert_eq!(img.dimensions(), (20, 24));
        }
        let saved_events = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::SampleSaved { .. }))
            .count();
        assert_eq!(saved_events, 2);
    }

    #[test]
    fn test_stops_at_target() {
        let dir = tempfile::tempdir().unwrap();
        let job = CaptureJob::new(ada(), dir.path().to_path_buf(), 3, 10);

        // two faces per frame: target of 3 is reached halfway through frame 2
        let frames = (1..=5).map(|s| textured_frame(64, 48, s)).collect();
        let faces = vec![face(0.0, 0.0, 16.0, 16.0), face(30.0, 10.0, 16.0, 16.0)];
        let (saved, _) = run_scripted(frames, faces, job);

        assert_eq!(clean(saved), 3);
        assert!(dir.path().join("Ada.7.3.jpg").exists());
        assert!(!dir.path().join("Ada.7.4.jpg").exists());
    }

    #[test]
    fn test_skips_small_and_offscreen_faces() {
        let dir = tempfile::tempdir().unwrap();
        let job = CaptureJob::new(ada(), dir.path().to_path_buf(), 100, 12);

        let faces = vec![face(0.0, 0.0, 8.0, 8.0), face(200.0, 200.0, 30.0, 30.0)];
        let (saved, _) = run_scripted(vec![textured_frame(64, 48, 1)], faces, job);
        assert_eq!(clean(saved), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
