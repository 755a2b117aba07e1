//! Attendance taking: recognize faces against the trained model and log
//! the students seen to today's attendance file.

use crate::config::Config;
use crate::engine::{self, EngineError, FaceMark, FrameReport, MarkKind, SessionEvent, SessionJob};
use crate::preview::{self, ObserveMode};
use crate::table;
use anyhow::{Context, Result};
use rollcall_core::attendance::{self, AttendanceBuffer, AttendanceRecord};
use rollcall_core::lbph::LbphError;
use rollcall_core::{DataLayout, FaceBox, LbphModel, Roster};
use rollcall_hw::Frame;

pub struct TrackJob {
    model: LbphModel,
    roster: Roster,
    threshold: f64,
    buffer: AttendanceBuffer,
}

impl TrackJob {
    pub fn new(model: LbphModel, roster: Roster, threshold: f64, dedupe: bool) -> Self {
        Self {
            model,
            roster,
            threshold,
            buffer: AttendanceBuffer::new(dedupe),
        }
    }
}

impl SessionJob for TrackJob {
    type Outcome = AttendanceBuffer;

    fn on_frame(&mut self, frame: &Frame, faces: &[FaceBox]) -> Result<FrameReport, EngineError> {
        let mut report = FrameReport::default();

        for face in faces {
            let Some(region) = face.region(frame.width, frame.height) else {
                continue;
            };

            let crop = region.crop(&frame.data, frame.width);
            let prediction = match self.model.predict(&crop) {
                Ok(p) => p,
                Err(LbphError::ImageTooSmall { .. }) => continue,
                Err(e) => return Err(e.into()),
            };

            let student = prediction
                .is_match(self.threshold)
                .then(|| self.roster.lookup(prediction.label))
                .flatten();

            let kind = match student {
                Some(entry) => {
                    let record = AttendanceRecord::now(entry.id, &entry.name);
                    if self.buffer.push(record.clone()) {
                        tracing::info!(
                            id = entry.id,
                            name = %entry.name,
                            distance = prediction.distance,
                            "student recognized"
                        );
                        report.events.push(SessionEvent::Recognized {
                            id: record.id,
                            name: record.name,
                            timestamp: record.timestamp,
                        });
                    }
                    MarkKind::Known(entry.name.clone())
                }
                None => {
                    if prediction.is_match(self.threshold) {
                        tracing::warn!(label = prediction.label, "recognized label is not in the roster");
                    }
                    MarkKind::Unknown
                }
            };

            report.marks.push(FaceMark { region, kind });
        }

        Ok(report)
    }

    fn finish(self) -> AttendanceBuffer {
        self.buffer
    }
}

/// `rollcall track`: run a recognition session and save what it saw.
pub async fn run(config: &Config, mode: ObserveMode) -> Result<()> {
    let layout = config.layout();

    let model = LbphModel::load(&layout.model_path())?;
    let roster = Roster::load(&layout.roster_path())?;
    tracing::info!(students = roster.len(), labels = model.labels().len(), "starting attendance session");

    let job = TrackJob::new(
        model,
        roster,
        config.confidence_threshold,
        config.dedupe_attendance,
    );
    let handle = engine::spawn_session(&config.engine_settings(config.track_delay_ms), job)
        .context("could not start attendance session")?;

    println!("Taking attendance. Press q to stop.");
    let end = preview::observe(handle, "Attendance System", mode).await?;

    // flush whatever was recognized before reporting a session failure
    save_attendance(&layout, &end.outcome)?;
    match end.error {
        Some(e) => Err(e).context("attendance session ended early"),
        None => Ok(()),
    }
}

/// Append the session's records to today's file and print the day so far.
fn save_attendance(layout: &DataLayout, buffer: &AttendanceBuffer) -> Result<()> {
    if buffer.is_empty() {
        println!("No attendance records to save");
        return Ok(());
    }

    let today = chrono::Local::now().date_naive();
    let path = layout.attendance_path(today);
    let written = attendance::append_records(&path, buffer.records())
        .with_context(|| format!("failed to save attendance to {}", path.display()))?;
    println!("Attendance recorded successfully ({written} entries)");

    let rows = attendance::read_day(&path)?;
    println!("{}", table::attendance(&rows));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{clean, face, run_scripted, run_scripted_with, FlakyDetector};
    use image::GrayImage;
    use rollcall_core::roster::RosterEntry;
    use rollcall_core::LbphParams;

    const W: u32 = 64;
    const H: u32 = 64;

    fn pattern(seed: u32) -> GrayImage {
        GrayImage::from_fn(W, H, |x, y| {
            image::Luma([((x * (3 + seed) + y * (5 + seed) + (x * y) % 7) % 256) as u8])
        })
    }

    fn checker() -> GrayImage {
        GrayImage::from_fn(W, H, |x, y| image::Luma([if (x / 4 + y / 4) % 2 == 0 { 40 } else { 210 }]))
    }

    fn frame_of(img: &GrayImage, seq: u32) -> Frame {
        Frame::from_gray(img.as_raw().clone(), W, H, seq)
    }

    fn roster_with(entries: &[(u32, &str)]) -> Roster {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        for (id, name) in entries {
            Roster::append(&path, &RosterEntry { id: *id, name: name.to_string() }).unwrap();
        }
        Roster::load(&path).unwrap()
    }

    fn whole_frame() -> Vec<FaceBox> {
        vec![face(0.0, 0.0, W as f32, H as f32)]
    }

    #[test]
    fn test_recognizes_registered_student_once() {
        let ada = pattern(1);
        let model = LbphModel::train(LbphParams::default(), [(&ada, 7)]).unwrap();
        let job = TrackJob::new(model, roster_with(&[(7, "Ada")]), 60.0, true);

        let frames = (1..=3).map(|s| frame_of(&ada, s)).collect();
        let (buffer, events) = run_scripted(frames, whole_frame(), job);

        let buffer = clean(buffer);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.records()[0].id, 7);
        assert_eq!(buffer.records()[0].name, "Ada");

        let recognized = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Recognized { id: 7, .. }))
            .count();
        assert_eq!(recognized, 1);

        let marked_known = events.iter().any(|e| match e {
            SessionEvent::Frame(p) => p.marks.iter().any(|m| m.kind == MarkKind::Known("Ada".into())),
            _ => false,
        });
        assert!(marked_known);
    }

    #[test]
    fn test_every_match_kept_without_dedupe() {
        let ada = pattern(1);
        let model = LbphModel::train(LbphParams::default(), [(&ada, 7)]).unwrap();
        let job = TrackJob::new(model, roster_with(&[(7, "Ada")]), 60.0, false);

        let frames = (1..=3).map(|s| frame_of(&ada, s)).collect();
        let (buffer, _) = run_scripted(frames, whole_frame(), job);
        assert_eq!(clean(buffer).len(), 3);
    }

    #[test]
    fn test_distance_above_threshold_is_unknown() {
        let ada = pattern(1);
        let model = LbphModel::train(LbphParams::default(), [(&ada, 7)]).unwrap();
        // nothing can score below zero
        let job = TrackJob::new(model, roster_with(&[(7, "Ada")]), 0.0, true);

        let (buffer, events) = run_scripted(vec![frame_of(&ada, 1)], whole_frame(), job);
        assert!(clean(buffer).is_empty());

        let marked_unknown = events.iter().any(|e| match e {
            SessionEvent::Frame(p) => p.marks.iter().all(|m| m.kind == MarkKind::Unknown) && !p.marks.is_empty(),
            _ => false,
        });
        assert!(marked_unknown);
    }

    #[test]
    fn test_label_missing_from_roster_is_unknown() {
        let ada = pattern(1);
        let model = LbphModel::train(LbphParams::default(), [(&ada, 7)]).unwrap();
        let job = TrackJob::new(model, roster_with(&[(8, "Bob")]), 60.0, true);

        let (buffer, _) = run_scripted(vec![frame_of(&ada, 1)], whole_frame(), job);
        assert!(clean(buffer).is_empty());
    }

    #[test]
    fn test_picks_nearest_student() {
        let ada = pattern(1);
        let bob = checker();
        let model = LbphModel::train(LbphParams::default(), [(&ada, 1), (&bob, 2)]).unwrap();
        let job = TrackJob::new(model, roster_with(&[(1, "Ada"), (2, "Bob")]), 60.0, true);

        let (buffer, _) = run_scripted(vec![frame_of(&bob, 1)], whole_frame(), job);
        let buffer = clean(buffer);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.records()[0].name, "Bob");
    }

    #[test]
    fn test_detection_failure_keeps_buffered_attendance() {
        let ada = pattern(1);
        let model = LbphModel::train(LbphParams::default(), [(&ada, 7)]).unwrap();
        let job = TrackJob::new(model, roster_with(&[(7, "Ada")]), 60.0, true);

        // frames 1 and 2 match, every detection from frame 3 on fails
        let mut detector = FlakyDetector {
            faces: whole_frame(),
            fail_on: |call| call >= 3,
            calls: 0,
        };
        let frames = (1..=16).map(|s| frame_of(&ada, s)).collect();
        let (end, _) = run_scripted_with(frames, &mut detector, job);

        assert!(matches!(end.error, Some(EngineError::Detector(_))));
        assert_eq!(end.outcome.len(), 1);
        assert_eq!(end.outcome.records()[0].name, "Ada");
    }

    #[test]
    fn test_one_failed_detection_is_skipped() {
        let ada = pattern(1);
        let model = LbphModel::train(LbphParams::default(), [(&ada, 7)]).unwrap();
        let job = TrackJob::new(model, roster_with(&[(7, "Ada")]), 60.0, false);

        let mut detector = FlakyDetector {
            faces: whole_frame(),
            fail_on: |call| call == 3,
            calls: 0,
        };
        let frames = (1..=4).map(|s| frame_of(&ada, s)).collect();
        let (end, _) = run_scripted_with(frames, &mut detector, job);
        assert_eq!(clean(end).len(), 3);
    }

    #[test]
    fn test_save_attendance_appends_to_today() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure().unwrap();

        let mut buffer = AttendanceBuffer::new(true);
        buffer.push(AttendanceRecord::now(7, "Ada"));
        save_attendance(&layout, &buffer).unwrap();
        save_attendance(&layout, &buffer).unwrap();

        let today = chrono::Local::now().date_naive();
        let rows = attendance::read_day(&layout.attendance_path(today)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, 7);
    }

    #[test]
    fn test_save_empty_buffer_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure().unwrap();

        save_attendance(&layout, &AttendanceBuffer::new(true)).unwrap();
        let today = chrono::Local::now().date_naive();
        assert!(!layout.attendance_path(today).exists());
    }

    #[test]
    fn test_tiny_faces_are_ignored() {
        let ada = pattern(1);
        let model = LbphModel::train(LbphParams::default(), [(&ada, 7)]).unwrap();
        let job = TrackJob::new(model, roster_with(&[(7, "Ada")]), 60.0, true);

        let (buffer, events) = run_scripted(vec![frame_of(&ada, 1)], vec![face(0.0, 0.0, 4.0, 4.0)], job);
        assert!(clean(buffer).is_empty());
        let marks: usize = events
            .iter()
            .map(|e| match e {
                SessionEvent::Frame(p) => p.marks.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(marks, 0);
    }
}
