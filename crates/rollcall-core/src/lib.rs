//! rollcall-core: face registration and attendance engine.
//!
//! SCRFD (via ONNX Runtime) finds faces, an LBPH recognizer identifies them,
//! and plain CSV files hold the student roster and the per-day attendance log.

pub mod attendance;
pub mod detector;
pub mod layout;
pub mod lbph;
pub mod roster;
pub mod sample;
pub mod types;

pub use attendance::{AttendanceBuffer, AttendanceRecord};
pub use detector::{DetectorOptions, FaceDetect, FaceDetector};
pub use layout::DataLayout;
pub use lbph::{LbphModel, LbphParams, Prediction};
pub use roster::{Roster, RosterEntry};
pub use sample::SampleName;
pub use types::{FaceBox, Region};

/// Distances below this value count as a recognized face.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 60.0;

/// Default directory for the SCRFD model (`$XDG_DATA_HOME/rollcall/models`).
pub fn default_model_dir() -> std::path::PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
