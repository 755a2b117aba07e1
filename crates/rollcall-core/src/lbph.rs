//! Local Binary Pattern Histogram (LBPH) face recognizer.
//!
//! Each training image becomes a spatial histogram of circular LBP codes.
//! Prediction is nearest-neighbour over those histograms using the
//! alternative chi-square distance, so lower distances mean closer matches.
//! Parameters default to radius 1, 8 neighbours and an 8x8 grid.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Bumped whenever the on-disk layout of [`LbphModel`] changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum LbphError {
    #[error("no training samples")]
    NoSamples,
    #[error("image {width}x{height} is too small for radius {radius} and a {grid_x}x{grid_y} grid")]
    ImageTooSmall {
        width: u32,
        height: u32,
        radius: u32,
        grid_x: u32,
        grid_y: u32,
    },
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("trained model not found: {0} (run `rollcall train` first)")]
    ModelNotFound(String),
    #[error("unsupported model format version {found} (expected {MODEL_FORMAT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("model is empty")]
    EmptyModel,
    #[error("model I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("model encoding: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbphParams {
    pub radius: u32,
    pub neighbors: u32,
    pub grid_x: u32,
    pub grid_y: u32,
}

impl Default for LbphParams {
    fn default() -> Self {
        Self {
            radius: 1,
            neighbors: 8,
            grid_x: 8,
            grid_y: 8,
        }
    }
}

impl LbphParams {
    fn validate(&self) -> Result<(), LbphError> {
        if self.radius == 0 {
            return Err(LbphError::InvalidParams("radius must be at least 1".into()));
        }
        if !(1..=16).contains(&self.neighbors) {
            return Err(LbphError::InvalidParams(format!(
                "neighbors must be in 1..=16, got {}",
                self.neighbors
            )));
        }
        if self.grid_x == 0 || self.grid_y == 0 {
            return Err(LbphError::InvalidParams("grid must be at least 1x1".into()));
        }
        Ok(())
    }

    /// Number of histogram bins per grid cell.
    fn patterns(&self) -> usize {
        1usize << self.neighbors
    }

    /// Smallest `(width, height)` that leaves every grid cell at least one code.
    pub fn min_image_size(&self) -> (u32, u32) {
        (2 * self.radius + self.grid_x, 2 * self.radius + self.grid_y)
    }

    pub fn fits(&self, width: u32, height: u32) -> bool {
        let (min_w, min_h) = self.min_image_size();
        width >= min_w && height >= min_h
    }

    /// Length of a full spatial histogram.
    pub fn histogram_len(&self) -> usize {
        (self.grid_x * self.grid_y) as usize * self.patterns()
    }
}

/// Label and distance of the nearest training sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u32,
    pub distance: f64,
}

impl Prediction {
    /// A prediction is accepted when its distance is strictly below `threshold`.
    pub fn is_match(&self, threshold: f64) -> bool {
        self.distance < threshold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LabeledHistogram {
    label: u32,
    values: Vec<f32>,
}

/// A trained LBPH model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbphModel {
    version: u32,
    params: LbphParams,
    trained_at: String,
    histograms: Vec<LabeledHistogram>,
}

impl LbphModel {
    /// Train on `(image, label)` pairs.
    pub fn train<'a, I>(params: LbphParams, samples: I) -> Result<Self, LbphError>
    where
        I: IntoIterator<Item = (&'a GrayImage, u32)>,
    {
        params.validate()?;

        let mut histograms = Vec::new();
        for (image, label) in samples {
            let values = spatial_histogram(image, &params)?;
            histograms.push(LabeledHistogram { label, values });
        }

        if histograms.is_empty() {
            return Err(LbphError::NoSamples);
        }

        tracing::info!(
            samples = histograms.len(),
            bins = params.histogram_len(),
            "trained LBPH model"
        );

        Ok(Self {
            version: MODEL_FORMAT_VERSION,
            params,
            trained_at: chrono::Local::now().to_rfc3339(),
            histograms,
        })
    }

    /// Nearest training sample to `image`.
    pub fn predict(&self, image: &GrayImage) -> Result<Prediction, LbphError> {
        let query = spatial_histogram(image, &self.params)?;

        let mut best: Option<Prediction> = None;
        for hist in &self.histograms {
            let distance = chi_square_alt(&hist.values, &query);
            if best.map_or(true, |b| distance < b.distance) {
                best = Some(Prediction {
                    label: hist.label,
                    distance,
                });
            }
        }

        best.ok_or(LbphError::EmptyModel)
    }

    pub fn params(&self) -> LbphParams {
        self.params
    }

    pub fn trained_at(&self) -> &str {
        &self.trained_at
    }

    pub fn sample_count(&self) -> usize {
        self.histograms.len()
    }

    /// Distinct labels, ascending.
    pub fn labels(&self) -> Vec<u32> {
        let mut labels: Vec<u32> = self.histograms.iter().map(|h| h.label).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }

    /// Write the model as JSON, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), LbphError> {
        let tmp = path.with_extension("json.tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, self)?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), samples = self.histograms.len(), "saved LBPH model");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LbphError> {
        if !path.exists() {
            return Err(LbphError::ModelNotFound(path.display().to_string()));
        }

        let reader = BufReader::new(File::open(path)?);
        let model: Self = serde_json::from_reader(reader)?;

        if model.version != MODEL_FORMAT_VERSION {
            return Err(LbphError::UnsupportedVersion { found: model.version });
        }
        model.params.validate()?;
        if model.histograms.is_empty() {
            return Err(LbphError::EmptyModel);
        }
        let expected = model.params.histogram_len();
        if model.histograms.iter().any(|h| h.values.len() != expected) {
            return Err(LbphError::InvalidParams(format!(
                "histogram length does not match parameters (expected {expected})"
            )));
        }

        tracing::info!(
            path = %path.display(),
            samples = model.histograms.len(),
            trained_at = %model.trained_at,
            "loaded LBPH model"
        );
        Ok(model)
    }
}

/// Circular LBP codes for every pixel at least `radius` from the border.
///
/// Returns `(codes, width, height)` of the code image, which is
/// `2 * radius` smaller than the input in each dimension.
fn lbp_codes(image: &GrayImage, radius: u32, neighbors: u32) -> (Vec<u16>, usize, usize) {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let r = radius as usize;
    let out_w = w - 2 * r;
    let out_h = h - 2 * r;
    let src = image.as_raw();
    let mut codes = vec![0u16; out_w * out_h];

    for n in 0..neighbors {
        let angle = 2.0 * std::f32::consts::PI * n as f32 / neighbors as f32;
        let x = radius as f32 * angle.cos();
        let y = -(radius as f32) * angle.sin();

        let fx = x.floor() as isize;
        let fy = y.floor() as isize;
        let cx = x.ceil() as isize;
        let cy = y.ceil() as isize;

        let tx = x - fx as f32;
        let ty = y - fy as f32;
        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        let px = |row: isize, col: isize| src[row as usize * w + col as usize] as f32;

        for i in r..h - r {
            for j in r..w - r {
                let (ii, jj) = (i as isize, j as isize);
                let t = w1 * px(ii + fy, jj + fx)
                    + w2 * px(ii + fy, jj + cx)
                    + w3 * px(ii + cy, jj + fx)
                    + w4 * px(ii + cy, jj + cx);
                let center = px(ii, jj);

                if t > center || (t - center).abs() < f32::EPSILON {
                    codes[(i - r) * out_w + (j - r)] |= 1 << n;
                }
            }
        }
    }

    (codes, out_w, out_h)
}

/// Concatenated per-cell histograms, each normalised by its cell's pixel count.
fn spatial_histogram(image: &GrayImage, params: &LbphParams) -> Result<Vec<f32>, LbphError> {
    let too_small = || LbphError::ImageTooSmall {
        width: image.width(),
        height: image.height(),
        radius: params.radius,
        grid_x: params.grid_x,
        grid_y: params.grid_y,
    };

    let border = 2 * params.radius;
    if image.width() <= border || image.height() <= border {
        return Err(too_small());
    }

    let (codes, code_w, code_h) = lbp_codes(image, params.radius, params.neighbors);

    let cell_w = code_w / params.grid_x as usize;
    let cell_h = code_h / params.grid_y as usize;
    if cell_w == 0 || cell_h == 0 {
        return Err(too_small());
    }

    let patterns = params.patterns();
    let cell_total = (cell_w * cell_h) as f32;
    let mut hist = vec![0f32; params.histogram_len()];

    for gy in 0..params.grid_y as usize {
        for gx in 0..params.grid_x as usize {
            let base = (gy * params.grid_x as usize + gx) * patterns;
            let bins = &mut hist[base..base + patterns];

            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    bins[codes[y * code_w + x] as usize] += 1.0;
                }
            }
            for bin in bins.iter_mut() {
                *bin /= cell_total;
            }
        }
    }

    Ok(hist)
}

/// Alternative chi-square distance: `2 * Σ (a - b)² / (a + b)`.
fn chi_square_alt(a: &[f32], b: &[f32]) -> f64 {
    let mut sum = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let diff = x as f64 - y as f64;
        let total = x as f64 + y as f64;
        if total.abs() > f64::EPSILON {
            sum += diff * diff / total;
        }
    }
    2.0 * sum
}
