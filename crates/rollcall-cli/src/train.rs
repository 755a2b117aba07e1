use anyhow::{bail, Context, Result};
use rollcall_core::sample::scan_dir;
use rollcall_core::{DataLayout, LbphModel, LbphParams};

#[derive(Debug)]
pub struct TrainSummary {
    pub samples: usize,
    pub students: usize,
    pub skipped: usize,
}

/// Train the recognizer on every sample in the training directory and
/// replace the saved model.
pub fn train(layout: &DataLayout, params: LbphParams) -> Result<TrainSummary> {
    let dir = layout.training_dir();
    let scan = scan_dir(&dir).with_context(|| format!("cannot read {}", dir.display()))?;
    let mut skipped = scan.skipped.len();

    let mut images = Vec::with_capacity(scan.samples.len());
    for (path, sample) in &scan.samples {
        match image::open(path) {
            Ok(img) if !params.fits(img.width(), img.height()) => {
                tracing::warn!(
                    path = %path.display(),
                    width = img.width(),
                    height = img.height(),
                    "sample too small for the LBPH grid, skipping"
                );
                skipped += 1;
            }
            Ok(img) => images.push((img.into_luma8(), sample.id)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable sample, skipping");
                skipped += 1;
            }
        }
    }

    if images.is_empty() {
        bail!("no training images in {} (capture some first)", dir.display());
    }

    let model = LbphModel::train(params, images.iter().map(|(img, id)| (img, *id)))?;

    std::fs::create_dir_all(layout.model_dir())?;
    model.save(&layout.model_path())?;

    Ok(TrainSummary {
        samples: model.sample_count(),
        students: model.labels().len(),
        skipped,
    })
}
