use std::path::{Path, PathBuf};

use thiserror::Error;

/// Training proportions, indexed by job array step.
pub const TRAIN_SIZES: [f64; 6] = [0.01, 0.05, 0.1, 0.2, 0.5, 0.7];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("step {0} is out of range, expected 0..{max}", max = TRAIN_SIZES.len())]
    OutOfRange(usize),
}

#[inline]
pub fn train_prop(step: usize) -> Result<f64, StepError> {
    TRAIN_SIZES
        .get(step)
        .copied()
        .ok_or(StepError::OutOfRange(step))
}

pub fn output_path(
    dir: &Path,
    model_name: &str,
    cohort: &str,
    step: usize,
) -> Result<PathBuf, StepError> {
    let prop = train_prop(step)?;
    Ok(dir.join(format!("{}_{}_{:.2}.bag", model_name, cohort, prop)))
}
