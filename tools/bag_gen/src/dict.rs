use std::{
    fs::{self, File},
    io::{BufReader, Write},
    path::Path,
};

use anyhow::{Context, Result};
use bagen_afq::Scaler;
use serde::{Deserialize, Serialize};

use crate::bag::{BiasCorrection, Metrics, NormativeStatus, SubjectPrediction};

/// Weights of one linear layer, row-major `[d_input, d_output]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    pub d_input: usize,
    pub d_output: usize,
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Everything one sweep step produces: the fitted model, its preprocessing,
/// and per-subject brain-age gaps on both sides of the split.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDict {
    pub step: usize,
    pub train_prop: f64,
    pub seed: u64,
    pub cohort: String,
    pub normative_status: NormativeStatus,
    /// Training configuration as JSON.
    pub training_config: String,
    pub feature_names: Vec<String>,
    pub feature_scaler: Scaler,
    pub age_scaler: Scaler,
    pub layers: Vec<LayerWeights>,
    pub bias_correction: Option<BiasCorrection>,
    pub train: Vec<SubjectPrediction>,
    pub test: Vec<SubjectPrediction>,
    pub train_metrics: Metrics,
    pub test_metrics: Metrics,
}

impl ModelDict {
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let data = bincode::serialize(&self)?;
        let mut file =
            File::create(path).with_context(|| format!("creating {}", path.display()))?;
        file.write_all(data.as_slice())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let dict = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("decoding {}", path.display()))?;
        Ok(dict)
    }
}
