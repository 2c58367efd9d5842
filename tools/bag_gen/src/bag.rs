use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown normative status {0}, expected 0 (raw) or 1 (age-bias corrected)")]
pub struct NormativeStatusError(pub u8);

/// How the brain-age gap is reported.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormativeStatus {
    /// Predicted minus chronological age.
    Raw,
    /// Raw gap with the linear age trend of the training side removed.
    BiasCorrected,
}

impl TryFrom<u8> for NormativeStatus {
    type Error = NormativeStatusError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(NormativeStatus::Raw),
            1 => Ok(NormativeStatus::BiasCorrected),
            _ => Err(NormativeStatusError(v)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectPrediction {
    pub subject: String,
    pub age: f64,
    pub predicted: f64,
    pub bag: f64,
}

impl SubjectPrediction {
    pub fn new(subject: String, age: f64, predicted: f64) -> Self {
        Self {
            subject,
            age,
            predicted,
            bag: predicted - age,
        }
    }
}

/// Ordinary least squares fit of `ys` on `xs`, as `(slope, intercept)`.
fn least_squares(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }
    if sxx <= f64::EPSILON {
        return (0.0, mean_y);
    }
    let slope = sxy / sxx;
    (slope, mean_y - slope * mean_x)
}

fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    if xs.len() < 2 {
        return f64::NAN;
    }
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys) {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
        syy += (y - mean_y) * (y - mean_y);
    }
    sxy / (sxx * syy).sqrt()
}

/// Linear age trend of the gap, `bag ~ slope * age + intercept`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasCorrection {
    pub slope: f64,
    pub intercept: f64,
}

impl BiasCorrection {
    pub fn fit(preds: &[SubjectPrediction]) -> Self {
        let ages: Vec<f64> = preds.iter().map(|p| p.age).collect();
        let bags: Vec<f64> = preds.iter().map(|p| p.predicted - p.age).collect();
        let (slope, intercept) = least_squares(&ages, &bags);
        Self { slope, intercept }
    }

    pub fn apply(&self, preds: &mut [SubjectPrediction]) {
        for p in preds {
            p.bag = p.predicted - p.age - (self.slope * p.age + self.intercept);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub n: usize,
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    /// Pearson correlation between chronological age and the reported gap.
    pub age_bag_corr: f64,
}

impl Metrics {
    pub fn compute(preds: &[SubjectPrediction]) -> Self {
        let n = preds.len();
        if n == 0 {
            return Self {
                n,
                mae: f64::NAN,
                rmse: f64::NAN,
                r2: f64::NAN,
                age_bag_corr: f64::NAN,
            };
        }
        let nf = n as f64;
        let mae = preds.iter().map(|p| (p.predicted - p.age).abs()).sum::<f64>() / nf;
        let sse = preds
            .iter()
            .map(|p| (p.predicted - p.age).powi(2))
            .sum::<f64>();
        let mean_age = preds.iter().map(|p| p.age).sum::<f64>() / nf;
        let sst = preds.iter().map(|p| (p.age - mean_age).powi(2)).sum::<f64>();
        let ages: Vec<f64> = preds.iter().map(|p| p.age).collect();
        let bags: Vec<f64> = preds.iter().map(|p| p.bag).collect();
        Self {
            n,
            mae,
            rmse: (sse / nf).sqrt(),
            r2: if sst > 0.0 { 1.0 - sse / sst } else { f64::NAN },
            age_bag_corr: correlation(&ages, &bags),
        }
    }
}
