use serde::{Deserialize, Serialize};

/// Per-column standardization fitted on a training side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    /// Fits column statistics over the finite values of `rows`. Columns
    /// without finite values, or with zero variance, get a unit scale.
    pub fn fit<'a>(width: usize, rows: impl IntoIterator<Item = &'a [f64]>) -> Self {
        let mut count = vec![0_usize; width];
        let mut sum = vec![0.0; width];
        let mut sum_sq = vec![0.0; width];
        for row in rows {
            for (col, &v) in row.iter().enumerate().take(width) {
                if v.is_finite() {
                    count[col] += 1;
                    sum[col] += v;
                    sum_sq[col] += v * v;
                }
            }
        }

        let mut mean = vec![0.0; width];
        let mut scale = vec![1.0; width];
        for col in 0..width {
            if count[col] == 0 {
                continue;
            }
            let n = count[col] as f64;
            mean[col] = sum[col] / n;
            let var = (sum_sq[col] / n - mean[col] * mean[col]).max(0.0);
            let std = var.sqrt();
            if std > f64::EPSILON {
                scale[col] = std;
            }
        }
        Self { mean, scale }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Standardizes `row`; non-finite values are imputed with the column mean.
    pub fn transform(&self, row: &[f64]) -> Vec<f32> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (&mean, &scale))| {
                if v.is_finite() {
                    ((v - mean) / scale) as f32
                } else {
                    0.0
                }
            })
            .collect()
    }

    #[inline]
    pub fn inverse(&self, col: usize, v: f64) -> f64 {
        v * self.scale[col] + self.mean[col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit() {
        let rows: Vec<Vec<f64>> = vec![
            vec![1.0, 5.0, f64::NAN],
            vec![3.0, 5.0, f64::NAN],
            vec![f64::NAN, 5.0, f64::NAN],
        ];
        let scaler = Scaler::fit(3, rows.iter().map(Vec::as_slice));
        assert_eq!(scaler.mean, vec![2.0, 5.0, 0.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_transform() {
        let rows: Vec<Vec<f64>> = vec![vec![0.0, 10.0], vec![4.0, 30.0]];
        let scaler = Scaler::fit(2, rows.iter().map(Vec::as_slice));
        assert_eq!(scaler.scale, vec![2.0, 10.0]);
        assert_eq!(scaler.transform(&[4.0, 10.0]), vec![1.0, -1.0]);
        assert_eq!(scaler.transform(&[f64::NAN, 20.0]), vec![0.0, 0.0]);
        assert_eq!(scaler.inverse(1, -1.0), 10.0);
    }
}
