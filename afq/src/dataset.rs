use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use tracing::{info, warn};

use crate::{
    error::LoadError,
    nodes::{NodeOptions, NodeTable},
    subjects::{SubjectTable, TargetValue},
};

#[derive(Clone, Debug)]
pub struct LoadOptions {
    pub fn_nodes: PathBuf,
    pub fn_subjects: PathBuf,
    pub dwi_metrics: Vec<String>,
    pub target_cols: Vec<String>,
    pub concat_subject_session: bool,
}

/// Tract profile features joined with per-subject targets.
#[derive(Clone, Debug)]
pub struct AfqDataset {
    subjects: Vec<String>,
    feature_names: Vec<String>,
    x: Vec<f64>,
    target_cols: Vec<String>,
    y: Vec<Vec<TargetValue>>,
}

fn open(path: &Path) -> Result<BufReader<File>, LoadError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })
}

impl AfqDataset {
    pub fn from_files(opts: &LoadOptions) -> Result<Self, LoadError> {
        Self::from_readers(open(&opts.fn_nodes)?, open(&opts.fn_subjects)?, opts)
    }

    pub fn from_readers<N: Read, S: Read>(
        nodes: N,
        subjects: S,
        opts: &LoadOptions,
    ) -> Result<Self, LoadError> {
        let nodes = NodeTable::from_reader(
            nodes,
            &NodeOptions {
                dwi_metrics: opts.dwi_metrics.clone(),
                concat_subject_session: opts.concat_subject_session,
            },
        )?;
        let subjects =
            SubjectTable::from_reader(subjects, &opts.target_cols, opts.concat_subject_session)?;
        Self::join(nodes, subjects)
    }

    pub fn join(nodes: NodeTable, subjects: SubjectTable) -> Result<Self, LoadError> {
        let width = nodes.n_features();
        let mut keys = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut dropped = 0;
        for (idx, key) in nodes.subjects.iter().enumerate() {
            match subjects.get(key) {
                Some(targets) => {
                    keys.push(key.clone());
                    x.extend_from_slice(nodes.row(idx));
                    y.push(targets.to_vec());
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!(dropped, "subjects without targets were dropped");
        }
        if keys.is_empty() {
            return Err(LoadError::EmptyJoin);
        }
        info!(subjects = keys.len(), features = width, "loaded dataset");
        Ok(Self {
            subjects: keys,
            feature_names: nodes.feature_names,
            x,
            target_cols: subjects.target_cols,
            y,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    #[inline]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[inline]
    pub fn subjects(&self) -> &[String] {
        &self.subjects
    }

    #[inline]
    pub fn target_cols(&self) -> &[String] {
        &self.target_cols
    }

    #[inline]
    pub fn row(&self, idx: usize) -> &[f64] {
        let width = self.n_features();
        &self.x[idx * width..(idx + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.len()).map(|idx| self.row(idx))
    }

    pub fn target_index(&self, col: &str) -> Result<usize, LoadError> {
        self.target_cols
            .iter()
            .position(|c| c == col)
            .ok_or_else(|| LoadError::UnknownTarget(col.to_string()))
    }

    pub fn target(&self, idx: usize, col: usize) -> &TargetValue {
        &self.y[idx][col]
    }

    /// Numeric target column; missing values become NaN.
    pub fn numeric_target(&self, col: &str) -> Result<Vec<f64>, LoadError> {
        let col_idx = self.target_index(col)?;
        self.y
            .iter()
            .zip(&self.subjects)
            .map(|(row, subject)| match &row[col_idx] {
                TargetValue::Number { value, .. } => Ok(*value),
                TargetValue::Missing => Ok(f64::NAN),
                TargetValue::Text(s) => Err(LoadError::NonNumericTarget {
                    column: col.to_string(),
                    subject: subject.clone(),
                    value: s.clone(),
                }),
            })
            .collect()
    }

    /// Target column as written in the file; missing values become `None`.
    pub fn text_target(&self, col: &str) -> Result<Vec<Option<String>>, LoadError> {
        let col_idx = self.target_index(col)?;
        Ok(self
            .y
            .iter()
            .map(|row| match &row[col_idx] {
                TargetValue::Missing => None,
                value => Some(value.to_string()),
            })
            .collect())
    }

    pub fn subset(&self, indices: &[usize]) -> Self {
        let mut x = Vec::with_capacity(indices.len() * self.n_features());
        for &idx in indices {
            x.extend_from_slice(self.row(idx));
        }
        Self {
            subjects: indices.iter().map(|&i| self.subjects[i].clone()).collect(),
            feature_names: self.feature_names.clone(),
            x,
            target_cols: self.target_cols.clone(),
            y: indices.iter().map(|&i| self.y[i].clone()).collect(),
        }
    }

    pub fn drop_missing_target(&self, col: &str) -> Result<Self, LoadError> {
        let col_idx = self.target_index(col)?;
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| !self.y[i][col_idx].is_missing())
            .collect();
        if keep.len() < self.len() {
            warn!(
                column = col,
                dropped = self.len() - keep.len(),
                "rows with missing target were dropped"
            );
        }
        Ok(self.subset(&keep))
    }
}
