//! Tractometry tables for brain-age modeling: node profiles pivoted to one
//! feature row per subject, joined with per-subject targets, and split into
//! reproducible train/test sides.

mod columns;
pub mod dataset;
pub mod error;
pub mod nodes;
pub mod scale;
pub mod split;
pub mod subjects;

pub use columns::{SESSION_COL, SUBJECT_COL};
pub use dataset::{AfqDataset, LoadOptions};
pub use error::{LoadError, SplitError};
pub use scale::Scaler;
pub use split::{DatasetSplits, SplitOptions, generate_dataset_splits};
pub use subjects::TargetValue;
