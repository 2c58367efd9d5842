use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot open {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed csv")]
    Csv(#[from] csv::Error),
    #[error("missing column {0:?}")]
    MissingColumn(String),
    #[error("bad value {value:?} in column {column:?} at record {record}")]
    BadValue {
        column: String,
        record: usize,
        value: String,
    },
    #[error("duplicate row for subject {subject:?}, tract {tract:?}, node {node}")]
    DuplicateNode {
        subject: String,
        tract: String,
        node: u32,
    },
    #[error("duplicate subject {0:?}")]
    DuplicateSubject(String),
    #[error("no subjects in common between nodes and subjects files")]
    EmptyJoin,
    #[error("unknown target column {0:?}")]
    UnknownTarget(String),
    #[error("non-numeric value {value:?} for subject {subject:?} in target {column:?}")]
    NonNumericTarget {
        column: String,
        subject: String,
        value: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplitError {
    #[error("train proportion {0} is not in (0, 1)")]
    BadProportion(f64),
    #[error("need at least 2 groups to split, got {0}")]
    TooFewGroups(usize),
    #[error("unknown group column {0:?}")]
    UnknownGroup(String),
    #[error("missing group value for subject {0:?}")]
    MissingGroup(String),
}
