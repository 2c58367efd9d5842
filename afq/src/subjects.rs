use std::{collections::HashMap, fmt, io::Read};

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::{
    columns::{Columns, SESSION_COL, SUBJECT_COL, is_missing, subject_key},
    error::LoadError,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TargetValue {
    /// A numeric cell along with its text as written in the file.
    Number { value: f64, text: String },
    Text(String),
    Missing,
}

impl TargetValue {
    pub fn parse(cell: &str) -> Self {
        if is_missing(cell) {
            return TargetValue::Missing;
        }
        let cell = cell.trim();
        match cell.parse::<f64>() {
            Ok(value) if value.is_finite() => TargetValue::Number {
                value,
                text: cell.to_string(),
            },
            _ => TargetValue::Text(cell.to_string()),
        }
    }

    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, TargetValue::Missing)
    }
}

impl fmt::Display for TargetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            TargetValue::Number { text, .. } | TargetValue::Text(text) => write!(f, "{}", text),
            TargetValue::Missing => write!(f, "NA"),
        }
    }
}

/// Per-subject target columns keyed like the nodes table.
#[derive(Clone, Debug)]
pub struct SubjectTable {
    pub target_cols: Vec<String>,
    rows: HashMap<String, Vec<TargetValue>>,
}

impl SubjectTable {
    pub fn from_reader<R: Read>(
        reader: R,
        target_cols: &[String],
        concat_subject_session: bool,
    ) -> Result<Self, LoadError> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let cols = Columns::new(rdr.headers()?);
        let subject_idx = cols.require(SUBJECT_COL)?;
        let session_idx = cols.find(SESSION_COL);
        let target_idx = target_cols
            .iter()
            .map(|c| cols.require(c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows: HashMap<String, Vec<TargetValue>> = HashMap::new();
        for record in rdr.records() {
            let record = record?;
            let get = |idx: usize| record.get(idx).unwrap_or("");
            let key = subject_key(
                get(subject_idx),
                session_idx.map(get),
                concat_subject_session,
            );
            let values: Vec<TargetValue> = target_idx
                .iter()
                .map(|&idx| TargetValue::parse(get(idx)))
                .collect();
            if rows.insert(key.clone(), values).is_some() {
                return Err(LoadError::DuplicateSubject(key));
            }
        }

        Ok(Self {
            target_cols: target_cols.to_vec(),
            rows,
        })
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&[TargetValue]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
