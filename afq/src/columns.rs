use csv::StringRecord;

use crate::error::LoadError;

pub const SUBJECT_COL: &str = "subjectID";
pub const SESSION_COL: &str = "sessionID";

pub(crate) struct Columns {
    names: Vec<String>,
}

impl Columns {
    pub fn new(header: &StringRecord) -> Self {
        Self {
            names: header.iter().map(|s| s.trim().to_string()).collect(),
        }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn require(&self, name: &str) -> Result<usize, LoadError> {
        self.find(name)
            .ok_or_else(|| LoadError::MissingColumn(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().map(String::as_str).enumerate()
    }
}

/// Builds the row key shared by the nodes and subjects tables.
pub(crate) fn subject_key(subject: &str, session: Option<&str>, concat: bool) -> String {
    match session {
        Some(session) if concat => format!("{}_{}", subject.trim(), session.trim()),
        _ => subject.trim().to_string(),
    }
}

pub(crate) fn is_missing(cell: &str) -> bool {
    matches!(cell.trim(), "" | "NA" | "N/A" | "NaN" | "nan" | "null")
}

/// Parses a numeric cell; missing cells yield NaN.
pub(crate) fn parse_number(cell: &str) -> Option<f64> {
    if is_missing(cell) {
        return Some(f64::NAN);
    }
    cell.trim().parse::<f64>().ok()
}
