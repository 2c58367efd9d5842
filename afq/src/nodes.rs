use std::{
    collections::{BTreeSet, HashMap},
    io::Read,
};

use csv::ReaderBuilder;
use indexmap::IndexSet;
use tracing::debug;

use crate::{
    columns::{Columns, SESSION_COL, SUBJECT_COL, parse_number, subject_key},
    error::LoadError,
};

pub const TRACT_COL: &str = "tractID";
pub const NODE_COL: &str = "nodeID";

#[derive(Clone, Debug, Default)]
pub struct NodeOptions {
    /// Metric columns to keep. Empty keeps every metric column.
    pub dwi_metrics: Vec<String>,
    pub concat_subject_session: bool,
}

/// Tract profiles pivoted to one row per subject key.
#[derive(Clone, Debug)]
pub struct NodeTable {
    pub subjects: Vec<String>,
    pub feature_names: Vec<String>,
    /// Row-major, `subjects.len() * feature_names.len()` values.
    pub x: Vec<f64>,
}

fn parse_node(cell: &str) -> Option<u32> {
    let cell = cell.trim();
    if let Ok(node) = cell.parse::<u32>() {
        return Some(node);
    }
    // Pandas writes integer columns with NaNs as floats.
    let node = cell.parse::<f64>().ok()?;
    (node >= 0.0 && node.fract() == 0.0 && node <= u32::MAX as f64).then_some(node as u32)
}

impl NodeTable {
    pub fn from_reader<R: Read>(reader: R, opts: &NodeOptions) -> Result<Self, LoadError> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let cols = Columns::new(rdr.headers()?);
        let subject_idx = cols.require(SUBJECT_COL)?;
        let session_idx = cols.find(SESSION_COL);
        let tract_idx = cols.require(TRACT_COL)?;
        let node_idx = cols.require(NODE_COL)?;

        let metrics: Vec<(String, usize)> = if opts.dwi_metrics.is_empty() {
            cols.iter()
                .filter(|&(idx, name)| {
                    !name.is_empty()
                        && idx != subject_idx
                        && Some(idx) != session_idx
                        && idx != tract_idx
                        && idx != node_idx
                })
                .map(|(idx, name)| (name.to_string(), idx))
                .collect()
        } else {
            opts.dwi_metrics
                .iter()
                .map(|m| Ok((m.clone(), cols.require(m)?)))
                .collect::<Result<_, LoadError>>()?
        };

        let mut subjects: IndexSet<String> = IndexSet::new();
        let mut tracts: IndexSet<String> = IndexSet::new();
        let mut nodes: Vec<BTreeSet<u32>> = Vec::new();
        let mut cells: HashMap<(usize, usize, u32), Vec<f64>> = HashMap::new();

        for (record_no, record) in rdr.records().enumerate() {
            let record = record?;
            let get = |idx: usize| record.get(idx).unwrap_or("");
            let bad_value = |column: &str, value: &str| LoadError::BadValue {
                column: column.to_string(),
                record: record_no + 1,
                value: value.to_string(),
            };

            let key = subject_key(
                get(subject_idx),
                session_idx.map(get),
                opts.concat_subject_session,
            );
            let (subject, _) = subjects.insert_full(key.clone());
            let tract_name = get(tract_idx).trim();
            let (tract, _) = tracts.insert_full(tract_name.to_string());
            if tract == nodes.len() {
                nodes.push(BTreeSet::new());
            }
            let node =
                parse_node(get(node_idx)).ok_or_else(|| bad_value(NODE_COL, get(node_idx)))?;
            nodes[tract].insert(node);

            let values = metrics
                .iter()
                .map(|(name, idx)| parse_number(get(*idx)).ok_or_else(|| bad_value(name, get(*idx))))
                .collect::<Result<Vec<_>, _>>()?;
            if cells.insert((subject, tract, node), values).is_some() {
                return Err(LoadError::DuplicateNode {
                    subject: key,
                    tract: tract_name.to_string(),
                    node,
                });
            }
        }

        let mut feature_names = Vec::new();
        let mut columns: HashMap<(usize, usize, u32), usize> = HashMap::new();
        for (metric_pos, (metric, _)) in metrics.iter().enumerate() {
            for (tract, tract_name) in tracts.iter().enumerate() {
                for &node in &nodes[tract] {
                    columns.insert((metric_pos, tract, node), feature_names.len());
                    feature_names.push(format!("{}_{}_{}", metric, tract_name, node));
                }
            }
        }

        let width = feature_names.len();
        let mut x = vec![f64::NAN; subjects.len() * width];
        for ((subject, tract, node), values) in cells {
            for (metric_pos, value) in values.into_iter().enumerate() {
                let col = columns[&(metric_pos, tract, node)];
                x[subject * width + col] = value;
            }
        }

        debug!(
            subjects = subjects.len(),
            tracts = tracts.len(),
            features = width,
            "pivoted node profiles"
        );
        Ok(Self {
            subjects: subjects.into_iter().collect(),
            feature_names,
            x,
        })
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    #[inline]
    pub fn row(&self, idx: usize) -> &[f64] {
        let width = self.n_features();
        &self.x[idx * width..(idx + 1) * width]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODES: &str = "\
subjectID,sessionID,tractID,nodeID,dki_fa,dki_md
s1,1,CST_L,0,0.5,1.0
s1,1,CST_L,1,0.6,1.1
s1,1,ARC_R,0,0.7,
s2,1,CST_L,0,0.4,0.9
s2,1,ARC_R,0,0.3,0.8
s2,1,CST_L,1,NA,1.2
";

    #[test]
    fn test_pivot() {
        let opts = NodeOptions {
            dwi_metrics: vec!["dki_fa".to_string()],
            concat_subject_session: true,
        };
        let table = NodeTable::from_reader(NODES.as_bytes(), &opts).unwrap();
        assert_eq!(table.subjects, vec!["s1_1", "s2_1"]);
        assert_eq!(
            table.feature_names,
            vec!["dki_fa_CST_L_0", "dki_fa_CST_L_1", "dki_fa_ARC_R_0"]
        );
        assert_eq!(table.row(0), &[0.5, 0.6, 0.7]);
        assert_eq!(table.row(1)[0], 0.4);
        assert!(table.row(1)[1].is_nan());
        assert_eq!(table.row(1)[2], 0.3);
    }

    #[test]
    fn test_all_metrics() {
        let opts = NodeOptions::default();
        let table = NodeTable::from_reader(NODES.as_bytes(), &opts).unwrap();
        assert_eq!(table.subjects, vec!["s1", "s2"]);
        assert_eq!(table.n_features(), 6);
        assert_eq!(table.feature_names[3], "dki_md_CST_L_0");
        assert!(table.row(0)[5].is_nan());
    }

    #[test]
    fn test_first_appearance_order() {
        let data = "\
subjectID,tractID,nodeID,dki_fa
s2,ARC_R,1,0.1
s1,CST_L,0,0.2
s2,CST_L,0,0.3
s1,ARC_R,1,0.4
s3,ARC_R,0,0.5
";
        let table = NodeTable::from_reader(data.as_bytes(), &NodeOptions::default()).unwrap();
        assert_eq!(table.subjects, vec!["s2", "s1", "s3"]);
        assert_eq!(
            table.feature_names,
            vec!["dki_fa_ARC_R_0", "dki_fa_ARC_R_1", "dki_fa_CST_L_0"]
        );
        assert_eq!(table.row(1)[1], 0.4);
        assert_eq!(table.row(1)[2], 0.2);
        assert_eq!(table.row(2)[0], 0.5);
    }

    #[test]
    fn test_missing_metric() {
        let opts = NodeOptions {
            dwi_metrics: vec!["dki_rd".to_string()],
            concat_subject_session: false,
        };
        let err = NodeTable::from_reader(NODES.as_bytes(), &opts).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn(name) if name == "dki_rd"));
    }

    #[test]
    fn test_duplicate_node() {
        let data = "subjectID,tractID,nodeID,dki_fa\ns1,CST_L,0,0.5\ns1,CST_L,0.0,0.6\n";
        let err = NodeTable::from_reader(data.as_bytes(), &NodeOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateNode { node: 0, .. }));
    }

    #[test]
    fn test_bad_value() {
        let data = "subjectID,tractID,nodeID,dki_fa\ns1,CST_L,0,high\n";
        let err = NodeTable::from_reader(data.as_bytes(), &NodeOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::BadValue { record: 1, .. }));
    }
}
