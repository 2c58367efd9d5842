use std::collections::HashSet;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand_xoshiro::{Xoshiro256PlusPlus, rand_core::SeedableRng};
use tracing::debug;

use crate::{dataset::AfqDataset, error::SplitError};

#[derive(Clone, Debug)]
pub struct SplitOptions {
    pub train_prop: f64,
    pub seed: u64,
    /// Target column whose value identifies a participant. Rows sharing a
    /// value always land on the same side of the split.
    pub group_col: Option<String>,
}

#[derive(Clone, Debug)]
pub struct DatasetSplits {
    pub train_prop: f64,
    pub seed: u64,
    pub train: AfqDataset,
    pub test: AfqDataset,
}

fn row_groups(dataset: &AfqDataset, group_col: Option<&str>) -> Result<Vec<String>, SplitError> {
    let Some(col) = group_col else {
        return Ok(dataset.subjects().to_vec());
    };
    let values = dataset
        .text_target(col)
        .map_err(|_| SplitError::UnknownGroup(col.to_string()))?;
    values
        .into_iter()
        .zip(dataset.subjects())
        .map(|(value, subject)| value.ok_or_else(|| SplitError::MissingGroup(subject.clone())))
        .collect()
}

/// Splits `dataset` into train and test sides holding roughly `train_prop`
/// and `1 - train_prop` of the groups. The result depends only on the
/// dataset, the proportion and the seed.
pub fn generate_dataset_splits(
    dataset: &AfqDataset,
    opts: &SplitOptions,
) -> Result<DatasetSplits, SplitError> {
    let prop = opts.train_prop;
    if !(prop > 0.0 && prop < 1.0) {
        return Err(SplitError::BadProportion(prop));
    }

    let groups = row_groups(dataset, opts.group_col.as_deref())?;
    let mut order: Vec<&String> = groups.iter().unique().collect();
    let n_groups = order.len();
    if n_groups < 2 {
        return Err(SplitError::TooFewGroups(n_groups));
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(opts.seed);
    order.shuffle(&mut rng);
    let n_train = ((prop * n_groups as f64).round() as usize).clamp(1, n_groups - 1);
    let train_groups: HashSet<&String> = order[..n_train].iter().copied().collect();

    let (train_idx, test_idx): (Vec<usize>, Vec<usize>) =
        (0..dataset.len()).partition(|&i| train_groups.contains(&groups[i]));
    debug!(
        train_prop = prop,
        groups = n_groups,
        train_groups = n_train,
        train_rows = train_idx.len(),
        test_rows = test_idx.len(),
        "generated split"
    );

    Ok(DatasetSplits {
        train_prop: prop,
        seed: opts.seed,
        train: dataset.subset(&train_idx),
        test: dataset.subset(&test_idx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{LoadOptions, tests::dataset};
    use std::path::PathBuf;

    fn synthetic(participants: usize) -> AfqDataset {
        let mut nodes = String::from("subjectID,sessionID,tractID,nodeID,dki_fa\n");
        let mut subjects = String::from("subjectID,sessionID,initial_age,subjectID_solo\n");
        for p in 0..participants {
            for session in 1..=2 {
                nodes.push_str(&format!("p{p},{session},CST_L,0,{}\n", p as f64 / 100.0));
                subjects.push_str(&format!("p{p},{session},{},p{p}\n", 9 + session));
            }
        }
        let opts = LoadOptions {
            fn_nodes: PathBuf::new(),
            fn_subjects: PathBuf::new(),
            dwi_metrics: vec![],
            target_cols: vec!["initial_age".to_string(), "subjectID_solo".to_string()],
            concat_subject_session: true,
        };
        AfqDataset::from_readers(nodes.as_bytes(), subjects.as_bytes(), &opts).unwrap()
    }

    fn options(train_prop: f64, seed: u64) -> SplitOptions {
        SplitOptions {
            train_prop,
            seed,
            group_col: Some("subjectID_solo".to_string()),
        }
    }

    fn solo(ds: &AfqDataset) -> HashSet<String> {
        ds.text_target("subjectID_solo")
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    #[test]
    fn test_deterministic() {
        let ds = synthetic(50);
        let a = generate_dataset_splits(&ds, &options(0.2, 42)).unwrap();
        let b = generate_dataset_splits(&ds, &options(0.2, 42)).unwrap();
        assert_eq!(a.train.subjects(), b.train.subjects());
        assert_eq!(a.test.subjects(), b.test.subjects());
        let c = generate_dataset_splits(&ds, &options(0.2, 7)).unwrap();
        assert_ne!(a.train.subjects(), c.train.subjects());
    }

    #[test]
    fn test_groups_not_split() {
        let ds = synthetic(100);
        for prop in [0.01, 0.05, 0.1, 0.2, 0.5, 0.7] {
            let splits = generate_dataset_splits(&ds, &options(prop, 42)).unwrap();
            let train = solo(&splits.train);
            let test = solo(&splits.test);
            assert!(train.is_disjoint(&test));
            assert_eq!(train.len() + test.len(), 100);
            assert_eq!(train.len(), ((prop * 100.0).round() as usize).max(1));
            assert_eq!(splits.train.len() + splits.test.len(), ds.len());
            assert_eq!(splits.train.len(), 2 * train.len());
        }
    }

    #[test]
    fn test_rows_keep_order() {
        let ds = synthetic(20);
        let splits = generate_dataset_splits(&ds, &options(0.5, 3)).unwrap();
        let pos = |key: &String| ds.subjects().iter().position(|s| s == key).unwrap();
        let train: Vec<usize> = splits.train.subjects().iter().map(pos).collect();
        assert!(train.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ungrouped() {
        let ds = dataset();
        let opts = SplitOptions {
            group_col: None,
            ..options(0.01, 42)
        };
        let splits = generate_dataset_splits(&ds, &opts).unwrap();
        assert_eq!(splits.train.len(), 1);
        assert_eq!(splits.test.len(), ds.len() - 1);
    }

    #[test]
    fn test_numeric_group_ids_keep_text() {
        let nodes = "subjectID,tractID,nodeID,dki_fa\ns1,CST_L,0,0.1\ns2,CST_L,0,0.2\n";
        let subjects = "subjectID,subjectID_solo\ns1,007\ns2,7\n";
        let opts = LoadOptions {
            fn_nodes: PathBuf::new(),
            fn_subjects: PathBuf::new(),
            dwi_metrics: vec![],
            target_cols: vec!["subjectID_solo".to_string()],
            concat_subject_session: false,
        };
        let ds = AfqDataset::from_readers(nodes.as_bytes(), subjects.as_bytes(), &opts).unwrap();
        let splits = generate_dataset_splits(&ds, &options(0.5, 42)).unwrap();
        assert_eq!(splits.train.len(), 1);
        assert_eq!(splits.test.len(), 1);
        let mut groups: Vec<String> = solo(&splits.train)
            .into_iter()
            .chain(solo(&splits.test))
            .collect();
        groups.sort();
        assert_eq!(groups, vec!["007", "7"]);
    }

    #[test]
    fn test_errors() {
        let ds = dataset();
        for prop in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                generate_dataset_splits(&ds, &options(prop, 42)),
                Err(SplitError::BadProportion(_))
            ));
        }
        let opts = SplitOptions {
            group_col: Some("bachelors".to_string()),
            ..options(0.5, 42)
        };
        assert_eq!(
            generate_dataset_splits(&ds, &opts).unwrap_err(),
            SplitError::UnknownGroup("bachelors".to_string())
        );
        let single = ds.subset(&[0, 1]);
        assert_eq!(
            generate_dataset_splits(&single, &options(0.5, 42)).unwrap_err(),
            SplitError::TooFewGroups(1)
        );
    }
}
