use std::path::Path;

use bagen_afq::{LoadOptions, SplitOptions};

/// File layout and column roles of a study's harmonized tractometry export.
#[derive(Clone, Copy, Debug)]
pub struct Cohort {
    pub name: &'static str,
    pub nodes_file: &'static str,
    pub subjects_file: &'static str,
    pub dwi_metrics: &'static [&'static str],
    pub target_cols: &'static [&'static str],
    pub age_col: &'static str,
    pub group_col: &'static str,
    pub concat_subject_session: bool,
}

pub const ABCD: Cohort = Cohort {
    name: "abcd",
    nodes_file: "harmonized_nodes_two_obs.csv",
    subjects_file: "subjects_two_obs_test.csv",
    dwi_metrics: &["dki_fa", "dki_md", "dki_ad", "dki_rd"],
    target_cols: &[
        "site_id_l",
        "initial_age",
        "log_inc_needs_RPP",
        "bachelors",
        "fes_youth_sum",
        "sex",
        "mean_pds",
        "comc_phenx_mean",
        "led_sch_seda_s_mn_avg_eb",
        "subjectID_solo",
    ],
    age_col: "initial_age",
    group_col: "subjectID_solo",
    concat_subject_session: true,
};

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Cohort {
    /// Load options for files found under `workdir`, unless overridden.
    pub fn load_options(
        &self,
        workdir: &Path,
        nodes: Option<&Path>,
        subjects: Option<&Path>,
    ) -> LoadOptions {
        LoadOptions {
            fn_nodes: workdir.join(nodes.unwrap_or(Path::new(self.nodes_file))),
            fn_subjects: workdir.join(subjects.unwrap_or(Path::new(self.subjects_file))),
            dwi_metrics: owned(self.dwi_metrics),
            target_cols: owned(self.target_cols),
            concat_subject_session: self.concat_subject_session,
        }
    }

    pub fn split_options(&self, train_prop: f64, seed: u64) -> SplitOptions {
        SplitOptions {
            train_prop,
            seed,
            group_col: Some(self.group_col.to_string()),
        }
    }
}
