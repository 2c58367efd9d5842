use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use bag_gen::{
    cohort::ABCD,
    learn::{Job, TrainingConfig, train_model},
    sweep,
};
use bagen_afq::{AfqDataset, generate_dataset_splits};
use burn::config::Config;
use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

/// Trains the brain-age model of one training-size sweep step.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Job array step selecting the training proportion
    #[arg(env = "SLURM_ARRAY_TASK_ID")]
    step: usize,

    /// Directory holding the nodes and subjects files
    #[arg(long, env = "BAG_WORKDIR")]
    workdir: PathBuf,

    /// Nodes file, relative to the work directory
    #[arg(long)]
    nodes: Option<PathBuf>,

    /// Subjects file, relative to the work directory
    #[arg(long)]
    subjects: Option<PathBuf>,

    #[arg(long, default_value = "bag_dicts")]
    output_dir: PathBuf,

    #[arg(long, default_value = "resnet")]
    model_name: String,

    /// Training configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed of the train/test split
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Load and split the data without training
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose)?;

    let train_prop = sweep::train_prop(args.step)?;
    let output = sweep::output_path(&args.output_dir, &args.model_name, ABCD.name, args.step)?;
    let config = match &args.config {
        Some(path) => TrainingConfig::load(path)
            .map_err(|e| anyhow!("loading {}: {:?}", path.display(), e))?,
        None => TrainingConfig::default(),
    };

    let load_options =
        ABCD.load_options(&args.workdir, args.nodes.as_deref(), args.subjects.as_deref());
    let dataset = AfqDataset::from_files(&load_options).context("loading dataset")?;
    let splits = generate_dataset_splits(&dataset, &ABCD.split_options(train_prop, args.seed))
        .context("generating split")?;
    info!(
        step = args.step,
        train_prop,
        train = splits.train.len(),
        test = splits.test.len(),
        "split ready"
    );
    if args.dry_run {
        return Ok(());
    }

    let artifact_dir = args
        .output_dir
        .join("artifacts")
        .join(format!("step_{}", args.step));
    let dict = train_model(&Job {
        step: args.step,
        splits: &splits,
        cohort: &ABCD,
        config: &config,
        artifact_dir: &artifact_dir,
    })
    .context("training model")?;
    dict.store(&output).context("writing model dict")?;
    info!(path = %output.display(), "model dict written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsStr;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["bag_gen", "0", "--workdir", "/x"]).unwrap();
        assert_eq!(args.step, 0);
        assert_eq!(args.workdir, PathBuf::from("/x"));
        assert_eq!(args.output_dir, PathBuf::from("bag_dicts"));
        assert_eq!(args.model_name, "resnet");
        assert_eq!(args.seed, 42);
        assert!(args.nodes.is_none() && args.subjects.is_none() && args.config.is_none());
        assert!(!args.dry_run && !args.verbose);
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "bag_gen",
            "5",
            "--workdir",
            "/x",
            "--seed",
            "7",
            "--dry-run",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.step, 5);
        assert_eq!(args.seed, 7);
        assert!(args.dry_run && args.verbose);
    }

    #[test]
    fn test_missing_workdir() {
        assert!(Args::try_parse_from(["bag_gen", "0"]).is_err());
    }

    #[test]
    fn test_env_fallbacks() {
        Args::command().debug_assert();
        let cmd = Args::command();
        let env_of = |id: &str| {
            cmd.get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .map(OsStr::to_os_string)
        };
        assert_eq!(env_of("step"), Some("SLURM_ARRAY_TASK_ID".into()));
        assert_eq!(env_of("workdir"), Some("BAG_WORKDIR".into()));
    }

    #[test]
    fn test_step_out_of_range() {
        let args = Args::try_parse_from(["bag_gen", "6", "--workdir", "/x"]).unwrap();
        let err = sweep::train_prop(args.step).unwrap_err();
        assert_eq!(err.to_string(), "step 6 is out of range, expected 0..6");
    }
}
