use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use bagen_afq::{DatasetSplits, Scaler};
use burn::backend::Autodiff;
use burn::backend::ndarray::NdArray;
use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataloader::batcher::Batcher;
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::nn::{Dropout, DropoutConfig, Relu};
use burn::optim::AdamConfig;
use burn::record::CompactRecorder;
use burn::tensor::Float;
use burn::train::metric::LossMetric;
use burn::train::{RegressionOutput, TrainOutput, TrainStep, ValidStep};
use burn::{
    config::Config,
    module::Module,
    nn::{Linear, LinearConfig},
    tensor::{
        Tensor,
        backend::{AutodiffBackend, Backend},
    },
    train::LearnerBuilder,
};
use burn_ndarray::NdArrayDevice;
use tracing::{debug, info};

use crate::{
    bag::{BiasCorrection, Metrics, NormativeStatus, SubjectPrediction},
    cohort::Cohort,
    data::{SubjectBatch, SubjectBatcher, SubjectDataset},
    dict::{LayerWeights, ModelDict},
};

#[derive(Config)]
pub struct TrainingConfig {
    pub model: AgeRegressorConfig,
    pub optimizer: AdamConfig,
    #[config(default = 64)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = 1.0e-3)]
    pub learning_rate: f64,
    /// 0 reports the raw gap, 1 the age-bias corrected gap.
    #[config(default = 1)]
    pub normative_status: u8,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(AgeRegressorConfig::new(), AdamConfig::new())
    }
}

#[derive(Module, Debug)]
pub struct AgeRegressor<B: Backend> {
    input: Linear<B>,
    hidden: Linear<B>,
    output: Linear<B>,
    dropout: Dropout,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct AgeRegressorConfig {
    #[config(default = 128)]
    pub hidden_size: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl AgeRegressorConfig {
    pub fn init<B: Backend>(&self, n_features: usize, device: &B::Device) -> AgeRegressor<B> {
        let narrow = (self.hidden_size / 2).max(1);
        AgeRegressor {
            input: LinearConfig::new(n_features, self.hidden_size).init(device),
            hidden: LinearConfig::new(self.hidden_size, narrow).init(device),
            output: LinearConfig::new(narrow, 1).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }
}

impl<B: AutodiffBackend> TrainStep<SubjectBatch<B>, RegressionOutput<B>> for AgeRegressor<B> {
    fn step(&self, batch: SubjectBatch<B>) -> TrainOutput<RegressionOutput<B>> {
        let item = self.forward_regression(batch.features, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<SubjectBatch<B>, RegressionOutput<B>> for AgeRegressor<B> {
    fn step(&self, batch: SubjectBatch<B>) -> RegressionOutput<B> {
        self.forward_regression(batch.features, batch.targets)
    }
}

impl<B: Backend> AgeRegressor<B> {
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.input.forward(features));
        let x = self.dropout.forward(x);
        let x = self.activation.forward(self.hidden.forward(x));
        self.output.forward(x)
    }

    pub fn forward_regression(
        &self,
        features: Tensor<B, 2>,
        targets: Tensor<B, 2, Float>,
    ) -> RegressionOutput<B> {
        let output = self.forward(features);
        let loss = MseLoss::new().forward(output.clone(), targets.clone(), Reduction::Auto);

        RegressionOutput::new(loss, output, targets)
    }

    pub fn layer_weights(&self) -> Result<Vec<LayerWeights>> {
        [&self.input, &self.hidden, &self.output]
            .into_iter()
            .map(get_layer_weights)
            .collect()
    }

    /// Standardized age predictions, one per item.
    pub fn predict(&self, dataset: &SubjectDataset, device: &B::Device) -> Result<Vec<f32>> {
        if dataset.items().is_empty() {
            return Ok(Vec::new());
        }
        let batch = SubjectBatcher::<B>::new(device.clone()).batch(dataset.items().to_vec());
        self.forward(batch.features)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("reading predictions: {:?}", e))
    }
}

fn get_layer_weights<B: Backend>(linear_layer: &Linear<B>) -> Result<LayerWeights> {
    let weight_data = linear_layer.weight.to_data();
    let shape = weight_data.shape.clone();
    let weight = weight_data
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("reading layer weights: {:?}", e))?;
    let bias = match &linear_layer.bias {
        Some(bias) => bias
            .to_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("reading layer bias: {:?}", e))?,
        None => Vec::new(),
    };

    Ok(LayerWeights {
        d_input: shape[0],
        d_output: shape[1],
        weight,
        bias,
    })
}

fn predictions(
    dataset: &SubjectDataset,
    ages: &[f64],
    standardized: &[f32],
    age_scaler: &Scaler,
) -> Vec<SubjectPrediction> {
    dataset
        .items()
        .iter()
        .zip(ages)
        .zip(standardized)
        .map(|((item, &age), &pred)| {
            SubjectPrediction::new(item.subject.clone(), age, age_scaler.inverse(0, pred as f64))
        })
        .collect()
}

/// One sweep step to train.
pub struct Job<'a> {
    pub step: usize,
    pub splits: &'a DatasetSplits,
    pub cohort: &'a Cohort,
    pub config: &'a TrainingConfig,
    pub artifact_dir: &'a Path,
}

fn train<B: AutodiffBackend>(job: &Job<'_>, device: B::Device) -> Result<ModelDict> {
    let Job {
        step,
        splits,
        cohort,
        config,
        artifact_dir,
    } = *job;
    let status = NormativeStatus::try_from(config.normative_status)?;

    let train_side = splits
        .train
        .drop_missing_target(cohort.age_col)
        .context("selecting training subjects")?;
    let test_side = splits
        .test
        .drop_missing_target(cohort.age_col)
        .context("selecting test subjects")?;
    if train_side.is_empty() || test_side.is_empty() {
        bail!(
            "split has {} training and {} test subjects with a known {}",
            train_side.len(),
            test_side.len(),
            cohort.age_col
        );
    }
    let train_ages = train_side.numeric_target(cohort.age_col)?;
    let test_ages = test_side.numeric_target(cohort.age_col)?;

    let feature_scaler = Scaler::fit(train_side.n_features(), train_side.rows());
    let age_scaler = Scaler::fit(1, train_ages.iter().map(std::slice::from_ref));
    let train_dataset =
        SubjectDataset::from_afq(&train_side, &train_ages, &feature_scaler, &age_scaler);
    let valid_dataset =
        SubjectDataset::from_afq(&test_side, &test_ages, &feature_scaler, &age_scaler);

    fs::create_dir_all(artifact_dir)
        .with_context(|| format!("creating {}", artifact_dir.display()))?;
    config
        .save(artifact_dir.join("config.json"))
        .context("saving training config")?;
    B::seed(config.seed);

    let batcher_train = SubjectBatcher::<B>::new(device.clone());
    let batcher_valid = SubjectBatcher::<B::InnerBackend>::new(device.clone());

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(train_dataset.clone());

    let dataloader_valid = DataLoaderBuilder::new(batcher_valid)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(valid_dataset.clone());

    let artifact = artifact_dir.to_string_lossy().to_string();
    let learner = LearnerBuilder::new(artifact.as_str())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .devices(vec![device.clone()])
        .num_epochs(config.num_epochs)
        .summary()
        .build(
            config.model.init::<B>(train_side.n_features(), &device),
            config.optimizer.init(),
            config.learning_rate,
        );

    info!(
        step,
        train = train_dataset.items().len(),
        test = valid_dataset.items().len(),
        features = train_side.n_features(),
        epochs = config.num_epochs,
        "training"
    );
    let model_trained = learner.fit(dataloader_train, dataloader_valid);
    model_trained
        .clone()
        .save_file(artifact_dir.join("model"), &CompactRecorder::new())
        .map_err(|e| anyhow!("saving model record: {:?}", e))?;

    let model = model_trained.valid();
    let mut train_preds = predictions(
        &train_dataset,
        &train_ages,
        &model.predict(&train_dataset, &device)?,
        &age_scaler,
    );
    let mut test_preds = predictions(
        &valid_dataset,
        &test_ages,
        &model.predict(&valid_dataset, &device)?,
        &age_scaler,
    );

    let bias_correction = match status {
        NormativeStatus::Raw => None,
        NormativeStatus::BiasCorrected => {
            let correction = BiasCorrection::fit(&train_preds);
            debug!(
                slope = correction.slope,
                intercept = correction.intercept,
                "age-bias correction"
            );
            correction.apply(&mut train_preds);
            correction.apply(&mut test_preds);
            Some(correction)
        }
    };

    let train_metrics = Metrics::compute(&train_preds);
    let test_metrics = Metrics::compute(&test_preds);
    info!(
        train_mae = train_metrics.mae,
        test_mae = test_metrics.mae,
        test_r2 = test_metrics.r2,
        "trained"
    );

    Ok(ModelDict {
        step,
        train_prop: splits.train_prop,
        seed: splits.seed,
        cohort: cohort.name.to_string(),
        normative_status: status,
        training_config: config.to_string(),
        feature_names: train_side.feature_names().to_vec(),
        feature_scaler,
        age_scaler,
        layers: model.layer_weights()?,
        bias_correction,
        train: train_preds,
        test: test_preds,
        train_metrics,
        test_metrics,
    })
}

pub fn train_model(job: &Job<'_>) -> Result<ModelDict> {
    type Backend = NdArray<f32>;
    type AutodiffBackend = Autodiff<Backend>;
    let device = NdArrayDevice::Cpu;
    train::<AutodiffBackend>(job, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = AgeRegressorConfig::new()
            .with_hidden_size(8)
            .init::<TestBackend>(5, &device);
        let x = Tensor::<TestBackend, 2>::zeros([3, 5], &device);
        assert_eq!(model.forward(x).dims(), [3, 1]);
    }

    #[test]
    fn test_layer_weights() {
        let device = Default::default();
        let model = AgeRegressorConfig::new()
            .with_hidden_size(8)
            .init::<TestBackend>(5, &device);
        let layers = model.layer_weights().unwrap();
        let dims: Vec<(usize, usize)> = layers.iter().map(|l| (l.d_input, l.d_output)).collect();
        assert_eq!(dims, vec![(5, 8), (8, 4), (4, 1)]);
        assert_eq!(layers[0].weight.len(), 40);
        assert_eq!(layers[2].bias.len(), 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.normative_status, 1);
        assert_eq!(config.model.hidden_size, 128);
    }

    #[test]
    fn test_config_file() {
        let path =
            std::env::temp_dir().join(format!("bag_gen_config_{}.json", std::process::id()));
        let config = TrainingConfig::default()
            .with_num_epochs(3)
            .with_normative_status(0);
        config.save(&path).unwrap();
        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.num_epochs, 3);
        assert_eq!(loaded.normative_status, 0);
        std::fs::remove_file(&path).unwrap();
    }
}
