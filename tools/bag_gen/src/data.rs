use bagen_afq::{AfqDataset, Scaler};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};

/// One subject's standardized features and standardized age.
#[derive(Clone, Debug)]
pub struct SubjectItem {
    pub subject: String,
    pub features: Vec<f32>,
    pub age: f32,
}

#[derive(Clone, Debug)]
pub struct SubjectDataset {
    items: Vec<SubjectItem>,
}

impl SubjectDataset {
    pub fn new(items: Vec<SubjectItem>) -> Self {
        Self { items }
    }

    /// `ages` must be aligned with the dataset rows and free of NaNs.
    pub fn from_afq(dataset: &AfqDataset, ages: &[f64], features: &Scaler, age: &Scaler) -> Self {
        let items = dataset
            .rows()
            .zip(dataset.subjects())
            .zip(ages)
            .map(|((row, subject), &a)| SubjectItem {
                subject: subject.clone(),
                features: features.transform(row),
                age: age.transform(&[a])[0],
            })
            .collect();
        Self::new(items)
    }

    #[inline]
    pub fn items(&self) -> &[SubjectItem] {
        &self.items
    }
}

impl Dataset<SubjectItem> for SubjectDataset {
    fn get(&self, index: usize) -> Option<SubjectItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct SubjectBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> SubjectBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

#[derive(Clone, Debug)]
pub struct SubjectBatch<B: Backend> {
    pub features: Tensor<B, 2>,
    pub targets: Tensor<B, 2, Float>,
}

impl<B: Backend> Batcher<SubjectItem, SubjectBatch<B>> for SubjectBatcher<B> {
    fn batch(&self, items: Vec<SubjectItem>) -> SubjectBatch<B> {
        let n = items.len();
        let width = items.first().map_or(0, |item| item.features.len());
        let (features, targets): (Vec<Vec<f32>>, Vec<f32>) = items
            .into_iter()
            .map(|item| (item.features, item.age))
            .unzip();

        let features = Tensor::<B, 2>::from_data(
            TensorData::new(features.concat(), [n, width]).convert::<B::FloatElem>(),
            &self.device,
        );
        let targets = Tensor::<B, 2, Float>::from_data(
            TensorData::new(targets, [n, 1]).convert::<B::FloatElem>(),
            &self.device,
        );

        SubjectBatch { features, targets }
    }
}
