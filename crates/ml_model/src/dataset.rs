//! Dataset, batching and row preparation for Burn training.

use burn::prelude::*;
use feature_extractor::FeatureMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Fewest rows for which a hold-out split is made.
pub const MIN_HOLDOUT_ROWS: usize = 5;

/// A single item in a tabular dataset.
#[derive(Debug, Clone)]
pub struct TabularItem {
    /// Feature values for this row.
    pub features: Vec<f32>,
    /// Target values (one-hot for classification, one value for regression).
    pub target: Vec<f32>,
}

/// In-memory dataset of feature rows paired with targets.
#[derive(Debug, Clone)]
pub struct TabularDataset {
    items: Vec<TabularItem>,
}

impl TabularDataset {
    /// Pairs each feature row of `features` with the matching target row.
    #[must_use]
    pub fn new(features: &FeatureMatrix, targets: Vec<Vec<f32>>) -> Self {
        let items = targets
            .into_iter()
            .enumerate()
            .map(|(index, target)| TabularItem {
                features: features.row(index).to_vec(),
                target,
            })
            .collect();
        Self { items }
    }
}

impl burn::data::dataset::Dataset<TabularItem> for TabularDataset {
    fn get(&self, index: usize) -> Option<TabularItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A batch of training data.
#[derive(Debug, Clone)]
pub struct TabularBatch<B: Backend> {
    /// Input features tensor of shape `[batch_size, width]`.
    pub inputs: Tensor<B, 2>,
    /// Target tensor of shape `[batch_size, outputs]`.
    pub targets: Tensor<B, 2>,
}

/// Batcher for creating training batches.
#[derive(Debug, Clone)]
pub struct TabularBatcher<B: Backend> {
    device: B::Device,
    width: usize,
    outputs: usize,
}

impl<B: Backend> TabularBatcher<B> {
    /// Creates a new batcher for rows of `width` features and `outputs` targets.
    #[must_use]
    pub const fn new(device: B::Device, width: usize, outputs: usize) -> Self {
        Self {
            device,
            width,
            outputs,
        }
    }

    /// Creates a batch from a vector of items.
    pub fn batch(&self, items: Vec<TabularItem>) -> TabularBatch<B> {
        let batch_size = items.len();

        let mut features_data = Vec::with_capacity(batch_size * self.width);
        let mut targets_data = Vec::with_capacity(batch_size * self.outputs);

        for item in items {
            features_data.extend_from_slice(&item.features);
            targets_data.extend_from_slice(&item.target);
        }

        TabularBatch {
            inputs: self.tensor(&features_data, batch_size, self.width),
            targets: self.tensor(&targets_data, batch_size, self.outputs),
        }
    }

    /// Builds a `[rows, width]` input tensor from row-major values.
    pub fn inputs(&self, values: &[f32], rows: usize) -> Tensor<B, 2> {
        self.tensor(values, rows, self.width)
    }

    fn tensor(&self, values: &[f32], rows: usize, columns: usize) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(values, &self.device).reshape([rows, columns])
    }
}

/// Row indices used for fitting and for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Holds out `test_size` of the rows for evaluation.
///
/// With fewer than [`MIN_HOLDOUT_ROWS`] rows or a zero test size the model
/// is evaluated on its own training rows.
#[must_use]
pub fn holdout_split(rows: usize, test_size: f64, seed: u64) -> Split {
    let mut indices: Vec<usize> = (0..rows).collect();

    if rows < MIN_HOLDOUT_ROWS || test_size <= 0.0 {
        return Split {
            train: indices.clone(),
            test: indices,
        };
    }

    shuffle_indices(&mut indices, seed);

    let held_out = ((rows as f64) * test_size).ceil() as usize;
    let held_out = held_out.clamp(1, rows - 1);
    let test = indices.split_off(rows - held_out);

    Split {
        train: indices,
        test,
    }
}

/// Shuffles indices deterministically from `seed`.
pub fn shuffle_indices(indices: &mut [usize], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
}

/// Per-column z-score scaling fitted on training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Vec<f32>,
    scales: Vec<f32>,
}

impl Standardizer {
    /// Fits column means and standard deviations of `matrix`.
    #[must_use]
    pub fn fit(matrix: &FeatureMatrix) -> Self {
        let width = matrix.width();
        let rows = matrix.rows.max(1) as f32;
        let mut means = vec![0.0f32; width];
        let mut scales = vec![0.0f32; width];

        for row in 0..matrix.rows {
            for (mean, value) in means.iter_mut().zip(matrix.row(row)) {
                *mean += value / rows;
            }
        }
        for row in 0..matrix.rows {
            for ((scale, mean), value) in scales.iter_mut().zip(&means).zip(matrix.row(row)) {
                *scale += (value - mean).powi(2) / rows;
            }
        }

        // Constant columns are only centred.
        let scales = scales
            .into_iter()
            .map(|variance| if variance > f32::EPSILON { variance.sqrt() } else { 1.0 })
            .collect();

        Self { means, scales }
    }

    /// Returns a scaled copy of `matrix`.
    #[must_use]
    pub fn transform(&self, matrix: &FeatureMatrix) -> FeatureMatrix {
        let width = self.means.len();
        let values = matrix
            .values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                let column = index % width.max(1);
                (value - self.means[column]) / self.scales[column]
            })
            .collect();

        FeatureMatrix {
            columns: matrix.columns.clone(),
            values,
            rows: matrix.rows,
        }
    }
}
