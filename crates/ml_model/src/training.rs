//! Training loop for dense networks.

use burn::data::dataset::Dataset;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use tabular_structs::GradientParams;

use crate::dataset::{shuffle_indices, TabularBatcher, TabularDataset};
use crate::network::DenseNetwork;
use crate::TrainingError;

/// Shape of the network to fit.
#[derive(Debug, Clone)]
pub struct NetworkShape {
    pub inputs: usize,
    pub hidden: Vec<usize>,
    pub outputs: usize,
    /// Apply a softmax to the outputs before the loss.
    pub classify: bool,
}

/// Output from training.
#[derive(Debug)]
pub struct TrainingOutput<B: AutodiffBackend> {
    pub network: DenseNetwork<B>,
    /// Mean batch loss of the final epoch.
    pub final_train_loss: f32,
    pub epochs_completed: usize,
}

/// Trains a dense network on the provided data.
///
/// Uses a simple training loop with Adam optimizer and MSE loss.
///
/// # Errors
///
/// Returns an error if the dataset is empty or the loss diverges.
pub fn train<B: AutodiffBackend>(
    device: &B::Device,
    dataset: &TabularDataset,
    shape: &NetworkShape,
    params: &GradientParams,
) -> Result<TrainingOutput<B>, TrainingError> {
    if dataset.is_empty() {
        return Err(TrainingError::InvalidInput("no training rows".to_string()));
    }

    let mut network = DenseNetwork::<B>::new(device, shape.inputs, &shape.hidden, shape.outputs);
    let batcher = TabularBatcher::<B>::new(device.clone(), shape.inputs, shape.outputs);
    let mut optimizer = AdamConfig::new().init();
    let loss_fn = MseLoss::new();

    let num_samples = dataset.len();
    let batch_size = params.batch_size.max(1);
    let mut final_train_loss = 0.0;

    for epoch in 0..params.epochs {
        let mut epoch_loss = 0.0;
        let mut batch_count: u32 = 0;

        let mut indices: Vec<usize> = (0..num_samples).collect();
        shuffle_indices(&mut indices, epoch as u64);

        for batch_indices in indices.chunks(batch_size) {
            let items: Vec<_> = batch_indices
                .iter()
                .filter_map(|&i| dataset.get(i))
                .collect();

            if items.is_empty() {
                continue;
            }

            let batch = batcher.batch(items);

            let predictions = forward(&network, batch.inputs, shape.classify);
            let loss = loss_fn.forward(predictions, batch.targets, Reduction::Mean);

            let loss_value = scalar(loss.clone())?;
            if !loss_value.is_finite() {
                return Err(TrainingError::Diverged);
            }
            epoch_loss += f64::from(loss_value);
            batch_count += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &network);

            network = optimizer.step(params.learning_rate, network, grads);
        }

        final_train_loss = if batch_count > 0 {
            (epoch_loss / f64::from(batch_count)) as f32
        } else {
            0.0
        };

        if epoch % 50 == 0 || epoch + 1 == params.epochs {
            tracing::debug!(epoch = epoch + 1, train_loss = final_train_loss, "Training progress");
        }
    }

    Ok(TrainingOutput {
        network,
        final_train_loss,
        epochs_completed: params.epochs,
    })
}

/// Runs the network over `rows` row-major feature rows.
///
/// Returns `rows * outputs` values; class probabilities when `classify`.
///
/// # Errors
///
/// Returns an error if the output tensor cannot be read back.
pub fn predict<B: Backend>(
    network: &DenseNetwork<B>,
    device: &B::Device,
    values: &[f32],
    rows: usize,
    shape: &NetworkShape,
) -> Result<Vec<f32>, TrainingError> {
    let batcher = TabularBatcher::<B>::new(device.clone(), shape.inputs, shape.outputs);
    let output = forward(network, batcher.inputs(values, rows), shape.classify);

    output
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TrainingError::InvalidInput(format!("unreadable network output: {e:?}")))
}

fn forward<B: Backend>(network: &DenseNetwork<B>, input: Tensor<B, 2>, classify: bool) -> Tensor<B, 2> {
    let output = network.forward(input);
    if classify {
        softmax(output, 1)
    } else {
        output
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> Result<f32, TrainingError> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .ok()
        .and_then(|values| values.first().copied())
        .ok_or_else(|| TrainingError::InvalidInput("unreadable loss value".to_string()))
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use feature_extractor::FeatureMatrix;

    use super::*;

    type TestBackend = Autodiff<NdArray>;

    fn line_dataset() -> (FeatureMatrix, TabularDataset) {
        let values: Vec<f32> = (0..20).map(|i| i as f32 / 10.0).collect();
        let features = FeatureMatrix {
            columns: vec!["x".to_string()],
            rows: values.len(),
            values: values.clone(),
        };
        let targets = values.iter().map(|x| vec![2.0 * x + 1.0]).collect();
        let dataset = TabularDataset::new(&features, targets);
        (features, dataset)
    }

    #[test]
    fn test_training() {
        let device = NdArrayDevice::default();
        let (_, dataset) = line_dataset();
        let shape = NetworkShape {
            inputs: 1,
            hidden: vec![8, 4],
            outputs: 1,
            classify: false,
        };
        let params = GradientParams {
            epochs: 2,
            batch_size: 16,
            ..GradientParams::default()
        };

        let result = train::<TestBackend>(&device, &dataset, &shape, &params);
        assert!(result.is_ok(), "Training failed: {:?}", result.err());

        let output = result.expect("Training should succeed");
        assert_eq!(output.epochs_completed, 2);
    }

    #[test]
    fn test_linear_fit_reduces_loss() {
        let device = NdArrayDevice::default();
        let (features, dataset) = line_dataset();
        let shape = NetworkShape {
            inputs: 1,
            hidden: vec![],
            outputs: 1,
            classify: false,
        };
        let params = GradientParams {
            learning_rate: 0.1,
            epochs: 300,
            batch_size: 20,
            test_size: 0.0,
        };

        let output =
            train::<TestBackend>(&device, &dataset, &shape, &params).expect("training succeeds");
        assert!(output.final_train_loss < 0.05, "loss {}", output.final_train_loss);

        let predictions = predict(&output.network, &device, &features.values, features.rows, &shape)
            .expect("prediction succeeds");
        assert_eq!(predictions.len(), 20);
    }

    #[test]
    fn test_classifier_outputs_probabilities() {
        let device = NdArrayDevice::default();
        let (features, dataset) = line_dataset();
        let shape = NetworkShape {
            inputs: 1,
            hidden: vec![4],
            outputs: 1,
            classify: true,
        };
        let params = GradientParams {
            epochs: 1,
            ..GradientParams::default()
        };
        let output =
            train::<TestBackend>(&device, &dataset, &shape, &params).expect("training succeeds");

        let probabilities =
            predict(&output.network, &device, &features.values, features.rows, &shape)
                .expect("prediction succeeds");
        assert!(probabilities.iter().all(|p| (p - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let device = NdArrayDevice::default();
        let features = FeatureMatrix {
            columns: vec!["x".to_string()],
            values: vec![],
            rows: 0,
        };
        let dataset = TabularDataset::new(&features, vec![]);
        let shape = NetworkShape {
            inputs: 1,
            hidden: vec![],
            outputs: 1,
            classify: false,
        };

        let result = train::<TestBackend>(&device, &dataset, &shape, &GradientParams::default());
        assert!(matches!(result, Err(TrainingError::InvalidInput(_))));
    }
}
