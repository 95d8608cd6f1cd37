//! ML model crate for PackageML training runs.
//!
//! This crate defines the [`TrainingBackend`] capability consumed by the job
//! executor and a reference implementation, [`BurnBackend`], that trains
//! dense networks with the Burn deep learning framework and fits k-means and
//! PCA models directly.

pub mod dataset;
pub mod kmeans;
pub mod metrics;
pub mod network;
pub mod pca;
pub mod training;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use feature_extractor::{ExtractionError, FeatureMatrix, TargetVector};
use tabular_structs::{FamilyParams, GradientParams, Hyperparameters, Metrics, ModelFamily, TaskType};
use thiserror::Error;

use crate::dataset::{holdout_split, Standardizer, TabularDataset};
use crate::metrics::{ClassificationMetrics, RegressionMetrics};
use crate::training::NetworkShape;

/// Autodiff backend used by [`BurnBackend`].
pub type TrainBackend = Autodiff<NdArray>;

/// Failures inside a training run.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("model family {family} cannot be trained for task {task}")]
    Unsupported { family: ModelFamily, task: TaskType },

    #[error("target column required")]
    MissingTarget,

    #[error("{0}")]
    InvalidInput(String),

    #[error("training diverged: loss or metrics are not finite")]
    Diverged,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Everything a backend needs to fit and evaluate one model.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub features: FeatureMatrix,
    /// Absent for unsupervised tasks.
    pub target: Option<TargetVector>,
    pub task: TaskType,
    pub family: ModelFamily,
    pub hyperparameters: Hyperparameters,
}

/// Handle to a fitted model.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainedModel {
    Network {
        parameters: usize,
        /// Class names for classifiers, in output order.
        classes: Option<Vec<String>>,
    },
    Clusters {
        centroids: Vec<Vec<f32>>,
    },
    Components {
        components: Vec<Vec<f64>>,
    },
}

/// Result of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub handle: TrainedModel,
    pub metrics: Metrics,
}

/// A capability that fits and evaluates models.
///
/// Implementations run synchronously; callers move them onto a blocking
/// thread.
pub trait TrainingBackend: Send + Sync {
    /// Fits a model described by `request` and evaluates it.
    ///
    /// # Errors
    ///
    /// Returns a [`TrainingError`] describing why the model could not be
    /// trained.
    fn train(&self, request: TrainingRequest) -> Result<TrainingOutcome, TrainingError>;
}

/// Reference backend on Burn's autodiff `NdArray` backend.
#[derive(Debug, Clone, Default)]
pub struct BurnBackend {
    device: NdArrayDevice,
}

impl BurnBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn fit_network(
        &self,
        request: &TrainingRequest,
        params: &GradientParams,
        hidden: &[usize],
    ) -> Result<TrainingOutcome, TrainingError> {
        let target = request.target.as_ref().ok_or(TrainingError::MissingTarget)?;
        let features = &request.features;
        if target.len() != features.rows {
            return Err(TrainingError::InvalidInput(format!(
                "target has {} rows but features have {}",
                target.len(),
                features.rows
            )));
        }

        let split = holdout_split(features.rows, params.test_size, 42);
        let train_features = features.select(&split.train);
        let test_features = features.select(&split.test);

        let scaler = Standardizer::fit(&train_features);
        let train_features = scaler.transform(&train_features);
        let test_features = scaler.transform(&test_features);

        match target {
            TargetVector::Labels { classes, indices } => {
                let outputs = classes.len().max(1);
                let one_hot = |class: usize| {
                    let mut row = vec![0.0f32; outputs];
                    row[class] = 1.0;
                    row
                };
                let targets = split.train.iter().map(|&row| one_hot(indices[row])).collect();
                let shape = NetworkShape {
                    inputs: features.width(),
                    hidden: hidden.to_vec(),
                    outputs,
                    classify: true,
                };

                let (parameters, probabilities) =
                    self.fit_and_predict(&train_features, targets, &test_features, &shape, params)?;

                let predicted: Vec<usize> = probabilities.chunks(outputs).map(argmax).collect();
                let actual: Vec<usize> = split.test.iter().map(|&row| indices[row]).collect();

                Ok(TrainingOutcome {
                    handle: TrainedModel::Network {
                        parameters,
                        classes: Some(classes.clone()),
                    },
                    metrics: ClassificationMetrics::compute(&actual, &predicted, outputs)
                        .into_metrics()?,
                })
            }
            TargetVector::Values(values) => {
                let train_values: Vec<f32> = split.train.iter().map(|&row| values[row]).collect();
                let (mean, scale) = target_scaling(&train_values);
                let targets = train_values.iter().map(|y| vec![(y - mean) / scale]).collect();
                let shape = NetworkShape {
                    inputs: features.width(),
                    hidden: hidden.to_vec(),
                    outputs: 1,
                    classify: false,
                };

                let (parameters, outputs) =
                    self.fit_and_predict(&train_features, targets, &test_features, &shape, params)?;

                let predicted: Vec<f32> = outputs.iter().map(|y| y * scale + mean).collect();
                let actual: Vec<f32> = split.test.iter().map(|&row| values[row]).collect();

                Ok(TrainingOutcome {
                    handle: TrainedModel::Network {
                        parameters,
                        classes: None,
                    },
                    metrics: RegressionMetrics::compute(&actual, &predicted).into_metrics()?,
                })
            }
        }
    }

    fn fit_and_predict(
        &self,
        train_features: &FeatureMatrix,
        targets: Vec<Vec<f32>>,
        test_features: &FeatureMatrix,
        shape: &NetworkShape,
        params: &GradientParams,
    ) -> Result<(usize, Vec<f32>), TrainingError> {
        use burn::module::Module;

        let dataset = TabularDataset::new(train_features, targets);
        let output = training::train::<TrainBackend>(&self.device, &dataset, shape, params)?;

        tracing::debug!(
            epochs = output.epochs_completed,
            train_loss = output.final_train_loss,
            "Network trained"
        );

        let predictions = training::predict(
            &output.network,
            &self.device,
            &test_features.values,
            test_features.rows,
            shape,
        )?;

        Ok((output.network.num_params(), predictions))
    }
}

impl TrainingBackend for BurnBackend {
    fn train(&self, request: TrainingRequest) -> Result<TrainingOutcome, TrainingError> {
        if !request.family.supports(request.task) {
            return Err(TrainingError::Unsupported {
                family: request.family,
                task: request.task,
            });
        }
        if request.hyperparameters.family() != request.family {
            return Err(TrainingError::InvalidInput(format!(
                "hyperparameters are for {}, not {}",
                request.hyperparameters.family(),
                request.family
            )));
        }
        if request.features.rows == 0 {
            return Err(TrainingError::InvalidInput("no rows to train on".to_string()));
        }

        tracing::info!(
            family = %request.family,
            task = %request.task,
            rows = request.features.rows,
            columns = request.features.width(),
            "Training model"
        );

        match &request.hyperparameters.params {
            FamilyParams::LogisticRegression(params) | FamilyParams::LinearRegression(params) => {
                self.fit_network(&request, params, &[])
            }
            FamilyParams::NeuralNetwork(params) => self.fit_network(
                &request,
                &params.gradient,
                &[params.hidden_size_1, params.hidden_size_2],
            ),
            FamilyParams::KMeans(params) => {
                let clustering = kmeans::fit(&request.features, params)?;
                let score = metrics::silhouette_score(
                    &request.features,
                    &clustering.labels,
                    params.n_clusters,
                );

                let mut metrics = Metrics::new();
                metrics::insert(&mut metrics, "inertia", clustering.inertia)?;
                metrics.insert("n_clusters".to_string(), params.n_clusters.into());
                metrics::insert(&mut metrics, "silhouette_score", score)?;

                Ok(TrainingOutcome {
                    handle: TrainedModel::Clusters {
                        centroids: clustering.centroids,
                    },
                    metrics,
                })
            }
            FamilyParams::Pca(params) => {
                let fitted = pca::fit(&request.features, params)?;

                let ratios = fitted
                    .explained_variance_ratio
                    .iter()
                    .map(|&ratio| {
                        serde_json::Number::from_f64(ratio)
                            .map(serde_json::Value::Number)
                            .ok_or(TrainingError::Diverged)
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let mut metrics = Metrics::new();
                metrics.insert("explained_variance_ratio".to_string(), ratios.into());
                metrics.insert("n_components".to_string(), params.n_components.into());

                Ok(TrainingOutcome {
                    handle: TrainedModel::Components {
                        components: fitted.components,
                    },
                    metrics,
                })
            }
        }
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (index, &value)| {
            if value > best.1 {
                (index, value)
            } else {
                best
            }
        })
        .0
}

fn target_scaling(values: &[f32]) -> (f32, f32) {
    let n = values.len().max(1) as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|y| (y - mean).powi(2)).sum::<f32>() / n;
    let scale = if variance > f32::EPSILON { variance.sqrt() } else { 1.0 };
    (mean, scale)
}

#[cfg(test)]
mod tests {
    use tabular_structs::{KMeansParams, NetworkParams, PcaParams};

    use super::*;

    fn request(
        features: FeatureMatrix,
        target: Option<TargetVector>,
        task: TaskType,
        params: FamilyParams,
    ) -> TrainingRequest {
        let hyperparameters = Hyperparameters {
            params,
            extra: serde_json::Map::new(),
        };
        TrainingRequest {
            features,
            target,
            task,
            family: hyperparameters.family(),
            hyperparameters,
        }
    }

    fn matrix(values: Vec<f32>, width: usize) -> FeatureMatrix {
        FeatureMatrix {
            columns: (0..width).map(|i| format!("c{i}")).collect(),
            rows: values.len() / width,
            values,
        }
    }

    #[test]
    fn test_logistic_regression_reports_classification_metrics() {
        let values: Vec<f32> = (0..40).map(|i| i as f32).collect();
        let indices = (0..40).map(|i| usize::from(i >= 20)).collect();
        let target = TargetVector::Labels {
            classes: vec!["low".to_string(), "high".to_string()],
            indices,
        };
        let params = GradientParams {
            epochs: 100,
            ..GradientParams::default()
        };

        let outcome = BurnBackend::new()
            .train(request(
                matrix(values, 1),
                Some(target),
                TaskType::Classification,
                FamilyParams::LogisticRegression(params),
            ))
            .expect("training succeeds");

        let keys: Vec<&String> = outcome.metrics.keys().collect();
        assert_eq!(keys, ["accuracy", "precision", "recall", "f1"]);
        let accuracy = outcome.metrics["accuracy"].as_f64().expect("numeric accuracy");
        assert!(accuracy >= 0.75, "accuracy {accuracy}");
    }

    #[test]
    fn test_neural_network_regression() {
        let values: Vec<f32> = (0..30).map(|i| i as f32 / 3.0).collect();
        let target = TargetVector::Values(values.iter().map(|x| 3.0 * x - 2.0).collect());
        let params = NetworkParams {
            gradient: GradientParams {
                epochs: 20,
                ..GradientParams::default()
            },
            hidden_size_1: 8,
            hidden_size_2: 4,
        };

        let outcome = BurnBackend::new()
            .train(request(
                matrix(values, 1),
                Some(target),
                TaskType::Regression,
                FamilyParams::NeuralNetwork(params),
            ))
            .expect("training succeeds");

        let keys: Vec<&String> = outcome.metrics.keys().collect();
        assert_eq!(keys, ["mae", "mse", "rmse", "r2"]);
        assert!(matches!(
            outcome.handle,
            TrainedModel::Network { classes: None, .. }
        ));
    }

    #[test]
    fn test_supervised_without_target_fails() {
        let result = BurnBackend::new().train(request(
            matrix(vec![1.0, 2.0], 1),
            None,
            TaskType::Regression,
            FamilyParams::LinearRegression(GradientParams::default()),
        ));
        assert!(matches!(result, Err(TrainingError::MissingTarget)));
        assert_eq!(
            result.map(|_| ()).map_err(|e| e.to_string()),
            Err("target column required".to_string())
        );
    }

    #[test]
    fn test_family_must_support_task() {
        let result = BurnBackend::new().train(request(
            matrix(vec![1.0, 2.0], 1),
            None,
            TaskType::Clustering,
            FamilyParams::Pca(PcaParams::default()),
        ));
        assert!(matches!(result, Err(TrainingError::Unsupported { .. })));
    }

    #[test]
    fn test_kmeans_metrics() {
        let features = matrix(vec![0.0, 0.1, 0.2, 5.0, 5.1, 5.2], 1);
        let params = KMeansParams {
            n_clusters: 2,
            ..KMeansParams::default()
        };

        let outcome = BurnBackend::new()
            .train(request(features, None, TaskType::Clustering, FamilyParams::KMeans(params)))
            .expect("clustering succeeds");

        let keys: Vec<&String> = outcome.metrics.keys().collect();
        assert_eq!(keys, ["inertia", "n_clusters", "silhouette_score"]);
        assert_eq!(outcome.metrics["n_clusters"], serde_json::json!(2));
    }

    #[test]
    fn test_pca_metrics() {
        let features = matrix(vec![1.0, 2.0, 2.0, 4.1, 3.0, 5.9, 4.0, 8.0], 2);

        let outcome = BurnBackend::new()
            .train(request(
                features,
                None,
                TaskType::DimensionalityReduction,
                FamilyParams::Pca(PcaParams { n_components: 1 }),
            ))
            .expect("pca succeeds");

        let ratios = outcome.metrics["explained_variance_ratio"]
            .as_array()
            .expect("ratio list");
        assert_eq!(ratios.len(), 1);
        assert_eq!(outcome.metrics["n_components"], serde_json::json!(1));
    }
}
