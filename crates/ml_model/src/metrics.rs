//! Evaluation metrics reported by training runs.

use feature_extractor::FeatureMatrix;
use serde_json::{Number, Value};
use tabular_structs::Metrics;

use crate::TrainingError;

/// Inserts a finite metric value.
///
/// # Errors
///
/// Returns [`TrainingError::Diverged`] for NaN or infinite values.
pub fn insert(metrics: &mut Metrics, key: &str, value: f64) -> Result<(), TrainingError> {
    let number = Number::from_f64(value).ok_or(TrainingError::Diverged)?;
    metrics.insert(key.to_string(), Value::Number(number));
    Ok(())
}

/// Accuracy plus support-weighted precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassificationMetrics {
    /// Scores `predicted` class indices against `actual` over `classes` classes.
    #[must_use]
    pub fn compute(actual: &[usize], predicted: &[usize], classes: usize) -> Self {
        let total = actual.len();
        if total == 0 {
            return Self {
                accuracy: 0.0,
                precision: 0.0,
                recall: 0.0,
                f1: 0.0,
            };
        }

        let mut true_positive = vec![0usize; classes];
        let mut predicted_count = vec![0usize; classes];
        let mut support = vec![0usize; classes];

        for (&truth, &guess) in actual.iter().zip(predicted) {
            support[truth] += 1;
            predicted_count[guess] += 1;
            if truth == guess {
                true_positive[truth] += 1;
            }
        }

        let correct: usize = true_positive.iter().sum();
        let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);

        for class in 0..classes {
            let weight = support[class] as f64 / total as f64;
            let p = ratio(true_positive[class], predicted_count[class]);
            let r = ratio(true_positive[class], support[class]);
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

            precision += weight * p;
            recall += weight * r;
            f1 += weight * f;
        }

        Self {
            accuracy: correct as f64 / total as f64,
            precision,
            recall,
            f1,
        }
    }

    /// Converts to the metrics mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is not finite.
    pub fn into_metrics(self) -> Result<Metrics, TrainingError> {
        let mut metrics = Metrics::new();
        insert(&mut metrics, "accuracy", self.accuracy)?;
        insert(&mut metrics, "precision", self.precision)?;
        insert(&mut metrics, "recall", self.recall)?;
        insert(&mut metrics, "f1", self.f1)?;
        Ok(metrics)
    }
}

/// Error measures for continuous predictions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    #[must_use]
    pub fn compute(actual: &[f32], predicted: &[f32]) -> Self {
        let n = actual.len().max(1) as f64;
        let mean = actual.iter().map(|&y| f64::from(y)).sum::<f64>() / n;

        let (mut abs_error, mut squared_error, mut total_variance) = (0.0, 0.0, 0.0);
        for (&y, &p) in actual.iter().zip(predicted) {
            let residual = f64::from(y) - f64::from(p);
            abs_error += residual.abs();
            squared_error += residual * residual;
            total_variance += (f64::from(y) - mean).powi(2);
        }

        let mse = squared_error / n;
        let r2 = if total_variance > 0.0 {
            1.0 - squared_error / total_variance
        } else if squared_error == 0.0 {
            1.0
        } else {
            0.0
        };

        Self {
            mae: abs_error / n,
            mse,
            rmse: mse.sqrt(),
            r2,
        }
    }

    /// Converts to the metrics mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is not finite.
    pub fn into_metrics(self) -> Result<Metrics, TrainingError> {
        let mut metrics = Metrics::new();
        insert(&mut metrics, "mae", self.mae)?;
        insert(&mut metrics, "mse", self.mse)?;
        insert(&mut metrics, "rmse", self.rmse)?;
        insert(&mut metrics, "r2", self.r2)?;
        Ok(metrics)
    }
}

/// Mean silhouette coefficient of a clustering.
///
/// Defined as 0 unless there are at least two clusters and fewer clusters
/// than points.
#[must_use]
pub fn silhouette_score(points: &FeatureMatrix, labels: &[usize], clusters: usize) -> f64 {
    let n = points.rows;
    if clusters < 2 || clusters >= n {
        return 0.0;
    }

    let mut sizes = vec![0usize; clusters];
    for &label in labels {
        sizes[label] += 1;
    }

    let mut total = 0.0;
    let mut sums = vec![0.0f64; clusters];
    for i in 0..n {
        sums.iter_mut().for_each(|sum| *sum = 0.0);
        for j in 0..n {
            if i != j {
                sums[labels[j]] += f64::from(squared_distance(points.row(i), points.row(j))).sqrt();
            }
        }

        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }

        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..clusters)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        if b.is_finite() && a.max(b) > 0.0 {
            total += (b - a) / a.max(b);
        }
    }

    total / n as f64
}

/// Squared Euclidean distance between two rows.
#[must_use]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
