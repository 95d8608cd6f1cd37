//! Principal component analysis by power iteration.

use feature_extractor::FeatureMatrix;
use tabular_structs::PcaParams;

use crate::TrainingError;

const POWER_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-10;

/// Fitted principal components.
#[derive(Debug, Clone, PartialEq)]
pub struct Components {
    /// Unit-length component directions, strongest first.
    pub components: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
    /// Share of the total variance captured by each component.
    pub explained_variance_ratio: Vec<f64>,
}

/// Extracts the leading `params.n_components` principal components.
///
/// # Errors
///
/// Returns an error unless `n_components` is between 1 and the smaller of
/// the row and column counts.
pub fn fit(points: &FeatureMatrix, params: &PcaParams) -> Result<Components, TrainingError> {
    let width = points.width();
    let limit = points.rows.min(width);
    let wanted = params.n_components;
    if wanted == 0 || wanted > limit {
        return Err(TrainingError::InvalidInput(format!(
            "n_components={wanted} must be between 1 and min(rows, columns) = {limit}"
        )));
    }

    let mut covariance = covariance(points);
    let total_variance: f64 = (0..width).map(|i| covariance[i][i]).sum();

    let mut components = Vec::with_capacity(wanted);
    let mut explained_variance = Vec::with_capacity(wanted);

    for index in 0..wanted {
        let (eigenvalue, vector) = dominant_eigenpair(&covariance, index);

        // Deflate so the next pass finds the next strongest direction.
        for i in 0..width {
            for j in 0..width {
                covariance[i][j] -= eigenvalue * vector[i] * vector[j];
            }
        }

        explained_variance.push(eigenvalue.max(0.0));
        components.push(vector);
    }

    let explained_variance_ratio = explained_variance
        .iter()
        .map(|variance| {
            if total_variance > 0.0 {
                variance / total_variance
            } else {
                0.0
            }
        })
        .collect();

    Ok(Components {
        components,
        explained_variance,
        explained_variance_ratio,
    })
}

/// Sample covariance matrix of the columns.
fn covariance(points: &FeatureMatrix) -> Vec<Vec<f64>> {
    let width = points.width();
    let rows = points.rows;
    let mut means = vec![0.0f64; width];
    for row in 0..rows {
        for (mean, value) in means.iter_mut().zip(points.row(row)) {
            *mean += f64::from(*value) / rows as f64;
        }
    }

    let denominator = rows.saturating_sub(1).max(1) as f64;
    let mut matrix = vec![vec![0.0f64; width]; width];
    for row in 0..rows {
        let centred: Vec<f64> = points
            .row(row)
            .iter()
            .zip(&means)
            .map(|(value, mean)| f64::from(*value) - mean)
            .collect();
        for i in 0..width {
            for j in 0..width {
                matrix[i][j] += centred[i] * centred[j] / denominator;
            }
        }
    }
    matrix
}

fn dominant_eigenpair(matrix: &[Vec<f64>], index: usize) -> (f64, Vec<f64>) {
    let width = matrix.len();

    // Start from a basis-leaning vector so successive components start apart.
    let mut vector: Vec<f64> = (0..width)
        .map(|i| if i == index % width { 1.0 } else { 0.5 })
        .collect();
    normalize(&mut vector);

    for _ in 0..POWER_ITERATIONS {
        let mut next = multiply(matrix, &vector);
        if normalize(&mut next) == 0.0 {
            return (0.0, vector);
        }

        let delta: f64 = next.iter().zip(&vector).map(|(a, b)| (a - b).abs()).sum();
        vector = next;
        if delta < TOLERANCE {
            break;
        }
    }

    let eigenvalue = multiply(matrix, &vector)
        .iter()
        .zip(&vector)
        .map(|(a, b)| a * b)
        .sum();
    (eigenvalue, vector)
}

fn multiply(matrix: &[Vec<f64>], vector: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(vector).map(|(a, b)| a * b).sum())
        .collect()
}

/// Scales `vector` to unit length, returning its previous norm.
fn normalize(vector: &mut [f64]) -> f64 {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlated() -> FeatureMatrix {
        // y = 2x with a small independent z
        let mut values = Vec::new();
        for i in 0..10 {
            let x = i as f32;
            values.extend_from_slice(&[x, 2.0 * x, if i % 2 == 0 { 0.1 } else { -0.1 }]);
        }
        FeatureMatrix {
            columns: vec!["x".to_string(), "y".to_string(), "z".to_string()],
            rows: 10,
            values,
        }
    }

    #[test]
    fn test_first_component_follows_correlation() {
        let fitted = fit(&correlated(), &PcaParams { n_components: 2 }).expect("pca succeeds");

        let first = &fitted.components[0];
        let ratio = first[1] / first[0];
        assert!((ratio - 2.0).abs() < 1e-6, "direction {first:?}");
        assert!(fitted.explained_variance_ratio[0] > 0.99);
        assert!(fitted.explained_variance_ratio[0] >= fitted.explained_variance_ratio[1]);

        let total: f64 = fitted.explained_variance_ratio.iter().sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn test_too_many_components_is_rejected() {
        let result = fit(&correlated(), &PcaParams { n_components: 4 });
        assert!(matches!(result, Err(TrainingError::InvalidInput(_))));
    }
}
