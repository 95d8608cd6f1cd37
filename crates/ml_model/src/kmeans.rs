//! K-means clustering with Lloyd's algorithm.

use feature_extractor::FeatureMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tabular_structs::KMeansParams;

use crate::metrics::squared_distance;
use crate::TrainingError;

/// Fitted clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub centroids: Vec<Vec<f32>>,
    /// Cluster index per input row.
    pub labels: Vec<usize>,
    /// Sum of squared distances to the assigned centroid.
    pub inertia: f64,
    pub iterations: usize,
}

/// Clusters the rows of `points`.
///
/// Centroids are seeded with k-means++ from `params.seed`, so a given input
/// always yields the same clustering.
///
/// # Errors
///
/// Returns an error if there are fewer rows than clusters.
pub fn fit(points: &FeatureMatrix, params: &KMeansParams) -> Result<Clustering, TrainingError> {
    let k = params.n_clusters;
    if k == 0 || points.rows < k {
        return Err(TrainingError::InvalidInput(format!(
            "n_clusters={k} must be between 1 and the number of rows ({})",
            points.rows
        )));
    }

    let mut centroids = seed_centroids(points, k, params.seed);
    let mut labels = vec![usize::MAX; points.rows];
    let mut iterations = 0;

    while iterations < params.max_iter.max(1) {
        iterations += 1;

        let mut changed = false;
        for (row, label) in labels.iter_mut().enumerate() {
            let nearest = nearest(&centroids, points.row(row)).0;
            if *label != nearest {
                *label = nearest;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        let width = points.width();
        let mut sums = vec![vec![0.0f64; width]; k];
        let mut counts = vec![0usize; k];
        for (row, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            for (sum, value) in sums[label].iter_mut().zip(points.row(row)) {
                *sum += f64::from(*value);
            }
        }

        // Empty clusters keep their previous centroid.
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                *centroid = sum.into_iter().map(|s| (s / count as f64) as f32).collect();
            }
        }
    }

    let inertia = (0..points.rows)
        .map(|row| f64::from(squared_distance(points.row(row), &centroids[labels[row]])))
        .sum();

    tracing::debug!(clusters = k, iterations, inertia, "K-means converged");

    Ok(Clustering {
        centroids,
        labels,
        inertia,
        iterations,
    })
}

/// Index and squared distance of the closest centroid.
fn nearest(centroids: &[Vec<f32>], point: &[f32]) -> (usize, f32) {
    centroids
        .iter()
        .enumerate()
        .map(|(index, centroid)| (index, squared_distance(point, centroid)))
        .fold((0, f32::INFINITY), |best, candidate| {
            if candidate.1 < best.1 {
                candidate
            } else {
                best
            }
        })
}

/// k-means++ seeding.
fn seed_centroids(points: &FeatureMatrix, k: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chosen = vec![rng.gen_range(0..points.rows)];

    while chosen.len() < k {
        let centroids: Vec<Vec<f32>> = chosen.iter().map(|&i| points.row(i).to_vec()).collect();
        let weights: Vec<f64> = (0..points.rows)
            .map(|row| f64::from(nearest(&centroids, points.row(row)).1))
            .collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            weights
                .iter()
                .position(|&w| {
                    target -= w;
                    target <= 0.0 && w > 0.0
                })
                .unwrap_or(points.rows - 1)
        } else {
            // All remaining rows coincide with a centroid.
            (0..points.rows)
                .find(|row| !chosen.contains(row))
                .unwrap_or(0)
        };
        chosen.push(next);
    }

    chosen.iter().map(|&i| points.row(i).to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> FeatureMatrix {
        let values = vec![
            0.0, 0.0, 0.2, 0.1, 0.1, 0.3, //
            10.0, 10.0, 10.2, 9.9, 9.8, 10.1, //
            -10.0, 5.0, -9.8, 5.2, -10.1, 4.9,
        ];
        FeatureMatrix {
            columns: vec!["x".to_string(), "y".to_string()],
            rows: values.len() / 2,
            values,
        }
    }

    #[test]
    fn test_separates_blobs() {
        let params = KMeansParams {
            n_clusters: 3,
            ..KMeansParams::default()
        };
        let clustering = fit(&blobs(), &params).expect("clustering succeeds");

        let labels = &clustering.labels;
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[5]);
        assert_eq!(labels[6], labels[8]);
        assert_ne!(labels[0], labels[3]);
        assert_ne!(labels[3], labels[6]);
        assert!(clustering.inertia < 1.0, "inertia {}", clustering.inertia);
    }

    #[test]
    fn test_seeded_runs_are_deterministic() {
        let params = KMeansParams::default();
        let first = fit(&blobs(), &params).expect("clustering succeeds");
        let second = fit(&blobs(), &params).expect("clustering succeeds");
        assert_eq!(first, second);
    }

    #[test]
    fn test_more_clusters_than_rows_is_rejected() {
        let params = KMeansParams {
            n_clusters: 10,
            ..KMeansParams::default()
        };
        assert!(matches!(fit(&blobs(), &params), Err(TrainingError::InvalidInput(_))));
    }
}
