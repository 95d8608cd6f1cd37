//! Typed hyperparameters per model family.
//!
//! Models store hyperparameters as an open JSON mapping. Each family
//! recognizes a fixed set of keys with documented defaults; every other key
//! is preserved in [`Hyperparameters::extra`] so newer clients can round-trip
//! settings this version does not understand.

use serde_json::{Map, Value};

use crate::{ModelFamily, ServiceError};

/// Settings shared by every gradient-trained dense network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientParams {
    /// Adam learning rate (default `0.05`)
    pub learning_rate: f64,
    /// Passes over the training rows (default `200`)
    pub epochs: usize,
    /// Rows per optimizer step (default `32`)
    pub batch_size: usize,
    /// Fraction of rows held out for evaluation (default `0.2`)
    pub test_size: f64,
}

impl Default for GradientParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            epochs: 200,
            batch_size: 32,
            test_size: 0.2,
        }
    }
}

/// Settings for the two-hidden-layer network family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkParams {
    pub gradient: GradientParams,
    /// Units in the first hidden layer (default `64`)
    pub hidden_size_1: usize,
    /// Units in the second hidden layer (default `32`)
    pub hidden_size_2: usize,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            gradient: GradientParams::default(),
            hidden_size_1: 64,
            hidden_size_2: 32,
        }
    }
}

/// Settings for k-means clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansParams {
    /// Number of clusters (default `3`)
    pub n_clusters: usize,
    /// Maximum Lloyd iterations (default `300`)
    pub max_iter: usize,
    /// Seed for centroid initialisation (default `42`)
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            max_iter: 300,
            seed: 42,
        }
    }
}

/// Settings for principal component analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcaParams {
    /// Number of components to extract (default `2`)
    pub n_components: usize,
}

impl Default for PcaParams {
    fn default() -> Self {
        Self { n_components: 2 }
    }
}

/// Recognized settings, one variant per family.
#[derive(Debug, Clone, PartialEq)]
pub enum FamilyParams {
    LogisticRegression(GradientParams),
    LinearRegression(GradientParams),
    NeuralNetwork(NetworkParams),
    KMeans(KMeansParams),
    Pca(PcaParams),
}

/// Hyperparameters of a model: recognized keys plus an open extension map.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameters {
    pub params: FamilyParams,
    pub extra: Map<String, Value>,
}

impl Hyperparameters {
    /// Default hyperparameters for a family.
    #[must_use]
    pub fn defaults(family: ModelFamily) -> Self {
        let params = match family {
            ModelFamily::LogisticRegression => {
                FamilyParams::LogisticRegression(GradientParams::default())
            }
            ModelFamily::LinearRegression => {
                FamilyParams::LinearRegression(GradientParams::default())
            }
            ModelFamily::NeuralNetwork => FamilyParams::NeuralNetwork(NetworkParams::default()),
            ModelFamily::KMeans => FamilyParams::KMeans(KMeansParams::default()),
            ModelFamily::Pca => FamilyParams::Pca(PcaParams::default()),
        };

        Self {
            params,
            extra: Map::new(),
        }
    }

    /// Parses a raw mapping for `family`, filling defaults for absent keys.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a recognized key has the wrong type or an
    /// out-of-range value.
    pub fn parse(family: ModelFamily, raw: &Map<String, Value>) -> Result<Self, ServiceError> {
        let mut reader = KeyReader::new(raw);

        let params = match family {
            ModelFamily::LogisticRegression => {
                FamilyParams::LogisticRegression(reader.gradient()?)
            }
            ModelFamily::LinearRegression => FamilyParams::LinearRegression(reader.gradient()?),
            ModelFamily::NeuralNetwork => {
                let defaults = NetworkParams::default();
                FamilyParams::NeuralNetwork(NetworkParams {
                    gradient: reader.gradient()?,
                    hidden_size_1: reader.positive("hidden_size_1", defaults.hidden_size_1)?,
                    hidden_size_2: reader.positive("hidden_size_2", defaults.hidden_size_2)?,
                })
            }
            ModelFamily::KMeans => {
                let defaults = KMeansParams::default();
                FamilyParams::KMeans(KMeansParams {
                    n_clusters: reader.positive("n_clusters", defaults.n_clusters)?,
                    max_iter: reader.positive("max_iter", defaults.max_iter)?,
                    seed: reader.unsigned("seed", defaults.seed)?,
                })
            }
            ModelFamily::Pca => FamilyParams::Pca(PcaParams {
                n_components: reader.positive("n_components", PcaParams::default().n_components)?,
            }),
        };

        Ok(Self {
            params,
            extra: reader.into_extra(),
        })
    }

    /// Family these hyperparameters belong to.
    #[must_use]
    pub const fn family(&self) -> ModelFamily {
        match self.params {
            FamilyParams::LogisticRegression(_) => ModelFamily::LogisticRegression,
            FamilyParams::LinearRegression(_) => ModelFamily::LinearRegression,
            FamilyParams::NeuralNetwork(_) => ModelFamily::NeuralNetwork,
            FamilyParams::KMeans(_) => ModelFamily::KMeans,
            FamilyParams::Pca(_) => ModelFamily::Pca,
        }
    }

    /// Flattens back into the open mapping stored on the model, defaults included.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();

        let gradient = |map: &mut Map<String, Value>, params: &GradientParams| {
            map.insert("learning_rate".into(), params.learning_rate.into());
            map.insert("epochs".into(), params.epochs.into());
            map.insert("batch_size".into(), params.batch_size.into());
            map.insert("test_size".into(), params.test_size.into());
        };

        match &self.params {
            FamilyParams::LogisticRegression(params) | FamilyParams::LinearRegression(params) => {
                gradient(&mut map, params);
            }
            FamilyParams::NeuralNetwork(params) => {
                gradient(&mut map, &params.gradient);
                map.insert("hidden_size_1".into(), params.hidden_size_1.into());
                map.insert("hidden_size_2".into(), params.hidden_size_2.into());
            }
            FamilyParams::KMeans(params) => {
                map.insert("n_clusters".into(), params.n_clusters.into());
                map.insert("max_iter".into(), params.max_iter.into());
                map.insert("seed".into(), params.seed.into());
            }
            FamilyParams::Pca(params) => {
                map.insert("n_components".into(), params.n_components.into());
            }
        }

        for (key, value) in &self.extra {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }

        map
    }
}

/// Pulls recognized keys out of a raw mapping, leaving the rest as extras.
struct KeyReader {
    remaining: Map<String, Value>,
}

impl KeyReader {
    fn new(raw: &Map<String, Value>) -> Self {
        Self {
            remaining: raw.clone(),
        }
    }

    fn into_extra(self) -> Map<String, Value> {
        self.remaining
    }

    fn gradient(&mut self) -> Result<GradientParams, ServiceError> {
        let defaults = GradientParams::default();

        let learning_rate = self.float("learning_rate", defaults.learning_rate)?;
        if learning_rate <= 0.0 {
            return Err(invalid("learning_rate", "must be greater than 0"));
        }

        let test_size = self.float("test_size", defaults.test_size)?;
        if !(0.0..1.0).contains(&test_size) {
            return Err(invalid("test_size", "must be in [0, 1)"));
        }

        Ok(GradientParams {
            learning_rate,
            epochs: self.positive("epochs", defaults.epochs)?,
            batch_size: self.positive("batch_size", defaults.batch_size)?,
            test_size,
        })
    }

    fn float(&mut self, key: &str, default: f64) -> Result<f64, ServiceError> {
        match self.remaining.remove(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_f64()
                .filter(|number| number.is_finite())
                .ok_or_else(|| invalid(key, "must be a number")),
        }
    }

    fn unsigned(&mut self, key: &str, default: u64) -> Result<u64, ServiceError> {
        match self.remaining.remove(key) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| invalid(key, "must be a non-negative integer")),
        }
    }

    fn positive(&mut self, key: &str, default: usize) -> Result<usize, ServiceError> {
        let value = self.unsigned(key, default as u64)?;
        if value == 0 {
            return Err(invalid(key, "must be at least 1"));
        }
        usize::try_from(value).map_err(|_| invalid(key, "is too large"))
    }
}

fn invalid(key: &str, reason: &str) -> ServiceError {
    ServiceError::Validation(format!("hyperparameter `{key}` {reason}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let parsed = Hyperparameters::parse(ModelFamily::KMeans, &Map::new()).expect("parse");
        assert_eq!(parsed.params, FamilyParams::KMeans(KMeansParams::default()));
        assert!(parsed.extra.is_empty());
    }

    #[test]
    fn test_recognized_and_extra_keys() {
        let raw = map(json!({"n_clusters": 5, "init": "k-means++"}));
        let parsed = Hyperparameters::parse(ModelFamily::KMeans, &raw).expect("parse");

        let FamilyParams::KMeans(params) = parsed.params else {
            panic!("expected kmeans params");
        };
        assert_eq!(params.n_clusters, 5);
        assert_eq!(parsed.extra.get("init"), Some(&json!("k-means++")));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let raw = map(json!({"epochs": "many"}));
        let err = Hyperparameters::parse(ModelFamily::LinearRegression, &raw)
            .expect_err("epochs must be numeric");
        assert!(matches!(err, ServiceError::Validation(_)));

        let raw = map(json!({"test_size": 1.5}));
        assert!(Hyperparameters::parse(ModelFamily::NeuralNetwork, &raw).is_err());

        let raw = map(json!({"n_components": 0}));
        assert!(Hyperparameters::parse(ModelFamily::Pca, &raw).is_err());
    }

    #[test]
    fn test_to_map_round_trips() {
        let raw = map(json!({"hidden_size_1": 16, "dropout": 0.1}));
        let parsed = Hyperparameters::parse(ModelFamily::NeuralNetwork, &raw).expect("parse");
        let flat = parsed.to_map();

        assert_eq!(flat.get("hidden_size_1"), Some(&json!(16)));
        assert_eq!(flat.get("hidden_size_2"), Some(&json!(32)));
        assert_eq!(flat.get("dropout"), Some(&json!(0.1)));

        let reparsed = Hyperparameters::parse(ModelFamily::NeuralNetwork, &flat).expect("parse");
        assert_eq!(reparsed, parsed);
        assert_eq!(reparsed.family(), ModelFamily::NeuralNetwork);
    }
}
