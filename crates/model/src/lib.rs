use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use shared::domain::{FeatureVector, Label};
use thiserror::Error;
use tracing::info;

mod forest;

pub use forest::{ArtifactError, ForestSummary, NodeDefect, RandomForest};

pub const DEFAULT_MODEL_PATH: &str = "random_forest_model.json";

/// A loaded binary classifier. Implementations are immutable after load and
/// may be shared across request handlers.
pub trait Classifier: Send + Sync {
    fn model_type(&self) -> &str;

    fn tree_count(&self) -> Option<usize> {
        None
    }

    fn predict(&self, features: &FeatureVector) -> Result<Label, InferenceError>;

    /// Class probabilities `[benign, phishing]`. `Ok(None)` means the model
    /// has no probability estimate.
    fn predict_proba(&self, features: &FeatureVector) -> Result<Option<[f64; 2]>, InferenceError> {
        let _ = features;
        Ok(None)
    }
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found at '{}'", .path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read model artifact '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("model artifact '{}' is not valid JSON", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("model artifact '{}' is invalid", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: ArtifactError,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("feature {feature} has a non-finite value")]
    NonFiniteInput { feature: String },
    #[error("classifier returned invalid probabilities {probabilities:?}")]
    InvalidProbabilities { probabilities: [f64; 2] },
    #[error("classifier failed: {0}")]
    Failed(String),
}

pub fn load_random_forest(path: impl AsRef<Path>) -> Result<RandomForest, ModelLoadError> {
    let path = path.as_ref();
    let raw = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ModelLoadError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ModelLoadError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let forest = RandomForest::from_json_slice(&raw).map_err(|err| match err {
        forest::DecodeError::Json(source) => ModelLoadError::Parse {
            path: path.to_path_buf(),
            source,
        },
        forest::DecodeError::Artifact(source) => ModelLoadError::Invalid {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let summary = forest.summary();
    info!(
        path = %path.display(),
        trees = summary.tree_count,
        nodes = summary.total_nodes,
        max_depth = summary.max_depth,
        "model artifact loaded"
    );
    Ok(forest)
}

/// Loads the artifact at `path` behind the [`Classifier`] interface.
pub fn load_classifier(path: impl AsRef<Path>) -> Result<Arc<dyn Classifier>, ModelLoadError> {
    Ok(Arc::new(load_random_forest(path)?))
}

#[cfg(test)]
#[path = "tests/forest_tests.rs"]
mod tests;
