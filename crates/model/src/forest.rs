use serde::Deserialize;
use shared::domain::{FeatureVector, Label, FEATURES, FEATURE_COUNT};
use thiserror::Error;

use crate::{Classifier, InferenceError};

const MODEL_TYPE: &str = "random_forest";
const CLASSES: [i64; 2] = [0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NodeDefect {
    #[error("split feature {0} is out of range")]
    FeatureOutOfRange(usize),
    #[error("split threshold is not finite")]
    NonFiniteThreshold,
    #[error("child {0} must come after its parent and inside the tree")]
    BadChild(usize),
    #[error("leaf holds {0} class weights, expected 2")]
    LeafWidth(usize),
    #[error("leaf weights must be finite, non-negative and not all zero")]
    LeafWeights,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArtifactError {
    #[error("unsupported model type '{0}'")]
    UnsupportedModelType(String),
    #[error("expected 16 features, artifact declares {0}")]
    FeatureCount(usize),
    #[error("feature {index} is '{found}', expected '{expected}'")]
    FeatureOrder {
        index: usize,
        expected: &'static str,
        found: String,
    },
    #[error("classes must be [0, 1], found {0:?}")]
    Classes(Vec<i64>),
    #[error("artifact contains no trees")]
    NoTrees,
    #[error("tree {0} has no nodes")]
    EmptyTree(usize),
    #[error("tree {tree} node {node}: {defect}")]
    Node {
        tree: usize,
        node: usize,
        defect: NodeDefect,
    },
}

#[derive(Debug)]
pub(crate) enum DecodeError {
    Json(serde_json::Error),
    Artifact(ArtifactError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Deserialize)]
struct RawForest {
    model_type: String,
    n_features: usize,
    classes: Vec<i64>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    trees: Vec<Tree>,
}

/// Fitted random forest exported from scikit-learn. Construction validates
/// every tree, so evaluation never indexes out of bounds or loops.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<Tree>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForestSummary {
    pub model_type: &'static str,
    pub tree_count: usize,
    pub total_nodes: usize,
    pub max_depth: usize,
    pub feature_names: Vec<&'static str>,
}

impl RandomForest {
    pub(crate) fn from_json_slice(raw: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawForest = serde_json::from_slice(raw).map_err(DecodeError::Json)?;
        Self::try_from(raw).map_err(DecodeError::Artifact)
    }

    pub fn summary(&self) -> ForestSummary {
        ForestSummary {
            model_type: MODEL_TYPE,
            tree_count: self.trees.len(),
            total_nodes: self.trees.iter().map(|tree| tree.nodes.len()).sum(),
            max_depth: self.trees.iter().map(depth).max().unwrap_or(0),
            feature_names: FEATURES.iter().map(|spec| spec.name).collect(),
        }
    }

    fn probabilities(&self, features: &FeatureVector) -> Result<[f64; 2], InferenceError> {
        let x = features.values();
        if let Some((spec, _)) = features.iter_named().find(|(_, v)| !v.is_finite()) {
            return Err(InferenceError::NonFiniteInput {
                feature: spec.name.to_string(),
            });
        }

        let mut acc = [0.0_f64; 2];
        for tree in &self.trees {
            let value = leaf(tree, x);
            let total = value[0] + value[1];
            acc[0] += value[0] / total;
            acc[1] += value[1] / total;
        }
        let n = self.trees.len() as f64;
        Ok([acc[0] / n, acc[1] / n])
    }
}

impl TryFrom<RawForest> for RandomForest {
    type Error = ArtifactError;

    fn try_from(raw: RawForest) -> Result<Self, Self::Error> {
        if raw.model_type != MODEL_TYPE {
            return Err(ArtifactError::UnsupportedModelType(raw.model_type));
        }
        if raw.n_features != FEATURE_COUNT {
            return Err(ArtifactError::FeatureCount(raw.n_features));
        }
        if let Some(names) = &raw.feature_names {
            if names.len() != FEATURE_COUNT {
                return Err(ArtifactError::FeatureCount(names.len()));
            }
            for (index, (spec, found)) in FEATURES.iter().zip(names).enumerate() {
                if spec.name != found.as_str() {
                    return Err(ArtifactError::FeatureOrder {
                        index,
                        expected: spec.name,
                        found: found.clone(),
                    });
                }
            }
        }
        if raw.classes != CLASSES {
            return Err(ArtifactError::Classes(raw.classes));
        }
        if raw.trees.is_empty() {
            return Err(ArtifactError::NoTrees);
        }
        for (tree_idx, tree) in raw.trees.iter().enumerate() {
            validate_tree(tree_idx, tree)?;
        }

        Ok(Self { trees: raw.trees })
    }
}

fn validate_tree(tree_idx: usize, tree: &Tree) -> Result<(), ArtifactError> {
    if tree.nodes.is_empty() {
        return Err(ArtifactError::EmptyTree(tree_idx));
    }
    let node_count = tree.nodes.len();
    for (node_idx, node) in tree.nodes.iter().enumerate() {
        let defect = match node {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= FEATURE_COUNT {
                    Some(NodeDefect::FeatureOutOfRange(*feature))
                } else if !threshold.is_finite() {
                    Some(NodeDefect::NonFiniteThreshold)
                } else {
                    // Children strictly after the parent keeps every walk finite.
                    [*left, *right]
                        .into_iter()
                        .find(|child| *child <= node_idx || *child >= node_count)
                        .map(NodeDefect::BadChild)
                }
            }
            Node::Leaf { value } => {
                if value.len() != CLASSES.len() {
                    Some(NodeDefect::LeafWidth(value.len()))
                } else if value.iter().any(|w| !w.is_finite() || *w < 0.0)
                    || value.iter().sum::<f64>() <= 0.0
                {
                    Some(NodeDefect::LeafWeights)
                } else {
                    None
                }
            }
        };
        if let Some(defect) = defect {
            return Err(ArtifactError::Node {
                tree: tree_idx,
                node: node_idx,
                defect,
            });
        }
    }
    Ok(())
}

fn leaf<'a>(tree: &'a Tree, x: &[f64; FEATURE_COUNT]) -> &'a [f64] {
    let mut idx = 0;
    loop {
        match &tree.nodes[idx] {
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                idx = if x[*feature] <= *threshold {
                    *left
                } else {
                    *right
                };
            }
            Node::Leaf { value } => return value,
        }
    }
}

fn depth(tree: &Tree) -> usize {
    let mut max_depth = 0;
    let mut stack = vec![(0_usize, 0_usize)];
    while let Some((idx, d)) = stack.pop() {
        max_depth = max_depth.max(d);
        if let Node::Split { left, right, .. } = &tree.nodes[idx] {
            stack.push((*left, d + 1));
            stack.push((*right, d + 1));
        }
    }
    max_depth
}

impl Classifier for RandomForest {
    fn model_type(&self) -> &str {
        "Random Forest Classifier"
    }

    fn tree_count(&self) -> Option<usize> {
        Some(self.trees.len())
    }

    fn predict(&self, features: &FeatureVector) -> Result<Label, InferenceError> {
        let [benign, phishing] = self.probabilities(features)?;
        // Ties resolve to the first class.
        let label = if phishing > benign {
            Label::Phishing
        } else {
            Label::Benign
        };
        Ok(label)
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Option<[f64; 2]>, InferenceError> {
        self.probabilities(features).map(Some)
    }
}
