use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{FeatureEncoding, FeatureSpec, Label};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub label: Label,
    pub verdict: String,
    pub headline: String,
    #[serde(default)]
    pub probabilities: Option<[f64; 2]>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub confidence_line: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub index: usize,
    pub name: String,
    pub label: String,
    pub hint: String,
    pub encoding: FeatureEncoding,
}

impl FeatureDescriptor {
    pub fn new(index: usize, spec: &FeatureSpec) -> Self {
        Self {
            index,
            name: spec.name.to_string(),
            label: spec.label(),
            hint: spec.hint.to_string(),
            encoding: spec.encoding,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    #[serde(default)]
    pub tree_count: Option<usize>,
}
