use serde::{Deserialize, Serialize};

use crate::error::FeatureInputError;

pub const FEATURE_COUNT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureEncoding {
    Flag,
    Count,
    Ratio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: &'static str,
    pub hint: &'static str,
    pub encoding: FeatureEncoding,
}

impl FeatureSpec {
    /// Human readable label, e.g. `having IP Address`.
    pub fn label(&self) -> String {
        self.name.replace('_', " ")
    }
}

macro_rules! feature {
    ($name:literal, $encoding:ident, $hint:literal) => {
        FeatureSpec {
            name: $name,
            hint: $hint,
            encoding: FeatureEncoding::$encoding,
        }
    };
}

/// Features in the order the classifier was trained on.
pub static FEATURES: [FeatureSpec; FEATURE_COUNT] = [
    feature!(
        "having_IP_Address",
        Flag,
        "Is an IP address used instead of a domain? (0=No, 1=Yes)"
    ),
    feature!("URL_Length", Count, "Number of characters in the URL."),
    feature!(
        "Shortining_Service",
        Flag,
        "URL shortener used? (0=No, 1=Yes)"
    ),
    feature!(
        "having_Sub_Domain",
        Flag,
        "Multiple subdomains present? (0=No, 1=Yes)"
    ),
    feature!("no_of_dot", Count, "Number of dots in the URL."),
    feature!(
        "double_slash_redirecting",
        Flag,
        "Contains '//' after protocol? (0=No, 1=Yes)"
    ),
    feature!("no_of_ports", Count, "Number of ports present in the URL."),
    feature!(
        "on_mouseover",
        Flag,
        "Uses onmouseover to hide links? (0=No, 1=Yes)"
    ),
    feature!("RightClick", Flag, "Is right-click disabled? (0=No, 1=Yes)"),
    feature!("URL_of_Anchor", Ratio, "Ratio of anchor URLs to total URLs."),
    feature!("Links_in_tags", Ratio, "Ratio of links in common HTML tags."),
    feature!(
        "SFH",
        Flag,
        "Form handler submits to external URL? (0=No, 1=Yes)"
    ),
    feature!(
        "Submitting_to_email",
        Flag,
        "Form submits to email? (0=No, 1=Yes)"
    ),
    feature!("Redirect", Count, "Number of redirects."),
    feature!(
        "DNSRecord",
        Flag,
        "Domain has valid DNS record? (0=No, 1=Yes)"
    ),
    feature!("Abnormal_URL", Flag, "URL looks abnormal? (0=No, 1=Yes)"),
];

pub fn feature_index(name: &str) -> Option<usize> {
    FEATURES.iter().position(|spec| spec.name == name)
}

/// Parses one submitted value. Blank input counts as zero.
pub fn parse_feature_value(feature: &str, raw: &str) -> Result<f64, FeatureInputError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(FeatureInputError::InvalidNumber {
            feature: feature.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn zeros() -> Self {
        Self([0.0; FEATURE_COUNT])
    }

    pub fn from_slice(values: &[f64]) -> Result<Self, FeatureInputError> {
        let values: [f64; FEATURE_COUNT] =
            values
                .try_into()
                .map_err(|_| FeatureInputError::WrongLength {
                    expected: FEATURE_COUNT,
                    actual: values.len(),
                })?;
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        feature_index(name).map(|idx| self.0[idx])
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<(), FeatureInputError> {
        let idx = feature_index(name).ok_or_else(|| FeatureInputError::UnknownFeature {
            name: name.to_string(),
        })?;
        self.0[idx] = value;
        Ok(())
    }

    pub fn iter_named(&self) -> impl Iterator<Item = (&'static FeatureSpec, f64)> + '_ {
        FEATURES.iter().zip(self.0.iter().copied())
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Label {
    Benign,
    Phishing,
}

impl Label {
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Benign),
            1 => Some(Self::Phishing),
            _ => None,
        }
    }

    /// Class index, also the position of this label's probability.
    pub fn index(self) -> usize {
        match self {
            Self::Benign => 0,
            Self::Phishing => 1,
        }
    }

    pub fn verdict(self) -> &'static str {
        match self {
            Self::Benign => "not_phishing",
            Self::Phishing => "phishing",
        }
    }
}

impl TryFrom<u8> for Label {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value as usize).ok_or_else(|| format!("label must be 0 or 1, got {value}"))
    }
}

impl From<Label> for u8 {
    fn from(value: Label) -> Self {
        value.index() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub probabilities: Option<[f64; 2]>,
}

impl Prediction {
    /// Probability of the predicted label, if the classifier produced any.
    pub fn confidence(&self) -> Option<f64> {
        self.probabilities.map(|p| p[self.label.index()])
    }
}
