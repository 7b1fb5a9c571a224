use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};

use model::{Classifier, InferenceError};
use shared::{
    domain::{
        feature_index, parse_feature_value, FeatureSpec, FeatureVector, Label, Prediction,
        FEATURES, FEATURE_COUNT,
    },
    error::{ApiError, ErrorCode, FeatureInputError},
    protocol::{FeatureDescriptor, ModelInfo, PredictRequest, PredictResponse},
};
use tracing::{error, info, warn};

const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Clone)]
pub struct ApiContext {
    pub classifier: Arc<dyn Classifier>,
}

impl ApiContext {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_type: self.classifier.model_type().to_string(),
            tree_count: self.classifier.tree_count(),
        }
    }
}

/// Submitted form values, kept as typed so they can be echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInputs {
    raw: [String; FEATURE_COUNT],
}

impl FormInputs {
    pub fn blank() -> Self {
        Self {
            raw: std::array::from_fn(|_| "0".to_string()),
        }
    }

    /// Fields outside the catalogue are ignored; missing ones stay blank.
    pub fn from_fields<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut raw: [String; FEATURE_COUNT] = Default::default();
        for (name, value) in fields {
            if let Some(idx) = feature_index(name.as_ref()) {
                raw[idx] = value.into();
            }
        }
        Self { raw }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static FeatureSpec, &str)> + '_ {
        FEATURES.iter().zip(self.raw.iter().map(String::as_str))
    }

    pub fn to_vector(&self) -> Result<FeatureVector, FeatureInputError> {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, (spec, raw)) in values.iter_mut().zip(self.iter()) {
            *slot = parse_feature_value(spec.name, raw)?;
        }
        Ok(FeatureVector::new(values))
    }
}

/// Unlike the HTML form, the JSON surface rejects unknown feature names.
pub fn json_inputs(request: &PredictRequest) -> Result<FeatureVector, FeatureInputError> {
    let mut features = FeatureVector::zeros();
    for (name, value) in &request.features {
        if !value.is_finite() {
            return Err(FeatureInputError::InvalidNumber {
                feature: name.clone(),
                value: value.to_string(),
            });
        }
        features.set(name, *value)?;
    }
    Ok(features)
}

/// Invokes the classifier once. Errors and panics raised by the classifier
/// come back as [`InferenceError`].
pub fn run_prediction(
    ctx: &ApiContext,
    features: &FeatureVector,
) -> Result<Prediction, InferenceError> {
    let started = Instant::now();
    let classifier = ctx.classifier.as_ref();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let label = classifier.predict(features)?;
        let probabilities = classifier.predict_proba(features)?;
        Ok::<_, InferenceError>(Prediction {
            label,
            probabilities,
        })
    }))
    .unwrap_or_else(|payload| Err(InferenceError::Failed(panic_message(payload))))
    .and_then(check_probabilities);

    let elapsed_us = started.elapsed().as_micros() as u64;
    match &result {
        Ok(prediction) => info!(
            verdict = prediction.label.verdict(),
            confidence = ?prediction.confidence(),
            elapsed_us,
            "prediction served"
        ),
        Err(error) => error!(%error, elapsed_us, "prediction failed"),
    }
    result
}

fn check_probabilities(prediction: Prediction) -> Result<Prediction, InferenceError> {
    if let Some(probabilities) = prediction.probabilities {
        let in_range = probabilities
            .iter()
            .all(|p| p.is_finite() && (0.0..=1.0).contains(p));
        let sum: f64 = probabilities.iter().sum();
        if !in_range || (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(InferenceError::InvalidProbabilities { probabilities });
        }
    }
    Ok(prediction)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "classifier panicked".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Phishing,
    NotPhishing,
}

impl Panel {
    pub fn css_class(self) -> &'static str {
        match self {
            Panel::Phishing => "result-phishing",
            Panel::NotPhishing => "result-not-phishing",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    pub panel: Panel,
    pub headline: &'static str,
    pub confidence_line: Option<String>,
}

pub fn present(prediction: &Prediction) -> ResultView {
    let (panel, headline, class_name) = match prediction.label {
        Label::Phishing => (Panel::Phishing, "PHISHING DETECTED!", "Phishing"),
        Label::Benign => (Panel::NotPhishing, "NO PHISHING DETECTED.", "Not Phishing"),
    };
    ResultView {
        panel,
        headline,
        confidence_line: prediction
            .confidence()
            .map(|p| format!("Confidence ({class_name}): {:.2}%", p * 100.0)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormOutcome {
    Unsubmitted,
    Shown(ResultView),
    Rejected(String),
    Failed(String),
}

pub fn submit_form(ctx: &ApiContext, inputs: &FormInputs) -> FormOutcome {
    let features = match inputs.to_vector() {
        Ok(features) => features,
        Err(error) => {
            warn!(%error, "form submission rejected");
            return FormOutcome::Rejected(error.to_string());
        }
    };
    match run_prediction(ctx, &features) {
        Ok(prediction) => FormOutcome::Shown(present(&prediction)),
        Err(error) => FormOutcome::Failed(format!("Error during prediction: {error}")),
    }
}

pub fn predict(ctx: &ApiContext, request: &PredictRequest) -> Result<PredictResponse, ApiError> {
    let features = json_inputs(request).map_err(|error| {
        warn!(%error, "prediction request rejected");
        ApiError::from(error)
    })?;
    let prediction = run_prediction(ctx, &features).map_err(internal)?;
    let view = present(&prediction);
    Ok(PredictResponse {
        label: prediction.label,
        verdict: prediction.label.verdict().to_string(),
        headline: view.headline.to_string(),
        probabilities: prediction.probabilities,
        confidence: prediction.confidence(),
        confidence_line: view.confidence_line,
    })
}

pub fn feature_catalogue() -> Vec<FeatureDescriptor> {
    FEATURES
        .iter()
        .enumerate()
        .map(|(index, spec)| FeatureDescriptor::new(index, spec))
        .collect()
}

fn internal(err: InferenceError) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Scripted {
        label: Label,
        probabilities: Option<[f64; 2]>,
        seen: Mutex<Vec<[f64; FEATURE_COUNT]>>,
    }

    impl Scripted {
        fn new(label: Label, probabilities: Option<[f64; 2]>) -> Arc<Self> {
            Arc::new(Self {
                label,
                probabilities,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Classifier for Scripted {
        fn model_type(&self) -> &str {
            "scripted"
        }

        fn predict(&self, features: &FeatureVector) -> Result<Label, InferenceError> {
            self.seen.lock().expect("lock").push(*features.values());
            Ok(self.label)
        }

        fn predict_proba(
            &self,
            _features: &FeatureVector,
        ) -> Result<Option<[f64; 2]>, InferenceError> {
            Ok(self.probabilities)
        }
    }

    struct LabelOnly;

    impl Classifier for LabelOnly {
        fn model_type(&self) -> &str {
            "label-only"
        }

        fn predict(&self, _features: &FeatureVector) -> Result<Label, InferenceError> {
            Ok(Label::Benign)
        }
    }

    struct Failing;

    impl Classifier for Failing {
        fn model_type(&self) -> &str {
            "failing"
        }

        fn predict(&self, _features: &FeatureVector) -> Result<Label, InferenceError> {
            Err(InferenceError::Failed(
                "X has 15 features, but model is expecting 16".into(),
            ))
        }
    }

    struct Panicking;

    impl Classifier for Panicking {
        fn model_type(&self) -> &str {
            "panicking"
        }

        fn predict(&self, _features: &FeatureVector) -> Result<Label, InferenceError> {
            panic!("tree walk exploded")
        }
    }

    const SCENARIO: [f64; FEATURE_COUNT] = [
        1.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.5, 0.5, 1.0, 0.0, 0.0, 0.0, 1.0,
    ];

    fn scenario_fields() -> Vec<(&'static str, String)> {
        FEATURES
            .iter()
            .zip(SCENARIO)
            .map(|(spec, v)| (spec.name, v.to_string()))
            .collect()
    }

    #[test]
    fn documented_scenario_shows_phishing_with_eighty_percent() {
        let scripted = Scripted::new(Label::Phishing, Some([0.2, 0.8]));
        let ctx = ApiContext::new(scripted.clone());

        let outcome = submit_form(&ctx, &FormInputs::from_fields(scenario_fields()));

        assert_eq!(
            outcome,
            FormOutcome::Shown(ResultView {
                panel: Panel::Phishing,
                headline: "PHISHING DETECTED!",
                confidence_line: Some("Confidence (Phishing): 80.00%".into()),
            })
        );
        assert_eq!(scripted.seen.lock().expect("lock").as_slice(), &[SCENARIO]);
    }

    #[test]
    fn vector_assembly_follows_training_order_regardless_of_field_order() {
        let scripted = Scripted::new(Label::Benign, None);
        let ctx = ApiContext::new(scripted.clone());
        let mut fields = scenario_fields();
        fields.reverse();
        fields.push(("submit", "Predict if Phishing".into()));

        submit_form(&ctx, &FormInputs::from_fields(fields));

        let seen = scripted.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], SCENARIO);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let inputs = FormInputs::from_fields([("Redirect", "2")]);
        let features = inputs.to_vector().expect("vector");
        let mut expected = [0.0; FEATURE_COUNT];
        expected[13] = 2.0;
        assert_eq!(features.values(), &expected);
        assert_eq!(FormInputs::blank().to_vector().expect("blank"), FeatureVector::zeros());
    }

    #[test]
    fn benign_label_selects_not_phishing_panel_with_index_zero() {
        let view = present(&Prediction {
            label: Label::Benign,
            probabilities: Some([0.913, 0.087]),
        });
        assert_eq!(view.panel, Panel::NotPhishing);
        assert_eq!(view.headline, "NO PHISHING DETECTED.");
        assert_eq!(
            view.confidence_line.as_deref(),
            Some("Confidence (Not Phishing): 91.30%")
        );
    }

    #[test]
    fn panel_mapping_is_exhaustive_and_exclusive() {
        for (label, panel) in [
            (Label::Phishing, Panel::Phishing),
            (Label::Benign, Panel::NotPhishing),
        ] {
            for probabilities in [None, Some([0.5, 0.5]), Some([0.99, 0.01])] {
                let view = present(&Prediction {
                    label,
                    probabilities,
                });
                assert_eq!(view.panel, panel);
            }
        }
    }

    #[test]
    fn missing_probability_capability_omits_confidence_line() {
        let ctx = ApiContext::new(Arc::new(LabelOnly));
        let outcome = submit_form(&ctx, &FormInputs::blank());
        match outcome {
            FormOutcome::Shown(view) => {
                assert_eq!(view.panel, Panel::NotPhishing);
                assert!(view.confidence_line.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn classifier_error_becomes_visible_message_and_form_stays_usable() {
        let ctx = ApiContext::new(Arc::new(Failing));
        for _ in 0..2 {
            match submit_form(&ctx, &FormInputs::blank()) {
                FormOutcome::Failed(message) => {
                    assert!(message.starts_with("Error during prediction:"));
                    assert!(message.contains("expecting 16"));
                }
                other => panic!("unexpected outcome {other:?}"),
            }
        }
    }

    #[test]
    fn classifier_panic_is_caught() {
        let ctx = ApiContext::new(Arc::new(Panicking));
        let err = run_prediction(&ctx, &FeatureVector::zeros()).expect_err("panic");
        assert_eq!(err, InferenceError::Failed("tree walk exploded".into()));
    }

    #[test]
    fn probabilities_not_summing_to_one_are_rejected() {
        let ctx = ApiContext::new(Scripted::new(Label::Phishing, Some([0.3, 0.8])));
        let err = run_prediction(&ctx, &FeatureVector::zeros()).expect_err("bad sum");
        assert!(matches!(err, InferenceError::InvalidProbabilities { .. }));
    }

    #[test]
    fn out_of_range_probabilities_are_rejected_even_when_summing_to_one() {
        let ctx = ApiContext::new(Scripted::new(Label::Phishing, Some([-0.5, 1.5])));
        let err = run_prediction(&ctx, &FeatureVector::zeros()).expect_err("out of range");
        assert!(matches!(
            err,
            InferenceError::InvalidProbabilities { probabilities } if probabilities == [-0.5, 1.5]
        ));
    }

    #[test]
    fn non_finite_probabilities_are_rejected() {
        for probabilities in [[f64::NAN, 1.0], [0.0, f64::INFINITY]] {
            let ctx = ApiContext::new(Scripted::new(Label::Phishing, Some(probabilities)));
            let err = run_prediction(&ctx, &FeatureVector::zeros()).expect_err("non-finite");
            assert!(matches!(err, InferenceError::InvalidProbabilities { .. }));
        }
    }

    #[test]
    fn unparsable_form_value_is_rejected_before_inference() {
        let scripted = Scripted::new(Label::Phishing, Some([0.2, 0.8]));
        let ctx = ApiContext::new(scripted.clone());
        let outcome = submit_form(&ctx, &FormInputs::from_fields([("URL_Length", "long")]));
        assert_eq!(
            outcome,
            FormOutcome::Rejected("value 'long' for URL_Length is not a number".into())
        );
        assert!(scripted.seen.lock().expect("lock").is_empty());
    }

    #[test]
    fn json_predict_reports_label_and_confidence() {
        let ctx = ApiContext::new(Scripted::new(Label::Phishing, Some([0.2, 0.8])));
        let request = PredictRequest {
            features: [("SFH".to_string(), 1.0)].into_iter().collect(),
        };
        let response = predict(&ctx, &request).expect("response");
        assert_eq!(response.label, Label::Phishing);
        assert_eq!(response.verdict, "phishing");
        assert_eq!(response.confidence, Some(0.8));
        assert_eq!(
            response.confidence_line.as_deref(),
            Some("Confidence (Phishing): 80.00%")
        );
    }

    #[test]
    fn json_predict_rejects_unknown_feature() {
        let ctx = ApiContext::new(Scripted::new(Label::Benign, None));
        let request = PredictRequest {
            features: [("_of_dot".to_string(), 1.0)].into_iter().collect(),
        };
        let err = predict(&ctx, &request).expect_err("unknown feature");
        assert_eq!(err.code, ErrorCode::Validation);
    }

    #[test]
    fn json_predict_maps_inference_failure_to_internal() {
        let ctx = ApiContext::new(Arc::new(Failing));
        let err = predict(&ctx, &PredictRequest::default()).expect_err("failure");
        assert_eq!(err.code, ErrorCode::Internal);
    }

    #[test]
    fn catalogue_lists_all_features_in_order() {
        let catalogue = feature_catalogue();
        assert_eq!(catalogue.len(), FEATURE_COUNT);
        assert_eq!(catalogue[4].name, "no_of_dot");
        assert_eq!(catalogue[4].hint, "Number of dots in the URL.");
        assert_eq!(catalogue[6].label, "no of ports");
    }

    #[test]
    fn model_info_comes_from_classifier() {
        let ctx = ApiContext::new(Arc::new(LabelOnly));
        let info = ctx.model_info();
        assert_eq!(info.model_type, "label-only");
        assert_eq!(info.tree_count, None);
    }
}
