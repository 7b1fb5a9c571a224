use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use server_api::{feature_catalogue, present, run_prediction, ApiContext};
use shared::{domain::FeatureVector, error::FeatureInputError};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = model::DEFAULT_MODEL_PATH)]
    model: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify one feature vector.
    Predict {
        /// All 16 values in training order, comma separated.
        #[arg(
            long,
            value_delimiter = ',',
            allow_hyphen_values = true,
            conflicts_with = "feature",
            value_parser = parse_value
        )]
        values: Option<Vec<f64>>,
        /// `name=value`; unset features are zero.
        #[arg(long, value_parser = parse_assignment)]
        feature: Vec<(String, f64)>,
    },
    /// Print the shape of the model artifact.
    Inspect,
    /// List the features the model expects.
    Features,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Predict { values, feature } => {
            let features = build_vector(values.as_deref(), &feature)?;
            let classifier = model::load_classifier(&cli.model)
                .with_context(|| format!("cannot load model from '{}'", cli.model.display()))?;
            let ctx = ApiContext::new(classifier);
            let prediction = run_prediction(&ctx, &features).context("error during prediction")?;
            let view = present(&prediction);
            println!("{}", view.headline);
            if let Some(line) = view.confidence_line {
                println!("{line}");
            }
        }
        Command::Inspect => {
            let forest = model::load_random_forest(&cli.model)
                .with_context(|| format!("cannot load model from '{}'", cli.model.display()))?;
            let summary = forest.summary();
            println!("model_type={}", summary.model_type);
            println!("trees={}", summary.tree_count);
            println!("nodes={}", summary.total_nodes);
            println!("max_depth={}", summary.max_depth);
            println!("features={}", summary.feature_names.join(","));
        }
        Command::Features => {
            for descriptor in feature_catalogue() {
                println!(
                    "{:>2}  {:<26} {:<6} {}",
                    descriptor.index,
                    descriptor.name,
                    format!("{:?}", descriptor.encoding).to_lowercase(),
                    descriptor.hint
                );
            }
        }
    }

    Ok(())
}

fn parse_assignment(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    let value = shared::domain::parse_feature_value(name, value).map_err(|e| e.to_string())?;
    Ok((name.to_string(), value))
}

fn parse_value(raw: &str) -> Result<f64, String> {
    shared::domain::parse_feature_value("--values", raw).map_err(|e| e.to_string())
}

fn build_vector(
    values: Option<&[f64]>,
    assignments: &[(String, f64)],
) -> Result<FeatureVector, FeatureInputError> {
    if let Some(values) = values {
        return FeatureVector::from_slice(values);
    }
    let mut features = FeatureVector::zeros();
    for (name, value) in assignments {
        features.set(name, *value)?;
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_values_list() {
        let cli = Cli::try_parse_from([
            "tools",
            "predict",
            "--values",
            "1,1,0,1,2,0,0,0,1,0.5,0.5,1,0,0,0,1",
        ])
        .expect("parse");
        let Command::Predict { values, .. } = cli.command else {
            panic!("expected predict");
        };
        let features = build_vector(values.as_deref(), &[]).expect("vector");
        assert_eq!(features.get("URL_of_Anchor"), Some(0.5));
        assert_eq!(features.get("Abnormal_URL"), Some(1.0));
    }

    #[test]
    fn non_finite_values_list_is_rejected_at_parse_time() {
        for list in ["1,NaN,0", "inf,0", "1,abc"] {
            let parsed = Cli::try_parse_from(["tools", "predict", "--values", list]);
            assert!(parsed.is_err(), "{list} should not parse");
        }
    }

    #[test]
    fn short_values_list_is_rejected() {
        let err = build_vector(Some(&[1.0, 2.0]), &[]).expect_err("short");
        assert_eq!(
            err,
            FeatureInputError::WrongLength {
                expected: 16,
                actual: 2
            }
        );
    }

    #[test]
    fn feature_assignments_fill_named_slots() {
        let assignments = vec![
            parse_assignment("no_of_dot=3").expect("assignment"),
            parse_assignment("SFH = 1").expect("assignment"),
        ];
        let features = build_vector(None, &assignments).expect("vector");
        assert_eq!(features.get("no_of_dot"), Some(3.0));
        assert_eq!(features.get("SFH"), Some(1.0));
        assert_eq!(features.get("Redirect"), Some(0.0));
    }

    #[test]
    fn unknown_feature_name_is_an_error() {
        let assignments = vec![("_of_dot".to_string(), 3.0)];
        assert!(matches!(
            build_vector(None, &assignments),
            Err(FeatureInputError::UnknownFeature { .. })
        ));
        assert!(parse_assignment("no_of_dot").is_err());
        assert!(parse_assignment("no_of_dot=x").is_err());
    }

    #[test]
    fn default_model_path_matches_server() {
        let cli = Cli::try_parse_from(["tools", "features"]).expect("parse");
        assert_eq!(cli.model, PathBuf::from("random_forest_model.json"));
    }
}
