//! Command-line surface: argument parsing, logging setup and plain-text rendering.

use crate::commands::classifier::{check_model, classify_paths};
use crate::models::classify_types::{
    BatchReport, CheckReport, ConfidenceTier, DecisionReport, MODERATE_CONFIDENCE,
};
use crate::services::classifier::backend::OutputKind;
use crate::services::classifier::model_manager::{ModelConfig, Predictor};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Classify tomato leaf photos into disease categories.
#[derive(Debug, Parser)]
#[command(name = "leaf-lens", author, version, about)]
pub struct Cli {
    /// Optional settings JSON; flags below override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the ONNX model and class_mapping.json.
    #[arg(long, env = "LEAF_LENS_MODEL_DIR", global = true)]
    model_dir: Option<PathBuf>,

    /// Explicit ONNX model path (skips best/final checkpoint lookup).
    #[arg(short, long, env = "LEAF_LENS_MODEL", global = true)]
    model: Option<PathBuf>,

    /// Explicit class mapping JSON path.
    #[arg(long, env = "LEAF_LENS_MAPPING", global = true)]
    mapping: Option<PathBuf>,

    /// Try GPU execution providers before the CPU.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    gpu: bool,

    /// The model emits raw logits; apply softmax after the forward pass.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    logits: bool,

    /// Intra-op threads for the runtime.
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the model, list the classes and run one synthetic prediction.
    Check,
    /// Print model readiness as JSON.
    Status,
    /// Classify image files or directories of images.
    Classify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Descend into subdirectories.
        #[arg(short, long)]
        recursive: bool,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn model_config(&self) -> Result<ModelConfig> {
        let mut config = match &self.config {
            Some(path) => ModelConfig::from_file(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => ModelConfig::default(),
        };

        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(model) = &self.model {
            config.model_file = Some(model.clone());
        }
        if let Some(mapping) = &self.mapping {
            config.mapping_file = Some(mapping.clone());
        }
        if self.gpu {
            config.use_gpu = true;
        }
        if self.logits {
            config.output = OutputKind::Logits;
        }
        if let Some(threads) = self.threads {
            config.intra_threads = threads;
        }
        Ok(config)
    }
}

pub fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.model_config()?;
    let predictor = Predictor::initialize(&config);

    match &cli.command {
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&predictor.status())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let report = check_model(&predictor);
            print!("{}", render_check(&report));
            Ok(if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Classify {
            paths,
            recursive,
            json,
        } => {
            let batch = match classify_paths(&predictor, paths, *recursive) {
                Ok(batch) => batch,
                Err(e) => {
                    eprintln!("{}", e.user_message());
                    eprintln!("  {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            if *json {
                println!("{}", serde_json::to_string_pretty(&batch)?);
            } else {
                print!("{}", render_batch(&batch));
            }
            Ok(if batch.succeeded == batch.total {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

pub fn render_report(report: &DecisionReport) -> String {
    let mut out = String::new();

    if report.needs_verification {
        let headline = if report.tier == ConfidenceTier::Low {
            "Low Confidence Prediction"
        } else {
            "Moderate Confidence"
        };
        let _ = writeln!(out, "{} ({:.2}%)", headline, report.confidence);
        if let Some(advice) = &report.advice {
            let _ = writeln!(out, "  {}", advice);
        }
    }

    if report.is_healthy {
        let _ = writeln!(out, "Status: {}", report.label);
    } else {
        let _ = writeln!(out, "Disease Detected: {}", report.label);
    }
    let _ = writeln!(out, "Confidence: {:.2}%", report.confidence);

    let _ = writeln!(out, "Top {} Predictions:", report.top_predictions.len());
    for (i, p) in report.top_predictions.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}: {:.2}%", i + 1, p.class_name, p.confidence);
    }

    if let Some(healthy) = report.healthy_confidence {
        let _ = writeln!(out, "Healthy class probability: {:.2}%", healthy);
        if healthy < MODERATE_CONFIDENCE {
            let _ = writeln!(
                out,
                "  Healthy probability is only {:.2}% - Model may need retraining",
                healthy
            );
        }
    }
    out
}

fn render_batch(batch: &BatchReport) -> String {
    let mut out = String::new();
    for result in &batch.results {
        let _ = writeln!(out, "== {}", result.file_name);
        match (&result.report, &result.error) {
            (Some(report), _) => out.push_str(&render_report(report)),
            (None, Some(err)) => {
                let _ = writeln!(out, "{}", err.user_message());
                let _ = writeln!(out, "  {}", err);
            }
            (None, None) => {}
        }
        out.push('\n');
    }
    let _ = writeln!(out, "{}/{} images classified", batch.succeeded, batch.total);
    out
}

fn render_check(report: &CheckReport) -> String {
    let mut out = String::new();
    let status = &report.status;

    if status.ready {
        let _ = writeln!(
            out,
            "[OK] Model loaded: {}",
            status.model_path.as_deref().unwrap_or("-")
        );
        let _ = writeln!(out, "[OK] Class mapping loaded: {} classes", report.labels.len());
        for (idx, label) in report.labels.iter().enumerate() {
            let _ = writeln!(out, "  {}: {}", idx, label);
        }
    }

    if let Some(probe) = &report.probe {
        let _ = writeln!(out, "[OK] Prediction successful");
        let _ = writeln!(out, "  Predicted: {}", probe.label);
        let _ = writeln!(out, "  Confidence: {:.2}%", probe.confidence);
        let _ = writeln!(
            out,
            "  All predictions sum: {:.4} (should be ~1.0)",
            probe.probability_sum
        );
        if !probe.sum_ok {
            let _ = writeln!(out, "[ERROR] Output is not a probability distribution");
        }
    }

    if let Some(err) = &report.error {
        let _ = writeln!(out, "[ERROR] {}", err.user_message());
        let _ = writeln!(out, "  {}", err);
    }

    if report.passed() {
        let _ = writeln!(out, "[OK] All checks passed! Model is ready to use.");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::classify_types::{ClassifyResult, ModelStatus, Prediction};
    use clap::CommandFactory;

    fn report(label: &str, confidence: f32, healthy: bool) -> DecisionReport {
        let tier = ConfidenceTier::from_confidence(confidence);
        DecisionReport {
            class_index: 0,
            raw_label: label.to_string(),
            label: label.to_string(),
            confidence,
            is_healthy: healthy,
            tier,
            needs_verification: tier.needs_verification(),
            advice: tier.advice().map(str::to_string),
            top_predictions: vec![Prediction {
                class_name: label.to_string(),
                confidence,
            }],
            healthy_confidence: None,
            probabilities: Vec::new(),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::try_parse_from([
            "leaf-lens",
            "--model-dir",
            "artifacts",
            "--logits",
            "--threads",
            "2",
            "classify",
            "leaf.jpg",
        ])
        .unwrap();
        let config = cli.model_config().unwrap();
        assert_eq!(config.model_dir, PathBuf::from("artifacts"));
        assert_eq!(config.output, OutputKind::Logits);
        assert_eq!(config.intra_threads, 2);
        assert!(config.model_file.is_none());
    }

    #[test]
    fn classify_requires_a_path() {
        assert!(Cli::try_parse_from(["leaf-lens", "classify"]).is_err());
    }

    #[test]
    fn renders_healthy_high_confidence_without_caution() {
        let text = render_report(&report("Healthy", 80.0, true));
        assert!(text.contains("Status: Healthy"));
        assert!(text.contains("Confidence: 80.00%"));
        assert!(text.contains("1. Healthy: 80.00%"));
        assert!(!text.contains("Low Confidence"));
    }

    #[test]
    fn renders_low_confidence_disease_with_advice() {
        let text = render_report(&report("Late Blight", 41.5, false));
        assert!(text.starts_with("Low Confidence Prediction (41.50%)"));
        assert!(text.contains("Disease Detected: Late Blight"));
        assert!(text.contains("verify"));
    }

    #[test]
    fn warns_when_healthy_class_probability_is_low() {
        let mut low = report("Late Blight", 85.0, false);
        low.healthy_confidence = Some(4.0);
        let text = render_report(&low);
        assert!(text.contains("Healthy class probability: 4.00%"));
        assert!(text.contains("Healthy probability is only 4.00% - Model may need retraining"));

        let mut high = report("Healthy", 85.0, true);
        high.healthy_confidence = Some(85.0);
        assert!(!render_report(&high).contains("retraining"));
    }

    #[test]
    fn batch_output_includes_failures() {
        let batch = BatchReport {
            total: 2,
            succeeded: 1,
            results: vec![
                ClassifyResult {
                    file_name: "a.jpg".into(),
                    file_path: "a.jpg".into(),
                    report: Some(report("Healthy", 90.0, true)),
                    error: None,
                },
                ClassifyResult {
                    file_name: "b.jpg".into(),
                    file_path: "b.jpg".into(),
                    report: None,
                    error: Some(AppError::InvalidImage("truncated".into())),
                },
            ],
        };
        let text = render_batch(&batch);
        assert!(text.contains("== b.jpg"));
        assert!(text.contains("invalid image: truncated"));
        assert!(text.ends_with("1/2 images classified\n"));
    }

    #[test]
    fn check_output_for_missing_model() {
        let report = CheckReport {
            status: ModelStatus {
                ready: false,
                classes: None,
                model_path: None,
                error: Some("Model not found".into()),
            },
            labels: Vec::new(),
            probe: None,
            error: Some(AppError::ModelUnavailable("Model not found".into())),
        };
        let text = render_check(&report);
        assert!(text.contains("[ERROR]"));
        assert!(!text.contains("All checks passed"));
    }
}
