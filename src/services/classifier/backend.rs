use crate::error::AppError;
use crate::services::classifier::inference::ImageTensor;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// The opaque model: one batch-of-one tensor in, one probability per class out.
pub trait Classifier: Send + Sync {
    fn classify(&self, tensor: &ImageTensor) -> Result<Vec<f32>, AppError>;

    /// Output width, when the backend knows it ahead of the first real call.
    fn num_classes(&self) -> Option<usize> {
        None
    }

    fn describe(&self) -> String {
        "classifier".to_string()
    }
}

/// What the model's final layer emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Softmax head; used as-is.
    #[default]
    Probabilities,
    /// Raw scores; softmax is applied after the forward pass.
    Logits,
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .collect()
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub use_gpu: bool,
    pub intra_threads: usize,
    pub output: OutputKind,
}

/// ONNX Runtime session. `Session::run` needs `&mut`, so forward passes are serialized.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output: OutputKind,
    num_classes: usize,
    path: PathBuf,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path, options: &SessionOptions) -> Result<Self, AppError> {
        if !model_path.is_file() {
            return Err(AppError::ModelUnavailable(format!(
                "Model not found: {}",
                model_path.display()
            )));
        }

        let _ = ort::init().with_name("leaf-lens").commit();

        let mut builder = Session::builder()
            .map_err(|e| unavailable("Failed to create session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| unavailable("Failed to set optimization level", e))?
            .with_intra_threads(options.intra_threads.max(1))
            .map_err(|e| unavailable("Failed to set intra threads", e))?;

        if options.use_gpu {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::DirectMLExecutionProvider::default().build(),
                    ort::execution_providers::CoreMLExecutionProvider::default().build(),
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| unavailable("Failed to register GPU execution providers", e))?;
        } else {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ])
                .map_err(|e| unavailable("Failed to register CPU execution provider", e))?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| unavailable("Failed to load ONNX model", e))?;

        let input_name = session
            .inputs()
            .first()
            .map(|input| input.name().to_string())
            .ok_or_else(|| AppError::ModelUnavailable("Model declares no inputs".to_string()))?;

        let mut classifier = Self {
            session: Mutex::new(session),
            input_name,
            output: options.output,
            num_classes: 0,
            path: model_path.to_path_buf(),
        };

        // Warm-up pass: proves the graph accepts (1, 128, 128, 3) and fixes the output width.
        let probe = classifier
            .classify(&ImageTensor::zeros())
            .map_err(|e| AppError::ModelUnavailable(format!("Model warm-up failed: {}", e)))?;
        classifier.num_classes = probe.len();

        info!(
            model = %model_path.display(),
            classes = classifier.num_classes,
            gpu = options.use_gpu,
            "ONNX model loaded"
        );
        Ok(classifier)
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, tensor: &ImageTensor) -> Result<Vec<f32>, AppError> {
        let input_tensor = Value::from_array(tensor.view().to_owned())
            .map_err(|e| AppError::Inference(format!("Failed to create tensor value: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::Inference("Model session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| AppError::Inference(format!("Forward pass failed: {}", e)))?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| AppError::Inference("Model produced no outputs".to_string()))?;

        let (_, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        debug!(outputs = data.len(), "forward pass complete");

        Ok(match self.output {
            OutputKind::Probabilities => data.to_vec(),
            OutputKind::Logits => softmax(data),
        })
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.num_classes)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> AppError {
    AppError::ModelUnavailable(format!("{}: {}", context, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one_and_keeps_order() {
        let probs = softmax(&[2.0, 1.0, 0.1, -3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-3);
        assert!(probs[0] > probs[1] && probs[1] > probs[2] && probs[2] > probs[3]);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);
        assert!((probs[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_model_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let options = SessionOptions {
            use_gpu: false,
            intra_threads: 1,
            output: OutputKind::Probabilities,
        };
        let err = OnnxClassifier::load(&dir.path().join("model.onnx"), &options)
            .err()
            .unwrap();
        assert!(matches!(err, AppError::ModelUnavailable(_)));
    }

    #[test]
    fn output_kind_reads_snake_case() {
        let kind: OutputKind = serde_json::from_str("\"logits\"").unwrap();
        assert_eq!(kind, OutputKind::Logits);
    }
}
