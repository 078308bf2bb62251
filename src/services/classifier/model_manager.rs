use crate::error::AppError;
use crate::models::classify_types::{DecisionReport, ModelStatus};
use crate::services::classifier::backend::{Classifier, OnnxClassifier, OutputKind, SessionOptions};
use crate::services::classifier::inference::{self, ImageTensor};
use crate::services::classifier::mapping::ClassMapping;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Best-validation checkpoint, preferred over the final weights.
pub const BEST_MODEL_FILE: &str = "tomato_disease_model_best.onnx";
pub const FINAL_MODEL_FILE: &str = "tomato_disease_model.onnx";
pub const MAPPING_FILE: &str = "class_mapping.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub model_file: Option<PathBuf>,
    pub mapping_file: Option<PathBuf>,
    pub use_gpu: bool,
    pub intra_threads: usize,
    pub output: OutputKind,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("."),
            model_file: None,
            mapping_file: None,
            use_gpu: false,
            intra_threads: 4,
            output: OutputKind::Probabilities,
        }
    }
}

impl ModelConfig {
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Io(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Io(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    pub fn resolve_model_path(&self) -> Result<PathBuf, AppError> {
        if let Some(explicit) = &self.model_file {
            return if explicit.is_file() {
                Ok(explicit.clone())
            } else {
                Err(AppError::ModelUnavailable(format!(
                    "Model not found: {}",
                    explicit.display()
                )))
            };
        }

        let best = self.model_dir.join(BEST_MODEL_FILE);
        if best.is_file() {
            return Ok(best);
        }
        let last = self.model_dir.join(FINAL_MODEL_FILE);
        if last.is_file() {
            warn!(
                checked = %best.display(),
                "best checkpoint missing, using final model weights"
            );
            return Ok(last);
        }

        Err(AppError::ModelUnavailable(format!(
            "Model not found. Checked: {}, {}",
            best.display(),
            last.display()
        )))
    }

    pub fn resolve_mapping_path(&self) -> PathBuf {
        self.mapping_file
            .clone()
            .unwrap_or_else(|| self.model_dir.join(MAPPING_FILE))
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            use_gpu: self.use_gpu,
            intra_threads: self.intra_threads,
            output: self.output,
        }
    }
}

#[derive(Clone)]
enum PredictorState {
    Uninitialized {
        reason: String,
    },
    Ready {
        model: Arc<dyn Classifier>,
        mapping: Arc<ClassMapping>,
    },
}

/// Model plus class mapping, loaded once and shared read-only by every caller.
/// There is no way back from ready to uninitialized.
#[derive(Clone)]
pub struct Predictor {
    state: PredictorState,
}

impl Predictor {
    pub fn uninitialized(reason: impl Into<String>) -> Self {
        Self {
            state: PredictorState::Uninitialized {
                reason: reason.into(),
            },
        }
    }

    pub fn ready(model: Arc<dyn Classifier>, mapping: ClassMapping) -> Result<Self, AppError> {
        if let Some(outputs) = model.num_classes() {
            if outputs != mapping.len() {
                return Err(AppError::ModelUnavailable(format!(
                    "Model has {} outputs but class mapping has {} classes",
                    outputs,
                    mapping.len()
                )));
            }
        }
        Ok(Self {
            state: PredictorState::Ready {
                model,
                mapping: Arc::new(mapping),
            },
        })
    }

    pub fn try_initialize(config: &ModelConfig) -> Result<Self, AppError> {
        let mapping_path = config.resolve_mapping_path();
        let mapping = ClassMapping::load(&mapping_path)?;
        let model_path = config.resolve_model_path()?;
        let model = OnnxClassifier::load(&model_path, &config.session_options())?;
        let predictor = Self::ready(Arc::new(model), mapping)?;
        info!(
            classes = predictor.mapping().map(ClassMapping::len).unwrap_or(0),
            mapping = %mapping_path.display(),
            "predictor ready"
        );
        Ok(predictor)
    }

    /// Startup entry point: load failures leave the predictor refusing inference instead of exiting.
    pub fn initialize(config: &ModelConfig) -> Self {
        match Self::try_initialize(config) {
            Ok(predictor) => predictor,
            Err(e) => {
                error!(error = %e, "model unavailable; inference requests will be refused");
                match e {
                    AppError::ModelUnavailable(reason) => Self::uninitialized(reason),
                    other => Self::uninitialized(other.to_string()),
                }
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, PredictorState::Ready { .. })
    }

    pub fn mapping(&self) -> Option<&ClassMapping> {
        match &self.state {
            PredictorState::Ready { mapping, .. } => Some(mapping.as_ref()),
            PredictorState::Uninitialized { .. } => None,
        }
    }

    pub fn status(&self) -> ModelStatus {
        match &self.state {
            PredictorState::Ready { model, mapping } => ModelStatus {
                ready: true,
                classes: Some(mapping.len()),
                model_path: Some(model.describe()),
                error: None,
            },
            PredictorState::Uninitialized { reason } => ModelStatus {
                ready: false,
                classes: None,
                model_path: None,
                error: Some(reason.clone()),
            },
        }
    }

    fn loaded(&self) -> Result<(&dyn Classifier, &ClassMapping), AppError> {
        match &self.state {
            PredictorState::Ready { model, mapping } => Ok((model.as_ref(), mapping.as_ref())),
            PredictorState::Uninitialized { reason } => {
                Err(AppError::ModelUnavailable(reason.clone()))
            }
        }
    }

    /// One forward pass over an already preprocessed tensor.
    pub fn predict(&self, tensor: &ImageTensor) -> Result<DecisionReport, AppError> {
        let (model, mapping) = self.loaded()?;

        let start = Instant::now();
        let probabilities = model.classify(tensor)?;
        debug!(
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "inference finished"
        );

        let report = inference::build_report(&probabilities, mapping)?;
        if report.needs_verification {
            warn!(
                label = %report.label,
                confidence = report.confidence,
                tier = report.tier.as_str(),
                "prediction below high-confidence threshold"
            );
        }
        Ok(report)
    }

    pub fn predict_image(&self, img: &DynamicImage) -> Result<DecisionReport, AppError> {
        self.loaded()?;
        let tensor = inference::preprocess_image(img)?;
        self.predict(&tensor)
    }

    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<DecisionReport, AppError> {
        self.loaded()?;
        let tensor = inference::preprocess_bytes(bytes)?;
        self.predict(&tensor)
    }

    pub fn predict_path(&self, path: &Path) -> Result<DecisionReport, AppError> {
        self.loaded()?;
        let tensor = inference::preprocess_path(path)?;
        self.predict(&tensor)
    }
}
