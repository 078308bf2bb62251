mod cli;
pub mod commands;
pub mod error;
pub mod models;
pub mod services;

pub use cli::{init_logging, render_report, run};
pub use error::AppError;
pub use models::classify_types::{
    BatchReport, CheckReport, ClassifyResult, ConfidenceTier, DecisionReport, ModelStatus,
    Prediction, ProbeResult,
};
pub use services::classifier::backend::{softmax, Classifier, OnnxClassifier, OutputKind};
pub use services::classifier::inference::{
    build_report, format_label, is_healthy_label, preprocess_bytes, preprocess_image,
    preprocess_path, ImageTensor, INPUT_SIZE,
};
pub use services::classifier::mapping::ClassMapping;
pub use services::classifier::model_manager::{ModelConfig, Predictor};
