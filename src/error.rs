use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AppError {
    /// Input bytes could not be decoded, or the image has no pixels.
    InvalidImage(String),
    /// Model or class mapping missing or failed to load at startup.
    ModelUnavailable(String),
    /// The model picked an index the class mapping has no label for.
    UnknownClass { index: usize, classes: usize },
    /// The runtime failed during the forward pass.
    Inference(String),
    Io(String),
}

impl AppError {
    /// Message suitable for showing to the person who submitted the image.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::InvalidImage(_) => {
                "Error processing image. Please make sure you provided a valid image."
            }
            AppError::ModelUnavailable(_) => {
                "Model files not found! Please train the model first. Required files: the ONNX model and class_mapping.json."
            }
            AppError::UnknownClass { .. } => {
                "The model returned a class that is not in the class mapping. The model and mapping do not match."
            }
            AppError::Inference(_) => "The model failed to analyze this image. Please try again.",
            AppError::Io(_) => "The file could not be read.",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidImage(msg) => write!(f, "invalid image: {}", msg),
            AppError::ModelUnavailable(msg) => write!(f, "model unavailable: {}", msg),
            AppError::UnknownClass { index, classes } => write!(
                f,
                "unknown class index {} (mapping has {} classes)",
                index, classes
            ),
            AppError::Inference(msg) => write!(f, "inference failed: {}", msg),
            AppError::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::InvalidImage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ModelUnavailable(format!("invalid JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_kind_has_its_own_user_message() {
        let errors = [
            AppError::InvalidImage("x".into()),
            AppError::ModelUnavailable("x".into()),
            AppError::UnknownClass { index: 11, classes: 10 },
            AppError::Inference("x".into()),
            AppError::Io("x".into()),
        ];
        let mut messages: Vec<&str> = errors.iter().map(|e| e.user_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn decode_errors_become_invalid_image() {
        let err: AppError = image::load_from_memory(&[]).unwrap_err().into();
        assert!(matches!(err, AppError::InvalidImage(_)));
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(AppError::UnknownClass { index: 12, classes: 10 }).unwrap();
        assert_eq!(json["kind"], "unknown_class");
        assert_eq!(json["detail"]["index"], 12);
    }
}
