use crate::error::AppError;
use crate::models::classify_types::{ConfidenceTier, DecisionReport, Prediction};
use crate::services::classifier::mapping::ClassMapping;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use ndarray::{Array4, ArrayView4};
use std::io::Cursor;
use std::path::Path;
use tracing::error;

/// Square input edge the network was trained on.
pub const INPUT_SIZE: u32 = 128;
pub const CHANNELS: usize = 3;

/// Bicubic, matching the resampling of the upload UI the model was validated with.
pub const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

const LABEL_PREFIX: &str = "Tomato___";
const HEALTHY_MARKER: &str = "healthy";
const TOP_K: usize = 3;

/// NHWC batch of one: (1, 128, 128, 3), RGB, values in [0, 1].
#[derive(Debug, Clone)]
pub struct ImageTensor {
    data: Array4<f32>,
}

impl ImageTensor {
    /// All-black input, used for warm-up passes.
    pub fn zeros() -> Self {
        let side = INPUT_SIZE as usize;
        Self {
            data: Array4::zeros((1, side, side, CHANNELS)),
        }
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn as_slice(&self) -> Option<&[f32]> {
        self.data.as_slice()
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, AppError> {
    if bytes.is_empty() {
        return Err(AppError::InvalidImage("image is empty".to_string()));
    }
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::InvalidImage(format!("Failed to read image: {}", e)))?
        .decode()
        .map_err(AppError::from)
}

pub fn preprocess_bytes(bytes: &[u8]) -> Result<ImageTensor, AppError> {
    let img = decode_image(bytes)?;
    preprocess_image(&img)
}

pub fn preprocess_path(path: &Path) -> Result<ImageTensor, AppError> {
    let img = ImageReader::open(path)
        .map_err(|e| AppError::Io(format!("Failed to open image {}: {}", path.display(), e)))?
        .with_guessed_format()
        .map_err(|e| AppError::Io(format!("Failed to read image {}: {}", path.display(), e)))?
        .decode()
        .map_err(|e| {
            AppError::InvalidImage(format!("Failed to decode image {}: {}", path.display(), e))
        })?;
    preprocess_image(&img)
}

/// Resize to 128x128, drop alpha / expand grayscale to RGB, scale to [0, 1], add batch axis.
pub fn preprocess_image(img: &DynamicImage) -> Result<ImageTensor, AppError> {
    let (w, h) = (img.width(), img.height());
    if w == 0 || h == 0 {
        return Err(AppError::InvalidImage(format!(
            "image has degenerate dimensions {}x{}",
            w, h
        )));
    }

    let resized = img.resize_exact(INPUT_SIZE, INPUT_SIZE, RESAMPLE_FILTER);
    let rgb = resized.to_rgb8();

    // RgbImage is already row-major HWC, the layout the network expects.
    let data: Vec<f32> = rgb
        .into_raw()
        .into_iter()
        .map(|v| v as f32 / 255.0)
        .collect();

    let side = INPUT_SIZE as usize;
    let data = Array4::from_shape_vec((1, side, side, CHANNELS), data)
        .map_err(|e| AppError::InvalidImage(format!("Failed to create tensor: {}", e)))?;

    Ok(ImageTensor { data })
}

/// Strip the crop prefix, turn underscores into spaces, title-case each word.
pub fn format_label(raw: &str) -> String {
    let stripped = raw.strip_prefix(LABEL_PREFIX).unwrap_or(raw);
    title_case(&stripped.replace('_', " "))
}

// Uppercase a letter that follows a non-letter, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

pub fn is_healthy_label(raw: &str) -> bool {
    raw.to_lowercase().contains(HEALTHY_MARKER)
}

/// Lowest index wins ties. NaN entries are skipped.
pub fn argmax(probabilities: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &p) in probabilities.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if p <= b => {}
            _ => best = Some((idx, p)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Indices ordered by descending probability; equal probabilities keep index order.
pub fn rank(probabilities: &[f32]) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed
}

fn label_for(mapping: &ClassMapping, index: usize) -> Result<&str, AppError> {
    mapping.get(index).ok_or_else(|| {
        error!(
            index,
            classes = mapping.len(),
            "model output index has no label; model and class mapping do not match"
        );
        AppError::UnknownClass {
            index,
            classes: mapping.len(),
        }
    })
}

/// Turn one softmax vector into a report. Pure; the prediction is returned at every tier.
pub fn build_report(
    probabilities: &[f32],
    mapping: &ClassMapping,
) -> Result<DecisionReport, AppError> {
    if probabilities.is_empty() {
        return Err(AppError::Inference("Model produced an empty output".to_string()));
    }

    let class_index = argmax(probabilities)
        .ok_or_else(|| AppError::Inference("Model output contains only NaN".to_string()))?;
    let raw_label = label_for(mapping, class_index)?.to_string();

    // Every class must have a probability, otherwise the top list and healthy score are partial.
    if probabilities.len() != mapping.len() {
        error!(
            outputs = probabilities.len(),
            classes = mapping.len(),
            "model output width differs from class mapping"
        );
        return Err(AppError::Inference(format!(
            "Model produced {} probabilities for {} classes",
            probabilities.len(),
            mapping.len()
        )));
    }

    let confidence = probabilities[class_index] * 100.0;
    let tier = ConfidenceTier::from_confidence(confidence);

    let top_predictions = rank(probabilities)
        .into_iter()
        .take(TOP_K)
        .map(|(idx, p)| -> Result<Prediction, AppError> {
            Ok(Prediction {
                class_name: format_label(label_for(mapping, idx)?),
                confidence: p * 100.0,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let probabilities_by_class = probabilities
        .iter()
        .enumerate()
        .filter_map(|(idx, &p)| {
            mapping.get(idx).map(|label| Prediction {
                class_name: format_label(label),
                confidence: p * 100.0,
            })
        })
        .collect();

    let healthy_confidence = mapping
        .iter()
        .find(|(_, label)| is_healthy_label(label))
        .and_then(|(idx, _)| probabilities.get(idx))
        .map(|p| p * 100.0);

    Ok(DecisionReport {
        class_index,
        label: format_label(&raw_label),
        is_healthy: is_healthy_label(&raw_label),
        raw_label,
        confidence,
        tier,
        needs_verification: tier.needs_verification(),
        advice: tier.advice().map(str::to_string),
        top_predictions,
        healthy_confidence,
        probabilities: probabilities_by_class,
    })
}
