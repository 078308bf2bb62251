use crate::error::AppError;
use crate::models::classify_types::{BatchReport, CheckReport, ClassifyResult, ProbeResult};
use crate::services::classifier::inference::INPUT_SIZE;
use crate::services::classifier::model_manager::Predictor;
use crate::services::fs_service;
use image::{DynamicImage, Rgb, RgbImage};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

const SUM_TOLERANCE: f32 = 1e-3;

/// Deterministic colour gradient used to exercise the model without a real photo.
fn probe_image() -> DynamicImage {
    let img = RgbImage::from_fn(INPUT_SIZE, INPUT_SIZE, |x, y| {
        Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn check_model(predictor: &Predictor) -> CheckReport {
    let status = predictor.status();
    let labels = predictor
        .mapping()
        .map(|m| m.labels().to_vec())
        .unwrap_or_default();

    if !status.ready {
        let reason = status.error.clone().unwrap_or_default();
        return CheckReport {
            status,
            labels,
            probe: None,
            error: Some(AppError::ModelUnavailable(reason)),
        };
    }

    match predictor.predict_image(&probe_image()) {
        Ok(report) => {
            let probability_sum = report.probability_sum();
            let sum_ok = (probability_sum - 1.0).abs() <= SUM_TOLERANCE;
            if !sum_ok {
                warn!(
                    probability_sum,
                    "model outputs do not sum to 1; is the output kind set correctly?"
                );
            }
            CheckReport {
                status,
                labels,
                probe: Some(ProbeResult {
                    label: report.label,
                    confidence: report.confidence,
                    probability_sum,
                    sum_ok,
                }),
                error: None,
            }
        }
        Err(e) => CheckReport {
            status,
            labels,
            probe: None,
            error: Some(e),
        },
    }
}

/// Classify every image under `inputs`. A failing file gets an error entry; the batch continues.
pub fn classify_paths(
    predictor: &Predictor,
    inputs: &[PathBuf],
    recursive: bool,
) -> Result<BatchReport, AppError> {
    if !predictor.is_ready() {
        return Err(AppError::ModelUnavailable(
            predictor.status().error.unwrap_or_default(),
        ));
    }

    let image_paths = fs_service::expand_inputs(inputs, recursive)?;
    let total = image_paths.len();
    info!(total, "classifying images");

    let done = AtomicUsize::new(0);
    let results: Vec<ClassifyResult> = image_paths
        .par_iter()
        .map(|img_path| {
            let file_name = img_path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();

            let outcome = predictor.predict_path(img_path);
            let count = done.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(current = count, total, file = %file_name, "classified");

            let (report, error) = match outcome {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    warn!(file = %file_name, error = %e, "failed to classify");
                    (None, Some(e))
                }
            };

            ClassifyResult {
                file_name,
                file_path: img_path.to_string_lossy().to_string(),
                report,
                error,
            }
        })
        .collect();

    let succeeded = results.iter().filter(|r| r.report.is_some()).count();
    Ok(BatchReport {
        total,
        succeeded,
        results,
    })
}
