use crate::error::AppError;
use std::collections::BTreeMap;
use std::path::Path;

/// Class index -> label, contiguous from 0. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMapping {
    labels: Vec<String>,
}

impl ClassMapping {
    pub fn from_labels(labels: Vec<String>) -> Result<Self, AppError> {
        if labels.is_empty() {
            return Err(AppError::ModelUnavailable(
                "class mapping is empty".to_string(),
            ));
        }
        Ok(Self { labels })
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::ModelUnavailable(format!(
                "Failed to read class mapping {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Accepts `{"0": "label", ...}` or a config object with the same map under `id2label`.
    pub fn from_json(content: &str) -> Result<Self, AppError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let object = match value.get("id2label") {
            Some(inner) if inner.is_object() => inner,
            _ => &value,
        }
        .as_object()
        .ok_or_else(|| {
            AppError::ModelUnavailable("class mapping must be a JSON object".to_string())
        })?;

        let mut indexed = BTreeMap::new();
        for (key, label) in object {
            let idx = key.trim().parse::<usize>().map_err(|_| {
                AppError::ModelUnavailable(format!("class mapping key {:?} is not an index", key))
            })?;
            let label = label.as_str().ok_or_else(|| {
                AppError::ModelUnavailable(format!("class mapping value for {} is not a string", key))
            })?;
            if indexed.insert(idx, label.to_string()).is_some() {
                return Err(AppError::ModelUnavailable(format!(
                    "class mapping has duplicate index {}",
                    idx
                )));
            }
        }

        for (expected, &idx) in indexed.keys().enumerate() {
            if idx != expected {
                return Err(AppError::ModelUnavailable(format!(
                    "class mapping is missing index {}",
                    expected
                )));
            }
        }

        Self::from_labels(indexed.into_values().collect())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().enumerate().map(|(i, l)| (i, l.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_flat_object_in_index_order() {
        let mapping = ClassMapping::from_json(
            r#"{"2": "Tomato___Late_blight", "0": "Tomato___Bacterial_spot", "1": "Tomato___Early_blight"}"#,
        )
        .unwrap();
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.get(0), Some("Tomato___Bacterial_spot"));
        assert_eq!(mapping.get(2), Some("Tomato___Late_blight"));
        assert_eq!(mapping.get(3), None);
    }

    #[test]
    fn keys_compare_numerically_not_lexically() {
        let json = (0..12)
            .map(|i| format!("\"{}\": \"c{}\"", i, i))
            .collect::<Vec<_>>()
            .join(",");
        let mapping = ClassMapping::from_json(&format!("{{{}}}", json)).unwrap();
        assert_eq!(mapping.get(10), Some("c10"));
        assert_eq!(mapping.get(2), Some("c2"));
    }

    #[test]
    fn accepts_id2label_config() {
        let mapping = ClassMapping::from_json(
            r#"{"architectures": ["cnn"], "id2label": {"0": "Tomato___healthy"}}"#,
        )
        .unwrap();
        assert_eq!(mapping.labels(), &["Tomato___healthy".to_string()]);
    }

    #[test]
    fn rejects_gaps() {
        let err = ClassMapping::from_json(r#"{"0": "a", "2": "c"}"#).unwrap_err();
        assert_eq!(
            err,
            AppError::ModelUnavailable("class mapping is missing index 1".to_string())
        );
    }

    #[test]
    fn rejects_mapping_not_starting_at_zero() {
        assert!(ClassMapping::from_json(r#"{"1": "a", "2": "b"}"#).is_err());
    }

    #[test]
    fn rejects_bad_keys_values_and_empty() {
        for json in [
            r#"{"zero": "a"}"#,
            r#"{"-1": "a"}"#,
            r#"{"0": 5}"#,
            r#"{}"#,
            r#"["a", "b"]"#,
            "not json",
        ] {
            let err = ClassMapping::from_json(json).unwrap_err();
            assert!(matches!(err, AppError::ModelUnavailable(_)), "{json}");
        }
    }

    #[test]
    fn rejects_duplicate_indices_after_trimming() {
        assert!(ClassMapping::from_json(r#"{"0": "a", " 0": "b"}"#).is_err());
    }

    #[test]
    fn missing_file_is_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClassMapping::load(&dir.path().join("class_mapping.json")).unwrap_err();
        assert!(matches!(err, AppError::ModelUnavailable(_)));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"0": "Tomato___Early_blight", "1": "Tomato___healthy"}}"#).unwrap();
        let mapping = ClassMapping::load(file.path()).unwrap();
        assert_eq!(
            mapping.iter().collect::<Vec<_>>(),
            vec![(0, "Tomato___Early_blight"), (1, "Tomato___healthy")]
        );
    }
}
