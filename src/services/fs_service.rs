use crate::error::AppError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Image files directly inside `path` (or below it when `recursive`), sorted by path.
pub fn list_image_files(path: &Path, recursive: bool) -> Result<Vec<PathBuf>, AppError> {
    if !path.is_dir() {
        return Err(AppError::Io(format!(
            "Not a directory: {}",
            path.display()
        )));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut images: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            !entry
                .file_name()
                .to_str()
                .map(is_hidden)
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_image_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    images.sort();
    Ok(images)
}

/// Explicit files are kept as given; directories are expanded to the images they hold.
pub fn expand_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, AppError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(list_image_files(input, recursive)?);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            return Err(AppError::Io(format!(
                "Path does not exist: {}",
                input.display()
            )));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn recognizes_image_extensions_case_insensitively() {
        assert!(is_image_file(Path::new("leaf.JPG")));
        assert!(is_image_file(Path::new("dir/leaf.png")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn lists_images_with_optional_recursion() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"").unwrap();
        fs::write(dir.path().join("a.PNG"), b"").unwrap();
        fs::write(dir.path().join("readme.md"), b"").unwrap();
        fs::write(dir.path().join(".hidden.jpg"), b"").unwrap();
        fs::create_dir(dir.path().join("Tomato___healthy")).unwrap();
        fs::write(dir.path().join("Tomato___healthy").join("0.JPG"), b"").unwrap();

        let flat = list_image_files(dir.path(), false).unwrap();
        assert_eq!(flat, vec![dir.path().join("a.PNG"), dir.path().join("b.jpg")]);

        let deep = list_image_files(dir.path(), true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&dir.path().join("Tomato___healthy").join("0.JPG")));
    }

    #[test]
    fn expand_keeps_explicit_files_and_rejects_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("capture.bin");
        fs::write(&file, b"").unwrap();
        assert_eq!(expand_inputs(&[file.clone()], false).unwrap(), vec![file]);

        let err = expand_inputs(&[dir.path().join("missing.jpg")], false).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }
}
