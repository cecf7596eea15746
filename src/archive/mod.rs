//! Package archive unpacking and layout validation
//!
//! A model package is a zip archive holding one native model file and its
//! side files (tokenizer definition, config). Unpacking is hermetic: a stale
//! working directory from a previous attempt is deleted first, so retries
//! always start clean. After extraction the directory is scanned, the model
//! file count is validated against the model kind's rules, and the model
//! file is renamed to a predictable stem so downstream loading never depends
//! on the uploader's original filename.

use crate::artifact::ModelKind;
use crate::errors::{PackagingError, Result};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// File name of the tokenizer definition side file.
pub const TOKENIZER_FILE_NAME: &str = "tokenizer.json";

/// Native model file extensions the scanner recognizes.
const MODEL_FILE_EXTENSIONS: [&str; 2] = ["pt", "onnx"];

/// The unpacked state of one model package.
#[derive(Debug, Clone)]
pub struct PackageLayout {
    /// Working directory holding the unpacked files
    pub root: PathBuf,

    /// The (renamed) native model file, if the kind requires one
    pub model_file: Option<PathBuf>,

    /// The tokenizer definition, if present
    pub tokenizer_file: Option<PathBuf>,
}

/// Unpack a package archive into `dest` and validate its contents.
///
/// The single native model file (when required by `kind`) is renamed to
/// `<expected_stem>.<ext>`. Zero model files, multiple model files, or a
/// missing required tokenizer fail with a [`PackagingError`].
pub fn unpack(
    package: &Path,
    dest: &Path,
    expected_stem: &str,
    kind: ModelKind,
) -> Result<PackageLayout> {
    // Hermetic retries: wipe any stale content from a previous attempt
    if dest.exists() {
        debug!(dest = %dest.display(), "Removing stale working directory");
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    extract_archive(package, dest)?;
    let layout = scan_and_normalize(dest, expected_stem, kind)?;

    info!(
        package = %package.display(),
        dest = %dest.display(),
        model_file = ?layout.model_file.as_ref().map(|p| p.display().to_string()),
        "Package unpacked"
    );

    Ok(layout)
}

fn extract_archive(package: &Path, dest: &Path) -> Result<()> {
    let file = File::open(package)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        // Reject entries that would escape the destination
        let relative = entry.enclosed_name().map(|p| p.to_path_buf()).ok_or_else(|| {
            PackagingError::MalformedArchive(format!("unsafe entry path: {}", entry.name()))
        })?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
    }

    Ok(())
}

/// Scan the unpacked root for model and tokenizer files and enforce the
/// kind's validation rules.
fn scan_and_normalize(dest: &Path, expected_stem: &str, kind: ModelKind) -> Result<PackageLayout> {
    let mut model_files: Vec<PathBuf> = Vec::new();
    let mut tokenizer_file: Option<PathBuf> = None;

    for entry in fs::read_dir(dest)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }

        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if MODEL_FILE_EXTENSIONS.contains(&ext) {
                model_files.push(path.clone());
            }
        }
        if path.file_name().and_then(|n| n.to_str()) == Some(TOKENIZER_FILE_NAME) {
            tokenizer_file = Some(path);
        }
    }

    if model_files.len() > 1 {
        return Err(PackagingError::MultipleModelFiles.into());
    }
    if model_files.is_empty() && kind.requires_model_file() {
        return Err(PackagingError::NoModelFile.into());
    }
    if tokenizer_file.is_none() && kind.requires_tokenizer() {
        return Err(PackagingError::MissingTokenizer.into());
    }

    let model_file = match model_files.pop() {
        Some(found) => Some(normalize_model_file(dest, found, expected_stem)?),
        None => None,
    };

    Ok(PackageLayout {
        root: dest.to_path_buf(),
        model_file,
        tokenizer_file,
    })
}

/// Rename the model file to `<expected_stem>.<ext>` when its base name does
/// not already match.
fn normalize_model_file(dest: &Path, found: PathBuf, expected_stem: &str) -> Result<PathBuf> {
    let ext = found
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    let stem = found.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

    if stem == expected_stem {
        return Ok(found);
    }

    let target = dest.join(format!("{}.{}", expected_stem, ext));
    debug!(
        from = %found.display(),
        to = %target.display(),
        "Normalizing model file name"
    );
    fs::rename(&found, &target)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DepotError;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    /// Write a zip archive containing the given (name, content) entries.
    fn write_package(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, content) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_unpack_single_model_with_rename() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(
            &package,
            &[
                ("uploaded-name.pt", b"graph bytes"),
                (TOKENIZER_FILE_NAME, b"{}"),
            ],
        );

        let dest = temp.path().join("out");
        let layout = unpack(&package, &dest, "model-1", ModelKind::TextEmbedding).unwrap();

        let model_file = layout.model_file.unwrap();
        assert_eq!(model_file, dest.join("model-1.pt"));
        assert!(model_file.exists());
        assert!(!dest.join("uploaded-name.pt").exists());
        assert!(layout.tokenizer_file.unwrap().exists());
    }

    #[test]
    fn test_unpack_keeps_matching_name() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(
            &package,
            &[("model-1.onnx", b"graph"), (TOKENIZER_FILE_NAME, b"{}")],
        );

        let dest = temp.path().join("out");
        let layout = unpack(&package, &dest, "model-1", ModelKind::TextEmbedding).unwrap();
        assert_eq!(layout.model_file.unwrap(), dest.join("model-1.onnx"));
    }

    #[test]
    fn test_unpack_multiple_model_files_fails() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(
            &package,
            &[
                ("a.pt", b"one"),
                ("b.onnx", b"two"),
                (TOKENIZER_FILE_NAME, b"{}"),
            ],
        );

        let dest = temp.path().join("out");
        let err = unpack(&package, &dest, "m", ModelKind::TextEmbedding).unwrap_err();
        assert!(matches!(
            err,
            DepotError::Packaging(PackagingError::MultipleModelFiles)
        ));
    }

    #[test]
    fn test_unpack_zero_model_files_fails() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(&package, &[(TOKENIZER_FILE_NAME, b"{}")]);

        let dest = temp.path().join("out");
        let err = unpack(&package, &dest, "m", ModelKind::TextEmbedding).unwrap_err();
        assert!(matches!(
            err,
            DepotError::Packaging(PackagingError::NoModelFile)
        ));
    }

    #[test]
    fn test_unpack_tokenizer_only_needs_no_graph() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(&package, &[(TOKENIZER_FILE_NAME, b"{}")]);

        let dest = temp.path().join("out");
        let layout = unpack(&package, &dest, "m", ModelKind::TokenizerOnly).unwrap();
        assert!(layout.model_file.is_none());
        assert!(layout.tokenizer_file.is_some());
    }

    #[test]
    fn test_unpack_missing_tokenizer_fails() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(&package, &[("m.pt", b"graph")]);

        let dest = temp.path().join("out");
        let err = unpack(&package, &dest, "m", ModelKind::TextEmbedding).unwrap_err();
        assert!(matches!(
            err,
            DepotError::Packaging(PackagingError::MissingTokenizer)
        ));
    }

    #[test]
    fn test_unpack_raw_kind_tokenizer_optional() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(&package, &[("m.pt", b"graph")]);

        let dest = temp.path().join("out");
        let layout = unpack(&package, &dest, "m", ModelKind::Raw).unwrap();
        assert!(layout.model_file.is_some());
        assert!(layout.tokenizer_file.is_none());
    }

    #[test]
    fn test_unpack_is_hermetic() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(
            &package,
            &[("m.pt", b"graph"), (TOKENIZER_FILE_NAME, b"{}")],
        );

        let dest = temp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.pt"), b"leftover from a failed attempt").unwrap();

        // The stale second model file would trip the multiple-files rule if
        // the directory were not recreated.
        let layout = unpack(&package, &dest, "m", ModelKind::TextEmbedding).unwrap();
        assert!(layout.model_file.is_some());
        assert!(!dest.join("stale.pt").exists());
    }

    #[test]
    fn test_unpack_rejects_escaping_entry() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(&package, &[("../evil.pt", b"nope")]);

        let dest = temp.path().join("out");
        let err = unpack(&package, &dest, "m", ModelKind::Raw).unwrap_err();
        assert!(matches!(
            err,
            DepotError::Packaging(PackagingError::MalformedArchive(_))
        ));
    }

    #[test]
    fn test_unpack_preserves_subdirectories() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        write_package(
            &package,
            &[
                ("m.pt", b"graph"),
                (TOKENIZER_FILE_NAME, b"{}"),
                ("config/special_tokens.json", b"{}"),
            ],
        );

        let dest = temp.path().join("out");
        let layout = unpack(&package, &dest, "m", ModelKind::TextEmbedding).unwrap();
        assert!(layout.root.join("config/special_tokens.json").exists());
    }

    #[test]
    fn test_unpack_garbage_archive_fails() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("pkg.zip");
        fs::write(&package, b"this is not a zip file").unwrap();

        let dest = temp.path().join("out");
        let err = unpack(&package, &dest, "m", ModelKind::Raw).unwrap_err();
        assert!(matches!(err, DepotError::Packaging(_)));
    }
}
