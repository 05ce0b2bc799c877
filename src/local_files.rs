use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{UploaderError, UploaderResult};

/// Number of `-N` suffixes tried before giving up on a free name.
pub const MAX_NAME_SUFFIX: u32 = 998;

/// List the regular files directly inside `dir`, sorted by name.
///
/// Subdirectories (the resting directory among them) are skipped.
pub fn discover_local_files(dir: &Path) -> UploaderResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        UploaderError::configuration(
            "local_path",
            &format!("Cannot read {}: {}", dir.display(), e),
        )
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            files.push(path);
        }
    }

    files.sort();
    log::debug!("Found {} file(s) in {}", files.len(), dir.display());
    Ok(files)
}

/// Create `source/resting` (and parents) if it does not exist yet.
pub fn ensure_resting_dir(source: &Path, resting: &Path) -> UploaderResult<PathBuf> {
    let resting_dir = source.join(resting);
    fs::create_dir_all(&resting_dir).map_err(|e| UploaderError::filesystem(&resting_dir, e))?;
    Ok(resting_dir)
}

/// Split `name` into root and extension at the last `.`.
///
/// A leading dot does not start an extension.
fn split_name(name: &OsStr) -> (&OsStr, Option<&OsStr>) {
    let path = Path::new(name);
    match path.file_stem() {
        Some(root) => (root, path.extension()),
        None => (name, None),
    }
}

/// First path in `folder` not taken by an existing file: `name`, then
/// `root-1.ext`, `root-2.ext`, ... up to [`MAX_NAME_SUFFIX`].
pub fn find_unused_name(folder: &Path, name: impl AsRef<OsStr>) -> UploaderResult<PathBuf> {
    let name = name.as_ref();
    let candidate = folder.join(name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let (root, ext) = split_name(name);
    for i in 1..=MAX_NAME_SUFFIX {
        let mut probe = root.to_os_string();
        probe.push(format!("-{}", i));
        if let Some(ext) = ext {
            probe.push(".");
            probe.push(ext);
        }
        let candidate = folder.join(probe);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(UploaderError::NameExhausted {
        folder: folder.to_path_buf(),
        name: name.to_string_lossy().to_string(),
    })
}

/// Move an uploaded file into the resting directory without overwriting
/// anything already parked there. Returns the new location.
pub fn move_to_resting(file: &Path, resting_dir: &Path) -> UploaderResult<PathBuf> {
    let name = file.file_name().ok_or_else(|| {
        UploaderError::filesystem(
            file,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;

    let destination = find_unused_name(resting_dir, name)?;
    fs::rename(file, &destination).map_err(|e| UploaderError::filesystem(file, e))?;
    log::debug!("Moved {} to {}", file.display(), destination.display());
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        fs::write(path, b"data").unwrap();
    }

    #[test]
    fn test_discover_skips_directories() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("b.txt"));
        touch(&dir.path().join("a.txt"));
        fs::create_dir(dir.path().join("uploaded")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested").join("deep.txt"));

        let files = discover_local_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.txt"), dir.path().join("b.txt")]
        );
    }

    #[test]
    fn test_discover_missing_dir_is_configuration_error() {
        let dir = tempdir().unwrap();
        let result = discover_local_files(&dir.path().join("does-not-exist"));
        assert!(matches!(
            result,
            Err(UploaderError::Configuration { ref field, .. }) if field == "local_path"
        ));
    }

    #[test]
    fn test_ensure_resting_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let first = ensure_resting_dir(dir.path(), Path::new("done/archive")).unwrap();
        let second = ensure_resting_dir(dir.path(), Path::new("done/archive")).unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn test_find_unused_name_prefers_original() {
        let dir = tempdir().unwrap();
        assert_eq!(
            find_unused_name(dir.path(), "report.csv").unwrap(),
            dir.path().join("report.csv")
        );
    }

    #[test]
    fn test_find_unused_name_probes_suffixes() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("report.csv"));
        assert_eq!(
            find_unused_name(dir.path(), "report.csv").unwrap(),
            dir.path().join("report-1.csv")
        );

        touch(&dir.path().join("report-1.csv"));
        assert_eq!(
            find_unused_name(dir.path(), "report.csv").unwrap(),
            dir.path().join("report-2.csv")
        );
    }

    #[test]
    fn test_find_unused_name_multi_dot_and_no_extension() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("archive.tar.gz"));
        touch(&dir.path().join("README"));
        touch(&dir.path().join(".env"));

        assert_eq!(
            find_unused_name(dir.path(), "archive.tar.gz").unwrap(),
            dir.path().join("archive.tar-1.gz")
        );
        assert_eq!(
            find_unused_name(dir.path(), "README").unwrap(),
            dir.path().join("README-1")
        );
        assert_eq!(
            find_unused_name(dir.path(), ".env").unwrap(),
            dir.path().join(".env-1")
        );
    }

    #[test]
    fn test_find_unused_name_exhausted() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("x.log"));
        for i in 1..=MAX_NAME_SUFFIX {
            touch(&dir.path().join(format!("x-{}.log", i)));
        }

        let result = find_unused_name(dir.path(), "x.log");
        assert!(matches!(result, Err(UploaderError::NameExhausted { .. })));
    }

    #[test]
    fn test_move_to_resting_avoids_collision() {
        let dir = tempdir().unwrap();
        let resting = ensure_resting_dir(dir.path(), Path::new("uploaded")).unwrap();
        touch(&resting.join("report.csv"));
        let source = dir.path().join("report.csv");
        fs::write(&source, b"new contents").unwrap();

        let moved = move_to_resting(&source, &resting).unwrap();

        assert_eq!(moved, resting.join("report-1.csv"));
        assert!(!source.exists());
        assert_eq!(fs::read(&moved).unwrap(), b"new contents");
        assert_eq!(fs::read(resting.join("report.csv")).unwrap(), b"data");
    }

    #[test]
    fn test_move_to_resting_missing_source() {
        let dir = tempdir().unwrap();
        let resting = ensure_resting_dir(dir.path(), Path::new("uploaded")).unwrap();
        let result = move_to_resting(&dir.path().join("gone.txt"), &resting);
        assert!(matches!(result, Err(UploaderError::Filesystem { .. })));
    }

    #[test]
    fn test_find_unused_name_trailing_dot() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("notes."));
        assert_eq!(
            find_unused_name(dir.path(), "notes.").unwrap(),
            dir.path().join("notes-1.")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_move_to_resting_keeps_non_utf8_name() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let resting = ensure_resting_dir(dir.path(), Path::new("uploaded")).unwrap();
        let name = OsStr::from_bytes(b"caf\xE9.txt");
        let source = dir.path().join(name);
        touch(&source);

        let moved = move_to_resting(&source, &resting).unwrap();
        assert_eq!(moved.file_name().unwrap().as_bytes(), b"caf\xE9.txt");

        let again = dir.path().join(name);
        touch(&again);
        let moved = move_to_resting(&again, &resting).unwrap();
        assert_eq!(moved.file_name().unwrap().as_bytes(), b"caf\xE9-1.txt");
    }
}
