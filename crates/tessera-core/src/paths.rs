//! Output and working directory management.
//!
//! Compiled modules are written next to the document they were built from:
//!
//! ```text
//! analysis.tsr
//! .tessera/
//! └── libanalysis.so   # Compiled model module
//! ```
//!
//! Documents that have never been saved build into the temporary directory
//! under a name derived from the process, user and time of the build.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Name of the per-document build directory.
pub const BUILD_DIR_NAME: &str = ".tessera";

/// Platform-specific dynamic library extension.
pub fn dylib_extension() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dll"
    }
    #[cfg(target_os = "macos")]
    {
        "dylib"
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "so"
    }
}

/// Platform-specific dynamic library prefix.
pub fn dylib_prefix() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        ""
    }
    #[cfg(not(target_os = "windows"))]
    {
        "lib"
    }
}

/// Compute where the module built from a document should be written.
pub fn module_output_path(document_path: Option<&Path>, config: &EngineConfig) -> PathBuf {
    match document_path {
        Some(path) => {
            let stem = path
                .file_stem()
                .map(|s| sanitize(&s.to_string_lossy()))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "document".to_string());
            let dir = match &config.build_dir {
                Some(dir) => dir.clone(),
                None => path
                    .parent()
                    .unwrap_or(Path::new("."))
                    .join(BUILD_DIR_NAME),
            };
            dir.join(format!("{}{}.{}", dylib_prefix(), stem, dylib_extension()))
        }
        None => {
            let dir = config.build_dir.clone().unwrap_or_else(|| config.temp_dir.clone());
            dir.join(format!(
                "{}{}.{}",
                dylib_prefix(),
                unsaved_module_stem(),
                dylib_extension()
            ))
        }
    }
}

/// Name used for modules of documents that have no path yet.
fn unsaved_module_stem() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .map(|u| sanitize(&u))
        .unwrap_or_default();
    let user = if user.is_empty() { "user".to_string() } else { user };
    let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S%3f");

    format!("tessera_{}_{}_{}", std::process::id(), user, timestamp)
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Make sure `dir` exists and accepts new files.
///
/// # Errors
/// Returns [`Error::DirectoryNotWritable`] if the directory cannot be created
/// or a probe file cannot be written into it.
pub fn ensure_writable_dir(dir: &Path) -> Result<()> {
    if let Err(e) = fs::create_dir_all(dir) {
        tracing::warn!("Failed to create build directory {}: {}", dir.display(), e);
        return Err(Error::DirectoryNotWritable(dir.to_path_buf()));
    }

    // Probe file is removed when dropped
    match tempfile::tempfile_in(dir) {
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!("Build directory {} is not writable: {}", dir.display(), e);
            Err(Error::DirectoryNotWritable(dir.to_path_buf()))
        }
    }
}

/// Directory a model runs in: the document's directory, else the user's
/// Documents, Desktop or home directory, in that order.
pub fn working_directory(document_path: Option<&Path>) -> PathBuf {
    document_path
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty() && dir.is_dir())
        .map(Path::to_path_buf)
        .or_else(dirs::document_dir)
        .or_else(dirs::desktop_dir)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_path_next_to_document() {
        let config = EngineConfig::default();
        let path = module_output_path(Some(Path::new("/work/notes/analysis.tsr")), &config);

        assert_eq!(
            path,
            PathBuf::from("/work/notes")
                .join(BUILD_DIR_NAME)
                .join(format!("{}analysis.{}", dylib_prefix(), dylib_extension()))
        );
    }

    #[test]
    fn test_output_path_respects_build_dir() {
        let config = EngineConfig::default().with_build_dir("/var/build");
        let path = module_output_path(Some(Path::new("/work/my doc.tsr")), &config);

        assert_eq!(path.parent(), Some(Path::new("/var/build")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains("my_doc"));
    }

    #[test]
    fn test_output_path_for_unsaved_document() {
        let temp = TempDir::new().unwrap();
        let config = EngineConfig::default().with_temp_dir(temp.path());
        let path = module_output_path(None, &config);

        assert_eq!(path.parent(), Some(temp.path()));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.contains(&format!("tessera_{}_", std::process::id())));
        assert!(name.ends_with(dylib_extension()));
    }

    #[test]
    fn test_ensure_writable_dir_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join(BUILD_DIR_NAME);

        ensure_writable_dir(&dir).expect("directory should be writable");
        assert!(dir.is_dir());
        // Probe file must not be left behind
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_writable_dir_rejects_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("locked");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        // Permission bits do not bind a privileged user
        let marker = dir.join("marker");
        let privileged = fs::write(&marker, b"x").is_ok();
        let _ = fs::remove_file(&marker);

        let result = ensure_writable_dir(&dir);
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        if !privileged {
            assert!(matches!(result, Err(Error::DirectoryNotWritable(_))));
        }
    }

    #[test]
    fn test_working_directory_prefers_document_dir() {
        let temp = TempDir::new().unwrap();
        let doc = temp.path().join("doc.tsr");
        assert_eq!(working_directory(Some(&doc)), temp.path());
    }

    #[test]
    fn test_working_directory_fallback() {
        let dir = working_directory(None);
        assert!(!dir.as_os_str().is_empty());
    }
}
