/**
 * Paths Module
 *
 * Resolves the per-application configuration root and the directories
 * that live under it.
 *
 * All state is stored under the user config directory:
 * - macOS: ~/Library/Application Support/neuronbox/
 * - Windows: %APPDATA%/neuronbox/
 * - Linux: ~/.config/neuronbox/
 */
use std::io;
use std::path::{Path, PathBuf};

/// Application name used for the config directory
pub const APP_NAME: &str = "neuronbox";

/// Get the default configuration root
pub fn default_config_root() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the models directory
///
/// Returns: {config_root}/models/
pub fn models_dir(root: &Path) -> PathBuf {
    root.join("models")
}

/// Get the download status directory
///
/// Returns: {config_root}/download_status/
pub fn download_status_dir(root: &Path) -> PathBuf {
    root.join("download_status")
}

/// Get the SQLite ledger path
///
/// Returns: {config_root}/download_status/ledger.db
pub fn ledger_db_path(root: &Path) -> PathBuf {
    download_status_dir(root).join("ledger.db")
}

/// Get the optional server config file
///
/// Returns: {config_root}/server.toml
pub fn config_file_path(root: &Path) -> PathBuf {
    root.join("server.toml")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Create the config root, models and status directories.
pub fn init_dirs(root: &Path) -> io::Result<()> {
    for dir in [root.to_path_buf(), models_dir(root), download_status_dir(root)] {
        ensure_dir_exists(&dir)?;
    }

    tracing::info!("[Paths] Directories initialized under {}", root.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_under_root() {
        let root = Path::new("/tmp/nb");
        assert_eq!(models_dir(root), Path::new("/tmp/nb/models"));
        assert_eq!(download_status_dir(root), Path::new("/tmp/nb/download_status"));
        assert_eq!(
            ledger_db_path(root),
            Path::new("/tmp/nb/download_status/ledger.db")
        );
    }

    #[test]
    fn test_init_dirs_creates_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("cfg");
        init_dirs(&root).unwrap();
        assert!(models_dir(&root).is_dir());
        assert!(download_status_dir(&root).is_dir());
        // Idempotent
        init_dirs(&root).unwrap();
    }
}
