use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

/// Application paths following OS conventions
#[derive(Clone, Debug)]
pub struct AppPaths {
    /// Configuration directory (config.toml)
    pub config: PathBuf,
}

impl AppPaths {
    /// Resolve OS-specific paths for ZILNOVA
    ///
    /// # Platform Paths
    ///
    /// ## Linux
    /// - Config: `~/.config/zilnova/`
    ///
    /// ## macOS
    /// - Config: `~/Library/Application Support/dev.Zilnova.ZILNOVA/`
    ///
    /// ## Windows
    /// - Config: `%APPDATA%\Zilnova\ZILNOVA\config\`
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("dev", "Zilnova", "ZILNOVA")
            .context("Failed to determine project directories")?;

        Ok(Self {
            config: proj_dirs.config_dir().to_path_buf(),
        })
    }

    /// Paths rooted somewhere else (portable installs, tests)
    pub fn rooted(root: &std::path::Path) -> Self {
        Self {
            config: root.join("config"),
        }
    }

    /// Create all necessary directories
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.config).context("Failed to create config directory")?;

        log::info!("Application directories initialized");
        log::debug!("  Config: {}", self.config.display());

        Ok(())
    }

    /// Get path to config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_creation() {
        let paths = AppPaths::new().expect("Failed to create paths");

        assert!(!paths.config.as_os_str().is_empty());
        assert!(paths.config_file().ends_with("config.toml"));
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(dir.path());
        paths.ensure_directories().unwrap();

        assert!(paths.config.is_dir());
        assert!(!paths.config_file().exists());
    }
}
