//! Opening websites, applications, and folders
//!
//! Everything here is fire-and-forget: a launched process is reaped by a
//! background thread, and a failure is reported to the caller (who speaks
//! it) but is never fatal.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to start {target}: {reason}")]
    Failed { target: String, reason: String },
}

/// Side effects the command handlers may trigger
pub trait ResourceLauncher: Send + Sync {
    fn open_url(&self, url: &str) -> Result<(), LaunchError>;

    fn launch_executable(&self, path: &str) -> Result<(), LaunchError>;

    fn open_folder(&self, path: &Path) -> Result<(), LaunchError>;
}

/// Launcher backed by the desktop's default handlers
pub struct SystemLauncher;

impl ResourceLauncher for SystemLauncher {
    fn open_url(&self, url: &str) -> Result<(), LaunchError> {
        log::info!("Opening URL: {}", url);
        open::that_detached(url).map_err(|e| LaunchError::Failed {
            target: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn launch_executable(&self, path: &str) -> Result<(), LaunchError> {
        log::info!("Launching: {}", path);
        let mut parts = path.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| LaunchError::NotFound("(empty command)".to_string()))?;

        let child = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => LaunchError::NotFound(program.to_string()),
                _ => LaunchError::Failed {
                    target: program.to_string(),
                    reason: e.to_string(),
                },
            })?;

        if let Err(e) = reap_in_background(child, program) {
            log::warn!("Could not start reaper for {}: {}", program, e);
        }
        Ok(())
    }

    fn open_folder(&self, path: &Path) -> Result<(), LaunchError> {
        if !path.is_dir() {
            return Err(LaunchError::NotFound(path.display().to_string()));
        }
        log::info!("Opening folder: {}", path.display());
        open::that_detached(path).map_err(|e| LaunchError::Failed {
            target: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Wait for `child` on its own thread so it never lingers as a zombie
fn reap_in_background(
    mut child: Child,
    program: &str,
) -> std::io::Result<JoinHandle<Option<ExitStatus>>> {
    let program = program.to_string();
    thread::Builder::new()
        .name("launch-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => {
                log::debug!("{} exited with {}", program, status);
                Some(status)
            }
            Err(e) => {
                log::warn!("Failed to wait for {}: {}", program, e);
                None
            }
        })
}
