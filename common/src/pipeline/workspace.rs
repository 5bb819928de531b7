// Run workspace: resolved roots and the scoped scratch directory

use crate::config::Settings;
use crate::errors::PipelineError;
use crate::models::RunOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directories of one access-file run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub master_root: PathBuf,
    pub access_root: PathBuf,
    pub temp_dir: PathBuf,
}

impl Workspace {
    /// Resolve the roots for this run and check the fatal preconditions.
    ///
    /// Outside a dry run the shared storage holding the master files must be
    /// mounted. The master root must exist; the access root is created.
    pub fn prepare(
        settings: &Settings,
        options: &RunOptions,
        shared_storage_available: bool,
    ) -> Result<Self, PipelineError> {
        let (master_root, access_root) = if options.dryrun {
            (
                settings.dryrun.master_root.clone(),
                settings.dryrun.access_root.clone(),
            )
        } else {
            if !shared_storage_available {
                return Err(PipelineError::SharedStorageUnavailable {
                    variable: settings.paths.shared_storage_env.clone(),
                });
            }
            (
                settings.paths.master_root.clone(),
                settings.paths.access_root.clone(),
            )
        };

        if !master_root.is_dir() {
            return Err(PipelineError::MasterRootMissing(master_root));
        }

        std::fs::create_dir_all(&access_root).map_err(|e| PipelineError::FileSystem {
            path: access_root.clone(),
            reason: e.to_string(),
        })?;

        let workspace = Self {
            master_root,
            access_root,
            temp_dir: settings.paths.app_dir.join("temp"),
        };
        info!(
            master_root = %workspace.master_root.display(),
            access_root = %workspace.access_root.display(),
            "Workspace prepared"
        );
        Ok(workspace)
    }
}

/// Owns the run's scratch directory; it is removed when the guard drops
#[derive(Debug)]
pub struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        std::fs::create_dir_all(path).map_err(|e| PipelineError::FileSystem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "Temp directory created");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Temp directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove temp directory"),
        }
    }
}
