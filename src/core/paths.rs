//! Well-known filesystem locations for a deployment.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Production configuration directory (settings, secrets).
pub const DEFAULT_CONFIG_DIR: &str = "/etc/stagehand-app";

/// Root the prebuilt static assets are served from on tarball deploys.
pub const DEFAULT_STATIC_ROOT: &str = "/srv/stagehand-app/prod-static";

/// Resolved locations the upgrade steps operate on.
///
/// Config and static roots are overridable so tests can point them at
/// tempdirs; production callers use `for_deploy`.
#[derive(Debug, Clone)]
pub struct DeployPaths {
    pub deploy_path: PathBuf,
    pub config_dir: PathBuf,
    pub static_root: PathBuf,
}

impl DeployPaths {
    pub fn for_deploy(deploy_path: &Path) -> Self {
        Self {
            deploy_path: deploy_path.to_path_buf(),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            static_root: PathBuf::from(DEFAULT_STATIC_ROOT),
        }
    }

    pub fn with_config_dir(mut self, dir: &Path) -> Self {
        self.config_dir = dir.to_path_buf();
        self
    }

    pub fn with_static_root(mut self, dir: &Path) -> Self {
        self.static_root = dir.to_path_buf();
        self
    }

    /// Path of a project-local helper script inside the deploy.
    pub fn script(&self, relative: &str) -> PathBuf {
        self.deploy_path.join(relative)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.deploy_path.exists() {
            return Err(Error::deploy_path_invalid(
                self.deploy_path.display().to_string(),
                "path does not exist",
            ));
        }
        if !self.deploy_path.is_dir() {
            return Err(Error::deploy_path_invalid(
                self.deploy_path.display().to_string(),
                "path is not a directory",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_path() {
        let paths = DeployPaths::for_deploy(Path::new("/nonexistent/deploy"));
        let err = paths.validate().unwrap_err();
        assert_eq!(err.code.as_str(), "deploy.path_invalid");
    }

    #[test]
    fn validate_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DeployPaths::for_deploy(dir.path());
        assert!(paths.validate().is_ok());
    }

    #[test]
    fn script_joins_relative_path() {
        let paths = DeployPaths::for_deploy(Path::new("/home/app/deployments/next"));
        assert_eq!(
            paths.script("scripts/restart-server"),
            PathBuf::from("/home/app/deployments/next/scripts/restart-server")
        );
    }
}
