//! Where model files live.
//!
//! Model file names are always resolved against one directory, by default a
//! `DSS` folder under the working directory the process was launched from.

use std::path::{Path, PathBuf};

pub const DEFAULT_MODELS_DIR: &str = "DSS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLocator {
    dir: PathBuf,
}

impl ModelLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<cwd>/<dir_name>`. Falls back to a relative path if the working
    /// directory cannot be read.
    pub fn in_current_dir(dir_name: impl AsRef<Path>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::new(cwd.join(dir_name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn resolve(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(file_name)
    }
}

impl Default for ModelLocator {
    fn default() -> Self {
        Self::in_current_dir(DEFAULT_MODELS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_joins_models_dir() {
        let loc = ModelLocator::new("/work/DSS");
        assert_eq!(loc.resolve("index.dss"), PathBuf::from("/work/DSS/index.dss"));
    }

    #[test]
    fn test_default_is_dss_under_cwd() {
        let loc = ModelLocator::default();
        assert!(loc.dir().ends_with(DEFAULT_MODELS_DIR));
        assert!(loc.dir().is_absolute());
    }
}
