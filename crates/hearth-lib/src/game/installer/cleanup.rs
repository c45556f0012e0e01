use std::fs;
use std::path::PathBuf;

/// Removes what an installer wrote unless the install completed.
///
/// Paths are registered as they are written; dropping the guard while still
/// armed deletes them in reverse order. [`disarm`](Self::disarm) keeps them.
pub struct FailureCleanup {
    label: String,
    paths: Vec<PathBuf>,
    armed: bool,
}

impl FailureCleanup {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            paths: Vec::new(),
            armed: true,
        }
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn disarm(mut self) {
        self.armed = false;
        log::debug!("[cleanup:{}] kept {} paths", self.label, self.paths.len());
    }
}

impl Drop for FailureCleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        log::warn!(
            "[cleanup:{}] install failed, removing {} paths",
            self.label,
            self.paths.len()
        );
        for path in self.paths.iter().rev() {
            let result = if path.is_dir() {
                fs::remove_dir_all(path)
            } else {
                fs::remove_file(path)
            };
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("[cleanup:{}] failed to remove {:?}: {}", self.label, path, e),
            }
        }
    }
}
