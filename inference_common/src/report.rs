use std::fmt;
use std::path::{Path, PathBuf};

/// What happened to one frame file inside a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Processed { path: PathBuf },
    Skipped { path: PathBuf, reason: String },
}

impl FrameOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FrameOutcome::Processed { path } | FrameOutcome::Skipped { path, .. } => path,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FrameOutcome::Skipped { .. })
    }
}

/// Per-frame outcomes of a stage, in processing order.
#[derive(Debug, Default, Clone)]
pub struct StageReport {
    pub outcomes: Vec<FrameOutcome>,
}

impl StageReport {
    pub fn processed(&mut self, path: impl Into<PathBuf>) {
        self.outcomes.push(FrameOutcome::Processed { path: path.into() });
    }

    /// Records a skip and logs it as a warning.
    pub fn skipped(&mut self, path: impl Into<PathBuf>, reason: impl fmt::Display) {
        let path = path.into();
        let reason = reason.to_string();
        log::warn!("Skipping unreadable image {path:?}: {reason}");
        self.outcomes.push(FrameOutcome::Skipped { path, reason });
    }

    pub fn processed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_skipped()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn skipped_paths(&self) -> impl Iterator<Item = &Path> {
        self.outcomes
            .iter()
            .filter(|o| o.is_skipped())
            .map(FrameOutcome::path)
    }
}
