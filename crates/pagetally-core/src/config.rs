// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Analyzer configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PagetallyError, Result};
use crate::types::Colorspace;

/// Environment variable overriding where scratch files are created.
pub const TMPDIR_ENV: &str = "PAGETALLY_TMPDIR";

/// Lowest accepted rendering resolution (DPI).
pub const MIN_RESOLUTION: u32 = 72;

/// Highest accepted rendering resolution (DPI).
pub const MAX_RESOLUTION: u32 = 1200;

/// Settings shared by every job an analyzer processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerOptions {
    /// Resolution used when rendering jobs for ink coverage.
    pub resolution: u32,
    /// Colorspace for ink coverage; `None` means page counting only.
    pub colorspace: Option<Colorspace>,
    /// Directory for spooled input and rendered scratch files.
    pub temp_dir: Option<PathBuf>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            resolution: MIN_RESOLUTION,
            colorspace: None,
            temp_dir: None,
        }
    }
}

impl AnalyzerOptions {
    /// Defaults, with `temp_dir` taken from [`TMPDIR_ENV`] when set.
    pub fn from_env() -> Self {
        let temp_dir = std::env::var_os(TMPDIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            temp_dir,
            ..Self::default()
        }
    }

    /// Check option ranges before any job is opened.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution) {
            return Err(PagetallyError::InvalidOption(format!(
                "resolution must be between {MIN_RESOLUTION} and {MAX_RESOLUTION} dpi, got {}",
                self.resolution
            )));
        }
        Ok(())
    }

    /// Directory where scratch files go.
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resolution_is_valid() {
        assert!(AnalyzerOptions::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_resolution_is_rejected() {
        let options = AnalyzerOptions {
            resolution: 1201,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(PagetallyError::InvalidOption(_))
        ));
    }

    #[test]
    fn explicit_temp_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        let options = AnalyzerOptions {
            temp_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert_eq!(options.scratch_dir(), dir.path());
    }
}
