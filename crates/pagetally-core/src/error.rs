// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for pagetally.

use thiserror::Error;

/// Top-level error type for all pagetally operations.
#[derive(Debug, Error)]
pub enum PagetallyError {
    // -- Detection --
    #[error("input {input} is empty")]
    EmptyInput { input: String },

    #[error("data is not in the {format} format")]
    InvalidFormat { format: &'static str },

    #[error("unsupported file format for {input} ({reason})")]
    UnsupportedFormat { input: String, reason: String },

    // -- Counting --
    #[error("{command} is missing or not executable, it is required to process {format} data")]
    MissingDependency {
        format: &'static str,
        command: String,
    },

    #[error("malformed {format} data: {detail}")]
    MalformedData {
        format: &'static str,
        detail: String,
    },

    #[error("conversion failed: {0}")]
    Conversion(String),

    #[error("{job}: {source}")]
    Job {
        job: String,
        #[source]
        source: Box<PagetallyError>,
    },

    // -- Options --
    #[error("invalid option: {0}")]
    InvalidOption(String),

    // -- Containers and codecs --
    #[error("ZIP archive error: {0}")]
    Zip(String),

    #[error("image decoding failed: {0}")]
    Image(String),

    // -- Storage / serialisation --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PagetallyError {
    /// Shorthand for a [`PagetallyError::MalformedData`] with a formatted detail.
    pub fn malformed(format: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedData {
            format,
            detail: detail.into(),
        }
    }

    /// Attach a job identifier to an error, unless it already carries one.
    pub fn in_job(self, job: impl Into<String>) -> Self {
        match self {
            already @ Self::Job { .. } => already,
            other => Self::Job {
                job: job.into(),
                source: Box::new(other),
            },
        }
    }

    /// Strip any job wrapper and return the underlying failure.
    pub fn root(&self) -> &PagetallyError {
        match self {
            Self::Job { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagetallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_wrapper_is_not_nested_twice() {
        let err = PagetallyError::malformed("DVI", "bad postamble")
            .in_job("a.dvi")
            .in_job("b.dvi");
        match &err {
            PagetallyError::Job { job, .. } => assert_eq!(job, "a.dvi"),
            other => panic!("unexpected error variant: {other}"),
        }
        assert!(matches!(err.root(), PagetallyError::MalformedData { .. }));
    }

    #[test]
    fn messages_name_the_missing_command() {
        let err = PagetallyError::MissingDependency {
            format: "PostScript",
            command: "gs".into(),
        };
        assert!(err.to_string().starts_with("gs is missing"));
    }
}
