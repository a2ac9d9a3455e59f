// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Operator-facing error messages.
//
// Print accounting runs unattended inside spooler backends; when a job cannot
// be counted the administrator reading the log needs to know whether to
// install something, fix the input, or report a parser bug.

use crate::error::PagetallyError;

/// Severity of an error from the operator's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// I/O hiccup or external tool crash; the same job may count on retry.
    Transient,
    /// Something must be installed or reconfigured on the host.
    ActionRequired,
    /// The job data itself cannot be counted.
    Permanent,
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// One-line summary.
    pub message: String,
    /// What the operator should try.
    pub suggestion: String,
    /// Whether re-running the same job could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `PagetallyError` into a `HumanError`.
pub fn humanize_error(err: &PagetallyError) -> HumanError {
    match err {
        PagetallyError::Job { source, .. } => humanize_error(source),

        PagetallyError::EmptyInput { input } => HumanError {
            message: format!("{input} contains no data."),
            suggestion: "Check that the spooler passed the job file and not an empty placeholder.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagetallyError::InvalidFormat { format } | PagetallyError::MalformedData { format, .. } => {
            HumanError {
                message: format!("The job looks like {format} but could not be read as such."),
                suggestion: "The file may be truncated or produced by an unusual driver. Keep a copy of it for analysis.".into(),
                retriable: false,
                severity: Severity::Permanent,
            }
        }

        PagetallyError::UnsupportedFormat { reason, .. } => HumanError {
            message: "The job's page description language is not recognised.".into(),
            suggestion: format!("Configure the driver to emit PostScript, PDF or PCL. (Detail: {reason})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagetallyError::MissingDependency { command, .. } => HumanError {
            message: format!("The helper program `{command}` is not installed."),
            suggestion: format!("Install {command} and make sure it is on the PATH of the accounting process."),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PagetallyError::Conversion(_) => HumanError {
            message: "An external converter failed on this job.".into(),
            suggestion: "Run the job again with --debug to see which command failed.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        PagetallyError::InvalidOption(detail) => HumanError {
            message: "An option is out of range.".into(),
            suggestion: detail.clone(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        PagetallyError::Zip(_) => HumanError {
            message: "The document package is damaged.".into(),
            suggestion: "Open and re-save the document, then print it again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagetallyError::Image(_) => HumanError {
            message: "The image could not be decoded.".into(),
            suggestion: "The image may be damaged or use an unusual encoding.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        PagetallyError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "The job file couldn't be found.".into(),
                suggestion: "It may have been removed by the spooler before accounting ran.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "No permission to read the job file or scratch directory.".into(),
                suggestion: "Check the permissions of the spool directory and of PAGETALLY_TMPDIR.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Try again. If this keeps happening, the scratch disk may be full.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        PagetallyError::Serialization(_) => HumanError {
            message: "The report could not be serialised.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}
