// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pagetally-pdl — Page description language analysis.
//
// Identifies which page description language a print job is written in by
// running an ordered list of detectors over a head/tail probe of the data,
// then counts the physical pages the job produces (copies and duplex
// directives included). Jobs can also be rendered to multi-page TIFF through
// external converters to sample ink coverage.

pub mod analyzer;
pub mod bytes;
pub mod coverage;
pub mod detect;
pub mod external;
pub mod formats;
pub mod lines;
pub mod parser;
pub mod pjl;
pub mod probe;
pub mod spool;

// Re-export the primary structs so callers can use `pagetally_pdl::Analyzer` etc.
pub use analyzer::{Analyzer, Job};
pub use parser::{FormatParser, JobData, PdlParser};
pub use probe::DetectionProbe;
pub use spool::InputSource;
