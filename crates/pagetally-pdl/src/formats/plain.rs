// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain text — the catch-all, paginated like a line printer.

use tracing::{debug, instrument};

use pagetally_core::error::Result;
use pagetally_core::types::PdlFormat;

use crate::external::{GS_TIFF_FROM_STDIN, Recipe, Stage};
use crate::lines::UniversalLines;
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

/// Lines on a page of continuous stationery.
pub const LINES_PER_PAGE: u64 = 66;

const FORM_FEED: u8 = 0x0c;

const ENSCRIPT: Stage = Stage {
    program: "enscript",
    args: &["--quiet", "--portrait", "--no-header", "--columns", "1", "--output", "-", "{in}"],
};

const A2PS: Stage = Stage {
    program: "a2ps",
    args: &[
        "--borders",
        "0",
        "--quiet",
        "--portrait",
        "--no-header",
        "--columns",
        "1",
        "--output",
        "-",
        "{in}",
    ],
};

/// Pages a line printer would feed for these lines. A line past
/// [`LINES_PER_PAGE`] starts a new page; form feeds eject immediately.
/// The last page is always counted.
pub fn paginate<I>(lines: I) -> Result<u64>
where
    I: IntoIterator<Item = std::io::Result<Vec<u8>>>,
{
    let mut pages = 0u64;
    let mut line_count = 0u64;
    for line in lines {
        let line = line?;
        line_count += 1;
        if line_count > LINES_PER_PAGE {
            pages += 1;
            line_count = 0;
        } else {
            let feeds = line.iter().filter(|byte| **byte == FORM_FEED).count() as u64;
            if feeds > 0 {
                pages += feeds;
                line_count = 0;
            }
        }
    }
    Ok(pages + 1)
}

/// Whether the head looks like text: several lines, no NUL bytes and at
/// least some printable ASCII.
pub fn looks_like_text(head: &[u8]) -> bool {
    let lines = UniversalLines::new(head).take(2).count();
    lines > 1
        && !head.contains(&0)
        && head.iter().any(|byte| (0x20..0x7f).contains(byte))
}

/// Parser for plain text jobs.
#[derive(Debug)]
pub struct PlainTextParser {
    job: JobData,
}

impl FormatParser for PlainTextParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::PlainText,
        open_mode: OpenMode::Text,
        required: &["a2ps|enscript", "gs"],
        to_tiff: &[
            Recipe {
                steps: &[&[ENSCRIPT, GS_TIFF_FROM_STDIN]],
            },
            Recipe {
                steps: &[&[A2PS, GS_TIFF_FROM_STDIN]],
            },
        ],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !looks_like_text(&probe.head) {
            return Err(not_this_format(PdlFormat::PlainText));
        }
        Ok(Self { job: job.clone() })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let pages = paginate(self.job.lines()?)?;
        debug!(pages, "text paginated");
        Ok(pages)
    }
}
