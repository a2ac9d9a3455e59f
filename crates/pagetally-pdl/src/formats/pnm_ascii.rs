// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain (ASCII) PBM/PGM/PPM — one page per image header.

use tracing::{debug, instrument};

use pagetally_core::error::Result;
use pagetally_core::types::PdlFormat;

use crate::bytes::{self, tokens};
use crate::external::{Recipe, Stage};
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

const MARKERS: [&[u8]; 3] = [b"P1", b"P2", b"P3"];

/// Comment Ghostscript's pksm device puts on the second line of CMYK
/// separations, where each page is written as four images.
const SEPARATIONS: &[u8] = b"device=pksm";

const CONVERT: Stage = Stage {
    program: "convert",
    args: &["{in}", "{out}"],
};

/// Count images introduced by `marker` in a line stream.
pub fn count_images<I>(lines: I, marker: &[u8]) -> Result<u64>
where
    I: IntoIterator<Item = std::io::Result<Vec<u8>>>,
{
    let mut images = 0u64;
    let mut divisor = 1u64;
    for (index, line) in lines.into_iter().enumerate() {
        let line = line?;
        if index == 1 && bytes::contains(&line, SEPARATIONS) {
            divisor = 4;
        }
        images += tokens(&line).iter().filter(|token| **token == marker).count() as u64;
    }
    if images % divisor == 0 {
        Ok(images / divisor)
    } else {
        Ok(images)
    }
}

/// Parser for plain PNM images.
#[derive(Debug)]
pub struct AsciiPnmParser {
    job: JobData,
    marker: &'static [u8],
}

impl FormatParser for AsciiPnmParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::AsciiPnm,
        open_mode: OpenMode::Text,
        required: &["convert"],
        to_tiff: &[Recipe {
            steps: &[&[CONVERT]],
        }],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        let first = tokens(&probe.head).first().copied().unwrap_or(b"");
        let Some(marker) = MARKERS.iter().copied().find(|marker| *marker == first) else {
            return Err(not_this_format(PdlFormat::AsciiPnm));
        };
        Ok(Self {
            job: job.clone(),
            marker,
        })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let pages = count_images(self.job.lines()?, self.marker)?;
        debug!(marker = %String::from_utf8_lossy(self.marker), pages, "PNM images");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::UniversalLines;

    fn count(data: &[u8], marker: &[u8]) -> u64 {
        count_images(UniversalLines::new(data), marker).unwrap()
    }

    #[test]
    fn each_header_is_a_page() {
        let data = b"P1\n2 2\n0 1\n1 0\nP1\n2 2\n1 1\n0 0\n";
        assert_eq!(count(data, b"P1"), 2);
    }

    #[test]
    fn separations_are_grouped_by_four() {
        let data = b"P2\n# device=pksm\n1 1 255\n0\nP2 1 1 255 0\nP2 1 1 255 0\nP2 1 1 255 0\n";
        assert_eq!(count(data, b"P2"), 1);
        let odd = b"P2\n# device=pksm\n1 1 255\n0\nP2 1 1 255 0\n";
        assert_eq!(count(odd, b"P2"), 2);
    }

    #[test]
    fn detection_reads_first_token() {
        let job = JobData::new("unused", std::env::temp_dir());
        assert!(AsciiPnmParser::open(&job, &DetectionProbe::from_bytes(b"  P3\n1 1\n255\n")).is_ok());
        assert!(AsciiPnmParser::open(&job, &DetectionProbe::from_bytes(b"P6\n1 1\n255\n")).is_err());
        assert!(AsciiPnmParser::open(&job, &DetectionProbe::from_bytes(b"")).is_err());
    }
}
