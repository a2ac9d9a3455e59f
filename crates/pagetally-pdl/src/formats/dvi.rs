// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// DVI — page count read from the postamble.

use std::fs::File;

use memmap2::Mmap;
use tracing::{instrument, warn};

use pagetally_core::error::Result;
use pagetally_core::types::PdlFormat;

use crate::external::{GS_TIFF_FROM_STDIN, Recipe, Stage};
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

/// Preamble opcode.
const PRE: u8 = 0xf7;
/// Postamble opcode.
const POST: u8 = 0xf8;
/// Trailing fill byte after `post_post`.
const FILL: u8 = 0xdf;
/// Offset of the total page count inside the postamble.
const POSTAMBLE_PAGES: usize = 27;

/// Read the page count from a DVI file's postamble.
///
/// The file ends with `post_post`, a pointer to the postamble, the format
/// identification byte (matching the one in the preamble) and fill bytes.
/// Anything inconsistent yields `None`.
pub fn postamble_pages(data: &[u8]) -> Option<u64> {
    let id_at = data.iter().rposition(|byte| *byte != FILL)?;
    if data[id_at] != *data.get(1)? {
        return None;
    }
    let pointer = data.get(id_at.checked_sub(4)?..id_at)?;
    let postamble = u32::from_be_bytes(pointer.try_into().ok()?) as usize;
    if *data.get(postamble)? != POST {
        return None;
    }
    let field = data.get(postamble + POSTAMBLE_PAGES..postamble + POSTAMBLE_PAGES + 2)?;
    Some(u64::from(u16::from_be_bytes([field[0], field[1]])))
}

const DVI_TO_PS: Stage = Stage {
    program: "dvips",
    args: &["-q", "-o", "-", "{in}"],
};

/// Parser for TeX DVI output.
#[derive(Debug)]
pub struct DviParser {
    job: JobData,
}

impl FormatParser for DviParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::Dvi,
        open_mode: OpenMode::Binary,
        required: &["dvips", "gs"],
        to_tiff: &[Recipe {
            steps: &[&[DVI_TO_PS, GS_TIFF_FROM_STDIN]],
        }],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if probe.head.first() != Some(&PRE) || probe.tail.last() != Some(&FILL) {
            return Err(not_this_format(PdlFormat::Dvi));
        }
        Ok(Self { job: job.clone() })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let file = File::open(&self.job.path)?;
        // SAFETY: read-only mapping of the job file, dropped before returning.
        let mmap = unsafe { Mmap::map(&file)? };
        match postamble_pages(&mmap) {
            Some(pages) => Ok(pages),
            None => {
                warn!("invalid DVI postamble, counting 0 pages");
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal DVI skeleton: preamble, postamble with `pages`, post_post.
    fn dvi_with_pages(pages: u16) -> Vec<u8> {
        let mut data = vec![PRE, 2];
        data.extend_from_slice(&[0; 13]);
        let postamble = data.len() as u32;
        data.push(POST);
        data.extend_from_slice(&[0; 26]);
        data.extend_from_slice(&pages.to_be_bytes());
        data.push(0xf9);
        data.extend_from_slice(&postamble.to_be_bytes());
        data.push(2);
        data.extend_from_slice(&[FILL; 4]);
        data
    }

    #[test]
    fn reads_page_count() {
        assert_eq!(postamble_pages(&dvi_with_pages(12)), Some(12));
    }

    #[test]
    fn identification_byte_must_match() {
        let mut data = dvi_with_pages(3);
        data[1] = 3;
        assert_eq!(postamble_pages(&data), None);
    }

    #[test]
    fn bad_pointer_is_rejected() {
        let mut data = dvi_with_pages(3);
        let at = data.len() - 6;
        data[at] = 0;
        data[at - 1] = 1;
        assert_eq!(postamble_pages(&data), None);
        assert_eq!(postamble_pages(&[FILL, FILL]), None);
    }

    #[test]
    fn detection_uses_head_and_tail() {
        let data = dvi_with_pages(1);
        let job = JobData::new("unused.dvi", std::env::temp_dir());
        assert!(DviParser::open(&job, &DetectionProbe::from_bytes(&data)).is_ok());
        assert!(DviParser::open(&job, &DetectionProbe::from_bytes(b"\xf7abc")).is_err());
    }
}
