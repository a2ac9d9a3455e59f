// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Legacy word processor documents — converted to PostScript, then counted.

use std::ffi::OsString;

use tracing::{debug, instrument};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::external::{self, GS_TIFF_FROM_INTERMEDIATE, Recipe, Stage};
use crate::formats::postscript::PostScriptParser;
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

/// Leading signatures of the binary word processor formats.
const SIGNATURES: [&[u8]; 5] = [
    b"PO^Q`",
    b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1",
    b"\xfe7\x00#",
    b"\xdb\xa5-\x00\x00\x00",
    b"\x31\xbe\x00\x00",
];

/// Offset of the `MSWordDoc` marker in some releases.
const WORD_DOC_MARKER_OFFSET: usize = 2112;

/// Tools needed to turn the document into PostScript.
const CONVERTERS: &[&str] = &["xvfb-run", "xauth", "abiword"];

const DOC_TO_PS: Stage = Stage {
    program: "xvfb-run",
    args: &["-a", "abiword", "--import-extension=.doc", "--print={tmp}", "{in}"],
};

pub fn has_signature(head: &[u8]) -> bool {
    SIGNATURES.iter().any(|signature| head.starts_with(signature))
        || head
            .get(WORD_DOC_MARKER_OFFSET..)
            .is_some_and(|rest| rest.starts_with(b"MSWordDoc"))
}

/// Parser for legacy word processor binaries.
#[derive(Debug)]
pub struct LegacyWordParser {
    job: JobData,
}

impl LegacyWordParser {
    /// Convert the document to PostScript in a scratch file.
    fn to_postscript(&self) -> Result<tempfile::NamedTempFile> {
        external::ensure_available(PdlFormat::LegacyWord, CONVERTERS)?;
        let scratch = tempfile::Builder::new()
            .prefix("pagetally_")
            .suffix(".ps")
            .tempfile_in(&self.job.scratch_dir)?;

        let mut args: Vec<OsString> = ["-a", "abiword", "--import-extension=.doc"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let mut print = OsString::from("--print=");
        print.push(scratch.path());
        args.push(print);
        args.push(self.job.path.as_os_str().to_owned());

        let output = external::capture_output("xvfb-run", &args)?;
        let converted = std::fs::metadata(scratch.path()).map(|meta| meta.len()).unwrap_or(0);
        if !output.status.success() || converted == 0 {
            return Err(PagetallyError::Conversion(format!(
                "could not convert {} to PostScript",
                self.job.path.display()
            )));
        }
        debug!(bytes = converted, "converted document to PostScript");
        Ok(scratch)
    }
}

impl FormatParser for LegacyWordParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::LegacyWord,
        open_mode: OpenMode::Binary,
        required: &["xvfb-run", "xauth", "abiword", "gs"],
        to_tiff: &[Recipe {
            steps: &[&[DOC_TO_PS], &[GS_TIFF_FROM_INTERMEDIATE]],
        }],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !has_signature(&probe.head) {
            return Err(not_this_format(PdlFormat::LegacyWord));
        }
        Ok(Self { job: job.clone() })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let scratch = self.to_postscript()?;
        let ps_job = JobData::new(scratch.path(), &self.job.scratch_dir);
        let probe = DetectionProbe::from_path(scratch.path())?;
        let parser = PostScriptParser::open(&ps_job, &probe).map_err(|_| {
            PagetallyError::malformed("Legacy word processor", "converter did not produce PostScript")
        })?;
        parser.count_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_recognised() {
        assert!(has_signature(b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1\x00\x00"));
        assert!(has_signature(b"\xdb\xa5-\x00\x00\x00rest"));
        assert!(!has_signature(b"PK\x03\x04"));
        assert!(!has_signature(b""));
    }

    #[test]
    fn late_marker_is_recognised() {
        let mut head = vec![0u8; WORD_DOC_MARKER_OFFSET];
        head.extend_from_slice(b"MSWordDoc\x00");
        assert!(has_signature(&head));
    }
}
