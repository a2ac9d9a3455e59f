// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PostScript — DSC comment counting with a Ghostscript fallback.

use std::collections::BTreeMap;
use std::ffi::OsString;

use tracing::{debug, instrument};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::bytes::{self, parse_int, tokens, trim};
use crate::external::{self, GS_TIFF_FROM_INPUT, Recipe};
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::pjl::UEL;
use crate::probe::DetectionProbe;

const LANGUAGE_LEVEL_COPIES: &[u8] =
    b"/languagelevel where{pop languagelevel}{1}ifelse 2 ge{1 dict dup/NumCopies";

/// What a pass over the DSC comments found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DscSummary {
    /// Pages including extra copies.
    pub pages: u64,
    /// Highest copy count seen on any page.
    pub max_copies: u64,
    /// The comments cannot be trusted (embedded PDF procset).
    pub untrusted: bool,
}

/// Parse the DSC comments of a PostScript job, line by line.
pub fn scan_dsc<I>(lines: I) -> Result<DscSummary>
where
    I: IntoIterator<Item = std::io::Result<Vec<u8>>>,
{
    // Copies per page; page 0 holds settings made before the first page.
    let mut pages: BTreeMap<usize, i64> = BTreeMap::from([(0, 1)]);
    let mut page_count = 0usize;
    let mut last_page_number = 0i64;
    let mut pages_comment: Option<i64> = None;
    let mut untrusted = false;
    let mut prescribe = false;
    let mut acrobat = false;
    let mut previous_line: Vec<u8> = Vec::new();

    for line in lines {
        let raw = line?;
        let line = trim(&raw);
        let parts = tokens(line);
        let first = parts.first().copied().unwrap_or(b"");

        let mut set_copies = |value: &[u8]| {
            if let Some(number) = parse_int(value) {
                let copies = pages.entry(page_count).or_insert(1);
                if number > *copies {
                    *copies = number;
                }
            }
        };

        if first == b"%ADOPrintSettings:" {
            acrobat = true;
        } else if first == b"!R!" {
            prescribe = true;
        } else if first == b"%%Pages:" {
            if let Some(count) = parts.get(1).and_then(|part| parse_int(part)) {
                pages_comment = Some(pages_comment.unwrap_or(0).max(count));
            }
        } else if first == b"%%BeginNonPPDFeature:"
            && parts.len() > 2
            && parts[1] == b"NumCopies"
        {
            set_copies(parts[2]);
        } else if first == b"%%Requirements:"
            && parts.len() > 1
            && parts[1].starts_with(b"numcopies(")
        {
            if let Some(open) = line.iter().position(|byte| *byte == b'(') {
                let inner = &line[open + 1..];
                let close = inner.iter().position(|byte| *byte == b')').unwrap_or(inner.len());
                set_copies(&inner[..close]);
            }
        } else if first == b"/#copies" || first == b"%RBINumCopies:" {
            if let Some(value) = parts.get(1) {
                set_copies(value);
            }
        } else if parts.len() > 4 && parts[..4] == [&b"1"[..], b"dict", b"dup", b"/NumCopies"] {
            set_copies(parts[4]);
        } else if parts.len() > 6
            && parts[..6] == [&b"{"[..], b"pop", b"1", b"dict", b"dup", b"/NumCopies"]
        {
            set_copies(parts[6]);
        } else if first == b"%%Page:" || first == b"(%%[Page:" {
            // "%%Page: x x" and "%%Page: (x-y) z" (N-up) both end in the ordinal.
            let before_bracket = line.split(|byte| *byte == b']').next().unwrap_or(b"");
            let number = tokens(before_bracket).last().and_then(|token| parse_int(token));
            if let Some(number) = number {
                if number > last_page_number {
                    last_page_number = number;
                    let inherited = pages.get(&page_count).copied().unwrap_or(1);
                    page_count += 1;
                    pages.insert(page_count, inherited);
                }
            }
        } else if !prescribe
            && !acrobat
            && parts.len() >= 3
            && parts[..3] == [&b"%%BeginResource:"[..], b"procset", b"pdf"]
        {
            untrusted = true;
        } else if line.starts_with(LANGUAGE_LEVEL_COPIES) {
            set_copies(previous_line.get(2..).unwrap_or(b""));
        } else if parts.len() > 1 && parts[1] == b"@copies" {
            set_copies(first);
        }
        previous_line = line.to_vec();
    }

    let max_copies = pages.values().copied().max().unwrap_or(1).max(1);
    let mut total = page_count as i64;
    if total == 0 {
        total = pages_comment.unwrap_or(0).max(0);
    }
    total = total.saturating_add(extra_copies(&pages, total));

    Ok(DscSummary {
        pages: total.max(0) as u64,
        max_copies: max_copies as u64,
        untrusted,
    })
}

/// Copies beyond the first for pages `1..=count`. Pages without their own
/// entry take the first page's copies, then the pre-page setting.
fn extra_copies(pages: &BTreeMap<usize, i64>, count: i64) -> i64 {
    let last = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    let (listed, extra) = pages
        .range(1..=last)
        .fold((0i64, 0i64), |(listed, extra), (_, copies)| {
            (listed + 1, extra.saturating_add(copies.saturating_sub(1)))
        });
    let fallback = pages
        .get(&1)
        .or_else(|| pages.get(&0))
        .copied()
        .unwrap_or(1);
    let unlisted = count.max(0) - listed;
    extra.saturating_add(unlisted.saturating_mul(fallback.saturating_sub(1)))
}

/// Parser for PostScript jobs.
#[derive(Debug)]
pub struct PostScriptParser {
    job: JobData,
}

impl PostScriptParser {
    pub fn looks_like_postscript(probe: &DetectionProbe) -> bool {
        let head = probe.head.as_slice();
        let uel_early = bytes::contains(&head[..head.len().min(128)], UEL);
        head.starts_with(b"%!")
            || head.starts_with(b"\x04%!")
            || head.starts_with(b"\x1b%-12345X%!PS")
            || (uel_early
                && (bytes::contains(head, b"LANGUAGE=POSTSCRIPT")
                    || bytes::contains(head, b"LANGUAGE = POSTSCRIPT")
                    || bytes::contains(head, b"LANGUAGE = Postscript")))
            || bytes::contains(head, b"%!PS-Adobe")
    }

    /// Count the pages Ghostscript's bounding box device reports.
    fn ghostscript_pages(&self) -> Result<u64> {
        external::ensure_available(PdlFormat::PostScript, &["gs"])?;
        let args: Vec<OsString> = [
            "-sDEVICE=bbox",
            "-dPARANOIDSAFER",
            "-dNOPAUSE",
            "-dBATCH",
            "-dQUIET",
        ]
        .into_iter()
        .map(OsString::from)
        .chain(std::iter::once(self.job.path.as_os_str().to_owned()))
        .collect();
        let output = external::capture_output("gs", &args)?;
        if !output.status.success() {
            return Err(PagetallyError::malformed(
                "PostScript",
                format!("gs bbox device exited with {}", output.status),
            ));
        }
        let boxes = [&output.stdout, &output.stderr]
            .into_iter()
            .flat_map(|stream| stream.split(|byte| *byte == b'\n'))
            .filter(|line| bytes::contains(line, b"%%HiResBoundingBox:"))
            .count();
        Ok(boxes as u64)
    }

    pub fn dsc_summary(&self) -> Result<DscSummary> {
        scan_dsc(self.job.lines()?)
    }
}

impl FormatParser for PostScriptParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::PostScript,
        open_mode: OpenMode::Text,
        required: &["gs"],
        to_tiff: &[Recipe {
            steps: &[&[GS_TIFF_FROM_INPUT]],
        }],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !Self::looks_like_postscript(probe) {
            return Err(not_this_format(PdlFormat::PostScript));
        }
        Ok(Self { job: job.clone() })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let summary = self.dsc_summary()?;
        debug!(pages = summary.pages, untrusted = summary.untrusted, "DSC comments counted");
        if !summary.untrusted && summary.pages > 0 {
            return Ok(summary.pages);
        }
        let rendered = match self.ghostscript_pages() {
            Ok(boxes) => {
                debug!(pages = boxes, copies = summary.max_copies, "Ghostscript counted");
                boxes.saturating_mul(summary.max_copies)
            }
            Err(err) => {
                debug!(error = %err, "Ghostscript fallback unavailable");
                summary.pages
            }
        };
        Ok(summary.pages.max(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::UniversalLines;

    fn summarize(text: &[u8]) -> DscSummary {
        scan_dsc(UniversalLines::new(text)).unwrap()
    }

    #[test]
    fn page_comments_are_counted() {
        let summary = summarize(b"%!PS-Adobe-3.0\n%%Pages: 3\n%%Page: 1 1\n%%Page: 2 2\n%%Page: 3 3\n%%EOF\n");
        assert_eq!(summary.pages, 3);
        assert!(!summary.untrusted);
    }

    #[test]
    fn copies_carry_to_later_pages() {
        let summary = summarize(b"%!PS-Adobe-3.0\r%%Page: 1 1\r/#copies 2 def\r%%Page: 2 2\rshowpage\r");
        assert_eq!(summary.pages, 4);
        assert_eq!(summary.max_copies, 2);
    }

    #[test]
    fn repeated_ordinals_are_not_new_pages() {
        let summary = summarize(b"%!PS\n%%Page: 1 1\n%%Page: 1 1\n%%Page: (2-3) 2\n");
        assert_eq!(summary.pages, 2);
    }

    #[test]
    fn pages_comment_is_the_fallback() {
        let summary = summarize(b"%!PS-Adobe-3.0\n%%Pages: 5\n%%Pages: (atend)\n");
        assert_eq!(summary.pages, 5);
    }

    #[test]
    fn copy_directives() {
        assert_eq!(summarize(b"%!\n%%Requirements: numcopies(3) collate\n%%Page: 1 1\n").pages, 3);
        assert_eq!(summarize(b"%!\n%%Page: 1 1\n1 dict dup /NumCopies 4 put setpagedevice\n").pages, 4);
        assert_eq!(summarize(b"%!\n%%Page: 1 1\n2 @copies\n").pages, 2);
        assert_eq!(summarize(b"%!\n%%Page: 1 1\n%%BeginNonPPDFeature: NumCopies 2\n").pages, 2);
    }

    #[test]
    fn copies_never_decrease() {
        let summary = summarize(b"%!\n%%Page: 1 1\n/#copies 3 def\n/#copies 1 def\n");
        assert_eq!(summary.pages, 3);
    }

    #[test]
    fn huge_copy_counts_saturate() {
        let summary = summarize(b"%!PS\n/#copies 9223372036854775807 def\n%%Page: 1 1\n%%Page: 2 2\n");
        assert_eq!(summary.pages, i64::MAX as u64);
        assert_eq!(summary.max_copies, i64::MAX as u64);
    }

    #[test]
    fn huge_pages_comment_is_not_walked() {
        let summary = summarize(b"%!PS\n%%Pages: 9223372036854775807\n/#copies 2 def\n");
        assert_eq!(summary.pages, i64::MAX as u64);
        let summary = summarize(b"%!PS\n%%Pages: 4\n/#copies 3 def\n");
        assert_eq!(summary.pages, 12);
    }

    #[test]
    fn embedded_pdf_procset_is_untrusted() {
        let summary = summarize(b"%!PS\n%%BeginResource: procset pdf 1 0\n%%Page: 1 1\n");
        assert!(summary.untrusted);
        let summary = summarize(b"%!PS\n%ADOPrintSettings: x\n%%BeginResource: procset pdf 1 0\n");
        assert!(!summary.untrusted);
    }

    #[test]
    fn detection() {
        assert!(PostScriptParser::looks_like_postscript(&DetectionProbe::from_bytes(b"%!PS-Adobe-3.0\n")));
        assert!(PostScriptParser::looks_like_postscript(&DetectionProbe::from_bytes(
            b"\x1b%-12345X@PJL ENTER LANGUAGE = POSTSCRIPT\n"
        )));
        assert!(!PostScriptParser::looks_like_postscript(&DetectionProbe::from_bytes(b"%PDF-1.4\n")));
    }
}
