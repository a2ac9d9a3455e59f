// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF — line-oriented object scan counting `/Type /Page` dictionaries.
//
// Incremental updates can redefine an object with the same number and a
// higher generation. Only the newest version of each object is counted, so
// pages deleted or redacted in a later revision do not inflate the total.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::bytes::Regex;
use tracing::{debug, instrument, trace};

use pagetally_core::error::Result;
use pagetally_core::types::PdlFormat;

use crate::bytes;
use crate::external::{GS_TIFF_FROM_INPUT, Recipe};
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::pjl::UEL;
use crate::probe::DetectionProbe;

static OBJECT_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)\s?(\d+)\s+(\d+)\s+obj[<\s/]?").expect("object header pattern is valid")
});

static PAGE_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i-u)(/Type)\s?(/Page)[/>\s]").expect("page type pattern is valid")
});

/// An empty page dictionary that is never rendered.
const EMPTY_PAGE: &[u8] = b"<</Type /Page>>";

/// One indirect object as found in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfObject {
    pub major: u64,
    pub minor: u64,
    /// The `% ` comment line preceding the object, if any.
    pub comment: Option<Vec<u8>>,
    /// Object body lines, without separators.
    pub content: Vec<Vec<u8>>,
}

impl PdfObject {
    fn joined(&self) -> Vec<u8> {
        self.content.concat()
    }

    /// Page dictionaries declared in this object.
    pub fn page_count(&self) -> usize {
        let content = self.joined();
        if content == EMPTY_PAGE {
            return 0;
        }
        PAGE_TYPE.find_iter(&content).count()
    }
}

/// Collect the newest version of every object.
pub fn collect_objects<I>(lines: I) -> Result<HashMap<u64, PdfObject>>
where
    I: IntoIterator<Item = std::io::Result<Vec<u8>>>,
{
    let mut objects: HashMap<u64, PdfObject> = HashMap::new();
    let mut current: Option<PdfObject> = None;
    let mut last_comment: Option<Vec<u8>> = None;

    for line in lines {
        let raw = line?;
        let line = bytes::trim(&raw);

        // Comments inside an object body are not part of its content.
        if let Some(comment) = line.strip_prefix(b"% ") {
            if current.is_none() {
                last_comment = Some(comment.to_vec());
            }
            continue;
        }

        if let Some(found) = OBJECT_START.captures(line) {
            let number = |index: usize| {
                found
                    .get(index)
                    .and_then(|group| bytes::parse_int(group.as_bytes()))
                    .unwrap_or(0)
                    .max(0) as u64
            };
            let whole = found.get(0).map_or(line.len(), |group| group.end());
            current = Some(PdfObject {
                major: number(1),
                minor: number(2),
                comment: last_comment.clone(),
                content: vec![line[whole..].to_vec()],
            });
        } else if line.starts_with(b"endobj")
            || line.starts_with(b">> endobj")
            || line.starts_with(b">>endobj")
        {
            if let Some(object) = current.take() {
                let replaces = objects
                    .get(&object.major)
                    .is_none_or(|stored| object.minor >= stored.minor);
                if replaces {
                    trace!(major = object.major, minor = object.minor, "PDF object");
                    objects.insert(object.major, object);
                }
            }
        } else if let Some(object) = current.as_mut() {
            object.content.push(line.to_vec());
        }
    }
    Ok(objects)
}

/// Parser for PDF documents.
#[derive(Debug)]
pub struct PdfParser {
    job: JobData,
}

impl PdfParser {
    pub fn looks_like_pdf(probe: &DetectionProbe) -> bool {
        let head = probe.head.as_slice();
        let uel_early = bytes::contains(&head[..head.len().min(128)], UEL);
        head.starts_with(b"%PDF-")
            || head.starts_with(b"\x1b%-12345X%PDF-")
            || (uel_early && bytes::contains(&head.to_ascii_uppercase(), b"LANGUAGE=PDF"))
            || bytes::contains(head, b"%PDF-")
    }
}

impl FormatParser for PdfParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::Pdf,
        open_mode: OpenMode::Text,
        required: &["gs"],
        to_tiff: &[Recipe {
            steps: &[&[GS_TIFF_FROM_INPUT]],
        }],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !Self::looks_like_pdf(probe) {
            return Err(not_this_format(PdlFormat::Pdf));
        }
        Ok(Self { job: job.clone() })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let objects = collect_objects(self.job.lines()?)?;
        let pages: usize = objects.values().map(PdfObject::page_count).sum();
        debug!(objects = objects.len(), pages, "PDF objects scanned");
        Ok(pages as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::UniversalLines;

    fn count(data: &[u8]) -> usize {
        collect_objects(UniversalLines::new(data))
            .unwrap()
            .values()
            .map(PdfObject::page_count)
            .sum()
    }

    const TWO_PAGES: &[u8] = b"%PDF-1.4
1 0 obj
<< /Type /Catalog /Pages 2 0 R >>
endobj
2 0 obj
<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>
endobj
3 0 obj
<< /Type /Page /Parent 2 0 R >>
endobj
4 0 obj
<< /Type /Page /Parent 2 0 R >>
endobj
trailer
<< /Root 1 0 R >>
%%EOF
";

    #[test]
    fn counts_page_objects() {
        assert_eq!(count(TWO_PAGES), 2);
    }

    #[test]
    fn newer_generation_replaces_older() {
        let mut data = TWO_PAGES.to_vec();
        // Incremental update turns object 4 into something that is not a page.
        data.extend_from_slice(b"4 1 obj\n<< /Type /XObject >>\nendobj\n");
        assert_eq!(count(&data), 1);
    }

    #[test]
    fn older_generation_does_not_replace() {
        let mut data = b"%PDF-1.4\n5 2 obj\n<</Type/Page/Parent 1 0 R>>\nendobj\n".to_vec();
        data.extend_from_slice(b"5 1 obj\n<< /Type /Font >>\nendobj\n");
        assert_eq!(count(&data), 1);
    }

    #[test]
    fn empty_page_dictionary_is_skipped() {
        assert_eq!(count(b"%PDF-1.4\n7 0 obj\n<</Type /Page>>\nendobj\n"), 0);
    }

    #[test]
    fn pages_type_is_not_a_page() {
        assert_eq!(count(b"%PDF-1.4\n2 0 obj\n<< /Type /Pages /Count 9 >>\nendobj\n"), 0);
    }

    #[test]
    fn comments_are_attached() {
        let objects =
            collect_objects(UniversalLines::new(&b"% page one\n3 0 obj\n<< /Type /Page >>\nendobj\n"[..]))
                .unwrap();
        assert_eq!(objects[&3].comment.as_deref(), Some(&b"page one"[..]));
    }

    #[test]
    fn body_comments_are_not_content() {
        let data = b"%PDF-1.4\n3 0 obj\n% /Type /Page /Parent 1 0 R\n<< /Type /Font >>\nendobj\n";
        let objects = collect_objects(UniversalLines::new(&data[..])).unwrap();
        assert_eq!(objects[&3].content.len(), 2);
        assert_eq!(objects[&3].comment, None);
        assert_eq!(count(data), 0);
    }

    #[test]
    fn detection() {
        assert!(PdfParser::looks_like_pdf(&DetectionProbe::from_bytes(b"%PDF-1.7\n")));
        assert!(PdfParser::looks_like_pdf(&DetectionProbe::from_bytes(
            b"\x1b%-12345X@PJL ENTER language=pdf\n"
        )));
        assert!(!PdfParser::looks_like_pdf(&DetectionProbe::from_bytes(b"%!PS\n")));
    }
}
