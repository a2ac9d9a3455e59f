// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OpenXPS / XPS — one fixed page part per printed page.

use std::io::{BufReader, Read, Seek};

use tracing::{debug, instrument};
use zip::ZipArchive;

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

const CONTENT_TYPES: &str = "[Content_Types].xml";
const JOB_TICKET: &str = "Metadata/Job_PT.xml";

/// Whether the archive carries the parts an XPS print job has.
pub fn is_xps_package<R: Read + Seek>(reader: R) -> bool {
    let Ok(mut archive) = ZipArchive::new(reader) else {
        return false;
    };
    let has_content_types = archive.by_name(CONTENT_TYPES).is_ok();
    has_content_types && archive.by_name(JOB_TICKET).is_ok()
}

/// Number of archive entries that are fixed pages.
pub fn fixed_pages<R: Read + Seek>(reader: R) -> Result<u64> {
    let archive = ZipArchive::new(reader).map_err(|err| PagetallyError::Zip(err.to_string()))?;
    let pages = archive
        .file_names()
        .filter(|name| name.ends_with("fpage"))
        .count();
    Ok(pages as u64)
}

/// Parser for OpenXPS and XPS documents.
#[derive(Debug)]
pub struct OxpsParser {
    job: JobData,
}

impl FormatParser for OxpsParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::Oxps,
        open_mode: OpenMode::Binary,
        required: &[],
        to_tiff: &[],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !probe.head.starts_with(b"PK") || !is_xps_package(BufReader::new(job.open()?)) {
            return Err(not_this_format(PdlFormat::Oxps));
        }
        Ok(Self { job: job.clone() })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let pages = fixed_pages(BufReader::new(self.job.open()?))?;
        debug!(pages, "XPS fixed pages");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::opendocument::tests::zip_of;
    use std::io::Cursor;

    fn xps(pages: usize) -> Vec<u8> {
        let names: Vec<String> = (1..=pages)
            .map(|page| format!("Documents/1/Pages/{page}.fpage"))
            .collect();
        let mut members: Vec<(&str, &[u8])> = vec![
            (CONTENT_TYPES, &b"<Types/>"[..]),
            (JOB_TICKET, &b"<psf:PrintTicket/>"[..]),
            ("Documents/1/FixedDocument.fdoc", &b"<FixedDocument/>"[..]),
        ];
        members.extend(names.iter().map(|name| (name.as_str(), &b"<FixedPage/>"[..])));
        zip_of(&members)
    }

    #[test]
    fn counts_fixed_pages() {
        assert_eq!(fixed_pages(Cursor::new(xps(4))).unwrap(), 4);
    }

    #[test]
    fn job_ticket_is_required() {
        assert!(is_xps_package(Cursor::new(xps(1))));
        let plain_zip = zip_of(&[(CONTENT_TYPES, &b"<Types/>"[..])]);
        assert!(!is_xps_package(Cursor::new(plain_zip)));
        assert!(!is_xps_package(Cursor::new(b"PK not really".to_vec())));
    }
}
