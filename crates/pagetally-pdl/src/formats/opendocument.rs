// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OpenDocument — page counts from package metadata.
//
// Text documents record their page count in meta.xml. Presentations and
// drawings do not, so their slides and pages are counted in content.xml.
// Spreadsheets carry neither and are reported as unsupported.

use std::io::{BufReader, Read};

use tracing::{debug, instrument};
use zip::ZipArchive;

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::bytes;
use crate::external::{GS_TIFF_FROM_INTERMEDIATE, Recipe, Stage};
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

const TEXT: &[u8] = b"application/vnd.oasis.opendocument.text";
const SPREADSHEET: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";
const PRESENTATION: &[u8] = b"application/vnd.oasis.opendocument.presentation";
const GRAPHICS: &[u8] = b"application/vnd.oasis.opendocument.graphics";

/// Members every OpenDocument package must carry.
const REQUIRED_MEMBERS: [&str; 4] = ["content.xml", "meta.xml", "styles.xml", "mimetype"];

const ODT_TO_PS: Stage = Stage {
    program: "xvfb-run",
    args: &["-a", "abiword", "--import-extension=.odt", "--print={tmp}", "{in}"],
};

/// The parts of a package needed for counting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OdfPackage {
    pub mimetype: Vec<u8>,
    pub content: Vec<u8>,
    pub meta: Vec<u8>,
}

fn read_member<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<Vec<u8>> {
    let mut member = archive.by_name(name).ok()?;
    let mut data = Vec::new();
    member.read_to_end(&mut data).ok()?;
    Some(data)
}

impl OdfPackage {
    /// Read the package members, or `None` when any required one is missing.
    pub fn read<R: Read + std::io::Seek>(reader: R) -> Option<Self> {
        let mut archive = ZipArchive::new(reader).ok()?;
        let mut members = REQUIRED_MEMBERS
            .iter()
            .map(|name| read_member(&mut archive, name))
            .collect::<Option<Vec<_>>>()?
            .into_iter();
        let content = members.next()?;
        let meta = members.next()?;
        let _styles = members.next()?;
        let mimetype = members.next()?;
        Some(Self {
            mimetype,
            content,
            meta,
        })
    }

    /// Pages according to the package kind.
    pub fn page_count(&self, input: &str) -> Result<u64> {
        if bytes::contains(&self.mimetype, TEXT) {
            return self.text_pages();
        }
        if bytes::contains(&self.mimetype, SPREADSHEET) {
            return Err(PagetallyError::UnsupportedFormat {
                input: input.to_string(),
                reason: "spreadsheets carry no page count".into(),
            });
        }
        if bytes::contains(&self.mimetype, PRESENTATION) {
            return Ok(bytes::count(&self.content, b"draw:page-number") as u64);
        }
        if bytes::contains(&self.mimetype, GRAPHICS) {
            return Ok(bytes::count(&self.content, b"draw:name=") as u64);
        }
        Err(PagetallyError::UnsupportedFormat {
            input: input.to_string(),
            reason: format!(
                "OpenDocument type {} is not supported",
                String::from_utf8_lossy(&self.mimetype).trim()
            ),
        })
    }

    /// `meta:page-count="N"` from meta.xml.
    fn text_pages(&self) -> Result<u64> {
        let missing = || PagetallyError::malformed("OpenDocument", "meta.xml has no page count");
        let at = bytes::find(&self.meta, b"meta:page-count").ok_or_else(missing)?;
        let value = self.meta[at..]
            .split(|byte| *byte == b'"')
            .nth(1)
            .ok_or_else(missing)?;
        let pages = bytes::parse_int(value).ok_or_else(missing)?;
        Ok(pages.max(0) as u64)
    }
}

/// Parser for OpenDocument packages.
#[derive(Debug)]
pub struct OpenDocumentParser {
    job: JobData,
    package: OdfPackage,
}

impl FormatParser for OpenDocumentParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::OpenDocument,
        open_mode: OpenMode::Binary,
        required: &["xvfb-run", "xauth", "abiword", "gs"],
        to_tiff: &[Recipe {
            steps: &[&[ODT_TO_PS], &[GS_TIFF_FROM_INTERMEDIATE]],
        }],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !probe.head.starts_with(b"PK") {
            return Err(not_this_format(PdlFormat::OpenDocument));
        }
        let package = OdfPackage::read(BufReader::new(job.open()?))
            .ok_or_else(|| not_this_format(PdlFormat::OpenDocument))?;
        Ok(Self {
            job: job.clone(),
            package,
        })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let pages = self
            .package
            .page_count(&self.job.path.display().to_string())?;
        debug!(
            mimetype = %String::from_utf8_lossy(&self.package.mimetype),
            pages,
            "OpenDocument counted"
        );
        Ok(pages)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;

    /// Build a ZIP archive in memory from `(name, data)` pairs.
    pub(crate) fn zip_of(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in members {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn package(mimetype: &[u8], content: &[u8], meta: &[u8]) -> Vec<u8> {
        zip_of(&[
            ("mimetype", mimetype),
            ("content.xml", content),
            ("meta.xml", meta),
            ("styles.xml", &b"<office:document-styles/>"[..]),
        ])
    }

    fn pages(data: Vec<u8>) -> Result<u64> {
        OdfPackage::read(Cursor::new(data)).unwrap().page_count("doc")
    }

    #[test]
    fn text_reads_meta_page_count() {
        let data = package(
            TEXT,
            b"<office:document-content/>",
            b"<meta:document-statistic meta:page-count=\"7\" meta:word-count=\"900\"/>",
        );
        assert_eq!(pages(data).unwrap(), 7);
    }

    #[test]
    fn text_without_count_is_malformed() {
        let data = package(TEXT, b"<x/>", b"<meta/>");
        assert!(matches!(pages(data), Err(PagetallyError::MalformedData { .. })));
    }

    #[test]
    fn presentation_counts_slides() {
        let content = b"<draw:page draw:name=\"a\"><text:page-number/><draw:page-number/></draw:page>\
<draw:page draw:name=\"b\"><draw:page-number/></draw:page>";
        assert_eq!(pages(package(PRESENTATION, content, b"<meta/>")).unwrap(), 2);
        assert_eq!(pages(package(GRAPHICS, content, b"<meta/>")).unwrap(), 2);
    }

    #[test]
    fn spreadsheet_is_unsupported() {
        let data = package(SPREADSHEET, b"<x/>", b"<meta/>");
        assert!(matches!(pages(data), Err(PagetallyError::UnsupportedFormat { .. })));
    }

    #[test]
    fn missing_member_is_not_opendocument() {
        let data = zip_of(&[("mimetype", TEXT), ("content.xml", &b"<x/>"[..])]);
        assert!(OdfPackage::read(Cursor::new(data)).is_none());
    }
}
