// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detector registry — the priority-ordered list of format validity tests.
//
// Several formats share ambiguous prefixes (PJL can wrap either PostScript or
// PCL, ZIP signatures start OpenDocument and XPS packages alike, and almost
// anything passes the plain text test), so the order below is significant.
// The first detector whose `open` succeeds wins.

use tracing::{debug, trace};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::formats::{
    AsciiPnmParser, DviParser, LegacyWordParser, OpenDocumentParser, OxpsParser, Pcl345Parser,
    PdfParser, PlainTextParser, PostScriptParser, RasterParser, ZjStreamParser,
};
use crate::parser::{JobData, PdlParser, open_as};
use crate::probe::DetectionProbe;

/// Signature shared by every detector: validate and construct.
pub type OpenFn = fn(&JobData, &DetectionProbe) -> Result<PdlParser>;

/// One entry in the registry.
#[derive(Debug, Clone, Copy)]
pub struct Detector {
    pub format: PdlFormat,
    /// Distinguishes several slots for the same format.
    pub label: &'static str,
    pub open: OpenFn,
}

fn open_tiff(job: &JobData, probe: &DetectionProbe) -> Result<PdlParser> {
    RasterParser::open_tiff(job, probe).map(PdlParser::from)
}

/// Detectors in priority order.
pub static DETECTORS: &[Detector] = &[
    Detector {
        format: PdlFormat::PostScript,
        label: "postscript",
        open: open_as::<PostScriptParser>,
    },
    Detector {
        format: PdlFormat::Pdf,
        label: "pdf",
        open: open_as::<PdfParser>,
    },
    Detector {
        format: PdlFormat::Dvi,
        label: "dvi",
        open: open_as::<DviParser>,
    },
    Detector {
        format: PdlFormat::Raster,
        label: "tiff",
        open: open_tiff,
    },
    Detector {
        format: PdlFormat::ZjStream,
        label: "zjstream",
        open: open_as::<ZjStreamParser>,
    },
    Detector {
        format: PdlFormat::OpenDocument,
        label: "opendocument",
        open: open_as::<OpenDocumentParser>,
    },
    Detector {
        format: PdlFormat::Pcl345,
        label: "pcl345",
        open: open_as::<Pcl345Parser>,
    },
    Detector {
        format: PdlFormat::AsciiPnm,
        label: "pnm-ascii",
        open: open_as::<AsciiPnmParser>,
    },
    Detector {
        format: PdlFormat::Raster,
        label: "image",
        open: open_as::<RasterParser>,
    },
    Detector {
        format: PdlFormat::LegacyWord,
        label: "legacy-word",
        open: open_as::<LegacyWordParser>,
    },
    Detector {
        format: PdlFormat::Oxps,
        label: "oxps",
        open: open_as::<OxpsParser>,
    },
    Detector {
        format: PdlFormat::PlainText,
        label: "plain",
        open: open_as::<PlainTextParser>,
    },
];

/// Run `detectors` in order until one accepts the data.
///
/// Rejections ([`PagetallyError::InvalidFormat`]) move on to the next
/// detector; any other failure (an unreadable file, say) ends detection.
pub fn detect_with(
    detectors: &[Detector],
    job: &JobData,
    probe: &DetectionProbe,
    input: &str,
) -> Result<PdlParser> {
    for detector in detectors {
        match (detector.open)(job, probe) {
            Ok(parser) => {
                debug!(input, format = %detector.format, detector = detector.label, "format detected");
                return Ok(parser);
            }
            Err(PagetallyError::InvalidFormat { .. }) => {
                trace!(input, detector = detector.label, "rejected");
            }
            Err(err) => return Err(err),
        }
    }
    Err(PagetallyError::UnsupportedFormat {
        input: input.to_string(),
        reason: "analysis of first data block failed".into(),
    })
}

/// Run the standard registry.
pub fn detect(job: &JobData, probe: &DetectionProbe, input: &str) -> Result<PdlParser> {
    detect_with(DETECTORS, job, probe, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::opendocument::tests::zip_of;
    use crate::formats::raster::tests::rgb_tiff;

    fn detect_bytes(data: &[u8]) -> Result<PdlFormat> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job");
        std::fs::write(&path, data).unwrap();
        let job = JobData::new(&path, dir.path());
        detect(&job, &DetectionProbe::from_bytes(data), "job").map(|parser| parser.format())
    }

    #[test]
    fn postscript_wins_over_plain_text() {
        let data = b"%!PS-Adobe-3.0\n%%Pages: 1\nshowpage\n";
        assert_eq!(detect_bytes(data).unwrap(), PdlFormat::PostScript);
    }

    #[test]
    fn pjl_wrapped_postscript_is_not_pcl() {
        let data = b"\x1b%-12345X@PJL JOB\r\n@PJL ENTER LANGUAGE = POSTSCRIPT\r\n%!PS-Adobe-3.0\n%%Page: 1 1\nshowpage\n";
        assert_eq!(detect_bytes(data).unwrap(), PdlFormat::PostScript);
    }

    #[test]
    fn pjl_wrapped_pcl_is_pcl() {
        let data = b"\x1b%-12345X@PJL JOB\r\n@PJL ENTER LANGUAGE = PCL\r\n\x1bE\x1b&l1Xpage\x0c\x1bE\x1b%-12345X";
        assert_eq!(detect_bytes(data).unwrap(), PdlFormat::Pcl345);
    }

    #[test]
    fn binary_formats_by_signature() {
        assert_eq!(detect_bytes(b"%PDF-1.4\n1 0 obj\n").unwrap(), PdlFormat::Pdf);
        assert_eq!(detect_bytes(b"ZJZJ\x10\x00\x00\x00").unwrap(), PdlFormat::ZjStream);
        assert_eq!(detect_bytes(&rgb_tiff(1, 2, 2, [0, 0, 0])).unwrap(), PdlFormat::Raster);
        assert_eq!(detect_bytes(b"P1\n2 2\n0 1\n1 0\n").unwrap(), PdlFormat::AsciiPnm);
    }

    #[test]
    fn zip_containers_are_told_apart() {
        let xps = zip_of(&[
            ("[Content_Types].xml", &b"<Types/>"[..]),
            ("Metadata/Job_PT.xml", &b"<psf:PrintTicket/>"[..]),
            ("Documents/1/Pages/1.fpage", &b"<FixedPage/>"[..]),
        ]);
        assert_eq!(detect_bytes(&xps).unwrap(), PdlFormat::Oxps);

        let odt = zip_of(&[
            ("mimetype", &b"application/vnd.oasis.opendocument.text"[..]),
            ("content.xml", &b"<x/>"[..]),
            ("meta.xml", &b"<meta meta:page-count=\"2\"/>"[..]),
            ("styles.xml", &b"<x/>"[..]),
        ]);
        assert_eq!(detect_bytes(&odt).unwrap(), PdlFormat::OpenDocument);
    }

    #[test]
    fn text_falls_through_to_plain() {
        assert_eq!(detect_bytes(b"Dear printer,\nhello.\n").unwrap(), PdlFormat::PlainText);
    }

    #[test]
    fn unprintable_data_is_unsupported() {
        let err = detect_bytes(&[0x00, 0x01, 0x02, 0x03, 0xfe, 0xff]).unwrap_err();
        match err {
            PagetallyError::UnsupportedFormat { input, .. } => assert_eq!(input, "job"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn registry_order_is_fixed() {
        let labels: Vec<&str> = DETECTORS.iter().map(|detector| detector.label).collect();
        assert_eq!(
            labels,
            [
                "postscript",
                "pdf",
                "dvi",
                "tiff",
                "zjstream",
                "opendocument",
                "pcl345",
                "pnm-ascii",
                "image",
                "legacy-word",
                "oxps",
                "plain",
            ]
        );
        assert_eq!(DETECTORS.last().map(|detector| detector.format), Some(PdlFormat::PlainText));
    }

    #[test]
    fn hard_errors_stop_detection() {
        fn broken(_: &JobData, _: &DetectionProbe) -> Result<PdlParser> {
            Err(PagetallyError::Conversion("boom".into()))
        }
        let detectors = [Detector {
            format: PdlFormat::PlainText,
            label: "broken",
            open: broken,
        }];
        let job = JobData::new("unused", std::env::temp_dir());
        let err = detect_with(&detectors, &job, &DetectionProbe::default(), "x").unwrap_err();
        assert!(matches!(err, PagetallyError::Conversion(_)));
    }
}
