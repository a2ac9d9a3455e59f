// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The parser capability shared by every page description language.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::external::{self, Recipe};
use crate::formats::{
    AsciiPnmParser, DviParser, LegacyWordParser, OpenDocumentParser, OxpsParser, Pcl345Parser,
    PdfParser, PlainTextParser, PostScriptParser, RasterParser, ZjStreamParser,
};
use crate::lines::UniversalLines;
use crate::probe::DetectionProbe;

/// How a parser reads the job data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Raw bytes, random access.
    Binary,
    /// Lines with universal newline handling.
    Text,
}

/// Static description of a parser.
#[derive(Debug, Clone, Copy)]
pub struct ParserMeta {
    pub format: PdlFormat,
    pub open_mode: OpenMode,
    /// Executables needed before rendering. `"a|b"` accepts either.
    pub required: &'static [&'static str],
    /// Ways to render the job to TIFF, tried in order.
    pub to_tiff: &'static [Recipe],
}

/// A job's data on disk plus where scratch files may be created.
#[derive(Debug, Clone)]
pub struct JobData {
    pub path: PathBuf,
    pub scratch_dir: PathBuf,
}

impl JobData {
    pub fn new(path: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn open(&self) -> Result<File> {
        Ok(File::open(&self.path)?)
    }

    pub fn lines(&self) -> Result<UniversalLines<BufReader<File>>> {
        Ok(UniversalLines::new(BufReader::new(self.open()?)))
    }

    pub fn len(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// The rejection every detector returns when the data is not its format.
pub fn not_this_format(format: PdlFormat) -> PagetallyError {
    PagetallyError::InvalidFormat {
        format: format.display_name(),
    }
}

/// Detection, page counting and rendering for one format.
///
/// `open` doubles as the detector: it validates the probe (and, for
/// container formats, the archive structure) and fails with
/// [`PagetallyError::InvalidFormat`] when the data belongs to another format.
pub trait FormatParser: Sized {
    const META: ParserMeta;

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self>;

    fn job(&self) -> &JobData;

    /// Physical pages including copies.
    fn count_pages(&self) -> Result<u64>;

    /// Render every page into one multi-page TIFF file.
    fn render_tiff(&self, output: &Path, dpi: u32) -> Result<()> {
        let job = self.job();
        external::ensure_available(Self::META.format, Self::META.required)?;
        external::render_tiff(
            Self::META.format,
            Self::META.to_tiff,
            &job.path,
            output,
            dpi,
            &job.scratch_dir,
        )
    }
}

/// A parser for whichever format the detectors settled on.
#[derive(Debug)]
pub enum PdlParser {
    PostScript(PostScriptParser),
    Pdf(PdfParser),
    Pcl345(Pcl345Parser),
    Dvi(DviParser),
    ZjStream(ZjStreamParser),
    OpenDocument(OpenDocumentParser),
    Oxps(OxpsParser),
    LegacyWord(LegacyWordParser),
    Raster(RasterParser),
    AsciiPnm(AsciiPnmParser),
    PlainText(PlainTextParser),
}

macro_rules! each_parser {
    ($value:expr, $parser:ident => $body:expr) => {
        match $value {
            PdlParser::PostScript($parser) => $body,
            PdlParser::Pdf($parser) => $body,
            PdlParser::Pcl345($parser) => $body,
            PdlParser::Dvi($parser) => $body,
            PdlParser::ZjStream($parser) => $body,
            PdlParser::OpenDocument($parser) => $body,
            PdlParser::Oxps($parser) => $body,
            PdlParser::LegacyWord($parser) => $body,
            PdlParser::Raster($parser) => $body,
            PdlParser::AsciiPnm($parser) => $body,
            PdlParser::PlainText($parser) => $body,
        }
    };
}

macro_rules! parser_from {
    ($($variant:ident($parser:ty)),* $(,)?) => {
        $(
            impl From<$parser> for PdlParser {
                fn from(parser: $parser) -> Self {
                    Self::$variant(parser)
                }
            }
        )*
    };
}

parser_from!(
    PostScript(PostScriptParser),
    Pdf(PdfParser),
    Pcl345(Pcl345Parser),
    Dvi(DviParser),
    ZjStream(ZjStreamParser),
    OpenDocument(OpenDocumentParser),
    Oxps(OxpsParser),
    LegacyWord(LegacyWordParser),
    Raster(RasterParser),
    AsciiPnm(AsciiPnmParser),
    PlainText(PlainTextParser),
);

/// Generic detector entry: try to open the data as `P`.
pub fn open_as<P>(job: &JobData, probe: &DetectionProbe) -> Result<PdlParser>
where
    P: FormatParser,
    PdlParser: From<P>,
{
    P::open(job, probe).map(PdlParser::from)
}

impl PdlParser {
    pub fn format(&self) -> PdlFormat {
        self.meta().format
    }

    pub fn meta(&self) -> ParserMeta {
        fn meta_of<P: FormatParser>(_: &P) -> ParserMeta {
            P::META
        }
        each_parser!(self, parser => meta_of(parser))
    }

    pub fn job(&self) -> &JobData {
        each_parser!(self, parser => parser.job())
    }

    pub fn count_pages(&self) -> Result<u64> {
        each_parser!(self, parser => parser.count_pages())
    }

    pub fn render_tiff(&self, output: &Path, dpi: u32) -> Result<()> {
        each_parser!(self, parser => parser.render_tiff(output, dpi))
    }
}
