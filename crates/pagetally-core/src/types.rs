// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the pagetally page counter.

use serde::{Deserialize, Serialize};

/// Page description languages the analyzer can identify and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PdlFormat {
    PostScript,
    Pdf,
    /// PCL3, PCL4 and PCL5 (optionally wrapped in PJL).
    Pcl345,
    /// TeX device independent output.
    Dvi,
    /// Zenographics ZjStream host-based printer data.
    ZjStream,
    /// ISO/IEC 26300 OpenDocument package.
    OpenDocument,
    /// OpenXPS / XPS package.
    Oxps,
    /// Legacy word processor binary documents.
    LegacyWord,
    /// Raster image formats, possibly multi-frame.
    Raster,
    /// Plain (ASCII) PBM/PGM/PPM.
    AsciiPnm,
    /// Catch-all for line-oriented text.
    PlainText,
}

impl PdlFormat {
    /// Name used in logs and error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostScript => "PostScript",
            Self::Pdf => "PDF",
            Self::Pcl345 => "PCL3/4/5",
            Self::Dvi => "DVI",
            Self::ZjStream => "Zenographics ZjStream",
            Self::OpenDocument => "OpenDocument",
            Self::Oxps => "OXPS/XPS",
            Self::LegacyWord => "Legacy word processor",
            Self::Raster => "Raster image",
            Self::AsciiPnm => "PNM (ascii)",
            Self::PlainText => "Plain text",
        }
    }

    /// MIME type string, as a print spooler would label the job.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::PostScript => "application/postscript",
            Self::Pdf => "application/pdf",
            Self::Pcl345 => "application/vnd.hp-pcl",
            Self::Dvi => "application/x-dvi",
            Self::ZjStream => "application/vnd.zenographics-zjstream",
            Self::OpenDocument => "application/vnd.oasis.opendocument",
            Self::Oxps => "application/oxps",
            Self::LegacyWord => "application/msword",
            Self::Raster => "image/*",
            Self::AsciiPnm => "image/x-portable-anymap",
            Self::PlainText => "text/plain",
        }
    }
}

impl std::fmt::Display for PdlFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Duplex printing mode as resolved from PCL/PJL directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplexMode {
    #[default]
    Simplex,
    Duplex,
}

impl DuplexMode {
    /// Interpret a PJL `DUPLEX` value (`ON` / `OFF`).
    pub fn from_pjl(value: &str) -> Self {
        if value.eq_ignore_ascii_case("ON") {
            Self::Duplex
        } else {
            Self::Simplex
        }
    }
}

/// Colour model used when sampling ink coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Colorspace {
    /// Black only.
    Bw,
    Rgb,
    Cmyk,
    Cmy,
    /// Grayscale vs colour: tells coloured pages apart without measuring ink.
    Gc,
}

impl Colorspace {
    /// Plane names in output order.
    pub fn planes(&self) -> &'static [&'static str] {
        match self {
            Self::Bw => &["K"],
            Self::Rgb => &["R", "G", "B"],
            Self::Cmyk => &["C", "M", "Y", "K"],
            Self::Cmy => &["C", "M", "Y"],
            Self::Gc => &["G", "C"],
        }
    }

    /// Parse a case-insensitive colorspace keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "bw" => Some(Self::Bw),
            "rgb" => Some(Self::Rgb),
            "cmyk" => Some(Self::Cmyk),
            "cmy" => Some(Self::Cmy),
            "gc" => Some(Self::Gc),
            _ => None,
        }
    }
}

/// Ink coverage of a single rendered page, one percentage per plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCoverage {
    /// `(plane name, percent)` pairs in [`Colorspace::planes`] order.
    pub planes: Vec<(String, f64)>,
}

impl PageCoverage {
    /// Look up one plane's percentage.
    pub fn get(&self, plane: &str) -> Option<f64> {
        self.planes
            .iter()
            .find(|(name, _)| name == plane)
            .map(|(_, value)| *value)
    }
}

/// Outcome of analysing one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    /// Filename, `-`, or the caller's identifier for a stream.
    pub input: String,
    pub format: PdlFormat,
    /// Physical pages including copies.
    pub pages: u64,
    /// SHA-256 of the job data (lowercase hex).
    pub sha256: String,
}
