// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// One parser per page description language.

pub mod dvi;
pub mod legacy_word;
pub mod opendocument;
pub mod oxps;
pub mod pcl345;
pub mod pdf;
pub mod plain;
pub mod pnm_ascii;
pub mod postscript;
pub mod raster;
pub mod zjstream;

pub use dvi::DviParser;
pub use legacy_word::LegacyWordParser;
pub use opendocument::OpenDocumentParser;
pub use oxps::OxpsParser;
pub use pcl345::Pcl345Parser;
pub use pdf::PdfParser;
pub use plain::PlainTextParser;
pub use pnm_ascii::AsciiPnmParser;
pub use postscript::PostScriptParser;
pub use raster::RasterParser;
pub use zjstream::ZjStreamParser;
