// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster images — one page per frame.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek};

use image::{AnimationDecoder, ImageFormat, ImageReader};
use tracing::{debug, instrument};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::PdlFormat;

use crate::external::{Recipe, Stage};
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::probe::DetectionProbe;

const CONVERT: Stage = Stage {
    program: "convert",
    args: &["{in}", "{out}"],
};

fn image_error(err: impl std::fmt::Display) -> PagetallyError {
    PagetallyError::Image(err.to_string())
}

/// Frames in a GIF animation.
fn gif_frames<R: BufRead + Seek>(reader: R) -> Result<u64> {
    let decoder = image::codecs::gif::GifDecoder::new(reader).map_err(image_error)?;
    let frames = decoder
        .into_frames()
        .take_while(|frame| frame.is_ok())
        .count();
    Ok(frames.max(1) as u64)
}

/// Directories (pages) in a TIFF file.
pub fn tiff_pages<R: std::io::Read + Seek>(reader: R) -> Result<u64> {
    let mut decoder = tiff::decoder::Decoder::new(reader).map_err(image_error)?;
    let mut pages = 1u64;
    while decoder.more_images() {
        if decoder.next_image().is_err() {
            break;
        }
        pages += 1;
    }
    Ok(pages)
}

/// Parser for single and multi-frame raster images.
#[derive(Debug)]
pub struct RasterParser {
    job: JobData,
    format: ImageFormat,
}

impl RasterParser {
    /// Detect any image format the image codecs recognise, confirmed by a
    /// successful header decode.
    fn open_with(job: &JobData, format: Option<ImageFormat>) -> Result<Self> {
        let reader = BufReader::new(job.open()?);
        let image = match format {
            Some(format) => ImageReader::with_format(reader, format),
            None => ImageReader::new(reader)
                .with_guessed_format()
                .map_err(|_| not_this_format(PdlFormat::Raster))?,
        };
        let Some(format) = image.format() else {
            return Err(not_this_format(PdlFormat::Raster));
        };
        image
            .into_dimensions()
            .map_err(|_| not_this_format(PdlFormat::Raster))?;
        Ok(Self {
            job: job.clone(),
            format,
        })
    }

    /// Detector for the TIFF slot, which runs ahead of the other binary formats.
    pub fn open_tiff(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !(probe.head.starts_with(b"II*\x00") || probe.head.starts_with(b"MM\x00*")) {
            return Err(not_this_format(PdlFormat::Raster));
        }
        Self::open_with(job, Some(ImageFormat::Tiff))
    }

    pub fn image_format(&self) -> ImageFormat {
        self.format
    }
}

impl FormatParser for RasterParser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::Raster,
        open_mode: OpenMode::Binary,
        required: &["convert"],
        to_tiff: &[Recipe {
            steps: &[&[CONVERT]],
        }],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if image::guess_format(&probe.head).is_err() {
            return Err(not_this_format(PdlFormat::Raster));
        }
        Self::open_with(job, None)
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display(), format = ?self.format))]
    fn count_pages(&self) -> Result<u64> {
        let reader = BufReader::new(File::open(&self.job.path)?);
        let pages = match self.format {
            ImageFormat::Gif => gif_frames(reader)?,
            ImageFormat::Tiff => tiff_pages(reader)?,
            _ => 1,
        };
        debug!(pages, "raster frames");
        Ok(pages)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    use tiff::encoder::{TiffEncoder, colortype};

    /// A TIFF with `pages` directories of `width`x`height` RGB pixels, all `rgb`.
    pub(crate) fn rgb_tiff(pages: usize, width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out).unwrap();
            let pixels: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
            for _ in 0..pages {
                encoder
                    .write_image::<colortype::RGB8>(width, height, &pixels)
                    .unwrap();
            }
        }
        out.into_inner()
    }

    fn write_job(data: &[u8]) -> (tempfile::TempDir, JobData) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image");
        std::fs::write(&path, data).unwrap();
        let job = JobData::new(path, dir.path());
        (dir, job)
    }

    #[test]
    fn multi_page_tiff() {
        let data = rgb_tiff(3, 4, 4, [255, 255, 255]);
        let (_dir, job) = write_job(&data);
        let parser = RasterParser::open_tiff(&job, &DetectionProbe::from_bytes(&data)).unwrap();
        assert_eq!(parser.image_format(), ImageFormat::Tiff);
        assert_eq!(parser.count_pages().unwrap(), 3);
    }

    #[test]
    fn single_png_is_one_page() {
        let mut png = Cursor::new(Vec::new());
        image::RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]))
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();
        let data = png.into_inner();
        let (_dir, job) = write_job(&data);
        let probe = DetectionProbe::from_bytes(&data);
        assert!(RasterParser::open_tiff(&job, &probe).is_err());
        let parser = RasterParser::open(&job, &probe).unwrap();
        assert_eq!(parser.count_pages().unwrap(), 1);
    }

    #[test]
    fn text_is_not_an_image() {
        let (_dir, job) = write_job(b"hello\nworld\n");
        let probe = DetectionProbe::from_bytes(b"hello\nworld\n");
        assert!(matches!(
            RasterParser::open(&job, &probe),
            Err(PagetallyError::InvalidFormat { .. })
        ));
    }
}
