// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ink coverage — per-page plane percentages sampled from a rendered TIFF.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::{debug, instrument};

use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::types::{Colorspace, PageCoverage};

fn tiff_error(err: tiff::TiffError) -> PagetallyError {
    PagetallyError::Image(err.to_string())
}

/// Running totals over one page, all in 0..=255 units.
#[derive(Debug, Default)]
struct PlaneSums {
    pixels: u64,
    red: f64,
    green: f64,
    blue: f64,
    luma: f64,
    // Undercolour removal: black takes the common part of C, M and Y.
    cyan: f64,
    magenta: f64,
    yellow: f64,
    black: f64,
    coloured: bool,
}

impl PlaneSums {
    fn add(&mut self, [r, g, b]: [u8; 3]) {
        let (rf, gf, bf) = (f64::from(r), f64::from(g), f64::from(b));
        self.pixels += 1;
        self.red += rf;
        self.green += gf;
        self.blue += bf;
        self.luma += 0.299 * rf + 0.587 * gf + 0.114 * bf;

        let black = 255.0 - rf.max(gf).max(bf);
        self.black += black;
        self.cyan += 255.0 - rf - black;
        self.magenta += 255.0 - gf - black;
        self.yellow += 255.0 - bf - black;

        if r != g || g != b {
            self.coloured = true;
        }
    }

    /// Mean of `sum` as a percentage of full intensity.
    fn percent(&self, sum: f64) -> f64 {
        if self.pixels == 0 {
            return 0.0;
        }
        100.0 * sum / (255.0 * self.pixels as f64)
    }

    fn finish(&self, colorspace: Colorspace) -> PageCoverage {
        let values: Vec<f64> = match colorspace {
            Colorspace::Bw => vec![100.0 - self.percent(self.luma)],
            Colorspace::Rgb => vec![
                self.percent(self.red),
                self.percent(self.green),
                self.percent(self.blue),
            ],
            Colorspace::Cmy => vec![
                100.0 - self.percent(self.red),
                100.0 - self.percent(self.green),
                100.0 - self.percent(self.blue),
            ],
            Colorspace::Cmyk => vec![
                self.percent(self.cyan),
                self.percent(self.magenta),
                self.percent(self.yellow),
                self.percent(self.black),
            ],
            Colorspace::Gc if self.coloured => vec![0.0, 100.0],
            Colorspace::Gc => vec![100.0, 0.0],
        };
        PageCoverage {
            planes: colorspace
                .planes()
                .iter()
                .map(|plane| plane.to_string())
                .zip(values)
                .collect(),
        }
    }
}

/// Coverage of a page given as RGB pixels.
pub fn page_coverage(pixels: impl IntoIterator<Item = [u8; 3]>, colorspace: Colorspace) -> PageCoverage {
    let mut sums = PlaneSums::default();
    for pixel in pixels {
        sums.add(pixel);
    }
    sums.finish(colorspace)
}

/// Convert one decoded TIFF image to RGB triples.
fn rgb_pixels(color: ColorType, data: &[u8]) -> Result<Vec<[u8; 3]>> {
    let pixels = match color {
        ColorType::Gray(8) => data.iter().map(|v| [*v, *v, *v]).collect(),
        ColorType::RGB(8) => data
            .chunks_exact(3)
            .map(|px| [px[0], px[1], px[2]])
            .collect(),
        ColorType::RGBA(8) => data
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2]])
            .collect(),
        ColorType::CMYK(8) => data
            .chunks_exact(4)
            .map(|px| {
                let white = 255 - u16::from(px[3]);
                let channel = |ink: u8| ((255 - u16::from(ink)) * white / 255) as u8;
                [channel(px[0]), channel(px[1]), channel(px[2])]
            })
            .collect(),
        other => {
            return Err(PagetallyError::Image(format!(
                "unsupported TIFF colour type {other:?}"
            )));
        }
    };
    Ok(pixels)
}

/// Sample every page of a multi-page TIFF.
pub fn compute<R: Read + Seek>(reader: R, colorspace: Colorspace) -> Result<Vec<PageCoverage>> {
    let mut decoder = Decoder::new(reader).map_err(tiff_error)?;
    let mut pages = Vec::new();
    loop {
        let color = decoder.colortype().map_err(tiff_error)?;
        let pixels = match decoder.read_image().map_err(tiff_error)? {
            DecodingResult::U8(data) => rgb_pixels(color, &data)?,
            _ => {
                return Err(PagetallyError::Image(format!(
                    "page {} is not 8 bits per sample",
                    pages.len() + 1
                )));
            }
        };
        pages.push(page_coverage(pixels, colorspace));
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(tiff_error)?;
    }
    Ok(pages)
}

/// Sample a rendered TIFF on disk.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn compute_file(path: &Path, colorspace: Colorspace) -> Result<Vec<PageCoverage>> {
    let pages = compute(BufReader::new(File::open(path)?), colorspace)?;
    debug!(pages = pages.len(), ?colorspace, "ink coverage sampled");
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::raster::tests::rgb_tiff;
    use std::io::Cursor;

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.unwrap();
        assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
    }

    fn single(rgb: [u8; 3], colorspace: Colorspace) -> PageCoverage {
        let data = rgb_tiff(1, 3, 2, rgb);
        let mut pages = compute(Cursor::new(data), colorspace).unwrap();
        assert_eq!(pages.len(), 1);
        pages.remove(0)
    }

    #[test]
    fn black_and_white_pages() {
        assert_close(single([255, 255, 255], Colorspace::Bw).get("K"), 0.0);
        assert_close(single([0, 0, 0], Colorspace::Bw).get("K"), 100.0);
    }

    #[test]
    fn rgb_and_cmy_are_complements() {
        let rgb = single([255, 0, 0], Colorspace::Rgb);
        assert_close(rgb.get("R"), 100.0);
        assert_close(rgb.get("G"), 0.0);
        let cmy = single([255, 0, 0], Colorspace::Cmy);
        assert_close(cmy.get("C"), 0.0);
        assert_close(cmy.get("M"), 100.0);
        assert_close(cmy.get("Y"), 100.0);
    }

    #[test]
    fn cmyk_removes_undercolour() {
        let black = single([0, 0, 0], Colorspace::Cmyk);
        assert_close(black.get("K"), 100.0);
        assert_close(black.get("C"), 0.0);

        let red = single([255, 0, 0], Colorspace::Cmyk);
        assert_close(red.get("K"), 0.0);
        assert_close(red.get("M"), 100.0);
        assert_close(red.get("Y"), 100.0);
    }

    #[test]
    fn grey_or_colour() {
        let grey = single([128, 128, 128], Colorspace::Gc);
        assert_close(grey.get("G"), 100.0);
        assert_close(grey.get("C"), 0.0);
        let blue = single([0, 0, 200], Colorspace::Gc);
        assert_close(blue.get("C"), 100.0);
    }

    #[test]
    fn planes_follow_colorspace_order() {
        let page = single([10, 20, 30], Colorspace::Cmyk);
        let names: Vec<&str> = page.planes.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["C", "M", "Y", "K"]);
    }

    #[test]
    fn every_page_is_sampled() {
        let data = rgb_tiff(3, 2, 2, [0, 0, 0]);
        let pages = compute(Cursor::new(data), Colorspace::Bw).unwrap();
        assert_eq!(pages.len(), 3);
    }

    #[test]
    fn empty_page_is_zero() {
        let page = page_coverage(std::iter::empty(), Colorspace::Rgb);
        assert_close(page.get("B"), 0.0);
    }
}
