// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job analysis — resolve the input, detect its language, count its pages.
//
// An `Analyzer` carries the options shared by every job. Each input is opened
// as a `Job`, which owns the resolved data (spooled to a scratch file when the
// source is a stream) for as long as the job is alive. Jobs hold no state
// between calls, so `count_pages` can be repeated and independent jobs can be
// analysed on different threads.

use std::path::PathBuf;

use tracing::{debug, info, instrument};

use pagetally_core::config::AnalyzerOptions;
use pagetally_core::error::{PagetallyError, Result};
use pagetally_core::integrity;
use pagetally_core::types::{Colorspace, JobReport, PageCoverage};

use crate::coverage;
use crate::detect;
use crate::parser::{JobData, PdlParser};
use crate::probe::DetectionProbe;
use crate::spool::{InputSource, SpooledInput};

/// Entry point for analysing print jobs.
#[derive(Debug, Clone)]
pub struct Analyzer {
    options: AnalyzerOptions,
}

impl Analyzer {
    /// Create an analyzer, rejecting out-of-range options up front.
    pub fn new(options: AnalyzerOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Resolve `source` to random-access data.
    #[instrument(skip_all, fields(input = %source.name()))]
    pub fn open(&self, source: InputSource) -> Result<Job> {
        let scratch_dir = self.options.scratch_dir();
        let input = SpooledInput::open(source, &scratch_dir)?;
        let data = JobData::new(input.path(), scratch_dir);
        Ok(Job {
            input,
            data,
            resolution: self.options.resolution,
        })
    }

    /// Open `source` and count its pages.
    pub fn count_pages(&self, source: InputSource) -> Result<u64> {
        self.open(source)?.count_pages()
    }

    /// Open `source` and produce its accounting record.
    pub fn report(&self, source: InputSource) -> Result<JobReport> {
        self.open(source)?.report()
    }

    /// Open `source` and sample its ink coverage in the configured colorspace.
    pub fn ink_coverage(&self, source: InputSource) -> Result<Vec<PageCoverage>> {
        let colorspace = self.options.colorspace.ok_or_else(|| {
            PagetallyError::InvalidOption("ink coverage needs a colorspace".into())
        })?;
        self.open(source)?.ink_coverage(colorspace)
    }
}

/// One print job, ready for analysis.
#[derive(Debug)]
pub struct Job {
    input: SpooledInput,
    data: JobData,
    resolution: u32,
}

impl Job {
    /// Filename, `-`, or the stream's identifier.
    pub fn name(&self) -> &str {
        self.input.name()
    }

    /// Where the job data lives on disk.
    pub fn path(&self) -> PathBuf {
        self.data.path.clone()
    }

    /// Identify the page description language.
    #[instrument(skip(self), fields(input = %self.name()))]
    pub fn detect(&self) -> Result<PdlParser> {
        if self.data.is_empty()? {
            return Err(PagetallyError::EmptyInput {
                input: self.name().to_string(),
            });
        }
        let probe = DetectionProbe::from_path(&self.data.path)?;
        detect::detect(&self.data, &probe, self.name())
    }

    /// Physical pages the job prints, copies included.
    #[instrument(skip(self), fields(input = %self.name()))]
    pub fn count_pages(&self) -> Result<u64> {
        let parser = self.detect()?;
        let pages = parser
            .count_pages()
            .map_err(|err| err.in_job(self.name()))?;
        info!(format = %parser.format(), pages, "job counted");
        Ok(pages)
    }

    /// Detected format, page count and data fingerprint.
    pub fn report(&self) -> Result<JobReport> {
        let parser = self.detect()?;
        let pages = parser
            .count_pages()
            .map_err(|err| err.in_job(self.name()))?;
        let sha256 = integrity::hash_reader(self.input.reopen()?)?;
        Ok(JobReport {
            input: self.name().to_string(),
            format: parser.format(),
            pages,
            sha256,
        })
    }

    /// Render the job and sample each page's ink coverage.
    #[instrument(skip(self), fields(input = %self.name(), dpi = self.resolution))]
    pub fn ink_coverage(&self, colorspace: Colorspace) -> Result<Vec<PageCoverage>> {
        let parser = self.detect()?;
        let rendered = tempfile::Builder::new()
            .prefix("pagetally_")
            .suffix(".tiff")
            .tempfile_in(&self.data.scratch_dir)?;
        parser
            .render_tiff(rendered.path(), self.resolution)
            .and_then(|()| coverage::compute_file(rendered.path(), colorspace))
            .map_err(|err| err.in_job(self.name()))
            .inspect(|pages| debug!(pages = pages.len(), "coverage ready"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use pagetally_core::types::PdlFormat;

    fn analyzer(dir: &tempfile::TempDir) -> Analyzer {
        Analyzer::new(AnalyzerOptions {
            temp_dir: Some(dir.path().to_path_buf()),
            ..AnalyzerOptions::default()
        })
        .unwrap()
    }

    fn write(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> InputSource {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        InputSource::Path(path)
    }

    #[test]
    fn options_are_validated() {
        let err = Analyzer::new(AnalyzerOptions {
            resolution: 10,
            ..AnalyzerOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, PagetallyError::InvalidOption(_)));
    }

    #[test]
    fn empty_input_is_rejected_before_detection() {
        let dir = tempfile::tempdir().unwrap();
        let err = analyzer(&dir)
            .count_pages(write(&dir, "empty.prn", b""))
            .unwrap_err();
        assert!(matches!(err, PagetallyError::EmptyInput { .. }));
    }

    #[test]
    fn unprintable_input_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let source = InputSource::Reader {
            name: "blob".into(),
            reader: Box::new(Cursor::new(vec![0x00, 0x9c, 0x01, 0xff])),
        };
        match analyzer(&dir).count_pages(source).unwrap_err() {
            PagetallyError::UnsupportedFormat { input, .. } => assert_eq!(input, "blob"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn postscript_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(
            &dir,
            "letter.ps",
            b"%!PS-Adobe-3.0\n%%Pages: 2\n%%Page: 1 1\nshowpage\n%%Page: 2 2\nshowpage\n%%EOF\n",
        );
        let report = analyzer(&dir).report(source).unwrap();
        assert_eq!(report.format, PdlFormat::PostScript);
        assert_eq!(report.pages, 2);
        assert_eq!(report.input, dir.path().join("letter.ps").display().to_string());
    }

    #[test]
    fn pcl_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(&dir, "job.pcl", b"\x1b(10Ufirst\n\x0c\x1b&l3Xsecond\n\x0cthird\n\x0c");
        assert_eq!(analyzer(&dir).count_pages(source).unwrap(), 5);
    }

    #[test]
    fn pdf_file_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let source = write(
            &dir,
            "doc.pdf",
            b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
2 0 obj\n<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>\nendobj\n\
3 0 obj\n<< /Type /Page /Parent 2 0 R >>\nendobj\n\
4 0 obj\n<< /Type /Page /Parent 2 0 R >>\nendobj\n%%EOF\n",
        );
        let job = analyzer(&dir).open(source).unwrap();
        assert_eq!(job.detect().unwrap().format(), PdlFormat::Pdf);
        assert_eq!(job.count_pages().unwrap(), 2);
    }

    #[test]
    fn counting_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let text = "line\n".repeat(100);
        let job = analyzer(&dir)
            .open(write(&dir, "notes.txt", text.as_bytes()))
            .unwrap();
        let first = job.count_pages().unwrap();
        assert_eq!(first, 2);
        assert_eq!(job.count_pages().unwrap(), first);
    }

    #[test]
    fn streams_are_spooled_and_fingerprinted() {
        let dir = tempfile::tempdir().unwrap();
        let data = b"first line\nsecond line\n\x0cthird page\n".to_vec();
        let source = InputSource::Reader {
            name: "queue/42".into(),
            reader: Box::new(Cursor::new(data.clone())),
        };
        let job = analyzer(&dir).open(source).unwrap();
        let spooled = job.path();
        assert!(spooled.starts_with(dir.path()));

        let report = job.report().unwrap();
        assert_eq!(report.input, "queue/42");
        assert_eq!(report.format, PdlFormat::PlainText);
        assert_eq!(report.pages, 2);
        assert_eq!(report.sha256, integrity::hash_bytes(&data));

        drop(job);
        assert!(!spooled.exists());
    }

    #[test]
    fn coverage_without_pipeline_is_a_job_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = analyzer(&dir)
            .open(write(&dir, "host.zjs", b"ZJZJ"))
            .unwrap();
        let err = job.ink_coverage(Colorspace::Bw).unwrap_err();
        assert!(matches!(err, PagetallyError::Job { .. }));
        assert!(matches!(err.root(), PagetallyError::Conversion(_)));
    }

    #[test]
    fn coverage_needs_a_colorspace() {
        let dir = tempfile::tempdir().unwrap();
        let err = analyzer(&dir)
            .ink_coverage(write(&dir, "a.txt", b"a\nb\n"))
            .unwrap_err();
        assert!(matches!(err, PagetallyError::InvalidOption(_)));
    }
}
