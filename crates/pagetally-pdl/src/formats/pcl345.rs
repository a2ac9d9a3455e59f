// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PCL3/4/5 — escape sequence scanner and page reconciliation.
//
// The scanner walks the memory-mapped job once, dispatching on the byte after
// each ESC and then on the group character, and records page breaks plus the
// page attributes it meets on the way (copies, duplex, media, orientation,
// captured PJL text). Drivers disagree wildly about whether they emit form
// feeds, resets or raster graphics markers per page, so the raw form feed
// count is reconciled against the other evidence afterwards.

use std::collections::BTreeMap;
use std::fs::File;

use memmap2::Mmap;
use serde::Serialize;
use tracing::{debug, instrument, trace};

use pagetally_core::error::Result;
use pagetally_core::types::{DuplexMode, PdlFormat};

use crate::bytes;
use crate::external::{GS_TIFF_FROM_STDIN, Recipe, Stage};
use crate::parser::{FormatParser, JobData, OpenMode, ParserMeta, not_this_format};
use crate::pjl::PjlHeader;
use crate::probe::DetectionProbe;

const NUL: u8 = 0x00;
const LF: u8 = 0x0a;
const FF: u8 = 0x0c;
const ESC: u8 = 0x1b;
const ASCII_LIMIT: u8 = 0x80;
const IMAGE_RUNNER_1: u8 = 0xcd;
const IMAGE_RUNNER_2: u8 = 0xca;

/// Bytes in an ImageRunner record header, length field included.
const IMAGE_RUNNER_HEADER: usize = 18;
/// Records with this opcode are not followed by a payload.
const IMAGE_RUNNER_NO_PAYLOAD: [u8; 2] = [0x10, 0x02];

/// Leading NULs some drivers emit before the first escape sequence.
const DRIVER_PADDING: usize = 11_000;

// -- Attribute lookup tables --

fn media_size_name(code: i64) -> String {
    let name = match code {
        0 => "Default",
        1 => "Executive",
        2 => "Letter",
        3 => "Legal",
        6 => "Ledger",
        25 => "A5",
        26 => "A4",
        27 => "A3",
        45 => "JB5",
        46 => "JB4",
        71 => "HagakiPostcard",
        72 => "OufukuHagakiPostcard",
        80 => "MonarchEnvelope",
        81 => "COM10Envelope",
        90 => "DLEnvelope",
        91 => "C5Envelope",
        100 => "B5Envelope",
        101 => "Custom",
        other => return other.to_string(),
    };
    name.to_string()
}

fn media_source_name(code: i64) -> String {
    let name = match code {
        0 => "Default",
        1 => "Main",
        2 => "Manual",
        3 => "ManualEnvelope",
        4 => "Alternate",
        5 => "OptionalLarge",
        6 => "EnvelopeFeeder",
        7 => "Auto",
        8 => "Tray1",
        other => return other.to_string(),
    };
    name.to_string()
}

fn orientation_name(code: i64) -> String {
    let name = match code {
        0 => "Portrait",
        1 => "Landscape",
        2 => "ReversePortrait",
        3 => "ReverseLandscape",
        other => return other.to_string(),
    };
    name.to_string()
}

fn media_type_name(code: i64) -> String {
    let name = match code {
        0 => "Plain",
        1 => "Bond",
        2 => "Special",
        3 => "Glossy",
        4 => "Transparent",
        other => return other.to_string(),
    };
    name.to_string()
}

/// Attributes recorded for one page while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub lines_count: i64,
    pub copies: i64,
    pub media_source: String,
    pub media_size: String,
    pub media_type: String,
    pub orientation: String,
    /// Text captured after a universal exit language sequence (PJL).
    pub escaped: Vec<u8>,
    /// Non-zero when a duplex binding was selected.
    pub duplex: i64,
}

impl Default for PageRecord {
    fn default() -> Self {
        Self {
            lines_count: 1,
            copies: 1,
            media_source: "Main".into(),
            media_size: "Default".into(),
            media_type: "Plain".into(),
            orientation: "Portrait".into(),
            escaped: Vec::new(),
            duplex: 0,
        }
    }
}

/// Everything the scanner learned about the job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Form feeds (and line-count overflows) outside HP-GL/2.
    pub page_breaks: usize,
    /// `ESC E` printer resets.
    pub resets: usize,
    pub backsides: Vec<i64>,
    pub copies: Vec<i64>,
    pub media_sources: Vec<String>,
    pub media_sizes: Vec<String>,
    pub orientations: Vec<String>,
    pub media_types: Vec<String>,
    /// Latest `ESC & l # F` value.
    pub lines_per_page: Option<i64>,
    /// Raster graphics start modes seen (`ESC * r # A`).
    pub start_gfx: Vec<i64>,
    /// Raster graphics ends seen while a start was pending.
    pub end_gfx: usize,
    /// The job starts with an ImageRunner record.
    pub image_runner: bool,
    /// Per-page attributes, keyed by page index.
    pub pages: BTreeMap<usize, PageRecord>,
}

// -- Scanner --

struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
    hpgl2: bool,
    stats: ScanStats,
}

/// A parameter read after a group character: value and terminating
/// character, or `(None, None)` when the sequence ended early.
type Parameter = (Option<i64>, Option<u8>);

impl<'a> Scanner<'a> {
    fn new(data: &'a [u8]) -> Self {
        let stats = ScanStats {
            image_runner: data.starts_with(&[IMAGE_RUNNER_1, IMAGE_RUNNER_2]),
            ..ScanStats::default()
        };
        Self {
            data,
            pos: 0,
            hpgl2: false,
            stats,
        }
    }

    /// Next byte, or `None` at end of data, which ends the scan.
    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn unread(&mut self) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn skip(&mut self, count: i64) {
        if count > 0 {
            self.pos = self.pos.saturating_add(count as usize);
        }
    }

    fn page(&mut self) -> &mut PageRecord {
        self.stats.pages.entry(self.stats.page_breaks).or_default()
    }

    fn run(mut self) -> ScanStats {
        while self.step().is_some() {}
        self.stats
    }

    fn step(&mut self) -> Option<()> {
        match self.read_byte()? {
            LF => self.new_line(),
            FF => self.end_page(),
            ESC => self.escape(),
            ASCII_LIMIT => {
                self.pos += 1;
                Some(())
            }
            IMAGE_RUNNER_1 => self.image_runner(),
            _ => Some(()),
        }
    }

    /// Read `[-]digits` up to a terminating character. NUL, ESC, FF and
    /// 0x80 end the sequence and are left unread.
    fn parameter(&mut self) -> Option<Parameter> {
        let mut negative = false;
        let mut value: Option<i64> = None;
        loop {
            let byte = self.read_byte()?;
            match byte {
                NUL | ESC | FF | ASCII_LIMIT => {
                    self.unread();
                    return Some((None, None));
                }
                b'-' => negative = true,
                b'0'..=b'9' => {
                    let digit = i64::from(byte - b'0');
                    value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(digit));
                }
                _ => {
                    let value = value.map(|v| if negative { -v } else { v });
                    return Some((value, Some(byte)));
                }
            }
        }
    }

    /// Consume valued parameters. The first character without a value ends
    /// the sequence and is dropped.
    fn drain_parameters(&mut self) -> Option<()> {
        while self.parameter()?.0.is_some() {}
        Some(())
    }

    /// Skip the data blocks of a parameterised sequence: only a `# W`
    /// parameter is followed by `#` bytes of data.
    fn skip_counted(&mut self) -> Option<()> {
        self.skip_when(b'W')
    }

    fn skip_when(&mut self, data_terminator: u8) -> Option<()> {
        loop {
            match self.parameter()? {
                (None, _) => return Some(()),
                (Some(count), Some(end)) if end == data_terminator => self.skip(count),
                _ => {}
            }
        }
    }

    // -- Top level --

    fn new_line(&mut self) -> Option<()> {
        if !self.hpgl2 {
            let lines_per_page = self.stats.lines_per_page;
            let page = self.page();
            page.lines_count += 1;
            if lines_per_page.is_some_and(|limit| page.lines_count > limit) {
                self.stats.page_breaks += 1;
            }
        }
        Some(())
    }

    fn end_page(&mut self) -> Option<()> {
        if !self.hpgl2 {
            self.stats.page_breaks += 1;
        }
        Some(())
    }

    fn image_runner(&mut self) -> Option<()> {
        if self.read_byte()? != IMAGE_RUNNER_2 {
            self.unread();
            return Some(());
        }
        let opcode = self.data.get(self.pos..self.pos + 2)?;
        let length_field = self.data.get(self.pos + 6..self.pos + 8)?;
        let length = usize::from(u16::from_be_bytes([length_field[0], length_field[1]]));
        let has_payload = opcode != IMAGE_RUNNER_NO_PAYLOAD;
        trace!(pos = self.pos, ?opcode, length, "ImageRunner record");
        self.pos += IMAGE_RUNNER_HEADER;
        if has_payload {
            self.pos += length;
        }
        Some(())
    }

    fn escape(&mut self) -> Option<()> {
        match self.read_byte()? {
            b'%' => self.esc_percent(),
            b'*' => self.esc_star(),
            b'&' => self.esc_amp(),
            b'$' => self.esc_dollar(),
            b'(' => self.esc_left_paren(),
            b')' => self.esc_right_paren(),
            b'E' => {
                self.stats.resets += 1;
                Some(())
            }
            _ => Some(()),
        }
    }

    // -- ESC % --

    fn esc_percent(&mut self) -> Option<()> {
        let uel_tail = &crate::pjl::UEL[2..];
        if self.data[self.pos..].starts_with(uel_tail) {
            self.pos += uel_tail.len();
            self.capture_escaped()
        } else {
            self.hpgl2_switch()
        }
    }

    /// Capture PJL text up to the next ESC, FF or NUL. Bytes above 0x7F only
    /// count as text inside double quotes.
    fn capture_escaped(&mut self) -> Option<()> {
        let mut captured = Vec::new();
        let mut quotes = 0usize;
        let mut byte = self.read_byte()?;
        while (byte < ASCII_LIMIT || quotes % 2 == 1) && !matches!(byte, FF | ESC | NUL) {
            captured.push(byte);
            if byte == b'"' {
                quotes += 1;
            }
            byte = self.read_byte()?;
        }
        trace!(bytes = captured.len(), "captured PJL block");
        self.page().escaped = captured;
        self.unread();
        Some(())
    }

    /// `ESC % # B` enters HP-GL/2, `ESC % # A` returns to PCL.
    fn hpgl2_switch(&mut self) -> Option<()> {
        loop {
            let (_, end) = self.parameter()?;
            match end {
                Some(b'B') => {
                    self.hpgl2 = true;
                    while *self.data.get(self.pos)? != ESC {
                        self.pos += 1;
                    }
                    self.unread();
                    return Some(());
                }
                Some(b'A') => {
                    self.hpgl2 = false;
                    return Some(());
                }
                None => return Some(()),
                Some(_) => {}
            }
        }
    }

    // -- ESC & --

    fn esc_amp(&mut self) -> Option<()> {
        match self.read_byte()? {
            b'a' => self.esc_amp_a(),
            b'l' => self.esc_amp_l(),
            b'p' => self.esc_amp_p(),
            b'b' | b'n' => self.skip_counted(),
            b'u' => self.drain_parameters(),
            _ => Some(()),
        }
    }

    /// `ESC & a # G` selects the side to print on; each one is a backside.
    fn esc_amp_a(&mut self) -> Option<()> {
        loop {
            match self.parameter()? {
                (None, _) => return Some(()),
                (Some(value), Some(b'G')) => {
                    self.stats.backsides.push(value);
                    self.page().duplex = value;
                }
                _ => {}
            }
        }
    }

    /// `ESC & l` page control: source, size, orientation, type, copies, lines.
    fn esc_amp_l(&mut self) -> Option<()> {
        loop {
            let (value, end) = self.parameter()?;
            let (Some(value), Some(end)) = (value, end) else {
                return Some(());
            };
            match end {
                b'h' | b'H' => {
                    let source = media_source_name(value);
                    self.stats.media_sources.push(source.clone());
                    self.page().media_source = source;
                }
                b'a' | b'A' => {
                    let size = media_size_name(value);
                    self.stats.media_sizes.push(size.clone());
                    self.page().media_size = size;
                }
                b'o' | b'O' => {
                    let orientation = orientation_name(value);
                    self.stats.orientations.push(orientation.clone());
                    self.page().orientation = orientation;
                }
                b'm' | b'M' => {
                    let media_type = media_type_name(value);
                    self.stats.media_types.push(media_type.clone());
                    self.page().media_type = media_type;
                }
                b'X' => {
                    self.stats.copies.push(value);
                    self.page().copies = value;
                }
                b'F' => {
                    self.stats.lines_per_page = Some(value);
                }
                _ => {}
            }
        }
    }

    /// `ESC & p # X <# bytes>` transparent print data.
    fn esc_amp_p(&mut self) -> Option<()> {
        self.skip_when(b'X')
    }

    // -- ESC * --

    fn esc_star(&mut self) -> Option<()> {
        match self.read_byte()? {
            b'b' => self.esc_star_b(),
            b'r' => self.esc_star_r(),
            b'o' | b'p' | b't' => self.drain_parameters(),
            b'c' | b'g' | b'i' | b'l' | b'm' | b'v' => self.skip_counted(),
            _ => Some(()),
        }
    }

    /// `ESC * b` raster rows: `V`/`W` carry counted data.
    fn esc_star_b(&mut self) -> Option<()> {
        loop {
            match self.parameter()? {
                (None, None) => return Some(()),
                (value, Some(b'V' | b'W' | b'v' | b'w')) => self.skip(value.unwrap_or(0)),
                _ => {}
            }
        }
    }

    /// `ESC * r` raster graphics start (`A`) and end (`B`/`C`).
    fn esc_star_r(&mut self) -> Option<()> {
        loop {
            match self.parameter()? {
                (None, None) => return Some(()),
                (None, Some(b'B' | b'C')) => {
                    if !self.stats.start_gfx.is_empty() {
                        self.stats.end_gfx += 1;
                    }
                }
                (Some(mode), Some(b'A')) if (0..=3).contains(&mode) => {
                    self.stats.start_gfx.push(mode);
                }
                _ => {}
            }
        }
    }

    // -- ESC $ ( ) --

    fn esc_dollar(&mut self) -> Option<()> {
        match self.read_byte()? {
            b'b' => self.skip_counted(),
            _ => Some(()),
        }
    }

    fn esc_left_paren(&mut self) -> Option<()> {
        match self.read_byte()? {
            b's' | b'f' => self.skip_counted(),
            _ => Some(()),
        }
    }

    fn esc_right_paren(&mut self) -> Option<()> {
        match self.read_byte()? {
            b's' => self.skip_counted(),
            _ => Some(()),
        }
    }
}

/// Scan a PCL job.
pub fn scan(data: &[u8]) -> ScanStats {
    Scanner::new(data).run()
}

// -- Reconciliation --

/// Turn the raw break count into a page count using the other evidence the
/// scanner collected. May be negative for a degenerate ImageRunner job.
pub fn reconcile(stats: &ScanStats) -> i64 {
    let mut count = stats.page_breaks as i64;
    let default_sources = stats
        .media_sources
        .iter()
        .filter(|source| *source == "Default" || *source == "Auto")
        .count() as i64;
    let other_sources = stats.media_sources.len() as i64 - default_sources;
    let sizes = stats.media_sizes.len() as i64;
    let orientations = stats.orientations.len() as i64;
    let backsides = stats.backsides.len() as i64;
    let resets = stats.resets as i64;

    if stats.image_runner {
        // The record stream ends with one spurious break.
        count -= 1;
    } else if stats.lines_per_page.is_some() {
        // The last page is never terminated by a line overflow.
        count += 1;
    } else if stats.start_gfx.is_empty() && stats.end_gfx == 0 {
        if resets % 2 == 1 {
            if count == 0 && orientations < backsides {
                count = backsides;
            } else if orientations == count + 1 {
                count += 1;
            } else if count > 1 && orientations == count - 1 {
                count -= 1;
            }
        }
    } else if count > 1 && resets == 2 && default_sources == 0 && other_sources == 1 {
        count -= 1;
    }

    if count == 0 {
        count = [default_sources, sizes, orientations, resets]
            .into_iter()
            .find(|evidence| *evidence != 0)
            .unwrap_or(0);
    }
    count
}

/// Effective settings for one physical page after PJL resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPage {
    pub copies: i64,
    pub media_type: String,
    pub paper: String,
    pub orientation: String,
    pub media_source: String,
    pub duplex: DuplexMode,
}

/// Settings carried from one page to the next.
#[derive(Debug, Default)]
struct CarryOver {
    default_copies: i64,
    default_duplex: DuplexMode,
    default_paper: String,
    copies: Option<i64>,
    duplex: Option<DuplexMode>,
    paper: String,
}

impl CarryOver {
    fn new() -> Self {
        Self {
            default_copies: 1,
            ..Self::default()
        }
    }

    fn resolve(&mut self, page: &PageRecord) -> ResolvedPage {
        let page_duplex = (page.duplex != 0).then_some(DuplexMode::Duplex);
        let (pjl_copies, duplex, mut paper) = if page.escaped.is_empty() {
            let copies = self.copies.unwrap_or(self.default_copies);
            let duplex = page_duplex
                .or(self.duplex)
                .unwrap_or(self.default_duplex);
            let paper = if self.paper.is_empty() {
                page.media_size.clone()
            } else {
                self.paper.clone()
            };
            (copies, duplex, paper)
        } else {
            let pjl = PjlHeader::parse(&page.escaped);
            if let Some(copies) = pjl.default_count("COPIES") {
                self.default_copies = copies;
            }
            if let Some(quantity) = pjl.default_count("QTY") {
                self.default_copies = quantity;
            }
            let copies = pjl
                .environment_count("COPIES")
                .or_else(|| pjl.environment_count("QTY"))
                .or(self.copies)
                .unwrap_or(self.default_copies);

            let duplex = match page_duplex {
                Some(duplex) => duplex,
                None => {
                    if let Some(value) = pjl.default_value("DUPLEX") {
                        self.default_duplex = DuplexMode::from_pjl(value);
                    }
                    match pjl.environment("DUPLEX") {
                        Some(value) => DuplexMode::from_pjl(value),
                        None => self.duplex.unwrap_or(self.default_duplex),
                    }
                }
            };

            if let Some(value) = pjl.default_value("PAPER") {
                self.default_paper = value.to_string();
            }
            let paper = match pjl.environment("PAPER") {
                Some(value) => value.to_string(),
                None if self.paper.is_empty() => self.default_paper.clone(),
                None => self.paper.clone(),
            };
            (copies, duplex, paper)
        };

        if page.media_size != "Default" {
            paper = page.media_size.clone();
        }
        let copies = pjl_copies.max(page.copies);

        self.copies = Some(pjl_copies);
        self.duplex = Some(duplex);
        self.paper = paper.clone();

        ResolvedPage {
            copies,
            media_type: page.media_type.clone(),
            paper,
            orientation: page.orientation.clone(),
            media_source: page.media_source.clone(),
            duplex,
        }
    }
}

/// Resolve the settings of pages `0..count`. Pages without their own record
/// borrow the previous page's, then the first page's, then the defaults.
pub fn resolve_pages(stats: &ScanStats, count: i64) -> Vec<ResolvedPage> {
    let fallback = PageRecord::default();
    let mut carry = CarryOver::new();
    (0..count.max(0) as usize)
        .map(|index| {
            let page = stats
                .pages
                .get(&index)
                .or_else(|| index.checked_sub(1).and_then(|prev| stats.pages.get(&prev)))
                .or_else(|| stats.pages.get(&0))
                .unwrap_or(&fallback);
            carry.resolve(page)
        })
        .collect()
}

/// Physical pages: one per page plus the extra copies, never negative.
pub fn total_pages(count: i64, pages: &[ResolvedPage]) -> u64 {
    let extra = pages
        .iter()
        .fold(0i64, |extra, page| extra.saturating_add(page.copies.saturating_sub(1)));
    count.saturating_add(extra).max(0) as u64
}

// -- Parser --

const PCL_TO_PDF: Stage = Stage {
    program: "pcl6",
    args: &[
        "-sDEVICE=pdfwrite",
        "-dPARANOIDSAFER",
        "-dNOPAUSE",
        "-dBATCH",
        "-dQUIET",
        "-sOutputFile=-",
        "{in}",
    ],
};

const PCL_TO_PS: Stage = Stage {
    program: "pcl6",
    args: &[
        "-sDEVICE=pswrite",
        "-dPARANOIDSAFER",
        "-dNOPAUSE",
        "-dBATCH",
        "-dQUIET",
        "-sOutputFile=-",
        "{in}",
    ],
};

/// Parser for PCL3, PCL4 and PCL5 jobs.
#[derive(Debug)]
pub struct Pcl345Parser {
    job: JobData,
}

impl Pcl345Parser {
    /// Whether the probe looks like PCL3/4/5.
    pub fn looks_like_pcl(probe: &DetectionProbe) -> bool {
        let Some(start) = probe.head.iter().position(|byte| *byte != NUL) else {
            return false;
        };
        let head = &probe.head[start..];
        head.starts_with(b"\x1bE\x1b")
            || head.starts_with(b"\x1b(")
            || head.starts_with(b"\x1b%1BBPIN;")
            || (start == DRIVER_PADDING && head.starts_with(b"\x1b"))
            || (head.starts_with(b"\x1b*rbC") && !probe.tail.ends_with(b"\x0c\x1b@"))
            || head.starts_with(b"\x1b*rB\x1b")
            || head.starts_with(b"\x1b%8\x1b")
            || bytes::contains(head, b"\x1b%-12345X")
            || bytes::contains(head, b"@PJL ENTER LANGUAGE=PCL\n\r\x1b")
            || (head.starts_with(&[IMAGE_RUNNER_1, IMAGE_RUNNER_2])
                && bytes::contains(head, b"\x1bE\x1b"))
    }

    fn scan_job(&self) -> Result<ScanStats> {
        let file = File::open(&self.job.path)?;
        // SAFETY: the mapping is read-only and dropped before returning. The
        // job file is spooler-owned or a private scratch copy.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(scan(&mmap))
    }

    /// Per-page settings after reconciliation and PJL resolution.
    pub fn resolve_pages(&self) -> Result<Vec<ResolvedPage>> {
        let stats = self.scan_job()?;
        Ok(resolve_pages(&stats, reconcile(&stats)))
    }
}

impl FormatParser for Pcl345Parser {
    const META: ParserMeta = ParserMeta {
        format: PdlFormat::Pcl345,
        open_mode: OpenMode::Binary,
        required: &["pcl6", "gs"],
        to_tiff: &[
            Recipe {
                steps: &[&[PCL_TO_PDF, GS_TIFF_FROM_STDIN]],
            },
            Recipe {
                steps: &[&[PCL_TO_PS, GS_TIFF_FROM_STDIN]],
            },
        ],
    };

    fn open(job: &JobData, probe: &DetectionProbe) -> Result<Self> {
        if !Self::looks_like_pcl(probe) {
            return Err(not_this_format(PdlFormat::Pcl345));
        }
        Ok(Self { job: job.clone() })
    }

    fn job(&self) -> &JobData {
        &self.job
    }

    #[instrument(skip(self), fields(path = %self.job.path.display()))]
    fn count_pages(&self) -> Result<u64> {
        let stats = self.scan_job()?;
        let count = reconcile(&stats);
        let pages = resolve_pages(&stats, count);
        for (index, page) in pages.iter().enumerate() {
            debug!(
                page = index + 1,
                copies = page.copies,
                paper = %page.paper,
                media_type = %page.media_type,
                orientation = %page.orientation,
                source = %page.media_source,
                duplex = ?page.duplex,
                "PCL page"
            );
        }
        debug!(
            breaks = stats.page_breaks,
            resets = stats.resets,
            reconciled = count,
            "PCL scan complete"
        );
        Ok(total_pages(count, &pages))
    }
}
