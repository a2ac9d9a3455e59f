// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Universal-newline line reader for the text-mode parsers.

use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Iterator over the lines of a byte stream where `\n`, `\r\n` and a bare
/// `\r` all end a line. Terminators are not included in the yielded lines;
/// a final line without a terminator is still yielded.
pub struct UniversalLines<R> {
    reader: R,
    pending: VecDeque<Vec<u8>>,
    done: bool,
}

impl<R: BufRead> UniversalLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn split_chunk(&mut self, mut chunk: Vec<u8>) {
        if chunk.last() == Some(&b'\n') {
            chunk.pop();
        }
        if chunk.last() == Some(&b'\r') {
            chunk.pop();
        }
        self.pending
            .extend(chunk.split(|byte| *byte == b'\r').map(<[u8]>::to_vec));
    }
}

impl<R: BufRead> Iterator for UniversalLines<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.done {
                return None;
            }
            let mut chunk = Vec::new();
            match self.reader.read_until(b'\n', &mut chunk) {
                Ok(0) => self.done = true,
                Ok(_) => self.split_chunk(chunk),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
