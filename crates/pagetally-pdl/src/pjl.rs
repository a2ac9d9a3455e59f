// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PJL (Printer Job Language) header parsing.
//
// PCL jobs are often preceded by a block of `@PJL` statements between
// universal exit language sequences. Only the `SET` and `DEFAULT` statements
// matter for accounting: they carry copies, duplex and paper settings that
// apply to the PCL pages that follow.

use std::collections::HashMap;

use tracing::trace;

/// Universal Exit Language: ends a PJL block.
pub const UEL: &[u8] = b"\x1b%-12345X";

/// Variables from `@PJL SET` (job environment) and `@PJL DEFAULT` statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PjlHeader {
    environment: HashMap<String, String>,
    defaults: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
    Set,
    Default,
}

impl PjlHeader {
    /// Parse the text captured after a UEL. Parsing stops at the next UEL.
    pub fn parse(data: &[u8]) -> Self {
        let data = match crate::bytes::find(data, UEL) {
            Some(end) => &data[..end],
            None => data,
        };
        let text = String::from_utf8_lossy(data);

        let mut header = Self::default();
        for line in text.split(['\r', '\n']) {
            header.parse_statement(line.trim());
        }
        header
    }

    fn parse_statement(&mut self, line: &str) {
        let mut words = line.split_whitespace();
        if words.next() != Some("@PJL") {
            return;
        }
        let statement = match words.next() {
            Some(word) if word.eq_ignore_ascii_case("SET") => Statement::Set,
            Some(word) if word.eq_ignore_ascii_case("DEFAULT") => Statement::Default,
            _ => return,
        };

        // Optional personality prefix such as `LPARM:PCL` before the assignment.
        let mut rest: Vec<&str> = words.collect();
        if rest
            .first()
            .is_some_and(|word| word.contains(':') && !word.contains('='))
        {
            rest.remove(0);
        }
        let assignment = rest.join(" ");
        let Some((name, value)) = assignment.split_once('=') else {
            return;
        };
        let name = name.trim().to_ascii_uppercase();
        let value = value.trim().trim_matches('"').to_string();
        if name.is_empty() {
            return;
        }
        trace!(?statement, %name, %value, "PJL variable");
        match statement {
            Statement::Set => self.environment.insert(name, value),
            Statement::Default => self.defaults.insert(name, value),
        };
    }

    /// Value from an `@PJL SET` statement.
    pub fn environment(&self, name: &str) -> Option<&str> {
        self.environment
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Value from an `@PJL DEFAULT` statement.
    pub fn default_value(&self, name: &str) -> Option<&str> {
        self.defaults
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Non-negative integer from an `@PJL SET` statement.
    pub fn environment_count(&self, name: &str) -> Option<i64> {
        parse_count(self.environment(name)?)
    }

    /// Non-negative integer from an `@PJL DEFAULT` statement.
    pub fn default_count(&self, name: &str) -> Option<i64> {
        parse_count(self.default_value(name)?)
    }

    pub fn is_empty(&self) -> bool {
        self.environment.is_empty() && self.defaults.is_empty()
    }
}

fn parse_count(value: &str) -> Option<i64> {
    value.parse::<i64>().ok().filter(|count| *count >= 0)
}
