// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Byte-slice search helpers shared by the detectors and parsers.

/// Position of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Whether `needle` occurs anywhere in `haystack`.
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// Number of non-overlapping occurrences of `needle` in `haystack`.
pub fn count(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() {
        return 0;
    }
    let mut total = 0;
    let mut rest = haystack;
    while let Some(at) = find(rest, needle) {
        total += 1;
        rest = &rest[at + needle.len()..];
    }
    total
}

/// Whitespace as PostScript and PNM tokenisers see it.
pub fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Trim leading and trailing whitespace.
pub fn trim(mut line: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = line {
        if !is_space(*first) {
            break;
        }
        line = rest;
    }
    while let [rest @ .., last] = line {
        if !is_space(*last) {
            break;
        }
        line = rest;
    }
    line
}

/// Split on runs of whitespace, dropping empty tokens.
pub fn tokens(line: &[u8]) -> Vec<&[u8]> {
    line.split(|byte| is_space(*byte))
        .filter(|token| !token.is_empty())
        .collect()
}

/// Parse a decimal integer the way a lenient text field is read.
pub fn parse_int(text: &[u8]) -> Option<i64> {
    std::str::from_utf8(trim(text)).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_non_overlapping() {
        assert_eq!(count(b"aaaa", b"aa"), 2);
        assert_eq!(count(b"draw:name= x draw:name=", b"draw:name="), 2);
        assert_eq!(count(b"abc", b""), 0);
    }

    #[test]
    fn trim_and_tokens() {
        assert_eq!(trim(b"  %%Page: 1 1\r\n"), b"%%Page: 1 1");
        assert_eq!(tokens(b"1 dict  dup\t/NumCopies 3"), vec![
            &b"1"[..],
            b"dict",
            b"dup",
            b"/NumCopies",
            b"3"
        ]);
    }

    #[test]
    fn lenient_integers() {
        assert_eq!(parse_int(b" 12 "), Some(12));
        assert_eq!(parse_int(b"-3"), Some(-3));
        assert_eq!(parse_int(b"3)"), None);
    }
}
