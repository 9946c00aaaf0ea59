// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! String splitting and trimming utilities, used by the command proxy to
//! tokenize a line into a command and its arguments.

/// Splits `s` on every occurrence of `delimiter`, the Rust analogue of the
/// source's `SplitByChar`/`Split(s, delimiter)`. Unlike `str::split`, this
/// never yields a trailing empty slice for a trailing delimiter match, to
/// mirror the source's iterator, which stops once it reaches `end()`.
pub fn split(s: &str, delimiter: char) -> Vec<&str> {
    s.split_terminator(delimiter).collect()
}

/// Splits `s` on runs of ASCII whitespace-or-control bytes, discarding
/// empty tokens, the analogue of the source's `Tokenize`/`SplitByBlank`.
pub fn tokenize(s: &str) -> Vec<&str> {
    s.split(|c: char| (c as u32) <= (' ' as u32))
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Trims leading and trailing bytes `<= ' '` (ASCII whitespace-or-control),
/// the same criterion the source's `Trim` uses rather than Unicode
/// whitespace.
pub fn trim(s: &str) -> &str {
    s.trim_matches(|c: char| (c as u32) <= (' ' as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_skips_runs_of_blanks() {
        assert_eq!(tokenize("  CONNECT   host:1234  "), vec!["CONNECT", "host:1234"]);
    }

    #[test]
    fn split_preserves_empty_tokens_between_delimiters() {
        assert_eq!(split("a,,b", ','), vec!["a", "", "b"]);
    }

    #[test]
    fn split_drops_trailing_empty_token_for_trailing_delimiter() {
        assert_eq!(split("a,b,", ','), vec!["a", "b"]);
    }

    #[test]
    fn trim_strips_control_and_space_bytes() {
        assert_eq!(trim("\t  CONNECT host\r\n"), "CONNECT host");
    }
}
