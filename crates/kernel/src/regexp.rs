// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The regular-expression collaborator behind `match`/`rmatch`. The legacy
//! engine is not reentrant, so every use happens under one global lock.

use etamoo_var::ErrorCode::E_INVARG;
use etamoo_var::Error;
use lazy_static::lazy_static;
use onig::{Regex, RegexOptions, Region, SearchOptions, Syntax};
use parking_lot::Mutex;

lazy_static! {
    static ref REGEX_LOCK: Mutex<()> = Mutex::new(());
}

/// One match: 1-based inclusive start/end code-point positions of the whole
/// match, plus the nine capture groups (unused groups are (0, -1)).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchSpans {
    pub start: i64,
    pub end: i64,
    pub subs: Vec<(i64, i64)>,
}

/// Map a byte offset in `subject` to a 0-based char offset.
fn byte_to_char(subject: &str, byte_pos: usize) -> i64 {
    subject[..byte_pos].chars().count() as i64
}

fn spans_from_region(subject: &str, region: &Region) -> MatchSpans {
    let (whole_start, whole_end) = region.pos(0).expect("matched region without a position");
    let start = byte_to_char(subject, whole_start) + 1;
    let end = byte_to_char(subject, whole_end);
    let mut subs = Vec::with_capacity(9);
    for group in 1..=9 {
        match region.pos(group) {
            Some((s, e)) => {
                subs.push((
                    byte_to_char(subject, s) + 1,
                    byte_to_char(subject, e),
                ));
            }
            None => subs.push((0, -1)),
        }
    }
    MatchSpans { start, end, subs }
}

fn compile(pattern: &str, case_matters: bool) -> Result<Regex, Error> {
    let options = if case_matters {
        RegexOptions::REGEX_OPTION_NONE
    } else {
        RegexOptions::REGEX_OPTION_IGNORECASE
    };
    Regex::with_options(pattern, options, Syntax::perl())
        .map_err(|e| E_INVARG.with_msg(|| format!("invalid pattern: {e}")))
}

/// Find the first match of `pattern` in `subject`.
pub fn regex_match(
    subject: &str,
    pattern: &str,
    case_matters: bool,
) -> Result<Option<MatchSpans>, Error> {
    let _guard = REGEX_LOCK.lock();
    let regex = compile(pattern, case_matters)?;
    let mut region = Region::new();
    let found = regex.search_with_options(
        subject,
        0,
        subject.len(),
        SearchOptions::SEARCH_OPTION_NONE,
        Some(&mut region),
    );
    Ok(found.map(|_| spans_from_region(subject, &region)))
}

/// Find the last (rightmost-starting) match of `pattern` in `subject`.
pub fn regex_rmatch(
    subject: &str,
    pattern: &str,
    case_matters: bool,
) -> Result<Option<MatchSpans>, Error> {
    let _guard = REGEX_LOCK.lock();
    let regex = compile(pattern, case_matters)?;

    // Walk forward over every match start; the last one wins.
    let mut best = None;
    let mut at = 0;
    while at <= subject.len() {
        if !subject.is_char_boundary(at) {
            at += 1;
            continue;
        }
        let mut region = Region::new();
        let found = regex.search_with_options(
            subject,
            at,
            subject.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        );
        let Some(_) = found else {
            break;
        };
        let (match_start, _) = region.pos(0).expect("matched region without a position");
        best = Some(spans_from_region(subject, &region));
        at = match_start + 1;
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_match() {
        let m = regex_match("foobar", "o+", false).unwrap().unwrap();
        assert_eq!(m.start, 2);
        assert_eq!(m.end, 3);
        assert_eq!(m.subs[0], (0, -1));
    }

    #[test]
    fn test_captures() {
        let m = regex_match("the quick brown", "q(ui)(ck)", false)
            .unwrap()
            .unwrap();
        assert_eq!(m.start, 5);
        assert_eq!(m.end, 9);
        assert_eq!(m.subs[0], (6, 7));
        assert_eq!(m.subs[1], (8, 9));
    }

    #[test]
    fn test_case_sensitivity() {
        assert!(regex_match("FOO", "foo", false).unwrap().is_some());
        assert!(regex_match("FOO", "foo", true).unwrap().is_none());
    }

    #[test]
    fn test_rmatch_finds_last() {
        let m = regex_rmatch("abcabc", "abc", false).unwrap().unwrap();
        assert_eq!(m.start, 4);
        assert_eq!(m.end, 6);
    }

    #[test]
    fn test_no_match_and_bad_pattern() {
        assert!(regex_match("abc", "xyz", false).unwrap().is_none());
        assert!(regex_match("abc", "(unclosed", false).is_err());
    }
}
