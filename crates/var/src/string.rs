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

use crate::error::ErrorCode::{E_INVARG, E_RANGE, E_TYPE};
use crate::var::Var;
use crate::variant::Variant;
use crate::Error;
use std::cmp::max;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;
use std::sync::Arc;
use unicase::UniCase;

/// A MOO string. Indexing and length are in Unicode code points, and the
/// default comparison, ordering and hashing are case-insensitive.
#[derive(Clone)]
pub struct Str(Arc<String>);

impl Str {
    pub fn mk_str(s: &str) -> Self {
        Str(Arc::new(s.into()))
    }

    pub fn mk_string(s: String) -> Self {
        Str(Arc::new(s))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in code points, not bytes.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn append(&self, other: &Str) -> Var {
        let mut s = self.0.as_ref().clone();
        s.push_str(other.as_str());
        Var::from_variant(Variant::Str(Str(Arc::new(s))))
    }

    /// The `index`th (0-based) character, as a one-character string.
    pub fn index(&self, index: usize) -> Result<Var, Error> {
        let Some(c) = self.0.chars().nth(index) else {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "index {} out of range for string of length {}",
                    index + 1,
                    self.len()
                )
            }));
        };
        Ok(Var::mk_str(&c.to_string()))
    }

    /// Replace the `index`th (0-based) character. The replacement must itself
    /// be a single-character string.
    pub fn index_set(&self, index: usize, value: &Var) -> Result<Var, Error> {
        let Variant::Str(value) = value.variant() else {
            return Err(E_TYPE.msg("string index assignment requires a string"));
        };
        if value.len() != 1 {
            return Err(E_INVARG.msg("string index assignment requires a single character"));
        }
        let len = self.len();
        if index >= len {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "index {} out of range for string of length {}",
                    index + 1,
                    len
                )
            }));
        }
        let s: String = self
            .0
            .chars()
            .enumerate()
            .flat_map(|(i, c)| {
                if i == index {
                    value.as_str().chars().collect::<Vec<_>>()
                } else {
                    vec![c]
                }
            })
            .collect();
        Ok(Var::mk_string(s))
    }

    /// Substring over the inclusive 0-based range `from..=to`. An empty range
    /// (to < from) is the empty string, matching MOO's `s[2..1]` behavior.
    pub fn range(&self, from: isize, to: isize) -> Result<Var, Error> {
        if to < from {
            return Ok(Var::mk_str(""));
        }
        let len = self.len() as isize;
        let start = max(from, 0);
        if start >= len || to >= len {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "range {}..{} out of bounds for string of length {}",
                    from + 1,
                    to + 1,
                    len
                )
            }));
        }
        let s: String = self
            .0
            .chars()
            .skip(start as usize)
            .take((to - start + 1) as usize)
            .collect();
        Ok(Var::mk_string(s))
    }

    /// Splice `with` over the inclusive 0-based range `from..=to`.
    pub fn range_set(&self, from: isize, to: isize, with: &Var) -> Result<Var, Error> {
        let Variant::Str(with) = with.variant() else {
            return Err(E_TYPE.msg("string range assignment requires a string"));
        };

        let len = self.len() as isize;
        let from = max(from, 0);
        if from > len {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "range start {} out of bounds for string of length {}",
                    from + 1,
                    len
                )
            }));
        }

        let head = self.0.chars().take(from as usize);
        let tail = self.0.chars().skip(max(to + 1, from) as usize);
        let s: String = head.chain(with.as_str().chars()).chain(tail).collect();
        Ok(Var::mk_string(s))
    }
}

impl Display for Str {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Debug for Str {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

// MOO strings compare case-insensitively unless an explicit case-sensitive
// comparison is requested.
impl PartialEq for Str {
    fn eq(&self, other: &Self) -> bool {
        UniCase::new(self.as_str()) == UniCase::new(other.as_str())
    }
}

impl Eq for Str {}

impl PartialOrd for Str {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Str {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str()
            .to_lowercase()
            .cmp(&other.as_str().to_lowercase())
    }
}

impl Hash for Str {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        UniCase::new(self.as_str()).hash(state)
    }
}

impl From<&str> for Str {
    fn from(s: &str) -> Self {
        Str::mk_str(s)
    }
}

impl From<String> for Str {
    fn from(s: String) -> Self {
        Str::mk_string(s)
    }
}

#[cfg(test)]
mod tests {
    use crate::var::{v_int, v_str, Var};
    use crate::ErrorCode::E_RANGE;
    use crate::IndexMode;

    #[test]
    fn test_string_equality() {
        let s1 = v_str("hello");
        let s2 = v_str("Hello");
        let s3 = v_str("world");
        assert_eq!(s1, s2);
        assert_ne!(s1, s3);
        assert!(!s1.eq_case_sensitive(&s2));
    }

    #[test]
    fn test_string_index() {
        let s = v_str("hello");
        let r = s.index(&v_int(2), IndexMode::OneBased).unwrap();
        assert_eq!(r, v_str("e"));

        let fail = s.index(&v_int(6), IndexMode::OneBased);
        assert_eq!(fail.unwrap_err(), E_RANGE);
    }

    #[test]
    fn test_string_index_set() {
        let s = v_str("hello");
        let r = s
            .index_set(&v_int(2), &v_str("a"), IndexMode::OneBased)
            .unwrap();
        assert_eq!(r, v_str("hallo"));

        let fail = s.index_set(&v_int(10), &v_str("a"), IndexMode::OneBased);
        assert_eq!(fail.unwrap_err(), E_RANGE);
    }

    #[test]
    fn test_string_slice() {
        let s = v_str("hello world");
        let r = s.range(&v_int(2), &v_int(7), IndexMode::OneBased).unwrap();
        assert_eq!(r, v_str("ello w"));

        // Empty range is the empty string, not E_RANGE.
        let r = s.range(&v_int(2), &v_int(1), IndexMode::OneBased).unwrap();
        assert_eq!(r, v_str(""));
    }

    #[test]
    fn test_string_range_set() {
        // Known MOO behavior for interior replacement.
        let base = v_str("mandalorian");
        let r = base
            .range_set(&v_int(4), &v_int(7), &v_str("bozo"), IndexMode::OneBased)
            .unwrap();
        assert_eq!(r, v_str("manbozorian"));

        // s[1..0] = "x" inserts at the front.
        let base = v_str("12345");
        let r = base
            .range_set(&v_int(1), &v_int(0), &v_str("x"), IndexMode::OneBased)
            .unwrap();
        assert_eq!(r, v_str("x12345"));
    }

    #[test]
    fn test_string_code_points() {
        let s = v_str("héllo");
        assert_eq!(s.len().unwrap(), 5);
        let r = s.index(&v_int(2), IndexMode::OneBased).unwrap();
        assert_eq!(r, v_str("é"));
    }

    #[test]
    fn test_string_append() {
        let s = v_str("Hello, ");
        let r = Var::str_concat(&s, &v_str("world")).unwrap();
        assert_eq!(r, v_str("Hello, world"));
    }
}
