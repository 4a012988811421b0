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

use crate::error::ErrorCode::{E_RANGE, E_TYPE};
use crate::var::{v_list_iter, Var};
use crate::Error;
use std::cmp::{max, min, Ordering};
use std::fmt::{Debug, Formatter};
use std::hash::Hash;

/// A MOO list: a persistent vector of values. Every "mutation" returns a new
/// list; other references to the original are never affected.
#[derive(Clone)]
#[repr(transparent)]
pub struct List(imbl::Vector<Var>);

impl List {
    pub fn mk_list(values: &[Var]) -> List {
        List(imbl::Vector::from(values.to_vec()))
    }

    pub fn from_iter<IT: IntoIterator<Item = Var>>(values: IT) -> List {
        List(values.into_iter().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.iter().cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 0-based offset of the first element equal to `value`, if any.
    pub fn index_in(&self, value: &Var, case_sensitive: bool) -> Option<usize> {
        self.0.iter().position(|v| {
            if case_sensitive {
                v.eq_case_sensitive(value)
            } else {
                v == value
            }
        })
    }

    pub fn contains(&self, value: &Var, case_sensitive: bool) -> bool {
        self.index_in(value, case_sensitive).is_some()
    }

    pub fn index(&self, index: usize) -> Result<Var, Error> {
        if index >= self.len() {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "attempt to index {} in list of length {}",
                    index + 1,
                    self.len()
                )
            }));
        }
        Ok(self.0[index].clone())
    }

    pub fn index_set(&self, index: usize, value: &Var) -> Result<Var, Error> {
        if index >= self.len() {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "attempt to set index {} in list of length {}",
                    index + 1,
                    self.len()
                )
            }));
        }
        Ok(Var::from_list(List(self.0.update(index, value.clone()))))
    }

    /// Insert before the 0-based `index`; an index at or past the end appends.
    pub fn insert(&self, index: usize, value: &Var) -> Var {
        let index = min(index, self.len());
        let mut new = self.0.clone();
        new.insert(index, value.clone());
        Var::from_list(List(new))
    }

    pub fn remove_at(&self, index: usize) -> Result<Var, Error> {
        if index >= self.len() {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "attempt to delete index {} in list of length {}",
                    index + 1,
                    self.len()
                )
            }));
        }
        let mut new = self.0.clone();
        new.remove(index);
        Ok(Var::from_list(List(new)))
    }

    pub fn push(&self, value: &Var) -> Var {
        let mut new = self.0.clone();
        new.push_back(value.clone());
        Var::from_list(List(new))
    }

    pub fn append(&self, other: &Var) -> Result<Var, Error> {
        let Some(other) = other.as_list() else {
            return Err(E_TYPE.msg("attempt to append non-list"));
        };
        let mut new = self.0.clone();
        new.append(other.0.clone());
        Ok(Var::from_list(List(new)))
    }

    /// Sub-list over the inclusive 0-based range `from..=to`. An empty range
    /// yields the empty list.
    pub fn range(&self, from: isize, to: isize) -> Result<Var, Error> {
        if to < from {
            return Ok(Var::mk_list(&[]));
        }
        let len = self.len() as isize;
        if from > len + 1 || to >= len {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "attempt to access out of bounds range {}..{} in list of length {}",
                    from + 1,
                    to + 1,
                    len
                )
            }));
        }
        let from = max(from, 0) as usize;
        Ok(v_list_iter(
            self.iter().skip(from).take(to as usize - from + 1),
        ))
    }

    /// Splice `with` over the inclusive 0-based range `from..=to`.
    pub fn range_set(&self, from: isize, to: isize, with: &Var) -> Result<Var, Error> {
        let Some(with) = with.as_list() else {
            return Err(E_TYPE.msg("attempt to assign non-list to list range"));
        };
        let len = self.len() as isize;
        if from < 0 {
            return Err(
                E_RANGE.with_msg(|| format!("attempt to set range with negative index {from}"))
            );
        }
        if from > len {
            return Err(E_RANGE.with_msg(|| {
                format!(
                    "attempt to set range starting at {} in list of length {}",
                    from + 1,
                    len
                )
            }));
        }
        // MOO tolerates a range end past the end of the list; the tail past
        // `to` is just empty in that case.
        let head = self.iter().take(from as usize);
        let tail = self.iter().skip(max(to + 1, from) as usize);
        Ok(v_list_iter(head.chain(with.iter()).chain(tail)))
    }

    /// Add `item` to the list, but only if it's not already there.
    pub fn set_add(&self, item: &Var) -> Var {
        if self.contains(item, false) {
            return Var::from_list(self.clone());
        }
        self.push(item)
    }

    /// Remove the first found instance of `item` from the list.
    pub fn set_remove(&self, item: &Var) -> Var {
        match self.index_in(item, false) {
            Some(idx) => {
                let mut new = self.0.clone();
                new.remove(idx);
                Var::from_list(List(new))
            }
            None => Var::from_list(self.clone()),
        }
    }
}

impl Debug for List {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for List {}

impl PartialOrd for List {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for List {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().cmp(other.0.iter())
    }
}

impl Hash for List {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for v in self.0.iter() {
            v.hash(state)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::var::{v_int, v_list, v_str};
    use crate::ErrorCode::E_RANGE;
    use crate::IndexMode;

    #[test]
    fn test_list_value_semantics() {
        let l = v_list(&[v_int(1), v_int(2), v_int(3)]);
        let l2 = l
            .index_set(&v_int(2), &v_int(42), IndexMode::OneBased)
            .unwrap();
        // The original is untouched.
        assert_eq!(l, v_list(&[v_int(1), v_int(2), v_int(3)]));
        assert_eq!(l2, v_list(&[v_int(1), v_int(42), v_int(3)]));
    }

    #[test]
    fn test_list_index_range_errors() {
        let l = v_list(&[v_int(1), v_int(2)]);
        assert_eq!(
            l.index(&v_int(3), IndexMode::OneBased).unwrap_err(),
            E_RANGE
        );
        assert_eq!(
            l.index(&v_int(0), IndexMode::OneBased).unwrap_err(),
            E_RANGE
        );
    }

    #[test]
    fn test_list_slice() {
        let l = v_list(&[v_int(1), v_int(2), v_int(3), v_int(4)]);
        let r = l.range(&v_int(2), &v_int(3), IndexMode::OneBased).unwrap();
        assert_eq!(r, v_list(&[v_int(2), v_int(3)]));
    }

    #[test]
    fn test_set_operations() {
        let l = v_list(&[v_str("a"), v_str("b")]);
        let l = l.set_add(&v_str("B")).unwrap();
        // "B" is already a member, case-insensitively.
        assert_eq!(l.len().unwrap(), 2);
        let l = l.set_remove(&v_str("A")).unwrap();
        assert_eq!(l, v_list(&[v_str("b")]));
    }

    #[test]
    fn test_range_set_tolerates_long_end() {
        // foo = {}; foo[1..2] = {1, 2, 3} => {1, 2, 3}
        let l = v_list(&[]);
        let r = l
            .range_set(
                &v_int(1),
                &v_int(2),
                &v_list(&[v_int(1), v_int(2), v_int(3)]),
                IndexMode::OneBased,
            )
            .unwrap();
        assert_eq!(r, v_list(&[v_int(1), v_int(2), v_int(3)]));
    }
}
