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

//! The textual views of a value: `toliteral()`, `tostr()`, `value_bytes()`
//! and `value_hash()`.

use crate::var::Var;
use crate::variant::Variant;
use md5::{Digest, Md5};
use std::fmt::Write;

/// Format a float the way the server prints them: always distinguishable from
/// an integer literal.
fn float_literal(f: f64) -> String {
    let mut s = format!("{f}");
    if !s.contains('.') && !s.contains('e') && !s.contains('E') {
        s.push_str(".0");
    }
    s
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// The literal representation: what you would type in a program to produce
/// this value. Parses back to an `equal` value.
pub fn to_literal(v: &Var) -> String {
    match v.variant() {
        Variant::None => "0".to_string(),
        Variant::Int(i) => i.to_string(),
        Variant::Float(f) => float_literal(*f),
        Variant::Obj(o) => format!("{o}"),
        Variant::Str(s) => quote_str(s.as_str()),
        Variant::Err(e) => e.code.name().to_string(),
        Variant::List(l) => {
            let mut out = String::new();
            out.push('{');
            for (i, item) in l.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write!(out, "{}", to_literal(&item)).unwrap();
            }
            out.push('}');
            out
        }
    }
}

/// The `tostr()` view: strings print bare, errors print their message, and
/// lists collapse to the placeholder "{list}".
pub fn to_string(v: &Var) -> String {
    match v.variant() {
        Variant::None => "".to_string(),
        Variant::Int(i) => i.to_string(),
        Variant::Float(f) => float_literal(*f),
        Variant::Obj(o) => format!("{o}"),
        Variant::Str(s) => s.as_str().to_string(),
        Variant::Err(e) => e.message(),
        Variant::List(_) => "{list}".to_string(),
    }
}

/// A rough in-memory byte count, in the spirit of LambdaMOO's `value_bytes`.
pub fn value_bytes(v: &Var) -> usize {
    let base = std::mem::size_of::<Var>();
    match v.variant() {
        Variant::Str(s) => base + s.as_str().len(),
        Variant::List(l) => l.iter().map(|e| value_bytes(&e)).sum::<usize>() + base,
        Variant::Err(e) => base + e.msg.as_ref().map(|m| m.len()).unwrap_or(0),
        _ => base,
    }
}

/// MD5 of the literal representation, uppercase hex, as `string_hash` would
/// produce over `toliteral(v)`.
pub fn value_hash(v: &Var) -> String {
    let literal = to_literal(v);
    let digest = Md5::digest(literal.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest {
        write!(out, "{b:02X}").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::var::{v_err, v_float, v_int, v_list, v_objid, v_str};
    use crate::ErrorCode::E_PERM;

    #[test]
    fn test_literals() {
        assert_eq!(to_literal(&v_int(42)), "42");
        assert_eq!(to_literal(&v_float(3.0)), "3.0");
        assert_eq!(to_literal(&v_float(3.25)), "3.25");
        assert_eq!(to_literal(&v_objid(2)), "#2");
        assert_eq!(to_literal(&v_str("hi \"there\"")), r#""hi \"there\"""#);
        assert_eq!(to_literal(&v_err(E_PERM)), "E_PERM");
        assert_eq!(
            to_literal(&v_list(&[v_int(1), v_str("a"), v_list(&[])])),
            r#"{1, "a", {}}"#
        );
    }

    #[test]
    fn test_tostr() {
        assert_eq!(to_string(&v_str("hi")), "hi");
        assert_eq!(to_string(&v_err(E_PERM)), "Permission denied");
        assert_eq!(to_string(&v_list(&[v_int(1)])), "{list}");
    }

    #[test]
    fn test_value_hash_is_literal_hash() {
        // MD5("42") spelled out, so a regression here means the literal
        // representation changed.
        assert_eq!(value_hash(&v_int(42)), "A1D0C6E83F027327D8461063F4AC58A6");
    }
}
