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

use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction};
use crate::regexp::{regex_match, regex_rmatch, MatchSpans};
use etamoo_compiler::offset_for_builtin;
use etamoo_var::ErrorCode::{E_INVARG, E_TYPE};
use etamoo_var::{v_int, v_list, v_str, v_string, Var, Variant};
use md5::{Digest, Md5};
use std::fmt::Write;

fn str_arg(v: &Var) -> Result<&str, BfErr> {
    match v.variant() {
        Variant::Str(s) => Ok(s.as_str()),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

/// strsub(subject, what, with [, case-matters])
fn bf_strsub(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let subject = str_arg(&bf_args.args[0])?;
    let what = str_arg(&bf_args.args[1])?;
    let with = str_arg(&bf_args.args[2])?;
    let case_matters = bf_args.args.get(3).map(|v| v.is_true()).unwrap_or(false);

    if what.is_empty() {
        return Ok(Ret(v_str(subject)));
    }

    let mut result = String::with_capacity(subject.len());
    let mut rest = subject;
    while !rest.is_empty() {
        let found = if case_matters {
            rest.find(what)
        } else {
            rest.to_lowercase().find(&what.to_lowercase())
        };
        match found {
            Some(pos) => {
                // `pos` is a byte offset valid in both casings because
                // to_lowercase on ASCII preserves lengths; for the rare
                // non-ASCII case folding mismatch, fall back to no match.
                if !rest.is_char_boundary(pos) {
                    result.push_str(rest);
                    break;
                }
                result.push_str(&rest[..pos]);
                result.push_str(with);
                let after = pos + what.len();
                if after > rest.len() || !rest.is_char_boundary(after) {
                    break;
                }
                rest = &rest[after..];
            }
            None => {
                result.push_str(rest);
                break;
            }
        }
    }
    Ok(Ret(v_string(result)))
}

/// 1-based code-point position of `what` in `subject`, 0 if absent.
fn str_index_of(subject: &str, what: &str, case_matters: bool) -> i64 {
    let (s, w) = if case_matters {
        (subject.to_string(), what.to_string())
    } else {
        (subject.to_lowercase(), what.to_lowercase())
    };
    match s.find(&w) {
        Some(byte_pos) => s[..byte_pos].chars().count() as i64 + 1,
        None => 0,
    }
}

fn str_rindex_of(subject: &str, what: &str, case_matters: bool) -> i64 {
    let (s, w) = if case_matters {
        (subject.to_string(), what.to_string())
    } else {
        (subject.to_lowercase(), what.to_lowercase())
    };
    match s.rfind(&w) {
        Some(byte_pos) => s[..byte_pos].chars().count() as i64 + 1,
        None => 0,
    }
}

fn bf_index(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let subject = str_arg(&bf_args.args[0])?;
    let what = str_arg(&bf_args.args[1])?;
    let case_matters = bf_args.args.get(2).map(|v| v.is_true()).unwrap_or(false);
    Ok(Ret(v_int(str_index_of(subject, what, case_matters))))
}

fn bf_rindex(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let subject = str_arg(&bf_args.args[0])?;
    let what = str_arg(&bf_args.args[1])?;
    let case_matters = bf_args.args.get(2).map(|v| v.is_true()).unwrap_or(false);
    Ok(Ret(v_int(str_rindex_of(subject, what, case_matters))))
}

/// strcmp is the case-sensitive comparison; the `<` operator et al are not.
fn bf_strcmp(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let a = str_arg(&bf_args.args[0])?;
    let b = str_arg(&bf_args.args[1])?;
    Ok(Ret(v_int(match a.cmp(b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    })))
}

fn is_binary_printable(b: u8) -> bool {
    (b' '..=b'~').contains(&b) && b != b'~'
}

/// Parse a MOO binary string (`~HH` escapes) into raw bytes. Malformed
/// escapes -- a trailing `~`, or non-hex digits -- are E_INVARG.
pub(crate) fn decode_binary_string(s: &str) -> Result<Vec<u8>, BfErr> {
    let mut out = Vec::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            let (Some(h), Some(l)) = (chars.next(), chars.next()) else {
                return Err(BfErr::Raise(
                    E_INVARG.msg("truncated ~ escape in binary string"),
                ));
            };
            let (Some(h), Some(l)) = (h.to_digit(16), l.to_digit(16)) else {
                return Err(BfErr::Raise(
                    E_INVARG.msg("invalid hex digits in binary string"),
                ));
            };
            out.push((h * 16 + l) as u8);
        } else if c.is_ascii() && c != '~' {
            out.push(c as u8);
        } else {
            return Err(BfErr::Raise(
                E_INVARG.msg("non-ASCII character in binary string"),
            ));
        }
    }
    Ok(out)
}

/// Render raw bytes as a MOO binary string; everything outside printable
/// ASCII (and `~` itself) becomes an uppercase `~HH` escape.
pub(crate) fn encode_binary_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for b in bytes {
        if is_binary_printable(*b) {
            out.push(*b as char);
        } else {
            write!(out, "~{b:02X}").unwrap();
        }
    }
    out
}

/// decode_binary(string [, fully])
fn bf_decode_binary(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let s = str_arg(&bf_args.args[0])?;
    let fully = bf_args.args.get(1).map(|v| v.is_true()).unwrap_or(false);
    let bytes = decode_binary_string(s)?;

    if fully {
        let items: Vec<Var> = bytes.iter().map(|b| v_int(*b as i64)).collect();
        return Ok(Ret(v_list(&items)));
    }

    // Printable runs come back as strings, everything else as integers.
    let mut items = vec![];
    let mut run = String::new();
    for b in bytes {
        if is_binary_printable(b) {
            run.push(b as char);
        } else {
            if !run.is_empty() {
                items.push(v_string(std::mem::take(&mut run)));
            }
            items.push(v_int(b as i64));
        }
    }
    if !run.is_empty() {
        items.push(v_string(run));
    }
    Ok(Ret(v_list(&items)))
}

fn encode_binary_item(v: &Var, out: &mut Vec<u8>) -> Result<(), BfErr> {
    match v.variant() {
        Variant::Int(i) => {
            if !(0..=255).contains(i) {
                return Err(BfErr::Code(E_INVARG));
            }
            out.push(*i as u8);
        }
        Variant::Str(s) => {
            for c in s.as_str().chars() {
                if !c.is_ascii() {
                    return Err(BfErr::Code(E_INVARG));
                }
                out.push(c as u8);
            }
        }
        Variant::List(l) => {
            for item in l.iter() {
                encode_binary_item(&item, out)?;
            }
        }
        _ => return Err(BfErr::Code(E_TYPE)),
    }
    Ok(())
}

fn bf_encode_binary(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let mut bytes = vec![];
    for arg in &bf_args.args {
        encode_binary_item(arg, &mut bytes)?;
    }
    Ok(Ret(v_string(encode_binary_string(&bytes))))
}

fn match_result(subject: &str, m: MatchSpans) -> Var {
    let subs: Vec<Var> = m
        .subs
        .iter()
        .map(|(s, e)| v_list(&[v_int(*s), v_int(*e)]))
        .collect();
    v_list(&[
        v_int(m.start),
        v_int(m.end),
        v_list(&subs),
        v_str(subject),
    ])
}

fn bf_match(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let subject = str_arg(&bf_args.args[0])?;
    let pattern = str_arg(&bf_args.args[1])?;
    let case_matters = bf_args.args.get(2).map(|v| v.is_true()).unwrap_or(false);
    match regex_match(subject, pattern, case_matters).map_err(BfErr::Raise)? {
        Some(m) => Ok(Ret(match_result(subject, m))),
        None => Ok(Ret(v_list(&[]))),
    }
}

fn bf_rmatch(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let subject = str_arg(&bf_args.args[0])?;
    let pattern = str_arg(&bf_args.args[1])?;
    let case_matters = bf_args.args.get(2).map(|v| v.is_true()).unwrap_or(false);
    match regex_rmatch(subject, pattern, case_matters).map_err(BfErr::Raise)? {
        Some(m) => Ok(Ret(match_result(subject, m))),
        None => Ok(Ret(v_list(&[]))),
    }
}

/// substitute(template, match-result): %1..%9 are the capture groups, %0 the
/// whole match, %% a literal percent.
fn bf_substitute(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let template = str_arg(&bf_args.args[0])?;
    let Variant::List(subs) = bf_args.args[1].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if subs.len() != 4 {
        return Err(BfErr::Code(E_INVARG));
    }
    let (start, end, groups, subject) = (
        subs.index(0).unwrap(),
        subs.index(1).unwrap(),
        subs.index(2).unwrap(),
        subs.index(3).unwrap(),
    );
    let (Variant::Int(start), Variant::Int(end)) = (start.variant(), end.variant()) else {
        return Err(BfErr::Code(E_INVARG));
    };
    let Variant::Str(subject) = subject.variant() else {
        return Err(BfErr::Code(E_INVARG));
    };
    let Variant::List(groups) = groups.variant() else {
        return Err(BfErr::Code(E_INVARG));
    };
    let subject_chars: Vec<char> = subject.as_str().chars().collect();

    let extract = |s: i64, e: i64| -> Result<String, BfErr> {
        if e < s {
            return Ok(String::new());
        }
        if s < 1 || e as usize > subject_chars.len() {
            return Err(BfErr::Code(E_INVARG));
        }
        Ok(subject_chars[(s - 1) as usize..e as usize].iter().collect())
    };

    let mut result = String::new();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => result.push('%'),
            Some(d @ '0'..='9') => {
                let group = d.to_digit(10).unwrap() as usize;
                let (s, e) = if group == 0 {
                    (*start, *end)
                } else {
                    let Some(pair) = groups.index(group - 1).ok() else {
                        return Err(BfErr::Code(E_INVARG));
                    };
                    let Variant::List(pair) = pair.variant() else {
                        return Err(BfErr::Code(E_INVARG));
                    };
                    let (Some(s), Some(e)) = (
                        pair.index(0).ok().and_then(|v| v.as_int()),
                        pair.index(1).ok().and_then(|v| v.as_int()),
                    ) else {
                        return Err(BfErr::Code(E_INVARG));
                    };
                    (s, e)
                };
                result.push_str(&extract(s, e)?);
            }
            _ => return Err(BfErr::Code(E_INVARG)),
        }
    }
    Ok(Ret(v_string(result)))
}

/// crypt(text [, salt]): the legacy unix crypt(3), preserved for password
/// compatibility, not for strength.
fn bf_crypt(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let text = str_arg(&bf_args.args[0])?;
    let salt = match bf_args.args.get(1) {
        Some(salt) => str_arg(salt)?.to_string(),
        None => {
            const SALTS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789./";
            let mut rng = rand::rng();
            let a = SALTS[rand::Rng::random_range(&mut rng, 0..SALTS.len())] as char;
            let b = SALTS[rand::Rng::random_range(&mut rng, 0..SALTS.len())] as char;
            format!("{a}{b}")
        }
    };
    match pwhash::unix::crypt(text, &salt) {
        Ok(hashed) => Ok(Ret(v_string(hashed))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn md5_hex(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let mut out = String::with_capacity(32);
    for b in digest {
        write!(out, "{b:02X}").unwrap();
    }
    out
}

fn bf_string_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let s = str_arg(&bf_args.args[0])?;
    Ok(Ret(v_string(md5_hex(s.as_bytes()))))
}

fn bf_binary_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let s = str_arg(&bf_args.args[0])?;
    let bytes = decode_binary_string(s)?;
    Ok(Ret(v_string(md5_hex(&bytes))))
}

pub(crate) fn register_bf_strings(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("strsub")] = bf_strsub;
    builtins[offset_for_builtin("index")] = bf_index;
    builtins[offset_for_builtin("rindex")] = bf_rindex;
    builtins[offset_for_builtin("strcmp")] = bf_strcmp;
    builtins[offset_for_builtin("decode_binary")] = bf_decode_binary;
    builtins[offset_for_builtin("encode_binary")] = bf_encode_binary;
    builtins[offset_for_builtin("match")] = bf_match;
    builtins[offset_for_builtin("rmatch")] = bf_rmatch;
    builtins[offset_for_builtin("substitute")] = bf_substitute;
    builtins[offset_for_builtin("crypt")] = bf_crypt;
    builtins[offset_for_builtin("string_hash")] = bf_string_hash;
    builtins[offset_for_builtin("binary_hash")] = bf_binary_hash;
}

#[cfg(test)]
mod tests {
    use super::{decode_binary_string, encode_binary_string};

    #[test]
    fn test_binary_round_trip() {
        let bytes = vec![0u8, b'f', b'o', b'o', 255, b'~', 10];
        let encoded = encode_binary_string(&bytes);
        assert_eq!(encoded, "~00foo~FF~7E~0A");
        assert_eq!(decode_binary_string(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_binary_malformed() {
        assert!(decode_binary_string("foo~").is_err());
        assert!(decode_binary_string("foo~1").is_err());
        assert!(decode_binary_string("foo~zz").is_err());
    }
}
