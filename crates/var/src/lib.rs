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

mod arith;
mod error;
mod list;
mod literal;
mod obj;
pub mod program;
mod string;
mod symbol;
#[allow(clippy::module_inception)]
mod var;
mod variant;

pub use error::{Error, ErrorCode, ErrorCode::*};
pub use list::List;
pub use literal::{to_literal, to_string, value_bytes, value_hash};
pub use obj::{Obj, AMBIGUOUS, FAILED_MATCH, NOTHING, SYSTEM_OBJECT};
pub use string::Str;
pub use symbol::Symbol;
pub use var::{
    compare, v_bool_int, v_empty_list, v_empty_str, v_err, v_float, v_int, v_list, v_list_iter,
    v_none, v_obj, v_objid, v_str, v_string, Var,
};
pub use variant::Variant;

/// Integer encoding of types as exposed to MOO code by `typeof()`, matching the
/// numbering of a LambdaMOO textdump.
#[repr(i8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Hash)]
#[allow(non_camel_case_types)]
pub enum VarType {
    TYPE_INT = 0,
    TYPE_OBJ = 1,
    TYPE_STR = 2,
    TYPE_ERR = 3,
    TYPE_LIST = 4,
    TYPE_NONE = 6, // in uninitialized MOO variables
    TYPE_FLOAT = 9,
    /// Meta-type used only in builtin signatures: any value.
    TYPE_ANY = -1,
    /// Meta-type used only in builtin signatures: int or float.
    TYPE_NUMERIC = -2,
}

impl VarType {
    pub fn to_literal(&self) -> &str {
        match self {
            VarType::TYPE_INT => "INT",
            VarType::TYPE_OBJ => "OBJ",
            VarType::TYPE_STR => "STR",
            VarType::TYPE_ERR => "ERR",
            VarType::TYPE_LIST => "LIST",
            VarType::TYPE_NONE => "NONE",
            VarType::TYPE_FLOAT => "FLOAT",
            VarType::TYPE_ANY => "ANY",
            VarType::TYPE_NUMERIC => "NUM",
        }
    }

    /// Does a value of type `of` satisfy an argument slot declared as `self`?
    pub fn accepts(&self, of: VarType) -> bool {
        match self {
            VarType::TYPE_ANY => true,
            VarType::TYPE_NUMERIC => {
                matches!(of, VarType::TYPE_INT | VarType::TYPE_FLOAT)
            }
            t => *t == of,
        }
    }
}

/// Sequence index modes: 0 or 1 indexed. Containers index from 0 internally,
/// MOO code indexes from 1, so sequence entry points take the caller's choice.
#[derive(Clone, Copy, Debug)]
pub enum IndexMode {
    ZeroBased,
    OneBased,
}

impl IndexMode {
    pub fn adjust_i64(&self, index: i64) -> isize {
        match self {
            IndexMode::ZeroBased => index as isize,
            IndexMode::OneBased => (index - 1) as isize,
        }
    }

    pub fn reverse_adjust_isize(&self, index: isize) -> isize {
        match self {
            IndexMode::ZeroBased => index,
            IndexMode::OneBased => index + 1,
        }
    }
}
