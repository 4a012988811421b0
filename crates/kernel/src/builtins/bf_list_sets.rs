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
use etamoo_compiler::offset_for_builtin;
use etamoo_var::ErrorCode::{E_RANGE, E_TYPE};
use etamoo_var::{v_int, List, Var};

fn list_arg(v: &Var) -> Result<&List, BfErr> {
    v.as_list().ok_or(BfErr::Code(E_TYPE))
}

fn int_arg(v: &Var) -> Result<i64, BfErr> {
    v.as_int().ok_or(BfErr::Code(E_TYPE))
}

fn bf_length(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.args[0]
        .len()
        .map(|l| Ret(v_int(l as i64)))
        .map_err(BfErr::Raise)
}

/// is_member uses case-sensitive ("indistinguishable") equality, unlike the
/// `in` operator.
fn bf_is_member(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let value = &bf_args.args[0];
    let list = list_arg(&bf_args.args[1])?;
    let idx = list
        .index_in(value, true)
        .map(|i| i as i64 + 1)
        .unwrap_or(0);
    Ok(Ret(v_int(idx)))
}

/// listinsert(list, value [, index]): insert before `index`, default the
/// front. An index outside [1..length+1] is E_RANGE.
fn bf_listinsert(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let list = list_arg(&bf_args.args[0])?;
    let value = &bf_args.args[1];
    let index = match bf_args.args.get(2) {
        Some(v) => int_arg(v)?,
        None => 1,
    };
    if index < 1 || index > list.len() as i64 + 1 {
        return Err(BfErr::Code(E_RANGE));
    }
    Ok(Ret(list.insert((index - 1) as usize, value)))
}

/// listappend(list, value [, index]): insert after `index`, default the end.
/// An index outside [0..length] is E_RANGE.
fn bf_listappend(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let list = list_arg(&bf_args.args[0])?;
    let value = &bf_args.args[1];
    let index = match bf_args.args.get(2) {
        Some(v) => int_arg(v)?,
        None => list.len() as i64,
    };
    if index < 0 || index > list.len() as i64 {
        return Err(BfErr::Code(E_RANGE));
    }
    Ok(Ret(list.insert(index as usize, value)))
}

fn bf_listdelete(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let list = list_arg(&bf_args.args[0])?;
    let index = int_arg(&bf_args.args[1])?;
    if index < 1 || index > list.len() as i64 {
        return Err(BfErr::Code(E_RANGE));
    }
    list.remove_at((index - 1) as usize)
        .map(Ret)
        .map_err(BfErr::Raise)
}

fn bf_listset(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let list = list_arg(&bf_args.args[0])?;
    let value = &bf_args.args[1];
    let index = int_arg(&bf_args.args[2])?;
    if index < 1 || index > list.len() as i64 {
        return Err(BfErr::Code(E_RANGE));
    }
    list.index_set((index - 1) as usize, value)
        .map(Ret)
        .map_err(BfErr::Raise)
}

fn bf_setadd(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let list = list_arg(&bf_args.args[0])?;
    Ok(Ret(list.set_add(&bf_args.args[1])))
}

fn bf_setremove(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let list = list_arg(&bf_args.args[0])?;
    Ok(Ret(list.set_remove(&bf_args.args[1])))
}

pub(crate) fn register_bf_list_sets(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("length")] = bf_length;
    builtins[offset_for_builtin("is_member")] = bf_is_member;
    builtins[offset_for_builtin("listinsert")] = bf_listinsert;
    builtins[offset_for_builtin("listappend")] = bf_listappend;
    builtins[offset_for_builtin("listdelete")] = bf_listdelete;
    builtins[offset_for_builtin("listset")] = bf_listset;
    builtins[offset_for_builtin("setadd")] = bf_setadd;
    builtins[offset_for_builtin("setremove")] = bf_setremove;
}
