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
use crate::builtins::{world_state_bf_err, BfCallState, BfErr, BfRet, BuiltinFunction};
use etamoo_common::model::{prop_flags_string, PropAttrs, PropFlag, WorldState};
use etamoo_compiler::offset_for_builtin;
use etamoo_var::ErrorCode::{E_INVARG, E_TYPE};
use etamoo_var::{v_list, v_none, v_obj, v_str, Obj, Symbol, Var, Variant};

fn obj_arg(v: &Var) -> Result<Obj, BfErr> {
    v.as_obj().ok_or(BfErr::Code(E_TYPE))
}

fn propname_arg(v: &Var) -> Result<Symbol, BfErr> {
    match v.variant() {
        Variant::Str(s) => Ok(Symbol::mk(s.as_str())),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

/// Parse the `{owner, perms [, new-name]}` info list shared by
/// set_property_info and add_property.
fn prop_info_args(info: &Var) -> Result<PropAttrs, BfErr> {
    let Variant::List(info) = info.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() < 2 || info.len() > 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let Some(owner) = info.index(0).unwrap().as_obj() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let perms = info.index(1).unwrap();
    let Variant::Str(perms) = perms.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let Some(flags) = PropFlag::parse_str(perms.as_str()) else {
        return Err(BfErr::Code(E_INVARG));
    };
    let name = match info.index(2) {
        Ok(name) => {
            let Variant::Str(name) = name.variant() else {
                return Err(BfErr::Code(E_TYPE));
            };
            Some(Symbol::mk(name.as_str()))
        }
        Err(_) => None,
    };
    Ok(PropAttrs {
        name,
        owner: Some(owner),
        flags: Some(flags),
        value: None,
    })
}

fn bf_properties(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let props = bf_args
        .world_state
        .properties(bf_args.task_perms_who(), obj)
        .map_err(world_state_bf_err)?;
    let names: Vec<Var> = props.iter().map(|p| v_str(p.name().as_str())).collect();
    Ok(Ret(v_list(&names)))
}

fn bf_property_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let pname = propname_arg(&bf_args.args[1])?;
    let (_, perms) = bf_args
        .world_state
        .get_property_info(bf_args.task_perms_who(), obj, pname)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_list(&[
        v_obj(perms.owner),
        v_str(&prop_flags_string(perms.flags)),
    ])))
}

fn bf_set_property_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let pname = propname_arg(&bf_args.args[1])?;
    let attrs = prop_info_args(&bf_args.args[2])?;
    bf_args
        .world_state
        .set_property_info(bf_args.task_perms_who(), obj, pname, attrs)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

fn bf_add_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let pname = propname_arg(&bf_args.args[1])?;
    let value = bf_args.args[2].clone();
    let attrs = prop_info_args(&bf_args.args[3])?;
    if attrs.name.is_some() {
        // add_property takes only {owner, perms}.
        return Err(BfErr::Code(E_INVARG));
    }
    bf_args
        .world_state
        .define_property(
            bf_args.task_perms_who(),
            obj,
            obj,
            pname,
            attrs.owner.expect("owner parsed above"),
            attrs.flags.expect("flags parsed above"),
            Some(value),
        )
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

fn bf_delete_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let pname = propname_arg(&bf_args.args[1])?;
    bf_args
        .world_state
        .delete_property(bf_args.task_perms_who(), obj, pname)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

fn bf_clear_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let pname = propname_arg(&bf_args.args[1])?;
    bf_args
        .world_state
        .clear_property(bf_args.task_perms_who(), obj, pname)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

fn bf_is_clear_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let pname = propname_arg(&bf_args.args[1])?;
    let is_clear = bf_args
        .world_state
        .is_property_clear(bf_args.task_perms_who(), obj, pname)
        .map_err(world_state_bf_err)?;
    Ok(Ret(etamoo_var::v_bool_int(is_clear)))
}

pub(crate) fn register_bf_properties(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("properties")] = bf_properties;
    builtins[offset_for_builtin("property_info")] = bf_property_info;
    builtins[offset_for_builtin("set_property_info")] = bf_set_property_info;
    builtins[offset_for_builtin("add_property")] = bf_add_property;
    builtins[offset_for_builtin("delete_property")] = bf_delete_property;
    builtins[offset_for_builtin("clear_property")] = bf_clear_property;
    builtins[offset_for_builtin("is_clear_property")] = bf_is_clear_property;
}
