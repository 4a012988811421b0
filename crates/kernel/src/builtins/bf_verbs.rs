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
use etamoo_common::model::{
    verb_perms_string, ArgSpec, PrepSpec, VerbArgsSpec, VerbAttrs, VerbDef, VerbFlag, WorldState,
};
use etamoo_common::matching::find_preposition;
use etamoo_compiler::{compile, disassemble, offset_for_builtin};
use etamoo_var::ErrorCode::{E_INVARG, E_PERM, E_TYPE};
use etamoo_var::{v_list, v_none, v_obj, v_str, v_string, Obj, Symbol, Var, Variant};

fn obj_arg(v: &Var) -> Result<Obj, BfErr> {
    v.as_obj().ok_or(BfErr::Code(E_TYPE))
}

/// A verb descriptor argument is either a name string or a 1-based index.
enum VerbDesc {
    Name(Symbol),
    Index(usize),
}

fn verb_desc(v: &Var) -> Result<VerbDesc, BfErr> {
    match v.variant() {
        Variant::Str(s) => Ok(VerbDesc::Name(Symbol::mk(s.as_str()))),
        Variant::Int(i) if *i >= 1 => Ok(VerbDesc::Index(*i as usize - 1)),
        Variant::Int(_) => Err(BfErr::Code(E_INVARG)),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

fn get_verbdef(
    ws: &dyn WorldState,
    perms: Obj,
    obj: Obj,
    desc: &VerbDesc,
) -> Result<VerbDef, BfErr> {
    match desc {
        VerbDesc::Name(name) => ws
            .get_verb(perms, obj, name.clone())
            .map_err(world_state_bf_err),
        VerbDesc::Index(idx) => ws
            .get_verb_at_index(perms, obj, *idx)
            .map_err(world_state_bf_err),
    }
}

fn bf_verbs(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let verbs = bf_args
        .world_state
        .verbs(bf_args.task_perms_who(), obj)
        .map_err(world_state_bf_err)?;
    let names: Vec<Var> = verbs
        .iter()
        .map(|v| {
            v_string(
                v.names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        })
        .collect();
    Ok(Ret(v_list(&names)))
}

fn bf_verb_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let vd = get_verbdef(
        bf_args.world_state,
        bf_args.task_perms_who(),
        obj,
        &desc,
    )?;
    let names = vd
        .names()
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    Ok(Ret(v_list(&[
        v_obj(vd.owner()),
        v_str(&verb_perms_string(vd.flags())),
        v_string(names),
    ])))
}

/// Parse a `{owner, perms, names}` verb-info list.
fn verb_info_args(info: &Var) -> Result<VerbAttrs, BfErr> {
    let Variant::List(info) = info.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() != 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let Some(owner) = info.index(0).unwrap().as_obj() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let perms = info.index(1).unwrap();
    let Variant::Str(perms) = perms.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let Some(flags) = VerbFlag::parse_str(perms.as_str()) else {
        return Err(BfErr::Code(E_INVARG));
    };
    let names = info.index(2).unwrap();
    let Variant::Str(names) = names.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let names: Vec<Symbol> = names.as_str().split_whitespace().map(Symbol::mk).collect();
    if names.is_empty() {
        return Err(BfErr::Code(E_INVARG));
    }
    Ok(VerbAttrs {
        owner: Some(owner),
        names: Some(names),
        flags: Some(flags),
        args_spec: None,
        program: None,
    })
}

/// Parse a `{dobj, prep, iobj}` argument-spec list.
fn verb_args_spec(info: &Var) -> Result<VerbArgsSpec, BfErr> {
    let Variant::List(info) = info.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() != 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let dobj = info.index(0).unwrap();
    let Variant::Str(dobj) = dobj.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let Some(dobj) = ArgSpec::from_string(dobj.as_str()) else {
        return Err(BfErr::Code(E_INVARG));
    };
    let prep = info.index(1).unwrap();
    let Variant::Str(prep) = prep.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let prep = match prep.as_str() {
        "any" => PrepSpec::Any,
        "none" => PrepSpec::None,
        s => match find_preposition(s) {
            Some(p) => PrepSpec::Other(p),
            None => return Err(BfErr::Code(E_INVARG)),
        },
    };
    let iobj = info.index(2).unwrap();
    let Variant::Str(iobj) = iobj.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let Some(iobj) = ArgSpec::from_string(iobj.as_str()) else {
        return Err(BfErr::Code(E_INVARG));
    };
    Ok(VerbArgsSpec { dobj, prep, iobj })
}

fn bf_set_verb_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let attrs = verb_info_args(&bf_args.args[2])?;
    match desc {
        VerbDesc::Name(name) => bf_args
            .world_state
            .update_verb(bf_args.task_perms_who(), obj, name, attrs)
            .map_err(world_state_bf_err)?,
        VerbDesc::Index(idx) => bf_args
            .world_state
            .update_verb_at_index(bf_args.task_perms_who(), obj, idx, attrs)
            .map_err(world_state_bf_err)?,
    }
    Ok(Ret(v_none()))
}

fn bf_verb_args(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let vd = get_verbdef(
        bf_args.world_state,
        bf_args.task_perms_who(),
        obj,
        &desc,
    )?;
    let args = vd.args();
    Ok(Ret(v_list(&[
        v_str(args.dobj.to_string()),
        v_str(args.prep.to_string()),
        v_str(args.iobj.to_string()),
    ])))
}

fn bf_set_verb_args(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let spec = verb_args_spec(&bf_args.args[2])?;
    let attrs = VerbAttrs {
        args_spec: Some(spec),
        ..Default::default()
    };
    match desc {
        VerbDesc::Name(name) => bf_args
            .world_state
            .update_verb(bf_args.task_perms_who(), obj, name, attrs)
            .map_err(world_state_bf_err)?,
        VerbDesc::Index(idx) => bf_args
            .world_state
            .update_verb_at_index(bf_args.task_perms_who(), obj, idx, attrs)
            .map_err(world_state_bf_err)?,
    }
    Ok(Ret(v_none()))
}

/// The retained source of the verb, one line per list element.
fn bf_verb_code(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let vd = get_verbdef(
        bf_args.world_state,
        bf_args.task_perms_who(),
        obj,
        &desc,
    )?;
    // Reading code requires read permission on the verb.
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    perms
        .check_verb_allows(vd.owner(), vd.flags(), VerbFlag::Read)
        .map_err(world_state_bf_err)?;

    let (program, _) = bf_args
        .world_state
        .retrieve_verb(bf_args.task_perms_who(), vd.location(), vd.uuid())
        .map_err(world_state_bf_err)?;
    let lines: Vec<Var> = program
        .source
        .lines()
        .map(|l| v_str(l))
        .collect();
    Ok(Ret(v_list(&lines)))
}

/// set_verb_code(obj, desc, lines) returns the list of compile errors, empty
/// on success.
fn bf_set_verb_code(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let Variant::List(lines) = bf_args.args[2].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let mut source = String::new();
    for line in lines.iter() {
        let Variant::Str(line) = line.variant() else {
            return Err(BfErr::Code(E_TYPE));
        };
        source.push_str(line.as_str());
        source.push('\n');
    }
    let program = match compile(&source) {
        Ok(program) => program,
        Err(e) => {
            return Ok(Ret(v_list(&[v_string(e.to_string())])));
        }
    };
    let attrs = VerbAttrs {
        program: Some(program),
        ..Default::default()
    };
    match desc {
        VerbDesc::Name(name) => bf_args
            .world_state
            .update_verb(bf_args.task_perms_who(), obj, name, attrs)
            .map_err(world_state_bf_err)?,
        VerbDesc::Index(idx) => bf_args
            .world_state
            .update_verb_at_index(bf_args.task_perms_who(), obj, idx, attrs)
            .map_err(world_state_bf_err)?,
    }
    Ok(Ret(v_list(&[])))
}

fn bf_add_verb(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let info = verb_info_args(&bf_args.args[1])?;
    let spec = verb_args_spec(&bf_args.args[2])?;
    // A verb starts with an empty program until set_verb_code gives it one.
    bf_args
        .world_state
        .add_verb(
            bf_args.task_perms_who(),
            obj,
            info.names.expect("names parsed above"),
            info.owner.expect("owner parsed above"),
            info.flags.expect("flags parsed above"),
            spec,
            etamoo_var::program::Program::new(),
        )
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

fn bf_delete_verb(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let vd = get_verbdef(
        bf_args.world_state,
        bf_args.task_perms_who(),
        obj,
        &desc,
    )?;
    bf_args
        .world_state
        .remove_verb(bf_args.task_perms_who(), obj, vd.uuid())
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

/// disassemble(obj, desc): one listing line per opcode.
fn bf_disassemble(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let desc = verb_desc(&bf_args.args[1])?;
    let vd = get_verbdef(
        bf_args.world_state,
        bf_args.task_perms_who(),
        obj,
        &desc,
    )?;
    // Disassembly needs read access, same as verb_code.
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.controls(vd.owner()) && !vd.flags().contains(VerbFlag::Read) {
        return Err(BfErr::Code(E_PERM));
    }
    let (program, _) = bf_args
        .world_state
        .retrieve_verb(bf_args.task_perms_who(), vd.location(), vd.uuid())
        .map_err(world_state_bf_err)?;
    let lines: Vec<Var> = disassemble(&program).iter().map(|l| v_str(l)).collect();
    Ok(Ret(v_list(&lines)))
}

pub(crate) fn register_bf_verbs(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("verbs")] = bf_verbs;
    builtins[offset_for_builtin("verb_info")] = bf_verb_info;
    builtins[offset_for_builtin("set_verb_info")] = bf_set_verb_info;
    builtins[offset_for_builtin("verb_args")] = bf_verb_args;
    builtins[offset_for_builtin("set_verb_args")] = bf_set_verb_args;
    builtins[offset_for_builtin("verb_code")] = bf_verb_code;
    builtins[offset_for_builtin("set_verb_code")] = bf_set_verb_code;
    builtins[offset_for_builtin("add_verb")] = bf_add_verb;
    builtins[offset_for_builtin("delete_verb")] = bf_delete_verb;
    builtins[offset_for_builtin("disassemble")] = bf_disassemble;
}
