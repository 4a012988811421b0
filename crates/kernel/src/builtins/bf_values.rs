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

use crate::builtins::BfRet::{Ret, VmInstr};
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction, BF_REGISTRY};
use crate::vm::{ExecutionResult, VMExecState};
use etamoo_common::model::ObjFlag;
use etamoo_compiler::{compile, offset_for_builtin, ArgCount, ArgType, BUILTINS};
use etamoo_var::ErrorCode::{E_INVARG, E_PERM, E_TYPE};
use etamoo_var::{
    to_literal, to_string, v_bool_int, v_int, v_list, v_str, v_string, value_bytes, value_hash,
    Error, Var, Variant,
};

fn bf_typeof(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_int(bf_args.args[0].type_code() as i64)))
}

fn bf_tostr(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let mut result = String::new();
    for arg in &bf_args.args {
        result.push_str(&to_string(arg));
    }
    Ok(Ret(v_string(result)))
}

fn bf_toliteral(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_string(to_literal(&bf_args.args[0]))))
}

fn bf_toint(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.args[0].to_integer().map(Ret).map_err(BfErr::Raise)
}

fn bf_toobj(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.args[0].to_object().map(Ret).map_err(BfErr::Raise)
}

fn bf_tofloat(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.args[0].to_float().map(Ret).map_err(BfErr::Raise)
}

fn bf_equal(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let result = bf_args.args[0].eq_case_sensitive(&bf_args.args[1]);
    Ok(Ret(v_bool_int(result)))
}

fn bf_value_bytes(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_int(value_bytes(&bf_args.args[0]) as i64)))
}

fn bf_value_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_string(value_hash(&bf_args.args[0]))))
}

/// raise(code [, message [, value]])
fn bf_raise(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let Variant::Err(e) = bf_args.args[0].variant() else {
        // Non-error codes aren't representable as exception codes here.
        return Err(BfErr::Code(E_INVARG));
    };
    let msg = match bf_args.args.get(1) {
        Some(v) => match v.variant() {
            Variant::Str(s) => Some(s.as_str().to_string()),
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        None => None,
    };
    let value = bf_args.args.get(2).cloned();
    Err(BfErr::Raise(Error::new(e.code, msg, value)))
}

/// call_function(name, args...) -- dispatch through the same table the
/// compiler binds FuncCall opcodes to.
fn bf_call_function(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let Variant::Str(name) = bf_args.args[0].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let name = etamoo_var::Symbol::mk(name.as_str());
    let Some(id) = BUILTINS.find_builtin(&name) else {
        return Err(BfErr::Raise(
            E_INVARG.with_msg(|| format!("unknown function: {name}")),
        ));
    };
    let rest: Vec<Var> = bf_args.args[1..].to_vec();
    VMExecState::check_builtin_args(id, &rest).map_err(BfErr::Raise)?;

    let f = BF_REGISTRY.builtin_for(&id);
    bf_args.args = rest;
    bf_args.name = name;
    f(bf_args)
}

/// function_info([name])
fn bf_function_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let info_for = |desc: &etamoo_compiler::Builtin| {
        let min = match desc.min_args {
            ArgCount::Q(q) => v_int(q as i64),
            ArgCount::U => v_int(-1),
        };
        let max = match desc.max_args {
            ArgCount::Q(q) => v_int(q as i64),
            ArgCount::U => v_int(-1),
        };
        let types: Vec<Var> = desc
            .types
            .iter()
            .map(|t| match t {
                ArgType::Any => v_int(-1),
                ArgType::AnyNum => v_int(-2),
                ArgType::Typed(t) => v_int(*t as i64),
            })
            .collect();
        v_list(&[v_str(desc.name.as_str()), min, max, v_list(&types)])
    };

    match bf_args.args.first() {
        Some(name) => {
            let Variant::Str(name) = name.variant() else {
                return Err(BfErr::Code(E_TYPE));
            };
            let name = etamoo_var::Symbol::mk(name.as_str());
            let Some(id) = BUILTINS.find_builtin(&name) else {
                return Err(BfErr::Code(E_INVARG));
            };
            let desc = BUILTINS.description_for(id).expect("descriptor missing");
            Ok(Ret(info_for(desc)))
        }
        None => {
            let all: Vec<Var> = BUILTINS.descriptors.iter().map(info_for).collect();
            Ok(Ret(v_list(&all)))
        }
    }
}

const BF_EVAL_TRAMPOLINE_RESUME: usize = 0;

/// eval(string): compile and run in this task, returning {success, value}.
fn bf_eval(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    match bf_args.bf_trampoline() {
        None => {
            let Variant::Str(code) = bf_args.args[0].variant() else {
                return Err(BfErr::Code(E_TYPE));
            };
            // Only programmers get to eval.
            let perms = bf_args.task_perms().map_err(crate::builtins::world_state_bf_err)?;
            if !perms.flags.contains(ObjFlag::Programmer) && !perms.is_wizard() {
                return Err(BfErr::Code(E_PERM));
            }
            let program = match compile(code.as_str()) {
                Ok(program) => program,
                Err(e) => {
                    return Ok(Ret(v_list(&[v_int(0), v_list(&[v_string(e.to_string())])])));
                }
            };
            let player = bf_args.exec_state.top().player;
            let permissions = bf_args.task_perms_who();
            let frame = bf_args.bf_frame_mut();
            frame.bf_trampoline = Some(BF_EVAL_TRAMPOLINE_RESUME);
            Ok(VmInstr(ExecutionResult::PerformEval {
                permissions,
                player,
                program,
            }))
        }
        Some(BF_EVAL_TRAMPOLINE_RESUME) => {
            let value = bf_args
                .bf_frame_mut()
                .return_value
                .clone()
                .expect("eval completed without a value");
            Ok(Ret(v_list(&[v_int(1), value])))
        }
        Some(unknown) => panic!("Invalid trampoline for bf_eval: {unknown}"),
    }
}

pub(crate) fn register_bf_values(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("typeof")] = bf_typeof;
    builtins[offset_for_builtin("tostr")] = bf_tostr;
    builtins[offset_for_builtin("toliteral")] = bf_toliteral;
    builtins[offset_for_builtin("toint")] = bf_toint;
    builtins[offset_for_builtin("tonum")] = bf_toint;
    builtins[offset_for_builtin("toobj")] = bf_toobj;
    builtins[offset_for_builtin("tofloat")] = bf_tofloat;
    builtins[offset_for_builtin("equal")] = bf_equal;
    builtins[offset_for_builtin("value_bytes")] = bf_value_bytes;
    builtins[offset_for_builtin("value_hash")] = bf_value_hash;
    builtins[offset_for_builtin("raise")] = bf_raise;
    builtins[offset_for_builtin("call_function")] = bf_call_function;
    builtins[offset_for_builtin("function_info")] = bf_function_info;
    builtins[offset_for_builtin("eval")] = bf_eval;
}
