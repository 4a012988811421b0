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

use crate::vm::activation::Frame;
use crate::vm::moo_frame::{CatchType, ScopeType};
use crate::vm::vm_unwind::FinallyReason;
use crate::vm::{ExecutionResult, Fork, VMExecState, VmExecParams};
use etamoo_common::model::WorldState;
use etamoo_common::tasks::Session;
use etamoo_var::program::{Op, ScatterLabel};
use etamoo_var::ErrorCode::{E_ARGS, E_INVARG, E_TYPE, E_VARNF};
use etamoo_var::{
    compare, v_bool_int, v_empty_list, v_err, v_float, v_int, v_list, v_none, v_obj, IndexMode,
    Obj, Var, Variant,
};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

macro_rules! binary_bool_op {
    ( $f:ident, $state:ident, $pat:pat ) => {
        let rhs = $f.pop();
        let lhs = $f.peek_top();
        match compare(lhs, &rhs) {
            Ok(ord) => {
                let result = matches!(ord, $pat);
                $f.poke(0, v_bool_int(result));
            }
            Err(e) => {
                $f.pop();
                return $state.push_error(e);
            }
        }
    };
}

macro_rules! binary_var_op {
    ( $f:ident, $state:ident, $op:tt ) => {
        let rhs = $f.pop();
        let lhs = $f.peek_top();
        let result = lhs.$op(&rhs);
        match result {
            Ok(result) => $f.poke(0, result),
            Err(err_code) => {
                $f.pop();
                return $state.push_error(err_code);
            }
        }
    };
}

/// Main VM opcode execution for MOO stack frames. The actual meat of the
/// machine. Runs until the tick slice is exhausted or an `ExecutionResult`
/// other than More is called for.
pub(crate) fn moo_frame_execute(
    exec_params: &VmExecParams,
    state: &mut VMExecState,
    world_state: &mut dyn WorldState,
    session: Arc<dyn Session>,
) -> ExecutionResult {
    let opcodes = {
        let a = state.top_mut();
        let Frame::Moo(ref mut f) = a.frame else {
            panic!("Unsupported VM stack frame type");
        };
        // We clone the (Arc'd) main vector here to avoid borrowing issues
        // with the frame later, as we need to modify the program counter.
        f.program.main_vector.clone()
    };

    // Special case for an empty program: just return v_none() immediately.
    if opcodes.is_empty() {
        return state.unwind_stack(FinallyReason::Return(v_none()));
    }

    while state.tick_count < state.tick_slice {
        state.tick_count += 1;

        // Borrow the top of the activation stack for the lifetime of this
        // opcode's execution.
        let a = state.top_mut();
        let permissions = a.permissions;
        let Frame::Moo(ref mut f) = a.frame else {
            panic!("Unsupported VM stack frame type");
        };

        // We panic if we run out of opcodes, as that means there's a bug in
        // either the compiler or in opcode execution.
        let op = &opcodes[f.pc];
        f.pc += 1;

        match op {
            Op::If(label) | Op::Eif(label) | Op::IfQues(label) | Op::While(label) => {
                let cond = f.pop();
                if !cond.is_true() {
                    f.jump(label);
                }
            }
            Op::Jump { label } => {
                f.jump(label);
            }
            Op::WhileId { id, end_label } => {
                let v = f.pop();
                let is_true = v.is_true();
                f.set_env(id, v);
                if !is_true {
                    f.jump(end_label);
                }
            }
            Op::ForList { end_label, id } => {
                // Peek the count and list from the stack; they stay there
                // between iterations.
                let (count, list) = f.peek2();
                let Variant::Int(count) = count.variant() else {
                    f.pop();
                    f.pop();
                    // If raising the error just pushes a value rather than
                    // unwinding (no `d' bit), we must still be out of the
                    // loop, so jump before raising. Here and below.
                    f.jump(end_label);
                    return state.raise_error(E_TYPE.msg("invalid loop iteration count"));
                };
                let count = *count as usize;
                let Variant::List(l) = list.variant() else {
                    f.pop();
                    f.pop();
                    f.jump(end_label);
                    return state.raise_error(E_TYPE.msg("cannot iterate over non-list"));
                };

                // When the list is exhausted, pop the count and list and jump
                // out.
                if count >= l.len() {
                    f.pop();
                    f.pop();
                    f.jump(end_label);
                    continue;
                }

                let element = l.index(count).expect("bounds checked above");
                f.set_env(id, element);
                f.poke(0, v_int((count + 1) as i64));
            }
            Op::ForRange { end_label, id } => {
                // Pull the range ends off the stack.
                let (from, next_val) = {
                    let (to, from) = f.peek2();
                    let next_val = match (to.variant(), from.variant()) {
                        (Variant::Int(to_i), Variant::Int(from_i)) => {
                            if from_i > to_i {
                                f.pop();
                                f.pop();
                                f.jump(end_label);
                                continue;
                            }
                            v_int(from_i + 1)
                        }
                        (Variant::Obj(to_o), Variant::Obj(from_o)) => {
                            if from_o > to_o {
                                f.pop();
                                f.pop();
                                f.jump(end_label);
                                continue;
                            }
                            v_obj(from_o.next())
                        }
                        (_, _) => {
                            f.pop();
                            f.pop();
                            f.jump(end_label);
                            return state
                                .raise_error(E_TYPE.msg("invalid bounds in for range"));
                        }
                    };
                    (from.clone(), next_val)
                };
                f.poke(1, next_val);
                f.set_env(id, from);
            }
            Op::Pop => {
                f.pop();
            }
            Op::ImmNone => {
                f.push(v_none());
            }
            Op::ImmBigInt(val) => {
                f.push(v_int(*val));
            }
            Op::ImmInt(val) => {
                f.push(v_int(*val as i64));
            }
            Op::ImmFloat(val) => {
                f.push(v_float(*val));
            }
            Op::ImmObjid(val) => {
                f.push(v_obj(*val));
            }
            Op::ImmErr(val) => {
                f.push(v_err(*val));
            }
            Op::Imm(slot) => {
                // Avoid pointless stack traffic for literals that are
                // immediately discarded (e.g. string "comments").
                match f.lookahead() {
                    Some(Op::Pop) => {
                        f.skip();
                        continue;
                    }
                    _ => {
                        let value = f.program.literals[slot.0 as usize].clone();
                        f.push(value);
                    }
                }
            }
            Op::ImmEmptyList => f.push(v_empty_list()),
            Op::ListAddTail => {
                let (tail, list) = (f.pop(), f.peek_top());
                match list.push(&tail) {
                    Ok(v) => {
                        f.poke(0, v);
                    }
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::ListAppend => {
                let (tail, list) = (f.pop(), f.peek_top());
                match list.append(&tail) {
                    Ok(v) => {
                        f.poke(0, v);
                    }
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::IndexSet => {
                let (rhs, index, lhs) = (f.pop(), f.pop(), f.peek_top());
                match lhs.index_set(&index, &rhs, IndexMode::OneBased) {
                    Ok(v) => {
                        f.poke(0, v);
                    }
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::MakeSingletonList => {
                let v = f.peek_top();
                f.poke(0, v_list(&[v.clone()]));
            }
            Op::PutTemp => {
                f.temp = f.peek_top().clone();
            }
            Op::PushTemp => {
                let tmp = f.temp.clone();
                f.push(tmp);
                f.temp = v_none();
            }
            Op::Eq => {
                let rhs = f.pop();
                let lhs = f.peek_top();
                let result = *lhs == rhs;
                f.poke(0, v_bool_int(result));
            }
            Op::Ne => {
                let rhs = f.pop();
                let lhs = f.peek_top();
                let result = *lhs != rhs;
                f.poke(0, v_bool_int(result));
            }
            Op::Gt => {
                binary_bool_op!(f, state, Ordering::Greater);
            }
            Op::Lt => {
                binary_bool_op!(f, state, Ordering::Less);
            }
            Op::Ge => {
                binary_bool_op!(f, state, Ordering::Greater | Ordering::Equal);
            }
            Op::Le => {
                binary_bool_op!(f, state, Ordering::Less | Ordering::Equal);
            }
            Op::In => {
                // Stack is [value, list]; the result replaces the value.
                let (list, value) = (f.pop(), f.peek_top());
                match value.index_in(&list, false) {
                    Ok(v) => {
                        f.poke(0, v);
                    }
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::Mul => {
                binary_var_op!(f, state, mul);
            }
            Op::Sub => {
                binary_var_op!(f, state, sub);
            }
            Op::Div => {
                binary_var_op!(f, state, div);
            }
            Op::Add => {
                binary_var_op!(f, state, add);
            }
            Op::Exp => {
                binary_var_op!(f, state, pow);
            }
            Op::Mod => {
                binary_var_op!(f, state, modulus);
            }
            Op::And(label) => {
                let v = f.peek_top().is_true();
                if !v {
                    f.jump(label)
                } else {
                    f.pop();
                }
            }
            Op::Or(label) => {
                let v = f.peek_top().is_true();
                if v {
                    f.jump(label);
                } else {
                    f.pop();
                }
            }
            Op::Not => {
                let v = !f.peek_top().is_true();
                f.poke(0, v_bool_int(v));
            }
            Op::UnaryMinus => {
                let v = f.peek_top();
                match v.negative() {
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                    Ok(v) => f.poke(0, v),
                }
            }
            Op::Push(ident) => {
                let Some(v) = f.get_env(ident) else {
                    let name = f
                        .program
                        .var_names
                        .name_of(ident)
                        .map(|s| s.to_string())
                        .unwrap_or_default();
                    return state
                        .push_error(E_VARNF.with_msg(|| format!("variable `{name}' not found")));
                };
                f.push(v.clone());
            }
            Op::Put(ident) => {
                let v = f.peek_top();
                f.set_env(ident, v.clone());
            }
            Op::PushRef => {
                let (index, value) = f.peek2();
                match value.index(index, IndexMode::OneBased) {
                    Ok(v) => f.push(v),
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::Ref => {
                let (index, value) = (f.pop(), f.peek_top());
                match value.index(&index, IndexMode::OneBased) {
                    Ok(v) => f.poke(0, v),
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::RangeRef => {
                let (to, from, base) = (f.pop(), f.pop(), f.peek_top());
                match base.range(&from, &to, IndexMode::OneBased) {
                    Ok(v) => f.poke(0, v),
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::RangeSet => {
                let (value, to, from, base) = (f.pop(), f.pop(), f.pop(), f.peek_top());
                match base.range_set(&from, &to, &value, IndexMode::OneBased) {
                    Ok(v) => f.poke(0, v),
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::Length(offset) => {
                let v = f.peek_abs(offset.0 as usize);
                match v.len() {
                    Ok(l) => f.push(v_int(l as i64)),
                    Err(e) => return state.push_error(e),
                }
            }
            Op::GetProp => {
                let (propname, obj) = (f.pop(), f.peek_top().clone());
                match get_property(world_state, permissions, &obj, &propname) {
                    Ok(v) => {
                        f.poke(0, v);
                    }
                    Err(e) => {
                        f.pop();
                        return state.push_error(e);
                    }
                }
            }
            Op::PushGetProp => {
                let (propname, obj) = f.peek2();
                let (propname, obj) = (propname.clone(), obj.clone());
                match get_property(world_state, permissions, &obj, &propname) {
                    Ok(v) => {
                        f.push(v);
                    }
                    Err(e) => {
                        return state.push_error(e);
                    }
                }
            }
            Op::PutProp => {
                let (rhs, propname, obj) = (f.pop(), f.pop(), f.peek_top().clone());
                let (propname, obj) = match (propname.variant(), obj.variant()) {
                    (Variant::Str(propname), Variant::Obj(obj)) => (propname.clone(), *obj),
                    (_, _) => {
                        return state
                            .push_error(E_TYPE.msg("invalid property assignment operands"));
                    }
                };
                let propname = etamoo_var::Symbol::mk(propname.as_str());
                match world_state.update_property(permissions, obj, propname, &rhs) {
                    Ok(()) => {
                        f.poke(0, rhs);
                    }
                    Err(e) => {
                        return state.push_error(e.to_error_code());
                    }
                }
            }
            Op::Fork { id, fv_offset } => {
                // Delay time should be on the stack.
                let time = f.pop();
                let time = match time.variant() {
                    Variant::Int(time) => *time as f64,
                    Variant::Float(time) => *time,
                    _ => {
                        return state.push_error(E_TYPE.msg("invalid fork delay"));
                    }
                };
                if time < 0.0 {
                    return state.push_error(E_INVARG.msg("negative fork delay"));
                }
                let delay = (time != 0.0).then(|| Duration::from_secs_f64(time));
                let new_activation = a.clone();
                let fork = Fork {
                    player: a.player,
                    progr: a.permissions,
                    parent_task_id: state.task_id,
                    delay,
                    activation: new_activation,
                    fork_vector_offset: *fv_offset,
                    task_id: *id,
                };
                return ExecutionResult::DispatchFork(fork);
            }
            Op::Pass => {
                let args = f.pop();
                let Some(args) = args.as_list().cloned() else {
                    return state.push_error(E_TYPE.msg("invalid pass arguments"));
                };
                return state.prepare_pass_verb(world_state, &args);
            }
            Op::CallVerb => {
                let (args, verb, obj) = (f.pop(), f.pop(), f.pop());
                let (Variant::List(l), Variant::Str(s)) = (args.variant(), verb.variant())
                else {
                    return state.push_error(E_TYPE.msg("invalid verb call operands"));
                };
                let verb = etamoo_var::Symbol::mk(s.as_str());
                let args: Vec<Var> = l.iter().collect();
                return state.prepare_call_verb(exec_params, world_state, &obj, verb, args);
            }
            Op::Return => {
                let ret_val = f.pop();
                return state.unwind_stack(FinallyReason::Return(ret_val));
            }
            Op::Return0 => {
                return state.unwind_stack(FinallyReason::Return(v_int(0)));
            }
            Op::Done => {
                return state.unwind_stack(FinallyReason::Return(v_none()));
            }
            Op::FuncCall { id } => {
                // Pop arguments; should be a list.
                let args = f.pop();
                let Some(args) = args.as_list() else {
                    return state.push_error(E_ARGS.msg("invalid builtin arguments"));
                };
                let args: Vec<Var> = args.iter().collect();
                return state.call_builtin_function(
                    *id,
                    args,
                    exec_params,
                    world_state,
                    session,
                );
            }
            Op::PushCatchLabel(label) => {
                // The value on the stack is either a list of error codes, or
                // Int(0) for ANY.
                let error_codes = f.pop();
                match error_codes.variant() {
                    Variant::List(error_codes) => {
                        let mut errors = Vec::with_capacity(error_codes.len());
                        for v in error_codes.iter() {
                            let Variant::Err(e) = v.variant() else {
                                return state
                                    .push_error(E_TYPE.msg("non-error in catch codes"));
                            };
                            errors.push(e.clone());
                        }
                        f.catch_stack.push((CatchType::Errors(errors), *label));
                    }
                    Variant::Int(0) => {
                        f.catch_stack.push((CatchType::Any, *label));
                    }
                    _ => {
                        panic!("Invalid error codes list");
                    }
                }
            }
            Op::TryFinally(label) => {
                f.push_scope(ScopeType::TryFinally(*label));
            }
            Op::TryCatch { .. } | Op::TryExcept { .. } => {
                let catches = std::mem::take(&mut f.catch_stack);
                f.push_scope(ScopeType::TryCatch(catches));
            }
            Op::EndCatch(label) | Op::EndExcept(label) => {
                let is_catch = matches!(op, Op::EndCatch(_));
                let v = if is_catch { f.pop() } else { v_none() };

                let handler = f.pop_scope().expect("Missing handler for try/catch/except");
                let ScopeType::TryCatch(..) = handler.scope_type else {
                    panic!("Handler is not a catch handler");
                };

                if is_catch {
                    f.push(v);
                }
                f.jump(label);
            }
            Op::EndFinally => {
                // The body completed on its own; fall through into the
                // finally block with a Fallthrough continuation.
                let scope = f.pop_scope().expect("Missing scope for try/finally");
                let ScopeType::TryFinally(_) = scope.scope_type else {
                    panic!("Scope is not a finally scope");
                };
                f.finally_stack.push(FinallyReason::Fallthrough);
            }
            Op::FinallyContinue => {
                let why = f.finally_stack.pop().expect("Missing finally reason");
                match why {
                    FinallyReason::Fallthrough => continue,
                    FinallyReason::Abort => {
                        panic!("Unexpected FINALLY_ABORT in FinallyContinue")
                    }
                    FinallyReason::Raise(_)
                    | FinallyReason::Return(_)
                    | FinallyReason::Exit { .. } => {
                        return state.unwind_stack(why);
                    }
                }
            }
            Op::Exit { stack, label } => {
                return state.unwind_stack(FinallyReason::Exit {
                    stack: *stack,
                    label: *label,
                });
            }
            Op::Scatter(sa) => {
                let (nargs, rest, nreq) = {
                    let mut nargs = 0;
                    let mut rest = 0;
                    let mut nreq = 0;
                    for label in sa.labels.iter() {
                        match label {
                            ScatterLabel::Rest(_) => rest += 1,
                            ScatterLabel::Required(_) => nreq += 1,
                            ScatterLabel::Optional(_, _) => {}
                        }
                        nargs += 1;
                    }
                    (nargs, rest, nreq)
                };
                let have_rest = rest > 0;
                let rhs_values = {
                    let rhs = f.peek_top();
                    let Some(rhs_values) = rhs.as_list() else {
                        f.pop();
                        return state
                            .push_error(E_TYPE.msg("scatter against non-list"));
                    };
                    rhs_values.clone()
                };

                let len = rhs_values.len();
                if len < nreq || (!have_rest && len > nargs) {
                    f.pop();
                    return state.push_error(E_ARGS.into());
                }
                let mut nopt_avail = len - nreq;
                let nrest = if have_rest && len >= nargs {
                    len - nargs + 1
                } else {
                    0
                };
                let mut jump_where = None;
                let mut args_iter = rhs_values.iter();

                for label in sa.labels.iter() {
                    match label {
                        ScatterLabel::Rest(id) => {
                            let mut v = vec![];
                            for _ in 0..nrest {
                                let Some(rest) = args_iter.next() else {
                                    break;
                                };
                                v.push(rest.clone());
                            }
                            f.set_env(id, v_list(&v));
                        }
                        ScatterLabel::Required(id) => {
                            let Some(arg) = args_iter.next() else {
                                return state.push_error(E_ARGS.into());
                            };
                            f.set_env(id, arg.clone());
                        }
                        ScatterLabel::Optional(id, jump_to) => {
                            if nopt_avail > 0 {
                                nopt_avail -= 1;
                                let Some(arg) = args_iter.next() else {
                                    return state.push_error(E_ARGS.into());
                                };
                                f.set_env(id, arg.clone());
                            } else if jump_where.is_none() && jump_to.is_some() {
                                jump_where = *jump_to;
                            }
                        }
                    }
                }
                match &jump_where {
                    None => f.jump(&sa.done),
                    Some(jump_where) => f.jump(jump_where),
                }
            }
            Op::CheckListForSplice => {
                if f.peek_top().as_list().is_none() {
                    f.pop();
                    return state.push_error(E_TYPE.msg("splice of non-list"));
                }
            }
        }
    }
    // Usually execution returns out of the loop above; landing here means
    // the tick slice ran dry and the scheduler decides what happens next.
    ExecutionResult::More
}

fn get_property(
    world_state: &mut dyn WorldState,
    permissions: Obj,
    obj: &Var,
    propname: &Var,
) -> Result<Var, etamoo_var::Error> {
    let Variant::Str(propname) = propname.variant() else {
        return Err(E_TYPE.msg("property name must be a string").into());
    };
    let Variant::Obj(obj) = obj.variant() else {
        return Err(etamoo_var::ErrorCode::E_INVIND
            .msg("property access on non-object")
            .into());
    };
    let propname = etamoo_var::Symbol::mk(propname.as_str());
    world_state
        .retrieve_property(permissions, *obj, propname)
        .map_err(|e| e.to_error_code())
}
