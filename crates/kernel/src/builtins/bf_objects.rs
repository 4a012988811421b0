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
use crate::builtins::{world_state_bf_err, BfCallState, BfErr, BfRet, BuiltinFunction};
use crate::tasks::VerbCall;
use crate::vm::ExecutionResult::ContinueVerb;
use etamoo_common::model::{ObjAttrs, WorldState, WorldStateError};
use etamoo_compiler::offset_for_builtin;
use etamoo_var::ErrorCode::{E_NACC, E_TYPE};
use etamoo_var::{v_bool_int, v_list, v_none, v_obj, Obj, Symbol, Var, Variant, NOTHING};

fn obj_arg(v: &Var) -> Result<Obj, BfErr> {
    v.as_obj().ok_or(BfErr::Code(E_TYPE))
}

fn bf_valid(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let is_valid = bf_args.world_state.valid(obj).map_err(world_state_bf_err)?;
    Ok(Ret(v_bool_int(is_valid)))
}

fn bf_parent(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let parent = bf_args
        .world_state
        .parent_of(bf_args.task_perms_who(), obj)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_obj(parent)))
}

fn bf_children(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let children = bf_args
        .world_state
        .children_of(bf_args.task_perms_who(), obj)
        .map_err(world_state_bf_err)?;
    let children: Vec<Var> = children.iter().map(|c| v_obj(*c)).collect();
    Ok(Ret(v_list(&children)))
}

fn bf_chparent(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let new_parent = obj_arg(&bf_args.args[1])?;
    bf_args
        .world_state
        .change_parent(bf_args.task_perms_who(), obj, new_parent)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

fn bf_max_object(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let max_obj = bf_args
        .world_state
        .max_object(bf_args.task_perms_who())
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_obj(max_obj)))
}

fn bf_players(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let players = bf_args.world_state.players().map_err(world_state_bf_err)?;
    let players: Vec<Var> = players.iter().map(|p| v_obj(*p)).collect();
    Ok(Ret(v_list(&players)))
}

fn bf_is_player(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let flags = bf_args
        .world_state
        .flags_of(obj)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_bool_int(
        flags.contains(etamoo_common::model::ObjFlag::User),
    )))
}

fn bf_set_player_flag(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let is_player = bf_args.args[1].is_true();
    bf_args
        .world_state
        .set_player_flag(bf_args.task_perms_who(), obj, is_player)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

fn bf_renumber(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;
    let new_id = bf_args
        .world_state
        .renumber_object(bf_args.task_perms_who(), obj)
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_obj(new_id)))
}

fn bf_reset_max_object(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args
        .world_state
        .reset_max_object(bf_args.task_perms_who())
        .map_err(world_state_bf_err)?;
    Ok(Ret(v_none()))
}

const BF_CREATE_TRAMPOLINE_CALL_INITIALIZE: usize = 0;
const BF_CREATE_TRAMPOLINE_DONE: usize = 1;

/// create(parent [, owner]): the new object's :initialize is called before
/// the object number is returned.
fn bf_create(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let tramp = bf_args
        .bf_trampoline()
        .unwrap_or(BF_CREATE_TRAMPOLINE_CALL_INITIALIZE);

    match tramp {
        BF_CREATE_TRAMPOLINE_CALL_INITIALIZE => {
            let parent = obj_arg(&bf_args.args[0])?;
            let owner = match bf_args.args.get(1) {
                Some(owner) => obj_arg(owner)?,
                None => bf_args.task_perms_who(),
            };
            let new_obj = bf_args
                .world_state
                .create_object(bf_args.task_perms_who(), parent, owner, ObjAttrs::default())
                .map_err(world_state_bf_err)?;

            // Call :initialize on the new object if it has one, then
            // trampoline into the done case; with no verb, skip ahead.
            let Ok((program, initialize)) = bf_args.world_state.find_method_verb_on(
                bf_args.task_perms_who(),
                new_obj,
                Symbol::mk("initialize"),
            ) else {
                return Ok(Ret(v_obj(new_obj)));
            };

            let player = bf_args.exec_state.top().player;
            let caller = bf_args.exec_state.top().this;
            Ok(VmInstr(ContinueVerb {
                permissions: bf_args.task_perms_who(),
                resolved_verb: initialize,
                program,
                call: VerbCall {
                    verb_name: Symbol::mk("initialize"),
                    location: new_obj,
                    this: new_obj,
                    player,
                    args: vec![],
                    argstr: "".to_string(),
                    caller,
                },
                command: None,
                trampoline: Some(BF_CREATE_TRAMPOLINE_DONE),
                trampoline_arg: Some(v_obj(new_obj)),
            }))
        }
        BF_CREATE_TRAMPOLINE_DONE => {
            // The trampoline argument is the object we just created.
            let Some(new_obj) = bf_args.bf_trampoline_arg() else {
                panic!("Missing/invalid trampoline argument for bf_create");
            };
            Ok(Ret(new_obj))
        }
        _ => {
            panic!("Invalid trampoline for bf_create: {tramp}")
        }
    }
}

// This is invoked with a list of objects to move/call :exitfunc on. When the
// list is empty, the next trampoline state does the actual recycling.
const BF_RECYCLE_TRAMPOLINE_CALL_EXITFUNC: usize = 0;
const BF_RECYCLE_TRAMPOLINE_DONE_MOVE: usize = 1;

/// recycle(obj): each object in the contents is moved to #-1 (with
/// :exitfunc), the object's own :recycle is called, then it is destroyed.
fn bf_recycle(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = obj_arg(&bf_args.args[0])?;

    'outer: loop {
        let tramp = bf_args.bf_trampoline();
        match tramp {
            None => {
                // Starting out: the next trampoline state expects the list
                // of contents to call :exitfunc on, so collect it now.
                let contents = bf_args
                    .world_state
                    .contents_of(bf_args.task_perms_who(), obj)
                    .map_err(world_state_bf_err)?;
                let contents: Vec<Var> = contents.iter().map(|o| v_obj(*o)).collect();
                let contents = v_list(&contents);
                match bf_args.world_state.find_method_verb_on(
                    bf_args.task_perms_who(),
                    obj,
                    Symbol::mk("recycle"),
                ) {
                    Ok((program, dispatch)) => {
                        let player = bf_args.exec_state.top().player;
                        let caller = bf_args.exec_state.top().this;
                        return Ok(VmInstr(ContinueVerb {
                            permissions: bf_args.task_perms_who(),
                            resolved_verb: dispatch,
                            program,
                            call: VerbCall {
                                verb_name: Symbol::mk("recycle"),
                                location: obj,
                                this: obj,
                                player,
                                args: vec![],
                                argstr: "".to_string(),
                                caller,
                            },
                            command: None,
                            trampoline: Some(BF_RECYCLE_TRAMPOLINE_CALL_EXITFUNC),
                            trampoline_arg: Some(contents),
                        }));
                    }
                    Err(WorldStateError::VerbNotFound(_, _)) => {
                        // Short-circuit fake-tramp state change.
                        let frame = bf_args.bf_frame_mut();
                        frame.bf_trampoline = Some(BF_RECYCLE_TRAMPOLINE_CALL_EXITFUNC);
                        frame.bf_trampoline_arg = Some(contents);
                        continue 'outer;
                    }
                    Err(WorldStateError::RollbackRetry) => return Err(BfErr::Rollback),
                    Err(_) => return Err(BfErr::Code(E_NACC)),
                }
            }
            Some(BF_RECYCLE_TRAMPOLINE_CALL_EXITFUNC) => {
                // Take the head of the remaining contents; move it out and
                // call :exitfunc on it if it has one, then come back here.
                let contents = bf_args
                    .bf_trampoline_arg()
                    .expect("Missing trampoline argument for bf_recycle");
                let Variant::List(contents) = contents.variant() else {
                    panic!("Invalid trampoline argument for bf_recycle");
                };
                let mut contents = contents.clone();
                loop {
                    if contents.is_empty() {
                        let frame = bf_args.bf_frame_mut();
                        frame.bf_trampoline = Some(BF_RECYCLE_TRAMPOLINE_DONE_MOVE);
                        frame.bf_trampoline_arg = None;
                        continue 'outer;
                    }
                    let head = contents.index(0).expect("checked non-empty");
                    let rest = contents
                        .remove_at(0)
                        .expect("checked non-empty");
                    let Variant::Obj(head_obj) = head.variant() else {
                        panic!("Invalid trampoline argument for bf_recycle");
                    };
                    let head_obj = *head_obj;
                    contents = rest.as_list().expect("still a list").clone();

                    bf_args
                        .world_state
                        .move_object(bf_args.task_perms_who(), head_obj, NOTHING)
                        .map_err(world_state_bf_err)?;

                    let Ok((program, exitfunc)) = bf_args.world_state.find_method_verb_on(
                        bf_args.task_perms_who(),
                        head_obj,
                        Symbol::mk("exitfunc"),
                    ) else {
                        // No :exitfunc; move on to the next object.
                        let remaining = Var::from_list(contents.clone());
                        bf_args.bf_frame_mut().bf_trampoline_arg = Some(remaining);
                        continue;
                    };
                    let remaining = Var::from_list(contents.clone());
                    let player = bf_args.exec_state.top().player;
                    let caller = bf_args.exec_state.top().this;
                    return Ok(VmInstr(ContinueVerb {
                        permissions: bf_args.task_perms_who(),
                        resolved_verb: exitfunc,
                        program,
                        call: VerbCall {
                            verb_name: Symbol::mk("exitfunc"),
                            location: head_obj,
                            this: head_obj,
                            player,
                            args: vec![v_obj(obj)],
                            argstr: "".to_string(),
                            caller,
                        },
                        command: None,
                        trampoline: Some(BF_RECYCLE_TRAMPOLINE_CALL_EXITFUNC),
                        trampoline_arg: Some(remaining),
                    }));
                }
            }
            Some(BF_RECYCLE_TRAMPOLINE_DONE_MOVE) => {
                bf_args
                    .world_state
                    .recycle_object(bf_args.task_perms_who(), obj)
                    .map_err(world_state_bf_err)?;
                return Ok(Ret(v_none()));
            }
            Some(unknown) => {
                panic!("Invalid trampoline for bf_recycle: {unknown}")
            }
        }
    }
}

const BF_MOVE_TRAMPOLINE_START_ACCEPT: usize = 0;
const BF_MOVE_TRAMPOLINE_MOVE_CALL_EXITFUNC: usize = 1;
const BF_MOVE_TRAMPOLINE_CALL_ENTERFUNC: usize = 2;
const BF_MOVE_TRAMPOLINE_DONE: usize = 3;

/// move(what, where): ask the destination's :accept (refusal is E_NACC for
/// non-wizards), move, then :exitfunc on the old location and :enterfunc on
/// the new.
fn bf_move(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let what = obj_arg(&bf_args.args[0])?;
    let whereto = obj_arg(&bf_args.args[1])?;

    // 'Trampoline' state machine:
    //    0 => look up :accept, if it exists ask for it to be invoked;
    //         destination #-1 skips straight to 1.
    //    1 => if :accept approved (or perms are wizardly), do the actual
    //         move (the world state rejects recursive moves), then prepare
    //         :exitfunc on the old location.
    //    2 => call :enterfunc on the destination, result ignored.
    //    3 => return v_none.
    let mut tramp = bf_args
        .bf_trampoline()
        .unwrap_or(BF_MOVE_TRAMPOLINE_START_ACCEPT);

    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let mut accepted = perms.is_wizard();
    loop {
        match tramp {
            BF_MOVE_TRAMPOLINE_START_ACCEPT => {
                if whereto == NOTHING || perms.is_wizard() {
                    accepted = true;
                    tramp = BF_MOVE_TRAMPOLINE_MOVE_CALL_EXITFUNC;
                    continue;
                }
                match bf_args.world_state.find_method_verb_on(
                    bf_args.task_perms_who(),
                    whereto,
                    Symbol::mk("accept"),
                ) {
                    Ok((program, dispatch)) => {
                        let player = bf_args.exec_state.top().player;
                        let caller = bf_args.exec_state.top().this;
                        return Ok(VmInstr(ContinueVerb {
                            permissions: bf_args.task_perms_who(),
                            resolved_verb: dispatch,
                            program,
                            call: VerbCall {
                                verb_name: Symbol::mk("accept"),
                                location: whereto,
                                this: whereto,
                                player,
                                args: vec![v_obj(what)],
                                argstr: "".to_string(),
                                caller,
                            },
                            command: None,
                            trampoline: Some(BF_MOVE_TRAMPOLINE_MOVE_CALL_EXITFUNC),
                            trampoline_arg: None,
                        }));
                    }
                    Err(WorldStateError::VerbNotFound(_, _)) => {
                        // No :accept verb is a refusal for non-wizards.
                        return Err(BfErr::Code(E_NACC));
                    }
                    Err(WorldStateError::RollbackRetry) => return Err(BfErr::Rollback),
                    Err(e) => return Err(world_state_bf_err(e)),
                }
            }
            BF_MOVE_TRAMPOLINE_MOVE_CALL_EXITFUNC => {
                // If we dispatched :accept, its return value decides.
                if !accepted {
                    let accept_result = bf_args
                        .bf_frame_mut()
                        .return_value
                        .clone()
                        .unwrap_or_else(v_none);
                    if !accept_result.is_true() {
                        return Err(BfErr::Code(E_NACC));
                    }
                }

                let old_location = bf_args
                    .world_state
                    .location_of(bf_args.task_perms_who(), what)
                    .map_err(world_state_bf_err)?;
                if old_location == whereto {
                    // No-op move; no funcs fire.
                    return Ok(Ret(v_none()));
                }
                bf_args
                    .world_state
                    .move_object(bf_args.task_perms_who(), what, whereto)
                    .map_err(world_state_bf_err)?;

                if old_location == NOTHING {
                    tramp = BF_MOVE_TRAMPOLINE_CALL_ENTERFUNC;
                    continue;
                }
                let Ok((program, exitfunc)) = bf_args.world_state.find_method_verb_on(
                    bf_args.task_perms_who(),
                    old_location,
                    Symbol::mk("exitfunc"),
                ) else {
                    tramp = BF_MOVE_TRAMPOLINE_CALL_ENTERFUNC;
                    continue;
                };
                let player = bf_args.exec_state.top().player;
                let caller = bf_args.exec_state.top().this;
                return Ok(VmInstr(ContinueVerb {
                    permissions: bf_args.task_perms_who(),
                    resolved_verb: exitfunc,
                    program,
                    call: VerbCall {
                        verb_name: Symbol::mk("exitfunc"),
                        location: old_location,
                        this: old_location,
                        player,
                        args: vec![v_obj(what)],
                        argstr: "".to_string(),
                        caller,
                    },
                    command: None,
                    trampoline: Some(BF_MOVE_TRAMPOLINE_CALL_ENTERFUNC),
                    trampoline_arg: None,
                }));
            }
            BF_MOVE_TRAMPOLINE_CALL_ENTERFUNC => {
                if whereto == NOTHING {
                    return Ok(Ret(v_none()));
                }
                let Ok((program, enterfunc)) = bf_args.world_state.find_method_verb_on(
                    bf_args.task_perms_who(),
                    whereto,
                    Symbol::mk("enterfunc"),
                ) else {
                    return Ok(Ret(v_none()));
                };
                let player = bf_args.exec_state.top().player;
                let caller = bf_args.exec_state.top().this;
                return Ok(VmInstr(ContinueVerb {
                    permissions: bf_args.task_perms_who(),
                    resolved_verb: enterfunc,
                    program,
                    call: VerbCall {
                        verb_name: Symbol::mk("enterfunc"),
                        location: whereto,
                        this: whereto,
                        player,
                        args: vec![v_obj(what)],
                        argstr: "".to_string(),
                        caller,
                    },
                    command: None,
                    trampoline: Some(BF_MOVE_TRAMPOLINE_DONE),
                    trampoline_arg: None,
                }));
            }
            BF_MOVE_TRAMPOLINE_DONE => {
                return Ok(Ret(v_none()));
            }
            _ => panic!("Invalid trampoline for bf_move: {tramp}"),
        }
    }
}

pub(crate) fn register_bf_objects(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("valid")] = bf_valid;
    builtins[offset_for_builtin("parent")] = bf_parent;
    builtins[offset_for_builtin("children")] = bf_children;
    builtins[offset_for_builtin("chparent")] = bf_chparent;
    builtins[offset_for_builtin("max_object")] = bf_max_object;
    builtins[offset_for_builtin("players")] = bf_players;
    builtins[offset_for_builtin("is_player")] = bf_is_player;
    builtins[offset_for_builtin("set_player_flag")] = bf_set_player_flag;
    builtins[offset_for_builtin("create")] = bf_create;
    builtins[offset_for_builtin("recycle")] = bf_recycle;
    builtins[offset_for_builtin("move")] = bf_move;
    builtins[offset_for_builtin("renumber")] = bf_renumber;
    builtins[offset_for_builtin("reset_max_object")] = bf_reset_max_object;
}
