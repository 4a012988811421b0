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

use crate::vm::moo_frame::MooStackFrame;
use crate::vm::vm_call::{VerbExecutionRequest, VerbProgram};
use etamoo_common::model::{VerbArgsSpec, VerbDef, VerbFlag};
use etamoo_var::program::{BuiltinId, GlobalName, Name, Program};
use etamoo_var::{
    v_empty_list, v_empty_str, v_int, v_list, v_obj, v_str, v_string, Error, Obj, Symbol, Var,
    VarType, NOTHING,
};
use etamoo_common::matching::ParsedCommand;
use lazy_static::lazy_static;
use uuid::Uuid;

lazy_static! {
    static ref EVAL_SYMBOL: Symbol = Symbol::mk("eval");
}

/// Activation frame for the call stack of verb executions. Holds the current
/// VM stack frame, along with the current verb activation information.
#[derive(Clone, Debug)]
pub struct Activation {
    /// The current stack frame, holding the execution state of the
    /// interpreter for this activation.
    pub(crate) frame: Frame,
    /// The object that is the receiver of the current verb call.
    pub(crate) this: Obj,
    /// The object with the 'player' role: the active user of this task.
    pub(crate) player: Obj,
    /// The arguments to the verb or builtin being called.
    pub(crate) args: Vec<Var>,
    /// The name the verb was invoked under.
    pub(crate) verb_name: Symbol,
    /// The resolved definition of the verb being executed.
    pub(crate) verbdef: VerbDef,
    /// The "task perms" of this activation: who the verb is acting on behalf
    /// of. Initially the verb owner; `set_task_perms()` can override, and
    /// `caller_perms()` reads this from the parent frame.
    pub(crate) permissions: Obj,
    /// The command that triggered this verb call, if any.
    pub(crate) command: Option<ParsedCommand>,
}

#[derive(Clone, Debug)]
pub enum Frame {
    Moo(MooStackFrame),
    Bf(BfFrame),
}

impl Frame {
    /// What is the line number of the currently executing stack frame, if
    /// any?
    pub fn find_line_no(&self) -> Option<usize> {
        match self {
            Frame::Moo(frame) => frame.find_line_no(frame.pc),
            Frame::Bf(_) => None,
        }
    }

    pub fn set_variable(&mut self, name: &Name, value: Var) -> Result<(), Error> {
        match self {
            Frame::Moo(frame) => frame.set_variable(name, value),
            Frame::Bf(_) => {
                panic!("set_variable called for a built-in function frame")
            }
        }
    }

    pub fn set_global_variable(&mut self, gname: GlobalName, value: Var) {
        match self {
            Frame::Moo(frame) => frame.set_gvar(gname, value),
            Frame::Bf(_) => {
                panic!("set_global_variable called for a built-in function frame")
            }
        }
    }

    pub fn set_return_value(&mut self, value: Var) {
        match self {
            Frame::Moo(ref mut frame) => {
                frame.push(value);
            }
            Frame::Bf(bf_frame) => {
                bf_frame.return_value = Some(value);
            }
        }
    }
}

/// The "frame" for an in-flight builtin function call: just the trampoline
/// state machine, since the Rust code itself keeps no cross-call state.
#[derive(Clone, Debug)]
pub struct BfFrame {
    /// The index of the built-in function being called.
    pub(crate) bf_id: BuiltinId,
    /// The per-bf trampoline counter, which a builtin that dispatched out to
    /// a verb uses to figure out how to resume where it left off.
    pub(crate) bf_trampoline: Option<usize>,
    /// And an optional argument that can be passed with the above.
    pub(crate) bf_trampoline_arg: Option<Var>,
    /// Return value into this frame.
    pub(crate) return_value: Option<Var>,
}

/// Set the type constants into a fresh stack frame.
fn set_constants(f: &mut Frame) {
    f.set_global_variable(GlobalName::NUM, v_int(VarType::TYPE_INT as i64));
    f.set_global_variable(GlobalName::INT, v_int(VarType::TYPE_INT as i64));
    f.set_global_variable(GlobalName::FLOAT, v_int(VarType::TYPE_FLOAT as i64));
    f.set_global_variable(GlobalName::OBJ, v_int(VarType::TYPE_OBJ as i64));
    f.set_global_variable(GlobalName::STR, v_int(VarType::TYPE_STR as i64));
    f.set_global_variable(GlobalName::ERR, v_int(VarType::TYPE_ERR as i64));
    f.set_global_variable(GlobalName::LIST, v_int(VarType::TYPE_LIST as i64));
}

impl Activation {
    pub fn is_builtin_frame(&self) -> bool {
        matches!(self.frame, Frame::Bf(_))
    }

    pub fn verb_definer(&self) -> Obj {
        match self.frame {
            Frame::Bf(_) => NOTHING,
            _ => self.verbdef.location(),
        }
    }

    pub fn verb_owner(&self) -> Obj {
        self.verbdef.owner()
    }

    pub fn for_call(verb_call_request: VerbExecutionRequest) -> Self {
        let VerbProgram::Moo(program) = verb_call_request.program;
        let verb_owner = verb_call_request.resolved_verb.owner();
        let call = &verb_call_request.call;

        let frame = MooStackFrame::new(program);
        let mut frame = Frame::Moo(frame);
        set_constants(&mut frame);
        frame.set_global_variable(GlobalName::this, v_obj(call.this));
        frame.set_global_variable(GlobalName::player, v_obj(call.player));
        frame.set_global_variable(GlobalName::caller, v_obj(call.caller));
        frame.set_global_variable(GlobalName::verb, v_str(call.verb_name.as_str()));
        frame.set_global_variable(GlobalName::args, v_list(&call.args));

        // From the command, if any...
        if let Some(ref command) = verb_call_request.command {
            frame.set_global_variable(GlobalName::argstr, v_string(command.argstr.clone()));
            frame.set_global_variable(GlobalName::dobj, v_obj(command.dobj.unwrap_or(NOTHING)));
            frame.set_global_variable(GlobalName::dobjstr, v_string(command.dobjstr.clone()));
            frame.set_global_variable(GlobalName::prepstr, v_string(command.prepstr.clone()));
            frame.set_global_variable(GlobalName::iobj, v_obj(command.iobj.unwrap_or(NOTHING)));
            frame.set_global_variable(GlobalName::iobjstr, v_string(command.iobjstr.clone()));
        } else {
            frame.set_global_variable(GlobalName::argstr, v_string(call.argstr.clone()));
            frame.set_global_variable(GlobalName::dobj, v_obj(NOTHING));
            frame.set_global_variable(GlobalName::dobjstr, v_empty_str());
            frame.set_global_variable(GlobalName::prepstr, v_empty_str());
            frame.set_global_variable(GlobalName::iobj, v_obj(NOTHING));
            frame.set_global_variable(GlobalName::iobjstr, v_empty_str());
        }

        Self {
            frame,
            this: call.this,
            player: call.player,
            verbdef: verb_call_request.resolved_verb,
            verb_name: call.verb_name.clone(),
            command: verb_call_request.command,
            args: call.args.clone(),
            permissions: verb_owner,
        }
    }

    pub fn for_eval(permissions: Obj, player: Obj, program: Program) -> Self {
        let verbdef = VerbDef::new(
            Uuid::new_v4(),
            NOTHING,
            NOTHING,
            &["eval"],
            VerbFlag::xd(),
            VerbArgsSpec::this_none_this(),
        );

        let frame = MooStackFrame::new(program);
        let mut frame = Frame::Moo(frame);

        set_constants(&mut frame);
        frame.set_global_variable(GlobalName::this, v_obj(NOTHING));
        frame.set_global_variable(GlobalName::player, v_obj(player));
        frame.set_global_variable(GlobalName::caller, v_obj(player));
        frame.set_global_variable(GlobalName::verb, v_empty_str());
        frame.set_global_variable(GlobalName::args, v_empty_list());
        frame.set_global_variable(GlobalName::argstr, v_empty_str());
        frame.set_global_variable(GlobalName::dobj, v_obj(NOTHING));
        frame.set_global_variable(GlobalName::dobjstr, v_empty_str());
        frame.set_global_variable(GlobalName::prepstr, v_empty_str());
        frame.set_global_variable(GlobalName::iobj, v_obj(NOTHING));
        frame.set_global_variable(GlobalName::iobjstr, v_empty_str());

        Self {
            frame,
            this: player,
            player,
            verbdef,
            verb_name: EVAL_SYMBOL.clone(),
            command: None,
            args: vec![],
            permissions,
        }
    }

    pub fn for_bf_call(bf_id: BuiltinId, bf_name: Symbol, args: Vec<Var>, player: Obj) -> Self {
        let verbdef = VerbDef::new(
            Uuid::new_v4(),
            NOTHING,
            NOTHING,
            &[bf_name.as_str()],
            VerbFlag::xd(),
            VerbArgsSpec::this_none_this(),
        );

        let bf_frame = BfFrame {
            bf_id,
            bf_trampoline: None,
            bf_trampoline_arg: None,
            return_value: None,
        };
        Self {
            frame: Frame::Bf(bf_frame),
            this: NOTHING,
            player,
            verbdef,
            verb_name: bf_name,
            command: None,
            args,
            permissions: NOTHING,
        }
    }
}
