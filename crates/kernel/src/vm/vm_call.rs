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

use crate::builtins::{BfCallState, BfErr, BfRet};
use crate::tasks::VerbCall;
use crate::vm::activation::{Activation, Frame};
use crate::vm::vm_unwind::FinallyReason;
use crate::vm::{ExecutionResult, Fork, VMExecState, VmExecParams};
use etamoo_common::matching::ParsedCommand;
use etamoo_common::model::{VerbDef, WorldState, WorldStateError};
use etamoo_common::tasks::Session;
use etamoo_compiler::{ArgCount, ArgType, BUILTINS};
use etamoo_var::program::{BuiltinId, Program};
use etamoo_var::ErrorCode::{E_ARGS, E_INVIND, E_MAXREC, E_PERM, E_TYPE, E_VERBNF};
use etamoo_var::{Obj, Symbol, Var, VarType, Variant};
use std::sync::Arc;
use tracing::trace;

/// The set of parameters for a scheduler-requested *resolved* verb dispatch.
#[derive(Clone, Debug)]
pub struct VerbExecutionRequest {
    /// The applicable permissions.
    pub permissions: Obj,
    /// The resolved verb.
    pub resolved_verb: VerbDef,
    /// The call parameters that were used to resolve the verb.
    pub call: VerbCall,
    /// The parsed user command that led to this verb dispatch, if any.
    pub command: Option<ParsedCommand>,
    /// The program to run.
    pub program: VerbProgram,
}

/// The language of a verb program. MOO is the only resident today; the
/// variant keeps the dispatch honest about that assumption.
#[derive(Clone, Debug)]
pub enum VerbProgram {
    Moo(Program),
}

impl VMExecState {
    /// Entry point for preparing a verb call for execution, invoked from the
    /// CallVerb opcode. Seeks the verb and prepares the call parameters,
    /// handing them back to the task which dispatches through to
    /// `exec_call_request`.
    pub(crate) fn prepare_call_verb(
        &mut self,
        exec_params: &VmExecParams,
        world_state: &mut dyn WorldState,
        this: &Var,
        verb_name: Symbol,
        args: Vec<Var>,
    ) -> ExecutionResult {
        let Variant::Obj(this) = this.variant() else {
            return self.push_error(E_TYPE.msg("verb call on non-object"));
        };
        let this = *this;

        if self.stack.len() >= exec_params.max_stack_depth {
            return self.throw_error(E_MAXREC.msg("too many verb calls"));
        }

        let call = VerbCall {
            verb_name: verb_name.clone(),
            location: this,
            this,
            player: self.top().player,
            args,
            // Caller here is current-activation 'this', not caller().
            argstr: "".to_string(),
            caller: self.top().this,
        };

        match world_state.valid(this) {
            Ok(true) => {}
            Ok(false) => {
                return self.push_error(
                    E_INVIND.with_msg(|| format!("verb call on invalid object {this}")),
                );
            }
            Err(e) => return self.push_error(e.to_error_code()),
        }

        // Find the callable verb...
        let (program, resolved_verb) =
            match world_state.find_method_verb_on(self.top().permissions, this, verb_name.clone())
            {
                Ok(r) => r,
                Err(WorldStateError::VerbNotFound(_, _)) => {
                    return self.push_error(
                        E_VERBNF.with_msg(|| format!("verb {this}:{verb_name} not found")),
                    );
                }
                Err(WorldStateError::VerbPermissionDenied)
                | Err(WorldStateError::ObjectPermissionDenied) => {
                    return self.push_error(E_PERM.into());
                }
                Err(WorldStateError::RollbackRetry) => {
                    return ExecutionResult::RollbackRestart;
                }
                Err(e) => return self.push_error(e.to_error_code()),
            };

        // Permissions for the new activation are the verb's owner.
        let permissions = resolved_verb.owner();

        ExecutionResult::ContinueVerb {
            permissions,
            resolved_verb,
            program,
            call,
            command: self.top().command.clone(),
            trampoline: None,
            trampoline_arg: None,
        }
    }

    /// Set up a dispatch to the same-named verb on the parent of the current
    /// verb's definer, with the current `this` kept.
    pub(crate) fn prepare_pass_verb(
        &mut self,
        world_state: &mut dyn WorldState,
        args: &etamoo_var::List,
    ) -> ExecutionResult {
        // Get parent of verb definer object & current verb name.
        let definer = self.top().verb_definer();
        let permissions = self.top().permissions;

        let parent = match world_state.parent_of(permissions, definer) {
            Ok(parent) => parent,
            Err(WorldStateError::RollbackRetry) => return ExecutionResult::RollbackRestart,
            Err(e) => return self.push_error(e.to_error_code()),
        };
        let verb = self.top().verb_name.clone();

        // Call the verb on the parent, but with the current 'this'.
        trace!(task_id = self.task_id, ?verb, ?definer, ?parent, "pass");

        let (program, resolved_verb) =
            match world_state.find_method_verb_on(permissions, parent, verb.clone()) {
                Ok(r) => r,
                Err(WorldStateError::VerbNotFound(_, _)) => {
                    return self.push_error(
                        E_VERBNF.with_msg(|| format!("verb {parent}:{verb} not found")),
                    );
                }
                Err(WorldStateError::RollbackRetry) => {
                    return ExecutionResult::RollbackRestart;
                }
                Err(e) => return self.push_error(e.to_error_code()),
            };

        let call = VerbCall {
            verb_name: verb,
            location: parent,
            this: self.top().this,
            player: self.top().player,
            args: args.iter().collect(),
            argstr: "".to_string(),
            caller: self.caller(),
        };

        ExecutionResult::ContinueVerb {
            permissions,
            resolved_verb,
            program,
            call,
            command: self.top().command.clone(),
            trampoline: None,
            trampoline_arg: None,
        }
    }

    /// Entry point from the task for actually beginning the dispatch of a
    /// method execution in this VM: creates the activation record and puts
    /// it on the stack.
    pub(crate) fn exec_call_request(&mut self, call_request: VerbExecutionRequest) {
        let a = Activation::for_call(call_request);
        self.stack.push(a);
    }

    pub(crate) fn exec_eval_request(&mut self, permissions: Obj, player: Obj, program: Program) {
        let a = Activation::for_eval(permissions, player, program);
        self.stack.push(a);
    }

    /// Prepare a new stack for invocation of a forked task: an activation
    /// copied from the forking task, with the fork vector swapped in as the
    /// main vector.
    pub(crate) fn exec_fork_vector(&mut self, fork_request: Fork) {
        let mut a = fork_request.activation;

        let Frame::Moo(ref mut frame) = a.frame else {
            panic!("Attempt to fork a non-MOO frame");
        };

        let fork_vector =
            frame.program.fork_vectors[fork_request.fork_vector_offset.0 as usize].clone();
        frame.program.main_vector = Arc::new(fork_vector);
        frame.pc = 0;
        frame.valstack.clear();
        frame.scope_stack.clear();
        if let Some(task_id_name) = fork_request.task_id {
            frame
                .set_variable(&task_id_name, etamoo_var::v_int(self.task_id as i64))
                .expect("Unable to set task_id in activation frame");
        }

        self.stack = vec![a];
    }

    /// Check the builtin's declared signature before the body runs: argument
    /// count errors are E_ARGS, argument type errors E_TYPE.
    pub(crate) fn check_builtin_args(bf_id: BuiltinId, args: &[Var]) -> Result<(), etamoo_var::Error> {
        let Some(desc) = BUILTINS.description_for(bf_id) else {
            panic!("Builtin {bf_id:?} has no descriptor");
        };
        if let ArgCount::Q(min) = desc.min_args {
            if args.len() < min {
                return Err(E_ARGS
                    .with_msg(|| format!("{} requires at least {min} arguments", desc.name)));
            }
        }
        if let ArgCount::Q(max) = desc.max_args {
            if args.len() > max {
                return Err(E_ARGS
                    .with_msg(|| format!("{} takes at most {max} arguments", desc.name)));
            }
        }
        for (i, arg) in args.iter().enumerate() {
            let Some(arg_type) = desc.types.get(i) else {
                break;
            };
            let ok = match arg_type {
                ArgType::Any => true,
                ArgType::AnyNum => matches!(
                    arg.type_code(),
                    VarType::TYPE_INT | VarType::TYPE_FLOAT
                ),
                ArgType::Typed(t) => t.accepts(arg.type_code()),
            };
            if !ok {
                return Err(E_TYPE.with_msg(|| {
                    format!(
                        "invalid argument {} to {} ({} expected)",
                        i + 1,
                        desc.name,
                        arg_type_name(arg_type)
                    )
                }));
            }
        }
        Ok(())
    }

    /// Call into a builtin function, pushing a Bf activation frame for it.
    pub(crate) fn call_builtin_function(
        &mut self,
        bf_id: BuiltinId,
        args: Vec<Var>,
        exec_params: &VmExecParams,
        world_state: &mut dyn WorldState,
        session: Arc<dyn Session>,
    ) -> ExecutionResult {
        if let Err(e) = Self::check_builtin_args(bf_id, &args) {
            return self.push_error(e);
        }

        let bf = crate::builtins::BF_REGISTRY.builtin_for(&bf_id);
        let bf_name = BUILTINS.name_of(bf_id).expect("Builtin not found");
        trace!("Calling builtin: {}/{}", bf_name, args.len());

        // Push an activation frame for the builtin function.
        self.stack.push(Activation::for_bf_call(
            bf_id,
            bf_name.clone(),
            args.clone(),
            self.top().player,
        ));
        let mut bf_args = BfCallState {
            name: bf_name,
            args,
            exec_state: self,
            world_state,
            session: session.clone(),
            task_scheduler_client: exec_params.task_scheduler_client.clone(),
        };

        match bf(&mut bf_args) {
            Ok(BfRet::Ret(result)) => self.unwind_stack(FinallyReason::Return(result)),
            Ok(BfRet::VmInstr(vmi)) => vmi,
            Err(BfErr::Code(c)) => self.push_bf_error(c.into()),
            Err(BfErr::Raise(e)) => self.push_bf_error(e),
            Err(BfErr::Rollback) => ExecutionResult::RollbackRestart,
        }
    }

    /// We're returning into a builtin function that's at the top of the
    /// stack, after a verb call it dispatched completed.
    pub(crate) fn reenter_builtin_function(
        &mut self,
        exec_params: &VmExecParams,
        world_state: &mut dyn WorldState,
        session: Arc<dyn Session>,
    ) -> ExecutionResult {
        let bf_frame = match &self.top().frame {
            Frame::Bf(frame) => frame,
            _ => panic!("Expected a BF frame at the top of the stack"),
        };

        // Functions that did not set a trampoline are assumed to be complete;
        // just unwind with whatever value the callee left.
        if bf_frame.bf_trampoline.is_none() {
            let return_value = bf_frame
                .return_value
                .clone()
                .expect("No return value set for built-in function");
            return self.unwind_stack(FinallyReason::Return(return_value));
        }

        let bf_id = bf_frame.bf_id;
        let bf = crate::builtins::BF_REGISTRY.builtin_for(&bf_id);
        let bf_name = BUILTINS.name_of(bf_id).expect("Builtin not found");
        trace!(%bf_name, "Reentering builtin function");

        let args = self.top().args.clone();
        let mut bf_args = BfCallState {
            name: bf_name,
            args,
            exec_state: self,
            world_state,
            session: session.clone(),
            task_scheduler_client: exec_params.task_scheduler_client.clone(),
        };

        match bf(&mut bf_args) {
            Ok(BfRet::Ret(result)) => self.unwind_stack(FinallyReason::Return(result)),
            Ok(BfRet::VmInstr(vmi)) => vmi,
            Err(BfErr::Code(c)) => self.push_bf_error(c.into()),
            Err(BfErr::Raise(e)) => self.push_bf_error(e),
            Err(BfErr::Rollback) => ExecutionResult::RollbackRestart,
        }
    }
}

fn arg_type_name(t: &ArgType) -> &'static str {
    match t {
        ArgType::Any => "any",
        ArgType::AnyNum => "number",
        ArgType::Typed(t) => match t {
            VarType::TYPE_INT => "integer",
            VarType::TYPE_OBJ => "object",
            VarType::TYPE_STR => "string",
            VarType::TYPE_ERR => "error",
            VarType::TYPE_LIST => "list",
            VarType::TYPE_FLOAT => "float",
            _ => "value",
        },
    }
}
