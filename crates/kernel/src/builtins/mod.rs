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

mod bf_list_sets;
mod bf_num;
mod bf_objects;
mod bf_properties;
pub mod bf_server;
mod bf_strings;
mod bf_values;
mod bf_verbs;

use crate::tasks::scheduler_client::TaskSchedulerClient;
use crate::vm::activation::{BfFrame, Frame};
use crate::vm::{ExecutionResult, VMExecState};
use etamoo_common::model::{Perms, WorldState, WorldStateError};
use etamoo_common::tasks::Session;
use etamoo_compiler::BUILTINS;
use etamoo_var::program::BuiltinId;
use etamoo_var::{Error, ErrorCode, Obj, Symbol, Var};
use std::sync::Arc;

use bf_list_sets::register_bf_list_sets;
use bf_num::register_bf_num;
use bf_objects::register_bf_objects;
use bf_properties::register_bf_properties;
use bf_server::register_bf_server;
use bf_strings::register_bf_strings;
use bf_values::register_bf_values;
use bf_verbs::register_bf_verbs;
use lazy_static::lazy_static;

lazy_static! {
    /// The one implementation table, parallel to the descriptor table
    /// (`BUILTINS`) in the compiler.
    pub static ref BF_REGISTRY: BuiltinRegistry = BuiltinRegistry::new();
}

/// A builtin function implementation: plain function pointers, dispatched by
/// table offset.
pub(crate) type BuiltinFunction = fn(&mut BfCallState<'_>) -> Result<BfRet, BfErr>;

/// The stub for unimplemented table entries.
pub(crate) fn bf_noop(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Err(BfErr::Raise(ErrorCode::E_INVARG.with_msg(|| {
        format!("builtin {} is not implemented", bf_args.name)
    })))
}

/// The bundle of builtin implementations, indexed parallel to the descriptor
/// table in the compiler.
pub struct BuiltinRegistry {
    builtins: Vec<BuiltinFunction>,
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        let mut builtins: Vec<BuiltinFunction> = vec![bf_noop; BUILTINS.len()];
        register_bf_values(&mut builtins);
        register_bf_num(&mut builtins);
        register_bf_strings(&mut builtins);
        register_bf_list_sets(&mut builtins);
        register_bf_objects(&mut builtins);
        register_bf_properties(&mut builtins);
        register_bf_verbs(&mut builtins);
        register_bf_server(&mut builtins);
        BuiltinRegistry { builtins }
    }

    pub(crate) fn builtin_for(&self, id: &BuiltinId) -> BuiltinFunction {
        self.builtins[id.0 as usize]
    }
}

/// The arguments and other state passed to a built-in function.
pub(crate) struct BfCallState<'a> {
    /// The name of the invoked function.
    pub(crate) name: Symbol,
    /// Arguments passed to the function.
    pub(crate) args: Vec<Var>,
    /// The current execution state of this task in this VM, including the
    /// stack, so that BFs can inspect and manipulate it.
    pub(crate) exec_state: &'a mut VMExecState,
    /// Handle to the current database transaction.
    pub(crate) world_state: &'a mut dyn WorldState,
    /// For connection / message management.
    pub(crate) session: Arc<dyn Session>,
    /// For sending messages up to the scheduler.
    pub(crate) task_scheduler_client: TaskSchedulerClient,
}

impl BfCallState<'_> {
    pub fn caller_perms(&self) -> Obj {
        self.exec_state.caller_perms()
    }

    pub fn task_perms_who(&self) -> Obj {
        self.exec_state.task_perms()
    }

    pub fn task_perms(&self) -> Result<Perms, WorldStateError> {
        let who = self.task_perms_who();
        let flags = self.world_state.flags_of(who)?;
        Ok(Perms::new(who, flags))
    }

    pub fn bf_frame_mut(&mut self) -> &mut BfFrame {
        let Frame::Bf(frame) = &mut self.exec_state.top_mut().frame else {
            panic!("Expected a BF frame at the top of the stack");
        };
        frame
    }

    pub fn bf_trampoline(&self) -> Option<usize> {
        let Frame::Bf(frame) = &self.exec_state.top().frame else {
            panic!("Expected a BF frame at the top of the stack");
        };
        frame.bf_trampoline
    }

    pub fn bf_trampoline_arg(&self) -> Option<Var> {
        let Frame::Bf(frame) = &self.exec_state.top().frame else {
            panic!("Expected a BF frame at the top of the stack");
        };
        frame.bf_trampoline_arg.clone()
    }
}

/// Return possibilities from a built-in function.
pub(crate) enum BfRet {
    /// Successful return, with a value for the caller.
    Ret(Var),
    /// The BF wants the VM to do something on its behalf: suspend, dispatch
    /// a verb call, fork, and so on.
    VmInstr(ExecutionResult),
}

/// Failure possibilities from a built-in function.
#[derive(Debug)]
pub(crate) enum BfErr {
    /// A bare error code.
    Code(ErrorCode),
    /// A full error, message and value included.
    Raise(Error),
    /// The transaction hit a conflict; restart the task.
    Rollback,
}

/// The common translation from world-state errors into builtin errors.
pub(crate) fn world_state_bf_err(err: WorldStateError) -> BfErr {
    match err {
        WorldStateError::RollbackRetry => BfErr::Rollback,
        e => BfErr::Raise(e.to_error_code()),
    }
}
