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

//! A LambdaMOO 1.8.x compatibl(ish) virtual machine. Executes opcodes which
//! are essentially 1:1 with LambdaMOO's, so the semantics of existing cores
//! carry over. The explicit pc / operand-stack / activation-stack shape is
//! what lets a task be paused mid-expression and resumed later.

pub(crate) mod activation;
pub(crate) mod exec_state;
pub(crate) mod moo_execute;
pub(crate) mod moo_frame;
pub(crate) mod vm_call;
pub(crate) mod vm_unwind;

pub use activation::{Activation, BfFrame, Frame};
pub use exec_state::VMExecState;
pub use vm_call::{VerbExecutionRequest, VerbProgram};
pub use vm_unwind::FinallyReason;

use crate::tasks::scheduler_client::TaskSchedulerClient;
use crate::tasks::{TaskId, VerbCall};
use etamoo_common::matching::ParsedCommand;
use etamoo_common::model::VerbDef;
use etamoo_var::program::{Name, Offset, Program};
use etamoo_var::{Obj, Var};
use std::time::Duration;

/// The set of parameters for a VM-requested fork.
#[derive(Clone, Debug)]
pub struct Fork {
    /// The player. This is in the activation as well, but it's nicer to have
    /// it up here and explicit.
    pub player: Obj,
    /// The permissions context for the forked task.
    pub progr: Obj,
    /// The task ID of the task that forked us.
    pub parent_task_id: TaskId,
    /// The time to delay before starting the forked task, if any.
    pub delay: Option<Duration>,
    /// A copy of the activation record from the task that forked us.
    pub activation: Activation,
    /// The offset into the fork vector table of the forked body.
    pub fork_vector_offset: Offset,
    /// The (optional) variable where the task ID of the new task is stored,
    /// in both the parent activation and the new task's activation.
    pub task_id: Option<Name>,
}

/// Represents the set of parameters passed to the VM for execution.
pub struct VmExecParams {
    pub task_scheduler_client: TaskSchedulerClient,
    pub max_stack_depth: usize,
}

/// What the VM wants the task to do next, every time it yields out of the
/// opcode loop.
#[derive(Debug)]
pub enum ExecutionResult {
    /// All is well. The task should let the VM continue executing.
    More,
    /// Execution of this call stack is complete.
    Complete(Var),
    /// An exception or unwinding condition reached the top of the task.
    Exception(FinallyReason),
    /// Request dispatch to another verb.
    ContinueVerb {
        /// The applicable permissions context.
        permissions: Obj,
        /// The requested verb.
        resolved_verb: VerbDef,
        /// The program for that verb.
        program: Program,
        /// The call parameters that were used to resolve the verb.
        call: VerbCall,
        /// The parsed user command that led to this verb dispatch, if any.
        command: Option<ParsedCommand>,
        /// What to set the 'trampoline' to (if anything) when the verb
        /// returns. If set, the builtin function that issued this
        /// ContinueVerb is re-entered with this counter, driving its state
        /// machine through a series of verb calls.
        trampoline: Option<usize>,
        /// An optional argument carried along with the trampoline counter.
        trampoline_arg: Option<Var>,
    },
    /// Request dispatch of a new task as a fork.
    DispatchFork(Fork),
    /// Request that this task be suspended for a duration of time. The task
    /// commits its transaction, suspends, and resumes under a new one.
    /// None means indefinitely: until `resume()` or `kill_task()`.
    Suspend(Option<Duration>),
    /// Request a line of input from the task's player connection.
    NeedInput,
    /// Request `eval` execution: an activation for an already-compiled
    /// program.
    PerformEval {
        permissions: Obj,
        player: Obj,
        program: Program,
    },
    /// The database reported a conflict mid-transaction; the task should
    /// roll back and restart from its last suspension point.
    RollbackRestart,
}
