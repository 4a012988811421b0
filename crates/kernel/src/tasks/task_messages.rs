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

use crate::tasks::task::Task;
use crate::tasks::{TaskHandle, TaskId, TaskResult};
use crate::vm::Fork;
use etamoo_common::matching::ParsedCommand;
use etamoo_common::model::Perms;
use etamoo_common::tasks::{
    AbortLimitReason, CommandError, Exception, SchedulerError, Session, TaskDescription,
};
use etamoo_var::program::Program;
use etamoo_var::{Obj, Symbol, Var};
use std::sync::Arc;
use std::time::Instant;

/// What a fresh task was asked to do.
#[derive(Clone, Debug)]
pub enum TaskStart {
    /// A player command, to be parsed and dispatched.
    StartCommandVerb { player: Obj, command: String },
    /// A direct verb invocation.
    StartVerb {
        player: Obj,
        vloc: Obj,
        verb: Symbol,
        args: Vec<Var>,
        argstr: String,
    },
    /// The body of a `fork` statement.
    StartFork {
        fork_request: Box<Fork>,
        suspended: bool,
    },
    /// An `eval` of an already-compiled program.
    StartEval { player: Obj, program: Program },
}

impl TaskStart {
    pub fn is_background(&self) -> bool {
        matches!(self, TaskStart::StartFork { .. })
    }
}

/// Everything a running task can say to the scheduler.
pub enum SchedulerControlMsg {
    /// The task completed and committed, with this value.
    TaskSuccess(Var),
    /// The task's commit lost a race; run it again from its last suspension
    /// point.
    TaskConflictRetry(Box<Task>),
    /// The command verb could not be resolved.
    TaskVerbNotFound(Obj, Symbol),
    /// Command parse/dispatch failed.
    TaskCommandError(CommandError),
    /// The task was killed or aborted.
    TaskAbortCancelled,
    /// The task blew its tick or seconds budget.
    TaskAbortLimitsReached(AbortLimitReason),
    /// An exception reached the top of the task.
    TaskException(Exception),
    /// A `fork` statement wants a new task; reply with its id.
    TaskRequestFork(Box<Fork>, oneshot::Sender<TaskId>),
    /// The task has committed and wants to sleep until the given instant
    /// (or indefinitely).
    TaskSuspend(Option<Instant>, Box<Task>),
    /// The task has committed and is waiting for a line of input from its
    /// player's connection.
    TaskRequestInput(Box<Task>),
    /// `queued_tasks()` wants descriptions of the suspended tasks.
    RequestQueuedTasks(oneshot::Sender<Vec<TaskDescription>>),
    /// `kill_task(victim)`; the reply is the builtin's return value or an
    /// error value to raise.
    KillTask {
        victim: TaskId,
        sender_permissions: Perms,
        result_sender: oneshot::Sender<Var>,
    },
    /// `resume(victim, value)`.
    ResumeTask {
        victim: TaskId,
        value: Var,
        sender_permissions: Perms,
        result_sender: oneshot::Sender<Var>,
    },
    /// `boot_player(player)`.
    BootPlayer(Obj),
    /// `shutdown(message)`.
    Shutdown(Option<String>),
    /// `dump_database()`.
    Checkpoint,
    /// `load_server_options()`.
    RefreshServerOptions,
}

/// Requests from outside the scheduler: hosts, the daemon, tests.
pub enum SchedulerClientMsg {
    SubmitCommandTask {
        player: Obj,
        command: String,
        session: Arc<dyn Session>,
        reply: oneshot::Sender<Result<TaskHandle, SchedulerError>>,
    },
    SubmitVerbTask {
        player: Obj,
        vloc: Obj,
        verb: Symbol,
        args: Vec<Var>,
        argstr: String,
        perms: Obj,
        session: Arc<dyn Session>,
        reply: oneshot::Sender<Result<TaskHandle, SchedulerError>>,
    },
    SubmitEvalTask {
        player: Obj,
        perms: Obj,
        program: Program,
        session: Arc<dyn Session>,
        reply: oneshot::Sender<Result<TaskHandle, SchedulerError>>,
    },
    /// A line of input arrived for a task in the Reading state.
    SubmitInput {
        player: Obj,
        input: String,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Stop the world.
    Shutdown {
        message: Option<String>,
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Checkpoint {
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
}

/// The scheduler's single inbound mailbox.
pub enum SchedulerMessage {
    Client(SchedulerClientMsg),
    Task(TaskId, SchedulerControlMsg),
}

/// Carried through task startup so command dispatch can hand the parse
/// results to the activation.
#[derive(Clone, Debug)]
pub struct DispatchedCommand {
    pub parsed: ParsedCommand,
    pub target: Obj,
}
