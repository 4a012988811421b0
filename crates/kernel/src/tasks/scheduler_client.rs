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
use crate::tasks::task_messages::{SchedulerClientMsg, SchedulerControlMsg, SchedulerMessage};
use crate::tasks::{TaskHandle, TaskId, TaskResult};
use crate::vm::Fork;
use etamoo_common::model::Perms;
use etamoo_common::tasks::{SchedulerError, Session, TaskDescription};
use etamoo_var::program::Program;
use etamoo_var::{v_err, Obj, Symbol, Var, E_INVARG};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// The handle external parties (hosts, the daemon, tests) use to talk to the
/// scheduler.
#[derive(Clone)]
pub struct SchedulerClient {
    sender: flume::Sender<SchedulerMessage>,
}

impl SchedulerClient {
    pub(crate) fn new(sender: flume::Sender<SchedulerMessage>) -> Self {
        Self { sender }
    }

    fn submit(
        &self,
        msg: SchedulerClientMsg,
        reply: oneshot::Receiver<Result<TaskHandle, SchedulerError>>,
    ) -> Result<TaskHandle, SchedulerError> {
        self.sender
            .send(SchedulerMessage::Client(msg))
            .map_err(|_| SchedulerError::SchedulerNotResponding)?;
        reply
            .recv()
            .map_err(|_| SchedulerError::SchedulerNotResponding)?
    }

    /// Submit a player command line for parsing and dispatch.
    pub fn submit_command_task(
        &self,
        player: Obj,
        command: &str,
        session: Arc<dyn Session>,
    ) -> Result<TaskHandle, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.submit(
            SchedulerClientMsg::SubmitCommandTask {
                player,
                command: command.to_string(),
                session,
                reply: tx,
            },
            rx,
        )
    }

    /// Submit a direct verb invocation (e.g. `:user_connected` from a host).
    #[allow(clippy::too_many_arguments)]
    pub fn submit_verb_task(
        &self,
        player: Obj,
        vloc: Obj,
        verb: Symbol,
        args: Vec<Var>,
        argstr: String,
        perms: Obj,
        session: Arc<dyn Session>,
    ) -> Result<TaskHandle, SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.submit(
            SchedulerClientMsg::SubmitVerbTask {
                player,
                vloc,
                verb,
                args,
                argstr,
                perms,
                session,
                reply: tx,
            },
            rx,
        )
    }

    /// Compile and submit a `;code` evaluation.
    pub fn submit_eval_task(
        &self,
        player: Obj,
        perms: Obj,
        code: &str,
        session: Arc<dyn Session>,
    ) -> Result<TaskHandle, SchedulerError> {
        let program = etamoo_compiler::compile(code)
            .map_err(|e| SchedulerError::CompilationError(e.to_string()))?;
        let (tx, rx) = oneshot::channel();
        self.submit(
            SchedulerClientMsg::SubmitEvalTask {
                player,
                perms,
                program,
                session,
                reply: tx,
            },
            rx,
        )
    }

    /// Deliver a line of input for a task blocked in `read()`.
    pub fn submit_requested_input(
        &self,
        player: Obj,
        input: &str,
    ) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerMessage::Client(SchedulerClientMsg::SubmitInput {
                player,
                input: input.to_string(),
                reply: tx,
            }))
            .map_err(|_| SchedulerError::SchedulerNotResponding)?;
        rx.recv().map_err(|_| SchedulerError::SchedulerNotResponding)?
    }

    pub fn submit_shutdown(&self, message: Option<String>) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerMessage::Client(SchedulerClientMsg::Shutdown {
                message,
                reply: tx,
            }))
            .map_err(|_| SchedulerError::SchedulerNotResponding)?;
        rx.recv().map_err(|_| SchedulerError::SchedulerNotResponding)?
    }

    pub fn request_checkpoint(&self) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerMessage::Client(SchedulerClientMsg::Checkpoint {
                reply: tx,
            }))
            .map_err(|_| SchedulerError::SchedulerNotResponding)?;
        rx.recv().map_err(|_| SchedulerError::SchedulerNotResponding)?
    }
}

/// The handle a *running task* uses to talk to the scheduler: the same
/// mailbox, stamped with the task's id.
#[derive(Clone)]
pub struct TaskSchedulerClient {
    task_id: TaskId,
    sender: flume::Sender<SchedulerMessage>,
}

impl TaskSchedulerClient {
    pub(crate) fn new(task_id: TaskId, sender: flume::Sender<SchedulerMessage>) -> Self {
        Self { task_id, sender }
    }

    pub(crate) fn with_task_id(&self, task_id: TaskId) -> Self {
        Self {
            task_id,
            sender: self.sender.clone(),
        }
    }

    fn send(&self, msg: SchedulerControlMsg) {
        if self
            .sender
            .send(SchedulerMessage::Task(self.task_id, msg))
            .is_err()
        {
            error!(
                task_id = self.task_id,
                "Scheduler gone while sending task control message"
            );
        }
    }

    pub(crate) fn task_success(&self, value: Var) {
        self.send(SchedulerControlMsg::TaskSuccess(value));
    }

    pub(crate) fn conflict_retry(&self, task: Task) {
        self.send(SchedulerControlMsg::TaskConflictRetry(Box::new(task)));
    }

    pub(crate) fn verb_not_found(&self, this: Obj, verb: Symbol) {
        self.send(SchedulerControlMsg::TaskVerbNotFound(this, verb));
    }

    pub(crate) fn command_error(&self, err: etamoo_common::tasks::CommandError) {
        self.send(SchedulerControlMsg::TaskCommandError(err));
    }

    pub(crate) fn abort_cancelled(&self) {
        self.send(SchedulerControlMsg::TaskAbortCancelled);
    }

    pub(crate) fn abort_limits_reached(&self, reason: etamoo_common::tasks::AbortLimitReason) {
        self.send(SchedulerControlMsg::TaskAbortLimitsReached(reason));
    }

    pub(crate) fn task_exception(&self, exception: etamoo_common::tasks::Exception) {
        self.send(SchedulerControlMsg::TaskException(exception));
    }

    /// Ask the scheduler to create a forked task, blocking for the new id.
    pub(crate) fn request_fork(&self, fork: Fork) -> TaskId {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerControlMsg::TaskRequestFork(Box::new(fork), tx));
        rx.recv().expect("Could not get fork reply from scheduler")
    }

    pub(crate) fn suspend(&self, resume_time: Option<Instant>, task: Task) {
        self.send(SchedulerControlMsg::TaskSuspend(resume_time, Box::new(task)));
    }

    pub(crate) fn request_input(&self, task: Task) {
        self.send(SchedulerControlMsg::TaskRequestInput(Box::new(task)));
    }

    pub(crate) fn request_queued_tasks(&self) -> Vec<TaskDescription> {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerControlMsg::RequestQueuedTasks(tx));
        rx.recv().unwrap_or_default()
    }

    pub(crate) fn kill_task(&self, victim: TaskId, sender_permissions: Perms) -> Var {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerControlMsg::KillTask {
            victim,
            sender_permissions,
            result_sender: tx,
        });
        rx.recv().unwrap_or_else(|_| v_err(E_INVARG))
    }

    pub(crate) fn resume_task(
        &self,
        victim: TaskId,
        value: Var,
        sender_permissions: Perms,
    ) -> Var {
        let (tx, rx) = oneshot::channel();
        self.send(SchedulerControlMsg::ResumeTask {
            victim,
            value,
            sender_permissions,
            result_sender: tx,
        });
        rx.recv().unwrap_or_else(|_| v_err(E_INVARG))
    }

    pub(crate) fn boot_player(&self, player: Obj) {
        self.send(SchedulerControlMsg::BootPlayer(player));
    }

    pub(crate) fn shutdown(&self, message: Option<String>) {
        self.send(SchedulerControlMsg::Shutdown(message));
    }

    pub(crate) fn checkpoint(&self) {
        self.send(SchedulerControlMsg::Checkpoint);
    }

    pub(crate) fn refresh_server_options(&self) {
        self.send(SchedulerControlMsg::RefreshServerOptions);
    }
}

/// Wait for a task result with the usual impatience of tests and the REPL.
pub fn wait_task_result(handle: TaskHandle) -> TaskResult {
    match handle.into_receiver().recv() {
        Ok(result) => result,
        Err(_) => TaskResult::Error(SchedulerError::SchedulerNotResponding),
    }
}
