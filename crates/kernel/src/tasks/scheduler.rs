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

//! The task scheduler: the single place where tasks are born, suspended,
//! woken, killed and reaped. Exactly one task executes MOO code at a time
//! per task thread, but the scheduler itself never runs verb code; it shunts
//! tasks and their transactions around and answers the task-related
//! builtins.

use crate::tasks::scheduler_client::{SchedulerClient, TaskSchedulerClient};
use crate::tasks::suspension::{SuspendedTask, SuspensionQ, WakeCondition};
use crate::tasks::task::Task;
use crate::tasks::task_messages::{
    SchedulerClientMsg, SchedulerControlMsg, SchedulerMessage, TaskStart,
};
use crate::tasks::{TaskHandle, TaskId, TaskResult};
use etamoo_common::model::{ObjFlag, WorldStateSource};
use etamoo_common::tasks::{
    AbortLimitReason, CommandError, Exception, SchedulerError, Session, TaskDescription,
};
use etamoo_var::{v_err, v_int, Obj, Var, E_INVARG, E_PERM};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// What the scheduler remembers about a task that is currently executing on
/// its own thread.
struct RunningTask {
    player: Obj,
    kill_switch: Arc<AtomicBool>,
    session: Arc<dyn Session>,
    result_sender: Option<oneshot::Sender<TaskResult>>,
}

pub struct Scheduler {
    db: Arc<dyn WorldStateSource>,
    sender: flume::Sender<SchedulerMessage>,
    receiver: flume::Receiver<SchedulerMessage>,
    next_task_id: TaskId,
    running_tasks: HashMap<TaskId, RunningTask>,
    suspended: SuspensionQ,
    running: bool,
}

impl Scheduler {
    pub fn new(db: Arc<dyn WorldStateSource>) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            db,
            sender,
            receiver,
            next_task_id: 1,
            running_tasks: HashMap::new(),
            suspended: SuspensionQ::default(),
            running: false,
        }
    }

    pub fn client(&self) -> SchedulerClient {
        SchedulerClient::new(self.sender.clone())
    }

    /// The scheduler loop. Blocks until shutdown; normally run on its own
    /// thread.
    pub fn run(mut self) {
        self.running = true;
        info!("Scheduler started");
        while self.running {
            // Sleep until the next timed wake-up, or a message.
            let timeout = self
                .suspended
                .next_wake_time()
                .map(|wake| wake.saturating_duration_since(Instant::now()))
                .unwrap_or(Duration::from_secs(5));

            match self.receiver.recv_timeout(timeout) {
                Ok(SchedulerMessage::Client(msg)) => self.handle_client_msg(msg),
                Ok(SchedulerMessage::Task(task_id, msg)) => self.handle_task_msg(task_id, msg),
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => {
                    error!("Scheduler mailbox disconnected; shutting down");
                    break;
                }
            }

            self.wake_due_tasks();
        }
        info!("Scheduler done");
    }

    fn new_task_id(&mut self) -> TaskId {
        let id = self.next_task_id;
        self.next_task_id += 1;
        id
    }

    /// Create a task and spin up its thread.
    #[allow(clippy::too_many_arguments)]
    fn start_task(
        &mut self,
        task_id: TaskId,
        player: Obj,
        perms: Obj,
        task_start: TaskStart,
        session: Arc<dyn Session>,
        result_sender: Option<oneshot::Sender<TaskResult>>,
    ) {
        let kill_switch = Arc::new(AtomicBool::new(false));
        let task_scheduler_client = TaskSchedulerClient::new(task_id, self.sender.clone());
        let server_options = self.db.server_options();
        let task = Task::new(
            task_id,
            player,
            task_start,
            perms,
            &server_options,
            session.clone(),
            task_scheduler_client.clone(),
            kill_switch.clone(),
        );

        self.running_tasks.insert(
            task_id,
            RunningTask {
                player,
                kill_switch,
                session,
                result_sender,
            },
        );

        let world_state = match self.db.new_world_state() {
            Ok(ws) => ws,
            Err(e) => {
                error!(error = ?e, "Could not start transaction for task");
                self.reap_task(task_id, TaskResult::Error(SchedulerError::CouldNotStartTask));
                return;
            }
        };

        let thread_name = format!("moo-task-{task_id}");
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                Task::run_task_loop(task, &task_scheduler_client, world_state);
            })
            .expect("Could not spawn task thread");
    }

    /// Resume a previously suspended task on a fresh transaction. A resume
    /// value of None means "re-arm from the retry snapshot" (conflict
    /// retry).
    fn resume_task_thread(
        &mut self,
        mut task: Task,
        resume_value: Option<Var>,
        session: Arc<dyn Session>,
        result_sender: Option<oneshot::Sender<TaskResult>>,
    ) {
        let task_id = task.task_id;
        let task_scheduler_client = TaskSchedulerClient::new(task_id, self.sender.clone());

        // A task that never began (a scheduled fork) just gets its first
        // thread; the run loop will set it up from its TaskStart.
        if !task.vm_host.is_fresh() {
            match resume_value {
                Some(value) => task.resume(value),
                None => task.reactivate(),
            }
        }
        self.running_tasks.insert(
            task_id,
            RunningTask {
                player: task.player,
                kill_switch: task.kill_switch.clone(),
                session,
                result_sender,
            },
        );

        let world_state = match self.db.new_world_state() {
            Ok(ws) => ws,
            Err(e) => {
                error!(error = ?e, "Could not start transaction for resumed task");
                self.reap_task(task_id, TaskResult::Error(SchedulerError::CouldNotStartTask));
                return;
            }
        };
        let thread_name = format!("moo-task-{task_id}");
        std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                Task::run_task_loop(task, &task_scheduler_client, world_state);
            })
            .expect("Could not spawn task thread");
    }

    /// Re-run a task that hit a commit conflict, from its last suspension
    /// point (or from scratch if it never suspended).
    fn retry_task(&mut self, mut task: Task) {
        let task_id = task.task_id;
        warn!(task_id, "Retrying task after conflict");
        let Some(running) = self.running_tasks.remove(&task_id) else {
            error!(task_id, "Conflicted task not found in running set");
            return;
        };
        // Throw away any buffered output from the failed attempt.
        if let Err(e) = running.session.rollback() {
            warn!(task_id, error = ?e, "Could not rollback session");
        }

        if task.has_suspended {
            // Restart from the snapshot taken at the last suspension.
            task.restore_from_retry_state();
            self.resume_task_thread(task, None, running.session, running.result_sender);
        } else {
            // Never suspended: nothing committed, safe to replay the start.
            let start = task.task_start.clone();
            let player = task.player;
            let perms = task.perms;
            self.start_task(
                task_id,
                player,
                perms,
                start,
                running.session,
                running.result_sender,
            );
        }
    }

    fn handle_client_msg(&mut self, msg: SchedulerClientMsg) {
        match msg {
            SchedulerClientMsg::SubmitCommandTask {
                player,
                command,
                session,
                reply,
            } => {
                let task_id = self.new_task_id();
                let (result_tx, result_rx) = oneshot::channel();
                let task_start = TaskStart::StartCommandVerb { player, command };
                self.start_task(
                    task_id,
                    player,
                    player,
                    task_start,
                    session,
                    Some(result_tx),
                );
                let _ = reply.send(Ok(TaskHandle(task_id, result_rx)));
            }
            SchedulerClientMsg::SubmitVerbTask {
                player,
                vloc,
                verb,
                args,
                argstr,
                perms,
                session,
                reply,
            } => {
                let task_id = self.new_task_id();
                let (result_tx, result_rx) = oneshot::channel();
                let task_start = TaskStart::StartVerb {
                    player,
                    vloc,
                    verb,
                    args,
                    argstr,
                };
                self.start_task(task_id, player, perms, task_start, session, Some(result_tx));
                let _ = reply.send(Ok(TaskHandle(task_id, result_rx)));
            }
            SchedulerClientMsg::SubmitEvalTask {
                player,
                perms,
                program,
                session,
                reply,
            } => {
                let task_id = self.new_task_id();
                let (result_tx, result_rx) = oneshot::channel();
                let task_start = TaskStart::StartEval { player, program };
                self.start_task(task_id, player, perms, task_start, session, Some(result_tx));
                let _ = reply.send(Ok(TaskHandle(task_id, result_rx)));
            }
            SchedulerClientMsg::SubmitInput {
                player,
                input,
                reply,
            } => {
                let Some(task_id) = self.suspended.reading_task_for(player) else {
                    let _ = reply.send(Err(SchedulerError::TaskNotFound(0)));
                    return;
                };
                let entry = self
                    .suspended
                    .remove(task_id)
                    .expect("reading task vanished");
                self.resume_task_thread(
                    entry.task,
                    Some(etamoo_var::v_str(&input)),
                    entry.session,
                    entry.result_sender,
                );
                let _ = reply.send(Ok(()));
            }
            SchedulerClientMsg::Shutdown { message, reply } => {
                info!(?message, "Shutdown requested");
                self.stop_all_tasks(message);
                let _ = reply.send(Ok(()));
                self.running = false;
            }
            SchedulerClientMsg::Checkpoint { reply } => {
                let result = self
                    .db
                    .checkpoint()
                    .map_err(|e| SchedulerError::CommandExecutionError(e.into()));
                let _ = reply.send(result);
            }
        }
    }

    fn handle_task_msg(&mut self, task_id: TaskId, msg: SchedulerControlMsg) {
        match msg {
            SchedulerControlMsg::TaskSuccess(value) => {
                if let Some(running) = self.running_tasks.get(&task_id) {
                    if let Err(e) = running.session.commit() {
                        warn!(task_id, error = ?e, "Could not commit session output");
                    }
                }
                self.reap_task(task_id, TaskResult::Success(value));
            }
            SchedulerControlMsg::TaskConflictRetry(task) => {
                self.retry_task(*task);
            }
            SchedulerControlMsg::TaskVerbNotFound(this, verb) => {
                warn!(task_id, ?this, %verb, "Verb not found for task");
                self.reap_task(
                    task_id,
                    TaskResult::Error(SchedulerError::CommandExecutionError(
                        CommandError::NoCommandMatch,
                    )),
                );
            }
            SchedulerControlMsg::TaskCommandError(err) => {
                self.notify_task_player(task_id, &command_error_message(&err));
                self.reap_task(
                    task_id,
                    TaskResult::Error(SchedulerError::CommandExecutionError(err)),
                );
            }
            SchedulerControlMsg::TaskAbortCancelled => {
                self.notify_task_player(task_id, "Task aborted.");
                self.reap_task(task_id, TaskResult::Error(SchedulerError::TaskAbortedCancelled));
            }
            SchedulerControlMsg::TaskAbortLimitsReached(reason) => {
                let message = match &reason {
                    AbortLimitReason::Ticks(_) => "Task aborted (out of ticks).",
                    AbortLimitReason::Time(_) => "Task aborted (out of seconds).",
                };
                self.notify_task_player(task_id, message);
                self.reap_task(
                    task_id,
                    TaskResult::Error(SchedulerError::TaskAbortedLimit(reason)),
                );
            }
            SchedulerControlMsg::TaskException(exception) => {
                self.report_exception(task_id, &exception);
                self.reap_task(
                    task_id,
                    TaskResult::Error(SchedulerError::TaskAbortedException(exception)),
                );
            }
            SchedulerControlMsg::TaskRequestFork(fork, reply) => {
                let new_task_id = self.new_task_id();
                let delay = fork.delay;
                let player = fork.player;
                let progr = fork.progr;
                let session = self
                    .running_tasks
                    .get(&task_id)
                    .map(|rt| rt.session.clone())
                    .unwrap_or_else(noop_session);
                let forked_session = session.fork().unwrap_or_else(|_| noop_session());

                let task_start = TaskStart::StartFork {
                    fork_request: fork,
                    suspended: false,
                };
                // Forked tasks always go through the suspension queue; a
                // zero delay wakes on the next scheduler pass, which keeps
                // forks from beginning before their scheduled time.
                let kill_switch = Arc::new(AtomicBool::new(false));
                let tsc = TaskSchedulerClient::new(new_task_id, self.sender.clone());
                let server_options = self.db.server_options();
                let task = Task::new(
                    new_task_id,
                    player,
                    task_start,
                    progr,
                    &server_options,
                    forked_session.clone(),
                    tsc,
                    kill_switch,
                );
                let wake = Instant::now() + delay.unwrap_or_default();
                self.suspended.add(SuspendedTask {
                    wake_condition: WakeCondition::Time(wake),
                    task,
                    session: forked_session,
                    result_sender: None,
                });
                let _ = reply.send(new_task_id);
            }
            SchedulerControlMsg::TaskSuspend(resume_time, task) => {
                let Some(running) = self.running_tasks.remove(&task_id) else {
                    error!(task_id, "Suspending task not in running set");
                    return;
                };
                if let Err(e) = running.session.commit() {
                    warn!(task_id, error = ?e, "Could not commit session output");
                }
                let wake_condition = match resume_time {
                    Some(instant) => WakeCondition::Time(instant),
                    None => WakeCondition::Never,
                };
                self.suspended.add(SuspendedTask {
                    wake_condition,
                    task: *task,
                    session: running.session,
                    result_sender: running.result_sender,
                });
            }
            SchedulerControlMsg::TaskRequestInput(task) => {
                let Some(running) = self.running_tasks.remove(&task_id) else {
                    error!(task_id, "Reading task not in running set");
                    return;
                };
                if let Err(e) = running.session.commit() {
                    warn!(task_id, error = ?e, "Could not commit session output");
                }
                let player = task.player;
                if let Err(e) = running.session.request_input(player) {
                    warn!(task_id, error = ?e, "Could not request input from session");
                }
                self.suspended.add(SuspendedTask {
                    wake_condition: WakeCondition::Input(player),
                    task: *task,
                    session: running.session,
                    result_sender: running.result_sender,
                });
            }
            SchedulerControlMsg::RequestQueuedTasks(reply) => {
                let _ = reply.send(self.queued_task_descriptions());
            }
            SchedulerControlMsg::KillTask {
                victim,
                sender_permissions,
                result_sender,
            } => {
                let result = self.kill_task(victim, &sender_permissions);
                let _ = result_sender.send(result);
            }
            SchedulerControlMsg::ResumeTask {
                victim,
                value,
                sender_permissions,
                result_sender,
            } => {
                let result = self.resume_suspended_task(victim, value, &sender_permissions);
                let _ = result_sender.send(result);
            }
            SchedulerControlMsg::BootPlayer(player) => {
                if let Some(running) = self.running_tasks.get(&task_id) {
                    if let Err(e) = running.session.disconnect(player) {
                        warn!(?player, error = ?e, "Could not boot player");
                    }
                }
            }
            SchedulerControlMsg::Shutdown(message) => {
                info!(?message, "Shutdown initiated from task");
                self.stop_all_tasks(message);
                self.running = false;
            }
            SchedulerControlMsg::Checkpoint => {
                if let Err(e) = self.db.checkpoint() {
                    error!(error = ?e, "Checkpoint failed");
                }
            }
            SchedulerControlMsg::RefreshServerOptions => {
                if let Err(e) = self.db.load_server_options() {
                    error!(error = ?e, "Could not reload server options");
                }
            }
        }
    }

    /// Start up any suspended tasks whose wake time has passed.
    fn wake_due_tasks(&mut self) {
        if self.suspended.is_empty() {
            return;
        }
        for entry in self.suspended.collect_due(Instant::now()) {
            let task_id = entry.task.task_id;
            tracing::trace!(task_id, "Waking suspended task");
            // suspend() yields 0 on an ordinary timed wake.
            self.resume_task_thread(entry.task, Some(v_int(0)), entry.session, entry.result_sender);
        }
    }

    fn queued_task_descriptions(&self) -> Vec<TaskDescription> {
        self.suspended.descriptions()
    }

    /// kill_task(victim): wizards can kill anything, others only tasks owned
    /// by the same programmer.
    fn kill_task(&mut self, victim: TaskId, perms: &etamoo_common::model::Perms) -> Var {
        // Suspended victim: discard outright.
        if self.suspended.contains(victim) {
            let owner = self.suspended.player_of(victim).expect("checked above");
            if !perms.flags.contains(ObjFlag::Wizard) && perms.who != owner {
                return v_err(E_PERM);
            }
            self.suspended.remove(victim);
            return v_int(0);
        }
        // Running victim: flip its kill switch; it will be collected at the
        // next tick boundary.
        if let Some(running) = self.running_tasks.get(&victim) {
            if !perms.flags.contains(ObjFlag::Wizard) && perms.who != running.player {
                return v_err(E_PERM);
            }
            running.kill_switch.store(true, Ordering::Relaxed);
            return v_int(0);
        }
        v_err(E_INVARG)
    }

    /// resume(victim [, value]): only truly suspended (not reading) tasks.
    fn resume_suspended_task(
        &mut self,
        victim: TaskId,
        value: Var,
        perms: &etamoo_common::model::Perms,
    ) -> Var {
        if !self.suspended.contains(victim) {
            return v_err(E_INVARG);
        }
        let owner = self.suspended.player_of(victim).expect("checked above");
        if !perms.flags.contains(ObjFlag::Wizard) && perms.who != owner {
            return v_err(E_PERM);
        }
        let entry = self.suspended.remove(victim).expect("checked above");
        if matches!(entry.wake_condition, WakeCondition::Input(_)) {
            // Reading tasks are not resumable.
            self.suspended.add(entry);
            return v_err(E_INVARG);
        }
        self.resume_task_thread(entry.task, Some(value), entry.session, entry.result_sender);
        v_int(0)
    }

    fn stop_all_tasks(&mut self, message: Option<String>) {
        if let Some(message) = &message {
            for running in self.running_tasks.values() {
                let _ = running.session.broadcast_text(message);
            }
        }
        for running in self.running_tasks.values() {
            running.kill_switch.store(true, Ordering::Relaxed);
        }
        self.suspended.clear();
    }

    /// Drop the scheduler's handle on a finished task and deliver its
    /// result.
    fn reap_task(&mut self, task_id: TaskId, result: TaskResult) {
        let Some(running) = self.running_tasks.remove(&task_id) else {
            return;
        };
        if let Some(sender) = running.result_sender {
            let _ = sender.send(result);
        }
    }

    /// Print a line to the player who owns a task, outside any transaction.
    fn notify_task_player(&self, task_id: TaskId, message: &str) {
        let Some(running) = self.running_tasks.get(&task_id) else {
            return;
        };
        if running.session.send_text(running.player, message).is_ok() {
            let _ = running.session.commit();
        }
    }

    /// An uncaught exception unwound a task: the traceback goes to the
    /// player, and to the server log for wizardly tasks.
    fn report_exception(&self, task_id: TaskId, exception: &Exception) {
        let Some(running) = self.running_tasks.get(&task_id) else {
            return;
        };
        for line in &exception.backtrace {
            if let Some(line) = line.as_str() {
                let _ = running.session.send_text(running.player, line.as_str());
            }
        }
        let _ = running.session.commit();
        warn!(
            task_id,
            error = %exception.error,
            "Task ended with uncaught exception"
        );
    }
}

fn noop_session() -> Arc<dyn Session> {
    etamoo_common::tasks::NoopClientSession::new()
}

/// What the player sees when their command never became a task.
fn command_error_message(err: &CommandError) -> String {
    match err {
        CommandError::CouldNotParseCommand | CommandError::NoCommandMatch => {
            "I couldn't understand that.".to_string()
        }
        CommandError::PermissionDenied => "Permission denied.".to_string(),
        CommandError::DatabaseError(e) => format!("Internal error: {e}"),
    }
}
