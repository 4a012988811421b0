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

//! A task is a concurrent, transactionally isolated, thread of execution. It
//! starts with the execution of a 'verb' (or command, or eval) and runs
//! through to completion, suspension or abort. Within the task many verbs
//! may be executed as subroutine calls from the root; each task has its own
//! VM host and its own isolated transactional world state, and a
//! semi-isolated "session" for I/O. When a task fails, both the world state
//! and the I/O buffer roll back.

use crate::matching::{WsMatchEnv, WsObjectNameMatcher};
use crate::tasks::scheduler_client::TaskSchedulerClient;
use crate::tasks::task_messages::TaskStart;
use crate::tasks::vm_host::{VMHostResponse, VmHost};
use crate::tasks::{TaskId, VerbCall};
use crate::vm::VMExecState;
use etamoo_common::matching::{parse_command, ParseCommandError, ParsedCommand};
use etamoo_common::model::{CommitResult, ServerOptions, VerbDef, WorldState, WorldStateError};
use etamoo_common::tasks::CommandError::{self, PermissionDenied};
use etamoo_common::tasks::Session;
use etamoo_common::util::parse_into_words;
use etamoo_var::program::Program;
use etamoo_var::{v_int, v_str, Obj, Symbol, NOTHING, SYSTEM_OBJECT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Which stage of command dispatch this task is in, for the `$do_command`
/// intercept protocol.
#[derive(Clone, Debug, PartialEq)]
enum CommandPhase {
    /// Not a command task, or dispatch already resolved.
    Dispatched,
    /// `$do_command` is running; a false result falls back to the parser.
    RunningDoCommand { player: Obj, command: String },
}

pub struct Task {
    /// My unique task id.
    pub(crate) task_id: TaskId,
    /// What I was asked to do.
    pub(crate) task_start: TaskStart,
    /// The player on behalf of whom this task is running, who owns it.
    pub(crate) player: Obj,
    /// The permissions of the task: the object on behalf of which all
    /// permission checks are evaluated.
    pub(crate) perms: Obj,
    /// The actual VM host which is managing the execution of this task.
    pub(crate) vm_host: VmHost,
    /// True if the task should die at the next opportunity.
    pub(crate) kill_switch: Arc<AtomicBool>,
    /// Where $do_command interception stands.
    command_phase: CommandPhase,
    /// Whether this task has suspended at least once (and thus runs on the
    /// background budgets).
    pub(crate) has_suspended: bool,
    /// The VM state as of the last transaction boundary, for conflict
    /// retries.
    retry_state: Option<VMExecState>,
    /// The background budgets to switch to after the first suspension.
    bg_budget: (usize, Duration),
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: TaskId,
        player: Obj,
        task_start: TaskStart,
        perms: Obj,
        server_options: &ServerOptions,
        session: Arc<dyn Session>,
        task_scheduler_client: TaskSchedulerClient,
        kill_switch: Arc<AtomicBool>,
    ) -> Self {
        let is_background = task_start.is_background();
        let (max_ticks, max_seconds) = if is_background {
            (server_options.bg_ticks, server_options.bg_seconds)
        } else {
            (server_options.fg_ticks, server_options.fg_seconds)
        };

        let vm_host = VmHost::new(
            task_id,
            server_options.max_stack_depth,
            max_ticks,
            Duration::from_secs(max_seconds),
            session,
            task_scheduler_client,
        );

        Task {
            task_id,
            player,
            task_start,
            vm_host,
            perms,
            kill_switch,
            command_phase: CommandPhase::Dispatched,
            has_suspended: is_background,
            retry_state: None,
            bg_budget: (
                server_options.bg_ticks,
                Duration::from_secs(server_options.bg_seconds),
            ),
        }
    }

    /// The task thread body: set up the start condition, then run the
    /// dispatch loop until the task is consumed or finished.
    pub fn run_task_loop(
        mut task: Task,
        task_scheduler_client: &TaskSchedulerClient,
        mut world_state: Box<dyn WorldState>,
    ) {
        let task_id = task.task_id;
        debug!(task_id, "Task started");
        // A resumed task comes in already running, with its frames restored;
        // only fresh tasks need their start condition set up.
        if !task.vm_host.is_running() {
            task.retry_state = Some(task.vm_host.snapshot_state());
            if !task.setup_task_start(task_scheduler_client, world_state.as_mut()) {
                if let Err(e) = world_state.rollback() {
                    error!(task_id, error = ?e, "Could not rollback world state");
                }
                return;
            }
        }
        while task.vm_host.is_running() {
            // Check the kill switch at each slice boundary.
            if task.kill_switch.load(Ordering::Relaxed) {
                trace!(task_id, "Task killed");
                if let Err(e) = world_state.rollback() {
                    error!(task_id, error = ?e, "Could not rollback world state");
                }
                task_scheduler_client.abort_cancelled();
                return;
            }
            match task.vm_dispatch(task_scheduler_client, world_state) {
                Some((continuation_task, ws)) => {
                    task = continuation_task;
                    world_state = ws;
                }
                None => break,
            }
        }
        debug!(task_id, "Task finished");
    }

    /// Restore the retry snapshot, for a conflict-retry restart.
    pub(crate) fn restore_from_retry_state(&mut self) {
        if let Some(state) = &self.retry_state {
            self.vm_host.restore_state(state.clone());
        }
    }

    /// Feed a resume value and re-arm; the retry snapshot is refreshed so a
    /// later conflict replays this same wake-up.
    pub(crate) fn resume(&mut self, value: etamoo_var::Var) {
        self.vm_host.resume_execution(value);
        self.retry_state = Some(self.vm_host.snapshot_state());
    }

    /// Re-arm after a conflict retry, whose snapshot already holds the
    /// resume value.
    pub(crate) fn reactivate(&mut self) {
        self.restore_from_retry_state();
        self.vm_host.reactivate();
    }

    /// Set the task up to start executing, based on the task start
    /// configuration. Returns false if the task never got going (and the
    /// reason has been reported).
    pub(crate) fn setup_task_start(
        &mut self,
        task_scheduler_client: &TaskSchedulerClient,
        world_state: &mut dyn WorldState,
    ) -> bool {
        match self.task_start.clone() {
            // A command task: try the $do_command hook first, then the
            // command parser.
            TaskStart::StartCommandVerb { player, command } => {
                if let Some(msg) = self.start_command(player, &command, world_state) {
                    task_scheduler_client.command_error(msg);
                    return false;
                }
            }
            TaskStart::StartVerb {
                player,
                vloc,
                verb,
                args,
                argstr,
            } => {
                trace!(?verb, ?player, ?vloc, ?args, "Starting verb");
                let verb_call = VerbCall {
                    verb_name: verb.clone(),
                    location: vloc,
                    this: vloc,
                    player,
                    args,
                    argstr,
                    caller: NOTHING,
                };
                match world_state.find_method_verb_on(
                    self.perms,
                    verb_call.this,
                    verb_call.verb_name.clone(),
                ) {
                    Err(WorldStateError::VerbNotFound(_, _)) => {
                        debug!(task_id = ?self.task_id, this = ?verb_call.this,
                              verb = %verb_call.verb_name, "Verb not found");
                        task_scheduler_client.verb_not_found(verb_call.this, verb_call.verb_name);
                        return false;
                    }
                    Err(e) => {
                        error!(task_id = ?self.task_id, error = ?e,
                               "World state error while resolving verb");
                        task_scheduler_client.command_error(CommandError::DatabaseError(e));
                        return false;
                    }
                    Ok((program, verb_def)) => {
                        self.vm_host.start_call_method_verb(
                            self.task_id,
                            self.perms,
                            verb_def,
                            program,
                            verb_call,
                        );
                    }
                }
            }
            TaskStart::StartFork {
                fork_request,
                suspended,
            } => {
                trace!(task_id = ?self.task_id, suspended, "Setting up fork");
                self.vm_host
                    .start_fork(self.task_id, *fork_request, suspended);
            }
            TaskStart::StartEval { player, program } => {
                self.vm_host
                    .start_eval(self.task_id, self.perms, player, program);
            }
        };
        true
    }

    /// Call out to the vm_host to execute the next instructions, and handle
    /// what it returns. If the task is consumed (ownership transferred back
    /// to the scheduler), returns None; otherwise returns the task and its
    /// world state for another go-round.
    fn vm_dispatch(
        mut self,
        task_scheduler_client: &TaskSchedulerClient,
        mut world_state: Box<dyn WorldState>,
    ) -> Option<(Self, Box<dyn WorldState>)> {
        let vm_exec_result = self
            .vm_host
            .exec_interpreter(self.task_id, world_state.as_mut());

        match vm_exec_result {
            VMHostResponse::ContinueOk => Some((self, world_state)),
            VMHostResponse::DispatchFork(fork_request) => {
                trace!(task_id = self.task_id, "Task fork");
                // The scheduler does the actual allocation; the new task id
                // comes back on a reply channel and lands in the label
                // variable.
                let task_id_var = fork_request.task_id;
                let new_task_id = task_scheduler_client.request_fork(*fork_request);
                if let Some(task_id_var) = task_id_var {
                    self.vm_host
                        .set_variable(&task_id_var, v_int(new_task_id as i64));
                }
                Some((self, world_state))
            }
            VMHostResponse::Suspend(delay) => {
                trace!(task_id = self.task_id, delay = ?delay, "Task suspend");

                // Commit the world state before suspension; a conflict here
                // restarts the task from its last suspension point instead.
                match world_state.commit() {
                    Ok(CommitResult::Success) => {}
                    Ok(CommitResult::ConflictRetry) => {
                        warn!("Conflict during commit before suspend");
                        self.restore_from_retry_state();
                        task_scheduler_client.conflict_retry(self);
                        return None;
                    }
                    Err(e) => {
                        error!(error = ?e, "Could not commit world state before suspend");
                        task_scheduler_client.abort_cancelled();
                        return None;
                    }
                }

                self.vm_host.stop();
                self.note_suspension();

                // The scheduler owns the sleep; the task moves into its
                // suspension queue.
                let resume_time = delay.map(|delay| Instant::now() + delay);
                task_scheduler_client.suspend(resume_time, self);
                None
            }
            VMHostResponse::SuspendNeedInput => {
                trace!(task_id = self.task_id, "Task suspend need input");
                match world_state.commit() {
                    Ok(CommitResult::Success) => {}
                    Ok(CommitResult::ConflictRetry) => {
                        warn!("Conflict during commit before read");
                        self.restore_from_retry_state();
                        task_scheduler_client.conflict_retry(self);
                        return None;
                    }
                    Err(e) => {
                        error!(error = ?e, "Could not commit world state before read");
                        task_scheduler_client.abort_cancelled();
                        return None;
                    }
                }
                self.vm_host.stop();
                self.note_suspension();
                task_scheduler_client.request_input(self);
                None
            }
            VMHostResponse::CompleteSuccess(result) => {
                trace!(task_id = self.task_id, result = ?result, "Task complete, success");

                // A command task whose $do_command intercept declined gets a
                // second phase: normal parse and dispatch, same transaction.
                if let CommandPhase::RunningDoCommand { player, command } =
                    self.command_phase.clone()
                {
                    self.command_phase = CommandPhase::Dispatched;
                    if !result.is_true() {
                        if let Some(err) =
                            self.parse_and_dispatch_command(player, &command, world_state.as_mut())
                        {
                            if let Err(e) = world_state.rollback() {
                                error!(error = ?e, "Could not rollback world state");
                            }
                            task_scheduler_client.command_error(err);
                            return None;
                        }
                        return Some((self, world_state));
                    }
                }

                match world_state.commit() {
                    Ok(CommitResult::Success) => {}
                    Ok(CommitResult::ConflictRetry) => {
                        warn!("Conflict during commit on completion; retrying task");
                        self.restore_from_retry_state();
                        task_scheduler_client.conflict_retry(self);
                        return None;
                    }
                    Err(e) => {
                        error!(error = ?e, "Could not commit world state");
                        task_scheduler_client.abort_cancelled();
                        return None;
                    }
                }
                self.vm_host.stop();
                task_scheduler_client.task_success(result);
                None
            }
            VMHostResponse::CompleteAbort => {
                error!(task_id = self.task_id, "Task aborted");
                if let Err(e) = world_state.rollback() {
                    error!(error = ?e, "Could not rollback world state");
                }
                self.vm_host.stop();
                task_scheduler_client.abort_cancelled();
                None
            }
            VMHostResponse::CompleteException(exception) => {
                // Tasks that end with an exception still commit, matching
                // the original server's observable behavior.
                warn!(task_id = self.task_id, "Task exception");
                match world_state.commit() {
                    Ok(CommitResult::Success) => {}
                    Ok(CommitResult::ConflictRetry) => {
                        self.restore_from_retry_state();
                        task_scheduler_client.conflict_retry(self);
                        return None;
                    }
                    Err(e) => {
                        error!(error = ?e, "Could not commit world state after exception");
                    }
                }
                self.vm_host.stop();
                task_scheduler_client.task_exception(exception);
                None
            }
            VMHostResponse::AbortLimit(reason) => {
                warn!(task_id = self.task_id, ?reason, "Task abort limit reached");
                self.vm_host.stop();
                if let Err(e) = world_state.rollback() {
                    error!(error = ?e, "Could not rollback world state");
                }
                task_scheduler_client.abort_limits_reached(reason);
                None
            }
            VMHostResponse::RollbackRetry => {
                warn!(task_id = self.task_id, "Task rollback requested, retrying");
                self.vm_host.stop();
                if let Err(e) = world_state.rollback() {
                    error!(error = ?e, "Could not rollback world state");
                }
                self.restore_from_retry_state();
                task_scheduler_client.conflict_retry(self);
                None
            }
        }
    }

    fn note_suspension(&mut self) {
        if !self.has_suspended {
            self.has_suspended = true;
            let (bg_ticks, bg_time) = self.bg_budget;
            self.vm_host.switch_to_background_budget(bg_ticks, bg_time);
        }
        self.retry_state = Some(self.vm_host.snapshot_state());
    }

    /// Phase one of command dispatch: the $do_command hook, if the system
    /// object has one; otherwise straight to the parser.
    fn start_command(
        &mut self,
        player: Obj,
        command: &str,
        world_state: &mut dyn WorldState,
    ) -> Option<CommandError> {
        match world_state.find_method_verb_on(self.perms, SYSTEM_OBJECT, Symbol::mk("do_command"))
        {
            Ok((program, verb_def)) => {
                let args: Vec<_> = parse_into_words(command)
                    .iter()
                    .map(|w| v_str(w))
                    .collect();
                let verb_call = VerbCall {
                    verb_name: Symbol::mk("do_command"),
                    location: SYSTEM_OBJECT,
                    this: SYSTEM_OBJECT,
                    player,
                    args,
                    argstr: command.to_string(),
                    caller: NOTHING,
                };
                self.command_phase = CommandPhase::RunningDoCommand {
                    player,
                    command: command.to_string(),
                };
                self.vm_host.start_call_method_verb(
                    self.task_id,
                    self.perms,
                    verb_def,
                    program,
                    verb_call,
                );
                None
            }
            Err(WorldStateError::VerbNotFound(_, _)) => {
                self.parse_and_dispatch_command(player, command, world_state)
            }
            Err(e) => Some(CommandError::DatabaseError(e)),
        }
    }

    /// Phase two: parse the command in the player's environment and find a
    /// verb for it on player, location, dobj or iobj, falling back to :huh.
    fn parse_and_dispatch_command(
        &mut self,
        player: Obj,
        command: &str,
        world_state: &mut dyn WorldState,
    ) -> Option<CommandError> {
        let player_location = match world_state.location_of(player, player) {
            Ok(loc) => loc,
            Err(WorldStateError::VerbPermissionDenied)
            | Err(WorldStateError::ObjectPermissionDenied)
            | Err(WorldStateError::PropertyPermissionDenied) => {
                return Some(PermissionDenied);
            }
            Err(wse) => {
                return Some(CommandError::DatabaseError(wse));
            }
        };

        // Parse the command in the current environment.
        let matcher = WsObjectNameMatcher {
            env: WsMatchEnv {
                ws: world_state,
                perms: player,
            },
            player,
        };
        let parsed_command = match parse_command(command, &matcher) {
            Ok(pc) => pc,
            Err(ParseCommandError::PermissionDenied) => {
                return Some(PermissionDenied);
            }
            Err(_) => return Some(CommandError::CouldNotParseCommand),
        };

        // Look for the verb...
        let parse_results =
            match find_verb_for_command(player, player_location, &parsed_command, world_state) {
                Ok(results) => results,
                Err(e) => return Some(e),
            };
        let ((program, verb_def), target, parsed_command) = match parse_results {
            Some((resolved, target)) => (resolved, target, parsed_command),
            // Try to find :huh, the last line of defense.
            None => {
                if player_location == NOTHING {
                    return Some(CommandError::NoCommandMatch);
                }
                let Ok(resolved) = world_state.find_method_verb_on(
                    self.perms,
                    player_location,
                    Symbol::mk("huh"),
                ) else {
                    return Some(CommandError::NoCommandMatch);
                };
                let words = parse_into_words(command);
                trace!(?player, ?player_location, args = ?words, "Dispatching to :huh");
                let huh_command = ParsedCommand {
                    verb: Symbol::mk("huh"),
                    argstr: command.to_string(),
                    args: words.iter().map(|w| v_str(w)).collect(),
                    ..parsed_command
                };
                (resolved, player_location, huh_command)
            }
        };

        let verb_call = VerbCall {
            verb_name: parsed_command.verb.clone(),
            location: target,
            this: target,
            player,
            args: parsed_command.args.clone(),
            argstr: parsed_command.argstr.clone(),
            caller: player,
        };
        self.vm_host.start_call_command_verb(
            self.task_id,
            verb_def,
            program,
            verb_call,
            parsed_command,
            self.perms,
        );
        None
    }
}

/// The order in which command verbs are sought: the player, their location,
/// then the direct and indirect objects.
fn find_verb_for_command(
    player: Obj,
    player_location: Obj,
    pc: &ParsedCommand,
    ws: &mut dyn WorldState,
) -> Result<Option<((Program, VerbDef), Obj)>, CommandError> {
    let targets_to_search = [
        player,
        player_location,
        pc.dobj.unwrap_or(NOTHING),
        pc.iobj.unwrap_or(NOTHING),
    ];
    for target in targets_to_search {
        if target == NOTHING {
            continue;
        }
        let match_result = ws.find_command_verb_on(
            player,
            target,
            pc.verb.clone(),
            pc.dobj.unwrap_or(NOTHING),
            pc.prep,
            pc.iobj.unwrap_or(NOTHING),
        );
        let match_result = match match_result {
            Ok(m) => m,
            Err(WorldStateError::VerbPermissionDenied)
            | Err(WorldStateError::ObjectPermissionDenied)
            | Err(WorldStateError::PropertyPermissionDenied) => return Err(PermissionDenied),
            Err(wse) => return Err(CommandError::DatabaseError(wse)),
        };
        if let Some(resolved) = match_result {
            return Ok(Some((resolved, target)));
        }
    }
    Ok(None)
}
