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

use crate::tasks::scheduler_client::TaskSchedulerClient;
use crate::tasks::{TaskId, VerbCall};
use crate::vm::moo_execute::moo_frame_execute;
use crate::vm::{
    ExecutionResult, FinallyReason, Fork, VMExecState, VerbExecutionRequest, VerbProgram,
    VmExecParams,
};
use etamoo_common::matching::ParsedCommand;
use etamoo_common::model::{VerbDef, WorldState};
use etamoo_common::tasks::{AbortLimitReason, Exception, Session};
use etamoo_var::program::{Name, Program};
use etamoo_var::ErrorCode::E_MAXREC;
use etamoo_var::{Obj, Var};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{trace, warn};

/// Return values from exec_interpreter back to the Task loop.
#[derive(Debug)]
pub enum VMHostResponse {
    /// Tell the task to just keep on letting us do what we're doing.
    ContinueOk,
    /// Tell the task to ask the scheduler to dispatch a fork request, and
    /// then resume execution.
    DispatchFork(Box<Fork>),
    /// Tell the task to suspend us.
    Suspend(Option<Duration>),
    /// Tell the task we need input from the client.
    SuspendNeedInput,
    /// Task timed out or exceeded ticks.
    AbortLimit(AbortLimitReason),
    /// Tell the task that execution has completed, successfully.
    CompleteSuccess(Var),
    /// The VM aborted.
    CompleteAbort,
    /// The VM threw an uncaught exception.
    CompleteException(Exception),
    /// A rollback-retry was requested by the database layer.
    RollbackRetry,
}

/// A 'host' for running the MOO virtual machine inside a task.
pub struct VmHost {
    /// Where we store current execution state for this host.
    vm_exec_state: VMExecState,
    /// The maximum stack depth for this task.
    max_stack_depth: usize,
    /// The amount of ticks (opcode executions) allotted to this task.
    max_ticks: usize,
    /// The maximum amount of wall-clock time allotted to this task.
    max_time: Duration,
    session: Arc<dyn Session>,
    task_scheduler_client: TaskSchedulerClient,
    running: bool,
}

impl VmHost {
    pub fn new(
        task_id: TaskId,
        max_stack_depth: usize,
        max_ticks: usize,
        max_time: Duration,
        session: Arc<dyn Session>,
        task_scheduler_client: TaskSchedulerClient,
    ) -> Self {
        let vm_exec_state = VMExecState::new(task_id);

        // Created in an initial stopped state.
        Self {
            vm_exec_state,
            max_stack_depth,
            max_ticks,
            max_time,
            session,
            task_scheduler_client,
            running: false,
        }
    }

    fn begin_budget_window(&mut self, task_id: TaskId) {
        self.vm_exec_state.start_time = Some(SystemTime::now());
        self.vm_exec_state.maximum_time = Some(self.max_time);
        self.vm_exec_state.tick_count = 0;
        self.vm_exec_state.tick_slice = self.max_ticks;
        self.vm_exec_state.task_id = task_id;
    }

    /// Setup for executing a verb resolved from a command.
    pub fn start_call_command_verb(
        &mut self,
        task_id: TaskId,
        resolved_verb: VerbDef,
        program: Program,
        verb_call: VerbCall,
        command: ParsedCommand,
        permissions: Obj,
    ) {
        let call_request = VerbExecutionRequest {
            permissions,
            resolved_verb,
            call: verb_call,
            command: Some(command),
            program: VerbProgram::Moo(program),
        };
        self.start_execution(task_id, call_request)
    }

    /// Setup for executing a direct method call in this VM.
    pub fn start_call_method_verb(
        &mut self,
        task_id: TaskId,
        perms: Obj,
        resolved_verb: VerbDef,
        program: Program,
        verb_call: VerbCall,
    ) {
        let call_request = VerbExecutionRequest {
            permissions: perms,
            resolved_verb,
            call: verb_call,
            command: None,
            program: VerbProgram::Moo(program),
        };
        self.start_execution(task_id, call_request)
    }

    /// Start execution of a fork request in the hosted VM.
    pub fn start_fork(&mut self, task_id: TaskId, fork_request: Fork, suspended: bool) {
        self.begin_budget_window(task_id);
        self.vm_exec_state.exec_fork_vector(fork_request);
        self.running = !suspended;
    }

    /// Start execution of a verb request.
    pub fn start_execution(
        &mut self,
        task_id: TaskId,
        verb_execution_request: VerbExecutionRequest,
    ) {
        self.begin_budget_window(task_id);
        self.vm_exec_state.exec_call_request(verb_execution_request);
        self.running = true;
    }

    /// Start execution of an eval request.
    pub fn start_eval(&mut self, task_id: TaskId, permissions: Obj, player: Obj, program: Program) {
        self.begin_budget_window(task_id);
        self.vm_exec_state
            .exec_eval_request(permissions, player, program);
        self.running = true;
    }

    /// Run the hosted VM for a slice, returning what the task should do
    /// next.
    pub fn exec_interpreter(
        &mut self,
        task_id: TaskId,
        world_state: &mut dyn WorldState,
    ) -> VMHostResponse {
        self.vm_exec_state.task_id = task_id;

        let exec_params = VmExecParams {
            task_scheduler_client: self.task_scheduler_client.with_task_id(task_id),
            max_stack_depth: self.max_stack_depth,
        };

        // Check existing ticks and seconds, and abort the task if the limits
        // have been passed. This check is uncatchable from MOO code.
        if self.vm_exec_state.tick_count >= self.max_ticks {
            return VMHostResponse::AbortLimit(AbortLimitReason::Ticks(
                self.vm_exec_state.tick_count,
            ));
        }
        if let Some(start_time) = self.vm_exec_state.start_time {
            let elapsed = start_time.elapsed().unwrap_or_default();
            if elapsed > self.max_time {
                return VMHostResponse::AbortLimit(AbortLimitReason::Time(elapsed));
            }
        };

        let mut result = self.exec_vm(&exec_params, world_state);

        while self.is_running() {
            match result {
                ExecutionResult::More => return VMHostResponse::ContinueOk,
                ExecutionResult::ContinueVerb {
                    permissions,
                    resolved_verb,
                    program,
                    call,
                    command,
                    trampoline,
                    trampoline_arg,
                } => {
                    trace!(task_id, call = ?call, "Task continue, call into verb");

                    if let crate::vm::Frame::Bf(bf_frame) =
                        &mut self.vm_exec_state.top_mut().frame
                    {
                        bf_frame.bf_trampoline = trampoline;
                        bf_frame.bf_trampoline_arg = trampoline_arg;
                    }

                    let call_request = VerbExecutionRequest {
                        permissions,
                        resolved_verb,
                        call,
                        command,
                        program: VerbProgram::Moo(program),
                    };
                    self.vm_exec_state.exec_call_request(call_request);
                    return VMHostResponse::ContinueOk;
                }
                ExecutionResult::PerformEval {
                    permissions,
                    player,
                    program,
                } => {
                    self.vm_exec_state
                        .exec_eval_request(permissions, player, program);
                    return VMHostResponse::ContinueOk;
                }
                ExecutionResult::DispatchFork(fork_request) => {
                    return VMHostResponse::DispatchFork(Box::new(fork_request));
                }
                ExecutionResult::Suspend(delay) => {
                    return VMHostResponse::Suspend(delay);
                }
                ExecutionResult::NeedInput => {
                    return VMHostResponse::SuspendNeedInput;
                }
                ExecutionResult::Complete(a) => {
                    trace!(task_id, "Task completed");
                    return VMHostResponse::CompleteSuccess(a);
                }
                ExecutionResult::Exception(fr) => {
                    trace!(task_id, result = ?fr, "Task exception");
                    return match fr {
                        FinallyReason::Abort => VMHostResponse::CompleteAbort,
                        FinallyReason::Raise(exception) => {
                            VMHostResponse::CompleteException(exception)
                        }
                        _ => {
                            unreachable!(
                                "Invalid FinallyReason {fr:?} reached for task {task_id} in scheduler",
                            );
                        }
                    };
                }
                ExecutionResult::RollbackRestart => {
                    trace!(task_id, "Task rollback-restart");
                    return VMHostResponse::RollbackRetry;
                }
            }
        }

        // We're not running and we didn't get a completion response from the
        // VM -- we must have been asked to stop by the scheduler.
        warn!(task_id, "VM host stopped by task");
        VMHostResponse::CompleteAbort
    }

    /// One dispatch into the VM: re-enter a waiting builtin frame, or run
    /// the opcode loop.
    fn exec_vm(
        &mut self,
        exec_params: &VmExecParams,
        world_state: &mut dyn WorldState,
    ) -> ExecutionResult {
        let state = &mut self.vm_exec_state;

        // Before executing, check stack depth.
        if state.stack.len() >= self.max_stack_depth {
            return state.throw_error(E_MAXREC.msg("too many verb calls"));
        }

        // If the current activation frame is a builtin, jump back into it;
        // it's for the builtin to interpret its trampoline state.
        if !state.stack.is_empty() && state.top().is_builtin_frame() {
            return state.reenter_builtin_function(exec_params, world_state, self.session.clone());
        }

        moo_frame_execute(exec_params, state, world_state, self.session.clone())
    }

    /// Resume what you were doing after suspension: feed the value `suspend`
    /// or `read` yields, and start a fresh (background) budget window.
    pub fn resume_execution(&mut self, value: Var) {
        self.vm_exec_state.top_mut().frame.set_return_value(value);
        self.reactivate();
    }

    /// Wake back up without feeding a value; for conflict retries whose
    /// snapshot already contains one.
    pub fn reactivate(&mut self) {
        self.vm_exec_state.start_time = Some(SystemTime::now());
        self.vm_exec_state.tick_count = 0;
        self.running = true;
    }

    /// After the first suspension a task runs on the background budgets.
    pub fn switch_to_background_budget(&mut self, max_ticks: usize, max_time: Duration) {
        self.max_ticks = max_ticks;
        self.max_time = max_time;
        self.vm_exec_state.tick_slice = max_ticks;
        self.vm_exec_state.maximum_time = Some(max_time);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// A host that has never pushed an activation: a task that hasn't begun
    /// executing at all (e.g. a scheduled fork still waiting for its time).
    pub fn is_fresh(&self) -> bool {
        self.vm_exec_state.stack.is_empty()
    }

    pub fn stop(&mut self) {
        trace!(task_id = self.vm_exec_state.task_id, "Stopping VmHost");
        self.running = false;
    }

    pub fn set_variable(&mut self, task_id_var: &Name, value: Var) {
        self.vm_exec_state
            .top_mut()
            .frame
            .set_variable(task_id_var, value)
            .expect("Could not set forked task id");
    }

    pub fn permissions(&self) -> Obj {
        self.vm_exec_state.top().permissions
    }

    pub fn verb_name(&self) -> String {
        self.vm_exec_state.top().verb_name.to_string()
    }

    pub fn verb_definer(&self) -> Obj {
        self.vm_exec_state.top().verb_definer()
    }

    pub fn this(&self) -> Obj {
        self.vm_exec_state.top().this
    }

    pub fn line_number(&self) -> usize {
        self.vm_exec_state
            .top()
            .frame
            .find_line_no()
            .unwrap_or(0)
    }

    /// Snapshot the whole execution state, so a conflict-retry can restart
    /// from the last suspension point.
    pub fn snapshot_state(&self) -> VMExecState {
        self.vm_exec_state.clone()
    }

    pub fn restore_state(&mut self, state: VMExecState) {
        self.vm_exec_state = state;
    }
}
