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

pub mod scheduler;
pub mod scheduler_client;
pub mod suspension;
pub mod task;
pub mod task_messages;
pub mod vm_host;

pub use etamoo_common::tasks::TaskId;

use etamoo_common::tasks::SchedulerError;
use etamoo_var::{Obj, Symbol, Var};

/// The minimum set of information needed to make a *resolution* call for a
/// verb.
#[derive(Clone, Debug)]
pub struct VerbCall {
    pub verb_name: Symbol,
    pub location: Obj,
    pub this: Obj,
    pub player: Obj,
    pub args: Vec<Var>,
    pub argstr: String,
    pub caller: Obj,
}

/// What a submitted task ultimately produced.
#[derive(Debug)]
pub enum TaskResult {
    Success(Var),
    Error(SchedulerError),
}

/// A handle to a submitted task, with a receiver for its result.
pub struct TaskHandle(pub TaskId, pub oneshot::Receiver<TaskResult>);

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.0
    }

    /// Dissolve the handle into a receiver for the result.
    pub fn into_receiver(self) -> oneshot::Receiver<TaskResult> {
        self.1
    }
}

pub mod vm_test_utils {
    //! Helpers for driving a VmHost to completion against a world state,
    //! without a scheduler. Used by the language tests here and in
    //! dependent crates' tests.

    use crate::tasks::scheduler_client::TaskSchedulerClient;
    use crate::tasks::task_messages::SchedulerMessage;
    use crate::tasks::vm_host::{VMHostResponse, VmHost};
    use crate::tasks::VerbCall;
    use etamoo_common::model::{ServerOptions, WorldState};
    use etamoo_common::tasks::{Exception, Session};
    use etamoo_var::{Obj, Symbol, Var};
    use std::sync::Arc;
    use std::time::Duration;

    pub type ExecResult = Result<Var, Exception>;

    fn test_task_scheduler_client() -> (
        TaskSchedulerClient,
        flume::Receiver<SchedulerMessage>,
    ) {
        let (tx, rx) = flume::unbounded();
        (TaskSchedulerClient::new(0, tx), rx)
    }

    fn execute<F>(
        world_state: &mut dyn WorldState,
        session: Arc<dyn Session>,
        fun: F,
    ) -> ExecResult
    where
        F: FnOnce(&mut dyn WorldState, &mut VmHost),
    {
        let (client, _rx) = test_task_scheduler_client();
        let options = ServerOptions::default();
        let mut vm_host = VmHost::new(
            0,
            options.max_stack_depth,
            90_000,
            Duration::from_secs(5),
            session.clone(),
            client,
        );

        fun(world_state, &mut vm_host);

        // Call repeatedly into exec until we get either an error or a
        // completion.
        loop {
            match vm_host.exec_interpreter(0, world_state) {
                VMHostResponse::ContinueOk => {
                    continue;
                }
                VMHostResponse::CompleteSuccess(v) => {
                    return Ok(v);
                }
                VMHostResponse::CompleteException(e) => {
                    return Err(e);
                }
                VMHostResponse::DispatchFork(f) => {
                    panic!("Unexpected fork: {f:?}");
                }
                VMHostResponse::AbortLimit(a) => {
                    panic!("Unexpected abort: {a:?}");
                }
                VMHostResponse::CompleteAbort => {
                    panic!("Unexpected abort");
                }
                VMHostResponse::Suspend(_) => {
                    panic!("Unexpected suspend");
                }
                VMHostResponse::SuspendNeedInput => {
                    panic!("Unexpected suspend need input");
                }
                VMHostResponse::RollbackRetry => {
                    panic!("Unexpected rollback retry");
                }
            }
        }
    }

    pub fn call_verb(
        world_state: &mut dyn WorldState,
        session: Arc<dyn Session>,
        this: Obj,
        player: Obj,
        verb_name: &str,
        args: Vec<Var>,
    ) -> ExecResult {
        execute(world_state, session, |world_state, vm_host| {
            let verb_name = Symbol::mk(verb_name);
            let (program, vd) = world_state
                .find_method_verb_on(player, this, verb_name.clone())
                .unwrap();
            vm_host.start_call_method_verb(
                0,
                player,
                vd,
                program,
                VerbCall {
                    verb_name,
                    location: this,
                    this,
                    player,
                    args,
                    argstr: "".to_string(),
                    caller: player,
                },
            );
        })
    }

    pub fn call_eval(
        world_state: &mut dyn WorldState,
        session: Arc<dyn Session>,
        player: Obj,
        code: &str,
    ) -> ExecResult {
        let program = etamoo_compiler::compile(code).expect("could not compile test program");
        execute(world_state, session, |_, vm_host| {
            vm_host.start_eval(0, player, player, program);
        })
    }
}
