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

//! Scheduler-level tests: whole tasks submitted through the scheduler, with
//! suspensions, forks and kills.

use etamoo_common::model::{VerbArgsSpec, VerbFlag, WorldState, WorldStateSource};
use etamoo_common::tasks::{SchedulerError, Session, SessionError};
use etamoo_db::TxDb;
use etamoo_kernel::tasks::scheduler::Scheduler;
use etamoo_kernel::tasks::scheduler_client::SchedulerClient;
use etamoo_kernel::tasks::TaskResult;
use etamoo_var::{v_int, v_str, Obj, Symbol, Var, NOTHING, SYSTEM_OBJECT};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const WIZARD: Obj = Obj(1);

/// A session that accumulates committed output for inspection.
#[derive(Default)]
struct TestSession {
    committed: Arc<Mutex<Vec<String>>>,
    buffered: Mutex<Vec<String>>,
}

impl TestSession {
    fn new() -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = Arc::new(TestSession {
            committed: log.clone(),
            buffered: Mutex::new(Vec::new()),
        });
        (session, log)
    }
}

impl Session for TestSession {
    fn commit(&self) -> Result<(), SessionError> {
        let mut buffered = self.buffered.lock();
        self.committed.lock().extend(buffered.drain(..));
        Ok(())
    }

    fn rollback(&self) -> Result<(), SessionError> {
        self.buffered.lock().clear();
        Ok(())
    }

    fn fork(self: Arc<Self>) -> Result<Arc<dyn Session>, SessionError> {
        Ok(Arc::new(TestSession {
            committed: self.committed.clone(),
            buffered: Mutex::new(Vec::new()),
        }))
    }

    fn send_text(&self, _player: Obj, msg: &str) -> Result<(), SessionError> {
        self.buffered.lock().push(msg.to_string());
        Ok(())
    }

    fn broadcast_text(&self, msg: &str) -> Result<(), SessionError> {
        self.committed.lock().push(msg.to_string());
        Ok(())
    }

    fn request_input(&self, _player: Obj) -> Result<(), SessionError> {
        Ok(())
    }

    fn connected_players(&self) -> Result<Vec<Obj>, SessionError> {
        Ok(vec![WIZARD])
    }

    fn connected_seconds(&self, _player: Obj) -> Result<f64, SessionError> {
        Ok(1.0)
    }

    fn idle_seconds(&self, _player: Obj) -> Result<f64, SessionError> {
        Ok(0.0)
    }

    fn connection_name(&self, player: Obj) -> Result<String, SessionError> {
        Ok(format!("test connection for {player}"))
    }

    fn disconnect(&self, _player: Obj) -> Result<(), SessionError> {
        Ok(())
    }
}

fn setup() -> (Arc<TxDb>, SchedulerClient, std::thread::JoinHandle<()>) {
    let db = Arc::new(TxDb::with_minimal_core());
    let db_source: Arc<dyn WorldStateSource> = db.clone();
    let scheduler = Scheduler::new(db_source);
    let client = scheduler.client();
    let join = std::thread::spawn(move || scheduler.run());
    (db, client, join)
}

fn shutdown(client: &SchedulerClient, join: std::thread::JoinHandle<()>) {
    client.submit_shutdown(None).expect("could not shut down");
    join.join().expect("scheduler panicked");
}

fn eval_result(client: &SchedulerClient, session: Arc<dyn Session>, code: &str) -> TaskResult {
    let handle = client
        .submit_eval_task(WIZARD, WIZARD, code, session)
        .expect("could not submit eval");
    handle.into_receiver().recv().expect("no task result")
}

fn eval_value(client: &SchedulerClient, session: Arc<dyn Session>, code: &str) -> Var {
    match eval_result(client, session, code) {
        TaskResult::Success(v) => v,
        TaskResult::Error(e) => panic!("eval of {code:?} failed: {e:?}"),
    }
}

#[test]
fn test_eval_through_scheduler() {
    let (_db, client, join) = setup();
    let (session, _) = TestSession::new();
    assert_eq!(eval_value(&client, session, "return 1 + 2;"), v_int(3));
    shutdown(&client, join);
}

#[test]
fn test_suspend_resumes_and_advances_time() {
    let (_db, client, join) = setup();
    let (session, _) = TestSession::new();
    let before = Instant::now();
    let result = eval_value(
        &client,
        session,
        "x = suspend(1); return {x, \"woke\"};",
    );
    assert!(before.elapsed() >= Duration::from_secs(1));
    assert_eq!(
        result,
        etamoo_var::v_list(&[v_int(0), v_str("woke")])
    );
    shutdown(&client, join);
}

#[test]
fn test_fork_runs_later_and_label_binds_task_id() {
    let (db, client, join) = setup();
    let (session, log) = TestSession::new();

    // Notifications committed by the parent land before the forked task's.
    {
        let mut tx = db.new_world_state().unwrap();
        let program = etamoo_compiler::compile(
            r#"
            fork ident (1)
              notify(player, "late");
            endfork
            notify(player, "early");
            return ident;
            "#,
        )
        .unwrap();
        tx.add_verb(
            WIZARD,
            SYSTEM_OBJECT,
            vec![Symbol::mk("forker")],
            WIZARD,
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
            program,
        )
        .unwrap();
        tx.commit().unwrap();
    }

    let forked_task_id = eval_value(&client, session.clone(), "return #0:forker();");
    // The fork label binds the new task's id, distinct from this task's.
    let forked_task_id = forked_task_id.as_int().expect("task id should be an int");
    assert!(forked_task_id > 0);

    // "early" should already be there; "late" roughly a second later.
    assert_eq!(log.lock().as_slice(), &["early".to_string()]);
    std::thread::sleep(Duration::from_millis(1800));
    assert_eq!(
        log.lock().as_slice(),
        &["early".to_string(), "late".to_string()]
    );
    shutdown(&client, join);
}

#[test]
fn test_queued_tasks_and_kill_task() {
    let (_db, client, join) = setup();
    let (session, _) = TestSession::new();

    // Park a task in suspension, then find and kill it from another task.
    let handle = client
        .submit_eval_task(WIZARD, WIZARD, "suspend(); return \"unreachable\";", session.clone())
        .expect("could not submit");
    let victim_id = handle.task_id();
    // Give it a moment to reach its suspend.
    std::thread::sleep(Duration::from_millis(200));

    let queued = eval_value(&client, session.clone(), "return queued_tasks();");
    let queued = queued.as_list().expect("queued_tasks returns a list");
    assert_eq!(queued.len(), 1);

    let killed = eval_value(
        &client,
        session.clone(),
        &format!("return kill_task({victim_id});"),
    );
    assert_eq!(killed, v_int(0));

    let queued = eval_value(&client, session, "return queued_tasks();");
    assert_eq!(queued.len().unwrap(), 0);
    shutdown(&client, join);
}

#[test]
fn test_resume_feeds_value() {
    let (db, client, join) = setup();
    let (session, log) = TestSession::new();

    {
        let mut tx = db.new_world_state().unwrap();
        let program = etamoo_compiler::compile(
            r#"
            x = suspend();
            notify(player, "resumed with " + tostr(x));
            "#,
        )
        .unwrap();
        tx.add_verb(
            WIZARD,
            SYSTEM_OBJECT,
            vec![Symbol::mk("sleeper")],
            WIZARD,
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
            program,
        )
        .unwrap();
        tx.commit().unwrap();
    }

    let handle = client
        .submit_verb_task(
            WIZARD,
            SYSTEM_OBJECT,
            Symbol::mk("sleeper"),
            vec![],
            "".to_string(),
            WIZARD,
            session.clone(),
        )
        .expect("could not submit");
    let sleeper_id = handle.task_id();
    std::thread::sleep(Duration::from_millis(200));

    let resumed = eval_value(
        &client,
        session.clone(),
        &format!("return resume({sleeper_id}, 99);"),
    );
    assert_eq!(resumed, v_int(0));
    std::thread::sleep(Duration::from_millis(200));
    assert!(log
        .lock()
        .iter()
        .any(|l| l == "resumed with 99"));
    shutdown(&client, join);
}

#[test]
fn test_out_of_ticks_aborts_uncatchably() {
    let (_db, client, join) = setup();
    let (session, log) = TestSession::new();
    // Even a try/except around the infinite loop cannot catch a timeout.
    let result = eval_result(
        &client,
        session,
        "try while (1) endwhile except (ANY) return \"caught\"; endtry",
    );
    match result {
        TaskResult::Error(SchedulerError::TaskAbortedLimit(_)) => {}
        other => panic!("Expected a limit abort, got {other:?}"),
    }
    assert!(log.lock().iter().any(|l| l.contains("Task aborted")));
    shutdown(&client, join);
}

#[test]
fn test_uncaught_exception_reports_traceback() {
    let (_db, client, join) = setup();
    let (session, log) = TestSession::new();
    let result = eval_result(&client, session, "return {1}[10];");
    match result {
        TaskResult::Error(SchedulerError::TaskAbortedException(e)) => {
            assert_eq!(e.error, etamoo_var::E_RANGE);
        }
        other => panic!("Expected an exception, got {other:?}"),
    }
    assert!(log.lock().iter().any(|l| l.contains("End of traceback")));
    shutdown(&client, join);
}

#[test]
fn test_command_dispatch_through_scheduler() {
    let (db, client, join) = setup();
    let (session, log) = TestSession::new();

    // A room with a "wave" command verb, with the wizard in it.
    {
        let mut tx = db.new_world_state().unwrap();
        let room = tx
            .create_object(
                WIZARD,
                NOTHING,
                WIZARD,
                etamoo_common::model::ObjAttrs {
                    name: Some("The Void".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        tx.move_object(WIZARD, WIZARD, room).unwrap();
        let program =
            etamoo_compiler::compile(r#"notify(player, "You wave. Verb was " + verb + ".");"#)
                .unwrap();
        tx.add_verb(
            WIZARD,
            room,
            vec![Symbol::mk("wave")],
            WIZARD,
            VerbFlag::rxd(),
            VerbArgsSpec {
                dobj: etamoo_common::model::ArgSpec::None,
                prep: etamoo_common::model::PrepSpec::None,
                iobj: etamoo_common::model::ArgSpec::None,
            },
            program,
        )
        .unwrap();
        tx.commit().unwrap();
    }

    let handle = client
        .submit_command_task(WIZARD, "wave", session.clone())
        .expect("could not submit command");
    let result = handle.into_receiver().recv().expect("no result");
    assert!(matches!(result, TaskResult::Success(_)));
    assert!(log
        .lock()
        .iter()
        .any(|l| l == "You wave. Verb was wave."));
    shutdown(&client, join);
}
