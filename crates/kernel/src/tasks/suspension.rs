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
use crate::tasks::{TaskId, TaskResult};
use etamoo_common::tasks::{Session, TaskDescription};
use etamoo_var::{Obj, NOTHING};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// State a suspended task sits in inside the suspended side of the task
/// queue.
pub(crate) struct SuspendedTask {
    pub(crate) wake_condition: WakeCondition,
    pub(crate) task: Task,
    pub(crate) session: Arc<dyn Session>,
    pub(crate) result_sender: Option<oneshot::Sender<TaskResult>>,
}

/// Conditions under which a suspended task wakes.
#[derive(Debug)]
pub(crate) enum WakeCondition {
    /// Never wakes on its own; only `resume()` or `kill_task()` can touch it.
    Never,
    /// Wakes when the given instant passes.
    Time(Instant),
    /// Wakes when a line of input for the given player arrives (`read()`).
    Input(Obj),
}

/// The set of suspended tasks, and the logic for picking who wakes when.
#[derive(Default)]
pub(crate) struct SuspensionQ {
    tasks: HashMap<TaskId, SuspendedTask>,
}

impl SuspensionQ {
    pub(crate) fn add(&mut self, entry: SuspendedTask) {
        self.tasks.insert(entry.task.task_id, entry);
    }

    pub(crate) fn remove(&mut self, task_id: TaskId) -> Option<SuspendedTask> {
        self.tasks.remove(&task_id)
    }

    pub(crate) fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.contains_key(&task_id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
    }

    pub(crate) fn player_of(&self, task_id: TaskId) -> Option<Obj> {
        self.tasks.get(&task_id).map(|t| t.task.player)
    }

    /// The nearest timed wake-up, for the scheduler's poll timeout.
    pub(crate) fn next_wake_time(&self) -> Option<Instant> {
        self.tasks
            .values()
            .filter_map(|t| match t.wake_condition {
                WakeCondition::Time(instant) => Some(instant),
                _ => None,
            })
            .min()
    }

    /// Pull every task whose wake time has passed, FIFO by scheduled wake
    /// time, ties broken by task id.
    pub(crate) fn collect_due(&mut self, now: Instant) -> Vec<SuspendedTask> {
        let mut due: Vec<(Instant, TaskId)> = self
            .tasks
            .iter()
            .filter_map(|(id, t)| match t.wake_condition {
                WakeCondition::Time(instant) if instant <= now => Some((instant, *id)),
                _ => None,
            })
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|(_, id)| self.tasks.remove(&id))
            .collect()
    }

    /// The first task in the Reading state for the given player, if any.
    pub(crate) fn reading_task_for(&self, player: Obj) -> Option<TaskId> {
        let mut candidates: Vec<TaskId> = self
            .tasks
            .values()
            .filter_map(|t| match t.wake_condition {
                WakeCondition::Input(p) if p == player => Some(t.task.task_id),
                _ => None,
            })
            .collect();
        candidates.sort();
        candidates.first().copied()
    }

    /// Queue descriptions for `queued_tasks()`.
    pub(crate) fn descriptions(&self) -> Vec<TaskDescription> {
        let mut tasks: Vec<TaskDescription> = self
            .tasks
            .values()
            .map(|t| {
                let start_time = match t.wake_condition {
                    WakeCondition::Time(instant) => {
                        let delta = instant.saturating_duration_since(Instant::now());
                        std::time::SystemTime::now().checked_add(delta)
                    }
                    _ => None,
                };
                // A scheduled fork that hasn't begun has no frames to
                // describe yet.
                if t.task.vm_host.is_fresh() {
                    TaskDescription {
                        task_id: t.task.task_id,
                        start_time,
                        permissions: t.task.perms,
                        verb_name: "".to_string(),
                        verb_definer: NOTHING,
                        line_number: 0,
                        this: NOTHING,
                    }
                } else {
                    TaskDescription {
                        task_id: t.task.task_id,
                        start_time,
                        permissions: t.task.vm_host.permissions(),
                        verb_name: t.task.vm_host.verb_name(),
                        verb_definer: t.task.vm_host.verb_definer(),
                        line_number: t.task.vm_host.line_number(),
                        this: t.task.vm_host.this(),
                    }
                }
            })
            .collect();
        tasks.sort_by_key(|t| t.task_id);
        tasks
    }
}
