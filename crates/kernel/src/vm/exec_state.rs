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

use crate::tasks::TaskId;
use crate::vm::activation::{Activation, Frame};
use etamoo_var::{v_list, v_none, v_obj, v_str, Obj, Var, NOTHING};
use std::time::{Duration, SystemTime};

/// The state of VM execution for one task: the activation stack and the
/// resource accounting. The "VM" itself is stateless; this is what suspends
/// and resumes.
#[derive(Clone)]
pub struct VMExecState {
    /// The task ID of the task that owns this stack of activations.
    pub(crate) task_id: TaskId,
    /// The stack of activation records / stack frames.
    pub(crate) stack: Vec<Activation>,
    /// The number of ticks allotted before the next yield back to the task.
    pub(crate) tick_slice: usize,
    /// The number of ticks that have been executed so far in this budget
    /// window.
    pub(crate) tick_count: usize,
    /// The time at which the current budget window started.
    pub(crate) start_time: Option<SystemTime>,
    /// The wall-clock budget.
    pub(crate) maximum_time: Option<Duration>,
}

impl VMExecState {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            stack: vec![],
            tick_count: 0,
            start_time: None,
            tick_slice: 0,
            maximum_time: None,
        }
    }

    #[inline]
    pub(crate) fn top_mut(&mut self) -> &mut Activation {
        self.stack.last_mut().expect("activation stack underflow")
    }

    #[inline]
    pub(crate) fn top(&self) -> &Activation {
        self.stack.last().expect("activation stack underflow")
    }

    pub(crate) fn parent_activation_mut(&mut self) -> &mut Activation {
        let len = self.stack.len();
        self.stack
            .get_mut(len - 2)
            .expect("activation stack underflow")
    }

    /// Return the object that called the current activation.
    pub(crate) fn caller(&self) -> Obj {
        let mut stack_iter = self.stack.iter().rev().filter(|a| !a.is_builtin_frame());
        stack_iter.next();
        stack_iter.next().map(|a| a.this).unwrap_or(NOTHING)
    }

    /// Return the permissions of the caller of the current activation.
    pub(crate) fn caller_perms(&self) -> Obj {
        // Filter out builtin-function frames.
        let mut stack_iter = self.stack.iter().rev().filter(|a| !a.is_builtin_frame());
        // Caller is the frame just before us.
        stack_iter.next();
        stack_iter.next().map(|a| a.permissions).unwrap_or(NOTHING)
    }

    /// Return the permissions of the current task: the "starting" permissions
    /// as possibly modified by `set_task_perms()`.
    pub(crate) fn task_perms(&self) -> Obj {
        let stack_top = self.stack.iter().rev().find(|a| !a.is_builtin_frame());
        stack_top.map(|a| a.permissions).unwrap_or(NOTHING)
    }

    pub(crate) fn set_task_perms(&mut self, perms: Obj) {
        if let Some(a) = self
            .stack
            .iter_mut()
            .rev()
            .find(|a| !a.is_builtin_frame())
        {
            a.permissions = perms;
        }
    }

    /// Set the return value into the current top frame.
    pub(crate) fn set_return_value(&mut self, value: Var) {
        self.top_mut().frame.set_return_value(value);
    }

    /// The callers stack in the format of the `callers()` builtin: one entry
    /// per non-builtin frame below the current one,
    /// {this, verb-name, programmer, verb-loc, player, line-number}.
    pub(crate) fn callers(&self) -> Vec<Var> {
        let mut callers_iter = self.stack.iter().rev();
        callers_iter.next(); // skip the top activation, that's our own frame

        let mut callers = vec![];
        for activation in callers_iter {
            if activation.is_builtin_frame() {
                continue;
            }
            let line_no = match activation.frame.find_line_no() {
                None => v_none(),
                Some(l) => etamoo_var::v_int(l as i64),
            };
            callers.push(v_list(&[
                v_obj(activation.this),
                v_str(activation.verb_name.as_str()),
                v_obj(activation.permissions),
                v_obj(activation.verb_definer()),
                v_obj(activation.player),
                line_no,
            ]));
        }
        callers
    }

    pub(crate) fn time_left(&self) -> Option<Duration> {
        let max_time = self.maximum_time?;
        let elapsed = self
            .start_time
            .map(|t| t.elapsed().unwrap_or_default())
            .unwrap_or_default();
        max_time.checked_sub(elapsed)
    }

    /// Push a value onto the value stack of the top frame.
    #[inline]
    pub(crate) fn push(&mut self, v: Var) {
        match &mut self.top_mut().frame {
            Frame::Moo(f) => f.push(v),
            Frame::Bf(bf) => bf.return_value = Some(v),
        }
    }
}
