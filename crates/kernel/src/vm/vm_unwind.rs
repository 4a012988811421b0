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

use crate::vm::activation::{Activation, Frame};
use crate::vm::moo_frame::{CatchType, ScopeType};
use crate::vm::{ExecutionResult, VMExecState};
use etamoo_common::model::VerbFlag;
use etamoo_common::tasks::Exception;
use etamoo_var::program::{Label, Offset};
use etamoo_var::{v_err, v_int, v_list, v_none, v_obj, v_str, Error, Var};
use tracing::trace;

/// Why the stack is unwinding, or how a finally block was entered.
#[derive(Clone, Debug)]
pub enum FinallyReason {
    /// The body ran to completion; nothing special to do.
    Fallthrough,
    /// An exception is looking for a handler.
    Raise(Exception),
    /// A return value is headed for the caller.
    Return(Var),
    /// The task is being torn down and nothing can stop that; finally blocks
    /// still run, catch handlers do not.
    Abort,
    /// A break/continue is exiting to a loop edge.
    Exit { stack: Offset, label: Label },
}

impl VMExecState {
    /// Compose the stack list for an exception, in `callers()` format,
    /// starting from the current frame.
    fn make_stack_list(activations: &[Activation]) -> Vec<Var> {
        let mut stack_list = vec![];
        for a in activations.iter().rev() {
            let line_no = match a.frame.find_line_no() {
                None => v_none(),
                Some(l) => v_int(l as i64),
            };
            let traceback_entry = vec![
                v_obj(a.this),
                v_str(a.verb_name.as_str()),
                v_obj(a.verb_definer()),
                v_obj(a.verb_owner()),
                v_obj(a.player),
                line_no,
            ];
            stack_list.push(v_list(&traceback_entry));
        }
        stack_list
    }

    /// Compose the printable backtrace for an error, one line per live frame.
    fn make_backtrace(activations: &[Activation], raise_msg: &str) -> Vec<Var> {
        let mut backtrace_list = vec![];
        for (i, a) in activations.iter().rev().enumerate() {
            let mut pieces = vec![];
            if i != 0 {
                pieces.push("... called from ".to_string());
            }
            match &a.frame {
                Frame::Moo(_) => {
                    pieces.push(format!("{}:{}", a.verb_definer(), a.verb_name));
                }
                Frame::Bf(_) => {
                    pieces.push(format!("builtin {}", a.verb_name));
                }
            }
            if a.verb_definer() != a.this {
                pieces.push(format!(" (this == {})", a.this));
            }
            if let Some(line_num) = a.frame.find_line_no() {
                pieces.push(format!(" (line {line_num})"));
            }
            if i == 0 {
                pieces.push(format!(": {raise_msg}"));
            }
            backtrace_list.push(v_str(&pieces.join("")))
        }
        backtrace_list.push(v_str("(End of traceback)"));
        backtrace_list
    }

    fn raise_error_exception(&mut self, error: Error) -> ExecutionResult {
        trace!(?error, "raising error");
        let stack = Self::make_stack_list(&self.stack);
        let backtrace = Self::make_backtrace(&self.stack, &error.message());
        let exception = Exception {
            error,
            stack,
            backtrace,
        };
        self.unwind_stack(FinallyReason::Raise(exception))
    }

    /// The current frame's debug flag: does a raised error actually unwind,
    /// or merely substitute itself as the value of the failed expression?
    fn debug_bit_set(&self) -> bool {
        let verb_frame = self.stack.iter().rev().find(|a| !a.is_builtin_frame());
        verb_frame
            .map(|a| a.verbdef.flags().contains(VerbFlag::Debug))
            .unwrap_or(true)
    }

    /// Raise an error from a failed expression: push the error value in
    /// place of the expression's result, then unwind only if the `d` bit of
    /// the running verb is set.
    pub(crate) fn push_error(&mut self, error: Error) -> ExecutionResult {
        trace!(?error, "push_error");
        self.push(v_err(error.clone()));
        if self.debug_bit_set() {
            return self.raise_error_exception(error);
        }
        ExecutionResult::More
    }

    /// Same as push_error, but for returns from builtin functions: the error
    /// value substitutes as the builtin's return value in the caller.
    pub(crate) fn push_bf_error(&mut self, error: Error) -> ExecutionResult {
        trace!(?error, "push_bf_error");
        // The error value lands in the *calling* frame, not the builtin
        // frame, which is incapable of doing anything with it.
        self.parent_activation_mut()
            .frame
            .set_return_value(v_err(error.clone()));

        if self.debug_bit_set() {
            return self.raise_error_exception(error);
        }
        // Not unwinding, so pop the builtin's activation frame.
        self.stack.pop();
        ExecutionResult::More
    }

    /// Raise an error without a value-substitution site (mid-statement
    /// failures like a bad loop operand): unwinds only with the `d` bit on.
    pub(crate) fn raise_error(&mut self, error: Error) -> ExecutionResult {
        trace!(?error, "raise_error");
        if self.debug_bit_set() {
            return self.raise_error_exception(error);
        }
        ExecutionResult::More
    }

    /// Explicitly raise an error, regardless of the `d` bit; for `raise()`
    /// and stack-depth exhaustion.
    pub(crate) fn throw_error(&mut self, error: Error) -> ExecutionResult {
        trace!(?error, "throw_error");
        self.raise_error_exception(error)
    }

    /// The exception tuple pushed for a catch handler: {code, message,
    /// value, traceback}.
    fn exception_value(exception: &Exception) -> Var {
        v_list(&[
            v_err(exception.error.clone()),
            v_str(&exception.error.message()),
            exception
                .error
                .value
                .as_ref()
                .map(|v| (**v).clone())
                .unwrap_or_else(|| v_int(0)),
            v_list(&exception.backtrace),
        ])
    }

    /// Unwind the stack with the given reason, handling every exit path from
    /// a verb execution: raises hunting for a matching catch, returns
    /// delivering values, and loop exits, with finally blocks run along the
    /// way.
    pub(crate) fn unwind_stack(&mut self, why: FinallyReason) -> ExecutionResult {
        // Walk activation stack from top to bottom, tossing frames as we go.
        while let Some(a) = self.stack.last_mut() {
            if let Frame::Moo(frame) = &mut a.frame {
                // A loop exit stays within the current frame: unwind scopes
                // entered inside the loop (running their finally blocks),
                // then snap the value stack and jump.
                if let FinallyReason::Exit { stack, label } = &why {
                    while let Some(scope) = frame.scope_stack.last() {
                        if scope.valstack_pos < stack.0 as usize {
                            break;
                        }
                        let scope = frame.pop_scope().expect("scope stack modified under us");
                        if let ScopeType::TryFinally(finally_label) = scope.scope_type {
                            frame.jump(&finally_label);
                            frame.finally_stack.push(why.clone());
                            return ExecutionResult::More;
                        }
                    }
                    frame.valstack.truncate(stack.0 as usize);
                    frame.jump(label);
                    return ExecutionResult::More;
                }

                while let Some(scope) = frame.pop_scope() {
                    match scope.scope_type {
                        ScopeType::TryFinally(finally_label) => {
                            // Jump into the finally block, which will resume
                            // this unwind when it hits FinallyContinue.
                            frame.jump(&finally_label);
                            frame.finally_stack.push(why.clone());
                            return ExecutionResult::More;
                        }
                        ScopeType::TryCatch(catches) => {
                            if let FinallyReason::Raise(exception) = &why {
                                for (catch_type, label) in catches {
                                    let found = match catch_type {
                                        CatchType::Any => true,
                                        CatchType::Errors(errs) => {
                                            errs.contains(&exception.error)
                                        }
                                    };
                                    if found {
                                        frame.jump(&label);
                                        frame.push(Self::exception_value(exception));
                                        return ExecutionResult::More;
                                    }
                                }
                            }
                        }
                    }
                }
            }

            // No handler in this frame, so pop it.
            self.stack.pop().expect("stack underflow");
            if self.stack.is_empty() {
                break;
            }

            // If it was an explicit return that brought us here, deliver the
            // value to the caller's frame and keep running.
            if let FinallyReason::Return(value) = &why {
                self.set_return_value(value.clone());
                return ExecutionResult::More;
            }
        }

        match why {
            FinallyReason::Return(r) => ExecutionResult::Complete(r),
            FinallyReason::Fallthrough => ExecutionResult::Complete(v_none()),
            why => ExecutionResult::Exception(why),
        }
    }
}
