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

use crate::model::WorldStateError;
use crate::tasks::{AbortLimitReason, Exception, TaskId};
use thiserror::Error;

/// Errors that can arise from parsing and dispatching a player command.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    #[error("Could not parse command")]
    CouldNotParseCommand,
    #[error("Could not find verb for command")]
    NoCommandMatch,
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Database error: {0}")]
    DatabaseError(#[from] WorldStateError),
}

/// Scheduler-level failures surfaced to task submitters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("Could not start task")]
    CouldNotStartTask,
    #[error("Compilation error: {0}")]
    CompilationError(String),
    #[error("Command execution error: {0}")]
    CommandExecutionError(#[from] CommandError),
    #[error("Task aborted due to resource limit: {0:?}")]
    TaskAbortedLimit(AbortLimitReason),
    #[error("Task aborted due to rollback retry failure")]
    TaskAbortedError,
    #[error("Task aborted due to exception")]
    TaskAbortedException(Exception),
    #[error("Task aborted due to cancellation")]
    TaskAbortedCancelled,
    #[error("Scheduler is not running")]
    SchedulerNotResponding,
}
