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

use etamoo_var::Obj;
use std::sync::Arc;
use thiserror::Error;

/// The interface for the user I/O connection side of the world, exposed to
/// the VM during execution.
///
/// Because task execution is transactional, sessions are expected to behave
/// transactionally as well: output is buffered until the task commits, and
/// thrown away on rollback.
pub trait Session: Send + Sync {
    /// Commit and flush buffered output. Called after the world state has
    /// successfully committed. The session is not usable afterwards.
    fn commit(&self) -> Result<(), SessionError>;

    /// Throw away buffered output. Called after the world state has rolled
    /// back. The session is not usable afterwards.
    fn rollback(&self) -> Result<(), SessionError>;

    /// "Fork" this session: a new session attached to the same connection,
    /// but with its own buffer, for forked tasks running in their own
    /// transaction.
    fn fork(self: Arc<Self>) -> Result<Arc<dyn Session>, SessionError>;

    /// Buffer a line of output for the given player (the `notify` builtin).
    fn send_text(&self, player: Obj, msg: &str) -> Result<(), SessionError>;

    /// Send to every connected player, without waiting for commit.
    fn broadcast_text(&self, msg: &str) -> Result<(), SessionError>;

    /// Request a line of input from the player's connection (`read`).
    fn request_input(&self, player: Obj) -> Result<(), SessionError>;

    fn connected_players(&self) -> Result<Vec<Obj>, SessionError>;

    /// How long the player has been connected, in seconds.
    fn connected_seconds(&self, player: Obj) -> Result<f64, SessionError>;

    /// How long the player's connection has been idle, in seconds.
    fn idle_seconds(&self, player: Obj) -> Result<f64, SessionError>;

    /// The hostname/address string for the player's connection.
    fn connection_name(&self, player: Obj) -> Result<String, SessionError>;

    /// Boot the player's connection.
    fn disconnect(&self, player: Obj) -> Result<(), SessionError>;
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SessionError {
    #[error("No connection for player {0}")]
    NoConnectionForPlayer(Obj),
    #[error("Could not deliver session message")]
    DeliveryError,
    #[error("Session IO error: {0}")]
    CommitError(String),
}

/// A session with no connection behind it: output is discarded. Used for
/// tests and for background tasks whose player is not connected.
pub struct NoopClientSession {}

impl NoopClientSession {
    pub fn new() -> Arc<Self> {
        Arc::new(NoopClientSession {})
    }
}

impl Session for NoopClientSession {
    fn commit(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn rollback(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn fork(self: Arc<Self>) -> Result<Arc<dyn Session>, SessionError> {
        Ok(self.clone())
    }

    fn send_text(&self, _player: Obj, _msg: &str) -> Result<(), SessionError> {
        Ok(())
    }

    fn broadcast_text(&self, _msg: &str) -> Result<(), SessionError> {
        Ok(())
    }

    fn request_input(&self, player: Obj) -> Result<(), SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn connected_players(&self) -> Result<Vec<Obj>, SessionError> {
        Ok(vec![])
    }

    fn connected_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn idle_seconds(&self, player: Obj) -> Result<f64, SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn connection_name(&self, player: Obj) -> Result<String, SessionError> {
        Err(SessionError::NoConnectionForPlayer(player))
    }

    fn disconnect(&self, _player: Obj) -> Result<(), SessionError> {
        Ok(())
    }
}
