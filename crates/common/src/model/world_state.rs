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

use crate::model::objects::{ObjAttrs, ObjFlag};
use crate::model::propdef::PropDef;
use crate::model::props::{PropAttrs, PropFlag, PropPerms};
use crate::model::r#match::{PrepSpec, VerbArgsSpec};
use crate::model::verbdef::VerbDef;
use crate::model::verbs::{VerbAttrs, VerbFlag};
use crate::util::BitEnum;
use etamoo_var::program::Program;
use etamoo_var::{Error, ErrorCode, Obj, Symbol, Var};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors related to the world state and operations on it.
#[derive(Error, Debug, Eq, PartialEq, Clone)]
pub enum WorldStateError {
    #[error("Object not found: {0}")]
    ObjectNotFound(Obj),
    #[error("Could not set/get object attribute on {0}")]
    ObjectAttributeError(Obj),
    #[error("Recursive move detected: {0} -> {1}")]
    RecursiveMove(Obj, Obj),

    #[error("Object permission denied")]
    ObjectPermissionDenied,

    #[error("Property not found: {0}.{1}")]
    PropertyNotFound(Obj, String),
    #[error("Property permission denied")]
    PropertyPermissionDenied,
    #[error("Duplicate property definition: {0}.{1}")]
    DuplicatePropertyDefinition(Obj, String),

    #[error("Verb not found: {0}:{1}")]
    VerbNotFound(Obj, String),
    #[error("Verb permission denied")]
    VerbPermissionDenied,
    #[error("Verb already exists: {0}:{1}")]
    DuplicateVerb(Obj, String),

    #[error("Failed object match: {0}")]
    FailedMatch(String),
    #[error("Ambiguous object match: {0}")]
    AmbiguousMatch(String),

    // Catch-all for system level object DB errors.
    #[error("DB communications/internal error: {0}")]
    DatabaseError(String),

    /// A rollback was requested, and the caller should retry the operation.
    #[error("Rollback requested, retry operation")]
    RollbackRetry,
}

/// Translations from WorldStateError to MOO error values.
impl WorldStateError {
    pub fn to_error_code(&self) -> Error {
        let code = match self {
            Self::ObjectNotFound(_) => ErrorCode::E_INVIND,
            Self::ObjectPermissionDenied => ErrorCode::E_PERM,
            Self::RecursiveMove(_, _) => ErrorCode::E_RECMOVE,
            Self::PropertyNotFound(_, _) => ErrorCode::E_PROPNF,
            Self::PropertyPermissionDenied => ErrorCode::E_PERM,
            Self::DuplicatePropertyDefinition(_, _) => ErrorCode::E_INVARG,
            Self::VerbNotFound(_, _) => ErrorCode::E_VERBNF,
            Self::VerbPermissionDenied => ErrorCode::E_PERM,
            Self::DuplicateVerb(_, _) => ErrorCode::E_INVARG,
            Self::FailedMatch(_) => ErrorCode::E_INVARG,
            Self::AmbiguousMatch(_) => ErrorCode::E_INVARG,
            _ => {
                panic!("Unhandled error code: {:?}", self);
            }
        };
        code.msg(self.to_string())
    }
}

impl From<WorldStateError> for Error {
    fn from(val: WorldStateError) -> Self {
        val.to_error_code()
    }
}

/// Outcome of committing a transaction against the shared world.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommitResult {
    Success,
    /// Another transaction committed first; the effects of this one were
    /// discarded and the task should re-run from its last suspension point.
    ConflictRetry,
}

/// The in-world tunables read off `$server_options`, cached between
/// `load_server_options()` calls so tasks see a stable snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerOptions {
    pub fg_ticks: usize,
    pub bg_ticks: usize,
    pub fg_seconds: u64,
    pub bg_seconds: u64,
    pub max_stack_depth: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            fg_ticks: 60_000,
            bg_ticks: 30_000,
            fg_seconds: 5,
            bg_seconds: 3,
            max_stack_depth: 50,
        }
    }
}

/// A "world state" is the shared, mutable state of the environment during
/// verb execution: objects and their locations, properties and verbs. Each
/// world state has the lifetime of a single transaction: it sees a consistent
/// snapshot taken at creation, and commits or rolls back at the end.
pub trait WorldState: Send {
    /// Get the set of all objects which are 'players' in the world.
    fn players(&self) -> Result<Vec<Obj>, WorldStateError>;

    /// Get the owner of an object.
    fn owner_of(&self, obj: Obj) -> Result<Obj, WorldStateError>;

    /// Return whether the given object is controlled by the given player
    /// (who is a wizard, or owns what).
    fn controls(&self, who: Obj, what: Obj) -> Result<bool, WorldStateError>;

    /// Flags of an object. Note this call does not take a permission
    /// context, because it is used to *determine* permissions.
    fn flags_of(&self, obj: Obj) -> Result<BitEnum<ObjFlag>, WorldStateError>;

    fn set_flags_of(
        &mut self,
        perms: Obj,
        obj: Obj,
        flags: BitEnum<ObjFlag>,
    ) -> Result<(), WorldStateError>;

    fn location_of(&self, perms: Obj, obj: Obj) -> Result<Obj, WorldStateError>;

    fn contents_of(&self, perms: Obj, obj: Obj) -> Result<Vec<Obj>, WorldStateError>;

    fn parent_of(&self, perms: Obj, obj: Obj) -> Result<Obj, WorldStateError>;

    fn children_of(&self, perms: Obj, obj: Obj) -> Result<Vec<Obj>, WorldStateError>;

    /// Change the parent of the given object, managing the movement of
    /// property definitions between the old and new parents.
    fn change_parent(&mut self, perms: Obj, obj: Obj, new_parent: Obj)
        -> Result<(), WorldStateError>;

    fn valid(&self, obj: Obj) -> Result<bool, WorldStateError>;

    fn name_of(&self, perms: Obj, obj: Obj) -> Result<String, WorldStateError>;

    /// Create a new object with the next free object id. If owner is #-1,
    /// the object owns itself.
    fn create_object(
        &mut self,
        perms: Obj,
        parent: Obj,
        owner: Obj,
        attrs: ObjAttrs,
    ) -> Result<Obj, WorldStateError>;

    /// Destroy the given object: re-parent its children to its parent, move
    /// its contents to #-1, and remove it.
    fn recycle_object(&mut self, perms: Obj, obj: Obj) -> Result<(), WorldStateError>;

    /// The highest used object number in the system.
    fn max_object(&self, perms: Obj) -> Result<Obj, WorldStateError>;

    /// Reset the object-number allocator to just past the highest object
    /// still in use.
    fn reset_max_object(&mut self, perms: Obj) -> Result<(), WorldStateError>;

    /// Renumber `obj` down into the lowest free slot, returning its new id.
    fn renumber_object(&mut self, perms: Obj, obj: Obj) -> Result<Obj, WorldStateError>;

    /// Move an object to a new location. (The caller is responsible for the
    /// `accept`/`enterfunc`/`exitfunc` protocol.)
    fn move_object(&mut self, perms: Obj, obj: Obj, new_loc: Obj) -> Result<(), WorldStateError>;

    fn set_player_flag(&mut self, perms: Obj, obj: Obj, is_player: bool)
        -> Result<(), WorldStateError>;

    /// The properties defined directly on the given object.
    fn properties(&self, perms: Obj, obj: Obj) -> Result<Vec<PropDef>, WorldStateError>;

    /// Retrieve a property (builtin attributes included), walking up the
    /// inheritance chain for the value.
    fn retrieve_property(&self, perms: Obj, obj: Obj, pname: Symbol)
        -> Result<Var, WorldStateError>;

    fn get_property_info(
        &self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
    ) -> Result<(PropDef, PropPerms), WorldStateError>;

    fn set_property_info(
        &mut self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
        attrs: PropAttrs,
    ) -> Result<(), WorldStateError>;

    fn update_property(
        &mut self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
        value: &Var,
    ) -> Result<(), WorldStateError>;

    fn is_property_clear(&self, perms: Obj, obj: Obj, pname: Symbol)
        -> Result<bool, WorldStateError>;

    fn clear_property(&mut self, perms: Obj, obj: Obj, pname: Symbol)
        -> Result<(), WorldStateError>;

    #[allow(clippy::too_many_arguments)]
    fn define_property(
        &mut self,
        perms: Obj,
        definer: Obj,
        location: Obj,
        pname: Symbol,
        owner: Obj,
        prop_flags: BitEnum<PropFlag>,
        initial_value: Option<Var>,
    ) -> Result<(), WorldStateError>;

    fn delete_property(&mut self, perms: Obj, obj: Obj, pname: Symbol)
        -> Result<(), WorldStateError>;

    /// The verbs defined directly on the given object.
    fn verbs(&self, perms: Obj, obj: Obj) -> Result<Vec<VerbDef>, WorldStateError>;

    #[allow(clippy::too_many_arguments)]
    fn add_verb(
        &mut self,
        perms: Obj,
        obj: Obj,
        names: Vec<Symbol>,
        owner: Obj,
        flags: BitEnum<VerbFlag>,
        args: VerbArgsSpec,
        program: Program,
    ) -> Result<(), WorldStateError>;

    fn remove_verb(&mut self, perms: Obj, obj: Obj, uuid: Uuid) -> Result<(), WorldStateError>;

    fn update_verb(
        &mut self,
        perms: Obj,
        obj: Obj,
        vname: Symbol,
        verb_attrs: VerbAttrs,
    ) -> Result<(), WorldStateError>;

    fn update_verb_at_index(
        &mut self,
        perms: Obj,
        obj: Obj,
        vidx: usize,
        verb_attrs: VerbAttrs,
    ) -> Result<(), WorldStateError>;

    /// The verbdef with the given name on the object, without inheritance
    /// resolution.
    fn get_verb(&self, perms: Obj, obj: Obj, vname: Symbol) -> Result<VerbDef, WorldStateError>;

    fn get_verb_at_index(
        &self,
        perms: Obj,
        obj: Obj,
        vidx: usize,
    ) -> Result<VerbDef, WorldStateError>;

    /// The program of the given verb, which must live directly on `obj`.
    fn retrieve_verb(
        &self,
        perms: Obj,
        obj: Obj,
        uuid: Uuid,
    ) -> Result<(Program, VerbDef), WorldStateError>;

    /// Resolve a verb for a method call, walking the inheritance chain.
    fn find_method_verb_on(
        &self,
        perms: Obj,
        obj: Obj,
        vname: Symbol,
    ) -> Result<(Program, VerbDef), WorldStateError>;

    /// Resolve the verb referenced by a parsed command on the given object,
    /// matching name and argument specification up the inheritance chain.
    fn find_command_verb_on(
        &self,
        perms: Obj,
        obj: Obj,
        command_verb: Symbol,
        dobj: Obj,
        prep: PrepSpec,
        iobj: Obj,
    ) -> Result<Option<(Program, VerbDef)>, WorldStateError>;

    /// A rough total of bytes used by database storage.
    fn db_usage(&self) -> Result<usize, WorldStateError>;

    /// Commit all modifications made against the shared world since this
    /// transaction began.
    fn commit(self: Box<Self>) -> Result<CommitResult, WorldStateError>;

    /// Throw away all modifications made during this transaction.
    fn rollback(self: Box<Self>) -> Result<(), WorldStateError>;
}

pub trait WorldStateSource: Send + Sync {
    /// Begin a new transaction: a world state with a consistent snapshot.
    fn new_world_state(&self) -> Result<Box<dyn WorldState>, WorldStateError>;

    /// The currently cached `$server_options` snapshot.
    fn server_options(&self) -> Arc<ServerOptions>;

    /// Re-read `$server_options` from the database. Reads between loads see
    /// a stable snapshot.
    fn load_server_options(&self) -> Result<(), WorldStateError>;

    /// Synchronize any in-memory state with the backing store.
    fn checkpoint(&self) -> Result<(), WorldStateError>;
}
