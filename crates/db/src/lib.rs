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

mod tx;
mod world;

pub use tx::DbTransaction;
pub use world::{Object, PropValue, VerbEntry, World};

use etamoo_common::model::{
    ObjFlag, ServerOptions, WorldState, WorldStateError, WorldStateSource,
};
use etamoo_common::util::BitEnum;
use etamoo_var::{Obj, Symbol, Variant, NOTHING, SYSTEM_OBJECT};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// The shared database: an atomically swapped world snapshot. Transactions
/// clone the tip (O(1), persistent structures), work privately, and commit by
/// compare-and-swap; losing a race means `ConflictRetry` and a task restart
/// from its last suspension point.
pub struct TxDb {
    tip: Arc<Mutex<Arc<World>>>,
    options: Mutex<Arc<ServerOptions>>,
}

impl TxDb {
    pub fn new(world: World) -> Self {
        let db = Self {
            tip: Arc::new(Mutex::new(Arc::new(world))),
            options: Mutex::new(Arc::new(ServerOptions::default())),
        };
        if let Err(e) = db.load_server_options() {
            warn!(error = ?e, "Could not read $server_options; using defaults");
        }
        db
    }

    /// A minimal bootstrap world: #0 the system object, #1 a wizard player.
    /// What a fresh server starts with when handed no database.
    pub fn with_minimal_core() -> Self {
        let mut world = World::new();
        let system = world.create(NOTHING, NOTHING, BitEnum::new_with(ObjFlag::Read));
        assert_eq!(system, SYSTEM_OBJECT);
        let wizard = world.create(
            NOTHING,
            NOTHING,
            BitEnum::new_with(ObjFlag::User) | ObjFlag::Wizard | ObjFlag::Programmer,
        );
        world
            .update_object(system, |o| {
                o.name = "System Object".to_string();
                o.owner = wizard;
            })
            .expect("system object vanished during bootstrap");
        world
            .update_object(wizard, |o| o.name = "Wizard".to_string())
            .expect("wizard vanished during bootstrap");
        info!("Bootstrapped minimal core: {} objects", 2);
        Self::new(world)
    }

    /// The current committed snapshot, for read-only observers (matching,
    /// options loading). Tasks should go through `new_world_state`.
    pub fn snapshot(&self) -> Arc<World> {
        self.tip.lock().clone()
    }

    fn read_options(world: &World) -> ServerOptions {
        let mut options = ServerOptions::default();
        let so = Symbol::mk("server_options");
        let Some(v) = world.property_value(SYSTEM_OBJECT, &so) else {
            return options;
        };
        let Variant::Obj(so_obj) = v.variant() else {
            return options;
        };
        let mut read_int = |name: &str| -> Option<i64> {
            world
                .property_value(*so_obj, &Symbol::mk(name))
                .and_then(|v| v.as_int())
        };
        if let Some(v) = read_int("fg_ticks") {
            options.fg_ticks = v.max(1) as usize;
        }
        if let Some(v) = read_int("bg_ticks") {
            options.bg_ticks = v.max(1) as usize;
        }
        if let Some(v) = read_int("fg_seconds") {
            options.fg_seconds = v.max(1) as u64;
        }
        if let Some(v) = read_int("bg_seconds") {
            options.bg_seconds = v.max(1) as u64;
        }
        if let Some(v) = read_int("max_stack_depth") {
            options.max_stack_depth = v.max(1) as usize;
        }
        options
    }
}

impl WorldStateSource for TxDb {
    fn new_world_state(&self) -> Result<Box<dyn WorldState>, WorldStateError> {
        let base = self.snapshot();
        let world = (*base).clone();
        Ok(Box::new(DbTransaction {
            tip: self.tip.clone(),
            base,
            world,
            mutated: false,
        }))
    }

    fn server_options(&self) -> Arc<ServerOptions> {
        self.options.lock().clone()
    }

    fn load_server_options(&self) -> Result<(), WorldStateError> {
        let snapshot = self.snapshot();
        let options = TxDb::read_options(&snapshot);
        *self.options.lock() = Arc::new(options);
        Ok(())
    }

    fn checkpoint(&self) -> Result<(), WorldStateError> {
        // The textual-dump writer is an external collaborator; in-memory
        // worlds have nothing to flush.
        Ok(())
    }
}

/// Convenience used all over the tests and the daemon bootstrap.
pub fn world_state_for(db: &TxDb) -> Box<dyn WorldState> {
    db.new_world_state().expect("could not open transaction")
}

#[cfg(test)]
mod tests {
    use super::*;
    use etamoo_common::model::{CommitResult, ObjAttrs, PropFlag, VerbArgsSpec, VerbFlag};
    use etamoo_var::{v_int, v_str, Obj};

    fn wizard() -> Obj {
        Obj::mk_id(1)
    }

    #[test]
    fn test_minimal_core_shape() {
        let db = TxDb::with_minimal_core();
        let ws = world_state_for(&db);
        assert!(ws.valid(SYSTEM_OBJECT).unwrap());
        assert!(ws.flags_of(wizard()).unwrap().contains(ObjFlag::Wizard));
        assert_eq!(ws.players().unwrap(), vec![wizard()]);
    }

    #[test]
    fn test_commit_makes_changes_visible() {
        let db = TxDb::with_minimal_core();
        let mut ws = world_state_for(&db);
        let obj = ws
            .create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        ws.commit().unwrap();

        let ws2 = world_state_for(&db);
        assert!(ws2.valid(obj).unwrap());
    }

    #[test]
    fn test_conflicting_commit_retries() {
        let db = TxDb::with_minimal_core();
        let mut a = world_state_for(&db);
        let mut b = world_state_for(&db);
        a.create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        b.create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        assert_eq!(a.commit().unwrap(), CommitResult::Success);
        assert_eq!(b.commit().unwrap(), CommitResult::ConflictRetry);
    }

    #[test]
    fn test_rolled_back_changes_invisible() {
        let db = TxDb::with_minimal_core();
        let mut ws = world_state_for(&db);
        let obj = ws
            .create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        ws.rollback().unwrap();
        let ws2 = world_state_for(&db);
        assert!(!ws2.valid(obj).unwrap());
    }

    #[test]
    fn test_property_inheritance_and_clear() {
        let db = TxDb::with_minimal_core();
        let mut ws = world_state_for(&db);
        let parent = ws
            .create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        let child = ws
            .create_object(wizard(), parent, wizard(), ObjAttrs::default())
            .unwrap();
        let pname = Symbol::mk("color");
        ws.define_property(
            wizard(),
            parent,
            parent,
            pname.clone(),
            wizard(),
            PropFlag::rw(),
            Some(v_str("red")),
        )
        .unwrap();

        // Inherited default, then override, then clear restores.
        assert_eq!(
            ws.retrieve_property(wizard(), child, pname.clone()).unwrap(),
            v_str("red")
        );
        assert!(ws.is_property_clear(wizard(), child, pname.clone()).unwrap());

        ws.update_property(wizard(), child, pname.clone(), &v_str("blue"))
            .unwrap();
        assert_eq!(
            ws.retrieve_property(wizard(), child, pname.clone()).unwrap(),
            v_str("blue")
        );
        assert_eq!(
            ws.retrieve_property(wizard(), parent, pname.clone()).unwrap(),
            v_str("red")
        );
        assert!(!ws.is_property_clear(wizard(), child, pname.clone()).unwrap());

        ws.clear_property(wizard(), child, pname.clone()).unwrap();
        assert_eq!(
            ws.retrieve_property(wizard(), child, pname.clone()).unwrap(),
            v_str("red")
        );
    }

    #[test]
    fn test_property_permission_denied() {
        let db = TxDb::with_minimal_core();
        let mut ws = world_state_for(&db);
        let peon = ws
            .create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        let pname = Symbol::mk("secret");
        ws.define_property(
            wizard(),
            SYSTEM_OBJECT,
            SYSTEM_OBJECT,
            pname.clone(),
            wizard(),
            BitEnum::new(),
            Some(v_int(42)),
        )
        .unwrap();
        // Unreadable to a non-controller.
        assert!(matches!(
            ws.retrieve_property(peon, SYSTEM_OBJECT, pname),
            Err(WorldStateError::PropertyPermissionDenied)
        ));
    }

    #[test]
    fn test_builtin_properties() {
        let db = TxDb::with_minimal_core();
        let ws = world_state_for(&db);
        assert_eq!(
            ws.retrieve_property(wizard(), SYSTEM_OBJECT, Symbol::mk("name"))
                .unwrap(),
            v_str("System Object")
        );
        assert_eq!(
            ws.retrieve_property(wizard(), wizard(), Symbol::mk("wizard"))
                .unwrap(),
            v_int(1)
        );
    }

    #[test]
    fn test_verb_resolution_walks_chain() {
        let db = TxDb::with_minimal_core();
        let mut ws = world_state_for(&db);
        let parent = ws
            .create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        let child = ws
            .create_object(wizard(), parent, wizard(), ObjAttrs::default())
            .unwrap();
        let program = etamoo_compiler::compile("return 42;").unwrap();
        ws.add_verb(
            wizard(),
            parent,
            vec![Symbol::mk("test*")],
            wizard(),
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
            program,
        )
        .unwrap();

        let (_, vd) = ws
            .find_method_verb_on(wizard(), child, Symbol::mk("testing"))
            .unwrap();
        assert_eq!(vd.location(), parent);
    }

    #[test]
    fn test_server_options_loading() {
        let db = TxDb::with_minimal_core();
        let mut ws = world_state_for(&db);
        let so = ws
            .create_object(wizard(), NOTHING, wizard(), ObjAttrs::default())
            .unwrap();
        ws.define_property(
            wizard(),
            SYSTEM_OBJECT,
            SYSTEM_OBJECT,
            Symbol::mk("server_options"),
            wizard(),
            PropFlag::r(),
            Some(etamoo_var::v_obj(so)),
        )
        .unwrap();
        ws.define_property(
            wizard(),
            so,
            so,
            Symbol::mk("fg_ticks"),
            wizard(),
            PropFlag::r(),
            Some(v_int(12345)),
        )
        .unwrap();
        ws.commit().unwrap();

        // Cached snapshot is stable until an explicit reload.
        assert_ne!(db.server_options().fg_ticks, 12345);
        db.load_server_options().unwrap();
        assert_eq!(db.server_options().fg_ticks, 12345);
        assert_eq!(db.server_options().bg_ticks, 30_000);
    }
}
