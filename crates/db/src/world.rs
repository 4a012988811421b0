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

//! The raw object graph, with no permission checking: that lives in the
//! transaction layer above. Everything here is built on persistent
//! structures, so cloning a `World` for a transaction snapshot is O(1) and
//! mutation never disturbs other snapshots.

use etamoo_common::model::{
    ObjFlag, PropDef, PropFlag, VerbDef, WorldStateError,
};
use etamoo_common::util::BitEnum;
use etamoo_var::program::Program;
use etamoo_var::{Obj, Symbol, Var, NOTHING};
use uuid::Uuid;

/// A property slot on one object: its local permission bits and, unless the
/// property is clear here, its local value.
#[derive(Clone, Debug)]
pub struct PropValue {
    pub owner: Obj,
    pub flags: BitEnum<PropFlag>,
    /// None means "clear": the value is inherited from an ancestor.
    pub value: Option<Var>,
}

#[derive(Clone, Debug)]
pub struct VerbEntry {
    pub def: VerbDef,
    pub program: Program,
}

#[derive(Clone, Debug)]
pub struct Object {
    pub parent: Obj,
    pub owner: Obj,
    pub name: String,
    pub flags: BitEnum<ObjFlag>,
    pub location: Obj,
    pub contents: imbl::Vector<Obj>,
    pub children: imbl::Vector<Obj>,
    pub propdefs: imbl::Vector<PropDef>,
    pub propvalues: imbl::HashMap<Symbol, PropValue>,
    pub verbs: imbl::Vector<VerbEntry>,
}

impl Object {
    pub fn new(parent: Obj, owner: Obj, flags: BitEnum<ObjFlag>) -> Self {
        Self {
            parent,
            owner,
            name: String::new(),
            flags,
            location: NOTHING,
            contents: imbl::Vector::new(),
            children: imbl::Vector::new(),
            propdefs: imbl::Vector::new(),
            propvalues: imbl::HashMap::new(),
            verbs: imbl::Vector::new(),
        }
    }

    /// A wizard's programmer bit is implied.
    pub fn is_wizard(&self) -> bool {
        self.flags.contains(ObjFlag::Wizard)
    }

    pub fn is_programmer(&self) -> bool {
        self.flags.contains(ObjFlag::Programmer) || self.is_wizard()
    }

    pub fn is_player(&self) -> bool {
        self.flags.contains(ObjFlag::User)
    }
}

#[derive(Clone, Debug)]
pub struct World {
    pub objects: imbl::HashMap<Obj, Object>,
    /// The monotone object-number allocator; `create` hands out
    /// `max_object + 1`.
    pub max_object: i32,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            objects: imbl::HashMap::new(),
            max_object: -1,
        }
    }

    pub fn valid(&self, obj: Obj) -> bool {
        self.objects.contains_key(&obj)
    }

    pub fn object(&self, obj: Obj) -> Result<&Object, WorldStateError> {
        self.objects
            .get(&obj)
            .ok_or(WorldStateError::ObjectNotFound(obj))
    }

    fn object_mut(&mut self, obj: Obj) -> Result<&mut Object, WorldStateError> {
        self.objects
            .get_mut(&obj)
            .ok_or(WorldStateError::ObjectNotFound(obj))
    }

    /// The parent chain of `obj`, nearest first, not including `obj` itself.
    pub fn ancestors(&self, obj: Obj) -> Vec<Obj> {
        let mut result = vec![];
        let mut search = self.objects.get(&obj).map(|o| o.parent).unwrap_or(NOTHING);
        while search != NOTHING {
            result.push(search);
            search = self
                .objects
                .get(&search)
                .map(|o| o.parent)
                .unwrap_or(NOTHING);
        }
        result
    }

    /// `obj` and then its parent chain.
    pub fn chain(&self, obj: Obj) -> Vec<Obj> {
        let mut result = vec![obj];
        result.extend(self.ancestors(obj));
        result
    }

    pub fn descendants(&self, obj: Obj) -> Vec<Obj> {
        let mut result = vec![];
        let mut queue = vec![obj];
        while let Some(o) = queue.pop() {
            if let Some(o) = self.objects.get(&o) {
                for child in o.children.iter() {
                    result.push(*child);
                    queue.push(*child);
                }
            }
        }
        result
    }

    pub fn players(&self) -> Vec<Obj> {
        let mut players: Vec<Obj> = self
            .objects
            .iter()
            .filter(|(_, o)| o.is_player())
            .map(|(oid, _)| *oid)
            .collect();
        players.sort();
        players
    }

    /// Allocate the next object number and insert a fresh object.
    pub fn create(&mut self, parent: Obj, owner: Obj, flags: BitEnum<ObjFlag>) -> Obj {
        self.max_object += 1;
        let oid = Obj::mk_id(self.max_object);
        // An ownerless create owns itself.
        let owner = if owner == NOTHING { oid } else { owner };
        self.insert(oid, Object::new(parent, owner, flags));
        oid
    }

    /// Insert an object with a specific id, wiring up the parent's child set.
    /// Used by create, renumber and the loader.
    pub fn insert(&mut self, oid: Obj, object: Object) {
        let parent = object.parent;
        self.objects.insert(oid, object);
        if parent != NOTHING {
            if let Some(p) = self.objects.get_mut(&parent) {
                p.children.push_back(oid);
            }
        }
        if oid.id() > self.max_object {
            self.max_object = oid.id();
        }
    }

    /// Destroy `obj`: re-parent its children to its parent, dump its contents
    /// into #-1, and unlink it everywhere.
    pub fn recycle(&mut self, obj: Obj) -> Result<(), WorldStateError> {
        let o = self.object(obj)?.clone();

        // Children move up to the recycled object's parent.
        for child in o.children.iter() {
            let child = *child;
            self.chparent(child, o.parent)?;
        }

        // Contents go nowhere.
        for content in o.contents.iter() {
            let content = *content;
            if let Ok(c) = self.object_mut(content) {
                c.location = NOTHING;
            }
        }

        // Unlink from the old parent and location.
        if o.parent != NOTHING {
            if let Ok(p) = self.object_mut(o.parent) {
                p.children.retain(|c| *c != obj);
            }
        }
        if o.location != NOTHING {
            if let Ok(l) = self.object_mut(o.location) {
                l.contents.retain(|c| *c != obj);
            }
        }

        self.objects.remove(&obj);
        Ok(())
    }

    /// Change the parent of `obj`, enforcing the no-cycles invariant and
    /// migrating property slots: descendants lose slots for properties
    /// defined on the departing chain.
    pub fn chparent(&mut self, obj: Obj, new_parent: Obj) -> Result<(), WorldStateError> {
        if new_parent != NOTHING {
            if !self.valid(new_parent) {
                return Err(WorldStateError::ObjectNotFound(new_parent));
            }
            // Walking up from the new parent must never reach obj.
            if new_parent == obj || self.ancestors(new_parent).contains(&obj) {
                return Err(WorldStateError::RecursiveMove(obj, new_parent));
            }
        }

        let old_parent = self.object(obj)?.parent;
        if old_parent == new_parent {
            return Ok(());
        }

        // Property definitions on the old chain that are not on the new one
        // lose their slots on obj and all its descendants.
        let old_chain = self.ancestors(obj);
        let new_chain = if new_parent == NOTHING {
            vec![]
        } else {
            self.chain(new_parent)
        };
        let mut lost_props: Vec<Symbol> = vec![];
        let mut gained_props: Vec<Symbol> = vec![];
        for ancestor in &old_chain {
            if new_chain.contains(ancestor) {
                continue;
            }
            let ancestor = self.object(*ancestor)?;
            lost_props.extend(ancestor.propdefs.iter().map(|pd| pd.name()));
        }
        for ancestor in &new_chain {
            if old_chain.contains(ancestor) {
                continue;
            }
            let ancestor = self.object(*ancestor)?;
            gained_props.extend(ancestor.propdefs.iter().map(|pd| pd.name()));
        }

        // A property defined on obj (or below) colliding with one arriving
        // from the new chain is an error.
        for target in std::iter::once(obj).chain(self.descendants(obj)) {
            let target_obj = self.object(target)?;
            for pd in target_obj.propdefs.iter() {
                if gained_props.contains(&pd.name()) {
                    return Err(WorldStateError::DuplicatePropertyDefinition(
                        target,
                        pd.name().to_string(),
                    ));
                }
            }
        }

        for target in std::iter::once(obj).chain(self.descendants(obj)) {
            let target_obj = self.object_mut(target)?;
            for lost in &lost_props {
                target_obj.propvalues.remove(lost);
            }
        }

        if old_parent != NOTHING {
            self.object_mut(old_parent)?.children.retain(|c| *c != obj);
        }
        if new_parent != NOTHING {
            self.object_mut(new_parent)?.children.push_back(obj);
        }
        self.object_mut(obj)?.parent = new_parent;
        Ok(())
    }

    /// Move `obj` into `dest`, enforcing the no-location-cycles invariant.
    pub fn move_object(&mut self, obj: Obj, dest: Obj) -> Result<(), WorldStateError> {
        if dest != NOTHING {
            if !self.valid(dest) {
                return Err(WorldStateError::ObjectNotFound(dest));
            }
            // Walking up locations from dest must never reach obj.
            let mut search = dest;
            while search != NOTHING {
                if search == obj {
                    return Err(WorldStateError::RecursiveMove(obj, dest));
                }
                search = self.object(search)?.location;
            }
        }

        let old_location = self.object(obj)?.location;
        if old_location == dest {
            return Ok(());
        }
        if old_location != NOTHING {
            self.object_mut(old_location)?.contents.retain(|c| *c != obj);
        }
        if dest != NOTHING {
            self.object_mut(dest)?.contents.push_back(obj);
        }
        self.object_mut(obj)?.location = dest;
        Ok(())
    }

    /// Give `obj` the lowest free object number below its current one,
    /// rewriting structural references. Property values that mention the old
    /// number are deliberately left alone.
    pub fn renumber(&mut self, obj: Obj) -> Result<Obj, WorldStateError> {
        if !self.valid(obj) {
            return Err(WorldStateError::ObjectNotFound(obj));
        }
        let mut new_id = 0;
        while new_id < obj.id() {
            if !self.valid(Obj::mk_id(new_id)) {
                break;
            }
            new_id += 1;
        }
        if new_id >= obj.id() {
            return Ok(obj);
        }
        let new_obj = Obj::mk_id(new_id);

        let o = self.objects.remove(&obj).expect("checked valid above");
        self.objects.insert(new_obj, o);

        // Rewrite every structural link that named the old id.
        let oids: Vec<Obj> = self.objects.keys().copied().collect();
        for oid in oids {
            let o = self.object_mut(oid)?;
            if o.parent == obj {
                o.parent = new_obj;
            }
            if o.location == obj {
                o.location = new_obj;
            }
            if o.owner == obj {
                o.owner = new_obj;
            }
            o.children = o
                .children
                .iter()
                .map(|c| if *c == obj { new_obj } else { *c })
                .collect();
            o.contents = o
                .contents
                .iter()
                .map(|c| if *c == obj { new_obj } else { *c })
                .collect();
        }
        Ok(new_obj)
    }

    /// Reset the allocator to just past the highest object in use.
    pub fn reset_max_object(&mut self) {
        self.max_object = self.objects.keys().map(|o| o.id()).max().unwrap_or(-1);
    }

    /// Find the object in `obj`'s chain that defines property `pname`.
    pub fn find_propdef(&self, obj: Obj, pname: &Symbol) -> Option<(Obj, PropDef)> {
        for o in self.chain(obj) {
            let Some(object) = self.objects.get(&o) else {
                continue;
            };
            if let Some(pd) = object.propdefs.iter().find(|pd| pd.name() == *pname) {
                return Some((o, pd.clone()));
            }
        }
        None
    }

    /// The effective value of property `pname` on `obj`: the nearest
    /// non-clear slot walking up from `obj` to the definer.
    pub fn property_value(&self, obj: Obj, pname: &Symbol) -> Option<Var> {
        let (definer, _) = self.find_propdef(obj, pname)?;
        for o in self.chain(obj) {
            if let Some(pv) = self.objects.get(&o).and_then(|o| o.propvalues.get(pname)) {
                if let Some(v) = &pv.value {
                    return Some(v.clone());
                }
            }
            if o == definer {
                break;
            }
        }
        None
    }

    /// The effective permission slot for `pname` as seen from `obj`: the
    /// nearest slot walking up the chain.
    pub fn property_perms(&self, obj: Obj, pname: &Symbol) -> Option<PropValue> {
        self.find_propdef(obj, pname)?;
        for o in self.chain(obj) {
            if let Some(pv) = self.objects.get(&o).and_then(|o| o.propvalues.get(pname)) {
                return Some(pv.clone());
            }
        }
        None
    }

    /// Find a verb by name on `obj` or its ancestors. Returns the location it
    /// was found on and the entry.
    pub fn find_verb(&self, obj: Obj, vname: &Symbol) -> Option<(Obj, VerbEntry)> {
        for o in self.chain(obj) {
            let Some(object) = self.objects.get(&o) else {
                continue;
            };
            if let Some(v) = object.verbs.iter().find(|v| v.def.matches_name(vname)) {
                return Some((o, v.clone()));
            }
        }
        None
    }

    pub fn find_verb_by_uuid(&self, obj: Obj, uuid: Uuid) -> Option<VerbEntry> {
        let object = self.objects.get(&obj)?;
        object.verbs.iter().find(|v| v.def.uuid() == uuid).cloned()
    }

    pub fn update_object<F>(&mut self, obj: Obj, f: F) -> Result<(), WorldStateError>
    where
        F: FnOnce(&mut Object),
    {
        let o = self.object_mut(obj)?;
        f(o);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etamoo_var::v_int;

    fn world_with_tree() -> (World, Obj, Obj, Obj) {
        let mut world = World::new();
        let root = world.create(NOTHING, NOTHING, BitEnum::new());
        let mid = world.create(root, NOTHING, BitEnum::new());
        let leaf = world.create(mid, NOTHING, BitEnum::new());
        (world, root, mid, leaf)
    }

    #[test]
    fn test_parentage_invariants() {
        let (world, root, mid, leaf) = world_with_tree();
        assert_eq!(world.ancestors(leaf), vec![mid, root]);
        assert!(world.object(root).unwrap().children.contains(&mid));
        assert!(world.descendants(root).contains(&leaf));
    }

    #[test]
    fn test_chparent_cycle_detection() {
        let (mut world, root, _mid, leaf) = world_with_tree();
        assert!(matches!(
            world.chparent(root, leaf),
            Err(WorldStateError::RecursiveMove(_, _))
        ));
        assert!(matches!(
            world.chparent(root, root),
            Err(WorldStateError::RecursiveMove(_, _))
        ));
        // And the failed attempt changed nothing.
        assert_eq!(world.object(root).unwrap().parent, NOTHING);
    }

    #[test]
    fn test_chparent_drops_stale_slots() {
        let (mut world, root, mid, leaf) = world_with_tree();
        let pname = Symbol::mk("color");
        world
            .update_object(mid, |o| {
                o.propdefs
                    .push_back(PropDef::new(Uuid::new_v4(), mid, pname.clone()));
                o.propvalues.insert(
                    pname.clone(),
                    PropValue {
                        owner: mid,
                        flags: BitEnum::new(),
                        value: Some(v_int(1)),
                    },
                );
            })
            .unwrap();
        world
            .update_object(leaf, |o| {
                o.propvalues.insert(
                    pname.clone(),
                    PropValue {
                        owner: leaf,
                        flags: BitEnum::new(),
                        value: Some(v_int(2)),
                    },
                );
            })
            .unwrap();
        assert_eq!(world.property_value(leaf, &pname), Some(v_int(2)));

        world.chparent(leaf, root).unwrap();
        // The defining ancestor is gone, so the slot went with it.
        assert_eq!(world.property_value(leaf, &pname), None);
        assert!(world
            .object(leaf)
            .unwrap()
            .propvalues
            .get(&pname)
            .is_none());
    }

    #[test]
    fn test_move_cycle_detection() {
        let (mut world, root, mid, _leaf) = world_with_tree();
        world.move_object(mid, root).unwrap();
        assert!(matches!(
            world.move_object(root, mid),
            Err(WorldStateError::RecursiveMove(_, _))
        ));
        assert!(matches!(
            world.move_object(root, root),
            Err(WorldStateError::RecursiveMove(_, _))
        ));
    }

    #[test]
    fn test_move_maintains_contents() {
        let (mut world, root, mid, leaf) = world_with_tree();
        world.move_object(leaf, root).unwrap();
        assert!(world.object(root).unwrap().contents.contains(&leaf));
        world.move_object(leaf, mid).unwrap();
        assert!(!world.object(root).unwrap().contents.contains(&leaf));
        assert!(world.object(mid).unwrap().contents.contains(&leaf));
        assert_eq!(world.object(leaf).unwrap().location, mid);
    }

    #[test]
    fn test_recycle_reparents_children() {
        let (mut world, root, mid, leaf) = world_with_tree();
        world.recycle(mid).unwrap();
        assert!(!world.valid(mid));
        assert_eq!(world.object(leaf).unwrap().parent, root);
        assert!(world.object(root).unwrap().children.contains(&leaf));
    }

    #[test]
    fn test_renumber_compacts() {
        let (mut world, root, mid, leaf) = world_with_tree();
        world.recycle(mid).unwrap();
        let new_id = world.renumber(leaf).unwrap();
        assert_eq!(new_id, mid);
        assert!(world.object(root).unwrap().children.contains(&new_id));
        world.reset_max_object();
        assert_eq!(world.max_object, 1);
    }
}
