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

//! The transaction layer: a `WorldState` implementation over a snapshot of
//! the world, with LambdaMOO's permission semantics. Mutations land in the
//! transaction's private copy and only become visible on a successful
//! commit.

use crate::world::{PropValue, VerbEntry, World};
use etamoo_common::model::{
    ArgSpec, CommitResult, ObjAttrs, ObjFlag, Perms, PrepSpec, PropAttrs, PropDef, PropFlag,
    PropPerms, VerbArgsSpec, VerbAttrs, VerbDef, VerbFlag, WorldState, WorldStateError,
};
use etamoo_common::util::BitEnum;
use etamoo_var::program::Program;
use etamoo_var::{v_int, v_list_iter, v_obj, v_string, Obj, Symbol, Var, NOTHING};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

pub struct DbTransaction {
    /// Shared handle to the committed world tip, for the commit CAS.
    pub(crate) tip: Arc<Mutex<Arc<World>>>,
    /// The snapshot this transaction started from; commit succeeds only if
    /// it is still the world's tip.
    pub(crate) base: Arc<World>,
    /// The transaction's working copy.
    pub(crate) world: World,
    pub(crate) mutated: bool,
}

impl DbTransaction {
    fn perms(&self, who: Obj) -> Result<Perms, WorldStateError> {
        let flags = self
            .world
            .objects
            .get(&who)
            .map(|o| o.flags)
            .unwrap_or_default();
        Ok(Perms::new(who, flags))
    }

    fn touch(&mut self) {
        self.mutated = true;
    }

    fn check_valid(&self, obj: Obj) -> Result<(), WorldStateError> {
        if !self.world.valid(obj) {
            return Err(WorldStateError::ObjectNotFound(obj));
        }
        Ok(())
    }

    /// Resolve a builtin property, if `pname` names one.
    fn builtin_property(&self, obj: Obj, pname: &Symbol) -> Result<Option<Var>, WorldStateError> {
        let o = self.world.object(obj)?;
        let v = match pname.as_str().to_lowercase().as_str() {
            "name" => v_string(o.name.clone()),
            "owner" => v_obj(o.owner),
            "location" => v_obj(o.location),
            "contents" => v_list_iter(o.contents.iter().map(|c| v_obj(*c))),
            "parent" => v_obj(o.parent),
            "children" => v_list_iter(o.children.iter().map(|c| v_obj(*c))),
            "programmer" => v_int(o.flags.contains(ObjFlag::Programmer) as i64),
            "wizard" => v_int(o.flags.contains(ObjFlag::Wizard) as i64),
            "player" => v_int(o.is_player() as i64),
            "r" => v_int(o.flags.contains(ObjFlag::Read) as i64),
            "w" => v_int(o.flags.contains(ObjFlag::Write) as i64),
            "f" => v_int(o.flags.contains(ObjFlag::Fertile) as i64),
            _ => return Ok(None),
        };
        Ok(Some(v))
    }

    /// Assign a builtin property, if `pname` names one. Flag bits and names
    /// are owner-settable; ownership and the privilege bits are wizard-only.
    fn set_builtin_property(
        &mut self,
        perms: &Perms,
        obj: Obj,
        pname: &Symbol,
        value: &Var,
    ) -> Result<Option<()>, WorldStateError> {
        let owner = self.world.object(obj)?.owner;
        match pname.as_str().to_lowercase().as_str() {
            "name" => {
                if !perms.controls(owner) {
                    return Err(WorldStateError::PropertyPermissionDenied);
                }
                let Some(name) = value.as_str() else {
                    return Err(WorldStateError::PropertyPermissionDenied);
                };
                let name = name.as_str().to_string();
                self.touch();
                self.world.update_object(obj, |o| o.name = name)?;
                Ok(Some(()))
            }
            "owner" => {
                perms.check_is_wizard()?;
                let Some(new_owner) = value.as_obj() else {
                    return Err(WorldStateError::PropertyPermissionDenied);
                };
                self.touch();
                self.world.update_object(obj, |o| o.owner = new_owner)?;
                Ok(Some(()))
            }
            "programmer" | "wizard" => {
                perms.check_is_wizard()?;
                let flag = if pname.as_str().eq_ignore_ascii_case("wizard") {
                    ObjFlag::Wizard
                } else {
                    ObjFlag::Programmer
                };
                let set = value.is_true();
                self.touch();
                self.world.update_object(obj, |o| {
                    if set {
                        o.flags.set(flag);
                    } else {
                        o.flags.clear(flag);
                    }
                })?;
                Ok(Some(()))
            }
            "r" | "w" | "f" => {
                if !perms.controls(owner) {
                    return Err(WorldStateError::PropertyPermissionDenied);
                }
                let flag = match pname.as_str().to_lowercase().as_str() {
                    "r" => ObjFlag::Read,
                    "w" => ObjFlag::Write,
                    _ => ObjFlag::Fertile,
                };
                let set = value.is_true();
                self.touch();
                self.world.update_object(obj, |o| {
                    if set {
                        o.flags.set(flag);
                    } else {
                        o.flags.clear(flag);
                    }
                })?;
                Ok(Some(()))
            }
            // Structural attributes only move through move/chparent, and the
            // player flag only through set_player_flag.
            "location" | "contents" | "parent" | "children" | "player" => {
                Err(WorldStateError::PropertyPermissionDenied)
            }
            _ => Ok(None),
        }
    }

    fn command_verb_matches(
        target: Obj,
        spec: VerbArgsSpec,
        dobj: Obj,
        prep: PrepSpec,
        iobj: Obj,
    ) -> bool {
        let arg_matches = |aspec: ArgSpec, what: Obj| match aspec {
            ArgSpec::None => what == NOTHING,
            ArgSpec::Any => true,
            ArgSpec::This => what == target,
        };
        let prep_matches = match spec.prep {
            PrepSpec::Any => true,
            PrepSpec::None => prep == PrepSpec::None,
            PrepSpec::Other(p) => prep == PrepSpec::Other(p),
        };
        arg_matches(spec.dobj, dobj) && prep_matches && arg_matches(spec.iobj, iobj)
    }
}

impl WorldState for DbTransaction {
    fn players(&self) -> Result<Vec<Obj>, WorldStateError> {
        Ok(self.world.players())
    }

    fn owner_of(&self, obj: Obj) -> Result<Obj, WorldStateError> {
        Ok(self.world.object(obj)?.owner)
    }

    fn controls(&self, who: Obj, what: Obj) -> Result<bool, WorldStateError> {
        let owner = self.owner_of(what)?;
        Ok(self.perms(who)?.controls(owner))
    }

    fn flags_of(&self, obj: Obj) -> Result<BitEnum<ObjFlag>, WorldStateError> {
        Ok(self.world.object(obj)?.flags)
    }

    fn set_flags_of(
        &mut self,
        perms: Obj,
        obj: Obj,
        flags: BitEnum<ObjFlag>,
    ) -> Result<(), WorldStateError> {
        let owner = self.owner_of(obj)?;
        let perms = self.perms(perms)?;
        perms.check_object_allows(owner, self.flags_of(obj)?, ObjFlag::Write)?;
        self.touch();
        self.world.update_object(obj, |o| o.flags = flags)
    }

    fn location_of(&self, _perms: Obj, obj: Obj) -> Result<Obj, WorldStateError> {
        Ok(self.world.object(obj)?.location)
    }

    fn contents_of(&self, _perms: Obj, obj: Obj) -> Result<Vec<Obj>, WorldStateError> {
        Ok(self.world.object(obj)?.contents.iter().copied().collect())
    }

    fn parent_of(&self, _perms: Obj, obj: Obj) -> Result<Obj, WorldStateError> {
        Ok(self.world.object(obj)?.parent)
    }

    fn children_of(&self, _perms: Obj, obj: Obj) -> Result<Vec<Obj>, WorldStateError> {
        Ok(self.world.object(obj)?.children.iter().copied().collect())
    }

    fn change_parent(
        &mut self,
        perms: Obj,
        obj: Obj,
        new_parent: Obj,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let perms = self.perms(perms)?;
        let owner = self.world.object(obj)?.owner;
        if !perms.controls(owner) {
            return Err(WorldStateError::ObjectPermissionDenied);
        }
        if new_parent != NOTHING {
            let parent_obj = self.world.object(new_parent)?;
            // The new parent must be fertile, or controlled by us.
            if !perms.controls(parent_obj.owner)
                && !parent_obj.flags.contains(ObjFlag::Fertile)
            {
                return Err(WorldStateError::ObjectPermissionDenied);
            }
        }
        self.touch();
        self.world.chparent(obj, new_parent)
    }

    fn valid(&self, obj: Obj) -> Result<bool, WorldStateError> {
        Ok(self.world.valid(obj))
    }

    fn name_of(&self, _perms: Obj, obj: Obj) -> Result<String, WorldStateError> {
        Ok(self.world.object(obj)?.name.clone())
    }

    fn create_object(
        &mut self,
        perms: Obj,
        parent: Obj,
        owner: Obj,
        attrs: ObjAttrs,
    ) -> Result<Obj, WorldStateError> {
        let perms = self.perms(perms)?;
        if parent != NOTHING {
            let parent_obj = self.world.object(parent)?;
            if !perms.controls(parent_obj.owner)
                && !parent_obj.flags.contains(ObjFlag::Fertile)
            {
                return Err(WorldStateError::ObjectPermissionDenied);
            }
        }
        // Setting an owner other than yourself (or self-ownership via #-1)
        // takes wizardliness.
        if owner != NOTHING && owner != perms.who && !perms.is_wizard() {
            return Err(WorldStateError::ObjectPermissionDenied);
        }
        self.touch();
        let oid = self
            .world
            .create(parent, owner, attrs.flags.unwrap_or_default());
        if let Some(name) = attrs.name {
            self.world.update_object(oid, |o| o.name = name)?;
        }
        if let Some(location) = attrs.location {
            self.world.move_object(oid, location)?;
        }
        Ok(oid)
    }

    fn recycle_object(&mut self, perms: Obj, obj: Obj) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let owner = self.owner_of(obj)?;
        if !self.perms(perms)?.controls(owner) {
            return Err(WorldStateError::ObjectPermissionDenied);
        }
        self.touch();
        self.world.recycle(obj)
    }

    fn max_object(&self, _perms: Obj) -> Result<Obj, WorldStateError> {
        Ok(Obj::mk_id(self.world.max_object))
    }

    fn reset_max_object(&mut self, perms: Obj) -> Result<(), WorldStateError> {
        self.perms(perms)?.check_is_wizard()?;
        self.touch();
        self.world.reset_max_object();
        Ok(())
    }

    fn renumber_object(&mut self, perms: Obj, obj: Obj) -> Result<Obj, WorldStateError> {
        self.perms(perms)?.check_is_wizard()?;
        self.touch();
        self.world.renumber(obj)
    }

    fn move_object(&mut self, perms: Obj, obj: Obj, new_loc: Obj) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let owner = self.owner_of(obj)?;
        if !self.perms(perms)?.controls(owner) {
            return Err(WorldStateError::ObjectPermissionDenied);
        }
        self.touch();
        self.world.move_object(obj, new_loc)
    }

    fn set_player_flag(
        &mut self,
        perms: Obj,
        obj: Obj,
        is_player: bool,
    ) -> Result<(), WorldStateError> {
        self.perms(perms)?.check_is_wizard()?;
        self.check_valid(obj)?;
        self.touch();
        self.world.update_object(obj, |o| {
            if is_player {
                o.flags.set(ObjFlag::User);
            } else {
                o.flags.clear(ObjFlag::User);
            }
        })
    }

    fn properties(&self, _perms: Obj, obj: Obj) -> Result<Vec<PropDef>, WorldStateError> {
        Ok(self.world.object(obj)?.propdefs.iter().cloned().collect())
    }

    fn retrieve_property(
        &self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
    ) -> Result<Var, WorldStateError> {
        self.check_valid(obj)?;
        // The builtin attributes are readable by anyone.
        if let Some(v) = self.builtin_property(obj, &pname)? {
            return Ok(v);
        }

        let Some(pp) = self.world.property_perms(obj, &pname) else {
            return Err(WorldStateError::PropertyNotFound(obj, pname.to_string()));
        };
        self.perms(perms)?
            .check_property_allows(pp.owner, pp.flags, PropFlag::Read)?;

        match self.world.property_value(obj, &pname) {
            Some(v) => Ok(v),
            // A fully clear chain yields 0, the way an unset-but-defined
            // property reads in the original server.
            None => Ok(v_int(0)),
        }
    }

    fn get_property_info(
        &self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
    ) -> Result<(PropDef, PropPerms), WorldStateError> {
        self.check_valid(obj)?;
        let Some((_, pd)) = self.world.find_propdef(obj, &pname) else {
            return Err(WorldStateError::PropertyNotFound(obj, pname.to_string()));
        };
        let pp = self
            .world
            .property_perms(obj, &pname)
            .expect("propdef without perms slot");
        self.perms(perms)?
            .check_property_allows(pp.owner, pp.flags, PropFlag::Read)?;
        Ok((
            pd,
            PropPerms {
                owner: pp.owner,
                flags: pp.flags,
            },
        ))
    }

    fn set_property_info(
        &mut self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
        attrs: PropAttrs,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let Some((definer, pd)) = self.world.find_propdef(obj, &pname) else {
            return Err(WorldStateError::PropertyNotFound(obj, pname.to_string()));
        };
        let pp = self
            .world
            .property_perms(obj, &pname)
            .expect("propdef without perms slot");
        // Changing info requires controlling the property.
        if !self.perms(perms)?.controls(pp.owner) {
            return Err(WorldStateError::PropertyPermissionDenied);
        }
        if attrs.owner.is_some() && !self.perms(perms)?.is_wizard() {
            return Err(WorldStateError::PropertyPermissionDenied);
        }
        self.touch();

        // Renaming rewrites the definition and every slot below it.
        if let Some(new_name) = &attrs.name {
            if *new_name != pname {
                if self.world.find_propdef(obj, new_name).is_some() {
                    return Err(WorldStateError::DuplicatePropertyDefinition(
                        obj,
                        new_name.to_string(),
                    ));
                }
                let new_pd = PropDef::new(pd.uuid(), pd.definer(), new_name.clone());
                self.world.update_object(definer, |o| {
                    o.propdefs.retain(|p| p.name() != pname);
                    o.propdefs.push_back(new_pd);
                })?;
                for target in std::iter::once(definer)
                    .chain(self.world.descendants(definer))
                    .collect::<Vec<_>>()
                {
                    let pname = pname.clone();
                    let new_name = new_name.clone();
                    self.world.update_object(target, |o| {
                        if let Some(pv) = o.propvalues.remove(&pname) {
                            o.propvalues.insert(new_name, pv);
                        }
                    })?;
                }
            }
        }
        let name_now = attrs.name.unwrap_or(pname);

        let owner = attrs.owner.unwrap_or(pp.owner);
        let flags = attrs.flags.unwrap_or(pp.flags);
        self.world.update_object(obj, |o| {
            match o.propvalues.get_mut(&name_now) {
                Some(pv) => {
                    pv.owner = owner;
                    pv.flags = flags;
                }
                None => {
                    o.propvalues.insert(
                        name_now,
                        PropValue {
                            owner,
                            flags,
                            value: None,
                        },
                    );
                }
            }
        })
    }

    fn update_property(
        &mut self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
        value: &Var,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let perms = self.perms(perms)?;
        if let Some(()) = self.set_builtin_property(&perms, obj, &pname, value)? {
            return Ok(());
        }

        let Some(pp) = self.world.property_perms(obj, &pname) else {
            return Err(WorldStateError::PropertyNotFound(obj, pname.to_string()));
        };
        perms.check_property_allows(pp.owner, pp.flags, PropFlag::Write)?;
        self.touch();
        let value = value.clone();
        self.world.update_object(obj, |o| {
            match o.propvalues.get_mut(&pname) {
                Some(pv) => pv.value = Some(value),
                None => {
                    // First local override; the slot takes the effective
                    // perms it was seen with.
                    o.propvalues.insert(
                        pname,
                        PropValue {
                            owner: pp.owner,
                            flags: pp.flags,
                            value: Some(value),
                        },
                    );
                }
            }
        })
    }

    fn is_property_clear(
        &self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
    ) -> Result<bool, WorldStateError> {
        self.check_valid(obj)?;
        let Some((definer, _)) = self.world.find_propdef(obj, &pname) else {
            return Err(WorldStateError::PropertyNotFound(obj, pname.to_string()));
        };
        let pp = self
            .world
            .property_perms(obj, &pname)
            .expect("propdef without perms slot");
        self.perms(perms)?
            .check_property_allows(pp.owner, pp.flags, PropFlag::Read)?;
        if definer == obj {
            return Ok(false);
        }
        let local = self
            .world
            .object(obj)?
            .propvalues
            .get(&pname)
            .and_then(|pv| pv.value.as_ref());
        Ok(local.is_none())
    }

    fn clear_property(
        &mut self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let Some((definer, _)) = self.world.find_propdef(obj, &pname) else {
            return Err(WorldStateError::PropertyNotFound(obj, pname.to_string()));
        };
        if definer == obj {
            // The definition itself can't be clear; there would be nothing to
            // inherit.
            return Err(WorldStateError::PropertyPermissionDenied);
        }
        let pp = self
            .world
            .property_perms(obj, &pname)
            .expect("propdef without perms slot");
        self.perms(perms)?
            .check_property_allows(pp.owner, pp.flags, PropFlag::Write)?;
        self.touch();
        self.world.update_object(obj, |o| {
            if let Some(pv) = o.propvalues.get_mut(&pname) {
                pv.value = None;
            }
        })
    }

    fn define_property(
        &mut self,
        perms: Obj,
        definer: Obj,
        location: Obj,
        pname: Symbol,
        owner: Obj,
        prop_flags: BitEnum<PropFlag>,
        initial_value: Option<Var>,
    ) -> Result<(), WorldStateError> {
        self.check_valid(location)?;
        let perms = self.perms(perms)?;
        let location_owner = self.world.object(location)?.owner;
        perms.check_object_allows(location_owner, self.flags_of(location)?, ObjFlag::Write)?;
        if owner != perms.who && !perms.is_wizard() {
            return Err(WorldStateError::PropertyPermissionDenied);
        }

        // No shadowing: the name must be free on the whole chain and in all
        // descendants.
        if self.world.find_propdef(location, &pname).is_some() {
            return Err(WorldStateError::DuplicatePropertyDefinition(
                location,
                pname.to_string(),
            ));
        }
        for descendant in self.world.descendants(location) {
            if self
                .world
                .object(descendant)?
                .propdefs
                .iter()
                .any(|pd| pd.name() == pname)
            {
                return Err(WorldStateError::DuplicatePropertyDefinition(
                    descendant,
                    pname.to_string(),
                ));
            }
        }

        self.touch();
        let pd = PropDef::new(Uuid::new_v4(), definer, pname.clone());
        self.world.update_object(location, |o| {
            o.propdefs.push_back(pd);
            o.propvalues.insert(
                pname,
                PropValue {
                    owner,
                    flags: prop_flags,
                    value: initial_value,
                },
            );
        })
    }

    fn delete_property(
        &mut self,
        perms: Obj,
        obj: Obj,
        pname: Symbol,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let defined_here = self
            .world
            .object(obj)?
            .propdefs
            .iter()
            .any(|pd| pd.name() == pname);
        if !defined_here {
            return Err(WorldStateError::PropertyNotFound(obj, pname.to_string()));
        }
        let pp = self
            .world
            .property_perms(obj, &pname)
            .expect("propdef without perms slot");
        if !self.perms(perms)?.controls(pp.owner) {
            return Err(WorldStateError::PropertyPermissionDenied);
        }
        self.touch();
        self.world.update_object(obj, |o| {
            o.propdefs.retain(|pd| pd.name() != pname);
            o.propvalues.remove(&pname);
        })?;
        for descendant in self.world.descendants(obj) {
            let pname = pname.clone();
            self.world.update_object(descendant, |o| {
                o.propvalues.remove(&pname);
            })?;
        }
        Ok(())
    }

    fn verbs(&self, _perms: Obj, obj: Obj) -> Result<Vec<VerbDef>, WorldStateError> {
        Ok(self
            .world
            .object(obj)?
            .verbs
            .iter()
            .map(|v| v.def.clone())
            .collect())
    }

    fn add_verb(
        &mut self,
        perms: Obj,
        obj: Obj,
        names: Vec<Symbol>,
        owner: Obj,
        flags: BitEnum<VerbFlag>,
        args: VerbArgsSpec,
        program: Program,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let perms = self.perms(perms)?;
        let obj_owner = self.world.object(obj)?.owner;
        perms.check_object_allows(obj_owner, self.flags_of(obj)?, ObjFlag::Write)?;
        if owner != perms.who && !perms.is_wizard() {
            return Err(WorldStateError::VerbPermissionDenied);
        }
        self.touch();
        let def = VerbDef::new_with_names(Uuid::new_v4(), obj, owner, names, flags, args);
        self.world
            .update_object(obj, |o| o.verbs.push_back(VerbEntry { def, program }))
    }

    fn remove_verb(&mut self, perms: Obj, obj: Obj, uuid: Uuid) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let Some(entry) = self.world.find_verb_by_uuid(obj, uuid) else {
            return Err(WorldStateError::VerbNotFound(obj, uuid.to_string()));
        };
        self.perms(perms)?.check_verb_allows(
            entry.def.owner(),
            entry.def.flags(),
            VerbFlag::Write,
        )?;
        self.touch();
        self.world
            .update_object(obj, |o| o.verbs.retain(|v| v.def.uuid() != uuid))
    }

    fn update_verb(
        &mut self,
        perms: Obj,
        obj: Obj,
        vname: Symbol,
        verb_attrs: VerbAttrs,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let o = self.world.object(obj)?;
        let Some(idx) = o.verbs.iter().position(|v| v.def.matches_name(&vname)) else {
            return Err(WorldStateError::VerbNotFound(obj, vname.to_string()));
        };
        self.update_verb_at_index(perms, obj, idx, verb_attrs)
    }

    fn update_verb_at_index(
        &mut self,
        perms: Obj,
        obj: Obj,
        vidx: usize,
        verb_attrs: VerbAttrs,
    ) -> Result<(), WorldStateError> {
        self.check_valid(obj)?;
        let entry = {
            let o = self.world.object(obj)?;
            let Some(entry) = o.verbs.get(vidx) else {
                return Err(WorldStateError::VerbNotFound(obj, format!("{vidx}")));
            };
            entry.clone()
        };
        let perms = self.perms(perms)?;
        perms.check_verb_allows(entry.def.owner(), entry.def.flags(), VerbFlag::Write)?;
        if verb_attrs.owner.is_some() && !perms.is_wizard() {
            return Err(WorldStateError::VerbPermissionDenied);
        }
        self.touch();
        let new_def = entry.def.with(&verb_attrs);
        let new_program = verb_attrs.program.unwrap_or(entry.program);
        self.world.update_object(obj, |o| {
            o.verbs.set(
                vidx,
                VerbEntry {
                    def: new_def,
                    program: new_program,
                },
            );
        })
    }

    fn get_verb(&self, _perms: Obj, obj: Obj, vname: Symbol) -> Result<VerbDef, WorldStateError> {
        let o = self.world.object(obj)?;
        let Some(entry) = o.verbs.iter().find(|v| v.def.matches_name(&vname)) else {
            return Err(WorldStateError::VerbNotFound(obj, vname.to_string()));
        };
        Ok(entry.def.clone())
    }

    fn get_verb_at_index(
        &self,
        _perms: Obj,
        obj: Obj,
        vidx: usize,
    ) -> Result<VerbDef, WorldStateError> {
        let o = self.world.object(obj)?;
        let Some(entry) = o.verbs.get(vidx) else {
            return Err(WorldStateError::VerbNotFound(obj, format!("{vidx}")));
        };
        Ok(entry.def.clone())
    }

    fn retrieve_verb(
        &self,
        perms: Obj,
        obj: Obj,
        uuid: Uuid,
    ) -> Result<(Program, VerbDef), WorldStateError> {
        let Some(entry) = self.world.find_verb_by_uuid(obj, uuid) else {
            return Err(WorldStateError::VerbNotFound(obj, uuid.to_string()));
        };
        self.perms(perms)?.check_verb_allows(
            entry.def.owner(),
            entry.def.flags(),
            VerbFlag::Read,
        )?;
        Ok((entry.program, entry.def))
    }

    fn find_method_verb_on(
        &self,
        _perms: Obj,
        obj: Obj,
        vname: Symbol,
    ) -> Result<(Program, VerbDef), WorldStateError> {
        self.check_valid(obj)?;
        let Some((_, entry)) = self.world.find_verb(obj, &vname) else {
            return Err(WorldStateError::VerbNotFound(obj, vname.to_string()));
        };
        // Method dispatch requires the verb be executable.
        if !entry.def.flags().contains(VerbFlag::Exec) {
            return Err(WorldStateError::VerbPermissionDenied);
        }
        Ok((entry.program, entry.def))
    }

    fn find_command_verb_on(
        &self,
        _perms: Obj,
        obj: Obj,
        command_verb: Symbol,
        dobj: Obj,
        prep: PrepSpec,
        iobj: Obj,
    ) -> Result<Option<(Program, VerbDef)>, WorldStateError> {
        if !self.world.valid(obj) {
            return Ok(None);
        }
        for o in self.world.chain(obj) {
            let Ok(object) = self.world.object(o) else {
                continue;
            };
            for entry in object.verbs.iter() {
                if entry.def.matches_name(&command_verb)
                    && Self::command_verb_matches(obj, entry.def.args(), dobj, prep, iobj)
                {
                    return Ok(Some((entry.program.clone(), entry.def.clone())));
                }
            }
        }
        Ok(None)
    }

    fn db_usage(&self) -> Result<usize, WorldStateError> {
        let mut total = 0;
        for (_, o) in self.world.objects.iter() {
            total += std::mem::size_of::<crate::world::Object>();
            total += o.name.len();
            total += o.verbs.iter().map(|v| v.program.source.len()).sum::<usize>();
            total += o
                .propvalues
                .iter()
                .map(|(_, pv)| {
                    pv.value
                        .as_ref()
                        .map(etamoo_var::value_bytes)
                        .unwrap_or(0)
                })
                .sum::<usize>();
        }
        Ok(total)
    }

    fn commit(self: Box<Self>) -> Result<CommitResult, WorldStateError> {
        if !self.mutated {
            return Ok(CommitResult::Success);
        }
        let mut tip = self.tip.lock();
        if !Arc::ptr_eq(&tip, &self.base) {
            return Ok(CommitResult::ConflictRetry);
        }
        *tip = Arc::new(self.world);
        Ok(CommitResult::Success)
    }

    fn rollback(self: Box<Self>) -> Result<(), WorldStateError> {
        // Nothing to do; the working copy just drops.
        Ok(())
    }
}
