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

use crate::model::objects::ObjFlag;
use crate::model::props::PropFlag;
use crate::model::verbs::VerbFlag;
use crate::model::world_state::WorldStateError;
use crate::util::BitEnum;
use etamoo_var::Obj;

/// The permission context of a running task: who it is acting as, and that
/// object's flags.
#[derive(Clone, Debug, PartialEq)]
pub struct Perms {
    pub who: Obj,
    pub flags: BitEnum<ObjFlag>,
}

impl Perms {
    pub fn new(who: Obj, flags: BitEnum<ObjFlag>) -> Self {
        Self { who, flags }
    }

    pub fn is_wizard(&self) -> bool {
        self.flags.contains(ObjFlag::Wizard)
    }

    /// Wizards implicitly have the programmer bit.
    pub fn is_programmer(&self) -> bool {
        self.flags.contains(ObjFlag::Programmer) || self.flags.contains(ObjFlag::Wizard)
    }

    pub fn check_is_wizard(&self) -> Result<(), WorldStateError> {
        if self.is_wizard() {
            return Ok(());
        }
        Err(WorldStateError::ObjectPermissionDenied)
    }

    /// Does this task control `owner`'s things? Wizards control everything;
    /// everyone controls their own.
    pub fn controls(&self, owner: Obj) -> bool {
        self.is_wizard() || self.who == owner
    }

    pub fn check_object_allows(
        &self,
        owner: Obj,
        object_flags: BitEnum<ObjFlag>,
        allows: ObjFlag,
    ) -> Result<(), WorldStateError> {
        if self.controls(owner) || object_flags.contains(allows) {
            return Ok(());
        }
        Err(WorldStateError::ObjectPermissionDenied)
    }

    pub fn check_property_allows(
        &self,
        owner: Obj,
        prop_flags: BitEnum<PropFlag>,
        allows: PropFlag,
    ) -> Result<(), WorldStateError> {
        if self.controls(owner) || prop_flags.contains(allows) {
            return Ok(());
        }
        Err(WorldStateError::PropertyPermissionDenied)
    }

    pub fn check_verb_allows(
        &self,
        owner: Obj,
        verb_flags: BitEnum<VerbFlag>,
        allows: VerbFlag,
    ) -> Result<(), WorldStateError> {
        if self.controls(owner) || verb_flags.contains(allows) {
            return Ok(());
        }
        Err(WorldStateError::VerbPermissionDenied)
    }
}
