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

use etamoo_var::{Obj, Symbol};
use uuid::Uuid;

/// The definition of a property: where it was defined and under what name.
/// Values and permissions live with the objects that hold them.
#[derive(Clone, Debug, PartialEq)]
pub struct PropDef {
    uuid: Uuid,
    definer: Obj,
    name: Symbol,
}

impl PropDef {
    pub fn new(uuid: Uuid, definer: Obj, name: Symbol) -> Self {
        Self {
            uuid,
            definer,
            name,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn definer(&self) -> Obj {
        self.definer
    }

    pub fn name(&self) -> Symbol {
        self.name.clone()
    }
}
