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

//! The live `MatchEnvironment` over the world state, for resolving object
//! phrases in player commands.

use etamoo_common::matching::{world_match_object, MatchEnvironment, ObjectNameMatcher};
use etamoo_common::model::{WorldState, WorldStateError};
use etamoo_var::{Obj, Symbol, Variant};

pub struct WsMatchEnv<'a> {
    pub ws: &'a dyn WorldState,
    pub perms: Obj,
}

impl MatchEnvironment for WsMatchEnv<'_> {
    fn obj_valid(&self, oid: Obj) -> Result<bool, WorldStateError> {
        self.ws.valid(oid)
    }

    fn get_names(&self, oid: Obj) -> Result<Vec<String>, WorldStateError> {
        let mut names = vec![self.ws.name_of(self.perms, oid)?];
        // The "aliases" property is a core convention, not a builtin; treat
        // its absence (or wrong type) as no aliases.
        if let Ok(aliases) = self
            .ws
            .retrieve_property(self.perms, oid, Symbol::mk("aliases"))
        {
            if let Variant::List(aliases) = aliases.variant() {
                for a in aliases.iter() {
                    if let Variant::Str(s) = a.variant() {
                        names.push(s.as_str().to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    fn get_surroundings(&self, player: Obj) -> Result<Vec<Obj>, WorldStateError> {
        let location = self.ws.location_of(self.perms, player)?;
        let mut result = vec![player];
        result.extend(self.ws.contents_of(self.perms, player)?);
        result.push(location);
        if self.ws.valid(location)? {
            result.extend(self.ws.contents_of(self.perms, location)?);
        }
        Ok(result)
    }

    fn location_of(&self, player: Obj) -> Result<Obj, WorldStateError> {
        self.ws.location_of(self.perms, player)
    }
}

/// An `ObjectNameMatcher` bound to a player's point of view.
pub struct WsObjectNameMatcher<'a> {
    pub env: WsMatchEnv<'a>,
    pub player: Obj,
}

impl ObjectNameMatcher for WsObjectNameMatcher<'_> {
    fn match_object(&self, name: &str) -> Result<Option<Obj>, WorldStateError> {
        world_match_object(&self.env, self.player, name)
    }
}
