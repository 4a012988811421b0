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

use crate::matching::match_env::MatchEnvironment;
use crate::model::WorldStateError;
use etamoo_var::{Obj, NOTHING};
use std::collections::HashMap;

pub const MOCK_PLAYER: Obj = Obj(3);
pub const MOCK_ROOM1: Obj = Obj(1);
pub const MOCK_ROOM2: Obj = Obj(2);
pub const MOCK_THING1: Obj = Obj(4);
pub const MOCK_THING2: Obj = Obj(5);

struct MockObject {
    location: Obj,
    contents: Vec<Obj>,
    names: Vec<String>,
}

#[derive(Default)]
pub struct MockMatchEnvironment {
    objects: HashMap<Obj, MockObject>,
}

impl MockMatchEnvironment {
    fn insert(&mut self, oid: Obj, location: Obj, contents: Vec<Obj>, names: Vec<&str>) {
        self.objects.insert(
            oid,
            MockObject {
                location,
                contents,
                names: names.iter().map(|s| s.to_string()).collect(),
            },
        );
    }
}

impl MatchEnvironment for MockMatchEnvironment {
    fn obj_valid(&self, oid: Obj) -> Result<bool, WorldStateError> {
        Ok(self.objects.contains_key(&oid))
    }

    fn get_names(&self, oid: Obj) -> Result<Vec<String>, WorldStateError> {
        Ok(self
            .objects
            .get(&oid)
            .map(|o| o.names.clone())
            .unwrap_or_default())
    }

    fn get_surroundings(&self, player: Obj) -> Result<Vec<Obj>, WorldStateError> {
        let mut result = vec![player];
        if let Some(p) = self.objects.get(&player) {
            result.extend(p.contents.iter().copied());
            result.push(p.location);
            if let Some(loc) = self.objects.get(&p.location) {
                result.extend(loc.contents.iter().copied());
            }
        }
        Ok(result)
    }

    fn location_of(&self, player: Obj) -> Result<Obj, WorldStateError> {
        Ok(self
            .objects
            .get(&player)
            .map(|o| o.location)
            .unwrap_or(NOTHING))
    }
}

pub fn setup_mock_environment() -> MockMatchEnvironment {
    let mut env = MockMatchEnvironment::default();
    env.insert(MOCK_ROOM1, NOTHING, vec![MOCK_PLAYER, MOCK_THING1, MOCK_THING2], vec!["room1"]);
    env.insert(MOCK_ROOM2, NOTHING, vec![], vec!["room2"]);
    env.insert(MOCK_PLAYER, MOCK_ROOM1, vec![], vec!["porcupine", "me"]);
    env.insert(MOCK_THING1, MOCK_ROOM1, vec![], vec!["thing1", "t1"]);
    env.insert(MOCK_THING2, MOCK_ROOM1, vec![], vec!["thing2", "t2"]);
    env
}
