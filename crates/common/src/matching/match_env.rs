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
use etamoo_var::{Obj, AMBIGUOUS, FAILED_MATCH, NOTHING};

/// Resolves an object phrase from a command line to an object id.
pub trait ObjectNameMatcher {
    fn match_object(&self, name: &str) -> Result<Option<Obj>, WorldStateError>;
}

/// The slice of the world that object matching needs to see: names and
/// surroundings. Implemented over the world state for live matching, and by
/// a mock for parser tests.
pub trait MatchEnvironment {
    fn obj_valid(&self, oid: Obj) -> Result<bool, WorldStateError>;

    /// The name and aliases of an object.
    fn get_names(&self, oid: Obj) -> Result<Vec<String>, WorldStateError>;

    /// The objects to search for matches: the player, the player's location,
    /// and the contents of both.
    fn get_surroundings(&self, player: Obj) -> Result<Vec<Obj>, WorldStateError>;

    fn location_of(&self, player: Obj) -> Result<Obj, WorldStateError>;
}

struct MatchData {
    exact: Obj,
    partial: Obj,
}

fn do_match_object_names(
    oid: Obj,
    match_data: &mut MatchData,
    names: &[String],
    match_name: &str,
) -> bool {
    let match_name = match_name.to_lowercase();

    for object_name in names {
        let object_name = object_name.to_lowercase();
        if object_name.starts_with(&match_name) {
            // Exact match.
            if object_name == match_name {
                if match_data.exact == NOTHING || match_data.exact == oid {
                    match_data.exact = oid;
                } else {
                    return true;
                }
            } else {
                // Prefix match.
                if match_data.partial == FAILED_MATCH || match_data.partial == oid {
                    match_data.partial = oid;
                } else {
                    match_data.partial = AMBIGUOUS;
                }
            }
        }
    }
    false
}

/// Match `object_name` against the player's surroundings the way the command
/// parser does: `me`, `here`, `#N`, then exact name/alias, then unambiguous
/// prefix. Returns the AMBIGUOUS / FAILED_MATCH sentinels rather than erring.
pub fn world_match_object<M: MatchEnvironment>(
    env: &M,
    player: Obj,
    object_name: &str,
) -> Result<Option<Obj>, WorldStateError> {
    if object_name.is_empty() {
        return Ok(None);
    }

    // If if's an object number (is prefixed with # and is followed by a
    // valid integer), then we can return directly.
    if let Some(stripped) = object_name.strip_prefix('#') {
        if let Ok(object_number) = stripped.parse::<i32>() {
            return Ok(Some(Obj::mk_id(object_number)));
        }
    }

    match object_name.to_lowercase().as_str() {
        "me" => return Ok(Some(player)),
        "here" => return Ok(Some(env.location_of(player)?)),
        _ => {}
    }

    let mut match_data = MatchData {
        exact: NOTHING,
        partial: FAILED_MATCH,
    };
    for oid in env.get_surroundings(player)? {
        if !env.obj_valid(oid)? {
            continue;
        }
        let names = env.get_names(oid)?;
        if do_match_object_names(oid, &mut match_data, &names, object_name) {
            return Ok(Some(AMBIGUOUS));
        }
    }

    if match_data.exact != NOTHING {
        Ok(Some(match_data.exact))
    } else {
        Ok(Some(match_data.partial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::mock_matching_env::{
        setup_mock_environment, MOCK_PLAYER, MOCK_ROOM1, MOCK_THING1, MOCK_THING2,
    };

    #[test]
    fn test_match_by_number() {
        let env = setup_mock_environment();
        let result = world_match_object(&env, MOCK_PLAYER, "#4").unwrap();
        assert_eq!(result, Some(Obj::mk_id(4)));
    }

    #[test]
    fn test_match_me_here() {
        let env = setup_mock_environment();
        assert_eq!(
            world_match_object(&env, MOCK_PLAYER, "me").unwrap(),
            Some(MOCK_PLAYER)
        );
        assert_eq!(
            world_match_object(&env, MOCK_PLAYER, "here").unwrap(),
            Some(MOCK_ROOM1)
        );
    }

    #[test]
    fn test_match_exact_and_partial() {
        let env = setup_mock_environment();
        assert_eq!(
            world_match_object(&env, MOCK_PLAYER, "thing1").unwrap(),
            Some(MOCK_THING1)
        );
        assert_eq!(
            world_match_object(&env, MOCK_PLAYER, "t2").unwrap(),
            Some(MOCK_THING2)
        );
        // "thing" prefixes both things.
        assert_eq!(
            world_match_object(&env, MOCK_PLAYER, "th").unwrap(),
            Some(AMBIGUOUS)
        );
    }

    #[test]
    fn test_match_failure() {
        let env = setup_mock_environment();
        assert_eq!(
            world_match_object(&env, MOCK_PLAYER, "frobozz").unwrap(),
            Some(FAILED_MATCH)
        );
    }
}
