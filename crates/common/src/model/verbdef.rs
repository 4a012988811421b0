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

use crate::model::r#match::VerbArgsSpec;
use crate::model::verbs::VerbFlag;
use crate::util::BitEnum;
use etamoo_var::{Obj, Symbol};
use uuid::Uuid;

/// The metadata of a verb: everything but the program itself.
#[derive(Clone, Debug, PartialEq)]
pub struct VerbDef {
    uuid: Uuid,
    location: Obj,
    owner: Obj,
    names: Vec<Symbol>,
    flags: BitEnum<VerbFlag>,
    args: VerbArgsSpec,
}

impl VerbDef {
    pub fn new(
        uuid: Uuid,
        location: Obj,
        owner: Obj,
        names: &[&str],
        flags: BitEnum<VerbFlag>,
        args: VerbArgsSpec,
    ) -> Self {
        Self {
            uuid,
            location,
            owner,
            names: names.iter().map(|n| Symbol::mk(n)).collect(),
            flags,
            args,
        }
    }

    pub fn new_with_names(
        uuid: Uuid,
        location: Obj,
        owner: Obj,
        names: Vec<Symbol>,
        flags: BitEnum<VerbFlag>,
        args: VerbArgsSpec,
    ) -> Self {
        Self {
            uuid,
            location,
            owner,
            names,
            flags,
            args,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The object the verb's program actually lives on, which may be an
    /// ancestor of the object it was resolved through.
    pub fn location(&self) -> Obj {
        self.location
    }

    pub fn owner(&self) -> Obj {
        self.owner
    }

    pub fn names(&self) -> &[Symbol] {
        &self.names
    }

    pub fn flags(&self) -> BitEnum<VerbFlag> {
        self.flags
    }

    pub fn args(&self) -> VerbArgsSpec {
        self.args
    }

    /// Does any of this verb's name aliases match `name`?
    pub fn matches_name(&self, name: &Symbol) -> bool {
        self.names
            .iter()
            .any(|alias| verbname_matches(alias.as_str(), name.as_str()))
    }

    pub fn with(&self, attrs: &crate::model::VerbAttrs) -> Self {
        Self {
            uuid: self.uuid,
            location: self.location,
            owner: attrs.owner.unwrap_or(self.owner),
            names: attrs.names.clone().unwrap_or_else(|| self.names.clone()),
            flags: attrs.flags.unwrap_or(self.flags),
            args: attrs.args_spec.unwrap_or(self.args),
        }
    }
}

/// The LambdaMOO verb-name wildcard rule: an alias "foo*bar" matches any
/// prefix of "foobar" that is at least "foo"; an alias ending in "*" matches
/// "foo" followed by anything at all; a bare "*" matches anything.
pub fn verbname_matches(alias: &str, candidate: &str) -> bool {
    let alias_lc = alias.to_lowercase();
    let cand = candidate.to_lowercase();
    match alias_lc.split_once('*') {
        None => alias_lc == cand,
        Some((head, "")) => cand.starts_with(head),
        Some((head, tail)) => {
            if !cand.starts_with(head) {
                return false;
            }
            let rest = &cand[head.len()..];
            // The candidate's remainder must be a prefix of the tail.
            tail.starts_with(rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::verbname_matches;

    #[test]
    fn test_exact() {
        assert!(verbname_matches("look", "look"));
        assert!(verbname_matches("look", "LOOK"));
        assert!(!verbname_matches("look", "loo"));
    }

    #[test]
    fn test_star_rule() {
        assert!(verbname_matches("foo*bar", "foo"));
        assert!(verbname_matches("foo*bar", "foob"));
        assert!(verbname_matches("foo*bar", "foobar"));
        assert!(!verbname_matches("foo*bar", "foobaz"));
        assert!(!verbname_matches("foo*bar", "fo"));
        assert!(verbname_matches("*", "anything"));
        assert!(verbname_matches("g*et", "get"));
        assert!(verbname_matches("foo*", "foodle"));
        assert!(!verbname_matches("foo*", "fo"));
    }
}
