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
use crate::util::BitEnum;
use etamoo_var::program::Program;
use etamoo_var::{Obj, Symbol};

#[derive(Debug, Ord, PartialOrd, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VerbFlag {
    Read = 0,
    Write = 1,
    Exec = 2,
    Debug = 3,
}

impl From<VerbFlag> for u16 {
    fn from(f: VerbFlag) -> Self {
        f as u16
    }
}

impl VerbFlag {
    pub fn parse_str(s: &str) -> Option<BitEnum<Self>> {
        let mut flags = BitEnum::new();
        for c in s.chars() {
            match c {
                'r' => flags |= VerbFlag::Read,
                'w' => flags |= VerbFlag::Write,
                'x' => flags |= VerbFlag::Exec,
                'd' => flags |= VerbFlag::Debug,
                _ => return None,
            }
        }
        Some(flags)
    }

    #[must_use]
    pub fn rxd() -> BitEnum<Self> {
        BitEnum::new_with(Self::Read) | Self::Exec | Self::Debug
    }

    #[must_use]
    pub fn rx() -> BitEnum<Self> {
        BitEnum::new_with(Self::Read) | Self::Exec
    }

    #[must_use]
    pub fn xd() -> BitEnum<Self> {
        BitEnum::new_with(Self::Exec) | Self::Debug
    }
}

pub fn verb_perms_string(perms: BitEnum<VerbFlag>) -> String {
    let mut perms_string = String::new();
    if perms.contains(VerbFlag::Read) {
        perms_string.push('r');
    }
    if perms.contains(VerbFlag::Write) {
        perms_string.push('w');
    }
    if perms.contains(VerbFlag::Exec) {
        perms_string.push('x');
    }
    if perms.contains(VerbFlag::Debug) {
        perms_string.push('d');
    }
    perms_string
}

/// The mutable attributes of a verb, for `set_verb_info` / `set_verb_args` /
/// `set_verb_code`. Unset fields are left as they were.
#[derive(Clone, Debug, Default)]
pub struct VerbAttrs {
    pub owner: Option<Obj>,
    pub names: Option<Vec<Symbol>>,
    pub flags: Option<BitEnum<VerbFlag>>,
    pub args_spec: Option<VerbArgsSpec>,
    pub program: Option<Program>,
}
