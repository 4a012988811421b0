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

use crate::util::BitEnum;
use etamoo_var::Obj;

/// The flags carried on every object. Bit positions match the LambdaMOO
/// textdump encoding, obsolete slots included.
#[derive(Debug, Ord, PartialOrd, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ObjFlag {
    User = 0,
    Programmer = 1,
    Wizard = 2,
    Obsolete1 = 3,
    Read = 4,
    Write = 5,
    Obsolete2 = 6,
    Fertile = 7,
}

impl From<ObjFlag> for u16 {
    fn from(f: ObjFlag) -> Self {
        f as u16
    }
}

/// The builtin attributes settable at object creation.
#[derive(Clone, Debug, Default)]
pub struct ObjAttrs {
    pub owner: Option<Obj>,
    pub name: Option<String>,
    pub parent: Option<Obj>,
    pub location: Option<Obj>,
    pub flags: Option<BitEnum<ObjFlag>>,
}
