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

//! Global registry of built-in function names and signatures. The dispatcher
//! uses the signatures to reject bad argument counts (E_ARGS) and types
//! (E_TYPE) before the function body ever runs.

use etamoo_var::program::BuiltinId;
use etamoo_var::Symbol;
use etamoo_var::VarType;
use etamoo_var::VarType::{TYPE_FLOAT, TYPE_INT, TYPE_LIST, TYPE_OBJ, TYPE_STR};
use lazy_static::lazy_static;
use std::collections::HashMap;
use ArgCount::{Q, U};
use ArgType::{Any, AnyNum, Typed};

lazy_static! {
    pub static ref BUILTINS: Builtins = Builtins::new();
}

pub enum ArgCount {
    /// Exactly this many.
    Q(usize),
    /// Unbounded.
    U,
}

pub enum ArgType {
    Typed(VarType),
    Any,
    AnyNum,
}

pub struct Builtin {
    pub name: Symbol,
    pub min_args: ArgCount,
    pub max_args: ArgCount,
    pub types: Vec<ArgType>,
}

fn bf(name: &str, min_args: ArgCount, max_args: ArgCount, types: Vec<ArgType>) -> Builtin {
    Builtin {
        name: Symbol::mk(name),
        min_args,
        max_args,
        types,
    }
}

fn mk_builtin_table() -> Vec<Builtin> {
    vec![
        // Values & conversions.
        bf("typeof", Q(1), Q(1), vec![Any]),
        bf("tostr", Q(0), U, vec![]),
        bf("toliteral", Q(1), Q(1), vec![Any]),
        bf("toint", Q(1), Q(1), vec![Any]),
        bf("tonum", Q(1), Q(1), vec![Any]),
        bf("toobj", Q(1), Q(1), vec![Any]),
        bf("tofloat", Q(1), Q(1), vec![Any]),
        bf("equal", Q(2), Q(2), vec![Any, Any]),
        bf("value_bytes", Q(1), Q(1), vec![Any]),
        bf("value_hash", Q(1), Q(1), vec![Any]),
        bf("raise", Q(1), Q(3), vec![Any, Typed(TYPE_STR), Any]),
        bf("call_function", Q(1), U, vec![Typed(TYPE_STR)]),
        bf("function_info", Q(0), Q(1), vec![Typed(TYPE_STR)]),
        bf("eval", Q(1), Q(1), vec![Typed(TYPE_STR)]),
        // Numbers.
        bf("random", Q(0), Q(1), vec![Typed(TYPE_INT)]),
        bf("min", Q(1), U, vec![AnyNum]),
        bf("max", Q(1), U, vec![AnyNum]),
        bf("abs", Q(1), Q(1), vec![AnyNum]),
        bf(
            "floatstr",
            Q(2),
            Q(3),
            vec![Typed(TYPE_FLOAT), Typed(TYPE_INT), Any],
        ),
        bf("sqrt", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("sin", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("cos", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("tan", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("asin", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("acos", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf(
            "atan",
            Q(1),
            Q(2),
            vec![Typed(TYPE_FLOAT), Typed(TYPE_FLOAT)],
        ),
        bf("sinh", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("cosh", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("tanh", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("exp", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("log", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("log10", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("ceil", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("floor", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        bf("trunc", Q(1), Q(1), vec![Typed(TYPE_FLOAT)]),
        // Strings.
        bf("length", Q(1), Q(1), vec![Any]),
        bf(
            "strsub",
            Q(3),
            Q(4),
            vec![Typed(TYPE_STR), Typed(TYPE_STR), Typed(TYPE_STR), Any],
        ),
        bf(
            "index",
            Q(2),
            Q(3),
            vec![Typed(TYPE_STR), Typed(TYPE_STR), Any],
        ),
        bf(
            "rindex",
            Q(2),
            Q(3),
            vec![Typed(TYPE_STR), Typed(TYPE_STR), Any],
        ),
        bf("strcmp", Q(2), Q(2), vec![Typed(TYPE_STR), Typed(TYPE_STR)]),
        bf("decode_binary", Q(1), Q(2), vec![Typed(TYPE_STR), Any]),
        bf("encode_binary", Q(0), U, vec![]),
        bf(
            "match",
            Q(2),
            Q(3),
            vec![Typed(TYPE_STR), Typed(TYPE_STR), Any],
        ),
        bf(
            "rmatch",
            Q(2),
            Q(3),
            vec![Typed(TYPE_STR), Typed(TYPE_STR), Any],
        ),
        bf(
            "substitute",
            Q(2),
            Q(2),
            vec![Typed(TYPE_STR), Typed(TYPE_LIST)],
        ),
        bf("crypt", Q(1), Q(2), vec![Typed(TYPE_STR), Typed(TYPE_STR)]),
        bf("string_hash", Q(1), Q(1), vec![Typed(TYPE_STR)]),
        bf("binary_hash", Q(1), Q(1), vec![Typed(TYPE_STR)]),
        // Lists.
        bf("is_member", Q(2), Q(2), vec![Any, Typed(TYPE_LIST)]),
        bf(
            "listinsert",
            Q(2),
            Q(3),
            vec![Typed(TYPE_LIST), Any, Typed(TYPE_INT)],
        ),
        bf(
            "listappend",
            Q(2),
            Q(3),
            vec![Typed(TYPE_LIST), Any, Typed(TYPE_INT)],
        ),
        bf(
            "listdelete",
            Q(2),
            Q(2),
            vec![Typed(TYPE_LIST), Typed(TYPE_INT)],
        ),
        bf(
            "listset",
            Q(3),
            Q(3),
            vec![Typed(TYPE_LIST), Any, Typed(TYPE_INT)],
        ),
        bf("setadd", Q(2), Q(2), vec![Typed(TYPE_LIST), Any]),
        bf("setremove", Q(2), Q(2), vec![Typed(TYPE_LIST), Any]),
        // Objects.
        bf("create", Q(1), Q(2), vec![Typed(TYPE_OBJ), Typed(TYPE_OBJ)]),
        bf("recycle", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("valid", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("parent", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("children", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf(
            "chparent",
            Q(2),
            Q(2),
            vec![Typed(TYPE_OBJ), Typed(TYPE_OBJ)],
        ),
        bf("max_object", Q(0), Q(0), vec![]),
        bf("players", Q(0), Q(0), vec![]),
        bf("is_player", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("set_player_flag", Q(2), Q(2), vec![Typed(TYPE_OBJ), Any]),
        bf("move", Q(2), Q(2), vec![Typed(TYPE_OBJ), Typed(TYPE_OBJ)]),
        // Properties.
        bf("properties", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf(
            "property_info",
            Q(2),
            Q(2),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR)],
        ),
        bf(
            "set_property_info",
            Q(3),
            Q(3),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR), Typed(TYPE_LIST)],
        ),
        bf(
            "add_property",
            Q(4),
            Q(4),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR), Any, Typed(TYPE_LIST)],
        ),
        bf(
            "delete_property",
            Q(2),
            Q(2),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR)],
        ),
        bf(
            "clear_property",
            Q(2),
            Q(2),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR)],
        ),
        bf(
            "is_clear_property",
            Q(2),
            Q(2),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR)],
        ),
        // Verbs.
        bf("verbs", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("verb_info", Q(2), Q(2), vec![Typed(TYPE_OBJ), Any]),
        bf(
            "set_verb_info",
            Q(3),
            Q(3),
            vec![Typed(TYPE_OBJ), Any, Typed(TYPE_LIST)],
        ),
        bf("verb_args", Q(2), Q(2), vec![Typed(TYPE_OBJ), Any]),
        bf(
            "set_verb_args",
            Q(3),
            Q(3),
            vec![Typed(TYPE_OBJ), Any, Typed(TYPE_LIST)],
        ),
        bf("verb_code", Q(2), Q(4), vec![Typed(TYPE_OBJ), Any, Any, Any]),
        bf(
            "set_verb_code",
            Q(3),
            Q(3),
            vec![Typed(TYPE_OBJ), Any, Typed(TYPE_LIST)],
        ),
        bf(
            "add_verb",
            Q(3),
            Q(3),
            vec![Typed(TYPE_OBJ), Typed(TYPE_LIST), Typed(TYPE_LIST)],
        ),
        bf("delete_verb", Q(2), Q(2), vec![Typed(TYPE_OBJ), Any]),
        bf("disassemble", Q(2), Q(2), vec![Typed(TYPE_OBJ), Any]),
        // Tasks.
        bf("task_id", Q(0), Q(0), vec![]),
        bf("queued_tasks", Q(0), Q(0), vec![]),
        bf("kill_task", Q(1), Q(1), vec![Typed(TYPE_INT)]),
        bf("resume", Q(1), Q(2), vec![Typed(TYPE_INT), Any]),
        bf("queue_info", Q(0), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("suspend", Q(0), Q(1), vec![AnyNum]),
        bf("read", Q(0), Q(2), vec![Typed(TYPE_OBJ), Any]),
        bf("seconds_left", Q(0), Q(0), vec![]),
        bf("ticks_left", Q(0), Q(0), vec![]),
        bf("caller_perms", Q(0), Q(0), vec![]),
        bf("set_task_perms", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("callers", Q(0), Q(1), vec![Any]),
        // Network / connections.
        bf(
            "notify",
            Q(2),
            Q(3),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR), Any],
        ),
        bf("connected_players", Q(0), Q(1), vec![Any]),
        bf("connected_seconds", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("idle_seconds", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("boot_player", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("connection_name", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf(
            "connection_option",
            Q(2),
            Q(2),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR)],
        ),
        bf(
            "set_connection_option",
            Q(3),
            Q(3),
            vec![Typed(TYPE_OBJ), Typed(TYPE_STR), Any],
        ),
        bf("listen", Q(2), Q(3), vec![Typed(TYPE_OBJ), Any, Any]),
        bf("unlisten", Q(1), Q(1), vec![Any]),
        bf("listeners", Q(0), Q(0), vec![]),
        bf("open_network_connection", Q(0), U, vec![]),
        // Server administration.
        bf("time", Q(0), Q(0), vec![]),
        bf("ctime", Q(0), Q(1), vec![Typed(TYPE_INT)]),
        bf("dump_database", Q(0), Q(0), vec![]),
        bf("shutdown", Q(0), Q(1), vec![Typed(TYPE_STR)]),
        bf("load_server_options", Q(0), Q(0), vec![]),
        bf("server_log", Q(1), Q(2), vec![Typed(TYPE_STR), Any]),
        bf("renumber", Q(1), Q(1), vec![Typed(TYPE_OBJ)]),
        bf("reset_max_object", Q(0), Q(0), vec![]),
        bf("server_version", Q(0), Q(0), vec![]),
        bf("memory_usage", Q(0), Q(0), vec![]),
        bf("db_disk_size", Q(0), Q(0), vec![]),
        bf("verb_cache_stats", Q(0), Q(0), vec![]),
        bf("log_cache_stats", Q(0), Q(0), vec![]),
    ]
}

pub struct Builtins {
    pub descriptors: Vec<Builtin>,
    names: HashMap<Symbol, BuiltinId>,
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl Builtins {
    pub fn new() -> Self {
        let descriptors = mk_builtin_table();
        let names = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), BuiltinId(i as u16)))
            .collect();
        Self { descriptors, names }
    }

    pub fn find_builtin(&self, name: &Symbol) -> Option<BuiltinId> {
        self.names.get(name).copied()
    }

    pub fn description_for(&self, id: BuiltinId) -> Option<&Builtin> {
        self.descriptors.get(id.0 as usize)
    }

    pub fn name_of(&self, id: BuiltinId) -> Option<Symbol> {
        self.descriptors.get(id.0 as usize).map(|d| d.name.clone())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Table offset for a known builtin; panics on unknown names, so only for
/// registration-time use.
pub fn offset_for_builtin(name: &str) -> usize {
    BUILTINS
        .find_builtin(&Symbol::mk(name))
        .unwrap_or_else(|| panic!("Unknown builtin: {name}"))
        .0 as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_builtin_case_insensitive() {
        assert!(BUILTINS.find_builtin(&Symbol::mk("TOSTR")).is_some());
        assert!(BUILTINS.find_builtin(&Symbol::mk("nonesuch")).is_none());
    }

    #[test]
    fn test_name_of_round_trip() {
        let id = BUILTINS.find_builtin(&Symbol::mk("suspend")).unwrap();
        assert_eq!(BUILTINS.name_of(id).unwrap().as_str(), "suspend");
    }
}
