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

//! Renders a compiled program as a readable opcode listing, for the
//! `disassemble()` builtin.

use crate::builtins::BUILTINS;
use etamoo_var::program::{Op, Program};
use etamoo_var::to_literal;

fn fmt_op(program: &Program, op: &Op) -> String {
    match op {
        Op::Imm(label) => {
            let literal = &program.literals[label.0 as usize];
            format!("IMM {}", to_literal(literal))
        }
        Op::Push(name) => {
            let sym = program.var_names.name_of(name);
            match sym {
                Some(sym) => format!("PUSH {sym}"),
                None => format!("PUSH ?{}", name.0),
            }
        }
        Op::Put(name) => {
            let sym = program.var_names.name_of(name);
            match sym {
                Some(sym) => format!("PUT {sym}"),
                None => format!("PUT ?{}", name.0),
            }
        }
        Op::FuncCall { id } => {
            let name = BUILTINS.name_of(*id);
            match name {
                Some(name) => format!("CALL_FUNC {name}"),
                None => format!("CALL_FUNC ?{}", id.0),
            }
        }
        Op::Jump { label } => {
            let position = program.jump_labels[label.0 as usize].position;
            format!("JUMP -> {}", position.0)
        }
        op => format!("{op:?}").to_uppercase(),
    }
}

/// Produce one listing line per opcode, main vector first, then each fork
/// vector.
pub fn disassemble(program: &Program) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "Main vector ({} opcodes):",
        program.main_vector.len()
    ));
    for (pc, op) in program.main_vector.iter().enumerate() {
        lines.push(format!(" {pc:>4}: {}", fmt_op(program, op)));
    }
    for (i, fv) in program.fork_vectors.iter().enumerate() {
        lines.push(format!("Fork vector {i} ({} opcodes):", fv.len()));
        for (pc, op) in fv.iter().enumerate() {
            lines.push(format!(" {pc:>4}: {}", fmt_op(program, op)));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::disassemble;
    use crate::compile;

    #[test]
    fn test_disassemble_names_things() {
        let program = compile("x = \"hello\"; return tostr(x);").unwrap();
        let listing = disassemble(&program).join("\n");
        assert!(listing.contains("IMM \"hello\""));
        assert!(listing.contains("PUT x"));
        assert!(listing.contains("CALL_FUNC tostr"));
    }
}
