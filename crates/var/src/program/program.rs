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

use crate::program::labels::JumpLabel;
use crate::program::names::Names;
use crate::program::opcode::Op;
use crate::Var;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The result of compilation: the opcode stream and all its supporting
/// tables, plus the source it was compiled from. Cheap to clone; everything
/// hot is behind an Arc.
#[derive(Clone, PartialEq)]
pub struct Program {
    /// All the literals referenced in this program.
    pub literals: Arc<Vec<Var>>,
    /// All the jump offsets used in this program.
    pub jump_labels: Arc<Vec<JumpLabel>>,
    /// All the variable names used in this program.
    pub var_names: Arc<Names>,
    /// The main vector of opcodes.
    pub main_vector: Arc<Vec<Op>>,
    /// The vectors of opcodes created by fork statements, referenced by
    /// their offset.
    pub fork_vectors: Arc<Vec<Vec<Op>>>,
    /// Spans of (opcode offset, line number), for producing tracebacks.
    pub line_number_spans: Arc<Vec<(usize, usize)>>,
    /// The source this program was compiled from, retained so `verb_code`
    /// has something to show.
    pub source: Arc<String>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            literals: Arc::new(vec![]),
            jump_labels: Arc::new(vec![]),
            var_names: Arc::new(Names::new()),
            main_vector: Arc::new(vec![]),
            fork_vectors: Arc::new(vec![]),
            line_number_spans: Arc::new(vec![]),
            source: Arc::new(String::new()),
        }
    }

    /// The source line active at opcode offset `pc` in the main vector.
    pub fn find_line_no(&self, pc: usize) -> Option<usize> {
        if self.line_number_spans.is_empty() {
            return None;
        }
        let mut last_line_num = 1;
        for (offset, line_no) in self.line_number_spans.iter() {
            if *offset > pc {
                return Some(last_line_num);
            }
            last_line_num = *line_no;
        }
        Some(last_line_num)
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Add a few things that are useful for debugging, but keep the noise
        // down.
        f.debug_struct("Program")
            .field("main_vector_length", &self.main_vector.len())
            .field("num_fork_vectors", &self.fork_vectors.len())
            .field("num_literals", &self.literals.len())
            .field("width", &self.var_names.width())
            .finish()
    }
}
