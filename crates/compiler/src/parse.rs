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

//! Kicks off the Pest parser and converts it into our AST.

use std::cell::RefCell;
use std::rc::Rc;

use pest::pratt_parser::{Assoc, Op, PrattParser};
pub use pest::Parser as PestParser;

use crate::ast::Arg::{Normal, Splice};
use crate::ast::{
    Arg, BinaryOp, CatchCodes, CondArm, ExceptArm, Expr, ScatterItem, ScatterKind, Stmt, StmtNode,
    UnaryOp,
};
use crate::parse::moo::{MooParser, Rule};
use crate::CompileError;
use etamoo_var::program::Names;
use etamoo_var::{v_err, v_float, v_int, v_objid, v_str, ErrorCode, Symbol, SYSTEM_OBJECT};

pub mod moo {
    use pest_derive::Parser;

    #[derive(Parser)]
    #[grammar = "src/moo.pest"]
    pub struct MooParser;
}

/// The result of parsing: the statement tree plus the variable name table it
/// references.
pub struct Parse {
    pub stmts: Vec<Stmt>,
    pub names: Names,
}

struct TreeTransformer {
    // Rc<RefCell<>> because the PrattParser closures make direct borrows
    // awkward; see https://github.com/pest-parser/pest/discussions/1030
    names: RefCell<Names>,
}

impl TreeTransformer {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            names: RefCell::new(Names::new()),
        })
    }

    fn parse_atom(self: Rc<Self>, pair: pest::iterators::Pair<Rule>) -> Result<Expr, CompileError> {
        match pair.as_rule() {
            Rule::ident => {
                let name = self
                    .names
                    .borrow_mut()
                    .find_or_add_name(pair.as_str().trim());
                Ok(Expr::Id(name))
            }
            Rule::object => {
                let ostr = &pair.as_str()[1..];
                let oid = ostr.parse::<i32>().map_err(|_| {
                    CompileError::ParseError(format!("invalid object literal: {}", pair.as_str()))
                })?;
                Ok(Expr::Value(v_objid(oid)))
            }
            Rule::integer => match pair.as_str().parse::<i64>() {
                Ok(int) => Ok(Expr::Value(v_int(int))),
                Err(_) => Err(CompileError::ParseError(format!(
                    "integer literal out of range: {}",
                    pair.as_str()
                ))),
            },
            Rule::float => {
                let float = pair.as_str().parse::<f64>().map_err(|_| {
                    CompileError::ParseError(format!("invalid float literal: {}", pair.as_str()))
                })?;
                Ok(Expr::Value(v_float(float)))
            }
            Rule::string => {
                let parsed = unquote_str(pair.as_str())?;
                Ok(Expr::Value(v_str(&parsed)))
            }
            Rule::err => {
                // The sixteen error names are literals; anything else that
                // happens to start with "e_" is just a variable.
                match ErrorCode::parse_str(pair.as_str()) {
                    Some(code) => Ok(Expr::Value(v_err(code))),
                    None => {
                        let name = self
                            .names
                            .borrow_mut()
                            .find_or_add_name(pair.as_str().trim());
                        Ok(Expr::Id(name))
                    }
                }
            }
            _ => {
                panic!("Unimplemented atom: {:?}", pair);
            }
        }
    }

    fn parse_exprlist(
        self: Rc<Self>,
        pairs: pest::iterators::Pairs<Rule>,
    ) -> Result<Vec<Arg>, CompileError> {
        let mut args = vec![];
        for pair in pairs {
            match pair.as_rule() {
                Rule::argument => {
                    let is_splice = pair.as_str().trim_start().starts_with('@');
                    let expr = self
                        .clone()
                        .parse_expr(pair.into_inner().next().unwrap().into_inner())?;
                    args.push(if is_splice {
                        Splice(expr)
                    } else {
                        Normal(expr)
                    });
                }
                _ => {
                    panic!("Unimplemented exprlist: {:?}", pair);
                }
            }
        }
        Ok(args)
    }

    fn parse_arglist(
        self: Rc<Self>,
        mut pairs: pest::iterators::Pairs<Rule>,
    ) -> Result<Vec<Arg>, CompileError> {
        let Some(first) = pairs.next() else {
            return Ok(vec![]);
        };

        let Rule::exprlist = first.as_rule() else {
            panic!("Unimplemented arglist: {:?}", first);
        };

        self.parse_exprlist(first.into_inner())
    }

    fn parse_except_codes(
        self: Rc<Self>,
        pair: pest::iterators::Pair<Rule>,
    ) -> Result<CatchCodes, CompileError> {
        match pair.as_rule() {
            Rule::anycode => Ok(CatchCodes::Any),
            Rule::exprlist => Ok(CatchCodes::Codes(self.parse_exprlist(pair.into_inner())?)),
            _ => {
                panic!("Unimplemented except_codes: {:?}", pair);
            }
        }
    }

    fn parse_expr(
        self: Rc<Self>,
        pairs: pest::iterators::Pairs<Rule>,
    ) -> Result<Expr, CompileError> {
        let pratt = PrattParser::new()
            // Precedence from lowest to highest: C-like, with assignment at
            // the bottom and the suffix operators at the top.
            .op(Op::postfix(Rule::assign) | Op::prefix(Rule::scatter_assign))
            .op(Op::postfix(Rule::cond_expr))
            .op(Op::infix(Rule::lor, Assoc::Left))
            .op(Op::infix(Rule::land, Assoc::Left))
            .op(Op::infix(Rule::eq, Assoc::Left) | Op::infix(Rule::neq, Assoc::Left))
            .op(Op::infix(Rule::gt, Assoc::Left)
                | Op::infix(Rule::lt, Assoc::Left)
                | Op::infix(Rule::gte, Assoc::Left)
                | Op::infix(Rule::lte, Assoc::Left))
            .op(Op::infix(Rule::in_range, Assoc::Left))
            .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
            .op(Op::infix(Rule::mul, Assoc::Left)
                | Op::infix(Rule::div, Assoc::Left)
                | Op::infix(Rule::modulus, Assoc::Left))
            .op(Op::infix(Rule::pow, Assoc::Left))
            .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not))
            .op(Op::postfix(Rule::index_range)
                | Op::postfix(Rule::index_single)
                | Op::postfix(Rule::verb_call)
                | Op::postfix(Rule::verb_expr_call)
                | Op::postfix(Rule::prop)
                | Op::postfix(Rule::prop_expr));

        let primary_self = self.clone();
        let prefix_self = self.clone();
        let postfix_self = self.clone();

        let result = pratt
            .map_primary(|primary| match primary.as_rule() {
                Rule::atom => {
                    let mut inner = primary.into_inner();
                    primary_self.clone().parse_atom(inner.next().unwrap())
                }
                Rule::sysprop => {
                    let mut inner = primary.into_inner();
                    let property = inner.next().unwrap().as_str();
                    Ok(Expr::Prop {
                        location: Box::new(Expr::Value(v_objid(SYSTEM_OBJECT.id()))),
                        property: Box::new(Expr::Value(v_str(property))),
                    })
                }
                Rule::sysprop_call => {
                    let mut inner = primary.into_inner();
                    let verb = inner.next().unwrap().as_str().to_string();
                    let args = primary_self
                        .clone()
                        .parse_arglist(inner.next().unwrap().into_inner())?;
                    Ok(Expr::Verb {
                        location: Box::new(Expr::Value(v_objid(SYSTEM_OBJECT.id()))),
                        verb: Box::new(Expr::Value(v_str(&verb))),
                        args,
                    })
                }
                Rule::list => {
                    let mut inner = primary.into_inner();
                    if let Some(exprlist) = inner.next() {
                        let args = primary_self.clone().parse_exprlist(exprlist.into_inner())?;
                        Ok(Expr::List(args))
                    } else {
                        Ok(Expr::List(vec![]))
                    }
                }
                Rule::builtin_call => {
                    let mut inner = primary.into_inner();
                    let bf = inner.next().unwrap().as_str();
                    let args = primary_self
                        .clone()
                        .parse_arglist(inner.next().unwrap().into_inner())?;
                    Ok(Expr::Call {
                        function: Symbol::mk(bf),
                        args,
                    })
                }
                Rule::pass_expr => {
                    let mut inner = primary.into_inner();
                    let args = if let Some(arglist) = inner.next() {
                        primary_self.clone().parse_arglist(arglist.into_inner())?
                    } else {
                        vec![]
                    };
                    Ok(Expr::Pass { args })
                }
                Rule::range_end => Ok(Expr::Length),
                Rule::try_expr => {
                    let mut inner = primary.into_inner();
                    let try_expr = primary_self
                        .clone()
                        .parse_expr(inner.next().unwrap().into_inner())?;
                    let codes = inner.next().unwrap();
                    let catch_codes = primary_self
                        .clone()
                        .parse_except_codes(codes.into_inner().next().unwrap())?;
                    let except = match inner.next() {
                        Some(e) => Some(Box::new(
                            primary_self.clone().parse_expr(e.into_inner())?,
                        )),
                        None => None,
                    };
                    Ok(Expr::Catch {
                        trye: Box::new(try_expr),
                        codes: catch_codes,
                        except,
                    })
                }
                Rule::paren_expr => {
                    let mut inner = primary.into_inner();
                    primary_self
                        .clone()
                        .parse_expr(inner.next().unwrap().into_inner())
                }
                _ => todo!("Unimplemented primary: {:?}", primary.as_rule()),
            })
            .map_infix(|lhs, op, rhs| {
                let binop = match op.as_rule() {
                    Rule::add => BinaryOp::Add,
                    Rule::sub => BinaryOp::Sub,
                    Rule::mul => BinaryOp::Mul,
                    Rule::div => BinaryOp::Div,
                    Rule::modulus => BinaryOp::Mod,
                    Rule::pow => BinaryOp::Exp,
                    Rule::eq => BinaryOp::Eq,
                    Rule::neq => BinaryOp::NEq,
                    Rule::lt => BinaryOp::Lt,
                    Rule::lte => BinaryOp::LtE,
                    Rule::gt => BinaryOp::Gt,
                    Rule::gte => BinaryOp::GtE,
                    Rule::in_range => BinaryOp::In,
                    Rule::land => {
                        return Ok(Expr::And(Box::new(lhs?), Box::new(rhs?)));
                    }
                    Rule::lor => {
                        return Ok(Expr::Or(Box::new(lhs?), Box::new(rhs?)));
                    }
                    _ => todo!("Unimplemented infix: {:?}", op.as_rule()),
                };
                Ok(Expr::Binary(binop, Box::new(lhs?), Box::new(rhs?)))
            })
            .map_prefix(|op, rhs| match op.as_rule() {
                Rule::scatter_assign => {
                    let inner = op.into_inner();
                    let mut items = vec![];
                    for scatter_item in inner {
                        match scatter_item.as_rule() {
                            Rule::scatter_optional => {
                                let mut inner = scatter_item.into_inner();
                                let id = inner.next().unwrap().as_str();
                                let id = prefix_self
                                    .clone()
                                    .names
                                    .borrow_mut()
                                    .find_or_add_name(id);
                                let expr = match inner.next() {
                                    Some(e) => {
                                        Some(prefix_self.clone().parse_expr(e.into_inner())?)
                                    }
                                    None => None,
                                };
                                items.push(ScatterItem {
                                    kind: ScatterKind::Optional,
                                    id,
                                    expr,
                                });
                            }
                            Rule::scatter_target => {
                                let mut inner = scatter_item.into_inner();
                                let id = inner.next().unwrap().as_str();
                                let id = prefix_self
                                    .clone()
                                    .names
                                    .borrow_mut()
                                    .find_or_add_name(id);
                                items.push(ScatterItem {
                                    kind: ScatterKind::Required,
                                    id,
                                    expr: None,
                                });
                            }
                            Rule::scatter_rest => {
                                let mut inner = scatter_item.into_inner();
                                let id = inner.next().unwrap().as_str();
                                let id = prefix_self
                                    .clone()
                                    .names
                                    .borrow_mut()
                                    .find_or_add_name(id);
                                items.push(ScatterItem {
                                    kind: ScatterKind::Rest,
                                    id,
                                    expr: None,
                                });
                            }
                            _ => {
                                panic!("Unimplemented scatter_item: {:?}", scatter_item);
                            }
                        }
                    }
                    Ok(Expr::Scatter(items, Box::new(rhs?)))
                }
                Rule::not => Ok(Expr::Unary(UnaryOp::Not, Box::new(rhs?))),
                Rule::neg => Ok(Expr::Unary(UnaryOp::Neg, Box::new(rhs?))),
                _ => todo!("Unimplemented prefix: {:?}", op.as_rule()),
            })
            .map_postfix(|lhs, op| match op.as_rule() {
                Rule::verb_call => {
                    let mut parts = op.into_inner();
                    let ident = parts.next().unwrap().as_str();
                    let args_expr = parts.next().unwrap();
                    let args = postfix_self.clone().parse_arglist(args_expr.into_inner())?;
                    Ok(Expr::Verb {
                        location: Box::new(lhs?),
                        verb: Box::new(Expr::Value(v_str(ident))),
                        args,
                    })
                }
                Rule::verb_expr_call => {
                    let mut parts = op.into_inner();
                    let expr = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    let args_expr = parts.next().unwrap();
                    let args = postfix_self.clone().parse_arglist(args_expr.into_inner())?;
                    Ok(Expr::Verb {
                        location: Box::new(lhs?),
                        verb: Box::new(expr),
                        args,
                    })
                }
                Rule::prop => {
                    let mut parts = op.into_inner();
                    let ident = parts.next().unwrap().as_str();
                    Ok(Expr::Prop {
                        location: Box::new(lhs?),
                        property: Box::new(Expr::Value(v_str(ident))),
                    })
                }
                Rule::prop_expr => {
                    let mut parts = op.into_inner();
                    let expr = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    Ok(Expr::Prop {
                        location: Box::new(lhs?),
                        property: Box::new(expr),
                    })
                }
                Rule::assign => {
                    let mut parts = op.into_inner();
                    let right = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    Ok(Expr::Assign {
                        left: Box::new(lhs?),
                        right: Box::new(right),
                    })
                }
                Rule::index_single => {
                    let mut parts = op.into_inner();
                    let index = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    Ok(Expr::Index(Box::new(lhs?), Box::new(index)))
                }
                Rule::index_range => {
                    let mut parts = op.into_inner();
                    let start = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    let end = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    Ok(Expr::Range {
                        base: Box::new(lhs?),
                        from: Box::new(start),
                        to: Box::new(end),
                    })
                }
                Rule::cond_expr => {
                    let mut parts = op.into_inner();
                    let true_expr = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    let false_expr = postfix_self
                        .clone()
                        .parse_expr(parts.next().unwrap().into_inner())?;
                    Ok(Expr::Cond {
                        condition: Box::new(lhs?),
                        consequence: Box::new(true_expr),
                        alternative: Box::new(false_expr),
                    })
                }
                _ => todo!("Unimplemented postfix: {:?}", op.as_rule()),
            })
            .parse(pairs);
        result
    }

    fn parse_statement(
        self: Rc<Self>,
        pair: pest::iterators::Pair<Rule>,
    ) -> Result<Option<Stmt>, CompileError> {
        let line = pair.line_col().0;
        match pair.as_rule() {
            Rule::expr_statement => {
                let mut inner = pair.into_inner();
                if let Some(rule) = inner.next() {
                    let expr = self.parse_expr(rule.into_inner())?;
                    return Ok(Some(Stmt::new(StmtNode::Expr(expr), line)));
                }
                Ok(None)
            }
            Rule::while_statement => {
                let mut parts = pair.into_inner();
                let condition = self
                    .clone()
                    .parse_expr(parts.next().unwrap().into_inner())?;
                let body = self.parse_statements(parts.next().unwrap().into_inner())?;
                Ok(Some(Stmt::new(
                    StmtNode::While {
                        id: None,
                        condition,
                        body,
                    },
                    line,
                )))
            }
            Rule::labelled_while_statement => {
                let mut parts = pair.into_inner();
                let id = self
                    .names
                    .borrow_mut()
                    .find_or_add_name(parts.next().unwrap().as_str());
                let condition = self
                    .clone()
                    .parse_expr(parts.next().unwrap().into_inner())?;
                let body = self.parse_statements(parts.next().unwrap().into_inner())?;
                Ok(Some(Stmt::new(
                    StmtNode::While {
                        id: Some(id),
                        condition,
                        body,
                    },
                    line,
                )))
            }
            Rule::if_statement => {
                let mut parts = pair.into_inner();
                let mut arms = vec![];
                let mut otherwise = vec![];
                let condition = self
                    .clone()
                    .parse_expr(parts.next().unwrap().into_inner())?;
                let body = self
                    .clone()
                    .parse_statements(parts.next().unwrap().into_inner())?;
                arms.push(CondArm {
                    condition,
                    statements: body,
                });
                for remainder in parts {
                    match remainder.as_rule() {
                        Rule::elseif_clause => {
                            let mut parts = remainder.into_inner();
                            let condition = self
                                .clone()
                                .parse_expr(parts.next().unwrap().into_inner())?;
                            let body = self
                                .clone()
                                .parse_statements(parts.next().unwrap().into_inner())?;
                            arms.push(CondArm {
                                condition,
                                statements: body,
                            });
                        }
                        Rule::else_clause => {
                            let mut parts = remainder.into_inner();
                            otherwise = self
                                .clone()
                                .parse_statements(parts.next().unwrap().into_inner())?;
                        }
                        _ => panic!("Unimplemented if clause: {:?}", remainder),
                    }
                }
                Ok(Some(Stmt::new(StmtNode::Cond { arms, otherwise }, line)))
            }
            Rule::break_statement => {
                let mut parts = pair.into_inner();
                let label = match parts.next() {
                    None => None,
                    Some(s) => {
                        let label = s.as_str();
                        let Some(label) = self.names.borrow().find_name(label) else {
                            return Err(CompileError::UnknownLoopLabel(label.to_string()));
                        };
                        Some(label)
                    }
                };
                Ok(Some(Stmt::new(StmtNode::Break { exit: label }, line)))
            }
            Rule::continue_statement => {
                let mut parts = pair.into_inner();
                let label = match parts.next() {
                    None => None,
                    Some(s) => {
                        let label = s.as_str();
                        let Some(label) = self.names.borrow().find_name(label) else {
                            return Err(CompileError::UnknownLoopLabel(label.to_string()));
                        };
                        Some(label)
                    }
                };
                Ok(Some(Stmt::new(StmtNode::Continue { exit: label }, line)))
            }
            Rule::return_statement => {
                let mut parts = pair.into_inner();
                let expr = match parts.next() {
                    Some(expr) => Some(self.parse_expr(expr.into_inner())?),
                    None => None,
                };
                Ok(Some(Stmt::new(StmtNode::Return(expr), line)))
            }
            Rule::for_statement => {
                let mut parts = pair.into_inner();
                let id = self
                    .names
                    .borrow_mut()
                    .find_or_add_name(parts.next().unwrap().as_str());
                let clause = parts.next().unwrap();
                let body = self
                    .clone()
                    .parse_statements(parts.next().unwrap().into_inner())?;
                match clause.as_rule() {
                    Rule::for_range_clause => {
                        let mut clause_inner = clause.into_inner();
                        let from_rule = clause_inner.next().unwrap();
                        let to_rule = clause_inner.next().unwrap();
                        let from = self.clone().parse_expr(from_rule.into_inner())?;
                        let to = self.parse_expr(to_rule.into_inner())?;
                        Ok(Some(Stmt::new(
                            StmtNode::ForRange { id, from, to, body },
                            line,
                        )))
                    }
                    Rule::for_in_clause => {
                        let mut clause_inner = clause.into_inner();
                        let in_rule = clause_inner.next().unwrap();
                        let expr = self.parse_expr(in_rule.into_inner())?;
                        Ok(Some(Stmt::new(StmtNode::ForList { id, expr, body }, line)))
                    }
                    _ => panic!("Unimplemented for clause: {:?}", clause),
                }
            }
            Rule::try_finally_statement => {
                let mut parts = pair.into_inner();
                let body = self
                    .clone()
                    .parse_statements(parts.next().unwrap().into_inner())?;
                let handler = self.parse_statements(parts.next().unwrap().into_inner())?;
                Ok(Some(Stmt::new(StmtNode::TryFinally { body, handler }, line)))
            }
            Rule::try_except_statement => {
                let mut parts = pair.into_inner();
                let body = self
                    .clone()
                    .parse_statements(parts.next().unwrap().into_inner())?;
                let mut excepts = vec![];
                for except in parts {
                    match except.as_rule() {
                        Rule::except => {
                            let mut except_clause_parts = except.into_inner();
                            let clause = except_clause_parts.next().unwrap();
                            let (id, codes) = match clause.as_rule() {
                                Rule::labelled_except => {
                                    let mut my_parts = clause.into_inner();
                                    let exception = my_parts.next().map(|id| {
                                        self.names.borrow_mut().find_or_add_name(id.as_str())
                                    });
                                    let codes = self.clone().parse_except_codes(
                                        my_parts.next().unwrap().into_inner().next().unwrap(),
                                    )?;
                                    (exception, codes)
                                }
                                Rule::unlabelled_except => {
                                    let mut my_parts = clause.into_inner();
                                    let codes = self.clone().parse_except_codes(
                                        my_parts.next().unwrap().into_inner().next().unwrap(),
                                    )?;
                                    (None, codes)
                                }
                                _ => panic!("Unimplemented except clause: {:?}", clause),
                            };
                            let statements = self
                                .clone()
                                .parse_statements(except_clause_parts.next().unwrap().into_inner())?;

                            excepts.push(ExceptArm {
                                id,
                                codes,
                                statements,
                            });
                        }
                        _ => panic!("Unimplemented except clause: {:?}", except),
                    }
                }
                Ok(Some(Stmt::new(StmtNode::TryExcept { body, excepts }, line)))
            }
            Rule::fork_statement => {
                let mut parts = pair.into_inner();
                let time = self
                    .clone()
                    .parse_expr(parts.next().unwrap().into_inner())?;
                let body = self.parse_statements(parts.next().unwrap().into_inner())?;
                Ok(Some(Stmt::new(
                    StmtNode::Fork {
                        id: None,
                        time,
                        body,
                    },
                    line,
                )))
            }
            Rule::labelled_fork_statement => {
                let mut parts = pair.into_inner();
                let id = self
                    .names
                    .borrow_mut()
                    .find_or_add_name(parts.next().unwrap().as_str());
                let time = self
                    .clone()
                    .parse_expr(parts.next().unwrap().into_inner())?;
                let body = self.parse_statements(parts.next().unwrap().into_inner())?;
                Ok(Some(Stmt::new(
                    StmtNode::Fork {
                        id: Some(id),
                        time,
                        body,
                    },
                    line,
                )))
            }
            _ => panic!("Unimplemented statement: {:?}", pair.as_rule()),
        }
    }

    fn parse_statements(
        self: Rc<Self>,
        pairs: pest::iterators::Pairs<Rule>,
    ) -> Result<Vec<Stmt>, CompileError> {
        let mut statements = vec![];
        for pair in pairs {
            if let Some(stmt) = self.clone().parse_statement(pair)? {
                statements.push(stmt);
            }
        }
        Ok(statements)
    }
}

/// Strip the surrounding quotes and resolve the backslash escapes in a string
/// literal.
fn unquote_str(s: &str) -> Result<String, CompileError> {
    let mut output = String::new();
    let mut chars = s[1..s.len() - 1].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(c @ ('\\' | '"')) => output.push(c),
                Some(c) => output.push(c),
                None => {
                    return Err(CompileError::ParseError(
                        "unterminated escape in string literal".to_string(),
                    ))
                }
            },
            c => output.push(c),
        }
    }
    Ok(output)
}

pub fn parse_program(program_text: &str) -> Result<Parse, CompileError> {
    let pairs = MooParser::parse(moo::Rule::program, program_text)
        .map_err(|e| CompileError::ParseError(e.to_string()))?;

    let transformer = TreeTransformer::new();
    let mut program = Vec::new();
    for pair in pairs {
        match pair.as_rule() {
            Rule::program => {
                let inner = pair.into_inner();
                for pair in inner {
                    match pair.as_rule() {
                        Rule::statements => {
                            let stmts =
                                transformer.clone().parse_statements(pair.into_inner())?;
                            program.extend(stmts);
                        }
                        Rule::EOI => break,
                        _ => panic!("Unexpected rule: {:?}", pair.as_rule()),
                    }
                }
            }
            _ => {
                panic!("Unexpected rule: {:?}", pair.as_rule());
            }
        }
    }
    let names = transformer.names.borrow().clone();
    Ok(Parse {
        stmts: program,
        names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, StmtNode};
    use etamoo_var::{v_int, v_str};

    fn stmts(program: &str) -> Vec<Stmt> {
        parse_program(program).unwrap().stmts
    }

    #[test]
    fn test_parse_simple_expr() {
        let prg = stmts("1 + 2;");
        assert_eq!(prg.len(), 1);
        let StmtNode::Expr(Expr::Binary(BinaryOp::Add, left, right)) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert_eq!(**left, Expr::Value(v_int(1)));
        assert_eq!(**right, Expr::Value(v_int(2)));
    }

    #[test]
    fn test_parse_precedence() {
        let prg = stmts("1 + 2 * 3;");
        let StmtNode::Expr(Expr::Binary(BinaryOp::Add, _, right)) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert!(matches!(**right, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_parse_if_elseif_else() {
        let prg = stmts("if (1) return 1; elseif (2) return 2; else return 3; endif");
        let StmtNode::Cond { arms, otherwise } = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert_eq!(arms.len(), 2);
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn test_parse_for_loops() {
        let prg = stmts("for x in ({1, 2}) endfor for y in [1..5] endfor");
        assert!(matches!(prg[0].node, StmtNode::ForList { .. }));
        assert!(matches!(prg[1].node, StmtNode::ForRange { .. }));
    }

    #[test]
    fn test_parse_while_labelled() {
        let prg = stmts("while bozo (1) break bozo; endwhile");
        let StmtNode::While { id, body, .. } = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert!(id.is_some());
        assert!(matches!(body[0].node, StmtNode::Break { exit: Some(_) }));
    }

    #[test]
    fn test_parse_unknown_loop_label() {
        let result = parse_program("while (1) break bozo; endwhile");
        assert!(matches!(result, Err(CompileError::UnknownLoopLabel(_))));
    }

    #[test]
    fn test_parse_fork() {
        let prg = stmts("fork (5) player:tell(\"late\"); endfork");
        let StmtNode::Fork { id, time, .. } = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert!(id.is_none());
        assert_eq!(*time, Expr::Value(v_int(5)));
    }

    #[test]
    fn test_parse_try_except() {
        let prg = stmts("try x = 1; except e (E_RANGE, E_TYPE) return e; except (ANY) endtry");
        let StmtNode::TryExcept { excepts, .. } = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert_eq!(excepts.len(), 2);
        assert!(excepts[0].id.is_some());
        assert!(matches!(excepts[0].codes, CatchCodes::Codes(ref c) if c.len() == 2));
        assert!(matches!(excepts[1].codes, CatchCodes::Any));
    }

    #[test]
    fn test_parse_try_finally() {
        let prg = stmts("try x = 1; finally x = 2; endtry");
        assert!(matches!(prg[0].node, StmtNode::TryFinally { .. }));
    }

    #[test]
    fn test_parse_catch_expr() {
        let prg = stmts("x = `1/0 ! E_DIV => \"nope\"';");
        let StmtNode::Expr(Expr::Assign { right, .. }) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        let Expr::Catch { codes, except, .. } = right.as_ref() else {
            panic!("Unexpected parse: {:?}", right);
        };
        assert!(matches!(codes, CatchCodes::Codes(ref c) if c.len() == 1));
        assert_eq!(
            **except.as_ref().unwrap(),
            Expr::Value(v_str("nope"))
        );
    }

    #[test]
    fn test_parse_scatter() {
        let prg = stmts("{a, ?b = 5, @rest} = args;");
        let StmtNode::Expr(Expr::Scatter(items, _)) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].kind, ScatterKind::Required);
        assert_eq!(items[1].kind, ScatterKind::Optional);
        assert_eq!(items[2].kind, ScatterKind::Rest);
    }

    #[test]
    fn test_parse_verb_and_prop() {
        let prg = stmts("player:tell(player.name, $maxint);");
        let StmtNode::Expr(Expr::Verb { args, .. }) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_parse_range_and_length() {
        let prg = stmts("x = y[2..$];");
        let StmtNode::Expr(Expr::Assign { right, .. }) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        let Expr::Range { to, .. } = right.as_ref() else {
            panic!("Unexpected parse: {:?}", right);
        };
        assert_eq!(**to, Expr::Length);
    }

    #[test]
    fn test_parse_splice_in_list() {
        let prg = stmts("x = {1, @y, 3};");
        let StmtNode::Expr(Expr::Assign { right, .. }) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        let Expr::List(args) = right.as_ref() else {
            panic!("Unexpected parse: {:?}", right);
        };
        assert!(matches!(args[1], Arg::Splice(_)));
    }

    #[test]
    fn test_parse_error_no_partial_ast() {
        assert!(matches!(
            parse_program("if (1) return 1;"),
            Err(CompileError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_cond_expr() {
        let prg = stmts("x = 1 ? 2 | 3;");
        let StmtNode::Expr(Expr::Assign { right, .. }) = &prg[0].node else {
            panic!("Unexpected parse: {:?}", prg);
        };
        assert!(matches!(right.as_ref(), Expr::Cond { .. }));
    }
}
