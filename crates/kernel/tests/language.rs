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

//! End-to-end language tests: compile a program, run it in a VmHost against
//! an in-memory world, and look at what comes out the other side.

use etamoo_common::model::{ObjAttrs, VerbArgsSpec, VerbFlag, WorldState, WorldStateSource};
use etamoo_common::tasks::NoopClientSession;
use etamoo_db::TxDb;
use etamoo_kernel::tasks::vm_test_utils::{call_eval, call_verb, ExecResult};
use etamoo_var::{
    v_err, v_int, v_list, v_obj, v_str, Obj, Symbol, Var, E_DIV, E_PERM, E_RANGE, E_TYPE,
    E_VERBNF, NOTHING,
};
use pretty_assertions::assert_eq;

const WIZARD: Obj = Obj(1);

fn test_db() -> TxDb {
    TxDb::with_minimal_core()
}

fn eval(db: &TxDb, code: &str) -> ExecResult {
    let mut tx = db.new_world_state().unwrap();
    let result = call_eval(tx.as_mut(), NoopClientSession::new(), WIZARD, code);
    tx.commit().unwrap();
    result
}

fn eval_ok(db: &TxDb, code: &str) -> Var {
    eval(db, code).unwrap_or_else(|e| panic!("eval of {code:?} threw {e:?}"))
}

#[test]
fn test_simple_arithmetic() {
    let db = test_db();
    assert_eq!(eval_ok(&db, "return 1 + 2;"), v_int(3));
    assert_eq!(eval_ok(&db, "return 2 * 3 + 4;"), v_int(10));
    assert_eq!(eval_ok(&db, "return 2 ^ 10;"), v_int(1024));
    assert_eq!(eval_ok(&db, "return -(5 % 3);"), v_int(-2));
}

#[test]
fn test_string_concat() {
    let db = test_db();
    assert_eq!(
        eval_ok(&db, r#"return "Hello, " + "world";"#),
        v_str("Hello, world")
    );
}

#[test]
fn test_list_slice() {
    let db = test_db();
    assert_eq!(
        eval_ok(&db, "return {1, 2, 3, 4}[2..3];"),
        v_list(&[v_int(2), v_int(3)])
    );
}

#[test]
fn test_dollar_length_in_index() {
    let db = test_db();
    assert_eq!(
        eval_ok(&db, "x = {1, 2, 3, 4}; return x[2..$];"),
        v_list(&[v_int(2), v_int(3), v_int(4)])
    );
    assert_eq!(eval_ok(&db, "return \"hello\"[$];"), v_str("o"));
}

#[test]
fn test_division_by_zero_raises() {
    let db = test_db();
    // The eval frame has the debug bit on, so this unwinds.
    let err = eval(&db, "return 1/0;").unwrap_err();
    assert_eq!(err.error, E_DIV);
}

#[test]
fn test_catch_expression() {
    let db = test_db();
    assert_eq!(
        eval_ok(&db, r#"return `1/0 ! E_DIV => "nope"';"#),
        v_str("nope")
    );
    // Uncaught code propagates.
    let err = eval(&db, r#"return `1/0 ! E_RANGE => "nope"';"#).unwrap_err();
    assert_eq!(err.error, E_DIV);
    // ANY catches everything; without => the result is the code itself.
    assert_eq!(eval_ok(&db, "return `1/0 ! ANY';"), v_err(E_DIV));
}

#[test]
fn test_try_except_statement() {
    let db = test_db();
    assert_eq!(
        eval_ok(
            &db,
            r#"try return {1}[5]; except e (E_RANGE) return "caught"; endtry"#
        ),
        v_str("caught")
    );
    // The bound exception value is {code, msg, value, traceback}.
    assert_eq!(
        eval_ok(
            &db,
            "try x = {1}[5]; except e (ANY) return e[1]; endtry"
        ),
        v_err(E_RANGE)
    );
}

#[test]
fn test_try_finally_runs_on_both_paths() {
    let db = test_db();
    assert_eq!(
        eval_ok(
            &db,
            r#"
            x = 0;
            try
              x = 1;
            finally
              x = x + 10;
            endtry
            return x;
            "#
        ),
        v_int(11)
    );
    // Exception path: finally runs, then the exception continues unwinding
    // into the except arm of the enclosing try.
    assert_eq!(
        eval_ok(
            &db,
            r#"
            x = 0;
            try
              try
                x = {1}[5];
              finally
                x = 10;
              endtry
            except (ANY)
              return x + 1;
            endtry
            "#
        ),
        v_int(11)
    );
}

#[test]
fn test_while_and_for_loops() {
    let db = test_db();
    assert_eq!(
        eval_ok(
            &db,
            "total = 0; for x in ({1, 2, 3}) total = total + x; endfor return total;"
        ),
        v_int(6)
    );
    assert_eq!(
        eval_ok(
            &db,
            "total = 0; for x in [1..4] total = total + x; endfor return total;"
        ),
        v_int(10)
    );
    assert_eq!(
        eval_ok(
            &db,
            "i = 0; while (i < 5) i = i + 1; endwhile return i;"
        ),
        v_int(5)
    );
}

#[test]
fn test_break_continue_with_labels() {
    let db = test_db();
    assert_eq!(
        eval_ok(
            &db,
            r#"
            found = {};
            for x in [1..10]
              if (x % 2 == 0)
                continue;
              endif
              if (x > 6)
                break;
              endif
              found = {@found, x};
            endfor
            return found;
            "#
        ),
        v_list(&[v_int(1), v_int(3), v_int(5)])
    );
    assert_eq!(
        eval_ok(
            &db,
            r#"
            count = 0;
            while outer (1)
              for x in [1..10]
                count = count + 1;
                if (count > 3)
                  break outer;
                endif
              endfor
            endwhile
            return count;
            "#
        ),
        v_int(4)
    );
}

#[test]
fn test_scatter_assignment() {
    let db = test_db();
    assert_eq!(
        eval_ok(
            &db,
            r#"{a, ?b = 5, @rest} = {1}; return {a, b, rest};"#
        ),
        v_list(&[v_int(1), v_int(5), v_list(&[])])
    );
    assert_eq!(
        eval_ok(
            &db,
            r#"{a, ?b = 5, @rest} = {1, 2, 3, 4}; return {a, b, rest};"#
        ),
        v_list(&[v_int(1), v_int(2), v_list(&[v_int(3), v_int(4)])])
    );
}

#[test]
fn test_conditional_expression_laziness() {
    let db = test_db();
    assert_eq!(eval_ok(&db, "return 1 ? 2 | 1/0;"), v_int(2));
    assert_eq!(eval_ok(&db, "return 0 && 1/0;"), v_int(0));
    assert_eq!(eval_ok(&db, "return 1 || 1/0;"), v_int(1));
}

#[test]
fn test_builtin_dispatch_and_arg_checking() {
    let db = test_db();
    assert_eq!(eval_ok(&db, "return length({1, 2, 3});"), v_int(3));
    assert_eq!(eval_ok(&db, "return typeof(#1);"), v_int(1));
    assert_eq!(eval_ok(&db, "return tostr(1, \" \", #2);"), v_str("1 #2"));
    // Argument type mismatch is E_TYPE, count mismatch E_ARGS.
    let err = eval(&db, "return strcmp(1, 2);").unwrap_err();
    assert_eq!(err.error, E_TYPE);
    let err = eval(&db, "return strcmp(\"a\");").unwrap_err();
    assert_eq!(err.error, etamoo_var::E_ARGS);
}

#[test]
fn test_list_builtin_properties() {
    let db = test_db();
    // The listset/listdelete/listinsert identities.
    assert_eq!(
        eval_ok(&db, "return listset({1, 2, 3}, 9, 2);"),
        v_list(&[v_int(1), v_int(9), v_int(3)])
    );
    assert_eq!(
        eval_ok(&db, "return listdelete(listinsert({1, 2}, 9, 1), 1);"),
        v_list(&[v_int(1), v_int(2)])
    );
    assert_eq!(
        eval_ok(&db, "return listappend({1, 2}, 3);"),
        v_list(&[v_int(1), v_int(2), v_int(3)])
    );
    let err = eval(&db, "return listset({1}, 9, 2);").unwrap_err();
    assert_eq!(err.error, E_RANGE);
    // is_member is case-sensitive, `in` is not.
    assert_eq!(eval_ok(&db, "return is_member(\"A\", {\"a\"});"), v_int(0));
    assert_eq!(eval_ok(&db, "return \"A\" in {\"a\"};"), v_int(1));
}

#[test]
fn test_toliteral_value_hash_round_trip() {
    let db = test_db();
    assert_eq!(
        eval_ok(&db, r#"return toliteral({1, "two", #3, E_PERM});"#),
        v_str(r#"{1, "two", #3, E_PERM}"#)
    );
    assert_eq!(
        eval_ok(&db, "return value_hash({1, 2}) == string_hash(toliteral({1, 2}));"),
        v_int(1)
    );
}

#[test]
fn test_property_access_via_language() {
    let db = test_db();
    assert_eq!(eval_ok(&db, "return #0.name;"), v_str("System Object"));
    assert_eq!(
        eval_ok(&db, "#0.name = \"Root\"; return #0.name;"),
        v_str("Root")
    );
    let err = eval(&db, "return #0.nonesuch;").unwrap_err();
    assert_eq!(err.error, etamoo_var::E_PROPNF);
    let err = eval(&db, "return (\"foo\").bar;").unwrap_err();
    assert_eq!(err.error, etamoo_var::E_INVIND);
}

#[test]
fn test_sysprop_shortcut() {
    let db = test_db();
    {
        let mut tx = db.new_world_state().unwrap();
        tx.define_property(
            WIZARD,
            etamoo_var::SYSTEM_OBJECT,
            etamoo_var::SYSTEM_OBJECT,
            Symbol::mk("maxint"),
            WIZARD,
            etamoo_common::model::PropFlag::r(),
            Some(v_int(9007)),
        )
        .unwrap();
        tx.commit().unwrap();
    }
    assert_eq!(eval_ok(&db, "return $maxint;"), v_int(9007));
}

/// Install a verb on #0 for the verb-call tests.
fn add_system_verb(db: &TxDb, names: &str, code: &str) {
    let mut tx = db.new_world_state().unwrap();
    let program = etamoo_compiler::compile(code).unwrap();
    tx.add_verb(
        WIZARD,
        etamoo_var::SYSTEM_OBJECT,
        names.split_whitespace().map(Symbol::mk).collect(),
        WIZARD,
        VerbFlag::rxd(),
        VerbArgsSpec::this_none_this(),
        program,
    )
    .unwrap();
    tx.commit().unwrap();
}

#[test]
fn test_verb_call_and_args() {
    let db = test_db();
    add_system_verb(&db, "double", "return args[1] * 2;");
    assert_eq!(eval_ok(&db, "return #0:double(21);"), v_int(42));
    let err = eval(&db, "return #0:nonesuch();").unwrap_err();
    assert_eq!(err.error, E_VERBNF);
}

#[test]
fn test_verb_call_inheritance_and_pass() {
    let db = test_db();
    add_system_verb(&db, "describe", r#"return "generic";"#);
    let child = {
        let mut tx = db.new_world_state().unwrap();
        let child = tx
            .create_object(WIZARD, etamoo_var::SYSTEM_OBJECT, WIZARD, ObjAttrs::default())
            .unwrap();
        let program =
            etamoo_compiler::compile(r#"return "special " + pass();"#).unwrap();
        tx.add_verb(
            WIZARD,
            child,
            vec![Symbol::mk("describe")],
            WIZARD,
            VerbFlag::rxd(),
            VerbArgsSpec::this_none_this(),
            program,
        )
        .unwrap();
        tx.commit().unwrap();
        child
    };
    assert_eq!(
        eval_ok(&db, &format!("return {child}:describe();")),
        v_str("special generic")
    );
}

#[test]
fn test_verb_call_via_test_harness() {
    let db = test_db();
    add_system_verb(&db, "greet", r#"return "hi " + tostr(args[1]);"#);
    let mut tx = db.new_world_state().unwrap();
    let result = call_verb(
        tx.as_mut(),
        NoopClientSession::new(),
        etamoo_var::SYSTEM_OBJECT,
        WIZARD,
        "greet",
        vec![v_int(7)],
    )
    .unwrap();
    assert_eq!(result, v_str("hi 7"));
}

#[test]
fn test_debug_flag_off_substitutes_error() {
    let db = test_db();
    // A verb without the `d` bit swallows errors into values.
    {
        let mut tx = db.new_world_state().unwrap();
        let program = etamoo_compiler::compile("return 1/0;").unwrap();
        tx.add_verb(
            WIZARD,
            etamoo_var::SYSTEM_OBJECT,
            vec![Symbol::mk("quiet")],
            WIZARD,
            VerbFlag::rx(),
            VerbArgsSpec::this_none_this(),
            program,
        )
        .unwrap();
        tx.commit().unwrap();
    }
    assert_eq!(eval_ok(&db, "return #0:quiet();"), v_err(E_DIV));
}

#[test]
fn test_chparent_cycle_is_recmove_and_unchanged() {
    let db = test_db();
    let (a, b) = {
        let mut tx = db.new_world_state().unwrap();
        let a = tx
            .create_object(WIZARD, NOTHING, WIZARD, ObjAttrs::default())
            .unwrap();
        let b = tx.create_object(WIZARD, a, WIZARD, ObjAttrs::default()).unwrap();
        tx.commit().unwrap();
        (a, b)
    };
    let err = eval(&db, &format!("return chparent({a}, {b});")).unwrap_err();
    assert_eq!(err.error, etamoo_var::E_RECMOVE);
    // And the failed attempt changed nothing.
    assert_eq!(eval_ok(&db, &format!("return parent({a});")), v_obj(NOTHING));
    assert_eq!(
        eval_ok(&db, &format!("return children({a});")),
        v_list(&[v_obj(b)])
    );
}

#[test]
fn test_create_recycle_lifecycle() {
    let db = test_db();
    let result = eval_ok(
        &db,
        "x = create(#-1); y = {valid(x), x == max_object()}; recycle(x); return {@y, valid(x)};",
    );
    assert_eq!(result, v_list(&[v_int(1), v_int(1), v_int(0)]));
}

#[test]
fn test_move_and_contents() {
    let db = test_db();
    // A wizard move bypasses :accept.
    let result = eval_ok(
        &db,
        r#"
        box = create(#-1);
        thing = create(#-1);
        move(thing, box);
        return {thing.location, box.contents};
        "#,
    );
    let etamoo_var::Variant::List(l) = result.variant() else {
        panic!("expected list result");
    };
    let location = l.index(0).unwrap();
    let contents = l.index(1).unwrap();
    assert_eq!(contents, v_list(&[location.as_obj().map(v_obj).unwrap()]));
}

#[test]
fn test_move_fires_protocol_verbs() {
    let db = test_db();
    // A non-wizard programmer moving into a box consults box:accept and
    // triggers box:enterfunc.
    let setup = r#"
        prog = create(#-1);
        prog.programmer = 1;
        box = create(#-1);
        box.f = 1;
        thing = create(#-1, prog);
        add_property(box, "log", {}, {player, "rw"});
        add_verb(box, {player, "xd", "accept"}, {"this", "none", "this"});
        set_verb_code(box, "accept", {"this.log = {@this.log, \"accept\"};", "return 1;"});
        add_verb(box, {player, "xd", "enterfunc"}, {"this", "none", "this"});
        set_verb_code(box, "enterfunc", {"this.log = {@this.log, \"enter\"};"});
        set_task_perms(prog);
        move(thing, box);
        return {box.log, thing.location == box};
    "#;
    assert_eq!(
        eval_ok(&db, setup),
        v_list(&[
            v_list(&[v_str("accept"), v_str("enter")]),
            v_int(1)
        ])
    );
}

#[test]
fn test_permission_denied_for_peon() {
    let db = test_db();
    // A non-programmer, non-wizard can't write a wizard's property.
    let err = eval(
        &db,
        r#"
        peon = create(#-1);
        add_property(#0, "treasure", 42, {player, ""});
        set_task_perms(peon);
        #0.treasure = 0;
        "#,
    )
    .unwrap_err();
    assert_eq!(err.error, E_PERM);
}

#[test]
fn test_eval_builtin() {
    let db = test_db();
    assert_eq!(
        eval_ok(&db, r#"return eval("return 6 * 7;");"#),
        v_list(&[v_int(1), v_int(42)])
    );
    // Compile errors come back as {0, {error strings}}.
    let result = eval_ok(&db, r#"return eval("return $$$;")[1];"#);
    assert_eq!(result, v_int(0));
}

#[test]
fn test_exception_tracebacks_have_frames() {
    let db = test_db();
    add_system_verb(&db, "blow_up", "return 1/0;");
    let err = eval(&db, "return #0:blow_up();").unwrap_err();
    assert_eq!(err.error, E_DIV);
    // One line per frame plus the end marker.
    assert!(err.backtrace.len() >= 3);
    assert_eq!(
        err.backtrace.last().unwrap(),
        &v_str("(End of traceback)")
    );
}

#[test]
fn test_ticks_left_decreases() {
    let db = test_db();
    let result = eval_ok(&db, "a = ticks_left(); b = ticks_left(); return a > b;");
    assert_eq!(result, v_int(1));
}

#[test]
fn test_match_and_substitute() {
    let db = test_db();
    assert_eq!(
        eval_ok(
            &db,
            r#"m = match("the quick fox", "q([a-z]+)k"); return {m[1], m[2]};"#
        ),
        v_list(&[v_int(5), v_int(9)])
    );
    assert_eq!(
        eval_ok(
            &db,
            r#"return substitute("got %1!", match("the quick fox", "q([a-z]+)k"));"#
        ),
        v_str("got uic!")
    );
    assert_eq!(
        eval_ok(&db, r#"return match("abc", "xyz");"#),
        v_list(&[])
    );
}

#[test]
fn test_decode_encode_binary() {
    let db = test_db();
    assert_eq!(
        eval_ok(&db, r#"return encode_binary("a", 0, "b");"#),
        v_str("a~00b")
    );
    assert_eq!(
        eval_ok(&db, r#"return decode_binary("a~00b");"#),
        v_list(&[v_str("a"), v_int(0), v_str("b")])
    );
    let err = eval(&db, r#"return decode_binary("oops~");"#).unwrap_err();
    assert_eq!(err.error, etamoo_var::E_INVARG);
}
