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

use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction};
use etamoo_compiler::offset_for_builtin;
use etamoo_var::ErrorCode::{E_FLOAT, E_INVARG, E_TYPE};
use etamoo_var::{v_float, v_int, v_string, Var, Variant};
use rand::Rng;

/// Float results must be finite: NaN is E_INVARG, infinity E_FLOAT.
fn checked(f: f64) -> Result<BfRet, BfErr> {
    if f.is_nan() {
        return Err(BfErr::Code(E_INVARG));
    }
    if f.is_infinite() {
        return Err(BfErr::Code(E_FLOAT));
    }
    Ok(Ret(v_float(f)))
}

fn float_arg(v: &Var) -> Result<f64, BfErr> {
    match v.variant() {
        Variant::Float(f) => Ok(*f),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

fn bf_abs(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    match bf_args.args[0].variant() {
        Variant::Int(i) => Ok(Ret(v_int(i.wrapping_abs()))),
        Variant::Float(f) => Ok(Ret(v_float(f.abs()))),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

/// min/max take any number of arguments, all of the same numeric type.
fn fold_numeric(
    args: &[Var],
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<BfRet, BfErr> {
    let mut result = args[0].clone();
    for arg in &args[1..] {
        result = match (result.variant(), arg.variant()) {
            (Variant::Int(a), Variant::Int(b)) => v_int(int_op(*a, *b)),
            (Variant::Float(a), Variant::Float(b)) => v_float(float_op(*a, *b)),
            _ => return Err(BfErr::Code(E_TYPE)),
        };
    }
    Ok(Ret(result))
}

fn bf_min(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    fold_numeric(&bf_args.args, i64::min, f64::min)
}

fn bf_max(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    fold_numeric(&bf_args.args, i64::max, f64::max)
}

/// random([max]) yields uniform in [1..max], max defaulting to the largest
/// integer.
fn bf_random(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let max = match bf_args.args.first() {
        Some(v) => match v.variant() {
            Variant::Int(i) => *i,
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        None => i64::MAX,
    };
    if max < 1 {
        return Err(BfErr::Code(E_INVARG));
    }
    let mut rng = rand::rng();
    Ok(Ret(v_int(rng.random_range(1..=max))))
}

fn bf_floatstr(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let x = float_arg(&bf_args.args[0])?;
    let precision = match bf_args.args[1].variant() {
        Variant::Int(i) if *i >= 0 => (*i as usize).min(19),
        _ => return Err(BfErr::Code(E_INVARG)),
    };
    let scientific = bf_args.args.get(2).map(|v| v.is_true()).unwrap_or(false);
    let s = if scientific {
        format!("{:.*e}", precision, x)
    } else {
        format!("{:.*}", precision, x)
    };
    Ok(Ret(v_string(s)))
}

fn bf_sqrt(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let x = float_arg(&bf_args.args[0])?;
    if x < 0.0 {
        return Err(BfErr::Code(E_INVARG));
    }
    checked(x.sqrt())
}

fn bf_sin(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.sin())
}

fn bf_cos(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.cos())
}

fn bf_tan(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.tan())
}

fn bf_asin(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.asin())
}

fn bf_acos(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.acos())
}

/// atan(y [, x]) is atan2 when given two arguments.
fn bf_atan(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let y = float_arg(&bf_args.args[0])?;
    match bf_args.args.get(1) {
        Some(x) => checked(y.atan2(float_arg(x)?)),
        None => checked(y.atan()),
    }
}

fn bf_sinh(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.sinh())
}

fn bf_cosh(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.cosh())
}

fn bf_tanh(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.tanh())
}

fn bf_exp(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.exp())
}

fn bf_log(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let x = float_arg(&bf_args.args[0])?;
    if x <= 0.0 {
        return Err(BfErr::Code(E_INVARG));
    }
    checked(x.ln())
}

fn bf_log10(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let x = float_arg(&bf_args.args[0])?;
    if x <= 0.0 {
        return Err(BfErr::Code(E_INVARG));
    }
    checked(x.log10())
}

fn bf_ceil(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.ceil())
}

fn bf_floor(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.floor())
}

fn bf_trunc(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked(float_arg(&bf_args.args[0])?.trunc())
}

pub(crate) fn register_bf_num(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("abs")] = bf_abs;
    builtins[offset_for_builtin("min")] = bf_min;
    builtins[offset_for_builtin("max")] = bf_max;
    builtins[offset_for_builtin("random")] = bf_random;
    builtins[offset_for_builtin("floatstr")] = bf_floatstr;
    builtins[offset_for_builtin("sqrt")] = bf_sqrt;
    builtins[offset_for_builtin("sin")] = bf_sin;
    builtins[offset_for_builtin("cos")] = bf_cos;
    builtins[offset_for_builtin("tan")] = bf_tan;
    builtins[offset_for_builtin("asin")] = bf_asin;
    builtins[offset_for_builtin("acos")] = bf_acos;
    builtins[offset_for_builtin("atan")] = bf_atan;
    builtins[offset_for_builtin("sinh")] = bf_sinh;
    builtins[offset_for_builtin("cosh")] = bf_cosh;
    builtins[offset_for_builtin("tanh")] = bf_tanh;
    builtins[offset_for_builtin("exp")] = bf_exp;
    builtins[offset_for_builtin("log")] = bf_log;
    builtins[offset_for_builtin("log10")] = bf_log10;
    builtins[offset_for_builtin("ceil")] = bf_ceil;
    builtins[offset_for_builtin("floor")] = bf_floor;
    builtins[offset_for_builtin("trunc")] = bf_trunc;
}
