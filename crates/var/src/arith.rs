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

//! Arithmetic on Vars. Operands must be of the same numeric kind; the only
//! non-numeric case is `+` on two strings. Float results must be finite:
//! infinities raise E_FLOAT and NaNs raise E_INVARG.

use crate::var::{v_float, v_int, Var};
use crate::variant::Variant;
use crate::Error;
use crate::ErrorCode::{E_DIV, E_FLOAT, E_INVARG, E_TYPE};

fn checked_float(f: f64) -> Result<Var, Error> {
    if f.is_nan() {
        return Err(E_INVARG.msg("floating-point operation yielded NaN"));
    }
    if f.is_infinite() {
        return Err(E_FLOAT.msg("floating-point overflow"));
    }
    Ok(v_float(f))
}

fn type_mismatch(op: &str, left: &Var, right: &Var) -> Error {
    E_TYPE.with_msg(|| {
        format!(
            "invalid operands to `{}': {} and {}",
            op,
            left.type_code().to_literal(),
            right.type_code().to_literal()
        )
    })
}

impl Var {
    pub fn add(&self, other: &Var) -> Result<Var, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(l), Variant::Int(r)) => Ok(v_int(l.wrapping_add(*r))),
            (Variant::Float(l), Variant::Float(r)) => checked_float(l + r),
            (Variant::Str(l), Variant::Str(r)) => Ok(l.append(r)),
            _ => Err(type_mismatch("+", self, other)),
        }
    }

    pub fn sub(&self, other: &Var) -> Result<Var, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(l), Variant::Int(r)) => Ok(v_int(l.wrapping_sub(*r))),
            (Variant::Float(l), Variant::Float(r)) => checked_float(l - r),
            _ => Err(type_mismatch("-", self, other)),
        }
    }

    pub fn mul(&self, other: &Var) -> Result<Var, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(l), Variant::Int(r)) => Ok(v_int(l.wrapping_mul(*r))),
            (Variant::Float(l), Variant::Float(r)) => checked_float(l * r),
            _ => Err(type_mismatch("*", self, other)),
        }
    }

    pub fn div(&self, other: &Var) -> Result<Var, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(_), Variant::Int(0)) => Err(E_DIV.msg("division by zero")),
            (Variant::Int(l), Variant::Int(r)) => Ok(v_int(l.wrapping_div(*r))),
            (Variant::Float(l), Variant::Float(r)) => {
                if *r == 0.0 {
                    return Err(E_DIV.msg("division by zero"));
                }
                checked_float(l / r)
            }
            _ => Err(type_mismatch("/", self, other)),
        }
    }

    pub fn modulus(&self, other: &Var) -> Result<Var, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(_), Variant::Int(0)) => Err(E_DIV.msg("modulo by zero")),
            (Variant::Int(l), Variant::Int(r)) => Ok(v_int(l.wrapping_rem(*r))),
            (Variant::Float(l), Variant::Float(r)) => {
                if *r == 0.0 {
                    return Err(E_DIV.msg("modulo by zero"));
                }
                checked_float(l % r)
            }
            _ => Err(type_mismatch("%", self, other)),
        }
    }

    pub fn pow(&self, other: &Var) -> Result<Var, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(l), Variant::Int(r)) => {
                if *r < 0 {
                    // Integer exponentiation by a negative power truncates to
                    // 0 except for the bases whose reciprocal is integral.
                    return match *l {
                        0 => Err(E_DIV.msg("zero to a negative power")),
                        1 => Ok(v_int(1)),
                        -1 => Ok(v_int(if r % 2 == 0 { 1 } else { -1 })),
                        _ => Ok(v_int(0)),
                    };
                }
                let exp = u32::try_from(*r).map_err(|_| E_INVARG.msg("exponent too large"))?;
                Ok(v_int(l.wrapping_pow(exp)))
            }
            (Variant::Float(l), Variant::Float(r)) => checked_float(l.powf(*r)),
            _ => Err(type_mismatch("^", self, other)),
        }
    }

    pub fn negative(&self) -> Result<Var, Error> {
        match self.variant() {
            Variant::Int(i) => Ok(v_int(i.wrapping_neg())),
            Variant::Float(f) => Ok(v_float(-*f)),
            _ => Err(E_TYPE.with_msg(|| {
                format!("cannot negate {}", self.type_code().to_literal())
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::var::{v_float, v_int, v_str};
    use crate::ErrorCode::{E_DIV, E_FLOAT, E_TYPE};

    #[test]
    fn test_same_kind_rule() {
        assert_eq!(v_int(1).add(&v_float(2.0)).unwrap_err(), E_TYPE);
        assert_eq!(v_float(1.0).mul(&v_int(2)).unwrap_err(), E_TYPE);
    }

    #[test]
    fn test_div_by_zero() {
        assert_eq!(v_int(1).div(&v_int(0)).unwrap_err(), E_DIV);
        assert_eq!(v_int(1).modulus(&v_int(0)).unwrap_err(), E_DIV);
        assert_eq!(v_float(1.0).div(&v_float(0.0)).unwrap_err(), E_DIV);
    }

    #[test]
    fn test_float_overflow() {
        assert_eq!(
            v_float(1e308).mul(&v_float(1e308)).unwrap_err(),
            E_FLOAT
        );
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            v_str("Hello, ").add(&v_str("world")).unwrap(),
            v_str("Hello, world")
        );
        assert_eq!(v_str("a").sub(&v_str("b")).unwrap_err(), E_TYPE);
    }

    #[test]
    fn test_negative_exponent() {
        assert_eq!(v_int(0).pow(&v_int(-1)).unwrap_err(), E_DIV);
        assert_eq!(v_int(1).pow(&v_int(-5)).unwrap(), v_int(1));
        assert_eq!(v_int(-1).pow(&v_int(-3)).unwrap(), v_int(-1));
        assert_eq!(v_int(-1).pow(&v_int(-4)).unwrap(), v_int(1));
        assert_eq!(v_int(7).pow(&v_int(-2)).unwrap(), v_int(0));
    }

    #[test]
    fn test_pow() {
        assert_eq!(v_int(2).pow(&v_int(10)).unwrap(), v_int(1024));
        assert_eq!(v_float(2.0).pow(&v_float(0.5)).unwrap(), v_float(2f64.sqrt()));
    }
}
