//! Evaluation rules for builtin operators. Every rule is total over shape:
//! an explicit case for each reducible argument pattern and an explicit
//! stuck-spine fallback, since builtins are applied to partially-known
//! terms during solving.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

use super::{Head, Normalizer, VArg, Value};
use crate::syntax::{Builtin, Literal, TypeClass};

pub(super) fn eval_builtin(norm: &Normalizer<'_>, builtin: Builtin, spine: Vec<VArg>) -> Value {
    match builtin {
        Builtin::Not => {
            if let [x] = spine.as_slice() {
                if let Some(b) = bool_lit(&x.value) {
                    return Value::Lit(Literal::Bool(!b));
                }
            }
            stuck(builtin, spine)
        }
        Builtin::And => {
            if let [x, y] = spine.as_slice() {
                match (bool_lit(&x.value), bool_lit(&y.value)) {
                    (Some(false), _) | (_, Some(false)) => {
                        return Value::Lit(Literal::Bool(false));
                    }
                    (Some(true), _) => return y.value.clone(),
                    (_, Some(true)) => return x.value.clone(),
                    (None, None) => {}
                }
            }
            stuck(builtin, spine)
        }
        Builtin::Or => {
            if let [x, y] = spine.as_slice() {
                match (bool_lit(&x.value), bool_lit(&y.value)) {
                    (Some(true), _) | (_, Some(true)) => {
                        return Value::Lit(Literal::Bool(true));
                    }
                    (Some(false), _) => return y.value.clone(),
                    (_, Some(false)) => return x.value.clone(),
                    (None, None) => {}
                }
            }
            stuck(builtin, spine)
        }
        Builtin::Implies => {
            if let [x, y] = spine.as_slice() {
                match (bool_lit(&x.value), bool_lit(&y.value)) {
                    (Some(false), _) | (_, Some(true)) => {
                        return Value::Lit(Literal::Bool(true));
                    }
                    (Some(true), _) => return y.value.clone(),
                    _ => {}
                }
            }
            stuck(builtin, spine)
        }
        Builtin::If => {
            if let [_, cond, then, otherwise] = spine.as_slice() {
                if let Some(b) = bool_lit(&cond.value) {
                    return if b {
                        then.value.clone()
                    } else {
                        otherwise.value.clone()
                    };
                }
            }
            stuck(builtin, spine)
        }
        Builtin::Eq
        | Builtin::Neq
        | Builtin::Leq
        | Builtin::Lt
        | Builtin::Geq
        | Builtin::Gt => {
            if let [_, _, x, y] = spine.as_slice() {
                if let (Value::Lit(a), Value::Lit(b)) = (&x.value, &y.value) {
                    if let Some(result) = compare_lits(builtin, a, b) {
                        return Value::Lit(Literal::Bool(result));
                    }
                }
            }
            stuck(builtin, spine)
        }
        Builtin::Add | Builtin::Sub | Builtin::Mul | Builtin::Div => {
            if let [_, _, x, y] = spine.as_slice() {
                if let (Value::Lit(a), Value::Lit(b)) = (&x.value, &y.value) {
                    if let Some(result) = arith_lits(builtin, a, b) {
                        return Value::Lit(result);
                    }
                }
            }
            stuck(builtin, spine)
        }
        Builtin::Neg => {
            if let [_, _, x] = spine.as_slice() {
                match &x.value {
                    Value::Lit(Literal::Nat(v)) | Value::Lit(Literal::Int(v)) => {
                        return Value::Lit(Literal::Int(-v.clone()));
                    }
                    Value::Lit(Literal::Rat(q)) => {
                        return Value::Lit(Literal::Rat(-q.clone()));
                    }
                    _ => {}
                }
            }
            stuck(builtin, spine)
        }
        Builtin::At => {
            if let [_, _, vec, idx] = spine.as_slice() {
                if let (Value::Vec(items), Value::Lit(Literal::Index(i, _))) =
                    (&vec.value, &idx.value)
                {
                    let i = *i as usize;
                    match items.get(i) {
                        Some(item) => return item.clone(),
                        None => panic!("index {i} out of bounds for vector of {}", items.len()),
                    }
                }
            }
            stuck(builtin, spine)
        }
        Builtin::Map => {
            if let [_, _, _, f, vec] = spine.as_slice() {
                if let Value::Vec(items) = &vec.value {
                    let mapped = items
                        .iter()
                        .map(|item| {
                            norm.apply_value(
                                f.value.clone(),
                                vec![VArg::explicit(item.clone())],
                            )
                        })
                        .collect();
                    return Value::Vec(mapped);
                }
            }
            stuck(builtin, spine)
        }
        Builtin::Fold => {
            if let [_, _, _, f, z, vec] = spine.as_slice() {
                if let Value::Vec(items) = &vec.value {
                    let mut acc = z.value.clone();
                    for item in items.iter().rev() {
                        acc = norm.apply_value(
                            f.value.clone(),
                            vec![VArg::explicit(item.clone()), VArg::explicit(acc)],
                        );
                    }
                    return acc;
                }
            }
            stuck(builtin, spine)
        }
        Builtin::FromNat => {
            if let [_, dict, lit] = spine.as_slice() {
                if let (Value::Dict(evidence), Value::Lit(Literal::Nat(value))) =
                    (&dict.value, &lit.value)
                {
                    if let Some(result) = convert_nat(evidence, value) {
                        return result;
                    }
                }
            }
            stuck(builtin, spine)
        }
        Builtin::FromRat => {
            if let [_, dict, lit] = spine.as_slice() {
                if let (Value::Dict(evidence), Value::Lit(Literal::Rat(value))) =
                    (&dict.value, &lit.value)
                {
                    if let Some((TypeClass::HasRatLits, args)) = evidence.as_class_app() {
                        if let Some(target) = args.first() {
                            if matches!(
                                target.value,
                                Value::Stuck(Head::Builtin(Builtin::RatType), _)
                            ) {
                                return Value::Lit(Literal::Rat(value.clone()));
                            }
                        }
                    }
                }
            }
            stuck(builtin, spine)
        }
        Builtin::BoolType
        | Builtin::NatType
        | Builtin::IntType
        | Builtin::RatType
        | Builtin::VectorType
        | Builtin::IndexType
        | Builtin::Forall
        | Builtin::Exists
        | Builtin::Class(_) => {
            panic!("builtin `{builtin}` has no evaluation rule")
        }
    }
}

fn stuck(builtin: Builtin, spine: Vec<VArg>) -> Value {
    Value::Stuck(Head::Builtin(builtin), spine)
}

fn bool_lit(value: &Value) -> Option<bool> {
    match value {
        Value::Lit(Literal::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn rational(lit: &Literal) -> Option<BigRational> {
    match lit {
        Literal::Nat(v) | Literal::Int(v) => Some(BigRational::from_integer(v.clone())),
        Literal::Rat(q) => Some(q.clone()),
        Literal::Bool(_) | Literal::Index(..) => None,
    }
}

fn integer(lit: &Literal) -> Option<BigInt> {
    match lit {
        Literal::Nat(v) | Literal::Int(v) => Some(v.clone()),
        _ => None,
    }
}

fn compare_lits(op: Builtin, a: &Literal, b: &Literal) -> Option<bool> {
    let ordering = match (a, b) {
        (Literal::Bool(x), Literal::Bool(y)) => x.cmp(y),
        (Literal::Index(x, _), Literal::Index(y, _)) => x.cmp(y),
        _ => rational(a)?.cmp(&rational(b)?),
    };
    let result = match op {
        Builtin::Eq => ordering == Ordering::Equal,
        Builtin::Neq => ordering != Ordering::Equal,
        Builtin::Leq => ordering != Ordering::Greater,
        Builtin::Lt => ordering == Ordering::Less,
        Builtin::Geq => ordering != Ordering::Less,
        Builtin::Gt => ordering == Ordering::Greater,
        _ => return None,
    };
    Some(result)
}

fn arith_lits(op: Builtin, a: &Literal, b: &Literal) -> Option<Literal> {
    if matches!(op, Builtin::Div) {
        let divisor = rational(b)?;
        // Division by a literal zero cannot reduce; leave the spine stuck
        // rather than fault inside the evaluator.
        if divisor.is_zero() {
            return None;
        }
        return Some(Literal::Rat(rational(a)? / divisor));
    }
    match (a, b) {
        (Literal::Rat(_), _) | (_, Literal::Rat(_)) => {
            let x = rational(a)?;
            let y = rational(b)?;
            let result = match op {
                Builtin::Add => x + y,
                Builtin::Sub => x - y,
                Builtin::Mul => x * y,
                _ => return None,
            };
            Some(Literal::Rat(result))
        }
        _ => {
            let x = integer(a)?;
            let y = integer(b)?;
            let result = match op {
                Builtin::Add => x + y,
                Builtin::Sub => x - y,
                Builtin::Mul => x * y,
                _ => return None,
            };
            let both_nat = matches!((a, b), (Literal::Nat(_), Literal::Nat(_)));
            if both_nat && !result.is_negative() {
                Some(Literal::Nat(result))
            } else {
                Some(Literal::Int(result))
            }
        }
    }
}

fn convert_nat(evidence: &Value, value: &BigInt) -> Option<Value> {
    let (class, args) = evidence.as_class_app()?;
    if class != TypeClass::HasNatLits {
        return None;
    }
    let target = args.first()?;
    match &target.value {
        Value::Stuck(Head::Builtin(Builtin::NatType), _) => {
            Some(Value::Lit(Literal::Nat(value.clone())))
        }
        Value::Stuck(Head::Builtin(Builtin::IntType), _) => {
            Some(Value::Lit(Literal::Int(value.clone())))
        }
        Value::Stuck(Head::Builtin(Builtin::RatType), _) => {
            Some(Value::Lit(Literal::Rat(BigRational::from_integer(value.clone()))))
        }
        Value::Stuck(Head::Builtin(Builtin::IndexType), bound_args) => {
            let bound = match bound_args.first().map(|arg| &arg.value) {
                Some(Value::Lit(Literal::Nat(bound))) => bound.to_u64()?,
                _ => return None,
            };
            Some(Value::Lit(Literal::Index(value.to_u64()?, bound)))
        }
        _ => None,
    }
}
