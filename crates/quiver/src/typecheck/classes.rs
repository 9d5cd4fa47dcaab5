//! Type-class instance resolution. Ground instances live in a fixed table;
//! vector instances decompose into element obligations; the almost-equal
//! obligation from vector literals turns into plain unifications once
//! enough element types are known.

use std::collections::BTreeSet;

use crate::normalize::{Head, Normalizer, VArg, Value};
use crate::syntax::{Arg, Builtin, MetaId, Term, TypeClass};

/// What the solver should do about a class obligation. Resolution itself
/// never mutates; the solver applies the decision.
pub(super) enum ClassDecision {
    /// Resolved outright: solve the evidence meta to this dictionary.
    Solved { evidence: Term },
    /// Resolved structurally: solve the evidence, then demand the same
    /// class on the sub-structure.
    Decompose { evidence: Term, sub_class: Term },
    /// Resolved up to element agreement: solve the evidence, then unify
    /// each pair.
    Unified { evidence: Term, pairs: Vec<(Term, Term)> },
    Stuck(BTreeSet<MetaId>),
    /// The argument is rigid and no instance covers it.
    NoInstance { actual: Term },
}

pub(super) fn decide_class(
    norm: &Normalizer<'_>,
    ctx_len: usize,
    class_expr: &Term,
) -> ClassDecision {
    let mut blocking = BTreeSet::new();
    let env = Normalizer::identity_env(ctx_len);
    let value = norm.force(norm.eval(&env, class_expr), &mut blocking);
    let Some((class, args)) = value.as_class_app() else {
        panic!("malformed class obligation `{class_expr}`");
    };
    match class {
        TypeClass::AlmostEq => decide_almost_eq(norm, ctx_len, &value, args, blocking),
        _ => decide_instance(norm, ctx_len, class, &value, args, blocking),
    }
}

fn decide_instance(
    norm: &Normalizer<'_>,
    ctx_len: usize,
    class: TypeClass,
    value: &Value,
    args: &[VArg],
    blocking: BTreeSet<MetaId>,
) -> ClassDecision {
    let Some(target) = args.first() else {
        panic!("class `{}` applied to no arguments", class.name());
    };
    let target = &target.value;
    if target.head_meta().is_some() {
        return ClassDecision::Stuck(blocking);
    }
    if let Some((elem, _)) = target.as_vector_app() {
        if element_wise(class) {
            return ClassDecision::Decompose {
                evidence: Term::dict(norm.quote(ctx_len, value)),
                sub_class: Term::class_app(class, vec![Arg::explicit(norm.quote(ctx_len, elem))]),
            };
        }
        return ClassDecision::NoInstance {
            actual: norm.quote(ctx_len, target),
        };
    }
    if instance_exists(class, target) {
        ClassDecision::Solved {
            evidence: Term::dict(norm.quote(ctx_len, value)),
        }
    } else {
        ClassDecision::NoInstance {
            actual: norm.quote(ctx_len, target),
        }
    }
}

/// Classes whose vector instances delegate to the element type.
fn element_wise(class: TypeClass) -> bool {
    matches!(
        class,
        TypeClass::HasEq
            | TypeClass::HasAdd
            | TypeClass::HasSub
            | TypeClass::HasMul
            | TypeClass::HasNeg
    )
}

/// The ground instance table.
fn instance_exists(class: TypeClass, target: &Value) -> bool {
    let Value::Stuck(Head::Builtin(builtin), spine) = target else {
        return false;
    };
    let base = match builtin {
        Builtin::BoolType | Builtin::NatType | Builtin::IntType | Builtin::RatType
            if spine.is_empty() =>
        {
            *builtin
        }
        Builtin::IndexType if spine.len() == 1 => *builtin,
        _ => return false,
    };
    match class {
        TypeClass::HasEq => matches!(
            base,
            Builtin::BoolType
                | Builtin::NatType
                | Builtin::IntType
                | Builtin::RatType
                | Builtin::IndexType
        ),
        TypeClass::HasOrd => matches!(
            base,
            Builtin::NatType | Builtin::IntType | Builtin::RatType | Builtin::IndexType
        ),
        TypeClass::HasAdd | TypeClass::HasMul => {
            matches!(base, Builtin::NatType | Builtin::IntType | Builtin::RatType)
        }
        TypeClass::HasSub => matches!(base, Builtin::IntType | Builtin::RatType),
        TypeClass::HasDiv => matches!(base, Builtin::RatType),
        TypeClass::HasNeg => matches!(base, Builtin::IntType | Builtin::RatType),
        TypeClass::HasNatLits => matches!(
            base,
            Builtin::NatType | Builtin::IntType | Builtin::RatType | Builtin::IndexType
        ),
        TypeClass::HasRatLits => matches!(base, Builtin::RatType),
        TypeClass::AlmostEq => false,
    }
}

fn decide_almost_eq(
    norm: &Normalizer<'_>,
    ctx_len: usize,
    value: &Value,
    args: &[VArg],
    blocking: BTreeSet<MetaId>,
) -> ClassDecision {
    let [_, tys, target] = args else {
        panic!("AlmostEq expects three arguments, got {}", args.len());
    };
    let items = match &tys.value {
        Value::Vec(items) => items,
        other => panic!("AlmostEq applied to a non-literal type vector: {other:?}"),
    };
    let target = &target.value;
    let evidence = Term::dict(norm.quote(ctx_len, value));

    // A known element type drives everything else towards it; numeric
    // literals among the elements then coerce through their literal
    // classes rather than through an eager join.
    if target.head_meta().is_none() {
        let target_term = norm.quote(ctx_len, target);
        let pairs = items
            .iter()
            .map(|item| (target_term.clone(), norm.quote(ctx_len, item)))
            .collect();
        return ClassDecision::Unified { evidence, pairs };
    }
    if let Some(rigid) = items.iter().find(|item| item.head_meta().is_none()) {
        let rigid_term = norm.quote(ctx_len, rigid);
        let mut pairs: Vec<(Term, Term)> = items
            .iter()
            .map(|item| (rigid_term.clone(), norm.quote(ctx_len, item)))
            .collect();
        pairs.push((rigid_term, norm.quote(ctx_len, target)));
        return ClassDecision::Unified { evidence, pairs };
    }
    // Every element type and the target are still metas; wait for more
    // information (or for defaulting to pick the canonical element type).
    ClassDecision::Stuck(blocking)
}
