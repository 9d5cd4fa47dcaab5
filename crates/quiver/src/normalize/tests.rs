use std::collections::{BTreeSet, HashMap};

use num_bigint::BigInt;
use num_rational::BigRational;

use super::*;
use crate::syntax::{alpha_eq, Arg, Binder, Builtin, Literal, MetaId, Term, TypeClass};
use crate::typecheck::DeclContext;

fn no_solutions() -> HashMap<MetaId, Term> {
    HashMap::new()
}

fn dict_for(class: TypeClass, ty: Term) -> Term {
    Term::dict(Term::class_app(class, vec![Arg::explicit(ty)]))
}

fn nat_ty() -> Term {
    Term::builtin(Builtin::NatType)
}

fn add_nats(x: Term, y: Term) -> Term {
    Term::app(
        Term::builtin(Builtin::Add),
        vec![
            Arg::implicit(nat_ty()),
            Arg::instance(dict_for(TypeClass::HasAdd, nat_ty())),
            Arg::explicit(x),
            Arg::explicit(y),
        ],
    )
}

fn rat(n: i64) -> Term {
    Term::lit(Literal::Rat(BigRational::from_integer(BigInt::from(n))))
}

#[test]
fn literal_arithmetic_reduces() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let result = norm.whnf(0, &add_nats(Term::nat(1), Term::nat(2)));
    assert!(alpha_eq(&result, &Term::nat(3)), "1 + 2 evaluated to {result}");
}

#[test]
fn beta_reduction_exposes_head() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let redex = Term::app(
        Term::lam(Binder::explicit(Some("x".to_string()), nat_ty()), Term::bound(0)),
        vec![Arg::explicit(Term::nat(5))],
    );
    let result = norm.whnf(0, &redex);
    assert!(alpha_eq(&result, &Term::nat(5)));
}

#[test]
fn whnf_is_idempotent() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let samples = vec![
        add_nats(Term::nat(1), Term::nat(2)),
        add_nats(Term::free("x"), Term::nat(2)),
        Term::app(
            Term::lam(
                Binder::explicit(Some("x".to_string()), nat_ty()),
                add_nats(Term::bound(0), Term::nat(1)),
            ),
            vec![Arg::explicit(Term::free("y"))],
        ),
        Term::lam(
            Binder::explicit(Some("x".to_string()), nat_ty()),
            Term::app(
                Term::lam(Binder::explicit(Some("y".to_string()), nat_ty()), Term::bound(0)),
                vec![Arg::explicit(Term::bound(0))],
            ),
        ),
        Term::vec_lit(vec![Term::nat(1), add_nats(Term::nat(1), Term::nat(1))]),
    ];
    for term in samples {
        let once = norm.whnf(0, &term);
        let twice = norm.whnf(0, &once);
        assert!(
            alpha_eq(&once, &twice),
            "whnf not idempotent on {term}: {once} vs {twice}"
        );
    }
}

#[test]
fn stuck_builtin_spines_are_rebuilt() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let stuck = add_nats(Term::free("x"), Term::nat(2));
    let result = norm.whnf(0, &stuck);
    assert!(alpha_eq(&result, &stuck), "stuck spine changed: {result}");
}

#[test]
fn if_selects_branch_on_literal_condition() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let term = Term::app(
        Term::builtin(Builtin::If),
        vec![
            Arg::implicit(nat_ty()),
            Arg::explicit(Term::lit(Literal::Bool(true))),
            Arg::explicit(Term::nat(1)),
            Arg::explicit(Term::nat(2)),
        ],
    );
    assert!(alpha_eq(&norm.whnf(0, &term), &Term::nat(1)));
}

#[test]
fn vector_indexing_projects_elements() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let term = Term::app(
        Term::builtin(Builtin::At),
        vec![
            Arg::implicit(nat_ty()),
            Arg::implicit(Term::nat(2)),
            Arg::explicit(Term::vec_lit(vec![Term::nat(10), Term::nat(20)])),
            Arg::explicit(Term::lit(Literal::Index(1, 2))),
        ],
    );
    assert!(alpha_eq(&norm.whnf(0, &term), &Term::nat(20)));
}

#[test]
fn map_and_fold_consume_vector_literals() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let double = Term::lam(
        Binder::explicit(Some("x".to_string()), nat_ty()),
        add_nats(Term::bound(0), Term::bound(0)),
    );
    let mapped = Term::app(
        Term::builtin(Builtin::Map),
        vec![
            Arg::implicit(nat_ty()),
            Arg::implicit(nat_ty()),
            Arg::implicit(Term::nat(2)),
            Arg::explicit(double),
            Arg::explicit(Term::vec_lit(vec![Term::nat(1), Term::nat(2)])),
        ],
    );
    let expected = Term::vec_lit(vec![Term::nat(2), Term::nat(4)]);
    assert!(alpha_eq(&norm.whnf(0, &mapped), &expected));

    let plus = Term::lam(
        Binder::explicit(Some("x".to_string()), nat_ty()),
        Term::lam(
            Binder::explicit(Some("y".to_string()), nat_ty()),
            add_nats(Term::bound(1), Term::bound(0)),
        ),
    );
    let folded = Term::app(
        Term::builtin(Builtin::Fold),
        vec![
            Arg::implicit(nat_ty()),
            Arg::implicit(nat_ty()),
            Arg::implicit(Term::nat(3)),
            Arg::explicit(plus),
            Arg::explicit(Term::nat(0)),
            Arg::explicit(Term::vec_lit(vec![Term::nat(1), Term::nat(2), Term::nat(3)])),
        ],
    );
    assert!(alpha_eq(&norm.whnf(0, &folded), &Term::nat(6)));
}

#[test]
fn from_nat_converts_once_evidence_is_known() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let term = Term::app(
        Term::builtin(Builtin::FromNat),
        vec![
            Arg::implicit(Term::builtin(Builtin::RatType)),
            Arg::instance(dict_for(
                TypeClass::HasNatLits,
                Term::builtin(Builtin::RatType),
            )),
            Arg::explicit(Term::nat(3)),
        ],
    );
    assert!(alpha_eq(&norm.whnf(0, &term), &rat(3)));
}

#[test]
fn division_by_literal_zero_stays_stuck() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let rat_ty = Term::builtin(Builtin::RatType);
    let term = Term::app(
        Term::builtin(Builtin::Div),
        vec![
            Arg::implicit(rat_ty.clone()),
            Arg::instance(dict_for(TypeClass::HasDiv, rat_ty)),
            Arg::explicit(rat(1)),
            Arg::explicit(rat(0)),
        ],
    );
    let result = norm.whnf(0, &term);
    assert!(alpha_eq(&result, &term), "division by zero reduced: {result}");
}

#[test]
fn force_reports_blocking_metas_and_resumes() {
    let meta = MetaId(0);
    let term = add_nats(Term::meta(meta), Term::nat(2));

    let empty = no_solutions();
    let norm = Normalizer::new(&empty);
    let mut blocking = BTreeSet::new();
    let value = norm.force(norm.eval(&Env::new(), &term), &mut blocking);
    assert!(blocking.contains(&meta), "missing blocker in {blocking:?}");
    assert!(matches!(value, Value::Stuck(Head::Builtin(Builtin::Add), _)));

    let mut solutions = no_solutions();
    solutions.insert(meta, Term::nat(3));
    let norm = Normalizer::new(&solutions);
    let mut blocking = BTreeSet::new();
    let value = norm.force(norm.eval(&Env::new(), &term), &mut blocking);
    assert!(blocking.is_empty(), "unexpected blockers {blocking:?}");
    let result = norm.quote(0, &value);
    assert!(alpha_eq(&result, &Term::nat(5)), "forced value was {result}");
}

#[test]
fn zonk_beta_reduces_solved_meta_applications() {
    let meta = MetaId(0);
    let mut solutions = no_solutions();
    solutions.insert(
        meta,
        Term::lam(
            Binder::explicit(Some("x".to_string()), nat_ty()),
            add_nats(Term::bound(0), Term::nat(1)),
        ),
    );
    let norm = Normalizer::new(&solutions);
    let usage = Term::app(Term::meta(meta), vec![Arg::explicit(Term::nat(4))]);
    let zonked = norm.zonk(&usage);
    // No residual redex headed by the solved meta.
    assert!(alpha_eq(&zonked, &add_nats(Term::nat(4), Term::nat(1))));

    // Coherence with the evaluator: substituting then normalizing agrees
    // with applying the solution as a value.
    let applied = {
        let solution = norm.eval(&Env::new(), solutions.get(&meta).expect("solution"));
        let value = norm.apply_value(solution, vec![VArg::explicit(norm.eval(&Env::new(), &Term::nat(4)))]);
        norm.quote(0, &value)
    };
    assert!(alpha_eq(&norm.whnf(0, &zonked), &applied));
}

#[test]
fn zonk_preserves_user_lets_and_lambdas() {
    let solutions = no_solutions();
    let norm = Normalizer::new(&solutions);
    let term = Term::let_in(
        Term::nat(1),
        Binder::explicit(Some("x".to_string()), nat_ty()),
        add_nats(Term::bound(0), Term::nat(2)),
    );
    let zonked = norm.zonk(&term);
    assert!(alpha_eq(&zonked, &term), "zonk rewrote a let: {zonked}");
}

#[test]
fn free_variables_unfold_only_with_declarations() {
    let mut decls = DeclContext::new();
    decls.insert("two", nat_ty(), Some(Term::nat(2)));
    let solutions = no_solutions();

    let opaque = Normalizer::new(&solutions);
    let kept = opaque.whnf(0, &Term::free("two"));
    assert!(alpha_eq(&kept, &Term::free("two")));

    let unfolding = Normalizer::with_decls(&solutions, &decls);
    let result = unfolding.whnf(0, &add_nats(Term::free("two"), Term::nat(2)));
    assert!(alpha_eq(&result, &Term::nat(4)));
}
