use super::*;
use crate::diagnostics::Span;

fn arrow(dom: Term, cod: Term) -> Term {
    Term::pi(Binder::explicit(None, dom), cod)
}

#[test]
fn alpha_eq_ignores_spans_and_binder_names() {
    let left = Term::pi(
        Binder::explicit(Some("x".to_string()), Term::builtin(Builtin::NatType)),
        Term::bound(0),
    );
    let right = Term::pi(
        Binder::explicit(Some("y".to_string()), Term::builtin(Builtin::NatType)),
        Term::bound(0).with_span(Span::new(3, 1, 3, 2)),
    )
    .with_span(Span::new(3, 1, 3, 9));
    assert!(alpha_eq(&left, &right));
}

#[test]
fn alpha_eq_distinguishes_visibility() {
    let explicit = Term::pi(
        Binder::explicit(None, Term::universe(0)),
        Term::builtin(Builtin::BoolType),
    );
    let implicit = Term::pi(
        Binder::implicit(None, Term::universe(0)),
        Term::builtin(Builtin::BoolType),
    );
    assert!(!alpha_eq(&explicit, &implicit));
}

#[test]
fn app_flattens_nested_spines() {
    let inner = Term::app(
        Term::builtin(Builtin::Add),
        vec![Arg::implicit(Term::builtin(Builtin::NatType))],
    );
    let outer = Term::app(inner, vec![Arg::explicit(Term::nat(1)), Arg::explicit(Term::nat(2))]);
    let (head, args) = outer.spine();
    assert!(matches!(head.kind, TermKind::Builtin(Builtin::Add)));
    assert_eq!(args.len(), 3);
}

#[test]
fn open_substitutes_and_shifts() {
    // (\x -> f x @1) applied to y: the body's @1 pointed one binder out,
    // so it shifts down to @0.
    let body = Term::app(
        Term::free("f"),
        vec![Arg::explicit(Term::bound(0)), Arg::explicit(Term::bound(1))],
    );
    let opened = open(&body, &Term::nat(7));
    let expected = Term::app(
        Term::free("f"),
        vec![Arg::explicit(Term::nat(7)), Arg::explicit(Term::bound(0))],
    );
    assert!(alpha_eq(&opened, &expected));
}

#[test]
fn open_lifts_argument_under_binders() {
    // Substituting `@0` (a context variable) into a body where the target
    // sits under a lambda must lift the argument past that lambda.
    let body = Term::lam(
        Binder::explicit(None, Term::builtin(Builtin::NatType)),
        Term::bound(1),
    );
    let opened = open(&body, &Term::bound(0));
    let expected = Term::lam(
        Binder::explicit(None, Term::builtin(Builtin::NatType)),
        Term::bound(1),
    );
    assert!(alpha_eq(&opened, &expected));
}

#[test]
fn try_strengthen_rejects_escaping_variables() {
    let escaping = Term::bound(0);
    assert!(try_strengthen(&escaping, 1).is_none());

    let kept = Term::bound(2);
    let strengthened = try_strengthen(&kept, 1).expect("variable survives");
    assert!(alpha_eq(&strengthened, &Term::bound(1)));
}

#[test]
fn try_strengthen_respects_local_binders() {
    // \x -> x never mentions the discarded context entry.
    let lam = Term::lam(
        Binder::explicit(None, Term::builtin(Builtin::NatType)),
        Term::bound(0),
    );
    assert!(try_strengthen(&lam, 2).is_some());
}

#[test]
fn peel_pis_returns_binders_in_order() {
    let ty = arrow(
        Term::builtin(Builtin::NatType),
        arrow(Term::builtin(Builtin::BoolType), Term::builtin(Builtin::RatType)),
    );
    let (binders, rest) = ty.peel_pis(2).expect("two binders");
    assert!(alpha_eq(&binders[0].ty, &Term::builtin(Builtin::NatType)));
    assert!(alpha_eq(&binders[1].ty, &Term::builtin(Builtin::BoolType)));
    assert!(alpha_eq(rest, &Term::builtin(Builtin::RatType)));
    assert!(ty.peel_pis(3).is_none());
}

#[test]
fn builtin_types_are_closed() {
    for builtin in [
        Builtin::If,
        Builtin::Eq,
        Builtin::Add,
        Builtin::Neg,
        Builtin::At,
        Builtin::Map,
        Builtin::Fold,
        Builtin::Forall,
        Builtin::FromNat,
        Builtin::FromRat,
    ] {
        let ty = builtin.ty();
        assert!(!has_free_var(&ty), "type of {builtin} is not closed");
    }
}

#[test]
fn eval_arity_matches_pi_spine_length() {
    for builtin in [
        Builtin::Not,
        Builtin::And,
        Builtin::If,
        Builtin::Eq,
        Builtin::Add,
        Builtin::Neg,
        Builtin::At,
        Builtin::Map,
        Builtin::Fold,
        Builtin::FromNat,
        Builtin::FromRat,
    ] {
        let arity = builtin.eval_arity().expect("reducible builtin");
        assert!(
            builtin.ty().peel_pis(arity).is_some(),
            "arity of {builtin} exceeds its Pi spine"
        );
        assert!(
            builtin.ty().peel_pis(arity + 1).is_none(),
            "arity of {builtin} stops short of its Pi spine"
        );
    }
}

fn has_free_var(term: &Term) -> bool {
    fn go(term: &Term, depth: usize) -> bool {
        match &term.kind {
            TermKind::Bound(ix) => ix.0 >= depth,
            TermKind::Universe(_)
            | TermKind::Free(_)
            | TermKind::Lit(_)
            | TermKind::Builtin(_)
            | TermKind::Hole(_)
            | TermKind::Meta(_) => false,
            TermKind::App(head, args) => {
                go(head, depth) || args.iter().any(|arg| go(&arg.term, depth))
            }
            TermKind::Lam(binder, body) | TermKind::Pi(binder, body) => {
                go(&binder.ty, depth) || go(body, depth + 1)
            }
            TermKind::Let(bound, binder, body) => {
                go(bound, depth) || go(&binder.ty, depth) || go(body, depth + 1)
            }
            TermKind::VecLit(items) => items.iter().any(|item| go(item, depth)),
            TermKind::Dict(inner) => go(inner, depth),
        }
    }
    go(term, 0)
}
