use num_bigint::BigInt;
use num_rational::BigRational;

use super::solver::Solver;
use super::*;
use crate::syntax::{alpha_eq, Arg, Binder, Literal, TypeClass};

fn sp() -> Span {
    Span::default()
}

fn nat_ty() -> Term {
    Term::builtin(Builtin::NatType)
}

fn rat_ty() -> Term {
    Term::builtin(Builtin::RatType)
}

fn bool_ty() -> Term {
    Term::builtin(Builtin::BoolType)
}

fn arrow(dom: Term, cod: Term) -> Term {
    Term::pi(Binder::explicit(None, dom), cod)
}

fn rat_lit(numer: i64, denom: i64) -> Term {
    Term::lit(Literal::Rat(BigRational::new(
        BigInt::from(numer),
        BigInt::from(denom),
    )))
}

fn def(name: &str, ty: Option<Term>, body: Term) -> Declaration {
    Declaration::Def {
        name: name.to_string(),
        span: sp(),
        ty,
        body,
    }
}

fn run(declaration: &Declaration) -> Result<CheckedDecl, TypeError> {
    check_declaration(
        declaration,
        &DeclContext::new(),
        &ResourceContext::new(),
        &Options::default(),
    )
}

/// First dictionary for `class` in the term, returning the type it was
/// resolved at.
fn find_dict_target(term: &Term, class: TypeClass) -> Option<Term> {
    fn go(term: &Term, class: TypeClass) -> Option<Term> {
        if let TermKind::Dict(inner) = &term.kind {
            if let Some((found, args)) = inner.as_class_app() {
                if found == class {
                    return args.first().map(|arg| arg.term.clone());
                }
            }
        }
        match &term.kind {
            TermKind::App(head, args) => go(head, class)
                .or_else(|| args.iter().find_map(|arg| go(&arg.term, class))),
            TermKind::Lam(binder, body) | TermKind::Pi(binder, body) => {
                go(&binder.ty, class).or_else(|| go(body, class))
            }
            TermKind::Let(bound, binder, body) => go(bound, class)
                .or_else(|| go(&binder.ty, class))
                .or_else(|| go(body, class)),
            TermKind::VecLit(items) => items.iter().find_map(|item| go(item, class)),
            TermKind::Dict(inner) => go(inner, class),
            _ => None,
        }
    }
    go(term, class)
}

#[test]
fn function_type_unifies_with_itself_without_metas() {
    let fn_ty = arrow(
        arrow(nat_ty(), nat_ty()),
        arrow(nat_ty(), nat_ty()),
    );
    let mut metas = MetaContext::new();
    metas.add_constraint(Constraint::Unify(fn_ty.clone(), fn_ty), sp(), 0);
    let decls = DeclContext::new();
    let options = Options::default();
    let remaining = Solver::new(&mut metas, &decls, &options)
        .solve(&bool_ty(), sp())
        .expect("unification succeeds");
    assert!(remaining.is_empty());
    assert!(
        metas.unsolved_metas().is_empty(),
        "no metas should be created: {:?}",
        metas.unsolved_metas()
    );
}

#[test]
fn nat_literal_resolves_to_rat_instance_under_annotation() {
    let checked = run(&def("one", Some(rat_ty()), Term::nat(1))).expect("checks");
    assert!(alpha_eq(&checked.ty, &rat_ty()), "type was {}", checked.ty);
    let body = checked.body.expect("body");
    let target = find_dict_target(&body, TypeClass::HasNatLits).expect("literal evidence");
    assert!(
        alpha_eq(&target, &rat_ty()),
        "literal resolved at {target}, not Rat"
    );
}

#[test]
fn unconstrained_literals_default_to_rat() {
    // The literals' types share no meta with the declaration's type, so
    // once the solver is globally stuck they default to the canonical
    // rational instance.
    let body = Term::app(
        Term::builtin(Builtin::Eq),
        vec![Arg::explicit(Term::nat(1)), Arg::explicit(Term::nat(1))],
    );
    let checked = run(&def("prop", Some(bool_ty()), body)).expect("checks");
    assert!(alpha_eq(&checked.ty, &bool_ty()));
    let body = checked.body.expect("body");
    let eq_target = find_dict_target(&body, TypeClass::HasEq).expect("eq evidence");
    assert!(alpha_eq(&eq_target, &rat_ty()), "eq defaulted to {eq_target}");
    let lit_target = find_dict_target(&body, TypeClass::HasNatLits).expect("literal evidence");
    assert!(alpha_eq(&lit_target, &rat_ty()));
}

#[test]
fn equality_on_unannotated_parameters_generalizes() {
    let body = Term::lam(
        Binder::explicit(Some("x".to_string()), Term::hole("x")),
        Term::lam(
            Binder::explicit(Some("y".to_string()), Term::hole("y")),
            Term::app(
                Term::builtin(Builtin::Eq),
                vec![Arg::explicit(Term::bound(1)), Arg::explicit(Term::bound(0))],
            ),
        ),
    );
    let checked = run(&def("same", None, body)).expect("checks");
    let expected = Term::pi(
        Binder::implicit(Some("A".to_string()), Term::universe(0)),
        Term::pi(
            Binder::instance(Term::class_app(
                TypeClass::HasEq,
                vec![Arg::explicit(Term::bound(0))],
            )),
            arrow(Term::bound(1), arrow(Term::bound(2), bool_ty())),
        ),
    );
    assert!(
        alpha_eq(&checked.ty, &expected),
        "generalized to {}",
        checked.ty
    );
}

#[test]
fn generalized_declaration_instantiates_at_concrete_types() {
    let same = def(
        "same",
        None,
        Term::lam(
            Binder::explicit(Some("x".to_string()), Term::hole("x")),
            Term::lam(
                Binder::explicit(Some("y".to_string()), Term::hole("y")),
                Term::app(
                    Term::builtin(Builtin::Eq),
                    vec![Arg::explicit(Term::bound(1)), Arg::explicit(Term::bound(0))],
                ),
            ),
        ),
    );
    let usage = def(
        "use",
        Some(bool_ty()),
        Term::app(
            Term::free("same"),
            vec![
                Arg::explicit(Term::lit(Literal::Bool(true))),
                Arg::explicit(Term::lit(Literal::Bool(false))),
            ],
        ),
    );
    let checked = check_program(
        &[same, usage],
        &ResourceContext::new(),
        &Options::default(),
    )
    .expect("program checks");
    assert_eq!(checked.len(), 2);
    let body = checked[1].body.as_ref().expect("body");
    let target = find_dict_target(body, TypeClass::HasEq).expect("instantiated evidence");
    assert!(alpha_eq(&target, &bool_ty()), "instantiated at {target}");
}

#[test]
fn meta_alias_direction_is_order_independent() {
    for flip in [false, true] {
        let mut metas = MetaContext::new();
        let (older, older_usage) = metas.fresh_meta(&[], &Term::universe(0), sp());
        let (younger, younger_usage) = metas.fresh_meta(&[], &Term::universe(0), sp());
        let (left, right) = if flip {
            (younger_usage, older_usage)
        } else {
            (older_usage, younger_usage)
        };
        metas.add_constraint(Constraint::Unify(left, right), sp(), 0);
        let decls = DeclContext::new();
        let options = Options::default();
        let remaining = Solver::new(&mut metas, &decls, &options)
            .solve(&bool_ty(), sp())
            .expect("aliasing succeeds");
        assert!(remaining.is_empty());
        assert!(
            !metas.is_solved(older),
            "older meta must stay the representative (flip: {flip})"
        );
        let solution = metas
            .solutions()
            .get(&younger)
            .unwrap_or_else(|| panic!("younger meta unsolved (flip: {flip})"));
        assert!(
            alpha_eq(solution, &Term::meta(older)),
            "younger aliased to {solution} (flip: {flip})"
        );
    }
}

#[test]
fn vector_literal_widens_mixed_literals_to_annotation() {
    let sig = crate::syntax::vector_of(rat_ty(), Term::nat(2));
    let body = Term::vec_lit(vec![Term::nat(1), rat_lit(5, 2)]);
    let checked = run(&def("v", Some(sig.clone()), body)).expect("checks");
    assert!(alpha_eq(&checked.ty, &sig), "type was {}", checked.ty);
    let body = checked.body.expect("body");
    let nat_target = find_dict_target(&body, TypeClass::HasNatLits).expect("nat literal");
    assert!(alpha_eq(&nat_target, &rat_ty()));
    let rat_target = find_dict_target(&body, TypeClass::HasRatLits).expect("rat literal");
    assert!(alpha_eq(&rat_target, &rat_ty()));
}

#[test]
fn empty_vector_literal_checks_against_annotation() {
    let sig = crate::syntax::vector_of(rat_ty(), Term::nat(0));
    let checked = run(&def("empty", Some(sig.clone()), Term::vec_lit(Vec::new())))
        .expect("checks");
    assert!(alpha_eq(&checked.ty, &sig));
}

#[test]
fn higher_order_parameter_gets_a_function_shape() {
    // \f -> f 1 with nothing annotated: the application pins f's meta to
    // a fresh function shape, and the literal obligation generalizes.
    let body = Term::lam(
        Binder::explicit(Some("f".to_string()), Term::hole("f")),
        Term::app(Term::bound(0), vec![Arg::explicit(Term::nat(1))]),
    );
    let checked = run(&def("apply1", None, body)).expect("checks");
    let expected = Term::pi(
        Binder::implicit(Some("A".to_string()), Term::universe(0)),
        Term::pi(
            Binder::implicit(Some("B".to_string()), Term::universe(0)),
            Term::pi(
                Binder::instance(Term::class_app(
                    TypeClass::HasNatLits,
                    vec![Arg::explicit(Term::bound(1))],
                )),
                Term::pi(
                    Binder::explicit(None, arrow(Term::bound(2), Term::bound(2))),
                    Term::bound(2),
                ),
            ),
        ),
    );
    assert!(
        alpha_eq(&checked.ty, &expected),
        "generalized to {}",
        checked.ty
    );
}

#[test]
fn linkage_follows_class_edges_when_enabled() {
    let (mut metas, decl_ty) = linkage_setup();
    let decls = DeclContext::new();
    let options = Options {
        link_through_class_constraints: true,
    };
    let remaining = Solver::new(&mut metas, &decls, &options)
        .solve(&decl_ty, sp())
        .expect("solver finishes");
    assert_eq!(
        remaining.len(),
        2,
        "both obligations reach generalization when class edges link"
    );
}

#[test]
fn linkage_ignores_class_edges_when_disabled() {
    let (mut metas, decl_ty) = linkage_setup();
    let decls = DeclContext::new();
    let options = Options {
        link_through_class_constraints: false,
    };
    let remaining = Solver::new(&mut metas, &decls, &options)
        .solve(&decl_ty, sp())
        .expect("solver finishes");
    assert!(remaining.is_empty(), "defaulting should discharge everything");
    let target = decl_ty.head_meta().expect("decl type meta");
    let solution = metas.solutions().get(&target).expect("solved by propagation");
    assert!(alpha_eq(solution, &rat_ty()), "solved to {solution}");
}

/// The declaration's type is one meta; an almost-equal obligation ties it
/// to a second meta which also carries a literal obligation. Whether the
/// second meta counts as "linked" depends on whether linkage flows through
/// class constraints.
fn linkage_setup() -> (MetaContext, Term) {
    let mut metas = MetaContext::new();
    let (_, linked_usage) = metas.fresh_meta(&[], &Term::universe(0), sp());
    let (_, free_usage) = metas.fresh_meta(&[], &Term::universe(0), sp());
    let almost = Term::class_app(
        TypeClass::AlmostEq,
        vec![
            Arg::explicit(Term::nat(1)),
            Arg::explicit(Term::vec_lit(vec![linked_usage.clone()])),
            Arg::explicit(free_usage.clone()),
        ],
    );
    let (almost_ev, _) = metas.fresh_meta(&[], &almost, sp());
    metas.add_constraint(Constraint::TypeClass(almost_ev, almost), sp(), 0);
    let lits = Term::class_app(TypeClass::HasNatLits, vec![Arg::explicit(free_usage)]);
    let (lits_ev, _) = metas.fresh_meta(&[], &lits, sp());
    metas.add_constraint(Constraint::TypeClass(lits_ev, lits), sp(), 0);
    (metas, linked_usage)
}

#[test]
fn missing_explicit_argument_is_reported() {
    let body = Term::app(
        Term::builtin(Builtin::Not),
        vec![Arg::implicit(Term::lit(Literal::Bool(true)))],
    );
    let result = run(&def("bad", None, body));
    assert!(
        matches!(result, Err(TypeError::MissingExplicitArg { .. })),
        "got {result:?}"
    );
}

#[test]
fn over_application_is_a_type_mismatch() {
    let body = Term::app(
        Term::builtin(Builtin::Not),
        vec![
            Arg::explicit(Term::lit(Literal::Bool(true))),
            Arg::explicit(Term::lit(Literal::Bool(false))),
        ],
    );
    let result = run(&def("bad", None, body));
    assert!(
        matches!(result, Err(TypeError::TypeMismatch { .. })),
        "got {result:?}"
    );
}

#[test]
fn arithmetic_on_booleans_has_no_instance() {
    let body = Term::app(
        Term::builtin(Builtin::Add),
        vec![
            Arg::explicit(Term::lit(Literal::Bool(true))),
            Arg::explicit(Term::lit(Literal::Bool(false))),
        ],
    );
    let result = run(&def("bad", None, body));
    assert!(
        matches!(result, Err(TypeError::TypeMismatch { .. })),
        "got {result:?}"
    );
}

#[test]
fn permanently_stuck_unification_reports_unsolved_constraints() {
    let mut metas = MetaContext::new();
    let (_, usage) = metas.fresh_meta(&[], &nat_ty(), sp());
    let blocked = Term::app(
        Term::builtin(Builtin::Add),
        vec![
            Arg::implicit(nat_ty()),
            Arg::instance(Term::dict(Term::class_app(
                TypeClass::HasAdd,
                vec![Arg::explicit(nat_ty())],
            ))),
            Arg::explicit(usage),
            Arg::explicit(Term::nat(1)),
        ],
    );
    metas.add_constraint(Constraint::Unify(blocked, Term::nat(5)), sp(), 0);
    let decls = DeclContext::new();
    let options = Options::default();
    let result = Solver::new(&mut metas, &decls, &options).solve(&bool_ty(), sp());
    assert!(
        matches!(result, Err(TypeError::UnsolvedConstraints { .. })),
        "got {result:?}"
    );
}

#[test]
fn context_captured_meta_cannot_generalize() {
    // \x -> []: the element type of the empty vector is captured under x,
    // so nothing can abstract it at the top level.
    let body = Term::lam(
        Binder::explicit(Some("x".to_string()), Term::hole("x")),
        Term::vec_lit(Vec::new()),
    );
    let result = run(&def("bad", None, body));
    assert!(
        matches!(result, Err(TypeError::UnsolvedMetas { .. })),
        "got {result:?}"
    );
}

#[test]
fn network_dimensions_resolve_from_resource_shape() {
    let declared = Term::pi(
        Binder::explicit(
            Some("x".to_string()),
            crate::syntax::vector_of(rat_ty(), Term::hole("n")),
        ),
        crate::syntax::vector_of(rat_ty(), Term::nat(2)),
    );
    let decl = Declaration::Network {
        name: "net".to_string(),
        span: sp(),
        ty: declared,
    };
    let mut resources = ResourceContext::new();
    resources.add_network(
        "net",
        NetworkShape {
            input: vec![3],
            output: vec![2],
        },
    );
    let checked =
        check_declaration(&decl, &DeclContext::new(), &resources, &Options::default())
            .expect("network checks");
    let expected = arrow(
        crate::syntax::vector_of(rat_ty(), Term::nat(3)),
        crate::syntax::vector_of(rat_ty(), Term::nat(2)),
    );
    assert!(alpha_eq(&checked.ty, &expected), "resolved to {}", checked.ty);
}

#[test]
fn network_without_shape_information_is_an_error() {
    let decl = Declaration::Network {
        name: "net".to_string(),
        span: sp(),
        ty: arrow(
            crate::syntax::vector_of(rat_ty(), Term::nat(1)),
            crate::syntax::vector_of(rat_ty(), Term::nat(1)),
        ),
    };
    let result = check_declaration(
        &decl,
        &DeclContext::new(),
        &ResourceContext::new(),
        &Options::default(),
    );
    assert!(
        matches!(result, Err(TypeError::UnknownResource { .. })),
        "got {result:?}"
    );
}

#[test]
fn network_with_non_function_type_is_malformed() {
    let decl = Declaration::Network {
        name: "net".to_string(),
        span: sp(),
        ty: bool_ty(),
    };
    let mut resources = ResourceContext::new();
    resources.add_network(
        "net",
        NetworkShape {
            input: vec![1],
            output: vec![1],
        },
    );
    let result =
        check_declaration(&decl, &DeclContext::new(), &resources, &Options::default());
    assert!(
        matches!(result, Err(TypeError::MalformedResourceType { .. })),
        "got {result:?}"
    );
}

#[test]
fn network_shape_conflict_is_a_type_error() {
    let decl = Declaration::Network {
        name: "net".to_string(),
        span: sp(),
        ty: arrow(
            crate::syntax::vector_of(rat_ty(), Term::nat(4)),
            crate::syntax::vector_of(rat_ty(), Term::nat(1)),
        ),
    };
    let mut resources = ResourceContext::new();
    resources.add_network(
        "net",
        NetworkShape {
            input: vec![3],
            output: vec![1],
        },
    );
    let result =
        check_declaration(&decl, &DeclContext::new(), &resources, &Options::default());
    assert!(
        matches!(result, Err(TypeError::TypeMismatch { .. })),
        "got {result:?}"
    );
}

#[test]
fn parameters_resolve_dimensions_in_later_declarations() {
    let program = vec![
        Declaration::Parameter {
            name: "rows".to_string(),
            span: sp(),
            ty: nat_ty(),
        },
        Declaration::Dataset {
            name: "inputs".to_string(),
            span: sp(),
            ty: crate::syntax::vector_of(rat_ty(), Term::free("rows")),
        },
    ];
    let mut resources = ResourceContext::new();
    resources.add_parameter("rows", 5);
    resources.add_dataset("inputs", vec![5]);
    let checked =
        check_program(&program, &resources, &Options::default()).expect("program checks");
    assert_eq!(checked.len(), 2);
    assert!(alpha_eq(&checked[0].ty, &nat_ty()));
    assert!(
        alpha_eq(checked[0].body.as_ref().expect("parameter body"), &Term::nat(5)),
        "parameter body is its concrete value"
    );
}

#[test]
fn dataset_dimension_conflict_is_reported() {
    let decl = Declaration::Dataset {
        name: "d".to_string(),
        span: sp(),
        ty: crate::syntax::vector_of(rat_ty(), Term::nat(3)),
    };
    let mut resources = ResourceContext::new();
    resources.add_dataset("d", vec![4]);
    let result =
        check_declaration(&decl, &DeclContext::new(), &resources, &Options::default());
    assert!(
        matches!(result, Err(TypeError::TypeMismatch { .. })),
        "got {result:?}"
    );
}

#[test]
fn instance_binders_are_erased_markers() {
    let checked = run(&def(
        "same",
        None,
        Term::lam(
            Binder::explicit(Some("x".to_string()), Term::hole("x")),
            Term::lam(
                Binder::explicit(Some("y".to_string()), Term::hole("y")),
                Term::app(
                    Term::builtin(Builtin::Eq),
                    vec![Arg::explicit(Term::bound(1)), Arg::explicit(Term::bound(0))],
                ),
            ),
        ),
    ))
    .expect("checks");
    let (binders, _) = checked.ty.peel_pis(2).expect("two leading binders");
    assert_eq!(binders[1].visibility, crate::syntax::Visibility::Instance);
    assert_eq!(binders[1].relevance, crate::syntax::Relevance::Irrelevant);
}

#[test]
fn checked_bodies_contain_no_holes() {
    let body = Term::lam(
        Binder::explicit(Some("x".to_string()), Term::hole("x")),
        Term::bound(0),
    );
    let checked = run(&def("id", None, body)).expect("checks");
    assert!(!checked.ty.contains_hole());
    assert!(!checked.body.expect("body").contains_hole());
}
