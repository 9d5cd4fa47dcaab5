use std::collections::VecDeque;

use crate::diagnostics::Span;
use crate::normalize::Normalizer;
use crate::syntax::{
    index_of, lift, open, vector_of, Arg, Binder, Builtin, Literal, Term, TermKind, TypeClass,
    Visibility,
};

use super::constraint::Constraint;
use super::meta::MetaContext;
use super::{DeclContext, TypeError};

/// Bidirectional elaborator for a single declaration. Emits metas and
/// constraints into the meta-context; never solves anything itself.
pub(super) struct Checker<'a> {
    metas: &'a mut MetaContext,
    decls: &'a DeclContext,
    ctx: Vec<Binder>,
}

impl<'a> Checker<'a> {
    pub(super) fn new(metas: &'a mut MetaContext, decls: &'a DeclContext) -> Self {
        Checker {
            metas,
            decls,
            ctx: Vec::new(),
        }
    }

    pub(super) fn whnf(&self, term: &Term) -> Term {
        Normalizer::with_decls(self.metas.solutions(), self.decls).whnf(self.ctx.len(), term)
    }

    fn fresh_meta(&mut self, ty: &Term, span: Span) -> Term {
        let (_, usage) = self.metas.fresh_meta(&self.ctx, ty, span);
        usage
    }

    /// Fresh evidence meta for an instance argument, with the class
    /// obligation registered against it.
    fn fresh_instance(&mut self, class_expr: &Term, span: Span) -> Term {
        let (id, usage) = self.metas.fresh_meta(&self.ctx, class_expr, span);
        self.metas.add_constraint(
            Constraint::TypeClass(id, class_expr.clone()),
            span,
            self.ctx.len(),
        );
        usage
    }

    pub(super) fn add_unify(&mut self, expected: Term, actual: Term, span: Span) {
        self.metas
            .add_constraint(Constraint::Unify(expected, actual), span, self.ctx.len());
    }

    pub(super) fn check(&mut self, expected: &Term, expr: &Term) -> Result<Term, TypeError> {
        let expected = self.whnf(expected);
        match (&expected.kind, &expr.kind) {
            (TermKind::Pi(binder, result), TermKind::Lam(lam_binder, body))
                if binder.visibility == lam_binder.visibility =>
            {
                let binder_ty = self.elab_binder_ty(&lam_binder.ty)?;
                self.add_unify(binder.ty.clone(), binder_ty.clone(), expr.span);
                let new_binder = Binder {
                    name: lam_binder.name.clone(),
                    visibility: lam_binder.visibility,
                    relevance: binder.relevance,
                    ty: binder_ty,
                };
                self.ctx.push(new_binder.clone());
                let body = self.check(result, body);
                self.ctx.pop();
                Ok(Term::lam(new_binder, body?).with_span(expr.span))
            }
            // An implicit or instance function is expected but the term does
            // not bind it: eta-expand and keep checking underneath.
            (TermKind::Pi(binder, result), _) if binder.visibility != Visibility::Explicit => {
                let binder = (**binder).clone();
                let lifted = lift(expr, 1);
                self.ctx.push(binder.clone());
                let body = self.check(result, &lifted);
                self.ctx.pop();
                Ok(Term::lam(binder, body?).with_span(expr.span))
            }
            (_, TermKind::Hole(_)) => Ok(self.fresh_meta(&expected, expr.span)),
            _ => {
                let (elaborated, ty) = self.infer(expr)?;
                let (elaborated, ty) = self.insert_trailing(elaborated, ty);
                self.add_unify(expected, ty, expr.span);
                Ok(elaborated)
            }
        }
    }

    pub(super) fn infer(&mut self, expr: &Term) -> Result<(Term, Term), TypeError> {
        match &expr.kind {
            TermKind::Universe(level) => Ok((expr.clone(), Term::universe(level + 1))),
            TermKind::Bound(ix) => {
                let position = self
                    .ctx
                    .len()
                    .checked_sub(ix.0 + 1)
                    .unwrap_or_else(|| panic!("bound variable {} out of scope", ix.0));
                let ty = lift(&self.ctx[position].ty, ix.0 + 1);
                Ok((expr.clone(), ty))
            }
            TermKind::Free(name) => {
                let ty = self
                    .decls
                    .ty(name)
                    .unwrap_or_else(|| panic!("unresolved identifier `{name}` reached the checker"));
                Ok((expr.clone(), ty.clone()))
            }
            TermKind::Lit(literal) => self.infer_literal(literal, expr.span),
            TermKind::Builtin(builtin) => Ok((expr.clone(), builtin.ty())),
            TermKind::App(head, args) => self.infer_app(head, args, expr.span),
            TermKind::Lam(lam_binder, body) => {
                let binder_ty = self.elab_binder_ty(&lam_binder.ty)?;
                let new_binder = Binder {
                    name: lam_binder.name.clone(),
                    visibility: lam_binder.visibility,
                    relevance: lam_binder.relevance,
                    ty: binder_ty,
                };
                self.ctx.push(new_binder.clone());
                let result = self.infer(body);
                self.ctx.pop();
                let (body, body_ty) = result?;
                Ok((
                    Term::lam(new_binder.clone(), body).with_span(expr.span),
                    Term::pi(new_binder, body_ty),
                ))
            }
            TermKind::Pi(binder, body) => {
                let (binder_ty, dom_level) = self.infer_type(&binder.ty)?;
                let new_binder = Binder {
                    name: binder.name.clone(),
                    visibility: binder.visibility,
                    relevance: binder.relevance,
                    ty: binder_ty,
                };
                self.ctx.push(new_binder.clone());
                let result = self.infer_type(body);
                self.ctx.pop();
                let (body, cod_level) = result?;
                Ok((
                    Term::pi(new_binder, body).with_span(expr.span),
                    Term::universe(dom_level.max(cod_level)),
                ))
            }
            // A let is an immediately-applied lambda: route it through the
            // application machinery so implicit insertion happens in exactly
            // one place, then rebuild the let from the elaborated pieces.
            TermKind::Let(bound, binder, body) => {
                let lam = Term::lam((**binder).clone(), (**body).clone()).with_span(expr.span);
                let args = [Arg::explicit((**bound).clone())];
                let (app, ty) = self.infer_app(&lam, &args, expr.span)?;
                match app.kind {
                    TermKind::App(head, mut app_args)
                        if app_args.len() == 1 && matches!(head.kind, TermKind::Lam(..)) =>
                    {
                        let TermKind::Lam(lam_binder, lam_body) = head.kind else {
                            unreachable!()
                        };
                        let bound_elab = app_args.pop().expect("let binding").term;
                        Ok((
                            Term::new(
                                TermKind::Let(Box::new(bound_elab), lam_binder, lam_body),
                                expr.span,
                            ),
                            ty,
                        ))
                    }
                    other => Ok((Term::new(other, expr.span), ty)),
                }
            }
            TermKind::Hole(_) => {
                let ty = self.fresh_meta(&Term::universe(0), expr.span);
                let term = self.fresh_meta(&ty, expr.span);
                Ok((term, ty))
            }
            TermKind::Meta(id) => Ok((expr.clone(), self.metas.info(*id).ty.clone())),
            TermKind::VecLit(items) => self.infer_vec_lit(items, expr.span),
            TermKind::Dict(inner) => Ok((expr.clone(), (**inner).clone())),
        }
    }

    /// Elaborate a term that must itself be a type, returning its universe
    /// level. Meta-typed terms are constrained to land in `Type`.
    pub(super) fn infer_type(&mut self, term: &Term) -> Result<(Term, u32), TypeError> {
        let (elaborated, ty) = self.infer(term)?;
        let (elaborated, ty) = self.insert_trailing(elaborated, ty);
        let ty_whnf = self.whnf(&ty);
        match ty_whnf.kind {
            TermKind::Universe(level) => Ok((elaborated, level)),
            _ if ty_whnf.head_meta().is_some() => {
                self.add_unify(Term::universe(0), ty_whnf, term.span);
                Ok((elaborated, 0))
            }
            _ => Err(TypeError::TypeMismatch {
                span: term.span,
                expected: Term::universe(0),
                actual: ty_whnf,
            }),
        }
    }

    fn elab_binder_ty(&mut self, binder_ty: &Term) -> Result<Term, TypeError> {
        if matches!(binder_ty.kind, TermKind::Hole(_)) {
            Ok(self.fresh_meta(&Term::universe(0), binder_ty.span))
        } else {
            let (elaborated, _) = self.infer_type(binder_ty)?;
            Ok(elaborated)
        }
    }

    /// Walk the Pi-spine of the function's type, consuming user arguments
    /// where their visibility matches and synthesizing implicit and
    /// instance arguments where it does not.
    fn infer_app(&mut self, head: &Term, args: &[Arg], span: Span) -> Result<(Term, Term), TypeError> {
        let (head, mut ty) = self.infer(head)?;
        let mut user: VecDeque<&Arg> = args.iter().collect();
        let mut out_args: Vec<Arg> = Vec::with_capacity(args.len());
        while !user.is_empty() {
            let ty_whnf = self.whnf(&ty);
            // An undetermined function type gets pinned to a fresh
            // function shape so checking can continue. The shape's metas
            // live in the head meta's own captured context, keeping the
            // resulting unification inside the solvable pattern fragment.
            if let Some(head) = ty_whnf.head_meta() {
                let depth = self.ctx.len();
                let prefix_len = self.metas.info(head).ctx_len.min(depth);
                let prefix = self.ctx[..prefix_len].to_vec();
                let (_, dom) = self.metas.fresh_meta(&prefix, &Term::universe(0), span);
                let (_, cod) = self.metas.fresh_meta(&prefix, &Term::universe(0), span);
                let dom = lift(&dom, depth - prefix_len);
                let cod = lift(&cod, depth - prefix_len);
                let shape = Term::pi(Binder::explicit(None, dom), lift(&cod, 1));
                self.add_unify(shape.clone(), ty_whnf, span);
                ty = shape;
                continue;
            }
            let Some((binder, rest)) = ty_whnf.as_pi() else {
                // Too many arguments. Synthesize a function-shaped
                // placeholder purely for the diagnostic.
                let dom = self.fresh_meta(&Term::universe(0), span);
                let cod = self.fresh_meta(&Term::universe(0), span);
                let placeholder = Term::pi(Binder::explicit(None, dom), lift(&cod, 1));
                return Err(TypeError::TypeMismatch {
                    span,
                    expected: placeholder,
                    actual: ty_whnf,
                });
            };
            let next = user.front().expect("non-empty argument queue");
            let arg_term = if next.visibility == binder.visibility {
                let arg = self.check(&binder.ty, &next.term)?;
                user.pop_front();
                arg
            } else {
                match binder.visibility {
                    Visibility::Implicit => self.fresh_meta(&binder.ty, span),
                    Visibility::Instance => self.fresh_instance(&binder.ty, span),
                    Visibility::Explicit => {
                        return Err(TypeError::MissingExplicitArg {
                            span: next.term.span,
                            expected: binder.ty.clone(),
                        });
                    }
                }
            };
            out_args.push(Arg {
                visibility: binder.visibility,
                term: arg_term.clone(),
            });
            ty = open(rest, &arg_term);
        }
        Ok((Term::app(head, out_args).with_span(span), ty))
    }

    /// Insert metas for any leading implicit or instance binders left in a
    /// type after inference, so the result can unify against an explicit
    /// expectation.
    pub(super) fn insert_trailing(&mut self, expr: Term, ty: Term) -> (Term, Term) {
        let mut expr = expr;
        let mut ty = ty;
        loop {
            let ty_whnf = self.whnf(&ty);
            let Some((binder, rest)) = ty_whnf.as_pi() else {
                return (expr, ty_whnf);
            };
            let arg_term = match binder.visibility {
                Visibility::Implicit => self.fresh_meta(&binder.ty, expr.span),
                Visibility::Instance => self.fresh_instance(&binder.ty, expr.span),
                Visibility::Explicit => return (expr, ty_whnf),
            };
            let span = expr.span;
            expr = Term::app(
                expr,
                vec![Arg {
                    visibility: binder.visibility,
                    term: arg_term.clone(),
                }],
            )
            .with_span(span);
            ty = open(rest, &arg_term);
        }
    }

    /// Numeric literals go through their coercion builtin with a fresh
    /// element-type meta, so the concrete literal type is decided by the
    /// solver (or by defaulting) rather than here.
    fn infer_literal(&mut self, literal: &Literal, span: Span) -> Result<(Term, Term), TypeError> {
        match literal {
            Literal::Bool(_) => Ok((
                Term::lit(literal.clone()).with_span(span),
                Term::builtin(Builtin::BoolType),
            )),
            Literal::Int(_) => Ok((
                Term::lit(literal.clone()).with_span(span),
                Term::builtin(Builtin::IntType),
            )),
            Literal::Index(_, bound) => Ok((
                Term::lit(literal.clone()).with_span(span),
                index_of(Term::nat(*bound)),
            )),
            Literal::Nat(_) => {
                self.coerced_literal(Builtin::FromNat, TypeClass::HasNatLits, literal, span)
            }
            Literal::Rat(_) => {
                self.coerced_literal(Builtin::FromRat, TypeClass::HasRatLits, literal, span)
            }
        }
    }

    fn coerced_literal(
        &mut self,
        op: Builtin,
        class: TypeClass,
        literal: &Literal,
        span: Span,
    ) -> Result<(Term, Term), TypeError> {
        let elem_ty = self.fresh_meta(&Term::universe(0), span);
        let class_expr = Term::class_app(class, vec![Arg::explicit(elem_ty.clone())]);
        let evidence = self.fresh_instance(&class_expr, span);
        let term = Term::app(
            Term::builtin(op),
            vec![
                Arg::implicit(elem_ty.clone()),
                Arg::instance(evidence),
                Arg::explicit(Term::lit(literal.clone()).with_span(span)),
            ],
        )
        .with_span(span);
        Ok((term, elem_ty))
    }

    /// Vector literals defer element-type agreement: each element is
    /// inferred independently and a single almost-equal obligation over a
    /// fresh element type is registered, instead of unifying eagerly.
    fn infer_vec_lit(&mut self, items: &[Term], span: Span) -> Result<(Term, Term), TypeError> {
        let mut elems = Vec::with_capacity(items.len());
        let mut elem_tys = Vec::with_capacity(items.len());
        for item in items {
            let (elem, ty) = self.infer(item)?;
            let (elem, ty) = self.insert_trailing(elem, ty);
            elems.push(elem);
            elem_tys.push(ty);
        }
        let elem_ty = self.fresh_meta(&Term::universe(0), span);
        let class_expr = Term::class_app(
            TypeClass::AlmostEq,
            vec![
                Arg::explicit(Term::nat(items.len() as u64)),
                Arg::explicit(Term::vec_lit(elem_tys)),
                Arg::explicit(elem_ty.clone()),
            ],
        );
        let _evidence = self.fresh_instance(&class_expr, span);
        let ty = vector_of(elem_ty, Term::nat(items.len() as u64));
        Ok((Term::vec_lit(elems).with_span(span), ty))
    }
}
