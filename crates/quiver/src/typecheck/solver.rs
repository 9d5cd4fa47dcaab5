//! The deferred constraint solver. Each outer pass partitions the pool
//! into blocked and unblocked constraints, substitutes the current
//! solution through the unblocked ones, and attempts each once. When no
//! constraint is unblocked the solver defaults an unlinked class
//! obligation and restarts; obligations linked to the declaration's own
//! type are left for generalization instead.

use std::collections::{BTreeSet, HashMap};

use crate::diagnostics::Span;
use crate::normalize::{Head, Normalizer, VArg, Value};
use crate::syntax::{
    try_strengthen, Binder, Builtin, Lvl, MetaId, Relevance, Term, TermKind, TypeClass, Visibility,
};

use super::classes::{self, ClassDecision};
use super::constraint::{Constraint, TrackedConstraint};
use super::meta::MetaContext;
use super::{DeclContext, Options, TypeError};

pub(super) struct Solver<'a> {
    metas: &'a mut MetaContext,
    decls: &'a DeclContext,
    options: &'a Options,
}

enum Attempt {
    Solved,
    Progress(Vec<TrackedConstraint>),
    Stuck(BTreeSet<MetaId>),
}

enum UnifyDecision {
    Solved,
    SolveMeta(MetaId, Term),
    /// Pairwise sub-problems, each with the context depth it lives under.
    Sub(Vec<(Term, Term, usize)>),
    Stuck(BTreeSet<MetaId>),
    Mismatch,
}

impl<'a> Solver<'a> {
    pub(super) fn new(
        metas: &'a mut MetaContext,
        decls: &'a DeclContext,
        options: &'a Options,
    ) -> Self {
        Solver {
            metas,
            decls,
            options,
        }
    }

    /// Run to fixpoint. Returns the class obligations that remain linked
    /// to the declaration's type; the caller generalizes them. Every other
    /// leftover constraint is an error.
    pub(super) fn solve(
        &mut self,
        decl_ty: &Term,
        decl_span: Span,
    ) -> Result<Vec<TrackedConstraint>, TypeError> {
        // Each pass solves at least one meta, strictly shrinks the pool,
        // or applies one defaulting step, so this bound is never reached
        // by a well-behaved run.
        let budget = 4 * (self.metas.meta_count() + self.metas.constraint_count()) + 16;
        let mut passes = 0usize;
        loop {
            let mut pending = self.metas.take_constraints();
            if pending.is_empty() {
                return Ok(Vec::new());
            }
            let recent = self.metas.drain_recently_solved();
            let (unblocked, blocked): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|c| !c.ctx.attempted || !c.ctx.blocked_by.is_disjoint(&recent));

            if unblocked.is_empty() {
                let linked = self.linked_metas(decl_ty, &blocked);
                if let Some(default_unify) = self.defaulting_candidate(&blocked, &linked) {
                    self.metas.put_back(blocked);
                    self.metas.push_tracked(default_unify);
                    continue;
                }
                let all_linked_classes = blocked.iter().all(|tracked| {
                    matches!(tracked.constraint, Constraint::TypeClass(..))
                        && !self.zonk_constraint(tracked).metas().is_disjoint(&linked)
                });
                if all_linked_classes {
                    return Ok(blocked);
                }
                return Err(self.unsolved_constraints_error(decl_span, &blocked));
            }

            passes += 1;
            if passes > budget {
                let mut all = unblocked;
                all.extend(blocked);
                return Err(self.unsolved_constraints_error(decl_span, &all));
            }

            let mut next = blocked;
            for tracked in unblocked {
                let zonked = self.zonk_constraint(&tracked);
                match self.attempt(&zonked)? {
                    Attempt::Solved => {}
                    Attempt::Progress(subs) => next.extend(subs),
                    Attempt::Stuck(blockers) => {
                        let mut tracked = tracked;
                        tracked.ctx.attempted = true;
                        tracked.ctx.blocked_by = blockers;
                        next.push(tracked);
                    }
                }
            }
            self.metas.put_back(next);
        }
    }

    fn zonk_constraint(&self, tracked: &TrackedConstraint) -> TrackedConstraint {
        let norm = Normalizer::new(self.metas.solutions());
        let constraint = match &tracked.constraint {
            Constraint::Unify(left, right) => Constraint::Unify(norm.zonk(left), norm.zonk(right)),
            Constraint::TypeClass(evidence, class_expr) => {
                Constraint::TypeClass(*evidence, norm.zonk(class_expr))
            }
        };
        TrackedConstraint {
            constraint,
            ctx: tracked.ctx.clone(),
        }
    }

    fn attempt(&mut self, tracked: &TrackedConstraint) -> Result<Attempt, TypeError> {
        match &tracked.constraint {
            Constraint::Unify(left, right) => self.attempt_unify(left, right, tracked),
            Constraint::TypeClass(evidence, class_expr) => {
                self.attempt_class(*evidence, class_expr, tracked)
            }
        }
    }

    fn attempt_unify(
        &mut self,
        left: &Term,
        right: &Term,
        tracked: &TrackedConstraint,
    ) -> Result<Attempt, TypeError> {
        let depth = tracked.ctx.ctx_len;
        let decision = {
            let norm = Normalizer::with_decls(self.metas.solutions(), self.decls);
            let env = Normalizer::identity_env(depth);
            let mut scratch = BTreeSet::new();
            let left_value = norm.force(norm.eval(&env, left), &mut scratch);
            let right_value = norm.force(norm.eval(&env, right), &mut scratch);
            self.decide_unify(&norm, depth, &left_value, &right_value)
        };
        match decision {
            UnifyDecision::Solved => Ok(Attempt::Solved),
            UnifyDecision::SolveMeta(id, solution) => {
                self.metas.solve(id, solution);
                Ok(Attempt::Solved)
            }
            UnifyDecision::Sub(pairs) => {
                let subs = pairs
                    .into_iter()
                    .map(|(a, b, ctx_len)| {
                        self.metas.make_tracked(
                            Constraint::Unify(a, b),
                            tracked.ctx.provenance,
                            ctx_len,
                        )
                    })
                    .collect();
                Ok(Attempt::Progress(subs))
            }
            UnifyDecision::Stuck(blockers) => Ok(Attempt::Stuck(blockers)),
            UnifyDecision::Mismatch => Err(TypeError::TypeMismatch {
                span: tracked.ctx.provenance,
                expected: left.clone(),
                actual: right.clone(),
            }),
        }
    }

    fn decide_unify(
        &self,
        norm: &Normalizer<'_>,
        depth: usize,
        left: &Value,
        right: &Value,
    ) -> UnifyDecision {
        match (left, right) {
            (Value::Stuck(Head::Meta(m1), sp1), Value::Stuck(Head::Meta(m2), sp2)) if m1 == m2 => {
                if sp1.len() == sp2.len() {
                    UnifyDecision::Sub(pairwise_spines(norm, depth, sp1, sp2))
                } else {
                    self.stuck_on(norm, left, right)
                }
            }
            // Two distinct metas: alias the younger to the older so the
            // outcome does not depend on solve order, and no cycle can form.
            (Value::Stuck(Head::Meta(m1), sp1), Value::Stuck(Head::Meta(m2), sp2)) => {
                let (meta, spine, other) = if m1 < m2 {
                    (*m2, sp2, left)
                } else {
                    (*m1, sp1, right)
                };
                match self.try_solve_meta(norm, depth, meta, spine, other) {
                    Some(solution) => UnifyDecision::SolveMeta(meta, solution),
                    None => self.stuck_on(norm, left, right),
                }
            }
            (Value::Stuck(Head::Meta(m), spine), other)
            | (other, Value::Stuck(Head::Meta(m), spine)) => {
                match self.try_solve_meta(norm, depth, *m, spine, other) {
                    Some(solution) => UnifyDecision::SolveMeta(*m, solution),
                    None => self.stuck_on(norm, left, right),
                }
            }
            (Value::Universe(a), Value::Universe(b)) => {
                if a == b {
                    UnifyDecision::Solved
                } else {
                    UnifyDecision::Mismatch
                }
            }
            (Value::Lit(a), Value::Lit(b)) => {
                if a == b {
                    UnifyDecision::Solved
                } else {
                    UnifyDecision::Mismatch
                }
            }
            // Evidence dictionaries are irrelevant: any two witnesses of
            // the same obligation are interchangeable.
            (Value::Dict(_), Value::Dict(_)) => UnifyDecision::Solved,
            (Value::Pi(b1, c1), Value::Pi(b2, c2)) => {
                if b1.visibility != b2.visibility {
                    return UnifyDecision::Mismatch;
                }
                let var = Value::bound_var(Lvl(depth));
                let body1 = norm.apply_closure(c1, var.clone());
                let body2 = norm.apply_closure(c2, var);
                UnifyDecision::Sub(vec![
                    (
                        norm.quote(depth, &b1.ty),
                        norm.quote(depth, &b2.ty),
                        depth,
                    ),
                    (
                        norm.quote(depth + 1, &body1),
                        norm.quote(depth + 1, &body2),
                        depth + 1,
                    ),
                ])
            }
            (Value::Lam(_, c1), Value::Lam(_, c2)) => {
                let var = Value::bound_var(Lvl(depth));
                let body1 = norm.apply_closure(c1, var.clone());
                let body2 = norm.apply_closure(c2, var);
                UnifyDecision::Sub(vec![(
                    norm.quote(depth + 1, &body1),
                    norm.quote(depth + 1, &body2),
                    depth + 1,
                )])
            }
            // Eta: a lambda against a neutral value compares bodies under a
            // fresh variable.
            (Value::Lam(_, closure), other @ Value::Stuck(..))
            | (other @ Value::Stuck(..), Value::Lam(_, closure)) => {
                let var = Value::bound_var(Lvl(depth));
                let body = norm.apply_closure(closure, var.clone());
                let applied = norm.apply_value(other.clone(), vec![VArg::explicit(var)]);
                UnifyDecision::Sub(vec![(
                    norm.quote(depth + 1, &body),
                    norm.quote(depth + 1, &applied),
                    depth + 1,
                )])
            }
            (Value::Vec(xs), Value::Vec(ys)) => {
                if xs.len() != ys.len() {
                    return UnifyDecision::Mismatch;
                }
                UnifyDecision::Sub(
                    xs.iter()
                        .zip(ys)
                        .map(|(x, y)| (norm.quote(depth, x), norm.quote(depth, y), depth))
                        .collect(),
                )
            }
            (Value::Stuck(h1, sp1), Value::Stuck(h2, sp2)) => {
                match (h1, h2) {
                    (Head::Free(a), Head::Free(b)) if a == b && sp1.len() == sp2.len() => {
                        UnifyDecision::Sub(pairwise_spines(norm, depth, sp1, sp2))
                    }
                    (Head::Bound(a), Head::Bound(b)) if a == b && sp1.len() == sp2.len() => {
                        UnifyDecision::Sub(pairwise_spines(norm, depth, sp1, sp2))
                    }
                    (Head::Builtin(a), Head::Builtin(b)) if a == b && sp1.len() == sp2.len() => {
                        UnifyDecision::Sub(pairwise_spines(norm, depth, sp1, sp2))
                    }
                    (Head::VecLit(xs), Head::VecLit(ys))
                        if xs.len() == ys.len() && sp1.len() == sp2.len() =>
                    {
                        let mut pairs: Vec<(Term, Term, usize)> = xs
                            .iter()
                            .zip(ys)
                            .map(|(x, y)| (norm.quote(depth, x), norm.quote(depth, y), depth))
                            .collect();
                        pairs.extend(pairwise_spines(norm, depth, sp1, sp2));
                        UnifyDecision::Sub(pairs)
                    }
                    _ => self.rigid_mismatch_or_stuck(norm, left, right),
                }
            }
            _ => self.rigid_mismatch_or_stuck(norm, left, right),
        }
    }

    /// A spine headed by a builtin operator can still change head once its
    /// blocking metas are solved, so a head clash involving one is only a
    /// mismatch when neither side mentions a meta.
    fn rigid_mismatch_or_stuck(
        &self,
        norm: &Normalizer<'_>,
        left: &Value,
        right: &Value,
    ) -> UnifyDecision {
        let mut metas = BTreeSet::new();
        if could_change_head(left) || could_change_head(right) {
            norm.collect_metas(left, &mut metas);
            norm.collect_metas(right, &mut metas);
            if !metas.is_empty() {
                return UnifyDecision::Stuck(metas);
            }
        }
        UnifyDecision::Mismatch
    }

    fn stuck_on(&self, norm: &Normalizer<'_>, left: &Value, right: &Value) -> UnifyDecision {
        let mut metas = BTreeSet::new();
        norm.collect_metas(left, &mut metas);
        norm.collect_metas(right, &mut metas);
        UnifyDecision::Stuck(metas)
    }

    /// Solve `meta` applied to `spine` against `other`. Succeeds only when
    /// the spine is exactly the meta's captured context (the only shape
    /// the checker produces) and the other side stays within that context.
    /// The stored solution is closed: the right-hand side abstracted over
    /// the captured context.
    fn try_solve_meta(
        &self,
        norm: &Normalizer<'_>,
        depth: usize,
        meta: MetaId,
        spine: &[VArg],
        other: &Value,
    ) -> Option<Term> {
        let info = self.metas.info(meta);
        let ctx_len = info.ctx_len;
        if spine.len() != ctx_len || depth < ctx_len {
            return None;
        }
        for (position, arg) in spine.iter().enumerate() {
            match &arg.value {
                Value::Stuck(Head::Bound(Lvl(level)), args)
                    if args.is_empty() && *level == position => {}
                _ => return None,
            }
        }
        let core = norm.quote(depth, other);
        let core = try_strengthen(&core, depth - ctx_len)?;
        // Occurs side condition: a meta may not appear in its own
        // solution. Declining here leaves the constraint permanently
        // stuck, which the final pass reports as unsolved.
        if core.metas().contains(&meta) {
            return None;
        }
        let (binders, _) = info
            .ty
            .peel_pis(ctx_len)
            .unwrap_or_else(|| panic!("meta ?m{} lost its context abstraction", meta.0));
        let mut solution = core;
        for binder in binders.into_iter().rev() {
            solution = Term::lam(binder, solution);
        }
        Some(solution)
    }

    fn attempt_class(
        &mut self,
        evidence: MetaId,
        class_expr: &Term,
        tracked: &TrackedConstraint,
    ) -> Result<Attempt, TypeError> {
        if self.metas.is_solved(evidence) {
            return Ok(Attempt::Solved);
        }
        let decision = {
            let norm = Normalizer::with_decls(self.metas.solutions(), self.decls);
            classes::decide_class(&norm, tracked.ctx.ctx_len, class_expr)
        };
        match decision {
            ClassDecision::Solved { evidence: core } => {
                let solution = self.abstract_over_ctx(evidence, core);
                self.metas.solve(evidence, solution);
                Ok(Attempt::Solved)
            }
            ClassDecision::Decompose {
                evidence: core,
                sub_class,
            } => {
                let (binders, _) = self
                    .metas
                    .info(evidence)
                    .ty
                    .peel_pis(self.metas.info(evidence).ctx_len)
                    .unwrap_or_else(|| panic!("evidence meta ?m{} lost its context", evidence.0));
                let solution = self.abstract_over_ctx(evidence, core);
                self.metas.solve(evidence, solution);
                let (sub_id, _) =
                    self.metas
                        .fresh_meta(&binders, &sub_class, tracked.ctx.provenance);
                let sub = self.metas.make_tracked(
                    Constraint::TypeClass(sub_id, sub_class),
                    tracked.ctx.provenance,
                    tracked.ctx.ctx_len,
                );
                Ok(Attempt::Progress(vec![sub]))
            }
            ClassDecision::Unified {
                evidence: core,
                pairs,
            } => {
                let solution = self.abstract_over_ctx(evidence, core);
                self.metas.solve(evidence, solution);
                let subs = pairs
                    .into_iter()
                    .map(|(a, b)| {
                        self.metas.make_tracked(
                            Constraint::Unify(a, b),
                            tracked.ctx.provenance,
                            tracked.ctx.ctx_len,
                        )
                    })
                    .collect();
                Ok(Attempt::Progress(subs))
            }
            ClassDecision::Stuck(blockers) => Ok(Attempt::Stuck(blockers)),
            ClassDecision::NoInstance { actual } => Err(TypeError::TypeMismatch {
                span: tracked.ctx.provenance,
                expected: class_expr.clone(),
                actual,
            }),
        }
    }

    /// Close an open solution core over the meta's captured context, using
    /// the binders recorded in its Pi type.
    fn abstract_over_ctx(&self, meta: MetaId, core: Term) -> Term {
        let info = self.metas.info(meta);
        let (binders, _) = info
            .ty
            .peel_pis(info.ctx_len)
            .unwrap_or_else(|| panic!("meta ?m{} lost its context abstraction", meta.0));
        let mut solution = core;
        for binder in binders.into_iter().rev() {
            solution = Term::lam(binder, solution);
        }
        solution
    }

    /// Metas transitively linked to the declaration's type: its own metas,
    /// closed under "shares a constraint". Unification constraints always
    /// propagate the relation; type-class constraints propagate it only
    /// when the option says so.
    fn linked_metas(
        &self,
        decl_ty: &Term,
        pending: &[TrackedConstraint],
    ) -> BTreeSet<MetaId> {
        let norm = Normalizer::new(self.metas.solutions());
        let mut linked = norm.zonk(decl_ty).metas();
        let groups: Vec<BTreeSet<MetaId>> = pending
            .iter()
            .filter_map(|tracked| match &tracked.constraint {
                Constraint::Unify(left, right) => {
                    let mut set = norm.zonk(left).metas();
                    set.extend(norm.zonk(right).metas());
                    Some(set)
                }
                Constraint::TypeClass(evidence, class_expr) => {
                    if self.options.link_through_class_constraints {
                        let mut set = norm.zonk(class_expr).metas();
                        set.insert(*evidence);
                        Some(set)
                    } else {
                        None
                    }
                }
            })
            .collect();
        loop {
            let mut changed = false;
            for group in &groups {
                if !group.is_disjoint(&linked) && !group.is_subset(&linked) {
                    linked.extend(group.iter().copied());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        linked
    }

    /// Pick the oldest class obligation that is not linked to the
    /// declaration's type and whose type argument is still undetermined,
    /// and turn it into a unification with the canonical instance.
    fn defaulting_candidate(
        &mut self,
        blocked: &[TrackedConstraint],
        linked: &BTreeSet<MetaId>,
    ) -> Option<TrackedConstraint> {
        let best = {
            let norm = Normalizer::new(self.metas.solutions());
            let mut best: Option<(u64, Term, Span, usize)> = None;
            for tracked in blocked {
                let Constraint::TypeClass(evidence, class_expr) = &tracked.constraint else {
                    continue;
                };
                let zonked = norm.zonk(class_expr);
                let Some((class, args)) = zonked.as_class_app() else {
                    continue;
                };
                let target = match class {
                    TypeClass::AlmostEq => args.get(2),
                    _ => args.first(),
                };
                let Some(target) = target else { continue };
                if target.term.head_meta().is_none() {
                    continue;
                }
                let mut metas = zonked.metas();
                metas.insert(*evidence);
                if !metas.is_disjoint(linked) {
                    continue;
                }
                let better = match &best {
                    Some((id, ..)) => tracked.ctx.id < *id,
                    None => true,
                };
                if better {
                    best = Some((
                        tracked.ctx.id,
                        target.term.clone(),
                        tracked.ctx.provenance,
                        tracked.ctx.ctx_len,
                    ));
                }
            }
            best
        };
        let (_, target, span, ctx_len) = best?;
        // Canonical instance for every defaultable class: the rationals.
        let default_ty = Term::builtin(Builtin::RatType);
        Some(
            self.metas
                .make_tracked(Constraint::Unify(target, default_ty), span, ctx_len),
        )
    }

    fn unsolved_constraints_error(
        &self,
        span: Span,
        constraints: &[TrackedConstraint],
    ) -> TypeError {
        let details = constraints
            .iter()
            .map(|tracked| {
                let zonked = self.zonk_constraint(tracked);
                (tracked.ctx.provenance, zonked.describe())
            })
            .collect();
        TypeError::UnsolvedConstraints { span, details }
    }
}

fn pairwise_spines(
    norm: &Normalizer<'_>,
    depth: usize,
    left: &[VArg],
    right: &[VArg],
) -> Vec<(Term, Term, usize)> {
    left.iter()
        .zip(right)
        .map(|(a, b)| {
            (
                norm.quote(depth, &a.value),
                norm.quote(depth, &b.value),
                depth,
            )
        })
        .collect()
}

/// Whether a value's head could still change as metas get solved: builtin
/// spines re-dispatch after unfolding, and meta heads substitute.
fn could_change_head(value: &Value) -> bool {
    matches!(
        value,
        Value::Stuck(Head::Builtin(_), _) | Value::Stuck(Head::Meta(_), _)
    )
}

/// Turn the class obligations that remained linked to a declaration's type
/// into leading implicit type binders and instance binders, rewriting the
/// declaration's type and body. Returns the rewritten pair plus the metas
/// now bound by the new parameters.
pub(super) fn generalize(
    metas: &MetaContext,
    remaining: &[TrackedConstraint],
    ty: &Term,
    body: Option<&Term>,
) -> Result<(Term, Option<Term>, BTreeSet<MetaId>), TypeError> {
    let norm = Normalizer::new(metas.solutions());
    let ty = norm.zonk(ty);
    let body = body.map(|b| norm.zonk(b));

    let mut obligations: Vec<(MetaId, Term)> = remaining
        .iter()
        .map(|tracked| match &tracked.constraint {
            Constraint::TypeClass(evidence, class_expr) => {
                (*evidence, norm.zonk(class_expr))
            }
            Constraint::Unify(..) => {
                panic!("generalization reached with a pending unification")
            }
        })
        .collect();
    obligations.sort_by_key(|(evidence, _)| evidence.0);
    let evidence_ids: BTreeSet<MetaId> =
        obligations.iter().map(|(evidence, _)| *evidence).collect();

    // Type metas to abstract, in order of first occurrence.
    let mut order: Vec<MetaId> = Vec::new();
    let mut push_occurrences = |term: &Term, order: &mut Vec<MetaId>| {
        for id in occurrence_order(term) {
            if !metas.is_solved(id) && !evidence_ids.contains(&id) && !order.contains(&id) {
                order.push(id);
            }
        }
    };
    push_occurrences(&ty, &mut order);
    for (_, class_expr) in &obligations {
        push_occurrences(class_expr, &mut order);
    }

    for &id in &order {
        let info = metas.info(id);
        if info.ctx_len != 0 || !norm.zonk(&info.ty).metas().is_empty() {
            return Err(TypeError::UnsolvedMetas {
                span: info.span,
                metas: vec![id],
            });
        }
    }
    // A generalizable obligation may not depend on local binders: its
    // class expression becomes a top-level parameter type.
    for (evidence, class_expr) in &obligations {
        if has_free_bounds(class_expr) {
            let span = metas.info(*evidence).span;
            return Err(TypeError::UnsolvedConstraints {
                span,
                details: vec![(span, format!("{class_expr}"))],
            });
        }
    }

    let type_count = order.len();
    let total = type_count + obligations.len();
    let mut positions: HashMap<MetaId, usize> = order
        .iter()
        .enumerate()
        .map(|(position, &id)| (id, position))
        .collect();

    let mut binders: Vec<Binder> = Vec::with_capacity(total);
    let mut letters = (0..).map(generated_name);
    for &id in &order {
        let meta_ty = norm.zonk(&metas.info(id).ty);
        let name = match meta_ty.kind {
            TermKind::Universe(_) => letters.next().expect("name supply"),
            _ => format!("n{}", binders.len() + 1),
        };
        binders.push(Binder {
            name: Some(name),
            visibility: Visibility::Implicit,
            relevance: Relevance::Relevant,
            ty: meta_ty,
        });
    }
    for (index, (evidence, class_expr)) in obligations.iter().enumerate() {
        let depth = type_count + index;
        binders.push(Binder::instance(abstract_metas(class_expr, &positions, depth)));
        positions.insert(*evidence, depth);
    }

    let core_ty = abstract_metas(&ty, &positions, total);
    let mut final_ty = core_ty;
    for binder in binders.iter().rev() {
        final_ty = Term::pi(binder.clone(), final_ty);
    }
    let final_body = body.map(|b| {
        let mut core = abstract_metas(&b, &positions, total);
        for binder in binders.iter().rev() {
            core = Term::lam(binder.clone(), core);
        }
        core
    });

    let mut bound: BTreeSet<MetaId> = order.into_iter().collect();
    bound.extend(evidence_ids);
    Ok((final_ty, final_body, bound))
}

fn has_free_bounds(term: &Term) -> bool {
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

fn generated_name(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{letter}{}", index / 26)
    }
}

/// Unsolved metas of a term in pre-order occurrence order (unlike
/// `Term::metas`, which sorts by id).
fn occurrence_order(term: &Term) -> Vec<MetaId> {
    fn go(term: &Term, out: &mut Vec<MetaId>) {
        match &term.kind {
            TermKind::Meta(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
            TermKind::Universe(_)
            | TermKind::Bound(_)
            | TermKind::Free(_)
            | TermKind::Lit(_)
            | TermKind::Builtin(_)
            | TermKind::Hole(_) => {}
            TermKind::App(head, args) => {
                go(head, out);
                for arg in args {
                    go(&arg.term, out);
                }
            }
            TermKind::Lam(binder, body) | TermKind::Pi(binder, body) => {
                go(&binder.ty, out);
                go(body, out);
            }
            TermKind::Let(bound, binder, body) => {
                go(bound, out);
                go(&binder.ty, out);
                go(body, out);
            }
            TermKind::VecLit(items) => {
                for item in items {
                    go(item, out);
                }
            }
            TermKind::Dict(inner) => go(inner, out),
        }
    }
    let mut out = Vec::new();
    go(term, &mut out);
    out
}

/// Replace generalized metas with references to the new binders. `depth`
/// is the number of new binders enclosing the term's position; `inner`
/// tracks binders crossed inside the term itself. A usage site applies a
/// meta to its captured context; the new binder stands for the closed
/// solution, so the whole application collapses to the bound variable.
fn abstract_metas(term: &Term, positions: &HashMap<MetaId, usize>, depth: usize) -> Term {
    fn go(term: &Term, positions: &HashMap<MetaId, usize>, depth: usize, inner: usize) -> Term {
        let kind = match &term.kind {
            TermKind::Meta(id) => match positions.get(id) {
                Some(&position) => {
                    return Term::bound(depth + inner - 1 - position).with_span(term.span);
                }
                None => term.kind.clone(),
            },
            TermKind::Universe(_)
            | TermKind::Bound(_)
            | TermKind::Free(_)
            | TermKind::Lit(_)
            | TermKind::Builtin(_)
            | TermKind::Hole(_) => term.kind.clone(),
            TermKind::App(head, args) => {
                if let TermKind::Meta(id) = &head.kind {
                    if let Some(&position) = positions.get(id) {
                        return Term::bound(depth + inner - 1 - position).with_span(term.span);
                    }
                }
                TermKind::App(
                    Box::new(go(head, positions, depth, inner)),
                    args.iter()
                        .map(|arg| crate::syntax::Arg {
                            visibility: arg.visibility,
                            term: go(&arg.term, positions, depth, inner),
                        })
                        .collect(),
                )
            }
            TermKind::Lam(binder, body) => TermKind::Lam(
                Box::new(go_binder(binder, positions, depth, inner)),
                Box::new(go(body, positions, depth, inner + 1)),
            ),
            TermKind::Pi(binder, body) => TermKind::Pi(
                Box::new(go_binder(binder, positions, depth, inner)),
                Box::new(go(body, positions, depth, inner + 1)),
            ),
            TermKind::Let(bound, binder, body) => TermKind::Let(
                Box::new(go(bound, positions, depth, inner)),
                Box::new(go_binder(binder, positions, depth, inner)),
                Box::new(go(body, positions, depth, inner + 1)),
            ),
            TermKind::VecLit(items) => TermKind::VecLit(
                items
                    .iter()
                    .map(|item| go(item, positions, depth, inner))
                    .collect(),
            ),
            TermKind::Dict(inner_term) => {
                TermKind::Dict(Box::new(go(inner_term, positions, depth, inner)))
            }
        };
        Term::new(kind, term.span)
    }

    fn go_binder(
        binder: &Binder,
        positions: &HashMap<MetaId, usize>,
        depth: usize,
        inner: usize,
    ) -> Binder {
        Binder {
            name: binder.name.clone(),
            visibility: binder.visibility,
            relevance: binder.relevance,
            ty: go(&binder.ty, positions, depth, inner),
        }
    }

    go(term, positions, depth, 0)
}
