use std::collections::{BTreeSet, HashMap};

use crate::diagnostics::Span;
use crate::syntax::{Arg, Binder, MetaId, Term};

use super::constraint::{Constraint, ConstraintCtx, TrackedConstraint};

#[derive(Debug, Clone)]
pub struct MetaInfo {
    /// Expected type of the meta, abstracted into a Pi over the bound
    /// context captured at creation time. Solutions are closed terms of
    /// this type; the captured arguments are re-applied at the usage site.
    pub ty: Term,
    pub ctx_len: usize,
    pub span: Span,
}

/// The single mutable state handle of a compilation: fresh meta-variables,
/// the current solution substitution, and the pending constraint pool. One
/// instance is created per checked program and discarded at the end.
#[derive(Debug, Default)]
pub struct MetaContext {
    metas: Vec<MetaInfo>,
    solutions: HashMap<MetaId, Term>,
    constraints: Vec<TrackedConstraint>,
    recently_solved: BTreeSet<MetaId>,
    next_constraint_id: u64,
}

impl MetaContext {
    pub fn new() -> Self {
        MetaContext::default()
    }

    /// Allocate a fresh meta of type `ty` under the given bound context.
    /// Returns the id together with the usage-site form: the meta applied
    /// to every variable of the context, outermost first, so the usage
    /// carries full context while the stored solution stays closed.
    pub fn fresh_meta(&mut self, ctx: &[Binder], ty: &Term, span: Span) -> (MetaId, Term) {
        let mut abstracted = ty.clone();
        for binder in ctx.iter().rev() {
            abstracted = Term::pi(binder.clone(), abstracted);
        }
        let id = MetaId(self.metas.len() as u32);
        self.metas.push(MetaInfo {
            ty: abstracted,
            ctx_len: ctx.len(),
            span,
        });
        let args = ctx
            .iter()
            .enumerate()
            .map(|(position, binder)| Arg {
                visibility: binder.visibility,
                term: Term::bound(ctx.len() - 1 - position),
            })
            .collect();
        let usage = Term::app(Term::meta(id), args).with_span(span);
        (id, usage)
    }

    pub fn info(&self, id: MetaId) -> &MetaInfo {
        &self.metas[id.0 as usize]
    }

    pub fn meta_count(&self) -> usize {
        self.metas.len()
    }

    pub fn solutions(&self) -> &HashMap<MetaId, Term> {
        &self.solutions
    }

    pub fn is_solved(&self, id: MetaId) -> bool {
        self.solutions.contains_key(&id)
    }

    /// Record a solution. A meta is solved exactly once; a second solution
    /// is a bug in the solver, not a user error.
    pub fn solve(&mut self, id: MetaId, solution: Term) {
        if self.solutions.insert(id, solution).is_some() {
            panic!("meta ?m{} solved twice", id.0);
        }
        self.recently_solved.insert(id);
    }

    /// Metas solved since the last call. The solver uses this to decide
    /// which blocked constraints become retryable.
    pub fn drain_recently_solved(&mut self) -> BTreeSet<MetaId> {
        std::mem::take(&mut self.recently_solved)
    }

    /// Wrap a constraint with a fresh id and an empty blocker set, without
    /// adding it to the pool. The solver uses this for sub-constraints it
    /// feeds into the next pass directly.
    pub fn make_tracked(
        &mut self,
        constraint: Constraint,
        span: Span,
        ctx_len: usize,
    ) -> TrackedConstraint {
        let id = self.next_constraint_id;
        self.next_constraint_id += 1;
        TrackedConstraint {
            constraint,
            ctx: ConstraintCtx {
                id,
                provenance: span,
                blocked_by: BTreeSet::new(),
                ctx_len,
                attempted: false,
            },
        }
    }

    pub fn add_constraint(&mut self, constraint: Constraint, span: Span, ctx_len: usize) {
        let tracked = self.make_tracked(constraint, span, ctx_len);
        self.constraints.push(tracked);
    }

    pub fn push_tracked(&mut self, tracked: TrackedConstraint) {
        self.constraints.push(tracked);
    }

    pub fn put_back(&mut self, tracked: Vec<TrackedConstraint>) {
        self.constraints.extend(tracked);
    }

    pub fn take_constraints(&mut self) -> Vec<TrackedConstraint> {
        std::mem::take(&mut self.constraints)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn unsolved_metas(&self) -> Vec<MetaId> {
        (0..self.metas.len() as u32)
            .map(MetaId)
            .filter(|id| !self.solutions.contains_key(id))
            .collect()
    }
}
