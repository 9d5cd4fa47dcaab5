use std::collections::BTreeSet;

use crate::diagnostics::Span;
use crate::syntax::{MetaId, Term};

/// A deferred obligation. `Unify` equates two terms; `TypeClass` demands
/// evidence for a class application and names the meta that will hold it.
#[derive(Debug, Clone)]
pub enum Constraint {
    Unify(Term, Term),
    TypeClass(MetaId, Term),
}

#[derive(Debug, Clone)]
pub struct ConstraintCtx {
    /// Creation order, used to make defaulting deterministic.
    pub id: u64,
    pub provenance: Span,
    /// Metas this constraint is stuck on. A constraint with a non-empty
    /// set is only retried after one of them is solved.
    pub blocked_by: BTreeSet<MetaId>,
    /// Length of the bound context the constraint's terms live under.
    pub ctx_len: usize,
    /// Whether the solver has tried this constraint at least once. A fresh
    /// constraint is always eligible; an attempted one waits for its
    /// blockers.
    pub attempted: bool,
}

#[derive(Debug, Clone)]
pub struct TrackedConstraint {
    pub constraint: Constraint,
    pub ctx: ConstraintCtx,
}

impl TrackedConstraint {
    /// Metas mentioned by the constraint, including a class constraint's
    /// evidence slot.
    pub fn metas(&self) -> BTreeSet<MetaId> {
        match &self.constraint {
            Constraint::Unify(left, right) => {
                let mut out = left.metas();
                out.extend(right.metas());
                out
            }
            Constraint::TypeClass(evidence, class_expr) => {
                let mut out = class_expr.metas();
                out.insert(*evidence);
                out
            }
        }
    }

    pub fn describe(&self) -> String {
        match &self.constraint {
            Constraint::Unify(left, right) => format!("{left} ~ {right}"),
            Constraint::TypeClass(_, class_expr) => format!("{class_expr}"),
        }
    }
}
