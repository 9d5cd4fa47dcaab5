use super::{Arg, Binder, Ix, Term, TermKind};

/// Shift every bound variable pointing past `cutoff` binders by `amount`.
pub fn lift_from(term: &Term, cutoff: usize, amount: usize) -> Term {
    if amount == 0 {
        return term.clone();
    }
    let kind = match &term.kind {
        TermKind::Bound(Ix(index)) => {
            if *index >= cutoff {
                TermKind::Bound(Ix(index + amount))
            } else {
                TermKind::Bound(Ix(*index))
            }
        }
        TermKind::Universe(_)
        | TermKind::Free(_)
        | TermKind::Lit(_)
        | TermKind::Builtin(_)
        | TermKind::Hole(_)
        | TermKind::Meta(_) => term.kind.clone(),
        TermKind::App(head, args) => TermKind::App(
            Box::new(lift_from(head, cutoff, amount)),
            args.iter()
                .map(|arg| Arg {
                    visibility: arg.visibility,
                    term: lift_from(&arg.term, cutoff, amount),
                })
                .collect(),
        ),
        TermKind::Lam(binder, body) => TermKind::Lam(
            Box::new(lift_binder(binder, cutoff, amount)),
            Box::new(lift_from(body, cutoff + 1, amount)),
        ),
        TermKind::Pi(binder, body) => TermKind::Pi(
            Box::new(lift_binder(binder, cutoff, amount)),
            Box::new(lift_from(body, cutoff + 1, amount)),
        ),
        TermKind::Let(bound, binder, body) => TermKind::Let(
            Box::new(lift_from(bound, cutoff, amount)),
            Box::new(lift_binder(binder, cutoff, amount)),
            Box::new(lift_from(body, cutoff + 1, amount)),
        ),
        TermKind::VecLit(items) => TermKind::VecLit(
            items
                .iter()
                .map(|item| lift_from(item, cutoff, amount))
                .collect(),
        ),
        TermKind::Dict(inner) => TermKind::Dict(Box::new(lift_from(inner, cutoff, amount))),
    };
    Term::new(kind, term.span)
}

pub fn lift(term: &Term, amount: usize) -> Term {
    lift_from(term, 0, amount)
}

fn lift_binder(binder: &Binder, cutoff: usize, amount: usize) -> Binder {
    Binder {
        name: binder.name.clone(),
        visibility: binder.visibility,
        relevance: binder.relevance,
        ty: lift_from(&binder.ty, cutoff, amount),
    }
}

/// Substitute `arg` for the variable bound `depth` binders above the term,
/// closing that binder: indices above it shift down by one.
pub fn open_at(term: &Term, depth: usize, arg: &Term) -> Term {
    let kind = match &term.kind {
        TermKind::Bound(Ix(index)) => {
            if *index == depth {
                return lift(arg, depth).with_span(term.span);
            } else if *index > depth {
                TermKind::Bound(Ix(index - 1))
            } else {
                TermKind::Bound(Ix(*index))
            }
        }
        TermKind::Universe(_)
        | TermKind::Free(_)
        | TermKind::Lit(_)
        | TermKind::Builtin(_)
        | TermKind::Hole(_)
        | TermKind::Meta(_) => term.kind.clone(),
        TermKind::App(head, args) => TermKind::App(
            Box::new(open_at(head, depth, arg)),
            args.iter()
                .map(|a| Arg {
                    visibility: a.visibility,
                    term: open_at(&a.term, depth, arg),
                })
                .collect(),
        ),
        TermKind::Lam(binder, body) => TermKind::Lam(
            Box::new(open_binder(binder, depth, arg)),
            Box::new(open_at(body, depth + 1, arg)),
        ),
        TermKind::Pi(binder, body) => TermKind::Pi(
            Box::new(open_binder(binder, depth, arg)),
            Box::new(open_at(body, depth + 1, arg)),
        ),
        TermKind::Let(bound, binder, body) => TermKind::Let(
            Box::new(open_at(bound, depth, arg)),
            Box::new(open_binder(binder, depth, arg)),
            Box::new(open_at(body, depth + 1, arg)),
        ),
        TermKind::VecLit(items) => TermKind::VecLit(
            items.iter().map(|item| open_at(item, depth, arg)).collect(),
        ),
        TermKind::Dict(inner) => TermKind::Dict(Box::new(open_at(inner, depth, arg))),
    };
    Term::new(kind, term.span)
}

/// Substitute `arg` for the innermost bound variable.
pub fn open(body: &Term, arg: &Term) -> Term {
    open_at(body, 0, arg)
}

/// Shift every free variable down by `by` binders, discarding the
/// innermost `by` entries of the ambient context. Fails with `None` when
/// the term actually mentions one of the discarded variables. Used when a
/// meta solution formed under an extended context must be closed over only
/// the meta's own captured context.
pub fn try_strengthen(term: &Term, by: usize) -> Option<Term> {
    fn go(term: &Term, depth: usize, by: usize) -> Option<Term> {
        let kind = match &term.kind {
            TermKind::Bound(Ix(index)) => {
                if *index < depth {
                    TermKind::Bound(Ix(*index))
                } else if index - depth >= by {
                    TermKind::Bound(Ix(index - by))
                } else {
                    return None;
                }
            }
            TermKind::Universe(_)
            | TermKind::Free(_)
            | TermKind::Lit(_)
            | TermKind::Builtin(_)
            | TermKind::Hole(_)
            | TermKind::Meta(_) => term.kind.clone(),
            TermKind::App(head, args) => TermKind::App(
                Box::new(go(head, depth, by)?),
                args.iter()
                    .map(|arg| {
                        Some(Arg {
                            visibility: arg.visibility,
                            term: go(&arg.term, depth, by)?,
                        })
                    })
                    .collect::<Option<Vec<_>>>()?,
            ),
            TermKind::Lam(binder, body) => TermKind::Lam(
                Box::new(go_binder(binder, depth, by)?),
                Box::new(go(body, depth + 1, by)?),
            ),
            TermKind::Pi(binder, body) => TermKind::Pi(
                Box::new(go_binder(binder, depth, by)?),
                Box::new(go(body, depth + 1, by)?),
            ),
            TermKind::Let(bound, binder, body) => TermKind::Let(
                Box::new(go(bound, depth, by)?),
                Box::new(go_binder(binder, depth, by)?),
                Box::new(go(body, depth + 1, by)?),
            ),
            TermKind::VecLit(items) => TermKind::VecLit(
                items
                    .iter()
                    .map(|item| go(item, depth, by))
                    .collect::<Option<Vec<_>>>()?,
            ),
            TermKind::Dict(inner) => TermKind::Dict(Box::new(go(inner, depth, by)?)),
        };
        Some(Term::new(kind, term.span))
    }

    fn go_binder(binder: &Binder, depth: usize, by: usize) -> Option<Binder> {
        Some(Binder {
            name: binder.name.clone(),
            visibility: binder.visibility,
            relevance: binder.relevance,
            ty: go(&binder.ty, depth, by)?,
        })
    }

    if by == 0 {
        return Some(term.clone());
    }
    go(term, 0, by)
}

fn open_binder(binder: &Binder, depth: usize, arg: &Term) -> Binder {
    Binder {
        name: binder.name.clone(),
        visibility: binder.visibility,
        relevance: binder.relevance,
        ty: open_at(&binder.ty, depth, arg),
    }
}
