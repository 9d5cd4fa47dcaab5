use std::collections::BTreeSet;

use num_bigint::BigInt;
use num_rational::BigRational;

use crate::diagnostics::Span;

mod display;
mod subst;
#[cfg(test)]
mod tests;

pub use subst::{lift, lift_from, open, open_at, try_strengthen};

/// Identifier of a meta-variable. Allocated by the meta-context, solved at
/// most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetaId(pub u32);

/// De Bruijn index: counts binders outward from the use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ix(pub usize);

/// De Bruijn level: counts binders inward from the top of the context.
/// Levels appear only in evaluated `Value`s, never in stored terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lvl(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Explicit,
    Implicit,
    Instance,
}

/// Erasure marker. Instance evidence is irrelevant: it steers elaboration
/// but carries no runtime information, so backends may drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relevance {
    Relevant,
    Irrelevant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Bool(bool),
    Nat(BigInt),
    Int(BigInt),
    Rat(BigRational),
    /// An index literal together with the bound it lives under.
    Index(u64, u64),
}

/// Compile-time overloading classes. Instances are synthesized by the
/// solver rather than chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    HasEq,
    HasOrd,
    HasAdd,
    HasSub,
    HasMul,
    HasDiv,
    HasNeg,
    HasNatLits,
    HasRatLits,
    /// Obligation that every element type of a vector literal agrees with
    /// the literal's element type, deferred so that the concrete type is a
    /// solver decision.
    AlmostEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    // Type formers.
    BoolType,
    NatType,
    IntType,
    RatType,
    VectorType,
    IndexType,
    // Boolean connectives.
    Not,
    And,
    Or,
    Implies,
    If,
    // Overloaded comparisons.
    Eq,
    Neq,
    Leq,
    Lt,
    Geq,
    Gt,
    // Overloaded arithmetic.
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    // Vector operations.
    At,
    Map,
    Fold,
    // Property quantifiers. These never reduce; backends interpret them.
    Forall,
    Exists,
    // Literal coercion, guarded by instance evidence.
    FromNat,
    FromRat,
    Class(TypeClass),
}

#[derive(Debug, Clone)]
pub struct Binder {
    pub name: Option<String>,
    pub visibility: Visibility,
    pub relevance: Relevance,
    pub ty: Term,
}

impl Binder {
    pub fn explicit(name: impl Into<Option<String>>, ty: Term) -> Self {
        Binder {
            name: name.into(),
            visibility: Visibility::Explicit,
            relevance: Relevance::Relevant,
            ty,
        }
    }

    pub fn implicit(name: impl Into<Option<String>>, ty: Term) -> Self {
        Binder {
            name: name.into(),
            visibility: Visibility::Implicit,
            relevance: Relevance::Relevant,
            ty,
        }
    }

    pub fn instance(ty: Term) -> Self {
        Binder {
            name: None,
            visibility: Visibility::Instance,
            relevance: Relevance::Irrelevant,
            ty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Arg {
    pub visibility: Visibility,
    pub term: Term,
}

impl Arg {
    pub fn explicit(term: Term) -> Self {
        Arg {
            visibility: Visibility::Explicit,
            term,
        }
    }

    pub fn implicit(term: Term) -> Self {
        Arg {
            visibility: Visibility::Implicit,
            term,
        }
    }

    pub fn instance(term: Term) -> Self {
        Arg {
            visibility: Visibility::Instance,
            term,
        }
    }
}

/// A term of the internal language. Spans record where the term came from;
/// they are ignored by [`alpha_eq`] and by the solver.
#[derive(Debug, Clone)]
pub struct Term {
    pub kind: TermKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum TermKind {
    Universe(u32),
    Bound(Ix),
    Free(String),
    Lit(Literal),
    Builtin(Builtin),
    App(Box<Term>, Vec<Arg>),
    Lam(Box<Binder>, Box<Term>),
    Pi(Box<Binder>, Box<Term>),
    Let(Box<Term>, Box<Binder>, Box<Term>),
    /// A user hole. Checked terms contain no holes: checking replaces each
    /// one with a fresh meta applied to the ambient context.
    Hole(String),
    Meta(MetaId),
    VecLit(Vec<Term>),
    /// Instance evidence produced by the solver, wrapping the class
    /// application it witnesses.
    Dict(Box<Term>),
}

impl Term {
    pub fn new(kind: TermKind, span: Span) -> Self {
        Term { kind, span }
    }

    pub fn universe(level: u32) -> Self {
        Term::new(TermKind::Universe(level), Span::default())
    }

    pub fn bound(index: usize) -> Self {
        Term::new(TermKind::Bound(Ix(index)), Span::default())
    }

    pub fn free(name: impl Into<String>) -> Self {
        Term::new(TermKind::Free(name.into()), Span::default())
    }

    pub fn lit(literal: Literal) -> Self {
        Term::new(TermKind::Lit(literal), Span::default())
    }

    pub fn nat(value: u64) -> Self {
        Term::lit(Literal::Nat(BigInt::from(value)))
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Term::new(TermKind::Builtin(builtin), Span::default())
    }

    pub fn meta(id: MetaId) -> Self {
        Term::new(TermKind::Meta(id), Span::default())
    }

    pub fn hole(name: impl Into<String>) -> Self {
        Term::new(TermKind::Hole(name.into()), Span::default())
    }

    /// Build an application, flattening a nested application head so spines
    /// stay in canonical form.
    pub fn app(fun: Term, args: Vec<Arg>) -> Self {
        if args.is_empty() {
            return fun;
        }
        let span = fun.span;
        match fun.kind {
            TermKind::App(head, mut prior) => {
                prior.extend(args);
                Term::new(TermKind::App(head, prior), span)
            }
            _ => Term::new(TermKind::App(Box::new(fun), args), span),
        }
    }

    pub fn lam(binder: Binder, body: Term) -> Self {
        Term::new(TermKind::Lam(Box::new(binder), Box::new(body)), Span::default())
    }

    pub fn pi(binder: Binder, body: Term) -> Self {
        Term::new(TermKind::Pi(Box::new(binder), Box::new(body)), Span::default())
    }

    pub fn let_in(bound: Term, binder: Binder, body: Term) -> Self {
        Term::new(
            TermKind::Let(Box::new(bound), Box::new(binder), Box::new(body)),
            Span::default(),
        )
    }

    pub fn vec_lit(items: Vec<Term>) -> Self {
        Term::new(TermKind::VecLit(items), Span::default())
    }

    pub fn dict(class_expr: Term) -> Self {
        Term::new(TermKind::Dict(Box::new(class_expr)), Span::default())
    }

    pub fn class_app(class: TypeClass, args: Vec<Arg>) -> Self {
        Term::app(Term::builtin(Builtin::Class(class)), args)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// View the term as a head and argument spine. Non-applications are
    /// their own head with an empty spine.
    pub fn spine(&self) -> (&Term, &[Arg]) {
        match &self.kind {
            TermKind::App(head, args) => (head, args),
            _ => (self, &[]),
        }
    }

    pub fn as_pi(&self) -> Option<(&Binder, &Term)> {
        match &self.kind {
            TermKind::Pi(binder, body) => Some((binder, body)),
            _ => None,
        }
    }

    /// Split off the first `count` Pi binders. `None` if the term has fewer.
    pub fn peel_pis(&self, count: usize) -> Option<(Vec<Binder>, &Term)> {
        let mut binders = Vec::with_capacity(count);
        let mut rest = self;
        for _ in 0..count {
            let (binder, body) = rest.as_pi()?;
            binders.push(binder.clone());
            rest = body;
        }
        Some((binders, rest))
    }

    /// The meta heading this term's spine, if any.
    pub fn head_meta(&self) -> Option<MetaId> {
        let (head, _) = self.spine();
        match head.kind {
            TermKind::Meta(id) => Some(id),
            _ => None,
        }
    }

    /// Shape check for a class application: a spine headed by a class
    /// builtin. Returns the class and its arguments.
    pub fn as_class_app(&self) -> Option<(TypeClass, &[Arg])> {
        let (head, args) = self.spine();
        match head.kind {
            TermKind::Builtin(Builtin::Class(class)) => Some((class, args)),
            _ => None,
        }
    }

    /// Shape check for `Vector A n`.
    pub fn as_vector_app(&self) -> Option<(&Term, &Term)> {
        let (head, args) = self.spine();
        match head.kind {
            TermKind::Builtin(Builtin::VectorType) if args.len() == 2 => {
                Some((&args[0].term, &args[1].term))
            }
            _ => None,
        }
    }

    pub fn contains_hole(&self) -> bool {
        let mut found = false;
        self.walk(&mut |term| {
            if matches!(term.kind, TermKind::Hole(_)) {
                found = true;
            }
        });
        found
    }

    pub fn metas(&self) -> BTreeSet<MetaId> {
        let mut out = BTreeSet::new();
        self.walk(&mut |term| {
            if let TermKind::Meta(id) = term.kind {
                out.insert(id);
            }
        });
        out
    }

    fn walk(&self, visit: &mut impl FnMut(&Term)) {
        visit(self);
        match &self.kind {
            TermKind::Universe(_)
            | TermKind::Bound(_)
            | TermKind::Free(_)
            | TermKind::Lit(_)
            | TermKind::Builtin(_)
            | TermKind::Hole(_)
            | TermKind::Meta(_) => {}
            TermKind::App(head, args) => {
                head.walk(visit);
                for arg in args {
                    arg.term.walk(visit);
                }
            }
            TermKind::Lam(binder, body) | TermKind::Pi(binder, body) => {
                binder.ty.walk(visit);
                body.walk(visit);
            }
            TermKind::Let(bound, binder, body) => {
                bound.walk(visit);
                binder.ty.walk(visit);
                body.walk(visit);
            }
            TermKind::VecLit(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            TermKind::Dict(inner) => inner.walk(visit),
        }
    }
}

/// Alpha-equivalence: structural equality that ignores spans and binder
/// names. Binder visibility, relevance and types still count.
pub fn alpha_eq(left: &Term, right: &Term) -> bool {
    fn binder_eq(left: &Binder, right: &Binder) -> bool {
        left.visibility == right.visibility
            && left.relevance == right.relevance
            && alpha_eq(&left.ty, &right.ty)
    }

    match (&left.kind, &right.kind) {
        (TermKind::Universe(a), TermKind::Universe(b)) => a == b,
        (TermKind::Bound(a), TermKind::Bound(b)) => a == b,
        (TermKind::Free(a), TermKind::Free(b)) => a == b,
        (TermKind::Lit(a), TermKind::Lit(b)) => a == b,
        (TermKind::Builtin(a), TermKind::Builtin(b)) => a == b,
        (TermKind::Hole(a), TermKind::Hole(b)) => a == b,
        (TermKind::Meta(a), TermKind::Meta(b)) => a == b,
        (TermKind::App(f, xs), TermKind::App(g, ys)) => {
            alpha_eq(f, g)
                && xs.len() == ys.len()
                && xs.iter().zip(ys).all(|(x, y)| {
                    x.visibility == y.visibility && alpha_eq(&x.term, &y.term)
                })
        }
        (TermKind::Lam(b1, e1), TermKind::Lam(b2, e2))
        | (TermKind::Pi(b1, e1), TermKind::Pi(b2, e2)) => binder_eq(b1, b2) && alpha_eq(e1, e2),
        (TermKind::Let(v1, b1, e1), TermKind::Let(v2, b2, e2)) => {
            alpha_eq(v1, v2) && binder_eq(b1, b2) && alpha_eq(e1, e2)
        }
        (TermKind::VecLit(xs), TermKind::VecLit(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| alpha_eq(x, y))
        }
        (TermKind::Dict(a), TermKind::Dict(b)) => alpha_eq(a, b),
        _ => false,
    }
}

impl TypeClass {
    pub fn name(self) -> &'static str {
        match self {
            TypeClass::HasEq => "HasEq",
            TypeClass::HasOrd => "HasOrd",
            TypeClass::HasAdd => "HasAdd",
            TypeClass::HasSub => "HasSub",
            TypeClass::HasMul => "HasMul",
            TypeClass::HasDiv => "HasDiv",
            TypeClass::HasNeg => "HasNeg",
            TypeClass::HasNatLits => "HasNatLits",
            TypeClass::HasRatLits => "HasRatLits",
            TypeClass::AlmostEq => "AlmostEq",
        }
    }
}

impl Builtin {
    /// Number of arguments a builtin spine needs before its evaluation rule
    /// fires. `None` for heads that never reduce (type formers, classes,
    /// quantifiers).
    pub fn eval_arity(self) -> Option<usize> {
        match self {
            Builtin::Not => Some(1),
            Builtin::And | Builtin::Or | Builtin::Implies => Some(2),
            Builtin::If => Some(4),
            Builtin::Eq
            | Builtin::Neq
            | Builtin::Leq
            | Builtin::Lt
            | Builtin::Geq
            | Builtin::Gt
            | Builtin::Add
            | Builtin::Sub
            | Builtin::Mul
            | Builtin::Div => Some(4),
            Builtin::Neg => Some(3),
            Builtin::At => Some(4),
            Builtin::Map => Some(5),
            Builtin::Fold => Some(6),
            Builtin::FromNat | Builtin::FromRat => Some(3),
            Builtin::BoolType
            | Builtin::NatType
            | Builtin::IntType
            | Builtin::RatType
            | Builtin::VectorType
            | Builtin::IndexType
            | Builtin::Forall
            | Builtin::Exists
            | Builtin::Class(_) => None,
        }
    }

    /// The closed Pi-type of the builtin.
    pub fn ty(self) -> Term {
        let ty0 = Term::universe(0);
        let bool_ty = Term::builtin(Builtin::BoolType);
        let nat_ty = Term::builtin(Builtin::NatType);
        let rat_ty = Term::builtin(Builtin::RatType);

        match self {
            Builtin::BoolType
            | Builtin::NatType
            | Builtin::IntType
            | Builtin::RatType => ty0,
            Builtin::VectorType => arrow(ty0.clone(), arrow(nat_ty, ty0)),
            Builtin::IndexType => arrow(nat_ty, ty0),

            Builtin::Not => arrow(bool_ty.clone(), bool_ty),
            Builtin::And | Builtin::Or | Builtin::Implies => {
                arrow(bool_ty.clone(), arrow(bool_ty.clone(), bool_ty))
            }
            Builtin::If => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0),
                arrow(
                    bool_ty,
                    arrow(Term::bound(1), arrow(Term::bound(2), Term::bound(3))),
                ),
            ),

            Builtin::Eq | Builtin::Neq => overloaded_binary(TypeClass::HasEq, bool_ty),
            Builtin::Leq | Builtin::Lt | Builtin::Geq | Builtin::Gt => {
                overloaded_binary(TypeClass::HasOrd, bool_ty)
            }
            Builtin::Add => overloaded_binary(TypeClass::HasAdd, Term::bound(3)),
            Builtin::Sub => overloaded_binary(TypeClass::HasSub, Term::bound(3)),
            Builtin::Mul => overloaded_binary(TypeClass::HasMul, Term::bound(3)),
            Builtin::Div => overloaded_binary(TypeClass::HasDiv, Term::bound(3)),
            Builtin::Neg => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0),
                Term::pi(
                    Binder::instance(Term::class_app(
                        TypeClass::HasNeg,
                        vec![Arg::explicit(Term::bound(0))],
                    )),
                    arrow(Term::bound(1), Term::bound(2)),
                ),
            ),

            // forall {A} {n}. Vector A n -> Index n -> A
            Builtin::At => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0),
                Term::pi(
                    Binder::implicit(Some("n".to_string()), nat_ty),
                    arrow(
                        vector_of(Term::bound(1), Term::bound(0)),
                        arrow(index_of(Term::bound(1)), Term::bound(3)),
                    ),
                ),
            ),
            // forall {A} {B} {n}. (A -> B) -> Vector A n -> Vector B n
            Builtin::Map => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0.clone()),
                Term::pi(
                    Binder::implicit(Some("B".to_string()), ty0),
                    Term::pi(
                        Binder::implicit(Some("n".to_string()), nat_ty),
                        arrow(
                            arrow(Term::bound(2), Term::bound(2)),
                            arrow(
                                vector_of(Term::bound(3), Term::bound(1)),
                                vector_of(Term::bound(3), Term::bound(2)),
                            ),
                        ),
                    ),
                ),
            ),
            // forall {A} {B} {n}. (A -> B -> B) -> B -> Vector A n -> B
            Builtin::Fold => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0.clone()),
                Term::pi(
                    Binder::implicit(Some("B".to_string()), ty0),
                    Term::pi(
                        Binder::implicit(Some("n".to_string()), nat_ty),
                        arrow(
                            arrow(Term::bound(2), arrow(Term::bound(2), Term::bound(3))),
                            arrow(
                                Term::bound(2),
                                arrow(vector_of(Term::bound(4), Term::bound(2)), Term::bound(4)),
                            ),
                        ),
                    ),
                ),
            ),

            // forall {A}. (A -> Bool) -> Bool
            Builtin::Forall | Builtin::Exists => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0),
                arrow(arrow(Term::bound(0), bool_ty.clone()), bool_ty),
            ),

            // forall {A}. {{HasNatLits A}} -> Nat -> A
            Builtin::FromNat => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0),
                Term::pi(
                    Binder::instance(Term::class_app(
                        TypeClass::HasNatLits,
                        vec![Arg::explicit(Term::bound(0))],
                    )),
                    arrow(nat_ty, Term::bound(2)),
                ),
            ),
            Builtin::FromRat => Term::pi(
                Binder::implicit(Some("A".to_string()), ty0),
                Term::pi(
                    Binder::instance(Term::class_app(
                        TypeClass::HasRatLits,
                        vec![Arg::explicit(Term::bound(0))],
                    )),
                    arrow(rat_ty, Term::bound(2)),
                ),
            ),

            // AlmostEq is applied to a length, a vector of element types and
            // the candidate element type.
            Builtin::Class(TypeClass::AlmostEq) => Term::pi(
                Binder::explicit(Some("n".to_string()), nat_ty),
                arrow(
                    vector_of(ty0.clone(), Term::bound(0)),
                    arrow(ty0.clone(), ty0),
                ),
            ),
            Builtin::Class(_) => arrow(ty0.clone(), ty0),
        }
    }
}

/// `A -> B` with an anonymous explicit binder.
fn arrow(dom: Term, cod: Term) -> Term {
    Term::pi(Binder::explicit(None, dom), cod)
}

/// forall {A}. {{C A}} -> A -> A -> R, the shape shared by the overloaded
/// binary operators. `result` sees the type variable at index 3.
fn overloaded_binary(class: TypeClass, result: Term) -> Term {
    Term::pi(
        Binder::implicit(Some("A".to_string()), Term::universe(0)),
        Term::pi(
            Binder::instance(Term::class_app(class, vec![Arg::explicit(Term::bound(0))])),
            arrow(Term::bound(1), arrow(Term::bound(2), result)),
        ),
    )
}

/// `Vector elem len`.
pub fn vector_of(elem: Term, len: Term) -> Term {
    Term::app(
        Term::builtin(Builtin::VectorType),
        vec![Arg::explicit(elem), Arg::explicit(len)],
    )
}

/// `Index bound`.
pub fn index_of(bound: Term) -> Term {
    Term::app(Term::builtin(Builtin::IndexType), vec![Arg::explicit(bound)])
}
