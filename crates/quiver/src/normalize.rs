//! Normalization by evaluation. Terms evaluate to weak-head values whose
//! sub-terms live in closures; the checker and solver compare and decompose
//! types through these values, and `quote` reads them back into terms.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use im::Vector as ImVector;

use crate::syntax::{
    Arg, Binder, Builtin, Ix, Literal, Lvl, MetaId, Relevance, Term, TermKind, TypeClass,
    Visibility,
};
use crate::typecheck::DeclContext;

mod builtins;
#[cfg(test)]
mod tests;

/// Evaluation environment: one value per enclosing binder, outermost first.
pub type Env = ImVector<Value>;

#[derive(Debug, Clone)]
pub enum Value {
    Universe(u32),
    Lit(Literal),
    Pi(Box<VBinder>, Closure),
    Lam(Box<VBinder>, Closure),
    Vec(Vec<Value>),
    Dict(Box<Value>),
    /// A neutral spine: a head that cannot reduce (yet) plus the arguments
    /// applied to it.
    Stuck(Head, Vec<VArg>),
}

#[derive(Debug, Clone)]
pub enum Head {
    Meta(MetaId),
    Free(String),
    Bound(Lvl),
    Builtin(Builtin),
    /// A vector literal in head position stays stuck when applied.
    VecLit(Vec<Value>),
}

#[derive(Debug, Clone)]
pub struct VArg {
    pub visibility: Visibility,
    pub value: Value,
}

impl VArg {
    pub fn explicit(value: Value) -> Self {
        VArg {
            visibility: Visibility::Explicit,
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VBinder {
    pub name: Option<String>,
    pub visibility: Visibility,
    pub relevance: Relevance,
    pub ty: Value,
}

/// A suspended body together with the environment it was formed in.
#[derive(Debug, Clone)]
pub struct Closure {
    pub env: Env,
    pub body: Arc<Term>,
}

impl Value {
    pub fn bound_var(level: Lvl) -> Value {
        Value::Stuck(Head::Bound(level), Vec::new())
    }

    pub fn meta(id: MetaId) -> Value {
        Value::Stuck(Head::Meta(id), Vec::new())
    }

    pub fn builtin(builtin: Builtin) -> Value {
        Value::Stuck(Head::Builtin(builtin), Vec::new())
    }

    /// Shape check for a class application value.
    pub fn as_class_app(&self) -> Option<(TypeClass, &[VArg])> {
        match self {
            Value::Stuck(Head::Builtin(Builtin::Class(class)), args) => Some((*class, args)),
            _ => None,
        }
    }

    /// Shape check for `Vector A n`.
    pub fn as_vector_app(&self) -> Option<(&Value, &Value)> {
        match self {
            Value::Stuck(Head::Builtin(Builtin::VectorType), args) if args.len() == 2 => {
                Some((&args[0].value, &args[1].value))
            }
            _ => None,
        }
    }

    /// The meta this value is stuck on, if its head is an unapplied or
    /// applied meta-variable.
    pub fn head_meta(&self) -> Option<MetaId> {
        match self {
            Value::Stuck(Head::Meta(id), _) => Some(*id),
            _ => None,
        }
    }
}

pub struct Normalizer<'a> {
    solutions: &'a HashMap<MetaId, Term>,
    decls: Option<&'a DeclContext>,
}

impl<'a> Normalizer<'a> {
    /// A normalizer that substitutes meta solutions but leaves free
    /// variables opaque. Used for final readback.
    pub fn new(solutions: &'a HashMap<MetaId, Term>) -> Self {
        Normalizer {
            solutions,
            decls: None,
        }
    }

    /// A normalizer that additionally unfolds defined free variables.
    /// Used while solving, where definitions may need to reduce before a
    /// constraint can be decomposed.
    pub fn with_decls(solutions: &'a HashMap<MetaId, Term>, decls: &'a DeclContext) -> Self {
        Normalizer {
            solutions,
            decls: Some(decls),
        }
    }

    /// Environment mapping every variable of an `n`-entry context to itself.
    pub fn identity_env(ctx_len: usize) -> Env {
        (0..ctx_len).map(|level| Value::bound_var(Lvl(level))).collect()
    }

    pub fn eval(&self, env: &Env, term: &Term) -> Value {
        match &term.kind {
            TermKind::Universe(level) => Value::Universe(*level),
            TermKind::Bound(Ix(index)) => {
                let position = env
                    .len()
                    .checked_sub(index + 1)
                    .unwrap_or_else(|| panic!("bound variable {index} escapes environment of {}", env.len()));
                env.get(position).cloned().expect("environment position")
            }
            TermKind::Free(name) => {
                if let Some(body) = self.decls.and_then(|decls| decls.body(name)) {
                    self.eval(&Env::new(), body)
                } else {
                    Value::Stuck(Head::Free(name.clone()), Vec::new())
                }
            }
            TermKind::Lit(literal) => Value::Lit(literal.clone()),
            TermKind::Builtin(builtin) => Value::builtin(*builtin),
            TermKind::App(head, args) => {
                let head = self.eval(env, head);
                let args = args
                    .iter()
                    .map(|arg| VArg {
                        visibility: arg.visibility,
                        value: self.eval(env, &arg.term),
                    })
                    .collect();
                self.apply_value(head, args)
            }
            TermKind::Lam(binder, body) => Value::Lam(
                Box::new(self.eval_binder(env, binder)),
                Closure {
                    env: env.clone(),
                    body: Arc::new((**body).clone()),
                },
            ),
            TermKind::Pi(binder, body) => Value::Pi(
                Box::new(self.eval_binder(env, binder)),
                Closure {
                    env: env.clone(),
                    body: Arc::new((**body).clone()),
                },
            ),
            TermKind::Let(bound, _, body) => {
                let bound = self.eval(env, bound);
                let mut env = env.clone();
                env.push_back(bound);
                self.eval(&env, body)
            }
            TermKind::Hole(name) => panic!("hole `{name}` survived into evaluation"),
            TermKind::Meta(id) => match self.solutions.get(id) {
                Some(solution) => self.eval(&Env::new(), solution),
                None => Value::meta(*id),
            },
            TermKind::VecLit(items) => {
                Value::Vec(items.iter().map(|item| self.eval(env, item)).collect())
            }
            TermKind::Dict(inner) => Value::Dict(Box::new(self.eval(env, inner))),
        }
    }

    fn eval_binder(&self, env: &Env, binder: &Binder) -> VBinder {
        VBinder {
            name: binder.name.clone(),
            visibility: binder.visibility,
            relevance: binder.relevance,
            ty: self.eval(env, &binder.ty),
        }
    }

    /// Apply a value to arguments, one at a time. A lambda closure consumes
    /// an argument by extending its captured environment; neutral heads
    /// accumulate spine arguments; a builtin spine dispatches to its
    /// evaluation rule once the argument count is exact.
    pub fn apply_value(&self, value: Value, args: Vec<VArg>) -> Value {
        let mut value = value;
        for arg in args {
            value = self.apply_one(value, arg);
        }
        value
    }

    fn apply_one(&self, value: Value, arg: VArg) -> Value {
        match value {
            Value::Lam(_, closure) => self.apply_closure(&closure, arg.value),
            Value::Stuck(Head::Builtin(builtin), mut spine) => {
                spine.push(arg);
                if builtin.eval_arity() == Some(spine.len()) {
                    builtins::eval_builtin(self, builtin, spine)
                } else {
                    Value::Stuck(Head::Builtin(builtin), spine)
                }
            }
            Value::Stuck(head, mut spine) => {
                spine.push(arg);
                Value::Stuck(head, spine)
            }
            Value::Vec(items) => Value::Stuck(Head::VecLit(items), vec![arg]),
            Value::Universe(_) | Value::Lit(_) | Value::Pi(..) | Value::Dict(_) => {
                panic!("applied a non-function value")
            }
        }
    }

    pub fn apply_closure(&self, closure: &Closure, arg: Value) -> Value {
        let mut env = closure.env.clone();
        env.push_back(arg);
        self.eval(&env, &closure.body)
    }

    /// Read a value back into a term. `depth` is the number of bound
    /// variables in scope at the readback site.
    pub fn quote(&self, depth: usize, value: &Value) -> Term {
        match value {
            Value::Universe(level) => Term::universe(*level),
            Value::Lit(literal) => Term::lit(literal.clone()),
            Value::Pi(binder, closure) => {
                let body = self.apply_closure(closure, Value::bound_var(Lvl(depth)));
                Term::pi(
                    self.quote_binder(depth, binder),
                    self.quote(depth + 1, &body),
                )
            }
            Value::Lam(binder, closure) => {
                let body = self.apply_closure(closure, Value::bound_var(Lvl(depth)));
                Term::lam(
                    self.quote_binder(depth, binder),
                    self.quote(depth + 1, &body),
                )
            }
            Value::Vec(items) => Term::vec_lit(
                items.iter().map(|item| self.quote(depth, item)).collect(),
            ),
            Value::Dict(inner) => Term::dict(self.quote(depth, inner)),
            Value::Stuck(head, spine) => {
                let head = match head {
                    Head::Meta(id) => Term::meta(*id),
                    Head::Free(name) => Term::free(name.clone()),
                    Head::Bound(Lvl(level)) => {
                        let index = depth
                            .checked_sub(level + 1)
                            .unwrap_or_else(|| panic!("level {level} out of scope at depth {depth}"));
                        Term::bound(index)
                    }
                    Head::Builtin(builtin) => Term::builtin(*builtin),
                    Head::VecLit(items) => Term::vec_lit(
                        items.iter().map(|item| self.quote(depth, item)).collect(),
                    ),
                };
                let args = spine
                    .iter()
                    .map(|arg| Arg {
                        visibility: arg.visibility,
                        term: self.quote(depth, &arg.value),
                    })
                    .collect();
                Term::app(head, args)
            }
        }
    }

    fn quote_binder(&self, depth: usize, binder: &VBinder) -> Binder {
        Binder {
            name: binder.name.clone(),
            visibility: binder.visibility,
            relevance: binder.relevance,
            ty: self.quote(depth, &binder.ty),
        }
    }

    /// Normalize a term that lives under `ctx_len` binders.
    pub fn whnf(&self, ctx_len: usize, term: &Term) -> Term {
        let value = self.eval(&Self::identity_env(ctx_len), term);
        self.quote(ctx_len, &value)
    }

    /// Recursively unfold solved-meta heads in value position, re-running
    /// builtin dispatch where unfolding makes a rule fire. Metas still
    /// blocking evaluation are added to `blocking`; that set becomes a stuck
    /// constraint's blocker list.
    pub fn force(&self, value: Value, blocking: &mut BTreeSet<MetaId>) -> Value {
        match value {
            Value::Stuck(Head::Meta(id), spine) => match self.solutions.get(&id) {
                Some(solution) => {
                    let head = self.eval(&Env::new(), solution);
                    let applied = self.apply_value(head, spine);
                    self.force(applied, blocking)
                }
                None => {
                    blocking.insert(id);
                    let spine = self.force_spine(spine, blocking);
                    Value::Stuck(Head::Meta(id), spine)
                }
            },
            Value::Stuck(Head::Builtin(builtin), spine) => {
                let spine = self.force_spine(spine, blocking);
                if builtin.eval_arity() == Some(spine.len()) {
                    let result = builtins::eval_builtin(self, builtin, spine);
                    match result {
                        Value::Stuck(Head::Builtin(b), s) if b == builtin => {
                            Value::Stuck(Head::Builtin(b), s)
                        }
                        progressed => self.force(progressed, blocking),
                    }
                } else {
                    Value::Stuck(Head::Builtin(builtin), spine)
                }
            }
            Value::Stuck(Head::VecLit(items), spine) => {
                let items = items
                    .into_iter()
                    .map(|item| self.force(item, blocking))
                    .collect();
                let spine = self.force_spine(spine, blocking);
                Value::Stuck(Head::VecLit(items), spine)
            }
            Value::Stuck(head, spine) => {
                let spine = self.force_spine(spine, blocking);
                Value::Stuck(head, spine)
            }
            Value::Vec(items) => Value::Vec(
                items
                    .into_iter()
                    .map(|item| self.force(item, blocking))
                    .collect(),
            ),
            Value::Dict(inner) => Value::Dict(Box::new(self.force(*inner, blocking))),
            Value::Universe(_) | Value::Lit(_) | Value::Pi(..) | Value::Lam(..) => value,
        }
    }

    fn force_spine(&self, spine: Vec<VArg>, blocking: &mut BTreeSet<MetaId>) -> Vec<VArg> {
        spine
            .into_iter()
            .map(|arg| VArg {
                visibility: arg.visibility,
                value: self.force(arg.value, blocking),
            })
            .collect()
    }

    /// Collect the unsolved metas appearing anywhere in a value, including
    /// under closures.
    pub fn collect_metas(&self, value: &Value, out: &mut BTreeSet<MetaId>) {
        match value {
            Value::Universe(_) | Value::Lit(_) => {}
            Value::Pi(binder, closure) | Value::Lam(binder, closure) => {
                self.collect_metas(&binder.ty, out);
                for captured in closure.env.iter() {
                    self.collect_metas(captured, out);
                }
                for id in closure.body.metas() {
                    if !self.solutions.contains_key(&id) {
                        out.insert(id);
                    }
                }
            }
            Value::Vec(items) => {
                for item in items {
                    self.collect_metas(item, out);
                }
            }
            Value::Dict(inner) => self.collect_metas(inner, out),
            Value::Stuck(head, spine) => {
                match head {
                    Head::Meta(id) => {
                        if !self.solutions.contains_key(id) {
                            out.insert(*id);
                        }
                    }
                    Head::VecLit(items) => {
                        for item in items {
                            self.collect_metas(item, out);
                        }
                    }
                    Head::Free(_) | Head::Bound(_) | Head::Builtin(_) => {}
                }
                for arg in spine {
                    self.collect_metas(&arg.value, out);
                }
            }
        }
    }

    /// Substitute the current solution through a term. Applications headed
    /// by a solved meta beta-reduce eagerly; everything else is preserved
    /// structurally, so user-written lets and lambdas survive readback.
    pub fn zonk(&self, term: &Term) -> Term {
        let zonked = match &term.kind {
            TermKind::Meta(id) => match self.solutions.get(id) {
                Some(solution) => return self.zonk(solution).with_span(term.span),
                None => term.kind.clone(),
            },
            TermKind::App(head, args) => {
                let head = self.zonk(head);
                let args: Vec<Arg> = args
                    .iter()
                    .map(|arg| Arg {
                        visibility: arg.visibility,
                        term: self.zonk(&arg.term),
                    })
                    .collect();
                return beta_reduce(head, args).with_span(term.span);
            }
            TermKind::Universe(_)
            | TermKind::Bound(_)
            | TermKind::Free(_)
            | TermKind::Lit(_)
            | TermKind::Builtin(_)
            | TermKind::Hole(_) => term.kind.clone(),
            TermKind::Lam(binder, body) => TermKind::Lam(
                Box::new(self.zonk_binder(binder)),
                Box::new(self.zonk(body)),
            ),
            TermKind::Pi(binder, body) => TermKind::Pi(
                Box::new(self.zonk_binder(binder)),
                Box::new(self.zonk(body)),
            ),
            TermKind::Let(bound, binder, body) => TermKind::Let(
                Box::new(self.zonk(bound)),
                Box::new(self.zonk_binder(binder)),
                Box::new(self.zonk(body)),
            ),
            TermKind::VecLit(items) => {
                TermKind::VecLit(items.iter().map(|item| self.zonk(item)).collect())
            }
            TermKind::Dict(inner) => TermKind::Dict(Box::new(self.zonk(inner))),
        };
        Term::new(zonked, term.span)
    }

    fn zonk_binder(&self, binder: &Binder) -> Binder {
        Binder {
            name: binder.name.clone(),
            visibility: binder.visibility,
            relevance: binder.relevance,
            ty: self.zonk(&binder.ty),
        }
    }
}

/// Reduce an application whose head may have become a lambda after meta
/// substitution. Leaves rigid applications untouched.
fn beta_reduce(head: Term, args: Vec<Arg>) -> Term {
    let mut head = head;
    let mut queue: std::collections::VecDeque<Arg> = args.into();
    while let Some(arg) = queue.pop_front() {
        match head.kind {
            TermKind::Lam(_, body) => {
                head = crate::syntax::open(&body, &arg.term);
            }
            _ => {
                let mut rest = Vec::with_capacity(queue.len() + 1);
                rest.push(arg);
                rest.extend(queue);
                return Term::app(head, rest);
            }
        }
    }
    head
}
