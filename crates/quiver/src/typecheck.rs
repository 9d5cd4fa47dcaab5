//! Declaration-level type checking driver. Declarations are checked
//! strictly in order against one meta-context created for the whole
//! program; each runs through the bidirectional checker and the constraint
//! solver, and lands in the declaration context as a fully solved,
//! meta-free result before the next one starts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticLabel, Span};
use crate::normalize::Normalizer;
use crate::syntax::{open, vector_of, Builtin, Ix, MetaId, Term, TermKind, Visibility};

mod checker;
mod classes;
mod constraint;
mod meta;
mod solver;
#[cfg(test)]
mod tests;

pub use constraint::{Constraint, ConstraintCtx, TrackedConstraint};
pub use meta::{MetaContext, MetaInfo};

use checker::Checker;
use solver::Solver;

#[derive(Debug, Clone)]
pub struct Options {
    /// Whether the relation that decides if a class obligation is linked
    /// to the declaration's own type (and is therefore generalized rather
    /// than defaulted) flows through other type-class constraints, or only
    /// through unification constraints.
    pub link_through_class_constraints: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            link_through_class_constraints: true,
        }
    }
}

/// A scope-resolved input declaration. Bound variables are indices, free
/// variables are identifiers already resolved against earlier
/// declarations.
#[derive(Debug, Clone)]
pub enum Declaration {
    Def {
        name: String,
        span: Span,
        ty: Option<Term>,
        body: Term,
    },
    Network {
        name: String,
        span: Span,
        ty: Term,
    },
    Dataset {
        name: String,
        span: Span,
        ty: Term,
    },
    Parameter {
        name: String,
        span: Span,
        ty: Term,
    },
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Def { name, .. }
            | Declaration::Network { name, .. }
            | Declaration::Dataset { name, .. }
            | Declaration::Parameter { name, .. } => name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Declaration::Def { span, .. }
            | Declaration::Network { span, .. }
            | Declaration::Dataset { span, .. }
            | Declaration::Parameter { span, .. } => *span,
        }
    }
}

/// A successfully checked declaration: fully typed and meta-free.
#[derive(Debug, Clone)]
pub struct CheckedDecl {
    pub name: String,
    pub span: Span,
    pub ty: Term,
    pub body: Option<Term>,
}

#[derive(Debug, Clone)]
struct DeclEntry {
    ty: Term,
    body: Option<Term>,
}

/// Types (and, when available, bodies for unfolding) of the declarations
/// checked so far.
#[derive(Debug, Clone, Default)]
pub struct DeclContext {
    entries: HashMap<String, DeclEntry>,
}

impl DeclContext {
    pub fn new() -> Self {
        DeclContext::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: Term, body: Option<Term>) {
        self.entries.insert(name.into(), DeclEntry { ty, body });
    }

    pub fn ty(&self, name: &str) -> Option<&Term> {
        self.entries.get(name).map(|entry| &entry.ty)
    }

    pub fn body(&self, name: &str) -> Option<&Term> {
        self.entries.get(name).and_then(|entry| entry.body.as_ref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkShape {
    pub input: Vec<u64>,
    pub output: Vec<u64>,
}

/// Concrete tensor shapes for network/dataset/parameter declarations,
/// injected as a completed map before checking begins. The core never
/// performs resource I/O itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceContext {
    networks: HashMap<String, NetworkShape>,
    datasets: HashMap<String, Vec<u64>>,
    parameters: HashMap<String, u64>,
}

impl ResourceContext {
    pub fn new() -> Self {
        ResourceContext::default()
    }

    pub fn add_network(&mut self, name: impl Into<String>, shape: NetworkShape) {
        self.networks.insert(name.into(), shape);
    }

    pub fn add_dataset(&mut self, name: impl Into<String>, dims: Vec<u64>) {
        self.datasets.insert(name.into(), dims);
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, value: u64) {
        self.parameters.insert(name.into(), value);
    }

    pub fn network(&self, name: &str) -> Option<&NetworkShape> {
        self.networks.get(name)
    }

    pub fn dataset(&self, name: &str) -> Option<&Vec<u64>> {
        self.datasets.get(name)
    }

    pub fn parameter(&self, name: &str) -> Option<u64> {
        self.parameters.get(name).copied()
    }
}

#[derive(Debug, Clone, Error)]
pub enum TypeError {
    #[error("type mismatch: expected `{expected}`, found `{actual}`")]
    TypeMismatch {
        span: Span,
        expected: Term,
        actual: Term,
    },
    #[error("missing explicit argument of type `{expected}`")]
    MissingExplicitArg { span: Span, expected: Term },
    #[error("constraints remain unsolved")]
    UnsolvedConstraints {
        span: Span,
        details: Vec<(Span, String)>,
    },
    #[error("could not infer a value for every placeholder")]
    UnsolvedMetas { span: Span, metas: Vec<MetaId> },
    #[error("no shape information provided for resource `{name}`")]
    UnknownResource { span: Span, name: String },
    #[error("resource `{name}` has a malformed type: {reason}")]
    MalformedResourceType {
        span: Span,
        name: String,
        reason: String,
    },
}

impl TypeError {
    pub fn span(&self) -> Span {
        match self {
            TypeError::TypeMismatch { span, .. }
            | TypeError::MissingExplicitArg { span, .. }
            | TypeError::UnsolvedConstraints { span, .. }
            | TypeError::UnsolvedMetas { span, .. }
            | TypeError::UnknownResource { span, .. }
            | TypeError::MalformedResourceType { span, .. } => *span,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TypeError::TypeMismatch { .. } => "T001",
            TypeError::MissingExplicitArg { .. } => "T002",
            TypeError::UnsolvedConstraints { .. } => "T003",
            TypeError::UnsolvedMetas { .. } => "T004",
            TypeError::UnknownResource { .. } => "T005",
            TypeError::MalformedResourceType { .. } => "T006",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let labels = match self {
            TypeError::UnsolvedConstraints { details, .. } => details
                .iter()
                .map(|(span, text)| DiagnosticLabel {
                    message: format!("unsolved: {text}"),
                    span: *span,
                })
                .collect(),
            TypeError::UnsolvedMetas { metas, .. } => metas
                .iter()
                .map(|id| DiagnosticLabel {
                    message: format!("undetermined placeholder ?m{}", id.0),
                    span: self.span(),
                })
                .collect(),
            _ => Vec::new(),
        };
        Diagnostic {
            code: self.code().to_string(),
            message: self.to_string(),
            span: self.span(),
            labels,
        }
    }
}

/// Check a whole program in dependency order. Stops at the first failing
/// declaration; there is no partial output.
pub fn check_program(
    declarations: &[Declaration],
    resources: &ResourceContext,
    options: &Options,
) -> Result<Vec<CheckedDecl>, TypeError> {
    // The one mutable state handle of the compilation, threaded through
    // every declaration in turn and discarded at the end.
    let mut metas = MetaContext::new();
    let mut decls = DeclContext::new();
    let mut checked = Vec::with_capacity(declarations.len());
    for declaration in declarations {
        let result = check_one(declaration, &mut metas, &decls, resources, options)?;
        decls.insert(result.name.clone(), result.ty.clone(), result.body.clone());
        checked.push(result);
    }
    Ok(checked)
}

/// Check one declaration against the already-checked context, with a
/// fresh meta-context of its own.
pub fn check_declaration(
    declaration: &Declaration,
    decls: &DeclContext,
    resources: &ResourceContext,
    options: &Options,
) -> Result<CheckedDecl, TypeError> {
    let mut metas = MetaContext::new();
    check_one(declaration, &mut metas, decls, resources, options)
}

fn check_one(
    declaration: &Declaration,
    metas: &mut MetaContext,
    decls: &DeclContext,
    resources: &ResourceContext,
    options: &Options,
) -> Result<CheckedDecl, TypeError> {
    match declaration {
        Declaration::Def {
            name,
            span,
            ty,
            body,
        } => check_def(name, *span, ty.as_ref(), body, metas, decls, options),
        Declaration::Network { name, span, ty } => {
            check_network(name, *span, ty, metas, decls, resources, options)
        }
        Declaration::Dataset { name, span, ty } => {
            check_dataset(name, *span, ty, metas, decls, resources, options)
        }
        Declaration::Parameter { name, span, ty } => {
            check_parameter(name, *span, ty, metas, decls, resources, options)
        }
    }
}

fn check_def(
    name: &str,
    span: Span,
    signature: Option<&Term>,
    body: &Term,
    metas: &mut MetaContext,
    decls: &DeclContext,
    options: &Options,
) -> Result<CheckedDecl, TypeError> {
    let first_meta = metas.meta_count() as u32;
    let (decl_ty, body_elab) = {
        let mut checker = Checker::new(metas, decls);
        match signature {
            Some(signature) => {
                let (signature, _) = checker.infer_type(signature)?;
                let body = checker.check(&signature, body)?;
                (signature, body)
            }
            None => {
                let (body, inferred) = checker.infer(body)?;
                (inferred, body)
            }
        }
    };
    let remaining = Solver::new(metas, decls, options).solve(&decl_ty, span)?;
    let (ty, body, bound) = solver::generalize(metas, &remaining, &decl_ty, Some(&body_elab))?;
    let leftover: Vec<MetaId> = metas
        .unsolved_metas()
        .into_iter()
        .filter(|id| id.0 >= first_meta && !bound.contains(id))
        .collect();
    if !leftover.is_empty() {
        return Err(TypeError::UnsolvedMetas {
            span,
            metas: leftover,
        });
    }
    // Types are published in normal form (elaborated dimension literals
    // reduce away); bodies keep their user-written structure.
    let ty = Normalizer::new(metas.solutions()).whnf(0, &ty);
    Ok(CheckedDecl {
        name: name.to_string(),
        span,
        ty,
        body: Some(body.expect("definition body")),
    })
}

fn check_network(
    name: &str,
    span: Span,
    declared: &Term,
    metas: &mut MetaContext,
    decls: &DeclContext,
    resources: &ResourceContext,
    options: &Options,
) -> Result<CheckedDecl, TypeError> {
    let Some(shape) = resources.network(name) else {
        return Err(TypeError::UnknownResource {
            span,
            name: name.to_string(),
        });
    };
    let shape = shape.clone();
    let first_meta = metas.meta_count() as u32;
    let elaborated = {
        let mut checker = Checker::new(metas, decls);
        let (ty, _) = checker.infer_type(declared)?;
        let ty_whnf = checker.whnf(&ty);
        let Some((binder, result)) = ty_whnf.as_pi() else {
            return Err(TypeError::MalformedResourceType {
                span,
                name: name.to_string(),
                reason: format!("expected a function over rational vectors, found `{ty_whnf}`"),
            });
        };
        if binder.visibility != Visibility::Explicit {
            return Err(TypeError::MalformedResourceType {
                span,
                name: name.to_string(),
                reason: "network input must be an explicit argument".to_string(),
            });
        }
        if uses_innermost_bound(result) {
            return Err(TypeError::MalformedResourceType {
                span,
                name: name.to_string(),
                reason: "network output type may not depend on the input value".to_string(),
            });
        }
        constrain_dims(&mut checker, &binder.ty, &shape.input, name, span)?;
        let result = open(result, &Term::universe(0));
        constrain_dims(&mut checker, &result, &shape.output, name, span)?;
        ty
    };
    finish_resource(name, span, elaborated, first_meta, metas, decls, options)
}

fn check_dataset(
    name: &str,
    span: Span,
    declared: &Term,
    metas: &mut MetaContext,
    decls: &DeclContext,
    resources: &ResourceContext,
    options: &Options,
) -> Result<CheckedDecl, TypeError> {
    let Some(dims) = resources.dataset(name) else {
        return Err(TypeError::UnknownResource {
            span,
            name: name.to_string(),
        });
    };
    let dims = dims.clone();
    let first_meta = metas.meta_count() as u32;
    let elaborated = {
        let mut checker = Checker::new(metas, decls);
        let (ty, _) = checker.infer_type(declared)?;
        constrain_dims(&mut checker, &ty, &dims, name, span)?;
        ty
    };
    finish_resource(name, span, elaborated, first_meta, metas, decls, options)
}

fn check_parameter(
    name: &str,
    span: Span,
    declared: &Term,
    metas: &mut MetaContext,
    decls: &DeclContext,
    resources: &ResourceContext,
    options: &Options,
) -> Result<CheckedDecl, TypeError> {
    let Some(value) = resources.parameter(name) else {
        return Err(TypeError::UnknownResource {
            span,
            name: name.to_string(),
        });
    };
    let first_meta = metas.meta_count() as u32;
    let elaborated = {
        let mut checker = Checker::new(metas, decls);
        let (ty, _) = checker.infer_type(declared)?;
        checker.add_unify(Term::builtin(Builtin::NatType), ty.clone(), span);
        ty
    };
    let mut checked = finish_resource(name, span, elaborated, first_meta, metas, decls, options)?;
    // The concrete value becomes the definition body, so later
    // declarations can use the parameter in dimension positions.
    checked.body = Some(Term::nat(value).with_span(span));
    Ok(checked)
}

/// Solve a resource declaration's constraints and insist on a fully
/// concrete result: resources never generalize.
fn finish_resource(
    name: &str,
    span: Span,
    elaborated: Term,
    first_meta: u32,
    metas: &mut MetaContext,
    decls: &DeclContext,
    options: &Options,
) -> Result<CheckedDecl, TypeError> {
    let remaining = Solver::new(metas, decls, options).solve(&elaborated, span)?;
    if !remaining.is_empty() {
        let details = remaining
            .iter()
            .map(|tracked| (tracked.ctx.provenance, tracked.describe()))
            .collect();
        return Err(TypeError::UnsolvedConstraints { span, details });
    }
    let unsolved: Vec<MetaId> = metas
        .unsolved_metas()
        .into_iter()
        .filter(|id| id.0 >= first_meta)
        .collect();
    if !unsolved.is_empty() {
        return Err(TypeError::UnsolvedMetas {
            span,
            metas: unsolved,
        });
    }
    let ty = Normalizer::new(metas.solutions()).whnf(0, &elaborated);
    Ok(CheckedDecl {
        name: name.to_string(),
        span,
        ty,
        body: None,
    })
}

/// Constrain a declared tensor type against concrete dimensions: one
/// vector layer per dimension, rational elements at the bottom. A
/// meta-headed layer (e.g. a dimension hole) is pinned by unification.
fn constrain_dims(
    checker: &mut Checker<'_>,
    ty: &Term,
    dims: &[u64],
    name: &str,
    span: Span,
) -> Result<(), TypeError> {
    if dims.is_empty() {
        checker.add_unify(Term::builtin(Builtin::RatType), ty.clone(), span);
        return Ok(());
    }
    let ty_whnf = checker.whnf(ty);
    if let Some((elem, len)) = ty_whnf.as_vector_app() {
        checker.add_unify(Term::nat(dims[0]), len.clone(), span);
        let elem = elem.clone();
        constrain_dims(checker, &elem, &dims[1..], name, span)
    } else if ty_whnf.head_meta().is_some() {
        checker.add_unify(tensor_of(dims), ty_whnf, span);
        Ok(())
    } else {
        Err(TypeError::MalformedResourceType {
            span,
            name: name.to_string(),
            reason: format!("expected a rational vector, found `{ty_whnf}`"),
        })
    }
}

/// `Vector (Vector ... Rat dn ...) d1` for the given dimension list.
fn tensor_of(dims: &[u64]) -> Term {
    let mut ty = Term::builtin(Builtin::RatType);
    for dim in dims.iter().rev() {
        ty = vector_of(ty, Term::nat(*dim));
    }
    ty
}

/// Whether a term under one extra binder actually uses that binder.
fn uses_innermost_bound(term: &Term) -> bool {
    fn go(term: &Term, depth: usize) -> bool {
        match &term.kind {
            TermKind::Bound(Ix(index)) => *index == depth,
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
