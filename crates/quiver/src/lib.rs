//! Quiver is a specification language for correctness properties of
//! neural networks. This crate is the compiler's type inference and
//! constraint-solving core: a bidirectional checker over a dependently
//! flavored internal language, a meta-variable context, a deferred
//! constraint solver (unification plus type classes with defaulting and
//! generalization), and the WHNF/NBE normalizer that both of them lean on.
//!
//! The front end hands over scope-resolved declarations; backends receive
//! fully typed, meta-free terms. Everything in between happens here, with
//! no I/O of any kind.

pub mod diagnostics;
pub mod normalize;
pub mod syntax;
pub mod typecheck;

pub use typecheck::{
    check_declaration, check_program, CheckedDecl, Declaration, DeclContext, NetworkShape,
    Options, ResourceContext, TypeError,
};
