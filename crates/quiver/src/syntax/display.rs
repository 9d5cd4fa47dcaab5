use std::fmt;

use super::{Arg, Binder, Builtin, Ix, Literal, Term, TermKind, Visibility};

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Nat(value) => write!(f, "{value}"),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Rat(value) => write!(f, "{value}"),
            Literal::Index(value, bound) => write!(f, "{value}@{bound}"),
        }
    }
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::BoolType => "Bool",
            Builtin::NatType => "Nat",
            Builtin::IntType => "Int",
            Builtin::RatType => "Rat",
            Builtin::VectorType => "Vector",
            Builtin::IndexType => "Index",
            Builtin::Not => "not",
            Builtin::And => "and",
            Builtin::Or => "or",
            Builtin::Implies => "implies",
            Builtin::If => "if",
            Builtin::Eq => "eq",
            Builtin::Neq => "neq",
            Builtin::Leq => "leq",
            Builtin::Lt => "lt",
            Builtin::Geq => "geq",
            Builtin::Gt => "gt",
            Builtin::Add => "add",
            Builtin::Sub => "sub",
            Builtin::Mul => "mul",
            Builtin::Div => "div",
            Builtin::Neg => "neg",
            Builtin::At => "at",
            Builtin::Map => "map",
            Builtin::Fold => "fold",
            Builtin::Forall => "forall",
            Builtin::Exists => "exists",
            Builtin::FromNat => "fromNat",
            Builtin::FromRat => "fromRat",
            Builtin::Class(class) => class.name(),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pretty-printer with a stack of binder names. Unnamed binders are shown
/// as `_1`, `_2`, ... counted from the outermost.
struct Printer {
    names: Vec<String>,
}

impl Printer {
    fn print(&mut self, f: &mut fmt::Formatter<'_>, term: &Term, atomic: bool) -> fmt::Result {
        match &term.kind {
            TermKind::Universe(0) => write!(f, "Type"),
            TermKind::Universe(level) => write!(f, "Type{level}"),
            TermKind::Bound(Ix(index)) => {
                let position = self.names.len().checked_sub(index + 1);
                match position.and_then(|p| self.names.get(p)) {
                    Some(name) => f.write_str(name),
                    None => write!(f, "@{index}"),
                }
            }
            TermKind::Free(name) => f.write_str(name),
            TermKind::Lit(literal) => write!(f, "{literal}"),
            TermKind::Builtin(builtin) => write!(f, "{builtin}"),
            TermKind::Hole(name) => write!(f, "?{name}"),
            TermKind::Meta(id) => write!(f, "?m{}", id.0),
            TermKind::App(head, args) => {
                if atomic {
                    f.write_str("(")?;
                }
                self.print(f, head, true)?;
                for arg in args {
                    f.write_str(" ")?;
                    self.print_arg(f, arg)?;
                }
                if atomic {
                    f.write_str(")")?;
                }
                Ok(())
            }
            TermKind::Lam(binder, body) => {
                if atomic {
                    f.write_str("(")?;
                }
                write!(f, "\\")?;
                self.print_binder(f, binder)?;
                f.write_str(" -> ")?;
                self.push_name(binder);
                self.print(f, body, false)?;
                self.names.pop();
                if atomic {
                    f.write_str(")")?;
                }
                Ok(())
            }
            TermKind::Pi(binder, body) => {
                if atomic {
                    f.write_str("(")?;
                }
                match binder.visibility {
                    Visibility::Explicit if binder.name.is_none() => {
                        self.print(f, &binder.ty, true)?;
                    }
                    _ => {
                        f.write_str("forall ")?;
                        self.print_binder(f, binder)?;
                    }
                }
                f.write_str(" -> ")?;
                self.push_name(binder);
                self.print(f, body, false)?;
                self.names.pop();
                if atomic {
                    f.write_str(")")?;
                }
                Ok(())
            }
            TermKind::Let(bound, binder, body) => {
                if atomic {
                    f.write_str("(")?;
                }
                f.write_str("let ")?;
                self.print_binder(f, binder)?;
                f.write_str(" = ")?;
                self.print(f, bound, false)?;
                f.write_str(" in ")?;
                self.push_name(binder);
                self.print(f, body, false)?;
                self.names.pop();
                if atomic {
                    f.write_str(")")?;
                }
                Ok(())
            }
            TermKind::VecLit(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    self.print(f, item, false)?;
                }
                f.write_str("]")
            }
            TermKind::Dict(inner) => {
                f.write_str("<<")?;
                self.print(f, inner, false)?;
                f.write_str(">>")
            }
        }
    }

    fn print_arg(&mut self, f: &mut fmt::Formatter<'_>, arg: &Arg) -> fmt::Result {
        match arg.visibility {
            Visibility::Explicit => self.print(f, &arg.term, true),
            Visibility::Implicit => {
                f.write_str("{")?;
                self.print(f, &arg.term, false)?;
                f.write_str("}")
            }
            Visibility::Instance => {
                f.write_str("{{")?;
                self.print(f, &arg.term, false)?;
                f.write_str("}}")
            }
        }
    }

    fn print_binder(&mut self, f: &mut fmt::Formatter<'_>, binder: &Binder) -> fmt::Result {
        let name = self.binder_name(binder);
        let inner = format!("{name} : ");
        match binder.visibility {
            Visibility::Explicit => {
                write!(f, "({inner}")?;
                self.print(f, &binder.ty, false)?;
                f.write_str(")")
            }
            Visibility::Implicit => {
                write!(f, "{{{inner}")?;
                self.print(f, &binder.ty, false)?;
                f.write_str("}")
            }
            Visibility::Instance => {
                f.write_str("{{")?;
                self.print(f, &binder.ty, false)?;
                f.write_str("}}")
            }
        }
    }

    fn binder_name(&self, binder: &Binder) -> String {
        match &binder.name {
            Some(name) => name.clone(),
            None => format!("_{}", self.names.len() + 1),
        }
    }

    fn push_name(&mut self, binder: &Binder) {
        let name = self.binder_name(binder);
        self.names.push(name);
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut printer = Printer { names: Vec::new() };
        printer.print(f, self, false)
    }
}
