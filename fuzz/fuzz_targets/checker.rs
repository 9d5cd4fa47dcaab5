#![no_main]

use libfuzzer_sys::fuzz_target;

use quiver::syntax::{Arg, Binder, Builtin, Literal, Term};
use quiver::{check_declaration, DeclContext, Declaration, Options, ResourceContext};

/// Byte-driven term builder. Every input decodes to a scope-correct term
/// (bound indices stay inside the enclosing binders), so any panic below
/// is a checker bug rather than a contract violation.
struct Decoder<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl Decoder<'_> {
    fn next(&mut self) -> u8 {
        let byte = self.data.get(self.cursor).copied().unwrap_or(0);
        self.cursor += 1;
        byte
    }

    fn term(&mut self, depth: usize, fuel: &mut u32) -> Term {
        if *fuel == 0 {
            return Term::nat(0);
        }
        *fuel -= 1;
        match self.next() % 12 {
            0 => Term::lit(Literal::Bool(self.next() % 2 == 0)),
            1 => Term::nat(u64::from(self.next())),
            2 => {
                if depth == 0 {
                    Term::hole("h")
                } else {
                    Term::bound(usize::from(self.next()) % depth)
                }
            }
            3 => Term::hole("h"),
            4 => Term::builtin(self.operator()),
            5 => Term::universe(0),
            6 => {
                let count = usize::from(self.next()) % 3;
                let items = (0..count).map(|_| self.term(depth, fuel)).collect();
                Term::vec_lit(items)
            }
            7 => Term::lam(self.binder(depth, fuel), self.term(depth + 1, fuel)),
            8 => Term::pi(self.binder(depth, fuel), self.term(depth + 1, fuel)),
            9 => {
                let bound = self.term(depth, fuel);
                let binder = self.binder(depth, fuel);
                Term::let_in(bound, binder, self.term(depth + 1, fuel))
            }
            _ => {
                let head = self.term(depth, fuel);
                let count = 1 + usize::from(self.next()) % 3;
                let args = (0..count)
                    .map(|_| Arg::explicit(self.term(depth, fuel)))
                    .collect();
                Term::app(head, args)
            }
        }
    }

    fn binder(&mut self, depth: usize, fuel: &mut u32) -> Binder {
        if self.next() % 2 == 0 {
            Binder::explicit(None, Term::hole("b"))
        } else {
            Binder::explicit(None, self.term(depth, fuel))
        }
    }

    fn operator(&mut self) -> Builtin {
        match self.next() % 10 {
            0 => Builtin::Not,
            1 => Builtin::And,
            2 => Builtin::Or,
            3 => Builtin::Implies,
            4 => Builtin::If,
            5 => Builtin::Eq,
            6 => Builtin::Add,
            7 => Builtin::Mul,
            8 => Builtin::At,
            _ => Builtin::Forall,
        }
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 4 * 1024 {
        return;
    }
    let mut decoder = Decoder { data, cursor: 0 };
    let mut fuel = 256u32;
    let body = decoder.term(0, &mut fuel);
    let declaration = Declaration::Def {
        name: "fuzzed".to_string(),
        span: Default::default(),
        ty: None,
        body,
    };
    // Either a checked declaration or a type error; never a panic, and
    // never a hang thanks to the solver's pass budget.
    let _ = check_declaration(
        &declaration,
        &DeclContext::new(),
        &ResourceContext::new(),
        &Options::default(),
    );
});
