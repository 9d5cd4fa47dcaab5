#![no_main]

use libfuzzer_sys::fuzz_target;

use quiver::syntax::{Arg, Binder, Builtin, Literal, Term};
use quiver::{check_declaration, DeclContext, Declaration, Options, ResourceContext};

/// Checking a body against a fuzzed signature drives the solver hard:
/// every mode switch emits unification constraints, literals and vector
/// literals emit class obligations, and signature holes become metas that
/// only defaulting or generalization can discharge.
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

    fn signature(&mut self, fuel: &mut u32) -> Term {
        if *fuel == 0 {
            return Term::builtin(Builtin::RatType);
        }
        *fuel -= 1;
        match self.next() % 7 {
            0 => Term::builtin(Builtin::BoolType),
            1 => Term::builtin(Builtin::NatType),
            2 => Term::builtin(Builtin::RatType),
            3 => Term::hole("s"),
            4 => Term::app(
                Term::builtin(Builtin::VectorType),
                vec![
                    Arg::explicit(self.signature(fuel)),
                    Arg::explicit(Term::nat(u64::from(self.next() % 4))),
                ],
            ),
            _ => {
                let dom = self.signature(fuel);
                let cod = self.signature(fuel);
                Term::pi(Binder::explicit(None, dom), cod)
            }
        }
    }

    fn body(&mut self, depth: usize, fuel: &mut u32) -> Term {
        if *fuel == 0 {
            return Term::nat(1);
        }
        *fuel -= 1;
        match self.next() % 8 {
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
            4 => {
                let count = usize::from(self.next()) % 3;
                let items = (0..count).map(|_| self.body(depth, fuel)).collect();
                Term::vec_lit(items)
            }
            5 => Term::lam(
                Binder::explicit(None, Term::hole("b")),
                self.body(depth + 1, fuel),
            ),
            6 => {
                let op = match self.next() % 5 {
                    0 => Builtin::Eq,
                    1 => Builtin::Add,
                    2 => Builtin::Mul,
                    3 => Builtin::Lt,
                    _ => Builtin::And,
                };
                Term::app(
                    Term::builtin(op),
                    vec![
                        Arg::explicit(self.body(depth, fuel)),
                        Arg::explicit(self.body(depth, fuel)),
                    ],
                )
            }
            _ => {
                let head = self.body(depth, fuel);
                Term::app(head, vec![Arg::explicit(self.body(depth, fuel))])
            }
        }
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 4 * 1024 {
        return;
    }
    let mut decoder = Decoder { data, cursor: 0 };
    let mut fuel = 192u32;
    let signature = decoder.signature(&mut fuel);
    let body = decoder.body(0, &mut fuel);
    let declaration = Declaration::Def {
        name: "fuzzed".to_string(),
        span: Default::default(),
        ty: Some(signature),
        body,
    };
    // Any result is fine; panics and non-termination are the findings.
    let _ = check_declaration(
        &declaration,
        &DeclContext::new(),
        &ResourceContext::new(),
        &Options::default(),
    );
});
