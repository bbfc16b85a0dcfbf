//! Scheme language transformations & idiosyncrasies
//!
//! Home for the tree to tree rewrites that run before code generation:
//! derived forms (`and`, `or`), free variable analysis and closure
//! conversion. Every pass is a plain function from `Expr` to `Expr`, applied
//! in order.
use crate::core::{
    Code,
    Expr::{self, *},
    Ident, Lambda,
};
use log::debug;

/// Rewrite `and` into nested conditionals
///
/// ```scheme
/// (and)          => #t
/// (and e)        => e
/// (and e rest..) => (if e (and rest..) #f)
/// ```
pub fn desugar_and(args: &[Expr]) -> Expr {
    match args {
        [] => true.into(),
        [e] => e.clone(),
        [e, rest @ ..] => Expr::cond(e.clone(), And(rest.to_vec()), false.into()),
    }
}

/// Rewrite `or` into nested conditionals
///
/// The value of the first truthy expression is the result, so it is needed
/// twice; once for the test and again as the value. Anything more complex
/// than a literal or a variable is bound to a temporary first, so it is
/// evaluated exactly once.
///
/// ```scheme
/// (or)          => #f
/// (or e)        => e
/// (or x rest..) => (if x x (or rest..))
/// (or e rest..) => (let ((%or e)) (if %or %or (or rest..)))
/// ```
pub fn desugar_or(args: &[Expr]) -> Expr {
    match args {
        [] => false.into(),
        [e] => e.clone(),
        [e, rest @ ..] if e.trivial() => Expr::cond(e.clone(), e.clone(), Or(rest.to_vec())),
        [e, rest @ ..] => {
            let t = Ident::new("%or");
            Let {
                bindings: vec![(t.clone(), e.clone())],
                body: Box::new(Expr::cond(Identifier(t.clone()), Identifier(t), Or(rest.to_vec()))),
            }
        }
    }
}

/// Free variables of an expression, in order of first reference
pub fn free_vars(expr: &Expr) -> Vec<Ident> {
    let mut free = vec![];
    collect(expr, &[], &mut free);
    free
}

// Bound names are a stack; scopes push on entry and the slice is simply
// shorter again on return.
fn collect(expr: &Expr, bound: &[&Ident], free: &mut Vec<Ident>) {
    let add = |i: &Ident, free: &mut Vec<Ident>| {
        if !bound.contains(&i) && !free.contains(i) {
            free.push(i.clone())
        }
    };

    match expr {
        Literal(_) => (),

        Identifier(i) => add(i, free),

        If { pred, then, alt } => {
            collect(pred, bound, free);
            collect(then, bound, free);
            collect(alt, bound, free);
        }

        And(args) | Or(args) | Prim { args, .. } | App { args, .. } => {
            args.iter().for_each(|arg| collect(arg, bound, free))
        }

        Let { bindings, body } => {
            let mut inner = bound.to_vec();
            for (name, value) in bindings {
                collect(value, bound, free);
                inner.push(name);
            }
            collect(body, &inner, free);
        }

        LetStar { bindings, body } => {
            let mut inner = bound.to_vec();
            for (name, value) in bindings {
                collect(value, &inner, free);
                inner.push(name);
            }
            collect(body, &inner, free);
        }

        Letrec { bindings, body } => {
            let mut inner = bound.to_vec();
            inner.extend(bindings.iter().map(|(name, _)| name));

            for (_, lambda) in bindings {
                lambda_vars(lambda, &inner, free);
            }
            collect(body, &inner, free);
        }

        Lambda(lambda) => lambda_vars(lambda, bound, free),

        Closure { free: captured, .. } => captured.iter().for_each(|i| add(i, free)),

        Labels { code, body } => {
            for c in code {
                let mut inner = bound.to_vec();
                inner.extend(c.formals.iter());
                collect(&c.body, &inner, free);
            }
            collect(body, bound, free);
        }
    }
}

fn lambda_vars(lambda: &Lambda, bound: &[&Ident], free: &mut Vec<Ident>) {
    let mut inner = bound.to_vec();
    inner.extend(lambda.formals.iter());
    collect(&lambda.body, &inner, free);
}

/// Annotate every lambda with its free variables
///
/// Free variables of a lambda are whatever its body references, minus its
/// own formals. A nested lambda's free variables that aren't bound by the
/// enclosing lambda are free in the enclosing one too.
pub fn annotate(expr: Expr) -> Expr {
    map(expr, &mut |e: Expr| match e {
        Lambda(lambda) => Lambda(annotate_lambda(lambda, &[])),
        Letrec { bindings, body } => {
            let names: Vec<Ident> = bindings.iter().map(|(name, _)| name.clone()).collect();
            let bound: Vec<&Ident> = names.iter().collect();

            Letrec {
                bindings: bindings.into_iter().map(|(name, lambda)| (name, annotate_lambda(lambda, &bound))).collect(),
                body: Box::new(annotate(*body)),
            }
        }
        e => e,
    })
}

// Procedure names bound by an enclosing letrec are never free
fn annotate_lambda(lambda: Lambda, procedures: &[&Ident]) -> Lambda {
    let mut free = vec![];
    lambda_vars(&lambda, procedures, &mut free);

    Lambda { free: Some(free), body: Box::new(annotate(*lambda.body)), ..lambda }
}

// Rebuild the tree bottom up. Lambdas and letrecs are handed to `f` instead,
// which takes care of their children.
fn map(expr: Expr, f: &mut dyn FnMut(Expr) -> Expr) -> Expr {
    match expr {
        e @ (Lambda(_) | Letrec { .. }) => f(e),

        If { pred, then, alt } => Expr::cond(map(*pred, f), map(*then, f), map(*alt, f)),
        And(args) => And(args.into_iter().map(|a| map(a, f)).collect()),
        Or(args) => Or(args.into_iter().map(|a| map(a, f)).collect()),
        Prim { name, args } => Prim { name, args: args.into_iter().map(|a| map(a, f)).collect() },
        App { rator, args } => App { rator, args: args.into_iter().map(|a| map(a, f)).collect() },
        Let { bindings, body } => Let {
            bindings: bindings.into_iter().map(|(n, v)| (n, map(v, f))).collect(),
            body: Box::new(map(*body, f)),
        },
        LetStar { bindings, body } => LetStar {
            bindings: bindings.into_iter().map(|(n, v)| (n, map(v, f))).collect(),
            body: Box::new(map(*body, f)),
        },
        Labels { code, body } => Labels {
            code: code.into_iter().map(|c| Code { body: Box::new(map(*c.body, f)), ..c }).collect(),
            body: Box::new(map(*body, f)),
        },

        e @ (Literal(_) | Identifier(_) | Closure { .. }) => e,
    }
}

/// Closure conversion
///
/// Every lambda not bound by `letrec` is replaced with a closure: a new code
/// block taking the captured variables first and then its own arguments, and
/// a `closure` node in the original position listing the values to capture.
/// Nested lambdas are converted first, so they get the lower labels. The code
/// blocks of the whole program are collected into a single `labels` form.
///
/// ```scheme
/// (let ((x 5)) (lambda (y) (lambda () (fx+ x y))))
///
/// => (labels ((f0 (code (x y) (fx+ x y)))
///             (f1 (code (x y) (closure f0 x y))))
///      (let ((x 5)) (closure f1 x)))
/// ```
///
/// A program without any lambdas comes back unchanged.
pub fn convert(expr: Expr) -> Expr {
    let mut c = Converter::default();
    let body = c.convert(expr);

    if c.codes.is_empty() {
        body
    } else {
        debug!("closure conversion lifted {} lambdas", c.codes.len());
        Labels { code: c.codes, body: Box::new(body) }
    }
}

#[derive(Default)]
struct Converter {
    // Label counter, private to one conversion
    counter: usize,
    codes: Vec<Code>,
}

impl Converter {
    fn label(&mut self) -> String {
        let label = format!("f{}", self.counter);
        self.counter += 1;
        label
    }

    fn convert(&mut self, expr: Expr) -> Expr {
        map(expr, &mut |e: Expr| match e {
            Lambda(lambda) => {
                // Converting the body first needs the annotation from before
                // the conversion, when inner lambdas were still in place.
                let free = match &lambda.free {
                    Some(free) => free.clone(),
                    None => free_vars(&Lambda(lambda.clone())),
                };

                let body = self.convert(*lambda.body);
                let label = self.label();

                self.codes.push(Code {
                    label: label.clone(),
                    formals: free.iter().chain(lambda.formals.iter()).cloned().collect(),
                    body: Box::new(body),
                });

                Closure { label, free }
            }

            Letrec { bindings, body } => Letrec {
                bindings: bindings
                    .into_iter()
                    .map(|(name, lambda)| {
                        let body = Box::new(self.convert(*lambda.body));
                        (name, Lambda { body, ..lambda })
                    })
                    .collect(),
                body: Box::new(self.convert(*body)),
            },

            e => e,
        })
    }
}
