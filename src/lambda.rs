//! Scheme procedures
//!
//! Procedures are bound by `letrec` (or come out of closure conversion as
//! code blocks) and compiled once each into a labelled block of code after
//! the program entry. A call site refers to the procedure by label, so there
//! are no procedure values at runtime yet.
//!
//! This module also implements the calling convention, which is a set of
//! rules agreed by the caller of a procedure and its definition regarding
//! how the arguments are passed in and how a result is returned. All
//! arguments are passed in the stack and the result comes back in RAX.
//!
//! ```txt
//!          caller frame                        callee frame
//!
//!  rsp - 8     local                  <- rsp'+8 (caller frame top)
//!  ...         ...
//!  rsp + si    return address         <- rsp'
//!  rsp + si-8  argument 1                rsp' - 8
//!  rsp + si-16 argument 2                rsp' - 16
//! ```
//!
//! The caller evaluates the arguments below its own live slots, leaving one
//! word at `si` free for the return address. It then moves RSP down so the
//! `call` pushes the return address exactly into that word, and the callee
//! finds its arguments at `rsp - 8`, `rsp - 16` and so on, just like the
//! program entry does.
//!
//! A call in tail position doesn't come back, so the caller's frame is dead
//! by the time it jumps. The arguments are moved down over the current
//! arguments and the callee is entered with a `jmp`, reusing the return
//! address of the current frame. Tail calls never grow the stack.
use crate::{
    asm::{Ins, ASM},
    compiler::{emit::eval, state::State},
    core::{Code, Error, Expr, Ident, Lambda, Result},
    env::{Env, Location},
    x86::{self, Register::*, WORDSIZE},
};
use log::debug;

/// Emit code for a letrec expression
///
/// All the names are visible in every lambda and in the body. Lambdas only
/// see other procedures, never the stack slots of the enclosing scope.
pub fn letrec(
    s: &mut State,
    env: &Env,
    si: i64,
    tail: bool,
    bindings: &[(Ident, Lambda)],
    body: &Expr,
) -> Result<ASM> {
    unique(bindings.iter().map(|(name, _)| name), "letrec")?;

    let labels: Vec<String> = bindings.iter().map(|_| s.gen_label("lambda")).collect();

    let mut procs = env.procedures();
    let mut inner = env.clone();

    for ((name, lambda), label) in bindings.iter().zip(&labels) {
        let l = Location::Label { name: label.clone(), arity: lambda.formals.len() };
        procs = procs.extend(name.clone(), l.clone());
        inner = inner.extend(name.clone(), l);
    }

    for ((name, lambda), label) in bindings.iter().zip(&labels) {
        let asm = code(s, &procs, label, &name.to_string(), &lambda.formals, &lambda.body)?;
        s.procedures += asm;
    }

    eval(s, &inner, si, tail, body)
}

/// Emit code for the code blocks of a closure converted program
///
/// Code blocks are compiled like letrec lambdas; they can only be reached
/// through closures, so none of them is bound to a name in the body.
pub fn labels(s: &mut State, env: &Env, si: i64, tail: bool, blocks: &[Code], body: &Expr) -> Result<ASM> {
    let procs = env.procedures();

    for c in blocks {
        let label = s.gen_label(&c.label);
        let asm = code(s, &procs, &label, &c.label, &c.formals, &c.body)?;
        s.procedures += asm;
    }

    eval(s, env, si, tail, body)
}

/// Procedure body
///
/// The first argument is available at `rsp - 8`, next at `rsp - 16` etc. Local
/// variables of the body start right below the last argument and the body is
/// always in tail position.
pub fn code(s: &mut State, procs: &Env, label: &str, name: &str, formals: &[Ident], body: &Expr) -> Result<ASM> {
    unique(formals.iter(), "lambda")?;
    debug!("compiling procedure {} as {}", name, label);

    let mut env = procs.clone();
    let mut si = -WORDSIZE;

    for arg in formals {
        env = env.extend(arg.clone(), Location::Stack(si));
        si -= WORDSIZE;
    }

    Ok(Ins::flush("") + x86::label(label).comment(name) + eval(s, &env, si, true, body)?)
}

/// Emit code for a procedure application. See module docs for details.
pub fn call(s: &mut State, env: &Env, si: i64, tail: bool, rator: &Ident, args: &[Expr]) -> Result<ASM> {
    let (label, arity) = match env.lookup(rator) {
        Some(Location::Label { name, arity }) => (name.clone(), *arity),
        Some(Location::Stack(_)) => {
            return Err(Error::Shape(format!("{}: only procedures bound by letrec can be called", rator)))
        }
        None => return Err(Error::Resolution(rator.to_string())),
    };

    if arity != args.len() {
        return Err(Error::Arity { name: rator.to_string(), expected: arity, found: args.len() });
    }

    let mut asm: ASM = Ins::note(format!("begin ({} ...)", rator)).into();

    if tail {
        // Slot for argument `i`, counting from `si` since no return address
        // is needed
        let at = |i: usize| si - (i as i64) * WORDSIZE;

        for (i, arg) in args.iter().enumerate() {
            asm += eval(s, env, at(i), false, arg)?;
            asm += x86::save(RAX.into(), at(i)).comment(format!("arg {}", arg));
        }

        // Moving front to back can't clobber a later argument since the
        // destination is always at or above the source.
        for i in 0..args.len() {
            let to = -((i as i64) + 1) * WORDSIZE;
            if at(i) != to {
                asm += x86::load(at(i));
                asm += x86::save(RAX.into(), to);
            }
        }

        asm += x86::jmp(&label).comment("tail call");
    } else {
        // Leave `si` free for the return address
        let at = |i: usize| si - (i as i64 + 1) * WORDSIZE;

        for (i, arg) in args.iter().enumerate() {
            asm += eval(s, env, at(i), false, arg)?;
            asm += x86::save(RAX.into(), at(i)).comment(format!("arg {}", arg));
        }

        asm += x86::adjust(si + WORDSIZE);
        asm += x86::call(&label);
        asm += x86::adjust(-(si + WORDSIZE));
    }

    Ok(asm + Ins::note(format!("end ({} ...)", rator)))
}

// Names bound by the same form must be distinct
fn unique<'a>(names: impl Iterator<Item = &'a Ident>, form: &str) -> Result<()> {
    let mut seen: Vec<&Ident> = vec![];

    for name in names {
        if seen.contains(&name) {
            return Err(Error::Binding(format!("{} bound twice in the same {}", name, form)));
        }
        seen.push(name);
    }

    Ok(())
}
