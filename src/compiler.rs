//! Entry point for the Sprig compiler

/// State for the code generator
pub mod state {
    use crate::{asm::ASM, primitives::Registry};

    /// Mutable context of one compilation.
    ///
    /// `li` is the label index, a counter used to generate unique labels. See
    /// `gen_label`. It is owned by the state, so two compilations never share
    /// label numbers.
    ///
    /// `procedures` collects the code of every procedure compiled so far, to
    /// be emitted after the entry point.
    ///
    /// Stack index and the environment are *not* part of the state; they are
    /// passed down explicitly through every recursive call.
    pub struct State<'a> {
        pub registry: &'a Registry,
        pub procedures: ASM,
        li: u64,
    }

    impl<'a> State<'a> {
        pub fn new(registry: &'a Registry) -> Self {
            State { registry, procedures: ASM::default(), li: 0 }
        }

        /// Generate a unique label for jump targets.
        pub fn gen_label(&mut self, prefix: &str) -> String {
            self.li += 1;
            format!("L_{}_{}", prefix, self.li)
        }
    }

    impl Default for State<'static> {
        fn default() -> Self {
            State::new(Registry::standard())
        }
    }
}

/// Emit machine code for the AST.
///
/// Start reading here. Every function here takes the current stack index `si`, the
/// lexical environment and whether the expression is in tail position, and
/// returns code that leaves the value of the expression in RAX.
///
/// Stack index points to the next available empty slot relative to RSP at
/// procedure entry. Use and then decrement the index to add a new variable.
/// Nothing ever needs to be freed since the caller keeps using its own `si`.
pub mod emit {
    use crate::{
        asm::{Ins, ASM},
        compiler::state::State,
        core::{Error, Expr, Ident, Literal, Result},
        env::{Env, Location},
        immediate, lambda, lang, primitives,
        x86::{self, Register::*, WORDSIZE},
    };
    use log::{debug, trace};

    /// Name of the label the trampoline calls into
    pub const ENTRY: &str = "L_scheme_entry";

    /// Emit code for a let expression
    ///
    /// Every right hand side is evaluated in the outer environment and saved
    /// to the next free slot; only the body sees the new names.
    pub fn vars(
        s: &mut State,
        env: &Env,
        si: i64,
        tail: bool,
        bindings: &[(Ident, Expr)],
        body: &Expr,
    ) -> Result<ASM> {
        for (i, (ident, _)) in bindings.iter().enumerate() {
            if bindings[..i].iter().any(|(prev, _)| prev == ident) {
                return Err(Error::Binding(format!("{} bound twice in the same let", ident)));
            }
        }

        let mut asm = ASM::default();
        let mut inner = env.clone();
        let mut si = si;

        for (ident, expr) in bindings {
            asm += eval(s, env, si, false, expr)?;
            asm += x86::save(RAX.into(), si).comment(format!("let bind {}", ident));
            inner = inner.extend(ident.clone(), Location::Stack(si));
            si -= WORDSIZE;
        }

        Ok(asm + eval(s, &inner, si, tail, body)?)
    }

    /// Emit code for a sequential let expression
    ///
    /// Same as `vars`, but each right hand side can see the names bound before
    /// it; a later binding of the same name shadows the earlier one.
    pub fn seq(
        s: &mut State,
        env: &Env,
        si: i64,
        tail: bool,
        bindings: &[(Ident, Expr)],
        body: &Expr,
    ) -> Result<ASM> {
        let mut asm = ASM::default();
        let mut env = env.clone();
        let mut si = si;

        for (ident, expr) in bindings {
            asm += eval(s, &env, si, false, expr)?;
            asm += x86::save(RAX.into(), si).comment(format!("let* bind {}", ident));
            env = env.extend(ident.clone(), Location::Stack(si));
            si -= WORDSIZE;
        }

        Ok(asm + eval(s, &env, si, tail, body)?)
    }

    /// Emit code for a conditional expression
    ///
    /// A conditional in tail position doesn't need an exit label, both
    /// branches return or jump away on their own.
    pub fn cond(
        s: &mut State,
        env: &Env,
        si: i64,
        tail: bool,
        p: &Expr,
        then: &Expr,
        alt: &Expr,
    ) -> Result<ASM> {
        let alt_label = s.gen_label("else");
        let exit_label = s.gen_label("exit");

        let mut asm: ASM = Ins::note(format!("begin if {} {}", alt_label, exit_label)).into();
        asm += test(s, env, si, p, &alt_label)?;
        asm += eval(s, env, si, tail, then)?;

        if !tail {
            asm += x86::jmp(&exit_label);
        }

        asm += x86::label(&alt_label);
        asm += eval(s, env, si, tail, alt)?;

        if !tail {
            asm += x86::label(&exit_label);
        }

        Ok(asm + Ins::note(format!("end if {} {}", alt_label, exit_label)))
    }

    /// Evaluate the predicate of a conditional and jump to `alt` when false
    ///
    /// Predicate primitives set the processor flags and the branch tests them
    /// directly, so no boolean is materialized.
    fn test(s: &mut State, env: &Env, si: i64, p: &Expr, alt: &str) -> Result<ASM> {
        if let Expr::Prim { name, args } = p {
            if let Some((asm, cc)) = primitives::test(s, env, si, name, args)? {
                return Ok(asm + x86::j(cc.negate(), alt).comment("jump to alt if False"));
            }
        }

        Ok(eval(s, env, si, false, p)?
            + x86::cmp(RAX.into(), immediate::FALSE.into()).comment("compare result of test to False")
            + x86::je(alt).comment("jump to alt if False"))
    }

    /// Evaluate an expression into RAX
    ///
    /// Immediates and variables are a single load; everything else recurses
    /// till the base case. Expressions in tail position return to the caller
    /// themselves, either with a `ret` or with a jump to another procedure.
    pub fn eval(s: &mut State, env: &Env, si: i64, tail: bool, prog: &Expr) -> Result<ASM> {
        trace!("si: {} tail: {} {}", si, tail, prog);

        match prog {
            Expr::Literal(l) => Ok(ret(tail, literal(l)?.into())),

            Expr::Identifier(i) => Ok(ret(tail, variable(env, i)?.into())),

            Expr::Prim { name, args } => Ok(ret(tail, primitives::call(s, env, si, name, args)?)),

            Expr::If { pred, then, alt } => cond(s, env, si, tail, pred, then, alt),

            Expr::And(args) => eval(s, env, si, tail, &lang::desugar_and(args)),

            Expr::Or(args) => eval(s, env, si, tail, &lang::desugar_or(args)),

            Expr::Let { bindings, body } => vars(s, env, si, tail, bindings, body),

            Expr::LetStar { bindings, body } => seq(s, env, si, tail, bindings, body),

            Expr::Letrec { bindings, body } => lambda::letrec(s, env, si, tail, bindings, body),

            Expr::App { rator, args } => lambda::call(s, env, si, tail, rator, args),

            Expr::Labels { code, body } => lambda::labels(s, env, si, tail, code, body),

            Expr::Lambda(_) => Err(Error::Shape(format!(
                "{}: a lambda must be bound by letrec or closure converted",
                prog
            ))),

            Expr::Closure { .. } => Err(Error::Shape(format!(
                "{}: allocating closures needs a heap, which isn't supported",
                prog
            ))),
        }
    }

    /// Load the immediate representation of a literal
    pub fn literal(l: &Literal) -> Result<Ins> {
        Ok(x86::mov(RAX.into(), immediate::to(l)?.into()))
    }

    /// Load a variable from its stack slot
    pub fn variable(env: &Env, i: &Ident) -> Result<Ins> {
        match env.lookup(i) {
            Some(Location::Stack(si)) => Ok(x86::load(*si).comment(format!("lookup {}", i))),
            Some(Location::Label { .. }) => Err(Error::Shape(format!(
                "{}: procedures can only be called, not used as values",
                i
            ))),
            None => Err(Error::Resolution(i.to_string())),
        }
    }

    // Return to the caller if the expression is in tail position
    fn ret(tail: bool, asm: ASM) -> ASM {
        if tail {
            asm + x86::ret()
        } else {
            asm
        }
    }

    /// Top level interface to the emit module
    ///
    /// The whole program is compiled or nothing is; the first error aborts.
    pub fn program(s: &mut State, prog: &Expr) -> Result<ASM> {
        let body = eval(s, &Env::default(), -WORDSIZE, true, prog)?;

        debug!("compiled program: {} lines of entry code, {} of procedures", body.len(), s.procedures.len());

        Ok(x86::prelude()
            + x86::trampoline(ENTRY)
            + x86::func(ENTRY)
            + body
            + std::mem::take(&mut s.procedures)
            + x86::epilogue())
    }

}
