//! Scheme functions implemented within the compiler rather than the runtime.
//!
//! Every primitive is an entry in a [`Registry`]: a name, a fixed arity and a
//! rule for generating code. The compiler never matches on primitive names,
//! so adding a primitive is a single `register` call.
//!
//! Predicates are special: their generator only sets the processor flags and
//! the registry remembers which condition means true. In value position the
//! flags are turned into a boolean, while a conditional branches on them
//! directly.
use crate::{
    asm::{Ins, ASM},
    compiler::{emit::eval, state::State},
    core::{Error, Expr, Result},
    env::Env,
    immediate,
    x86::{self, Cond, Register::*, WORDSIZE},
};
use log::trace;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Code generator for a primitive, called with arguments already checked
/// against the arity.
pub type Generator = fn(&mut State, &Env, i64, &[Expr]) -> Result<ASM>;

/// How a primitive produces its result
#[derive(Clone, Copy)]
pub enum Rule {
    /// Leaves the result in RAX
    Value(Generator),
    /// Sets the flags; the result is true when the condition holds
    Test(Generator, Cond),
}

pub struct Primitive {
    pub name: &'static str,
    pub arity: usize,
    pub rule: Rule,
}

/// Primitives by name
#[derive(Default)]
pub struct Registry(HashMap<&'static str, Primitive>);

static STANDARD: Lazy<Registry> = Lazy::new(|| {
    let mut r = Registry::default();

    r.register("fxadd1", 1, Rule::Value(fxadd1));
    r.register("fxsub1", 1, Rule::Value(fxsub1));
    r.register("fixnum->char", 1, Rule::Value(fixnum_to_char));
    r.register("char->fixnum", 1, Rule::Value(char_to_fixnum));
    r.register("fxlognot", 1, Rule::Value(fxlognot));

    r.register("null?", 1, Rule::Test(nullp, Cond::E));
    r.register("fixnum?", 1, Rule::Test(fixnump, Cond::E));
    r.register("fxzero?", 1, Rule::Test(zerop, Cond::E));
    r.register("boolean?", 1, Rule::Test(booleanp, Cond::E));
    r.register("char?", 1, Rule::Test(charp, Cond::E));
    r.register("not", 1, Rule::Test(not, Cond::E));

    r.register("fx+", 2, Rule::Value(plus));
    r.register("fx-", 2, Rule::Value(minus));
    r.register("fx*", 2, Rule::Value(mul));
    r.register("fxlogand", 2, Rule::Value(logand));
    r.register("fxlogor", 2, Rule::Value(logor));

    for prefix in ["fx", "char"] {
        r.register(leak(format!("{}=", prefix)), 2, Rule::Test(compare, Cond::E));
        r.register(leak(format!("{}<", prefix)), 2, Rule::Test(compare, Cond::L));
        r.register(leak(format!("{}<=", prefix)), 2, Rule::Test(compare, Cond::LE));
        r.register(leak(format!("{}>", prefix)), 2, Rule::Test(compare, Cond::G));
        r.register(leak(format!("{}>=", prefix)), 2, Rule::Test(compare, Cond::GE));
    }

    r
});

// Names of the standard comparisons live as long as the registry itself
fn leak(name: String) -> &'static str {
    Box::leak(name.into_boxed_str())
}

impl Registry {
    /// The primitives every program can use
    pub fn standard() -> &'static Registry {
        &STANDARD
    }

    /// Add a primitive, replacing any earlier one with the same name
    pub fn register(&mut self, name: &'static str, arity: usize, rule: Rule) {
        self.0.insert(name, Primitive { name, arity, rule });
    }

    pub fn lookup(&self, name: &str) -> Option<&Primitive> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

// Find a primitive and check the number of arguments
fn resolve<'r>(registry: &'r Registry, name: &str, args: &[Expr]) -> Result<&'r Primitive> {
    let p = registry.lookup(name).ok_or_else(|| Error::Resolution(name.to_string()))?;

    if p.arity != args.len() {
        return Err(Error::Arity { name: name.to_string(), expected: p.arity, found: args.len() });
    }

    Ok(p)
}

/// Emit code for a primitive call in value position, result in RAX
pub fn call(s: &mut State, env: &Env, si: i64, name: &str, args: &[Expr]) -> Result<ASM> {
    let rule = resolve(s.registry, name, args)?.rule;
    trace!("primitive {} at si {}", name, si);

    let body = match rule {
        Rule::Value(gen) => gen(s, env, si, args)?,
        Rule::Test(gen, cc) => gen(s, env, si, args)? + boolean(cc),
    };

    Ok(Ins::note(format!("begin ({} ...)", name)) + body + Ins::note(format!("end ({} ...)", name)))
}

/// Emit code for a predicate used as the test of a conditional
///
/// Returns the code that sets the flags along with the condition under which
/// the predicate is true, or `None` if `name` isn't a predicate.
pub fn test(s: &mut State, env: &Env, si: i64, name: &str, args: &[Expr]) -> Result<Option<(ASM, Cond)>> {
    match resolve(s.registry, name, args)?.rule {
        Rule::Test(gen, cc) => Ok(Some((gen(s, env, si, args)?, cc))),
        Rule::Value(_) => Ok(None),
    }
}

/// Materialize the flags as a boolean in RAX
///
/// `SETcc` leaves 0 or 1 in AL; shifted to the boolean bit and or'ed with the
/// false pattern it becomes `#f` or `#t`.
pub fn boolean(cc: Cond) -> ASM {
    x86::set(cc)
        + x86::movzx()
        + x86::sal(AL.into(), immediate::BOOL_BIT.into())
        + x86::or(AL.into(), immediate::FALSE.into())
}

// Unary Primitives

/// Increment number by 1
fn fxadd1(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])? + x86::add(RAX.into(), immediate::n(1).into()))
}

/// Decrement by 1
fn fxsub1(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])? + x86::sub(RAX.into(), immediate::n(1).into()))
}

// The fixnum tag is all zeros, so shifting the ordinal into place and adding
// the char tag is enough.
fn fixnum_to_char(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])?
        + x86::shl(RAX.into(), (immediate::CHARSHIFT - immediate::FXSHIFT).into())
        + x86::or(RAX.into(), immediate::CHARTAG.into()))
}

fn char_to_fixnum(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])? + x86::shr(RAX.into(), (immediate::CHARSHIFT - immediate::FXSHIFT).into()))
}

/// Bitwise complement; the tag bits are cleared again after the `not`
fn fxlognot(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])? + x86::not(RAX.into()) + x86::and(RAX.into(), (!immediate::FXMASK).into()))
}

/// Is the expression null?
fn nullp(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])? + x86::cmp(RAX.into(), immediate::NIL.into()))
}

/// Is the expression a fixnum?
///
/// # Examples
///
/// ```scheme
/// (fixnum? 42) => #t
/// (fixnum? #\a) => #f
/// ```
fn fixnump(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])?
        + x86::and(RAX.into(), immediate::FXMASK.into())
        + x86::cmp(RAX.into(), immediate::FXTAG.into()))
}

fn zerop(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])? + x86::cmp(RAX.into(), immediate::n(0).into()))
}

/// Is the expression a boolean?
fn booleanp(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])?
        + x86::and(RAX.into(), immediate::BOOL_MASK.into())
        + x86::cmp(RAX.into(), immediate::FALSE.into()))
}

/// Is the expression a char?
fn charp(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])?
        + x86::and(RAX.into(), immediate::CHARMASK.into())
        + x86::cmp(RAX.into(), immediate::CHARTAG.into()))
}

/// Logical not; true only for `#f`
fn not(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])? + x86::cmp(RAX.into(), immediate::FALSE.into()))
}

// Binary Primitives

/// Evaluate arguments and store the first argument in stack and second in `RAX`
///
/// The second argument is evaluated one slot further down, so it can't
/// clobber the saved first one.
fn binop(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(eval(s, env, si, false, &args[0])?
        + x86::save(RAX.into(), si).comment(format!("save {}", &args[0]))
        + eval(s, env, si - WORDSIZE, false, &args[1])?)
}

/// Add `x` and `y` and move result to register RAX
fn plus(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(binop(s, env, si, args)? + x86::add(RAX.into(), x86::slot(si)))
}

/// Subtract `y` from `x` and move result to register RAX
///
/// `sub` subtracts the 2nd op from the first and stores the result in the 1st,
/// which is the saved `x`.
fn minus(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(binop(s, env, si, args)? + x86::sub(x86::slot(si), RAX.into()) + x86::load(si))
}

/// Multiply `x` and `y` and move result to register RAX
///
/// Both operands carry a factor of 4 from the tag shift; dropping it from one
/// of them leaves the product correctly tagged.
fn mul(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(binop(s, env, si, args)?
        + x86::sar(x86::slot(si), immediate::FXSHIFT.into())
        + x86::imul(RAX.into(), x86::slot(si)))
}

fn logand(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(binop(s, env, si, args)? + x86::and(RAX.into(), x86::slot(si)))
}

fn logor(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(binop(s, env, si, args)? + x86::or(RAX.into(), x86::slot(si)))
}

/// Compares the first operand with the second
///
/// Chars share a tag, so comparing the tagged words orders them by ordinal
/// just like fixnums.
fn compare(s: &mut State, env: &Env, si: i64, args: &[Expr]) -> Result<ASM> {
    Ok(binop(s, env, si, args)? + x86::cmp(x86::slot(si), RAX.into()))
}
