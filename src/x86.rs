//! A tiny x86-64 DSL
//!
//! Just enough of the instruction set to write the code generator without
//! formatting strings by hand everywhere. The emitted text is GNU assembler
//! in Intel syntax without register prefixes, ie. `mov rax, 42`.
//!
//! A few good places to start learning x86 assembly:
//!
//! - [x86-64 Assembly Language Programming with Ubuntu][ubuntu]
//! - [Intel® 64 and IA-32 Architectures Software Developer Manuals][intel]
//! - [GNU assembler directives][gas]
//!
//! [ubuntu]: http://www.egr.unlv.edu/~ed/assembly64.pdf
//! [intel]: https://software.intel.com/en-us/articles/intel-sdm
//! [gas]: https://sourceware.org/binutils/docs/as/Pseudo-Ops.html
use crate::asm::{Ins, ASM};
use std::{fmt, ops::Add};

/// Size of a machine word in bytes
pub const WORDSIZE: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    /// Accumulator; every expression leaves its value here
    RAX,
    /// Low byte of RAX, target of `SETcc`
    AL,
    /// Stack pointer; all local slots are addressed relative to it
    RSP,
    /// First argument in System V AMD64 ABI
    RDI,
}

/// Memory addressed relative to a register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relative {
    pub register: Register,
    pub offset: i64,
}

/// Operand of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Register(Register),
    Relative(Relative),
    Const(i64),
}

/// Condition codes, shared by `SETcc` and `Jcc`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    E,
    NE,
    L,
    LE,
    G,
    GE,
}

impl Cond {
    /// The condition that holds exactly when `self` doesn't
    pub fn negate(self) -> Cond {
        match self {
            Cond::E => Cond::NE,
            Cond::NE => Cond::E,
            Cond::L => Cond::GE,
            Cond::GE => Cond::L,
            Cond::G => Cond::LE,
            Cond::LE => Cond::G,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

impl fmt::Display for Relative {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.offset {
            0 => write!(f, "QWORD PTR [{}]", self.register),
            o if o > 0 => write!(f, "QWORD PTR [{} + {}]", self.register, o),
            o => write!(f, "QWORD PTR [{} - {}]", self.register, -o),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Reference::Register(r) => write!(f, "{}", r),
            Reference::Relative(r) => write!(f, "{}", r),
            Reference::Const(c) => write!(f, "{}", c),
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

impl From<Register> for Reference {
    fn from(r: Register) -> Self {
        Reference::Register(r)
    }
}

impl From<Relative> for Reference {
    fn from(r: Relative) -> Self {
        Reference::Relative(r)
    }
}

impl From<i64> for Reference {
    fn from(i: i64) -> Self {
        Reference::Const(i)
    }
}

/// `RSP + si` reads nicer than a struct literal in the code generator
impl Add<i64> for Register {
    type Output = Relative;

    fn add(self, offset: i64) -> Relative {
        Relative { register: self, offset }
    }
}

/// Stack slot at index `si`
pub fn slot(si: i64) -> Reference {
    Reference::Relative(Register::RSP + si)
}

pub fn mov(to: Reference, from: Reference) -> Ins {
    Ins::new(format!("mov {}, {}", to, from))
}

pub fn add(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("add {}, {}", r, v))
}

pub fn sub(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("sub {}, {}", r, v))
}

pub fn imul(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("imul {}, {}", r, v))
}

pub fn and(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("and {}, {}", r, v))
}

pub fn or(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("or {}, {}", r, v))
}

pub fn not(r: Reference) -> Ins {
    Ins::new(format!("not {}", r))
}

/// Shift arithmetic left
pub fn sal(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("sal {}, {}", r, v))
}

/// Shift arithmetic right, preserves the sign
pub fn sar(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("sar {}, {}", r, v))
}

/// Shift logical right
pub fn shr(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("shr {}, {}", r, v))
}

/// Shift logical left
pub fn shl(r: Reference, v: Reference) -> Ins {
    Ins::new(format!("shl {}, {}", r, v))
}

/// Compare sets the status flags as if `b` was subtracted from `a`
pub fn cmp(a: Reference, b: Reference) -> Ins {
    Ins::new(format!("cmp {}, {}", a, b))
}

/// Set AL to 1 if the condition holds, 0 otherwise
pub fn set(cc: Cond) -> Ins {
    Ins::new(format!("set{} al", cc))
}

/// Copy AL into RAX, zero extending the rest
pub fn movzx() -> Ins {
    Ins::new("movzx rax, al")
}

/// Save a register to the stack slot at `si`
pub fn save(r: Reference, si: i64) -> Ins {
    mov(slot(si), r)
}

/// Load the stack slot at `si` into RAX
pub fn load(si: i64) -> Ins {
    mov(Register::RAX.into(), slot(si))
}

pub fn label(l: &str) -> Ins {
    Ins::flush(format!("{}:", l))
}

pub fn jmp(l: &str) -> Ins {
    Ins::new(format!("jmp {}", l))
}

pub fn je(l: &str) -> Ins {
    j(Cond::E, l)
}

/// Conditional jump
pub fn j(cc: Cond, l: &str) -> Ins {
    Ins::new(format!("j{} {}", cc, l))
}

pub fn call(l: &str) -> Ins {
    Ins::new(format!("call {}", l))
}

pub fn ret() -> Ins {
    Ins::new("ret")
}

/// Adjust the stack pointer by `offset` bytes, emits nothing for 0
pub fn adjust(offset: i64) -> ASM {
    match offset {
        0 => ASM::default(),
        o if o > 0 => add(Register::RSP.into(), o.into()).into(),
        o => sub(Register::RSP.into(), (-o).into()).into(),
    }
}

/// Platform specific name of a global symbol
///
/// On macos, C symbols must be prefixed with an underscore like `_main`.
#[cfg(target_os = "macos")]
pub fn symbol(name: &str) -> String {
    format!("_{}", name)
}

#[cfg(not(target_os = "macos"))]
pub fn symbol(name: &str) -> String {
    name.to_string()
}

/// Assembler directives that must come before any code
pub fn prelude() -> ASM {
    Ins::new(".intel_syntax noprefix") + Ins::new(".text")
}

/// Directives at the very end of the file
#[cfg(target_os = "linux")]
pub fn epilogue() -> ASM {
    // Without this note the linker assumes the stack must be executable
    Ins::new(".section .note.GNU-stack,\"\",@progbits").into()
}

#[cfg(not(target_os = "linux"))]
pub fn epilogue() -> ASM {
    ASM::default()
}

/// Header of a global function
pub fn func(name: &str) -> ASM {
    let mut asm = ASM::default();

    asm += Ins::flush("");
    asm += Ins::flush(format!(".globl {}", name));

    #[cfg(target_os = "linux")]
    {
        asm += Ins::new(format!(".type {}, @function", name));
    }

    asm += label(name);

    asm
}

/// Outer entry point called from C as `scheme_entry(stack_base)`
///
/// Switches to the stack handed in by the runtime, calls into the compiled
/// program at `entry` and restores the C stack before returning the result
/// in RAX. The C stack pointer is kept in the first slot of the new stack.
pub fn trampoline(entry: &str) -> ASM {
    use Register::*;

    func(&symbol("scheme_entry"))
        + mov(RAX.into(), RSP.into()).comment("save the C stack pointer")
        + mov(RSP.into(), RDI.into()).comment("rdi has the stack base")
        + Ins::new("push rax")
        + call(entry)
        + Ins::new("pop rsp").comment("restore the C stack pointer")
        + ret()
}
