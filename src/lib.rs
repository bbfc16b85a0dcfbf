/*!

# Sprig, an incremental scheme compiler

A tiny scheme to x86-64 asm compiler in the style of the paper [An Incremental
Approach to Compiler Construction][paper] by Abdulaziz Ghuloum.

Programs come in as a JSON encoded tree (see [`tree`]) rather than source
text, are optionally closure converted (see [`lang`]) and compiled straight
to GNU assembler text. The assembly is linked against a tiny C runtime,
`runtime.c`, which hands the program a stack and prints the result.

```bash
$ echo '["fx+", 1, 2]' | cargo run -q
3
$ echo '["fx+", 1, 2]' | cargo run -q -- -S
```

## Where do I get started? 🕵️‍♀️

Read the first few sections of the paper to understand the premise, then
[`compiler::emit`] which is the heart of the code generator.

- [`immediate`] is how values are represented at runtime.
- [`env`] maps names to where they live.
- [`primitives`] has every built in operation, one generator each.
- [`lambda`] implements the calling convention and proper tail calls.

## Background Reading 📚

- [x86 module documentation](crate::x86) contains links to a few good x86 tutorials.
- [The Rust Programming language][book] book is a good place to start learning rust.
- [Closure conversion: How to compile lambda][cc] explains [`lang::convert`].

## Debugging

Set `RUST_LOG=sprig=debug` to see what the compiler is up to; `trace` logs
every node as it is compiled.

```bash
$ echo '["fxadd1", 41]' | RUST_LOG=sprig=trace cargo run -q -- -S
```

[book]:  https://doc.rust-lang.org/book/#the-rust-programming-language
[cc]:    http://matt.might.net/articles/closure-conversion/
[paper]: http://scheme2006.cs.uchicago.edu/11-ghuloum.pdf

*/

pub mod asm;
pub mod cli;
pub mod compiler;
pub mod core;
pub mod env;
pub mod immediate;
pub mod lambda;
pub mod lang;
pub mod primitives;
pub mod tree;
pub mod x86;
