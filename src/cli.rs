//! Command line interface for sprig

use crate::{
    asm::FileSink,
    compiler::{emit, state::State},
    core::{Config, Error, Expr, Result},
    lang,
    primitives::Registry,
    tree,
};
use colored::Colorize;
use log::debug;
use std::{path::PathBuf, process::Command};

/// Path to the C runtime linked into every program
pub const RUNTIME: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/runtime.c");

#[derive(Copy, Clone, Debug)]
pub enum Action {
    Parse,
    GenASM,
    Run,
}

pub fn run(config: &Config, action: Action) -> Result<Option<String>> {
    let registry = Registry::standard();
    let prog = tree::parse(&config.program, registry)?;

    let prog = if config.convert {
        let converted = lang::convert(lang::annotate(prog));
        debug!("closure converted: {}", converted);
        converted
    } else {
        prog
    };

    match action {
        Action::Parse => Ok(Some(prog.to_string())),
        Action::GenASM => {
            gen(config, &prog, registry)?;

            Ok(None)
        }
        Action::Run => {
            gen(config, &prog, registry)?;
            build(config)?;
            exec(config)
        }
    }
}

/// Compile the program and write the asm to `config.asm()`
///
/// Nothing is written unless the whole program compiles.
pub fn gen(config: &Config, prog: &Expr, registry: &Registry) -> Result<()> {
    let asm = emit::program(&mut State::new(registry), prog)?;

    let mut sink = FileSink::create(config.asm())
        .map_err(|e| Error::Internal { message: format!("Failed to create {}", config.asm()), e: Some(e) })?;

    asm.write(&mut sink)
        .map_err(|e| Error::Internal { message: format!("Failed to write to {}", config.asm()), e: Some(e) })
}

/// Assemble `config.asm()` and link it with the C runtime
pub fn build(config: &Config) -> Result<()> {
    let mut cmd = Command::new("gcc");
    cmd.arg("-m64")
        .arg("-g")
        .arg("-fomit-frame-pointer")
        .arg("-fno-asynchronous-unwind-tables")
        .arg("-O0")
        .arg(RUNTIME)
        .arg(config.asm())
        .arg("-o")
        .arg(&config.output);

    debug!("{:?}", cmd);

    let exe = cmd
        .output()
        .map_err(|e| Error::Internal { message: String::from("Failed to execute C compiler"), e: Some(e) })?;

    if exe.status.success() {
        Ok(())
    } else {
        Err(Error::Internal {
            message: format!("Failed to compile generated machine code. \n{}", String::from_utf8_lossy(&exe.stderr)),
            e: None,
        })
    }
}

/// Execute the linked program and capture what it printed
pub fn exec(config: &Config) -> Result<Option<String>> {
    use std::os::unix::process::ExitStatusExt;

    let path = PathBuf::from(&config.output).canonicalize()?;

    // A crashed child is still `Ok` here; only the status tells.
    let exe = Command::new(&path).output()?;

    if exe.status.success() {
        Ok(Some(String::from_utf8_lossy(&exe.stdout).trim().to_string()))
    } else {
        Err(Error::Runtime(format!(
            "Child process failed with code: `{:?}` & signal: {:?}\n{}",
            exe.status.code(),
            exe.status.signal(),
            String::from_utf8_lossy(&exe.stderr).trim()
        )))
    }
}

/// Render an error for the terminal with a banner naming the stage that failed
pub fn report(e: &Error) -> String {
    let banner = match e {
        Error::Input(_) => "Failed to read program",
        Error::Internal { .. } => "Something went wrong!",
        Error::Runtime(_) => "Runtime error!",
        Error::Representation(_)
        | Error::Shape(_)
        | Error::Resolution(_)
        | Error::Arity { .. }
        | Error::Binding(_) => "Failed to compile program",
    };

    format!("{}\n\n{}", banner.red().bold(), e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(program: &str, convert: bool) -> Config {
        Config { program: program.into(), output: "/dev/null".into(), convert }
    }

    #[test]
    fn parse() {
        let out = run(&config(r#"["fx+", 1, {"var": "x"}]"#, false), Action::Parse).unwrap();
        assert_eq!(out, Some("(fx+ 1 x)".into()));
    }

    #[test]
    fn convert() {
        let prog = r#"["let", [[{"var": "x"}, 5]], ["lambda", [{"var": "y"}], ["fx+", {"var": "x"}, {"var": "y"}]]]"#;

        let out = run(&config(prog, true), Action::Parse).unwrap();
        assert_eq!(out, Some("(labels ((f0 (code (x y) (fx+ x y)))) (let ((x 5)) (closure f0 x)))".into()));

        // Closures need a heap
        assert!(matches!(run(&config(prog, true), Action::GenASM), Err(Error::Shape(_))));
    }

    #[test]
    fn errors() {
        let e = run(&config(r#"["fxadd1"]"#, false), Action::GenASM).unwrap_err();

        assert!(matches!(e, Error::Arity { .. }));
        assert!(report(&e).contains("`fxadd1` expects 1 argument(s), found 0"));
        assert!(report(&e).contains("Failed to compile program"));

        let e = run(&config("[", false), Action::Parse).unwrap_err();
        assert!(report(&e).contains("Failed to read program"));
    }
}
