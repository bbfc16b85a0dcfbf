// Integration tests
//
// Every test compiles a program, links it against the runtime with gcc and
// checks what the binary prints.
#![cfg(all(target_arch = "x86_64", target_os = "linux"))]

use once_cell::sync::Lazy;
use quickcheck_macros::quickcheck;
use rand::random;
use serde_json::{json, Value};
use sprig::{cli, core::*};
use std::{fs, process::Command};

const TEST_FOLDER: &str = "/tmp/sprig";

// Nothing to link with otherwise
static GCC: Lazy<bool> = Lazy::new(|| Command::new("gcc").arg("--version").output().is_ok());

fn var(name: &str) -> Value {
    json!({ "var": name })
}

fn chr(c: char) -> Value {
    json!({ "char": c.to_string() })
}

// Step 1: Integers
mod integers {
    use super::*;

    #[test]
    fn unit() {
        for t in &[0, 1, -1, 10, -10, 2736, -2736, 536_870_911, -536_870_912] {
            test1(json!(t), &t.to_string());
        }

        test1(json!(immediate_max()), &immediate_max().to_string());
    }

    fn immediate_max() -> i64 {
        sprig::immediate::FXUPPER
    }

    #[quickcheck]
    fn quick(i: i32) {
        test1(json!(i), &i.to_string())
    }
}

// Step 2: Immediate constants
mod immediate {
    use super::*;

    #[test]
    fn constants() {
        test_many(&[(json!(true), "#t"), (json!(false), "#f"), (json!([]), "()")]);
    }

    #[test]
    fn chars() {
        let named = [('\t', "#\\tab"), ('\n', "#\\newline"), ('\r', "#\\return"), (' ', "#\\space")];

        for (c, out) in named.iter() {
            test1(chr(*c), out);
        }

        for c in "!#$%&'()*+,-./09:;<=>?@ABZ[\\]^_`abz{|}~".chars() {
            test1(chr(c), &format!("#\\{}", c));
        }
    }
}

// Step 3: Unary Primitives
mod unary {
    use super::*;

    #[test]
    fn add1() {
        test_many(&[
            (json!(["fxadd1", 0]), "1"),
            (json!(["fxadd1", -1]), "0"),
            (json!(["fxadd1", 41]), "42"),
            (json!(["fxadd1", -100]), "-99"),
            (json!(["fxadd1", ["fxadd1", ["fxadd1", ["fxadd1", 1]]]]), "5"),
            (json!(["fxsub1", 0]), "-1"),
            (json!(["fxsub1", ["fxadd1", 7]]), "7"),
        ]);
    }

    #[test]
    fn conversions() {
        test_many(&[
            (json!(["fixnum->char", 65]), "#\\A"),
            (json!(["fixnum->char", 32]), "#\\space"),
            (json!(["char->fixnum", chr('a')]), "97"),
            (json!(["char->fixnum", ["fixnum->char", 126]]), "126"),
            (json!(["fixnum->char", ["fxadd1", ["char->fixnum", chr('y')]]]), "#\\z"),
        ]);
    }

    #[test]
    fn lognot() {
        test_many(&[
            (json!(["fxlognot", 0]), "-1"),
            (json!(["fxlognot", -1]), "0"),
            (json!(["fxlognot", 41]), "-42"),
            (json!(["fxlognot", ["fxlognot", 237463]]), "237463"),
        ]);
    }

    #[test]
    fn types() {
        test_many(&[
            (json!(["fixnum?", 0]), "#t"),
            (json!(["fixnum?", -536870912]), "#t"),
            (json!(["fixnum?", true]), "#f"),
            (json!(["fixnum?", []]), "#f"),
            (json!(["fixnum?", chr('a')]), "#f"),
            (json!(["boolean?", false]), "#t"),
            (json!(["boolean?", true]), "#t"),
            (json!(["boolean?", 0]), "#f"),
            (json!(["boolean?", []]), "#f"),
            (json!(["boolean?", chr('/')]), "#f"),
            (json!(["char?", chr('a')]), "#t"),
            (json!(["char?", 0]), "#f"),
            (json!(["char?", false]), "#f"),
            (json!(["char?", []]), "#f"),
            (json!(["null?", []]), "#t"),
            (json!(["null?", false]), "#f"),
            (json!(["null?", 0]), "#f"),
        ]);
    }

    #[test]
    fn zero() {
        test_many(&[
            (json!(["fxzero?", 0]), "#t"),
            (json!(["fxzero?", 1]), "#f"),
            (json!(["fxzero?", ["fxsub1", 1]]), "#t"),
            (json!(["fxzero?", false]), "#f"),
        ]);
    }

    #[test]
    fn not() {
        test_many(&[
            (json!(["not", false]), "#t"),
            (json!(["not", true]), "#f"),
            (json!(["not", 0]), "#f"),
            (json!(["not", []]), "#f"),
            (json!(["not", ["not", 15]]), "#t"),
            (json!(["not", ["fxzero?", 1]]), "#t"),
        ]);
    }
}

// Step 4: Binary primitives
mod binary {
    mod unit {
        use super::super::*;

        #[test]
        fn arithmetic() {
            test_many(&[
                (json!(["fx+", 10, 20]), "30"),
                (json!(["fx+", 40, ["fxadd1", ["fxadd1", 0]]]), "42"),
                (json!(["fx-", 10, 20]), "-10"),
                (json!(["fx-", ["fx-", 10, 3], ["fx-", 1, 5]]), "11"),
                (json!(["fx*", 6, 7]), "42"),
                (json!(["fx*", -3, ["fx+", 2, 2]]), "-12"),
                (json!(["fxlogand", 12, 10]), "8"),
                (json!(["fxlogor", 12, 10]), "14"),
                (json!(["fxlogor", ["fxlogand", 7, 3], 8]), "11"),
            ]);
        }

        #[test]
        fn compare() {
            test_many(&[
                (json!(["fx=", 12, 12]), "#t"),
                (json!(["fx=", 12, 13]), "#f"),
                (json!(["fx<", 12, 13]), "#t"),
                (json!(["fx<", -1, -2]), "#f"),
                (json!(["fx<=", 12, 12]), "#t"),
                (json!(["fx>", 13, 12]), "#t"),
                (json!(["fx>=", 12, 13]), "#f"),
                (json!(["char=", chr('a'), chr('a')]), "#t"),
                (json!(["char<", chr('a'), chr('b')]), "#t"),
                (json!(["char>", chr('a'), chr('b')]), "#f"),
                (json!(["char<=", chr('b'), chr('b')]), "#t"),
                (json!(["char>=", chr('a'), chr('b')]), "#f"),
            ]);
        }
    }

    mod quick {
        use super::super::*;

        #[quickcheck]
        fn plus(x: i32, y: i32) {
            test1(json!(["fx+", x, y]), &(i64::from(x) + i64::from(y)).to_string())
        }

        #[quickcheck]
        fn minus(x: i32, y: i32) {
            test1(json!(["fx-", x, y]), &(i64::from(x) - i64::from(y)).to_string())
        }

        #[quickcheck]
        fn multiply(x: i16, y: i16) {
            test1(json!(["fx*", x, y]), &(i64::from(x) * i64::from(y)).to_string())
        }

        #[quickcheck]
        fn less(x: i32, y: i32) {
            test1(json!(["fx<", x, y]), if x < y { "#t" } else { "#f" })
        }
    }
}

// Step 5: Conditionals
mod cond {
    use super::*;

    #[test]
    fn simple() {
        test_many(&[
            (json!(["if", true, 12, 13]), "12"),
            (json!(["if", false, 12, 13]), "13"),
            (json!(["if", 0, 12, 13]), "12"),
            (json!(["if", [], 43, []]), "43"),
            (json!(["if", chr('a'), 1, 2]), "1"),
            (json!(["if", ["if", false, true, false], 1, 2]), "2"),
            (json!(["if", ["fxzero?", 0], 12, 13]), "12"),
            (json!(["if", ["fxzero?", 1], 12, 13]), "13"),
            (json!(["fxadd1", ["if", ["fx<", 1, 2], 41, 0]]), "42"),
        ]);
    }

    #[test]
    fn predicates() {
        // Comparisons used directly as the test of a branch
        test_many(&[
            (json!(["if", ["fx<", 1, 2], chr('y'), chr('n')]), "#\\y"),
            (json!(["if", ["fx>=", 1, 2], chr('y'), chr('n')]), "#\\n"),
            (json!(["if", ["char=", chr('a'), chr('a')], 1, 0]), "1"),
            (json!(["if", ["not", ["null?", []]], 1, 0]), "0"),
            (json!(["if", ["boolean?", 3], 1, 0]), "0"),
        ]);
    }
}

// Step 6: and & or
mod logic {
    use super::*;

    // A procedure that never returns
    fn diverge(body: Value) -> Value {
        json!(["letrec", [["loop", ["lambda", [], ["loop"]]]], body])
    }

    #[test]
    fn and() {
        test_many(&[
            (json!(["and"]), "#t"),
            (json!(["and", 5]), "5"),
            (json!(["and", 1, 2, 3]), "3"),
            (json!(["and", 1, false, 3]), "#f"),
            (diverge(json!(["and", false, ["loop"]])), "#f"),
        ]);
    }

    #[test]
    fn or() {
        test_many(&[
            (json!(["or"]), "#f"),
            (json!(["or", 5]), "5"),
            (json!(["or", false, false, 3]), "3"),
            (json!(["or", false, false]), "#f"),
            (json!(["or", ["fxadd1", 4], 1]), "5"),
            (json!(["or", ["fx<", 2, 1], ["fxsub1", 1]]), "0"),
            (diverge(json!(["or", 7, ["loop"]])), "7"),
        ]);
    }
}

// Step 7: Let bindings
mod bindings {
    use super::*;

    #[test]
    fn simple() {
        test_many(&[
            (json!(["let", [[var("x"), 5]], var("x")]), "5"),
            (json!(["let", [[var("x"), ["fx+", 1, 2]]], var("x")]), "3"),
            (json!(["let", [[var("x"), 3], [var("y"), 4]], ["fx+", var("x"), var("y")]]), "7"),
            (json!(["let", [], 7]), "7"),
        ]);
    }

    #[test]
    fn nested_scopes() {
        test_many(&[
            (json!(["let", [[var("x"), 1]], ["let", [[var("y"), 2]], ["fx+", var("x"), var("y")]]]), "3"),
            (json!(["let", [[var("x"), 1]], ["let", [[var("x"), 2]], var("x")]]), "2"),
            (
                json!(["let", [[var("x"), 1]], ["fx+", ["let", [[var("x"), 10]], var("x")], var("x")]]),
                "11",
            ),
        ]);
    }

    #[test]
    fn sequential() {
        let inner = |form: &str| {
            json!(["let*", [[var("x"), 1]],
                [form, [[var("x"), ["fx+", var("x"), 1]], [var("y"), ["fx+", var("x"), 1]]], var("y")]])
        };

        test_many(&[
            (inner("let*"), "3"),
            (inner("let"), "2"),
            (json!(["let*", [[var("x"), 1], [var("x"), ["fxadd1", var("x")]]], var("x")]), "2"),
            (json!(["let*", [[var("x"), 5], [var("y"), ["fx*", var("x"), 2]]], ["fx-", var("y"), var("x")]]), "5"),
        ]);
    }
}

// Step 8: Procedures
mod procedures {
    use super::*;

    #[test]
    fn simple() {
        test_many(&[
            (json!(["letrec", [["f", ["lambda", [], 5]]], ["f"]]), "5"),
            (json!(["letrec", [["f", ["lambda", [var("x")], ["fxadd1", var("x")]]]], ["f", 41]]), "42"),
            (
                json!(["letrec", [["f", ["lambda", [var("x"), var("y")], ["fx-", var("x"), var("y")]]]], ["f", 10, 3]]),
                "7",
            ),
        ]);
    }

    #[test]
    fn use_results() {
        // Calls in non tail position must leave the live slots alone
        test_many(&[
            (
                json!(["letrec", [["f", ["lambda", [var("x")], ["fx*", var("x"), 2]]]],
                    ["let", [[var("a"), 1], [var("b"), 2]],
                        ["fx+", var("a"), ["fx+", ["f", var("b")], ["f", 10]]]]]),
                "25",
            ),
            (
                json!(["letrec", [["f", ["lambda", [var("x")], ["let", [[var("y"), 100]], ["fx+", var("x"), var("y")]]]]],
                    ["fx+", ["f", 1], ["f", ["f", 2]]]]),
                "303",
            ),
        ]);
    }

    #[test]
    fn nested() {
        // letrec inside a let body and a procedure calling a sibling
        test1(
            json!(["let", [[var("x"), 2]],
                ["letrec", [
                    ["sq", ["lambda", [var("n")], ["fx*", var("n"), var("n")]]],
                    ["quad", ["lambda", [var("n")], ["sq", ["sq", var("n")]]]]],
                    ["fx+", var("x"), ["quad", var("x")]]]]),
            "18",
        );
    }

    #[test]
    fn recursive() {
        let fact = json!(["letrec", [["fact", ["lambda", [var("n")],
            ["if", ["fxzero?", var("n")], 1, ["fx*", var("n"), ["fact", ["fxsub1", var("n")]]]]]]],
            ["fact", 10]]);

        test1(fact, "3628800");

        let sum = json!(["letrec", [["sum", ["lambda", [var("n")],
            ["if", ["fxzero?", var("n")], 0, ["fx+", var("n"), ["sum", ["fxsub1", var("n")]]]]]]],
            ["sum", 1000]]);

        test1(sum, "500500");
    }

    #[test]
    fn mutual() {
        test1(even_odd(25), "#f");
        test1(even_odd(24), "#t");
    }
}

// Step 9: Proper tail calls
mod tco {
    use super::*;

    #[test]
    fn countdown() {
        let prog = json!(["letrec", [["countdown", ["lambda", [var("n")],
            ["if", ["fxzero?", var("n")], var("n"), ["countdown", ["fxsub1", var("n")]]]]]],
            ["countdown", 50005000]]);

        test1(prog, "0");
    }

    #[test]
    fn accumulator() {
        let prog = json!(["letrec", [["sum", ["lambda", [var("n"), var("ac")],
            ["if", ["fxzero?", var("n")], var("ac"), ["sum", ["fxsub1", var("n")], ["fx+", var("n"), var("ac")]]]]]],
            ["sum", 10000, 0]]);

        test1(prog, "50005000");
    }

    #[test]
    fn mutual() {
        test1(even_odd(5_000_000), "#t");
    }

    #[test]
    fn swap() {
        // Arguments swap places on every iteration
        let prog = json!(["letrec", [["f", ["lambda", [var("n"), var("a"), var("b")],
            ["if", ["fxzero?", var("n")], ["fx-", var("a"), var("b")], ["f", ["fxsub1", var("n")], var("b"), var("a")]]]]],
            ["f", 1_000_001, 1, 2]]);

        test1(prog, "1");
    }
}

// Failures are reported before anything is assembled
mod errors {
    use super::*;

    fn compile(program: Value) -> Result<Option<String>> {
        let config = Config { program: program.to_string(), output: "/dev/null".into(), convert: false };
        cli::run(&config, cli::Action::Parse).and_then(|_| {
            let folder = folder();
            let config = Config { output: format!("{}/sprig", folder), ..config };
            let result = cli::run(&config, cli::Action::GenASM);
            fs::remove_dir_all(&folder).unwrap_or_default();
            result
        })
    }

    #[test]
    fn taxonomy() {
        assert!(matches!(compile(json!(["fxadd1", 1, 2])), Err(Error::Arity { .. })));
        assert!(matches!(compile(var("x")), Err(Error::Resolution(_))));
        assert!(matches!(compile(json!(["let", [["x", 1]], 1])), Err(Error::Binding(_))));
        assert!(matches!(compile(json!(["if", 1])), Err(Error::Shape(_))));
        assert!(matches!(compile(json!(4611686018427387904_i64)), Err(Error::Representation(_))));
        assert!(matches!(compile(json!(["lambda", [], 1])), Err(Error::Shape(_))));
    }
}

fn even_odd(n: i64) -> Value {
    let x = var("x");

    json!(["letrec", [
        ["e", ["λ", [x], ["if", ["fxzero?", x], true, ["o", ["fxsub1", x]]]]],
        ["o", ["λ", [x], ["if", ["fxzero?", x], false, ["e", ["fxsub1", x]]]]]],
        ["e", n]])
}

// A fresh folder per test, so tests can run in parallel
fn folder() -> String {
    let base_folder = format!("{}/{:x?}", TEST_FOLDER, random::<u32>());
    fs::create_dir_all(&base_folder).unwrap();
    base_folder
}

// Get a test config with program as input
fn config(base_folder: &str, program: String) -> Config {
    let output = format!("{}/sprig", base_folder);

    Config { program, output, convert: false }
}

fn test_many(tests: &[(Value, &str)]) {
    for (inp, out) in tests.iter() {
        test1(inp.clone(), out);
    }
}

// Run a single test, assert everything and cleanup afterwards
fn test1(input: Value, output: &str) {
    if !*GCC {
        return;
    }

    let base_folder = folder();
    let program = input.to_string();
    fs::write(format!("{}/test.json", base_folder), &program).unwrap();

    let config = config(&base_folder, program);
    let result = cli::run(&config, cli::Action::Run);

    match result {
        Ok(Some(result)) => {
            assert_eq!(result, output, "Failed: {} != {}", input, output);
        }
        Ok(None) => panic!("Test produced no output"),
        Err(e) => panic!("{}", cli::report(&e)),
    }

    // Clean up all the intermediary files generated
    fs::remove_dir_all(&base_folder).unwrap_or_default()
}
