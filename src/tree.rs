//! Decode programs from a structured JSON tree
//!
//! Programs arrive already parsed; there is no surface syntax. The tree maps
//! onto `Expr` one node at a time:
//!
//! ```txt
//! <expr> → 42 | true | false | [] | {"char": "a"} | {"var": "x"}
//!        | ["if", <expr>, <expr>, <expr>]
//!        | ["and", <expr>*] | ["or", <expr>*]
//!        | ["let", [[<var>, <expr>]*], <expr>]
//!        | ["let*", [[<var>, <expr>]*], <expr>]
//!        | ["letrec", [[<name>, <lambda>]*], <expr>]
//!        | ["lambda", [<var>*], <expr>]
//!        | [<name>, <expr>*]
//! ```
//!
//! The last form is a primitive call if the registry knows the name and an
//! application otherwise. Binding positions take variables, not plain
//! strings, so `["let", [["x", 1]], ...]` is rejected.
use crate::{
    core::{Error, Expr, Ident, Lambda, Literal, Result},
    immediate,
    primitives::Registry,
};
use serde_json::{Map, Value};

/// Decode a program from JSON source text
pub fn parse(source: &str, registry: &Registry) -> Result<Expr> {
    let value: Value = serde_json::from_str(source)?;
    read(&value, registry)
}

/// Decode a single expression
pub fn read(v: &Value, registry: &Registry) -> Result<Expr> {
    match v {
        Value::Bool(b) => Ok((*b).into()),

        Value::Number(n) => match n.as_i64() {
            Some(i) if (immediate::FXLOWER..=immediate::FXUPPER).contains(&i) => Ok(i.into()),
            _ => Err(Error::Representation(n.to_string())),
        },

        Value::Object(o) => atom(o),

        Value::Array(items) => match items.as_slice() {
            [] => Ok(Literal::Nil.into()),
            [Value::String(head), rest @ ..] => form(head, rest, v, registry),
            _ => Err(shape(v)),
        },

        Value::String(_) | Value::Null => Err(shape(v)),
    }
}

fn shape(v: &Value) -> Error {
    Error::Shape(v.to_string())
}

// Characters and variables, the tagged objects
fn atom(o: &Map<String, Value>) -> Result<Expr> {
    if o.len() != 1 {
        return Err(Error::Shape(Value::Object(o.clone()).to_string()));
    }

    match o.iter().next() {
        Some((k, Value::String(s))) if k == "char" => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii() => Ok(c.into()),
                _ => Err(Error::Representation(format!("#\\{}", s))),
            }
        }
        Some((k, Value::String(name))) if k == "var" => Ok(Expr::Identifier(ident(name)?)),
        _ => Err(Error::Shape(Value::Object(o.clone()).to_string())),
    }
}

fn ident(name: &str) -> Result<Ident> {
    let i = Ident::from(name);

    if name.is_empty() {
        Err(Error::Shape("empty variable name".into()))
    } else if i.reserved() {
        Err(Error::Binding(format!("{} is reserved for the compiler", name)))
    } else {
        Ok(i)
    }
}

// Left hand side of a binding or a formal argument
fn variable(v: &Value) -> Result<Ident> {
    match v {
        Value::Object(o) => match atom(o)? {
            Expr::Identifier(i) => Ok(i),
            e => Err(Error::Binding(e.to_string())),
        },
        _ => Err(Error::Binding(v.to_string())),
    }
}

fn form(head: &str, rest: &[Value], v: &Value, registry: &Registry) -> Result<Expr> {
    let read_all = |args: &[Value]| args.iter().map(|a| read(a, registry)).collect::<Result<Vec<Expr>>>();

    match (head, rest) {
        ("if", [p, t, e]) => Ok(Expr::cond(read(p, registry)?, read(t, registry)?, read(e, registry)?)),
        ("if", _) => Err(shape(v)),

        ("and", args) => Ok(Expr::And(read_all(args)?)),
        ("or", args) => Ok(Expr::Or(read_all(args)?)),

        ("let", [Value::Array(bindings), body]) => Ok(Expr::Let {
            bindings: self::bindings(bindings, registry)?,
            body: Box::new(read(body, registry)?),
        }),
        ("let*", [Value::Array(bindings), body]) => Ok(Expr::LetStar {
            bindings: self::bindings(bindings, registry)?,
            body: Box::new(read(body, registry)?),
        }),
        ("let" | "let*", _) => Err(shape(v)),

        ("letrec", [Value::Array(bindings), body]) => {
            let bindings = bindings
                .iter()
                .map(|b| match b {
                    Value::Array(pair) => match pair.as_slice() {
                        [Value::String(name), l] => Ok((ident(name)?, lambda(l, registry)?)),
                        [name, l] => Ok((variable(name)?, lambda(l, registry)?)),
                        _ => Err(shape(b)),
                    },
                    _ => Err(shape(b)),
                })
                .collect::<Result<Vec<(Ident, Lambda)>>>()?;

            Ok(Expr::Letrec { bindings, body: Box::new(read(body, registry)?) })
        }
        ("letrec", _) => Err(shape(v)),

        ("lambda" | "λ", _) => Ok(Expr::Lambda(lambda(v, registry)?)),

        (name, args) if registry.contains(name) => Ok(Expr::prim(name, read_all(args)?)),
        (name, args) => Ok(Expr::App { rator: ident(name)?, args: read_all(args)? }),
    }
}

fn bindings(bindings: &[Value], registry: &Registry) -> Result<Vec<(Ident, Expr)>> {
    bindings
        .iter()
        .map(|b| match b {
            Value::Array(pair) => match pair.as_slice() {
                [lhs, rhs] => Ok((variable(lhs)?, read(rhs, registry)?)),
                _ => Err(shape(b)),
            },
            _ => Err(shape(b)),
        })
        .collect()
}

fn lambda(v: &Value, registry: &Registry) -> Result<Lambda> {
    match v {
        Value::Array(items) => match items.as_slice() {
            [Value::String(head), Value::Array(formals), body] if head == "lambda" || head == "λ" => {
                let formals = formals.iter().map(variable).collect::<Result<Vec<Ident>>>()?;
                Ok(Lambda::new(formals, read(body, registry)?))
            }
            _ => Err(shape(v)),
        },
        _ => Err(shape(v)),
    }
}
