//! AST, configuration and errors used by every pass
use std::fmt;
use thiserror::Error;

/// Abstract Syntax Tree
///
/// Every shape the compiler understands is a distinct variant, so all the
/// passes are exhaustive pattern matches rather than shape sniffing.
#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Literal(Literal),
    // A variable reference, compared by identity
    Identifier(Ident),
    If { pred: Box<Expr>, then: Box<Expr>, alt: Box<Expr> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Let { bindings: Vec<(Ident, Expr)>, body: Box<Expr> },
    LetStar { bindings: Vec<(Ident, Expr)>, body: Box<Expr> },
    Letrec { bindings: Vec<(Ident, Lambda)>, body: Box<Expr> },
    Lambda(Lambda),
    // Call to a built in primitive like `fx+`
    Prim { name: String, args: Vec<Expr> },
    // Call to a procedure bound by `letrec`
    App { rator: Ident, args: Vec<Expr> },
    // A closure object; code label and the captured variables, in order
    Closure { label: String, free: Vec<Ident> },
    // Program level table of closure converted code blocks
    Labels { code: Vec<Code>, body: Box<Expr> },
}

/// Result type used across the compiler
pub type Result<T> = std::result::Result<T, Error>;

/// Constants that fit in a single immediate word
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Literal {
    // `()`
    Nil,
    // 62b number with a 2bit tag
    Number(i64),
    Boolean(bool),
    // Only ASCII; the ordinal lives above an 8 bit tag
    Char(u8),
}

/// A variable name with an optional numeric suffix
///
/// `x.1` and `x` are different variables; equality and hashing use both parts.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Ident {
    pub name: String,
    // 0 when the name carries no suffix
    pub index: i64,
}

impl Ident {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), index: 0 }
    }

    /// Parse `x.1` style names into an identifier with an explicit index
    pub fn from<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        match name.rsplit_once('.') {
            Some((base, index)) if !base.is_empty() => match index.parse::<i64>() {
                Ok(index) => Self { name: base.to_string(), index },
                Err(_) => Self::new(name),
            },
            _ => Self::new(name),
        }
    }

    pub fn expr<S: Into<String>>(name: S) -> Expr {
        Expr::Identifier(Ident::from(name))
    }

    /// Names reserved for temporaries introduced by the compiler itself
    pub fn reserved(&self) -> bool {
        self.name.starts_with('%')
    }
}

/// A lambda expression with optional free variable annotation
#[derive(Clone, Debug, PartialEq)]
pub struct Lambda {
    // Formal arguments to the function
    pub formals: Vec<Ident>,
    // Free variables, added by the analyzer; `None` until then
    pub free: Option<Vec<Ident>>,
    pub body: Box<Expr>,
}

impl Lambda {
    pub fn new(formals: Vec<Ident>, body: Expr) -> Self {
        Lambda { formals, free: None, body: Box::new(body) }
    }
}

/// A closure converted code block
///
/// Formals are the captured variables followed by the lambda's own
/// arguments, so a caller must supply the captured values first.
#[derive(Clone, Debug, PartialEq)]
pub struct Code {
    pub label: String,
    pub formals: Vec<Ident>,
    pub body: Box<Expr>,
}

impl Expr {
    pub fn cond(pred: Expr, then: Expr, alt: Expr) -> Self {
        Expr::If { pred: Box::new(pred), then: Box::new(then), alt: Box::new(alt) }
    }

    pub fn prim<S: Into<String>>(name: S, args: Vec<Expr>) -> Self {
        Expr::Prim { name: name.into(), args }
    }

    pub fn app<S: Into<String>>(name: S, args: Vec<Expr>) -> Self {
        Expr::App { rator: Ident::from(name), args }
    }

    /// Trivial expressions can be evaluated any number of times without any
    /// observable difference
    pub fn trivial(&self) -> bool {
        matches!(self, Expr::Literal(..) | Expr::Identifier(..))
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ident { name, index } = self;
        if *index == 0 {
            write!(f, "{}", name)
        } else {
            write!(f, "{}.{}", name, index)
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Boolean(t) => write!(f, "{}", if *t { "#t" } else { "#f" }),
            Self::Nil => write!(f, "()"),
            Self::Char(c) => {
                let p = match *c as char {
                    '\t' => "#\\tab".into(),
                    '\n' => "#\\newline".into(),
                    '\r' => "#\\return".into(),
                    '\x0B' => "#\\vt".into(),
                    '\x0C' => "#\\ff".into(),
                    ' ' => "#\\space".into(),
                    _ => format!("#\\{}", *c as char),
                };
                write!(f, "{}", &p)
            }
        }
    }
}

// Write a space separated sequence of displayable items
fn spaced<T: fmt::Display>(f: &mut fmt::Formatter, items: &[T]) -> fmt::Result {
    let mut items = items.iter().peekable();
    while let Some(elem) = items.next() {
        if items.peek().is_some() {
            write!(f, "{} ", elem)?;
        } else {
            write!(f, "{}", elem)?;
        }
    }
    Ok(())
}

fn bindings(f: &mut fmt::Formatter, bindings: &[(Ident, Expr)]) -> fmt::Result {
    write!(f, "(")?;
    for (i, (name, value)) in bindings.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "({} {})", name, value)?;
    }
    write!(f, ")")
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(lambda (")?;
        spaced(f, &self.formals)?;
        write!(f, ") ")?;
        if let Some(free) = &self.free {
            write!(f, "(free")?;
            for v in free {
                write!(f, " {}", v)?;
            }
            write!(f, ") ")?;
        }
        write!(f, "{})", self.body)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Literal(l) => write!(f, "{}", l),
            Expr::Identifier(i) => write!(f, "{}", i),
            Expr::If { pred, then, alt } => write!(f, "(if {} {} {})", pred, then, alt),
            Expr::And(args) | Expr::Or(args) => {
                let op = if matches!(self, Expr::And(_)) { "and" } else { "or" };
                write!(f, "({}", op)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Let { bindings: b, body } => {
                write!(f, "(let ")?;
                bindings(f, b)?;
                write!(f, " {})", body)
            }
            Expr::LetStar { bindings: b, body } => {
                write!(f, "(let* ")?;
                bindings(f, b)?;
                write!(f, " {})", body)
            }
            Expr::Letrec { bindings, body } => {
                write!(f, "(letrec (")?;
                for (i, (name, lambda)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "({} {})", name, lambda)?;
                }
                write!(f, ") {})", body)
            }
            Expr::Lambda(lambda) => write!(f, "{}", lambda),
            Expr::Prim { name, args } => {
                write!(f, "({}", name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Expr::App { rator, args } => {
                write!(f, "({}", rator)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Closure { label, free } => {
                write!(f, "(closure {}", label)?;
                for v in free {
                    write!(f, " {}", v)?;
                }
                write!(f, ")")
            }
            Expr::Labels { code, body } => {
                write!(f, "(labels (")?;
                for (i, c) in code.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "({} (code (", c.label)?;
                    spaced(f, &c.formals)?;
                    write!(f, ") {}))", c.body)?;
                }
                write!(f, ") {})", body)
            }
        }
    }
}

// Literal shorthands, mostly for tests: `1.into()`, `'a'.into()`
impl From<i64> for Expr {
    fn from(i: i64) -> Self {
        Self::Literal(Literal::Number(i))
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Self::Literal(Literal::Boolean(b))
    }
}

impl From<char> for Expr {
    fn from(c: char) -> Self {
        Self::Literal(Literal::Char(c as u8))
    }
}

impl From<Literal> for Expr {
    fn from(l: Literal) -> Self {
        Self::Literal(l)
    }
}

/// Everything a single compiler invocation needs to know
pub struct Config {
    /// Program is the input source, a JSON encoded tree
    pub program: String,
    /// Executable path; the asm goes next to it with a `.s` suffix
    pub output: String,
    /// Run closure conversion before code generation
    pub convert: bool,
}

impl Config {
    /// Where the generated assembly is written
    ///
    /// `/dev/stdout` is passed through untouched so `-S` prints to the terminal.
    pub fn asm(&self) -> String {
        match self.output.as_str() {
            "/dev/stdout" => self.output.clone(),
            out => format!("{}.s", out),
        }
    }
}

/// Custom error type for all of sprig
///
/// Every compilation error is fatal; the first one aborts the whole program
/// and names the offending node.
#[derive(Debug, Error)]
pub enum Error {
    /// A literal that can't be encoded as an immediate
    #[error("Literal `{0}` can't be represented as an immediate")]
    Representation(String),
    /// Unrecognized or misplaced node
    #[error("Malformed expression: {0}")]
    Shape(String),
    /// Reference to an unbound name
    #[error("Undefined variable `{0}`")]
    Resolution(String),
    /// Wrong number of arguments to a primitive or a procedure
    #[error("`{name}` expects {expected} argument(s), found {found}")]
    Arity { name: String, expected: usize, found: usize },
    /// Left hand side of a binding is not a variable
    #[error("Binding target must be a variable, found `{0}`")]
    Binding(String),
    /// The input tree isn't valid JSON
    #[error("Failed to read program: {0}")]
    Input(#[from] serde_json::Error),
    /// Internal errors are unexpected errors within the compiler
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        e: Option<std::io::Error>,
    },
    /// The compiled program failed while running
    #[error("{0}")]
    Runtime(String),
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Internal { message: error.to_string(), e: Some(error) }
    }
}
