//! Lines of generated assembly and where they go
//!
//! Code generators build up [`ASM`] values by concatenating instructions with
//! `+`, which keeps emitting code a pure function of the input. The final
//! program is written out to a [`Sink`]: either kept in memory or streamed to
//! a file.
use std::{
    fmt,
    fs::File,
    io::{self, BufWriter, Write},
    ops::{Add, AddAssign},
    path::Path,
};

const INDENT: &str = "    ";

/// A single line of assembly with an optional trailing comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ins {
    pub text: String,
    pub comment: Option<String>,
    pub indent: usize,
}

impl Ins {
    /// An instruction, indented one level
    pub fn new<S: Into<String>>(text: S) -> Self {
        Ins { text: text.into(), comment: None, indent: 1 }
    }

    /// A line flush with the left margin, for labels and symbol directives
    pub fn flush<S: Into<String>>(text: S) -> Self {
        Ins { text: text.into(), comment: None, indent: 0 }
    }

    /// A line holding nothing but a comment
    pub fn note<S: Into<String>>(comment: S) -> Self {
        Ins { text: String::new(), comment: Some(comment.into()), indent: 1 }
    }

    /// Attach a trailing comment
    pub fn comment<S: Into<String>>(self, comment: S) -> Self {
        Ins { comment: Some(comment.into()), ..self }
    }
}

impl fmt::Display for Ins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", INDENT.repeat(self.indent))?;
        match (&self.comment, self.text.is_empty()) {
            (Some(c), true) => write!(f, "# {}", c),
            (Some(c), false) => write!(f, "{}  # {}", self.text, c),
            (None, _) => write!(f, "{}", self.text),
        }
    }
}

/// An ordered sequence of lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ASM(pub Vec<Ins>);

impl ASM {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ins> {
        self.0.iter()
    }

    /// Write every line to the sink in order
    pub fn write(&self, sink: &mut dyn Sink) -> io::Result<()> {
        for ins in &self.0 {
            sink.emit(ins)?;
        }
        sink.finish()
    }
}

impl From<Ins> for ASM {
    fn from(x: Ins) -> Self {
        ASM(vec![x])
    }
}

impl Add<Ins> for ASM {
    type Output = ASM;

    fn add(mut self, other: Ins) -> ASM {
        self.0.push(other);
        self
    }
}

impl Add<ASM> for ASM {
    type Output = ASM;

    fn add(mut self, other: ASM) -> ASM {
        self.0.extend(other.0);
        self
    }
}

impl Add<Ins> for Ins {
    type Output = ASM;

    fn add(self, other: Ins) -> ASM {
        ASM(vec![self, other])
    }
}

impl Add<ASM> for Ins {
    type Output = ASM;

    fn add(self, other: ASM) -> ASM {
        let mut v = Vec::with_capacity(other.len() + 1);
        v.push(self);
        v.extend(other.0);
        ASM(v)
    }
}

impl AddAssign<Ins> for ASM {
    fn add_assign(&mut self, other: Ins) {
        self.0.push(other)
    }
}

impl AddAssign<ASM> for ASM {
    fn add_assign(&mut self, other: ASM) {
        self.0.extend(other.0)
    }
}

impl fmt::Display for ASM {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for ins in &self.0 {
            writeln!(f, "{}", ins)?;
        }
        Ok(())
    }
}

/// Destination for generated lines
pub trait Sink {
    fn emit(&mut self, ins: &Ins) -> io::Result<()>;

    /// Called once after the last line
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Buffer the lines in memory
impl Sink for ASM {
    fn emit(&mut self, ins: &Ins) -> io::Result<()> {
        self.0.push(ins.clone());
        Ok(())
    }
}

/// Stream lines to a file as they are emitted
pub struct FileSink(BufWriter<File>);

impl FileSink {
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(FileSink(BufWriter::new(File::create(path)?)))
    }
}

impl Sink for FileSink {
    fn emit(&mut self, ins: &Ins) -> io::Result<()> {
        writeln!(self.0, "{}", ins)
    }

    fn finish(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
