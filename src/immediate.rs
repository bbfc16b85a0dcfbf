//! Runtime representation of scheme objects
//!
//! Immediate values (values that fit in one machine word) are tagged so the
//! runtime can tell them apart with a mask and a compare. Unlike a fixed 3
//! bit tag, the tags here are of varying width:
//!
//! ```txt
//!           Mask        Tag / Value
//! fixnum  | 00000011 | 00000000
//! char    | 00111111 | 00001111
//! bool    | 10111111 | #f 00101111, #t 01101111
//! null    |          | 00111111
//! ```
//!
//! Fixnums keep 62 bits of precision and are cheap to add and compare. The
//! two booleans differ only in bit 6, so masking either with `BOOL_MASK`
//! yields the false pattern; a type check for booleans is a single `and` and
//! a `cmp`. Every tag space is disjoint from the others, which is what makes
//! `if` correct: everything except `#f` is truthy.

use crate::core::{Error, Literal, Result};
use crate::x86::WORDSIZE;

pub const FXSHIFT: i64 = 2;
pub const FXMASK: i64 = 0x03;
pub const FXTAG: i64 = 0x00;

pub const FALSE: i64 = 0x2F;
pub const TRUE: i64 = 0x6F;
/// The only bit that differs between `#t` and `#f`
pub const BOOL_BIT: i64 = 6;
/// `BOOL_MASK & (#t | #f) == #f`, and doesn't clash with null
pub const BOOL_MASK: i64 = 0xBF;

pub const NIL: i64 = 0x3F;

pub const CHARSHIFT: i64 = 8;
pub const CHARTAG: i64 = 0x0F;
pub const CHARMASK: i64 = 0x3F;

/// Fixnums get whatever is left of the word after the tag
pub const FIXNUM_BITS: i64 = WORDSIZE * 8 - FXSHIFT;
pub const FXLOWER: i64 = -(1 << (FIXNUM_BITS - 1));
pub const FXUPPER: i64 = (1 << (FIXNUM_BITS - 1)) - 1;

/// Runtime type of an immediate
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Tag {
    Fixnum,
    Boolean,
    Char,
    Null,
}

/// Immediate representation of a literal.
pub fn to(lit: &Literal) -> Result<i64> {
    match *lit {
        Literal::Number(i) if (FXLOWER..=FXUPPER).contains(&i) => Ok(i << FXSHIFT),
        Literal::Number(_) => Err(Error::Representation(lit.to_string())),
        Literal::Boolean(true) => Ok(TRUE),
        Literal::Boolean(false) => Ok(FALSE),
        // Expand u8 to i64 before shifting, this will easily overflow and
        // give bogus results otherwise.
        Literal::Char(c) if c.is_ascii() => Ok((i64::from(c) << CHARSHIFT) | CHARTAG),
        Literal::Char(_) => Err(Error::Representation(lit.to_string())),
        Literal::Nil => Ok(NIL),
    }
}

// Immediate representation of numbers is required so often a helper is
// useful.
pub const fn n(i: i64) -> i64 {
    i << FXSHIFT
}

/// Runtime type of a machine word, if it is a valid immediate at all
pub fn classify(word: i64) -> Option<Tag> {
    if word & FXMASK == FXTAG {
        Some(Tag::Fixnum)
    } else if word == TRUE || word == FALSE {
        Some(Tag::Boolean)
    } else if word == NIL {
        Some(Tag::Null)
    } else if word & CHARMASK == CHARTAG && (word >> CHARSHIFT) < 128 && word >= 0 {
        Some(Tag::Char)
    } else {
        None
    }
}

/// Inverse of `to`; renders a machine word back into a literal
pub fn decode(word: i64) -> Option<Literal> {
    match classify(word)? {
        Tag::Fixnum => Some(Literal::Number(word >> FXSHIFT)),
        Tag::Boolean => Some(Literal::Boolean(word == TRUE)),
        Tag::Null => Some(Literal::Nil),
        Tag::Char => Some(Literal::Char((word >> CHARSHIFT) as u8)),
    }
}
