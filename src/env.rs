//! Lexical environment
//!
//! Environment is an *ordered* list of bindings, most recent first. It is a
//! persistent linked list, so extending it is O(1) and never disturbs the
//! parent; sibling scopes share the tail they were extended from and there
//! is nothing to undo when a scope ends.
use crate::core::Ident;
use std::{fmt, rc::Rc};

/// Where the value of a name lives at runtime
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Location {
    /// Stack slot, offset from the stack pointer at procedure entry
    Stack(i64),
    /// A procedure; code label and the number of arguments it expects
    Label { name: String, arity: usize },
}

#[derive(Clone, Default)]
pub struct Env(Option<Rc<Binding>>);

struct Binding {
    name: Ident,
    location: Location,
    next: Env,
}

impl Env {
    /// A new environment with `name` bound to `location`, hiding any earlier
    /// binding of the same name
    pub fn extend(&self, name: Ident, location: Location) -> Env {
        Env(Some(Rc::new(Binding { name, location, next: self.clone() })))
    }

    /// Find the innermost binding of `name`
    pub fn lookup(&self, name: &Ident) -> Option<&Location> {
        self.iter().find(|(n, _)| *n == name).map(|(_, l)| l)
    }

    /// Only the procedures visible in this environment
    ///
    /// Procedure bodies run in a frame of their own and can't see the stack
    /// slots of the scope they were defined in. A label hidden by a stack
    /// variable of the same name stays hidden.
    pub fn procedures(&self) -> Env {
        let mut seen: Vec<&Ident> = vec![];
        let mut labels: Vec<(&Ident, &Location)> = vec![];

        for (name, l) in self.iter() {
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            if let Location::Label { .. } = l {
                labels.push((name, l));
            }
        }

        // Rebuild oldest first to keep the shadowing order intact
        labels
            .into_iter()
            .rev()
            .fold(Env::default(), |env, (name, l)| env.extend(name.clone(), l.clone()))
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter(self.0.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

pub struct Iter<'a>(Option<&'a Binding>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Ident, &'a Location);

    fn next(&mut self) -> Option<Self::Item> {
        let binding = self.0?;
        self.0 = binding.next.0.as_deref();
        Some((&binding.name, &binding.location))
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn label(name: &str, arity: usize) -> Location {
        Location::Label { name: name.into(), arity }
    }

    #[test]
    fn shadow() {
        let e = Env::default();
        assert!(e.is_empty());
        assert_eq!(e.lookup(&Ident::new("x")), None);

        let outer = e.extend(Ident::new("x"), Location::Stack(-8));
        assert_eq!(outer.lookup(&Ident::new("x")), Some(&Location::Stack(-8)));

        // local variable shadows the outer one
        let inner = outer.extend(Ident::new("y"), Location::Stack(-16));
        let inner = inner.extend(Ident::new("x"), Location::Stack(-24));
        assert_eq!(inner.lookup(&Ident::new("x")), Some(&Location::Stack(-24)));
        assert_eq!(inner.lookup(&Ident::new("y")), Some(&Location::Stack(-16)));

        // extension never changes the parent
        assert_eq!(outer.lookup(&Ident::new("x")), Some(&Location::Stack(-8)));
        assert_eq!(outer.lookup(&Ident::new("y")), None);
    }

    #[test]
    fn identity() {
        let e = Env::default().extend(Ident::from("x.1"), Location::Stack(-8));

        assert_eq!(e.lookup(&Ident::new("x")), None);
        assert_eq!(e.lookup(&Ident::from("x.1")), Some(&Location::Stack(-8)));
    }

    #[test]
    fn procedures() {
        let e = Env::default()
            .extend(Ident::new("f"), label("L_1", 1))
            .extend(Ident::new("x"), Location::Stack(-8))
            .extend(Ident::new("g"), label("L_2", 2))
            .extend(Ident::new("f"), label("L_3", 0));

        let p = e.procedures();

        assert_eq!(p.lookup(&Ident::new("x")), None);
        assert_eq!(p.lookup(&Ident::new("g")), Some(&label("L_2", 2)));
        assert_eq!(p.lookup(&Ident::new("f")), Some(&label("L_3", 0)));
        assert_eq!(p.iter().count(), 2);
    }

    #[test]
    fn hidden_procedures() {
        let e = Env::default()
            .extend(Ident::new("f"), label("L_1", 0))
            .extend(Ident::new("g"), label("L_2", 0))
            .extend(Ident::new("f"), Location::Stack(-8));

        let p = e.procedures();

        assert_eq!(p.lookup(&Ident::new("f")), None);
        assert_eq!(p.lookup(&Ident::new("g")), Some(&label("L_2", 0)));
    }
}
