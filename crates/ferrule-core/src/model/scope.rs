//! Symbol table and scoped name lookup.

use super::{EnumId, MessageId};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Symbol {
    Message(MessageId),
    Enum(EnumId),
    /// A package or package prefix; never a valid type target
    Package,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolution {
    Found(Symbol),
    /// Candidates that were tried, innermost scope first
    NotFound(Vec<String>),
}

/// Every declared name of a compilation, keyed by fully qualified name
#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    symbols: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    /// Registers a type. Returns the existing symbol when the name is taken.
    pub(crate) fn declare(&mut self, full_name: &str, symbol: Symbol) -> Result<(), Symbol> {
        match self.symbols.get(full_name) {
            Some(Symbol::Package) | None => {
                self.symbols.insert(full_name.to_string(), symbol);
                Ok(())
            }
            Some(existing) => Err(*existing),
        }
    }

    /// Registers a package and each of its prefixes
    pub(crate) fn declare_package(&mut self, package: &str) {
        let mut prefix = String::new();
        for part in package.split('.').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            self.symbols.entry(prefix.clone()).or_insert(Symbol::Package);
        }
    }

    pub(crate) fn get(&self, full_name: &str) -> Option<Symbol> {
        self.symbols.get(full_name).copied()
    }

    /// Resolves `name` as written inside `scope`.
    ///
    /// A leading dot makes the name fully qualified. Otherwise the scope is
    /// walked from the innermost level outward, ending with the global
    /// scope, and the first candidate naming a type wins.
    pub(crate) fn resolve(&self, name: &str, scope: &str) -> Resolution {
        if let Some(absolute) = name.strip_prefix('.') {
            return match self.get(absolute) {
                Some(symbol @ (Symbol::Message(_) | Symbol::Enum(_))) => Resolution::Found(symbol),
                _ => Resolution::NotFound(vec![absolute.to_string()]),
            };
        }

        let mut searched = Vec::new();
        let mut scope = scope;
        loop {
            let candidate = if scope.is_empty() {
                name.to_string()
            } else {
                format!("{scope}.{name}")
            };
            if let Some(symbol @ (Symbol::Message(_) | Symbol::Enum(_))) = self.get(&candidate) {
                return Resolution::Found(symbol);
            }
            searched.push(candidate);
            if scope.is_empty() {
                return Resolution::NotFound(searched);
            }
            scope = scope.rsplit_once('.').map_or("", |(parent, _)| parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> SymbolTable {
        let mut t = SymbolTable::default();
        t.declare_package("pkg.sub");
        t.declare("pkg.Foo", Symbol::Message(MessageId(0))).unwrap();
        t.declare("pkg.sub.Outer", Symbol::Message(MessageId(1))).unwrap();
        t.declare("pkg.sub.Outer.Foo", Symbol::Message(MessageId(2))).unwrap();
        t.declare("Top", Symbol::Enum(EnumId(0))).unwrap();
        t
    }

    #[test]
    fn test_innermost_scope_shadows() {
        let t = table();
        assert_eq!(
            t.resolve("Foo", "pkg.sub.Outer"),
            Resolution::Found(Symbol::Message(MessageId(2)))
        );
        assert_eq!(
            t.resolve("Foo", "pkg.sub"),
            Resolution::Found(Symbol::Message(MessageId(0)))
        );
    }

    #[test]
    fn test_global_and_absolute_lookup() {
        let t = table();
        assert_eq!(t.resolve("Top", "pkg.sub.Outer"), Resolution::Found(Symbol::Enum(EnumId(0))));
        assert_eq!(
            t.resolve(".pkg.Foo", "pkg.sub.Outer"),
            Resolution::Found(Symbol::Message(MessageId(0)))
        );
        assert_eq!(
            t.resolve("sub.Outer.Foo", "pkg"),
            Resolution::Found(Symbol::Message(MessageId(2)))
        );
    }

    #[test]
    fn test_not_found_lists_candidates() {
        let t = table();
        assert_eq!(
            t.resolve("Missing", "pkg.sub"),
            Resolution::NotFound(vec![
                "pkg.sub.Missing".to_string(),
                "pkg.Missing".to_string(),
                "Missing".to_string(),
            ])
        );
    }

    #[test]
    fn test_packages_are_not_types() {
        let mut t = table();
        assert!(matches!(t.resolve("pkg", ""), Resolution::NotFound(_)));
        assert_eq!(
            t.declare("pkg.Foo", Symbol::Enum(EnumId(3))),
            Err(Symbol::Message(MessageId(0)))
        );
    }
}
