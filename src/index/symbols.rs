//! Global routine table.
//!
//! Keyed by `(lowercase name, kind)`. Every definition is kept, in the order
//! files registered it; the last one is what calls resolve to.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::parser::{RoutineKey, RoutineSignature};
use crate::validators::RoutineLookup;

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: HashMap<RoutineKey, Vec<RoutineSignature>>,
    by_file: HashMap<PathBuf, Vec<RoutineKey>>,
}

impl SymbolTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_file.clear();
    }

    pub fn resolve(&self, key: &RoutineKey) -> Option<&RoutineSignature> {
        self.entries.get(key).and_then(|defs| defs.last())
    }

    pub fn definitions(&self, key: &RoutineKey) -> &[RoutineSignature] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolved routine of every kind with this name.
    pub fn resolve_any(&self, name: &str) -> Vec<&RoutineSignature> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| key.name == name)
            .sorted_by(|a, b| a.0.cmp(b.0))
            .filter_map(|(_, defs)| defs.last())
            .collect()
    }

    /// Resolved routine per key, sorted by key.
    pub fn routines(&self) -> Vec<&RoutineSignature> {
        self.entries
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .filter_map(|(_, defs)| defs.last())
            .collect()
    }

    /// Methods of any class named `method`.
    pub fn methods_named(&self, method: &str, function: bool) -> Vec<&RoutineKey> {
        self.entries
            .keys()
            .filter(|key| key.kind.is_method() && key.kind.is_function() == function)
            .filter(|key| key.method_name().eq_ignore_ascii_case(method))
            .sorted()
            .collect()
    }

    /// Replace the definitions a file contributes. Returns the keys whose
    /// callable interface changed: added, removed, or with different
    /// arguments or keywords. Definitions that only moved are updated without
    /// being reported.
    pub fn replace_file(
        &mut self,
        path: &Path,
        signatures: &[RoutineSignature],
    ) -> Vec<RoutineKey> {
        let old_keys = self.by_file.remove(path).unwrap_or_default();
        let new_keys: Vec<RoutineKey> = signatures.iter().map(|s| s.key()).unique().collect();
        let mut changed = Vec::new();

        for key in old_keys.iter().filter(|k| !new_keys.contains(k)) {
            self.remove_definition(key, path);
            changed.push(key.clone());
        }

        for signature in signatures {
            let key = signature.key();
            let defs = self.entries.entry(key.clone()).or_default();
            match defs.iter_mut().find(|d| d.file == path) {
                Some(existing) if existing == signature => {}
                Some(existing) => {
                    if !existing.same_interface(signature) {
                        changed.push(key);
                    }
                    *existing = signature.clone();
                }
                None => {
                    defs.push(signature.clone());
                    changed.push(key);
                }
            }
        }

        if !new_keys.is_empty() {
            self.by_file.insert(path.to_path_buf(), new_keys);
        }
        changed.into_iter().unique().collect()
    }

    /// Drop everything a file contributed, returning the affected keys.
    pub fn remove_file(&mut self, path: &Path) -> Vec<RoutineKey> {
        let keys = self.by_file.remove(path).unwrap_or_default();
        for key in &keys {
            self.remove_definition(key, path);
        }
        keys
    }

    fn remove_definition(&mut self, key: &RoutineKey, path: &Path) {
        if let Some(defs) = self.entries.get_mut(key) {
            defs.retain(|d| d.file != path);
            if defs.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// View of the table for validating `path`, which must not resolve
    /// calls to its own previous definitions.
    pub fn excluding<'a>(&'a self, path: &'a Path) -> ExcludingFile<'a> {
        ExcludingFile { table: self, path }
    }
}

pub struct ExcludingFile<'a> {
    table: &'a SymbolTable,
    path: &'a Path,
}

impl RoutineLookup for ExcludingFile<'_> {
    fn routine(&self, key: &RoutineKey) -> Option<RoutineSignature> {
        self.table
            .definitions(key)
            .iter()
            .rev()
            .find(|d| d.file != self.path)
            .cloned()
    }

    fn method(&self, method: &str, function: bool) -> Option<RoutineSignature> {
        let candidates: Vec<RoutineSignature> = self
            .table
            .methods_named(method, function)
            .into_iter()
            .filter_map(|key| self.routine(key))
            .collect();
        match candidates.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::parse_file;

    fn signatures(path: &str, source: &str) -> Vec<RoutineSignature> {
        parse_file(Path::new(path), source)
            .record
            .signatures()
            .cloned()
            .collect()
    }

    #[test]
    fn test_moved_definition_is_not_a_change() {
        let mut table = SymbolTable::default();
        let path = Path::new("a.pro");
        let first = table.replace_file(path, &signatures("a.pro", "pro foo, x\nend\n"));
        assert_eq!(first.len(), 1);

        let moved =
            table.replace_file(path, &signatures("a.pro", "\n\npro foo, x\n  print, x\nend\n"));
        assert!(moved.is_empty());
        assert_eq!(table.resolve(&first[0]).unwrap().name_pos.line, 2);
    }

    #[test]
    fn test_interface_change_and_removal_are_reported() {
        let mut table = SymbolTable::default();
        let path = Path::new("a.pro");
        table.replace_file(path, &signatures("a.pro", "pro foo, x\nend\npro bar\nend\n"));

        let changed = table.replace_file(path, &signatures("a.pro", "pro foo, x, y\nend\n"));
        let names: Vec<&str> = changed.iter().map(|k| k.name.as_str()).sorted().collect();
        assert_eq!(names, vec!["bar", "foo"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_last_definition_resolves() {
        let mut table = SymbolTable::default();
        table.replace_file(Path::new("a.pro"), &signatures("a.pro", "pro foo\nend\n"));
        table.replace_file(Path::new("b.pro"), &signatures("b.pro", "pro foo, x\nend\n"));

        let key = RoutineKey::new("foo", crate::parser::RoutineKind::Procedure);
        assert_eq!(table.definitions(&key).len(), 2);
        assert_eq!(table.resolve(&key).unwrap().file, Path::new("b.pro"));
        assert_eq!(
            table.excluding(Path::new("b.pro")).routine(&key).unwrap().file,
            Path::new("a.pro")
        );

        table.remove_file(Path::new("b.pro"));
        assert_eq!(table.resolve(&key).unwrap().file, Path::new("a.pro"));
    }

    #[test]
    fn test_ambiguous_method_does_not_resolve() {
        let mut table = SymbolTable::default();
        table.replace_file(
            Path::new("a.pro"),
            &signatures(
                "a.pro",
                "pro circle::draw\nend\npro square::draw\nend\npro square::fill\nend\n",
            ),
        );
        let lookup = table.excluding(Path::new("other.pro"));
        assert!(lookup.method("draw", false).is_none());
        assert_eq!(lookup.method("fill", false).unwrap().name, "square::fill");
    }
}
