//! Statement Cache
//!
//! Maps a logical statement name (for example `"tracks.insert"`) to its
//! SQL text and ordered parameter-name list. Compiled handles are left
//! to rusqlite's own prepared-statement cache so they stay tied to the
//! connection; this cache owns the template metadata for the lifetime of
//! the Database instance and is never evicted.

use std::collections::HashMap;

use tracing::debug;

/// Which generated template a derived statement name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Insert,
    Update,
}

/// A registered statement template.
#[derive(Debug, Clone)]
pub struct StatementEntry {
    pub sql: String,
    /// Parameter names in placeholder order, without the `:` prefix.
    pub parameters: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct StatementCache {
    entries: HashMap<String, StatementEntry>,
}

/// Derives the logical name for a table's generated template.
pub fn statement_name(table: &str, kind: StatementKind) -> String {
    match kind {
        StatementKind::Insert => format!("{table}.insert"),
        StatementKind::Update => format!("{table}.update"),
    }
}

impl StatementCache {
    pub fn new() -> Self {
        StatementCache::default()
    }

    /// Stores an entry, silently overwriting any existing statement with
    /// the same name.
    pub fn insert(&mut self, name: &str, sql: String, parameters: Vec<String>) {
        debug!("prepared statement: {}", name);
        self.entries
            .insert(name.to_string(), StatementEntry { sql, parameters });
    }

    pub fn get(&self, name: &str) -> Option<&StatementEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_name_derivation() {
        assert_eq!(
            statement_name("tracks", StatementKind::Insert),
            "tracks.insert"
        );
        assert_eq!(
            statement_name("tracks", StatementKind::Update),
            "tracks.update"
        );
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = StatementCache::new();
        cache.insert(
            "tracks.insert",
            "INSERT INTO tracks(title) VALUES (:title)".to_string(),
            vec!["title".to_string()],
        );

        assert!(cache.contains("tracks.insert"));
        assert!(!cache.contains("tracks.update"));
        let entry = cache.get("tracks.insert").unwrap();
        assert_eq!(entry.parameters, vec!["title"]);
    }

    #[test]
    fn test_silent_overwrite() {
        let mut cache = StatementCache::new();
        cache.insert("s", "SELECT 1".to_string(), vec![]);
        cache.insert("s", "SELECT 2".to_string(), vec![]);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("s").unwrap().sql, "SELECT 2");
    }
}
