//! Duplicate-entry collapsing for repeated sections.

use std::collections::HashMap;

use crate::models::record::{EducationEntry, Field, ProjectEntry, WorkEntry};

/// An entry with an identity key.
pub trait DedupKey {
    /// Lowercased key components, or `None` when any component is
    /// unresolved. Entries without a key are never merged.
    fn dedup_key(&self) -> Option<Vec<String>>;

    /// Number of resolved sub-fields; the richer duplicate is kept.
    fn richness(&self) -> usize;
}

fn component(field: &Field) -> Option<String> {
    field.value().map(|v| v.trim().to_lowercase())
}

impl DedupKey for WorkEntry {
    fn dedup_key(&self) -> Option<Vec<String>> {
        Some(vec![
            component(&self.company)?,
            component(&self.title)?,
            component(&self.start_date)?,
        ])
    }

    fn richness(&self) -> usize {
        self.resolved_count()
    }
}

impl DedupKey for ProjectEntry {
    fn dedup_key(&self) -> Option<Vec<String>> {
        Some(vec![
            component(&self.name)?,
            component(&self.role)?,
            component(&self.start_date)?,
        ])
    }

    fn richness(&self) -> usize {
        self.resolved_count()
    }
}

impl DedupKey for EducationEntry {
    fn dedup_key(&self) -> Option<Vec<String>> {
        Some(vec![
            component(&self.school)?,
            self.degree.value()?.as_str().to_string(),
            component(&self.enrollment_date)?,
        ])
    }

    fn richness(&self) -> usize {
        self.resolved_count()
    }
}

/// Collapse entries with equal keys into one.
///
/// The survivor sits at the position of the first occurrence; on a tie in
/// richness the earlier entry wins. Order is otherwise untouched.
pub fn dedup_entries<T: DedupKey>(entries: Vec<T>) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(entries.len());
    let mut positions: HashMap<Vec<String>, usize> = HashMap::new();

    for entry in entries {
        let Some(key) = entry.dedup_key() else {
            kept.push(entry);
            continue;
        };

        match positions.get(&key) {
            Some(&pos) => {
                if entry.richness() > kept[pos].richness() {
                    kept[pos] = entry;
                }
            }
            None => {
                positions.insert(key, kept.len());
                kept.push(entry);
            }
        }
    }

    kept
}

/// Drop case-insensitive duplicates, keeping first-seen order and spelling.
pub fn dedup_set(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(value: &str) -> Field {
        if value.is_empty() {
            Field::missing()
        } else {
            Field::Resolved(value.to_string())
        }
    }

    fn work(company: &str, title: &str, start: &str, description: &str) -> WorkEntry {
        WorkEntry {
            company: text(company),
            title: text(title),
            start_date: text(start),
            end_date: Field::missing(),
            description: text(description),
        }
    }

    #[test]
    fn test_richer_duplicate_kept_at_first_position() {
        let entries = vec![
            work("ACME", "Engineer", "2020-01", ""),
            work("Initech", "Lead", "2021-05", "x"),
            work("acme", "engineer", "2020-01", "built things"),
        ];

        let deduped = dedup_entries(entries);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].description, text("built things"));
        assert_eq!(deduped[1].company, text("Initech"));
    }

    #[test]
    fn test_tie_keeps_first() {
        let deduped = dedup_entries(vec![
            work("ACME", "Engineer", "2020-01", "first"),
            work("ACME", "Engineer", "2020-01", "second"),
        ]);
        assert_eq!(deduped, vec![work("ACME", "Engineer", "2020-01", "first")]);
    }

    #[test]
    fn test_unresolved_key_never_merges() {
        let entries = vec![
            work("ACME", "", "2020-01", "a"),
            work("ACME", "", "2020-01", "a"),
        ];
        assert_eq!(dedup_entries(entries.clone()), entries);
    }

    #[test]
    fn test_dedup_idempotent() {
        let entries = vec![
            work("A", "x", "2020-01", ""),
            work("a", "X", "2020-01", "d"),
            work("B", "y", "2019-01", ""),
        ];
        let once = dedup_entries(entries);
        assert_eq!(dedup_entries(once.clone()), once);
    }

    #[test]
    fn test_dedup_set() {
        let items = ["Rust", "rust", "Go", "RUST", "go", "SQL"].map(String::from);
        assert_eq!(dedup_set(items), vec!["Rust", "Go", "SQL"]);
    }
}
