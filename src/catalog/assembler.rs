use crate::catalog::CatalogEntry;
use std::collections::HashSet;

/// Deduplicates entries by id and orders them newest first
///
/// The first occurrence of an id wins. Entries published at the same instant
/// are ordered by id so the output does not depend on fetch order. Undated
/// entries carry `DateTime::<Utc>::MIN_UTC` and therefore come last.
pub fn assemble(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    let mut unique: Vec<CatalogEntry> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.id.clone()))
        .collect();

    unique.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    unique
}
