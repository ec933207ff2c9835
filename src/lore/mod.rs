//! Lore: the named world-building facts generated content must stay
//! consistent with.
//!
//! Entries are uniquely identified by `(kind, name)` within a project,
//! with names compared case-insensitively. `Lore` is the in-document
//! collection; [`store::LoreStore`] is the project-scoped adapter over the
//! similarity-search service.

pub mod store;

pub use store::{EmbeddingClient, HttpSimilarityIndex, LoreStore, ScoredLore, SimilarityIndex};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three kinds of lore entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoreKind {
    Character,
    Location,
    WorldElement,
}

impl LoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LoreKind::Character => "character",
            LoreKind::Location => "location",
            LoreKind::WorldElement => "world_element",
        }
    }
}

impl fmt::Display for LoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A relationship between two characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub role: String,
    pub description: String,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub significance: String,
}

/// Technology, magic, species, faction, law — anything the world enforces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldElement {
    pub name: String,
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// One lore entry of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "lore_kind", rename_all = "snake_case")]
pub enum LoreEntry {
    Character(Character),
    Location(Location),
    WorldElement(WorldElement),
}

impl LoreEntry {
    pub fn kind(&self) -> LoreKind {
        match self {
            LoreEntry::Character(_) => LoreKind::Character,
            LoreEntry::Location(_) => LoreKind::Location,
            LoreEntry::WorldElement(_) => LoreKind::WorldElement,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LoreEntry::Character(c) => &c.name,
            LoreEntry::Location(l) => &l.name,
            LoreEntry::WorldElement(w) => &w.name,
        }
    }

    /// Deterministic textual rendering, used for embedding and for prompt
    /// injection.
    pub fn render(&self) -> String {
        match self {
            LoreEntry::Character(c) => {
                let mut out = format!(
                    "Character: {}\nRole: {}\nDescription: {}",
                    c.name, c.role, c.description
                );
                if !c.traits.is_empty() {
                    out.push_str(&format!("\nTraits: {}", c.traits.join(", ")));
                }
                if !c.relationships.is_empty() {
                    let rels: Vec<String> = c
                        .relationships
                        .iter()
                        .map(|r| format!("{} ({})", r.name, r.kind))
                        .collect();
                    out.push_str(&format!("\nRelationships: {}", rels.join(", ")));
                }
                out
            }
            LoreEntry::Location(l) => format!(
                "Location: {}\nDescription: {}\nSignificance: {}",
                l.name, l.description, l.significance
            ),
            LoreEntry::WorldElement(w) => {
                let mut out = format!(
                    "World Element: {}\nType: {}\nDescription: {}",
                    w.name, w.kind, w.description
                );
                if !w.rules.is_empty() {
                    out.push_str(&format!("\nRules: {}", w.rules.join(", ")));
                }
                out
            }
        }
    }
}

/// The in-document lore collection for a series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lore {
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub world_elements: Vec<WorldElement>,
}

impl Lore {
    /// Insert or overwrite an entry. Returns `true` when the entry was new.
    /// Matching is by case-insensitive name within a kind, so re-upserting
    /// the same fact never duplicates it.
    pub fn upsert(&mut self, entry: LoreEntry) -> bool {
        fn place<T>(items: &mut Vec<T>, item: T, name: impl Fn(&T) -> &str) -> bool {
            let key = name(&item).to_lowercase();
            if let Some(existing) = items.iter_mut().find(|i| name(i).to_lowercase() == key) {
                *existing = item;
                false
            } else {
                items.push(item);
                true
            }
        }
        match entry {
            LoreEntry::Character(c) => place(&mut self.characters, c, |c| &c.name),
            LoreEntry::Location(l) => place(&mut self.locations, l, |l| &l.name),
            LoreEntry::WorldElement(w) => place(&mut self.world_elements, w, |w| &w.name),
        }
    }

    pub fn contains(&self, kind: LoreKind, name: &str) -> bool {
        let key = name.to_lowercase();
        match kind {
            LoreKind::Character => self.characters.iter().any(|c| c.name.to_lowercase() == key),
            LoreKind::Location => self.locations.iter().any(|l| l.name.to_lowercase() == key),
            LoreKind::WorldElement => self
                .world_elements
                .iter()
                .any(|w| w.name.to_lowercase() == key),
        }
    }

    /// All entries as tagged values, characters first.
    pub fn entries(&self) -> Vec<LoreEntry> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(self.characters.iter().cloned().map(LoreEntry::Character));
        out.extend(self.locations.iter().cloned().map(LoreEntry::Location));
        out.extend(
            self.world_elements
                .iter()
                .cloned()
                .map(LoreEntry::WorldElement),
        );
        out
    }

    pub fn len(&self) -> usize {
        self.characters.len() + self.locations.len() + self.world_elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(name: &str) -> LoreEntry {
        LoreEntry::Character(Character {
            name: name.to_string(),
            role: "protagonist".to_string(),
            description: "A thief with a conscience.".to_string(),
            traits: vec!["clever".to_string()],
            relationships: vec![],
        })
    }

    #[test]
    fn upsert_inserts_new_entries() {
        let mut lore = Lore::default();
        assert!(lore.upsert(character("Vesper")));
        assert_eq!(lore.characters.len(), 1);
    }

    #[test]
    fn upsert_overwrites_same_name_case_insensitively() {
        let mut lore = Lore::default();
        lore.upsert(character("Vesper"));
        let inserted = lore.upsert(LoreEntry::Character(Character {
            name: "VESPER".to_string(),
            role: "antagonist".to_string(),
            description: "Revised.".to_string(),
            traits: vec![],
            relationships: vec![],
        }));
        assert!(!inserted);
        assert_eq!(lore.characters.len(), 1);
        assert_eq!(lore.characters[0].role, "antagonist");
    }

    #[test]
    fn same_name_different_kind_both_kept() {
        let mut lore = Lore::default();
        lore.upsert(character("Meridian"));
        lore.upsert(LoreEntry::Location(Location {
            name: "Meridian".to_string(),
            description: "A station on the rim.".to_string(),
            significance: "Home port.".to_string(),
        }));
        assert_eq!(lore.len(), 2);
        assert!(lore.contains(LoreKind::Character, "meridian"));
        assert!(lore.contains(LoreKind::Location, "Meridian"));
    }

    #[test]
    fn render_includes_name_and_kind_header() {
        let entry = LoreEntry::WorldElement(WorldElement {
            name: "Chronolock".to_string(),
            kind: "technology".to_string(),
            description: "Freezes local time.".to_string(),
            rules: vec!["Cannot nest fields".to_string()],
        });
        let text = entry.render();
        assert!(text.starts_with("World Element: Chronolock"));
        assert!(text.contains("Rules: Cannot nest fields"));
    }

    #[test]
    fn entries_roundtrip_through_serde() {
        let entry = character("Vesper");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"lore_kind\":\"character\""));
        let parsed: LoreEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, entry);
    }
}
