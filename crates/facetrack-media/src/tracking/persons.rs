//! Person identities assigned to detected faces.

use crate::error::MediaResult;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Identity assigned to one detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonLabel {
    /// Person name, `unk_NNN` for anonymous persons
    pub identity: String,
    /// Stable index of the person
    pub index: usize,
    /// Match confidence
    pub score: f32,
}

impl PersonLabel {
    pub fn new(identity: impl Into<String>, index: usize, score: f32) -> Self {
        Self {
            identity: identity.into(),
            index,
            score,
        }
    }

    /// Label of an anonymous person.
    pub fn anonymous(index: usize) -> Self {
        Self::new(anonymous_identity(index), index, 1.0)
    }
}

/// Identity of the anonymous person with the given index.
pub fn anonymous_identity(index: usize) -> String {
    format!("unk_{index:03}")
}

/// One person of the catalogue with its reference faces.
#[derive(Debug, Clone)]
pub struct PersonEntry {
    pub identity: String,
    /// Whether the person was registered up front rather than discovered
    pub known: bool,
    pub faces: Vec<RgbImage>,
}

/// Reference faces of the persons met during a session.
///
/// Indices are positions in the catalogue and never change.
#[derive(Debug, Clone, Default)]
pub struct PersonCatalogue {
    persons: Vec<PersonEntry>,
    unknown_count: usize,
}

impl PersonCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reference face for a named person and return its index.
    pub fn add_known(&mut self, identity: &str, face: RgbImage) -> usize {
        if let Some(index) = self.index_of(identity) {
            self.persons[index].faces.push(face);
            return index;
        }
        self.persons.push(PersonEntry {
            identity: identity.to_string(),
            known: true,
            faces: vec![face],
        });
        self.persons.len() - 1
    }

    /// Register a face nobody matched as a new anonymous person.
    pub fn add_unknown(&mut self, face: RgbImage) -> PersonLabel {
        let identity = anonymous_identity(self.unknown_count);
        self.unknown_count += 1;
        self.persons.push(PersonEntry {
            identity: identity.clone(),
            known: false,
            faces: vec![face],
        });
        PersonLabel::new(identity, self.persons.len() - 1, 1.0)
    }

    pub fn index_of(&self, identity: &str) -> Option<usize> {
        self.persons.iter().position(|p| p.identity == identity)
    }

    pub fn get(&self, index: usize) -> Option<&PersonEntry> {
        self.persons.get(index)
    }

    pub fn len(&self) -> usize {
        self.persons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PersonEntry> {
        self.persons.iter()
    }

    pub fn clear(&mut self) {
        self.persons.clear();
        self.unknown_count = 0;
    }
}

/// Identity matching strategy.
///
/// Given the cropped faces of one frame and the catalogue, returns one entry
/// per face; `None` marks a face matching nobody, which is then registered
/// as a new anonymous person.
pub trait PersonMatcher: Send {
    fn assign(
        &mut self,
        faces: &[RgbImage],
        catalogue: &PersonCatalogue,
    ) -> MediaResult<Vec<Option<PersonLabel>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity_format() {
        assert_eq!(anonymous_identity(0), "unk_000");
        assert_eq!(anonymous_identity(42), "unk_042");
        assert_eq!(anonymous_identity(1234), "unk_1234");
        assert_eq!(PersonLabel::anonymous(3).index, 3);
    }

    #[test]
    fn test_catalogue_indices_are_stable() {
        let mut catalogue = PersonCatalogue::new();
        let alice = catalogue.add_known("alice", RgbImage::new(2, 2));
        let unk = catalogue.add_unknown(RgbImage::new(2, 2));
        let alice_again = catalogue.add_known("alice", RgbImage::new(2, 2));
        let unk2 = catalogue.add_unknown(RgbImage::new(2, 2));

        assert_eq!(alice, 0);
        assert_eq!(alice_again, 0);
        assert_eq!(unk, PersonLabel::new("unk_000", 1, 1.0));
        assert_eq!(unk2.identity, "unk_001");
        assert_eq!(catalogue.len(), 3);
        assert_eq!(catalogue.get(0).unwrap().faces.len(), 2);
        assert!(!catalogue.get(1).unwrap().known);
        assert_eq!(catalogue.index_of("unk_001"), Some(2));
    }
}
