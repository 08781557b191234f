use hashbrown::HashSet;

use crate::{Note, NoteId};

/// Remembers every note id surfaced during one subscription so a note
/// delivered by several relays only comes out once.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<NoteId>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the note if its id has not been seen yet.
    pub fn admit(&mut self, note: Note) -> Option<Note> {
        if self.seen.insert(note.id) {
            Some(note)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FullKeypair;

    #[test]
    fn each_id_surfaces_exactly_once() {
        let keys = FullKeypair::from_secret_bytes([3; 32]).unwrap();
        let notes: Vec<Note> = (0..5)
            .map(|i| keys.sign_note(1, 1_700_000_000 + i, vec![], "post").unwrap())
            .collect();

        // three relays delivering overlapping, reordered copies
        let delivered = notes
            .iter()
            .chain(notes.iter().rev())
            .chain(notes.iter().step_by(2))
            .cloned();

        let mut dedup = Deduplicator::new();
        let out: Vec<NoteId> = delivered.filter_map(|n| dedup.admit(n)).map(|n| n.id).collect();

        let expected: Vec<NoteId> = notes.iter().map(|n| n.id).collect();
        assert_eq!(out, expected);
    }
}
