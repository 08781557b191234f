use serde::{Deserialize, Serialize};

use crate::Pubkey;

/// Subscription filter. Only the fields the feed and profile lookups
/// need are modeled; unset fields are left out of the wire form.
#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Clone, Default)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    kinds: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authors: Option<Vec<Pubkey>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u64>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = Pubkey>) -> Self {
        self.authors = Some(authors.into_iter().collect());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    /// Whether a note would be returned by a relay for this filter.
    pub fn matches(&self, note: &crate::Note) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&note.kind) {
                return false;
            }
        }

        if let Some(authors) = &self.authors {
            if !authors.contains(&note.pubkey) {
                return false;
            }
        }

        true
    }
}
