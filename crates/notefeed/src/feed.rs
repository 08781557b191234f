use std::collections::{BTreeMap, VecDeque};

use enostr::{Filter, Note, NoteId, PoolEvent, PoolSubscription, Pubkey, RelayPool, RelayStatus};
use tracing::{debug, info};

use crate::content::process_content;
use crate::Error;

/// A note ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub id: NoteId,
    pub author: Pubkey,
    pub created_at: u64,
    pub body_html: String,
    pub images: Vec<String>,
}

impl RenderedPost {
    pub fn from_note(note: &Note) -> Self {
        let content = process_content(&note.content);
        RenderedPost {
            id: note.id,
            author: note.pubkey,
            created_at: note.created_at,
            body_html: content.html,
            images: content.images,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Post(RenderedPost),
    /// `relay` has sent everything it had stored.
    EndOfStored { relay: String },
}

/// Posts in the order they arrived, most recent arrival first.
#[derive(Debug, Default)]
pub struct FeedView {
    posts: VecDeque<RenderedPost>,
}

impl FeedView {
    fn push(&mut self, post: RenderedPost) {
        self.posts.push_front(post);
    }

    pub fn posts(&self) -> impl Iterator<Item = &RenderedPost> {
        self.posts.iter()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Text notes from a fixed set of authors, merged across every relay in
/// the pool. Lives until closed or dropped.
pub struct Feed {
    sub: PoolSubscription,
    view: FeedView,
}

impl Feed {
    pub async fn open(pool: &RelayPool, authors: &[Pubkey], limit: u64) -> Result<Feed, Error> {
        if authors.is_empty() {
            return Err(Error::Config("no authors to follow".to_owned()));
        }

        let filter = Filter::new()
            .kinds([enostr::KIND_TEXT_NOTE])
            .authors(authors.iter().copied())
            .limit(limit);

        let sub = pool.subscribe(filter).await?;
        info!(
            "feed open for {} authors on {} relays",
            authors.len(),
            sub.connected()
        );

        Ok(Feed {
            sub,
            view: FeedView::default(),
        })
    }

    /// Wait for the next new post or end-of-stored notice. `None` once
    /// every relay has gone away.
    pub async fn next(&mut self) -> Option<FeedUpdate> {
        match self.sub.next().await? {
            PoolEvent::Event { relay, note } => {
                debug!("post {} from {relay}", note.id);
                let post = RenderedPost::from_note(&note);
                self.view.push(post.clone());
                Some(FeedUpdate::Post(post))
            }
            PoolEvent::Eose { relay } => Some(FeedUpdate::EndOfStored { relay }),
        }
    }

    pub fn view(&self) -> &FeedView {
        &self.view
    }

    pub fn relay_statuses(&self) -> &BTreeMap<String, RelayStatus> {
        self.sub.statuses()
    }

    /// Tear down every relay connection and wait until they are closed.
    pub async fn close(self) {
        self.sub.close().await;
    }
}
