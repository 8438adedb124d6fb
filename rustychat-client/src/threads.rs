//! Thread metadata propagation.
//!
//! A reply (inbound or optimistic) updates its parent's reply count, last
//! reply time, and participant set wherever the parent is cached, and lands
//! in the parent's thread-detail cache when one exists. Detail caches are
//! materialized lazily: only for parents somebody has opened, or on a
//! parent's first reply.

use std::collections::HashMap;

use shared::models::{Message, MessageId, MessagePatch};
use tracing::debug;

use crate::page_store::{PageSet, display_order};

/// Thread-detail caches for one stream, keyed by parent message id.
#[derive(Debug, Default)]
pub struct ThreadIndex {
    detail: HashMap<MessageId, Vec<Message>>,
}

impl ThreadIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Propagate a reply to its parent. Returns false when the parent is not
    /// cached (acceptable staleness; the next full fetch corrects it).
    pub fn note_reply(&mut self, pages: &mut PageSet, reply: &Message) -> bool {
        let Some(parent_id) = reply.parent_id.clone() else {
            return false;
        };

        let mut first_reply = false;
        let found = pages.apply_everywhere(&parent_id, |parent| {
            first_reply = parent.thread_reply_count == 0;
            parent.thread_reply_count += 1;
            parent.thread_last_reply_at = Some(reply.created_at.clone());
            if !parent.thread_participant_ids.contains(&reply.author_id) {
                parent.thread_participant_ids.push(reply.author_id);
            }
        });
        if !found {
            debug!(parent = %parent_id, reply = %reply.id, "dropping thread propagation for unloaded parent");
            return false;
        }

        if first_reply || self.detail.contains_key(&parent_id) {
            let replies = self.detail.entry(parent_id).or_default();
            if !replies.iter().any(|m| m.id == reply.id) {
                let idx = match replies.binary_search_by(|probe| display_order(probe, reply)) {
                    Ok(idx) | Err(idx) => idx,
                };
                replies.insert(idx, reply.clone());
            }
        }
        true
    }

    /// Mirror a reply deletion: decrement the parent's count (floor 0) and
    /// drop the row from the detail cache. The participant set is left alone;
    /// recomputing historical participation would only make avatars flicker.
    pub fn note_delete(
        &mut self,
        pages: &mut PageSet,
        parent_id: &MessageId,
        deleted_id: &MessageId,
    ) {
        let found = pages.apply_everywhere(parent_id, |parent| {
            parent.thread_reply_count = (parent.thread_reply_count - 1).max(0);
        });
        if !found {
            debug!(parent = %parent_id, "delete for reply of unloaded parent");
        }
        if let Some(replies) = self.detail.get_mut(parent_id) {
            replies.retain(|m| &m.id != deleted_id);
        }
    }

    /// Materialize the detail cache for `parent_id`, seeding it with the
    /// replies already resident in the page set.
    pub fn open_detail(&mut self, pages: &PageSet, parent_id: &MessageId) {
        self.detail
            .entry(parent_id.clone())
            .or_insert_with(|| pages.replies_to(parent_id));
    }

    /// The detail cache for `parent_id`, if one has been materialized.
    #[must_use]
    pub fn detail_view(&self, parent_id: &MessageId) -> Option<&[Message]> {
        self.detail.get(parent_id).map(Vec::as_slice)
    }

    /// Apply a patch to `id` in every detail cache holding it. Returns true
    /// when at least one row was touched.
    pub fn patch_everywhere(&mut self, id: &MessageId, patch: &MessagePatch) -> bool {
        let mut touched = false;
        for replies in self.detail.values_mut() {
            if let Some(message) = replies.iter_mut().find(|m| &m.id == id) {
                patch.apply_to(message);
                touched = true;
            }
        }
        touched
    }

    /// Apply `f` to `id` in every detail cache holding it.
    pub fn apply_everywhere(&mut self, id: &MessageId, mut f: impl FnMut(&mut Message)) -> bool {
        let mut touched = false;
        for replies in self.detail.values_mut() {
            if let Some(message) = replies.iter_mut().find(|m| &m.id == id) {
                f(message);
                touched = true;
            }
        }
        touched
    }

    /// Re-insert a reply into its parent's detail cache, if one is open.
    /// Used when a failed optimistic delete is rolled back.
    pub fn insert_detail_if_open(&mut self, parent_id: &MessageId, message: &Message) {
        if let Some(replies) = self.detail.get_mut(parent_id)
            && !replies.iter().any(|m| m.id == message.id)
        {
            let idx = match replies.binary_search_by(|probe| display_order(probe, message)) {
                Ok(idx) | Err(idx) => idx,
            };
            replies.insert(idx, message.clone());
        }
    }

    /// Swap a placeholder row for its confirmed counterpart in place.
    pub fn replace_everywhere(&mut self, placeholder_id: &MessageId, real: &Message) {
        for replies in self.detail.values_mut() {
            if replies.iter().any(|m| m.id == real.id) {
                replies.retain(|m| &m.id != placeholder_id);
            } else if let Some(message) =
                replies.iter_mut().find(|m| &m.id == placeholder_id)
            {
                *message = real.clone();
            }
        }
    }

    /// Remove `id` from every detail cache, and drop `id`'s own cache when it
    /// was a parent.
    pub fn remove_everywhere(&mut self, id: &MessageId) {
        for replies in self.detail.values_mut() {
            replies.retain(|m| &m.id != id);
        }
        if self.detail.remove(id).is_some() {
            debug!(parent = %id, "dropped thread-detail cache for deleted parent");
        }
    }

    #[must_use]
    pub fn has_detail(&self, parent_id: &MessageId) -> bool {
        self.detail.contains_key(parent_id)
    }
}
