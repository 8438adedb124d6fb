//! Bookkeeping for optimistic mutations.
//!
//! Every optimistic write gets a [`PendingMutation`] record keyed by its
//! target id (the placeholder id for creates). The ledger enforces the
//! concurrency rule — at most one in-flight mutation per target, later edits
//! queue with last-queued-wins — and carries the state needed to reconcile:
//! the draft to hand back on a failed send, and pre-mutation snapshots to
//! restore verbatim on a failed edit or delete.

use std::collections::HashMap;

use shared::models::{
    EditMessageRequest, Message, MessageDraft, MessageId, StreamKey, Timestamp,
};
use tracing::debug;
use uuid::Uuid;

use crate::page_store::RemovedRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    InFlight,
    Succeeded,
    Failed,
}

/// One optimistic write awaiting its server verdict.
#[derive(Debug)]
pub struct PendingMutation {
    pub target: MessageId,
    pub kind: MutationKind,
    pub submitted_at: Timestamp,
    pub status: MutationStatus,
    /// Creates: the draft handed back to the caller on failure.
    pub draft: Option<MessageDraft>,
    /// Updates: the row as it was before the optimistic apply.
    pub snapshot: Option<Message>,
    /// Deletes: the removed row with its position, for verbatim restoration.
    pub removed_row: Option<RemovedRow>,
    /// Deletes of replies: the parent row before its counters were mirrored.
    pub parent_snapshot: Option<Message>,
    /// A later edit parked behind this one; replaced on each new edit so the
    /// last one queued wins.
    pub queued: Option<EditMessageRequest>,
}

/// Whether an edit started submitting or parked behind an in-flight mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginUpdate {
    Started,
    Queued,
}

/// Pending-mutation records for one stream.
#[derive(Debug, Default)]
pub struct MutationLedger {
    pending: HashMap<MessageId, PendingMutation>,
}

impl MutationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an optimistic create for `placeholder_id`.
    pub fn begin_create(&mut self, placeholder_id: MessageId, draft: MessageDraft) {
        self.pending.insert(
            placeholder_id.clone(),
            PendingMutation {
                target: placeholder_id,
                kind: MutationKind::Create,
                submitted_at: Timestamp::now(),
                status: MutationStatus::InFlight,
                draft: Some(draft),
                snapshot: None,
                removed_row: None,
                parent_snapshot: None,
                queued: None,
            },
        );
    }

    /// Record an optimistic edit. When `target` already has a mutation in
    /// flight the request parks behind it instead of racing.
    pub fn begin_update(
        &mut self,
        target: MessageId,
        request: EditMessageRequest,
        snapshot: Option<Message>,
    ) -> BeginUpdate {
        if let Some(pending) = self.pending.get_mut(&target) {
            debug!(target = %target, "queueing edit behind in-flight mutation");
            pending.queued = Some(request);
            return BeginUpdate::Queued;
        }
        self.pending.insert(
            target.clone(),
            PendingMutation {
                target,
                kind: MutationKind::Update,
                submitted_at: Timestamp::now(),
                status: MutationStatus::InFlight,
                draft: None,
                snapshot,
                removed_row: None,
                parent_snapshot: None,
                queued: None,
            },
        );
        BeginUpdate::Started
    }

    /// Record an optimistic delete. Returns false (and records nothing) when
    /// a mutation for `target` is already in flight.
    pub fn begin_delete(
        &mut self,
        target: MessageId,
        removed_row: RemovedRow,
        parent_snapshot: Option<Message>,
    ) -> bool {
        if self.pending.contains_key(&target) {
            debug!(target = %target, "delete ignored while another mutation is in flight");
            return false;
        }
        self.pending.insert(
            target.clone(),
            PendingMutation {
                target,
                kind: MutationKind::Delete,
                submitted_at: Timestamp::now(),
                status: MutationStatus::InFlight,
                draft: None,
                snapshot: None,
                removed_row: Some(removed_row),
                parent_snapshot,
                queued: None,
            },
        );
        true
    }

    /// Close out a confirmed mutation, returning its record (with any queued
    /// follow-up edit still attached).
    pub fn complete(&mut self, target: &MessageId) -> Option<PendingMutation> {
        self.pending.remove(target).map(|mut pending| {
            pending.status = MutationStatus::Succeeded;
            pending
        })
    }

    /// Close out a rejected mutation, returning its record for rollback.
    pub fn fail(&mut self, target: &MessageId) -> Option<PendingMutation> {
        self.pending.remove(target).map(|mut pending| {
            pending.status = MutationStatus::Failed;
            pending
        })
    }

    #[must_use]
    pub fn is_pending(&self, target: &MessageId) -> bool {
        self.pending.contains_key(target)
    }

    /// Whether any create is still awaiting confirmation — the window during
    /// which a self-authored realtime echo must be suppressed by author.
    #[must_use]
    pub fn create_in_flight(&self) -> bool {
        self.pending
            .values()
            .any(|p| p.kind == MutationKind::Create && p.status == MutationStatus::InFlight)
    }
}

/// Build the placeholder row an optimistic send inserts.
#[must_use]
pub fn placeholder_message(stream: StreamKey, author_id: Uuid, draft: &MessageDraft) -> Message {
    Message {
        id: MessageId::placeholder(),
        stream,
        parent_id: draft.parent_id.clone(),
        author_id,
        body: draft.body.clone(),
        created_at: Timestamp::now(),
        edited_at: None,
        deleted_at: None,
        reactions: Vec::new(),
        attachments: draft.attachments.clone(),
        thread_reply_count: 0,
        thread_last_reply_at: None,
        thread_participant_ids: Vec::new(),
        optimistic: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::StreamType;

    fn edit(body: &str) -> EditMessageRequest {
        EditMessageRequest {
            body: Some(body.to_string()),
            ..EditMessageRequest::default()
        }
    }

    #[test]
    fn placeholder_rows_are_optimistic() {
        let stream = StreamKey::new(Uuid::new_v4(), StreamType::Channel, Uuid::new_v4());
        let draft = MessageDraft::text("hi");
        let message = placeholder_message(stream, Uuid::new_v4(), &draft);

        assert!(message.id.is_placeholder());
        assert!(message.optimistic);
        assert_eq!(message.body, "hi");
    }

    #[test]
    fn create_lifecycle_round_trips() {
        let mut ledger = MutationLedger::new();
        let id = MessageId::placeholder();
        ledger.begin_create(id.clone(), MessageDraft::text("hi"));

        assert!(ledger.is_pending(&id));
        assert!(ledger.create_in_flight());

        let record = ledger.complete(&id).unwrap();
        assert_eq!(record.status, MutationStatus::Succeeded);
        assert_eq!(record.kind, MutationKind::Create);
        assert!(!ledger.is_pending(&id));
        assert!(!ledger.create_in_flight());
    }

    #[test]
    fn failed_create_hands_the_draft_back() {
        let mut ledger = MutationLedger::new();
        let id = MessageId::placeholder();
        ledger.begin_create(id.clone(), MessageDraft::text("precious words"));

        let record = ledger.fail(&id).unwrap();
        assert_eq!(record.status, MutationStatus::Failed);
        assert_eq!(record.draft.unwrap().body, "precious words");
    }

    #[test]
    fn second_edit_queues_and_last_wins() {
        let mut ledger = MutationLedger::new();
        let id = MessageId::from("m-1");

        assert_eq!(
            ledger.begin_update(id.clone(), edit("first"), None),
            BeginUpdate::Started
        );
        assert_eq!(
            ledger.begin_update(id.clone(), edit("second"), None),
            BeginUpdate::Queued
        );
        assert_eq!(
            ledger.begin_update(id.clone(), edit("third"), None),
            BeginUpdate::Queued
        );

        let record = ledger.complete(&id).unwrap();
        assert_eq!(record.queued.unwrap().body.as_deref(), Some("third"));
    }

    #[test]
    fn edit_on_unconfirmed_create_queues_behind_it() {
        let mut ledger = MutationLedger::new();
        let placeholder = MessageId::placeholder();
        ledger.begin_create(placeholder.clone(), MessageDraft::text("hi"));

        assert_eq!(
            ledger.begin_update(placeholder.clone(), edit("hi, edited"), None),
            BeginUpdate::Queued
        );

        let record = ledger.complete(&placeholder).unwrap();
        assert_eq!(record.kind, MutationKind::Create);
        assert_eq!(record.queued.unwrap().body.as_deref(), Some("hi, edited"));
    }

    #[test]
    fn delete_is_refused_while_in_flight() {
        let mut ledger = MutationLedger::new();
        let stream = StreamKey::new(Uuid::new_v4(), StreamType::Channel, Uuid::new_v4());
        let id = MessageId::from("m-1");
        ledger.begin_update(id.clone(), edit("editing"), None);

        let row = |id: &str| RemovedRow {
            page_idx: 0,
            row_idx: 0,
            message: placeholder_message(stream.clone(), Uuid::new_v4(), &MessageDraft::text(id)),
        };
        assert!(!ledger.begin_delete(id.clone(), row("m-1"), None));
        assert!(ledger.begin_delete(MessageId::from("m-2"), row("m-2"), None));
    }
}
