//! The stream coordinator: composition root of the message cache.
//!
//! One coordinator owns the cache for every open stream. Per stream key it
//! wires together the page set, dedup window, thread index, mutation ledger,
//! and subscription lifecycle, and it is the only writer any of them ever
//! see. Callers open a stream (reference-counted), read `view()`, issue
//! mutations, and listen on the update channel; everything else happens
//! behind the lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use shared::config::CacheConfig;
use shared::models::{
    DeleteMessageRequest, EditMessageRequest, Message, MessageDraft, MessageId, MessagePatch,
    PushEnvelope, Reaction, SendMessageRequest, StreamEvent, StreamKey, Timestamp,
};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::api::ChatApi;
use crate::dedup::{DedupWindow, EventClass};
use crate::error::{CacheError, CacheResult};
use crate::mutation::{BeginUpdate, MutationLedger, placeholder_message};
use crate::page_store::{PageSet, ReplaceOutcome};
use crate::subscription::{LifecycleSignal, SubscriptionState};
use crate::threads::ThreadIndex;
use crate::transport::{PushTransport, TransportHandle, TransportSignal};

/// Notifications pushed to cache consumers.
#[derive(Debug, Clone)]
pub enum CacheUpdate {
    /// The flattened view of `stream` changed; re-read it.
    ViewChanged { stream: StreamKey },
    /// A thread-detail cache under `stream` changed.
    ThreadChanged {
        stream: StreamKey,
        parent_id: MessageId,
    },
    /// An optimistic mutation was rejected and rolled back. For a failed
    /// send, `draft` carries the original content back to the composer.
    MutationFailed {
        stream: StreamKey,
        target: MessageId,
        draft: Option<MessageDraft>,
        reason: String,
    },
    /// The subscription for `stream` moved to a new state.
    ConnectionChanged {
        stream: StreamKey,
        state: SubscriptionState,
    },
}

/// What `open` hands back: the key plus a live connection-status receiver.
#[derive(Debug)]
pub struct StreamHandle {
    pub key: StreamKey,
    pub status: watch::Receiver<SubscriptionState>,
}

struct StreamState {
    epoch: u64,
    refcount: usize,
    pages: PageSet,
    threads: ThreadIndex,
    dedup: DedupWindow,
    ledger: MutationLedger,
    pagination_in_flight: bool,
    status_tx: watch::Sender<SubscriptionState>,
    dispatch: JoinHandle<()>,
    transport_handle: Box<dyn TransportHandle>,
}

struct Inner {
    api: Arc<dyn ChatApi>,
    transport: Arc<dyn PushTransport>,
    current_user: Uuid,
    config: CacheConfig,
    streams: Mutex<HashMap<StreamKey, StreamState>>,
    updates: broadcast::Sender<CacheUpdate>,
    epochs: AtomicU64,
}

/// The coordinator. Cheap to clone; all clones share one cache.
#[derive(Clone)]
pub struct StreamCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator").finish()
    }
}

impl StreamCoordinator {
    #[must_use]
    pub fn new(
        api: Arc<dyn ChatApi>,
        transport: Arc<dyn PushTransport>,
        current_user: Uuid,
        config: CacheConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                api,
                transport,
                current_user,
                config,
                streams: Mutex::new(HashMap::new()),
                updates,
                epochs: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to cache notifications (view changes, mutation failures,
    /// connection changes) across all open streams.
    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<CacheUpdate> {
        self.inner.updates.subscribe()
    }

    /// Open `key`, subscribing to its topic and fetching the newest window.
    ///
    /// Idempotent: repeated opens share the one underlying subscription and
    /// only bump a reference count.
    #[instrument(name = "cache.open", skip(self), fields(stream = %key))]
    pub async fn open(&self, key: StreamKey) -> CacheResult<StreamHandle> {
        let mut streams = self.inner.streams.lock().await;
        if let Some(state) = streams.get_mut(&key) {
            state.refcount += 1;
            debug!(refcount = state.refcount, "stream already open");
            return Ok(StreamHandle {
                status: state.status_tx.subscribe(),
                key,
            });
        }

        let topic = key.topic();
        let subscription =
            self.inner
                .transport
                .subscribe(topic.clone())
                .await
                .map_err(|err| CacheError::Subscribe {
                    topic,
                    reason: err.to_string(),
                })?;

        let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status_rx) = watch::channel(SubscriptionState::Connecting);
        let dispatch = tokio::spawn(dispatch_signals(
            self.inner.clone(),
            key.clone(),
            epoch,
            subscription.signals,
        ));

        let cache = &self.inner.config;
        streams.insert(
            key.clone(),
            StreamState {
                epoch,
                refcount: 1,
                pages: PageSet::new(cache.max_resident_pages),
                threads: ThreadIndex::new(),
                dedup: DedupWindow::new(
                    cache.dedup_capacity,
                    Duration::from_secs(cache.dedup_create_ttl_seconds),
                    Duration::from_secs(cache.dedup_patch_ttl_seconds),
                ),
                ledger: MutationLedger::new(),
                pagination_in_flight: false,
                status_tx,
                dispatch,
                transport_handle: subscription.handle,
            },
        );
        drop(streams);

        info!("stream opened");
        let inner = self.inner.clone();
        let fetch_key = key.clone();
        tokio::spawn(async move {
            inner.initial_fetch(fetch_key, epoch).await;
        });

        Ok(StreamHandle {
            key,
            status: status_rx,
        })
    }

    /// Drop one reference to `key`; the subscription and cache are torn down
    /// when the last holder closes. In-flight mutations are left to finish —
    /// their confirmations reconcile against whatever cache exists then.
    #[instrument(name = "cache.close", skip(self), fields(stream = %key))]
    pub async fn close(&self, key: &StreamKey) {
        let mut streams = self.inner.streams.lock().await;
        let Some(state) = streams.get_mut(key) else {
            warn!("close for a stream that is not open");
            return;
        };
        state.refcount -= 1;
        if state.refcount > 0 {
            debug!(refcount = state.refcount, "stream still referenced");
            return;
        }
        if let Some(state) = streams.remove(key) {
            state.transport_handle.shutdown();
            state.dispatch.abort();
            info!("stream closed");
        }
    }

    /// Flattened, ordered, de-duplicated view of `key`. Empty when not open.
    pub async fn view(&self, key: &StreamKey) -> Vec<Message> {
        let streams = self.inner.streams.lock().await;
        streams.get(key).map(|s| s.pages.view()).unwrap_or_default()
    }

    /// Current connection state of `key`'s subscription.
    pub async fn connection_status(&self, key: &StreamKey) -> SubscriptionState {
        let streams = self.inner.streams.lock().await;
        streams
            .get(key)
            .map_or(SubscriptionState::Closed, |s| *s.status_tx.borrow())
    }

    /// Optimistically post `draft`: a placeholder appears in the view
    /// immediately and the returned id names it until the server confirms.
    #[instrument(name = "cache.send_message", skip(self, draft), fields(stream = %key), err)]
    pub async fn send_message(
        &self,
        key: &StreamKey,
        draft: MessageDraft,
    ) -> CacheResult<MessageId> {
        let placeholder = {
            let mut streams = self.inner.streams.lock().await;
            let state = streams
                .get_mut(key)
                .ok_or_else(|| CacheError::StreamNotOpen(key.clone()))?;
            let placeholder = placeholder_message(key.clone(), self.inner.current_user, &draft);
            state.ledger.begin_create(placeholder.id.clone(), draft);
            state.pages.prepend_realtime(placeholder.clone());
            if placeholder.parent_id.is_some() {
                state.threads.note_reply(&mut state.pages, &placeholder);
            }
            placeholder
        };

        self.inner.notify(CacheUpdate::ViewChanged { stream: key.clone() });
        if let Some(parent_id) = placeholder.parent_id.clone() {
            self.inner.notify(CacheUpdate::ThreadChanged {
                stream: key.clone(),
                parent_id,
            });
        }

        let id = placeholder.id.clone();
        let inner = self.inner.clone();
        let key = key.clone();
        tokio::spawn(async move {
            submit_create(inner, key, placeholder).await;
        });
        Ok(id)
    }

    /// Optimistically edit `id`. A second edit while one is in flight queues
    /// behind it; the last one queued wins.
    #[instrument(name = "cache.edit_message", skip(self, request), fields(stream = %key, id = %id), err)]
    pub async fn edit_message(
        &self,
        key: &StreamKey,
        id: &MessageId,
        request: EditMessageRequest,
    ) -> CacheResult<()> {
        let begun = {
            let mut streams = self.inner.streams.lock().await;
            let state = streams
                .get_mut(key)
                .ok_or_else(|| CacheError::StreamNotOpen(key.clone()))?;
            apply_optimistic_edit(state, id, &request)
        };
        self.inner.notify(CacheUpdate::ViewChanged { stream: key.clone() });

        if begun == BeginUpdate::Started {
            let inner = self.inner.clone();
            let key = key.clone();
            let id = id.clone();
            tokio::spawn(async move {
                submit_update(inner, key, id, request).await;
            });
        }
        Ok(())
    }

    /// Optimistically delete `id`. No-op while another mutation on the same
    /// row is still in flight.
    #[instrument(name = "cache.delete_message", skip(self, request), fields(stream = %key, id = %id), err)]
    pub async fn delete_message(
        &self,
        key: &StreamKey,
        id: &MessageId,
        request: DeleteMessageRequest,
    ) -> CacheResult<()> {
        let submitted = {
            let mut streams = self.inner.streams.lock().await;
            let state = streams
                .get_mut(key)
                .ok_or_else(|| CacheError::StreamNotOpen(key.clone()))?;
            if state.ledger.is_pending(id) {
                debug!("delete skipped; mutation in flight");
                false
            } else if let Some(row) = state.pages.remove(id) {
                let parent_id = row.message.parent_id.clone();
                let parent_snapshot = parent_id
                    .as_ref()
                    .and_then(|pid| state.pages.get(pid).cloned());
                if let Some(pid) = &parent_id {
                    state.threads.note_delete(&mut state.pages, pid, id);
                }
                state.threads.remove_everywhere(id);
                state.ledger.begin_delete(id.clone(), row, parent_snapshot);
                true
            } else {
                warn!("delete for a message that is not cached");
                false
            }
        };

        if submitted {
            self.inner.notify(CacheUpdate::ViewChanged { stream: key.clone() });
            let inner = self.inner.clone();
            let key = key.clone();
            let id = id.clone();
            tokio::spawn(async move {
                submit_delete(inner, key, id, request).await;
            });
        }
        Ok(())
    }

    /// Toggle the current user's `emoji` reaction on `id`. Rides the edit
    /// pipeline with a full replacement of the reaction list.
    #[instrument(name = "cache.toggle_reaction", skip(self), fields(stream = %key, id = %id), err)]
    pub async fn toggle_reaction(
        &self,
        key: &StreamKey,
        id: &MessageId,
        emoji: &str,
    ) -> CacheResult<()> {
        let request = {
            let streams = self.inner.streams.lock().await;
            let state = streams
                .get(key)
                .ok_or_else(|| CacheError::StreamNotOpen(key.clone()))?;
            let Some(current) = state.pages.get(id) else {
                warn!("reaction toggle for a message that is not cached");
                return Ok(());
            };
            let reactions =
                toggle_reaction_list(&current.reactions, emoji, self.inner.current_user);
            EditMessageRequest {
                reactions: Some(reactions),
                ..EditMessageRequest::default()
            }
        };
        self.edit_message(key, id, request).await
    }

    /// Fetch the next older page. Single-flight per stream: a call while a
    /// fetch is pending is a no-op, not a queued second fetch.
    #[instrument(name = "cache.load_older_page", skip(self), fields(stream = %key), err)]
    pub async fn load_older_page(&self, key: &StreamKey) -> CacheResult<()> {
        let job = {
            let mut streams = self.inner.streams.lock().await;
            let state = streams
                .get_mut(key)
                .ok_or_else(|| CacheError::StreamNotOpen(key.clone()))?;
            if state.pagination_in_flight {
                debug!("pagination already in flight");
                None
            } else if !state.pages.has_more() {
                debug!("no more history");
                None
            } else if let Some(cursor) = state.pages.tail_cursor() {
                let cursor = cursor.to_string();
                state.pagination_in_flight = true;
                Some((cursor, state.epoch))
            } else {
                debug!("no tail cursor yet; initial fetch still pending");
                None
            }
        };

        if let Some((cursor, epoch)) = job {
            let inner = self.inner.clone();
            let key = key.clone();
            tokio::spawn(async move {
                fetch_older(inner, key, cursor, epoch).await;
            });
        }
        Ok(())
    }

    /// Materialize the thread-detail cache for `parent_id`, seeded from the
    /// replies already resident.
    pub async fn open_thread(&self, key: &StreamKey, parent_id: &MessageId) -> CacheResult<()> {
        let mut streams = self.inner.streams.lock().await;
        let state = streams
            .get_mut(key)
            .ok_or_else(|| CacheError::StreamNotOpen(key.clone()))?;
        state.threads.open_detail(&state.pages, parent_id);
        Ok(())
    }

    /// Replies under `parent_id`, newest first. Falls back to a page-set scan
    /// when no detail cache has been materialized.
    pub async fn thread_view(&self, key: &StreamKey, parent_id: &MessageId) -> Vec<Message> {
        let streams = self.inner.streams.lock().await;
        let Some(state) = streams.get(key) else {
            return Vec::new();
        };
        match state.threads.detail_view(parent_id) {
            Some(replies) => replies.to_vec(),
            None => state.pages.replies_to(parent_id),
        }
    }

    /// Tear down the transport connection and dial again.
    #[instrument(name = "cache.force_reconnect", skip(self), fields(stream = %key), err)]
    pub async fn force_reconnect(&self, key: &StreamKey) -> CacheResult<()> {
        let mut streams = self.inner.streams.lock().await;
        let state = streams
            .get_mut(key)
            .ok_or_else(|| CacheError::StreamNotOpen(key.clone()))?;
        let next = state
            .status_tx
            .borrow()
            .apply(&LifecycleSignal::ReconnectRequested);
        state.status_tx.send_replace(next);
        state.transport_handle.reconnect();
        drop(streams);
        self.inner.notify(CacheUpdate::ConnectionChanged {
            stream: key.clone(),
            state: next,
        });
        Ok(())
    }
}

impl Inner {
    fn notify(&self, update: CacheUpdate) {
        // Nobody listening is fine.
        let _ = self.updates.send(update);
    }

    async fn initial_fetch(&self, key: StreamKey, epoch: u64) {
        match self.api.fetch_page(key.clone(), None).await {
            Ok(page) => {
                let mut streams = self.streams.lock().await;
                let Some(state) = streams.get_mut(&key) else {
                    debug!(stream = %key, "stream closed before initial page arrived");
                    return;
                };
                if state.epoch != epoch {
                    debug!(stream = %key, "initial page for a previous open; dropping");
                    return;
                }
                state.pages.install_initial(page);
                drop(streams);
                self.notify(CacheUpdate::ViewChanged { stream: key });
            }
            Err(err) => {
                warn!(stream = %key, error = %err, "initial page fetch failed");
            }
        }
    }

    async fn handle_status(&self, key: &StreamKey, epoch: u64, status: crate::transport::TransportStatus) {
        let mut streams = self.streams.lock().await;
        let Some(state) = streams.get_mut(key) else {
            return;
        };
        if state.epoch != epoch {
            return;
        }
        let current = *state.status_tx.borrow();
        let next = current.apply(&LifecycleSignal::Transport(status));
        if next != current {
            state.status_tx.send_replace(next);
            drop(streams);
            self.notify(CacheUpdate::ConnectionChanged {
                stream: key.clone(),
                state: next,
            });
        }
    }

    async fn handle_event(&self, key: &StreamKey, epoch: u64, envelope: PushEnvelope) {
        let mut streams = self.streams.lock().await;
        let Some(state) = streams.get_mut(key) else {
            return;
        };
        if state.epoch != epoch {
            return;
        }

        let current = *state.status_tx.borrow();
        if !current.accepts_events() {
            debug!(stream = %key, state = %current, "dropping event outside subscribed state");
            return;
        }

        let class = match &envelope.event {
            StreamEvent::NewMessage { .. } => EventClass::Creation,
            StreamEvent::MessageUpdated { .. } | StreamEvent::MessageDeleted { .. } => {
                EventClass::Mutation
            }
        };
        if !state.dedup.should_apply(&envelope.event_id, class) {
            return;
        }

        match envelope.event {
            StreamEvent::NewMessage { message } => {
                if state.pages.contains(&message.id) {
                    debug!(id = %message.id, "message already cached");
                    return;
                }
                if message.author_id == self.current_user && state.ledger.create_in_flight() {
                    debug!(id = %message.id, "suppressing self echo while a send is in flight");
                    return;
                }
                let parent_id = message.parent_id.clone();
                state.pages.prepend_realtime(message.clone());
                if parent_id.is_some() {
                    state.threads.note_reply(&mut state.pages, &message);
                }
                drop(streams);
                self.notify(CacheUpdate::ViewChanged { stream: key.clone() });
                if let Some(parent_id) = parent_id {
                    self.notify(CacheUpdate::ThreadChanged {
                        stream: key.clone(),
                        parent_id,
                    });
                }
            }
            StreamEvent::MessageUpdated { id, patch, parent_id } => {
                let in_pages = state.pages.patch(&id, &patch);
                let in_details = state.threads.patch_everywhere(&id, &patch);
                drop(streams);
                if in_pages || in_details {
                    self.notify(CacheUpdate::ViewChanged { stream: key.clone() });
                    if let Some(parent_id) = parent_id {
                        self.notify(CacheUpdate::ThreadChanged {
                            stream: key.clone(),
                            parent_id,
                        });
                    }
                } else {
                    // Event for a row that never loaded; the next full fetch
                    // will carry the edit anyway.
                    debug!(id = %id, "update for unknown message; ignoring");
                }
            }
            StreamEvent::MessageDeleted { id, parent_id } => {
                let removed = state.pages.remove(&id);
                let parent_id =
                    parent_id.or_else(|| removed.as_ref().and_then(|r| r.message.parent_id.clone()));
                if let Some(pid) = &parent_id {
                    state.threads.note_delete(&mut state.pages, pid, &id);
                }
                state.threads.remove_everywhere(&id);
                drop(streams);
                if removed.is_none() {
                    debug!(id = %id, "delete for unknown message; ignoring");
                    return;
                }
                self.notify(CacheUpdate::ViewChanged { stream: key.clone() });
                if let Some(parent_id) = parent_id {
                    self.notify(CacheUpdate::ThreadChanged {
                        stream: key.clone(),
                        parent_id,
                    });
                }
            }
        }
    }
}

/// Consume one subscription's signal stream, feeding the state machine and
/// the event handlers.
async fn dispatch_signals(
    inner: Arc<Inner>,
    key: StreamKey,
    epoch: u64,
    mut signals: mpsc::Receiver<TransportSignal>,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            TransportSignal::Status(status) => inner.handle_status(&key, epoch, status).await,
            TransportSignal::Event(envelope) => inner.handle_event(&key, epoch, envelope).await,
        }
    }
    debug!(stream = %key, "transport signal stream ended");
}

/// Snapshot, optimistically patch, and record an edit. One shared path for
/// user edits, reaction toggles, and queued follow-ups.
fn apply_optimistic_edit(
    state: &mut StreamState,
    id: &MessageId,
    request: &EditMessageRequest,
) -> BeginUpdate {
    let snapshot = state.pages.get(id).cloned();
    let patch = MessagePatch {
        body: request.body.clone(),
        edited_at: request.body.as_ref().map(|_| Timestamp::now()),
        deleted_at: None,
        reactions: request.reactions.clone(),
        attachments: None,
    };
    let in_pages = state.pages.patch(id, &patch);
    let in_details = state.threads.patch_everywhere(id, &patch);
    if !in_pages && !in_details {
        warn!(id = %id, "edit target not cached; submitting without optimistic apply");
    }
    state.ledger.begin_update(id.clone(), request.clone(), snapshot)
}

/// Toggle `user` on `emoji`, dropping reactions nobody holds anymore.
fn toggle_reaction_list(reactions: &[Reaction], emoji: &str, user: Uuid) -> Vec<Reaction> {
    let mut next: Vec<Reaction> = reactions.to_vec();
    match next.iter_mut().find(|r| r.emoji == emoji) {
        Some(reaction) => {
            if reaction.user_ids.contains(&user) {
                reaction.user_ids.retain(|u| *u != user);
            } else {
                reaction.user_ids.push(user);
            }
        }
        None => next.push(Reaction {
            emoji: emoji.to_string(),
            user_ids: vec![user],
        }),
    }
    next.retain(|r| !r.user_ids.is_empty());
    next
}

async fn submit_create(inner: Arc<Inner>, key: StreamKey, placeholder: Message) {
    let request = SendMessageRequest {
        body: placeholder.body.clone(),
        parent_id: placeholder.parent_id.clone(),
        attachments: placeholder.attachments.clone(),
    };

    match inner.api.submit_create(key.clone(), request).await {
        Ok(mut confirmed) => {
            confirmed.optimistic = false;
            let queued = {
                let mut streams = inner.streams.lock().await;
                let Some(state) = streams.get_mut(&key) else {
                    info!(stream = %key, id = %confirmed.id, "send confirmed after close; nothing to reconcile");
                    return;
                };
                let record = state.ledger.complete(&placeholder.id);
                match state.pages.replace_placeholder(&placeholder.id, confirmed.clone()) {
                    ReplaceOutcome::Replaced => {}
                    ReplaceOutcome::AlreadyConfirmed => {
                        debug!(id = %confirmed.id, "confirmed row already cached");
                    }
                    ReplaceOutcome::PlaceholderGone => {
                        info!(id = %confirmed.id, "placeholder removed before confirmation; not re-inserting");
                    }
                }
                state.threads.replace_everywhere(&placeholder.id, &confirmed);
                match record.and_then(|r| r.queued) {
                    Some(next) => {
                        // Re-target the parked edit at the confirmed id.
                        match apply_optimistic_edit(state, &confirmed.id, &next) {
                            BeginUpdate::Started => Some(next),
                            BeginUpdate::Queued => None,
                        }
                    }
                    None => None,
                }
            };
            inner.notify(CacheUpdate::ViewChanged { stream: key.clone() });
            if let Some(request) = queued {
                let id = confirmed.id.clone();
                submit_update(inner, key, id, request).await;
            }
        }
        Err(err) => {
            warn!(stream = %key, error = %err, "send rejected; rolling back placeholder");
            {
                let mut streams = inner.streams.lock().await;
                if let Some(state) = streams.get_mut(&key) {
                    state.ledger.fail(&placeholder.id);
                    if state.pages.remove(&placeholder.id).is_some()
                        && let Some(pid) = &placeholder.parent_id
                    {
                        state.threads.note_delete(&mut state.pages, pid, &placeholder.id);
                    }
                }
            }
            // The original content goes back to the caller, never into the void.
            let draft = MessageDraft {
                body: placeholder.body,
                parent_id: placeholder.parent_id,
                attachments: placeholder.attachments,
            };
            inner.notify(CacheUpdate::MutationFailed {
                stream: key.clone(),
                target: placeholder.id,
                draft: Some(draft),
                reason: err.to_string(),
            });
            inner.notify(CacheUpdate::ViewChanged { stream: key });
        }
    }
}

async fn submit_update(
    inner: Arc<Inner>,
    key: StreamKey,
    id: MessageId,
    first: EditMessageRequest,
) {
    let mut request = first;
    loop {
        match inner
            .api
            .submit_update(key.clone(), id.clone(), request.clone())
            .await
        {
            Ok(mut confirmed) => {
                confirmed.optimistic = false;
                let queued = {
                    let mut streams = inner.streams.lock().await;
                    let Some(state) = streams.get_mut(&key) else {
                        return;
                    };
                    let record = state.ledger.complete(&id);
                    state.pages.write(confirmed.clone());
                    let server_copy = confirmed.clone();
                    state
                        .threads
                        .apply_everywhere(&id, |m| *m = server_copy.clone());
                    match record.and_then(|r| r.queued) {
                        Some(next) => match apply_optimistic_edit(state, &id, &next) {
                            BeginUpdate::Started => Some(next),
                            BeginUpdate::Queued => None,
                        },
                        None => None,
                    }
                };
                inner.notify(CacheUpdate::ViewChanged { stream: key.clone() });
                match queued {
                    Some(next) => {
                        request = next;
                    }
                    None => return,
                }
            }
            Err(err) => {
                warn!(stream = %key, id = %id, error = %err, "edit rejected; restoring snapshot");
                {
                    let mut streams = inner.streams.lock().await;
                    if let Some(state) = streams.get_mut(&key)
                        && let Some(snapshot) = state.ledger.fail(&id).and_then(|r| r.snapshot)
                    {
                        state.pages.write(snapshot.clone());
                        state
                            .threads
                            .apply_everywhere(&id, |m| *m = snapshot.clone());
                    }
                }
                inner.notify(CacheUpdate::MutationFailed {
                    stream: key.clone(),
                    target: id,
                    draft: None,
                    reason: err.to_string(),
                });
                inner.notify(CacheUpdate::ViewChanged { stream: key });
                return;
            }
        }
    }
}

async fn submit_delete(
    inner: Arc<Inner>,
    key: StreamKey,
    id: MessageId,
    request: DeleteMessageRequest,
) {
    match inner.api.submit_delete(key.clone(), id.clone(), request).await {
        Ok(()) => {
            let mut streams = inner.streams.lock().await;
            if let Some(state) = streams.get_mut(&key) {
                state.ledger.complete(&id);
            }
        }
        Err(err) => {
            warn!(stream = %key, id = %id, error = %err, "delete rejected; restoring row");
            {
                let mut streams = inner.streams.lock().await;
                if let Some(state) = streams.get_mut(&key)
                    && let Some(record) = state.ledger.fail(&id)
                    && let Some(row) = record.removed_row
                {
                    let message = row.message.clone();
                    state.pages.restore(row);
                    if let Some(parent) = record.parent_snapshot {
                        state.pages.write(parent);
                    }
                    if let Some(pid) = &message.parent_id {
                        state.threads.insert_detail_if_open(pid, &message);
                    }
                }
            }
            inner.notify(CacheUpdate::MutationFailed {
                stream: key.clone(),
                target: id,
                draft: None,
                reason: err.to_string(),
            });
            inner.notify(CacheUpdate::ViewChanged { stream: key });
        }
    }
}

async fn fetch_older(inner: Arc<Inner>, key: StreamKey, cursor: String, epoch: u64) {
    let result = inner.api.fetch_page(key.clone(), Some(cursor.clone())).await;

    let mut streams = inner.streams.lock().await;
    let Some(state) = streams.get_mut(&key) else {
        debug!(stream = %key, "pagination response after close; dropping");
        return;
    };
    if state.epoch != epoch {
        debug!(stream = %key, "pagination response for a previous open; dropping");
        return;
    }
    state.pagination_in_flight = false;

    match result {
        Ok(page) => {
            if state.pages.append_older_page(page, &cursor) {
                drop(streams);
                inner.notify(CacheUpdate::ViewChanged { stream: key });
            }
        }
        Err(err) => {
            warn!(stream = %key, error = %err, "pagination fetch failed");
        }
    }
}
