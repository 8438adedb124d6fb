//! Ordered, de-duplicated page storage for one stream.
//!
//! A stream's cache is a list of [`Page`]s: page 0 is the live window and the
//! only page realtime events touch; pages 1..N hold progressively older
//! history appended by pagination. Concatenating all pages front to back
//! always yields `(created_at desc, id asc)` ordering with no id present
//! twice.

use std::cmp::Ordering;
use std::collections::HashSet;

use shared::models::{Message, MessageId, MessagePatch, Page};
use tracing::{debug, warn};

/// Display ordering: newest first, ties broken by the lexicographically
/// smaller id so re-renders are stable.
pub(crate) fn display_order(a: &Message, b: &Message) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Where a removed row used to live, so a failed delete can restore it
/// verbatim.
#[derive(Debug, Clone)]
pub struct RemovedRow {
    pub(crate) page_idx: usize,
    pub(crate) row_idx: usize,
    pub message: Message,
}

/// Outcome of swapping a placeholder for its confirmed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Swapped in place; the view keeps the row's position.
    Replaced,
    /// The confirmed id was already cached (echo landed first); the
    /// placeholder row, if any, was dropped instead of duplicated.
    AlreadyConfirmed,
    /// The placeholder is no longer cached; nothing was inserted.
    PlaceholderGone,
}

/// The page list for one stream key.
#[derive(Debug)]
pub struct PageSet {
    pages: Vec<Page>,
    live_inserts: u64,
    max_resident: usize,
}

impl PageSet {
    #[must_use]
    pub fn new(max_resident: usize) -> Self {
        Self {
            pages: vec![Page::empty()],
            live_inserts: 0,
            max_resident: max_resident.max(1),
        }
    }

    /// Merge the first fetched page into the live window.
    ///
    /// Rows that arrived over realtime (or optimistically) before the fetch
    /// completed are kept; fetched rows already present are skipped.
    pub fn install_initial(&mut self, page: Page) {
        self.pages[0].cursor = page.cursor;
        self.pages[0].has_more = page.has_more;
        for message in page.messages {
            if !self.contains(&message.id) {
                self.insert_into_live(message);
            }
        }
    }

    /// Flattened, ordered, de-duplicated projection across all loaded pages.
    #[must_use]
    pub fn view(&self) -> Vec<Message> {
        let mut seen: HashSet<&MessageId> = HashSet::new();
        let mut out: Vec<Message> = Vec::new();
        for page in &self.pages {
            for message in &page.messages {
                if seen.insert(&message.id) {
                    out.push(message.clone());
                }
            }
        }
        out.sort_by(display_order);
        out
    }

    /// Append an older page fetched with `expected_cursor`.
    ///
    /// Rejected (no-op, logged) when the stream's tail cursor has moved on
    /// since the fetch was issued — a stale response must never land.
    pub fn append_older_page(&mut self, mut page: Page, expected_cursor: &str) -> bool {
        match self.tail_cursor() {
            Some(cursor) if cursor == expected_cursor => {}
            current => {
                warn!(
                    expected = expected_cursor,
                    current = current.unwrap_or("<none>"),
                    "dropping stale pagination response"
                );
                return false;
            }
        }

        page.messages.retain(|m| !self.contains(&m.id));
        self.pages.push(page);

        // Residency cap: drop the interior page that was the tail before this
        // append, keeping the live window and the cursor chain intact.
        while self.pages.len() > self.max_resident {
            let idx = (self.pages.len() - 2).max(1);
            debug!(page = idx, "evicting resident page over cap");
            self.pages.remove(idx);
        }
        true
    }

    /// Insert a realtime message into the live window.
    ///
    /// The id scan covers every page, not just page 0: a message can arrive
    /// via pagination first and realtime second, or the other way around.
    pub fn prepend_realtime(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            debug!(id = %message.id, "realtime message already cached");
            return false;
        }
        self.insert_into_live(message);
        self.live_inserts += 1;
        true
    }

    /// Apply a partial update wherever `id` currently lives.
    ///
    /// A patch for an id that is not cached is a no-op; the caller must not
    /// retry-create a row from a patch.
    pub fn patch(&mut self, id: &MessageId, patch: &MessagePatch) -> bool {
        match self.find_mut(id) {
            Some(message) => {
                patch.apply_to(message);
                true
            }
            None => false,
        }
    }

    /// Remove `id` from whichever page holds it. Pages do not shift.
    pub fn remove(&mut self, id: &MessageId) -> Option<RemovedRow> {
        let (page_idx, row_idx) = self.locate(id)?;
        let message = self.pages[page_idx].messages.remove(row_idx);
        Some(RemovedRow {
            page_idx,
            row_idx,
            message,
        })
    }

    /// Put a removed row back where it came from.
    pub fn restore(&mut self, row: RemovedRow) {
        if self.contains(&row.message.id) {
            return;
        }
        let page_idx = row.page_idx.min(self.pages.len() - 1);
        let messages = &mut self.pages[page_idx].messages;
        let row_idx = row.row_idx.min(messages.len());
        messages.insert(row_idx, row.message);
    }

    /// Overwrite the cached row for `message.id` with the server's copy,
    /// preserving its position. Returns false when the id is not cached.
    pub fn write(&mut self, message: Message) -> bool {
        match self.locate(&message.id) {
            Some((page_idx, row_idx)) => {
                self.pages[page_idx].messages[row_idx] = message;
                true
            }
            None => false,
        }
    }

    /// Swap a placeholder for its server-confirmed row, in place, so the UI
    /// never sees a removal-plus-insertion flash.
    pub fn replace_placeholder(
        &mut self,
        placeholder_id: &MessageId,
        real: Message,
    ) -> ReplaceOutcome {
        if self.contains(&real.id) {
            if self.remove(placeholder_id).is_some() {
                debug!(placeholder = %placeholder_id, id = %real.id, "confirmed id already cached; dropped placeholder");
            }
            return ReplaceOutcome::AlreadyConfirmed;
        }
        match self.locate(placeholder_id) {
            Some((page_idx, row_idx)) => {
                self.pages[page_idx].messages[row_idx] = real;
                ReplaceOutcome::Replaced
            }
            None => ReplaceOutcome::PlaceholderGone,
        }
    }

    /// Apply `f` to the cached row for `id`, if any.
    pub fn apply_everywhere(&mut self, id: &MessageId, mut f: impl FnMut(&mut Message)) -> bool {
        match self.find_mut(id) {
            Some(message) => {
                f(message);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.locate(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.locate(id)
            .map(|(page_idx, row_idx)| &self.pages[page_idx].messages[row_idx])
    }

    /// Opaque continuation token of the oldest resident page.
    #[must_use]
    pub fn tail_cursor(&self) -> Option<&str> {
        self.pages.last().and_then(|page| page.cursor.as_deref())
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.pages.last().is_some_and(|page| page.has_more)
    }

    /// Running count of realtime inserts into the live window.
    #[must_use]
    pub const fn live_inserts(&self) -> u64 {
        self.live_inserts
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All cached messages whose parent is `parent_id`, in display order.
    #[must_use]
    pub fn replies_to(&self, parent_id: &MessageId) -> Vec<Message> {
        let mut replies: Vec<Message> = self
            .pages
            .iter()
            .flat_map(|page| &page.messages)
            .filter(|m| m.parent_id.as_ref() == Some(parent_id))
            .cloned()
            .collect();
        replies.sort_by(display_order);
        replies
    }

    fn locate(&self, id: &MessageId) -> Option<(usize, usize)> {
        self.pages.iter().enumerate().find_map(|(page_idx, page)| {
            page.messages
                .iter()
                .position(|m| &m.id == id)
                .map(|row_idx| (page_idx, row_idx))
        })
    }

    fn find_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.pages
            .iter_mut()
            .flat_map(|page| page.messages.iter_mut())
            .find(|m| &m.id == id)
    }

    fn insert_into_live(&mut self, message: Message) {
        let live = &mut self.pages[0];
        let idx = match live
            .messages
            .binary_search_by(|probe| display_order(probe, &message))
        {
            Ok(idx) | Err(idx) => idx,
        };
        live.messages.insert(idx, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::models::{StreamKey, StreamType, Timestamp};
    use test_case::test_case;
    use uuid::Uuid;

    fn stream() -> StreamKey {
        StreamKey::new(
            Uuid::parse_str("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap(),
            StreamType::Channel,
            Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap(),
        )
    }

    fn msg(id: &str, secs: u32) -> Message {
        Message {
            id: MessageId::from(id),
            stream: stream(),
            parent_id: None,
            author_id: Uuid::new_v4(),
            body: format!("body of {id}"),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 0, secs).unwrap()),
            edited_at: None,
            deleted_at: None,
            reactions: Vec::new(),
            attachments: Vec::new(),
            thread_reply_count: 0,
            thread_last_reply_at: None,
            thread_participant_ids: Vec::new(),
            optimistic: false,
        }
    }

    fn page(messages: Vec<Message>, cursor: Option<&str>, has_more: bool) -> Page {
        Page {
            messages,
            cursor: cursor.map(str::to_string),
            has_more,
        }
    }

    fn ids(view: &[Message]) -> Vec<&str> {
        view.iter().map(|m| m.id.0.as_str()).collect()
    }

    #[test]
    fn view_orders_newest_first() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10), msg("a", 5)], Some("abc"), true));
        pages.prepend_realtime(msg("c", 20));
        pages.prepend_realtime(msg("d", 1));

        assert_eq!(ids(&pages.view()), vec!["c", "b", "a", "d"]);
    }

    // Identical created_at: the lexicographically smaller id sorts first,
    // whatever the insertion order was.
    #[test_case(&["x", "y"]; "in order")]
    #[test_case(&["y", "x"]; "reversed")]
    fn view_breaks_timestamp_ties_by_id(order: &[&str]) {
        let mut pages = PageSet::new(16);
        for id in order {
            pages.prepend_realtime(msg(id, 30));
        }

        assert_eq!(ids(&pages.view()), vec!["x", "y"]);
    }

    #[test]
    fn realtime_then_pagination_never_duplicates() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10)], Some("abc"), true));
        // "a" arrives over realtime first...
        assert!(pages.prepend_realtime(msg("a", 5)));
        // ...and again inside the next older page.
        assert!(pages.append_older_page(page(vec![msg("a", 5), msg("z", 1)], None, false), "abc"));

        assert_eq!(ids(&pages.view()), vec!["b", "a", "z"]);
    }

    #[test]
    fn pagination_then_realtime_never_duplicates() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10), msg("a", 5)], Some("abc"), true));

        assert!(!pages.prepend_realtime(msg("a", 5)));
        assert_eq!(ids(&pages.view()), vec!["b", "a"]);
        assert_eq!(pages.live_inserts(), 0);
    }

    #[test]
    fn stale_cursor_response_is_rejected() {
        let mut pages = PageSet::new(16);
        let twenty: Vec<Message> = (0..20).map(|i| msg(&format!("m-{i:02}"), 59 - i)).collect();
        pages.install_initial(page(twenty, Some("abc"), true));

        // A response from a since-superseded fetch tagged with cursor "xyz".
        let stale = page(vec![msg("old", 1)], Some("next"), true);
        assert!(!pages.append_older_page(stale, "xyz"));
        assert_eq!(pages.view().len(), 20);
        assert_eq!(pages.tail_cursor(), Some("abc"));
    }

    #[test]
    fn append_advances_the_tail_cursor() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10)], Some("abc"), true));

        assert!(pages.append_older_page(page(vec![msg("a", 5)], Some("def"), true), "abc"));
        assert_eq!(pages.tail_cursor(), Some("def"));
        assert!(pages.has_more());

        assert!(pages.append_older_page(page(vec![msg("z", 1)], None, false), "def"));
        assert!(!pages.has_more());
    }

    #[test]
    fn residency_cap_keeps_live_window_and_tail() {
        let mut pages = PageSet::new(3);
        pages.install_initial(page(vec![msg("live", 50)], Some("c0"), true));
        for i in 0..4u32 {
            let cursor = format!("c{}", i + 1);
            let appended = page(vec![msg(&format!("p{i}"), 40 - i)], Some(cursor.as_str()), true);
            assert!(pages.append_older_page(appended, &format!("c{i}")));
        }

        assert_eq!(pages.page_count(), 3);
        // The tail page (and its cursor) survives so scrolling keeps working.
        assert_eq!(pages.tail_cursor(), Some("c4"));
        let view = pages.view();
        assert!(view.iter().any(|m| m.id.0 == "live"));
        assert!(view.iter().any(|m| m.id.0 == "p3"));
    }

    #[test]
    fn replace_placeholder_preserves_position() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10), msg("a", 5)], None, false));
        let mut placeholder = msg("tmp-0001", 7);
        placeholder.optimistic = true;
        pages.prepend_realtime(placeholder);

        assert_eq!(ids(&pages.view()), vec!["b", "tmp-0001", "a"]);

        let mut real = msg("m-42", 7);
        real.body = "confirmed".into();
        let outcome = pages.replace_placeholder(&MessageId::from("tmp-0001"), real);

        assert_eq!(outcome, ReplaceOutcome::Replaced);
        assert_eq!(ids(&pages.view()), vec!["b", "m-42", "a"]);
        assert!(!pages.view()[1].optimistic);
    }

    #[test]
    fn replace_placeholder_drops_row_when_echo_landed_first() {
        let mut pages = PageSet::new(16);
        let mut placeholder = msg("tmp-0001", 7);
        placeholder.optimistic = true;
        pages.prepend_realtime(placeholder);
        pages.prepend_realtime(msg("m-42", 7));

        let outcome = pages.replace_placeholder(&MessageId::from("tmp-0001"), msg("m-42", 7));

        assert_eq!(outcome, ReplaceOutcome::AlreadyConfirmed);
        assert_eq!(ids(&pages.view()), vec!["m-42"]);
    }

    #[test]
    fn replace_placeholder_without_row_is_a_noop() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10)], None, false));

        let outcome = pages.replace_placeholder(&MessageId::from("tmp-gone"), msg("m-42", 7));

        assert_eq!(outcome, ReplaceOutcome::PlaceholderGone);
        assert_eq!(ids(&pages.view()), vec!["b"]);
    }

    #[test]
    fn patch_for_unknown_id_is_a_noop() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10)], None, false));

        let patch = MessagePatch {
            body: Some("edited".into()),
            ..MessagePatch::default()
        };
        assert!(!pages.patch(&MessageId::from("missing"), &patch));
        assert!(pages.patch(&MessageId::from("b"), &patch));
        assert_eq!(pages.get(&MessageId::from("b")).unwrap().body, "edited");
    }

    #[test]
    fn remove_and_restore_are_verbatim() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("c", 15), msg("b", 10), msg("a", 5)], None, false));
        let before = pages.view();

        let row = pages.remove(&MessageId::from("b")).unwrap();
        assert_eq!(ids(&pages.view()), vec!["c", "a"]);

        pages.restore(row);
        assert_eq!(pages.view(), before);
    }

    #[test]
    fn live_counter_tracks_realtime_inserts_only() {
        let mut pages = PageSet::new(16);
        pages.install_initial(page(vec![msg("b", 10)], Some("abc"), true));
        pages.prepend_realtime(msg("c", 20));
        pages.prepend_realtime(msg("d", 25));
        pages.append_older_page(page(vec![msg("a", 5)], None, false), "abc");

        assert_eq!(pages.live_inserts(), 2);
    }
}
