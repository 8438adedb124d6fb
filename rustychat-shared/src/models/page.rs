use serde::{Deserialize, Serialize};

use super::Message;

/// One fetched slice of a stream's history.
///
/// Messages are newest-first. `cursor` is the opaque continuation token for
/// the next (older) page; `has_more` is false once history is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub has_more: bool,
}

impl Page {
    /// An empty terminal page.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            messages: Vec::new(),
            cursor: None,
            has_more: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_page_has_no_continuation() {
        let page = Page::empty();

        assert!(page.messages.is_empty());
        assert!(page.cursor.is_none());
        assert!(!page.has_more);
    }

    #[test]
    fn cursor_survives_serialization() {
        let page = Page {
            messages: Vec::new(),
            cursor: Some("abc".to_string()),
            has_more: true,
        };

        let json = serde_json::to_string(&page).unwrap();
        let back: Page = serde_json::from_str(&json).unwrap();

        assert_eq!(back.cursor.as_deref(), Some("abc"));
        assert!(back.has_more);
    }
}
