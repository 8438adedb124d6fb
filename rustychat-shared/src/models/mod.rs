pub mod errors;
pub mod events;
pub mod message;
pub mod page;
pub mod requests;
pub mod stream;
pub mod timestamp;

pub use errors::ErrorResponse;
pub use events::{MessagePatch, PushEnvelope, StreamEvent};
pub use message::{Attachment, Message, MessageDraft, MessageId, Reaction};
pub use page::Page;
pub use requests::{DeleteMessageRequest, EditMessageRequest, SendMessageRequest};
pub use stream::{StreamKey, StreamType};
pub use timestamp::Timestamp;
