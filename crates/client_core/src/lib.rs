pub mod api;
pub mod channel;
pub mod config;
pub mod conversations;
pub mod delivery;
pub mod error;
pub mod events;
pub mod presence;
pub mod session;
pub mod telemetry;
pub mod timeline;
pub mod typing;
pub mod validator;

pub use api::{ChatApi, HttpChatApi, MissingChatApi};
pub use channel::{ChannelConnector, RealtimeChannel, WebSocketConnector};
pub use config::{load_settings, ClientSettings};
pub use conversations::ConversationStore;
pub use delivery::{Delivery, DeliveryPath};
pub use error::{ChannelError, SendError, SessionError, ValidationError};
pub use events::{EventBus, EventKind, Subscription};
pub use presence::PresenceTracker;
pub use session::{ChatSession, Intent, SessionSnapshot};
pub use timeline::TimelineStore;
pub use typing::TypingCoordinator;
pub use validator::MessageValidator;

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
