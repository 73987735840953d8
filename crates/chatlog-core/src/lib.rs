pub mod config;
pub mod error;
pub mod layout;
pub mod time;
pub mod types;

pub use error::{ChatlogError, ChatlogResult};
pub use types::{Message, MessageKind, RoomInfo};
