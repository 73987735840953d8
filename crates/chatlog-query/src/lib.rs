//! chatlog-query: reads a decrypted archive
//!
//! The archive directory holds `contact.db` and any number of time-sharded
//! `message_N.db` files. [`ChatlogReader`] opens them lazily, routes a time
//! range to the shards that cover it, and turns raw rows into attributed
//! [`Message`](chatlog_core::Message) records.

pub mod content;
pub mod reader;
pub mod roomdata;
pub mod schema;
pub mod shards;

pub use reader::{ChatlogReader, MessageQuery};
pub use roomdata::parse_room_members;
pub use shards::ShardWindow;
