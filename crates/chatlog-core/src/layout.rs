//! Naming conventions of a chat archive on disk
//!
//! ```text
//! <data dir>/db_storage/
//!   ├── contact/contact.db      contact directory
//!   └── message/message_N.db    time-sharded message containers
//! ```
//!
//! Decryption flattens this into `<out>/contact.db` and `<out>/message_N.db`,
//! which is the layout the query engine reads.

/// File name of the contact directory inside a decrypted archive
pub const CONTACT_DB_FILE: &str = "contact.db";

/// Glob matching message shard candidates; refine with [`is_shard_file`]
pub const SHARD_GLOB: &str = "message_*.db";

const SHARD_PREFIX: &str = "message_";
const SHARD_SUFFIX: &str = ".db";

/// Suffix that marks a conversation id as a group chat
pub const ROOM_SUFFIX: &str = "@chatroom";

/// `message_<digits>.db` with any number of digits, including none.
///
/// Both the decryptor and the query engine use this set. Other `message_*`
/// files (full-text indexes, resource tables) share the prefix but not the
/// schema, and never have an all-digit stem.
pub fn is_shard_file(name: &str) -> bool {
    name.strip_prefix(SHARD_PREFIX)
        .and_then(|rest| rest.strip_suffix(SHARD_SUFFIX))
        .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether a conversation id denotes a group chat.
pub fn is_room_id(talker: &str) -> bool {
    talker.ends_with(ROOM_SUFFIX)
}
