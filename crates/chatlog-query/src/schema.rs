//! Table layout of decrypted archive databases
//!
//! The archive's schema is fixed by the client; these are the only
//! statements the engine issues, all of them read-only.

use md5::{Digest, Md5};

/// Start of a shard's time window (unix seconds), one row
pub const SHARD_START_SQL: &str = "SELECT timestamp FROM Timestamp LIMIT 1";

pub const TABLE_EXISTS_SQL: &str =
    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1";

pub const CONTACT_NAME_SQL: &str =
    "SELECT remark, nick_name, alias FROM contact WHERE username = ?1 LIMIT 1";

pub const ROOM_MEMBERS_SQL: &str = "SELECT ext_buffer FROM chat_room WHERE username = ?1 LIMIT 1";

/// Rooms with their contact-table names. `?1` is the limit, `-1` for none.
pub const LIST_ROOMS_SQL: &str = "SELECT r.username, r.owner, c.nick_name, c.remark \
     FROM chat_room r LEFT JOIN contact c ON c.username = r.username \
     ORDER BY r.username LIMIT ?1";

/// Per-conversation message table: `Msg_` + lowercase hex MD5 of the talker id.
pub fn table_name_for(talker: &str) -> String {
    format!("Msg_{}", hex::encode(Md5::digest(talker.as_bytes())))
}

/// Rows of one conversation within `[?1, ?2]`, sender resolved through `Name2Id`.
///
/// `table` must come from [`table_name_for`]; it is not a bindable parameter.
pub fn messages_sql(table: &str) -> String {
    format!(
        "SELECT m.sort_seq, m.local_type, n.user_name, m.create_time, m.message_content, m.status \
         FROM {table} m LEFT JOIN Name2Id n ON m.real_sender_id = n.rowid \
         WHERE m.create_time >= ?1 AND m.create_time <= ?2 \
         ORDER BY m.sort_seq ASC"
    )
}
