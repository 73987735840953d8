//! Query engine over a decrypted archive directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chatlog_core::config::QueryConfig;
use chatlog_core::layout::{is_room_id, CONTACT_DB_FILE};
use chatlog_core::time::{local_from_unix, parse_bound, Bound};
use chatlog_core::{ChatlogError, ChatlogResult, Message, MessageKind, RoomInfo};
use chrono::{DateTime, Local};
use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::content::{content_text, split_room_sender};
use crate::roomdata::parse_room_members;
use crate::schema;
use crate::shards::{assign_windows, shard_paths, ShardWindow};

/// Status value the client writes for messages sent from this account
pub const OUTBOUND_STATUS: i64 = 2;

/// Parameters of a [`ChatlogReader::get_messages`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    /// Conversation id: a room id or a peer's id
    pub talker: String,
    /// Inclusive lower bound; `None` uses the configured default start
    pub start: Option<DateTime<Local>>,
    /// Inclusive upper bound; `None` means now
    pub end: Option<DateTime<Local>>,
    /// Keep only plain text messages
    pub text_only: bool,
    /// Maximum number of messages, 0 for no limit
    pub limit: usize,
    pub offset: usize,
}

impl MessageQuery {
    pub fn new(talker: impl Into<String>) -> Self {
        Self {
            talker: talker.into(),
            start: None,
            end: None,
            text_only: true,
            limit: 0,
            offset: 0,
        }
    }

    pub fn between(mut self, start: DateTime<Local>, end: DateTime<Local>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn text_only(mut self, text_only: bool) -> Self {
        self.text_only = text_only;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

struct Shard {
    window: ShardWindow,
    conn: Connection,
}

/// One matching row before attribution
struct RawRow {
    seq: i64,
    local_type: i64,
    sender_ref: Option<String>,
    create_time: i64,
    content: Value,
    status: Option<i64>,
}

/// Read-only view of a decrypted archive.
///
/// The contact directory and the shard set are opened on first use and kept
/// open until [`close`](Self::close) or drop. Decoded room member lists and
/// contact names are cached for the same lifetime.
pub struct ChatlogReader {
    root: PathBuf,
    config: QueryConfig,
    contact: Option<Connection>,
    shards: Option<Vec<Shard>>,
    room_members: HashMap<String, HashMap<String, String>>,
    contact_names: HashMap<String, String>,
}

impl ChatlogReader {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, QueryConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: QueryConfig) -> Self {
        Self {
            root: root.into(),
            config,
            contact: None,
            shards: None,
            room_members: HashMap::new(),
            contact_names: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rooms ordered by id, `limit = 0` for all of them.
    pub fn list_groups(&mut self, limit: usize) -> ChatlogResult<Vec<RoomInfo>> {
        let sql_limit = if limit == 0 { -1 } else { limit as i64 };
        let conn = self.contact_db()?;

        let mut stmt = conn
            .prepare(schema::LIST_ROOMS_SQL)
            .map_err(|e| ChatlogError::Database(format!("Failed to prepare room query: {}", e)))?;
        let rooms = stmt
            .query_map(params![sql_limit], |row| {
                Ok(RoomInfo {
                    username: row.get(0)?,
                    owner: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    nick_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    remark: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })
            .map_err(|e| ChatlogError::Database(format!("Failed to query rooms: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ChatlogError::Database(format!("Failed to read room: {}", e)))?;

        Ok(rooms)
    }

    /// Room remark, else nick name, else the id itself.
    pub fn get_group_display_name(&mut self, room_id: &str) -> ChatlogResult<String> {
        let names = self.contact_row(room_id)?;
        let mut room = RoomInfo::new(room_id, "");
        if let Some((remark, nick_name, _)) = names {
            room.remark = remark;
            room.nick_name = nick_name;
        }
        Ok(room.display_name().to_string())
    }

    /// Contact remark, else nick name, else alias, else the id itself.
    pub fn get_contact_name(&mut self, username: &str) -> ChatlogResult<String> {
        if let Some(name) = self.contact_names.get(username) {
            return Ok(name.clone());
        }

        let name = match self.contact_row(username)? {
            Some((remark, nick_name, alias)) => [remark, nick_name, alias]
                .into_iter()
                .find(|n| !n.is_empty())
                .unwrap_or_else(|| username.to_string()),
            None => username.to_string(),
        };
        self.contact_names.insert(username.to_string(), name.clone());
        Ok(name)
    }

    /// Shard windows in start order, discovering shards on first call.
    #[doc(hidden)]
    pub fn shard_windows(&mut self) -> ChatlogResult<Vec<ShardWindow>> {
        Ok(self.shards()?.iter().map(|s| s.window.clone()).collect())
    }

    /// Messages of one conversation, ordered by sequence number.
    ///
    /// Every shard whose window overlaps the range contributes rows; a shard
    /// without a table for this conversation contributes none. Pagination is
    /// applied after the global sort.
    pub fn get_messages(&mut self, query: &MessageQuery) -> ChatlogResult<Vec<Message>> {
        let start = match query.start {
            Some(start) => start,
            None => parse_bound(&self.config.default_start, Bound::Start)?,
        };
        let end = query.end.unwrap_or_else(Local::now);
        let (start_ts, end_ts) = (start.timestamp(), end.timestamp());
        let table = schema::table_name_for(&query.talker);

        let mut rows = Vec::new();
        for shard in self
            .shards()?
            .iter()
            .filter(|s| s.window.intersects(start_ts, end_ts))
        {
            if !table_exists(&shard.conn, &table)? {
                debug!(shard = %shard.window.path.display(), talker = %query.talker, "no table in shard");
                continue;
            }
            rows.extend(read_rows(&shard.conn, &table, start_ts, end_ts)?);
        }

        if query.text_only {
            rows.retain(|r| MessageKind::code_of(r.local_type) == MessageKind::TEXT);
        }
        rows.sort_by_key(|r| r.seq);

        let limit = if query.limit == 0 {
            usize::MAX
        } else {
            query.limit
        };
        rows.into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|row| self.attribute(&query.talker, row))
            .collect()
    }

    /// Release every open handle and cache. Safe to call repeatedly; the
    /// next query reopens what it needs.
    pub fn close(&mut self) {
        if let Some(conn) = self.contact.take() {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "closing contact database");
            }
        }
        if let Some(shards) = self.shards.take() {
            for shard in shards {
                if let Err((_, e)) = shard.conn.close() {
                    warn!(shard = %shard.window.path.display(), error = %e, "closing shard");
                }
            }
        }
        self.room_members.clear();
        self.contact_names.clear();
    }

    // ── attribution ──────────────────────────────────────────────────────

    fn attribute(&mut self, talker: &str, row: RawRow) -> ChatlogResult<Message> {
        let mut content = content_text(row.content);
        let room = is_room_id(talker);

        let sender = if room {
            let split = split_room_sender(&content).map(|(s, body)| (s.to_string(), body.to_string()));
            match split {
                Some((sender, body)) => {
                    content = body;
                    sender
                }
                None => talker.to_string(),
            }
        } else {
            row.sender_ref
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| talker.to_string())
        };

        let is_self = row.status == Some(OUTBOUND_STATUS) || (!room && sender != talker);
        let sender_name = self.sender_display_name(talker, &sender)?;

        Ok(Message {
            seq: row.seq,
            time: local_from_unix(row.create_time),
            talker: talker.to_string(),
            sender,
            sender_name,
            msg_type: MessageKind::code_of(row.local_type),
            content,
            is_self,
        })
    }

    /// Room member name, then contact name, then the id.
    fn sender_display_name(&mut self, talker: &str, sender: &str) -> ChatlogResult<String> {
        if is_room_id(talker) {
            if let Some(name) = self.room_members(talker).get(sender) {
                return Ok(name.clone());
            }
        }
        self.get_contact_name(sender)
    }

    /// Decoded member names of a room, cached after the first lookup.
    ///
    /// A room whose member data can't be read gets an empty map; its
    /// senders fall back to contact names.
    fn room_members(&mut self, room_id: &str) -> &HashMap<String, String> {
        if !self.room_members.contains_key(room_id) {
            let members = self.read_room_members(room_id).unwrap_or_else(|e| {
                warn!(room = room_id, error = %e, "room member names unavailable");
                HashMap::new()
            });
            debug!(room = room_id, members = members.len(), "decoded room members");
            self.room_members.insert(room_id.to_string(), members);
        }
        &self.room_members[room_id]
    }

    fn read_room_members(&mut self, room_id: &str) -> ChatlogResult<HashMap<String, String>> {
        let conn = self.contact_db()?;
        let ext_buffer: Option<Value> = conn
            .query_row(schema::ROOM_MEMBERS_SQL, params![room_id], |row| row.get(0))
            .optional()
            .map_err(|e| ChatlogError::Database(format!("Failed to read room data: {}", e)))?;

        Ok(match ext_buffer {
            Some(Value::Blob(blob)) => parse_room_members(&blob),
            Some(Value::Text(text)) => parse_room_members(text.as_bytes()),
            _ => HashMap::new(),
        })
    }

    // ── handles ──────────────────────────────────────────────────────────

    fn contact_db(&mut self) -> ChatlogResult<&Connection> {
        if self.contact.is_none() {
            let path = self.root.join(CONTACT_DB_FILE);
            if !path.is_file() {
                return Err(ChatlogError::NotFound(format!(
                    "contact database {}",
                    path.display()
                )));
            }
            self.contact = Some(open_read_only(&path)?);
        }
        self.contact
            .as_ref()
            .ok_or_else(|| ChatlogError::NotFound("contact database".into()))
    }

    fn contact_row(&mut self, username: &str) -> ChatlogResult<Option<(String, String, String)>> {
        let conn = self.contact_db()?;
        conn.query_row(schema::CONTACT_NAME_SQL, params![username], |row| {
            Ok((
                row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            ))
        })
        .optional()
        .map_err(|e| ChatlogError::Database(format!("Failed to read contact {}: {}", username, e)))
    }

    fn shards(&mut self) -> ChatlogResult<&[Shard]> {
        if self.shards.is_none() {
            self.shards = Some(self.discover_shards()?);
        }
        Ok(self.shards.as_deref().unwrap_or_default())
    }

    fn discover_shards(&self) -> ChatlogResult<Vec<Shard>> {
        let paths = shard_paths(&self.root)?;
        if paths.is_empty() {
            return Err(ChatlogError::NotFound(format!(
                "message shards in {}",
                self.root.display()
            )));
        }

        let mut conns = HashMap::new();
        let mut starts = Vec::new();
        for path in paths {
            let opened = open_read_only(&path).and_then(|conn| {
                let start = conn
                    .query_row(schema::SHARD_START_SQL, [], |row| row.get::<_, i64>(0))
                    .map_err(|e| ChatlogError::Database(format!("Failed to read shard start: {}", e)))?;
                Ok((conn, start))
            });
            match opened {
                Ok((conn, start)) => {
                    starts.push((path.clone(), start));
                    conns.insert(path, conn);
                }
                Err(e) => warn!(shard = %path.display(), error = %e, "skipping unreadable shard"),
            }
        }

        let newest_end = Local::now().timestamp() + self.config.newest_shard_margin_secs;
        let shards: Vec<Shard> = assign_windows(starts, newest_end)
            .into_iter()
            .filter_map(|window| {
                conns
                    .remove(&window.path)
                    .map(|conn| Shard { window, conn })
            })
            .collect();

        info!(root = %self.root.display(), shards = shards.len(), "message shards loaded");
        Ok(shards)
    }
}

impl Drop for ChatlogReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChatlogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatlogReader")
            .field("root", &self.root)
            .field("contact_open", &self.contact.is_some())
            .field("shards", &self.shards.as_ref().map(Vec::len))
            .finish()
    }
}

fn open_read_only(path: &Path) -> ChatlogResult<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| ChatlogError::Database(format!("Failed to open {}: {}", path.display(), e)))
}

fn table_exists(conn: &Connection, table: &str) -> ChatlogResult<bool> {
    conn.query_row(schema::TABLE_EXISTS_SQL, params![table], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| ChatlogError::Database(format!("Failed to look up table {}: {}", table, e)))
}

fn read_rows(conn: &Connection, table: &str, start: i64, end: i64) -> ChatlogResult<Vec<RawRow>> {
    let mut stmt = conn
        .prepare(&schema::messages_sql(table))
        .map_err(|e| ChatlogError::Database(format!("Failed to prepare message query: {}", e)))?;

    let rows = stmt
        .query_map(params![start, end], |row| {
            Ok(RawRow {
                seq: row.get(0)?,
                local_type: row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                sender_ref: row.get(2)?,
                create_time: row.get(3)?,
                content: row.get(4)?,
                status: row.get(5)?,
            })
        })
        .map_err(|e| ChatlogError::Database(format!("Failed to query messages: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ChatlogError::Database(format!("Failed to read message: {}", e)))?;

    Ok(rows)
}
