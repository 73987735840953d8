use chrono::{DateTime, Local};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Speaker label used for outbound messages when rendering a transcript
pub const SELF_LABEL: &str = "我";

/// Default timestamp layout for [`Message::format`]
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Message kind, taken from the low 32 bits of a row's `local_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    Animation,
    Location,
    Share,
    System,
    Other(u32),
}

impl MessageKind {
    pub const TEXT: u32 = 1;
    pub const IMAGE: u32 = 3;
    pub const VOICE: u32 = 34;
    pub const VIDEO: u32 = 43;
    pub const ANIMATION: u32 = 47;
    pub const LOCATION: u32 = 48;
    pub const SHARE: u32 = 49;
    pub const SYSTEM: u32 = 10000;

    /// Mask a raw `local_type` column value down to its kind code.
    pub fn code_of(local_type: i64) -> u32 {
        (local_type & 0xFFFF_FFFF) as u32
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            Self::TEXT => Self::Text,
            Self::IMAGE => Self::Image,
            Self::VOICE => Self::Voice,
            Self::VIDEO => Self::Video,
            Self::ANIMATION => Self::Animation,
            Self::LOCATION => Self::Location,
            Self::SHARE => Self::Share,
            Self::SYSTEM => Self::System,
            other => Self::Other(other),
        }
    }
}

/// A group chat ("room") from the contact directory
///
/// Serializes with its resolved `display_name` alongside the stored fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomInfo {
    pub username: String,
    pub owner: String,
    pub remark: String,
    pub nick_name: String,
}

impl RoomInfo {
    pub fn new(username: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            owner: owner.into(),
            remark: String::new(),
            nick_name: String::new(),
        }
    }

    /// Remark, then nick name, then the raw room id.
    pub fn display_name(&self) -> &str {
        if !self.remark.is_empty() {
            &self.remark
        } else if !self.nick_name.is_empty() {
            &self.nick_name
        } else {
            &self.username
        }
    }
}

impl Serialize for RoomInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut room = serializer.serialize_struct("RoomInfo", 5)?;
        room.serialize_field("username", &self.username)?;
        room.serialize_field("display_name", self.display_name())?;
        room.serialize_field("owner", &self.owner)?;
        room.serialize_field("nick_name", &self.nick_name)?;
        room.serialize_field("remark", &self.remark)?;
        room.end()
    }
}

/// One decoded message, attributed to its sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Shard-local sort sequence; global ordering key
    pub seq: i64,
    pub time: DateTime<Local>,
    /// Conversation the message belongs to (room id or peer id)
    pub talker: String,
    pub sender: String,
    pub sender_name: String,
    pub msg_type: u32,
    pub content: String,
    pub is_self: bool,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_code(self.msg_type)
    }

    /// Render as `[time] speaker: content`.
    pub fn format(&self) -> String {
        self.format_with(DEFAULT_TIME_FORMAT)
    }

    pub fn format_with(&self, time_format: &str) -> String {
        let speaker = if self.is_self {
            SELF_LABEL
        } else if !self.sender_name.is_empty() {
            self.sender_name.as_str()
        } else {
            self.sender.as_str()
        };
        format!(
            "[{}] {}: {}",
            self.time.format(time_format),
            speaker,
            self.content
        )
    }
}
