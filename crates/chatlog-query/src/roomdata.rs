//! Room member list decoding
//!
//! `chat_room.ext_buffer` is a protobuf message. Only two levels matter:
//!
//! ```text
//! RoomData { repeated Member members = 1; ... }
//! Member   { string username = 1; string display_name = 2; ... }
//! ```
//!
//! Decoding is best effort. The first structural problem (a length running
//! past the buffer, a wire type other than varint/length-delimited) ends the
//! walk and whatever was decoded up to that point is returned.

use std::collections::HashMap;

use bytes::Buf;
use prost::encoding::{decode_key, decode_varint, WireType};
use tracing::debug;

const MEMBER_FIELD: u32 = 1;
const USERNAME_FIELD: u32 = 1;
const DISPLAY_NAME_FIELD: u32 = 2;

enum Field<'a> {
    Varint,
    Bytes(&'a [u8]),
}

/// Decode a room's `username → display name` map.
pub fn parse_room_members(data: &[u8]) -> HashMap<String, String> {
    let mut members = HashMap::new();
    if data.len() < 2 {
        return members;
    }

    let mut buf = data;
    while buf.has_remaining() {
        let Some((tag, field)) = next_field(&mut buf) else {
            debug!(
                decoded = members.len(),
                remaining = buf.len(),
                "room data truncated"
            );
            break;
        };

        if let (MEMBER_FIELD, Field::Bytes(payload)) = (tag, field) {
            if let Some((username, display_name)) = parse_member(payload) {
                members.insert(username, display_name);
            }
        }
    }
    members
}

fn parse_member(mut buf: &[u8]) -> Option<(String, String)> {
    let mut username = String::new();
    let mut display_name = String::new();

    while buf.has_remaining() {
        let Some((tag, field)) = next_field(&mut buf) else {
            break;
        };
        match (tag, field) {
            (USERNAME_FIELD, Field::Bytes(b)) => username = String::from_utf8_lossy(b).into_owned(),
            (DISPLAY_NAME_FIELD, Field::Bytes(b)) => {
                display_name = String::from_utf8_lossy(b).into_owned()
            }
            _ => {}
        }
    }

    (!username.is_empty() && !display_name.is_empty()).then_some((username, display_name))
}

/// Read one field, advancing `buf` past it. `None` on any structural error.
fn next_field<'a>(buf: &mut &'a [u8]) -> Option<(u32, Field<'a>)> {
    let (tag, wire_type) = decode_key(buf).ok()?;
    match wire_type {
        WireType::Varint => {
            decode_varint(buf).ok()?;
            Some((tag, Field::Varint))
        }
        WireType::LengthDelimited => {
            let len = usize::try_from(decode_varint(buf).ok()?).ok()?;
            if len > buf.len() {
                return None;
            }
            let (bytes, rest) = buf.split_at(len);
            *buf = rest;
            Some((tag, Field::Bytes(bytes)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;
    use proptest::prelude::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Member {
        #[prost(string, tag = "1")]
        username: String,
        #[prost(string, tag = "2")]
        display_name: String,
        #[prost(uint32, tag = "3")]
        flags: u32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct RoomData {
        #[prost(message, repeated, tag = "1")]
        members: Vec<Member>,
        #[prost(uint64, tag = "2")]
        version: u64,
        #[prost(string, tag = "4")]
        announcement: String,
    }

    fn member(username: &str, display_name: &str) -> Member {
        Member {
            username: username.into(),
            display_name: display_name.into(),
            flags: 7,
        }
    }

    #[test]
    fn decodes_members() {
        let room = RoomData {
            members: vec![member("wxid_a", "Alice"), member("wxid_b", "鲍勃")],
            version: 12,
            announcement: "hi".into(),
        };

        let members = parse_room_members(&room.encode_to_vec());

        assert_eq!(members.len(), 2);
        assert_eq!(members["wxid_a"], "Alice");
        assert_eq!(members["wxid_b"], "鲍勃");
    }

    #[test]
    fn skips_members_without_display_name() {
        let room = RoomData {
            members: vec![member("wxid_a", ""), member("wxid_b", "Bob"), member("", "ghost")],
            ..Default::default()
        };

        let members = parse_room_members(&room.encode_to_vec());
        assert_eq!(members.len(), 1);
        assert_eq!(members["wxid_b"], "Bob");
    }

    #[test]
    fn truncated_input_keeps_prefix() {
        let room = RoomData {
            members: vec![member("wxid_a", "Alice"), member("wxid_b", "Bob")],
            ..Default::default()
        };
        let mut bytes = room.encode_to_vec();
        bytes.truncate(bytes.len() - 2);

        let members = parse_room_members(&bytes);
        assert_eq!(members.len(), 1);
        assert_eq!(members["wxid_a"], "Alice");
    }

    #[test]
    fn unsupported_wire_type_stops() {
        let mut bytes = RoomData {
            members: vec![member("wxid_a", "Alice")],
            ..Default::default()
        }
        .encode_to_vec();
        // field 5, fixed64
        bytes.extend_from_slice(&[0x29, 1, 2, 3, 4, 5, 6, 7, 8]);
        bytes.extend_from_slice(&member("wxid_b", "Bob").encode_length_delimited_to_vec());

        let members = parse_room_members(&bytes);
        assert_eq!(members.len(), 1);
        assert!(members.contains_key("wxid_a"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        // Member { 1: "wx\xffid", 2: "A" }
        let inner = [0x0a, 0x05, b'w', b'x', 0xff, b'i', b'd', 0x12, 0x01, b'A'];
        let mut bytes = vec![0x0a, inner.len() as u8];
        bytes.extend_from_slice(&inner);

        let members = parse_room_members(&bytes);
        assert_eq!(members["wx\u{fffd}id"], "A");
    }

    #[test]
    fn tiny_input_is_empty() {
        assert!(parse_room_members(&[]).is_empty());
        assert!(parse_room_members(&[0x0a]).is_empty());
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = parse_room_members(&data);
        }

        #[test]
        fn encoded_members_are_recovered(
            names in proptest::collection::hash_map("[a-z_0-9]{1,12}", "\\PC{1,8}", 0..16),
        ) {
            let room = RoomData {
                members: names.iter().map(|(u, d)| member(u, d)).collect(),
                ..Default::default()
            };
            prop_assert_eq!(parse_room_members(&room.encode_to_vec()), names);
        }
    }
}
