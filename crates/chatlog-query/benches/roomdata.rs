use chatlog_query::parse_room_members;
use prost::Message;

#[derive(Clone, PartialEq, Message)]
struct Member {
    #[prost(string, tag = "1")]
    username: String,
    #[prost(string, tag = "2")]
    display_name: String,
}

#[derive(Clone, PartialEq, Message)]
struct RoomData {
    #[prost(message, repeated, tag = "1")]
    members: Vec<Member>,
}

fn make_room(members: usize) -> Vec<u8> {
    RoomData {
        members: (0..members)
            .map(|i| Member {
                username: format!("wxid_{i:08}"),
                display_name: format!("member {i}"),
            })
            .collect(),
    }
    .encode_to_vec()
}

#[divan::bench(args = [10, 500, 5000])]
fn bench_parse_room_members(bencher: divan::Bencher, members: usize) {
    let data = make_room(members);
    bencher
        .counter(divan::counter::BytesCount::new(data.len()))
        .bench(|| parse_room_members(divan::black_box(&data)));
}

fn main() {
    divan::main();
}
