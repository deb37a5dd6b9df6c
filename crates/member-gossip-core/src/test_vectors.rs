//! Fixed wire vectors
//!
//! Byte-exact encodings other implementations of the protocol must match.

use crate::message::*;
use crate::types::*;

struct WireVector {
    name: &'static str,
    message: ProtocolMessage,
    bytes: Vec<u8>,
}

fn vectors() -> Vec<WireVector> {
    vec![
        WireVector {
            name: "join_request_empty_table",
            message: ProtocolMessage::JoinRequest(Envelope {
                sender: NodeIdentity::new(2, 0),
                heartbeat: 0,
                sent_at: 0,
                members: vec![],
            }),
            bytes: vec![
                0x00, // kind
                0x00, 0x00, 0x00, 0x02, // host id
                0x00, 0x00, // port
                0, 0, 0, 0, 0, 0, 0, 0, // heartbeat
                0, 0, 0, 0, 0, 0, 0, 0, // sent_at
            ],
        },
        WireVector {
            name: "join_reply_one_member",
            message: ProtocolMessage::JoinReply(Envelope {
                sender: NodeIdentity::new(1, 0),
                heartbeat: 3,
                sent_at: 4,
                members: vec![MembershipEntry::new(NodeIdentity::new(2, 0), 1, 4)],
            }),
            bytes: vec![
                0x01, //
                0x00, 0x00, 0x00, 0x01, //
                0x00, 0x00, //
                0, 0, 0, 0, 0, 0, 0, 3, //
                0, 0, 0, 0, 0, 0, 0, 4, //
                // record
                0x00, 0x00, 0x00, 0x02, //
                0x00, 0x00, //
                0, 0, 0, 0, 0, 0, 0, 1, //
                0, 0, 0, 0, 0, 0, 0, 4, //
            ],
        },
        WireVector {
            name: "heartbeat_ipv4_identity",
            message: ProtocolMessage::Heartbeat(Envelope {
                sender: NodeIdentity::new(0x7f00_0001, 9100),
                heartbeat: 0x0102,
                sent_at: 0x0a0b,
                members: vec![MembershipEntry::new(
                    NodeIdentity::new(0xc0a8_0105, 9101),
                    0xffff_ffff_ffff_ffff,
                    0x0a0a,
                )],
            }),
            bytes: vec![
                0x02, //
                0x7f, 0x00, 0x00, 0x01, //
                0x23, 0x8c, //
                0, 0, 0, 0, 0, 0, 0x01, 0x02, //
                0, 0, 0, 0, 0, 0, 0x0a, 0x0b, //
                0xc0, 0xa8, 0x01, 0x05, //
                0x23, 0x8d, //
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, //
                0, 0, 0, 0, 0, 0, 0x0a, 0x0a, //
            ],
        },
    ]
}

#[test]
fn test_wire_vectors_encode() {
    for v in vectors() {
        assert_eq!(v.message.encode().to_vec(), v.bytes, "vector {}", v.name);
    }
}

#[test]
fn test_wire_vectors_decode() {
    for v in vectors() {
        let decoded = ProtocolMessage::decode(&v.bytes).unwrap();
        assert_eq!(decoded, v.message, "vector {}", v.name);
    }
}

#[test]
fn test_wire_vector_lengths() {
    for v in vectors() {
        let records = v.message.envelope().members.len();
        assert_eq!(v.bytes.len(), HEADER_LEN + records * RECORD_LEN, "vector {}", v.name);
    }
}
