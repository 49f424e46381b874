//! Arbitrary client input never takes the dispatcher down.

mod common;

use common::{Harness, OWNER};
use proptest::prelude::*;
use xhdr_proto::{decode_reply, encode_request, Opcode, Reply, ReplyKind, Request};

fn expected_kind(raw: &[u8]) -> ReplyKind {
    match raw.first().copied().and_then(Opcode::from_u8) {
        Some(Opcode::QueryHdrCapabilities) => ReplyKind::Capabilities,
        _ => ReplyKind::Ack,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn prop_arbitrary_bytes_get_a_decodable_reply() {
    let rt = runtime();
    let h = Harness::standard();

    proptest!(|(raw in prop::collection::vec(any::<u8>(), 0..64))| {
        let reply = rt.block_on(h.dispatcher.dispatch(&raw, &OWNER));
        prop_assert!(decode_reply(&reply, expected_kind(&raw)).is_ok());
    });
}

#[test]
fn prop_reserved_eotf_accepted_only_when_repaired() {
    let rt = runtime();
    let h = Harness::standard();

    proptest!(|(eotf in 2u32.., max_cll in any::<u32>(), flip in 0usize..28, bit in 0u8..8)| {
        let metadata = xhdr_proto::HdrMetadata {
            primaries: 0,
            eotf,
            max_cll,
            min_lum: 0,
            max_lum: 1000,
        };
        // reserved eotf, with one more bit flipped somewhere in the request
        let mut raw = encode_request(&Request::SetHdrMetadata { window: 42, metadata });
        raw[flip] ^= 1 << bit;

        let reply = rt.block_on(h.dispatcher.dispatch(&raw, &OWNER));
        let decoded = decode_reply(&reply, expected_kind(&raw));
        prop_assert!(decoded.is_ok());
        if let Ok(Reply::Ack) = decoded {
            // only a flip that repaired the eotf field can be accepted
            prop_assert!((12..16).contains(&flip));
        }
    });
}
