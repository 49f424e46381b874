//! Property-based tests for the wire codec.
//!
//! - Every valid metadata record survives a request round trip
//! - Decoders never panic or over-read on arbitrary input
//! - Capability replies are only accepted when the declared length agrees

use proptest::prelude::*;
use xhdr_proto::wire::{REPLY_HEADER_SIZE, UNIT};
use xhdr_proto::{
    decode_reply, decode_request, encode_reply, encode_request, CapabilityRecord, HdrMetadata,
    ProtocolError, Reply, ReplyKind, Request,
};

fn metadata_strategy() -> impl Strategy<Value = HdrMetadata> {
    (any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>(), any::<u32>()).prop_map(
        |(primaries, eotf, max_cll, min_lum, max_lum)| HdrMetadata {
            primaries,
            eotf,
            max_cll,
            min_lum,
            max_lum,
        },
    )
}

fn record_strategy() -> impl Strategy<Value = CapabilityRecord> {
    (any::<bool>(), any::<u8>(), prop::collection::vec(any::<u32>(), 0..16)).prop_map(
        |(supported, max_depth, eotfs)| CapabilityRecord {
            supported,
            max_depth,
            eotfs,
        },
    )
}

#[test]
fn prop_set_request_roundtrip() {
    proptest!(|(window in any::<u32>(), metadata in metadata_strategy())| {
        let request = Request::SetHdrMetadata { window, metadata };
        let decoded = decode_request(&encode_request(&request)).unwrap();
        prop_assert_eq!(decoded, request);
    });
}

#[test]
fn prop_decode_request_arbitrary_bytes() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..64))| {
        // must return, never panic
        let _ = decode_request(&bytes);
    });
}

#[test]
fn prop_decode_reply_arbitrary_bytes() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..128))| {
        let _ = decode_reply(&bytes, ReplyKind::Ack);
        let _ = decode_reply(&bytes, ReplyKind::Capabilities);
    });
}

#[test]
fn prop_truncated_request_rejected() {
    proptest!(|(metadata in metadata_strategy(), cut in 0usize..28)| {
        let bytes = encode_request(&Request::SetHdrMetadata { window: 1, metadata });
        let result = decode_request(&bytes[..cut]);
        prop_assert!(
            matches!(result, Err(ProtocolError::MalformedRequest { .. })),
            "cut at {} gave {:?}",
            cut,
            result
        );
    });
}

#[test]
fn prop_capability_length_consistency() {
    proptest!(|(record in record_strategy(), extra in 1usize..4, drop in any::<bool>())| {
        let mut bytes = encode_reply(&Reply::Capabilities(record.clone())).unwrap();
        let declared = bytes.len();

        if drop && !record.eotfs.is_empty() {
            bytes.truncate(declared - UNIT);
        } else {
            bytes.extend(std::iter::repeat(0u8).take(extra * UNIT));
        }

        let result = decode_reply(&bytes, ReplyKind::Capabilities);
        prop_assert_eq!(
            result,
            Err(ProtocolError::LengthMismatch { declared, actual: bytes.len() })
        );
    });
}

#[test]
fn prop_capability_count_follows_header() {
    proptest!(|(record in record_strategy())| {
        let bytes = encode_reply(&Reply::Capabilities(record.clone())).unwrap();
        prop_assert_eq!(bytes.len(), REPLY_HEADER_SIZE + record.eotfs.len() * UNIT);

        match decode_reply(&bytes, ReplyKind::Capabilities).unwrap() {
            Reply::Capabilities(decoded) => {
                prop_assert_eq!(decoded.eotfs.len(), record.eotfs.len());
                prop_assert_eq!(decoded, record);
            }
            other => prop_assert!(false, "wrong reply: {:?}", other),
        }
    });
}
