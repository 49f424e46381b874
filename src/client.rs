//! Client stubs for the XHDR extension
//!
//! Synchronous call-and-result wrappers: each call encodes one request,
//! sends it, waits for the matching reply and decodes it.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use xhdr_proto::wire::{ReplyHeader, REPLY_HEADER_SIZE};
use xhdr_proto::{
    decode_reply, encode_request, CapabilityRecord, ErrorReply, HdrMetadata, ProtocolError, Reply,
    ReplyKind, Request,
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered with an error reply
    #[error("server error: {0}")]
    Server(ErrorReply),
}

/// Carries one encoded request to the server and returns its reply bytes
pub trait Transport {
    fn round_trip(&mut self, request: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Blocking Unix-socket transport
pub struct UnixTransport {
    stream: UnixStream,
}

impl UnixTransport {
    /// Default bound on waiting for a reply
    pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn connect(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path.as_ref())?;
        stream.set_read_timeout(Some(Self::REPLY_TIMEOUT))?;
        debug!("Connected to XHDR server at {:?}", path.as_ref());
        Ok(Self { stream })
    }

    pub fn set_reply_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }
}

impl Transport for UnixTransport {
    fn round_trip(&mut self, request: &[u8]) -> std::io::Result<Vec<u8>> {
        self.stream.write_all(request)?;
        self.stream.flush()?;

        let mut header = [0u8; REPLY_HEADER_SIZE];
        self.stream.read_exact(&mut header)?;

        let mut reply = header.to_vec();
        // a declared length shorter than the header is left for the decoder to reject
        let declared = ReplyHeader::decode(&header)
            .map(|h| h.byte_len())
            .unwrap_or(REPLY_HEADER_SIZE);
        if declared > REPLY_HEADER_SIZE {
            reply.resize(declared, 0);
            self.stream.read_exact(&mut reply[REPLY_HEADER_SIZE..])?;
        }
        Ok(reply)
    }
}

/// XHDR client
pub struct XhdrClient<T> {
    transport: T,
}

impl XhdrClient<UnixTransport> {
    /// Connect to the server at the default socket path
    pub fn connect() -> Result<Self, ClientError> {
        let transport = UnixTransport::connect(xhdr_proto::socket_path())?;
        Ok(Self::new(transport))
    }
}

impl<T: Transport> XhdrClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn call(&mut self, request: &Request) -> Result<Reply, ClientError> {
        let bytes = encode_request(request);
        let reply = self.transport.round_trip(&bytes)?;
        match decode_reply(&reply, request.reply_kind())? {
            Reply::Error(e) => Err(ClientError::Server(e)),
            reply => Ok(reply),
        }
    }

    /// Attach HDR metadata to a window, replacing any previous value
    pub fn set_hdr_metadata(&mut self, window: u32, metadata: HdrMetadata) -> Result<(), ClientError> {
        match self.call(&Request::SetHdrMetadata { window, metadata })? {
            Reply::Ack => Ok(()),
            _ => Err(ProtocolError::UnexpectedReply {
                expected: ReplyKind::Ack,
            }
            .into()),
        }
    }

    /// Ask whether a screen can present HDR content
    pub fn query_hdr_capabilities(&mut self, screen: u32) -> Result<CapabilityRecord, ClientError> {
        match self.call(&Request::QueryHdrCapabilities { screen })? {
            Reply::Capabilities(record) => Ok(record),
            _ => Err(ProtocolError::UnexpectedReply {
                expected: ReplyKind::Capabilities,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xhdr_proto::{encode_reply, ErrorCode, Eotf, Opcode};

    /// Replays canned replies and records what was sent
    struct Canned {
        replies: Vec<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl Canned {
        fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies,
                sent: Vec::new(),
            }
        }
    }

    impl Transport for Canned {
        fn round_trip(&mut self, request: &[u8]) -> std::io::Result<Vec<u8>> {
            self.sent.push(request.to_vec());
            Ok(self.replies.remove(0))
        }
    }

    #[test]
    fn test_set_sends_request_and_accepts_ack() {
        let ack = encode_reply(&Reply::Ack).unwrap();
        let mut client = XhdrClient::new(Canned::new(vec![ack]));
        let metadata = HdrMetadata::new(0x1234, Eotf::Pq, 1000, 5, 1000);

        client.set_hdr_metadata(42, metadata).unwrap();

        let sent = &client.into_inner().sent[0];
        assert_eq!(
            xhdr_proto::decode_request(sent).unwrap(),
            Request::SetHdrMetadata {
                window: 42,
                metadata
            }
        );
    }

    #[test]
    fn test_query_returns_declared_eotfs() {
        let record = CapabilityRecord {
            supported: true,
            max_depth: 10,
            eotfs: vec![0, 1],
        };
        let reply = encode_reply(&Reply::Capabilities(record.clone())).unwrap();
        let mut client = XhdrClient::new(Canned::new(vec![reply]));

        assert_eq!(client.query_hdr_capabilities(0).unwrap(), record);
    }

    #[test]
    fn test_server_error_surfaces() {
        let error = ErrorReply {
            code: ErrorCode::Window,
            opcode: Opcode::SetHdrMetadata as u8,
            bad_value: 42,
        };
        let reply = encode_reply(&Reply::Error(error)).unwrap();
        let mut client = XhdrClient::new(Canned::new(vec![reply]));

        let result = client.set_hdr_metadata(42, HdrMetadata::default());
        assert!(matches!(result, Err(ClientError::Server(e)) if e == error));
    }

    #[test]
    fn test_inconsistent_reply_rejected() {
        let record = CapabilityRecord {
            supported: true,
            max_depth: 10,
            eotfs: vec![0, 1],
        };
        let mut reply = encode_reply(&Reply::Capabilities(record)).unwrap();
        // header says two EOTFs, three arrive
        reply.extend_from_slice(&7u32.to_be_bytes());
        let mut client = XhdrClient::new(Canned::new(vec![reply]));

        let result = client.query_hdr_capabilities(0);
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_wrong_reply_variant() {
        let reply = encode_reply(&Reply::Capabilities(CapabilityRecord::unsupported())).unwrap();
        let mut client = XhdrClient::new(Canned::new(vec![reply]));

        let result = client.set_hdr_metadata(1, HdrMetadata::default());
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::UnexpectedReply { .. }))
        ));
    }
}
