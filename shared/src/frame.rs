//! Wire frames exchanged between the device and the desktop host

use bytes::Bytes;
use prost::Message;

/// Kind of a wire frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FrameKind {
    /// First frame on every connection, carries the JSON setup payload
    Setup = 0,
    /// One-way message, no reply expected
    FireAndForget = 1,
    /// Request expecting exactly one Response or Error with the same stream id
    Request = 2,
    /// Successful reply to a Request
    Response = 3,
    /// Failed reply to a Request, data holds the error payload
    Error = 4,
    /// Liveness ping
    Keepalive = 5,
}

/// A single frame on the wire
#[derive(Clone, PartialEq, Message)]
pub struct Frame {
    #[prost(enumeration = "FrameKind", tag = "1")]
    pub kind: i32,

    #[prost(uint32, tag = "2")]
    pub stream_id: u32,

    #[prost(bytes = "bytes", tag = "3")]
    pub data: Bytes,
}

impl Frame {
    pub fn new(kind: FrameKind, stream_id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            stream_id,
            data: data.into(),
        }
    }

    pub fn setup(data: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Setup, 0, data)
    }

    pub fn fire_and_forget(data: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::FireAndForget, 0, data)
    }

    pub fn request(stream_id: u32, data: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Request, stream_id, data)
    }

    pub fn response(stream_id: u32, data: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Response, stream_id, data)
    }

    pub fn error(stream_id: u32, message: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Error, stream_id, message)
    }

    pub fn keepalive() -> Self {
        Self::new(FrameKind::Keepalive, 0, Bytes::new())
    }

    /// Decoded frame kind, `None` for kinds this build does not know
    pub fn frame_kind(&self) -> Option<FrameKind> {
        FrameKind::try_from(self.kind).ok()
    }
}
