//! Request and response shapes exchanged between nodes.
//!
//! Every message kind is a variant of [`Request`] or [`Response`], so a
//! new kind is a compile-checked change to every dispatcher.

use crate::control::detector::ProbeReply;
use crate::control::layout::Layout;
use crate::core::error::{TesseraError, TesseraResult};
use crate::log::address::{Address, AddressRange};
use crate::log::entry::LogEntry;
use crate::log::stream::StreamId;
use crate::sequencer::token::{TokenRequest, TokenResponse};
use serde::{Deserialize, Serialize};

/// Backpointer query: addresses of `stream` within `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpointerRequest {
    pub stream: StreamId,
    pub start: Address,
    pub end: Address,
}

/// Backpointer reply, newest address first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpointerResponse {
    pub backpointers: Vec<Address>,
    /// False when the chain was cut above `start` by a trim or checkpoint.
    pub complete: bool,
}

/// Range read: every `step`-th address of `range`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub range: AddressRange,
    pub step: u32,
}

impl ReadRequest {
    /// Read every `step`-th address of `range`. A zero step is invalid.
    pub fn new(range: AddressRange, step: u32) -> TesseraResult<Self> {
        let request = Self { range, step };
        request.validate()?;
        Ok(request)
    }

    /// Read a single address.
    pub fn single(address: Address) -> TesseraResult<Self> {
        Self::new(AddressRange::singleton(address)?, 1)
    }

    /// Re-check a request that arrived over the wire.
    pub fn validate(&self) -> TesseraResult<()> {
        if self.step == 0 {
            return Err(TesseraError::invalid("read step must be at least 1"));
        }
        if self.range.start > self.range.end {
            return Err(TesseraError::invalid(format!(
                "read range {} is inverted",
                self.range
            )));
        }
        Ok(())
    }
}

/// Entries found by a range read, in address order. Unwritten addresses are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub entries: Vec<LogEntry>,
}

/// Every request a node serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Token(TokenRequest),
    StreamTail { stream: StreamId },
    GlobalTail,
    Backpointers(BackpointerRequest),
    Read(ReadRequest),
    Write(LogEntry),
    FillHole { address: Address },
    Seal { epoch: u64 },
    Poll,
    FetchLayout,
    ProposeLayout(Layout),
}

impl Request {
    /// Check whether the request is only valid within the sender's epoch.
    pub fn is_epoch_bound(&self) -> bool {
        match self {
            Request::Token(_)
            | Request::StreamTail { .. }
            | Request::GlobalTail
            | Request::Backpointers(_)
            | Request::Read(_)
            | Request::Write(_)
            | Request::FillHole { .. } => true,
            Request::Seal { .. }
            | Request::Poll
            | Request::FetchLayout
            | Request::ProposeLayout(_) => false,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Token(_) => "token",
            Request::StreamTail { .. } => "stream_tail",
            Request::GlobalTail => "global_tail",
            Request::Backpointers(_) => "backpointers",
            Request::Read(_) => "read",
            Request::Write(_) => "write",
            Request::FillHole { .. } => "fill_hole",
            Request::Seal { .. } => "seal",
            Request::Poll => "poll",
            Request::FetchLayout => "fetch_layout",
            Request::ProposeLayout(_) => "propose_layout",
        }
    }
}

/// Every reply a node sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Token(TokenResponse),
    Tail(Address),
    Backpointers(BackpointerResponse),
    Read(ReadResponse),
    Ack,
    Poll(ProbeReply),
    Layout(Layout),
    Proposed { accepted: bool },
    Error(TesseraError),
}

impl Response {
    /// Turn an error reply back into an error.
    pub fn into_result(self) -> TesseraResult<Response> {
        match self {
            Response::Error(err) => Err(err),
            other => Ok(other),
        }
    }
}

/// A request stamped with the sender's layout epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub epoch: u64,
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(epoch: u64, request: Request) -> Self {
        Self { epoch, request }
    }
}

/// A response stamped with the responder's layout epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub epoch: u64,
    pub response: Response,
}
