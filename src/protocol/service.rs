//! Request dispatch for one node.

use crate::control::consensus::{LayoutConsensus, LayoutView};
use crate::control::detector::{NodeProber, ProbeReply};
use crate::control::epoch::EpochFence;
use crate::core::error::{TesseraError, TesseraResult};
use crate::log::unit::LogUnit;
use crate::protocol::codec;
use crate::protocol::messages::{
    BackpointerResponse, ReadResponse, Request, RequestEnvelope, Response, ResponseEnvelope,
};
use crate::sequencer::server::{SequencerClient, SequencerRouter};
use std::sync::Arc;

/// Serves sequencer, log-unit and layout requests for one node.
pub struct SequencerService {
    fence: Arc<EpochFence>,
    sequencer: Arc<SequencerRouter>,
    log: Arc<dyn LogUnit>,
    consensus: Arc<dyn LayoutConsensus>,
    view: Arc<dyn LayoutView>,
}

impl SequencerService {
    pub fn new(
        fence: Arc<EpochFence>,
        sequencer: Arc<SequencerRouter>,
        log: Arc<dyn LogUnit>,
        consensus: Arc<dyn LayoutConsensus>,
        view: Arc<dyn LayoutView>,
    ) -> Self {
        Self {
            fence,
            sequencer,
            log,
            consensus,
            view,
        }
    }

    /// Handle one request. Failures become [`Response::Error`].
    pub fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let kind = envelope.request.kind();
        let response = self.dispatch(envelope).unwrap_or_else(|err| {
            tracing::debug!(request = kind, error = %err, "request failed");
            Response::Error(err)
        });
        ResponseEnvelope {
            epoch: self.fence.current(),
            response,
        }
    }

    /// Decode a frame, handle it, and encode the reply.
    pub fn handle_frame(&self, frame: &[u8]) -> TesseraResult<bytes::Bytes> {
        let envelope = codec::decode_request(frame)?;
        codec::encode_response(&self.handle(envelope))
    }

    fn dispatch(&self, envelope: RequestEnvelope) -> TesseraResult<Response> {
        if envelope.request.is_epoch_bound() {
            self.fence.validate(envelope.epoch)?;
        }

        match envelope.request {
            Request::Token(request) => self.sequencer.request_token(&request).map(Response::Token),
            Request::StreamTail { stream } => {
                self.sequencer.query_stream_tail(&stream).map(Response::Tail)
            }
            Request::GlobalTail => self.sequencer.current().query_global_tail().map(Response::Tail),
            Request::Backpointers(request) => {
                let walk =
                    self.sequencer
                        .walk_backpointers(&request.stream, request.start, request.end)?;
                Ok(Response::Backpointers(BackpointerResponse {
                    backpointers: walk.addresses,
                    complete: walk.complete,
                }))
            }
            Request::Read(request) => {
                request.validate()?;
                let entries = self.log.read_range(request.range, request.step)?;
                Ok(Response::Read(ReadResponse {
                    entries: entries.into_values().collect(),
                }))
            }
            Request::Write(entry) => self.log.write(entry).map(|_| Response::Ack),
            Request::FillHole { address } => self
                .log
                .fill_hole(address, envelope.epoch)
                .map(|_| Response::Ack),
            Request::Seal { epoch } => self.log.seal(epoch).map(|_| Response::Ack),
            Request::Poll => Ok(Response::Poll(self.probe_reply())),
            Request::FetchLayout => self.view.layout().map(Response::Layout),
            Request::ProposeLayout(layout) => {
                layout.validate()?;
                let accepted = self.consensus.propose(&layout)?;
                Ok(Response::Proposed { accepted })
            }
        }
    }

    /// This node's answer to a liveness probe.
    pub fn probe_reply(&self) -> ProbeReply {
        let sequencer = self.sequencer.current();
        let epoch = self.fence.current();
        ProbeReply {
            epoch,
            global_tail: self.log.tails().global_tail,
            sequencer_ready: sequencer.epoch() == epoch,
        }
    }
}

/// Prober that answers for one node through its in-process service.
///
/// Probes go through the full encode/dispatch/decode path. Other nodes
/// are reported unreachable.
pub struct LoopbackProber {
    node_id: String,
    service: Arc<SequencerService>,
}

impl LoopbackProber {
    pub fn new(node_id: impl Into<String>, service: Arc<SequencerService>) -> Self {
        Self {
            node_id: node_id.into(),
            service,
        }
    }
}

impl NodeProber for LoopbackProber {
    fn probe(&self, node: &str) -> TesseraResult<ProbeReply> {
        if node != self.node_id {
            return Err(TesseraError::NodeUnreachable {
                node: node.to_string(),
            });
        }
        let frame = codec::encode_request(&RequestEnvelope::new(0, Request::Poll))?;
        let reply = codec::decode_response(&self.service.handle_frame(&frame)?)?;
        match reply.response.into_result()? {
            Response::Poll(probe) => Ok(probe),
            other => Err(TesseraError::malformed(format!(
                "expected poll reply, got {other:?}"
            ))),
        }
    }
}
