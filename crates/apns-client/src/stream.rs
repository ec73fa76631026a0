// Per-exchange response correlation.
use std::collections::HashMap;

use apns_transport::{ExchangeEvent, WireRequest};
use bytes::BytesMut;
use tokio::sync::mpsc;

use crate::response::Response;

pub(crate) type ResponseListener = Box<dyn FnOnce(Response) + Send + 'static>;

/// Accumulate one exchange's events into a decoded response: header blocks
/// merge last-write-wins per key (trailers overlay the initial block), body
/// chunks append, and `Closed` resolves.
///
/// Returns `None` when the session tears down before the exchange
/// completes; that is the absent outcome, not an error.
pub(crate) async fn collect_response(
    mut events: mpsc::UnboundedReceiver<ExchangeEvent>,
) -> Option<Response> {
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut body = BytesMut::new();
    while let Some(event) = events.recv().await {
        match event {
            ExchangeEvent::Headers(fields) => {
                for (name, value) in fields {
                    headers.insert(name, value);
                }
            }
            ExchangeEvent::Data(chunk) => body.extend_from_slice(&chunk),
            ExchangeEvent::Closed => return Some(Response::new(headers, body.freeze())),
        }
    }
    None
}

/// A prepared-but-not-yet-dispatched push.
///
/// Produced by `Connection::prepare`; listeners for the exchange's single
/// "response" event must be registered here, before the handle is passed to
/// `Connection::dispatch` (the handle is consumed by dispatch, so late
/// registration cannot happen). On completion every listener runs exactly
/// once, in registration order, with the decoded response.
pub struct PushHandle {
    pub(crate) request: WireRequest,
    pub(crate) listeners: Vec<ResponseListener>,
}

impl PushHandle {
    pub(crate) fn new(request: WireRequest) -> Self {
        PushHandle {
            request,
            listeners: Vec::new(),
        }
    }

    /// Register a listener for the decoded response.
    pub fn on_response(&mut self, listener: impl FnOnce(Response) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }
}
