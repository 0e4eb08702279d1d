//! Replica-side request dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::{Request, RequestType, Response, ResponseType};
use crate::ring::PlacementRing;
use crate::server::Store;

/// Everything a handler may touch on its replica.
pub(crate) struct ReplicaContext {
    pub(crate) tag: String,
    pub(crate) store: Store,
    pub(crate) ring: Arc<PlacementRing>,
}

/// Handles one decoded request type.
pub(crate) trait RequestHandler: Send + Sync {
    fn handle(&self, ctx: &ReplicaContext, request: &Request) -> Response;
}

struct PingHandler;

impl RequestHandler for PingHandler {
    fn handle(&self, _ctx: &ReplicaContext, _request: &Request) -> Response {
        Response::new(ResponseType::Ping)
    }
}

// The connection task ends the accept loop once this reply is flushed.
struct StopHandler;

impl RequestHandler for StopHandler {
    fn handle(&self, ctx: &ReplicaContext, _request: &Request) -> Response {
        pf_info!(ctx.tag; "stop requested");
        Response::new(ResponseType::Stopped)
    }
}

struct ReadHandler;

impl RequestHandler for ReadHandler {
    fn handle(&self, ctx: &ReplicaContext, request: &Request) -> Response {
        let Request::Read { key } = request else {
            return Response::new(ResponseType::CouldNotProcessCommand);
        };
        match ctx.store.read(key) {
            Some(value) => Response::with_body(ResponseType::Success, &value),
            None => Response::new(ResponseType::KeyNotFound),
        }
    }
}

struct WriteHandler;

impl RequestHandler for WriteHandler {
    fn handle(&self, ctx: &ReplicaContext, request: &Request) -> Response {
        let Request::Write { key, value } = request else {
            return Response::new(ResponseType::CouldNotProcessCommand);
        };
        ctx.store.write(key.clone(), value.clone());
        Response::new(ResponseType::Success)
    }
}

struct GetStateHandler;

impl RequestHandler for GetStateHandler {
    fn handle(&self, ctx: &ReplicaContext, _request: &Request) -> Response {
        Response::with_body(ResponseType::Success, &ctx.ring.to_state_bytes())
    }
}

/// Request tag → handler, built once per replica.
pub(crate) struct DispatchTable {
    handlers: HashMap<RequestType, Box<dyn RequestHandler>>,
}

impl DispatchTable {
    pub(crate) fn new() -> Self {
        let mut handlers: HashMap<RequestType, Box<dyn RequestHandler>> =
            HashMap::new();
        handlers.insert(RequestType::Ping, Box::new(PingHandler));
        handlers.insert(RequestType::Stop, Box::new(StopHandler));
        handlers.insert(RequestType::Read, Box::new(ReadHandler));
        handlers.insert(RequestType::Write, Box::new(WriteHandler));
        handlers.insert(RequestType::GetState, Box::new(GetStateHandler));
        DispatchTable { handlers }
    }

    /// Produces the reply to one raw request payload.
    pub(crate) fn dispatch(
        &self,
        ctx: &ReplicaContext,
        payload: &[u8],
    ) -> Response {
        if payload.is_empty() {
            return Response::new(ResponseType::NoBytesReceived);
        }
        let request = match Request::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                pf_debug!(ctx.tag; "undecodable request: {}", e);
                return Response::new(ResponseType::CouldNotProcessCommand);
            }
        };
        match self.handlers.get(&request.request_type()) {
            Some(handler) => handler.handle(ctx, &request),
            None => {
                pf_debug!(ctx.tag; "no handler for {:?}", request.request_type());
                Response::new(ResponseType::CouldNotProcessCommand)
            }
        }
    }
}
