//! Steps shared by the blocking and async correlators.

use std::time::Duration;

use afelink_frame::Extracted;
use tracing::{error, trace};

use crate::envelope::{Envelope, Params};
use crate::error::{Result, RpcError};
use crate::response::{Reply, Response};

/// Pick the request id: an explicit id is used as-is, otherwise the counter
/// is read and post-incremented.
pub(crate) fn resolve_id(counter: &mut u64, explicit_id: Option<u64>) -> u64 {
    match explicit_id {
        Some(id) => id,
        None => {
            let id = *counter;
            *counter = counter.wrapping_add(1);
            id
        }
    }
}

/// Serialize the request envelope for the wire.
pub(crate) fn encode_request(
    method: &str,
    id: u64,
    params: Params,
    canonicalize: bool,
) -> Result<Vec<u8>> {
    let mut envelope = Envelope::new(method, id, params);
    if canonicalize {
        envelope.canonicalize();
    }
    let wire = envelope.to_wire().inspect_err(|err| {
        error!(method, id, %err, "failed to encode request");
    })?;
    trace!(request = %String::from_utf8_lossy(&wire), "sending request");
    Ok(wire)
}

/// Turn the accumulator's outcome into a validated response.
pub(crate) fn finish_request(
    method: &str,
    id: u64,
    outcome: Extracted,
    timeout: Duration,
) -> Result<Response> {
    let frame = match outcome {
        Extracted::Frame(frame) => frame,
        other => {
            error!(method, id, outcome = ?other, "no valid JSON frame received");
            return Err(RpcError::NoResponse { timeout });
        }
    };
    trace!(response = %frame, "received response");

    Reply::from_frame(frame)
        .and_then(|reply| reply.validate(id))
        .inspect_err(|err| error!(method, id, %err, "request failed"))
}
