use crate::protocol::error::{WorkhorseError, WorkhorseResult};

/// Strip the routing envelope from a request body.
///
/// Returns (reply address, remaining payload). The address must be
/// followed by an empty delimiter frame; anything else means the broker
/// sent a malformed envelope.
pub(crate) fn unwrap_envelope(mut frames: Vec<Vec<u8>>) -> WorkhorseResult<(Vec<u8>, Vec<Vec<u8>>)> {
    if frames.len() < 2 {
        return Err(WorkhorseError::ProtocolError("Missing routing envelope"));
    }
    let address = frames.remove(0);
    let delimiter = frames.remove(0);
    if !delimiter.is_empty() {
        return Err(WorkhorseError::ProtocolError(
            "Missing empty delimiter after reply address",
        ));
    }
    Ok((address, frames))
}

/// Wrap a message body with a routing envelope
///
/// Prepends the routing address plus delimiter to the body.
pub(crate) fn wrap_envelope(address: Vec<u8>, mut body: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut frames = Vec::with_capacity(2 + body.len());
    frames.push(address);
    frames.push(Vec::new());
    frames.append(&mut body);
    frames
}
