//! Bounded body buffering
//!
//! A form token can only be found by reading the body, but the handler
//! behind the layer still needs the whole body. [`peek_body`] reads at most
//! `limit + 1` bytes, then hands back a body that replays what was read
//! followed by whatever is left of the original stream.

use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use http_body::{Body, Frame};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, BodyStream, StreamBody};

/// Boxed error type of [`BoxBody`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type handed to the wrapped service and returned to the caller.
pub type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Box any `Bytes` body.
pub fn boxed<B>(body: B) -> BoxBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A body whose beginning has been read.
pub struct Peeked {
    /// At most `limit` bytes from the start of the body, empty if reading
    /// failed
    pub prefix: Bytes,
    /// Whether `prefix` is the entire body
    pub complete: bool,
    /// The full body, including the bytes already read
    pub body: BoxBody,
}

/// Read up to `limit` bytes from the front of `body`.
pub async fn peek_body(mut body: BoxBody, limit: usize) -> Peeked {
    let mut prefix = BytesMut::new();
    let mut frames: Vec<Result<Frame<Bytes>, BoxError>> = Vec::new();
    let mut complete = true;
    let mut exhausted = false;

    loop {
        if prefix.len() > limit {
            complete = false;
            break;
        }

        match body.frame().await {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    append_bounded(&mut prefix, data, limit);
                }
                frames.push(Ok(frame));
            }
            Some(Err(error)) => {
                tracing::debug!(%error, "request body failed while looking for CSRF token");
                frames.push(Err(error));
                prefix.clear();
                complete = false;
                exhausted = true;
                break;
            }
            None => {
                exhausted = true;
                break;
            }
        }
    }

    prefix.truncate(limit);
    let replay = stream::iter(frames);
    let body = if exhausted {
        StreamBody::new(replay).boxed_unsync()
    } else {
        StreamBody::new(replay.chain(BodyStream::new(body))).boxed_unsync()
    };

    Peeked {
        prefix: prefix.freeze(),
        complete,
        body,
    }
}

// Copy no more than one byte past `limit`, enough to tell the body was cut.
fn append_bounded(prefix: &mut BytesMut, data: &[u8], limit: usize) {
    let room = limit.saturating_add(1).saturating_sub(prefix.len());
    prefix.extend_from_slice(&data[..data.len().min(room)]);
}
