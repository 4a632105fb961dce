//! WebSocket write pump: serialises outbound frames and tracks backlog.

use std::sync::atomic::Ordering;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::connection::{BufferedGauge, Frame, Inbound, Outbound};

fn to_message(frame: Frame) -> tungstenite::Message {
    match frame {
        Frame::Text(text) => tungstenite::Message::Text(text.into()),
        Frame::Binary(data) => tungstenite::Message::Binary(data.into()),
    }
}

fn release(buffered: &BufferedGauge, len: usize) {
    let _ = buffered.fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| {
        Some(b.saturating_sub(len))
    });
}

/// Writes queued frames to the WebSocket.
///
/// A frame's bytes stay counted in `buffered` until the sink has accepted
/// and flushed it. Every close request is passed on; after the first, the
/// sink's complaints about an already-closing socket are ignored.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    buffered: BufferedGauge,
    inbound: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut closing = false;
    let mut failed = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = outbound.recv() => {
                match next {
                    Some(Outbound::Frame(frame)) => {
                        let len = frame.len();
                        if closing {
                            debug!(len, "dropping frame queued after close");
                            release(&buffered, len);
                            continue;
                        }
                        let result = write.send(to_message(frame)).await;
                        release(&buffered, len);
                        if let Err(e) = result {
                            error!("WebSocket write error: {e}");
                            let _ = inbound.send(Inbound::Error(format!("write failed: {e}")));
                            failed = true;
                            break;
                        }
                    }
                    Some(Outbound::Close) => {
                        let first = !closing;
                        closing = true;
                        match write.send(tungstenite::Message::Close(None)).await {
                            Ok(()) => debug!(first, "close frame sent"),
                            Err(e) if first => debug!("close frame not sent: {e}"),
                            Err(e) => trace!("repeated close request: {e}"),
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if !closing && !failed {
        let _ = write.send(tungstenite::Message::Close(None)).await;
    }
    cancel.cancel();
}
