//! WebSocket read pump: forwards server messages to the session.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connection::Inbound;

/// Reads messages from the WebSocket until it closes.
///
/// Text and binary messages become [`Inbound::Message`]; pings are answered
/// by tungstenite itself. Always ends with [`Inbound::Closed`].
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        trace!(%text, "received message");
                        let _ = inbound.send(Inbound::Message(text.as_str().to_owned()));
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        debug!(len = data.len(), "received binary message");
                        let text = String::from_utf8_lossy(&data).into_owned();
                        let _ = inbound.send(Inbound::Message(text));
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(?frame, "received close frame");
                    }
                    Some(Ok(_)) => {} // Ping/Pong/raw frames
                    Some(Err(
                        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                    )) => break,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        let _ = inbound.send(Inbound::Error(e.to_string()));
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    let _ = inbound.send(Inbound::Closed);
    cancel.cancel();
}
