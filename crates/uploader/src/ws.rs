//! WebSocket transport.

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::UploadConfig;
use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::pumps::{read::read_pump, write::write_pump};

/// Opens a WebSocket to `url` and starts its read and write pumps.
pub async fn connect(url: &Url, config: &UploadConfig) -> Result<Connection, ConnectionError> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);
    ws_config.max_frame_size = Some(config.max_message_size);

    let (ws_stream, response) = tokio::time::timeout(
        config.connect_timeout,
        tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false),
    )
    .await
    .map_err(|_| ConnectionError::Timeout)??;
    debug!(%url, status = %response.status(), "WebSocket handshake complete");

    let (write, read) = ws_stream.split();
    let (mut connection, peer) = Connection::pair(true);
    let cancel = CancellationToken::new();

    let write_handle = tokio::spawn(write_pump(
        write,
        peer.outbound,
        peer.buffered,
        peer.inbound.clone(),
        cancel.clone(),
    ));
    let read_handle = tokio::spawn(read_pump(read, peer.inbound, cancel));

    connection.attach(write_handle);
    connection.attach(read_handle);
    Ok(connection)
}
