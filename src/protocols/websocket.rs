use std::time::Duration;

use color_eyre::Result;
use eyre::eyre;
use futures::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::hyperion::frame::ledstream_start_message;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type HyperionWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens the Hyperion JSON-RPC websocket and subscribes to the LED stream.
pub async fn mk_websocket_stream(url: &str) -> Result<HyperionWebSocket> {
    let (mut ws, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| eyre!("Timed out connecting to {}", url))?
        .map_err(|e| eyre!("Failed to connect to {}: {}", url, e))?;

    ws.send(Message::Text(ledstream_start_message()?)).await?;

    Ok(ws)
}
