//! Native WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{future, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Connector, FrameSink, FrameStream};
use crate::error::TransportError;

/// Opens real WebSocket connections; text frames only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (ws_stream, _response) = connect_async(url).await?;
        crate::log_debug!("WebSocket handshake with {} complete", url);

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(TransportError::from_socket)
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text))));

        let stream = read
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Ping(data)) => {
                        // Pong is handled automatically by tungstenite
                        crate::log_debug!("Received ping: {:?}", data);
                        None
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from_socket(e))),
                })
            });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
