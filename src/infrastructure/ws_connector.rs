// WebSocket transport built on tokio-tungstenite
use crate::application::transport::{Connector, EventSink, Outbound, TransportHandle};
use crate::domain::link::{ABNORMAL_CLOSURE, CloseInfo, NO_STATUS_RECEIVED, NORMAL_CLOSURE};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// How long to wait for the device to answer our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str, events: EventSink) -> TransportHandle {
        let (handle, outbound) = TransportHandle::new(events.token());
        tokio::spawn(run_transport(
            url.to_string(),
            self.connect_timeout,
            events,
            outbound,
        ));
        handle
    }
}

async fn run_transport(
    url: String,
    connect_timeout: Duration,
    events: EventSink,
    mut outbound: UnboundedReceiver<Outbound>,
) {
    let token = events.token();

    // Connecting phase: a close request from the link aborts the handshake.
    let connecting = tokio::time::timeout(connect_timeout, connect_async(url.as_str()));
    tokio::pin!(connecting);
    let socket = loop {
        tokio::select! {
            result = &mut connecting => match result {
                Ok(Ok((socket, _response))) => break socket,
                Ok(Err(e)) => {
                    tracing::warn!("Transport {} could not connect to {}: {}", token, url, e);
                    events.closed(CloseInfo::new(ABNORMAL_CLOSURE, e.to_string())).await;
                    return;
                }
                Err(_) => {
                    tracing::warn!("Transport {} timed out connecting to {}", token, url);
                    events.closed(CloseInfo::new(ABNORMAL_CLOSURE, "connect timed out")).await;
                    return;
                }
            },
            request = outbound.recv() => match request {
                Some(Outbound::Close(info)) => {
                    events.closed(info).await;
                    return;
                }
                Some(Outbound::Text(text)) => {
                    tracing::debug!("Transport {} not open yet, dropping {}", token, text);
                }
                None => {
                    events.closed(CloseInfo::new(NORMAL_CLOSURE, "")).await;
                    return;
                }
            },
        }
    };

    if !events.opened().await {
        return;
    }
    tracing::debug!("Transport {} open to {}", token, url);

    let (mut sink, mut stream) = socket.split();
    let mut closing: Option<CloseInfo> = None;
    let close_timer = tokio::time::sleep(Duration::from_secs(24 * 60 * 60));
    tokio::pin!(close_timer);

    let info = loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if !events.frame(text.into_bytes()).await {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if !events.frame(bytes).await {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    // Our own close reason wins when we started the handshake.
                    break closing.take().unwrap_or_else(|| match frame {
                        Some(frame) => CloseInfo::new(u16::from(frame.code), frame.reason.into_owned()),
                        None => CloseInfo::new(NO_STATUS_RECEIVED, ""),
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    break closing
                        .take()
                        .unwrap_or_else(|| CloseInfo::new(ABNORMAL_CLOSURE, e.to_string()));
                }
                None => {
                    break closing
                        .take()
                        .unwrap_or_else(|| CloseInfo::new(ABNORMAL_CLOSURE, "connection dropped"));
                }
            },
            request = outbound.recv(), if closing.is_none() => match request {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!("Send on transport {} failed: {}", token, e);
                    }
                }
                Some(Outbound::Close(info)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(info.code),
                        reason: info.reason.clone().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!("Close on transport {} failed: {}", token, e);
                    }
                    closing = Some(info);
                    close_timer.as_mut().reset(Instant::now() + CLOSE_GRACE);
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    closing = Some(CloseInfo::new(NORMAL_CLOSURE, ""));
                    close_timer.as_mut().reset(Instant::now() + CLOSE_GRACE);
                }
            },
            _ = &mut close_timer, if closing.is_some() => {
                tracing::debug!("Transport {} close handshake timed out", token);
                break closing
                    .take()
                    .unwrap_or_else(|| CloseInfo::new(NORMAL_CLOSURE, ""));
            }
        }
    };

    tracing::debug!("Transport {} closed with code {}", token, info.code);
    events.closed(info).await;
}
