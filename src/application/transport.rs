// Transport seam - How the device link reaches a physical connection
use crate::application::device_link::LinkEvent;
use crate::domain::link::CloseInfo;
use std::fmt;
use tokio::sync::mpsc;

/// Identity of one physical transport. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportToken(pub u64);

impl fmt::Display for TransportToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Requests from the link to a running transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close(CloseInfo),
}

/// The link's grip on one transport. Dropping it does not close the transport.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    token: TransportToken,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TransportHandle {
    pub fn new(token: TransportToken) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { token, outbound }, rx)
    }

    pub fn token(&self) -> TransportToken {
        self.token
    }

    /// Queues a text frame. Returns false once the transport task has ended.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    pub fn close(&self, info: CloseInfo) {
        let _ = self.outbound.send(Outbound::Close(info));
    }
}

/// Where a transport reports its lifecycle. Every event is stamped with the
/// transport's token so the link can discard callbacks from superseded ones.
#[derive(Debug, Clone)]
pub struct EventSink {
    token: TransportToken,
    events: mpsc::Sender<LinkEvent>,
}

impl EventSink {
    pub fn new(token: TransportToken, events: mpsc::Sender<LinkEvent>) -> Self {
        Self { token, events }
    }

    pub fn token(&self) -> TransportToken {
        self.token
    }

    pub async fn opened(&self) -> bool {
        self.events.send(LinkEvent::Opened(self.token)).await.is_ok()
    }

    pub async fn frame(&self, payload: Vec<u8>) -> bool {
        self.events
            .send(LinkEvent::FrameReceived(self.token, payload))
            .await
            .is_ok()
    }

    pub async fn closed(&self, info: CloseInfo) {
        let _ = self.events.send(LinkEvent::Closed(self.token, info)).await;
    }
}

/// Opens transports for the device link.
pub trait Connector: Send + Sync {
    /// Starts connecting to `url` in the background. The outcome arrives through
    /// `events`: `opened` at most once, then frames, then exactly one `closed`.
    fn open(&self, url: &str, events: EventSink) -> TransportHandle;
}
