// In-memory fakes for the link's seams
use crate::application::address_store::AddressStore;
use crate::application::transport::{Connector, EventSink, Outbound, TransportHandle};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

struct OpenedTransport {
    url: String,
    sink: EventSink,
    outbound: UnboundedReceiver<Outbound>,
}

/// Records every transport the link opens and lets tests speak for the device.
#[derive(Default)]
pub struct FakeConnector {
    opened: Mutex<Vec<OpenedTransport>>,
}

impl FakeConnector {
    pub fn count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn sink(&self, index: usize) -> EventSink {
        self.opened.lock().unwrap()[index].sink.clone()
    }

    pub fn url(&self, index: usize) -> String {
        self.opened.lock().unwrap()[index].url.clone()
    }

    pub fn drain_outbound(&self, index: usize) -> Vec<Outbound> {
        let mut opened = self.opened.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(message) = opened[index].outbound.try_recv() {
            out.push(message);
        }
        out
    }

    /// Text frames the link has queued on a transport since the last drain.
    pub fn drain_texts(&self, index: usize) -> Vec<String> {
        self.drain_outbound(index)
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Text(text) => Some(text),
                Outbound::Close(_) => None,
            })
            .collect()
    }
}

impl Connector for FakeConnector {
    fn open(&self, url: &str, events: EventSink) -> TransportHandle {
        let (handle, outbound) = TransportHandle::new(events.token());
        self.opened.lock().unwrap().push(OpenedTransport {
            url: url.to_string(),
            sink: events,
            outbound,
        });
        handle
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub address: Mutex<Option<String>>,
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn load(&self) -> anyhow::Result<Option<String>> {
        Ok(self.address.lock().unwrap().clone())
    }

    async fn save(&self, address: &str) -> anyhow::Result<()> {
        *self.address.lock().unwrap() = Some(address.to_string());
        Ok(())
    }
}
