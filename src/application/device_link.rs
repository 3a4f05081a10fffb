// Device link - Connection state machine, heartbeat and auto-reconnect
use crate::application::address_store::AddressStore;
use crate::application::telemetry_merger::merge;
use crate::application::transport::{Connector, EventSink, TransportHandle, TransportToken};
use crate::domain::command::Command;
use crate::domain::console::ConsoleLog;
use crate::domain::link::{
    ABNORMAL_CLOSURE, CloseInfo, DeviceAddress, LinkError, LinkState, LinkStatus, NORMAL_CLOSURE,
};
use crate::domain::telemetry::TelemetrySnapshot;
use crate::infrastructure::frame_codec::{decode, encode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const EVENT_QUEUE_DEPTH: usize = 256;
const UPDATE_FANOUT_DEPTH: usize = 256;

/// Everything the link reacts to, delivered through one ordered queue.
#[derive(Debug)]
pub enum LinkEvent {
    ConnectRequested(DeviceAddress),
    DisconnectRequested,
    ReconnectRequested,
    AutoConnectRequested,
    SendRequested(Command),
    Opened(TransportToken),
    FrameReceived(TransportToken, Vec<u8>),
    Closed(TransportToken, CloseInfo),
    HeartbeatDue(TransportToken),
    ReconnectDue(u64),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub port: u16,
    pub reconnect_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: 81,
            reconnect_delay: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Operator,
    AutoReconnect,
}

struct ActiveTransport {
    handle: TransportHandle,
    address: DeviceAddress,
    opened: bool,
}

struct PendingReconnect {
    epoch: u64,
    task: JoinHandle<()>,
}

/// Cloneable front door to the link actor.
#[derive(Clone)]
pub struct LinkHandle {
    events: mpsc::Sender<LinkEvent>,
    status: watch::Receiver<LinkStatus>,
    snapshot: watch::Receiver<TelemetrySnapshot>,
    updates: broadcast::Sender<TelemetrySnapshot>,
    console: ConsoleLog,
}

impl LinkHandle {
    /// Validates the address before anything is queued; an invalid one never
    /// reaches the state machine.
    pub async fn connect(&self, address: &str) -> Result<(), LinkError> {
        let address = match DeviceAddress::parse(address) {
            Ok(address) => address,
            Err(e) => {
                self.console.push(format!("Cannot connect: {}", e));
                return Err(e);
            }
        };
        self.post(LinkEvent::ConnectRequested(address)).await
    }

    pub async fn disconnect(&self) -> Result<(), LinkError> {
        self.post(LinkEvent::DisconnectRequested).await
    }

    pub async fn reconnect(&self) -> Result<(), LinkError> {
        self.post(LinkEvent::ReconnectRequested).await
    }

    pub async fn auto_connect(&self) -> Result<(), LinkError> {
        self.post(LinkEvent::AutoConnectRequested).await
    }

    pub async fn send(&self, command: Command) -> Result<(), LinkError> {
        self.post(LinkEvent::SendRequested(command)).await
    }

    pub async fn shutdown(&self) -> Result<(), LinkError> {
        self.post(LinkEvent::Shutdown).await
    }

    async fn post(&self, event: LinkEvent) -> Result<(), LinkError> {
        self.events.send(event).await.map_err(|_| LinkError::LinkStopped)
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshot.clone()
    }

    /// Every merged snapshot, one per accepted frame, in arrival order.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<TelemetrySnapshot> {
        self.updates.subscribe()
    }

    pub fn console(&self) -> &ConsoleLog {
        &self.console
    }
}

/// The link actor. Owns the single transport, the link state and the snapshot;
/// nothing else mutates them.
pub struct DeviceLink {
    settings: LinkSettings,
    connector: Arc<dyn Connector>,
    store: Arc<dyn AddressStore>,
    console: ConsoleLog,
    events: mpsc::Sender<LinkEvent>,
    state: LinkState,
    transport: Option<ActiveTransport>,
    remembered: Option<DeviceAddress>,
    next_token: u64,
    reconnect: Option<PendingReconnect>,
    reconnect_epoch: u64,
    retrying: bool,
    attempts: u32,
    heartbeat: Option<JoinHandle<()>>,
    snapshot: TelemetrySnapshot,
    status_tx: watch::Sender<LinkStatus>,
    snapshot_tx: watch::Sender<TelemetrySnapshot>,
    updates_tx: broadcast::Sender<TelemetrySnapshot>,
}

impl DeviceLink {
    pub fn spawn(
        settings: LinkSettings,
        connector: Arc<dyn Connector>,
        store: Arc<dyn AddressStore>,
        console: ConsoleLog,
    ) -> (LinkHandle, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());
        let (snapshot_tx, snapshot_rx) = watch::channel(TelemetrySnapshot::default());
        let (updates_tx, _) = broadcast::channel(UPDATE_FANOUT_DEPTH);

        let handle = LinkHandle {
            events: events_tx.clone(),
            status: status_rx,
            snapshot: snapshot_rx,
            updates: updates_tx.clone(),
            console: console.clone(),
        };

        let link = DeviceLink {
            settings,
            connector,
            store,
            console,
            events: events_tx,
            state: LinkState::Idle,
            transport: None,
            remembered: None,
            next_token: 0,
            reconnect: None,
            reconnect_epoch: 0,
            retrying: false,
            attempts: 0,
            heartbeat: None,
            snapshot: TelemetrySnapshot::default(),
            status_tx,
            snapshot_tx,
            updates_tx,
        };

        let task = tokio::spawn(link.run(events_rx));
        (handle, task)
    }

    async fn run(mut self, mut events: mpsc::Receiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            if matches!(event, LinkEvent::Shutdown) {
                break;
            }
            self.handle(event).await;
        }

        self.cancel_reconnect();
        self.stop_heartbeat();
        if let Some(transport) = self.transport.take() {
            transport
                .handle
                .close(CloseInfo::new(NORMAL_CLOSURE, "Dashboard shutting down"));
        }
        tracing::info!("Device link stopped");
    }

    async fn handle(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::ConnectRequested(address) => self.connect(address, Origin::Operator),
            LinkEvent::DisconnectRequested => self.disconnect(),
            LinkEvent::ReconnectRequested => self.reconnect().await,
            LinkEvent::AutoConnectRequested => self.auto_connect().await,
            LinkEvent::SendRequested(command) => self.send(command),
            LinkEvent::Opened(token) => self.on_opened(token).await,
            LinkEvent::FrameReceived(token, payload) => self.on_frame(token, &payload),
            LinkEvent::Closed(token, info) => self.on_closed(token, info),
            LinkEvent::HeartbeatDue(token) => self.on_heartbeat(token),
            LinkEvent::ReconnectDue(epoch) => self.on_reconnect_due(epoch),
            LinkEvent::Shutdown => {}
        }
    }

    fn connect(&mut self, address: DeviceAddress, origin: Origin) {
        self.cancel_reconnect();

        if let Some(current) = self.transport.take() {
            if self.state == LinkState::Open {
                tracing::debug!("Connect to {} ignored, link already open", address);
                self.transport = Some(current);
                return;
            }
            tracing::debug!("Replacing transport {} before it opened", current.handle.token());
            current
                .handle
                .close(CloseInfo::new(NORMAL_CLOSURE, "Superseded by a newer connection"));
            self.stop_heartbeat();
        }

        self.retrying = origin == Origin::AutoReconnect;
        self.remembered = Some(address.clone());
        self.attempts += 1;

        let url = address.ws_url(self.settings.port);
        self.console.push(format!("Trying to connect to {} ({})...", address, url));
        tracing::debug!("Connection attempt {} to {}", self.attempts, url);

        let token = TransportToken(self.next_token);
        self.next_token += 1;
        let handle = self
            .connector
            .open(&url, EventSink::new(token, self.events.clone()));

        self.transport = Some(ActiveTransport {
            handle,
            address,
            opened: false,
        });
        self.set_state(LinkState::Connecting);
    }

    fn disconnect(&mut self) {
        self.cancel_reconnect();
        self.retrying = false;
        self.remembered = None;

        if let Some(current) = &self.transport {
            current
                .handle
                .close(CloseInfo::new(NORMAL_CLOSURE, "User disconnected"));
            self.stop_heartbeat();
            self.set_state(LinkState::Closing);
        }
        self.console.push("Disconnecting...");
    }

    async fn reconnect(&mut self) {
        self.attempts = 0;
        if let Some(address) = self.remembered.clone() {
            self.console.push("Reconnecting...");
            self.connect(address, Origin::Operator);
            return;
        }

        match self.load_stored_address().await {
            Some(address) => {
                self.console.push("Reconnecting to last known address...");
                self.connect(address, Origin::Operator);
            }
            None => self.console.push("No previous connection to reconnect to"),
        }
    }

    async fn auto_connect(&mut self) {
        if self.transport.is_some() || self.state != LinkState::Idle {
            tracing::debug!("Skipping auto-connect, link is {}", self.state);
            return;
        }
        if let Some(address) = self.load_stored_address().await {
            self.console.push("Auto-connecting to last known address...");
            self.connect(address, Origin::Operator);
        }
    }

    async fn load_stored_address(&self) -> Option<DeviceAddress> {
        match self.store.load().await {
            Ok(Some(raw)) => match DeviceAddress::parse(&raw) {
                Ok(address) => Some(address),
                Err(e) => {
                    tracing::warn!("Ignoring stored device address: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read stored device address: {:#}", e);
                None
            }
        }
    }

    fn send(&mut self, command: Command) {
        match &self.transport {
            Some(current) if self.state == LinkState::Open => {
                let text = encode(&command);
                if current.handle.send_text(text.clone()) {
                    self.console.push(format!("Sent: {}", text));
                } else {
                    self.console.push(format!("Cannot send {}: transport has stopped", text));
                }
            }
            _ => self
                .console
                .push(format!("Cannot send: link not open (state: {})", self.state)),
        }
    }

    fn current(&self, token: TransportToken) -> Option<&ActiveTransport> {
        self.transport
            .as_ref()
            .filter(|current| current.handle.token() == token)
    }

    async fn on_opened(&mut self, token: TransportToken) {
        if self.current(token).is_none() || self.state != LinkState::Connecting {
            tracing::debug!("Ignoring open from transport {} (link {})", token, self.state);
            return;
        }

        let address = match self.transport.as_mut() {
            Some(current) => {
                current.opened = true;
                current.address.clone()
            }
            None => return,
        };
        self.attempts = 0;
        self.retrying = false;
        self.set_state(LinkState::Open);
        self.console.push(format!("Connected to device at {}", address));

        if let Err(e) = self.store.save(address.as_str()).await {
            tracing::warn!("Failed to persist device address: {:#}", e);
        }
        self.start_heartbeat(token);
    }

    fn on_frame(&mut self, token: TransportToken, payload: &[u8]) {
        if self.current(token).is_none() || self.state != LinkState::Open {
            tracing::debug!("Dropping frame from transport {} (link {})", token, self.state);
            return;
        }

        match decode(payload) {
            Ok(frame) => {
                tracing::debug!("Received: {}", String::from_utf8_lossy(payload));
                self.snapshot = merge(&self.snapshot, &frame);
                self.snapshot_tx.send_replace(self.snapshot.clone());
                // No subscribers is fine.
                let _ = self.updates_tx.send(self.snapshot.clone());
            }
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {}", e);
                self.console.push(format!(
                    "Error parsing message: {}",
                    String::from_utf8_lossy(payload)
                ));
            }
        }
    }

    fn on_closed(&mut self, token: TransportToken, info: CloseInfo) {
        let Some(closed) = self.transport.take_if(|current| current.handle.token() == token) else {
            tracing::debug!("Ignoring close from superseded transport {}", token);
            return;
        };

        self.stop_heartbeat();
        self.set_state(LinkState::Closed);

        if closed.opened {
            self.console.push(describe_disconnect(&info));
            if !info.is_normal() && self.remembered.is_some() {
                self.schedule_reconnect();
            }
            return;
        }

        self.console.push(describe_failed_attempt(&closed.address, self.settings.port, &info));
        if self.retrying && self.remembered.is_some() {
            self.schedule_reconnect();
        }
    }

    fn on_heartbeat(&mut self, token: TransportToken) {
        if self.state != LinkState::Open {
            return;
        }
        if let Some(current) = self.current(token) {
            if !current.handle.send_text(encode(&Command::Heartbeat)) {
                tracing::debug!("Heartbeat not queued, transport {} has stopped", token);
            }
        }
    }

    fn on_reconnect_due(&mut self, epoch: u64) {
        match &self.reconnect {
            Some(pending) if pending.epoch == epoch => self.reconnect = None,
            _ => {
                tracing::debug!("Ignoring stale reconnect timer {}", epoch);
                return;
            }
        }

        if self.transport.is_some() {
            return;
        }
        if let Some(address) = self.remembered.clone() {
            self.connect(address, Origin::AutoReconnect);
        }
    }

    fn schedule_reconnect(&mut self) {
        self.cancel_reconnect();
        self.reconnect_epoch += 1;

        let epoch = self.reconnect_epoch;
        let delay = self.settings.reconnect_delay;
        let events = self.events.clone();
        self.console.push(format!(
            "Attempting to reconnect in {} seconds...",
            delay.as_millis() as f64 / 1000.0
        ));

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(LinkEvent::ReconnectDue(epoch)).await;
        });
        self.reconnect = Some(PendingReconnect { epoch, task });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.reconnect.take() {
            pending.task.abort();
        }
    }

    fn start_heartbeat(&mut self, token: TransportToken) {
        self.stop_heartbeat();
        let period = self.settings.heartbeat_interval;
        let events = self.events.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(LinkEvent::HeartbeatDue(token)).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
    }

    fn set_state(&mut self, next: LinkState) {
        let previous = self.state;
        self.state = next;

        if previous == LinkState::Open && next != LinkState::Open && !self.snapshot.is_empty() {
            self.snapshot = TelemetrySnapshot::default();
            self.snapshot_tx.send_replace(self.snapshot.clone());
        }
        self.status_tx.send_replace(LinkStatus {
            state: next,
            connected: next == LinkState::Open,
        });

        if previous != next {
            tracing::info!("Link state {} -> {}", previous, next);
        }
    }
}

fn describe_disconnect(info: &CloseInfo) -> String {
    if info.reason.is_empty() {
        format!("Disconnected from device (code: {})", info.code)
    } else {
        format!(
            "Disconnected from device (code: {}, reason: {})",
            info.code, info.reason
        )
    }
}

fn describe_failed_attempt(address: &DeviceAddress, port: u16, info: &CloseInfo) -> String {
    match info.code {
        ABNORMAL_CLOSURE => format!(
            "Connection failed: unable to reach {}:{} (abnormal closure, code 1006)",
            address, port
        ),
        NORMAL_CLOSURE => format!("Connection closed normally (code: {})", info.code),
        code if info.reason.is_empty() => format!("Connection failed: error code {}", code),
        code => format!("Connection failed: error code {}, reason: {}", code, info.reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{FakeConnector, MemoryStore};
    use crate::application::transport::Outbound;

    struct Harness {
        link: LinkHandle,
        connector: Arc<FakeConnector>,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let connector = Arc::new(FakeConnector::default());
        let store = Arc::new(MemoryStore::default());
        let (link, _task) = DeviceLink::spawn(
            LinkSettings::default(),
            connector.clone(),
            store.clone(),
            ConsoleLog::new(100),
        );
        Harness {
            link,
            connector,
            store,
        }
    }

    /// Lets the actor drain its queue. Paused time auto-advances while idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    async fn open_link(h: &Harness) {
        h.link.connect("192.168.4.1").await.unwrap();
        settle().await;
        assert!(h.connector.sink(h.connector.count() - 1).opened().await);
        settle().await;
        assert_eq!(h.link.status().state, LinkState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_open_and_persist() {
        let h = harness();
        assert_eq!(h.link.status().state, LinkState::Idle);

        h.link.connect("192.168.4.1").await.unwrap();
        settle().await;
        assert_eq!(h.link.status().state, LinkState::Connecting);
        assert_eq!(h.connector.url(0), "ws://192.168.4.1:81");

        h.connector.sink(0).opened().await;
        settle().await;
        assert!(h.link.is_connected());
        assert_eq!(h.store.address.lock().unwrap().as_deref(), Some("192.168.4.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_is_rejected_synchronously() {
        let h = harness();
        assert_eq!(h.link.connect("  ").await, Err(LinkError::EmptyAddress));
        settle().await;
        assert_eq!(h.connector.count(), 0);
        assert_eq!(h.link.status().state, LinkState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_open_is_noop() {
        let h = harness();
        open_link(&h).await;
        h.link.connect("192.168.4.2").await.unwrap();
        settle().await;
        assert_eq!(h.connector.count(), 1);
        assert!(h.link.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_while_connecting_replaces_and_ignores_stale_callbacks() {
        let h = harness();
        h.link.connect("192.168.4.1").await.unwrap();
        settle().await;
        h.link.connect("192.168.4.2").await.unwrap();
        settle().await;
        assert_eq!(h.connector.count(), 2);
        assert!(matches!(
            h.connector.drain_outbound(0).as_slice(),
            [Outbound::Close(_)]
        ));

        // The superseded transport reports late; none of it may count.
        h.connector.sink(0).opened().await;
        h.connector
            .sink(0)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, ""))
            .await;
        settle().await;
        assert_eq!(h.link.status().state, LinkState::Connecting);

        h.connector.sink(1).opened().await;
        settle().await;
        assert!(h.link.is_connected());
        assert_eq!(h.store.address.lock().unwrap().as_deref(), Some("192.168.4.2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_merge_in_order_and_bad_frames_are_dropped() {
        let h = harness();
        let mut updates = h.link.subscribe_updates();
        open_link(&h).await;

        let sink = h.connector.sink(0);
        sink.frame(br#"{"rpm": 10, "temp": 30, "motor_active": true}"#.to_vec()).await;
        sink.frame(b"{not json".to_vec()).await;
        sink.frame(br#"{"motor_active": false, "speed": 0}"#.to_vec()).await;
        settle().await;

        assert_eq!(
            h.link.snapshot(),
            TelemetrySnapshot {
                rpm: Some(10.0),
                temperature: Some(30.0),
                voltage: None,
                speed_setting: Some(0),
                motor_active: Some(false),
            }
        );
        assert!(h.link.is_connected());
        assert!(h
            .link
            .console()
            .lines()
            .iter()
            .any(|l| l.ends_with("Error parsing message: {not json")));

        assert_eq!(updates.recv().await.unwrap().rpm, Some(10.0));
        assert_eq!(updates.recv().await.unwrap().motor_active, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_leaves_snapshot_unchanged() {
        let h = harness();
        open_link(&h).await;
        let sink = h.connector.sink(0);
        sink.frame(br#"{"voltage": 12.5}"#.to_vec()).await;
        settle().await;
        let before = h.link.snapshot();

        sink.frame(b"{not json".to_vec()).await;
        settle().await;
        assert_eq!(h.link.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_every_second_while_open() {
        let h = harness();
        open_link(&h).await;
        h.connector.drain_outbound(0);

        tokio::time::sleep(Duration::from_millis(3_005)).await;
        let sent = h.connector.drain_texts(0);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|t| t == r#"{"command":"heartbeat"}"#));

        h.link.disconnect().await.unwrap();
        settle().await;
        h.connector.drain_outbound(0);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(h.connector.drain_texts(0).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abnormal_close_schedules_single_reconnect() {
        let h = harness();
        open_link(&h).await;
        h.connector.sink(0).frame(br#"{"rpm": 4}"#.to_vec()).await;
        settle().await;

        h.connector
            .sink(0)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, ""))
            .await;
        settle().await;
        assert_eq!(h.link.status().state, LinkState::Closed);
        assert!(h.link.snapshot().is_empty());

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(h.connector.count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.connector.count(), 2);
        assert_eq!(h.connector.url(1), "ws://192.168.4.1:81");
        assert_eq!(h.link.status().state, LinkState::Connecting);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_auto_reconnect_keeps_retrying() {
        let h = harness();
        open_link(&h).await;
        h.connector
            .sink(0)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, "device reset"))
            .await;
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(h.connector.count(), 2);

        h.connector
            .sink(1)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, ""))
            .await;
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(h.connector.count(), 3);

        h.connector.sink(2).opened().await;
        settle().await;
        assert!(h.link.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_operator_connect_failure_does_not_retry() {
        let h = harness();
        h.link.connect("10.0.0.9").await.unwrap();
        settle().await;
        h.connector
            .sink(0)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, ""))
            .await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.count(), 1);
        assert!(h
            .link
            .console()
            .lines()
            .iter()
            .any(|l| l.contains("unable to reach 10.0.0.9:81")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_close_does_not_reconnect() {
        let h = harness();
        open_link(&h).await;
        h.connector
            .sink(0)
            .closed(CloseInfo::new(NORMAL_CLOSURE, ""))
            .await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.count(), 1);
        assert_eq!(h.link.status().state, LinkState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_then_close_does_not_reconnect() {
        let h = harness();
        open_link(&h).await;

        h.link.disconnect().await.unwrap();
        settle().await;
        let status = h.link.status();
        assert_eq!(status.state, LinkState::Closing);
        assert!(!status.connected);
        assert!(h
            .connector
            .drain_outbound(0)
            .contains(&Outbound::Close(CloseInfo::new(NORMAL_CLOSURE, "User disconnected"))));

        // Even a non-normal code after disconnect must not bring the link back.
        h.connector
            .sink(0)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, ""))
            .await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.count(), 1);
        assert_eq!(h.link.status().state, LinkState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let h = harness();
        open_link(&h).await;
        h.connector
            .sink(0)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, ""))
            .await;
        settle().await;

        h.link.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_cancels_pending_reconnect() {
        let h = harness();
        open_link(&h).await;
        h.connector
            .sink(0)
            .closed(CloseInfo::new(ABNORMAL_CLOSURE, ""))
            .await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        h.link.connect("10.0.0.2").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connector.count(), 2);
        assert_eq!(h.connector.url(0), "ws://192.168.4.1:81");
        assert_eq!(h.connector.url(1), "ws://10.0.0.2:81");
        assert_eq!(h.link.status().state, LinkState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting_ignores_late_open() {
        let h = harness();
        h.link.connect("192.168.4.1").await.unwrap();
        settle().await;

        h.link.disconnect().await.unwrap();
        settle().await;
        assert_eq!(h.link.status().state, LinkState::Closing);
        assert!(matches!(
            h.connector.drain_outbound(0).as_slice(),
            [Outbound::Close(info)] if info.code == NORMAL_CLOSURE
        ));

        h.connector.sink(0).opened().await;
        settle().await;
        assert_eq!(h.link.status().state, LinkState::Closing);
        assert!(!h.link.is_connected());

        h.connector
            .sink(0)
            .closed(CloseInfo::new(NORMAL_CLOSURE, "User disconnected"))
            .await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.link.status().state, LinkState::Closed);
        assert_eq!(h.connector.count(), 1);
        assert!(h.store.address.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_uses_remembered_then_stored_address() {
        let h = harness();
        h.link.reconnect().await.unwrap();
        settle().await;
        assert_eq!(h.connector.count(), 0);
        assert!(h
            .link
            .console()
            .lines()
            .iter()
            .any(|l| l.ends_with("No previous connection to reconnect to")));

        *h.store.address.lock().unwrap() = Some("10.1.1.1".to_string());
        h.link.reconnect().await.unwrap();
        settle().await;
        assert_eq!(h.connector.url(0), "ws://10.1.1.1:81");

        h.link.connect("10.2.2.2").await.unwrap();
        settle().await;
        h.link.reconnect().await.unwrap();
        settle().await;
        assert_eq!(h.connector.url(2), "ws://10.2.2.2:81");
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_connect_uses_stored_address_once() {
        let h = harness();
        *h.store.address.lock().unwrap() = Some("10.1.1.1".to_string());
        h.link.auto_connect().await.unwrap();
        settle().await;
        assert_eq!(h.connector.count(), 1);

        h.link.auto_connect().await.unwrap();
        settle().await;
        assert_eq!(h.connector.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_open_link() {
        let h = harness();
        h.link.send(Command::SetSpeed(40)).await.unwrap();
        settle().await;
        assert!(h
            .link
            .console()
            .lines()
            .iter()
            .any(|l| l.ends_with("Cannot send: link not open (state: IDLE)")));

        open_link(&h).await;
        h.connector.drain_outbound(0);
        h.link.send(Command::SetSpeed(40)).await.unwrap();
        h.link.send(Command::MotorStart).await.unwrap();
        settle().await;
        assert_eq!(
            h.connector.drain_texts(0),
            vec![r#"{"speed":40}"#, r#"{"command":"motor_start"}"#]
        );
    }
}
