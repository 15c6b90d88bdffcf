use log::{debug, info, warn};
use qrlink_pairing::{
    DeviceRegistry, EndpointError, Effect, PairingConfig, PairingEvent, PairingMachine,
    PairingPhase, PairingSnapshot, DEFAULT_IDLE_TIMEOUT,
};
use qrlink_proto::{decode_frame, Handshake, LinkedDeviceRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use url::Url;

use crate::transport::{EventSender, Transport, TransportEvent, TransportEventKind, TransportHandle};

type LinkedCallback = Box<dyn Fn(&LinkedDeviceRecord) + Send + Sync>;

enum Wake {
    Event(Option<TransportEvent>),
    Deadline,
}

/// Owns the pairing session: the one live transport, the generation counter
/// and the state machine.
///
/// All mutation goes through `&mut self`, so a controller is driven by a
/// single task. Transport events arrive on one channel and are applied in
/// order by [`SessionController::step`] or
/// [`SessionController::process_pending`]; events from any generation other
/// than the current one are dropped.
pub struct SessionController {
    endpoint: Url,
    idle_timeout: Duration,
    transport: Arc<dyn Transport>,
    registry: Arc<dyn DeviceRegistry>,
    machine: PairingMachine,
    generation: u64,
    tenant_id: String,
    active: Option<Box<dyn TransportHandle>>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    updates: watch::Sender<PairingSnapshot>,
    on_linked: Option<LinkedCallback>,
    deadline: Option<Instant>,
}

impl SessionController {
    pub fn new(
        endpoint: Url,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (updates, _) = watch::channel(PairingSnapshot::default());
        Self {
            endpoint,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            transport,
            registry,
            machine: PairingMachine::new(),
            generation: 0,
            tenant_id: String::new(),
            active: None,
            events_tx,
            events_rx,
            updates,
            on_linked: None,
            deadline: None,
        }
    }

    pub fn from_config(
        config: &PairingConfig,
        transport: Arc<dyn Transport>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Result<Self, EndpointError> {
        let endpoint = config.resolve_endpoint()?;
        Ok(Self::new(endpoint, transport, registry).with_idle_timeout(config.idle_timeout))
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Called once for every session that reaches `completed`.
    pub fn on_linked(&mut self, callback: impl Fn(&LinkedDeviceRecord) + Send + Sync + 'static) {
        self.on_linked = Some(Box::new(callback));
    }

    /// Begin a new pairing session for `tenant_id`.
    ///
    /// Any existing transport is closed first. On return the new generation
    /// is active and the phase is `connecting`.
    pub fn start(&mut self, tenant_id: &str) {
        self.generation += 1;
        self.tenant_id = tenant_id.to_string();
        info!(
            "starting pairing session {} for tenant {:?}",
            self.generation, self.tenant_id
        );
        let effects = self.machine.apply(PairingEvent::Start {
            generation: self.generation,
        });
        self.run_effects(effects);
        self.refresh_deadline();
        self.publish();
    }

    /// Abandon the current session. Does nothing when already idle.
    pub fn cancel(&mut self) {
        let effects = self.machine.apply(PairingEvent::Cancel);
        if effects.is_empty() {
            self.release_transport();
            return;
        }
        info!("pairing session {} cancelled", self.generation);
        self.run_effects(effects);
        self.refresh_deadline();
        self.publish();
    }

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        if event.generation != self.generation || self.active.is_none() {
            debug!(
                "dropping {:?} from transport generation {} (current {}, live: {})",
                event.kind,
                event.generation,
                self.generation,
                self.active.is_some()
            );
            return;
        }

        let pairing_event = match event.kind {
            TransportEventKind::Open => PairingEvent::Opened,
            TransportEventKind::Message(raw) => match decode_frame(&raw) {
                Ok(frame) => PairingEvent::Frame(frame),
                Err(e) => {
                    warn!("undecodable frame from pairing backend ({e}): {raw}");
                    PairingEvent::Undecodable(e)
                }
            },
            TransportEventKind::Error(detail) => {
                warn!("pairing transport {} failed: {detail}", self.generation);
                PairingEvent::TransportError(detail)
            }
            TransportEventKind::Close => PairingEvent::Closed,
        };

        let effects = self.machine.apply(pairing_event);
        self.run_effects(effects);
        self.refresh_deadline();
        self.publish();
    }

    /// Apply every event already queued, without waiting. Returns how many
    /// were taken off the queue.
    pub fn process_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            count += 1;
        }
        count
    }

    /// Wait for the next transport event, or for the idle timeout while a
    /// session is live, and apply it.
    pub async fn step(&mut self) {
        let wake = match self.deadline {
            Some(deadline) => tokio::select! {
                event = self.events_rx.recv() => Wake::Event(event),
                _ = tokio::time::sleep_until(deadline) => Wake::Deadline,
            },
            None => Wake::Event(self.events_rx.recv().await),
        };

        match wake {
            Wake::Event(Some(event)) => self.handle_event(event),
            Wake::Event(None) => {}
            Wake::Deadline => self.expire(),
        }
    }

    /// Drive the session until it is idle, completed or failed.
    pub async fn run_until_settled(&mut self) -> PairingPhase {
        while !self.phase().is_settled() {
            self.step().await;
        }
        self.phase()
    }

    fn expire(&mut self) {
        if !self.phase().is_live() {
            self.deadline = None;
            return;
        }
        warn!(
            "pairing session {} saw no traffic for {:?}; giving up",
            self.generation, self.idle_timeout
        );
        let effects = self.machine.apply(PairingEvent::TimedOut);
        self.run_effects(effects);
        self.refresh_deadline();
        self.publish();
    }

    fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenTransport => {
                    self.release_transport();
                    debug!(
                        "opening transport {} to {}",
                        self.generation, self.endpoint
                    );
                    self.active = Some(self.transport.open(
                        &self.endpoint,
                        self.generation,
                        self.events_tx.clone(),
                    ));
                }
                Effect::SendHandshake => {
                    let frame = Handshake::new(self.tenant_id.clone()).encode();
                    match self.active.as_mut() {
                        Some(handle) => handle.send(frame),
                        None => warn!("no transport to send the handshake on"),
                    }
                }
                Effect::CloseTransport => self.release_transport(),
                Effect::DeviceLinked(record) => {
                    info!(
                        "pairing session {} linked device {} ({})",
                        self.generation, record.id, record.display_name
                    );
                    self.registry.reconcile(&record);
                    if let Some(callback) = &self.on_linked {
                        callback(&record);
                    }
                }
            }
        }
    }

    fn release_transport(&mut self) {
        if let Some(mut handle) = self.active.take() {
            debug!("closing transport {}", self.generation);
            handle.close();
        }
    }

    fn refresh_deadline(&mut self) {
        self.deadline = if self.phase().is_live() {
            Some(Instant::now() + self.idle_timeout)
        } else {
            None
        };
    }

    fn publish(&self) {
        self.updates.send_replace(self.machine.snapshot().clone());
    }

    pub fn snapshot(&self) -> &PairingSnapshot {
        self.machine.snapshot()
    }

    /// Receives a fresh snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<PairingSnapshot> {
        self.updates.subscribe()
    }

    pub fn phase(&self) -> PairingPhase {
        self.machine.phase()
    }

    pub fn message(&self) -> &str {
        &self.machine.snapshot().message
    }

    pub fn last_error(&self) -> Option<&str> {
        self.machine.snapshot().last_error.as_deref()
    }

    pub fn qr_payload(&self) -> Option<&str> {
        self.machine.snapshot().qr_payload.as_deref()
    }

    pub fn linked_device(&self) -> Option<&LinkedDeviceRecord> {
        self.machine.snapshot().device.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Whether a transport is currently held.
    pub fn has_transport(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.release_transport();
    }
}
