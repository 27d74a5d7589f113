use crate::{
    error::Result,
    poll,
    protocol::{self, Command, FrameKind, MAX_POSITION},
    transport::{CurtainLink, CurtainTransport},
    types::{
        AdvancedState, ConnectionParams, CoverState, DeviceSnapshot, MotionStatus, PollConfig,
        PrimaryState,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    sync::{Mutex, RwLock},
    time::sleep,
};
use tracing::{debug, info, warn};

/// Positions below this value are reported as closed
pub const CLOSED_POSITION_THRESHOLD: u8 = 5;

/// Orientation-adjusted view of the device state, assembled for each
/// state change callback.
///
/// Every field is `None` until the first frame of the matching kind has
/// been decoded. Positions and motion directions have the configured
/// inversion already applied.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    /// Externally visible cover state
    pub motion_status: Option<CoverState>,
    /// Position in public orientation, 0 to 100
    pub position: Option<u8>,
    /// Flattened primary state attributes
    pub attributes: Option<Value>,
    /// Battery level in percent, from the advanced page
    pub battery: Option<u8>,
    /// Flattened advanced page attributes
    pub battery_attributes: Option<Value>,
}

impl StateUpdate {
    /// Builds the public view of a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &DeviceSnapshot, inverted: bool) -> Self {
        let primary = snapshot.primary.map(|state| {
            let position = adjust_position(state.position, inverted);
            let motion = if inverted {
                state.state_2.motion_status.reversed()
            } else {
                state.state_2.motion_status
            };
            (state, position, motion)
        });

        Self {
            motion_status: primary.map(|(_, position, motion)| cover_state(position, motion)),
            position: primary.map(|(_, position, _)| position),
            attributes: primary
                .map(|(state, position, motion)| Value::Object(state.attributes(position, motion))),
            battery: snapshot.advanced.map(|state| state.battery_percentage),
            battery_attributes: snapshot
                .advanced
                .map(|state| Value::Object(state.attributes())),
        }
    }
}

/// Callbacks a session fires as it runs.
///
/// State change callbacks follow every decoded frame. Command outcome
/// callbacks follow every connect attempt and every command write, and
/// nothing else.
#[async_trait]
pub trait SessionEvents: Send + Sync {
    /// A frame was decoded and folded into the snapshot.
    async fn on_state_changed(&self, update: &StateUpdate);

    /// A connect attempt or command write finished.
    async fn on_command_outcome(&self, success: bool);
}

/// Session for one SwitchBot Curtain device.
///
/// `CurtainDevice` owns the connection lifecycle of a single curtain:
/// it establishes the BLE link, keeps a decoded snapshot of the device
/// state, drives the polling loops and replays commands from the
/// outside world. The session never gives up; a lost link is replaced
/// by an unbounded retry loop and every failure surfaces through the
/// [`SessionEvents`] callbacks instead of an error return.
///
/// Positions use the Home Assistant convention where 100 is fully open.
/// Devices mounted in reverse orientation are handled by constructing
/// the session with `inverted` set, which flips positions and travel
/// directions exactly once at the session boundary.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use curtain2mqtt::{BleCentral, CurtainDevice, SessionEvents, StateUpdate};
/// use std::sync::Arc;
///
/// struct LogEvents;
///
/// #[async_trait]
/// impl SessionEvents for LogEvents {
///     async fn on_state_changed(&self, update: &StateUpdate) {
///         println!("curtain state: {:?}", update.motion_status);
///     }
///
///     async fn on_command_outcome(&self, success: bool) {
///         println!("command outcome: {success}");
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> curtain2mqtt::Result<()> {
///     let transport = Arc::new(BleCentral::new().await?);
///     let device = Arc::new(CurtainDevice::new(
///         transport,
///         Arc::new(LogEvents),
///         "E6:A7:30:C9:2B:5D",
///         false,
///     ));
///
///     device.clone().init().await;
///     device.open().await;
///     Ok(())
/// }
/// ```
pub struct CurtainDevice {
    transport: Arc<dyn CurtainTransport>,
    events: Arc<dyn SessionEvents>,
    address: String,
    inverted: bool,
    params: ConnectionParams,
    poll: PollConfig,
    link: Mutex<Option<Arc<dyn CurtainLink>>>,
    reconnect_gate: Mutex<()>,
    snapshot: RwLock<DeviceSnapshot>,
    moving: RwLock<bool>,
    move_grace: RwLock<bool>,
    listening: RwLock<bool>,
}

impl CurtainDevice {
    /// Creates a session with default connection and polling tuning.
    #[must_use]
    pub fn new(
        transport: Arc<dyn CurtainTransport>,
        events: Arc<dyn SessionEvents>,
        address: impl Into<String>,
        inverted: bool,
    ) -> Self {
        Self::with_tuning(
            transport,
            events,
            address,
            inverted,
            ConnectionParams::default(),
            PollConfig::default(),
        )
    }

    /// Creates a session with explicit tuning.
    #[must_use]
    pub fn with_tuning(
        transport: Arc<dyn CurtainTransport>,
        events: Arc<dyn SessionEvents>,
        address: impl Into<String>,
        inverted: bool,
        params: ConnectionParams,
        poll: PollConfig,
    ) -> Self {
        Self {
            transport,
            events,
            address: address.into(),
            inverted,
            params,
            poll,
            link: Mutex::new(None),
            reconnect_gate: Mutex::new(()),
            snapshot: RwLock::new(DeviceSnapshot::default()),
            moving: RwLock::new(false),
            move_grace: RwLock::new(false),
            listening: RwLock::new(false),
        }
    }

    /// Connects to the device and starts the background loops.
    pub async fn init(self: Arc<Self>) {
        self.connect().await;
        self.start_listening().await;
    }

    /// Establishes the device link, retrying until it succeeds.
    ///
    /// Each attempt reports a command outcome: `false` per failure,
    /// `true` once the link is up. Concurrent callers collapse into a
    /// single connect cycle; the late caller returns as soon as the
    /// winning one has installed a fresh link.
    pub async fn connect(&self) {
        let _gate = self.reconnect_gate.lock().await;

        if self.link.lock().await.is_some() {
            debug!("Link already restored by another task");
            return;
        }

        let mut attempt: u32 = 1;
        loop {
            info!("Connecting to curtain {} (attempt {attempt})", self.address);

            match self
                .transport
                .connect(&self.address, self.params.connect_timeout())
                .await
            {
                Ok(link) => {
                    *self.link.lock().await = Some(Arc::from(link));
                    info!("Curtain {} connected", self.address);
                    self.events.on_command_outcome(true).await;
                    return;
                }
                Err(e) => {
                    warn!("Connect attempt {attempt} failed: {e}");
                    self.events.on_command_outcome(false).await;
                    attempt = attempt.saturating_add(1);
                    sleep(self.params.retry_backoff()).await;
                }
            }
        }
    }

    /// Starts the notification listener and the two fetch loops. Calling
    /// this more than once has no effect.
    pub async fn start_listening(self: Arc<Self>) {
        {
            let mut listening = self.listening.write().await;
            if *listening {
                return;
            }
            *listening = true;
        }

        tokio::spawn(poll::notification_loop(Arc::clone(&self)));
        tokio::spawn(poll::primary_fetch_loop(Arc::clone(&self)));
        tokio::spawn(poll::advanced_fetch_loop(self));
    }

    /// Opens the curtain fully.
    pub async fn open(&self) {
        self.move_to(MAX_POSITION).await;
    }

    /// Closes the curtain fully.
    pub async fn close(&self) {
        self.move_to(0).await;
    }

    /// Halts the motor where it is.
    pub async fn stop(&self) {
        info!("Stopping curtain {}", self.address);
        self.send_command(Command::Stop).await;
    }

    /// Travels to `position` in public orientation, where 100 is fully
    /// open. Values above 100 are clamped.
    pub async fn move_to(&self, position: u8) {
        let position = position.min(MAX_POSITION);
        let target = adjust_position(position, self.inverted);

        info!("Moving curtain {} to {position}", self.address);
        self.send_command(Command::MoveTo(target)).await;

        *self.move_grace.write().await = true;
        *self.moving.write().await = true;
    }

    /// Last reported position in public orientation.
    pub async fn position(&self) -> Option<u8> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .primary
            .map(|state| adjust_position(state.position, self.inverted))
    }

    /// Whether the curtain rests at the closed end.
    pub async fn is_closed(&self) -> Option<bool> {
        self.position()
            .await
            .map(|position| position < CLOSED_POSITION_THRESHOLD)
    }

    /// Externally visible cover state.
    pub async fn motion_status(&self) -> Option<CoverState> {
        self.state_update().await.motion_status
    }

    /// Battery level in percent, from the advanced page.
    pub async fn battery(&self) -> Option<u8> {
        let snapshot = self.snapshot.read().await;
        snapshot.advanced.map(|state| state.battery_percentage)
    }

    /// Whether the USB adapter is attached.
    pub async fn is_adapter_plugged_in(&self) -> Option<bool> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .advanced
            .map(|state| state.state_of_charge.is_adapter())
    }

    /// Whether a movement command is believed to be in progress.
    pub async fn is_moving(&self) -> bool {
        *self.moving.read().await
    }

    /// Copy of the raw decoded snapshot.
    pub async fn snapshot(&self) -> DeviceSnapshot {
        *self.snapshot.read().await
    }

    /// Public view of the current snapshot.
    pub async fn state_update(&self) -> StateUpdate {
        let snapshot = *self.snapshot.read().await;
        StateUpdate::from_snapshot(&snapshot, self.inverted)
    }

    /// Tears down the device link, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CurtainError::Ble`](crate::CurtainError::Ble) if the
    /// transport rejects the disconnect.
    pub async fn disconnect(&self) -> Result<()> {
        let link = self.link.lock().await.take();
        if let Some(link) = link {
            link.disconnect().await?;
            info!("Disconnected from curtain {}", self.address);
        }
        Ok(())
    }

    pub(crate) async fn fetch_state(&self) {
        debug!("Requesting state frame");
        self.send_command(Command::FetchState).await;
    }

    pub(crate) async fn fetch_advanced(&self) {
        debug!("Requesting advanced status page");
        self.send_command(Command::FetchAdvanced).await;
    }

    /// Writes a command through the link slot, holding the slot for the
    /// whole write so commands never interleave.
    ///
    /// A missing link means the handle went stale under us; the command
    /// is dropped and a reconnect cycle runs instead. A failed write on
    /// a live link only reports a negative outcome, recovery is left to
    /// the notification listener.
    async fn send_command(&self, command: Command) {
        let result = {
            let guard = self.link.lock().await;
            match guard.as_ref() {
                Some(link) => Some(link.write(&command.encode()).await),
                None => None,
            }
        };

        match result {
            Some(Ok(())) => self.events.on_command_outcome(true).await,
            Some(Err(e)) => {
                warn!("Command write failed: {e}");
                self.events.on_command_outcome(false).await;
            }
            None => {
                warn!("Dropping command {command:?}: session handle is stale");
                self.connect().await;
            }
        }
    }

    pub(crate) async fn current_link(&self) -> Option<Arc<dyn CurtainLink>> {
        self.link.lock().await.clone()
    }

    /// Removes `dead` from the link slot if it is still the installed
    /// link. A replacement installed by a concurrent reconnect is left
    /// untouched.
    pub(crate) async fn discard_link(&self, dead: &Arc<dyn CurtainLink>) {
        let taken = {
            let mut slot = self.link.lock().await;
            match slot.as_ref() {
                Some(current) if Arc::ptr_eq(current, dead) => slot.take(),
                _ => None,
            }
        };

        if let Some(link) = taken {
            let _ = link.disconnect().await;
        }
    }

    pub(crate) fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Decodes a raw notification and folds it into the snapshot.
    /// Undecodable frames are dropped without a callback.
    pub(crate) async fn handle_notification(&self, raw: &[u8]) {
        match protocol::classify(raw) {
            FrameKind::Primary => match protocol::decode_primary(raw) {
                Ok(state) => {
                    self.apply_primary(state).await;
                    self.emit_state_changed().await;
                }
                Err(e) => debug!("Dropping primary frame: {e}"),
            },
            FrameKind::Advanced => match protocol::decode_advanced(raw) {
                Ok(state) => {
                    self.apply_advanced(state).await;
                    self.emit_state_changed().await;
                }
                Err(e) => debug!("Dropping advanced page: {e}"),
            },
            FrameKind::Unrecognized => {
                debug!("Ignoring unrecognized frame of {} bytes", raw.len());
            }
        }
    }

    async fn apply_primary(&self, state: PrimaryState) {
        self.snapshot.write().await.primary = Some(state);

        let mut grace = self.move_grace.write().await;
        if *grace {
            // the first frame after a move can still echo the pre-move state
            *grace = false;
        } else if state.state_2.motion_status == MotionStatus::Static {
            *self.moving.write().await = false;
        }
    }

    async fn apply_advanced(&self, state: AdvancedState) {
        self.snapshot.write().await.advanced = Some(state);
    }

    async fn emit_state_changed(&self) {
        let update = self.state_update().await;
        self.events.on_state_changed(&update).await;
    }
}

impl Drop for CurtainDevice {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.link.try_lock() {
            if let Some(link) = slot.take() {
                // spawning needs a live runtime
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let _ = link.disconnect().await;
                    });
                }
            }
        }
    }
}

const fn adjust_position(position: u8, inverted: bool) -> u8 {
    if inverted {
        MAX_POSITION.saturating_sub(position)
    } else {
        position
    }
}

fn cover_state(position: u8, motion: MotionStatus) -> CoverState {
    match motion {
        MotionStatus::Opening => CoverState::Opening,
        MotionStatus::Closing => CoverState::Closing,
        MotionStatus::Static => {
            if position < CLOSED_POSITION_THRESHOLD {
                CoverState::Closed
            } else {
                CoverState::Open
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CurtainError;
    use crate::protocol::MOVE_TO_PREFIX;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingEvents {
        outcomes: StdMutex<Vec<bool>>,
        updates: StdMutex<Vec<StateUpdate>>,
    }

    impl RecordingEvents {
        fn outcomes(&self) -> Vec<bool> {
            self.outcomes.lock().unwrap().clone()
        }

        fn updates(&self) -> Vec<StateUpdate> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionEvents for RecordingEvents {
        async fn on_state_changed(&self, update: &StateUpdate) {
            self.updates.lock().unwrap().push(update.clone());
        }

        async fn on_command_outcome(&self, success: bool) {
            self.outcomes.lock().unwrap().push(success);
        }
    }

    struct MockLink {
        writes: StdMutex<Vec<Vec<u8>>>,
        fail_writes: bool,
        frames: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    }

    impl MockLink {
        fn new() -> Arc<Self> {
            Self::with_write_failure(false)
        }

        fn with_write_failure(fail_writes: bool) -> Arc<Self> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Arc::new(Self {
                writes: StdMutex::new(Vec::new()),
                fail_writes,
                frames: Mutex::new(rx),
            })
        }

        fn recorded_writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CurtainLink for MockLink {
        async fn write(&self, payload: &[u8]) -> Result<()> {
            if self.fail_writes {
                return Err(CurtainError::TransientWrite("mock refusal".to_string()));
            }
            self.writes.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn next_notification(&self) -> Result<Vec<u8>> {
            self.frames
                .lock()
                .await
                .recv()
                .await
                .ok_or(CurtainError::LinkLost)
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    struct LinkHandle(Arc<MockLink>);

    #[async_trait]
    impl CurtainLink for LinkHandle {
        async fn write(&self, payload: &[u8]) -> Result<()> {
            self.0.write(payload).await
        }

        async fn next_notification(&self) -> Result<Vec<u8>> {
            self.0.next_notification().await
        }

        async fn disconnect(&self) -> Result<()> {
            self.0.disconnect().await
        }
    }

    struct MockTransport {
        attempts: AtomicUsize,
        failures_before_success: usize,
        link: Arc<MockLink>,
    }

    impl MockTransport {
        fn new(link: Arc<MockLink>) -> Arc<Self> {
            Self::failing(0, link)
        }

        fn failing(failures_before_success: usize, link: Arc<MockLink>) -> Arc<Self> {
            Arc::new(Self {
                attempts: AtomicUsize::new(0),
                failures_before_success,
                link,
            })
        }

        fn attempt_count(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CurtainTransport for MockTransport {
        async fn connect(&self, _address: &str, _budget: Duration) -> Result<Box<dyn CurtainLink>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                return Err(CurtainError::Timeout { timeout_ms: 50 });
            }
            Ok(Box::new(LinkHandle(Arc::clone(&self.link))))
        }
    }

    fn fast_params() -> ConnectionParams {
        ConnectionParams {
            connect_timeout_ms: 50,
            retry_backoff_ms: 1,
        }
    }

    fn test_device(
        transport: Arc<MockTransport>,
        events: Arc<RecordingEvents>,
        inverted: bool,
    ) -> CurtainDevice {
        CurtainDevice::with_tuning(
            transport,
            events,
            "E6:A7:30:C9:2B:5D",
            inverted,
            fast_params(),
            PollConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_connect_reports_each_attempt_outcome() {
        let link = MockLink::new();
        let transport = MockTransport::failing(2, Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(Arc::clone(&transport), Arc::clone(&events), false);

        device.connect().await;

        assert_eq!(events.outcomes(), vec![false, false, true]);
        assert_eq!(transport.attempt_count(), 3);
    }

    #[tokio::test]
    async fn test_stale_handle_drops_command_and_reconnects() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(Arc::clone(&transport), Arc::clone(&events), false);

        device.stop().await;

        // the command is gone, only the reconnect outcome is reported
        assert!(link.recorded_writes().is_empty());
        assert_eq!(events.outcomes(), vec![true]);
        assert_eq!(transport.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_reports_false_without_reconnect() {
        let link = MockLink::with_write_failure(true);
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(Arc::clone(&transport), Arc::clone(&events), false);

        device.connect().await;
        device.stop().await;

        assert_eq!(events.outcomes(), vec![true, false]);
        assert_eq!(transport.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_writes_halt_command() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, Arc::clone(&events), false);

        device.connect().await;
        device.stop().await;

        assert_eq!(
            link.recorded_writes(),
            vec![vec![0x57, 0x0F, 0x45, 0x01, 0x00, 0xFF]]
        );
        assert_eq!(events.outcomes(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_move_to_applies_inversion_once() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, true);

        device.connect().await;
        device.move_to(30).await;

        let mut expected = MOVE_TO_PREFIX.to_vec();
        expected.push(70);
        assert_eq!(link.recorded_writes(), vec![expected]);
    }

    #[tokio::test]
    async fn test_move_to_passes_position_through_when_not_inverted() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, false);

        device.connect().await;
        device.move_to(30).await;
        device.move_to(255).await;

        let writes = link.recorded_writes();
        assert_eq!(writes[0][6], 30);
        // out of range targets clamp to fully open
        assert_eq!(writes[1][6], 100);
    }

    #[tokio::test]
    async fn test_open_and_close_map_to_travel_extremes() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, true);

        device.connect().await;
        device.open().await;
        device.close().await;

        let writes = link.recorded_writes();
        // inverted mount: open travels to raw 0, close to raw 100
        assert_eq!(writes[0][6], 0);
        assert_eq!(writes[1][6], 100);
    }

    #[tokio::test]
    async fn test_move_grace_swallows_first_primary_frame() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, false);

        device.connect().await;
        device.move_to(40).await;
        assert!(device.is_moving().await);

        let static_frame = [0x01, 90, 45, 1, 0x00, 0x04, 40, 0];
        device.handle_notification(&static_frame).await;
        assert!(device.is_moving().await);

        device.handle_notification(&static_frame).await;
        assert!(!device.is_moving().await);
    }

    #[tokio::test]
    async fn test_move_grace_ignores_advanced_pages() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, false);

        device.connect().await;
        device.move_to(40).await;

        device.handle_notification(&[0x01, 90, 45, 0x01]).await;
        assert!(device.is_moving().await);

        let static_frame = [0x01, 90, 45, 1, 0x00, 0x04, 40, 0];
        device.handle_notification(&static_frame).await;
        assert!(device.is_moving().await);

        device.handle_notification(&static_frame).await;
        assert!(!device.is_moving().await);
    }

    #[tokio::test]
    async fn test_moving_frames_keep_session_moving() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, false);

        device.connect().await;
        device.move_to(80).await;

        let opening_frame = [0x01, 90, 45, 1, 0x00, 0x06, 50, 0];
        device.handle_notification(&opening_frame).await;
        device.handle_notification(&opening_frame).await;
        assert!(device.is_moving().await);

        let static_frame = [0x01, 90, 45, 1, 0x00, 0x04, 80, 0];
        device.handle_notification(&static_frame).await;
        assert!(!device.is_moving().await);
    }

    #[tokio::test]
    async fn test_inverted_session_reports_public_view() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, Arc::clone(&events), true);

        device
            .handle_notification(&[0x01, 95, 45, 1, 0x00, 0x04, 30, 2])
            .await;

        assert_eq!(device.position().await, Some(70));
        assert_eq!(device.is_closed().await, Some(false));
        assert_eq!(device.motion_status().await, Some(CoverState::Open));

        let updates = events.updates();
        assert_eq!(updates.len(), 1);
        let attributes = updates[0].attributes.as_ref().unwrap();
        assert_eq!(attributes["position"], 70);
        assert_eq!(attributes["state_2.motion_status"], "static");
    }

    #[tokio::test]
    async fn test_inverted_session_swaps_travel_direction() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, Arc::clone(&events), true);

        // raw closing reads as opening on a reversed mount
        device
            .handle_notification(&[0x01, 95, 45, 1, 0x00, 0x05, 30, 2])
            .await;

        assert_eq!(device.motion_status().await, Some(CoverState::Opening));
        let updates = events.updates();
        let attributes = updates[0].attributes.as_ref().unwrap();
        assert_eq!(attributes["state_2.motion_status"], "opening");
    }

    #[tokio::test]
    async fn test_closed_threshold_over_travel_range() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, false);

        for position in 0..=100u8 {
            device
                .handle_notification(&[0x01, 95, 45, 1, 0x00, 0x04, position, 0])
                .await;
            assert_eq!(
                device.is_closed().await,
                Some(position < CLOSED_POSITION_THRESHOLD),
                "position {position}"
            );
        }
    }

    #[tokio::test]
    async fn test_advanced_page_feeds_battery_view() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, Arc::clone(&events), false);

        device.handle_notification(&[0x01, 88, 45, 0x01]).await;

        assert_eq!(device.battery().await, Some(88));
        assert_eq!(device.is_adapter_plugged_in().await, Some(true));
        assert_eq!(device.position().await, None);

        let updates = events.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].battery, Some(88));
        assert!(updates[0].motion_status.is_none());
        let attributes = updates[0].battery_attributes.as_ref().unwrap();
        assert_eq!(attributes["is_adapter_connect"], true);
        assert_eq!(attributes["state_of_charge"], "charging_by_adapter");
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped_silently() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, Arc::clone(&events), false);

        // reserved motion index
        device
            .handle_notification(&[0x01, 95, 45, 1, 0x00, 0x03, 30, 2])
            .await;
        // unknown charge index
        device.handle_notification(&[0x01, 88, 45, 0x07]).await;
        // unrecognized length
        device.handle_notification(&[0x01; 12]).await;

        assert!(events.updates().is_empty());
        assert!(events.outcomes().is_empty());
        assert_eq!(device.snapshot().await, DeviceSnapshot::default());
    }

    #[tokio::test]
    async fn test_discard_link_only_removes_matching_handle() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(transport, events, false);

        device.connect().await;
        let installed = device.current_link().await.unwrap();

        let stranger: Arc<dyn CurtainLink> = Arc::new(LinkHandle(MockLink::new()));
        device.discard_link(&stranger).await;
        assert!(device.current_link().await.is_some());

        device.discard_link(&installed).await;
        assert!(device.current_link().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_skips_when_link_already_restored() {
        let link = MockLink::new();
        let transport = MockTransport::new(Arc::clone(&link));
        let events = Arc::new(RecordingEvents::default());
        let device = test_device(Arc::clone(&transport), Arc::clone(&events), false);

        device.connect().await;
        device.connect().await;

        assert_eq!(transport.attempt_count(), 1);
        assert_eq!(events.outcomes(), vec![true]);
    }
}
