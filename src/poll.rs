use crate::device::CurtainDevice;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::warn;

/// Consumes notifications for the life of the session.
///
/// Link loss is detected here: when the link reports it is gone, the
/// dead handle is discarded and a reconnect cycle runs before the loop
/// resumes on the replacement link.
pub(crate) async fn notification_loop(device: Arc<CurtainDevice>) {
    loop {
        let Some(link) = device.current_link().await else {
            sleep(device.poll_config().fetch_interval()).await;
            continue;
        };

        match link.next_notification().await {
            Ok(frame) => device.handle_notification(&frame).await,
            Err(e) if e.triggers_reconnect() => {
                warn!("Device link lost while listening: {e}");
                device.discard_link(&link).await;
                device.connect().await;
            }
            Err(e) => {
                warn!("Listener error: {e}");
                sleep(device.poll_config().fetch_interval()).await;
            }
        }
    }
}

/// Requests primary state frames on the adaptive cadence: every period
/// while a movement is in progress, every `standby_periods` periods
/// otherwise.
pub(crate) async fn primary_fetch_loop(device: Arc<CurtainDevice>) {
    let config = device.poll_config();
    let mut counter = StandbyCounter::new(config.standby_periods);

    loop {
        if counter.should_fetch(device.is_moving().await) {
            device.fetch_state().await;
        }
        sleep(config.fetch_interval()).await;
    }
}

/// Requests the advanced status page on a slow fixed cadence, offset by
/// half a cadence so the two fetch loops do not fire together.
pub(crate) async fn advanced_fetch_loop(device: Arc<CurtainDevice>) {
    let config = device.poll_config();

    sleep(config.advanced_start_delay()).await;
    loop {
        device.fetch_advanced().await;
        sleep(config.advanced_interval()).await;
    }
}

/// Decides which polling periods actually fetch.
///
/// The counter starts saturated so the first period after a connect
/// fetches immediately. While the session is moving every period
/// fetches and the idle count stays pinned at zero.
pub(crate) struct StandbyCounter {
    idle_periods: u32,
    threshold: u32,
}

impl StandbyCounter {
    pub(crate) fn new(threshold: u32) -> Self {
        Self {
            idle_periods: threshold,
            threshold,
        }
    }

    pub(crate) fn should_fetch(&mut self, moving: bool) -> bool {
        if moving || self.idle_periods >= self.threshold {
            self.idle_periods = 0;
            true
        } else {
            self.idle_periods += 1;
            false
        }
    }
}
