use crate::hub::{HubCommand, HubHandle};
use chrono::{DateTime, Days, NaiveTime, Utc};
use std::time::Duration;
use tracing::{info, warn};

/// Fires one full reset per day at a fixed UTC time.
///
/// The scheduler only decides *when*; the wipe itself is the hub's
/// `ScheduledReset` command, the same path a client reset takes.
pub struct ResetScheduler {
    at: NaiveTime,
    hub: HubHandle,
}

impl ResetScheduler {
    pub fn new(at: NaiveTime, hub: HubHandle) -> Self {
        Self { at, hub }
    }

    /// Sleep until each fire time and post a reset; exits once the hub stops
    pub async fn run(self) {
        info!(utc_time = %self.at, "Starting reset scheduler");

        let mut previous = None;
        loop {
            let now = Utc::now();
            let next = following_fire(now, previous, self.at);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next = %next, "Next scheduled reset");

            tokio::time::sleep(wait).await;

            if !self.hub.send(HubCommand::ScheduledReset) {
                warn!("Hub stopped, reset scheduler exiting");
                return;
            }
            previous = Some(next);
        }
    }
}

/// The fire time after `previous`, counted from `now` unless the clock
/// still reads earlier than `previous` (an early wake-up)
pub fn following_fire(
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
    at: NaiveTime,
) -> DateTime<Utc> {
    let from = match previous {
        Some(previous) if previous > now => previous,
        _ => now,
    };
    next_fire_after(from, at)
}

/// The first instant strictly after `now` whose UTC time of day is `at`
pub fn next_fire_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        (now.date_naive() + Days::new(1)).and_time(at).and_utc()
    }
}
