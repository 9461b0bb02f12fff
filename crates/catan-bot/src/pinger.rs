//! Companion pinger: enqueues one `TimingPing` per second into a brain's
//! event queue.
//!
//! The tick is the brain's only clock; the brain itself never reads wall
//! time. The task stops on its own when the queue closes.

use catan_core::Message;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Spawn the 1 Hz pinger for one brain queue.
pub fn spawn(queue: mpsc::Sender<Message>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            // a ping is worthless late; drop it rather than wait on a full
            // queue, and stop once the brain is gone
            match queue.try_send(Message::TimingPing) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
    })
}
