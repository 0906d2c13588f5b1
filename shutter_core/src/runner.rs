//! Delivery of gateway frames to a `Shutter`.
//!
//! The gateway pushes `InboundFrame`s into a channel; `EventPump` owns one
//! thread draining it into `Shutter::on_frame`. Sends therefore never
//! re-enter the shutter lock from the gateway side.
//!
//! The thread is shut down and joined when the pump is dropped.

use crossbeam_channel as xch;
use shutter_traits::InboundFrame;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::shutter::Shutter;

/// How often the pump re-checks its shutdown flag while idle.
const POLL: Duration = Duration::from_millis(50);

pub struct EventPump {
    shutdown: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    join_handle: Option<JoinHandle<()>>,
}

impl EventPump {
    pub fn spawn(shutter: Shutter, rx: xch::Receiver<InboundFrame>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let delivered = Arc::new(AtomicU64::new(0));
        let delivered_clone = Arc::clone(&delivered);

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("event pump received shutdown signal");
                    break;
                }
                match rx.recv_timeout(POLL) {
                    Ok(frame) => {
                        tracing::trace!(?frame, "frame received");
                        if let Err(e) = shutter.on_frame(frame) {
                            tracing::debug!(error = %e, "frame not applied");
                        }
                        delivered_clone.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(xch::RecvTimeoutError::Timeout) => {}
                    Err(xch::RecvTimeoutError::Disconnected) => {
                        tracing::debug!("gateway disconnected, event pump exiting");
                        break;
                    }
                }
            }
            tracing::trace!("event pump thread exiting cleanly");
        });

        Self {
            shutdown,
            delivered,
            join_handle: Some(join_handle),
        }
    }

    /// Frames handed to the shutter so far, supported or not.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("event pump thread joined successfully"),
                Err(e) => tracing::warn!(?e, "event pump thread panicked during shutdown"),
            }
        }
    }
}
