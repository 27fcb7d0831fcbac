//! Same-origin publish/subscribe channel between observing contexts.
//!
//! Every open context (tab, window, process-local view) attaches a
//! [`BusEndpoint`] to one shared [`CrossTabBus`]. Envelopes are stamped
//! with the publisher's [`SourceId`] so endpoints ignore their own traffic.
//! Outbound envelopes from one endpoint are spaced at least
//! [`OUTBOUND_SPACING`] apart.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use afterhours_types::{Envelope, SourceId, Stamped, VirtualMessage};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Capacity of the shared broadcast channel.
///
/// A receiver that falls further behind than this skips to the newest
/// envelopes.
const BUS_CAPACITY: usize = 256;

/// Minimum gap between two envelopes published by one endpoint.
pub const OUTBOUND_SPACING: Duration = Duration::from_millis(100);

/// The shared channel.
#[derive(Debug, Clone)]
pub struct CrossTabBus {
    tx: broadcast::Sender<Stamped>,
}

impl CrossTabBus {
    /// Create a bus with no endpoints.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Attach a new context with a fresh identity.
    pub fn attach(&self) -> BusEndpoint {
        BusEndpoint {
            source: SourceId::new(),
            tx: self.tx.clone(),
            next_slot: Mutex::new(None),
            failed: AtomicBool::new(false),
        }
    }
}

impl Default for CrossTabBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's handle on the bus.
#[derive(Debug)]
pub struct BusEndpoint {
    source: SourceId,
    tx: broadcast::Sender<Stamped>,
    next_slot: Mutex<Option<Instant>>,
    failed: AtomicBool,
}

impl BusEndpoint {
    /// This context's identity.
    pub const fn source(&self) -> SourceId {
        self.source
    }

    /// Listen for envelopes from other contexts.
    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver {
            source: self.source,
            rx: self.tx.subscribe(),
        }
    }

    /// Publish `envelope`, delayed as needed to respect the outbound
    /// spacing. Failures are logged, never returned.
    pub fn publish(self: &Arc<Self>, envelope: Envelope) {
        let slot = self.reserve_slot();
        let stamped = Stamped {
            source: self.source,
            envelope,
        };
        if slot <= Instant::now() {
            self.send(stamped);
            return;
        }
        let endpoint = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep_until(slot).await;
            endpoint.send(stamped);
        });
    }

    /// Claim the next free outbound slot.
    fn reserve_slot(&self) -> Instant {
        let mut next = match self.next_slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let slot = next.map_or(now, |n| n.max(now));
        *next = Some(slot.checked_add(OUTBOUND_SPACING).unwrap_or(slot));
        slot
    }

    fn send(&self, stamped: Stamped) {
        if let Err(e) = self.tx.send(stamped) {
            // Only the first failure is worth a warning; after that the
            // context simply runs single-tab.
            if self.failed.swap(true, Ordering::Relaxed) {
                debug!(error = %e, "cross-context broadcast failed again");
            } else {
                warn!(error = %e, "cross-context broadcast unavailable, continuing single-context");
            }
        }
    }
}

/// Receives envelopes published by other contexts.
#[derive(Debug)]
pub struct BusReceiver {
    source: SourceId,
    rx: broadcast::Receiver<Stamped>,
}

impl BusReceiver {
    /// Next message from another context. `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<VirtualMessage> {
        loop {
            match self.rx.recv().await {
                Ok(stamped) if stamped.source == self.source => {}
                Ok(stamped) => match stamped.envelope {
                    Envelope::VirtualMessage(vm) => return Some(vm),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "cross-context receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use afterhours_types::{Message, MessageKind};
    use chrono::Utc;

    use super::*;

    fn envelope(content: &str) -> Envelope {
        Envelope::VirtualMessage(VirtualMessage {
            message: Message::new("nova", content, MessageKind::Ai, Utc::now()),
            channel_name: "#lobby".to_owned(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn own_envelopes_are_ignored() {
        let bus = CrossTabBus::new();
        let a = Arc::new(bus.attach());
        let b = Arc::new(bus.attach());
        let mut a_rx = a.subscribe();
        let mut b_rx = b.subscribe();

        a.publish(envelope("from a"));
        let got = b_rx.recv().await.unwrap();
        assert_eq!(got.message.content, "from a");

        let nothing = tokio::time::timeout(Duration::from_secs(1), a_rx.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_envelopes_are_spaced() {
        let bus = CrossTabBus::new();
        let a = Arc::new(bus.attach());
        let b = bus.attach();
        let mut rx = b.subscribe();

        for i in 0..3 {
            a.publish(envelope(&format!("m{i}")));
        }
        let mut arrivals = Vec::new();
        for _ in 0..3 {
            let vm = rx.recv().await.unwrap();
            arrivals.push((vm.message.content, Instant::now()));
        }
        let contents: Vec<&str> = arrivals.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
        for pair in arrivals.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= OUTBOUND_SPACING);
        }
    }

    #[tokio::test]
    async fn send_without_listeners_is_not_fatal() {
        let bus = CrossTabBus::new();
        let lonely = Arc::new(bus.attach());
        lonely.publish(envelope("anyone?"));
        lonely.publish(envelope("hello?"));
        assert!(lonely.failed.load(Ordering::Relaxed));
    }
}
