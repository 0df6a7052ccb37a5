use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::traits::EventSink;
use crate::types::EngineEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Drain the bus into an external sink until `cancel` fires.
///
/// The subscription is taken before the task is spawned, so events published
/// after this call returns are never missed.
pub fn spawn_forwarder(
    bus: &EventBus,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Err(e) = sink.deliver(event).await {
                            warn!(error = %e, "Event sink rejected event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event forwarder lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("Event forwarder stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use tokio::sync::Mutex;

    use crate::error::Result;
    use crate::types::StationState;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EngineEvent>>);

    impl EventSink for Collect {
        fn deliver(&self, event: EngineEvent) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                self.0.lock().await.push(event);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(EngineEvent::StationChanged {
            execution_id: "e".into(),
            station_id: "s".into(),
            state: StationState::Active,
        });
    }

    #[tokio::test]
    async fn test_forwarder_delivers_in_order() {
        let bus = EventBus::new(16);
        let sink = Arc::new(Collect::default());
        let cancel = CancellationToken::new();
        let handle = spawn_forwarder(&bus, sink.clone(), cancel.clone());

        for state in [StationState::Active, StationState::Complete] {
            bus.publish(EngineEvent::StationChanged {
                execution_id: "e".into(),
                station_id: "s".into(),
                state,
            });
        }

        for _ in 0..50 {
            if sink.0.lock().await.len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let events = sink.0.lock().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            EngineEvent::StationChanged {
                state: StationState::Complete,
                ..
            }
        ));
    }

    struct FlakySink {
        seen: Mutex<Vec<EngineEvent>>,
        rejected: std::sync::atomic::AtomicBool,
    }

    impl EventSink for FlakySink {
        fn deliver(&self, event: EngineEvent) -> BoxFuture<'_, Result<()>> {
            Box::pin(async move {
                if !self.rejected.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    return Err(crate::error::ScriptoriumError::Sink("unavailable".into()));
                }
                self.seen.lock().await.push(event);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_forwarder_survives_sink_errors() {
        let bus = EventBus::new(16);
        let sink = Arc::new(FlakySink {
            seen: Mutex::new(Vec::new()),
            rejected: std::sync::atomic::AtomicBool::new(false),
        });
        let cancel = CancellationToken::new();
        let handle = spawn_forwarder(&bus, sink.clone(), cancel.clone());

        for station in ["intake", "drafting"] {
            bus.publish(EngineEvent::StationChanged {
                execution_id: "e".into(),
                station_id: station.into(),
                state: StationState::Active,
            });
        }

        for _ in 0..50 {
            if sink.seen.lock().await.len() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let seen = sink.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            EngineEvent::StationChanged { station_id, .. } if station_id == "drafting"
        ));
    }
}
