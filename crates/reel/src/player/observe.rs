//! Push-based observation of media items.
//!
//! Observers register a sink in an [`ObserverSet`] and hold the returned
//! [`Subscription`]; dropping the subscription unregisters the sink.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::backend::{ItemStatus, VideoSize};

/// Key-value properties an item reports changes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservedProperty {
    Status,
    LikelyToKeepUp,
    PresentationSize,
}

/// Notification delivered to an observer sink.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    Status(ItemStatus),
    LikelyToKeepUp(bool),
    PresentationSize(VideoSize),
    PeriodicTime {
        current: f64,
        duration: Option<f64>,
    },
    PlayedToEnd,
}

impl ItemEvent {
    pub fn property(&self) -> Option<ObservedProperty> {
        match self {
            ItemEvent::Status(_) => Some(ObservedProperty::Status),
            ItemEvent::LikelyToKeepUp(_) => Some(ObservedProperty::LikelyToKeepUp),
            ItemEvent::PresentationSize(_) => Some(ObservedProperty::PresentationSize),
            ItemEvent::PeriodicTime { .. } | ItemEvent::PlayedToEnd => None,
        }
    }
}

pub type EventSink = Arc<dyn Fn(ItemEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ObserverKey {
    Property(ObservedProperty),
    PeriodicTime { interval: Duration },
    PlayedToEnd,
}

struct Observer {
    id: u64,
    key: ObserverKey,
    sink: EventSink,
    /// Playback time accumulated since the last periodic fire
    elapsed: Duration,
}

#[derive(Default)]
struct ObserverTable {
    next_id: u64,
    observers: Vec<Observer>,
}

/// Registry of observer sinks for one media item.
#[derive(Clone, Default)]
pub struct ObserverSet {
    table: Arc<Mutex<ObserverTable>>,
}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.len())
            .finish()
    }
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, key: ObserverKey, sink: EventSink) -> Subscription {
        let mut table = self.table.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.observers.push(Observer {
            id,
            key,
            sink,
            elapsed: Duration::ZERO,
        });
        Subscription {
            table: Arc::downgrade(&self.table),
            id,
        }
    }

    pub fn observe(&self, property: ObservedProperty, sink: EventSink) -> Subscription {
        self.register(ObserverKey::Property(property), sink)
    }

    pub fn observe_periodic_time(&self, interval: Duration, sink: EventSink) -> Subscription {
        self.register(ObserverKey::PeriodicTime { interval }, sink)
    }

    pub fn observe_played_to_end(&self, sink: EventSink) -> Subscription {
        self.register(ObserverKey::PlayedToEnd, sink)
    }

    /// Deliver `event` to every matching observer.
    ///
    /// Sinks are called after the table lock is released, so a sink may
    /// subscribe or drop subscriptions on the same set.
    pub fn emit(&self, event: ItemEvent) {
        let sinks: Vec<EventSink> = {
            let table = self.table.lock();
            table
                .observers
                .iter()
                .filter(|observer| match (&observer.key, &event) {
                    (ObserverKey::Property(p), e) => e.property() == Some(*p),
                    (ObserverKey::PeriodicTime { .. }, ItemEvent::PeriodicTime { .. }) => true,
                    (ObserverKey::PlayedToEnd, ItemEvent::PlayedToEnd) => true,
                    _ => false,
                })
                .map(|observer| observer.sink.clone())
                .collect()
        };

        for sink in sinks {
            sink(event.clone());
        }
    }

    /// Advance the periodic observers by `step` of playback time and fire
    /// those whose interval has elapsed.
    pub fn advance_periodic(&self, step: Duration, current: f64, duration: Option<f64>) {
        let due: Vec<EventSink> = {
            let mut table = self.table.lock();
            table
                .observers
                .iter_mut()
                .filter_map(|observer| {
                    let ObserverKey::PeriodicTime { interval } = observer.key else {
                        return None;
                    };
                    observer.elapsed += step;
                    if observer.elapsed >= interval {
                        observer.elapsed = Duration::ZERO;
                        Some(observer.sink.clone())
                    } else {
                        None
                    }
                })
                .collect()
        };

        for sink in due {
            sink(ItemEvent::PeriodicTime { current, duration });
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of observers registered for `property`.
    pub fn count(&self, property: ObservedProperty) -> usize {
        self.table
            .lock()
            .observers
            .iter()
            .filter(|observer| observer.key == ObserverKey::Property(property))
            .count()
    }

    pub fn periodic_count(&self) -> usize {
        self.table
            .lock()
            .observers
            .iter()
            .filter(|observer| matches!(observer.key, ObserverKey::PeriodicTime { .. }))
            .count()
    }

    pub fn played_to_end_count(&self) -> usize {
        self.table
            .lock()
            .observers
            .iter()
            .filter(|observer| observer.key == ObserverKey::PlayedToEnd)
            .count()
    }
}

/// Handle to a registered observer. Dropping it unregisters the observer.
#[must_use = "dropping a Subscription unregisters the observer"]
pub struct Subscription {
    table: Weak<Mutex<ObserverTable>>,
    id: u64,
}

impl Subscription {
    /// Whether the observer is still registered.
    pub fn is_active(&self) -> bool {
        self.table
            .upgrade()
            .is_some_and(|table| table.lock().observers.iter().any(|o| o.id == self.id))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.lock().observers.retain(|observer| observer.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_sink() -> (EventSink, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sink: EventSink = Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (sink, hits)
    }

    #[test]
    fn emit_reaches_matching_property_only() {
        let set = ObserverSet::new();
        let (status_sink, status_hits) = counting_sink();
        let (size_sink, size_hits) = counting_sink();
        let _status = set.observe(ObservedProperty::Status, status_sink);
        let _size = set.observe(ObservedProperty::PresentationSize, size_sink);

        set.emit(ItemEvent::Status(ItemStatus::Ready));
        set.emit(ItemEvent::PlayedToEnd);

        assert_eq!(status_hits.load(Ordering::SeqCst), 1);
        assert_eq!(size_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let set = ObserverSet::new();
        let (sink, hits) = counting_sink();
        let sub = set.observe_played_to_end(sink);
        assert!(sub.is_active());
        assert_eq!(set.played_to_end_count(), 1);

        drop(sub);
        set.emit(ItemEvent::PlayedToEnd);

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(set.is_empty());
    }

    #[test]
    fn subscription_outliving_set_is_inert() {
        let set = ObserverSet::new();
        let (sink, _) = counting_sink();
        let sub = set.observe(ObservedProperty::Status, sink);
        drop(set);
        assert!(!sub.is_active());
        drop(sub);
    }

    #[test]
    fn periodic_fires_per_interval() {
        let set = ObserverSet::new();
        let (sink, hits) = counting_sink();
        let _sub = set.observe_periodic_time(Duration::from_millis(100), sink);

        for step in 1..=5 {
            set.advance_periodic(Duration::from_millis(50), step as f64 * 0.05, Some(10.0));
        }

        // 250ms of playback at a 100ms interval
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sink_may_drop_its_own_subscription() {
        let set = ObserverSet::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let held = slot.clone();
        let sub = set.observe_played_to_end(Arc::new(move |_| {
            held.lock().take();
        }));
        *slot.lock() = Some(sub);

        set.emit(ItemEvent::PlayedToEnd);

        assert!(slot.lock().is_none());
        assert!(set.is_empty());
    }
}
