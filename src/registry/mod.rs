//! Publish/subscribe hub between pipeline stages.
//!
//! Producers publish a closed set of [`PipelineEvent`]s without knowing who
//! listens. Consumers attach under a [`Tag`] and dispatch on the event variant.

use crate::models::{Candle, InstrumentId, TradeSignal};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Events flowing between stages
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A one-minute candle aged past the watermark at `as_of`
    CandleCompleted {
        candle: Candle,
        as_of: DateTime<Utc>,
    },
    /// The combined indicator state of an instrument changed
    SignalChanged(TradeSignal),
}

impl PipelineEvent {
    pub fn instrument(&self) -> &InstrumentId {
        match self {
            PipelineEvent::CandleCompleted { candle, .. } => &candle.instrument,
            PipelineEvent::SignalChanged(signal) => &signal.instrument,
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::CandleCompleted { .. } => "CandleCompleted",
            PipelineEvent::SignalChanged(_) => "SignalChanged",
        }
    }
}

/// Registration group for consumers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Receives every published event
    Stage(String),
    /// Receives only events for one instrument
    Instrument(InstrumentId),
}

impl Tag {
    pub fn stage(name: impl Into<String>) -> Self {
        Tag::Stage(name.into())
    }

    fn accepts(&self, event: &PipelineEvent) -> bool {
        match self {
            Tag::Stage(_) => true,
            Tag::Instrument(id) => id == event.instrument(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Stage(name) => write!(f, "stage:{}", name),
            Tag::Instrument(id) => write!(f, "instrument:{}", id),
        }
    }
}

impl From<&str> for Tag {
    fn from(name: &str) -> Self {
        Tag::stage(name)
    }
}

impl From<InstrumentId> for Tag {
    fn from(id: InstrumentId) -> Self {
        Tag::Instrument(id)
    }
}

/// Handle returned by [`SubscriptionRegistry::attach`]
pub type SubscriptionId = Uuid;

/// Anything that wants to observe pipeline events
pub trait EventConsumer: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

type Subscribers = Vec<(SubscriptionId, Arc<dyn EventConsumer>)>;

/// Tagged consumer registry
#[derive(Default)]
pub struct SubscriptionRegistry {
    consumers: RwLock<HashMap<Tag, Subscribers>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer under `tag`
    pub fn attach(&self, tag: impl Into<Tag>, consumer: Arc<dyn EventConsumer>) -> SubscriptionId {
        let tag = tag.into();
        let id = Uuid::new_v4();

        let mut consumers = self
            .consumers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        consumers.entry(tag.clone()).or_default().push((id, consumer));

        tracing::debug!(tag = %tag, subscription = %id, "Consumer attached");
        id
    }

    /// Remove one consumer; the tag disappears with its last consumer
    pub fn detach(&self, tag: &Tag, id: SubscriptionId) -> bool {
        let mut consumers = self
            .consumers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(list) = consumers.get_mut(tag) else {
            return false;
        };

        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() < before;

        if list.is_empty() {
            consumers.remove(tag);
        }

        if removed {
            tracing::debug!(tag = %tag, subscription = %id, "Consumer detached");
        }
        removed
    }

    /// Remove every consumer under `tag`, returning how many were removed
    pub fn detach_tag(&self, tag: &Tag) -> usize {
        let mut consumers = self
            .consumers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        consumers.remove(tag).map(|list| list.len()).unwrap_or(0)
    }

    /// Deliver `event` to every matching consumer, returning the delivery count.
    ///
    /// Consumers run after the registry lock is released, so a consumer may
    /// attach or detach without deadlocking.
    pub fn publish(&self, event: &PipelineEvent) -> usize {
        let targets: Vec<Arc<dyn EventConsumer>> = {
            let consumers = self
                .consumers
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            consumers
                .iter()
                .filter(|(tag, _)| tag.accepts(event))
                .flat_map(|(_, list)| list.iter().map(|(_, c)| Arc::clone(c)))
                .collect()
        };

        for consumer in &targets {
            consumer.on_event(event);
        }

        targets.len()
    }

    pub fn tags(&self) -> Vec<Tag> {
        self.consumers
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers
            .read()
            .map(|c| c.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Consumer that records everything it sees
    #[derive(Default)]
    pub(crate) struct RecordingConsumer {
        pub events: Mutex<Vec<PipelineEvent>>,
    }

    impl RecordingConsumer {
        pub fn count(&self) -> usize {
            self.events.lock().unwrap().len()
        }

        pub fn signals(&self) -> Vec<TradeSignal> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    PipelineEvent::SignalChanged(s) => Some(s.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventConsumer for RecordingConsumer {
        fn on_event(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn signal_for(id: &str) -> PipelineEvent {
        PipelineEvent::SignalChanged(TradeSignal::flat(InstrumentId::from(id)))
    }

    #[test]
    fn test_stage_consumers_receive_everything() {
        let registry = SubscriptionRegistry::new();
        let a = Arc::new(RecordingConsumer::default());
        let b = Arc::new(RecordingConsumer::default());
        registry.attach("execution", a.clone());
        registry.attach("persistence", b.clone());

        assert_eq!(registry.publish(&signal_for("X")), 2);
        assert_eq!(registry.publish(&signal_for("Y")), 2);
        assert_eq!(a.count(), 2);
        assert_eq!(b.count(), 2);
    }

    #[test]
    fn test_instrument_consumers_are_filtered() {
        let registry = SubscriptionRegistry::new();
        let x = Arc::new(RecordingConsumer::default());
        registry.attach(InstrumentId::from("X"), x.clone());

        registry.publish(&signal_for("X"));
        registry.publish(&signal_for("Y"));

        assert_eq!(x.count(), 1);
        assert_eq!(x.signals()[0].instrument.as_str(), "X");
    }

    #[test]
    fn test_detach_last_consumer_removes_tag() {
        let registry = SubscriptionRegistry::new();
        let tag = Tag::stage("execution");
        let first = registry.attach(tag.clone(), Arc::new(RecordingConsumer::default()));
        let second = registry.attach(tag.clone(), Arc::new(RecordingConsumer::default()));

        assert!(registry.detach(&tag, first));
        assert_eq!(registry.tags(), vec![tag.clone()]);

        assert!(registry.detach(&tag, second));
        assert!(registry.tags().is_empty());
        assert!(!registry.detach(&tag, second));
    }

    #[test]
    fn test_detach_tag() {
        let registry = SubscriptionRegistry::new();
        let tag = Tag::Instrument(InstrumentId::from("X"));
        registry.attach(tag.clone(), Arc::new(RecordingConsumer::default()));
        registry.attach(tag.clone(), Arc::new(RecordingConsumer::default()));
        registry.attach("execution", Arc::new(RecordingConsumer::default()));

        assert_eq!(registry.detach_tag(&tag), 2);
        assert_eq!(registry.consumer_count(), 1);
    }

    #[test]
    fn test_candle_event_instrument() {
        let candle = Candle {
            instrument: InstrumentId::from("X"),
            bucket_start: Utc.with_ymd_and_hms(2024, 3, 4, 9, 15, 0).unwrap(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
            open_interest: 0.0,
        };
        let event = PipelineEvent::CandleCompleted {
            candle,
            as_of: Utc::now(),
        };
        assert_eq!(event.instrument().as_str(), "X");
        assert_eq!(event.kind(), "CandleCompleted");
    }

    #[test]
    fn test_consumer_may_detach_during_publish() {
        struct SelfDetaching {
            registry: Arc<SubscriptionRegistry>,
            id: Mutex<Option<SubscriptionId>>,
        }

        impl EventConsumer for SelfDetaching {
            fn on_event(&self, _event: &PipelineEvent) {
                if let Some(id) = self.id.lock().unwrap().take() {
                    self.registry.detach(&Tag::stage("once"), id);
                }
            }
        }

        let registry = Arc::new(SubscriptionRegistry::new());
        let consumer = Arc::new(SelfDetaching {
            registry: registry.clone(),
            id: Mutex::new(None),
        });
        let id = registry.attach("once", consumer.clone());
        *consumer.id.lock().unwrap() = Some(id);

        assert_eq!(registry.publish(&signal_for("X")), 1);
        assert_eq!(registry.publish(&signal_for("X")), 0);
    }
}
