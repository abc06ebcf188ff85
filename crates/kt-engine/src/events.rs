//! Progress events emitted while a run is in flight.

use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TuningEvent {
    Baseline {
        run_id: Uuid,
        performance: f64,
    },
    TrialCompleted {
        trial_number: usize,
        performance: f64,
    },
    TrialFailed {
        trial_number: usize,
        error: String,
    },
    NewBest {
        trial_number: usize,
        performance: f64,
        improvement: f64,
    },
    Finished {
        run_id: Uuid,
        best_performance: f64,
        improvement: f64,
        trials: usize,
    },
}

/// Optional event channel. Sends never block and a dropped receiver is
/// ignored after one warning.
#[derive(Debug, Default)]
pub struct EventSink {
    tx: Option<Sender<TuningEvent>>,
    disconnected: bool,
}

impl EventSink {
    pub fn new(tx: Sender<TuningEvent>) -> Self {
        Self {
            tx: Some(tx),
            disconnected: false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.tx.is_some() && !self.disconnected
    }

    pub fn emit(&mut self, event: TuningEvent) {
        let tx = match &self.tx {
            Some(tx) if !self.disconnected => tx,
            _ => return,
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(_)) => {
                warn!("Event receiver dropped, no further events will be sent");
                self.disconnected = true;
            }
            Err(TrySendError::Full(event)) => {
                warn!(?event, "Event channel full, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    #[test]
    fn delivers_events() {
        let (tx, rx) = unbounded();
        let mut sink = EventSink::new(tx);
        sink.emit(TuningEvent::TrialCompleted {
            trial_number: 1,
            performance: 10.0,
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            TuningEvent::TrialCompleted {
                trial_number: 1,
                performance: 10.0
            }
        );
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = unbounded();
        let mut sink = EventSink::new(tx);
        drop(rx);
        sink.emit(TuningEvent::TrialFailed {
            trial_number: 0,
            error: "boom".to_string(),
        });
        assert!(!sink.is_attached());
        sink.emit(TuningEvent::TrialFailed {
            trial_number: 1,
            error: "boom".to_string(),
        });
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let (tx, rx) = bounded(1);
        let mut sink = EventSink::new(tx);
        for trial_number in 0..3 {
            sink.emit(TuningEvent::TrialCompleted {
                trial_number,
                performance: 1.0,
            });
        }
        assert_eq!(rx.try_iter().count(), 1);
        assert!(sink.is_attached());
    }

    #[test]
    fn detached_sink_is_a_no_op() {
        let mut sink = EventSink::default();
        assert!(!sink.is_attached());
        sink.emit(TuningEvent::TrialFailed {
            trial_number: 0,
            error: String::new(),
        });
    }

    #[test]
    fn serializes_with_tag() {
        let event = TuningEvent::NewBest {
            trial_number: 4,
            performance: 2.5,
            improvement: 0.25,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "new_best");
        assert_eq!(value["trial_number"], 4);
    }
}
