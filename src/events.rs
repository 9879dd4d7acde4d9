//! Lock-free parameter event queue for library embedders.
//!
//! A control thread pushes `ParamEvent`s through the `ParamSender`; the audio
//! thread hands the `ParamReceiver` to `VocalChain::process_block_with_events`,
//! which splits the block at each event's sample offset.

use ringbuf::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};

/// A physical-unit parameter write at a sample offset within the next block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamEvent {
    pub address: u32,
    pub value: f32,
    #[serde(default)]
    pub offset: u32,
}

pub struct ParamSender {
    producer: Producer<ParamEvent>,
}

pub struct ParamReceiver {
    consumer: Consumer<ParamEvent>,
    // Popped but not yet due
    pending: Option<ParamEvent>,
}

/// Create a single-producer single-consumer queue holding up to `capacity` events.
pub fn param_queue(capacity: usize) -> (ParamSender, ParamReceiver) {
    let (producer, consumer) = RingBuffer::<ParamEvent>::new(capacity.max(1)).split();
    (
        ParamSender { producer },
        ParamReceiver {
            consumer,
            pending: None,
        },
    )
}

impl ParamSender {
    /// Queue an event. A full queue hands the event back.
    pub fn send(&mut self, event: ParamEvent) -> Result<(), ParamEvent> {
        self.producer.push(event)
    }

    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }
}

impl ParamReceiver {
    /// Offset of the next queued event, if any.
    pub fn next_offset(&mut self) -> Option<u32> {
        if self.pending.is_none() {
            self.pending = self.consumer.pop();
        }
        self.pending.map(|e| e.offset)
    }

    /// Pop the next event if its offset is at or before `position`.
    pub fn pop_due(&mut self, position: u32) -> Option<ParamEvent> {
        let event = match self.pending.take() {
            Some(e) => e,
            None => self.consumer.pop()?,
        };
        if event.offset <= position {
            Some(event)
        } else {
            self.pending = Some(event);
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none() && self.consumer.is_empty()
    }
}
