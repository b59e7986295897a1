//! Events from the USB interrupt to the main loop.
//!
//! The interrupt handler only captures what happened. All protocol handling is done by the consumer.
use heapless::spsc::{Consumer, Producer, Queue};

use crate::setup::SetupPacket;
use crate::Direction;

/// Number of events that can be pending at a time.
pub const EVENT_QUEUE_CAPACITY: usize = 16;

/// Upper bound of events handled per call to [`crate::UsbDevice::poll`].
pub const MAX_EVENTS_PER_POLL: usize = 8;

// One slot of a heapless queue stays empty.
const QUEUE_SIZE: usize = EVENT_QUEUE_CAPACITY + 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbEvent {
    Setup(SetupPacket),
    /// A transfer on an endpoint completed. For OUT, `length` is the number of bytes received.
    BufferDone {
        endpoint: u8,
        direction: Direction,
        length: u16,
    },
    BusReset,
}

pub type EventQueue = Queue<UsbEvent, QUEUE_SIZE>;

/// Producer side, owned by the interrupt handler.
pub struct EventSender<'q> {
    producer: Producer<'q, UsbEvent, QUEUE_SIZE>,
}

/// Consumer side, owned by the main loop.
pub struct EventReceiver<'q> {
    consumer: Consumer<'q, UsbEvent, QUEUE_SIZE>,
}

pub fn split(queue: &mut EventQueue) -> (EventSender<'_>, EventReceiver<'_>) {
    let (producer, consumer) = queue.split();
    (EventSender { producer }, EventReceiver { consumer })
}

impl EventSender<'_> {
    /// Queues an event.
    ///
    /// A full queue means that the main loop stopped draining it. This is not recoverable, since
    /// dropping a setup or completion event would desynchronize the protocol state.
    pub fn push(&mut self, event: UsbEvent) {
        if self.producer.enqueue(event).is_err() {
            panic!("USB event queue is full");
        }
    }
}

impl EventReceiver<'_> {
    pub fn pop(&mut self) -> Option<UsbEvent> {
        self.consumer.dequeue()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut queue = EventQueue::new();
        let (mut sender, mut receiver) = split(&mut queue);

        sender.push(UsbEvent::BusReset);
        sender.push(UsbEvent::BufferDone {
            endpoint: 1,
            direction: Direction::Out,
            length: 384,
        });

        assert_eq!(receiver.len(), 2);
        assert_eq!(receiver.pop(), Some(UsbEvent::BusReset));
        assert_eq!(
            receiver.pop(),
            Some(UsbEvent::BufferDone {
                endpoint: 1,
                direction: Direction::Out,
                length: 384
            })
        );
        assert_eq!(receiver.pop(), None);
    }

    #[test]
    fn holds_full_capacity() {
        let mut queue = EventQueue::new();
        let (mut sender, receiver) = split(&mut queue);

        for _ in 0..EVENT_QUEUE_CAPACITY {
            sender.push(UsbEvent::BusReset);
        }
        assert_eq!(receiver.len(), EVENT_QUEUE_CAPACITY);
    }

    #[test]
    #[should_panic(expected = "USB event queue is full")]
    fn overflow_is_fatal() {
        let mut queue = EventQueue::new();
        let (mut sender, _receiver) = split(&mut queue);

        for _ in 0..=EVENT_QUEUE_CAPACITY {
            sender.push(UsbEvent::BusReset);
        }
    }
}
