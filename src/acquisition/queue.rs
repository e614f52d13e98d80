use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::types::Sample;

/// Creates the single-producer/single-consumer handoff between reader and
/// assembler. The channel is unbounded; growth is reported through
/// `QueueConsumer::backlog`.
pub fn sample_queue() -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = unbounded();
    (QueueProducer { tx }, QueueConsumer { rx })
}

pub struct QueueProducer {
    tx: Sender<Sample>,
}

impl QueueProducer {
    /// Returns false once the consumer side is gone.
    pub fn push(&self, sample: Sample) -> bool {
        self.tx.send(sample).is_ok()
    }
}

#[derive(Debug, PartialEq)]
pub enum Pop {
    Item(Sample),
    Empty,
    /// The producer hung up and every queued sample was consumed.
    Closed,
}

pub struct QueueConsumer {
    rx: Receiver<Sample>,
}

impl QueueConsumer {
    pub fn try_pop(&self) -> Pop {
        match self.rx.try_recv() {
            Ok(sample) => Pop::Item(sample),
            Err(TryRecvError::Empty) => Pop::Empty,
            Err(TryRecvError::Disconnected) => Pop::Closed,
        }
    }

    pub fn backlog(&self) -> usize {
        self.rx.len()
    }

    /// Discards everything currently queued, returning how many were dropped.
    pub fn discard(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_arrival_order() {
        let (tx, rx) = sample_queue();
        for i in 0..5 {
            assert!(tx.push(Sample::ok(i, None, vec![i as i32])));
        }
        assert_eq!(rx.backlog(), 5);
        for i in 0..5 {
            match rx.try_pop() {
                Pop::Item(sample) => assert_eq!(sample.timestamp, i),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(rx.try_pop(), Pop::Empty);
    }

    #[test]
    fn reports_closed_after_producer_drop() {
        let (tx, rx) = sample_queue();
        tx.push(Sample::ok(1, None, vec![1]));
        drop(tx);
        assert!(matches!(rx.try_pop(), Pop::Item(_)));
        assert_eq!(rx.try_pop(), Pop::Closed);
    }
}
