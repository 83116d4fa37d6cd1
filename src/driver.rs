//! Producer and consumer loops that feed a [`BoundedBuffer`] on a schedule.
//!
//! The buffer and the stop token are passed in explicitly; each loop runs on
//! whatever thread calls it. [`run_session`] wires both onto named threads.

use std::fmt;
use std::thread;

use crate::buffer::{BoundedBuffer, BufferStats};
use crate::cancel::CancelToken;
use crate::config::{DriverConfig, HandoffConfig};
use crate::error::{HandoffError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Consumer => f.write_str("consumer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every requested handoff completed.
    Finished,
    /// Stopped early, either by the cancel token or because the other side
    /// finished and closed the buffer.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverReport {
    pub role: Role,
    pub requested: usize,
    pub completed: usize,
    pub outcome: Outcome,
    /// Values handed over, in order. Produced values for the producer,
    /// received values for the consumer.
    pub values: Vec<i64>,
}

impl DriverReport {
    fn new(role: Role, requested: usize) -> Self {
        Self {
            role,
            requested,
            completed: 0,
            outcome: Outcome::Finished,
            values: Vec::with_capacity(requested),
        }
    }

    fn record(&mut self, value: i64) {
        self.completed += 1;
        self.values.push(value);
    }

    fn cancelled(mut self) -> Self {
        self.outcome = Outcome::Cancelled;
        tracing::warn!(
            role = %self.role,
            completed = self.completed,
            dropped = self.dropped(),
            "driver stopped before finishing"
        );
        self
    }

    pub fn is_finished(&self) -> bool {
        self.outcome == Outcome::Finished
    }

    /// Handoffs that were requested but never happened.
    pub fn dropped(&self) -> usize {
        self.requested - self.completed
    }
}

/// Produces `1..=config.iterations`, pausing `config.delay()` after each.
pub fn produce_sequence(
    buffer: &BoundedBuffer<i64>,
    config: &DriverConfig,
    cancel: &CancelToken,
) -> DriverReport {
    let mut report = DriverReport::new(Role::Producer, config.iterations);

    for value in (1..).take(config.iterations) {
        if let Err(err) = buffer.produce(value, cancel) {
            tracing::debug!(value = err.into_inner(), "produce interrupted");
            return report.cancelled();
        }
        tracing::info!(value, buffered = buffer.len(), "produced");
        report.record(value);

        if cancel.sleep(config.delay()).is_err() {
            return report.cancelled();
        }
    }

    report
}

/// Consumes `config.iterations` values, pausing `config.delay()` after each.
pub fn consume_sequence(
    buffer: &BoundedBuffer<i64>,
    config: &DriverConfig,
    cancel: &CancelToken,
) -> DriverReport {
    let mut report = DriverReport::new(Role::Consumer, config.iterations);

    for _ in 0..config.iterations {
        let value = match buffer.consume(cancel) {
            Ok(value) => value,
            Err(_) => return report.cancelled(),
        };
        tracing::info!(value, buffered = buffer.len(), "consumed");
        report.record(value);

        if cancel.sleep(config.delay()).is_err() {
            return report.cancelled();
        }
    }

    report
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub producer: DriverReport,
    pub consumer: DriverReport,
    pub buffer: BufferStats,
}

impl SessionReport {
    pub fn is_finished(&self) -> bool {
        self.producer.is_finished() && self.consumer.is_finished()
    }
}

/// Runs one producer and one consumer against a fresh buffer until both
/// loops end.
///
/// Cancelling `stop` ends both loops early; their reports then carry
/// [`Outcome::Cancelled`]. Each loop closes the buffer when it returns, so
/// with mismatched iteration counts the side with more work drains what it
/// can and then stops with [`Outcome::Cancelled`] instead of waiting forever.
pub fn run_session(config: &HandoffConfig, stop: &CancelToken) -> Result<SessionReport> {
    config.validate()?;
    let buffer = BoundedBuffer::new(config.capacity)?;
    tracing::info!(
        capacity = config.capacity,
        producer_items = config.producer.iterations,
        consumer_items = config.consumer.iterations,
        "starting handoff session"
    );

    let producer = {
        let buffer = buffer.clone();
        let cancel = stop.clone();
        let driver = config.producer;
        spawn(Role::Producer, move || {
            let buffer = CloseOnDrop(buffer);
            produce_sequence(&buffer.0, &driver, &cancel)
        })?
    };

    let consumer = {
        let buffer = buffer.clone();
        let cancel = stop.clone();
        let driver = config.consumer;
        match spawn(Role::Consumer, move || {
            let buffer = CloseOnDrop(buffer);
            consume_sequence(&buffer.0, &driver, &cancel)
        }) {
            Ok(handle) => handle,
            Err(err) => {
                // Don't leave the producer blocked on a buffer nobody drains.
                stop.cancel();
                let _ = producer.join();
                return Err(err);
            }
        }
    };

    let producer = join(Role::Producer, producer);
    let consumer = join(Role::Consumer, consumer);

    let report = SessionReport {
        producer: producer?,
        consumer: consumer?,
        buffer: buffer.stats(),
    };
    tracing::info!(
        produced = report.buffer.produced,
        consumed = report.buffer.consumed,
        left_in_buffer = report.buffer.len,
        "session finished"
    );
    Ok(report)
}

/// Closes the buffer when a driver thread ends, panics included.
struct CloseOnDrop(BoundedBuffer<i64>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

fn spawn<F>(role: Role, f: F) -> Result<thread::JoinHandle<DriverReport>>
where
    F: FnOnce() -> DriverReport + Send + 'static,
{
    thread::Builder::new()
        .name(role.to_string())
        .spawn(f)
        .map_err(|source| HandoffError::Spawn { role, source })
}

fn join(role: Role, handle: thread::JoinHandle<DriverReport>) -> Result<DriverReport> {
    handle
        .join()
        .map_err(|_| HandoffError::DriverPanicked { role })
}
