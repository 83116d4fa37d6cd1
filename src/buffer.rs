//! Fixed-capacity FIFO shared by one producer and one consumer.
//!
//! The buffer is a monitor: one `Mutex` guards the queue and two condition
//! variables signal the two conditions a caller can wait for.
//!
//! ```text
//!   produce ──► [ not_full ]  items: VecDeque<T>  [ not_empty ] ──► consume
//!               waits while len == capacity       waits while len == 0
//! ```
//!
//! Every wait re-checks its condition under the lock after waking, so
//! spurious wakeups are harmless and no signal can be lost between the check
//! and the wait.
//!
//! A side that is done calls [`BoundedBuffer::close`]. Values already
//! buffered can still be consumed; after that, both sides get a `Closed`
//! error instead of waiting for a peer that will never act.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use crate::cancel::{CancelToken, Interrupt};
use crate::error::{ConfigError, ConsumeError, ProduceError};

/// Locks `mutex`, recovering the guard if a previous holder panicked.
///
/// No critical section in this crate can leave its data half-updated, so the
/// poisoned state is still consistent.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Point-in-time view of the buffer's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    pub capacity: usize,
    pub len: usize,
    /// Total values accepted by `produce`/`try_produce`.
    pub produced: u64,
    /// Total values removed by `consume`/`try_consume`.
    pub consumed: u64,
    /// Largest `len` observed since construction.
    pub high_water: usize,
}

struct State<T> {
    items: VecDeque<T>,
    produced: u64,
    consumed: u64,
    high_water: usize,
    closed: bool,
}

impl<T> State<T> {
    fn push(&mut self, value: T) {
        self.items.push_back(value);
        self.produced += 1;
        self.high_water = self.high_water.max(self.items.len());
    }

    fn pop(&mut self) -> Option<T> {
        let value = self.items.pop_front()?;
        self.consumed += 1;
        Some(value)
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T: Send> Interrupt for Shared<T> {
    fn interrupt(&self) {
        // Holding the lock orders this wakeup after any in-progress
        // check-then-wait in produce/consume.
        let _state = lock(&self.state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

/// Blocking bounded buffer for a single producer and a single consumer.
///
/// Cloning yields another handle to the same buffer.
///
/// # Example
///
/// ```
/// use bounded_handoff::{BoundedBuffer, CancelToken};
///
/// let buffer = BoundedBuffer::new(2).unwrap();
/// let token = CancelToken::new();
///
/// buffer.produce(1, &token).unwrap();
/// buffer.produce(2, &token).unwrap();
/// assert!(buffer.is_full());
///
/// assert_eq!(buffer.consume(&token), Ok(1));
/// assert_eq!(buffer.consume(&token), Ok(2));
/// ```
pub struct BoundedBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    ///
    /// A zero capacity is rejected with [`ConfigError::ZeroCapacity`].
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    produced: 0,
                    consumed: 0,
                    high_water: 0,
                    closed: false,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.shared.capacity
    }

    /// Marks the buffer closed and wakes any blocked call. Idempotent.
    ///
    /// Later `produce` calls fail with [`ProduceError::Closed`]; `consume`
    /// keeps returning buffered values and fails with
    /// [`ConsumeError::Closed`] once none are left.
    pub fn close(&self) {
        let mut state = lock(&self.shared.state);
        if !state.closed {
            state.closed = true;
            self.shared.not_full.notify_all();
            self.shared.not_empty.notify_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.shared.state).closed
    }

    pub fn stats(&self) -> BufferStats {
        let state = lock(&self.shared.state);
        BufferStats {
            capacity: self.shared.capacity,
            len: state.items.len(),
            produced: state.produced,
            consumed: state.consumed,
            high_water: state.high_water,
        }
    }

    /// Appends `value` if there is room, without blocking.
    pub fn try_produce(&self, value: T) -> Result<(), ProduceError<T>> {
        let mut state = lock(&self.shared.state);
        if state.closed {
            return Err(ProduceError::Closed(value));
        }
        if state.items.len() == self.shared.capacity {
            return Err(ProduceError::Full(value));
        }
        state.push(value);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest value if there is one, without blocking.
    pub fn try_consume(&self) -> Result<T, ConsumeError> {
        let mut state = lock(&self.shared.state);
        let value = match state.pop() {
            Some(value) => value,
            None if state.closed => return Err(ConsumeError::Closed),
            None => return Err(ConsumeError::Empty),
        };
        self.shared.not_full.notify_one();
        Ok(value)
    }
}

impl<T: Send + 'static> BoundedBuffer<T> {
    fn waker(&self) -> Weak<dyn Interrupt> {
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        weak
    }

    /// Appends `value`, blocking while the buffer is full.
    ///
    /// If `cancel` fires while waiting, the value is handed back in
    /// [`ProduceError::Cancelled`] and the buffer is left untouched. A call
    /// that finds room completes even when the token is already cancelled.
    /// A closed buffer rejects the value with [`ProduceError::Closed`].
    pub fn produce(&self, value: T, cancel: &CancelToken) -> Result<(), ProduceError<T>> {
        let shared = &*self.shared;
        let mut state = lock(&shared.state);
        if state.closed {
            return Err(ProduceError::Closed(value));
        }

        if state.items.len() == shared.capacity {
            let _registration = cancel.register(self.waker());
            while state.items.len() == shared.capacity {
                if state.closed {
                    return Err(ProduceError::Closed(value));
                }
                if cancel.is_cancelled() {
                    tracing::trace!("produce cancelled on full buffer");
                    return Err(ProduceError::Cancelled(value));
                }
                tracing::trace!(capacity = shared.capacity, "buffer full, producer waiting");
                state = shared
                    .not_full
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        state.push(value);
        shared.not_empty.notify_one();
        Ok(())
    }

    /// Removes and returns the oldest value, blocking while the buffer is
    /// empty.
    ///
    /// If `cancel` fires while waiting, returns [`ConsumeError::Cancelled`]
    /// and the buffer is left untouched. Once the buffer is closed and
    /// drained, returns [`ConsumeError::Closed`].
    pub fn consume(&self, cancel: &CancelToken) -> Result<T, ConsumeError> {
        let shared = &*self.shared;
        let mut state = lock(&shared.state);

        if state.items.is_empty() {
            let _registration = cancel.register(self.waker());
            while state.items.is_empty() {
                if state.closed {
                    return Err(ConsumeError::Closed);
                }
                if cancel.is_cancelled() {
                    tracing::trace!("consume cancelled on empty buffer");
                    return Err(ConsumeError::Cancelled);
                }
                tracing::trace!("buffer empty, consumer waiting");
                state = shared
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        let value = state.pop().ok_or(ConsumeError::Empty)?;
        shared.not_full.notify_one();
        Ok(value)
    }
}

impl<T> std::fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("BoundedBuffer")
            .field("capacity", &stats.capacity)
            .field("len", &stats.len)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    const BLOCKED: Duration = Duration::from_millis(100);
    const PROMPT: Duration = Duration::from_secs(5);

    #[test]
    fn test_zero_capacity_rejected() {
        let result = BoundedBuffer::<i32>::new(0);
        assert!(matches!(result, Err(ConfigError::ZeroCapacity)));
    }

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer = BoundedBuffer::<i32>::new(3).unwrap();
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_fifo_single_thread() {
        let buffer = BoundedBuffer::new(3).unwrap();
        let token = CancelToken::new();
        for i in 1..=3 {
            buffer.produce(i, &token).unwrap();
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.consume(&token), Ok(1));
        buffer.produce(4, &token).unwrap();
        assert_eq!(buffer.consume(&token), Ok(2));
        assert_eq!(buffer.consume(&token), Ok(3));
        assert_eq!(buffer.consume(&token), Ok(4));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_try_variants_never_block() {
        let buffer = BoundedBuffer::new(1).unwrap();
        assert_eq!(buffer.try_consume(), Err(ConsumeError::Empty));
        assert!(buffer.try_produce("a").is_ok());
        let err = buffer.try_produce("b").unwrap_err();
        assert!(matches!(err, ProduceError::Full("b")));
        assert_eq!(buffer.try_consume(), Ok("a"));
    }

    #[test]
    fn test_stats_track_counters() {
        let buffer = BoundedBuffer::new(4).unwrap();
        let token = CancelToken::new();
        for i in 0..3 {
            buffer.produce(i, &token).unwrap();
        }
        buffer.consume(&token).unwrap();

        let stats = buffer.stats();
        assert_eq!(
            stats,
            BufferStats {
                capacity: 4,
                len: 2,
                produced: 3,
                consumed: 1,
                high_water: 3,
            }
        );
    }

    #[test]
    fn test_ready_call_succeeds_on_cancelled_token() {
        let buffer = BoundedBuffer::new(1).unwrap();
        let token = CancelToken::new();
        token.cancel();
        buffer.produce(7, &token).unwrap();
        assert_eq!(buffer.consume(&token), Ok(7));
    }

    #[test]
    fn test_fifo_across_threads() {
        let buffer = BoundedBuffer::new(5).unwrap();
        let producer_buffer = buffer.clone();
        let token = CancelToken::new();
        let producer_token = token.clone();

        let producer = thread::spawn(move || {
            for i in 1..=10 {
                producer_buffer.produce(i, &producer_token).unwrap();
            }
        });

        let received: Vec<i32> = (0..10).map(|_| buffer.consume(&token).unwrap()).collect();
        producer.join().unwrap();

        assert_eq!(received, (1..=10).collect::<Vec<_>>());
        let stats = buffer.stats();
        assert_eq!(stats.produced, 10);
        assert_eq!(stats.consumed, 10);
        assert_eq!(stats.len, 0);
    }

    #[test]
    fn test_blocked_produce_completes_after_consume() {
        let buffer = BoundedBuffer::new(2).unwrap();
        let token = CancelToken::new();
        buffer.produce(1, &token).unwrap();
        buffer.produce(2, &token).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer_buffer = buffer.clone();
        let producer_token = token.clone();
        let producer = thread::spawn(move || {
            producer_buffer.produce(3, &producer_token).unwrap();
            done_tx.send(()).unwrap();
        });

        // Still blocked: the buffer is full.
        assert!(done_rx.recv_timeout(BLOCKED).is_err());
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.consume(&token), Ok(1));
        assert!(done_rx.recv_timeout(PROMPT).is_ok());
        producer.join().unwrap();

        assert_eq!(buffer.consume(&token), Ok(2));
        assert_eq!(buffer.consume(&token), Ok(3));
    }

    #[test]
    fn test_blocked_consume_completes_after_produce() {
        let buffer = BoundedBuffer::new(2).unwrap();
        let token = CancelToken::new();

        let consumer_buffer = buffer.clone();
        let consumer_token = token.clone();
        let consumer = thread::spawn(move || consumer_buffer.consume(&consumer_token));

        thread::sleep(BLOCKED);
        assert!(!consumer.is_finished());

        buffer.produce(99, &token).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(99));
    }

    #[test]
    fn test_capacity_one_is_strict_handoff() {
        let buffer = BoundedBuffer::new(1).unwrap();
        let token = CancelToken::new();
        buffer.produce(1, &token).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer_buffer = buffer.clone();
        let producer_token = token.clone();
        let producer = thread::spawn(move || {
            producer_buffer.produce(2, &producer_token).unwrap();
            done_tx.send(()).unwrap();
        });

        assert!(done_rx.recv_timeout(BLOCKED).is_err());
        assert_eq!(buffer.stats().high_water, 1);

        assert_eq!(buffer.consume(&token), Ok(1));
        done_rx.recv_timeout(PROMPT).unwrap();
        producer.join().unwrap();
        assert_eq!(buffer.consume(&token), Ok(2));
        assert_eq!(buffer.stats().high_water, 1);
    }

    #[test]
    fn test_cancel_blocked_consume() {
        let buffer = BoundedBuffer::<i32>::new(3).unwrap();
        let token = CancelToken::new();

        let consumer_buffer = buffer.clone();
        let consumer_token = token.clone();
        let consumer = thread::spawn(move || consumer_buffer.consume(&consumer_token));

        thread::sleep(BLOCKED);
        let start = Instant::now();
        token.cancel();

        assert_eq!(consumer.join().unwrap(), Err(ConsumeError::Cancelled));
        assert!(start.elapsed() < PROMPT);
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.stats().consumed, 0);
    }

    #[test]
    fn test_cancel_blocked_produce_returns_value() {
        let buffer = BoundedBuffer::new(1).unwrap();
        let token = CancelToken::new();
        buffer.produce(String::from("first"), &token).unwrap();

        let producer_buffer = buffer.clone();
        let producer_token = token.clone();
        let producer =
            thread::spawn(move || producer_buffer.produce(String::from("second"), &producer_token));

        thread::sleep(BLOCKED);
        token.cancel();

        let err = producer.join().unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.into_inner(), "second");

        let stats = buffer.stats();
        assert_eq!(stats.len, 1);
        assert_eq!(stats.produced, 1);
        assert_eq!(buffer.try_consume().as_deref(), Ok("first"));
    }

    #[test]
    fn test_cancel_one_side_leaves_other_token_alone() {
        let buffer = BoundedBuffer::<u8>::new(1).unwrap();
        let consumer_token = CancelToken::new();
        let other = CancelToken::new();

        let consumer_buffer = buffer.clone();
        let token = consumer_token.clone();
        let consumer = thread::spawn(move || consumer_buffer.consume(&token));

        thread::sleep(BLOCKED);
        other.cancel();
        thread::sleep(BLOCKED);
        assert!(!consumer.is_finished());

        buffer.produce(5, &other).unwrap();
        assert_eq!(consumer.join().unwrap(), Ok(5));
    }

    #[test]
    fn test_stress_capacity_bound_and_order() {
        const ITEMS: u64 = 20_000;

        for capacity in [1, 2, 7, 64] {
            let buffer = BoundedBuffer::new(capacity).unwrap();
            let token = CancelToken::new();

            let producer_buffer = buffer.clone();
            let producer_token = token.clone();
            let producer = thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for i in 0..ITEMS {
                    producer_buffer.produce(i, &producer_token).unwrap();
                    if rng.gen_ratio(1, 500) {
                        thread::yield_now();
                    }
                    assert!(producer_buffer.len() <= capacity);
                }
            });

            let mut rng = rand::thread_rng();
            for expected in 0..ITEMS {
                assert_eq!(buffer.consume(&token), Ok(expected));
                if rng.gen_ratio(1, 500) {
                    thread::yield_now();
                }
            }
            producer.join().unwrap();

            let stats = buffer.stats();
            assert!(stats.high_water <= capacity);
            assert_eq!(stats.produced, ITEMS);
            assert_eq!(stats.consumed, ITEMS);
            assert_eq!(stats.len, 0);
        }
    }

    #[test]
    fn test_close_lets_consumer_drain_then_stops_it() {
        let buffer = BoundedBuffer::new(3).unwrap();
        let token = CancelToken::new();
        buffer.produce(1, &token).unwrap();
        buffer.produce(2, &token).unwrap();
        buffer.close();
        buffer.close();

        assert!(buffer.is_closed());
        assert_eq!(buffer.produce(3, &token).unwrap_err().into_inner(), 3);
        assert_eq!(buffer.consume(&token), Ok(1));
        assert_eq!(buffer.try_consume(), Ok(2));
        assert_eq!(buffer.consume(&token), Err(ConsumeError::Closed));
        assert_eq!(buffer.try_consume(), Err(ConsumeError::Closed));
        assert!(matches!(buffer.try_produce(4), Err(ProduceError::Closed(4))));
        assert_eq!(buffer.stats().produced, 2);
    }

    #[test]
    fn test_close_wakes_blocked_consume() {
        let buffer = BoundedBuffer::<i32>::new(2).unwrap();
        let consumer_buffer = buffer.clone();
        let consumer = thread::spawn(move || consumer_buffer.consume(&CancelToken::new()));

        thread::sleep(BLOCKED);
        assert!(!consumer.is_finished());
        buffer.close();

        assert_eq!(consumer.join().unwrap(), Err(ConsumeError::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_produce() {
        let buffer = BoundedBuffer::new(1).unwrap();
        buffer.try_produce(1).unwrap();
        let producer_buffer = buffer.clone();
        let producer = thread::spawn(move || producer_buffer.produce(2, &CancelToken::new()));

        thread::sleep(BLOCKED);
        assert!(!producer.is_finished());
        buffer.close();

        let err = producer.join().unwrap().unwrap_err();
        assert!(matches!(err, ProduceError::Closed(2)));
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_debug_shows_capacity_and_len() {
        let buffer = BoundedBuffer::new(2).unwrap();
        buffer.try_produce(1u8).unwrap();
        assert_eq!(format!("{:?}", buffer), "BoundedBuffer { capacity: 2, len: 1 }");
    }
}
