//! # bounded-handoff
//!
//! A blocking bounded buffer for exactly one producer and one consumer, plus
//! the paced driver loops that exercise it.
//!
//! - [`BoundedBuffer`] - Mutex + Condvar monitor with FIFO `produce`/`consume`
//! - [`CancelToken`] - stop request that interrupts blocked calls and pacing sleeps
//! - [`driver`] - producer/consumer loops and [`run_session`]
//! - [`config`] - TOML-backed workload configuration
//!
//! ```
//! use bounded_handoff::{run_session, CancelToken, DriverConfig, HandoffConfig};
//!
//! let config = HandoffConfig::default()
//!     .with_producer(DriverConfig::unpaced(10))
//!     .with_consumer(DriverConfig::unpaced(10));
//!
//! let report = run_session(&config, &CancelToken::new()).unwrap();
//! assert_eq!(report.consumer.values, (1..=10).collect::<Vec<_>>());
//! ```

pub mod buffer;
pub mod cancel;
pub mod config;
pub mod driver;
pub mod error;
pub mod trace;

pub use buffer::{BoundedBuffer, BufferStats};
pub use cancel::CancelToken;
pub use config::{DriverConfig, HandoffConfig};
pub use driver::{
    consume_sequence, produce_sequence, run_session, DriverReport, Outcome, Role, SessionReport,
};
pub use error::{Cancelled, ConfigError, ConsumeError, HandoffError, ProduceError, Result};
