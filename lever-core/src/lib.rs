//! lever-core: arm-selection lifecycle for a multi-armed bandit service
//!
//! - **Strategies** - [`EpsilonGreedy`] and [`ThompsonSampling`] behind the [`Strategy`] trait
//! - **Record store** - [`RecordStore`], the durable log and the only atomicity boundary
//! - **Expiry index** - [`ExpiryIndex`], pending ids ordered by creation time
//! - **Coordinator** - [`Coordinator`] ties select, resolve, sweep and stats together
//! - **Scheduler** - [`SweepScheduler`] runs the sweep periodically
//!
//! # Lifecycle
//!
//! ```text
//!   select ──► PENDING ──resolve(client)──► RESOLVED
//!                 │                            ▲
//!                 └────── sweep (reward 0) ────┘
//! ```

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod index;
pub mod memory;
pub mod scheduler;
pub mod store;
pub mod strategy;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{Coordinator, RecoveryReport, Stats, SweepReport};
pub use error::{BoxError, Error, Result};
pub use index::{DEFAULT_NAMESPACE, ExpiryIndex};
pub use memory::{MemoryExpiryIndex, MemoryRecordStore};
pub use scheduler::SweepScheduler;
pub use store::{RecordStore, SelectionStream};
pub use strategy::{EpsilonGreedy, Strategy, StrategyKind, StrategySnapshot, ThompsonSampling};
pub use types::{Origin, Selection, SelectionId, SelectionStatus};
