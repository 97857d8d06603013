//! Generation scheduling
//!
//! A dedicated coordinator thread drives the fixed event sequence of each
//! generation (eight Minor ticks, then one Major tick), hands every event's
//! result to the consumer over a bounded channel and triggers reproduction
//! when a Major tick finds the whole population stalled.
//!
//! ```text
//!   start()                          consumer
//!     │                                 ▲
//!     ▼                                 │ GenerationResult
//! ┌─────────────── coordinator ─────────┴──────┐
//! │ Minor x8 ─► Major ─► (stalled?) reproduce  │
//! │      ▲                        │            │
//! │      └──── stop requested? ◄──┘            │
//! └────────────────────────────────────────────┘
//! ```
//!
//! Stop requests are honoured only at generation boundaries, so every
//! completed run emits a whole number of generations.

pub mod events;
pub mod generation;
pub mod stop;

pub use events::{
    EventKind, GenerationResult, RunId, EVENTS_PER_GENERATION, MINOR_TICKS_PER_GENERATION,
};
pub use generation::{GenerationScheduler, RunSummary, SchedulerState, StopHandle, StopReason};
pub use stop::StopSignal;
