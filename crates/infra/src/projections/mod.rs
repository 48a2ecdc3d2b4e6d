//! Read-model projections (CQRS read side).
//!
//! Each projection consumes committed event envelopes and maintains a
//! disposable read model. Cursors per stream make application idempotent
//! under at-least-once delivery, and every projection can be rebuilt from
//! scratch by replaying the store.

pub mod billing;
pub mod submissions;
