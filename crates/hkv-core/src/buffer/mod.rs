//! Write buffering for puts.
//!
//! Puts accumulate in a [`WriteBuffer`] until the [`FlushPolicy`] asks for a
//! flush; the buffer then groups entries per family and reconciles after the
//! caller reports which groups were written.

mod flush_policy;
mod write_buffer;

pub use flush_policy::{FlushDecision, FlushPolicy};
pub use write_buffer::{FamilyGroup, FlushInProgress, WriteBuffer, WriteBufferSettings};
