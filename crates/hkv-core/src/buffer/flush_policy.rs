//! Flush policy for the write buffer.
//!
//! Two checkpoints exist: a periodic one every `put_check_interval` appended
//! puts, and a final one after the whole put call.

/// Flush policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushPolicy {
    /// Occupancy in bytes above which buffered puts are flushed
    pub write_buffer_size: u64,

    /// Evaluate the periodic checkpoint every this many appended puts
    pub put_check_interval: usize,

    /// Flush at the end of every put call
    pub auto_flush: bool,
}

impl FlushPolicy {
    pub fn new(write_buffer_size: u64, put_check_interval: usize, auto_flush: bool) -> Self {
        Self {
            write_buffer_size,
            put_check_interval: put_check_interval.max(1),
            auto_flush,
        }
    }

    /// Decision at the periodic checkpoint after `appended` puts of the current call.
    pub fn check_periodic(&self, appended: usize, occupancy: u64) -> FlushDecision {
        if appended > 0
            && appended % self.put_check_interval == 0
            && occupancy > self.write_buffer_size
        {
            return FlushDecision::CheckInterval;
        }
        FlushDecision::None
    }

    /// Decision once every put of the call has been appended.
    pub fn check_final(&self, occupancy: u64) -> FlushDecision {
        if self.auto_flush {
            return FlushDecision::AutoFlush;
        }
        if occupancy > self.write_buffer_size {
            return FlushDecision::OverThreshold;
        }
        FlushDecision::None
    }

    /// Whether shrinking the threshold to `size` requires a flush.
    pub fn check_resize(&self, size: u64, occupancy: u64) -> FlushDecision {
        if occupancy > size {
            FlushDecision::OverThreshold
        } else {
            FlushDecision::None
        }
    }
}

/// Flush decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Keep buffering
    None,
    /// Periodic checkpoint found occupancy over the threshold
    CheckInterval,
    /// Occupancy over the threshold at the end of a call or after a resize
    OverThreshold,
    /// Auto-flush is on
    AutoFlush,
}

impl FlushDecision {
    pub fn requires_flush(&self) -> bool {
        !matches!(self, FlushDecision::None)
    }

    /// Short label for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            FlushDecision::None => "none",
            FlushDecision::CheckInterval => "check_interval",
            FlushDecision::OverThreshold => "over_threshold",
            FlushDecision::AutoFlush => "auto_flush",
        }
    }
}
