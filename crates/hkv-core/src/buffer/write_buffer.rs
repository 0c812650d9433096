//! Client-side buffer of pending puts.
//!
//! The buffer only does bookkeeping: it validates and accumulates puts, decides
//! when a flush is due, plans one batch per family and reconciles its contents
//! once the caller reports which groups were written. Sending the batches is
//! the table's job.
//!
//! Occupancy always equals the summed size estimate of the resident entries.

use super::flush_policy::{FlushDecision, FlushPolicy};
use crate::config::TableConfig;
use crate::model::{Cell, Mutation, Put};
use crate::table::translator::check_family_violation;
use crate::{Error, Result};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Settings the buffer is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBufferSettings {
    pub write_buffer_size: u64,
    pub put_check_interval: usize,
    /// Largest accepted cell value in bytes; 0 disables the check
    pub max_value_size: usize,
    pub auto_flush: bool,
    pub clear_on_fail: bool,
}

impl From<&TableConfig> for WriteBufferSettings {
    fn from(config: &TableConfig) -> Self {
        Self {
            write_buffer_size: config.write_buffer_size,
            put_check_interval: config.put_write_buffer_check,
            max_value_size: config.max_key_value_size,
            auto_flush: config.auto_flush,
            clear_on_fail: config.clear_buffer_on_fail,
        }
    }
}

#[derive(Debug, Clone)]
struct BufferedPut {
    put: Put,
    size: u64,
}

/// Buffered puts of one family, with their positions in the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyGroup {
    pub family: Vec<u8>,
    pub positions: Vec<usize>,
    pub cells: Vec<Cell>,
}

/// Pending puts awaiting a flush.
#[derive(Debug)]
pub struct WriteBuffer {
    entries: Vec<BufferedPut>,
    occupancy: u64,
    policy: FlushPolicy,
    max_value_size: usize,
    clear_on_fail: bool,
}

impl WriteBuffer {
    pub fn new(settings: WriteBufferSettings) -> Self {
        Self {
            entries: Vec::new(),
            occupancy: 0,
            policy: FlushPolicy::new(
                settings.write_buffer_size,
                settings.put_check_interval,
                settings.auto_flush,
            ),
            max_value_size: settings.max_value_size,
            clear_on_fail: settings.clear_on_fail,
        }
    }

    /// Check a put before it is buffered.
    pub fn validate(&self, put: &Put) -> Result<()> {
        if put.is_empty() {
            return Err(Error::IllegalArgument("No columns to insert".into()));
        }

        check_family_violation(put.family_cells().keys())?;

        if self.max_value_size > 0 {
            let oversized = put
                .family_cells()
                .values()
                .flatten()
                .any(|cell| cell.value.len() > self.max_value_size);
            if oversized {
                return Err(Error::IllegalArgument(format!(
                    "KeyValue size too large, max_key_value_size={}",
                    self.max_value_size
                )));
            }
        }

        Ok(())
    }

    /// Validate and append a put.
    pub fn append(&mut self, put: Put) -> Result<()> {
        self.validate(&put)?;
        let size = put.heap_size();
        self.occupancy += size;
        self.entries.push(BufferedPut { put, size });
        Ok(())
    }

    /// Decision at the periodic checkpoint after `appended` puts of the current call.
    pub fn check_periodic(&self, appended: usize) -> FlushDecision {
        self.policy.check_periodic(appended, self.occupancy)
    }

    /// Decision at the end of a put call.
    pub fn check_final(&self) -> FlushDecision {
        self.policy.check_final(self.occupancy)
    }

    /// Group buffered puts by family, in family order.
    pub fn plan_flush(&self) -> Vec<FamilyGroup> {
        let mut groups: BTreeMap<&[u8], FamilyGroup> = BTreeMap::new();
        for (position, entry) in self.entries.iter().enumerate() {
            for (family, cells) in entry.put.family_cells() {
                let group = groups
                    .entry(family.as_slice())
                    .or_insert_with(|| FamilyGroup {
                        family: family.clone(),
                        positions: Vec::new(),
                        cells: Vec::new(),
                    });
                group.positions.push(position);
                group.cells.extend(cells.iter().cloned());
            }
        }
        groups.into_values().collect()
    }

    /// Start a flush of the current contents.
    ///
    /// The returned [`FlushInProgress`] records which family groups were
    /// written. Dropping it before [`finish`](FlushInProgress::finish) still
    /// removes the written entries, so a cancelled flush never resends them.
    pub fn begin_flush(&mut self) -> FlushInProgress<'_> {
        let groups = self.plan_flush();
        let succeeded = vec![false; self.entries.len()];
        FlushInProgress {
            buffer: self,
            groups,
            succeeded,
            finished: false,
        }
    }

    /// Resolve a flush attempt.
    ///
    /// `succeeded` is parallel to the buffer at flush time. Succeeded entries
    /// are removed in order; with clear-on-fail the failed ones go too.
    pub fn reconcile(&mut self, succeeded: &[bool]) {
        if self.clear_on_fail {
            let dropped = succeeded.iter().filter(|ok| !**ok).count();
            if dropped > 0 {
                debug!(dropped, "Discarding failed puts from write buffer");
            }
            self.entries.clear();
            self.occupancy = 0;
            return;
        }
        self.remove_written(succeeded);
    }

    /// Remove the entries marked in `succeeded`, keeping everything else.
    fn remove_written(&mut self, succeeded: &[bool]) {
        let mut position = 0;
        self.entries.retain(|_| {
            let keep = !succeeded.get(position).copied().unwrap_or(false);
            position += 1;
            keep
        });
        self.occupancy = self.entries.iter().map(|e| e.size).sum();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summed size estimate of the buffered puts.
    pub fn occupancy(&self) -> u64 {
        self.occupancy
    }

    /// Buffered puts in insertion order.
    pub fn puts(&self) -> impl Iterator<Item = &Put> {
        self.entries.iter().map(|e| &e.put)
    }

    pub fn write_buffer_size(&self) -> u64 {
        self.policy.write_buffer_size
    }

    /// Change the threshold; returns whether the current contents must be flushed.
    pub fn set_write_buffer_size(&mut self, size: u64) -> FlushDecision {
        let decision = self.policy.check_resize(size, self.occupancy);
        self.policy.write_buffer_size = size;
        decision
    }

    pub fn is_auto_flush(&self) -> bool {
        self.policy.auto_flush
    }

    pub fn clear_on_fail(&self) -> bool {
        self.clear_on_fail
    }

    /// Turning auto-flush on always implies clear-on-fail.
    pub fn set_auto_flush(&mut self, auto_flush: bool, clear_on_fail: bool) {
        self.policy.auto_flush = auto_flush;
        self.clear_on_fail = auto_flush || clear_on_fail;
    }
}

/// A flush that is being sent, one family group at a time.
#[derive(Debug)]
pub struct FlushInProgress<'a> {
    buffer: &'a mut WriteBuffer,
    groups: Vec<FamilyGroup>,
    succeeded: Vec<bool>,
    finished: bool,
}

impl FlushInProgress<'_> {
    /// Groups to send, in family order.
    pub fn take_groups(&mut self) -> Vec<FamilyGroup> {
        std::mem::take(&mut self.groups)
    }

    /// Record that every entry of `group` was written.
    pub fn mark_written(&mut self, group: &FamilyGroup) {
        for position in &group.positions {
            if let Some(slot) = self.succeeded.get_mut(*position) {
                *slot = true;
            }
        }
    }

    /// Reconcile the buffer with the outcome of every group.
    pub fn finish(mut self) {
        self.finished = true;
        self.buffer.reconcile(&self.succeeded);
    }
}

impl Drop for FlushInProgress<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let written = self.succeeded.iter().filter(|ok| **ok).count();
        warn!(
            written,
            pending = self.succeeded.len() - written,
            "Flush abandoned, keeping unwritten puts"
        );
        self.buffer.remove_written(&self.succeeded);
    }
}
