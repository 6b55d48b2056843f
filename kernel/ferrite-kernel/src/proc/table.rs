//! The global process table.
//!
//! A fixed array indexed by PID. A slot is occupied exactly while that
//! PID names a live-or-zombie process; reaping clears it. All access
//! goes through the table's spin lock.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use ferrite_core::id::Pid;
use ferrite_core::sync::SpinLock;
use ferrite_core::syscall::Errno;

use super::Process;
use crate::param::{PID_MAX, PID_MIN};

/// Fixed-size PID-indexed table of processes.
pub struct ProcessTable {
    slots: SpinLock<Vec<Option<Arc<Process>>>>,
}

impl ProcessTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            slots: SpinLock::named("proctable", (0..PID_MAX).map(|_| None).collect()),
        }
    }

    /// Allocates the first free PID at or above [`PID_MIN`] and installs
    /// a fresh process there.
    ///
    /// Fails with resource-unavailable when every slot is taken.
    pub fn spawn(&self, name: &str, ppid: Pid) -> Result<Arc<Process>, Errno> {
        let mut slots = self.slots.lock();
        for pid in PID_MIN..PID_MAX {
            if slots[pid as usize].is_none() {
                let proc = Arc::new(Process::new(Pid::new(pid), ppid, name));
                slots[pid as usize] = Some(proc.clone());
                return Ok(proc);
            }
        }
        Err(Errno::Again)
    }

    /// Looks up a process by PID.
    pub fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        if !Self::pid_in_range(pid) {
            return None;
        }
        self.slots.lock()[pid.as_usize()].clone()
    }

    /// Clears the slot for `pid`. Part of reaping.
    pub fn remove(&self, pid: Pid) {
        if Self::pid_in_range(pid) {
            self.slots.lock()[pid.as_usize()] = None;
        }
    }

    /// Returns the number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` when no process exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `pid` indexes the table.
    pub fn pid_in_range(pid: Pid) -> bool {
        (PID_MIN..PID_MAX).contains(&pid.as_u32())
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_start_at_min_and_ascend() {
        let table = ProcessTable::new();
        let a = table.spawn("a", Pid::new(1)).unwrap();
        let b = table.spawn("b", Pid::new(1)).unwrap();
        assert_eq!(a.pid().as_u32(), PID_MIN);
        assert_eq!(b.pid().as_u32(), PID_MIN + 1);
    }

    #[test]
    fn freed_slot_is_reused_first() {
        let table = ProcessTable::new();
        let a = table.spawn("a", Pid::new(1)).unwrap();
        let _b = table.spawn("b", Pid::new(1)).unwrap();

        table.remove(a.pid());
        let c = table.spawn("c", Pid::new(1)).unwrap();
        assert_eq!(c.pid(), a.pid());
    }

    #[test]
    fn lookup_matches_slot() {
        let table = ProcessTable::new();
        let a = table.spawn("a", Pid::new(1)).unwrap();
        let found = table.lookup(a.pid()).unwrap();
        assert_eq!(found.pid(), a.pid());

        assert!(table.lookup(Pid::new(PID_MAX - 1)).is_none());
        assert!(table.lookup(Pid::new(PID_MAX)).is_none());
    }

    #[test]
    fn table_exhaustion() {
        let table = ProcessTable::new();
        for _ in PID_MIN..PID_MAX {
            table.spawn("p", Pid::new(1)).unwrap();
        }
        assert_eq!(
            table.spawn("one-too-many", Pid::new(1)).err(),
            Some(Errno::Again)
        );
    }

    #[test]
    fn remove_clears_slot() {
        let table = ProcessTable::new();
        let a = table.spawn("a", Pid::new(1)).unwrap();
        assert_eq!(table.len(), 1);
        table.remove(a.pid());
        assert!(table.is_empty());
        assert!(table.lookup(a.pid()).is_none());
    }
}
