//! Named process registration and lookup.
//!
//! Processes can register under a name and be addressed by that name in
//! `send`. The mapping is a bijection between live names and live pids.
//!
//! ## Semantics
//!
//! - A name belongs to at most one process.
//! - A process holds at most one name.
//! - When a process exits its name is removed.

use rustc_hash::FxHashMap;

use super::process::Pid;
use crate::error::RuntimeError;

// ---------------------------------------------------------------------------
// ProcessRegistry
// ---------------------------------------------------------------------------

/// Name registry owned by a `ProcessSystem`.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    /// name -> PID mapping
    names: FxHashMap<String, Pid>,
    /// PID -> name reverse index for cleanup on process exit
    pid_names: FxHashMap<Pid, String>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        ProcessRegistry::default()
    }

    /// Register `pid` under `name`.
    ///
    /// Fails with `NameTaken` if another process owns the name and with
    /// `AlreadyRegistered` if `pid` already has a name.
    pub fn register(&mut self, name: &str, pid: Pid) -> Result<(), RuntimeError> {
        if let Some(&owner) = self.names.get(name) {
            return Err(RuntimeError::NameTaken {
                name: name.to_string(),
                pid: owner,
            });
        }
        if let Some(existing) = self.pid_names.get(&pid) {
            return Err(RuntimeError::AlreadyRegistered {
                name: existing.clone(),
                pid,
            });
        }

        self.names.insert(name.to_string(), pid);
        self.pid_names.insert(pid, name.to_string());
        Ok(())
    }

    pub fn whereis(&self, name: &str) -> Option<Pid> {
        self.names.get(name).copied()
    }

    /// The name `pid` is registered under, if any.
    pub fn name_of(&self, pid: Pid) -> Option<&str> {
        self.pid_names.get(&pid).map(String::as_str)
    }

    /// Unregister a name. Returns `false` if it was not registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.names.remove(name) {
            Some(pid) => {
                self.pid_names.remove(&pid);
                true
            }
            None => false,
        }
    }

    /// Drop the registration of an exiting process.
    pub fn cleanup_process(&mut self, pid: Pid) {
        if let Some(name) = self.pid_names.remove(&pid) {
            self.names.remove(&name);
        }
    }

    /// All registered names, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
