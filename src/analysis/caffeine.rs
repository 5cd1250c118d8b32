//! Scoped idle-sleep inhibition around long-running tests.
//!
//! On macOS the first [`IdleSleepGuard`] starts `caffeinate`; the process is
//! stopped when the last guard is dropped. Elsewhere guards only count
//! holders.

use log::{debug, warn};
use std::process::{Child, Command};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    holders: usize,
    process: Option<Child>,
}

/// Reference-counted sleep inhibitor.
#[derive(Debug)]
pub struct Caffeinator {
    program: Option<(String, Vec<String>)>,
    state: Mutex<State>,
}

impl Default for Caffeinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Caffeinator {
    /// Inhibitor for the current platform.
    pub fn new() -> Self {
        if cfg!(target_os = "macos") {
            Self::with_command("caffeinate", &[])
        } else {
            Self::disabled()
        }
    }

    /// Inhibitor that never starts a process.
    pub fn disabled() -> Self {
        Self {
            program: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Inhibitor running `program` while held.
    pub fn with_command(program: &str, args: &[&str]) -> Self {
        Self {
            program: Some((
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            )),
            state: Mutex::new(State::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.program.is_some()
    }

    /// Number of live guards.
    pub fn holders(&self) -> usize {
        self.lock().holders
    }

    /// Whether the inhibitor process is running.
    pub fn is_active(&self) -> bool {
        self.lock().process.is_some()
    }

    /// Enter the scope; the inhibitor is released when the guard drops.
    pub fn acquire(&self) -> IdleSleepGuard<'_> {
        let mut state = self.lock();
        if state.holders == 0 {
            if let Some((program, args)) = &self.program {
                match Command::new(program).args(args).spawn() {
                    Ok(child) => {
                        debug!("Started {} (pid {})", program, child.id());
                        state.process = Some(child);
                    }
                    Err(e) => warn!("Could not start {}: {}", program, e),
                }
            }
        }
        state.holders += 1;
        IdleSleepGuard { owner: self }
    }

    fn release(&self) {
        let mut state = self.lock();
        state.holders = state.holders.saturating_sub(1);
        if state.holders == 0 {
            if let Some(mut child) = state.process.take() {
                if let Err(e) = child.kill() {
                    warn!("Could not stop sleep inhibitor: {}", e);
                }
                if let Err(e) = child.wait() {
                    warn!("Could not reap sleep inhibitor: {}", e);
                }
                debug!("Stopped sleep inhibitor");
            }
        }
    }

    // a panic while holding the lock leaves the counter consistent
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds idle sleep off for its lifetime.
#[derive(Debug)]
#[must_use = "sleep is only inhibited while the guard is alive"]
pub struct IdleSleepGuard<'a> {
    owner: &'a Caffeinator,
}

impl Drop for IdleSleepGuard<'_> {
    fn drop(&mut self) {
        self.owner.release();
    }
}
