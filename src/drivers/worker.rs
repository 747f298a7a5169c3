//! Named worker thread spawning.
//!
//! Every background activity in the agent (connection loop, edge
//! dispatcher, schedule poller, action sequences, pulse timers, input
//! sampler) runs on its own named OS thread so it shows up in `top -H`
//! and in panic messages.  Stack sizes are explicit per call site.

use std::io;
use std::thread::{Builder, JoinHandle};

/// Spawn a named thread with an explicit stack size.
///
/// Unlike `std::thread::spawn`, a failure to create the thread is
/// returned to the caller instead of panicking.
pub fn spawn_worker<F, T>(name: &str, stack_kb: usize, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    log::debug!("Spawning '{}' (stack={}KB)", name, stack_kb);
    Builder::new()
        .name(name.into())
        .stack_size(stack_kb * 1024)
        .spawn(f)
}
