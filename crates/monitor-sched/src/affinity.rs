//! # CPU Affinity
//!
//! Pinning a worker thread to a core. Only Linux gets a real
//! implementation, via `sched_setaffinity` — the rest of the pack
//! doesn't carry a Windows/macOS affinity crate, so other targets log
//! and no-op rather than reach for a dependency nothing else uses.
//!
//! Pinning targets a specific OS thread id rather than always "the
//! calling thread", so a running worker can be re-pinned from whatever
//! thread calls `Scheduler::set_cpu_affinity_pattern` (spec.md §4.3:
//! affinity applies "on worker start and on explicit call while
//! running").

#[cfg(target_os = "linux")]
pub fn current_tid() -> i32 {
    unsafe { libc::gettid() }
}

#[cfg(not(target_os = "linux"))]
pub fn current_tid() -> i32 {
    0
}

/// `core_id == None` unbinds: the thread's mask is reset to every CPU
/// the process is allowed to run on, rather than pinned to one.
#[cfg(target_os = "linux")]
pub fn pin_thread(tid: i32, core_id: Option<usize>) {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        match core_id {
            Some(core) => libc::CPU_SET(core, &mut set),
            None => {
                for core in 0..libc::CPU_SETSIZE as usize {
                    libc::CPU_SET(core, &mut set);
                }
            }
        }
        let rc = libc::sched_setaffinity(tid, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            tracing::warn!(tid, ?core_id, "sched_setaffinity failed");
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_thread(tid: i32, core_id: Option<usize>) {
    tracing::debug!(tid, ?core_id, "CPU affinity is not implemented on this platform");
}
