//! Per-runtime shared state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::RuntimeConfig;
use crate::memory::LinearMemory;
use crate::thread::ThreadRegistry;
use crate::wait::WaitListRegistry;

/// One runtime instance: its configuration, the wait lists of all addresses
/// its guests wait on, and the threads its guests spawned.
///
/// Runtimes share nothing with each other, so several can run side by side in
/// one process.
pub struct Runtime {
    config: RuntimeConfig,
    wait_lists: WaitListRegistry,
    threads: ThreadRegistry,
    next_context_id: AtomicU64,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Arc<Self> {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Arc<Self> {
        tracing::debug!(
            thread_name_prefix = %config.thread_name_prefix,
            "creating runtime"
        );
        Arc::new(Self {
            config,
            wait_lists: WaitListRegistry::new(),
            threads: ThreadRegistry::new(),
            next_context_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn wait_lists(&self) -> &WaitListRegistry {
        &self.wait_lists
    }

    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    /// A zeroed memory of the configured default size.
    pub fn new_memory(&self) -> Arc<LinearMemory> {
        Arc::new(LinearMemory::new(self.config.default_memory_pages))
    }

    pub(crate) fn next_context_id(&self) -> u64 {
        self.next_context_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl fmt::Debug for Runtime {
    // Thread records point back at the runtime, so only summaries are printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("wait_lists", &self.wait_lists.len())
            .field("live_threads", &self.threads.live_count())
            .finish()
    }
}
