//! Runtime configuration.

/// Size of one linear memory page in bytes.
pub const PAGE_SIZE: usize = 64 * 1024;

/// Options for a [`Runtime`](crate::Runtime) instance.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Prefix used to name guest-spawned OS threads (`<prefix>-<id>`).
    pub thread_name_prefix: String,

    /// Stack size for guest-spawned threads; `None` uses the platform default.
    pub thread_stack_size: Option<usize>,

    /// Number of pages given to memories created with
    /// [`Runtime::new_memory`](crate::Runtime::new_memory).
    pub default_memory_pages: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "weft-guest".to_string(),
            thread_stack_size: None,
            default_memory_pages: 1,
        }
    }
}

impl RuntimeConfig {
    /// Set the name prefix for spawned threads.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the stack size for spawned threads.
    pub fn with_thread_stack_size(mut self, size: usize) -> Self {
        self.thread_stack_size = Some(size);
        self
    }

    /// Set the default memory size in pages (at least one).
    pub fn with_default_memory_pages(mut self, pages: u32) -> Self {
        self.default_memory_pages = pages.max(1);
        self
    }
}
