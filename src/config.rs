pub const DEFAULT_BACKLOG_WARN_THRESHOLD: usize = 1024;

/// Configuration for a host or client multiplexer.
#[derive(Clone, Debug)]
pub struct MuxConfig {
    /// Label in log output. Left empty, it becomes `"host"` or `"client"` for the owning multiplexer.
    pub name: String,
    pub origin_filter: bool,
    pub backlog_warn_threshold: Option<usize>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            origin_filter: true,
            backlog_warn_threshold: Some(DEFAULT_BACKLOG_WARN_THRESHOLD),
        }
    }
}

impl MuxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub(crate) fn or_named(mut self, role: &str) -> Self {
        if self.name.is_empty() {
            self.name = role.to_string();
        }
        self
    }

    /// Disable dropping of inbound events from foreign origins in single-target mode.
    pub fn without_origin_filter(mut self) -> Self {
        self.origin_filter = false;
        self
    }

    pub fn with_backlog_warn_threshold(mut self, threshold: usize) -> Self {
        self.backlog_warn_threshold = Some(threshold);
        self
    }

    pub fn without_backlog_warning(mut self) -> Self {
        self.backlog_warn_threshold = None;
        self
    }
}
