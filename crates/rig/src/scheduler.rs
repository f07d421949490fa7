/// Debounces rebuild requests onto the next idle frame.
///
/// A request raises a pending flag and arms a single queued task,
/// replacing any task already queued. When the task runs it fires only if
/// the flag is still raised. However many requests arrive between two idle
/// frames, at most one rebuild happens.
#[derive(Debug, Clone, Default)]
pub struct RebuildScheduler {
    pending: bool,
    queued: bool,
    requests: u64,
    runs: u64,
}

impl RebuildScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a rebuild on the next idle frame.
    pub fn request(&mut self) {
        self.pending = true;
        self.queued = true;
        self.requests += 1;
        tracing::trace!(requests = self.requests, "rebuild requested");
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Forget the pending rebuild, e.g. when the owner goes away.
    pub fn cancel(&mut self) {
        self.pending = false;
        self.queued = false;
    }

    /// Consume the queued task. True if a rebuild should run now.
    pub fn take_due(&mut self) -> bool {
        if !std::mem::take(&mut self.queued) {
            return false;
        }
        if std::mem::take(&mut self.pending) {
            self.runs += 1;
            true
        } else {
            false
        }
    }

    /// Run `rebuild` if one is due. Returns whether it ran.
    pub fn run_idle(&mut self, rebuild: impl FnOnce()) -> bool {
        let due = self.take_due();
        if due {
            rebuild();
        }
        due
    }

    /// Requests received so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Rebuilds actually run so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }
}
