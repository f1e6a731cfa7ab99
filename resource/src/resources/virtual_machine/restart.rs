use tracing::debug;
use vsphere_store::ResourceData;

/// Whether the pending reconfigure needs the machine powered off, and which
/// fields made it so. Lives for one apply cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartRequirement {
    reasons: Vec<String>,
}

impl RestartRequirement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        debug!(field = %reason, "change requires a restart");
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    /// Require a restart when `key` differs from recorded state.
    pub fn note_change(&mut self, data: &ResourceData, key: &str) {
        if data.has_change(key) {
            self.require(key);
        }
    }

    pub fn is_required(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }
}

/// Classify a CPU count change against the capabilities the machine had
/// before this cycle. Returns the new count and whether a restart is needed.
pub fn classify_cpu(old: i32, new: i32, hot_add: bool, hot_remove: bool) -> (i32, bool) {
    let restart = (new > old && !hot_add) || (new < old && !hot_remove);
    (new, restart)
}

/// Memory can be hot-added but never hot-removed.
pub fn classify_memory(old: i64, new: i64, hot_add: bool) -> (i64, bool) {
    let restart = (new > old && !hot_add) || new < old;
    (new, restart)
}
