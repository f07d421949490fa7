use std::fmt;

use crate::clock::FrameClock;

/// Why an accumulator did no work this frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Sampling is switched off.
    Disabled,
    /// No cameras/sensors are registered.
    NoSensors,
    /// A required external resource (kernel, texture, template) is absent.
    MissingCollaborator(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "disabled"),
            SkipReason::NoSensors => write!(f, "no sensors registered"),
            SkipReason::MissingCollaborator(what) => write!(f, "missing collaborator: {what}"),
        }
    }
}

/// Result of one accumulator tick. Never an error: failures degrade to a skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Work was done; `work` is backend-specific (rays cast, dispatches enqueued).
    Accumulated { work: usize },
    Skipped(SkipReason),
}

impl TickOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TickOutcome::Skipped(_))
    }

    pub fn work(&self) -> usize {
        match self {
            TickOutcome::Accumulated { work } => *work,
            TickOutcome::Skipped(_) => 0,
        }
    }
}

/// A coverage accumulation strategy: clear it, feed it one frame at a time.
///
/// The CPU ray-cast grid and the GPU fusion volume are two implementations;
/// they do not share storage. `Input` is whatever the strategy reads from the
/// scene each frame.
pub trait CoverageAccumulator<Input: ?Sized> {
    /// Short human-readable name, used in logs.
    fn label(&self) -> &'static str;

    /// Reset accumulated coverage to zero.
    fn clear(&mut self);

    /// Accumulate one frame.
    fn accumulate(&mut self, input: &Input, clock: &FrameClock) -> TickOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(usize);

    impl CoverageAccumulator<[u32]> for Counter {
        fn label(&self) -> &'static str {
            "counter"
        }

        fn clear(&mut self) {
            self.0 = 0;
        }

        fn accumulate(&mut self, input: &[u32], _clock: &FrameClock) -> TickOutcome {
            if input.is_empty() {
                return TickOutcome::Skipped(SkipReason::NoSensors);
            }
            self.0 += input.len();
            TickOutcome::Accumulated { work: input.len() }
        }
    }

    #[test]
    fn trait_is_usable_with_unsized_input() {
        let mut c = Counter(0);
        let clock = FrameClock::new();
        assert_eq!(c.accumulate(&[1, 2, 3], &clock).work(), 3);
        assert!(c.accumulate(&[], &clock).is_skipped());
        c.clear();
        assert_eq!(c.0, 0);
        assert_eq!(c.label(), "counter");
    }

    #[test]
    fn skip_reason_display() {
        let r = SkipReason::MissingCollaborator("kernel UpdateVoxels".into());
        assert_eq!(r.to_string(), "missing collaborator: kernel UpdateVoxels");
    }
}
