/// Per-frame clock signal driving every accumulator tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameClock {
    /// Frames completed so far.
    pub frame: u64,
    /// Seconds elapsed during the last frame.
    pub delta: f32,
    /// Seconds elapsed since the clock started.
    pub elapsed: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one frame of `dt` seconds. Negative or NaN deltas count as zero.
    pub fn advance(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.frame += 1;
        self.delta = dt;
        self.elapsed += dt as f64;
    }
}

/// Fixed-rate tick accumulator.
///
/// Variable frame times go in, a whole number of fixed ticks come out.
/// The number of ticks per call is capped so a long stall cannot trigger
/// an unbounded catch-up burst.
#[derive(Debug, Clone)]
pub struct FixedTick {
    rate: f64,
    accumulator: f64,
    max_steps: u32,
}

impl FixedTick {
    /// `hz` ticks per second, at most `max_steps` ticks per `advance`.
    pub fn new(hz: f64, max_steps: u32) -> Self {
        assert!(hz > 0.0, "tick rate must be positive");
        Self {
            rate: 1.0 / hz,
            accumulator: 0.0,
            max_steps: max_steps.max(1),
        }
    }

    /// Length of one tick in seconds.
    pub fn step_seconds(&self) -> f32 {
        self.rate as f32
    }

    /// Feed `dt` seconds and return how many fixed ticks are due.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.max(0.0) as f64;
        let mut steps = 0;
        while self.accumulator >= self.rate && steps < self.max_steps {
            self.accumulator -= self.rate;
            steps += 1;
        }
        if steps == self.max_steps {
            // Drop the backlog rather than spiral.
            self.accumulator = self.accumulator.min(self.rate);
        }
        steps
    }
}
