/// The pattern engine's musical clock.
pub trait CycleClock: Send + Sync {
    /// Cycles per second, if the engine has a tempo set.
    fn cps(&self) -> Option<f64>;

    /// Current position in cycles (fractional).
    fn now(&self) -> f64;
}

/// A clock frozen at one position. Useful for hosts that sample the engine's
/// clock once and for tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedClock {
    pub cps: Option<f64>,
    pub position: f64,
}

impl FixedClock {
    pub fn new(cps: Option<f64>, position: f64) -> Self {
        Self { cps, position }
    }
}

impl CycleClock for FixedClock {
    fn cps(&self) -> Option<f64> {
        self.cps
    }

    fn now(&self) -> f64 {
        self.position
    }
}
