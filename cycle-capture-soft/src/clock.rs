use tokio::time::Instant;

use cycle_capture_core::CycleClock;

/// A cycle clock that advances with tokio's clock.
///
/// Position is `offset + elapsed * cps`; without a tempo it stays at `offset`.
#[derive(Debug, Clone)]
pub struct SoftClock {
    cps: Option<f64>,
    offset: f64,
    origin: Instant,
}

impl SoftClock {
    pub fn new(cps: Option<f64>, offset: f64) -> Self {
        Self {
            cps,
            offset,
            origin: Instant::now(),
        }
    }
}

impl CycleClock for SoftClock {
    fn cps(&self) -> Option<f64> {
        self.cps
    }

    fn now(&self) -> f64 {
        match self.cps {
            Some(cps) => self.offset + self.origin.elapsed().as_secs_f64() * cps,
            None => self.offset,
        }
    }
}
