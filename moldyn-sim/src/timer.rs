use std::time::Instant;

/// Wall-clock totals of the major run phases, in seconds
#[derive(Clone, Debug, Default)]
pub struct Timer {
    pub total: f64,
    pub force: f64,
    pub neigh: f64,
    pub comm: f64,
}

impl Timer {
    pub fn new() -> Timer {
        Timer::default()
    }

    /// Runs a closure and adds its wall time to one of the phase counters
    pub fn stamp<R>(slot: &mut f64, body: impl FnOnce() -> R) -> R {
        let started = Instant::now();
        let out = body();
        *slot += started.elapsed().as_secs_f64();
        out
    }

    /// Time not covered by the three phase counters
    pub fn other(&self) -> f64 {
        self.total - self.force - self.neigh - self.comm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_accumulates_test() {
        let mut timer = Timer::new();
        let out = Timer::stamp(&mut timer.force, || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            42
        });
        assert_eq!(out, 42);
        assert!(timer.force > 0.0);
        Timer::stamp(&mut timer.force, || {});
        assert!(timer.force >= 0.005);
    }
}
