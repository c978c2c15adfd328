// =============================================================================
// politeness.rs — THE RATE GATE
// =============================================================================
//
// ESAJ is a shared public service with real users behind it. Everything we
// send goes through this gate, which enforces a minimum spacing between
// consecutive requests — globally, not per component, and after failures as
// much as after successes. A case that blew up mid-fetch does not earn the
// next case a head start.
//
// The gate is an explicit object owned by the driver and awaited before each
// network-issuing step. Components never sleep on their own; that keeps the
// locator and fetcher testable without timing side effects (hand the tests a
// zero-delay gate and they run at full speed).
// =============================================================================

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Global minimum-spacing gate for outbound requests.
///
/// `pause()` returns only once at least `min_delay` has elapsed since the
/// previous `pause()` returned. Callers are serialized through the mutex,
/// so the spacing guarantee holds globally even if the pipeline ever grows
/// concurrent workers.
pub struct PolitenessGate {
    min_delay: Duration,
    last_release: Mutex<Option<Instant>>,
}

impl PolitenessGate {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_release: Mutex::new(None),
        }
    }

    /// Wait until the next request is allowed, then claim the slot.
    pub async fn pause(&self) {
        let mut last = self.last_release.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                let wait = self.min_delay - elapsed;
                trace!(wait_ms = wait.as_millis() as u64, "politeness gate: pausing");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_delay_gate_never_blocks() {
        let gate = PolitenessGate::new(Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            gate.pause().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_gate_enforces_minimum_spacing() {
        let gate = PolitenessGate::new(Duration::from_millis(30));
        gate.pause().await;
        let start = Instant::now();
        gate.pause().await;
        gate.pause().await;
        // Two subsequent slots must be at least 2 * 30ms after the first.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_first_pause_is_immediate() {
        let gate = PolitenessGate::new(Duration::from_secs(60));
        let start = Instant::now();
        gate.pause().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
