//! Per-chunk simulation progress.

use parking_lot::RwLock;

#[derive(Debug, Default)]
struct ProgressInner {
    done: Vec<u32>,
    caps: Vec<u32>,
}

/// One slot per chunk, bumped each simulated hour, read by the UI.
///
/// The handle is created before the run and configured once the chunk
/// layout is known.
#[derive(Debug, Default)]
pub struct SimulationProgress {
    inner: RwLock<ProgressInner>,
}

impl SimulationProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate slots for `chunk_hours[i]` simulated hours per chunk.
    pub fn configure(&self, chunk_hours: Vec<u32>) {
        *self.inner.write() = ProgressInner {
            done: vec![0; chunk_hours.len()],
            caps: chunk_hours,
        };
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.read().caps.len()
    }

    /// Record that chunk `index` finished another simulated hour.
    pub fn bump(&self, index: usize) {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.done.get_mut(index) {
            *slot += 1;
        }
    }

    /// Completed fraction in `[0, 1]` over all chunks.
    pub fn fraction(&self) -> f64 {
        let inner = self.inner.read();
        let total: u32 = inner.caps.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let done: u32 = inner
            .done
            .iter()
            .zip(&inner.caps)
            .map(|(&done, &cap)| done.min(cap))
            .sum();
        done as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        let progress = SimulationProgress::new();
        assert_eq!(progress.fraction(), 0.0);

        progress.configure(vec![10, 30]);
        for _ in 0..10 {
            progress.bump(0);
        }
        assert_eq!(progress.fraction(), 0.25);

        for _ in 0..40 {
            progress.bump(1); // over-bumps clamp at the cap
        }
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_unconfigured() {
        let progress = SimulationProgress::new();
        progress.bump(0); // out of range is a no-op
        assert_eq!(progress.fraction(), 0.0);
    }
}
