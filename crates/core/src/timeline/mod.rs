/// Accumulated effect time, advanced once per tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickClock {
    pub time_seconds: f32,
    pub ticks: u64,
}

impl TickClock {
    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
        self.ticks = 0;
    }

    /// Advances the clock. Negative deltas are treated as zero.
    pub fn advance(&mut self, delta: f32) -> f32 {
        let delta = delta.max(0.0);
        self.time_seconds += delta;
        self.ticks += 1;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_negative_deltas() {
        let mut clock = TickClock::default();
        clock.advance(0.5);
        assert_eq!(clock.advance(-1.0), 0.0);
        assert_eq!(clock.time_seconds, 0.5);
        assert_eq!(clock.ticks, 2);

        clock.reset();
        assert_eq!(clock.time_seconds, 0.0);
    }
}
