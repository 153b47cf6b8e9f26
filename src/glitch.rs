//! Time-boxed glitch post-effect toggle.

use std::time::Duration;

/// Glitch effect state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlitchState {
    Idle,
    /// Enabled until the clock reaches `until`
    Active { until: Duration },
}

/// Idle/active state machine polled once per tick
///
/// A trigger while active restarts the deadline from the new trigger time, so
/// beats closer together than `duration` keep the effect on continuously.
#[derive(Debug, Clone)]
pub struct GlitchEffect {
    state: GlitchState,
    duration: Duration,
    triggers: u32,
}

impl GlitchEffect {
    pub fn new(duration: Duration) -> Self {
        Self {
            state: GlitchState::Idle,
            duration,
            triggers: 0,
        }
    }

    /// Enable (or keep enabled) for `duration` from `now`
    pub fn trigger(&mut self, now: Duration) {
        self.state = GlitchState::Active {
            until: now + self.duration,
        };
        self.triggers = self.triggers.wrapping_add(1);
    }

    /// Expire the deadline if it has passed; returns whether the effect is on
    pub fn poll(&mut self, now: Duration) -> bool {
        if let GlitchState::Active { until } = self.state {
            if now >= until {
                self.state = GlitchState::Idle;
            }
        }
        self.is_enabled()
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, GlitchState::Active { .. })
    }

    pub fn state(&self) -> GlitchState {
        self.state
    }

    /// Number of triggers so far (seeds the shader's slice pattern)
    pub fn trigger_count(&self) -> u32 {
        self.triggers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_starts_idle() {
        let mut glitch = GlitchEffect::new(ms(100));
        assert_eq!(glitch.state(), GlitchState::Idle);
        assert!(!glitch.poll(ms(0)));
    }

    #[test]
    fn test_active_for_duration() {
        let mut glitch = GlitchEffect::new(ms(100));
        glitch.trigger(ms(1000));

        assert!(glitch.poll(ms(1000)));
        assert!(glitch.poll(ms(1099)));
        assert!(!glitch.poll(ms(1100)));
        assert_eq!(glitch.state(), GlitchState::Idle);
    }

    #[test]
    fn test_retrigger_restarts_deadline() {
        let mut glitch = GlitchEffect::new(ms(100));
        glitch.trigger(ms(0));
        assert!(glitch.poll(ms(60)));

        glitch.trigger(ms(80));
        assert_eq!(glitch.state(), GlitchState::Active { until: ms(180) });

        // Past the first deadline, still on because of the retrigger
        assert!(glitch.poll(ms(150)));
        assert!(!glitch.poll(ms(180)));
        assert_eq!(glitch.trigger_count(), 2);
    }
}
