//! Status indicator pattern timer.
//!
//! Pure timekeeping: callers feed in a millisecond clock and drive the
//! physical indicator from the returned state changes.

use crate::bridge::ActivityHook;

/// How long the indicator stays lit after a burst of activity.
pub const ACTIVITY_MS: i32 = 20;

/// Minimum interval between pattern evaluations.
const UPDATE_INTERVAL_MS: u32 = 10;

/// Blink-pattern state machine with an activity override.
pub struct Indicator {
    last_ms: u32,
    lit: bool,

    activity_timer: i32,
    blink_timer: i32,
    cycle: u32,

    blink_len: i32,
    cycle_count: u32,
    active_count: u32,
}

impl Indicator {
    pub fn new(now_ms: u32) -> Self {
        Self {
            last_ms: now_ms,
            lit: false,
            activity_timer: 0,
            blink_timer: 0,
            cycle: 0,
            blink_len: 200,
            cycle_count: 0,
            active_count: 0,
        }
    }

    /// `blink_len_ms` is the on time of one cycle (the off time matches),
    /// `cycles` the total cycles in the pattern, `active` how many of
    /// them actually blink.
    pub fn set_pattern(&mut self, blink_len_ms: u32, cycles: u32, active: u32) {
        self.blink_len = blink_len_ms as i32;
        self.cycle_count = cycles;
        self.active_count = active;
    }

    pub fn disable_pattern(&mut self) {
        self.set_pattern(200, 0, 0);
    }

    /// Holds the indicator lit for [`ACTIVITY_MS`].
    pub fn activity(&mut self) {
        self.activity_timer = ACTIVITY_MS;
    }

    /// Advances the timer. Returns the new indicator state when it
    /// changed, `None` otherwise.
    pub fn update(&mut self, now_ms: u32) -> Option<bool> {
        let diff = now_ms.wrapping_sub(self.last_ms);
        if diff < UPDATE_INTERVAL_MS {
            return None;
        }
        self.last_ms = now_ms;

        let lit = self.tick(diff as i32);
        if lit == self.lit {
            return None;
        }
        self.lit = lit;
        Some(lit)
    }

    fn tick(&mut self, diff: i32) -> bool {
        if self.activity_timer > 0 {
            self.activity_timer -= diff;
            return true;
        }
        self.activity_timer = 0;

        if self.cycle_count < 1 || self.active_count < 1 {
            self.blink_timer = 0;
            return false;
        }

        self.blink_timer += diff;
        if self.blink_timer >= 2 * self.blink_len {
            self.cycle += 1;
            self.blink_timer = 0;
        }
        if self.cycle >= self.cycle_count {
            self.cycle = 0;
        }
        self.cycle < self.active_count && self.blink_timer < self.blink_len
    }
}

impl ActivityHook for Indicator {
    fn activity(&mut self) {
        Indicator::activity(self)
    }
}

#[cfg(test)]
mod test {
    use super::Indicator;

    #[test]
    fn pattern_blinks_active_cycles_only() {
        let mut ind = Indicator::new(0);
        ind.set_pattern(100, 3, 1);

        let mut transitions = vec![];
        for t in (10..=1300).step_by(10) {
            if let Some(state) = ind.update(t) {
                transitions.push((t, state));
            }
        }
        assert_eq!(
            transitions,
            vec![
                (10, true),
                (100, false),
                (600, true),
                (700, false),
                (1200, true),
                (1300, false),
            ]
        );
    }

    #[test]
    fn activity_flash() {
        let mut ind = Indicator::new(0);
        assert_eq!(ind.update(10), None);
        ind.activity();
        assert_eq!(ind.update(20), Some(true));
        assert_eq!(ind.update(30), None);
        assert_eq!(ind.update(40), Some(false));
    }

    #[test]
    fn updates_are_rate_limited() {
        let mut ind = Indicator::new(0);
        ind.set_pattern(100, 1, 1);
        assert_eq!(ind.update(5), None);
        assert_eq!(ind.update(12), Some(true));
    }
}
