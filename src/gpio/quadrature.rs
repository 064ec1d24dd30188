//! Quadrature decoding for two-wire incremental rotary encoders
//!
//! An encoder produces two offset square waves. Comparing instantaneous
//! levels on a single edge misreads direction as soon as one contact
//! bounces, so decoding runs as an arm/fire state machine over the pair:
//! a half-turn into the cycle arms a direction, and only the third
//! quadrature state of that direction fires a step. Backing out of a
//! half-completed detent returns to rest without firing.

/// Rotation direction of a completed detent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Primary line leads; reported as `+1`.
    Clockwise,
    /// Auxiliary line leads; reported as `-1`.
    CounterClockwise,
}

impl Direction {
    fn delta(self) -> i32 {
        match self {
            Self::Clockwise => 1,
            Self::CounterClockwise => -1,
        }
    }
}

/// Where the decoder is within a quadrature cycle.
///
/// The armed direction is sticky: it is only cleared by firing a step or by
/// the pair returning to the rest state (both lines low).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Rest,
    Armed(Direction),
}

/// Per-pair decoder state: the two 1-bit line levels plus the cycle phase.
///
/// Levels start low at registration and are only ever mutated through
/// [`Decoder::primary_edge`] / [`Decoder::aux_edge`].
#[derive(Debug)]
pub struct Decoder {
    primary: bool,
    aux: bool,
    phase: Phase,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            primary: false,
            aux: false,
            phase: Phase::Rest,
        }
    }

    /// Feed a debounced edge on the primary line. `high` is the new level.
    pub fn primary_edge(&mut self, high: bool) -> Option<i32> {
        let from = (self.primary, self.aux);
        self.primary = high;
        self.transition(from)
    }

    /// Feed a debounced edge on the auxiliary line.
    pub fn aux_edge(&mut self, high: bool) -> Option<i32> {
        let from = (self.primary, self.aux);
        self.aux = high;
        self.transition(from)
    }

    fn transition(&mut self, from: (bool, bool)) -> Option<i32> {
        let now = (self.primary, self.aux);
        if now == from {
            // Level unchanged (repeated edge of the same polarity): no
            // quadrature progress.
            return None;
        }
        match (self.phase, from, now) {
            // One line high, then both: the leading line determines direction.
            (Phase::Rest, (true, false), (true, true)) => {
                self.phase = Phase::Armed(Direction::Clockwise);
                None
            }
            (Phase::Rest, (false, true), (true, true)) => {
                self.phase = Phase::Armed(Direction::CounterClockwise);
                None
            }
            // Armed and the trailing line dropped first: the detent
            // completed, fire exactly once and start a fresh cycle.
            (Phase::Armed(dir @ Direction::Clockwise), _, (false, true))
            | (Phase::Armed(dir @ Direction::CounterClockwise), _, (true, false)) => {
                self.phase = Phase::Rest;
                Some(dir.delta())
            }
            // Back at rest without completing: disarm, no step.
            (Phase::Armed(_), _, (false, false)) => {
                self.phase = Phase::Rest;
                None
            }
            // Partial transitions and jitter while armed change nothing.
            _ => None,
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clockwise_detent(d: &mut Decoder) -> Vec<i32> {
        [
            d.primary_edge(true),
            d.aux_edge(true),
            d.primary_edge(false),
            d.aux_edge(false),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn counter_clockwise_detent(d: &mut Decoder) -> Vec<i32> {
        [
            d.aux_edge(true),
            d.primary_edge(true),
            d.aux_edge(false),
            d.primary_edge(false),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    #[test]
    fn clean_clockwise_detent_fires_once() {
        let mut d = Decoder::new();
        assert_eq!(clockwise_detent(&mut d), vec![1]);
    }

    #[test]
    fn clean_counter_clockwise_detent_fires_once() {
        let mut d = Decoder::new();
        assert_eq!(counter_clockwise_detent(&mut d), vec![-1]);
    }

    #[test]
    fn consecutive_detents_each_fire() {
        let mut d = Decoder::new();
        for _ in 0..5 {
            assert_eq!(clockwise_detent(&mut d), vec![1]);
        }
        for _ in 0..5 {
            assert_eq!(counter_clockwise_detent(&mut d), vec![-1]);
        }
    }

    #[test]
    fn partial_transition_never_fires() {
        let mut d = Decoder::new();
        assert_eq!(d.primary_edge(true), None);
        assert_eq!(d.primary_edge(false), None);
        assert_eq!(d.aux_edge(true), None);
        assert_eq!(d.aux_edge(false), None);
    }

    #[test]
    fn reversal_before_completion_fires_nothing() {
        let mut d = Decoder::new();
        // Half a clockwise detent, then back out the way we came.
        assert_eq!(d.primary_edge(true), None);
        assert_eq!(d.aux_edge(true), None); // armed clockwise
        assert_eq!(d.aux_edge(false), None); // trailing line backs out
        assert_eq!(d.primary_edge(false), None); // rest, disarmed
        // A following clean detent still works.
        assert_eq!(clockwise_detent(&mut d), vec![1]);
    }

    #[test]
    fn direction_is_sticky_under_jitter() {
        let mut d = Decoder::new();
        assert_eq!(d.primary_edge(true), None);
        assert_eq!(d.aux_edge(true), None); // armed clockwise
        // Jitter on the auxiliary contact while armed: direction must not
        // flip to counter-clockwise.
        assert_eq!(d.aux_edge(false), None);
        assert_eq!(d.aux_edge(true), None);
        // Completing the cycle still yields a single clockwise step.
        assert_eq!(d.primary_edge(false), Some(1));
        assert_eq!(d.aux_edge(false), None);
    }

    #[test]
    fn stalled_pair_stays_inert() {
        let mut d = Decoder::new();
        assert_eq!(d.primary_edge(true), None);
        assert_eq!(d.aux_edge(true), None);
        // The user stops mid-detent: repeated identical levels do nothing,
        // there is no timeout or auto-reset.
        assert_eq!(d.primary_edge(true), None);
        assert_eq!(d.aux_edge(true), None);
        // Rotation resumes and the step completes.
        assert_eq!(d.primary_edge(false), Some(1));
    }
}
