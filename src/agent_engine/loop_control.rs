/// Turn budget for the perceive-act loop.
pub struct LoopController {
    max_turns: u32,
    turn: u32,
    start_time: std::time::Instant,
}

impl LoopController {
    pub fn new(max_turns: u32) -> Self {
        Self {
            max_turns: max_turns.max(1),
            turn: 0,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Count one completed acting turn.
    pub fn record_turn(&mut self) {
        self.turn += 1;
    }

    pub fn should_stop(&self) -> bool {
        self.turn >= self.max_turns
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_max_turns() {
        let mut ctrl = LoopController::new(3);
        for _ in 0..3 {
            assert!(!ctrl.should_stop());
            ctrl.record_turn();
        }
        assert!(ctrl.should_stop());
        assert_eq!(ctrl.turn(), 3);
    }

    #[test]
    fn zero_budget_is_clamped_to_one() {
        assert_eq!(LoopController::new(0).max_turns(), 1);
    }
}
