//! Depth budget for recursive subdivision.

use crate::register::FrameRegister;

/// Remaining recursion depth for one subdivision round.
///
/// Every successful [`SplitBudget::enter`] must be paired with exactly one
/// [`SplitBudget::exit`]; after a complete traversal the budget is back at its
/// initial value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitBudget {
    initial: u32,
    remaining: u32,
}

impl SplitBudget {
    pub fn new(depth: u32) -> Self {
        Self {
            initial: depth,
            remaining: depth,
        }
    }

    /// Consume one level. Returns `false` when the depth is exhausted.
    pub fn enter(&mut self) -> bool {
        if self.remaining >= 1 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    pub fn exit(&mut self) {
        debug_assert!(
            self.remaining < self.initial,
            "exit() without matching enter()"
        );
        self.remaining += 1;
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }

    /// Number of levels currently entered.
    pub fn current_depth(&self) -> u32 {
        self.initial - self.remaining
    }

    pub fn is_balanced(&self) -> bool {
        self.remaining == self.initial
    }
}

/// Round-local state threaded through a subdivision: the depth budget plus the
/// register of every frame written so far. Built fresh for each top-level call.
#[derive(Debug)]
pub struct SubdivContext {
    pub budget: SplitBudget,
    pub register: FrameRegister,
}

impl SubdivContext {
    pub fn new(depth: u32) -> Self {
        Self {
            budget: SplitBudget::new(depth),
            register: FrameRegister::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_fails_once_depth_is_exhausted() {
        let mut budget = SplitBudget::new(2);
        assert!(budget.enter());
        assert!(budget.enter());
        assert!(!budget.enter());
        assert_eq!(budget.remaining(), 0);
        assert_eq!(budget.current_depth(), 2);
    }

    #[test]
    fn zero_depth_never_enters() {
        let mut budget = SplitBudget::new(0);
        assert!(!budget.enter());
        assert!(budget.is_balanced());
    }

    #[test]
    fn full_tree_walk_leaves_budget_balanced() {
        fn walk(budget: &mut SplitBudget, visits: &mut u32) {
            if !budget.enter() {
                return;
            }
            *visits += 1;
            walk(budget, visits);
            walk(budget, visits);
            budget.exit();
        }

        let mut budget = SplitBudget::new(4);
        let mut visits = 0;
        walk(&mut budget, &mut visits);
        assert_eq!(visits, 15);
        assert!(budget.is_balanced());
        assert_eq!(budget.remaining(), budget.initial());
    }

    #[test]
    fn context_starts_empty() {
        let ctx = SubdivContext::new(3);
        assert!(ctx.register.is_empty());
        assert_eq!(ctx.budget.remaining(), 3);
    }

    #[test]
    #[should_panic(expected = "exit() without matching enter()")]
    fn unmatched_exit_is_caught() {
        let mut budget = SplitBudget::new(2);
        budget.exit();
    }
}
