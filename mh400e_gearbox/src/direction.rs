//! Approach direction for a shaft move.
//!
//! One worm motor drives every position of a shaft; which way it turns
//! depends on where the shaft has to go:
//!
//! 1. to the left: counter-clockwise (reverse on)
//! 2. to the right: clockwise (reverse off)
//! 3. to the center: clockwise while left of center, otherwise
//!    counter-clockwise
//!
//! ```text
//!  ┌───┐
//!  ┘   └──────────────── left
//!          ┌───┐
//!  ────────┘   └──────── center
//!                  ┌───┐
//!  ────────────────┘   └ right
//!  ──────────┐
//!            └────────── left-center
//! ```

use mh400e_common::io::StageMask;

/// True if the shaft motor must turn counter-clockwise to reach `target`.
pub fn need_reverse(target: StageMask, current: StageMask) -> bool {
    if target.contains(StageMask::RIGHT) {
        false
    } else if target.contains(StageMask::LEFT) {
        true
    } else if target.contains(StageMask::CENTER) {
        !current.contains(StageMask::LEFT_CENTER)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT: StageMask = StageMask::LEFT;
    const RIGHT: StageMask = StageMask::RIGHT;
    const CENTER: StageMask = StageMask::CENTER;
    const LEFT_CENTER: StageMask = StageMask::LEFT_CENTER;
    const NONE: StageMask = StageMask::empty();

    #[test]
    fn right_target_turns_forward_from_left() {
        assert!(!need_reverse(RIGHT, LEFT.union(LEFT_CENTER)));
    }

    #[test]
    fn right_target_turns_forward_from_center() {
        assert!(!need_reverse(RIGHT, CENTER));
    }

    #[test]
    fn right_target_turns_forward_from_unknown() {
        assert!(!need_reverse(RIGHT, NONE));
    }

    #[test]
    fn right_bit_wins_over_left_bit() {
        assert!(!need_reverse(RIGHT.union(LEFT), CENTER));
    }

    #[test]
    fn left_target_reverses_from_right() {
        assert!(need_reverse(LEFT, RIGHT));
    }

    #[test]
    fn left_target_reverses_from_center() {
        assert!(need_reverse(LEFT.union(LEFT_CENTER), CENTER));
    }

    #[test]
    fn left_target_reverses_even_when_left_of_center() {
        assert!(need_reverse(LEFT, LEFT_CENTER));
    }

    #[test]
    fn center_target_from_left_side_turns_forward() {
        assert!(!need_reverse(CENTER, LEFT.union(LEFT_CENTER)));
    }

    #[test]
    fn center_target_between_left_and_center_turns_forward() {
        assert!(!need_reverse(CENTER, LEFT_CENTER));
    }

    #[test]
    fn center_target_from_right_side_reverses() {
        assert!(need_reverse(CENTER, RIGHT));
    }

    #[test]
    fn center_target_from_unknown_reverses() {
        assert!(need_reverse(CENTER, NONE));
    }

    #[test]
    fn unrecognised_target_turns_forward() {
        assert!(!need_reverse(NONE, RIGHT));
        assert!(!need_reverse(LEFT_CENTER, NONE));
    }
}
