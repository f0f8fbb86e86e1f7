//! Tri-color state and the generational age lattice (spec §4.5).

/// An object's mark color. Two whites alternate per cycle so that sweeping
/// last cycle's white (now "other white") can run concurrently with the
/// mutator creating new, current-white objects — see
/// [`Collector`](crate::collector::Collector) for how `current_white`
/// flips at the end of the atomic phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White0,
    White1,
    Gray,
    Black,
}

impl Color {
    #[inline]
    pub fn is_white(self) -> bool {
        matches!(self, Color::White0 | Color::White1)
    }

    #[inline]
    pub fn is_black(self) -> bool {
        matches!(self, Color::Black)
    }

    #[inline]
    pub fn is_gray(self) -> bool {
        matches!(self, Color::Gray)
    }

    /// Is this object the color that will be swept away this cycle?
    #[inline]
    pub fn is_dead(self, current_white: Color) -> bool {
        self.is_white() && self != current_white
    }

    #[inline]
    pub fn other_white(current_white: Color) -> Color {
        match current_white {
            Color::White0 => Color::White1,
            Color::White1 => Color::White0,
            _ => unreachable!("current_white is always White0 or White1"),
        }
    }
}

/// Generational age state (spec §4.5 "Age states"). Only meaningful in
/// [`GcMode::Generational`](crate::config::GcMode); incremental mode
/// leaves every object at `New` and ignores this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Age {
    New,
    Survival,
    Old0,
    Old1,
    Old,
    /// Black, but kept on a gray list: a write to an `Old` object moved it
    /// here so the next minor cycle rescans it.
    Touched1,
    /// Survived one more minor cycle as `Touched1`; one more survival
    /// promotes back to `Old`.
    Touched2,
}

impl Age {
    #[inline]
    pub fn is_old(self) -> bool {
        matches!(self, Age::Old0 | Age::Old1 | Age::Old | Age::Touched1 | Age::Touched2)
    }

    /// Advance one minor-cycle survival step along `New -> Survival ->
    /// Old0 -> Old1 -> Old`. `Touched1`/`Touched2` have their own
    /// promotion path driven by [`Age::bump_touched`].
    pub fn promote(self) -> Age {
        match self {
            Age::New => Age::Survival,
            Age::Survival => Age::Old0,
            Age::Old0 => Age::Old1,
            Age::Old1 => Age::Old,
            Age::Old => Age::Old,
            Age::Touched1 => Age::Touched1,
            Age::Touched2 => Age::Touched2,
        }
    }

    /// Advance a back-barriered old object one more cycle:
    /// `Old -> Touched1 -> Touched2 -> Old`.
    pub fn bump_touched(self) -> Age {
        match self {
            Age::Touched1 => Age::Touched2,
            Age::Touched2 => Age::Old,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_white_is_involutive() {
        assert_eq!(Color::other_white(Color::other_white(Color::White0)), Color::White0);
    }

    #[test]
    fn dead_means_white_and_not_current() {
        assert!(Color::White1.is_dead(Color::White0));
        assert!(!Color::White0.is_dead(Color::White0));
        assert!(!Color::Black.is_dead(Color::White0));
    }

    #[test]
    fn touched_cycle_returns_to_old() {
        assert_eq!(Age::Old.bump_touched(), Age::Old);
        assert_eq!(Age::Touched1.bump_touched(), Age::Touched2);
        assert_eq!(Age::Touched2.bump_touched(), Age::Old);
    }
}
