//! Keyboard modifier set.

use bitflags::bitflags;
use crossterm::event::KeyModifiers;

bitflags! {
    /// Modifier keys reported alongside a key code
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ModifierSet: u8 {
        const NONE    = 0;
        const SHIFT   = 0b0001;
        const CONTROL = 0b0010;
        const ALT     = 0b0100;
    }
}

impl ModifierSet {
    /// The empty set
    pub const fn none() -> Self {
        Self::NONE
    }

    /// Union of two sets
    pub const fn combine(self, other: Self) -> Self {
        self.union(other)
    }

    /// Decode an xterm modifier parameter (`1 + bits`, as in `CSI 1;5A`).
    ///
    /// Meta (bit 8) has no slot of its own and is folded into ALT.
    pub fn from_xterm_param(param: u16) -> Self {
        let bits = param.saturating_sub(1);
        let mut mods = Self::NONE;
        if bits & 1 != 0 {
            mods |= Self::SHIFT;
        }
        if bits & 2 != 0 || bits & 8 != 0 {
            mods |= Self::ALT;
        }
        if bits & 4 != 0 {
            mods |= Self::CONTROL;
        }
        mods
    }
}

impl From<KeyModifiers> for ModifierSet {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = ModifierSet::NONE;
        if mods.contains(KeyModifiers::SHIFT) {
            result |= ModifierSet::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= ModifierSet::CONTROL;
        }
        if mods.intersects(KeyModifiers::ALT | KeyModifiers::META | KeyModifiers::SUPER | KeyModifiers::HYPER) {
            result |= ModifierSet::ALT;
        }
        result
    }
}

impl From<ModifierSet> for KeyModifiers {
    fn from(mods: ModifierSet) -> Self {
        let mut result = KeyModifiers::NONE;
        if mods.contains(ModifierSet::SHIFT) {
            result |= KeyModifiers::SHIFT;
        }
        if mods.contains(ModifierSet::CONTROL) {
            result |= KeyModifiers::CONTROL;
        }
        if mods.contains(ModifierSet::ALT) {
            result |= KeyModifiers::ALT;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_sets() -> Vec<ModifierSet> {
        (0..8u8).map(ModifierSet::from_bits_truncate).collect()
    }

    #[test]
    fn test_none_is_identity() {
        for a in all_sets() {
            assert_eq!(a.combine(ModifierSet::none()), a);
            assert_eq!(ModifierSet::none().combine(a), a);
        }
        assert!(ModifierSet::none().is_empty());
    }

    #[test]
    fn test_combine_is_associative_and_commutative() {
        for a in all_sets() {
            for b in all_sets() {
                assert_eq!(a.combine(b), b.combine(a));
                for c in all_sets() {
                    assert_eq!(a.combine(b).combine(c), a.combine(b.combine(c)));
                }
            }
        }
    }

    #[test]
    fn test_contains() {
        let mods = ModifierSet::SHIFT.combine(ModifierSet::ALT);
        assert!(mods.contains(ModifierSet::SHIFT));
        assert!(mods.contains(ModifierSet::ALT));
        assert!(!mods.contains(ModifierSet::CONTROL));
        assert_eq!(mods.bits(), 0b0101);
    }

    #[test]
    fn test_xterm_param() {
        assert_eq!(ModifierSet::from_xterm_param(1), ModifierSet::NONE);
        assert_eq!(ModifierSet::from_xterm_param(2), ModifierSet::SHIFT);
        assert_eq!(ModifierSet::from_xterm_param(3), ModifierSet::ALT);
        assert_eq!(ModifierSet::from_xterm_param(5), ModifierSet::CONTROL);
        assert_eq!(
            ModifierSet::from_xterm_param(8),
            ModifierSet::SHIFT | ModifierSet::ALT | ModifierSet::CONTROL
        );
        assert_eq!(ModifierSet::from_xterm_param(9), ModifierSet::ALT);
        assert_eq!(ModifierSet::from_xterm_param(0), ModifierSet::NONE);
    }

    #[test]
    fn test_crossterm_conversion() {
        let mods = ModifierSet::CONTROL | ModifierSet::SHIFT;
        let xt: KeyModifiers = mods.into();
        assert_eq!(xt, KeyModifiers::CONTROL | KeyModifiers::SHIFT);
        assert_eq!(ModifierSet::from(xt), mods);

        assert_eq!(ModifierSet::from(KeyModifiers::SUPER), ModifierSet::ALT);
        assert_eq!(ModifierSet::from(KeyModifiers::NONE), ModifierSet::NONE);
    }
}
