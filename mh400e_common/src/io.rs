//! Gearbox I/O image: pin groups, stage masks and output signals.
//!
//! Each shaft has four position sensors folded into a [`StageMask`] and three
//! outputs (motor enable, reverse, low speed). The host copies physical pins
//! into [`GearboxInputs`] before each tick and writes [`GearboxOutputs`] back
//! after it.

use core::fmt;

use bitflags::bitflags;

use crate::consts::PINS_IN_GROUP;

bitflags! {
    /// Position sensor pattern of one shaft.
    ///
    /// Bit order is fixed: left, right, center, left-center.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageMask: u8 {
        /// Shaft seated in the left position.
        const LEFT        = 0x01;
        /// Shaft seated in the right position.
        const RIGHT       = 0x02;
        /// Shaft seated in the center position.
        const CENTER      = 0x04;
        /// Shaft is on the left side of the center position.
        const LEFT_CENTER = 0x08;
    }
}

impl StageMask {
    /// Build a mask from the low nibble of `value`; higher bits are dropped.
    #[inline]
    pub const fn from_nibble(value: u16) -> Self {
        Self::from_bits_retain((value & 0x000f) as u8)
    }

    /// Raw 4-bit value.
    #[inline]
    pub const fn nibble(self) -> u8 {
        self.bits()
    }
}

impl Default for StageMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for StageMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06b}", self.bits())
    }
}

// ─── Shaft Identity ─────────────────────────────────────────────────

/// One of the three actuated gearbox shafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaftId {
    /// Input stage (high nibble of the gear code).
    Input = 0,
    /// Midrange stage (middle nibble).
    Midrange = 1,
    /// Backgear / reducer (low nibble).
    Backgear = 2,
}

impl ShaftId {
    /// All shafts in cascade order.
    pub const ALL: [Self; 3] = [Self::Input, Self::Midrange, Self::Backgear];

    /// Bit offset of this shaft's nibble inside a 12-bit gear code.
    #[inline]
    pub const fn code_shift(self) -> u16 {
        match self {
            Self::Input => 8,
            Self::Midrange => 4,
            Self::Backgear => 0,
        }
    }

    /// Extract this shaft's nibble from a combined gear code.
    #[inline]
    pub const fn mask_of(self, code: u16) -> StageMask {
        StageMask::from_nibble(code >> self.code_shift())
    }
}

impl fmt::Display for ShaftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Midrange => write!(f, "midrange"),
            Self::Backgear => write!(f, "backgear"),
        }
    }
}

// ─── Inputs ─────────────────────────────────────────────────────────

/// The four position sensors of one shaft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinGroup {
    pub left: bool,
    pub right: bool,
    pub center: bool,
    pub left_center: bool,
}

impl PinGroup {
    /// Sensor values in mask bit order.
    #[inline]
    pub const fn pins(&self) -> [bool; PINS_IN_GROUP] {
        [self.left, self.right, self.center, self.left_center]
    }

    /// Fold the four sensors into a mask, bit `i` = sensor `i`.
    pub fn mask(&self) -> StageMask {
        let bits = self
            .pins()
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, &pin)| acc | ((pin as u8) << i));
        StageMask::from_bits_retain(bits)
    }

    /// Sensor pattern that reads back as `mask`.
    pub const fn from_mask(mask: StageMask) -> Self {
        Self {
            left: mask.contains(StageMask::LEFT),
            right: mask.contains(StageMask::RIGHT),
            center: mask.contains(StageMask::CENTER),
            left_center: mask.contains(StageMask::LEFT_CENTER),
        }
    }
}

/// Inputs sampled from the machine once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GearboxInputs {
    pub input: PinGroup,
    pub midrange: PinGroup,
    pub backgear: PinGroup,
    /// Spindle reports zero speed.
    pub spindle_stopped: bool,
}

impl GearboxInputs {
    /// Sensor group of the given shaft.
    #[inline]
    pub const fn group(&self, shaft: ShaftId) -> &PinGroup {
        match shaft {
            ShaftId::Input => &self.input,
            ShaftId::Midrange => &self.midrange,
            ShaftId::Backgear => &self.backgear,
        }
    }
}

// ─── Outputs ────────────────────────────────────────────────────────

/// Outputs owned by one shaft's stage driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaftOutputs {
    /// Shaft motor energized.
    pub motor_on: bool,
    /// Motor turns counter-clockwise.
    pub reverse: bool,
    /// Motor runs at reduced speed.
    pub slow: bool,
}

impl ShaftOutputs {
    /// True if any output is asserted.
    #[inline]
    pub const fn any(&self) -> bool {
        self.motor_on || self.reverse || self.slow
    }
}

/// Output image written back to the machine after each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GearboxOutputs {
    pub input: ShaftOutputs,
    pub midrange: ShaftOutputs,
    pub backgear: ShaftOutputs,
    /// Shift in progress interlock.
    pub start_shift: bool,
    /// Request the spindle to stop.
    pub stop_spindle: bool,
}

impl GearboxOutputs {
    /// Outputs of the given shaft.
    #[inline]
    pub const fn shaft(&self, shaft: ShaftId) -> &ShaftOutputs {
        match shaft {
            ShaftId::Input => &self.input,
            ShaftId::Midrange => &self.midrange,
            ShaftId::Backgear => &self.backgear,
        }
    }

    /// Combined reverse signal for machines with a single shared direction wire.
    #[inline]
    pub const fn reverse_direction(&self) -> bool {
        self.input.reverse || self.midrange.reverse || self.backgear.reverse
    }

    /// Combined low-speed signal for machines with a single shared speed wire.
    #[inline]
    pub const fn motor_lowspeed(&self) -> bool {
        self.input.slow || self.midrange.slow || self.backgear.slow
    }
}
