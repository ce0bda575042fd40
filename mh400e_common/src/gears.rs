//! Gear encoding and lookup.
//!
//! A gear pairs its nominal spindle speed with a 12-bit code laid out as
//! `(input << 8) | (midrange << 4) | backgear`, each nibble being the sensor
//! pattern the shaft shows when seated. Neutral is special: only its backgear
//! nibble is significant.
//!
//! The table is kept sorted by code in a fixed-capacity vector so resolving a
//! sensor pattern never allocates.

use heapless::Vec;
use static_assertions::const_assert;
use thiserror::Error;

use crate::consts::{GEAR_CODE_MAX, MAX_GEARS};
use crate::io::{ShaftId, StageMask};

/// A gear the box can be shifted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gear {
    /// Nominal spindle speed [rpm]; 0 for neutral.
    pub rpm: u16,
    /// Combined 12-bit sensor code.
    pub value: u16,
}

impl Gear {
    /// Create a gear entry.
    pub const fn new(rpm: u16, value: u16) -> Self {
        Self { rpm, value }
    }

    /// Target mask of one shaft for this gear.
    #[inline]
    pub const fn mask(&self, shaft: ShaftId) -> StageMask {
        shaft.mask_of(self.value)
    }

    /// Neutral has no spindle speed.
    #[inline]
    pub const fn is_neutral(&self) -> bool {
        self.rpm == 0
    }
}

/// Resolution of sensor codes to gears.
///
/// Implemented by [`GearTable`]; the gearbox only depends on this trait.
pub trait GearLookup {
    /// Gear whose code equals `code`, if any.
    fn resolve(&self, code: u16) -> Option<&Gear>;

    /// The neutral entry.
    fn neutral(&self) -> &Gear;

    /// Gear with the given nominal speed, if any.
    fn by_rpm(&self, rpm: u16) -> Option<&Gear>;
}

// ─── Built-in Table ─────────────────────────────────────────────────

// Seated positions of a shaft. Left also shows left-center because the
// left-center sensor covers everything left of the center detent.
const L: u16 = 0x9;
const C: u16 = 0x4;
const R: u16 = 0x2;

const fn code(input: u16, midrange: u16, backgear: u16) -> u16 {
    (input << 8) | (midrange << 4) | backgear
}

/// Neutral: backgear in the center detent, other shafts don't care.
pub const MH400E_NEUTRAL: Gear = Gear::new(0, C);

/// MAHO MH400E spindle gears.
pub const MH400E_GEARS: [Gear; 19] = [
    MH400E_NEUTRAL,
    Gear::new(80, code(L, L, L)),
    Gear::new(100, code(C, L, L)),
    Gear::new(125, code(R, L, L)),
    Gear::new(160, code(L, C, L)),
    Gear::new(200, code(C, C, L)),
    Gear::new(250, code(R, C, L)),
    Gear::new(315, code(L, R, L)),
    Gear::new(400, code(C, R, L)),
    Gear::new(500, code(R, R, L)),
    Gear::new(630, code(L, L, R)),
    Gear::new(800, code(C, L, R)),
    Gear::new(1000, code(R, L, R)),
    Gear::new(1250, code(L, C, R)),
    Gear::new(1600, code(C, C, R)),
    Gear::new(2000, code(R, C, R)),
    Gear::new(2500, code(L, R, R)),
    Gear::new(3150, code(C, R, R)),
    Gear::new(4000, code(R, R, R)),
];

const_assert!(MH400E_GEARS.len() <= MAX_GEARS);

// ─── Errors ─────────────────────────────────────────────────────────

/// Gear table validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GearTableError {
    /// No entries supplied.
    #[error("gear table is empty")]
    Empty,

    /// More entries than the fixed table capacity.
    #[error("gear table has {count} entries, capacity is {max}")]
    TooMany { count: usize, max: usize },

    /// Code does not fit in 12 bits.
    #[error("gear {rpm} rpm: code {value:#x} exceeds 12 bits")]
    ValueOutOfRange { rpm: u16, value: u16 },

    /// Two gears share one sensor code.
    #[error("gears {first} rpm and {second} rpm share code {value:#05x}")]
    DuplicateValue { value: u16, first: u16, second: u16 },

    /// Two gears share one nominal speed.
    #[error("duplicate gear speed {rpm} rpm")]
    DuplicateRpm { rpm: u16 },

    /// No neutral entry.
    #[error("gear table has no neutral entry")]
    NeutralMissing,

    /// A speed gear shares the backgear nibble neutral is detected by.
    #[error("gear {rpm} rpm uses the neutral backgear position")]
    NeutralNibbleShared { rpm: u16 },
}

// ─── Gear Table ─────────────────────────────────────────────────────

/// Fixed-capacity gear table sorted by code.
#[derive(Debug, Clone)]
pub struct GearTable {
    gears: Vec<Gear, MAX_GEARS>,
    neutral: Gear,
}

impl GearTable {
    /// Build and validate a table.
    ///
    /// Exactly one entry must be neutral (0 rpm); codes and speeds must be
    /// unique and codes must fit in 12 bits. Neutral is recognised by its
    /// backgear nibble alone, so no other entry may use that nibble.
    pub fn new(entries: &[Gear]) -> Result<Self, GearTableError> {
        if entries.is_empty() {
            return Err(GearTableError::Empty);
        }
        if entries.len() > MAX_GEARS {
            return Err(GearTableError::TooMany {
                count: entries.len(),
                max: MAX_GEARS,
            });
        }

        let mut gears: Vec<Gear, MAX_GEARS> = Vec::new();
        for gear in entries {
            if gear.value > GEAR_CODE_MAX {
                return Err(GearTableError::ValueOutOfRange {
                    rpm: gear.rpm,
                    value: gear.value,
                });
            }
            if gears.iter().any(|g| g.rpm == gear.rpm) {
                return Err(GearTableError::DuplicateRpm { rpm: gear.rpm });
            }
            if let Some(other) = gears.iter().find(|g| g.value == gear.value) {
                return Err(GearTableError::DuplicateValue {
                    value: gear.value,
                    first: other.rpm,
                    second: gear.rpm,
                });
            }
            gears
                .push(*gear)
                .map_err(|_| GearTableError::TooMany {
                    count: entries.len(),
                    max: MAX_GEARS,
                })?;
        }

        let neutral = gears
            .iter()
            .copied()
            .find(Gear::is_neutral)
            .ok_or(GearTableError::NeutralMissing)?;

        let neutral_mask = neutral.mask(ShaftId::Backgear);
        if let Some(gear) = gears
            .iter()
            .find(|g| !g.is_neutral() && g.mask(ShaftId::Backgear) == neutral_mask)
        {
            return Err(GearTableError::NeutralNibbleShared { rpm: gear.rpm });
        }

        gears.sort_unstable_by_key(|g| g.value);
        Ok(Self { gears, neutral })
    }

    /// The built-in MH400E table.
    pub fn mh400e() -> Self {
        let mut gears: Vec<Gear, MAX_GEARS> = Vec::new();
        for gear in MH400E_GEARS {
            // Capacity is checked at compile time above.
            let _ = gears.push(gear);
        }
        gears.sort_unstable_by_key(|g| g.value);
        Self {
            gears,
            neutral: MH400E_NEUTRAL,
        }
    }

    /// Number of entries, neutral included.
    #[inline]
    pub fn len(&self) -> usize {
        self.gears.len()
    }

    /// Always false for a constructed table.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.gears.is_empty()
    }

    /// Entries sorted by code.
    pub fn iter(&self) -> impl Iterator<Item = &Gear> {
        self.gears.iter()
    }
}

impl Default for GearTable {
    fn default() -> Self {
        Self::mh400e()
    }
}

impl GearLookup for GearTable {
    fn resolve(&self, code: u16) -> Option<&Gear> {
        self.gears
            .binary_search_by_key(&code, |g| g.value)
            .ok()
            .map(|idx| &self.gears[idx])
    }

    fn neutral(&self) -> &Gear {
        &self.neutral
    }

    fn by_rpm(&self, rpm: u16) -> Option<&Gear> {
        self.gears.iter().find(|g| g.rpm == rpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_neutral_and_eighteen_speeds() {
        let table = GearTable::mh400e();
        assert_eq!(table.len(), 19);
        assert_eq!(table.iter().filter(|g| !g.is_neutral()).count(), 18);
        assert_eq!(*table.neutral(), MH400E_NEUTRAL);
    }

    #[test]
    fn builtin_table_passes_validation() {
        let table = GearTable::new(&MH400E_GEARS).unwrap();
        assert_eq!(table.len(), MH400E_GEARS.len());
    }

    #[test]
    fn resolve_finds_every_builtin_gear() {
        let table = GearTable::mh400e();
        for gear in MH400E_GEARS {
            assert_eq!(table.resolve(gear.value), Some(&gear));
        }
        assert_eq!(table.resolve(0x888), None);
        assert_eq!(table.resolve(0x000), None);
    }

    #[test]
    fn gear_masks_split_by_shaft() {
        let gear = GearTable::mh400e().by_rpm(800).copied().unwrap();
        assert_eq!(gear.mask(ShaftId::Input), StageMask::CENTER);
        assert_eq!(
            gear.mask(ShaftId::Midrange),
            StageMask::LEFT | StageMask::LEFT_CENTER
        );
        assert_eq!(gear.mask(ShaftId::Backgear), StageMask::RIGHT);
    }

    #[test]
    fn neutral_only_uses_backgear_nibble() {
        assert_eq!(MH400E_NEUTRAL.mask(ShaftId::Input), StageMask::empty());
        assert_eq!(MH400E_NEUTRAL.mask(ShaftId::Midrange), StageMask::empty());
        assert_eq!(MH400E_NEUTRAL.mask(ShaftId::Backgear), StageMask::CENTER);
    }

    #[test]
    fn no_speed_gear_uses_the_neutral_backgear_position() {
        let neutral = MH400E_NEUTRAL.mask(ShaftId::Backgear);
        for gear in MH400E_GEARS.iter().filter(|g| !g.is_neutral()) {
            assert_ne!(gear.mask(ShaftId::Backgear), neutral, "{} rpm", gear.rpm);
        }
    }

    #[test]
    fn empty_table_rejected() {
        assert_eq!(GearTable::new(&[]).unwrap_err(), GearTableError::Empty);
    }

    #[test]
    fn missing_neutral_rejected() {
        let err = GearTable::new(&[Gear::new(80, 0x999)]).unwrap_err();
        assert_eq!(err, GearTableError::NeutralMissing);
    }

    #[test]
    fn duplicate_value_rejected() {
        let err = GearTable::new(&[
            Gear::new(0, 0x004),
            Gear::new(80, 0x999),
            Gear::new(100, 0x999),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            GearTableError::DuplicateValue {
                value: 0x999,
                first: 80,
                second: 100
            }
        );
    }

    #[test]
    fn speed_gear_on_neutral_backgear_position_rejected() {
        let err = GearTable::new(&[
            Gear::new(0, 0x004),
            Gear::new(100, 0x994),
            Gear::new(200, 0x992),
        ])
        .unwrap_err();
        assert_eq!(err, GearTableError::NeutralNibbleShared { rpm: 100 });
        assert!(err.to_string().contains("neutral backgear position"));
    }

    #[test]
    fn duplicate_rpm_rejected() {
        let err = GearTable::new(&[Gear::new(0, 0x004), Gear::new(0, 0x001)]).unwrap_err();
        assert_eq!(err, GearTableError::DuplicateRpm { rpm: 0 });
    }

    #[test]
    fn oversized_code_rejected() {
        let err = GearTable::new(&[Gear::new(0, 0x004), Gear::new(80, 0x1000)]).unwrap_err();
        assert!(matches!(err, GearTableError::ValueOutOfRange { rpm: 80, .. }));
        assert!(err.to_string().contains("12 bits"));
    }

    #[test]
    fn too_many_entries_rejected() {
        let entries: std::vec::Vec<Gear> = (0..=MAX_GEARS as u16).map(|i| Gear::new(i, i)).collect();
        let err = GearTable::new(&entries).unwrap_err();
        assert_eq!(
            err,
            GearTableError::TooMany {
                count: MAX_GEARS + 1,
                max: MAX_GEARS
            }
        );
    }
}
