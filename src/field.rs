//! Register bitfield helpers
//!
//! Every register access in the engine goes through these two types: a
//! [`BitField`] names where a field lives in a word, a [`FieldValue`] is a
//! field together with the value it should hold, ready to be tested against
//! or merged into a raw register word.

/// A (mask, shift) pair describing the location of a field in a register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BitField {
    mask: u32,
    shift: u32,
}

impl BitField {
    pub const fn new(mask: u32, shift: u32) -> Self {
        BitField { mask, shift }
    }

    /// Extracts the field from a raw register word.
    pub const fn read(&self, reg: u32) -> u32 {
        (reg & self.mask) >> self.shift
    }

    /// Binds the field to a value.
    pub fn value(&self, value: u32) -> FieldValue {
        let placed = value << self.shift;
        debug_assert!(placed & !self.mask == 0, "field value wider than mask");
        FieldValue {
            mask: self.mask,
            value: placed & self.mask,
        }
    }
}

/// A (mask, value) pair: the bits of one or more fields and the value those
/// bits should carry. Invariant: `value & !mask == 0`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldValue {
    mask: u32,
    value: u32,
}

impl FieldValue {
    pub fn new(mask: u32, value: u32) -> Self {
        debug_assert!(value & !mask == 0, "field value outside mask");
        FieldValue {
            mask,
            value: value & mask,
        }
    }

    /// Does the register currently hold this value in this field?
    pub const fn matches(&self, reg: u32) -> bool {
        reg & self.mask == self.value
    }

    /// Merges this value into a register word, leaving other fields alone.
    pub const fn apply(&self, reg: u32) -> u32 {
        (reg & !self.mask) | self.value
    }

    /// Combines two field values into one write. Masks may not overlap.
    pub fn or(&self, other: FieldValue) -> FieldValue {
        debug_assert!(self.mask & other.mask == 0, "overlapping field values");
        FieldValue {
            mask: self.mask | other.mask,
            value: self.value | other.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_field_and_preserves_rest() {
        let fv = FieldValue::new(0x0000_0F00, 0x0000_0300);
        for &reg in &[0u32, 0xFFFF_FFFF, 0xDEAD_BEEF, 0x0000_0F00] {
            let out = fv.apply(reg);
            assert_eq!(out & 0x0000_0F00, 0x0000_0300);
            assert_eq!(out & !0x0000_0F00, reg & !0x0000_0F00);
            assert!(fv.matches(out));
        }
    }

    #[test]
    fn matches_is_exact() {
        let fv = FieldValue::new(0x3, 0x1);
        assert!(fv.matches(0xFFFF_FFF1));
        assert!(!fv.matches(0xFFFF_FFF3));
        assert!(!fv.matches(0x0000_0000));
    }

    #[test]
    fn bitfield_read_and_value_round_trip() {
        let f = BitField::new(0x00FF_0000, 16);
        assert_eq!(f.read(0x0042_0000), 0x42);
        let fv = f.value(0x42);
        assert_eq!(f.read(fv.apply(0xFFFF_FFFF)), 0x42);
    }

    #[test]
    fn or_combines_disjoint_fields() {
        let sel = BitField::new(0x3, 0).value(2);
        let ovr = BitField::new(0x100, 8).value(1);
        let both = sel.or(ovr);
        assert_eq!(both.apply(0), 0x102);
        assert!(both.matches(0x102));
    }
}
