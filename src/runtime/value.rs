//! Tagged runtime values
//!
//! A [`TaggedValue`] is a single 64-bit word encoding every runtime value the
//! interpreter touches: small integers, IEEE doubles, heap references and the
//! singleton constants. The tag layout guarantees the cases never collide:
//!
//! - **Int**: the high 16 bits are all ones; the payload is an `i32` in the
//!   low 32 bits.
//! - **Double**: the raw IEEE bits plus a fixed encode offset (`1 << 48`).
//!   After the offset no double pattern has an all-ones or all-zero high 16
//!   bits, so doubles are disjoint from both ints and heap words. NaNs are
//!   canonicalized on the way in.
//! - **Heap reference**: high 16 bits zero, payload 8-aligned and >= 0x10;
//!   the payload encodes an index into the heap arena.
//! - **Specials**: high 16 bits zero, small unaligned constants — `Hole`
//!   (0x00, so zeroed slots read as uninitialized), `Undefined`, `Null`,
//!   `False`, `True` and the internal `Exception` completion marker.
//!
//! `Hole` marks not-yet-initialized slots (TDZ bindings, class fields mid
//! construction) and must never escape into guest-visible results.

use std::fmt;

const TAG_MASK: u64 = 0xFFFF_0000_0000_0000;
const TAG_INT: u64 = 0xFFFF_0000_0000_0000;
const DOUBLE_ENCODE_OFFSET: u64 = 1 << 48;
const CANONICAL_NAN: u64 = 0x7FF8_0000_0000_0000;

const VALUE_HOLE: u64 = 0x00;
const VALUE_UNDEFINED: u64 = 0x02;
const VALUE_NULL: u64 = 0x03;
const VALUE_FALSE: u64 = 0x06;
const VALUE_TRUE: u64 = 0x07;
const VALUE_EXCEPTION: u64 = 0x0A;

/// Smallest heap-reference payload; everything below is a special constant
const MIN_HEAP_BITS: u64 = 0x10;

/// A NaN-boxed 64-bit tagged value
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaggedValue(u64);

impl TaggedValue {
    // ==================== Constructors ====================

    /// The uninitialized-slot marker; never guest-visible
    pub const HOLE: TaggedValue = TaggedValue(VALUE_HOLE);
    /// `undefined`
    pub const UNDEFINED: TaggedValue = TaggedValue(VALUE_UNDEFINED);
    /// `null`
    pub const NULL: TaggedValue = TaggedValue(VALUE_NULL);
    /// `false`
    pub const FALSE: TaggedValue = TaggedValue(VALUE_FALSE);
    /// `true`
    pub const TRUE: TaggedValue = TaggedValue(VALUE_TRUE);
    /// Abrupt-completion marker returned by failing runtime stubs
    pub const EXCEPTION: TaggedValue = TaggedValue(VALUE_EXCEPTION);

    /// Tag a small integer
    #[inline]
    pub const fn int(value: i32) -> TaggedValue {
        TaggedValue(TAG_INT | (value as u32 as u64))
    }

    /// Tag a double; NaNs are canonicalized so the tag bits stay unambiguous
    #[inline]
    pub fn double(value: f64) -> TaggedValue {
        let bits = if value.is_nan() {
            CANONICAL_NAN
        } else {
            value.to_bits()
        };
        TaggedValue(bits.wrapping_add(DOUBLE_ENCODE_OFFSET))
    }

    /// Tag a boolean
    #[inline]
    pub const fn boolean(value: bool) -> TaggedValue {
        if value {
            TaggedValue::TRUE
        } else {
            TaggedValue::FALSE
        }
    }

    /// Tag a heap arena index
    #[inline]
    pub fn heap_ref(index: usize) -> TaggedValue {
        TaggedValue(((index as u64) + 2) << 3)
    }

    /// Reconstruct from raw bits (deserialization, diagnostics)
    #[inline]
    pub const fn from_raw(bits: u64) -> TaggedValue {
        TaggedValue(bits)
    }

    /// Raw bit pattern
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    // ==================== Classification ====================

    /// Is this a tagged int32?
    #[inline]
    pub const fn is_int(self) -> bool {
        self.0 & TAG_MASK == TAG_INT
    }

    /// Is this an encoded double?
    #[inline]
    pub const fn is_double(self) -> bool {
        !self.is_int() && (self.0 & TAG_MASK) != 0
    }

    /// Int or double
    #[inline]
    pub const fn is_number(self) -> bool {
        self.is_int() || self.is_double()
    }

    /// Is this a heap reference?
    #[inline]
    pub const fn is_heap_ref(self) -> bool {
        (self.0 & TAG_MASK) == 0 && self.0 >= MIN_HEAP_BITS && self.0 & 0x7 == 0
    }

    #[inline]
    pub const fn is_hole(self) -> bool {
        self.0 == VALUE_HOLE
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0 == VALUE_UNDEFINED
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == VALUE_NULL
    }

    #[inline]
    pub const fn is_undefined_or_null(self) -> bool {
        self.0 == VALUE_UNDEFINED || self.0 == VALUE_NULL
    }

    #[inline]
    pub const fn is_boolean(self) -> bool {
        self.0 == VALUE_TRUE || self.0 == VALUE_FALSE
    }

    #[inline]
    pub const fn is_true(self) -> bool {
        self.0 == VALUE_TRUE
    }

    #[inline]
    pub const fn is_false(self) -> bool {
        self.0 == VALUE_FALSE
    }

    /// Is this the abrupt-completion marker?
    #[inline]
    pub const fn is_exception(self) -> bool {
        self.0 == VALUE_EXCEPTION
    }

    // ==================== Payload access ====================

    /// Int payload; caller must have checked [`is_int`](Self::is_int)
    #[inline]
    pub const fn as_int(self) -> i32 {
        self.0 as u32 as i32
    }

    /// Double payload; caller must have checked [`is_double`](Self::is_double)
    #[inline]
    pub fn as_double(self) -> f64 {
        f64::from_bits(self.0.wrapping_sub(DOUBLE_ENCODE_OFFSET))
    }

    /// Numeric payload of an int or double
    #[inline]
    pub fn as_number(self) -> f64 {
        if self.is_int() {
            self.as_int() as f64
        } else {
            debug_assert!(self.is_double());
            self.as_double()
        }
    }

    /// Boolean payload; caller must have checked [`is_boolean`](Self::is_boolean)
    #[inline]
    pub const fn as_boolean(self) -> bool {
        self.0 == VALUE_TRUE
    }

    /// Heap arena index; caller must have checked [`is_heap_ref`](Self::is_heap_ref)
    #[inline]
    pub const fn heap_index(self) -> usize {
        ((self.0 >> 3) - 2) as usize
    }
}

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "Int({})", self.as_int())
        } else if self.is_double() {
            write!(f, "Double({})", self.as_double())
        } else if self.is_heap_ref() {
            write!(f, "Ref({})", self.heap_index())
        } else {
            match self.0 {
                VALUE_HOLE => write!(f, "Hole"),
                VALUE_UNDEFINED => write!(f, "Undefined"),
                VALUE_NULL => write!(f, "Null"),
                VALUE_TRUE => write!(f, "True"),
                VALUE_FALSE => write!(f, "False"),
                VALUE_EXCEPTION => write!(f, "Exception"),
                bits => write!(f, "Invalid({:#018x})", bits),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        for v in [0, 1, -1, i32::MAX, i32::MIN, 0x3FFF_FFFF] {
            let tagged = TaggedValue::int(v);
            assert!(tagged.is_int());
            assert!(!tagged.is_double());
            assert!(!tagged.is_heap_ref());
            assert_eq!(tagged.as_int(), v);
        }
    }

    #[test]
    fn double_roundtrip() {
        for v in [0.0, -0.0, 1.5, f64::MAX, f64::MIN, f64::INFINITY, f64::NEG_INFINITY, 2147483648.0] {
            let tagged = TaggedValue::double(v);
            assert!(tagged.is_double(), "{v} should be tagged as double");
            assert!(!tagged.is_int());
            assert!(!tagged.is_heap_ref());
            assert_eq!(tagged.as_double().to_bits(), v.to_bits());
        }
    }

    #[test]
    fn nan_is_canonicalized() {
        let weird_nan = f64::from_bits(0xFFFF_DEAD_BEEF_0000);
        assert!(weird_nan.is_nan());
        let tagged = TaggedValue::double(weird_nan);
        assert!(tagged.is_double());
        assert!(tagged.as_double().is_nan());
    }

    #[test]
    fn int_and_double_of_same_value_are_distinct_encodings() {
        let int = TaggedValue::int(7);
        let double = TaggedValue::double(7.0);
        assert_ne!(int, double);
        assert_eq!(int.as_number(), double.as_number());
    }

    #[test]
    fn heap_ref_roundtrip() {
        for index in [0usize, 1, 255, 100_000] {
            let tagged = TaggedValue::heap_ref(index);
            assert!(tagged.is_heap_ref());
            assert!(!tagged.is_number());
            assert!(!tagged.is_undefined());
            assert_eq!(tagged.heap_index(), index);
        }
    }

    #[test]
    fn specials_are_pairwise_distinct() {
        let specials = [
            TaggedValue::HOLE,
            TaggedValue::UNDEFINED,
            TaggedValue::NULL,
            TaggedValue::TRUE,
            TaggedValue::FALSE,
            TaggedValue::EXCEPTION,
        ];
        for (i, a) in specials.iter().enumerate() {
            for (j, b) in specials.iter().enumerate() {
                assert_eq!(i == j, a == b);
            }
            assert!(!a.is_number());
            assert!(!a.is_heap_ref());
        }
    }

    #[test]
    fn hole_is_not_undefined() {
        assert!(TaggedValue::HOLE.is_hole());
        assert!(!TaggedValue::HOLE.is_undefined());
        assert!(TaggedValue::UNDEFINED.is_undefined());
        assert!(!TaggedValue::UNDEFINED.is_hole());
    }

    #[test]
    fn zeroed_memory_reads_as_hole() {
        assert!(TaggedValue::from_raw(0).is_hole());
    }
}
