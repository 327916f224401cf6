/// Rounds a byte count up to the next multiple of the header unit.
///
/// # Examples
///
/// ```rust
/// use rfalloc::{UNIT, align};
///
/// assert_eq!(align!(0), 0);
/// assert_eq!(align!(1), UNIT);
/// assert_eq!(align!(UNIT + 1), 2 * UNIT);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::UNIT - 1) & !($crate::UNIT - 1)
  };
}

/// Number of header units a block needs to carry `bytes` of payload,
/// counting the header's own unit.
///
/// Returns `None` when the computation overflows `usize`.
///
/// ```rust
/// use rfalloc::{UNIT, units_for};
///
/// assert_eq!(units_for(0), Some(1));
/// assert_eq!(units_for(UNIT), Some(2));
/// assert_eq!(units_for(UNIT + 1), Some(3));
/// assert_eq!(units_for(usize::MAX), None);
/// ```
pub fn units_for(bytes: usize) -> Option<usize> {
  let payload = bytes.checked_add(crate::UNIT - 1)? / crate::UNIT;
  payload.checked_add(1)
}

/// Byte length of `units` header units, `None` on overflow.
pub fn unit_bytes(units: usize) -> Option<usize> {
  units.checked_mul(crate::UNIT)
}
