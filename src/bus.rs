//! Register bus abstraction and hardware-wait helper
//!
//! The engine never touches MMIO directly; everything goes through
//! [`ClkBus`], which a firmware build implements over raw pointer access and
//! the tests implement over an array. The trait requires a
//! [`DelayNs`] provider because every hardware sequence in the clock tree
//! interleaves register writes with settle delays and bounded polls.

use embedded_hal::delay::DelayNs;

use crate::{Error, Status};

/// Plain 32-bit MMIO semantics: a `write32` must be observable by the next
/// `read32` of the same address, which the engine relies on for its
/// read-back-after-write ordering points.
pub trait ClkBus: DelayNs {
    fn read32(&mut self, addr: u32) -> u32;
    fn write32(&mut self, addr: u32, value: u32);
}

/// Busy-polls `done` until it reports true or `timeout_ns` of delay has been
/// spent, then performs one final unconditional check.
///
/// The shape is always the same for clock hardware: optional settle delay,
/// an immediate optimistic check, a bounded poll loop, and a last check at
/// the deadline so that completion racing the final poll interval is not
/// misreported as [`Error::Timeout`].
pub fn wait_until<B, F>(
    bus: &mut B,
    settle_ns: u32,
    poll_ns: u32,
    timeout_ns: u32,
    mut done: F,
) -> Status
where
    B: ClkBus,
    F: FnMut(&mut B) -> bool,
{
    debug_assert!(poll_ns > 0);
    if settle_ns > 0 {
        bus.delay_ns(settle_ns);
    }
    if done(bus) {
        return Ok(());
    }
    let mut waited = 0u32;
    while waited < timeout_ns {
        bus.delay_ns(poll_ns);
        waited = waited.saturating_add(poll_ns);
        if done(bus) {
            return Ok(());
        }
    }
    // Completion may have landed exactly at the deadline.
    if done(bus) {
        Ok(())
    } else {
        Err(Error::Timeout)
    }
}
