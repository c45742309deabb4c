//! IRQ aggregation.
//!
//! The 6502's IRQ line is level-sensitive and shared by both VIAs. Any
//! source asserting its interrupt keeps the CPU's line asserted until every
//! source has cleared it (by the handler reading/writing the relevant
//! VIA register); there's nothing to latch here, just an OR of the two
//! VIAs' summary flags.

use crate::bus::BbcBus;

/// True if either VIA currently wants service.
#[must_use]
pub fn poll(bus: &BbcBus) -> bool {
    bus.system_via.irq_pending() || bus.user_via.irq_pending()
}
