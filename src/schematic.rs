//! The schematic: a static graph of frequency sources
//!
//! One [`Schematic`] instance per firmware build holds every frequency
//! source of the chip in a fixed arena; edges are [`SrcId`] indices. The
//! graph is wired once at init and never reshaped afterwards, but it is not
//! acyclic: bypass paths legitimately loop back, so every traversal runs
//! behind a per-node reentrancy guard instead of assuming a tree.
//!
//! The arena is also where the five-operation capability contract is
//! dispatched. Each operation takes the node out of its slot, runs the
//! primitive against the rest of the graph and puts it back, which keeps the
//! guard flag symmetric around every exit path, error returns included.

use crate::bus::ClkBus;
use crate::ldiv::LinDiv;
use crate::mux::Mux;
use crate::pll::HybridPll;
use crate::signal::{Signal, TargetSignal};
use crate::vco::{RoVco, RoVcoSdm};
use crate::wire::Wire;
use crate::xtal::Crystal;
use crate::{keep_first, Error, Status};

/// Capacity of the node arena. Real chips sit well under this.
pub const MAX_SRC_COUNT: usize = 24;

/// Length of every phase array. Phase 0 is always the last-known hardware
/// state; phases 1.. hold speculative future states staged by `config`.
pub const MAX_PHASE_COUNT: usize = 4;

/// Handle to a node in the schematic arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SrcId(u8);

impl SrcId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One frequency-source hardware primitive.
#[derive(Debug)]
pub enum FreqSrc {
    Xtal(Crystal),
    Wire(Wire),
    Mux(Mux),
    Ldiv(LinDiv),
    Vco(RoVco),
    VcoSdm(RoVcoSdm),
    Pll(HybridPll),
}

macro_rules! impl_from_src {
    ($($variant:ident($ty:ty),)+) => {
        $(impl From<$ty> for FreqSrc {
            fn from(src: $ty) -> FreqSrc {
                FreqSrc::$variant(src)
            }
        })+
    };
}

impl_from_src! {
    Xtal(Crystal),
    Wire(Wire),
    Mux(Mux),
    Ldiv(LinDiv),
    Vco(RoVco),
    VcoSdm(RoVcoSdm),
    Pll(HybridPll),
}

struct Slot {
    /// Reentrancy guard: true while a traversal is somewhere below this
    /// node. A second entry while set means the topology looped back.
    cycle: bool,
    src: Option<FreqSrc>,
}

/// The clock-tree graph of one chip.
pub struct Schematic {
    slots: [Slot; MAX_SRC_COUNT],
    count: usize,
}

impl Schematic {
    pub fn new() -> Self {
        const EMPTY: Slot = Slot {
            cycle: false,
            src: None,
        };
        Schematic {
            slots: [EMPTY; MAX_SRC_COUNT],
            count: 0,
        }
    }

    /// Adds a node to the arena.
    ///
    /// # Panics
    ///
    /// Panics when the arena is full; schematic wiring is compile-time data
    /// and an overflow is a build mistake, not a runtime condition.
    pub fn add(&mut self, src: impl Into<FreqSrc>) -> SrcId {
        assert!(self.count < MAX_SRC_COUNT, "schematic arena full");
        let id = SrcId(self.count as u8);
        self.slots[self.count].src = Some(src.into());
        self.count += 1;
        id
    }

    /// Borrow a node for inspection.
    ///
    /// # Panics
    ///
    /// Panics when `id` was never wired or the node is mid-traversal.
    pub fn node(&self, id: SrcId) -> &FreqSrc {
        self.slots[id.index()]
            .src
            .as_ref()
            .expect("inspection of unwired source")
    }

    /// One-time pre-use fixup hook for boot code that must patch register
    /// addresses it could not know at compile time (floorsweeping picks
    /// among redundant hardware units). Must not be called after the first
    /// traversal.
    pub fn fixup(&mut self, id: SrcId, patch: impl FnOnce(&mut FreqSrc)) {
        let src = self.slots[id.index()]
            .src
            .as_mut()
            .expect("fixup of unwired source");
        patch(src);
    }

    /// Primes every node's phase-0 cache by sampling hardware, so frequency
    /// queries are answerable before any transition has run. Part of boot
    /// construction, after fixups.
    pub fn prime<B: ClkBus>(&mut self, bus: &mut B) -> Status {
        let mut status = Ok(());
        let mut scratch = Signal::EMPTY;
        for n in 0..self.count {
            keep_first(&mut status, self.read_src(SrcId(n as u8), bus, false, &mut scratch));
        }
        status
    }

    /// Debug dump of every node's phase array and raw registers.
    pub fn print<B: ClkBus>(&self, bus: &mut B, phase_count: usize) {
        for n in 0..self.count {
            if let Some(src) = &self.slots[n].src {
                src.print(bus, phase_count, n);
            }
        }
    }

    fn take(&mut self, id: SrcId) -> FreqSrc {
        self.slots[id.index()]
            .src
            .take()
            .expect("traversal reached an unwired source")
    }

    fn put_back(&mut self, id: SrcId, src: FreqSrc) {
        let slot = &mut self.slots[id.index()];
        slot.src = Some(src);
        slot.cycle = false;
    }

    /// Samples hardware state below `id` into `out`.
    ///
    /// Best-effort over the whole subgraph: visits every input even after a
    /// failure and reports the first non-OK status.
    pub(crate) fn read_src<B: ClkBus>(
        &mut self,
        id: SrcId,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        let slot = &mut self.slots[id.index()];
        if slot.cycle {
            if active {
                return Err(Error::CycleDetected);
            }
            // Inert bypass loop; nothing meaningful to sample.
            *out = Signal::EMPTY;
            return Ok(());
        }
        slot.cycle = true;
        let mut src = self.take(id);
        let status = src.read(self, bus, active, out);
        self.put_back(id, src);
        status
    }

    /// Computes phase `phase` coefficients for the subgraph below `id`.
    /// Short-circuits on the first failure. No hardware writes.
    pub(crate) fn config_src<B: ClkBus>(
        &mut self,
        id: SrcId,
        bus: &mut B,
        target: TargetSignal,
        phase: usize,
        hot: bool,
        out: &mut Signal,
    ) -> Status {
        assert!(
            phase >= 1 && phase < MAX_PHASE_COUNT,
            "config phase out of range"
        );
        let slot = &mut self.slots[id.index()];
        if slot.cycle {
            if hot {
                return Err(Error::CycleDetected);
            }
            *out = Signal::EMPTY;
            return Ok(());
        }
        slot.cycle = true;
        let mut src = self.take(id);
        let status = src.config(self, bus, target, phase, hot, out);
        self.put_back(id, src);
        status
    }

    /// Commits phase `phase` to hardware, inputs before consumers.
    /// Short-circuits on the first failure.
    pub(crate) fn program_src<B: ClkBus>(
        &mut self,
        id: SrcId,
        bus: &mut B,
        phase: usize,
    ) -> Status {
        assert!(
            phase >= 1 && phase < MAX_PHASE_COUNT,
            "program phase out of range"
        );
        let slot = &mut self.slots[id.index()];
        if slot.cycle {
            // program follows the single configured path; looping back on
            // it means the staged configuration is inconsistent.
            return Err(Error::CycleDetected);
        }
        slot.cycle = true;
        let mut src = self.take(id);
        let status = src.program(self, bus, phase);
        self.put_back(id, src);
        status
    }

    /// Powers down whatever the active path no longer uses and collapses
    /// every phase array back to steady state. Visits every input even
    /// after a failure.
    pub(crate) fn cleanup_src<B: ClkBus>(
        &mut self,
        id: SrcId,
        bus: &mut B,
        active: bool,
    ) -> Status {
        let slot = &mut self.slots[id.index()];
        if slot.cycle {
            if active {
                return Err(Error::CycleDetected);
            }
            return Ok(());
        }
        slot.cycle = true;
        let mut src = self.take(id);
        let status = src.cleanup(self, bus, active);
        self.put_back(id, src);
        status
    }
}

impl FreqSrc {
    fn read<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        match self {
            FreqSrc::Xtal(x) => x.read(g, bus, active, out),
            FreqSrc::Wire(w) => w.read(g, bus, active, out),
            FreqSrc::Mux(m) => m.read(g, bus, active, out),
            FreqSrc::Ldiv(d) => d.read(g, bus, active, out),
            FreqSrc::Vco(v) => v.read(g, bus, active, out),
            FreqSrc::VcoSdm(v) => v.read(g, bus, active, out),
            FreqSrc::Pll(p) => p.read(g, bus, active, out),
        }
    }

    fn config<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        target: TargetSignal,
        phase: usize,
        hot: bool,
        out: &mut Signal,
    ) -> Status {
        match self {
            FreqSrc::Xtal(x) => x.config(g, bus, target, phase, hot, out),
            FreqSrc::Wire(w) => w.config(g, bus, target, phase, hot, out),
            FreqSrc::Mux(m) => m.config(g, bus, target, phase, hot, out),
            FreqSrc::Ldiv(d) => d.config(g, bus, target, phase, hot, out),
            FreqSrc::Vco(_) | FreqSrc::VcoSdm(_) => Err(Error::Unsupported),
            FreqSrc::Pll(p) => p.config(g, bus, target, phase, hot, out),
        }
    }

    fn program<B: ClkBus>(&mut self, g: &mut Schematic, bus: &mut B, phase: usize) -> Status {
        match self {
            FreqSrc::Xtal(_) => Ok(()),
            FreqSrc::Wire(w) => w.program(g, bus, phase),
            FreqSrc::Mux(m) => m.program(g, bus, phase),
            FreqSrc::Ldiv(d) => d.program(g, bus, phase),
            FreqSrc::Vco(_) | FreqSrc::VcoSdm(_) => Err(Error::Unsupported),
            FreqSrc::Pll(p) => p.program(g, bus, phase),
        }
    }

    fn cleanup<B: ClkBus>(&mut self, g: &mut Schematic, bus: &mut B, active: bool) -> Status {
        match self {
            FreqSrc::Xtal(_) => Ok(()),
            FreqSrc::Wire(w) => w.cleanup(g, bus, active),
            FreqSrc::Mux(m) => m.cleanup(g, bus, active),
            FreqSrc::Ldiv(d) => d.cleanup(g, bus, active),
            FreqSrc::Vco(_) | FreqSrc::VcoSdm(_) => Err(Error::Unsupported),
            FreqSrc::Pll(p) => p.cleanup(g, bus, active),
        }
    }

    fn print<B: ClkBus>(&self, bus: &mut B, phase_count: usize, index: usize) {
        match self {
            FreqSrc::Xtal(x) => log::debug!("src[{}] {:?}", index, x),
            FreqSrc::Wire(w) => log::debug!("src[{}] {:?}", index, w),
            FreqSrc::Mux(m) => m.print(bus, phase_count, index),
            FreqSrc::Ldiv(d) => d.print(bus, phase_count, index),
            FreqSrc::Vco(v) => v.print(bus, phase_count, index),
            FreqSrc::VcoSdm(v) => v.print(bus, phase_count, index),
            FreqSrc::Pll(p) => p.print(bus, phase_count, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::TestBus;
    use crate::signal::SignalSource;
    use embedded_time::rate::Kilohertz;

    #[test]
    fn prime_seeds_caches_for_every_node() {
        let mut g = Schematic::new();
        let xtal = g.add(Crystal::new(SignalSource::Xtal, Kilohertz(27_000)));
        let _wire = g.add(Wire::new(xtal));
        let mut bus = TestBus::new();
        assert_eq!(g.prime(&mut bus), Ok(()));
    }

    #[test]
    fn fixup_can_patch_before_first_use() {
        let mut g = Schematic::new();
        let xtal = g.add(Crystal::new(SignalSource::Xtal, Kilohertz(27_000)));
        g.fixup(xtal, |src| {
            if let FreqSrc::Xtal(x) = src {
                *x = Crystal::new(SignalSource::Xtal, Kilohertz(26_000));
            }
        });
        let mut bus = TestBus::new();
        let mut out = Signal::EMPTY;
        assert_eq!(g.read_src(xtal, &mut bus, true, &mut out), Ok(()));
        assert_eq!(out.freq_khz, 26_000);
    }

    #[test]
    #[should_panic(expected = "config phase out of range")]
    fn phase_zero_config_is_a_protocol_violation() {
        let mut g = Schematic::new();
        let xtal = g.add(Crystal::new(SignalSource::Xtal, Kilohertz(27_000)));
        let mut bus = TestBus::new();
        let mut out = Signal::EMPTY;
        let _ = g.config_src(
            xtal,
            &mut bus,
            TargetSignal::new(Kilohertz(27_000)),
            0,
            false,
            &mut out,
        );
    }
}
