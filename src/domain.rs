//! Frequency domains and the domain lookup table
//!
//! A domain is the unit external callers deal in: one per clock consumer
//! (graphics core, memory, display, ...), each owning the root of its
//! subgraph and the policy questions the graph itself cannot answer -- what
//! target frequencies are acceptable and how many phases a transition needs.
//!
//! The [`DomainTable`] is the sole entry point for the rest of the
//! firmware: a fixed array indexed by [`DomainId`], with entries left empty
//! on chips that do not have the domain.

use embedded_time::rate::Kilohertz;

use crate::bus::ClkBus;
use crate::schematic::{Schematic, SrcId, MAX_PHASE_COUNT};
use crate::signal::{Signal, TargetSignal};
use crate::{Error, Status};

/// Clock domain identifiers across the chip family.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DomainId {
    Gpc,
    Xbar,
    Sys,
    Hub,
    Disp,
    Mem,
    Host,
    Utils,
}

pub const DOMAIN_COUNT: usize = 8;

impl DomainId {
    fn index(self) -> usize {
        self as usize
    }
}

/// One clock domain: a root node plus domain-level policy.
#[derive(Debug)]
pub struct FreqDomain {
    root: SrcId,
    /// Supported target window in kHz; `None` accepts anything the
    /// hardware can express.
    range: Option<(u32, u32)>,
    phases: u8,
}

impl FreqDomain {
    pub fn new(root: SrcId) -> Self {
        FreqDomain {
            root,
            range: None,
            phases: 1,
        }
    }

    /// Restricts the targets this domain will accept.
    pub fn range(mut self, min: impl Into<Kilohertz>, max: impl Into<Kilohertz>) -> Self {
        self.range = Some((min.into().0, max.into().0));
        self
    }

    /// Number of phases a transition on this domain uses. A bare divider
    /// move needs one; a PLL power-cycle with a post-lock settle wants more.
    pub fn phases(mut self, phases: u8) -> Self {
        assert!(
            phases >= 1 && (phases as usize) < MAX_PHASE_COUNT,
            "domain phase count out of range"
        );
        self.phases = phases;
        self
    }

    pub fn phases_needed(&self) -> u8 {
        self.phases
    }

    /// Samples the hardware and reports what the domain is producing.
    pub fn read<B: ClkBus>(&self, g: &mut Schematic, bus: &mut B) -> Result<Signal, Error> {
        let mut out = Signal::EMPTY;
        g.read_src(self.root, bus, true, &mut out)?;
        Ok(out)
    }

    /// Stages coefficients for `target` into `phase` and reports the
    /// frequency the hardware will actually produce. No register writes.
    pub fn config<B: ClkBus>(
        &self,
        g: &mut Schematic,
        bus: &mut B,
        target: &TargetSignal,
        phase: usize,
        hot: bool,
    ) -> Result<Signal, Error> {
        if let Some((min, max)) = self.range {
            if target.freq_khz < min || target.freq_khz > max {
                return Err(Error::FreqNotSupported);
            }
        }
        let mut out = Signal::EMPTY;
        g.config_src(self.root, bus, *target, phase, hot, &mut out)?;
        Ok(out)
    }

    /// Commits one staged phase to hardware. Callers walk phases in
    /// increasing order; the engine never retries across phases.
    pub fn program<B: ClkBus>(&self, g: &mut Schematic, bus: &mut B, phase: usize) -> Status {
        g.program_src(self.root, bus, phase)
    }

    /// Powers down whatever the transition left unused and collapses the
    /// phase arrays back to steady state.
    pub fn cleanup<B: ClkBus>(&self, g: &mut Schematic, bus: &mut B, active: bool) -> Status {
        g.cleanup_src(self.root, bus, active)
    }
}

/// Domain lookup table; the external entry point to the engine.
pub struct DomainTable {
    entries: [Option<FreqDomain>; DOMAIN_COUNT],
}

impl DomainTable {
    pub fn new() -> Self {
        const NONE: Option<FreqDomain> = None;
        DomainTable {
            entries: [NONE; DOMAIN_COUNT],
        }
    }

    pub fn set(&mut self, id: DomainId, domain: FreqDomain) {
        self.entries[id.index()] = Some(domain);
    }

    /// `None` means the domain does not exist on this chip.
    pub fn get(&self, id: DomainId) -> Option<&FreqDomain> {
        self.entries[id.index()].as_ref()
    }
}

impl Default for DomainTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::{TestBus, WINDOW};
    use crate::field::BitField;
    use crate::ldiv::LinDiv;
    use crate::mux::Mux;
    use crate::pll::{HybridPll, PllRegs};
    use crate::signal::{SignalPath, SignalSource};
    use crate::xtal::Crystal;
    use embedded_time::rate::Kilohertz;

    const PLL_REGS: PllRegs = PllRegs {
        cfg: 0x40,
        coeff: 0x44,
        cfg2: 0x48,
        cfg4: 0x4C,
    };
    const CTRL: u32 = 0x10;
    const SEL: BitField = BitField::new(0x0000_0003, 0);
    const DIV: BitField = BitField::new(0x0000_3F00, 8);

    fn lock_on_enable(regs: &mut [u32; WINDOW], index: usize, value: u32) {
        if index == (PLL_REGS.cfg >> 2) as usize {
            if value & 0x1 != 0 && value & 0x2 == 0 {
                regs[index] |= 0x0002_0000;
            } else {
                regs[index] &= !0x0002_0000;
            }
        }
    }

    /// Crystal -> HybridPll -> Mux(0: bypass crystal, 1: pll) -> /2
    fn schematic() -> (Schematic, DomainTable) {
        let mut g = Schematic::new();
        let xtal = g.add(Crystal::new(SignalSource::Xtal, Kilohertz(27_000)));
        let pll = g.add(HybridPll::new(SignalSource::Pll, xtal, PLL_REGS, 1));
        let mux = g.add(
            Mux::new(CTRL)
                .input(0, xtal, SEL.value(0))
                .input(1, pll, SEL.value(1)),
        );
        let root = g.add(LinDiv::new(mux, CTRL, DIV));
        let mut domains = DomainTable::new();
        domains.set(
            DomainId::Sys,
            FreqDomain::new(root)
                .range(Kilohertz(13_500), Kilohertz(810_000))
                .phases(1),
        );
        (g, domains)
    }

    #[test]
    fn absent_domains_read_as_none() {
        let (_, domains) = schematic();
        assert!(domains.get(DomainId::Sys).is_some());
        assert!(domains.get(DomainId::Disp).is_none());
    }

    #[test]
    fn out_of_range_targets_are_rejected_at_the_domain() {
        let (mut g, domains) = schematic();
        let dom = domains.get(DomainId::Sys).unwrap();
        let mut bus = TestBus::new();
        let target = TargetSignal::new(Kilohertz(900_000));
        assert_eq!(
            dom.config(&mut g, &mut bus, &target, 1, false),
            Err(Error::FreqNotSupported)
        );
    }

    #[test]
    fn full_transition_config_program_read() {
        let (mut g, domains) = schematic();
        let dom = domains.get(DomainId::Sys).unwrap();
        let mut bus = TestBus::with_hook(lock_on_enable);
        bus.poke(CTRL, 1 << 8); // divider at /2, mux parked on bypass

        // 405 MHz through the pll input: pll runs at 810 MHz, NDIV 30
        let target = TargetSignal::new(Kilohertz(405_000)).via(1);
        let staged = dom.config(&mut g, &mut bus, &target, 1, false).unwrap();
        assert_eq!(staged.freq_khz, 405_000);
        assert_eq!(staged.source, SignalSource::Pll);
        let mut path = staged.path;
        assert_eq!(path.pop(), 1);

        // nothing was written during config
        assert_eq!(bus.write_count(CTRL), 0);
        assert_eq!(bus.write_count(PLL_REGS.cfg), 0);

        assert_eq!(dom.program(&mut g, &mut bus, 1), Ok(()));

        let live = dom.read(&mut g, &mut bus).unwrap();
        assert_eq!(live.freq_khz, 405_000);
        assert_eq!(live.source, SignalSource::Pll);
        let mut path = live.path;
        assert_eq!(path.pop(), 1);
        assert_eq!(path.pop(), SignalPath::INDETERMINATE);
    }

    #[test]
    fn cleanup_after_moving_to_bypass_powers_the_pll_down() {
        let (mut g, domains) = schematic();
        let dom = domains.get(DomainId::Sys).unwrap();
        let mut bus = TestBus::with_hook(lock_on_enable);
        bus.poke(CTRL, 1 << 8);

        let target = TargetSignal::new(Kilohertz(405_000)).via(1);
        dom.config(&mut g, &mut bus, &target, 1, false).unwrap();
        assert_eq!(dom.program(&mut g, &mut bus, 1), Ok(()));

        // move back to the crystal bypass
        let target = TargetSignal::new(Kilohertz(13_500)).via(0);
        let staged = dom.config(&mut g, &mut bus, &target, 1, false).unwrap();
        assert_eq!(staged.freq_khz, 13_500);
        assert_eq!(dom.program(&mut g, &mut bus, 1), Ok(()));
        assert_eq!(dom.cleanup(&mut g, &mut bus, true), Ok(()));

        // pll no longer on the active path: disabled and powered down
        let cfg = bus.peek(PLL_REGS.cfg);
        assert_eq!(cfg & 0x1, 0); // enable
        assert_eq!(cfg & 0x2, 0x2); // iddq
        let live = dom.read(&mut g, &mut bus).unwrap();
        assert_eq!(live.freq_khz, 13_500);
        assert_eq!(live.source, SignalSource::Xtal);
    }

    #[test]
    fn domain_phase_policy_is_bounded() {
        let mut g = Schematic::new();
        let xtal = g.add(Crystal::new(SignalSource::Xtal, Kilohertz(27_000)));
        let dom = FreqDomain::new(xtal).phases(2);
        assert_eq!(dom.phases_needed(), 2);
    }
}
