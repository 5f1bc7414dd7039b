//! Hybrid PLL
//!
//! The one PLL in the family that this engine programs itself, and the
//! canonical example of the staging discipline: `config` speculates a phase
//! of coefficients, `program` commits it with a bounded lock-retry protocol,
//! `cleanup` powers the unit down and collapses the phases.
//!
//! The hardware accepts two reprogramming routes. A live PLL may only be
//! moved via its dynamic NDIV ramp, and only when MDIV and PLDIV stay put;
//! anything else requires a full power cycle with the unit disabled. The
//! fractional feedback path exists in the registers but is kept programmed
//! to zero: the sigma-delta stage over/undershoots on this silicon.

use crate::bus::{wait_until, ClkBus};
use crate::field::BitField;
use crate::fixp::{mul_q13_khz, q13, q13_round, Q13_ONE};
use crate::schematic::{Schematic, SrcId, MAX_PHASE_COUNT};
use crate::signal::{Signal, SignalPath, SignalSource, TargetSignal};
use crate::{Error, Status};

/// Reference frequency; the input of this PLL is always the crystal,
/// directly or through fixed dividers.
pub const REF_KHZ: u32 = 27_000;
/// VCO operating range.
pub const VCO_MIN_KHZ: u32 = 800_000;
pub const VCO_MAX_KHZ: u32 = 1_620_000;
/// MDIV never moves on this unit.
pub const MDIV_FIXED: u8 = 1;
/// Feedback range implied by the VCO range at the fixed reference.
pub const NDIV_MIN: u32 = (VCO_MIN_KHZ + REF_KHZ - 1) / REF_KHZ;
pub const NDIV_MAX: u32 = VCO_MAX_KHZ / REF_KHZ;

/// Settle after disabling the unit on the cold path.
const DISABLE_SETTLE_NS: u32 = 5_000;
/// Lock poll interval and total budget.
const LOCK_POLL_NS: u32 = 5_000;
const LOCK_TIMEOUT_NS: u32 = 1_000_000;
/// Lock attempts for a cold switch. A hot switch gets exactly one: the
/// dynamic ramp is the only legal route and a retry would power-cycle.
const COLD_RETRIES: u32 = 3;
/// Minimum fractional-NDIV step; programs the slowest, safest ramp slope.
const DYN_RAMP_STEP_MIN: u32 = 1;

// Config register.
const CFG_ENABLE: BitField = BitField::new(0x0000_0001, 0);
const CFG_IDDQ: BitField = BitField::new(0x0000_0002, 1); // 1 = powered down
const CFG_SYNC_MODE: BitField = BitField::new(0x0000_0004, 2);
const CFG_LOCK: BitField = BitField::new(0x0002_0000, 17); // read-only

// Coefficient register.
const COEFF_MDIV: BitField = BitField::new(0x0000_00FF, 0);
const COEFF_PLDIV: BitField = BitField::new(0x0000_FF00, 8);

// Second config register: dynamic ramp step control.
const CFG2_FRAC_STEP: BitField = BitField::new(0x0000_000F, 0);

// Fourth config register: integer and fractional feedback.
const CFG4_NDIV: BitField = BitField::new(0x0000_00FF, 0);
const CFG4_NDIV_FRAC: BitField = BitField::new(0x1FFF_0000, 16);

/// The four register addresses of one hybrid PLL instance. Kept as plain
/// data so boot floorsweeping fixups can rewrite them.
#[derive(Debug, Copy, Clone)]
pub struct PllRegs {
    pub cfg: u32,
    pub coeff: u32,
    pub cfg2: u32,
    pub cfg4: u32,
}

/// One staged hardware state. All-zero coefficients mean the PLL is
/// considered disabled for that phase.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PllPhase {
    pub hot: bool,
    pub mdiv: u8,
    pub ndiv: u8,
    pub pldiv: u8,
}

#[derive(Debug)]
pub struct HybridPll {
    source: SignalSource,
    input: SrcId,
    regs: PllRegs,
    /// Post-divider target; like MDIV it never moves at runtime.
    pldiv: u8,
    phases: [PllPhase; MAX_PHASE_COUNT],
}

impl HybridPll {
    pub fn new(source: SignalSource, input: SrcId, regs: PllRegs, pldiv: u8) -> Self {
        assert!(pldiv > 0, "pldiv of zero is not a divider");
        HybridPll {
            source,
            input,
            regs,
            pldiv,
            phases: [PllPhase::default(); MAX_PHASE_COUNT],
        }
    }

    /// Staged coefficients for one phase; used by the tests and by the
    /// domain-level policy deciding how many phases a transition needs.
    pub fn phase(&self, phase: usize) -> PllPhase {
        self.phases[phase]
    }

    pub(crate) fn read<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        let cfg = bus.read32(self.regs.cfg);
        if CFG_ENABLE.read(cfg) == 0 {
            // Disabled hardware is the canonical empty state.
            *out = Signal::EMPTY;
            self.phases = [PllPhase::default(); MAX_PHASE_COUNT];
            return Ok(());
        }

        let coeff = bus.read32(self.regs.coeff);
        let mdiv = COEFF_MDIV.read(coeff);
        let pldiv = COEFF_PLDIV.read(coeff);
        let cfg4 = bus.read32(self.regs.cfg4);
        let ndiv = CFG4_NDIV.read(cfg4);
        // config/program never produce a fraction, but external agents can.
        let frac = CFG4_NDIV_FRAC.read(cfg4);

        let status = g.read_src(self.input, bus, active, out);
        if mdiv == 0 || pldiv == 0 {
            *out = Signal::EMPTY;
            return status.and(Err(Error::InvalidState));
        }

        let freq = mul_q13_khz(out.freq_khz, q13(ndiv, frac), mdiv * pldiv)
            .expect("pll output overflows kHz word");
        out.freq_khz = freq;
        out.source = self.source;
        for phase in self.phases.iter_mut() {
            *phase = PllPhase {
                hot: false,
                mdiv: mdiv as u8,
                ndiv: ndiv as u8,
                pldiv: pldiv as u8,
            };
        }
        status
    }

    pub(crate) fn config<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        target: TargetSignal,
        phase: usize,
        hot: bool,
        out: &mut Signal,
    ) -> Status {
        // The reference is fixed; configure the input to exactly it and
        // check rather than compute.
        let mut reference = Signal::EMPTY;
        let ref_target = TargetSignal {
            freq_khz: REF_KHZ,
            path: SignalPath::EMPTY,
        };
        g.config_src(self.input, bus, ref_target, phase, hot, &mut reference)?;
        if reference.freq_khz != REF_KHZ {
            return Err(Error::InvalidState);
        }

        let previous = self.phases[phase - 1];
        let staged = &mut self.phases[phase];
        staged.hot = hot;
        staged.mdiv = MDIV_FIXED;
        staged.pldiv = self.pldiv;
        // Note the order: mdiv/pldiv are already staged when a hot switch
        // is refused; ndiv and the later phases stay untouched.
        if hot && (staged.mdiv != previous.mdiv || staged.pldiv != previous.pldiv) {
            return Err(Error::InvalidState);
        }

        // Full-precision feedback in Q13, then round away the fraction the
        // hardware is not allowed to carry. The discarded half-step still
        // rounds the integer part to nearest.
        let numerator =
            target.freq_khz as u64 * MDIV_FIXED as u64 * self.pldiv as u64 * Q13_ONE as u64;
        let ndiv_q13 = (numerator + REF_KHZ as u64 / 2) / REF_KHZ as u64;
        let ndiv = q13_round(ndiv_q13);
        if ndiv < NDIV_MIN as u64 || ndiv > NDIV_MAX as u64 {
            return Err(Error::FreqNotSupported);
        }
        staged.ndiv = ndiv as u8;
        let staged = self.phases[phase];
        for p in phase + 1..MAX_PHASE_COUNT {
            self.phases[p] = staged;
        }

        // Report what the integer feedback will actually produce, not the
        // requested value.
        let freq = mul_q13_khz(
            REF_KHZ,
            q13(ndiv as u32, 0),
            staged.mdiv as u32 * staged.pldiv as u32,
        )
        .expect("pll output overflows kHz word");
        *out = Signal {
            source: self.source,
            freq_khz: freq,
            path: reference.path,
        };
        Ok(())
    }

    pub(crate) fn program<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        phase: usize,
    ) -> Status {
        g.program_src(self.input, bus, phase)?;

        let previous = self.phases[phase - 1];
        let staged = self.phases[phase];
        assert!(staged.ndiv != 0, "pll programmed without a configured phase");

        let mut retries = if staged.hot { 1 } else { COLD_RETRIES };
        loop {
            let mut cfg = bus.read32(self.regs.cfg);
            let powered = CFG_IDDQ.read(cfg) == 0;
            let mut enabled = CFG_ENABLE.read(cfg) == 1;

            if powered && enabled && staged.mdiv == previous.mdiv && staged.pldiv == previous.pldiv
            {
                // Dynamic ramp: slew NDIV in place. The read-back forces
                // the step setting to land before the NDIV write.
                let cfg2 = bus.read32(self.regs.cfg2);
                bus.write32(
                    self.regs.cfg2,
                    CFG2_FRAC_STEP.value(DYN_RAMP_STEP_MIN).apply(cfg2),
                );
                let _ = bus.read32(self.regs.cfg2);
            } else if staged.hot {
                // A live PLL may only be moved by the ramp.
                return Err(Error::InvalidState);
            } else {
                // Cold path: full power cycle with the unit disabled.
                cfg = CFG_IDDQ.value(0).apply(cfg);
                bus.write32(self.regs.cfg, cfg);
                cfg = CFG_SYNC_MODE.value(0).apply(cfg);
                cfg = CFG_ENABLE.value(0).apply(cfg);
                bus.write32(self.regs.cfg, cfg);
                let _ = bus.read32(self.regs.cfg);
                bus.delay_ns(DISABLE_SETTLE_NS);

                let mut coeff = bus.read32(self.regs.coeff);
                coeff = COEFF_MDIV.value(staged.mdiv as u32).apply(coeff);
                coeff = COEFF_PLDIV.value(staged.pldiv as u32).apply(coeff);
                bus.write32(self.regs.coeff, coeff);
                let _ = bus.read32(self.regs.coeff);
                enabled = false;
            }

            // New feedback, fraction forced to zero.
            let mut cfg4 = bus.read32(self.regs.cfg4);
            cfg4 = CFG4_NDIV.value(staged.ndiv as u32).apply(cfg4);
            cfg4 = CFG4_NDIV_FRAC.value(0).apply(cfg4);
            bus.write32(self.regs.cfg4, cfg4);
            let _ = bus.read32(self.regs.cfg4);

            if !enabled {
                let cfg = bus.read32(self.regs.cfg);
                bus.write32(self.regs.cfg, CFG_ENABLE.value(1).apply(cfg));
                let _ = bus.read32(self.regs.cfg);
            }

            let regs = self.regs;
            let locked = wait_until(bus, 0, LOCK_POLL_NS, LOCK_TIMEOUT_NS, |b| {
                CFG_LOCK.read(b.read32(regs.cfg)) == 1
            });
            if locked.is_ok() {
                break;
            }

            retries -= 1;
            if retries == 0 {
                // Leave the unit powered; it may still lock on its own and
                // the caller decides what to do with the domain.
                return Err(Error::Timeout);
            }
            // Force the cold path on the next attempt.
            let cfg = bus.read32(self.regs.cfg);
            let off = CFG_SYNC_MODE
                .value(0)
                .or(CFG_ENABLE.value(0))
                .or(CFG_IDDQ.value(1));
            bus.write32(self.regs.cfg, off.apply(cfg));
        }

        // Locked: sync mode back on.
        let cfg = bus.read32(self.regs.cfg);
        bus.write32(self.regs.cfg, CFG_SYNC_MODE.value(1).apply(cfg));
        Ok(())
    }

    pub(crate) fn cleanup<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
    ) -> Status {
        let status = g.cleanup_src(self.input, bus, active);

        if !active {
            // Three separate writes, each preserving unrelated fields.
            let cfg = bus.read32(self.regs.cfg);
            bus.write32(self.regs.cfg, CFG_SYNC_MODE.value(0).apply(cfg));
            let cfg = bus.read32(self.regs.cfg);
            bus.write32(self.regs.cfg, CFG_ENABLE.value(0).apply(cfg));
            let cfg = bus.read32(self.regs.cfg);
            bus.write32(self.regs.cfg, CFG_IDDQ.value(1).apply(cfg));
        }

        let last = self.phases[MAX_PHASE_COUNT - 1];
        for phase in self.phases.iter_mut() {
            *phase = last;
        }
        status
    }

    pub(crate) fn print<B: ClkBus>(&self, bus: &mut B, phase_count: usize, index: usize) {
        log::debug!(
            "src[{}] pll cfg={:#010x} coeff={:#010x} cfg4={:#010x}",
            index,
            bus.read32(self.regs.cfg),
            bus.read32(self.regs.coeff),
            bus.read32(self.regs.cfg4)
        );
        for p in 0..phase_count.min(MAX_PHASE_COUNT) {
            log::trace!("  phase[{}] {:?}", p, self.phases[p]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::{TestBus, WINDOW};
    use crate::xtal::Crystal;
    use embedded_time::rate::Kilohertz;

    const REGS: PllRegs = PllRegs {
        cfg: 0x40,
        coeff: 0x44,
        cfg2: 0x48,
        cfg4: 0x4C,
    };

    fn pll(g: &mut Schematic) -> SrcId {
        let xtal = g.add(Crystal::new(SignalSource::Xtal, Kilohertz(REF_KHZ)));
        g.add(HybridPll::new(SignalSource::Pll, xtal, REGS, 1))
    }

    fn lock_on_enable(regs: &mut [u32; WINDOW], index: usize, value: u32) {
        if index == (REGS.cfg >> 2) as usize {
            if value & 0x1 != 0 && value & 0x2 == 0 {
                regs[index] |= 0x0002_0000; // lock follows enable while powered
            } else {
                regs[index] &= !0x0002_0000;
            }
        }
    }

    fn staged(g: &Schematic, id: SrcId, phase: usize) -> PllPhase {
        match g.node(id) {
            crate::schematic::FreqSrc::Pll(p) => p.phase(phase),
            _ => panic!("not a pll"),
        }
    }

    #[test]
    fn ndiv_bounds_follow_the_vco_range() {
        assert_eq!(NDIV_MIN, 30);
        assert_eq!(NDIV_MAX, 60);
    }

    #[test]
    fn config_accepts_the_ndiv_window_and_rejects_outside() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::new();
        let mut out = Signal::EMPTY;

        // 810 MHz: exactly NDIV 30
        let t = TargetSignal::new(Kilohertz(810_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        assert_eq!(out.freq_khz, 810_000);
        assert_eq!(out.source, SignalSource::Pll);
        assert_eq!(staged(&g, id, 1).ndiv, 30);

        // 790 MHz rounds to NDIV 29: below the VCO floor
        let t = TargetSignal::new(Kilohertz(790_000));
        assert_eq!(
            g.config_src(id, &mut bus, t, 1, false, &mut out),
            Err(Error::FreqNotSupported)
        );

        // 1.62 GHz: exactly NDIV 60
        let t = TargetSignal::new(Kilohertz(1_620_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        assert_eq!(staged(&g, id, 1).ndiv, 60);

        // just past the ceiling
        let t = TargetSignal::new(Kilohertz(1_634_000));
        assert_eq!(
            g.config_src(id, &mut bus, t, 1, false, &mut out),
            Err(Error::FreqNotSupported)
        );
    }

    #[test]
    fn config_reports_the_achievable_frequency_not_the_request() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::new();
        let mut out = Signal::EMPTY;
        // 815 MHz rounds to NDIV 30 -> 810 MHz actual
        let t = TargetSignal::new(Kilohertz(815_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        assert_eq!(out.freq_khz, 810_000);
    }

    #[test]
    fn hot_switch_with_changed_pldiv_leaves_documented_partial_state() {
        let mut g = Schematic::new();
        let xtal = g.add(Crystal::new(SignalSource::Xtal, Kilohertz(REF_KHZ)));
        let id = g.add(HybridPll::new(SignalSource::Pll, xtal, REGS, 2));
        let mut bus = TestBus::new();
        let mut out = Signal::EMPTY;

        // phase 1: previous state has pldiv 0 (never ran), so a hot config
        // asking for pldiv 2 must be refused...
        let t = TargetSignal::new(Kilohertz(405_000));
        assert_eq!(
            g.config_src(id, &mut bus, t, 1, true, &mut out),
            Err(Error::InvalidState)
        );
        // ...with mdiv/pldiv already staged and ndiv untouched.
        let p1 = staged(&g, id, 1);
        assert_eq!(p1.mdiv, MDIV_FIXED);
        assert_eq!(p1.pldiv, 2);
        assert_eq!(p1.ndiv, 0);
        // later phases were not forward-copied
        assert_eq!(staged(&g, id, 2), PllPhase::default());
    }

    #[test]
    fn cold_program_locks_and_enables_sync_mode() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::with_hook(lock_on_enable);
        let mut out = Signal::EMPTY;

        let t = TargetSignal::new(Kilohertz(810_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        assert_eq!(g.program_src(id, &mut bus, 1), Ok(()));

        assert_eq!(CFG4_NDIV.read(bus.peek(REGS.cfg4)), 30);
        assert_eq!(CFG4_NDIV_FRAC.read(bus.peek(REGS.cfg4)), 0);
        assert_eq!(COEFF_MDIV.read(bus.peek(REGS.coeff)), 1);
        assert_eq!(COEFF_PLDIV.read(bus.peek(REGS.coeff)), 1);
        let cfg = bus.peek(REGS.cfg);
        assert_eq!(CFG_ENABLE.read(cfg), 1);
        assert_eq!(CFG_SYNC_MODE.read(cfg), 1);
        assert_eq!(CFG_IDDQ.read(cfg), 0);
        assert!(bus.slept_ns >= DISABLE_SETTLE_NS as u64);
    }

    #[test]
    fn program_without_lock_times_out_and_leaves_the_pll_powered() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::new(); // lock never asserts
        let mut out = Signal::EMPTY;

        let t = TargetSignal::new(Kilohertz(810_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        assert_eq!(g.program_src(id, &mut bus, 1), Err(Error::Timeout));
        // last attempt leaves the unit up in case it locks late
        assert_eq!(CFG_IDDQ.read(bus.peek(REGS.cfg)), 0);
        assert_eq!(CFG_ENABLE.read(bus.peek(REGS.cfg)), 1);
    }

    #[test]
    fn program_round_trips_through_read() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::with_hook(lock_on_enable);
        let mut out = Signal::EMPTY;

        let t = TargetSignal::new(Kilohertz(1_080_000)); // NDIV 40
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        let configured = out.freq_khz;
        assert_eq!(g.program_src(id, &mut bus, 1), Ok(()));
        assert_eq!(g.read_src(id, &mut bus, true, &mut out), Ok(()));
        assert_eq!(out.freq_khz, configured);
        assert_eq!(out.source, SignalSource::Pll);
    }

    #[test]
    fn read_of_a_disabled_pll_is_the_empty_signal() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::new();
        let mut out = Signal::EMPTY;
        assert_eq!(g.read_src(id, &mut bus, true, &mut out), Ok(()));
        assert_eq!(out, Signal::EMPTY);
        assert_eq!(staged(&g, id, 0), PllPhase::default());
    }

    #[test]
    fn read_honors_a_fraction_programmed_by_someone_else() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::new();
        bus.poke(REGS.cfg, 0x1); // enabled, powered
        bus.poke(REGS.coeff, (1 << 8) | 1); // mdiv 1, pldiv 1
        bus.poke(REGS.cfg4, (4096 << 16) | 30); // ndiv 30.5
        let mut out = Signal::EMPTY;
        assert_eq!(g.read_src(id, &mut bus, true, &mut out), Ok(()));
        assert_eq!(out.freq_khz, 823_500);
    }

    #[test]
    fn cleanup_powers_down_an_inactive_pll_and_collapses_phases() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::with_hook(lock_on_enable);
        let mut out = Signal::EMPTY;

        let t = TargetSignal::new(Kilohertz(810_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        assert_eq!(g.program_src(id, &mut bus, 1), Ok(()));
        assert_eq!(g.cleanup_src(id, &mut bus, false), Ok(()));

        let cfg = bus.peek(REGS.cfg);
        assert_eq!(CFG_ENABLE.read(cfg), 0);
        assert_eq!(CFG_SYNC_MODE.read(cfg), 0);
        assert_eq!(CFG_IDDQ.read(cfg), 1);
        // phases collapse to the last speculative state
        assert_eq!(staged(&g, id, 0), staged(&g, id, 3));
    }

    #[test]
    fn dynamic_ramp_skips_the_power_cycle() {
        let mut g = Schematic::new();
        let id = pll(&mut g);
        let mut bus = TestBus::with_hook(lock_on_enable);
        let mut out = Signal::EMPTY;

        let t = TargetSignal::new(Kilohertz(810_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, false, &mut out), Ok(()));
        assert_eq!(g.program_src(id, &mut bus, 1), Ok(()));
        let coeff_writes = bus.write_count(REGS.coeff);

        // reconfigure hot to NDIV 31; mdiv/pldiv unchanged
        assert_eq!(g.read_src(id, &mut bus, true, &mut out), Ok(()));
        let t = TargetSignal::new(Kilohertz(837_000));
        assert_eq!(g.config_src(id, &mut bus, t, 1, true, &mut out), Ok(()));
        assert_eq!(g.program_src(id, &mut bus, 1), Ok(()));

        // ramp path: no new coefficient write, step register touched
        assert_eq!(bus.write_count(REGS.coeff), coeff_writes);
        assert_eq!(bus.write_count(REGS.cfg2), 1);
        assert_eq!(CFG4_NDIV.read(bus.peek(REGS.cfg4)), 31);
    }
}
