//! Read-only VCO primitives
//!
//! These expose a PLL's live state for display and validation but cannot
//! program it; on the chips that carry them the equivalent PLL is owned by a
//! separate microcontroller. `config`, `program` and `cleanup` are
//! dispatched as [`Unsupported`](crate::Error::Unsupported) before the
//! primitive is ever reached.
//!
//! [`RoVcoSdm`] layers fractional feedback on top: when sigma-delta
//! modulation is enabled in hardware the effective NDIV gains a 1/8192
//! fractional part sourced from the SDM data register.

use crate::bus::ClkBus;
use crate::field::BitField;
use crate::fixp::{mul_q13_khz, q13, Q13_HALF};
use crate::schematic::{Schematic, SrcId};
use crate::signal::{Signal, SignalSource};
use crate::{Error, Status};

// Coefficient register layout shared by the read-only VCO family.
const COEFF_MDIV: BitField = BitField::new(0x0000_00FF, 0);
const COEFF_NDIV: BitField = BitField::new(0x0000_FF00, 8);
const COEFF_DIV2: BitField = BitField::new(0x0001_0000, 16);

// SDM registers.
const SDM_CFG_ENABLE: BitField = BitField::new(0x0000_0001, 0);
const SDM_DATA_DIN: BitField = BitField::new(0x0000_FFFF, 0);

#[derive(Debug)]
pub struct RoVco {
    source: SignalSource,
    input: SrcId,
    coeff: u32,
    /// This hardware unit has a /2 stage after the VCO (one memory
    /// controller PLL carries it); the stage still has to read as engaged.
    div2: bool,
    /// Output is reported at twice the naive calculation (DDR signaling).
    double_output: bool,
}

impl RoVco {
    pub fn new(source: SignalSource, input: SrcId, coeff: u32) -> Self {
        RoVco {
            source,
            input,
            coeff,
            div2: false,
            double_output: false,
        }
    }

    pub fn div2(mut self) -> Self {
        self.div2 = true;
        self
    }

    pub fn double_output(mut self) -> Self {
        self.double_output = true;
        self
    }

    pub(crate) fn read<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        let coeff = bus.read32(self.coeff);
        let mdiv = COEFF_MDIV.read(coeff);
        let ndiv = COEFF_NDIV.read(coeff);
        let status = g.read_src(self.input, bus, active, out);
        if mdiv == 0 {
            *out = Signal::EMPTY;
            return status.and(Err(Error::InvalidState));
        }
        let mut freq = out.freq_khz as u64 * ndiv as u64 / mdiv as u64;
        if self.div2 && COEFF_DIV2.read(coeff) == 1 {
            freq /= 2;
        }
        if self.double_output {
            freq *= 2;
        }
        assert!(freq <= u32::max_value() as u64, "vco output overflows kHz word");
        out.freq_khz = freq as u32;
        out.source = self.source;
        status
    }

    pub(crate) fn print<B: ClkBus>(&self, bus: &mut B, _phase_count: usize, index: usize) {
        log::debug!(
            "src[{}] rovco coeff={:#010x} raw={:#010x}",
            index,
            self.coeff,
            bus.read32(self.coeff)
        );
    }
}

#[derive(Debug)]
pub struct RoVcoSdm {
    vco: RoVco,
    sdm_cfg: u32,
    sdm_data: u32,
}

impl RoVcoSdm {
    pub fn new(vco: RoVco, sdm_cfg: u32, sdm_data: u32) -> Self {
        RoVcoSdm {
            vco,
            sdm_cfg,
            sdm_data,
        }
    }

    pub(crate) fn read<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        if SDM_CFG_ENABLE.read(bus.read32(self.sdm_cfg)) == 0 {
            return self.vco.read(g, bus, active, out);
        }

        let coeff = bus.read32(self.vco.coeff);
        let mdiv = COEFF_MDIV.read(coeff);
        let ndiv = COEFF_NDIV.read(coeff);
        let din = SDM_DATA_DIN.read(bus.read32(self.sdm_data)) as u16 as i16;
        let status = g.read_src(self.vco.input, bus, active, out);
        if mdiv == 0 {
            *out = Signal::EMPTY;
            return status.and(Err(Error::InvalidState));
        }

        // Effective NDIV in Q13: the +half biases the implied /8192 to
        // round-to-nearest.
        let eff = q13(ndiv, 0) as i64 + Q13_HALF as i64 + din as i64;
        assert!(eff > 0, "sdm effective ndiv must be positive");
        let freq = mul_q13_khz(out.freq_khz, eff as u64, mdiv)
            .expect("sdm vco output overflows kHz word");
        out.freq_khz = freq;
        out.source = self.vco.source;
        status
    }

    pub(crate) fn print<B: ClkBus>(&self, bus: &mut B, phase_count: usize, index: usize) {
        self.vco.print(bus, phase_count, index);
        log::trace!(
            "  sdm cfg={:#010x} data={:#010x}",
            bus.read32(self.sdm_cfg),
            bus.read32(self.sdm_data)
        );
    }
}
