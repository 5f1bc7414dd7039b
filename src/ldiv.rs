//! Linear divider (v2 generation)
//!
//! Integer divide of a single input; the register field stores
//! `divisor - 1`, so a raw value of 0 means divide-by-1. This hardware
//! generation cannot reprogram the divider, which gives `config` an unusual
//! shape: it samples the live divisor, scales the target upward for the
//! input, and scales the input's answer back down. `program` and `cleanup`
//! are pure pass-throughs.

use crate::bus::ClkBus;
use crate::field::BitField;
use crate::schematic::{Schematic, SrcId};
use crate::signal::{Signal, TargetSignal};
use crate::Status;

#[derive(Debug)]
pub struct LinDiv {
    input: SrcId,
    reg: u32,
    div: BitField,
}

impl LinDiv {
    pub fn new(input: SrcId, reg: u32, div: BitField) -> Self {
        LinDiv { input, reg, div }
    }

    fn divisor<B: ClkBus>(&self, bus: &mut B) -> u32 {
        self.div.read(bus.read32(self.reg)) + 1
    }

    pub(crate) fn read<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        let divisor = self.divisor(bus);
        let status = g.read_src(self.input, bus, active, out);
        out.freq_khz /= divisor;
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
        // The divider cannot change, so the input has to produce
        // divisor-times the requested frequency.
        let divisor = self.divisor(bus);
        let mut target = target;
        target.freq_khz = target.freq_khz.saturating_mul(divisor);
        let status = g.config_src(self.input, bus, target, phase, hot, out);
        // Divide back down error or not; the status still propagates, but
        // callers inspecting the signal see the best-effort value.
        out.freq_khz /= divisor;
        status
    }

    pub(crate) fn program<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        phase: usize,
    ) -> Status {
        g.program_src(self.input, bus, phase)
    }

    pub(crate) fn cleanup<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
    ) -> Status {
        g.cleanup_src(self.input, bus, active)
    }

    pub(crate) fn print<B: ClkBus>(&self, bus: &mut B, _phase_count: usize, index: usize) {
        log::debug!(
            "src[{}] ldiv reg={:#010x} raw={:#010x} divisor={}",
            index,
            self.reg,
            bus.read32(self.reg),
            self.divisor(bus)
        );
    }
}
