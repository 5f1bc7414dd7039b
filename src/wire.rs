//! Pass-through node
//!
//! A wire has exactly one input and no transfer function of its own. It
//! exists so topologies can name a tap point, and as the base shape for the
//! single-input primitives that only override part of the contract.

use crate::bus::ClkBus;
use crate::schematic::{Schematic, SrcId};
use crate::signal::{Signal, TargetSignal};
use crate::Status;

#[derive(Debug)]
pub struct Wire {
    input: SrcId,
}

impl Wire {
    pub fn new(input: SrcId) -> Self {
        Wire { input }
    }

    pub(crate) fn read<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        g.read_src(self.input, bus, active, out)
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
        g.config_src(self.input, bus, target, phase, hot, out)
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
}
