//! N-input multiplexer
//!
//! Selects one of up to five inputs through a per-input [`FieldValue`] map
//! over a single control register. Optional extras cover the hardware
//! variants found across a chip family: a gate pattern written when the mux
//! is inactive, a switch-done condition to poll after moving the select, and
//! a glitchy flag for muxes that must never move under an active signal.
//!
//! Reading a mux samples *every* connected input, not just the selected one,
//! so the cached state of the whole subgraph stays consistent even though
//! only one path is electrically alive.

use crate::bus::{wait_until, ClkBus};
use crate::field::FieldValue;
use crate::schematic::{Schematic, SrcId, MAX_PHASE_COUNT};
use crate::signal::{Signal, SignalPath, TargetSignal};
use crate::{keep_first, Error, Status};

/// Four selectable sources plus the switch-divider automatic pseudo-input.
pub const MUX_MAX_INPUTS: usize = 5;

/// Settle time between a select write and the first switch-done poll.
const SWITCH_SETTLE_NS: u32 = 500;
/// Poll interval while waiting for switch-done.
const SWITCH_POLL_NS: u32 = 100;
/// Total poll budget for switch-done.
const SWITCH_TIMEOUT_NS: u32 = 50_000;

#[derive(Debug, Copy, Clone)]
struct MuxInput {
    src: SrcId,
    select: FieldValue,
}

/// Switch-completion polling setup. `status` may be the control register
/// itself or a separate status register.
#[derive(Debug, Copy, Clone)]
pub struct MuxSync {
    status: u32,
    done: FieldValue,
}

#[derive(Debug, Copy, Clone)]
struct MuxPhase {
    input: u8,
}

impl Default for MuxPhase {
    fn default() -> Self {
        MuxPhase {
            input: SignalPath::INDETERMINATE,
        }
    }
}

#[derive(Debug)]
pub struct Mux {
    ctrl: u32,
    inputs: [Option<MuxInput>; MUX_MAX_INPUTS],
    /// Wired width of the select map; indices at or above this are
    /// unconnected.
    count: u8,
    gate: Option<FieldValue>,
    sync: Option<MuxSync>,
    glitchy: bool,
    phases: [MuxPhase; MAX_PHASE_COUNT],
}

impl Mux {
    pub fn new(ctrl: u32) -> Self {
        Mux {
            ctrl,
            inputs: [None; MUX_MAX_INPUTS],
            count: 0,
            gate: None,
            sync: None,
            glitchy: false,
            phases: [MuxPhase::default(); MAX_PHASE_COUNT],
        }
    }

    /// Connects `src` as input `index`, selected when the control register
    /// matches `select`.
    pub fn input(mut self, index: u8, src: SrcId, select: FieldValue) -> Self {
        let i = index as usize;
        assert!(i < MUX_MAX_INPUTS, "mux input index out of range");
        self.inputs[i] = Some(MuxInput { src, select });
        if index + 1 > self.count {
            self.count = index + 1;
        }
        self
    }

    /// Pattern written to the control register to gate the mux when it is
    /// not carrying an active signal. A register matching the gate also
    /// reads back as "genuinely off" rather than invalid.
    pub fn gate(mut self, gate: FieldValue) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Enables switch-done polling after every select change.
    pub fn sync(mut self, status: u32, done: FieldValue) -> Self {
        self.sync = Some(MuxSync { status, done });
        self
    }

    /// Marks the mux glitchy: switching it while active can emit a runt
    /// clock edge, so hot switches are refused.
    pub fn glitchy(mut self) -> Self {
        self.glitchy = true;
        self
    }

    fn wired(&self, index: u8) -> Option<MuxInput> {
        if (index as usize) < MUX_MAX_INPUTS {
            self.inputs[index as usize]
        } else {
            None
        }
    }

    pub(crate) fn read<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
        out: &mut Signal,
    ) -> Status {
        let reg = bus.read32(self.ctrl);
        let mut selected = SignalPath::INDETERMINATE;
        for i in 0..MUX_MAX_INPUTS {
            if let Some(input) = self.inputs[i] {
                if input.select.matches(reg) {
                    selected = i as u8;
                    break;
                }
            }
        }

        let mut status = Ok(());
        if selected == SignalPath::INDETERMINATE {
            let gated = match self.gate {
                Some(gate) => gate.matches(reg),
                None => false,
            };
            if !gated {
                // Register points at something the schematic does not model.
                status = Err(Error::InvalidState);
            }
        }

        // Sample every connected input so the subgraph caches stay fresh;
        // only the selected one inherits our activity.
        *out = Signal::EMPTY;
        for i in 0..MUX_MAX_INPUTS {
            if let Some(input) = self.inputs[i] {
                if i as u8 == selected {
                    keep_first(&mut status, g.read_src(input.src, bus, active, out));
                } else {
                    let mut scratch = Signal::EMPTY;
                    keep_first(&mut status, g.read_src(input.src, bus, false, &mut scratch));
                }
            }
        }

        out.path.push(selected);
        for phase in self.phases.iter_mut() {
            phase.input = selected;
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
        let mut target = target;
        let requested = target.path.pop();
        let previous = self.phases[phase - 1].input;
        let index = if requested == SignalPath::INDETERMINATE {
            // No preference: keep whatever the mux is already set up to use.
            self.phases[phase].input
        } else {
            requested
        };

        // Keeps the historical boundary behavior: index == count slips past
        // the range check and is caught by the unconnected-input check.
        if index > self.count {
            return Err(Error::InvalidPath);
        }
        let input = match self.wired(index) {
            Some(input) => input,
            None => return Err(Error::InvalidPath),
        };
        if hot && self.glitchy && index != previous {
            return Err(Error::InvalidPath);
        }

        for p in phase..MAX_PHASE_COUNT {
            self.phases[p].input = index;
        }

        // The input stays hot only if it was already carrying the signal.
        let hot_input = hot && index == previous;
        let status = g.config_src(input.src, bus, target, phase, hot_input, out);
        out.path.push(index);
        status
    }

    pub(crate) fn program<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        phase: usize,
    ) -> Status {
        let index = self.phases[phase].input;
        assert!(
            index != SignalPath::INDETERMINATE,
            "mux programmed without a configured input"
        );
        let input = self
            .wired(index)
            .expect("mux phase names an unconnected input");

        g.program_src(input.src, bus, phase)?;

        let reg = bus.read32(self.ctrl);
        if input.select.matches(reg) {
            // Redundant select writes can retrigger switch machinery.
            return Ok(());
        }
        bus.write32(self.ctrl, input.select.apply(reg));

        match self.sync {
            None => Ok(()),
            Some(sync) => wait_until(
                bus,
                SWITCH_SETTLE_NS,
                SWITCH_POLL_NS,
                SWITCH_TIMEOUT_NS,
                |b| sync.done.matches(b.read32(sync.status)),
            ),
        }
    }

    pub(crate) fn cleanup<B: ClkBus>(
        &mut self,
        g: &mut Schematic,
        bus: &mut B,
        active: bool,
    ) -> Status {
        let last = self.phases[MAX_PHASE_COUNT - 1];
        let mut status = Ok(());
        for i in 0..MUX_MAX_INPUTS {
            if let Some(input) = self.inputs[i] {
                let input_active = active && i as u8 == last.input;
                keep_first(&mut status, g.cleanup_src(input.src, bus, input_active));
            }
        }

        if !active {
            if let Some(gate) = self.gate {
                let reg = bus.read32(self.ctrl);
                if !gate.matches(reg) {
                    bus.write32(self.ctrl, gate.apply(reg));
                }
            }
        }

        for phase in self.phases.iter_mut() {
            *phase = last;
        }
        status
    }

    pub(crate) fn print<B: ClkBus>(&self, bus: &mut B, phase_count: usize, index: usize) {
        log::debug!(
            "src[{}] mux ctrl={:#010x} raw={:#010x} glitchy={}",
            index,
            self.ctrl,
            bus.read32(self.ctrl),
            self.glitchy
        );
        for p in 0..phase_count.min(MAX_PHASE_COUNT) {
            log::trace!("  phase[{}] input={}", p, self.phases[p].input);
        }
    }
}
