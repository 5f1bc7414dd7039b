//! Crystal oscillator
//!
//! The fixed-frequency root of every schematic. It has no input, no phase
//! state and nothing to program; `config` reports the fixed frequency it
//! will produce no matter what was asked, since config never lies about the
//! achievable result.

use embedded_time::rate::Kilohertz;

use crate::bus::ClkBus;
use crate::schematic::Schematic;
use crate::signal::{Signal, SignalPath, SignalSource, TargetSignal};
use crate::Status;

#[derive(Debug)]
pub struct Crystal {
    source: SignalSource,
    freq_khz: u32,
}

impl Crystal {
    pub fn new(source: SignalSource, freq: impl Into<Kilohertz>) -> Self {
        Crystal {
            source,
            freq_khz: freq.into().0,
        }
    }

    fn signal(&self) -> Signal {
        Signal {
            source: self.source,
            freq_khz: self.freq_khz,
            path: SignalPath::EMPTY,
        }
    }

    pub(crate) fn read<B: ClkBus>(
        &mut self,
        _g: &mut Schematic,
        _bus: &mut B,
        _active: bool,
        out: &mut Signal,
    ) -> Status {
        *out = self.signal();
        Ok(())
    }

    pub(crate) fn config<B: ClkBus>(
        &mut self,
        _g: &mut Schematic,
        _bus: &mut B,
        _target: TargetSignal,
        _phase: usize,
        _hot: bool,
        out: &mut Signal,
    ) -> Status {
        *out = self.signal();
        Ok(())
    }
}
