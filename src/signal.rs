//! Signal value types
//!
//! A [`Signal`] describes what is coming out of a node right now (or what
//! `config` computed will come out): the kind of source at the far end, the
//! frequency, and the route the signal takes through the multiplexers. A
//! [`TargetSignal`] is the request form of the same thing.
//!
//! Neither type is ever persisted; both live on the stack for the duration
//! of one traversal.

use embedded_time::rate::Kilohertz;

/// What kind of hardware is generating the signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SignalSource {
    /// No signal (gated branch, disabled PLL).
    None,
    Xtal,
    Pll,
    SpPll0,
    SpPll1,
    OneSource,
}

impl Default for SignalSource {
    fn default() -> Self {
        SignalSource::None
    }
}

/// The route a signal takes through the schematic's multiplexers, encoded as
/// a stack of 4-bit input indices.
///
/// Each multiplexer pushes its selected index as a traversal unwinds, so
/// after a full `read` the root-most mux's choice sits on top and `pop`
/// consumes the route root-to-leaf -- exactly the order `config` needs.
/// Unused entries hold [`SignalPath::INDETERMINATE`], which in a target path
/// means "no preference, let the mux policy decide".
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SignalPath(u32);

impl SignalPath {
    /// "No choice recorded / no preference" entry value.
    pub const INDETERMINATE: u8 = 0xF;

    /// A path with every entry indeterminate.
    pub const EMPTY: SignalPath = SignalPath(0xFFFF_FFFF);

    /// Pushes a mux input index on top of the path.
    pub fn push(&mut self, index: u8) {
        self.0 = (self.0 << 4) | (index & 0xF) as u32;
    }

    /// Pops the top (root-most) entry, refilling with indeterminate.
    pub fn pop(&mut self) -> u8 {
        let index = (self.0 & 0xF) as u8;
        self.0 = (self.0 >> 4) | 0xF000_0000;
        index
    }

    /// Raw encoded form, mostly for diagnostics.
    pub const fn bits(&self) -> u32 {
        self.0
    }
}

impl Default for SignalPath {
    fn default() -> Self {
        SignalPath::EMPTY
    }
}

/// A sampled or computed clock signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Signal {
    pub source: SignalSource,
    pub freq_khz: u32,
    pub path: SignalPath,
}

impl Signal {
    /// The canonical "nothing there" signal.
    pub const EMPTY: Signal = Signal {
        source: SignalSource::None,
        freq_khz: 0,
        path: SignalPath::EMPTY,
    };

    pub fn freq(&self) -> Kilohertz {
        Kilohertz(self.freq_khz)
    }
}

/// A requested clock signal: the frequency a domain should produce and,
/// optionally, the route it should take to produce it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TargetSignal {
    pub freq_khz: u32,
    pub path: SignalPath,
}

impl TargetSignal {
    /// A target with no routing preference.
    pub fn new(freq: impl Into<Kilohertz>) -> Self {
        TargetSignal {
            freq_khz: freq.into().0,
            path: SignalPath::EMPTY,
        }
    }

    /// Adds a mux choice to the route. Choices are pushed leaf-to-root:
    /// the last `via` call names the input of the mux closest to the
    /// domain output.
    pub fn via(mut self, index: u8) -> Self {
        self.path.push(index);
        self
    }
}
