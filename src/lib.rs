//! # Clock-tree schematic engine
//!
//! This crate models the physical clock distribution network of a chip as a
//! static graph ("schematic") of frequency-source primitives: crystal
//! oscillators, PLLs, multiplexers, linear dividers and composite
//! switch-dividers. Three operations run over that graph:
//!
//! - `read` samples the hardware registers and reports the frequency a
//!   domain is actually producing right now,
//! - `config` computes the coefficients for a desired output frequency
//!   without touching hardware, staging them into a numbered *phase*,
//! - `program` commits one phase of staged coefficients to hardware in
//!   input-first order, waiting out PLL lock and mux switch completion.
//!
//! A final `cleanup` pass powers down branches that the active signal no
//! longer uses and collapses the speculative phases back into a single
//! steady state.
//!
//! ## Usage
//!
//! Chip wiring code builds a [`schematic::Schematic`] once at init, wraps the
//! roots in [`domain::FreqDomain`] entries and publishes them through a
//! [`domain::DomainTable`]:
//!
//! ```rust,ignore
//! let mut g = Schematic::new();
//! let xtal = g.add(Crystal::new(SignalSource::Xtal, 27_000u32.kHz()));
//! let pll = g.add(HybridPll::new(SignalSource::Pll, xtal, PLL_REGS, 1));
//! // ... muxes, dividers ...
//! let mut domains = DomainTable::new();
//! domains.set(DomainId::Sys, FreqDomain::new(root));
//!
//! let dom = domains.get(DomainId::Sys).unwrap();
//! let achieved = dom.config(&mut g, &mut bus, &TargetSignal::new(405_000u32.kHz()), 1, false)?;
//! dom.program(&mut g, &mut bus, 1)?;
//! dom.cleanup(&mut g, &mut bus, true)?;
//! ```
//!
//! All hardware access goes through the [`bus::ClkBus`] trait, so the whole
//! engine runs unmodified against a simulated register file in tests.

#![no_std]

pub mod bus;
pub mod domain;
pub mod field;
pub mod fixp;
pub mod ldiv;
pub mod mux;
pub mod pll;
pub mod schematic;
pub mod signal;
pub mod swdiv;
pub mod vco;
pub mod wire;
pub mod xtal;

/// Things a clock operation can fail with.
///
/// These are hardware or request conditions, not programming errors: caller
/// protocol violations (a phase index that was never configured, an id that
/// was never wired) panic instead, since they indicate a broken firmware
/// image rather than a recoverable state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// Register contents do not match any modeled hardware state, or a
    /// change was requested that the primitive cannot make while live.
    InvalidState,
    /// The target path names an input that is not connected, or would move
    /// a glitchy multiplexer under an active signal.
    InvalidPath,
    /// A node was re-entered while it is part of the active signal path.
    /// Inactive bypass loops are expected topology and are not errors.
    CycleDetected,
    /// The computed coefficient falls outside the hardware range.
    FreqNotSupported,
    /// A hardware completion condition (PLL lock, mux switch-done) was not
    /// observed within the poll budget.
    Timeout,
    /// The primitive does not implement this operation (read-only VCOs).
    Unsupported,
}

/// Status of an operation that produces its output through an out-parameter.
pub type Status = Result<(), Error>;

/// First-error aggregation for the fan-out operations.
///
/// `read` and `cleanup` must visit every input of a node even after one of
/// them fails; the status reported upward is the first non-OK one seen.
pub(crate) fn keep_first(acc: &mut Status, status: Status) {
    if acc.is_ok() {
        *acc = status;
    }
}

/// Crate prelude.
pub mod prelude {
    pub use crate::bus::ClkBus as _clktree_bus_ClkBus;
    pub use embedded_time::rate::Extensions;
}
