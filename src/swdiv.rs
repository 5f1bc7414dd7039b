//! Switch-divider composites
//!
//! A switch-divider is not a primitive of its own: it is a source-select
//! multiplexer feeding a linear divider, with both fields packed into one
//! control register. The constructors here only arrange data; all behavior
//! lives in [`Mux`] and [`LinDiv`].
//!
//! The "automatic" variant adds a pseudo-input for the hardware-autonomous
//! glitchless select mode: each concrete input's select pattern also asserts
//! an override-enable field, and the pseudo-input's pattern clears that
//! field entirely, handing the choice back to hardware.

use crate::field::{BitField, FieldValue};
use crate::ldiv::LinDiv;
use crate::mux::Mux;
use crate::schematic::{Schematic, SrcId};

/// Index of the automatic pseudo-input on the 4-input automatic variant.
pub const AUTO_INPUT: u8 = 4;

/// Handles to the two nodes of a switch-divider. `out` (the divider) is the
/// composite's output; `mux` is exposed for wiring fixups.
#[derive(Debug, Copy, Clone)]
pub struct SwDiv {
    pub mux: SrcId,
    pub out: SrcId,
}

fn build(
    g: &mut Schematic,
    ctrl: u32,
    inputs: &[(SrcId, FieldValue)],
    div: BitField,
    glitchy: bool,
) -> SwDiv {
    let mut mux = Mux::new(ctrl);
    for (index, &(src, select)) in inputs.iter().enumerate() {
        mux = mux.input(index as u8, src, select);
    }
    if glitchy {
        mux = mux.glitchy();
    }
    let mux = g.add(mux);
    let out = g.add(LinDiv::new(mux, ctrl, div));
    SwDiv { mux, out }
}

/// Two-input switch-divider.
pub fn swdiv2(
    g: &mut Schematic,
    ctrl: u32,
    inputs: [(SrcId, FieldValue); 2],
    div: BitField,
    glitchy: bool,
) -> SwDiv {
    build(g, ctrl, &inputs, div, glitchy)
}

/// Four-input switch-divider.
pub fn swdiv4(
    g: &mut Schematic,
    ctrl: u32,
    inputs: [(SrcId, FieldValue); 4],
    div: BitField,
    glitchy: bool,
) -> SwDiv {
    build(g, ctrl, &inputs, div, glitchy)
}

/// Four-input switch-divider with the automatic select mode.
///
/// `select` is the source-select field and `ovr` the override-enable field;
/// `auto_src` is the source the hardware falls back to while the override is
/// off. The automatic mode is glitchless by construction, so the mux is
/// never marked glitchy.
pub fn swdiv4_auto(
    g: &mut Schematic,
    ctrl: u32,
    inputs: [SrcId; 4],
    auto_src: SrcId,
    select: BitField,
    ovr: BitField,
    div: BitField,
) -> SwDiv {
    let mut mux = Mux::new(ctrl);
    for (index, &src) in inputs.iter().enumerate() {
        let fv = ovr.value(1).or(select.value(index as u32));
        mux = mux.input(index as u8, src, fv);
    }
    // Override field all-zero: hardware chooses on its own.
    let mux = mux.input(AUTO_INPUT, auto_src, ovr.value(0));
    let mux = g.add(mux);
    let out = g.add(LinDiv::new(mux, ctrl, div));
    SwDiv { mux, out }
}
