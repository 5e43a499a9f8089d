//! IR rewrite passes. Each pass mutates the unit in place and reports what
//! it removed through `tracing` at debug level.

mod const_fold;
mod dce;
mod load_elim;

pub use const_fold::const_fold;
pub use dce::dce;
pub use load_elim::load_elim;

use crate::builder::IrBuilder;

/// The standard pipeline run on every unit before lowering.
pub fn run_default_passes(b: &mut IrBuilder) {
    load_elim(b);
    const_fold(b);
    dce(b);
}
