//! Core types shared by the widget, Brick and pingback modules.

mod amount;
mod common;
mod params;

pub use amount::*;
pub use common::*;
pub use params::*;
