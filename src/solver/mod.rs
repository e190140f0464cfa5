//! Solver algorithms

pub mod sdca;

pub use self::sdca::SdcaSolver;
