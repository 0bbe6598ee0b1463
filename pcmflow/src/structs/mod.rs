//! Data structures shared by the processing components.
//!
//! Contains the stream descriptor, the borrowed chunk view, mixing matrices
//! and FIR kernel generators.

pub mod chunk;
pub mod fir;
pub mod matrix;
pub mod speakers;
