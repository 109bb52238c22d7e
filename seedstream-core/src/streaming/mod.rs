//! HTTP range negotiation for progressive playback

pub mod range;

pub use range::{ByteRange, PriorityWindow, RangeNegotiator, RangeOutcome, RangeUnsatisfiable};
