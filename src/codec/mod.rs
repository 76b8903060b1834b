//! Frame-level encoding and decoding over async byte streams.
//!
//! The connection is split into halves: [`FrameReader`] owns the read side
//! and [`FrameWriter`] the write side, so a blocked read never holds up a
//! concurrent send.

mod framed;

pub use framed::{FrameReader, FrameWriter};
