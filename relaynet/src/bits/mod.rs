//! The word-at-a-time bit codec that backs every packet and packet header
//! on the wire. See `writer` and `reader`.

pub mod reader;
pub mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;
