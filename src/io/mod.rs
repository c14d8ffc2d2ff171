mod range_reader;
mod source;

pub use range_reader::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, RangeReader,
};
pub use source::{ByteSource, BytesReader, FileRangeReader, InMemory, LocalFile};
