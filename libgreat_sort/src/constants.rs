//! Constants of the GREAT/MIDAS data format written by the CAEN frontends.

/// Size of the MIDAS block header in bytes
pub const HEADER_SIZE: usize = 24;
/// Total size of a data block in bytes (64 kiB)
pub const DATA_BLOCK_SIZE: usize = 0x10000;
/// Size of the block payload in bytes
pub const MAIN_SIZE: usize = DATA_BLOCK_SIZE - HEADER_SIZE;
/// Number of 64-bit words in the payload
pub const WORD_SIZE: usize = MAIN_SIZE / 8;

/// Every block header starts with this string
pub const BLOCK_MAGIC: &[u8; 8] = b"EBYEDATA";
/// Value of the DataEndian header field when the payload needs no byte swap
pub const ENDIAN_TAG: u16 = 256;

/// End-of-data marker, may appear in either 32-bit half of a word
pub const TERMINATOR: u32 = 0xFFFF_FFFF;
/// Filler written by the DAQ after the end of real data
pub const PADDING: u32 = 0x5E5E_5E5E;

/// The first blocks of every file are DAQ warm-up and carry no usable data
pub const WARMUP_BLOCKS: u64 = 10;

/// Allowed backwards jitter between consecutive time-sorted packets, in ns.
/// Anything larger than the CAEN fine time resolution is reported.
pub const TIME_ORDER_SLACK: f64 = 5.0;
