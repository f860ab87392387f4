//! MIDAS block framing: the 24-byte EBYEDATA header, byte/word swap
//! detection and the trailer scan that finds the real payload length.
//!
//! Data format reference: <http://npg.dl.ac.uk/documents/edoc504/edoc504.html>

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::constants::*;
use super::error::BlockError;

/// Parsed fields of the 24-byte block header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub sequence: u32,
    pub stream: u16,
    pub tape: u16,
    pub my_endian: u16,
    pub data_endian: u16,
    pub data_len: u32,
}

impl BlockHeader {
    /// Parse the header at the start of a block. The counter fields are
    /// big-endian while the data length is little-endian, as written by
    /// the MIDAS tape server.
    pub fn read(block: &[u8], nblock: u64) -> Result<Self, BlockError> {
        if block.len() < HEADER_SIZE {
            return Err(BlockError::ShortBlock(nblock, block.len()));
        }
        if &block[0..8] != BLOCK_MAGIC {
            return Err(BlockError::BadMagic(nblock));
        }
        Ok(Self {
            sequence: BigEndian::read_u32(&block[8..12]),
            stream: BigEndian::read_u16(&block[12..14]),
            tape: BigEndian::read_u16(&block[14..16]),
            my_endian: BigEndian::read_u16(&block[16..18]),
            data_endian: BigEndian::read_u16(&block[18..20]),
            data_len: LittleEndian::read_u32(&block[20..24]),
        })
    }
}

/// How the payload words need to be rearranged before decoding. The
/// mode is determined once per input stream and reused for every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapMode {
    /// Not yet determined, every word inspected so far was ambiguous
    #[default]
    Unknown,
    Known {
        swap_endian: bool,
        swap_words: bool,
    },
}

impl SwapMode {
    /// Work out the swap mode from a block. The DataEndian header field
    /// is 256 when no byte swap is needed. Word swapping is detected by
    /// scanning for the first word with a non-zero type tag: bits 63:62
    /// of a correctly ordered word hold the data type, while bits 31:30
    /// of the timestamp half are always zero.
    pub fn detect(data_endian: u16, payload: &[u8]) -> SwapMode {
        let swap_endian = data_endian != ENDIAN_TAG;
        for chunk in payload.chunks_exact(8) {
            let mut word = LittleEndian::read_u64(chunk);
            if swap_endian {
                word = word.swap_bytes();
            }
            if word & 0xC000_0000_0000_0000 != 0 {
                return SwapMode::Known {
                    swap_endian,
                    swap_words: false,
                };
            }
            if word & 0x0000_0000_C000_0000 != 0 {
                return SwapMode::Known {
                    swap_endian,
                    swap_words: true,
                };
            }
        }
        SwapMode::Unknown
    }

    pub fn is_known(&self) -> bool {
        matches!(self, SwapMode::Known { .. })
    }

    /// Apply the swap to one raw little-endian word
    pub fn apply(&self, raw: u64) -> u64 {
        match *self {
            SwapMode::Unknown => raw,
            SwapMode::Known {
                swap_endian,
                swap_words,
            } => {
                let mut word = raw;
                if swap_endian {
                    word = word.swap_bytes();
                }
                if swap_words {
                    word = word.rotate_left(32);
                }
                word
            }
        }
    }
}

/// The usable 64-bit words of one block, swap already applied and the
/// trailer stripped
#[derive(Debug)]
pub struct BlockView {
    pub words: Vec<u64>,
    pub terminated: bool,
}

impl BlockView {
    /// Scan the payload for the end of real data. A word with either
    /// 32-bit half equal to the terminator or padding sentinel ends the
    /// block, as does reaching the declared data length. A block where
    /// neither happens is malformed.
    pub fn scan(payload: &[u8], mode: SwapMode, data_len: u32) -> BlockView {
        let declared_words = data_len as usize / 8;
        let mut words = Vec::new();
        let mut terminated = false;

        for chunk in payload.chunks_exact(8) {
            if words.len() >= declared_words {
                terminated = true;
                break;
            }
            let word = mode.apply(LittleEndian::read_u64(chunk));
            let word_0 = (word >> 32) as u32;
            let word_1 = word as u32;
            if word_0 == TERMINATOR || word_0 == PADDING || word_1 == TERMINATOR || word_1 == PADDING
            {
                terminated = true;
                break;
            }
            words.push(word);
        }

        BlockView { words, terminated }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(data_endian: u16, data_len: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(BLOCK_MAGIC);
        buf.extend_from_slice(&1u32.to_be_bytes()); // sequence
        buf.extend_from_slice(&0u16.to_be_bytes()); // stream
        buf.extend_from_slice(&0u16.to_be_bytes()); // tape
        buf.extend_from_slice(&1u16.to_be_bytes()); // MyEndian
        buf.extend_from_slice(&data_endian.to_be_bytes());
        buf.extend_from_slice(&data_len.to_le_bytes());
        buf
    }

    #[test]
    fn test_header_parse() {
        let buf = make_header(256, 4096);
        let header = BlockHeader::read(&buf, 0).unwrap();
        assert_eq!(header.sequence, 1);
        assert_eq!(header.data_endian, 256);
        assert_eq!(header.data_len, 4096);
    }

    #[test]
    fn test_header_bad_magic() {
        let mut buf = make_header(256, 4096);
        buf[0] = b'X';
        assert!(matches!(
            BlockHeader::read(&buf, 3),
            Err(BlockError::BadMagic(3))
        ));
    }

    #[test]
    fn test_header_too_short() {
        let buf = vec![0u8; 10];
        assert!(matches!(
            BlockHeader::read(&buf, 0),
            Err(BlockError::ShortBlock(0, 10))
        ));
    }

    #[test]
    fn test_swap_detect_no_swap() {
        // ADC word: type tag in bits 63:62
        let word: u64 = 0xC000_0000_0000_0000;
        let mode = SwapMode::detect(256, &word.to_le_bytes());
        assert_eq!(
            mode,
            SwapMode::Known {
                swap_endian: false,
                swap_words: false
            }
        );
    }

    #[test]
    fn test_swap_detect_word_swap() {
        // Type tag found in the lower half means the 32-bit words are swapped
        let word: u64 = 0x0000_0000_C000_0000;
        let mode = SwapMode::detect(256, &word.to_le_bytes());
        assert_eq!(
            mode,
            SwapMode::Known {
                swap_endian: false,
                swap_words: true
            }
        );
        assert_eq!(mode.apply(word), 0xC000_0000_0000_0000);
    }

    #[test]
    fn test_swap_detect_endian() {
        let word: u64 = 0xC000_0000_0000_0000u64.swap_bytes();
        let mode = SwapMode::detect(0, &word.to_le_bytes());
        assert_eq!(
            mode,
            SwapMode::Known {
                swap_endian: true,
                swap_words: false
            }
        );
        assert_eq!(mode.apply(word), 0xC000_0000_0000_0000);
    }

    #[test]
    fn test_swap_detect_ambiguous() {
        // All-zero tags never disambiguate the word order
        let payload = [0u8; 32];
        assert_eq!(SwapMode::detect(256, &payload), SwapMode::Unknown);
    }

    #[test]
    fn test_scan_terminator() {
        let mode = SwapMode::Known {
            swap_endian: false,
            swap_words: false,
        };
        let mut payload = Vec::new();
        payload.extend_from_slice(&0xC000_0001_0000_0002u64.to_le_bytes());
        payload.extend_from_slice(&0xFFFF_FFFF_FFFF_FFFFu64.to_le_bytes());
        payload.extend_from_slice(&0xC000_0003_0000_0004u64.to_le_bytes());
        let view = BlockView::scan(&payload, mode, 0x1000);
        assert!(view.terminated);
        assert_eq!(view.words.len(), 1);
    }

    #[test]
    fn test_scan_padding_in_one_half() {
        let mode = SwapMode::Known {
            swap_endian: false,
            swap_words: false,
        };
        let mut payload = Vec::new();
        payload.extend_from_slice(&0xC000_0001_0000_0002u64.to_le_bytes());
        payload.extend_from_slice(&0x5E5E_5E5E_0000_0000u64.to_le_bytes());
        let view = BlockView::scan(&payload, mode, 0x1000);
        assert!(view.terminated);
        assert_eq!(view.words.len(), 1);
    }

    #[test]
    fn test_scan_declared_length() {
        let mode = SwapMode::Known {
            swap_endian: false,
            swap_words: false,
        };
        let mut payload = Vec::new();
        for _ in 0..4 {
            payload.extend_from_slice(&0xC000_0001_0000_0002u64.to_le_bytes());
        }
        // Declared length caps the block at two words
        let view = BlockView::scan(&payload, mode, 16);
        assert!(view.terminated);
        assert_eq!(view.words.len(), 2);
    }

    #[test]
    fn test_repeated_decode_is_identical() {
        // Decoding the same swapped payload twice with the detected mode
        // must yield the same word sequence
        let words: [u64; 3] = [
            0xC000_0001_0000_0002u64.rotate_right(32),
            0xC000_0003_0000_0004u64.rotate_right(32),
            0x8000_0005_0000_0006u64.rotate_right(32),
        ];
        let mut payload = Vec::new();
        for w in words {
            payload.extend_from_slice(&w.to_le_bytes());
        }
        let mode = SwapMode::detect(256, &payload);
        assert_eq!(
            mode,
            SwapMode::Known {
                swap_endian: false,
                swap_words: true
            }
        );
        let first = BlockView::scan(&payload, mode, 24);
        let second = BlockView::scan(&payload, mode, 24);
        assert_eq!(first.words, second.words);
        assert_eq!(first.words[0], 0xC000_0001_0000_0002);
    }

    #[test]
    fn test_scan_unterminated() {
        let mode = SwapMode::Known {
            swap_endian: false,
            swap_words: false,
        };
        let payload = 0xC000_0001_0000_0002u64.to_le_bytes();
        let view = BlockView::scan(&payload, mode, 0x1000);
        assert!(!view.terminated);
    }
}
