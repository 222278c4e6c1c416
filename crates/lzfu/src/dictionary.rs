//! [Dictionary](https://learn.microsoft.com/en-us/openspecs/exchange_server_protocols/ms-oxrtfcp/4238b0e2-7147-42da-88c9-ea45a1243e67)

const DICTIONARY_SIZE: usize = 4096;

/// Pre-loaded dictionary contents, Initial Dictionary.
const INITIAL_DICTIONARY: &[u8] = b"{\\rtf1\\ansi\\mac\\deff0\\deftab720{\\fonttbl;}{\\f0\\fnil \\froman \\fswiss \\fmodern \\fscript \\fdecor MS Sans SerifSymbolArialTimes New RomanCourier{\\colortbl\\red0\\green0\\blue0\r\n\\par \\pard\\plain\\f0\\fs20\\b\\i\\u\\tab\\tx";

/// A 16-bit big-endian dictionary reference: 12 bits of offset and 4 bits of length minus 2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reference {
    offset: u16,
    length: u8,
}

impl Reference {
    pub fn offset(&self) -> u16 {
        self.offset
    }

    pub fn length(&self) -> u8 {
        self.length
    }
}

impl From<u16> for Reference {
    fn from(value: u16) -> Self {
        Self {
            offset: value >> 4,
            length: (value & 0x0F) as u8 + 2,
        }
    }
}

/// Circular 4K window shared by literals and references.
pub struct Dictionary {
    buffer: [u8; DICTIONARY_SIZE],
    write_offset: usize,
}

impl Default for Dictionary {
    fn default() -> Self {
        let mut buffer = [0_u8; DICTIONARY_SIZE];
        buffer[..INITIAL_DICTIONARY.len()].copy_from_slice(INITIAL_DICTIONARY);
        Self {
            buffer,
            write_offset: INITIAL_DICTIONARY.len(),
        }
    }
}

impl Dictionary {
    pub fn push(&mut self, byte: u8) {
        self.buffer[self.write_offset] = byte;
        self.write_offset = (self.write_offset + 1) % DICTIONARY_SIZE;
    }

    /// Copy a reference into `output`. Returns `false` for the end-of-stream marker, which
    /// points at the current write position.
    pub fn expand(&mut self, reference: Reference, output: &mut Vec<u8>) -> bool {
        let mut read_offset = usize::from(reference.offset());
        if read_offset == self.write_offset {
            return false;
        }

        // Bytes are pushed as they are read, so a reference may overlap its own output.
        for _ in 0..reference.length() {
            let byte = self.buffer[read_offset];
            output.push(byte);
            self.push(byte);
            read_offset = (read_offset + 1) % DICTIONARY_SIZE;
        }
        true
    }
}
