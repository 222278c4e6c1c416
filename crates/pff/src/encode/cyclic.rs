//! ## [Cyclic Encoding](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/9979fc01-0a3e-496f-900f-a6a867951f23)
//!
//! `NDB_CRYPT_CYCLIC`, also called "high encryption". The transform is its own inverse; the
//! key is the low 32 bits of the block id and advances by one per byte.

use super::{KEY_DATA_I, KEY_DATA_R, KEY_DATA_S};

pub fn encode_decode_block(data: &mut [u8], key: u32) {
    let mut key = (key ^ (key >> 16)) as u16;

    for b in data.iter_mut() {
        let [low, high] = key.to_le_bytes();
        let mut value = b.wrapping_add(low);
        value = KEY_DATA_R[usize::from(value)].wrapping_add(high);
        value = KEY_DATA_S[usize::from(value)].wrapping_sub(high);
        *b = KEY_DATA_I[usize::from(value)].wrapping_sub(low);
        key = key.wrapping_add(1);
    }
}
