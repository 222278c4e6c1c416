//! ## [Permutative Encoding](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5faf4800-645d-49d1-9457-2ac40eb467bd)
//!
//! `NDB_CRYPT_PERMUTE`, also called "compressible encryption": a fixed byte substitution.

use super::{KEY_DATA_I, KEY_DATA_R};

pub fn decode_block(data: &mut [u8]) {
    substitute(data, &KEY_DATA_I);
}

#[cfg(test)]
pub fn encode_block(data: &mut [u8]) {
    substitute(data, &KEY_DATA_R);
}

fn substitute(data: &mut [u8], table: &[u8; 256]) {
    data.iter_mut().for_each(|b| *b = table[usize::from(*b)]);
}
