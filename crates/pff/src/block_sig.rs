//! [Block Signature](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/e700a913-9db5-46a4-ac76-37cabea823e1)

/// `wSig` of a page or block, derived from its file offset and the low 32 bits of its id.
pub fn compute_sig(offset: u64, id: u64) -> u16 {
    let mixed = (offset as u32) ^ (id as u32);
    ((mixed >> 16) ^ (mixed & 0xFFFF)) as u16
}
