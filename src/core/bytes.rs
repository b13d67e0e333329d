//! Conversions between element buffers and raw chunk payloads.
//!
//! Chunk payloads travel as `&[u8]` in native byte order. `bytemuck` gives
//! alignment-checked reinterpretation where the payload happens to be
//! aligned, with a copying fallback for arbitrary byte slices.

use crate::core::schema::ELEMENT_SIZE;

/// Decode a chunk payload into elements. Returns `None` when the byte length
/// is not a multiple of the element size.
pub fn bytes_to_f32(data: &[u8]) -> Option<Vec<f32>> {
    if data.len() % ELEMENT_SIZE != 0 {
        return None;
    }
    match bytemuck::try_cast_slice::<u8, f32>(data) {
        Ok(slice) => Some(slice.to_vec()),
        // Unaligned payload: copy element by element.
        Err(_) => {
            let mut out = Vec::with_capacity(data.len() / ELEMENT_SIZE);
            for chunk in data.chunks_exact(ELEMENT_SIZE) {
                out.push(f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
            Some(out)
        }
    }
}

/// Encode elements as a chunk payload in native byte order.
pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}
