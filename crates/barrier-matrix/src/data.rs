//! Value layout of the tested resources and the host side verification.

use ash::vk;
use bytemuck::{Pod, Zeroable};

///Number of values that travel from writer to reader.
pub const BUFFER_ELEMENTS: u32 = 1024;
///Offset added to every index, `value[i] = VALUES_OFFSET + i`.
pub const VALUES_OFFSET: u32 = 2048;
///Width and height of the storage image as well as of every dispatch, draw and trace.
pub const IMAGE_DIM: u32 = 32;
///Format of the storage image.
pub const IMAGE_FORMAT: vk::Format = vk::Format::R32_UINT;
///Size of a tested buffer. Values are laid out with std140 array stride.
pub const STD140_BUFFER_SIZE: vk::DeviceSize = BUFFER_ELEMENTS as vk::DeviceSize * STD140_STRIDE;
///Size of the verification buffer (std430, tightly packed).
pub const STD430_BUFFER_SIZE: vk::DeviceSize = BUFFER_ELEMENTS as vk::DeviceSize * STD430_STRIDE;
///std140 rounds array elements up to 16 bytes.
pub const STD140_STRIDE: vk::DeviceSize = 16;
pub const STD430_STRIDE: vk::DeviceSize = 4;

const _: () = assert!(IMAGE_DIM * IMAGE_DIM == BUFFER_ELEMENTS);

///Two triangles covering the whole framebuffer, as `vec4` positions.
pub const FULL_SCREEN_QUAD: [[f32; 4]; 6] = [
    [-1.0, 1.0, 0.0, 1.0],
    [1.0, 1.0, 0.0, 1.0],
    [1.0, -1.0, 0.0, 1.0],
    [-1.0, 1.0, 0.0, 1.0],
    [1.0, -1.0, 0.0, 1.0],
    [-1.0, -1.0, 0.0, 1.0],
];

///One std140 array element. Only `x` carries a value.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Std140Element {
    pub x: u32,
    pub pad: [u32; 3],
}

///Value expected at `index` after the pipeline ran.
pub fn expected_value(index: u32) -> u32 {
    VALUES_OFFSET + index
}

///The full sequence a writer produces.
pub fn expected_values() -> Vec<u32> {
    (0..BUFFER_ELEMENTS).map(expected_value).collect()
}

///Values as the host (or a staging buffer) writes them into an std140 resource buffer.
pub fn std140_values() -> Vec<Std140Element> {
    expected_values()
        .into_iter()
        .map(|x| Std140Element { x, pad: [0; 3] })
        .collect()
}

///Values tightly packed as an image upload or the verification buffer expects them.
pub fn std430_values() -> Vec<u32> {
    expected_values()
}

///Extracts the values from an std140 resource buffer. `bytes` may be longer than needed.
/// Returns `None` if it is too short.
pub fn unpack_std140(bytes: &[u8]) -> Option<Vec<u32>> {
    let needed = STD140_BUFFER_SIZE as usize;
    if bytes.len() < needed {
        return None;
    }
    Some(
        bytes[..needed]
            .chunks_exact(STD140_STRIDE as usize)
            .map(|chunk| bytemuck::pod_read_unaligned::<u32>(&chunk[..4]))
            .collect(),
    )
}

///Reads the std430 verification data. Returns `None` if `bytes` is too short.
pub fn unpack_std430(bytes: &[u8]) -> Option<Vec<u32>> {
    let needed = STD430_BUFFER_SIZE as usize;
    if bytes.len() < needed {
        return None;
    }
    Some(
        bytes[..needed]
            .chunks_exact(STD430_STRIDE as usize)
            .map(|chunk| bytemuck::pod_read_unaligned::<u32>(&chunk[..4]))
            .collect(),
    )
}

///Copy regions that move every `x` component of an std140 buffer into a tightly packed buffer.
pub fn std140_to_std430_regions() -> Vec<vk::BufferCopy> {
    (0..BUFFER_ELEMENTS as vk::DeviceSize)
        .map(|i| vk::BufferCopy {
            src_offset: i * STD140_STRIDE,
            dst_offset: i * STD430_STRIDE,
            size: STD430_STRIDE,
        })
        .collect()
}

///First position where the data did not match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub found: u32,
    pub expected: u32,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unexpected value found at position {}: found {} and expected {}",
            self.index, self.found, self.expected
        )
    }
}

///Compares `values` against [expected_value]. Only the first [BUFFER_ELEMENTS] values are checked,
/// missing values count as mismatching zeros.
pub fn verify(values: &[u32]) -> Result<(), Mismatch> {
    for index in 0..BUFFER_ELEMENTS {
        let expected = expected_value(index);
        let found = values.get(index as usize).copied().unwrap_or(0);
        if found != expected {
            return Err(Mismatch {
                index: index as usize,
                found,
                expected,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std140_places_value_on_16_byte_boundary() {
        let values = std140_values();
        let bytes: &[u8] = bytemuck::cast_slice(&values);
        assert_eq!(bytes.len() as vk::DeviceSize, STD140_BUFFER_SIZE);
        let at = |i: usize| u32::from_ne_bytes(bytes[i * 16..i * 16 + 4].try_into().unwrap());
        assert_eq!(at(0), 2048);
        assert_eq!(at(1023), 3071);
        assert_eq!(unpack_std140(bytes), Some(expected_values()));
    }

    #[test]
    fn unpack_reads_unaligned_bytes() {
        let values = std430_values();
        let mut bytes = vec![0u8; 1];
        bytes.extend_from_slice(bytemuck::cast_slice(&values));
        assert_eq!(unpack_std430(&bytes[1..]), Some(expected_values()));

        let values = std140_values();
        let mut bytes = vec![0u8; 3];
        bytes.extend_from_slice(bytemuck::cast_slice(&values));
        assert_eq!(unpack_std140(&bytes[3..]), Some(expected_values()));
    }

    #[test]
    fn unpack_rejects_short_input() {
        assert_eq!(unpack_std140(&[0u8; 64]), None);
        assert_eq!(unpack_std430(&[0u8; 4095]), None);
    }

    #[test]
    fn verify_reports_first_mismatch() {
        let mut values = expected_values();
        assert_eq!(verify(&values), Ok(()));

        values[17] = 0;
        values[500] = 1;
        let mismatch = verify(&values).unwrap_err();
        assert_eq!(
            mismatch,
            Mismatch {
                index: 17,
                found: 0,
                expected: 2065
            }
        );
        assert_eq!(
            mismatch.to_string(),
            "Unexpected value found at position 17: found 0 and expected 2065"
        );
    }

    #[test]
    fn verify_detects_truncated_data() {
        let values = expected_values();
        let mismatch = verify(&values[..1000]).unwrap_err();
        assert_eq!(mismatch.index, 1000);
    }

    #[test]
    fn transfer_read_uses_one_region_per_element() {
        let regions = std140_to_std430_regions();
        assert_eq!(regions.len(), BUFFER_ELEMENTS as usize);
        assert_eq!(regions[3].src_offset, 48);
        assert_eq!(regions[3].dst_offset, 12);
        assert!(regions.iter().all(|r| r.size == 4));
    }
}
