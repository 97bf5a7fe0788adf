// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. Meshes name their pre-compiled
// .spv files; build.rs compiles the bundled GLSL sources next to them.

use ash::vk;
use std::io::{self, Cursor};
use std::path::Path;

use crate::error::{RenderError, RenderResult, VkResultExt};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into aligned words.
pub fn parse_spirv(bytes: &[u8]) -> io::Result<Vec<u32>> {
    // read_spv fixes up byte order from the header
    let words = ash::util::read_spv(&mut Cursor::new(bytes))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(io::Error::new(io::ErrorKind::InvalidData, "missing SPIR-V magic number")),
    }
}

/// Read a SPIR-V file and create a shader module from it.
pub fn load_shader_module(device: &ash::Device, path: &Path) -> RenderResult<vk::ShaderModule> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::ShaderRead {
        path: path.to_path_buf(),
        source,
    })?;

    let code = parse_spirv(&bytes).map_err(|source| RenderError::InvalidShader {
        path: path.to_path_buf(),
        source,
    })?;

    log::debug!("Loaded shader {:?} ({} words)", path, code.len());

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
    unsafe { device.create_shader_module(&create_info, None) }.op("vkCreateShaderModule")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn accepts_spirv_header() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0, 1, 0]);
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn accepts_byte_swapped_spirv() {
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000]
            .iter()
            .flat_map(|w| w.to_be_bytes())
            .collect();
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 0]);
        let err = parse_spirv(&bytes).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_truncated_and_empty_input() {
        assert!(parse_spirv(&[0x03, 0x02, 0x23]).is_err());
        assert!(parse_spirv(&[]).is_err());
    }
}
