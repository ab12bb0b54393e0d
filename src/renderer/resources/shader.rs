use std::path::{Path, PathBuf};
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;

const SHADERS_DIR: &str = "shaders-built";

/// Vertex and fragment modules loaded from precompiled SPIR-V
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(shader_name: &str, device: Arc<ash::Device>) -> Result<Self> {
        let (vert_path, frag_path) = shader_paths(shader_name);
        let vert_mod = create_shader_module(&vert_path, &device)?;
        let frag_mod = match create_shader_module(&frag_path, &device) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(e);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

pub fn shader_paths(shader_name: &str) -> (PathBuf, PathBuf) {
    let dir = Path::new(SHADERS_DIR);
    (
        dir.join(format!("{}.vert.spv", shader_name)),
        dir.join(format!("{}.frag.spv", shader_name)),
    )
}

/// SPIR-V words from a file, rejecting anything that is not a whole number of words
fn read_spirv(filepath: &Path) -> Result<Vec<u32>> {
    let mut file = std::fs::File::open(filepath)
        .wrap_err_with(|| format!("Failed to open shader {:?}", filepath))?;
    Ok(ash::util::read_spv(&mut file)?)
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let code = read_spirv(filepath)?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_shader_paths() {
        let (vert, frag) = shader_paths("textured");
        assert_eq!(vert, Path::new("shaders-built/textured.vert.spv"));
        assert_eq!(frag, Path::new("shaders-built/textured.frag.spv"));
    }

    #[test]
    fn test_missing_shader_is_an_error() {
        assert!(read_spirv(Path::new("shaders-built/does-not-exist.vert.spv")).is_err());
    }

    #[test]
    fn test_read_spirv_words() {
        let path = std::env::temp_dir().join(format!("orrery-shader-{}.spv", std::process::id()));
        let words: [u32; 2] = [0x0723_0203, 0x0001_0000];
        fs::write(&path, bytemuck::cast_slice::<u32, u8>(&words)).unwrap();
        let read = read_spirv(&path);
        fs::remove_file(&path).unwrap();
        assert_eq!(read.unwrap(), words);

        let odd = std::env::temp_dir().join(format!("orrery-shader-odd-{}.spv", std::process::id()));
        fs::write(&odd, [1u8, 2, 3]).unwrap();
        let read = read_spirv(&odd);
        fs::remove_file(&odd).unwrap();
        assert!(read.is_err());
    }
}
