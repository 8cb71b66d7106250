//! Turns generated GLSL into SPIR-V.
//!
//! Program names are the lookup key, so a directory of precompiled `<name>.spv` files and the runtime compiler are
//! interchangeable.

use std::path::{Path, PathBuf};

use barrier_matrix::ShaderSource;
use barrier_vk::{ash, ShaderError};

///Anything that can provide the SPIR-V words for a generated shader.
pub trait ShaderCompiler {
    fn compile(&self, source: &ShaderSource) -> Result<Vec<u32>, ShaderError>;
}

///Loads precompiled binaries named `<program name>.spv` from a directory.
#[derive(Clone, Debug)]
pub struct SpirvDirectory {
    pub dir: PathBuf,
}

impl SpirvDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SpirvDirectory { dir: dir.into() }
    }

    pub fn path_for(&self, source: &ShaderSource) -> PathBuf {
        self.dir.join(format!("{}.spv", source.name))
    }
}

impl ShaderCompiler for SpirvDirectory {
    fn compile(&self, source: &ShaderSource) -> Result<Vec<u32>, ShaderError> {
        let path = self.path_for(source);
        if !path.exists() {
            return Err(ShaderError::MissingProgram(source.name.clone()));
        }
        read_spirv(&path)
    }
}

fn read_spirv(path: &Path) -> Result<Vec<u32>, ShaderError> {
    let mut file = std::fs::File::open(path)?;
    Ok(ash::util::read_spv(&mut file)?)
}

///Compiles GLSL at runtime. Targets Vulkan 1.2, ray tracing shaders are emitted as SPIR-V 1.4.
#[cfg(feature = "shaderc")]
pub struct ShadercCompiler {
    compiler: shaderc::Compiler,
}

#[cfg(feature = "shaderc")]
impl ShadercCompiler {
    pub fn new() -> Result<Self, ShaderError> {
        let compiler = shaderc::Compiler::new().ok_or_else(|| ShaderError::Compilation {
            name: "shaderc".to_owned(),
            message: "shaderc compiler unavailable".to_owned(),
        })?;
        Ok(ShadercCompiler { compiler })
    }

    fn kind(kind: barrier_matrix::ShaderKind) -> shaderc::ShaderKind {
        use barrier_matrix::ShaderKind;
        match kind {
            ShaderKind::Raygen => shaderc::ShaderKind::RayGeneration,
            ShaderKind::Intersection => shaderc::ShaderKind::Intersection,
            ShaderKind::AnyHit => shaderc::ShaderKind::AnyHit,
            ShaderKind::ClosestHit => shaderc::ShaderKind::ClosestHit,
            ShaderKind::Miss => shaderc::ShaderKind::Miss,
            ShaderKind::Callable => shaderc::ShaderKind::Callable,
            ShaderKind::Compute => shaderc::ShaderKind::Compute,
            ShaderKind::Vertex => shaderc::ShaderKind::Vertex,
            ShaderKind::Fragment => shaderc::ShaderKind::Fragment,
        }
    }
}

#[cfg(feature = "shaderc")]
impl ShaderCompiler for ShadercCompiler {
    fn compile(&self, source: &ShaderSource) -> Result<Vec<u32>, ShaderError> {
        let compilation_error = |message: String| ShaderError::Compilation {
            name: source.name.clone(),
            message,
        };

        let mut options = shaderc::CompileOptions::new()
            .ok_or_else(|| compilation_error("shaderc options unavailable".to_owned()))?;
        options.set_target_env(
            shaderc::TargetEnv::Vulkan,
            shaderc::EnvVersion::Vulkan1_2 as u32,
        );
        if source.spirv_1_4 {
            options.set_target_spirv(shaderc::SpirvVersion::V1_4);
        }

        let file_name = format!("{}.{}", source.name, source.kind.extension());
        let artifact = self
            .compiler
            .compile_into_spirv(
                &source.glsl,
                Self::kind(source.kind),
                &file_name,
                "main",
                Some(&options),
            )
            .map_err(|e| compilation_error(e.to_string()))?;

        if artifact.get_num_warnings() > 0 {
            log::warn!("{}: {}", file_name, artifact.get_warning_messages());
        }

        Ok(artifact.as_binary().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrier_matrix::{CasePrograms, TestCase};

    fn reader_rgen() -> ShaderSource {
        let case = TestCase::from_path("barrier.ssbo.memory_barrier.from_host_to_rgen").unwrap();
        CasePrograms::generate(&case)
            .unwrap()
            .get("reader_rgen")
            .cloned()
            .unwrap()
    }

    #[test]
    fn directory_uses_program_name() {
        let dir = SpirvDirectory::new("/shaders");
        assert_eq!(
            dir.path_for(&reader_rgen()),
            PathBuf::from("/shaders/reader_rgen.spv")
        );
    }

    #[test]
    fn missing_binary_is_reported_by_name() {
        let dir = SpirvDirectory::new(std::env::temp_dir().join("barrier-cts-no-such-dir"));
        match dir.compile(&reader_rgen()) {
            Err(ShaderError::MissingProgram(name)) => assert_eq!(name, "reader_rgen"),
            other => panic!("unexpected result {:?}", other.map(|w| w.len())),
        }
    }

    #[test]
    fn loads_spirv_words() {
        let dir = std::env::temp_dir().join(format!("barrier-cts-spv-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        //magic number followed by a version word, little endian
        let words: [u32; 2] = [0x0723_0203, 0x0001_0400];
        let bytes = words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect::<Vec<u8>>();
        std::fs::write(dir.join("reader_rgen.spv"), bytes).unwrap();

        let loaded = SpirvDirectory::new(&dir).compile(&reader_rgen()).unwrap();
        assert_eq!(loaded, words);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
