//! GLSL generation for the writer and reader side of a case.
//!
//! Every shader computes `id1d = y * IMAGE_DIM + x` from its invocation coordinates, writers
//! store `VALUES_OFFSET + id1d` into the resource, readers copy `resource[id1d]` into the
//! verification buffer. The resource always sits at set 0 binding 0.

use ash::vk;

use crate::{
    data::{BUFFER_ELEMENTS, IMAGE_DIM, VALUES_OFFSET},
    ResourceKind, ShaderGenError, Stage, TestCase,
};

///Which side of the barrier a shader belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Writer,
    Reader,
}

impl Role {
    pub fn prefix(&self) -> &'static str {
        match self {
            Role::Writer => "writer",
            Role::Reader => "reader",
        }
    }
}

///Shader language stage of a generated source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Raygen,
    Intersection,
    AnyHit,
    ClosestHit,
    Miss,
    Callable,
    Compute,
    Vertex,
    Fragment,
}

impl ShaderKind {
    pub fn stage_flag(&self) -> vk::ShaderStageFlags {
        match self {
            ShaderKind::Raygen => vk::ShaderStageFlags::RAYGEN_KHR,
            ShaderKind::Intersection => vk::ShaderStageFlags::INTERSECTION_KHR,
            ShaderKind::AnyHit => vk::ShaderStageFlags::ANY_HIT_KHR,
            ShaderKind::ClosestHit => vk::ShaderStageFlags::CLOSEST_HIT_KHR,
            ShaderKind::Miss => vk::ShaderStageFlags::MISS_KHR,
            ShaderKind::Callable => vk::ShaderStageFlags::CALLABLE_KHR,
            ShaderKind::Compute => vk::ShaderStageFlags::COMPUTE,
            ShaderKind::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderKind::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn is_ray_tracing(&self) -> bool {
        matches!(
            self,
            ShaderKind::Raygen
                | ShaderKind::Intersection
                | ShaderKind::AnyHit
                | ShaderKind::ClosestHit
                | ShaderKind::Miss
                | ShaderKind::Callable
        )
    }

    ///File extension glslang style tools use to infer the stage.
    pub fn extension(&self) -> &'static str {
        match self {
            ShaderKind::Raygen => "rgen",
            ShaderKind::Intersection => "rint",
            ShaderKind::AnyHit => "rahit",
            ShaderKind::ClosestHit => "rchit",
            ShaderKind::Miss => "rmiss",
            ShaderKind::Callable => "rcall",
            ShaderKind::Compute => "comp",
            ShaderKind::Vertex => "vert",
            ShaderKind::Fragment => "frag",
        }
    }

    ///Name suffix of the program that tests `stage`.
    fn program_suffix(stage: Stage) -> Option<&'static str> {
        match stage {
            Stage::Host | Stage::Transfer => None,
            Stage::Raygen => Some("rgen"),
            Stage::Intersect => Some("isect"),
            Stage::AnyHit => Some("ahit"),
            Stage::ClosestHit => Some("chit"),
            Stage::Miss => Some("miss"),
            Stage::Callable => Some("callable"),
            Stage::Compute => Some("comp"),
            Stage::Fragment => Some("frag"),
        }
    }

    fn for_stage(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Host | Stage::Transfer => None,
            Stage::Raygen => Some(ShaderKind::Raygen),
            Stage::Intersect => Some(ShaderKind::Intersection),
            Stage::AnyHit => Some(ShaderKind::AnyHit),
            Stage::ClosestHit => Some(ShaderKind::ClosestHit),
            Stage::Miss => Some(ShaderKind::Miss),
            Stage::Callable => Some(ShaderKind::Callable),
            Stage::Compute => Some(ShaderKind::Compute),
            Stage::Fragment => Some(ShaderKind::Fragment),
        }
    }
}

///A generated shader. `name` is the lookup key for precompiled binaries and pipelines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    pub name: String,
    pub kind: ShaderKind,
    pub glsl: String,
    ///Ray tracing shaders have to be compiled for SPIR-V 1.4 or newer.
    pub spirv_1_4: bool,
}

///All shaders one side of the barrier needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagePrograms {
    pub role: Role,
    pub stage: Stage,
    ///The shader running in the tested stage.
    pub main: ShaderSource,
    ///Auxiliary raygen shader for non raygen ray tracing stages, vertex shader for fragment work.
    pub aux: Option<ShaderSource>,
}

impl StagePrograms {
    pub fn iter(&self) -> impl Iterator<Item = &ShaderSource> + '_ {
        std::iter::once(&self.main).chain(self.aux.iter())
    }

    ///The shader a ray tracing pipeline starts with (group 0).
    pub fn raygen(&self) -> Option<&ShaderSource> {
        match self.main.kind {
            ShaderKind::Raygen => Some(&self.main),
            _ => self.aux.as_ref().filter(|a| a.kind == ShaderKind::Raygen),
        }
    }
}

///Shaders of both sides of a case. Host and transfer sides have none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CasePrograms {
    pub writer: Option<StagePrograms>,
    pub reader: Option<StagePrograms>,
}

impl CasePrograms {
    pub fn generate(case: &TestCase) -> Result<Self, ShaderGenError> {
        let writer = if case.writer.is_shader() {
            Some(stage_programs(case, Role::Writer)?)
        } else {
            None
        };
        let reader = if case.reader.is_shader() {
            Some(stage_programs(case, Role::Reader)?)
        } else {
            None
        };
        Ok(CasePrograms { writer, reader })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShaderSource> + '_ {
        self.writer
            .iter()
            .flat_map(|p| p.iter())
            .chain(self.reader.iter().flat_map(|p| p.iter()))
    }

    pub fn get(&self, name: &str) -> Option<&ShaderSource> {
        self.iter().find(|s| s.name == name)
    }
}

const RT_HEADER: &str = "#version 460 core\n#extension GL_EXT_ray_tracing : require\n";
const PLAIN_HEADER: &str = "#version 460 core\n";

fn invocation_ids(stage: Stage) -> String {
    let (x, y, xy) = match stage {
        Stage::Compute => (
            "gl_GlobalInvocationID.x",
            "gl_GlobalInvocationID.y",
            "gl_GlobalInvocationID.xy",
        ),
        Stage::Fragment => (
            "uint(gl_FragCoord.x)",
            "uint(gl_FragCoord.y)",
            "gl_FragCoord.xy",
        ),
        _ => ("gl_LaunchIDEXT.x", "gl_LaunchIDEXT.y", "gl_LaunchIDEXT.xy"),
    };
    format!(
        "  const uint  id1d = {y} * {IMAGE_DIM} + {x};\n  const ivec2 id2d = ivec2({xy});\n"
    )
}

fn resource_decl(resource: ResourceKind) -> String {
    match resource {
        ResourceKind::UniformBuffer => format!(
            "layout(set = 0, binding = 0, std140) uniform ubodef {{ uint data[{BUFFER_ELEMENTS}]; }} ubo;\n"
        ),
        ResourceKind::StorageBuffer => format!(
            "layout(set = 0, binding = 0, std140) buffer ssbodef {{ uint data[{BUFFER_ELEMENTS}]; }} ssbo;\n"
        ),
        ResourceKind::StorageImage => {
            "layout(r32ui, set = 0, binding = 0) uniform uimage2D simage;\n".to_owned()
        }
    }
}

fn write_statement(resource: ResourceKind, stage: Stage) -> Result<String, ShaderGenError> {
    let store = match resource {
        //uniform buffers are read only in shaders
        ResourceKind::UniformBuffer => {
            return Err(ShaderGenError::UnsupportedAccess { resource, stage });
        }
        ResourceKind::StorageBuffer => "  ssbo.data[id1d] = val;\n",
        ResourceKind::StorageImage => "  imageStore(simage, id2d, uvec4(val, 0, 0, 0));\n",
    };
    Ok(format!(
        "  const uint  val  = id1d + {VALUES_OFFSET};\n{store}"
    ))
}

fn read_statement(resource: ResourceKind) -> String {
    let load = match resource {
        ResourceKind::UniformBuffer => "  const uint  val  = ubo.data[id1d];\n",
        ResourceKind::StorageBuffer => "  const uint  val  = ssbo.data[id1d];\n",
        ResourceKind::StorageImage => "  const uint  val  = imageLoad(simage, id2d).x;\n",
    };
    format!("{load}  verificationBuffer.data[id1d] = val;\n")
}

fn verifier_decl(binding: u32) -> String {
    format!(
        "layout(set = 0, binding = {binding}) buffer vssbodef {{ uint data[{BUFFER_ELEMENTS}]; }} verificationBuffer;\n"
    )
}

///Declarations the ray tracing stage needs before the resources.
fn stage_interface(stage: Stage) -> &'static str {
    match stage {
        Stage::Intersect => "hitAttributeEXT vec3 hitAttribute;\n",
        Stage::AnyHit | Stage::ClosestHit => {
            "layout(location = 0) rayPayloadInEXT vec3 unusedPayload;\nhitAttributeEXT vec3 attribs;\n"
        }
        Stage::Miss => "layout(location = 0) rayPayloadInEXT vec3 unusedPayload;\n",
        Stage::Callable => "layout(location = 0) callableDataInEXT float unusedCallableData;\n",
        Stage::Host
        | Stage::Transfer
        | Stage::Raygen
        | Stage::Compute
        | Stage::Fragment => "",
    }
}

///Raygen shader that shoots one ray per launch id straight down -z through the unit square.
pub fn trace_rays_raygen() -> String {
    let mut src = String::from(RT_HEADER);
    src.push_str(
        "layout(location = 0) rayPayloadEXT vec3 hitValue;\n\
         layout(set = 0, binding = 1) uniform accelerationStructureEXT topLevelAS;\n\
         \n\
         void main()\n\
         {\n\
         \x20 uint  rayFlags = 0;\n\
         \x20 uint  cullMask = 0xFF;\n\
         \x20 float tmin     = 0.0;\n\
         \x20 float tmax     = 9.0;\n\
         \x20 vec3  origin   = vec3((float(gl_LaunchIDEXT.x) + 0.5f) / float(gl_LaunchSizeEXT.x), (float(gl_LaunchIDEXT.y) + 0.5f) / float(gl_LaunchSizeEXT.y), 0.0);\n\
         \x20 vec3  direct   = vec3(0.0, 0.0, -1.0);\n\
         \x20 traceRayEXT(topLevelAS, rayFlags, cullMask, 0, 0, 0, origin, tmin, direct, tmax, 0);\n\
         }\n",
    );
    src
}

///Raygen shader that invokes callable 0 once per launch id.
pub fn execute_callable_raygen() -> String {
    let mut src = String::from(RT_HEADER);
    src.push_str(
        "layout(location = 0) callableDataEXT float unusedCallableData;\n\
         layout(set = 0, binding = 1) uniform accelerationStructureEXT topLevelAS;\n\
         \n\
         void main()\n\
         {\n\
         \x20 executeCallableEXT(0, 0);\n\
         }\n",
    );
    src
}

///Pass through vertex shader for the full screen quad.
pub fn passthrough_vertex() -> String {
    let mut src = String::from(PLAIN_HEADER);
    src.push_str(
        "layout(location = 0) in highp vec4 position;\n\
         void main()\n\
         {\n\
         \x20 gl_Position = position;\n\
         }\n",
    );
    src
}

fn stage_programs(case: &TestCase, role: Role) -> Result<StagePrograms, ShaderGenError> {
    let stage = match role {
        Role::Writer => case.writer,
        Role::Reader => case.reader,
    };
    let kind = ShaderKind::for_stage(stage).ok_or(ShaderGenError::NotAShaderStage(stage))?;
    let suffix = ShaderKind::program_suffix(stage).ok_or(ShaderGenError::NotAShaderStage(stage))?;

    let mut glsl = String::from(if kind.is_ray_tracing() {
        RT_HEADER
    } else {
        PLAIN_HEADER
    });
    glsl.push_str(stage_interface(stage));
    glsl.push_str(&resource_decl(case.resource));
    let body = match role {
        Role::Writer => write_statement(case.resource, stage)?,
        Role::Reader => {
            glsl.push_str(&verifier_decl(case.verification_binding()));
            read_statement(case.resource)
        }
    };

    glsl.push_str("void main()\n{\n");
    glsl.push_str(&invocation_ids(stage));
    glsl.push_str(&body);
    if stage == Stage::Intersect {
        glsl.push_str("  hitAttribute = vec3(0.0f, 0.0f, 0.0f);\n  reportIntersectionEXT(1.0f, 0);\n");
    }
    glsl.push_str("}\n");

    let main = ShaderSource {
        name: format!("{}_{}", role.prefix(), suffix),
        kind,
        glsl,
        spirv_1_4: kind.is_ray_tracing(),
    };

    let aux = if stage.needs_acceleration_structure() {
        let glsl = if stage == Stage::Callable {
            execute_callable_raygen()
        } else {
            trace_rays_raygen()
        };
        Some(ShaderSource {
            name: format!("{}_aux_rgen", role.prefix()),
            kind: ShaderKind::Raygen,
            glsl,
            spirv_1_4: true,
        })
    } else if stage == Stage::Fragment {
        Some(ShaderSource {
            name: format!("{}_aux_vert", role.prefix()),
            kind: ShaderKind::Vertex,
            glsl: passthrough_vertex(),
            spirv_1_4: false,
        })
    } else {
        None
    };

    #[cfg(feature = "logging")]
    log::trace!("Generated {} shaders for {}", role.prefix(), case);

    Ok(StagePrograms {
        role,
        stage,
        main,
        aux,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaseTree, EnumeratorConfig};

    fn programs(path: &str) -> CasePrograms {
        CasePrograms::generate(&TestCase::from_path(path).unwrap()).unwrap()
    }

    #[test]
    fn host_and_transfer_have_no_shaders() {
        let p = programs("barrier.ssbo.memory_barrier.from_host_to_rgen");
        assert!(p.writer.is_none());
        let reader = p.reader.unwrap();
        assert_eq!(reader.main.name, "reader_rgen");
        assert!(reader.aux.is_none());
    }

    #[test]
    fn naming_contract_holds_for_every_case() {
        let tree = CaseTree::enumerate(EnumeratorConfig {
            ray_tracing_only: false,
        });
        for case in tree.iter() {
            let p = CasePrograms::generate(case).unwrap();
            for (side, stage, role) in [
                (&p.writer, case.writer, Role::Writer),
                (&p.reader, case.reader, Role::Reader),
            ] {
                match side {
                    None => assert!(!stage.is_shader(), "{case}"),
                    Some(sp) => {
                        assert!(sp.main.name.starts_with(role.prefix()));
                        assert_eq!(sp.main.spirv_1_4, stage.is_ray_tracing());
                        match &sp.aux {
                            Some(aux) if aux.kind == ShaderKind::Raygen => {
                                assert!(stage.needs_acceleration_structure());
                                assert_eq!(aux.name, format!("{}_aux_rgen", role.prefix()));
                            }
                            Some(aux) => {
                                assert_eq!(stage, Stage::Fragment);
                                assert_eq!(aux.name, format!("{}_aux_vert", role.prefix()));
                            }
                            None => assert!(matches!(stage, Stage::Raygen | Stage::Compute)),
                        }
                        if stage.is_ray_tracing() {
                            assert!(sp.raygen().is_some(), "{case}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn reader_verifier_binding_follows_acceleration_structure() {
        let miss = programs("barrier.ssbo.memory_barrier.from_comp_to_miss");
        let reader = miss.reader.unwrap();
        assert!(reader.main.glsl.contains("binding = 2) buffer vssbodef"));
        assert!(reader.main.glsl.contains("rayPayloadInEXT vec3 unusedPayload"));

        let comp = programs("barrier.ssbo.memory_barrier.from_rgen_to_comp");
        assert!(comp.reader.unwrap().main.glsl.contains("binding = 1) buffer vssbodef"));
    }

    #[test]
    fn writer_body() {
        let p = programs("barrier.simg.specific_barrier.from_isec_to_xfer");
        let writer = p.writer.unwrap();
        assert_eq!(writer.main.name, "writer_isect");
        assert_eq!(writer.main.kind, ShaderKind::Intersection);
        assert!(writer.main.glsl.contains("const uint  val  = id1d + 2048;"));
        assert!(writer.main.glsl.contains("imageStore(simage, id2d, uvec4(val, 0, 0, 0));"));
        assert!(writer.main.glsl.contains("reportIntersectionEXT(1.0f, 0);"));
        assert!(writer.main.glsl.contains("gl_LaunchIDEXT.y * 32 + gl_LaunchIDEXT.x"));
        assert!(writer.aux.unwrap().glsl.contains("traceRayEXT"));
        assert!(p.reader.is_none());
    }

    #[test]
    fn main_wraps_ids_and_body() {
        let p = programs("barrier.ssbo.specific_barrier.from_comp_to_rgen");
        let glsl = p.writer.unwrap().main.glsl;
        let main = glsl
            .find("void main()\n{\n  const uint  id1d = gl_GlobalInvocationID.y * 32 + gl_GlobalInvocationID.x;\n")
            .unwrap();
        let store = glsl.find("const uint  val  = id1d + 2048;").unwrap();
        assert!(main < store);
        assert!(glsl.ends_with("}\n"));
    }

    #[test]
    fn callable_uses_execute_callable() {
        let p = programs("barrier.ssbo.memory_barrier.from_call_to_frag");
        let writer = p.writer.unwrap();
        assert!(writer.main.glsl.contains("callableDataInEXT"));
        assert!(writer.aux.unwrap().glsl.contains("executeCallableEXT(0, 0);"));

        let reader = p.reader.unwrap();
        assert_eq!(reader.main.name, "reader_frag");
        assert!(reader.main.glsl.contains("uint(gl_FragCoord.y) * 32 + uint(gl_FragCoord.x)"));
        assert_eq!(reader.aux.unwrap().name, "reader_aux_vert");
    }

    #[test]
    fn uniform_reader() {
        let p = programs("barrier.ubo.specific_barrier.from_xfer_to_chit");
        let reader = p.reader.as_ref().unwrap();
        assert!(reader.main.glsl.contains("uniform ubodef { uint data[1024]; } ubo;"));
        assert!(reader.main.glsl.contains("const uint  val  = ubo.data[id1d];"));
        assert!(p.get("reader_aux_rgen").is_some());
        assert!(p.get("writer_aux_rgen").is_none());
    }
}
