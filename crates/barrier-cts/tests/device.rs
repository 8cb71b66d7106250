//! Runs cases on the first Vulkan 1.3 device. Ignored by default, run with `--ignored` on a machine with a GPU.
//!
//! Shaders are compiled with shaderc if the feature is enabled, otherwise they are loaded from the directory in
//! `BARRIER_CTS_SPIRV_DIR`.

use barrier_cts::{BarrierTest, ShaderCompiler, SpirvDirectory, TestStatus};
use barrier_matrix::{data, TestCase};
use barrier_vk::context::Ctx;

fn compiler() -> Box<dyn ShaderCompiler> {
    #[cfg(feature = "shaderc")]
    if std::env::var_os("BARRIER_CTS_SPIRV_DIR").is_none() {
        return Box::new(barrier_cts::ShadercCompiler::new().unwrap());
    }
    let dir = std::env::var_os("BARRIER_CTS_SPIRV_DIR")
        .expect("set BARRIER_CTS_SPIRV_DIR or enable the shaderc feature");
    Box::new(SpirvDirectory::new(dir))
}

fn run(path: &str) -> (BarrierTest, TestStatus) {
    let ctx = Ctx::new_headless(false).unwrap();
    let test = BarrierTest::new(TestCase::from_path(path).unwrap()).unwrap();
    let compiler = compiler();

    if let Err(e) = test.check_support(&ctx.capabilities) {
        println!("{} skipped: {}", path, e);
        return (test, TestStatus::NotSupported(e.to_string()));
    }

    let values = test.execute(&ctx, compiler.as_ref()).unwrap();
    assert_eq!(values.len(), data::BUFFER_ELEMENTS as usize);
    for (i, v) in values.iter().enumerate() {
        assert_eq!(*v, 2048 + i as u32, "value at {i}");
    }

    let status = test.iterate(&ctx, compiler.as_ref());
    (test, status)
}

#[test]
#[ignore = "needs a ray tracing capable GPU"]
fn compute_to_closest_hit_storage_buffer() {
    let (test, status) = run("barrier.ssbo.specific_barrier.from_comp_to_chit");
    assert!(test.programs.reader.as_ref().unwrap().aux.is_some());
    assert!(!status.is_fail(), "{status}");
}

#[test]
#[ignore = "needs a ray tracing capable GPU"]
fn transfer_to_compute_storage_image() {
    //not a ray tracing pair, only enumerated with `ray_tracing_only = false`
    let (_test, status) = run("barrier.simg.specific_barrier.from_xfer_to_comp");
    assert_eq!(status, TestStatus::Pass);
}

#[test]
#[ignore = "needs a ray tracing capable GPU"]
fn host_roundtrip_through_raygen() {
    for path in [
        "barrier.ssbo.memory_barrier.from_host_to_rgen",
        "barrier.ubo.specific_barrier.from_xfer_to_miss",
        "barrier.ssbo.memory_barrier.from_isec_to_host",
    ] {
        let (_test, status) = run(path);
        assert!(!status.is_fail(), "{path}: {status}");
    }
}
