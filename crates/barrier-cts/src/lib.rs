//! # barrier-cts
//!
//! Executes the ray tracing barrier matrix on a Vulkan device. Each case of the
//! [CaseTree](barrier_matrix::CaseTree) becomes a [BarrierTest] whose [BarrierTest::iterate] reports a [TestStatus]:
//!
//! ```ignore
//! let ctx = Ctx::new_headless(false)?;
//! let compiler = SpirvDirectory::new("spirv/");
//! let case = TestCase::from_path("barrier.ssbo.memory_barrier.from_comp_to_rgen")?;
//! let status = BarrierTest::new(case)?.iterate(&ctx, &compiler);
//! ```
//!
//! Unsupported device functionality is reported as [TestStatus::NotSupported] and never counts as a failure. Support
//! is decided by [check_support] before anything is created on the device.

pub mod compiler;
pub use compiler::{ShaderCompiler, SpirvDirectory};
#[cfg(feature = "shaderc")]
pub use compiler::ShadercCompiler;

mod instance;
pub use instance::{BarrierTest, TestStatus};

pub mod runner;
pub use runner::{RunConfig, RunSummary};

pub mod stage_data;

mod support;
pub use support::check_support;
