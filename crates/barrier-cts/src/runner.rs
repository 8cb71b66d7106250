//! Case selection and the run loop of the command line runner.

use std::path::PathBuf;

use barrier_matrix::{CaseError, CaseFilter, CaseTree, EnumeratorConfig, TestCase};
use barrier_vk::{allocator::Allocator, context::Ctx};

use crate::{compiler::ShaderCompiler, BarrierTest, TestStatus};

///Everything a run can be configured with.
#[derive(Clone, Debug)]
pub struct RunConfig {
    ///Glob patterns over case paths. An empty list selects every case.
    pub filters: Vec<String>,
    pub ray_tracing_only: bool,
    ///Enables the Khronos validation layer.
    pub validation: bool,
    ///Directory of precompiled `<program>.spv` files. If not set, shaders are compiled at runtime.
    pub spirv_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            filters: Vec::new(),
            ray_tracing_only: EnumeratorConfig::default().ray_tracing_only,
            validation: false,
            spirv_dir: None,
        }
    }
}

impl RunConfig {
    pub fn enumerator_config(&self) -> EnumeratorConfig {
        EnumeratorConfig {
            ray_tracing_only: self.ray_tracing_only,
        }
    }

    ///All enumerated cases that match the filters, in enumeration order.
    pub fn select_cases(&self) -> Result<Vec<TestCase>, CaseError> {
        let filter = CaseFilter::new(&self.filters)?;
        Ok(CaseTree::enumerate(self.enumerator_config())
            .iter()
            .filter(|case| filter.matches(case))
            .copied()
            .collect())
    }
}

///Counts of each outcome plus the paths of failed cases.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: Vec<String>,
    pub not_supported: usize,
}

impl RunSummary {
    pub fn add(&mut self, case: &TestCase, status: &TestStatus) {
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail(_) => self.failed.push(case.path()),
            TestStatus::NotSupported(_) => self.not_supported += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed.len() + self.not_supported
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cases: {} passed, {} failed, {} not supported",
            self.total(),
            self.passed,
            self.failed.len(),
            self.not_supported
        )
    }
}

///Runs every case in order. `report` is called with the outcome of each case right after it finished.
pub fn run<A: Allocator + Send + Sync + 'static>(
    ctx: &Ctx<A>,
    compiler: &dyn ShaderCompiler,
    cases: &[TestCase],
    mut report: impl FnMut(&TestCase, &TestStatus),
) -> RunSummary {
    let mut summary = RunSummary::default();
    for case in cases {
        log::info!("Running {}", case);
        let status = match BarrierTest::new(*case) {
            Ok(test) => test.iterate(ctx, compiler),
            Err(e) => TestStatus::Fail(e.to_string()),
        };
        report(case, &status);
        summary.add(case, &status);
    }

    //make sure nothing of the last case is still in flight when the context is dropped
    ctx.device.wait_idle();
    log::info!("{}", summary);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_select_subset() {
        let config = RunConfig {
            filters: vec!["barrier.simg.specific_barrier.from_*_to_rgen".to_owned()],
            ray_tracing_only: true,
            ..Default::default()
        };
        let cases = config.select_cases().unwrap();
        assert!(!cases.is_empty());
        for case in &cases {
            assert!(case.path().starts_with("barrier.simg.specific_barrier.from_"));
            assert!(case.path().ends_with("_to_rgen"));
        }

        let all = RunConfig {
            ray_tracing_only: true,
            ..Default::default()
        };
        assert!(all.select_cases().unwrap().len() > cases.len());
    }

    #[test]
    fn non_rt_pairs_need_opt_in() {
        let path = "barrier.ssbo.memory_barrier.from_comp_to_frag";
        let default = RunConfig {
            filters: vec![path.to_owned()],
            ray_tracing_only: true,
            ..Default::default()
        };
        assert!(default.select_cases().unwrap().is_empty());

        let all = RunConfig {
            ray_tracing_only: false,
            ..default
        };
        assert_eq!(all.select_cases().unwrap().len(), 1);
    }

    #[test]
    fn summary_counts() {
        let case = TestCase::from_path("barrier.ssbo.memory_barrier.from_host_to_rgen").unwrap();
        let mut summary = RunSummary::default();
        summary.add(&case, &TestStatus::Pass);
        summary.add(&case, &TestStatus::NotSupported("rt".into()));
        assert!(!summary.has_failures());
        summary.add(&case, &TestStatus::Fail("mismatch".into()));
        assert!(summary.has_failures());
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failed, vec![case.path()]);
        assert_eq!(
            summary.to_string(),
            "3 cases: 1 passed, 1 failed, 1 not supported"
        );
    }
}
