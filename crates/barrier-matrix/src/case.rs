//! Test case parameters, the enumerator that produces the case tree and path filtering.

use regex::Regex;

use crate::{BarrierType, CaseError, ResourceKind, Stage};

///Name of the root group all cases live in.
pub const ROOT_GROUP: &str = "barrier";

///One point of the matrix. Every instance created through [TestCase::new] satisfies the
/// structural rules (no host image access, uniform buffers only written by host or transfer,
/// no host to host pairs).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestCase {
    pub resource: ResourceKind,
    pub barrier: BarrierType,
    pub writer: Stage,
    pub reader: Stage,
}

impl TestCase {
    pub fn new(
        resource: ResourceKind,
        writer: Stage,
        reader: Stage,
        barrier: BarrierType,
    ) -> Result<Self, CaseError> {
        if writer == Stage::Host && reader == Stage::Host {
            return Err(CaseError::HostToHost);
        }

        if resource == ResourceKind::StorageImage && (writer == Stage::Host || reader == Stage::Host)
        {
            return Err(CaseError::HostImageAccess { writer, reader });
        }

        if resource == ResourceKind::UniformBuffer
            && !matches!(writer, Stage::Host | Stage::Transfer)
        {
            return Err(CaseError::UniformWriter(writer));
        }

        Ok(TestCase {
            resource,
            barrier,
            writer,
            reader,
        })
    }

    ///Leaf name, `from_<writer>_to_<reader>`.
    pub fn name(&self) -> String {
        format!("from_{}_to_{}", self.writer.name(), self.reader.name())
    }

    ///Full dotted path, `barrier.<resource>.<barrier>.from_<writer>_to_<reader>`.
    pub fn path(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            ROOT_GROUP,
            self.resource.name(),
            self.barrier.name(),
            self.name()
        )
    }

    ///Parses a path created by [Self::path]. The root group is optional.
    pub fn from_path(path: &str) -> Result<Self, CaseError> {
        let invalid = || CaseError::InvalidPath(path.to_owned());

        let mut parts = path.split('.').collect::<Vec<_>>();
        if parts.first() == Some(&ROOT_GROUP) {
            parts.remove(0);
        }
        let [resource, barrier, leaf] = parts.as_slice() else {
            return Err(invalid());
        };

        let resource = ResourceKind::from_name(resource).ok_or_else(invalid)?;
        let barrier = BarrierType::from_name(barrier).ok_or_else(invalid)?;
        let (writer, reader) = leaf
            .strip_prefix("from_")
            .and_then(|rest| rest.split_once("_to_"))
            .ok_or_else(invalid)?;
        let writer = Stage::from_name(writer).ok_or_else(invalid)?;
        let reader = Stage::from_name(reader).ok_or_else(invalid)?;

        TestCase::new(resource, writer, reader, barrier)
    }

    ///True if either side is a ray tracing stage.
    pub fn involves_ray_tracing(&self) -> bool {
        self.writer.is_ray_tracing() || self.reader.is_ray_tracing()
    }

    ///The tested resource has to be mapped if the host touches it.
    pub fn needs_host_visible_resource(&self) -> bool {
        self.writer == Stage::Host || self.reader == Stage::Host
    }

    ///Binding of the verification buffer in the reader's descriptor set. It moves behind the
    /// acceleration structure if the reader needs one.
    pub fn verification_binding(&self) -> u32 {
        if self.reader.needs_acceleration_structure() {
            2
        } else {
            1
        }
    }
}

impl std::fmt::Display for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

///Knobs of the case enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnumeratorConfig {
    ///Drops every pair where neither writer nor reader is a ray tracing stage.
    pub ray_tracing_only: bool,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        EnumeratorConfig {
            ray_tracing_only: true,
        }
    }
}

impl EnumeratorConfig {
    ///Checks a tuple against all rules. Returns the case if it belongs to the matrix.
    pub fn accept(
        &self,
        resource: ResourceKind,
        writer: Stage,
        reader: Stage,
        barrier: BarrierType,
    ) -> Result<TestCase, CaseError> {
        if self.ray_tracing_only && !writer.is_ray_tracing() && !reader.is_ray_tracing() {
            return Err(CaseError::NoRayTracingStage { writer, reader });
        }
        TestCase::new(resource, writer, reader, barrier)
    }
}

///Cases of one barrier type.
#[derive(Clone, Debug)]
pub struct BarrierGroup {
    pub barrier: BarrierType,
    pub cases: Vec<TestCase>,
}

///All barrier groups of one resource kind.
#[derive(Clone, Debug)]
pub struct ResourceGroup {
    pub resource: ResourceKind,
    pub barriers: Vec<BarrierGroup>,
}

///The hierarchical case tree `barrier/<resource>/<barrier>/<case>`.
#[derive(Clone, Debug)]
pub struct CaseTree {
    pub groups: Vec<ResourceGroup>,
}

impl CaseTree {
    ///Enumerates resource kinds, barrier types, writers and readers in table order.
    pub fn enumerate(config: EnumeratorConfig) -> Self {
        let mut skipped = 0usize;
        let groups = ResourceKind::ALL
            .into_iter()
            .map(|resource| ResourceGroup {
                resource,
                barriers: BarrierType::ALL
                    .into_iter()
                    .map(|barrier| {
                        let mut cases = Vec::new();
                        for writer in Stage::ALL {
                            for reader in Stage::ALL {
                                match config.accept(resource, writer, reader, barrier) {
                                    Ok(case) => cases.push(case),
                                    Err(_) => skipped += 1,
                                }
                            }
                        }
                        BarrierGroup { barrier, cases }
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        #[cfg(feature = "logging")]
        log::debug!("Enumerated case tree, skipped {} tuples", skipped);
        #[cfg(not(feature = "logging"))]
        let _ = skipped;

        CaseTree { groups }
    }

    ///Iterates all cases depth first.
    pub fn iter(&self) -> impl Iterator<Item = &TestCase> + '_ {
        self.groups
            .iter()
            .flat_map(|g| g.barriers.iter())
            .flat_map(|b| b.cases.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

///Set of glob patterns (`*` any sequence, `?` any single character) matched against case paths.
/// An empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct CaseFilter {
    patterns: Vec<Regex>,
}

impl CaseFilter {
    pub fn new<S: AsRef<str>>(globs: &[S]) -> Result<Self, CaseError> {
        let patterns = globs
            .iter()
            .map(|g| Self::compile(g.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CaseFilter { patterns })
    }

    fn compile(glob: &str) -> Result<Regex, CaseError> {
        let escaped = regex::escape(glob)
            .replace(r"\*", ".*")
            .replace(r"\?", ".");
        Regex::new(&format!("^{escaped}$")).map_err(|e| CaseError::InvalidFilter {
            pattern: glob.to_owned(),
            reason: e.to_string(),
        })
    }

    pub fn matches(&self, case: &TestCase) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let path = case.path();
        self.patterns.iter().any(|p| p.is_match(&path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_enumeration_is_ray_tracing_only() {
        let tree = CaseTree::enumerate(EnumeratorConfig::default());
        assert!(tree.iter().all(|c| c.involves_ray_tracing()));
        // per barrier type: 84 ssbo + 72 simg + 12 ubo
        assert_eq!(tree.len(), 2 * (84 + 72 + 12));
    }

    #[test]
    fn structural_rules_hold() {
        let tree = CaseTree::enumerate(EnumeratorConfig {
            ray_tracing_only: false,
        });
        for case in tree.iter() {
            if case.resource == ResourceKind::StorageImage {
                assert_ne!(case.writer, Stage::Host);
                assert_ne!(case.reader, Stage::Host);
            }
            if case.resource == ResourceKind::UniformBuffer {
                assert!(matches!(case.writer, Stage::Host | Stage::Transfer));
            }
            assert!(!(case.writer == Stage::Host && case.reader == Stage::Host));
        }
        assert_eq!(tree.len(), 2 * (99 + 81 + 19));
    }

    #[test]
    fn non_ray_tracing_pairs_are_optional() {
        let host_to_xfer = |c: &&TestCase| {
            c.resource == ResourceKind::StorageBuffer
                && c.writer == Stage::Host
                && c.reader == Stage::Transfer
        };
        let rt_only = CaseTree::enumerate(EnumeratorConfig::default());
        assert!(rt_only.iter().find(host_to_xfer).is_none());

        let all = CaseTree::enumerate(EnumeratorConfig {
            ray_tracing_only: false,
        });
        assert!(all.iter().find(host_to_xfer).is_some());
    }

    #[test]
    fn names_are_unique() {
        let tree = CaseTree::enumerate(EnumeratorConfig::default());
        let paths = tree.iter().map(|c| c.path()).collect::<HashSet<_>>();
        assert_eq!(paths.len(), tree.len());
    }

    #[test]
    fn tree_order_follows_tables() {
        let tree = CaseTree::enumerate(EnumeratorConfig::default());
        assert_eq!(tree.groups[0].resource, ResourceKind::UniformBuffer);
        assert_eq!(tree.groups[0].barriers[0].barrier, BarrierType::General);
        let first = tree.groups[0].barriers[0].cases[0];
        assert_eq!(first.path(), "barrier.ubo.memory_barrier.from_host_to_rgen");
    }

    #[test]
    fn rejects_invalid_tuples() {
        assert_eq!(
            TestCase::new(
                ResourceKind::UniformBuffer,
                Stage::Compute,
                Stage::Raygen,
                BarrierType::General
            ),
            Err(CaseError::UniformWriter(Stage::Compute))
        );
        assert!(matches!(
            TestCase::new(
                ResourceKind::StorageImage,
                Stage::Raygen,
                Stage::Host,
                BarrierType::Specific
            ),
            Err(CaseError::HostImageAccess { .. })
        ));
        assert!(
            EnumeratorConfig::default()
                .accept(
                    ResourceKind::StorageBuffer,
                    Stage::Compute,
                    Stage::Fragment,
                    BarrierType::General
                )
                .is_err()
        );
    }

    #[test]
    fn path_parsing() {
        let case = TestCase::from_path("barrier.simg.specific_barrier.from_xfer_to_isec").unwrap();
        assert_eq!(case.resource, ResourceKind::StorageImage);
        assert_eq!(case.barrier, BarrierType::Specific);
        assert_eq!(case.writer, Stage::Transfer);
        assert_eq!(case.reader, Stage::Intersect);

        let short = TestCase::from_path("ssbo.memory_barrier.from_comp_to_call").unwrap();
        assert_eq!(short.reader, Stage::Callable);

        assert!(TestCase::from_path("barrier.simg.from_xfer_to_isec").is_err());
        assert!(TestCase::from_path("barrier.simg.specific_barrier.from_host_to_isec").is_err());
    }

    #[test]
    fn verification_binding_moves_behind_acceleration_structure() {
        let rgen = TestCase::from_path("ssbo.memory_barrier.from_host_to_rgen").unwrap();
        let miss = TestCase::from_path("ssbo.memory_barrier.from_host_to_miss").unwrap();
        assert_eq!(rgen.verification_binding(), 1);
        assert_eq!(miss.verification_binding(), 2);
    }

    #[test]
    fn glob_filter() {
        let tree = CaseTree::enumerate(EnumeratorConfig::default());
        let filter = CaseFilter::new(&["barrier.simg.*.from_*_to_rgen"]).unwrap();
        let matched = tree.iter().filter(|c| filter.matches(c)).collect::<Vec<_>>();
        assert!(!matched.is_empty());
        assert!(
            matched
                .iter()
                .all(|c| c.resource == ResourceKind::StorageImage && c.reader == Stage::Raygen)
        );

        let exact = CaseFilter::new(&["barrier.ubo.memory_barrier.from_host_to_rgen"]).unwrap();
        assert_eq!(tree.iter().filter(|c| exact.matches(c)).count(), 1);

        let everything = CaseFilter::default();
        assert_eq!(tree.iter().filter(|c| everything.matches(c)).count(), tree.len());
    }
}
