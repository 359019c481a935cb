//! 按对比度缓存的分组结果. 每个对比度只计算一次, 发布后只读.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{build_pathology, build_resolution, PartitionAxis, PartitionIndex};
use crate::dataset::SubjectManifest;
use crate::EvalResult;

/// 同一对比度下的两个分组.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContrastPartitions {
    /// 病理分组.
    pub pathology: PartitionIndex,

    /// 分辨率分组.
    pub resolution: PartitionIndex,
}

impl ContrastPartitions {
    /// 从受试者清单中该对比度的受试者构建.
    pub fn build(manifest: &SubjectManifest, contrast: &str) -> Self {
        Self {
            pathology: build_pathology(manifest.for_contrast(contrast)),
            resolution: build_resolution(manifest.for_contrast(contrast)),
        }
    }

    /// 按分组轴获取.
    pub fn get(&self, axis: PartitionAxis) -> &PartitionIndex {
        match axis {
            PartitionAxis::Pathology => &self.pathology,
            PartitionAxis::Resolution => &self.resolution,
        }
    }
}

type Slot = Arc<OnceCell<Arc<ContrastPartitions>>>;

/// 分组缓存. 可选地持久化到目录 `{dir}/partition_{contrast}.bin`,
/// 文件存在时直接读取而不重新计算.
#[derive(Debug, Default)]
pub struct PartitionCache {
    dir: Option<PathBuf>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl PartitionCache {
    /// 仅在内存中缓存.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// 同时持久化到 `dir`.
    pub fn persistent<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: Some(dir.as_ref().to_owned()),
            slots: Mutex::default(),
        }
    }

    fn slot(&self, contrast: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(contrast.to_owned()).or_default())
    }

    fn file_of(&self, contrast: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(format!("partition_{contrast}.bin")))
    }

    /// 已发布的分组. 尚未计算时返回 `None`.
    pub fn get(&self, contrast: &str) -> Option<Arc<ContrastPartitions>> {
        self.slot(contrast).get().cloned()
    }

    /// 获取某对比度的分组, 不存在时调用 `build` 计算.
    ///
    /// 同一对比度的并发调用只有一个会执行 `build` (或读取持久化文件).
    pub fn get_or_build<F>(&self, contrast: &str, build: F) -> EvalResult<Arc<ContrastPartitions>>
    where
        F: FnOnce() -> ContrastPartitions,
    {
        let slot = self.slot(contrast);
        let ans = slot.get_or_try_init(|| -> EvalResult<_> {
            let file = self.file_of(contrast);
            if let Some(path) = &file {
                match fs::read(path) {
                    Ok(bytes) => {
                        log::debug!("partition loaded from {path:?}");
                        return Ok(Arc::new(bincode::deserialize(&bytes)?));
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }

            let built = build();
            log::info!(
                "partition `{contrast}`: {} pathology groups, {} resolution groups",
                built.pathology.len(),
                built.resolution.len()
            );
            if let Some(path) = &file {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, bincode::serialize(&built)?)?;
            }
            Ok(Arc::new(built))
        })?;
        Ok(Arc::clone(ans))
    }

    /// 从受试者清单获取 (或构建) 某对比度的分组.
    pub fn for_manifest(
        &self,
        manifest: &SubjectManifest,
        contrast: &str,
    ) -> EvalResult<Arc<ContrastPartitions>> {
        self.get_or_build(contrast, || ContrastPartitions::build(manifest, contrast))
    }
}

#[cfg(test)]
mod tests {
    use super::{ContrastPartitions, PartitionCache};
    use crate::dataset::SubjectManifest;
    use crate::partition::tests::subjects;
    use crate::partition::PartitionAxis;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_built_once_per_contrast() {
        let manifest = SubjectManifest::new(subjects());
        let cache = PartitionCache::in_memory();
        let calls = AtomicUsize::new(0);
        let build = || {
            calls.fetch_add(1, Ordering::SeqCst);
            ContrastPartitions::build(&manifest, "t2")
        };

        assert!(cache.get("t2").is_none());
        let a = cache.get_or_build("t2", build).unwrap();
        let b = cache.get_or_build("t2", build).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(a.get(PartitionAxis::Resolution).subjects().len(), 6);

        let other = cache.for_manifest(&manifest, "t1").unwrap();
        assert!(other.resolution.is_empty());
    }

    #[test]
    fn test_persistent_cache_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let manifest = SubjectManifest::new(subjects());

        let first = PartitionCache::persistent(dir.path())
            .for_manifest(&manifest, "t2")
            .unwrap();
        assert!(dir.path().join("partition_t2.bin").is_file());

        // 新的缓存实例从文件读取, 不会调用 build.
        let reloaded = PartitionCache::persistent(dir.path())
            .get_or_build("t2", || panic!("should be loaded from disk"))
            .unwrap();
        assert_eq!(first, reloaded);
    }
}
