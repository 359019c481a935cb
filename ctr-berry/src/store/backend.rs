//! 缓存存储后端.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::NamedTempFile;

use super::{Experiment, RecordKey};
use crate::{EvalError, EvalResult};

/// 存储后端: 按键读取, 每个键只写一次, 按实验前缀枚举键.
///
/// 后端只处理已编码的字节, 不关心记录类型.
pub trait RecordBackend: Send + Sync {
    /// 读取记录. 不存在时返回 `None`.
    fn load(&self, key: &RecordKey) -> EvalResult<Option<Vec<u8>>>;

    /// 写入记录. 若该键已存在则不覆盖, 返回 `false`.
    fn store(&self, key: &RecordKey, bytes: &[u8]) -> EvalResult<bool>;

    /// 枚举某实验下的所有键, 升序排列.
    fn keys(&self, experiment: &Experiment) -> EvalResult<Vec<RecordKey>>;
}

impl<T: RecordBackend + ?Sized> RecordBackend for Arc<T> {
    #[inline]
    fn load(&self, key: &RecordKey) -> EvalResult<Option<Vec<u8>>> {
        (**self).load(key)
    }

    #[inline]
    fn store(&self, key: &RecordKey, bytes: &[u8]) -> EvalResult<bool> {
        (**self).store(key, bytes)
    }

    #[inline]
    fn keys(&self, experiment: &Experiment) -> EvalResult<Vec<RecordKey>> {
        (**self).keys(experiment)
    }
}

/// 内存后端, 进程退出即丢失. 主要用于测试.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<RecordKey, Vec<u8>>>,
}

impl MemoryBackend {
    /// 初始化.
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录条数.
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 是否为空?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordBackend for MemoryBackend {
    fn load(&self, key: &RecordKey) -> EvalResult<Option<Vec<u8>>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }

    fn store(&self, key: &RecordKey, bytes: &[u8]) -> EvalResult<bool> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(key) {
            return Ok(false);
        }
        records.insert(key.clone(), bytes.to_vec());
        Ok(true)
    }

    fn keys(&self, experiment: &Experiment) -> EvalResult<Vec<RecordKey>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .keys()
            .filter(|k| &k.experiment == experiment)
            .cloned()
            .collect())
    }
}

const AGGREGATE_FILE: &str = "aggregate.bin";
const PAIR_PREFIX: &str = "res_";
const RECORD_EXT: &str = ".bin";

/// 文件系统后端. 每个键一个文件:
///
/// ```text
/// {root}/{contrast}_{size}/{configuration}/res_{subject}.bin
/// {root}/{contrast}_{size}/{configuration}/aggregate.bin
/// ```
///
/// 写入时先写临时文件, 再以 "不覆盖" 方式链接到目标路径, 因此多个进程同时写同一个键时
/// 只有第一个写入者生效, 读者也不会看到写了一半的文件.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// 以 `root` 为根目录初始化. 目录会在首次写入时创建.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_owned(),
        }
    }

    /// 根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn experiment_dir(&self, experiment: &Experiment) -> EvalResult<PathBuf> {
        check_component(&experiment.contrast)?;
        Ok(self.root.join(experiment.to_string()))
    }

    /// 键对应的文件路径.
    ///
    /// 键的各分量必须是单个非空路径分量, 否则返回 [`EvalError::InvalidKey`].
    pub fn path_of(&self, key: &RecordKey) -> EvalResult<PathBuf> {
        let mut ans = self.experiment_dir(&key.experiment)?;
        ans.push(check_component(&key.configuration)?);
        match &key.subject {
            Some(s) => ans.push(format!("{PAIR_PREFIX}{}{RECORD_EXT}", check_component(s)?)),
            None => ans.push(AGGREGATE_FILE),
        }
        Ok(ans)
    }
}

/// 标识符会直接拼入路径, 不能含分隔符, 也不能是 `.` 或 `..`.
fn check_component(part: &str) -> EvalResult<&str> {
    let invalid = part.is_empty()
        || part == "."
        || part == ".."
        || part.contains(|c| c == '/' || c == '\\' || c == '\0');
    if invalid {
        Err(EvalError::InvalidKey(part.to_owned()))
    } else {
        Ok(part)
    }
}

impl RecordBackend for FileBackend {
    fn load(&self, key: &RecordKey) -> EvalResult<Option<Vec<u8>>> {
        match fs::read(self.path_of(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &RecordKey, bytes: &[u8]) -> EvalResult<bool> {
        let path = self.path_of(key)?;
        let Some(dir) = path.parent() else {
            return Err(std::io::Error::new(ErrorKind::InvalidInput, "缓存路径没有父目录").into());
        };
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }

    fn keys(&self, experiment: &Experiment) -> EvalResult<Vec<RecordKey>> {
        let dir = self.experiment_dir(experiment)?;
        let entries = match fs::read_dir(&dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ans = Vec::new();
        for cfg_entry in entries {
            let cfg_entry = cfg_entry?;
            if !cfg_entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(configuration) = cfg_entry.file_name().into_string() else {
                continue;
            };

            for file in fs::read_dir(cfg_entry.path())? {
                let Ok(name) = file?.file_name().into_string() else {
                    continue;
                };
                let subject = if name == AGGREGATE_FILE {
                    None
                } else if let Some(s) = name
                    .strip_prefix(PAIR_PREFIX)
                    .and_then(|n| n.strip_suffix(RECORD_EXT))
                {
                    Some(s.to_owned())
                } else {
                    // 临时文件等.
                    continue;
                };
                ans.push(RecordKey {
                    experiment: experiment.clone(),
                    configuration: configuration.clone(),
                    subject,
                });
            }
        }
        ans.sort();
        Ok(ans)
    }
}
