//! 受试者元数据.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::consts::HEALTHY_CONTROL;
use crate::{EvalResult, NiftiHeaderAttr, SubjectId};

/// 单个受试者. 由数据集整理流程产生, 对本库只读.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// 标识符.
    pub id: SubjectId,

    /// 病理标签. `None` 表示没有病理元数据; 空字符串表示健康对照.
    #[serde(default)]
    pub pathology: Option<String>,

    /// 体素分辨率 `[rx, ry, rz]` (单位: 毫米), 其中 `rz` 为层间方向.
    pub resolution: [f64; 3],

    /// 采集对比度, 如 `t1`, `t2`.
    pub contrast: String,
}

impl Subject {
    /// 初始化.
    pub fn new(
        id: impl Into<SubjectId>,
        pathology: Option<&str>,
        resolution: [f64; 3],
        contrast: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            pathology: pathology.map(str::to_owned),
            resolution,
            contrast: contrast.into(),
        }
        .normalized()
    }

    /// 分辨率取自图像 header 的 `pixdim`.
    pub fn from_header(
        id: impl Into<SubjectId>,
        pathology: Option<&str>,
        contrast: impl Into<String>,
        image: &impl NiftiHeaderAttr,
    ) -> Self {
        Self::new(id, pathology, image.resolution(), contrast)
    }

    /// 将空 (或全空白) 病理标签替换为 [`HEALTHY_CONTROL`].
    pub fn normalized(mut self) -> Self {
        if let Some(p) = self.pathology.as_mut() {
            let trimmed = p.trim();
            *p = if trimmed.is_empty() {
                HEALTHY_CONTROL.to_owned()
            } else {
                trimmed.to_owned()
            };
        }
        self
    }

    /// 该受试者所属的病理分组名. 没有病理元数据时返回 `None`.
    pub fn pathology_group(&self) -> Option<&str> {
        self.pathology.as_deref().map(|p| {
            let p = p.trim();
            if p.is_empty() {
                HEALTHY_CONTROL
            } else {
                p
            }
        })
    }
}

/// 受试者清单, 以 JSON 数组形式存储.
///
/// ```json
/// [
///   {"id": "s1", "pathology": "", "resolution": [0.5, 0.5, 3.0], "contrast": "t2"},
///   {"id": "s2", "pathology": "MS", "resolution": [1.0, 1.0, 1.0], "contrast": "t2"}
/// ]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectManifest {
    subjects: Vec<Subject>,
}

impl SubjectManifest {
    /// 初始化. 病理标签会被规范化, 重复标识符只保留第一次出现.
    pub fn new<I: IntoIterator<Item = Subject>>(subjects: I) -> Self {
        let subjects = subjects
            .into_iter()
            .map(Subject::normalized)
            .unique_by(|s| s.id.clone())
            .collect();
        Self { subjects }
    }

    /// 从 JSON 文本解析.
    pub fn from_json_str(s: &str) -> EvalResult<Self> {
        let raw: Vec<Subject> = serde_json::from_str(s)?;
        Ok(Self::new(raw))
    }

    /// 从 JSON 文件读取.
    pub fn load<P: AsRef<Path>>(path: P) -> EvalResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let raw: Vec<Subject> = serde_json::from_reader(reader)?;
        log::debug!("manifest loaded: {} subjects", raw.len());
        Ok(Self::new(raw))
    }

    /// 写入 JSON 文件.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> EvalResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// 所有受试者.
    #[inline]
    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    /// 受试者个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    /// 清单是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// 按标识符查找.
    pub fn get(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    /// 某对比度下的所有受试者.
    pub fn for_contrast<'a>(&'a self, contrast: &'a str) -> impl Iterator<Item = &'a Subject> + 'a {
        self.subjects.iter().filter(move |s| s.contrast == contrast)
    }
}

#[cfg(test)]
mod tests {
    use super::{Subject, SubjectManifest};
    use crate::{Affine, NiiVolume};
    use ndarray::Array3;

    #[test]
    fn test_pathology_normalization() {
        let s = Subject::new("a", Some(""), [1.0; 3], "t2");
        assert_eq!(s.pathology.as_deref(), Some("HC"));
        assert_eq!(s.pathology_group(), Some("HC"));

        let s = Subject::new("b", Some(" MS "), [1.0; 3], "t2");
        assert_eq!(s.pathology_group(), Some("MS"));

        let s = Subject::new("c", None, [1.0; 3], "t2");
        assert_eq!(s.pathology_group(), None);
    }

    #[test]
    fn test_manifest_json() {
        let text = r#"[
            {"id": "s1", "pathology": "", "resolution": [0.5, 0.5, 3.0], "contrast": "t2"},
            {"id": "s2", "pathology": "MS", "resolution": [1.0, 1.0, 1.0], "contrast": "t2"},
            {"id": "s3", "resolution": [1.0, 1.0, 1.0], "contrast": "t1"},
            {"id": "s1", "pathology": "CSM", "resolution": [1.0, 1.0, 1.0], "contrast": "t2"}
        ]"#;
        let m = SubjectManifest::from_json_str(text).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m.get("s1").unwrap().pathology.as_deref(), Some("HC"));
        assert_eq!(m.get("s3").unwrap().pathology, None);
        assert_eq!(m.for_contrast("t2").count(), 2);
        assert!(SubjectManifest::from_json_str("{").is_err());
    }

    #[test]
    fn test_manifest_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subjects.json");
        let m = SubjectManifest::new([
            Subject::new("x", Some("MS"), [0.5, 0.5, 3.0], "t2"),
            Subject::new("y", Some(""), [1.0, 1.0, 1.0], "t2"),
        ]);
        m.save(&path).unwrap();
        assert_eq!(SubjectManifest::load(&path).unwrap(), m);
    }

    #[test]
    fn test_subject_from_header() {
        let v = NiiVolume::fake(Array3::zeros((2, 2, 2)), Affine::scaling([0.5, 0.5, 3.0]));
        let s = Subject::from_header("z", Some("MS"), "t2", &v);
        assert_eq!(s.resolution, [0.5, 0.5, 3.0]);
    }
}
