use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::models::{Case, CaseIndex};

/// Parsed case list
#[derive(Debug, Clone)]
pub struct CaseList {
    /// Run name: the case list file stem
    pub name: String,
    pub cases: Vec<Case>,
}

impl CaseList {
    /// Directory holding the first case, used as the default output location
    pub fn storage_dir(&self) -> PathBuf {
        self.cases
            .first()
            .map(|case| case.names.directory.clone())
            .unwrap_or_default()
    }

    /// Fail on the first case whose file does not exist
    pub fn verify_exists(&self) -> Result<(), PipelineError> {
        match self.cases.iter().find(|case| !case.path.is_file()) {
            Some(case) => Err(PipelineError::CaseNotFound(case.path.clone())),
            None => Ok(()),
        }
    }
}

/// Read a case list file: one volume path per line, blank lines ignored
pub fn read_case_list(path: &Path) -> Result<CaseList, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::CaseListNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| PipelineError::CaseListRead {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "caselist".to_string());
    parse_case_list(&content, name, path)
}

/// Parse case list contents
pub fn parse_case_list(
    content: &str,
    name: impl Into<String>,
    source: &Path,
) -> Result<CaseList, PipelineError> {
    let cases = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| Case::new(CaseIndex(index), line))
        .collect::<Result<Vec<_>, _>>()?;

    if cases.is_empty() {
        return Err(PipelineError::EmptyCaseList(source.to_path_buf()));
    }
    check_distinct_names(&cases)?;

    Ok(CaseList {
        name: name.into(),
        cases,
    })
}

/// Reject cases whose derived files would collide
///
/// Artifacts are named from the directory and stem only, so `sub.nii` and
/// `sub.nii.gz` in one directory (or one path listed twice) share outputs.
fn check_distinct_names(cases: &[Case]) -> Result<(), PipelineError> {
    let mut seen: HashMap<(&Path, &str), &Path> = HashMap::with_capacity(cases.len());
    for case in cases {
        let key = (case.names.directory.as_path(), case.names.stem.as_str());
        if let Some(first) = seen.insert(key, &case.path) {
            return Err(PipelineError::DuplicateCase {
                first: first.to_path_buf(),
                second: case.path.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VolumeFormat;

    #[test]
    fn test_parse_case_list() {
        let content = "/data/a.nii.gz\n\n  /data/b.nhdr  \n/data/c.nii\n";
        let list = parse_case_list(content, "cases", Path::new("cases.txt")).unwrap();

        assert_eq!(list.name, "cases");
        assert_eq!(list.cases.len(), 3);
        assert_eq!(list.cases[1].index, CaseIndex(1));
        assert_eq!(list.cases[1].path, PathBuf::from("/data/b.nhdr"));
        assert_eq!(list.cases[1].format, VolumeFormat::Nhdr);
        assert_eq!(list.cases[2].index, CaseIndex(2));
        assert_eq!(list.storage_dir(), PathBuf::from("/data"));
    }

    #[test]
    fn test_empty_case_list() {
        let err = parse_case_list("\n  \n", "cases", Path::new("cases.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyCaseList(_)));
    }

    #[test]
    fn test_unknown_suffix_rejected() {
        let err = parse_case_list("/data/a.mgz\n", "cases", Path::new("cases.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownFormat(_)));
    }

    #[test]
    fn test_colliding_case_names_rejected() {
        let err = parse_case_list("/d/sub.nii\n/d/other.nii\n/d/sub.nii.gz\n", "cases", Path::new("cases.txt"))
            .unwrap_err();
        match err {
            PipelineError::DuplicateCase { first, second } => {
                assert_eq!(first, PathBuf::from("/d/sub.nii"));
                assert_eq!(second, PathBuf::from("/d/sub.nii.gz"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_case_list("/d/sub.nrrd\n/d/sub.nii.gz\n", "cases", Path::new("cases.txt"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateCase { .. }));
    }

    #[test]
    fn test_repeated_case_path_rejected() {
        let err = parse_case_list("/d/a.nii.gz\n  /d/a.nii.gz\n", "cases", Path::new("cases.txt"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateCase { ref second, .. } if second == Path::new("/d/a.nii.gz")));
    }

    #[test]
    fn test_same_stem_in_different_directories_allowed() {
        let list = parse_case_list("/site1/sub.nii.gz\n/site2/sub.nii.gz\n", "cases", Path::new("cases.txt"))
            .unwrap();
        assert_eq!(list.cases.len(), 2);
    }

    #[test]
    fn test_missing_case_list() {
        let err = read_case_list(Path::new("/nonexistent/cases.txt")).unwrap_err();
        assert!(matches!(err, PipelineError::CaseListNotFound(_)));
    }

    #[test]
    fn test_read_case_list_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.nii.gz");
        std::fs::write(&present, b"x").unwrap();
        let absent = dir.path().join("b.nii.gz");
        let list_path = dir.path().join("study.txt");
        std::fs::write(
            &list_path,
            format!("{}\n{}\n", present.display(), absent.display()),
        )
        .unwrap();

        let list = read_case_list(&list_path).unwrap();
        assert_eq!(list.name, "study");
        let err = list.verify_exists().unwrap_err();
        assert!(matches!(err, PipelineError::CaseNotFound(p) if p == absent));
    }
}
