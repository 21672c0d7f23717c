//! Ordered class labels for the classifier's output space

use crate::error::ArtifactLoadError;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Labels indexed by the class index the classifier predicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassVocabulary {
    labels: Vec<String>,
}

impl ClassVocabulary {
    /// Build a vocabulary from labels already in class-index order
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Load labels from a row-delimited file.
    ///
    /// With `has_header` set the first non-blank row is a column header and
    /// is skipped (pandas writes `0` there for an unnamed series).
    pub fn load<P: AsRef<Path>>(path: P, has_header: bool) -> Result<Self, ArtifactLoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let vocabulary = Self::parse(&content, has_header, path)?;
        info!(
            path = %path.display(),
            classes = ?vocabulary.labels,
            "Class vocabulary loaded"
        );
        Ok(vocabulary)
    }

    fn parse(content: &str, has_header: bool, path: &Path) -> Result<Self, ArtifactLoadError> {
        let rows = content
            .lines()
            .map(|line| line.trim().trim_matches('"').trim())
            .filter(|line| !line.is_empty())
            .skip(usize::from(has_header));

        let mut seen = HashSet::new();
        let mut labels = Vec::new();
        for label in rows {
            if !seen.insert(label) {
                return Err(ArtifactLoadError::DuplicateLabel {
                    path: path.to_path_buf(),
                    label: label.to_string(),
                });
            }
            labels.push(label.to_string());
        }

        if labels.is_empty() {
            return Err(ArtifactLoadError::EmptyVocabulary {
                path: path.to_path_buf(),
            });
        }

        Ok(Self { labels })
    }

    /// Label for a class index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn species() -> ClassVocabulary {
        ClassVocabulary::new(vec![
            "Adelie".to_string(),
            "Chinstrap".to_string(),
            "Gentoo".to_string(),
        ])
    }

    #[test]
    fn test_lookup_by_index() {
        let vocabulary = species();
        assert_eq!(vocabulary.get(2), Some("Gentoo"));
        assert_eq!(vocabulary.get(3), None);
        assert_eq!(vocabulary.len(), 3);
    }

    #[test]
    fn test_load_pandas_series_csv() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "0\nAdelie\nChinstrap\nGentoo\n").unwrap();

        let vocabulary = ClassVocabulary::load(file.path(), true).unwrap();
        assert_eq!(vocabulary, species());
    }

    #[test]
    fn test_load_without_header() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "\"Adelie\"\r\n\r\nChinstrap\r\n Gentoo \r\n").unwrap();

        let vocabulary = ClassVocabulary::load(file.path(), false).unwrap();
        assert_eq!(vocabulary, species());
    }

    #[test]
    fn test_missing_file() {
        let err = ClassVocabulary::load("/nonexistent/target_classes.csv", true).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::Io { .. }));
    }

    #[test]
    fn test_header_only_is_empty() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "0\n").unwrap();

        let err = ClassVocabulary::load(file.path(), true).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::EmptyVocabulary { .. }));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Adelie\nGentoo\nAdelie\n").unwrap();

        let err = ClassVocabulary::load(file.path(), false).unwrap_err();
        assert!(matches!(err, ArtifactLoadError::DuplicateLabel { .. }));
    }
}
