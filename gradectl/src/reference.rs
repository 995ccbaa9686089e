//! Reference answer and question context loading.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Read a reference answer (usually Markdown) from disk.
///
/// The text is returned verbatim, including surrounding whitespace.
pub fn load_reference_answer(path: &Path) -> Result<String> {
    let text = read_text(path)?;
    if text.trim().is_empty() {
        warn!(path = %path.display(), "Reference answer file is empty");
    }
    info!(path = %path.display(), bytes = text.len(), "Loaded reference answer");
    Ok(text)
}

/// Resolve the question context from inline text or a file.
///
/// Inline text wins when both are given. Blank context counts as none.
pub fn load_question_context(inline: Option<&str>, file: Option<&Path>) -> Result<Option<String>> {
    let text = match (inline, file) {
        (Some(text), _) => text.to_string(),
        (None, Some(path)) => read_text(path)?,
        (None, None) => return Ok(None),
    };

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

fn read_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_reference_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# Q1\n\n**x = 4**\n").unwrap();

        let text = load_reference_answer(file.path()).unwrap();
        assert_eq!(text, "# Q1\n\n**x = 4**\n");
    }

    #[test]
    fn missing_reference_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.md");
        match load_reference_answer(&path) {
            Err(Error::FileNotFound(p)) => assert_eq!(p, path),
            other => panic!("expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_reference_answer(dir.path()), Err(Error::Io(_))));
    }

    #[test]
    fn inline_context_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "from file").unwrap();

        let ctx = load_question_context(Some("  inline  "), Some(file.path())).unwrap();
        assert_eq!(ctx.as_deref(), Some("inline"));

        let ctx = load_question_context(None, Some(file.path())).unwrap();
        assert_eq!(ctx.as_deref(), Some("from file"));
    }

    #[test]
    fn blank_context_is_none() {
        assert_eq!(load_question_context(Some("   \n"), None).unwrap(), None);
        assert_eq!(load_question_context(None, None).unwrap(), None);
    }
}
