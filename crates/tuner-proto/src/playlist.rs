use std::path::{Path, PathBuf};

/// The station list on disk.  Nothing is cached: every call re-reads the
/// file so edits apply to the next command.
#[derive(Debug, Clone)]
pub struct PlaylistSource {
    path: PathBuf,
}

impl PlaylistSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current station URLs in file order.
    pub fn load(&self) -> anyhow::Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(parse_playlist(&content))
    }
}

/// One URL per line; blank lines and `#` lines (including m3u `#EXTINF`
/// headers) are skipped.
pub fn parse_playlist(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let content = "#EXTM3U\n\n#EXTINF:-1,Jazz\nhttp://a.example/jazz\n   \n  http://b.example/news  \n# disabled\n";
        assert_eq!(
            parse_playlist(content),
            vec!["http://a.example/jazz", "http://b.example/news"]
        );
    }

    #[test]
    fn test_load_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.m3u");
        std::fs::write(&path, "http://one\n").unwrap();
        let source = PlaylistSource::new(&path);
        assert_eq!(source.load().unwrap().len(), 1);

        std::fs::write(&path, "http://one\nhttp://two\n").unwrap();
        assert_eq!(source.load().unwrap(), vec!["http://one", "http://two"]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let source = PlaylistSource::new("/nonexistent/playlist.m3u");
        assert!(source.load().is_err());
    }
}
