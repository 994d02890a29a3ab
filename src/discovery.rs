//! Recursive discovery of the video files to transcode.

use std::fmt;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DiscoveryError;

/// A discovered video file and where its transcoded output goes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VideoFile {
    path: PathBuf,
    output: PathBuf,
}

impl VideoFile {
    /// Create a new `VideoFile`, deriving the output path from the target extension.
    #[must_use]
    pub fn new(path: &Path, target_extension: &str) -> Self {
        let path = path.to_owned();
        let output = path.with_extension(target_extension.trim_start_matches('.'));
        Self { path, output }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Same directory and stem with the container extension replaced.
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// True when the input already has the target extension,
    /// so transcoding would write over the input itself.
    /// Compared case-insensitively since the filesystem may be.
    #[must_use]
    pub fn is_own_output(&self) -> bool {
        crate::path_to_file_extension_string(&self.path) == crate::path_to_file_extension_string(&self.output)
    }
}

impl fmt::Display for VideoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Recursively collect files under `root` whose extension is in `extensions`.
///
/// Extensions are compared case-insensitively and should be given in lowercase
/// without a leading dot. Files that already have the target extension are never included.
/// Results are sorted lexically by path.
/// Unreadable entries below the root are skipped.
pub fn discover_files(
    root: &Path,
    extensions: &[String],
    target_extension: &str,
) -> Result<Vec<VideoFile>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::NotFound(root.to_path_buf()));
    }

    let target_extension = target_extension.trim_start_matches('.').to_lowercase();
    let mut files: Vec<VideoFile> = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let extension = crate::path_to_file_extension_string(entry.path());
            extension != target_extension && extensions.iter().any(|ext| ext == &extension)
        })
        .map(|entry| VideoFile::new(entry.path(), &target_extension))
        .collect();

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::tempdir;

    use crate::config::Settings;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"data").unwrap();
    }

    fn names(root: &Path, files: &[VideoFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.path().strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn finds_recognized_extensions_recursively() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        for name in [
            "a.mkv",
            "b.AVI",
            "notes.txt",
            "season 1/c.mov",
            "season 1/deep/d.M4V",
            "season 1/deep/e.wmv",
            "season 1/deep/readme.txt",
            "f.mp4",
        ] {
            touch(&root.join(name));
        }

        let settings = Settings::default();
        let files = discover_files(root, &settings.extensions, &settings.target_extension).unwrap();
        assert_eq!(
            names(root, &files),
            ["a.mkv", "b.AVI", "season 1/c.mov", "season 1/deep/d.M4V", "season 1/deep/e.wmv"]
        );
    }

    #[test]
    fn discovery_is_repeatable() {
        let dir = tempdir().unwrap();
        for name in ["z.mkv", "x/y.avi", "x/a.mov", "m.wmv"] {
            touch(&dir.path().join(name));
        }
        let extensions = Settings::default().extensions;
        let first = discover_files(dir.path(), &extensions, "mp4").unwrap();
        let second = discover_files(dir.path(), &extensions, "mp4").unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_directory_is_not_an_error() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("only.txt"));
        let files = discover_files(dir.path(), &Settings::default().extensions, "mp4").unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn missing_root_is_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let result = discover_files(&missing, &Settings::default().extensions, "mp4");
        assert!(matches!(result, Err(DiscoveryError::NotFound(path)) if path == missing));
    }

    #[test]
    fn target_extension_is_never_discovered() {
        let dir = tempdir().unwrap();
        for name in ["keep.mp4", "LOUD.MP4", "movie.mkv"] {
            touch(&dir.path().join(name));
        }
        // Not normalized: the target extension is also in the allow-list
        let extensions = vec!["mkv".to_string(), "mp4".to_string()];
        let files = discover_files(dir.path(), &extensions, "mp4").unwrap();
        assert_eq!(names(dir.path(), &files), ["movie.mkv"]);

        let files = discover_files(dir.path(), &extensions, ".MP4").unwrap();
        assert_eq!(names(dir.path(), &files), ["movie.mkv"]);
        assert_eq!(files[0].output_path(), dir.path().join("movie.mp4"));
    }

    #[test]
    fn own_output_is_detected_regardless_of_case() {
        assert!(VideoFile::new(Path::new("/media/keep.mp4"), "mp4").is_own_output());
        assert!(VideoFile::new(Path::new("/media/keep.MP4"), "mp4").is_own_output());
        assert!(!VideoFile::new(Path::new("/media/keep.mkv"), "mp4").is_own_output());
    }

    #[test]
    fn output_path_replaces_extension() {
        let file = VideoFile::new(Path::new("/media/show/episode.01.MKV"), "mp4");
        assert_eq!(file.output_path(), Path::new("/media/show/episode.01.mp4"));
        assert_eq!(file.to_string(), "/media/show/episode.01.MKV");
    }
}
