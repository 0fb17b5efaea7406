//! Utility functions and helpers.
//!
//! # Submodules
//!
//! - [`hash`]: content fingerprinting (XXH3 with mmap for large files)

/// Content fingerprinting for source files.
pub mod hash;

use std::path::Path;

/// Returns the file name without its final extension, lossily converted.
///
/// Output artifacts are named after the source stem: `sfx/jump.wav` produces
/// `jump.opus`, `jump.mp3`, and so on.
#[must_use]
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.to_string_lossy().into_owned(), |stem| {
            stem.to_string_lossy().into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("sfx/jump.wav")), "jump");
        assert_eq!(file_stem(Path::new("main theme.wav")), "main theme");
        assert_eq!(file_stem(Path::new("noext")), "noext");
    }
}
