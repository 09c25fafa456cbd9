use std::path::{Path, PathBuf};

/// Maps a font family name from a text layer to a font file on disk.
/// `None` means "let the engine pick by family name" via drawtext's
/// `font=` parameter instead of `fontfile=`.
pub trait FontResolver {
    fn resolve(&self, family: &str) -> Option<PathBuf>;
}

/// Looks for bundled fonts inside a single directory, typically a
/// `fonts/` folder next to the project file. Candidate filenames are
/// tried in order: the family name as-is, with spaces removed, and with
/// spaces replaced by hyphens; each with `.ttf` then `.otf`.
pub struct FontDir {
    dir: PathBuf,
}

impl FontDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The conventional location: `fonts/` beside the project JSON.
    pub fn beside(project_path: &Path) -> Self {
        let dir = project_path
            .parent()
            .map(|parent| parent.join("fonts"))
            .unwrap_or_else(|| PathBuf::from("fonts"));
        Self { dir }
    }

    fn candidates(family: &str) -> Vec<String> {
        let trimmed = family.trim();
        let mut stems = vec![trimmed.to_owned()];
        if trimmed.contains(' ') {
            stems.push(trimmed.replace(' ', ""));
            stems.push(trimmed.replace(' ', "-"));
        }

        let mut names = Vec::with_capacity(stems.len() * 2);
        for stem in stems {
            names.push(format!("{stem}.ttf"));
            names.push(format!("{stem}.otf"));
        }
        names
    }
}

impl FontResolver for FontDir {
    fn resolve(&self, family: &str) -> Option<PathBuf> {
        if family.trim().is_empty() {
            return None;
        }
        Self::candidates(family)
            .into_iter()
            .map(|name| self.dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{FontDir, FontResolver};

    #[test]
    fn exact_filename_wins() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let font = dir.path().join("Inter.ttf");
        fs::write(&font, b"").expect("fake font should write");

        let resolver = FontDir::new(dir.path());
        assert_eq!(resolver.resolve("Inter"), Some(font));
    }

    #[test]
    fn spaced_family_matches_collapsed_filename() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let font = dir.path().join("SegoeUI.ttf");
        fs::write(&font, b"").expect("fake font should write");

        let resolver = FontDir::new(dir.path());
        assert_eq!(resolver.resolve("Segoe UI"), Some(font));
    }

    #[test]
    fn spaced_family_matches_hyphenated_otf() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let font = dir.path().join("Fira-Code.otf");
        fs::write(&font, b"").expect("fake font should write");

        let resolver = FontDir::new(dir.path());
        assert_eq!(resolver.resolve("Fira Code"), Some(font));
    }

    #[test]
    fn unknown_family_resolves_to_none() {
        let dir = tempfile::tempdir().expect("tempdir should create");
        let resolver = FontDir::new(dir.path());
        assert_eq!(resolver.resolve("Nonexistent"), None);
        assert_eq!(resolver.resolve("   "), None);
    }

    #[test]
    fn beside_points_at_sibling_fonts_dir() {
        let resolver = FontDir::beside(Path::new("/projects/demo/comp.json"));
        assert_eq!(resolver.dir, Path::new("/projects/demo/fonts"));
    }
}
