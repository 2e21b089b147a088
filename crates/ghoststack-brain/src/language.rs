//! Source-language detection by file extension.

use std::fmt;
use std::path::Path;

/// Language of an indexable source file, detected from its extension.
///
/// Files whose extension is not listed here are never indexed.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::language::Language;
///
/// assert_eq!(Language::from_extension("py"), Some(Language::Python));
/// assert_eq!(Language::from_extension("TSX"), Some(Language::TypeScript));
/// assert_eq!(Language::from_extension("h"), Some(Language::C));
/// assert_eq!(Language::from_extension("md"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
    Go,
    Rust,
    Java,
    Ruby,
    Php,
    C,
    Cpp,
    CSharp,
    Swift,
    Kotlin,
    Scala,
}

impl Language {
    /// Detect language from an extension (without the dot), case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "py" => Language::Python,
            "ts" | "tsx" => Language::TypeScript,
            "js" | "jsx" => Language::JavaScript,
            "go" => Language::Go,
            "rs" => Language::Rust,
            "java" => Language::Java,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "c" | "h" => Language::C,
            "cpp" | "hpp" => Language::Cpp,
            "cs" => Language::CSharp,
            "swift" => Language::Swift,
            "kt" => Language::Kotlin,
            "scala" => Language::Scala,
            _ => return None,
        };
        Some(lang)
    }

    /// Detect language from a path's extension.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::Path;
    /// use ghoststack_brain::language::Language;
    ///
    /// assert_eq!(Language::from_path(Path::new("src/App.JSX")), Some(Language::JavaScript));
    /// assert_eq!(Language::from_path(Path::new("Makefile")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Name recorded in document metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
        }
    }

    /// Tree-sitter grammar for languages with a structural chunker.
    pub fn tree_sitter_language(&self) -> Option<tree_sitter::Language> {
        match self {
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_extension_maps() {
        let table = [
            ("py", "python"),
            ("ts", "typescript"),
            ("tsx", "typescript"),
            ("js", "javascript"),
            ("jsx", "javascript"),
            ("go", "go"),
            ("rs", "rust"),
            ("java", "java"),
            ("rb", "ruby"),
            ("php", "php"),
            ("c", "c"),
            ("h", "c"),
            ("cpp", "cpp"),
            ("hpp", "cpp"),
            ("cs", "csharp"),
            ("swift", "swift"),
            ("kt", "kotlin"),
            ("scala", "scala"),
        ];
        for (ext, name) in table {
            assert_eq!(
                Language::from_extension(ext).map(|l| l.as_str()),
                Some(name),
                "extension {ext}"
            );
        }
    }

    #[test]
    fn unsupported_extensions() {
        for ext in ["txt", "md", "cc", "kts", "json", ""] {
            assert_eq!(Language::from_extension(ext), None, "extension {ext}");
        }
        assert_eq!(Language::from_path(Path::new("README")), None);
    }

    #[test]
    fn only_python_is_structural() {
        assert!(Language::Python.tree_sitter_language().is_some());
        assert!(Language::Rust.tree_sitter_language().is_none());
        assert!(Language::TypeScript.tree_sitter_language().is_none());
    }
}
