//! Splitting file content into indexable chunks.
//!
//! Python is chunked structurally with tree-sitter: one chunk per function or
//! class definition. Everything else, and Python that fails to parse, is cut
//! into fixed-size overlapping character windows.

use std::collections::VecDeque;

use ghoststack_core::BrainConfig;
use serde_json::json;
use tree_sitter::{Node, Parser};

use crate::language::Language;
use crate::store::Metadata;

/// Chunk id used for a file that fits in a single window.
pub const FULL_CHUNK_ID: &str = "full";

/// Chunk id used for Python files without any definitions.
pub const MODULE_CHUNK_ID: &str = "module";

/// What a chunk represents, recorded as the `type` metadata field.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::chunker::ChunkKind;
///
/// assert_eq!(ChunkKind::FullFile.as_str(), "full_file");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Function,
    Class,
    Module,
    FullFile,
    Chunk,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Module => "module",
            ChunkKind::FullFile => "full_file",
            ChunkKind::Chunk => "chunk",
        }
    }
}

/// A piece of a file ready to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Definition name, `module`, `full`, or `chunk_<n>`.
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// What the chunk represents.
    pub kind: ChunkKind,
    /// Structural position: `name`/`start_line`/`end_line` for definitions,
    /// `chunk_num`/`start_char`/`end_char` for windows.
    pub metadata: Metadata,
}

/// Splits file content into chunks.
pub trait Chunker {
    /// Chunk `content`. Never fails; unparseable input degrades to windows.
    fn chunk(&self, content: &str) -> Vec<Chunk>;
}

/// Pick the chunker for a language.
///
/// # Examples
///
/// ```
/// use ghoststack_core::BrainConfig;
/// use ghoststack_brain::chunker::chunker_for;
/// use ghoststack_brain::language::Language;
///
/// let chunker = chunker_for(Language::Go, &BrainConfig::default());
/// let chunks = chunker.chunk("package main\n");
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].id, "full");
/// ```
pub fn chunker_for(language: Language, config: &BrainConfig) -> Box<dyn Chunker> {
    let windows = WindowChunker::from_config(config);
    match language {
        Language::Python => Box::new(PythonChunker::new(windows)),
        _ => Box::new(windows),
    }
}

/// Overlapping fixed-size character windows.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::chunker::{Chunker, WindowChunker};
///
/// let chunker = WindowChunker::new(10, 2);
/// let chunks = chunker.chunk(&"x".repeat(25));
/// let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
/// assert_eq!(ids, ["chunk_0", "chunk_1", "chunk_2", "chunk_3"]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WindowChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self::from_config(&BrainConfig::default())
    }
}

impl WindowChunker {
    /// Create a window chunker. `chunk_overlap` is clamped below `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn from_config(config: &BrainConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Window size in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, content: &str) -> Vec<Chunk> {
        // Byte offset of every char boundary, so windows count characters.
        let bounds: Vec<usize> = content
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(content.len()))
            .collect();
        let len = bounds.len() - 1;

        if len <= self.chunk_size {
            return vec![Chunk {
                id: FULL_CHUNK_ID.to_string(),
                content: content.to_string(),
                kind: ChunkKind::FullFile,
                metadata: Metadata::new(),
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut chunk_num = 0;
        while start < len {
            let end = (start + self.chunk_size).min(len);
            chunks.push(Chunk {
                id: format!("chunk_{chunk_num}"),
                content: content[bounds[start]..bounds[end]].to_string(),
                kind: ChunkKind::Chunk,
                metadata: to_metadata(json!({
                    "chunk_num": chunk_num,
                    "start_char": start,
                    "end_char": end,
                })),
            });
            start += self.stride();
            chunk_num += 1;
        }
        chunks
    }
}

/// Function and class definitions of a Python module.
///
/// Definitions are emitted breadth-first, so methods and nested functions
/// follow their enclosing top-level definitions.
///
/// # Examples
///
/// ```
/// use ghoststack_brain::chunker::{Chunker, PythonChunker, WindowChunker};
///
/// let chunker = PythonChunker::new(WindowChunker::default());
/// let chunks = chunker.chunk("class Cart:\n    def total(self):\n        return 0\n");
/// let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
/// assert_eq!(ids, ["Cart", "total"]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonChunker {
    windows: WindowChunker,
}

impl PythonChunker {
    /// Create a Python chunker that degrades to `windows` on syntax errors.
    pub fn new(windows: WindowChunker) -> Self {
        Self { windows }
    }
}

impl Chunker for PythonChunker {
    fn chunk(&self, content: &str) -> Vec<Chunk> {
        let Some(ts_language) = Language::Python.tree_sitter_language() else {
            return self.windows.chunk(content);
        };
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&ts_language) {
            tracing::warn!("failed to load python grammar: {e}");
            return self.windows.chunk(content);
        }
        let Some(tree) = parser.parse(content, None) else {
            return self.windows.chunk(content);
        };

        let root = tree.root_node();
        if root.has_error() {
            tracing::debug!("python syntax error, using windowed chunking");
            return self.windows.chunk(content);
        }

        let lines: Vec<&str> = content.split('\n').collect();
        let source = content.as_bytes();
        let mut chunks = Vec::new();
        let mut queue = VecDeque::from([root]);

        while let Some(mut node) = queue.pop_front() {
            // Decorators don't change a definition's position in the walk.
            if node.kind() == "decorated_definition" {
                if let Some(inner) = node.child_by_field_name("definition") {
                    node = inner;
                }
            }

            let kind = match node.kind() {
                "function_definition" => Some(ChunkKind::Function),
                "class_definition" => Some(ChunkKind::Class),
                _ => None,
            };
            if let Some(kind) = kind {
                if let Some(chunk) = definition_chunk(&node, kind, source, &lines) {
                    chunks.push(chunk);
                }
            }

            let mut cursor = node.walk();
            queue.extend(node.children(&mut cursor));
        }

        if chunks.is_empty() {
            let end = content
                .char_indices()
                .nth(self.windows.chunk_size())
                .map_or(content.len(), |(i, _)| i);
            chunks.push(Chunk {
                id: MODULE_CHUNK_ID.to_string(),
                content: content[..end].to_string(),
                kind: ChunkKind::Module,
                metadata: Metadata::new(),
            });
        }

        chunks
    }
}

fn definition_chunk(node: &Node, kind: ChunkKind, source: &[u8], lines: &[&str]) -> Option<Chunk> {
    let name = node
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())?
        .to_string();

    let start_row = node.start_position().row;
    let end = node.end_position();
    // A node ending at column 0 stops before that row's first character.
    let end_row = if end.column == 0 && end.row > start_row {
        end.row - 1
    } else {
        end.row
    };
    let body = lines
        .get(start_row..=end_row.min(lines.len().saturating_sub(1)))
        .map(|l| l.join("\n"))
        .unwrap_or_default();

    Some(Chunk {
        id: name.clone(),
        content: body,
        kind,
        metadata: to_metadata(json!({
            "name": name,
            "start_line": start_row + 1,
            "end_line": end_row + 1,
        })),
    })
}

fn to_metadata(value: serde_json::Value) -> Metadata {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows() -> WindowChunker {
        WindowChunker::default()
    }

    #[test]
    fn short_content_is_one_full_chunk() {
        let chunks = windows().chunk("fn main() {}\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "full");
        assert_eq!(chunks[0].kind, ChunkKind::FullFile);
        assert_eq!(chunks[0].content, "fn main() {}\n");

        let exact = "a".repeat(2000);
        assert_eq!(windows().chunk(&exact).len(), 1);
    }

    #[test]
    fn empty_content_is_one_full_chunk() {
        let chunks = windows().chunk("");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "");
    }

    #[test]
    fn window_of_2100_chars() {
        let content = "a".repeat(2100);
        let chunks = windows().chunk(&content);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata["start_char"], 0);
        assert_eq!(chunks[0].metadata["end_char"], 2000);
        assert_eq!(chunks[1].metadata["start_char"], 1800);
        assert_eq!(chunks[1].metadata["end_char"], 2100);
        assert_eq!(chunks[1].content.len(), 300);
        assert_eq!(chunks[1].kind, ChunkKind::Chunk);
    }

    #[test]
    fn window_bounds_hold() {
        let content: String = (0..5003).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = windows().chunk(&content);

        let starts: Vec<u64> = chunks
            .iter()
            .map(|c| c.metadata["start_char"].as_u64().unwrap())
            .collect();
        for pair in starts.windows(2) {
            assert_eq!(pair[1] - pair[0], 1800);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.metadata["end_char"], 5003);
        for (n, c) in chunks.iter().enumerate() {
            assert_eq!(c.id, format!("chunk_{n}"));
            assert_eq!(c.metadata["chunk_num"], n);
            assert!(c.content.chars().count() <= 2000);
        }
    }

    #[test]
    fn windows_count_characters_not_bytes() {
        let content = "é".repeat(15);
        let chunks = WindowChunker::new(10, 2).chunk(&content);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content.chars().count(), 10);
        assert_eq!(chunks[1].metadata["start_char"], 8);
        assert_eq!(chunks[1].content, "é".repeat(7));
    }

    #[test]
    fn python_definitions_with_lines() {
        let source = "import os\n\ndef load(path):\n    return open(path).read()\n\n\nclass Store:\n    def get(self, key):\n        return key\n";
        let chunks = PythonChunker::default().chunk(source);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["load", "Store", "get"]);

        let load = &chunks[0];
        assert_eq!(load.kind, ChunkKind::Function);
        assert_eq!(load.content, "def load(path):\n    return open(path).read()");
        assert_eq!(load.metadata["start_line"], 3);
        assert_eq!(load.metadata["end_line"], 4);
        assert_eq!(load.metadata["name"], "load");

        let store = &chunks[1];
        assert_eq!(store.kind, ChunkKind::Class);
        assert_eq!(store.metadata["start_line"], 7);
        assert_eq!(store.metadata["end_line"], 9);
    }

    #[test]
    fn python_async_and_decorated_definitions() {
        let source = "@cached\ndef a():\n    pass\n\nasync def b():\n    await c()\n";
        let chunks = PythonChunker::default().chunk(source);
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(chunks[0].metadata["start_line"], 2);
        assert!(chunks[1].content.starts_with("async def b"));
    }

    #[test]
    fn python_without_definitions_is_module_chunk() {
        let source = "X = 1\nprint(X)\n";
        let chunks = PythonChunker::default().chunk(source);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "module");
        assert_eq!(chunks[0].kind, ChunkKind::Module);
        assert_eq!(chunks[0].content, source);
    }

    #[test]
    fn python_module_chunk_is_truncated() {
        let source = format!("X = '{}'\n", "y".repeat(3000));
        let chunks = PythonChunker::default().chunk(&source);
        assert_eq!(chunks[0].id, "module");
        assert_eq!(chunks[0].content.chars().count(), 2000);
    }

    #[test]
    fn python_syntax_error_falls_back_to_windows() {
        let chunks = PythonChunker::default().chunk("def broken(:\n    pass\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "full");
        assert_eq!(chunks[0].kind, ChunkKind::FullFile);
    }

    #[test]
    fn chunker_for_dispatches_on_language() {
        let config = BrainConfig::default();
        let py = chunker_for(Language::Python, &config).chunk("def f():\n    pass\n");
        assert_eq!(py[0].id, "f");
        let rs = chunker_for(Language::Rust, &config).chunk("fn f() {}\n");
        assert_eq!(rs[0].id, "full");
    }
}
