//! Files, libraries and the preamble directives linking them together.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use serde::{Deserialize, Serialize};

use crate::{
    ast::{Mixin, Scope},
    identifier::Id,
    position::{Position, Source},
};

/// What a file is used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    /// The file being compiled, with a `func` header.
    Main,
    /// The target of an `extend`.
    Template,
    /// The target of an `include`.
    Include,
    /// One file of a library loaded through `use`.
    LibraryFile,
    Unknown,
}

/// Identity of a file across loads: module plus path in module.
///
/// Two [`File`]s with the same key are the same logical file, whichever
/// pointer they were loaded through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    pub module: String,
    pub path: String,
}

impl FileKey {
    pub fn new(module: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: path.into(),
        }
    }

    /// The key of the library (directory) this file belongs to.
    pub fn library(&self) -> LibraryKey {
        let dir = self.path.rsplit_once('/').map_or("", |(dir, _)| dir);
        LibraryKey::new(self.module.clone(), dir)
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}/{}", self.module, self.path)
        }
    }
}

/// Identity of a library: module plus directory in module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LibraryKey {
    pub module: String,
    pub path: String,
}

impl LibraryKey {
    pub fn new(module: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for LibraryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.module.is_empty(), self.path.is_empty()) {
            (true, _) => write!(f, "{}", self.path),
            (false, true) => write!(f, "{}", self.module),
            (false, false) => write!(f, "{}/{}", self.module, self.path),
        }
    }
}

/// The unit of compilation.
#[derive(Debug)]
pub struct File {
    pub source: Arc<Source>,
    pub module: String,
    pub path: String,
    pub kind: FileKind,
    pub extend: Option<Extend>,
    pub imports: Vec<Import>,
    pub uses: Vec<Use>,
    /// Only present in main files.
    pub func: Option<Func>,
    pub scope: Scope,
    /// Set once by the linker: the library formed by the file's directory.
    pub dir_library: OnceLock<Option<Arc<Library>>>,
    /// Set once by the linker: imports surfaced through included files.
    pub included_imports: OnceLock<Vec<ImportSpec>>,
}

impl File {
    /// Create an unlinked file.
    pub fn new(
        source: Arc<Source>,
        module: impl Into<String>,
        path: impl Into<String>,
        kind: FileKind,
    ) -> Self {
        Self {
            source,
            module: module.into(),
            path: path.into(),
            kind,
            extend: None,
            imports: Vec::new(),
            uses: Vec::new(),
            func: None,
            scope: Scope::default(),
            dir_library: OnceLock::new(),
            included_imports: OnceLock::new(),
        }
    }

    pub fn key(&self) -> FileKey {
        FileKey::new(self.module.clone(), self.path.clone())
    }

    /// Mixins defined at the top level of the file.
    pub fn top_level_mixins(&self) -> impl Iterator<Item = &Arc<Mixin>> {
        self.scope.mixins()
    }

    /// The parent template, once linked.
    pub fn extended_file(&self) -> Option<&Arc<File>> {
        self.extend.as_ref().and_then(|extend| extend.file.get())
    }

    /// The file's own imports followed by those propagated from includes.
    pub fn all_imports(&self) -> impl Iterator<Item = &ImportSpec> {
        self.imports
            .iter()
            .flat_map(|import| import.specs.iter())
            .chain(self.included_imports.get().into_iter().flatten())
    }

    /// All use specs in declaration order.
    pub fn use_specs(&self) -> impl Iterator<Item = &UseSpec> {
        self.uses.iter().flat_map(|use_| use_.specs.iter())
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module && self.path == other.path
    }
}

impl Eq for File {}

/// `extend "path"`
pub struct Extend {
    pub path: String,
    pub position: Position,
    /// Set once by the linker.
    pub file: OnceLock<Arc<File>>,
}

impl fmt::Debug for Extend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extend")
            .field("path", &self.path)
            .field("position", &self.position)
            .field("file", &self.file.get().map(|file| file.key()))
            .finish()
    }
}

/// `import` with one or more specs.
#[derive(Debug)]
pub struct Import {
    pub specs: Vec<ImportSpec>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub alias: Option<String>,
    pub path: String,
    pub position: Position,
}

/// `use` with one or more specs.
#[derive(Debug)]
pub struct Use {
    pub specs: Vec<UseSpec>,
    pub position: Position,
}

/// How the mixins of a used library are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseNamespace {
    /// No alias: the last path segment.
    Default,
    /// `use name "path"`
    Named(Id),
    /// `use . "path"`: callable without namespace.
    Dot,
    /// `use _ "path"`: linked for side effects only.
    Blank,
}

pub struct UseSpec {
    pub namespace: UseNamespace,
    pub path: String,
    pub position: Position,
    /// Set once by the linker.
    pub library: OnceLock<Arc<Library>>,
}

impl UseSpec {
    /// The namespace calls use to address this library, if any.
    pub fn namespace_id(&self) -> Option<Id> {
        match self.namespace {
            UseNamespace::Default => {
                let last = self.path.rsplit('/').next().unwrap_or(&self.path);
                Some(Id::new(last))
            }
            UseNamespace::Named(name) => Some(name),
            UseNamespace::Dot | UseNamespace::Blank => None,
        }
    }
}

impl fmt::Debug for UseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseSpec")
            .field("namespace", &self.namespace)
            .field("path", &self.path)
            .field("position", &self.position)
            .field("library", &self.library.get().map(|library| library.key()))
            .finish()
    }
}

/// `func Name(params)`: the signature of the generated function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Func {
    pub name: String,
    pub params: String,
    pub position: Position,
}

/// A set of library files sharing one namespace.
#[derive(Debug)]
pub struct Library {
    pub module: String,
    pub path: String,
    pub files: Vec<Arc<File>>,
}

impl Library {
    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(self.module.clone(), self.path.clone())
    }

    /// Top-level mixins of all files, with the file declaring each.
    pub fn mixins(&self) -> impl Iterator<Item = (&Arc<File>, &Arc<Mixin>)> {
        self.files
            .iter()
            .flat_map(|file| file.top_level_mixins().map(move |mixin| (file, mixin)))
    }

    /// Find an exported top-level mixin by name.
    pub fn exported_mixin(&self, name: Id) -> Option<(&Arc<File>, &Arc<Mixin>)> {
        if !name.is_exported() {
            return None;
        }
        self.mixins().find(|(_, mixin)| mixin.name == name)
    }
}

/// A non-corgi file pulled in by `include`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub path: String,
    pub contents: String,
}
