// src/resolver/request.rs

//! Requests and resolutions
//!
//! A [`ModuleRequest`] is immutable; every rewrite step (alias, rehome,
//! virtualize) returns a new request so callers can compare before and
//! after.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestKind {
    /// Static `import`
    #[default]
    Import,
    /// `import()`
    Dynamic,
    /// `export ... from`
    Reexport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRequest {
    specifier: String,
    from_file: PathBuf,
    kind: RequestKind,
    /// Opaque host data carried through every rewrite
    meta: BTreeMap<String, Value>,
    is_virtual: bool,
    is_external: bool,
}

impl ModuleRequest {
    pub fn new(specifier: impl Into<String>, from_file: impl Into<PathBuf>) -> Self {
        Self {
            specifier: specifier.into(),
            from_file: from_file.into(),
            kind: RequestKind::Import,
            meta: BTreeMap::new(),
            is_virtual: false,
            is_external: false,
        }
    }

    pub fn with_kind(mut self, kind: RequestKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    #[inline]
    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    #[inline]
    pub fn from_file(&self) -> &Path {
        &self.from_file
    }

    /// Directory relative specifiers are resolved against
    pub fn from_dir(&self) -> &Path {
        self.from_file.parent().unwrap_or(&self.from_file)
    }

    #[inline]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    #[inline]
    pub fn meta(&self) -> &BTreeMap<String, Value> {
        &self.meta
    }

    #[inline]
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Marked to be left outside the module graph
    #[inline]
    pub fn is_external(&self) -> bool {
        self.is_external
    }

    pub fn is_relative(&self) -> bool {
        self.specifier.starts_with("./") || self.specifier.starts_with("../") || self.specifier == "."
    }

    pub fn is_absolute(&self) -> bool {
        Path::new(&self.specifier).is_absolute()
    }

    pub fn is_bare(&self) -> bool {
        !self.is_relative() && !self.is_absolute()
    }

    /// Same importer, new specifier
    pub fn alias(&self, specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            ..self.clone()
        }
    }

    /// Same specifier, resolved as if imported from `from_file`
    pub fn rehome(&self, from_file: impl Into<PathBuf>) -> Self {
        Self {
            from_file: from_file.into(),
            ..self.clone()
        }
    }

    /// Point the request at a synthesized module
    pub fn virtualize(&self, id: impl Into<String>) -> Self {
        Self {
            specifier: id.into(),
            is_virtual: true,
            ..self.clone()
        }
    }

    /// Leave the request to the host bundler as an external
    pub fn externalize(&self, specifier: impl Into<String>) -> Self {
        Self {
            specifier: specifier.into(),
            is_external: true,
            ..self.clone()
        }
    }
}

impl fmt::Display for ModuleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.specifier, self.from_file.display())
    }
}

/// A successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    /// Absolute file path, virtual identity, or bare external name
    pub id: String,
    pub external: bool,
    pub is_virtual: bool,
}

impl ResolvedModule {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            id: path.as_ref().to_string_lossy().into_owned(),
            external: false,
            is_virtual: false,
        }
    }

    pub fn virtual_module(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: false,
            is_virtual: true,
        }
    }

    pub fn external(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external: true,
            is_virtual: false,
        }
    }
}

/// Why nothing resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveFailure {
    pub specifier: String,
    pub from_file: PathBuf,
    pub message: String,
}

impl ResolveFailure {
    pub fn new(request: &ModuleRequest, message: impl Into<String>) -> Self {
        Self {
            specifier: request.specifier().to_string(),
            from_file: request.from_file().to_path_buf(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot resolve {} from {}: {}",
            self.specifier,
            self.from_file.display(),
            self.message
        )
    }
}

/// Outcome of a resolve
///
/// `NotFound` is an ordinary value; the host decides whether it is fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedModule),
    Ignored(ResolvedModule),
    NotFound(ResolveFailure),
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Resolved id, for found and ignored results
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Found(m) | Self::Ignored(m) => Some(&m.id),
            Self::NotFound(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specifier_shapes() {
        assert!(ModuleRequest::new("./x", "/a/b.js").is_relative());
        assert!(ModuleRequest::new("../x", "/a/b.js").is_relative());
        assert!(ModuleRequest::new("/abs/x", "/a/b.js").is_absolute());
        assert!(ModuleRequest::new("@scope/pkg/x", "/a/b.js").is_bare());
        assert!(ModuleRequest::new(".prettierrc", "/a/b.js").is_bare());
    }

    #[test]
    fn test_rewrites_keep_meta() {
        let req = ModuleRequest::new("foo", "/app/x.js")
            .with_kind(RequestKind::Dynamic)
            .with_meta("tag", Value::from(1));
        let aliased = req.alias("bar").rehome("/app/y.js");
        assert_eq!(aliased.specifier(), "bar");
        assert_eq!(aliased.from_file(), Path::new("/app/y.js"));
        assert_eq!(aliased.kind(), RequestKind::Dynamic);
        assert_eq!(aliased.meta()["tag"], Value::from(1));
        assert!(!aliased.is_virtual());
        assert!(req.virtualize("/app/-embroider-vendor.js").is_virtual());
    }
}
