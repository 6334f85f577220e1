//! Resource resolution
//!
//! The compiler never touches the filesystem directly: schema sources,
//! included fragments and preprocessor programs are all fetched through a
//! [`ResourceResolver`] by bare relative path.

use include_dir::{include_dir, Dir};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::ResolveError;

/// The built-in preprocessor program bundle
static BUILTIN_PROGRAMS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/resources");

/// Maps a relative resource path to its bytes
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Result<Vec<u8>, ResolveError>;
}

impl<T: ResourceResolver + ?Sized> ResourceResolver for Arc<T> {
    fn resolve(&self, path: &str) -> Result<Vec<u8>, ResolveError> {
        (**self).resolve(path)
    }
}

impl<T: ResourceResolver + ?Sized> ResourceResolver for &T {
    fn resolve(&self, path: &str) -> Result<Vec<u8>, ResolveError> {
        (**self).resolve(path)
    }
}

/// Normalize a resource path: strip leading `./` markers, drop `.`
/// segments and collapse `..` against preceding segments.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Resolve `href` relative to the resource it appears in
pub fn join_relative(base: &str, href: &str) -> String {
    if href.starts_with('/') {
        return normalize_path(href);
    }
    match base.rfind('/') {
        Some(pos) => normalize_path(&format!("{}/{}", &base[..pos], href)),
        None => normalize_path(href),
    }
}

/// In-memory resources, mainly for tests and hosts that already hold bytes
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.resources.insert(normalize_path(path), content.into());
    }

    pub fn with(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }
}

impl ResourceResolver for MemoryResolver {
    fn resolve(&self, path: &str) -> Result<Vec<u8>, ResolveError> {
        let key = normalize_path(path);
        self.resources
            .get(&key)
            .cloned()
            .ok_or(ResolveError::NotFound(key))
    }
}

/// Resources below a directory
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl ResourceResolver for FsResolver {
    fn resolve(&self, path: &str) -> Result<Vec<u8>, ResolveError> {
        let key = normalize_path(path);
        // Paths that climb out of the root are treated as absent.
        if key.is_empty() || key.starts_with("..") {
            return Err(ResolveError::NotFound(key));
        }
        let full = self.root.join(&key);
        if !full.is_file() {
            return Err(ResolveError::NotFound(key));
        }
        fs::read(&full).map_err(|source| ResolveError::Io { path: key, source })
    }
}

/// Resources compiled into the binary
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedResolver {
    dir: &'static Dir<'static>,
}

impl EmbeddedResolver {
    pub fn new(dir: &'static Dir<'static>) -> Self {
        Self { dir }
    }

    /// The bundled ISO Schematron preprocessor programs
    pub fn builtin() -> Self {
        Self::new(&BUILTIN_PROGRAMS)
    }
}

impl ResourceResolver for EmbeddedResolver {
    fn resolve(&self, path: &str) -> Result<Vec<u8>, ResolveError> {
        let key = normalize_path(path);
        self.dir
            .get_file(&key)
            .map(|f| f.contents().to_vec())
            .ok_or(ResolveError::NotFound(key))
    }
}

/// Tries each resolver in order; the first one that has the resource wins
#[derive(Clone, Default)]
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn ResourceResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, resolver: impl ResourceResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }
}

impl ResourceResolver for ChainResolver {
    fn resolve(&self, path: &str) -> Result<Vec<u8>, ResolveError> {
        for resolver in &self.resolvers {
            match resolver.resolve(path) {
                Ok(bytes) => return Ok(bytes),
                Err(ResolveError::NotFound(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(ResolveError::NotFound(normalize_path(path)))
    }
}

/// `resolver`, falling back to the built-in program bundle
pub fn with_builtin_programs(resolver: impl ResourceResolver + 'static) -> ChainResolver {
    ChainResolver::new()
        .push(resolver)
        .push(EmbeddedResolver::builtin())
}
