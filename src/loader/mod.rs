//! Kestrel module loader
//!
//! Resolves `load("name", ...)` to the frozen globals of another module.
//! Each module is executed at most once per Loader; later requests get
//! the cached result, success or failure. A module source may be Kestrel
//! text or a compiled `.kstc` blob, recognised by its tag.
//!
//! Requests that would wait on a load already in progress further up the
//! same chain fail with `cycle in load graph`. The check follows the
//! waits-for relation across threads, so two threads loading each other's
//! modules also fail instead of deadlocking.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::parser::{parse_file, SyntaxError};
use crate::resolve::{resolve_file, FileOptions, ResolveErrors};
use crate::runtime::{builtins, ErrorKind, EvalError, EvalResult, Load, StringDict, Thread, Value};
use crate::vm::bytecode::{DecodeError, Program};
use crate::vm::compiler::compile_file;

/// Thread-local key holding the id of the load chain a thread belongs to.
const CHAIN_KEY: &str = "kestrel.load_chain";

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("module {0} not found")]
    NotFound(String),
    #[error("invalid module name {0:?}")]
    InvalidName(String),
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
    #[error("cycle in load graph")]
    Cycle,
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Resolve(#[from] ResolveErrors),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

// ── Sources ─────────────────────────────────────────────────────────────

/// Where module text comes from.
pub trait ModuleSource: Send + Sync {
    /// Returns the file name to report in errors and the module's bytes.
    fn fetch(&self, module: &str) -> Result<(String, Vec<u8>), LoadError>;
}

/// Modules are files under a root directory, named by relative path.
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ModuleSource for FsSource {
    fn fetch(&self, module: &str) -> Result<(String, Vec<u8>), LoadError> {
        let rel = Path::new(module);
        if module.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(LoadError::InvalidName(module.to_string()));
        }
        let path = self.root.join(rel);
        match std::fs::read(&path) {
            Ok(data) => Ok((path.to_string_lossy().into_owned(), data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(LoadError::NotFound(module.to_string()))
            }
            Err(e) => Err(LoadError::Io {
                path: path.to_string_lossy().into_owned(),
                message: e.to_string(),
            }),
        }
    }
}

/// In-memory modules, for embedding and tests.
#[derive(Default)]
pub struct MemorySource {
    modules: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, module: &str, data: impl Into<Vec<u8>>) {
        self.modules.insert(module.to_string(), data.into());
    }

    pub fn with(mut self, module: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(module, data);
        self
    }
}

impl ModuleSource for MemorySource {
    fn fetch(&self, module: &str) -> Result<(String, Vec<u8>), LoadError> {
        self.modules
            .get(module)
            .map(|data| (module.to_string(), data.clone()))
            .ok_or_else(|| LoadError::NotFound(module.to_string()))
    }
}

// ── Cache ───────────────────────────────────────────────────────────────

enum LoadState {
    /// Known but not loaded; the next request loads it. A load that was
    /// cancelled returns here, since cancellation belongs to the thread.
    Pending,
    InProgress { owner: u64 },
    Done(Result<StringDict, LoadError>),
}

#[derive(Default)]
struct CacheState {
    modules: HashMap<String, LoadState>,
    /// Load chain → module it is waiting for.
    waiting: HashMap<u64, String>,
}

impl CacheState {
    /// Whether chain `me` waiting on a load owned by `owner` would close a
    /// cycle in the waits-for graph.
    fn closes_cycle(&self, mut owner: u64, me: u64) -> bool {
        for _ in 0..=self.waiting.len() {
            if owner == me {
                return true;
            }
            let Some(module) = self.waiting.get(&owner) else {
                return false;
            };
            match self.modules.get(module) {
                Some(LoadState::InProgress { owner: next }) => owner = *next,
                _ => return false,
            }
        }
        false
    }
}

/// Loads and caches modules for every thread it is installed on.
pub struct Loader {
    me: Weak<Loader>,
    source: Box<dyn ModuleSource>,
    predeclared: StringDict,
    options: FileOptions,
    cache: Mutex<CacheState>,
    ready: Condvar,
    next_chain: AtomicU64,
}

impl Loader {
    /// Creates a loader. Modules run against `predeclared`, which is
    /// frozen, and are resolved with `options`.
    pub fn new(
        source: impl ModuleSource + 'static,
        predeclared: StringDict,
        options: FileOptions,
    ) -> Arc<Loader> {
        for v in predeclared.values() {
            v.freeze();
        }
        Arc::new_cyclic(|me| Loader {
            me: me.clone(),
            source: Box::new(source),
            predeclared,
            options,
            cache: Mutex::new(CacheState::default()),
            ready: Condvar::new(),
            next_chain: AtomicU64::new(1),
        })
    }

    /// Whether `module` has finished loading, successfully or not.
    pub fn is_loaded(&self, module: &str) -> bool {
        matches!(self.cache.lock().modules.get(module), Some(LoadState::Done(_)))
    }

    fn chain_of(&self, thread: &mut Thread) -> u64 {
        if let Some(id) = thread.local(CHAIN_KEY).and_then(|v| v.as_int()).and_then(|i| i.to_i64()) {
            return id as u64;
        }
        let id = self.next_chain.fetch_add(1, Ordering::Relaxed);
        thread.set_local(CHAIN_KEY, Value::from(id as i64));
        id
    }

    /// Returns the globals of `module`, loading it if necessary.
    pub fn get(&self, thread: &mut Thread, module: &str) -> Result<StringDict, LoadError> {
        let chain = self.chain_of(thread);
        {
            let mut cache = self.cache.lock();
            loop {
                match cache.modules.get(module) {
                    Some(LoadState::Done(result)) => {
                        debug!("load {}: cached", module);
                        return result.clone();
                    }
                    Some(LoadState::InProgress { owner }) => {
                        let owner = *owner;
                        if cache.closes_cycle(owner, chain) {
                            warn!("cycle in load graph at module {}", module);
                            return Err(LoadError::Cycle);
                        }
                        cache.waiting.insert(chain, module.to_string());
                        self.ready.wait(&mut cache);
                        cache.waiting.remove(&chain);
                    }
                    Some(LoadState::Pending) | None => {
                        cache
                            .modules
                            .insert(module.to_string(), LoadState::InProgress { owner: chain });
                        break;
                    }
                }
            }
        }

        debug!("load {}: executing", module);
        let result = self.exec(thread, module, chain);

        let cancelled = matches!(&result, Err(LoadError::Eval(e)) if e.kind() == ErrorKind::Cancelled);
        let state = if cancelled {
            LoadState::Pending
        } else {
            LoadState::Done(result.clone())
        };
        self.cache.lock().modules.insert(module.to_string(), state);
        self.ready.notify_all();
        result
    }

    fn exec(&self, parent: &Thread, module: &str, chain: u64) -> Result<StringDict, LoadError> {
        let (filename, data) = self.source.fetch(module)?;
        let program = if Program::is_compiled(&data) {
            Program::read(&data)?
        } else {
            let text = String::from_utf8(data).map_err(|_| LoadError::Io {
                path: filename.clone(),
                message: "source is not valid UTF-8".to_string(),
            })?;
            let mut file = parse_file(&filename, &text)?;
            let predeclared = &self.predeclared;
            resolve_file(
                &mut file,
                &self.options,
                &|name| predeclared.contains_key(name),
                &builtins::is_universal,
            )?;
            compile_file(&file, &self.options)
        };

        let mut thread = Thread::new(&format!("load {}", module));
        thread.set_local(CHAIN_KEY, Value::from(chain as i64));
        thread.set_cancel_token(parent.cancel_token());
        if let Some(me) = self.me.upgrade() {
            thread.set_loader(me);
        }
        let globals = Arc::new(program).init(&mut thread, &self.predeclared)?;
        debug!("load {}: {} globals", module, globals.len());
        Ok(globals)
    }
}

impl Load for Loader {
    fn load(&self, thread: &mut Thread, module: &str) -> EvalResult<StringDict> {
        self.get(thread, module).map_err(|e| match e {
            LoadError::Eval(e) => e,
            other => EvalError::new(other.to_string()),
        })
    }
}
