//! Host-side collaborators, expressed as traits.
//!
//! The engine never compiles scripts, loads textures or drives frames
//! itself; the embedding application plugs those in through
//! [`HostServices`]. Defaults are provided for headless use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{EngineConfig, YieldMode};
use crate::geometry::ElementCollection;
use crate::graph::Params;

// --- Scripts ---

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

/// What a script sees while running.
pub struct ScriptScope<'a> {
    pub collection: &'a mut ElementCollection,
    pub time: f64,
    pub params: &'a Params,
}

pub trait CompiledScript: Send + Sync {
    /// Attribute columns the script reads
    fn reads(&self) -> &[String];
    /// Attribute columns the script writes (created as float columns if missing)
    fn writes(&self) -> &[String];
    /// Runs once per element instead of once per collection
    fn depends_on_index(&self) -> bool;
    /// Reads the time cursor
    fn reads_time(&self) -> bool {
        true
    }
    /// Run against the scope. `index` is set for per-element scripts.
    fn call(&self, scope: &mut ScriptScope<'_>, index: Option<usize>) -> Result<(), String>;
}

pub trait ScriptCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledScript>, CompileError>;
}

/// Compiler used when the host provides none: every compile fails.
#[derive(Debug, Default)]
pub struct NoScripts;

impl ScriptCompiler for NoScripts {
    fn compile(&self, _source: &str) -> Result<Arc<dyn CompiledScript>, CompileError> {
        Err(CompileError::new("no script compiler configured"))
    }
}

// --- Assets ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Beatmap {
    pub bpm: f64,
    /// First beat, ms
    pub offset: f64,
}

impl Beatmap {
    /// Beat length in ms.
    pub fn beat_length(&self) -> f64 {
        60_000.0 / self.bpm
    }

    /// Beat times within `[start, end)`.
    pub fn beats_between(&self, start: f64, end: f64) -> Vec<f64> {
        let len = self.beat_length();
        if !(len.is_finite() && len > 0.0) || end <= start {
            return Vec::new();
        }
        let first = ((start - self.offset) / len).ceil() as i64;
        (first..)
            .map(|i| self.offset + i as f64 * len)
            .take_while(|t| *t < end)
            .collect()
    }
}

pub trait AssetStore: Send + Sync {
    /// Texture id, -1 when unknown
    fn texture_id(&self, name: &str) -> i32;
    fn beatmap(&self) -> Option<Beatmap>;
}

/// Store with no assets.
#[derive(Debug, Default)]
pub struct NullAssets;

impl AssetStore for NullAssets {
    fn texture_id(&self, _name: &str) -> i32 {
        -1
    }

    fn beatmap(&self) -> Option<Beatmap> {
        None
    }
}

/// In-memory store, filled by the host.
#[derive(Debug, Default, Clone)]
pub struct MemoryAssets {
    textures: HashMap<String, i32>,
    beatmap: Option<Beatmap>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_texture(mut self, name: impl Into<String>, id: i32) -> Self {
        self.textures.insert(name.into(), id);
        self
    }

    pub fn with_beatmap(mut self, beatmap: Beatmap) -> Self {
        self.beatmap = Some(beatmap);
        self
    }
}

impl AssetStore for MemoryAssets {
    fn texture_id(&self, name: &str) -> i32 {
        self.textures.get(name).copied().unwrap_or(-1)
    }

    fn beatmap(&self) -> Option<Beatmap> {
        self.beatmap
    }
}

// --- Frame scheduling ---

/// Hook called before every node cook, so long cooks can share the frame.
pub trait FrameYield: Send + Sync {
    fn yield_frame(&self);
}

#[derive(Debug, Default)]
pub struct ThreadYield;

impl FrameYield for ThreadYield {
    fn yield_frame(&self) {
        std::thread::yield_now();
    }
}

#[derive(Debug, Default)]
pub struct NoYield;

impl FrameYield for NoYield {
    fn yield_frame(&self) {}
}

// --- Bundle ---

#[derive(Clone)]
pub struct HostServices {
    pub assets: Arc<dyn AssetStore>,
    pub compiler: Arc<dyn ScriptCompiler>,
    pub yielder: Arc<dyn FrameYield>,
    pub config: EngineConfig,
}

impl HostServices {
    /// Headless defaults; the yield hook follows `config.yield_mode`.
    pub fn new(config: EngineConfig) -> Self {
        let yielder: Arc<dyn FrameYield> = match config.yield_mode {
            YieldMode::Thread => Arc::new(ThreadYield),
            YieldMode::None => Arc::new(NoYield),
        };
        Self {
            assets: Arc::new(NullAssets),
            compiler: Arc::new(NoScripts),
            yielder,
            config,
        }
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetStore>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn ScriptCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_yielder(mut self, yielder: Arc<dyn FrameYield>) -> Self {
        self.yielder = yielder;
        self
    }
}

impl Default for HostServices {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
