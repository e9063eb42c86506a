// src/core/build_settings.rs

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::core::input_file_manager::{FileRoots, InputFileManager};
use crate::core::item_tree::ItemTree;
use crate::core::paths::{SourceDir, SourceFile};
use crate::core::scheduler::Scheduler;
use crate::core::target::Target;

/// Hook invoked (on the worker pool) for every generated target that
/// reaches the resolved state. The back-end writers hang off this.
pub type TargetResolvedCallback = Arc<dyn Fn(&Target) + Send + Sync>;

/// Settings for one build: one toplevel output directory. All toolchain
/// settings objects refer back to one of these. Also the owner of the
/// shared machinery: the scheduler, the input-file manager and the item
/// tree, threaded through evaluation contexts instead of living in a
/// process-wide global.
pub struct BuildSettings {
    /// Absolute OS path of the source root; everything `//`-relative
    /// resolves against this.
    root_path: PathBuf,
    /// Optional parallel tree searched for build files missing from the
    /// root hierarchy.
    secondary_source_path: Option<PathBuf>,
    /// Interpreter used to run `exec_script` scripts.
    interpreter_path: PathBuf,
    build_config_file: SourceFile,
    build_dir: SourceDir,

    scheduler: Arc<Scheduler>,
    input_file_manager: Arc<InputFileManager>,
    item_tree: ItemTree,

    target_resolved_callback: OnceLock<TargetResolvedCallback>,
}

impl BuildSettings {
    pub fn new(
        root_path: PathBuf,
        secondary_source_path: Option<PathBuf>,
        interpreter_path: PathBuf,
        build_config_file: SourceFile,
        build_dir: SourceDir,
        scheduler: Arc<Scheduler>,
        input_file_manager: Arc<InputFileManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            root_path,
            secondary_source_path,
            interpreter_path,
            build_config_file,
            build_dir,
            scheduler,
            input_file_manager,
            item_tree: ItemTree::new(),
            target_resolved_callback: OnceLock::new(),
        })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn interpreter_path(&self) -> &Path {
        &self.interpreter_path
    }

    pub fn build_config_file(&self) -> &SourceFile {
        &self.build_config_file
    }

    /// Root of all output files. The default toolchain writes directly in
    /// here; other toolchains get subdirectories.
    pub fn build_dir(&self) -> &SourceDir {
        &self.build_dir
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn input_file_manager(&self) -> &Arc<InputFileManager> {
        &self.input_file_manager
    }

    pub fn item_tree(&self) -> &ItemTree {
        &self.item_tree
    }

    pub fn file_roots(&self) -> FileRoots {
        FileRoots {
            primary: self.root_path.clone(),
            secondary: self.secondary_source_path.clone(),
        }
    }

    /// The absolute OS path for a file in the source tree.
    pub fn get_full_path(&self, file: &SourceFile) -> PathBuf {
        file.resolve(&self.root_path)
    }

    pub fn get_full_dir_path(&self, dir: &SourceDir) -> PathBuf {
        dir.resolve(&self.root_path)
    }

    /// Installs the resolved-target hook. May be set at most once, before
    /// the load starts.
    pub fn set_target_resolved_callback(&self, callback: TargetResolvedCallback) {
        let _ = self.target_resolved_callback.set(callback);
    }

    pub fn target_resolved_callback(&self) -> Option<TargetResolvedCallback> {
        self.target_resolved_callback.get().cloned()
    }

    /// A throwaway instance for unit tests that need to drive graph
    /// operations directly.
    #[cfg(test)]
    pub fn for_tests() -> Arc<Self> {
        Self::new(
            PathBuf::from("."),
            None,
            PathBuf::from("python3"),
            SourceFile::new("//build/BUILDCONFIG.gird"),
            SourceDir::new(crate::constants::DEFAULT_BUILD_DIR),
            Arc::new(Scheduler::new(false)),
            Arc::new(InputFileManager::new()),
        )
    }
}

impl std::fmt::Debug for BuildSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSettings")
            .field("root_path", &self.root_path)
            .field("build_dir", &self.build_dir)
            .field("build_config_file", &self.build_config_file)
            .finish()
    }
}
