// src/core/settings.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crate::core::build_settings::BuildSettings;
use crate::core::import_manager::ImportManager;
use crate::core::label::Label;
use crate::core::scope::ScopeData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Unknown,
    Linux,
    Mac,
    Win,
}

impl TargetOs {
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Self::Win
        } else if cfg!(target_os = "macos") {
            Self::Mac
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Unknown
        }
    }
}

/// The settings for one toolchain invocation context. There is one of
/// these per toolchain, all referring to the same `BuildSettings`.
///
/// Most fields are fixed at construction. The toolchain label and the base
/// config are filled in exactly once when known (the default toolchain is
/// bootstrapped under a sentinel null label before the build config names
/// it), after which everything here may be read from any thread without
/// locking.
pub struct Settings {
    build_settings: Weak<BuildSettings>,
    toolchain_label: OnceLock<Label>,
    /// Subdirectory inside the build dir for this toolchain's outputs.
    /// Empty for the default toolchain; otherwise ends in a slash.
    output_subdir: String,
    target_os: TargetOs,
    /// When set, every target encountered under this toolchain is
    /// generated. Only the default toolchain runs greedily.
    greedy_target_generation: AtomicBool,
    import_manager: ImportManager,
    /// Frozen result of running the build config under this toolchain.
    base_config: OnceLock<Arc<ScopeData>>,
}

impl Settings {
    pub fn new(
        build_settings: &Arc<BuildSettings>,
        toolchain_label: Label,
        output_subdir_name: &str,
    ) -> Arc<Self> {
        let output_subdir = if output_subdir_name.is_empty() {
            String::new()
        } else {
            format!("{output_subdir_name}/")
        };

        let settings = Self {
            build_settings: Arc::downgrade(build_settings),
            toolchain_label: OnceLock::new(),
            output_subdir,
            target_os: TargetOs::host(),
            greedy_target_generation: AtomicBool::new(false),
            import_manager: ImportManager::new(),
            base_config: OnceLock::new(),
        };
        if !toolchain_label.is_null() {
            let _ = settings.toolchain_label.set(toolchain_label);
        }
        Arc::new(settings)
    }

    pub fn build_settings(&self) -> Arc<BuildSettings> {
        self.build_settings
            .upgrade()
            .expect("build settings outlive all toolchain settings")
    }

    /// The toolchain this settings object belongs to. Null until the
    /// default-toolchain bootstrap fixes the name up.
    pub fn toolchain_label(&self) -> Label {
        self.toolchain_label.get().cloned().unwrap_or_default()
    }

    /// Fills in the label after the default build config names the default
    /// toolchain. A no-op if the label was already known.
    pub fn set_toolchain_label(&self, label: Label) {
        let _ = self.toolchain_label.set(label);
    }

    pub fn target_os(&self) -> TargetOs {
        self.target_os
    }

    pub fn is_win(&self) -> bool {
        self.target_os == TargetOs::Win
    }

    pub fn is_mac(&self) -> bool {
        self.target_os == TargetOs::Mac
    }

    pub fn is_linux(&self) -> bool {
        self.target_os == TargetOs::Linux
    }

    pub fn greedy_target_generation(&self) -> bool {
        self.greedy_target_generation.load(Ordering::SeqCst)
    }

    pub fn set_greedy_target_generation(&self, greedy: bool) {
        self.greedy_target_generation.store(greedy, Ordering::SeqCst);
    }

    pub fn import_manager(&self) -> &ImportManager {
        &self.import_manager
    }

    pub fn base_config(&self) -> Option<Arc<ScopeData>> {
        self.base_config.get().cloned()
    }

    /// Publishes the frozen build-config scope. Called exactly once per
    /// toolchain, after which files under this toolchain may start running.
    pub fn set_base_config(&self, data: Arc<ScopeData>) {
        let _ = self.base_config.set(data);
    }

    pub fn toolchain_output_subdir(&self) -> &str {
        &self.output_subdir
    }

    /// Source-absolute output dir for this toolchain, e.g. `//out/gird/`
    /// for the default toolchain or `//out/gird/win64/` otherwise.
    pub fn toolchain_output_dir(&self) -> String {
        let build_settings = self.build_settings();
        format!("{}{}", build_settings.build_dir().value(), self.output_subdir)
    }

    /// Source-absolute dir for generated intermediate files.
    pub fn toolchain_gen_dir(&self) -> String {
        format!("{}gen/", self.toolchain_output_dir())
    }

    /// A detached settings object for unit tests that don't need a full
    /// build. Calling `build_settings()` on it panics.
    #[cfg(test)]
    pub fn for_tests() -> Arc<Self> {
        Arc::new(Self {
            build_settings: Weak::new(),
            toolchain_label: OnceLock::new(),
            output_subdir: String::new(),
            target_os: TargetOs::host(),
            greedy_target_generation: AtomicBool::new(false),
            import_manager: ImportManager::new(),
            base_config: OnceLock::new(),
        })
    }

    /// Like `for_tests`, but backed by a throwaway `BuildSettings` for
    /// tests that reach through to the shared machinery. The build
    /// settings are deliberately kept alive for the rest of the test
    /// process.
    #[cfg(test)]
    pub fn for_tests_with_build() -> Arc<Self> {
        use crate::constants::DEFAULT_BUILD_DIR;
        use crate::core::input_file_manager::InputFileManager;
        use crate::core::paths::{SourceDir, SourceFile};
        use crate::core::scheduler::Scheduler;

        let build_settings = BuildSettings::new(
            std::path::PathBuf::from("."),
            None,
            std::path::PathBuf::from("python3"),
            SourceFile::new("//build/BUILDCONFIG.gi"),
            SourceDir::new(DEFAULT_BUILD_DIR),
            Arc::new(Scheduler::new(false)),
            Arc::new(InputFileManager::new()),
        );
        let settings = Self::new(&build_settings, Label::default(), "");
        std::mem::forget(build_settings);
        settings
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("toolchain", &self.toolchain_label())
            .field("output_subdir", &self.output_subdir)
            .finish()
    }
}
