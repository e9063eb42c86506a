// src/core/toolchain_manager.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::constants::BUILD_FILE_NAME;
use crate::core::build_settings::BuildSettings;
use crate::core::err::BuildError;
use crate::core::item::Item;
use crate::core::item_tree::{FireLoad, ItemNode, TreeOps};
use crate::core::label::Label;
use crate::core::location::LocationRange;
use crate::core::parse_tree::{self, ParseNode};
use crate::core::paths::{SourceDir, SourceFile};
use crate::core::scope::Scope;
use crate::core::scope_per_file_provider::ScopePerFileProvider;
use crate::core::settings::Settings;
use crate::core::toolchain::Toolchain;
use crate::core::value::Value;
use crate::core::variables;

/// Settings-load progress for one toolchain. Invocations arriving while
/// the build config is still running are queued and drained when it
/// finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainLoadState {
    NotLoaded,
    Loading,
    Loaded,
}

/// Per-toolchain record. Guarded by the item-tree lock (toolchain
/// operations frequently touch both tables, so they share the one lock).
#[derive(Debug)]
pub struct ToolchainInfo {
    pub state: ToolchainLoadState,
    pub settings: Arc<Settings>,
    /// Set when the `toolchain(...)` declaration has executed, along with
    /// where, for duplicate-definition errors.
    pub toolchain_set: bool,
    pub definition_location: LocationRange,
    /// Build files waiting for the settings load, mapped to some location
    /// they were requested from (for error messages).
    pub scheduled_invocations: HashMap<SourceFile, LocationRange>,
    /// Every build file ever scheduled under this toolchain, so nothing is
    /// invoked twice.
    pub all_invocations: HashSet<SourceFile>,
}

impl ToolchainInfo {
    fn new(settings: Arc<Settings>) -> Self {
        Self {
            state: ToolchainLoadState::NotLoaded,
            settings,
            toolchain_set: false,
            definition_location: LocationRange::none(),
            scheduled_invocations: HashMap::new(),
            all_invocations: HashSet::new(),
        }
    }
}

pub fn dir_to_build_file(dir: &SourceDir) -> SourceFile {
    SourceFile::new(format!("{}{}", dir.value(), BUILD_FILE_NAME))
}

/// The subdirectory of the build dir used for a toolchain's outputs. The
/// toolchain name is assumed to be a valid directory name.
fn toolchain_to_output_subdir(label: &Label) -> String {
    label.name().to_string()
}

/// Seeds the host-OS variables every build config can branch on.
pub fn set_system_vars(scope: &mut Scope<'_>) {
    let settings = scope.settings().clone();
    let mut set = |name: &str, value: bool| {
        scope.set_value(name, Value::integer(None, i64::from(value)), None);
        scope.mark_used(name);
    };
    set(variables::IS_WIN, settings.is_win());
    set(variables::IS_POSIX, !settings.is_win());
    set(variables::IS_MAC, settings.is_mac());
    set(variables::IS_LINUX, settings.is_linux());
}

/// Kicks off the whole load: registers the sentinel toolchain (the default
/// toolchain's name is not known until the build config names it), queues
/// the root build file behind the settings load, and schedules the default
/// build config run.
pub fn start_loading(build_settings: &Arc<BuildSettings>, root_build_file: SourceFile) {
    let fires = {
        let mut guard = build_settings.item_tree().lock();
        let mut ops = TreeOps::new(&mut guard, build_settings);

        let sentinel = Label::default();
        let settings = Settings::new(build_settings, sentinel.clone(), "");
        let mut info = ToolchainInfo::new(settings);
        info.state = ToolchainLoadState::Loading;
        info.scheduled_invocations
            .insert(root_build_file.clone(), LocationRange::none());
        info.all_invocations.insert(root_build_file);
        ops.state.toolchains.insert(sentinel.clone(), info);

        ops.fire.push(FireLoad::BuildConfig {
            toolchain: sentinel,
            is_default: true,
            origin: LocationRange::none(),
        });
        std::mem::take(&mut ops.fire)
    };
    fire(build_settings, fires);
}

/// Creates the info record for a toolchain we haven't seen before and
/// schedules the file containing its definition (which runs under the
/// default toolchain).
fn load_new_toolchain(
    ops: &mut TreeOps<'_>,
    specified_from: LocationRange,
    label: &Label,
) -> Result<(), BuildError> {
    let subdir = toolchain_to_output_subdir(label);
    let settings = Settings::new(ops.build_settings, label.clone(), &subdir);
    ops.state
        .toolchains
        .insert(label.clone(), ToolchainInfo::new(settings));

    if !label.is_null() {
        // The default toolchain is always known by the time another one is
        // requested; it provides the context to execute the defining file.
        let default = ops
            .state
            .default_toolchain
            .clone()
            .expect("default toolchain is set before other toolchains load");
        schedule_invocation(ops, specified_from, &default, label.dir().clone())?;
    }
    Ok(())
}

/// Ensures the item-graph node for a toolchain exists so targets can
/// depend on the (possibly future) loading of that toolchain.
pub fn ensure_toolchain_item_node(ops: &mut TreeOps<'_>, label: &Label) {
    debug_assert!(!label.is_null());
    if ops.get_node(label).is_none() {
        ops.add_node(ItemNode::new(
            Item::Toolchain(Toolchain::new(label.clone())),
            LocationRange::none(),
        ));
    }
}

/// Returns the settings for a toolchain, creating its record (and
/// scheduling its loads) on first sight.
pub fn get_settings_for_toolchain(
    ops: &mut TreeOps<'_>,
    specified_from: LocationRange,
    label: &Label,
) -> Result<Arc<Settings>, BuildError> {
    if !ops.state.toolchains.contains_key(label) {
        load_new_toolchain(ops, specified_from, label)?;
    }
    ensure_toolchain_item_node(ops, label);
    Ok(ops.state.toolchains[label].settings.clone())
}

/// Schedules one build file to be invoked under one toolchain. Depending
/// on the settings-load state this starts the settings load, queues behind
/// it, or fires the file load directly.
pub fn schedule_invocation(
    ops: &mut TreeOps<'_>,
    specified_from: LocationRange,
    toolchain_label: &Label,
    dir: SourceDir,
) -> Result<(), BuildError> {
    let build_file = dir_to_build_file(&dir);

    // A null toolchain means "the default".
    let key = if toolchain_label.is_null() {
        ops.state.default_toolchain.clone().unwrap_or_default()
    } else {
        toolchain_label.clone()
    };

    if !ops.state.toolchains.contains_key(&key) {
        load_new_toolchain(ops, specified_from, &key)?;
    }

    let info = ops
        .state
        .toolchains
        .get_mut(&key)
        .expect("just ensured above");
    if info.all_invocations.contains(&build_file) {
        return Ok(());
    }
    info.all_invocations.insert(build_file.clone());

    match info.state {
        ToolchainLoadState::NotLoaded => {
            info.scheduled_invocations
                .insert(build_file, specified_from);
            info.state = ToolchainLoadState::Loading;
            ops.fire.push(FireLoad::BuildConfig {
                toolchain: key,
                is_default: false,
                origin: specified_from,
            });
        }
        ToolchainLoadState::Loading => {
            info.scheduled_invocations
                .insert(build_file, specified_from);
        }
        ToolchainLoadState::Loaded => {
            ops.fire.push(FireLoad::BuildFile {
                toolchain: key,
                file: build_file,
                origin: specified_from,
            });
        }
    }
    Ok(())
}

/// Records the default toolchain label. Only callable once.
pub fn set_default_toolchain(
    build_settings: &Arc<BuildSettings>,
    label: Label,
    defined_here: LocationRange,
) -> Result<(), BuildError> {
    let mut state = build_settings.item_tree().lock();

    if state.default_toolchain.is_some() {
        let mut err = BuildError::new(defined_here, "Default toolchain already set.");
        err.append_sub_error(BuildError::with_help(
            state.default_toolchain_range,
            "Previously defined here.",
            "You can only set this once.",
        ));
        return Err(err);
    }
    if label.is_null() {
        return Err(BuildError::with_help(
            defined_here,
            "Bad default toolchain name.",
            "You can't set the default toolchain name to nothing.",
        ));
    }
    if !label.toolchain_dir().is_null() || !label.toolchain_name().is_empty() {
        return Err(BuildError::with_help(
            defined_here,
            "Toolchain name has a toolchain.",
            format!(
                "You can't specify a toolchain (inside the parens) for a toolchain\n\
                 name. I got: {}",
                label.user_visible_name(true)
            ),
        ));
    }

    state.default_toolchain = Some(label);
    state.default_toolchain_range = defined_here;
    Ok(())
}

pub fn get_default_toolchain(build_settings: &Arc<BuildSettings>) -> Option<Label> {
    build_settings.item_tree().lock().default_toolchain.clone()
}

/// Installs the body of a `toolchain(...)` declaration. The payload lands
/// in the item-graph node so dependents resolve against it; defining a
/// toolchain twice is rejected.
pub fn set_toolchain_definition(
    ops: &mut TreeOps<'_>,
    toolchain: Toolchain,
    defined_from: LocationRange,
) -> Result<(), BuildError> {
    let label = toolchain.label.clone();
    if !ops.state.toolchains.contains_key(&label) {
        load_new_toolchain(ops, defined_from, &label)?;
    }

    let info = ops
        .state
        .toolchains
        .get_mut(&label)
        .expect("just ensured above");
    if info.toolchain_set {
        let mut err = BuildError::new(defined_from, "Duplicate toolchain definition.");
        err.append_sub_error(BuildError::with_help(
            info.definition_location,
            "Previously defined here.",
            "A toolchain can only be defined once. One tricky way this happens is a\n\
             definition in a file that is itself interpreted under multiple toolchains,\n\
             which loads the file (and the definition) more than once. Keep toolchain\n\
             definitions in files that don't define targets.",
        ));
        return Err(err);
    }
    info.toolchain_set = true;
    info.definition_location = defined_from;

    ensure_toolchain_item_node(ops, &label);
    ops.get_node_mut(&label)
        .expect("node just ensured")
        .item = Item::Toolchain(toolchain);
    Ok(())
}

/// After the default build config has run we finally know the default
/// toolchain's name: re-key the sentinel record, switch it to greedy
/// generation, and schedule the root of its tree.
fn fixup_default_toolchain(ops: &mut TreeOps<'_>) -> Result<(), BuildError> {
    let Some(default) = ops.state.default_toolchain.clone() else {
        return Err(BuildError::bare(
            "Default toolchain not set.",
            format!(
                "Your build config file \"{}\"\ndid not call set_default_toolchain(). \
                 This is needed so I know how to\nactually compile your code.",
                ops.build_settings.build_config_file().value()
            ),
        ));
    };

    let info = ops
        .state
        .toolchains
        .remove(&Label::default())
        .expect("sentinel toolchain record exists");
    debug_assert!(!info.toolchain_set);

    // The settings were created under the sentinel; now they learn their
    // real name. The default toolchain generates greedily; non-default
    // toolchains stay on-demand so only the minimally required set is
    // emitted.
    info.settings.set_toolchain_label(default.clone());
    info.settings.set_greedy_target_generation(true);
    ops.state.toolchains.insert(default.clone(), info);

    ensure_toolchain_item_node(ops, &default);
    schedule_invocation(ops, LocationRange::none(), &default, default.dir().clone())
}

/// Async-load callback: runs the build config for one toolchain, then
/// drains the invocations that were queued behind it.
pub fn background_load_build_config(
    build_settings: &Arc<BuildSettings>,
    toolchain_key: &Label,
    is_default: bool,
    root: Option<Arc<ParseNode>>,
) {
    // Note: no early returns; the work count is decremented at the bottom.
    'body: {
        let Some(root) = root else {
            break 'body;
        };
        if build_settings.scheduler().is_failed() {
            break 'body;
        }

        let settings = build_settings
            .item_tree()
            .lock()
            .toolchains
            .get(toolchain_key)
            .map(|i| i.settings.clone());
        let Some(settings) = settings else {
            break 'body;
        };

        // Nobody else reads these settings until we publish the loaded
        // state, so the config executes without any lock held.
        let mut scope = Scope::new(settings.clone());
        set_system_vars(&mut scope);
        scope.set_processing_build_config();
        if is_default {
            scope.set_processing_default_build_config();
        }

        let result = parse_tree::execute_block_in_scope(&root, &mut scope);

        scope.clear_processing_build_config();
        if is_default {
            scope.clear_processing_default_build_config();
        }

        if let Err(err) = result {
            build_settings.scheduler().fail_with(err);
            break 'body;
        }
        settings.set_base_config(Arc::new(scope.into_root_data()));

        let fires: Result<Vec<FireLoad>, BuildError> = {
            let mut guard = build_settings.item_tree().lock();
            let mut ops = TreeOps::new(&mut guard, build_settings);

            let queued = {
                let info = ops
                    .state
                    .toolchains
                    .get_mut(toolchain_key)
                    .expect("toolchain record exists");
                info.state = ToolchainLoadState::Loaded;
                std::mem::take(&mut info.scheduled_invocations)
            };

            let final_key = if is_default {
                match fixup_default_toolchain(&mut ops) {
                    Ok(()) => ops
                        .state
                        .default_toolchain
                        .clone()
                        .expect("set by fixup check"),
                    Err(e) => {
                        drop(ops);
                        drop(guard);
                        build_settings.scheduler().fail_with(e);
                        break 'body;
                    }
                }
            } else {
                toolchain_key.clone()
            };

            let mut sorted: Vec<(SourceFile, LocationRange)> = queued.into_iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (file, origin) in sorted {
                ops.fire.push(FireLoad::BuildFile {
                    toolchain: final_key.clone(),
                    file,
                    origin,
                });
            }
            Ok(std::mem::take(&mut ops.fire))
        };

        match fires {
            Ok(f) => fire(build_settings, f),
            Err(e) => build_settings.scheduler().fail_with(e),
        }
    }

    build_settings.scheduler().decrement_work_count();
}

/// Async-load callback: evaluates one build file in a toolchain context.
pub fn background_invoke(
    build_settings: &Arc<BuildSettings>,
    toolchain_key: &Label,
    file: &SourceFile,
    root: Option<Arc<ParseNode>>,
) {
    'body: {
        let Some(root) = root else {
            break 'body;
        };
        if build_settings.scheduler().is_failed() {
            break 'body;
        }

        let settings = build_settings
            .item_tree()
            .lock()
            .toolchains
            .get(toolchain_key)
            .map(|i| i.settings.clone());
        let Some(settings) = settings else {
            break 'body;
        };

        if build_settings.scheduler().verbose_logging() {
            build_settings.scheduler().log(
                "Running",
                format!(
                    "{} with toolchain {}",
                    file.value(),
                    settings.toolchain_label().user_visible_name(false)
                ),
            );
        }

        let base = settings
            .base_config()
            .expect("base config is published before invocations fire");
        let mut scope = Scope::with_base(settings.clone(), &base);
        scope.add_provider(Box::new(ScopePerFileProvider::new(
            settings.clone(),
            file.clone(),
        )));

        let result = parse_tree::execute_block_in_scope(&root, &mut scope)
            .and_then(|_| scope.check_top_frame_for_unused());
        if let Err(err) = result {
            build_settings.scheduler().fail_with(err);
        }
    }

    build_settings.scheduler().decrement_work_count();
}

/// Fires the side effects collected under the tree lock, after it has been
/// released: file loads onto the input-file manager and resolved-target
/// notifications onto the pool.
pub fn fire(build_settings: &Arc<BuildSettings>, loads: Vec<FireLoad>) {
    for load in loads {
        match load {
            FireLoad::BuildConfig {
                toolchain,
                is_default,
                origin,
            } => {
                let scheduler = build_settings.scheduler().clone();
                scheduler.increment_work_count();
                let bs = build_settings.clone();
                let callback = Box::new(move |root| {
                    background_load_build_config(&bs, &toolchain, is_default, root);
                });
                let load_result = build_settings.input_file_manager().async_load(
                    &scheduler,
                    &build_settings.file_roots(),
                    origin,
                    build_settings.build_config_file().clone(),
                    callback,
                );
                if let Err(e) = load_result {
                    scheduler.fail_with(e);
                    scheduler.decrement_work_count();
                }
            }
            FireLoad::BuildFile {
                toolchain,
                file,
                origin,
            } => {
                let scheduler = build_settings.scheduler().clone();
                scheduler.increment_work_count();
                let bs = build_settings.clone();
                let file_for_callback = file.clone();
                let callback = Box::new(move |root| {
                    background_invoke(&bs, &toolchain, &file_for_callback, root);
                });
                let load_result = build_settings.input_file_manager().async_load(
                    &scheduler,
                    &build_settings.file_roots(),
                    origin,
                    file,
                    callback,
                );
                if let Err(e) = load_result {
                    scheduler.fail_with(e);
                    scheduler.decrement_work_count();
                }
            }
            FireLoad::ResolvedTarget(target) => {
                if let Some(callback) = build_settings.target_resolved_callback() {
                    build_settings
                        .scheduler()
                        .schedule_work(move || callback(&target));
                }
            }
        }
    }
}
