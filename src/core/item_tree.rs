// src/core/item_tree.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::build_settings::BuildSettings;
use crate::core::err::BuildError;
use crate::core::item::Item;
use crate::core::label::Label;
use crate::core::location::{Location, LocationRange};
use crate::core::paths::SourceFile;
use crate::core::target::Target;
use crate::core::toolchain_manager::ToolchainInfo;

/// Lifecycle of a graph node. Transitions are monotonic:
/// referenced → defined → pending_deps → resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Another item referenced this label but we have not yet seen its
    /// definition.
    Referenced,
    /// The declaration executed but the dependency loads have not been
    /// requested. Non-generated nodes can stay here forever in on-demand
    /// mode.
    Defined,
    /// All dependency loads have been scheduled; some are outstanding.
    PendingDeps,
    /// The item and all transitive dependencies are resolved.
    Resolved,
}

/// One node of the graph. The unresolved set and the waiting set of the
/// dependency target are maintained as mirrors under the tree lock: for
/// every (A, B), B ∈ A.unresolved_dependencies ⇔ A ∈ B.waiting_on_resolution.
#[derive(Debug)]
pub struct ItemNode {
    pub item: Item,
    pub state: NodeState,
    pub should_generate: bool,
    pub originally_referenced_from: LocationRange,
    /// Where the declaration executed; also the duplicate-definition guard.
    pub generated_from: Option<LocationRange>,
    pub direct_dependencies: HashMap<Label, LocationRange>,
    pub unresolved_dependencies: HashMap<Label, LocationRange>,
    pub waiting_on_resolution: HashMap<Label, LocationRange>,
}

impl ItemNode {
    pub fn new(item: Item, referenced_from: LocationRange) -> Self {
        Self {
            item,
            state: NodeState::Referenced,
            should_generate: false,
            originally_referenced_from: referenced_from,
            generated_from: None,
            direct_dependencies: HashMap::new(),
            unresolved_dependencies: HashMap::new(),
            waiting_on_resolution: HashMap::new(),
        }
    }
}

/// Deferred side effects collected while the tree lock is held and fired
/// after it is released, so no task ever holds the tree lock and the
/// input-file-manager lock at once.
#[derive(Debug)]
pub enum FireLoad {
    /// Run the build config for a toolchain (the settings load).
    BuildConfig {
        toolchain: Label,
        is_default: bool,
        origin: LocationRange,
    },
    /// Invoke a build file in a toolchain context.
    BuildFile {
        toolchain: Label,
        file: SourceFile,
        origin: LocationRange,
    },
    /// A generated target became resolved; hand it to the back-end hook.
    ResolvedTarget(Target),
}

/// Everything guarded by the single tree lock. The toolchain manager's
/// state lives here too, so operations that touch both the graph and the
/// toolchain table never take two locks.
#[derive(Debug, Default)]
pub struct TreeState {
    pub items: HashMap<Label, ItemNode>,
    pub toolchains: HashMap<Label, ToolchainInfo>,
    pub default_toolchain: Option<Label>,
    pub default_toolchain_range: LocationRange,
}

/// The thread-safe item graph.
#[derive(Debug, Default)]
pub struct ItemTree {
    state: Mutex<TreeState>,
}

impl ItemTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap()
    }

    /// All target payloads with their node states, sorted by label.
    pub fn snapshot_targets(&self) -> Vec<(Target, NodeState)> {
        let state = self.lock();
        let mut targets: Vec<(Target, NodeState)> = state
            .items
            .values()
            .filter_map(|n| n.item.as_target().map(|t| (t.clone(), n.state)))
            .collect();
        targets.sort_by(|a, b| a.0.label.cmp(&b.0.label));
        targets
    }

    /// All toolchain payloads, sorted by label.
    pub fn snapshot_toolchains(&self) -> Vec<crate::core::toolchain::Toolchain> {
        let state = self.lock();
        let mut toolchains: Vec<crate::core::toolchain::Toolchain> = state
            .items
            .values()
            .filter_map(|n| n.item.as_toolchain().cloned())
            .collect();
        toolchains.sort_by(|a, b| a.label.cmp(&b.label));
        toolchains
    }

    /// All config payloads, sorted by label.
    pub fn snapshot_configs(&self) -> Vec<crate::core::config::Config> {
        let state = self.lock();
        let mut configs: Vec<crate::core::config::Config> = state
            .items
            .values()
            .filter_map(|n| n.item.as_config().cloned())
            .collect();
        configs.sort_by(|a, b| a.label.cmp(&b.label));
        configs
    }

    /// Final validation at quiescence: every node marked for generation
    /// must be resolved. Reports a missing (referenced-but-never-defined)
    /// dependency when one explains the problem, otherwise looks for a
    /// dependency cycle and prints its path.
    pub fn check_for_bad_items(&self) -> Option<BuildError> {
        let state = self.lock();

        let mut bad_labels: Vec<&Label> = state
            .items
            .iter()
            .filter(|(_, node)| {
                node.should_generate
                    && matches!(node.state, NodeState::Defined | NodeState::PendingDeps)
            })
            .map(|(label, _)| label)
            .collect();
        bad_labels.sort();

        let mut depstring = String::new();
        for label in &bad_labels {
            let node = &state.items[*label];
            for dep_label in sorted_keys(&node.unresolved_dependencies) {
                let dep_node = &state.items[dep_label];
                if dep_node.state == NodeState::Referenced {
                    depstring.push_str(&format!(
                        "\"{}\" needs {} \"{}\"\n",
                        label.user_visible_name(false),
                        dep_node.item.item_type_name(),
                        dep_label.user_visible_name(false)
                    ));
                }
            }
        }

        if !bad_labels.is_empty() && depstring.is_empty() {
            // Nothing undefined, so the usual cause is a cycle.
            depstring = check_for_circular_dependencies(&state, bad_labels[0]);
            if depstring.is_empty() {
                depstring =
                    "I have no idea what went wrong, but these are unresolved:".to_string();
                for label in &bad_labels {
                    depstring.push_str(&format!("\n\"{}\"", label.user_visible_name(false)));
                }
            }
        }

        if depstring.is_empty() {
            return None;
        }
        Some(BuildError::with_help(
            LocationRange::new(Location::none(), Location::none()),
            "Unresolved dependencies.",
            depstring,
        ))
    }
}

fn sorted_keys(map: &HashMap<Label, LocationRange>) -> Vec<&Label> {
    let mut keys: Vec<&Label> = map.keys().collect();
    keys.sort();
    keys
}

fn check_for_circular_dependencies(state: &TreeState, start: &Label) -> String {
    let mut cycle = Vec::new();
    let mut visited = Vec::new();
    if !recursive_find_cycle(state, start, start, &mut cycle, &mut visited) {
        return String::new();
    }
    cycle.push(start.clone());

    let mut ret = "There is a dependency cycle:".to_string();
    // The dependency arrows point in the reverse direction of discovery.
    for (i, label) in cycle.iter().rev().enumerate() {
        ret.push_str(&format!("\n  \"{}\"", label.user_visible_name(false)));
        if i != cycle.len() - 1 {
            ret.push_str(" ->");
        }
    }
    ret
}

fn recursive_find_cycle(
    state: &TreeState,
    look_for: &Label,
    search_in: &Label,
    cycle: &mut Vec<Label>,
    visited: &mut Vec<Label>,
) -> bool {
    let Some(node) = state.items.get(search_in) else {
        return false;
    };
    for dep in sorted_keys(&node.unresolved_dependencies) {
        if dep == look_for {
            cycle.push(dep.clone());
            return true;
        }
        if visited.contains(dep) {
            continue;
        }
        visited.push(dep.clone());
        if recursive_find_cycle(state, look_for, dep, cycle, visited) {
            cycle.push(dep.clone());
            return true;
        }
    }
    false
}

/// A locked editing session on the tree. Mutations that need follow-up work
/// outside the lock (file loads, resolved-target notifications) append to
/// `fire`; the caller releases the lock and passes the list to
/// `toolchain_manager::fire`.
pub struct TreeOps<'a> {
    pub state: &'a mut TreeState,
    pub build_settings: &'a Arc<BuildSettings>,
    pub fire: Vec<FireLoad>,
}

impl<'a> TreeOps<'a> {
    pub fn new(state: &'a mut TreeState, build_settings: &'a Arc<BuildSettings>) -> Self {
        Self {
            state,
            build_settings,
            fire: Vec::new(),
        }
    }

    pub fn get_node(&self, label: &Label) -> Option<&ItemNode> {
        self.state.items.get(label)
    }

    pub fn get_node_mut(&mut self, label: &Label) -> Option<&mut ItemNode> {
        self.state.items.get_mut(label)
    }

    /// Inserts a new node. The label must be unused.
    pub fn add_node(&mut self, node: ItemNode) {
        let label = node.item.label().clone();
        debug_assert!(!self.state.items.contains_key(&label));
        self.state.items.insert(label, node);
    }

    /// Records that `from` depends on `to`, wiring the mirrored
    /// unresolved/waiting sets and pushing the generate bit.
    pub fn add_dependency(
        &mut self,
        from: &Label,
        to: &Label,
        specified_from_here: LocationRange,
    ) -> Result<(), BuildError> {
        let to_state = self
            .state
            .items
            .get(to)
            .map(|n| n.state)
            .expect("dependency target node exists");

        let from_node = self
            .state
            .items
            .get_mut(from)
            .expect("dependency source node exists");
        // Deps are only added while the declaration runs, before the node
        // is defined.
        debug_assert_eq!(from_node.state, NodeState::Referenced);

        if from_node.direct_dependencies.contains_key(to) {
            return Ok(());
        }
        from_node
            .direct_dependencies
            .insert(to.clone(), specified_from_here);

        let from_should_generate = from_node.should_generate;
        if to_state != NodeState::Resolved {
            from_node
                .unresolved_dependencies
                .insert(to.clone(), specified_from_here);
            self.state
                .items
                .get_mut(to)
                .expect("checked above")
                .waiting_on_resolution
                .insert(from.clone(), specified_from_here);
        }

        if from_should_generate {
            self.set_should_generate(to)?;
        }
        Ok(())
    }

    /// Marks a node (and transitively everything it depends on) as needing
    /// generation. Defined nodes get their dependency loads scheduled;
    /// already-resolved targets get their deferred back-end notification.
    pub fn set_should_generate(&mut self, label: &Label) -> Result<(), BuildError> {
        let mut worklist = vec![label.clone()];
        while let Some(current) = worklist.pop() {
            let Some(node) = self.state.items.get_mut(&current) else {
                continue;
            };
            if node.should_generate {
                continue;
            }
            node.should_generate = true;

            match node.state {
                NodeState::Defined => self.schedule_deps_load(&current)?,
                NodeState::Resolved => {
                    // Resolution may have happened before anyone asked for
                    // this node; run the skipped notification now.
                    if let Some(target) = self.state.items[&current].item.as_target() {
                        self.fire.push(FireLoad::ResolvedTarget(target.clone()));
                    }
                }
                _ => {}
            }

            let deps: Vec<Label> = self.state.items[&current]
                .direct_dependencies
                .keys()
                .cloned()
                .collect();
            worklist.extend(deps);
        }
        Ok(())
    }

    /// Schedules loading the build files containing this node's unresolved
    /// dependencies and advances defined → pending_deps.
    fn schedule_deps_load(&mut self, label: &Label) -> Result<(), BuildError> {
        let node = self.state.items.get(label).expect("node exists");
        debug_assert_eq!(node.state, NodeState::Defined);
        debug_assert!(node.should_generate);

        let deps: Vec<(Label, LocationRange)> = node
            .unresolved_dependencies
            .iter()
            .map(|(l, r)| (l.clone(), *r))
            .collect();
        for (dep_label, origin) in deps {
            crate::core::toolchain_manager::schedule_invocation(
                self,
                origin,
                &dep_label.toolchain_label(),
                dep_label.dir().clone(),
            )?;
        }

        self.state
            .items
            .get_mut(label)
            .expect("node exists")
            .state = NodeState::PendingDeps;
        Ok(())
    }

    /// Transitions referenced → defined once a declaration has finished
    /// executing. If nothing is unresolved the node cascades straight to
    /// resolved.
    pub fn mark_defined(&mut self, label: &Label) -> Result<(), BuildError> {
        let node = self.state.items.get_mut(label).expect("defined node exists");
        debug_assert_eq!(node.state, NodeState::Referenced);

        if !node.unresolved_dependencies.is_empty() {
            node.state = NodeState::Defined;
            if node.should_generate {
                self.schedule_deps_load(label)?;
            }
            return Ok(());
        }
        self.mark_resolved(label);
        Ok(())
    }

    /// Resolves a node: runs the target resolver over its (resolved) deps,
    /// emits the back-end notification, and drains the waiting set,
    /// cascading to any waiter whose last unresolved dependency this was.
    fn mark_resolved(&mut self, label: &Label) {
        let mut queue = vec![label.clone()];
        while let Some(current) = queue.pop() {
            {
                let node = self.state.items.get_mut(&current).expect("node exists");
                debug_assert_ne!(node.state, NodeState::Resolved);
                node.state = NodeState::Resolved;
            }

            self.resolve_target_payload(&current);

            let waiting = {
                let node = self.state.items.get_mut(&current).expect("node exists");
                std::mem::take(&mut node.waiting_on_resolution)
            };
            for (waiter, _) in waiting {
                let waiter_node = self
                    .state
                    .items
                    .get_mut(&waiter)
                    .expect("waiter node exists");
                debug_assert!(waiter_node.unresolved_dependencies.contains_key(&current));
                waiter_node.unresolved_dependencies.remove(&current);

                if matches!(
                    waiter_node.state,
                    NodeState::Defined | NodeState::PendingDeps
                ) && waiter_node.unresolved_dependencies.is_empty()
                {
                    queue.push(waiter);
                }
            }
        }
    }

    /// For target nodes: computes the inherited configuration (dependent
    /// configs, inherited libraries) from the now-resolved dependencies,
    /// then queues the resolved notification if this target is generated.
    fn resolve_target_payload(&mut self, label: &Label) {
        let taken = {
            let node = self.state.items.get_mut(label).expect("node exists");
            match &mut node.item {
                Item::Target(t) => Some(std::mem::take(t)),
                _ => None,
            }
        };
        let Some(mut target) = taken else {
            return;
        };

        {
            let items = &self.state.items;
            target.pull_dependent_info(&|dep_label| {
                items
                    .get(dep_label)
                    .and_then(|n| n.item.as_target())
                    .cloned()
            });
        }

        let node = self.state.items.get_mut(label).expect("node exists");
        let notify = node.should_generate.then(|| target.clone());
        node.item = Item::Target(target);
        if let Some(resolved) = notify {
            self.fire.push(FireLoad::ResolvedTarget(resolved));
        }
    }

}

impl std::fmt::Debug for TreeOps<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeOps")
            .field("items", &self.state.items.len())
            .field("pending_fires", &self.fire.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::paths::SourceDir;
    use crate::core::target::Target;

    fn label(name: &str) -> Label {
        Label::new(SourceDir::new("//"), name, SourceDir::new("//tc/"), "d")
    }

    fn target_node(name: &str) -> ItemNode {
        ItemNode::new(
            Item::Target(Target::new(label(name))),
            LocationRange::none(),
        )
    }

    #[test]
    fn dependency_sets_are_mirrored() {
        let tree = ItemTree::new();
        let build_settings = BuildSettings::for_tests();
        let mut guard = tree.lock();
        let mut ops = TreeOps::new(&mut guard, &build_settings);

        ops.add_node(target_node("a"));
        ops.add_node(target_node("b"));
        ops.add_dependency(&label("a"), &label("b"), LocationRange::none())
            .unwrap();

        let a = ops.get_node(&label("a")).unwrap();
        assert!(a.unresolved_dependencies.contains_key(&label("b")));
        assert!(a.direct_dependencies.contains_key(&label("b")));
        let b = ops.get_node(&label("b")).unwrap();
        assert!(b.waiting_on_resolution.contains_key(&label("a")));
    }

    #[test]
    fn defining_the_last_dependency_cascades_resolution() {
        let tree = ItemTree::new();
        let build_settings = BuildSettings::for_tests();
        let mut guard = tree.lock();
        let mut ops = TreeOps::new(&mut guard, &build_settings);

        ops.add_node(target_node("a"));
        ops.add_node(target_node("b"));
        ops.add_dependency(&label("a"), &label("b"), LocationRange::none())
            .unwrap();

        // Defining a leaves it waiting on b.
        ops.mark_defined(&label("a")).unwrap();
        assert_eq!(ops.get_node(&label("a")).unwrap().state, NodeState::Defined);

        // Defining b (no deps) resolves it and cascades to a.
        ops.mark_defined(&label("b")).unwrap();
        assert_eq!(ops.get_node(&label("b")).unwrap().state, NodeState::Resolved);
        let a = ops.get_node(&label("a")).unwrap();
        assert_eq!(a.state, NodeState::Resolved);
        assert!(a.unresolved_dependencies.is_empty());
        let b = ops.get_node(&label("b")).unwrap();
        assert!(b.waiting_on_resolution.is_empty());
    }

    #[test]
    fn dependencies_on_resolved_nodes_need_no_wiring() {
        let tree = ItemTree::new();
        let build_settings = BuildSettings::for_tests();
        let mut guard = tree.lock();
        let mut ops = TreeOps::new(&mut guard, &build_settings);

        ops.add_node(target_node("dep"));
        ops.mark_defined(&label("dep")).unwrap();

        ops.add_node(target_node("user"));
        ops.add_dependency(&label("user"), &label("dep"), LocationRange::none())
            .unwrap();
        let user = ops.get_node(&label("user")).unwrap();
        assert!(user.unresolved_dependencies.is_empty());
        assert!(user.direct_dependencies.contains_key(&label("dep")));

        // With nothing outstanding, defining resolves immediately.
        ops.mark_defined(&label("user")).unwrap();
        assert_eq!(
            ops.get_node(&label("user")).unwrap().state,
            NodeState::Resolved
        );
    }

    #[test]
    fn check_for_bad_items_names_the_missing_dependency() {
        let tree = ItemTree::new();
        let build_settings = BuildSettings::for_tests();
        {
            let mut guard = tree.lock();
            let mut ops = TreeOps::new(&mut guard, &build_settings);

            ops.add_node(target_node("a"));
            ops.add_node(target_node("missing"));
            ops.add_dependency(&label("a"), &label("missing"), LocationRange::none())
                .unwrap();
            ops.mark_defined(&label("a")).unwrap();
            ops.get_node_mut(&label("a")).unwrap().should_generate = true;
        }

        let err = tree.check_for_bad_items().expect("should report");
        assert_eq!(err.message, "Unresolved dependencies.");
        assert!(err.help.contains("\"//:a\" needs target \"//:missing\""));
    }

    #[test]
    fn check_for_bad_items_reports_cycles_in_order() {
        let tree = ItemTree::new();
        let build_settings = BuildSettings::for_tests();
        {
            let mut guard = tree.lock();
            let mut ops = TreeOps::new(&mut guard, &build_settings);

            for name in ["a", "b", "c"] {
                ops.add_node(target_node(name));
            }
            ops.add_dependency(&label("a"), &label("b"), LocationRange::none())
                .unwrap();
            ops.add_dependency(&label("b"), &label("c"), LocationRange::none())
                .unwrap();
            ops.add_dependency(&label("c"), &label("a"), LocationRange::none())
                .unwrap();
            for name in ["a", "b", "c"] {
                ops.mark_defined(&label(name)).unwrap();
                ops.get_node_mut(&label(name)).unwrap().should_generate = true;
            }
        }

        let err = tree.check_for_bad_items().expect("cycle should be found");
        assert!(err.help.contains("There is a dependency cycle:"));
        let a = err.help.find("\"//:a\"").unwrap();
        let b = err.help.find("\"//:b\"").unwrap();
        let c = err.help.find("\"//:c\"").unwrap();
        assert!(a < b && b < c, "path order in:\n{}", err.help);
    }

    #[test]
    fn quiescent_clean_graph_reports_nothing() {
        let tree = ItemTree::new();
        let build_settings = BuildSettings::for_tests();
        {
            let mut guard = tree.lock();
            let mut ops = TreeOps::new(&mut guard, &build_settings);
            ops.add_node(target_node("a"));
            ops.mark_defined(&label("a")).unwrap();
        }
        assert!(tree.check_for_bad_items().is_none());
    }
}
