// src/core/target_manager.rs

use crate::core::err::BuildError;
use crate::core::item::Item;
use crate::core::item_tree::{ItemNode, NodeState, TreeOps};
use crate::core::label::Label;
use crate::core::location::LocationRange;
use crate::core::target::Target;
use crate::core::toolchain_manager;

/// Looks up or creates the graph node for a target label.
///
/// With no `dep_from` this is a declaration: the node is claimed for
/// generation and re-declaring it is an error. With a `dep_from` this is a
/// reference from another target's `deps`, which records a dependency edge
/// so the referrer's resolution waits on this target (and, for a new
/// label, schedules loading the build file that should define it).
pub fn get_target(
    ops: &mut TreeOps<'_>,
    label: &Label,
    specified_from_here: LocationRange,
    dep_from: Option<&Label>,
) -> Result<(), BuildError> {
    debug_assert!(!label.is_null());
    debug_assert!(!label.toolchain_name().is_empty());

    match ops.get_node(label) {
        None => {
            // First time we've seen this label. The settings tell us
            // whether this toolchain generates greedily; asking for them
            // also makes sure the toolchain itself gets loaded.
            let settings = toolchain_manager::get_settings_for_toolchain(
                ops,
                specified_from_here,
                &label.toolchain_label(),
            )?;

            let mut node = ItemNode::new(
                Item::Target(Target::new(label.clone())),
                specified_from_here,
            );
            if dep_from.is_none() {
                // We're generating a node nobody referenced yet.
                node.generated_from = Some(specified_from_here);
            }
            ops.add_node(node);

            if settings.greedy_target_generation() {
                ops.set_should_generate(label)?;
            }
        }
        Some(node) => {
            if node.item.as_target().is_none() {
                // Previously saw this label as a non-target.
                let mut err = BuildError::with_help(
                    specified_from_here,
                    "Not previously a target.",
                    format!(
                        "The target being declared here was previously seen referenced as\n\
                         a {}.",
                        node.item.item_type_name()
                    ),
                );
                err.append_sub_error(BuildError::new(
                    node.originally_referenced_from,
                    "Originally referenced from here.",
                ));
                return Err(err);
            }

            if dep_from.is_none() {
                // A second declaration with this name.
                if let Some(generated_from) = node.generated_from {
                    let mut err = BuildError::new(
                        specified_from_here,
                        format!(
                            "Duplicate target. \"{}\" is being defined here.",
                            label.user_visible_name(true)
                        ),
                    );
                    err.append_sub_error(BuildError::new(
                        generated_from,
                        "Originally defined here.",
                    ));
                    return Err(err);
                }
                let node = ops.get_node_mut(label).expect("checked above");
                node.generated_from = Some(specified_from_here);
            }
        }
    }

    // Record who is asking: the referrer can't be resolved before us.
    if let Some(from) = dep_from {
        let dep_state = ops.get_node(label).expect("ensured above").state;
        if dep_state != NodeState::Resolved {
            ops.add_dependency(from, label, specified_from_here)?;
        }
    }
    Ok(())
}

/// Installs the generated payload and transitions the node to defined,
/// called when the declaration for a target has finished executing. If all
/// dependencies are already resolved this cascades to resolved directly.
pub fn target_generation_complete(
    ops: &mut TreeOps<'_>,
    label: &Label,
    target: Target,
) -> Result<(), BuildError> {
    {
        let node = ops
            .get_node_mut(label)
            .expect("generation completes only for existing nodes");
        debug_assert!(node.item.as_target().is_some());
        node.item = Item::Target(target);
    }
    ops.mark_defined(label)
}
