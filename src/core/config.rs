// src/core/config.rs

use crate::core::config_values::ConfigValues;
use crate::core::err::BuildError;
use crate::core::item::Item;
use crate::core::item_tree::{ItemNode, NodeState, TreeOps};
use crate::core::label::Label;
use crate::core::location::LocationRange;
use crate::core::toolchain_manager;

/// A named bundle of compile/link flag fragments. The values are filled in
/// by the `config` declaration and are read-only once the graph node is
/// resolved.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub label: Label,
    pub config_values: ConfigValues,
}

impl Config {
    pub fn new(label: Label) -> Self {
        Self {
            label,
            config_values: ConfigValues::default(),
        }
    }
}

/// Looks up or creates the graph node for a config label. References from
/// a target in another directory schedule that directory's build file so
/// the definition gets loaded; a `dep_from` also records the dependency
/// edge.
pub fn get_or_create_config(
    ops: &mut TreeOps<'_>,
    label: &Label,
    specified_from_here: LocationRange,
    dep_from: Option<&Label>,
) -> Result<(), BuildError> {
    debug_assert!(!label.is_null());

    match ops.get_node(label) {
        None => {
            ops.add_node(ItemNode::new(
                Item::Config(Config::new(label.clone())),
                specified_from_here,
            ));

            // Only schedule loading when somebody else's file defines it;
            // a reference from the defining directory is (probably) being
            // generated by the file we're already running.
            if let Some(from) = dep_from {
                if from.dir() != label.dir() {
                    toolchain_manager::schedule_invocation(
                        ops,
                        specified_from_here,
                        &label.toolchain_label(),
                        label.dir().clone(),
                    )?;
                }
            }
        }
        Some(node) => {
            if node.item.as_config().is_none() {
                let mut err = BuildError::with_help(
                    specified_from_here,
                    "Config name already used.",
                    format!(
                        "Previously you specified a {} with this name instead.",
                        node.item.item_type_name()
                    ),
                );
                err.append_sub_error(BuildError::new(
                    node.originally_referenced_from,
                    "Originally referenced from here.",
                ));
                return Err(err);
            }
            if dep_from.is_none() && node.state != NodeState::Referenced {
                return Err(BuildError::with_help(
                    specified_from_here,
                    "Duplicate config definition.",
                    "You already told me about a config with this name.",
                ));
            }
        }
    }

    if let Some(from) = dep_from {
        let state = ops.get_node(label).expect("ensured above").state;
        if state != NodeState::Resolved {
            ops.add_dependency(from, label, specified_from_here)?;
        }
    }
    Ok(())
}

/// Installs the values of an executed `config(...)` declaration and marks
/// the node defined (configs have no dependencies, so this resolves it).
pub fn define_config(
    ops: &mut TreeOps<'_>,
    label: &Label,
    specified_from_here: LocationRange,
    config_values: ConfigValues,
) -> Result<(), BuildError> {
    get_or_create_config(ops, label, specified_from_here, None)?;

    let node = ops.get_node_mut(label).expect("just ensured");
    node.generated_from = Some(specified_from_here);
    node.item = Item::Config(Config {
        label: label.clone(),
        config_values,
    });
    ops.mark_defined(label)
}
