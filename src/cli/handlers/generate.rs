// src/cli/handlers/generate.rs

use std::collections::HashMap;

use anyhow::{Context as _, Result};
use colored::Colorize;
use serde::Serialize;

use crate::cli::args::GenArgs;
use crate::constants::MANIFEST_FILE_NAME;
use crate::core::config_values::ConfigValues;
use crate::core::item_tree::NodeState;
use crate::core::label::Label;
use crate::core::setup::Setup;
use crate::core::target::{OutputType, Target};
use crate::core::toolchain::ToolType;
use crate::core::toolchain_manager;

/// Runs the whole evaluation and, unless `--check-only` was given, writes
/// the manifest the downstream executor consumes.
pub fn handle(args: &GenArgs) -> Result<bool> {
    let setup = Setup::new(args.root.as_deref(), args.verbose)?;
    if !setup.run() {
        return Ok(false);
    }

    if args.check_only {
        println!("{} evaluation finished, nothing written", "OK".green());
        return Ok(true);
    }

    let manifest = build_manifest(&setup);
    let build_settings = setup.build_settings();
    let out_dir = build_settings.get_full_dir_path(build_settings.build_dir());
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("could not create the build directory {}", out_dir.display()))?;

    let manifest_path = out_dir.join(MANIFEST_FILE_NAME);
    let json = serde_json::to_string_pretty(&manifest).context("manifest serialization failed")?;
    std::fs::write(&manifest_path, json)
        .with_context(|| format!("could not write {}", manifest_path.display()))?;

    println!(
        "{} wrote {} ({} targets, {} toolchains)",
        "Done".green(),
        manifest_path.display(),
        manifest.targets.len(),
        manifest.toolchains.len()
    );
    Ok(true)
}

// The manifest is the boundary to the downstream executor: a list of all
// resolved targets with their flattened configuration, the toolchain tool
// tables, and the file set whose changes invalidate the generation.

#[derive(Serialize)]
struct Manifest {
    default_toolchain: Option<String>,
    targets: Vec<TargetSummary>,
    toolchains: Vec<ToolchainSummary>,
    gen_dependencies: Vec<String>,
}

#[derive(Serialize)]
struct TargetSummary {
    label: String,
    #[serde(rename = "type")]
    output_type: &'static str,
    resolved: bool,
    sources: Vec<String>,
    data: Vec<String>,
    deps: Vec<String>,
    data_deps: Vec<String>,
    configs: Vec<String>,
    all_dependent_configs: Vec<String>,
    direct_dependent_configs: Vec<String>,
    inherited_libraries: Vec<String>,
    /// The target's own values plus the values of every attached config,
    /// in config order.
    flattened: ConfigValuesSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<ScriptSummary>,
    #[serde(skip_serializing_if = "String::is_empty")]
    dest_dir: String,
}

#[derive(Serialize)]
struct ScriptSummary {
    script: String,
    args: Vec<String>,
    outputs: Vec<String>,
}

#[derive(Serialize)]
struct ConfigValuesSummary {
    includes: Vec<String>,
    defines: Vec<String>,
    cflags: Vec<String>,
    cflags_c: Vec<String>,
    cflags_cc: Vec<String>,
    cflags_objc: Vec<String>,
    cflags_objcc: Vec<String>,
    ldflags: Vec<String>,
}

impl From<&ConfigValues> for ConfigValuesSummary {
    fn from(v: &ConfigValues) -> Self {
        Self {
            includes: v.includes.iter().map(|d| d.value().to_string()).collect(),
            defines: v.defines.clone(),
            cflags: v.cflags.clone(),
            cflags_c: v.cflags_c.clone(),
            cflags_cc: v.cflags_cc.clone(),
            cflags_objc: v.cflags_objc.clone(),
            cflags_objcc: v.cflags_objcc.clone(),
            ldflags: v.ldflags.clone(),
        }
    }
}

#[derive(Serialize)]
struct ToolchainSummary {
    label: String,
    tools: HashMap<&'static str, ToolSummary>,
}

#[derive(Serialize)]
struct ToolSummary {
    command: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    depfile: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    deps: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pool: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    restat: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    rspfile: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    rspfile_content: String,
}

fn build_manifest(setup: &Setup) -> Manifest {
    let build_settings = setup.build_settings();
    let tree = build_settings.item_tree();

    let config_values_by_label: HashMap<Label, ConfigValues> = tree
        .snapshot_configs()
        .into_iter()
        .map(|c| (c.label, c.config_values))
        .collect();

    let targets = tree
        .snapshot_targets()
        .into_iter()
        .map(|(target, state)| summarize_target(&target, state, &config_values_by_label))
        .collect();

    let toolchains = tree
        .snapshot_toolchains()
        .into_iter()
        .map(|toolchain| {
            let mut tools = HashMap::new();
            for tool_type in ToolType::ALL {
                let tool = toolchain.tool(tool_type);
                if tool.is_empty() {
                    continue;
                }
                tools.insert(
                    tool_type.name(),
                    ToolSummary {
                        command: tool.command.clone(),
                        depfile: tool.depfile.clone(),
                        deps: tool.deps.clone(),
                        description: tool.description.clone(),
                        pool: tool.pool.clone(),
                        restat: tool.restat.clone(),
                        rspfile: tool.rspfile.clone(),
                        rspfile_content: tool.rspfile_content.clone(),
                    },
                );
            }
            ToolchainSummary {
                label: toolchain.label.user_visible_name(false),
                tools,
            }
        })
        .collect();

    Manifest {
        default_toolchain: toolchain_manager::get_default_toolchain(build_settings)
            .map(|l| l.user_visible_name(false)),
        targets,
        toolchains,
        gen_dependencies: build_settings
            .scheduler()
            .gen_dependencies()
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
    }
}

fn summarize_target(
    target: &Target,
    state: NodeState,
    config_values_by_label: &HashMap<Label, ConfigValues>,
) -> TargetSummary {
    let labels = |v: &[Label]| -> Vec<String> {
        v.iter().map(|l| l.user_visible_name(false)).collect()
    };
    let files = |v: &[crate::core::paths::SourceFile]| -> Vec<String> {
        v.iter().map(|f| f.value().to_string()).collect()
    };

    let mut flattened = target.config_values.clone();
    for config_label in &target.configs {
        if let Some(values) = config_values_by_label.get(config_label) {
            flattened.append(values);
        }
    }

    let script = (target.output_type == OutputType::Custom).then(|| ScriptSummary {
        script: target.script_values.script.value().to_string(),
        args: target.script_values.args.clone(),
        outputs: files(&target.script_values.outputs),
    });

    TargetSummary {
        label: target.label.user_visible_name(true),
        output_type: target.output_type.name(),
        resolved: state == NodeState::Resolved,
        sources: files(&target.sources),
        data: files(&target.data),
        deps: labels(&target.deps),
        data_deps: labels(&target.data_deps),
        configs: labels(&target.configs),
        all_dependent_configs: labels(&target.all_dependent_configs),
        direct_dependent_configs: labels(&target.direct_dependent_configs),
        inherited_libraries: target
            .inherited_libraries
            .iter()
            .map(|l| l.user_visible_name(false))
            .collect(),
        flattened: ConfigValuesSummary::from(&flattened),
        script,
        dest_dir: target.dest_dir.value().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_writes_a_manifest_with_flattened_configs() {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in [
            (".girder", "buildconfig = \"//build/BUILDCONFIG.gird\"\n"),
            (
                "build/BUILDCONFIG.gird",
                "set_default_toolchain(\"//toolchain:gcc\")\n",
            ),
            (
                "toolchain/BUILD.gird",
                "toolchain(\"gcc\") {\n  tool(\"cc\") {\n    command = \"cc {{source}}\"\n  }\n}\n",
            ),
            (
                "BUILD.gird",
                "executable(\"app\") {\n  sources = [ \"a.cc\" ]\n  configs = [ \":cfg\" ]\n}\n\
                 config(\"cfg\") {\n  defines = [ \"FOO\" ]\n}\n",
            ),
        ] {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }

        let args = GenArgs {
            root: Some(dir.path().to_path_buf()),
            verbose: false,
            check_only: false,
        };
        assert!(handle(&args).unwrap());

        let manifest_path = dir.path().join("out/gird").join(MANIFEST_FILE_NAME);
        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manifest_path).unwrap()).unwrap();

        assert_eq!(manifest["default_toolchain"], "//toolchain:gcc");

        let app = manifest["targets"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["label"].as_str().unwrap().contains(":app"))
            .expect("app target in manifest");
        assert_eq!(app["type"], "executable");
        assert_eq!(app["resolved"], true);
        assert_eq!(app["flattened"]["defines"][0], "FOO");
    }

    #[test]
    fn check_only_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in [
            (".girder", "buildconfig = \"//build/BUILDCONFIG.gird\"\n"),
            (
                "build/BUILDCONFIG.gird",
                "set_default_toolchain(\"//toolchain:gcc\")\n",
            ),
            (
                "toolchain/BUILD.gird",
                "toolchain(\"gcc\") {\n  tool(\"cc\") {\n    command = \"cc\"\n  }\n}\n",
            ),
            ("BUILD.gird", "group(\"g\") {\n}\n"),
        ] {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }

        let args = GenArgs {
            root: Some(dir.path().to_path_buf()),
            verbose: false,
            check_only: true,
        };
        assert!(handle(&args).unwrap());
        assert!(!dir.path().join("out/gird").join(MANIFEST_FILE_NAME).exists());
    }
}
