// src/core/setup.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use log::debug;

use crate::constants::{DEFAULT_BUILD_DIR, DOT_FILE_NAME, ROOT_BUILD_FILE};
use crate::core::build_settings::BuildSettings;
use crate::core::input_file_manager::InputFileManager;
use crate::core::label::Label;
use crate::core::parse_tree;
use crate::core::parser;
use crate::core::paths::{SourceDir, SourceFile};
use crate::core::scheduler::Scheduler;
use crate::core::scope::Scope;
use crate::core::settings::Settings;
use crate::core::tokenizer;
use crate::core::toolchain_manager;

/// Everything needed to start a load: the located source root, the
/// evaluated dotfile, and the fully-populated build settings.
#[derive(Debug)]
pub struct Setup {
    build_settings: Arc<BuildSettings>,
}

impl Setup {
    /// Locates the source root (walking up from the current directory
    /// unless one is given), evaluates the dotfile, and builds the shared
    /// machinery.
    pub fn new(explicit_root: Option<&Path>, verbose: bool) -> Result<Self> {
        let (root_path, dotfile_path) = match explicit_root {
            Some(root) => {
                let root = dunce::canonicalize(root)
                    .with_context(|| format!("invalid --root path: {}", root.display()))?;
                let dotfile = root.join(DOT_FILE_NAME);
                (root, dotfile)
            }
            None => {
                let cwd = std::env::current_dir().context("can't get the current directory")?;
                let dotfile = find_dot_file(&cwd).ok_or_else(|| {
                    anyhow!(
                        "Can't find source root: no \"{DOT_FILE_NAME}\" file in the current \
                         directory or any parent,\nand --root was not given."
                    )
                })?;
                let root = dotfile
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                (root, dotfile)
            }
        };
        debug!("using source root {}", root_path.display());

        let scheduler = Arc::new(Scheduler::new(verbose));
        let input_file_manager = Arc::new(InputFileManager::new());
        if verbose {
            scheduler.log("Using source root", root_path.display().to_string());
        }

        let dotfile = DotfileValues::evaluate(
            &dotfile_path,
            &root_path,
            &scheduler,
            &input_file_manager,
        )?;

        let secondary_source_path = dotfile
            .secondary_source
            .as_ref()
            .map(|dir| dir.resolve(&root_path));

        let build_settings = BuildSettings::new(
            root_path,
            secondary_source_path,
            default_interpreter_path(),
            dotfile.build_config_file,
            SourceDir::new(DEFAULT_BUILD_DIR),
            scheduler,
            input_file_manager,
        );
        Ok(Self { build_settings })
    }

    pub fn build_settings(&self) -> &Arc<BuildSettings> {
        &self.build_settings
    }

    /// Loads the root build file and blocks until the whole graph settles.
    /// Errors are rendered as they were latched; returns whether the run
    /// was clean.
    pub fn run(&self) -> bool {
        toolchain_manager::start_loading(&self.build_settings, SourceFile::new(ROOT_BUILD_FILE));

        let scheduler = self.build_settings.scheduler();
        let clean = scheduler.run();
        if !clean {
            if let Some(err) = scheduler.take_failure() {
                err.print(&**self.build_settings.input_file_manager());
            }
            return false;
        }

        if let Some(err) = self.build_settings.item_tree().check_for_bad_items() {
            err.print(&**self.build_settings.input_file_manager());
            return false;
        }
        true
    }
}

/// The dotfile's recognised variables.
#[derive(Debug)]
struct DotfileValues {
    build_config_file: SourceFile,
    secondary_source: Option<SourceDir>,
}

impl DotfileValues {
    /// The dotfile is evaluated like a build file, against throwaway
    /// settings that exist only to host its scope.
    fn evaluate(
        dotfile_path: &Path,
        root_path: &Path,
        scheduler: &Arc<Scheduler>,
        input_file_manager: &Arc<InputFileManager>,
    ) -> Result<Self> {
        let contents = std::fs::read_to_string(dotfile_path).with_context(|| {
            format!("could not load the dotfile \"{}\"", dotfile_path.display())
        })?;
        let file_id =
            input_file_manager.intern_synthetic(format!("//{DOT_FILE_NAME}"), contents.clone());

        let scratch_settings = BuildSettings::new(
            root_path.to_path_buf(),
            None,
            default_interpreter_path(),
            SourceFile::default(),
            SourceDir::new(DEFAULT_BUILD_DIR),
            scheduler.clone(),
            input_file_manager.clone(),
        );
        let dotfile_settings = Settings::new(&scratch_settings, Label::default(), "");

        let render = |e: crate::core::err::BuildError| anyhow!(e.render(&**input_file_manager));

        let root = tokenizer::tokenize(file_id, &contents)
            .and_then(parser::parse)
            .map_err(render)?;

        let mut scope = Scope::new(dotfile_settings);
        parse_tree::execute_block_in_scope(&root, &mut scope).map_err(render)?;

        let build_config_value = scope
            .get_value("buildconfig", true)
            .ok_or_else(|| {
                anyhow!(
                    "No build config file. Your \"{DOT_FILE_NAME}\" must set \"buildconfig\" \
                     to the label of the build\nconfiguration file."
                )
            })?;
        let build_config = build_config_value
            .require_string()
            .map_err(render)?
            .to_string();

        let secondary_source = match scope.get_value("secondary_source", true) {
            Some(value) => Some(SourceDir::new(
                value.require_string().map_err(render)?.to_string(),
            )),
            None => None,
        };

        Ok(Self {
            build_config_file: SourceFile::new(build_config),
            secondary_source,
        })
    }
}

fn find_dot_file(current_dir: &Path) -> Option<PathBuf> {
    let candidate = current_dir.join(DOT_FILE_NAME);
    if candidate.exists() {
        return Some(candidate);
    }
    find_dot_file(current_dir.parent()?)
}

fn default_interpreter_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("python")
    } else {
        PathBuf::from("python3")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::item_tree::NodeState;
    use crate::core::target::{OutputType, Target};

    /// The minimal working scaffold: a dotfile, a build config naming the
    /// default toolchain, and the toolchain definition itself.
    const SCAFFOLD: &[(&str, &str)] = &[
        (".girder", "buildconfig = \"//build/BUILDCONFIG.gird\"\n"),
        (
            "build/BUILDCONFIG.gird",
            "set_default_toolchain(\"//toolchain:gcc\")\n",
        ),
        (
            "toolchain/BUILD.gird",
            "toolchain(\"gcc\") {\n  tool(\"cc\") {\n    command = \"cc {{source}}\"\n  }\n}\n",
        ),
    ];

    fn write_tree(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in SCAFFOLD.iter().chain(files) {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    fn run_build(files: &[(&str, &str)]) -> (tempfile::TempDir, Setup, bool) {
        let dir = write_tree(files);
        let setup = Setup::new(Some(dir.path()), false).expect("setup");
        let clean = setup.run();
        (dir, setup, clean)
    }

    fn find_target<'t>(
        targets: &'t [(Target, NodeState)],
        name: &str,
    ) -> &'t (Target, NodeState) {
        targets
            .iter()
            .find(|(t, _)| t.label.name() == name)
            .unwrap_or_else(|| panic!("target {name} not found"))
    }

    #[test]
    fn simple_target_and_config() {
        let (_dir, setup, clean) = run_build(&[(
            "BUILD.gird",
            "executable(\"app\") {\n  sources = [ \"a.cc\" ]\n  configs = [ \":cfg\" ]\n}\n\
             config(\"cfg\") {\n  defines = [ \"FOO\" ]\n}\n",
        )]);
        assert!(clean);

        let targets = setup.build_settings().item_tree().snapshot_targets();
        let (app, state) = find_target(&targets, "app");
        assert_eq!(*state, NodeState::Resolved);
        assert_eq!(app.output_type, OutputType::Executable);
        assert_eq!(app.sources.len(), 1);
        assert_eq!(app.sources[0].value(), "//a.cc");
        assert_eq!(app.configs.len(), 1);
        assert_eq!(app.configs[0].user_visible_name(false), "//:cfg");

        // The config's values are available for flattening.
        let configs = setup.build_settings().item_tree().snapshot_configs();
        let cfg = configs
            .iter()
            .find(|c| c.label.name() == "cfg")
            .expect("config defined");
        assert_eq!(cfg.config_values.defines, vec!["FOO"]);
    }

    #[test]
    fn all_dependent_configs_propagate_up_the_chain() {
        let (_dir, setup, clean) = run_build(&[(
            "BUILD.gird",
            "executable(\"a\") {\n  deps = [ \":b\" ]\n}\n\
             static_library(\"b\") {\n  deps = [ \":c\" ]\n}\n\
             static_library(\"c\") {\n  all_dependent_configs = [ \":x\" ]\n}\n\
             config(\"x\") {\n  defines = [ \"X\" ]\n}\n",
        )]);
        assert!(clean);

        let targets = setup.build_settings().item_tree().snapshot_targets();
        let x_name = "//:x";
        let (a, _) = find_target(&targets, "a");
        let (b, _) = find_target(&targets, "b");
        let (c, _) = find_target(&targets, "c");

        let has_x = |t: &Target| {
            t.configs
                .iter()
                .any(|l| l.user_visible_name(false) == x_name)
        };
        assert!(has_x(a));
        assert!(has_x(b));
        assert!(!has_x(c));
    }

    #[test]
    fn shared_libraries_encapsulate_inherited_libraries() {
        let (_dir, setup, clean) = run_build(&[(
            "BUILD.gird",
            "static_library(\"base\") {\n}\n\
             static_library(\"util\") {\n}\n\
             shared_library(\"shim\") {\n  deps = [ \":base\", \":util\" ]\n}\n\
             executable(\"app\") {\n  deps = [ \":shim\" ]\n}\n",
        )]);
        assert!(clean);

        let targets = setup.build_settings().item_tree().snapshot_targets();
        let names = |t: &Target| -> Vec<String> {
            t.inherited_libraries
                .iter()
                .map(|l| l.name().to_string())
                .collect()
        };

        let (shim, _) = find_target(&targets, "shim");
        assert_eq!(names(shim), vec!["base", "util"]);

        let (app, _) = find_target(&targets, "app");
        assert_eq!(names(app), vec!["shim"]);
    }

    #[test]
    fn dependency_cycles_are_reported_with_their_path() {
        let (_dir, setup, clean) = run_build(&[(
            "BUILD.gird",
            "executable(\"a\") {\n  deps = [ \":b\" ]\n}\n\
             static_library(\"b\") {\n  deps = [ \":c\" ]\n}\n\
             static_library(\"c\") {\n  deps = [ \":a\" ]\n}\n",
        )]);
        assert!(!clean);

        let err = setup
            .build_settings()
            .item_tree()
            .check_for_bad_items()
            .expect("cycle should be detected");
        assert!(err.help.contains("dependency cycle"));
        for label in ["//:a", "//:b", "//:c"] {
            assert!(err.help.contains(label), "missing {label} in:\n{}", err.help);
        }

        // Nothing in the cycle resolved.
        let targets = setup.build_settings().item_tree().snapshot_targets();
        for name in ["a", "b", "c"] {
            assert_ne!(find_target(&targets, name).1, NodeState::Resolved);
        }
    }

    #[test]
    fn unused_variable_in_a_block_is_an_error() {
        let (_dir, setup, clean) = run_build(&[(
            "BUILD.gird",
            "group(\"g\") {\n}\n{\n  x = 1\n}\n",
        )]);
        // The failure is latched during the run; the message was printed
        // already so only the flag is observable here.
        assert!(!clean);
        let _ = setup;
    }

    #[test]
    fn sources_assignment_filter_drops_matching_files() {
        let (_dir, setup, clean) = run_build(&[(
            "BUILD.gird",
            "set_sources_assignment_filter([ \"*_win.cc\" ])\n\
             executable(\"app\") {\n  sources = [ \"a.cc\", \"a_win.cc\", \"b.cc\" ]\n}\n",
        )]);
        assert!(clean);

        let targets = setup.build_settings().item_tree().snapshot_targets();
        let (app, _) = find_target(&targets, "app");
        let sources: Vec<&str> = app.sources.iter().map(|s| s.value()).collect();
        assert_eq!(sources, vec!["//a.cc", "//b.cc"]);
    }

    #[test]
    fn template_expansion_generates_both_targets() {
        let (_dir, setup, clean) = run_build(&[(
            "BUILD.gird",
            "template(\"my_idl\") {\n\
             \x20 custom(\"${target_name}_code_gen\") {\n\
             \x20   script = \"//gen.py\"\n\
             \x20   outputs = process_file_template(\n\
             \x20       sources,\n\
             \x20       [ \"$relative_target_gen_dir/{{source_name_part}}.cc\" ])\n\
             \x20 }\n\
             \x20 static_library(target_name) {\n\
             \x20   gen_sources = process_file_template(\n\
             \x20       sources,\n\
             \x20       [ \"$relative_target_gen_dir/{{source_name_part}}.cc\" ])\n\
             \x20   sources = []\n\
             \x20   sources += gen_sources\n\
             \x20   deps = [ \":${target_name}_code_gen\" ]\n\
             \x20 }\n\
             }\n\
             my_idl(\"foo\") {\n  sources = [ \"x.idl\" ]\n}\n",
        )]);
        assert!(clean);

        let targets = setup.build_settings().item_tree().snapshot_targets();
        let (code_gen, state) = find_target(&targets, "foo_code_gen");
        assert_eq!(*state, NodeState::Resolved);
        assert_eq!(code_gen.output_type, OutputType::Custom);
        assert_eq!(code_gen.script_values.outputs.len(), 1);
        assert_eq!(
            code_gen.script_values.outputs[0].value(),
            "//out/gird/gen/x.cc"
        );

        let (lib, state) = find_target(&targets, "foo");
        assert_eq!(*state, NodeState::Resolved);
        assert_eq!(lib.output_type, OutputType::StaticLibrary);
        assert_eq!(lib.sources.len(), 1);
        assert_eq!(lib.sources[0].value(), "//out/gird/gen/x.cc");
    }

    #[test]
    fn imports_are_parsed_once_and_shared() {
        let (_dir, setup, clean) = run_build(&[
            (
                "BUILD.gird",
                "group(\"all\") {\n  deps = [ \"//foo\", \"//bar\" ]\n}\n",
            ),
            ("common.gi", "common_define = \"SHARED\"\n"),
            (
                "foo/BUILD.gird",
                "import(\"//common.gi\")\nstatic_library(\"foo\") {\n  defines = [ common_define ]\n}\n",
            ),
            (
                "bar/BUILD.gird",
                "import(\"//common.gi\")\nstatic_library(\"bar\") {\n  defines = [ common_define ]\n}\n",
            ),
        ]);
        assert!(clean);

        let targets = setup.build_settings().item_tree().snapshot_targets();
        for name in ["foo", "bar"] {
            let (t, state) = find_target(&targets, name);
            assert_eq!(*state, NodeState::Resolved);
            assert_eq!(t.config_values.defines, vec!["SHARED"]);
        }

        // One parse of common.gi despite two importers: the file cache
        // counts each file once.
        let labels: Vec<String> = (0u32..)
            .map_while(|i| {
                use crate::core::err::SourceAccess as _;
                setup
                    .build_settings()
                    .input_file_manager()
                    .file_label(crate::core::location::FileId(i))
            })
            .collect();
        assert_eq!(
            labels.iter().filter(|l| l.as_str() == "//common.gi").count(),
            1
        );
    }

    #[test]
    fn missing_default_toolchain_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in [
            (".girder", "buildconfig = \"//build/BUILDCONFIG.gird\"\n"),
            ("build/BUILDCONFIG.gird", "unused_setting = 1\n"),
            ("BUILD.gird", "group(\"g\") {\n}\n"),
        ] {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }

        let setup = Setup::new(Some(dir.path()), false).unwrap();
        assert!(!setup.run());
    }

    #[test]
    fn dotfile_must_name_a_build_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".girder"), "x = 1\n").unwrap();
        assert!(Setup::new(Some(dir.path()), false).is_err());
    }

    #[test]
    fn default_toolchain_is_recorded() {
        let (_dir, setup, clean) = run_build(&[("BUILD.gird", "group(\"g\") {\n}\n")]);
        assert!(clean);
        let default = toolchain_manager::get_default_toolchain(setup.build_settings()).unwrap();
        assert_eq!(default.user_visible_name(false), "//toolchain:gcc");

        // The toolchain definition itself was loaded and captured.
        let toolchains = setup.build_settings().item_tree().snapshot_toolchains();
        assert!(
            toolchains
                .iter()
                .any(|t| t.label.user_visible_name(false) == "//toolchain:gcc"
                    && !t.tool(crate::core::toolchain::ToolType::Cc).command.is_empty())
        );
    }

    #[test]
    fn duplicate_target_definitions_fail() {
        let (_dir, _setup, clean) = run_build(&[(
            "BUILD.gird",
            "group(\"dup\") {\n}\ngroup(\"dup\") {\n}\n",
        )]);
        assert!(!clean);
    }

    #[test]
    fn gen_dependencies_accumulate_read_files() {
        let (_dir, setup, clean) = run_build(&[
            (
                "BUILD.gird",
                "lines = read_file(\"data.txt\", \"list lines\")\n\
                 group(\"g\") {\n}\n\
                 assert(lines == [ \"one\", \"two\" ])\n",
            ),
            ("data.txt", "one\ntwo\n"),
        ]);
        assert!(clean);

        let gen_deps = setup.build_settings().scheduler().gen_dependencies();
        assert!(
            gen_deps
                .iter()
                .any(|p| p.to_string_lossy().ends_with("data.txt"))
        );
    }

    #[test]
    fn unused_variable_in_dotfile_is_tolerated() {
        let dir = write_tree(&[("BUILD.gird", "group(\"g\") {\n}\n")]);
        std::fs::write(
            dir.path().join(".girder"),
            "buildconfig = \"//build/BUILDCONFIG.gird\"\nextra = 1\n",
        )
        .unwrap();
        let setup = Setup::new(Some(dir.path()), false).unwrap();
        assert!(setup.run());
    }
}
