// src/core/input_file_manager.rs

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};

use crate::core::err::{BuildError, SourceAccess};
use crate::core::location::{FileId, LocationRange};
use crate::core::parse_tree::ParseNode;
use crate::core::parser;
use crate::core::paths::SourceFile;
use crate::core::scheduler::Scheduler;
use crate::core::tokenizer;

/// Invoked with the parsed root once a file load completes, or with `None`
/// when the load failed (the failure itself is latched in the scheduler's
/// error sink). Callbacks always run, so every work-count increment made
/// for a load has a matching decrement.
pub type FileLoadCallback = Box<dyn FnOnce(Option<Arc<ParseNode>>) + Send>;

/// The OS directories file loads resolve against: the source root plus the
/// optional secondary tree searched when a file is missing from the
/// primary one.
#[derive(Debug, Clone)]
pub struct FileRoots {
    pub primary: PathBuf,
    pub secondary: Option<PathBuf>,
}

struct CompletionEvent {
    done: Mutex<bool>,
    cvar: Condvar,
}

impl CompletionEvent {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cvar.wait(done).unwrap();
        }
    }

    fn signal(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cvar.notify_all();
    }
}

#[derive(Default)]
struct InputFileData {
    /// Whether the first request for this file was synchronous. Mixing
    /// modes on one file is a hard error, see `sync_load`.
    sync_invocation: bool,
    loaded: bool,
    /// Set when loaded and parsing succeeded.
    parsed_root: Option<Arc<ParseNode>>,
    /// Callbacks queued while the load is in flight.
    scheduled_callbacks: Vec<FileLoadCallback>,
    /// Lazily created when a second sync load arrives while the first is
    /// still running.
    completion_event: Option<Arc<CompletionEvent>>,
}

struct FileRecord {
    name: String,
    contents: String,
}

#[derive(Default)]
struct ManagerState {
    files: HashMap<SourceFile, InputFileData>,
    repo: Vec<FileRecord>,
}

/// Caches loaded and parsed input files, serving both async loads (build
/// files discovered through dependencies) and sync loads (imports). Also
/// owns the source repository that diagnostics render from: files stay
/// alive for the whole run, so tokens, AST nodes and errors can refer to
/// them by `FileId` indefinitely.
#[derive(Default)]
pub struct InputFileManager {
    state: Mutex<ManagerState>,
}

impl InputFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers file contents that did not come from disk (the dotfile,
    /// script results parsed as values) so their errors render like any
    /// other file's.
    pub fn intern_synthetic(&self, name: impl Into<String>, contents: impl Into<String>) -> FileId {
        let mut state = self.state.lock().unwrap();
        push_record(&mut state.repo, name.into(), contents.into())
    }

    pub fn input_file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    /// Schedules a background load. If the file is already loaded the
    /// callback is invoked directly on the pool; if a load is in flight the
    /// callback is queued behind it.
    pub fn async_load(
        self: &Arc<Self>,
        scheduler: &Arc<Scheduler>,
        roots: &FileRoots,
        origin: LocationRange,
        file_name: SourceFile,
        callback: FileLoadCallback,
    ) -> Result<(), BuildError> {
        enum Action {
            StartLoad,
            InvokeNow(Option<Arc<ParseNode>>, FileLoadCallback),
        }

        // Don't run callbacks while holding the lock; decide, then act.
        let action = {
            let mut state = self.state.lock().unwrap();
            match state.files.get_mut(&file_name) {
                None => {
                    state.files.insert(file_name.clone(), InputFileData::default());
                    state
                        .files
                        .get_mut(&file_name)
                        .expect("just inserted")
                        .scheduled_callbacks
                        .push(callback);
                    Action::StartLoad
                }
                Some(data) => {
                    if data.sync_invocation {
                        return Err(load_type_mismatch_error(origin, &file_name, true));
                    }
                    if data.loaded {
                        Action::InvokeNow(data.parsed_root.clone(), callback)
                    } else {
                        data.scheduled_callbacks.push(callback);
                        return Ok(());
                    }
                }
            }
        };

        match action {
            Action::StartLoad => {
                let manager = self.clone();
                let scheduler_for_task = scheduler.clone();
                let roots = roots.clone();
                scheduler.pool().spawn(move || {
                    manager.background_load_file(&scheduler_for_task, &roots, origin, &file_name);
                });
            }
            Action::InvokeNow(root, callback) => {
                scheduler.pool().spawn(move || callback(root));
            }
        }
        Ok(())
    }

    /// Loads a file on the calling thread, used by `import`. If the file is
    /// already loading synchronously elsewhere, blocks on its completion
    /// event. A file first seen asynchronously may not be loaded
    /// synchronously (or the other way around): the async queue could be
    /// arbitrarily long behind the waiter, so the dependency shape must be
    /// a property of the file's role, not of timing.
    pub fn sync_load(
        self: &Arc<Self>,
        scheduler: &Arc<Scheduler>,
        roots: &FileRoots,
        origin: LocationRange,
        file_name: &SourceFile,
    ) -> Result<Arc<ParseNode>, BuildError> {
        enum Action {
            LoadHere,
            Wait(Arc<CompletionEvent>),
            Done(Option<Arc<ParseNode>>),
        }

        let action = {
            let mut state = self.state.lock().unwrap();
            match state.files.get_mut(file_name) {
                None => {
                    let data = InputFileData {
                        sync_invocation: true,
                        ..Default::default()
                    };
                    state.files.insert(file_name.clone(), data);
                    Action::LoadHere
                }
                Some(data) => {
                    if !data.sync_invocation {
                        return Err(load_type_mismatch_error(origin, file_name, false));
                    }
                    if data.loaded {
                        Action::Done(data.parsed_root.clone())
                    } else {
                        let event = data
                            .completion_event
                            .get_or_insert_with(|| Arc::new(CompletionEvent::new()))
                            .clone();
                        Action::Wait(event)
                    }
                }
            }
        };

        let root = match action {
            Action::LoadHere => {
                let result = self.load_file(scheduler, roots, origin, file_name);
                match result {
                    Ok(root) => Some(root),
                    Err(e) => {
                        // Completion state is already published by
                        // load_file; surface the error to the importer.
                        return Err(e);
                    }
                }
            }
            Action::Wait(event) => {
                event.wait();
                self.state
                    .lock()
                    .unwrap()
                    .files
                    .get(file_name)
                    .and_then(|d| d.parsed_root.clone())
            }
            Action::Done(root) => root,
        };

        root.ok_or_else(|| {
            // The load that actually ran has already reported the real
            // error; this marker is for the importer's unwind.
            BuildError::new(origin, format!("File parse failed: {}", file_name.value()))
        })
    }

    /// Pool entry point for async loads. Failures are latched and the
    /// queued callbacks still run (with no root).
    fn background_load_file(
        self: &Arc<Self>,
        scheduler: &Arc<Scheduler>,
        roots: &FileRoots,
        origin: LocationRange,
        file_name: &SourceFile,
    ) {
        if let Err(err) = self.load_file(scheduler, roots, origin, file_name) {
            scheduler.fail_with(err);
        }
    }

    /// Reads, tokenizes and parses one file, publishes the result, and runs
    /// any queued callbacks. All I/O and parsing happens outside the lock.
    fn load_file(
        self: &Arc<Self>,
        scheduler: &Arc<Scheduler>,
        roots: &FileRoots,
        origin: LocationRange,
        file_name: &SourceFile,
    ) -> Result<Arc<ParseNode>, BuildError> {
        if scheduler.verbose_logging() {
            scheduler.log("Loading", file_name.value());
        }

        let result = self.read_and_parse(roots, origin, file_name);

        // Publish under the lock, then deliver callbacks outside it.
        let (callbacks, completion) = {
            let mut state = self.state.lock().unwrap();
            let data = state
                .files
                .get_mut(file_name)
                .expect("load was registered before starting");
            data.loaded = true;
            data.parsed_root = result.as_ref().ok().cloned();
            (
                std::mem::take(&mut data.scheduled_callbacks),
                data.completion_event.clone(),
            )
        };

        if let Some(event) = completion {
            event.signal();
        }

        let root_for_callbacks = result.as_ref().ok().cloned();
        for callback in callbacks {
            callback(root_for_callbacks.clone());
        }

        result
    }

    fn read_and_parse(
        self: &Arc<Self>,
        roots: &FileRoots,
        origin: LocationRange,
        file_name: &SourceFile,
    ) -> Result<Arc<ParseNode>, BuildError> {
        let primary_path = file_name.resolve(&roots.primary);
        let contents = match std::fs::read_to_string(&primary_path) {
            Ok(c) => c,
            Err(_) => match &roots.secondary {
                Some(secondary) => {
                    let secondary_path = file_name.resolve(secondary);
                    std::fs::read_to_string(&secondary_path).map_err(|_| {
                        BuildError::with_help(
                            origin,
                            "Can't load input file.",
                            format!(
                                "Unable to load either\n  {}\nor\n  {}",
                                primary_path.display(),
                                secondary_path.display()
                            ),
                        )
                    })?
                }
                None => {
                    return Err(BuildError::new(
                        origin,
                        format!("Unable to load \"{}\".", primary_path.display()),
                    ));
                }
            },
        };

        let file_id = {
            let mut state = self.state.lock().unwrap();
            push_record(&mut state.repo, file_name.value().to_string(), contents)
        };
        let contents = self
            .file_contents(file_id)
            .expect("record was just interned");

        let tokens = tokenizer::tokenize(file_id, &contents)?;
        let root = parser::parse(tokens)?;
        Ok(root)
    }
}

fn push_record(repo: &mut Vec<FileRecord>, name: String, contents: String) -> FileId {
    repo.push(FileRecord { name, contents });
    FileId((repo.len() - 1) as u32)
}

fn load_type_mismatch_error(
    origin: LocationRange,
    file_name: &SourceFile,
    previously_sync: bool,
) -> BuildError {
    let (earlier, now) = if previously_sync {
        ("synchronously (via an import)", "asynchronously (via a deps rule)")
    } else {
        ("asynchronously (via a deps rule)", "synchronously (via an import)")
    };
    BuildError::with_help(
        origin,
        "Load type mismatch.",
        format!(
            "The file \"{}\" was previously loaded\n{earlier} and now you're trying to \
             load it {now}.\nA single input file must be loaded the same way each time \
             so loads can't\ndeadlock behind each other.",
            file_name.value()
        ),
    )
}

impl SourceAccess for InputFileManager {
    fn file_label(&self, id: FileId) -> Option<String> {
        if id.is_none() {
            return None;
        }
        let state = self.state.lock().unwrap();
        state.repo.get(id.0 as usize).map(|r| r.name.clone())
    }

    fn file_contents(&self, id: FileId) -> Option<String> {
        if id.is_none() {
            return None;
        }
        let state = self.state.lock().unwrap();
        state.repo.get(id.0 as usize).map(|r| r.contents.clone())
    }
}

impl std::fmt::Debug for InputFileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputFileManager")
            .field("files", &self.input_file_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn write_tree(files: &[(&str, &str)]) -> (tempfile::TempDir, FileRoots) {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, contents).unwrap();
        }
        let roots = FileRoots {
            primary: dir.path().to_path_buf(),
            secondary: None,
        };
        (dir, roots)
    }

    #[test]
    fn async_load_parses_and_invokes_callback() {
        let (_dir, roots) = write_tree(&[("BUILD.gird", "x = 1\n")]);
        let manager = Arc::new(InputFileManager::new());
        let scheduler = Arc::new(Scheduler::new(false));

        let got = Arc::new(AtomicUsize::new(0));
        let got_clone = got.clone();
        let scheduler_cb = scheduler.clone();
        scheduler.increment_work_count();
        manager
            .async_load(
                &scheduler,
                &roots,
                LocationRange::none(),
                SourceFile::new("//BUILD.gird"),
                Box::new(move |root| {
                    if root.is_some() {
                        got_clone.fetch_add(1, Ordering::SeqCst);
                    }
                    scheduler_cb.decrement_work_count();
                }),
            )
            .unwrap();

        assert!(scheduler.run());
        assert_eq!(got.load(Ordering::SeqCst), 1);
        assert_eq!(manager.input_file_count(), 1);
    }

    #[test]
    fn sync_load_caches_single_parse() {
        let (_dir, roots) = write_tree(&[("common.gi", "y = 2\n")]);
        let manager = Arc::new(InputFileManager::new());
        let scheduler = Arc::new(Scheduler::new(false));
        let name = SourceFile::new("//common.gi");

        let a = manager
            .sync_load(&scheduler, &roots, LocationRange::none(), &name)
            .unwrap();
        let b = manager
            .sync_load(&scheduler, &roots, LocationRange::none(), &name)
            .unwrap();
        // Same parse, shared.
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.input_file_count(), 1);
    }

    #[test]
    fn mixing_sync_and_async_is_an_error() {
        let (_dir, roots) = write_tree(&[("f.gird", "x = 1\n")]);
        let manager = Arc::new(InputFileManager::new());
        let scheduler = Arc::new(Scheduler::new(false));
        let name = SourceFile::new("//f.gird");

        manager
            .sync_load(&scheduler, &roots, LocationRange::none(), &name)
            .unwrap();

        let err = manager
            .async_load(
                &scheduler,
                &roots,
                LocationRange::none(),
                name.clone(),
                Box::new(|_| {}),
            )
            .unwrap_err();
        assert_eq!(err.message, "Load type mismatch.");
    }

    #[test]
    fn missing_file_fails_the_load() {
        let (_dir, roots) = write_tree(&[]);
        let manager = Arc::new(InputFileManager::new());
        let scheduler = Arc::new(Scheduler::new(false));

        let err = manager
            .sync_load(
                &scheduler,
                &roots,
                LocationRange::none(),
                &SourceFile::new("//missing.gi"),
            )
            .unwrap_err();
        assert!(err.message.contains("Unable to load"));
    }

    #[test]
    fn secondary_root_is_searched_after_primary() {
        let primary = tempfile::tempdir().unwrap();
        let secondary = tempfile::tempdir().unwrap();
        std::fs::write(secondary.path().join("only_here.gi"), "z = 3\n").unwrap();

        let roots = FileRoots {
            primary: primary.path().to_path_buf(),
            secondary: Some(secondary.path().to_path_buf()),
        };
        let manager = Arc::new(InputFileManager::new());
        let scheduler = Arc::new(Scheduler::new(false));

        assert!(
            manager
                .sync_load(
                    &scheduler,
                    &roots,
                    LocationRange::none(),
                    &SourceFile::new("//only_here.gi"),
                )
                .is_ok()
        );
    }

    #[test]
    fn parse_error_reports_real_location() {
        let (_dir, roots) = write_tree(&[("bad.gi", "x = [1 2]\n")]);
        let manager = Arc::new(InputFileManager::new());
        let scheduler = Arc::new(Scheduler::new(false));

        let err = manager
            .sync_load(
                &scheduler,
                &roots,
                LocationRange::none(),
                &SourceFile::new("//bad.gi"),
            )
            .unwrap_err();
        assert_eq!(err.range.begin.line, 1);
        assert_eq!(manager.file_label(err.range.begin.file).unwrap(), "//bad.gi");
    }
}
