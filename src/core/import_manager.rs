// src/core/import_manager.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::err::BuildError;
use crate::core::parse_tree::{self, ParseNode};
use crate::core::paths::SourceFile;
use crate::core::scope::{Scope, ScopeData};
use crate::core::toolchain_manager;

/// Caches the result of executing imported files so each import is run at
/// most once per toolchain, no matter how many files import it. Importers
/// get the cached scope merged into their own.
#[derive(Debug, Default)]
pub struct ImportManager {
    imports: Mutex<HashMap<SourceFile, Arc<ScopeData>>>,
}

impl ImportManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn do_import(
        &self,
        scope: &mut Scope<'_>,
        node_for_err: &Arc<ParseNode>,
        file: &SourceFile,
    ) -> Result<(), BuildError> {
        // Check the cache first; the actual execution happens outside the
        // lock so unrelated imports can proceed in parallel.
        let cached = {
            let imports = self.imports.lock().unwrap();
            imports.get(file).cloned()
        };

        let imported = match cached {
            Some(data) => data,
            None => {
                let data = Arc::new(self.uncached_import(scope, node_for_err, file)?);
                // The file was loaded outside the lock, so another thread
                // may have raced us here. First insert wins; both results
                // are equivalent.
                let mut imports = self.imports.lock().unwrap();
                imports.entry(file.clone()).or_insert(data).clone()
            }
        };

        imported.merge_to_scope(scope, node_for_err.range(), "import")
    }

    /// Executes the imported file in a standalone scope (the caller's
    /// bindings are not visible) and returns the resulting bindings. The
    /// unused-variable check is deferred to the importers via the merge.
    fn uncached_import(
        &self,
        scope: &mut Scope<'_>,
        node_for_err: &Arc<ParseNode>,
        file: &SourceFile,
    ) -> Result<ScopeData, BuildError> {
        let settings = scope.settings().clone();
        let build_settings = settings.build_settings();

        let root = build_settings.input_file_manager().sync_load(
            build_settings.scheduler(),
            &build_settings.file_roots(),
            node_for_err.range(),
            file,
        )?;

        let base = settings.base_config();
        let mut import_scope = match base.as_deref() {
            Some(base_data) => Scope::with_base(settings.clone(), base_data),
            None => {
                // Imports executed while the build config itself is still
                // running have no frozen base yet; seed the system vars so
                // platform checks keep working there.
                let mut s = Scope::new(settings.clone());
                toolchain_manager::set_system_vars(&mut s);
                s
            }
        };

        import_scope.set_processing_import();
        parse_tree::execute_block_in_scope(&root, &mut import_scope)?;
        import_scope.clear_processing_import();

        Ok(import_scope.into_root_data())
    }
}
