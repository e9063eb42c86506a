// src/core/scope.rs

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::core::err::BuildError;
use crate::core::location::LocationRange;
use crate::core::parse_tree::ParseNode;
use crate::core::pattern::PatternList;
use crate::core::settings::Settings;
use crate::core::value::Value;

const PROCESSING_BUILD_CONFIG_FLAG: u8 = 1;
const PROCESSING_DEFAULT_BUILD_CONFIG_FLAG: u8 = 2;
const PROCESSING_IMPORT_FLAG: u8 = 4;

/// Supplies values for built-in read-only variables, consulted before the
/// value map on every lookup. The per-file provider is the main
/// implementation.
pub trait ProgrammaticProvider {
    fn get_programmatic_value(&self, ident: &str) -> Option<Value>;
}

/// One stored binding. The value's origin is the node of the assignment
/// that produced it, which is what unused-variable errors blame.
#[derive(Debug, Clone)]
pub struct Record {
    pub value: Value,
    pub used: bool,
}

/// The persistable part of one scope level: bindings, templates,
/// target-default sub-scopes and the sources-assignment filter. This is
/// what survives when a scope is frozen (the toolchain base config), cached
/// (imports) or stored (target defaults).
#[derive(Debug, Clone, Default)]
pub struct ScopeData {
    pub values: HashMap<String, Record>,
    pub templates: HashMap<String, Arc<ParseNode>>,
    pub target_defaults: HashMap<String, ScopeData>,
    pub sources_assignment_filter: Option<PatternList>,
}

impl ScopeData {
    pub fn get_value(&self, ident: &str) -> Option<&Value> {
        self.values.get(ident).map(|r| &r.value)
    }

    /// Copies all bindings, templates, target defaults and the sources
    /// filter into the top frame of `dest`. Any name already visible in
    /// `dest`'s chain is a collision error; both definitions are cited.
    /// Merged bindings arrive pre-marked used: the importing scope is not
    /// responsible for consuming everything an import defines.
    pub fn merge_to_scope(
        &self,
        dest: &mut Scope<'_>,
        node_for_err: LocationRange,
        desc_for_err: &str,
    ) -> Result<(), BuildError> {
        for (name, record) in &self.values {
            if let Some(existing) = dest.get_value_no_mark(name) {
                let mut err = BuildError::new(
                    node_for_err,
                    format!("Value collision. This {desc_for_err} contains \"{name}\"."),
                );
                err.append_sub_error(BuildError::new(
                    record.value.origin_range(),
                    "defined here.",
                ));
                err.append_sub_error(BuildError::with_help(
                    existing.origin_range(),
                    "defined here.",
                    format!(
                        "Executing this {desc_for_err} should not conflict with anything \
                         in the current scope."
                    ),
                ));
                return Err(err);
            }
            dest.top_frame_mut().data.values.insert(
                name.clone(),
                Record {
                    value: record.value.clone(),
                    used: true,
                },
            );
        }

        for (type_name, defaults) in &self.target_defaults {
            if dest.get_target_defaults(type_name).is_some() {
                return Err(BuildError::new(
                    node_for_err,
                    format!(
                        "Target defaults collision. This {desc_for_err} contains target \
                         defaults for \"{type_name}\" which would clobber one in your \
                         current scope."
                    ),
                ));
            }
            dest.top_frame_mut()
                .data
                .target_defaults
                .insert(type_name.clone(), defaults.clone());
        }

        if let Some(filter) = &self.sources_assignment_filter {
            if dest.get_sources_assignment_filter().is_some() {
                return Err(BuildError::new(
                    node_for_err,
                    format!(
                        "Assignment filter collision. The {desc_for_err} contains a \
                         sources_assignment_filter which would clobber the one in your \
                         current scope."
                    ),
                ));
            }
            dest.top_frame_mut().data.sources_assignment_filter = Some(filter.clone());
        }

        for (name, decl) in &self.templates {
            if let Some(existing) = dest.get_template(name) {
                let mut err = BuildError::new(
                    node_for_err,
                    format!("Template collision. This {desc_for_err} contains a template \"{name}\"."),
                );
                err.append_sub_error(BuildError::new(decl.range(), "defined here."));
                err.append_sub_error(BuildError::new(existing.range(), "defined here."));
                return Err(err);
            }
            dest.top_frame_mut()
                .data
                .templates
                .insert(name.clone(), decl.clone());
        }

        Ok(())
    }
}

#[derive(Default)]
struct Frame {
    data: ScopeData,
    mode_flags: u8,
    properties: HashMap<TypeId, Rc<dyn Any>>,
    providers: Vec<Box<dyn ProgrammaticProvider>>,
}

/// Scope for script execution.
///
/// Modelled as a stack of frames over an optional shared read-only base
/// (the toolchain's base config). The frames are the mutable containing
/// chain of the original design; the base is the const containing scope.
/// Writing goes into the top frame, reading walks the frames from the top
/// down and then the base. Reads never mark anything used in the base,
/// which is exactly the property that makes it shareable between threads.
pub struct Scope<'a> {
    settings: Arc<Settings>,
    base: Option<&'a ScopeData>,
    frames: Vec<Frame>,
}

impl<'a> Scope<'a> {
    /// An empty toplevel scope with no read-only base.
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            base: None,
            frames: vec![Frame::default()],
        }
    }

    /// A scope whose lookups fall back to a shared base config.
    pub fn with_base(settings: Arc<Settings>, base: &'a ScopeData) -> Self {
        Self {
            settings,
            base: Some(base),
            frames: vec![Frame::default()],
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn has_base(&self) -> bool {
        self.base.is_some()
    }

    // --- Frame management ---

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pops the top frame without the unused-variable check. Used for
    /// scopes whose bindings legitimately outlive the check (imports,
    /// template invocations, the dotfile).
    pub fn pop_frame(&mut self) -> ScopeData {
        debug_assert!(self.frames.len() > 1 || self.base.is_none());
        self.frames.pop().map(|f| f.data).unwrap_or_default()
    }

    /// Pops the top frame, erroring if it holds a binding that was set but
    /// never read.
    pub fn pop_frame_checked(&mut self) -> Result<ScopeData, BuildError> {
        self.check_top_frame_for_unused()?;
        Ok(self.pop_frame())
    }

    /// The unused-variable check for the top frame, without popping it.
    pub fn check_top_frame_for_unused(&self) -> Result<(), BuildError> {
        let frame = self.top_frame();
        let mut names: Vec<&String> = frame.data.values.keys().collect();
        names.sort();
        for name in names {
            let record = &frame.data.values[name];
            if record.used {
                continue;
            }
            let help = format!(
                "You set the variable \"{name}\" here and it was unused before it\n\
                 went out of scope."
            );
            // Blame the left side of the assignment when we can.
            let range = match record.value.origin.as_ref() {
                Some(origin) => match origin.as_binary_op() {
                    Some((left, _, _)) => left.range(),
                    None => origin.range(),
                },
                None => LocationRange::none(),
            };
            return Err(BuildError::with_help(range, "Assignment had no effect.", help));
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Consumes a single-frame scope, yielding its data. Used to freeze the
    /// build config into the shared base.
    pub fn into_root_data(mut self) -> ScopeData {
        debug_assert_eq!(self.frames.len(), 1);
        self.frames.pop().map(|f| f.data).unwrap_or_default()
    }

    fn top_frame(&self) -> &Frame {
        self.frames.last().expect("scope always has a frame")
    }

    fn top_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("scope always has a frame")
    }

    // --- Values ---

    /// Looks a value up through the frame chain and the base. Programmatic
    /// providers are consulted before the value map at each level. When
    /// `counts_as_used` is set, the first matching frame binding is marked
    /// used (base bindings have no used flag to mark).
    pub fn get_value(&mut self, ident: &str, counts_as_used: bool) -> Option<Value> {
        for i in (0..self.frames.len()).rev() {
            if let Some(v) = Self::provider_value(&self.frames[i], ident) {
                return Some(v);
            }
            if let Some(record) = self.frames[i].data.values.get_mut(ident) {
                if counts_as_used {
                    record.used = true;
                }
                return Some(record.value.clone());
            }
        }
        self.base.and_then(|b| b.get_value(ident).cloned())
    }

    /// Chain lookup that never touches used flags.
    pub fn get_value_no_mark(&self, ident: &str) -> Option<&Value> {
        for frame in self.frames.iter().rev() {
            if let Some(record) = frame.data.values.get(ident) {
                return Some(&record.value);
            }
        }
        self.base.and_then(|b| b.get_value(ident))
    }

    fn provider_value(frame: &Frame, ident: &str) -> Option<Value> {
        frame
            .providers
            .iter()
            .find_map(|p| p.get_programmatic_value(ident))
    }

    /// Like `get_value`, but guarantees the returned binding lives in the
    /// top frame, copying it up from an outer level if needed. Used for
    /// read-modify-write (`+=`, `-=`), so the access does not count as a
    /// read.
    pub fn get_value_forced_to_current(&mut self, ident: &str) -> Option<&mut Value> {
        if !self.top_frame().data.values.contains_key(ident) {
            let inherited = self.get_value_no_mark(ident)?.clone();
            self.top_frame_mut().data.values.insert(
                ident.to_string(),
                Record {
                    value: inherited,
                    used: false,
                },
            );
        }
        self.top_frame_mut()
            .data
            .values
            .get_mut(ident)
            .map(|r| &mut r.value)
    }

    /// Writes a binding into the top frame, replacing any existing one
    /// there. The origin node is recorded for blame.
    pub fn set_value(
        &mut self,
        ident: &str,
        mut value: Value,
        origin: Option<Arc<ParseNode>>,
    ) -> &mut Value {
        value.set_origin(origin);
        let record = Record { value, used: false };
        let frame = self.top_frame_mut();
        frame.data.values.insert(ident.to_string(), record);
        &mut frame
            .data
            .values
            .get_mut(ident)
            .expect("just inserted")
            .value
    }

    /// Writes a binding into the root frame (frame 0), keeping the value's
    /// origin. Used by `declare_args` to promote defaults to the enclosing
    /// file scope.
    pub fn set_value_in_root(&mut self, ident: &str, value: Value) {
        self.frames[0]
            .data
            .values
            .insert(ident.to_string(), Record { value, used: false });
    }

    pub fn mark_used(&mut self, ident: &str) {
        if let Some(record) = self.top_frame_mut().data.values.get_mut(ident) {
            record.used = true;
        }
    }

    pub fn mark_unused(&mut self, ident: &str) {
        if let Some(record) = self.top_frame_mut().data.values.get_mut(ident) {
            record.used = false;
        }
    }

    /// Whether the top frame holds this binding and it has not been read.
    /// Only the top frame is consulted: shadowing an outer binding is fine.
    pub fn is_set_but_unused(&self, ident: &str) -> bool {
        self.top_frame()
            .data
            .values
            .get(ident)
            .is_some_and(|r| !r.used)
    }

    /// All bindings of the top frame, for `declare_args` promotion.
    pub fn top_frame_values(&self) -> Vec<(String, Value)> {
        self.top_frame()
            .data
            .values
            .iter()
            .map(|(k, r)| (k.clone(), r.value.clone()))
            .collect()
    }

    // --- Templates ---

    /// Registers a template declaration. Fails (returning false) when a
    /// template with this name is already visible.
    pub fn add_template(&mut self, name: &str, decl: Arc<ParseNode>) -> bool {
        if self.get_template(name).is_some() {
            return false;
        }
        self.top_frame_mut()
            .data
            .templates
            .insert(name.to_string(), decl);
        true
    }

    pub fn get_template(&self, name: &str) -> Option<Arc<ParseNode>> {
        for frame in self.frames.iter().rev() {
            if let Some(t) = frame.data.templates.get(name) {
                return Some(t.clone());
            }
        }
        self.base.and_then(|b| b.templates.get(name).cloned())
    }

    // --- Target defaults ---

    /// Installs defaults for a target type. Fails (returning false) when
    /// defaults for this type are already visible anywhere in the chain.
    pub fn set_target_defaults(&mut self, target_type: &str, defaults: ScopeData) -> bool {
        if self.get_target_defaults(target_type).is_some() {
            return false;
        }
        self.top_frame_mut()
            .data
            .target_defaults
            .insert(target_type.to_string(), defaults);
        true
    }

    pub fn get_target_defaults(&self, target_type: &str) -> Option<&ScopeData> {
        for frame in self.frames.iter().rev() {
            if let Some(d) = frame.data.target_defaults.get(target_type) {
                return Some(d);
            }
        }
        self.base.and_then(|b| b.target_defaults.get(target_type))
    }

    // --- Sources assignment filter ---

    pub fn set_sources_assignment_filter(&mut self, filter: PatternList) {
        self.top_frame_mut().data.sources_assignment_filter = Some(filter);
    }

    /// The nearest filter in the chain; inner scopes shadow outer ones.
    pub fn get_sources_assignment_filter(&self) -> Option<&PatternList> {
        for frame in self.frames.iter().rev() {
            if let Some(f) = &frame.data.sources_assignment_filter {
                return Some(f);
            }
        }
        self.base.and_then(|b| b.sources_assignment_filter.as_ref())
    }

    // --- Mode flags ---
    //
    // Flags are set and cleared in pairs on the same frame; querying walks
    // the whole frame chain.

    pub fn set_processing_build_config(&mut self) {
        debug_assert!(self.top_frame().mode_flags & PROCESSING_BUILD_CONFIG_FLAG == 0);
        self.top_frame_mut().mode_flags |= PROCESSING_BUILD_CONFIG_FLAG;
    }

    pub fn clear_processing_build_config(&mut self) {
        debug_assert!(self.top_frame().mode_flags & PROCESSING_BUILD_CONFIG_FLAG != 0);
        self.top_frame_mut().mode_flags &= !PROCESSING_BUILD_CONFIG_FLAG;
    }

    pub fn is_processing_build_config(&self) -> bool {
        self.frames
            .iter()
            .any(|f| f.mode_flags & PROCESSING_BUILD_CONFIG_FLAG != 0)
    }

    pub fn set_processing_default_build_config(&mut self) {
        debug_assert!(self.top_frame().mode_flags & PROCESSING_DEFAULT_BUILD_CONFIG_FLAG == 0);
        self.top_frame_mut().mode_flags |= PROCESSING_DEFAULT_BUILD_CONFIG_FLAG;
    }

    pub fn clear_processing_default_build_config(&mut self) {
        debug_assert!(self.top_frame().mode_flags & PROCESSING_DEFAULT_BUILD_CONFIG_FLAG != 0);
        self.top_frame_mut().mode_flags &= !PROCESSING_DEFAULT_BUILD_CONFIG_FLAG;
    }

    pub fn is_processing_default_build_config(&self) -> bool {
        self.frames
            .iter()
            .any(|f| f.mode_flags & PROCESSING_DEFAULT_BUILD_CONFIG_FLAG != 0)
    }

    pub fn set_processing_import(&mut self) {
        debug_assert!(self.top_frame().mode_flags & PROCESSING_IMPORT_FLAG == 0);
        self.top_frame_mut().mode_flags |= PROCESSING_IMPORT_FLAG;
    }

    pub fn clear_processing_import(&mut self) {
        debug_assert!(self.top_frame().mode_flags & PROCESSING_IMPORT_FLAG != 0);
        self.top_frame_mut().mode_flags &= !PROCESSING_IMPORT_FLAG;
    }

    pub fn is_processing_import(&self) -> bool {
        self.frames
            .iter()
            .any(|f| f.mode_flags & PROCESSING_IMPORT_FLAG != 0)
    }

    // --- Properties ---
    //
    // Typed replacement for an opaque pointer map: code can hang one value
    // of any type off the current frame and find it from nested frames.

    pub fn set_property<T: Any>(&mut self, value: Rc<T>) {
        self.top_frame_mut()
            .properties
            .insert(TypeId::of::<T>(), value);
    }

    pub fn clear_property<T: Any>(&mut self) {
        self.top_frame_mut().properties.remove(&TypeId::of::<T>());
    }

    pub fn get_property<T: Any>(&self) -> Option<Rc<T>> {
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.properties.get(&TypeId::of::<T>()) {
                return v.clone().downcast::<T>().ok();
            }
        }
        None
    }

    // --- Programmatic providers ---

    pub fn add_provider(&mut self, provider: Box<dyn ProgrammaticProvider>) {
        self.top_frame_mut().providers.push(provider);
    }
}

impl std::fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("frames", &self.frames.len())
            .field("has_base", &self.base.is_some())
            .finish()
    }
}
