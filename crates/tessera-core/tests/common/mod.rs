//! Shared doubles for driving the state machine in integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ffi::c_void;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tessera_core::model::{ALLOCATOR_SYMBOL, AllocatorFn, DEALLOCATOR_SYMBOL, DeallocatorFn, IdentifierInfo};
use tessera_core::{
    AbortReason, BuildExecuteStateMachine, ControlEvent, Diagnostic, ElementId, EngineConfig, Error,
    IdentifierEntry, IdentifierHandle, MachineSignal, Model, ModelStatusSink, ModuleLoader, Operation,
    OperationHandle, ProgramRoot, Result, StartOptions, TracingConsole, TranslationListener,
    TranslationPhase, TranslationRequest, Translator, TranslatorOwnershipArbiter, Value,
};
use tokio::sync::broadcast;

pub fn e(id: u64) -> ElementId {
    ElementId::new(id)
}

pub fn op(handle: u32) -> OperationHandle {
    OperationHandle::new(handle)
}

// Document

/// A document with one operation per child element:
///
/// ```text
/// 1 ─┬─ 2 (op 0, binds x)
///    ├─ 3 (op 1)
///    └─ 4 (op 2, binds x)
/// ```
pub struct DocRoot {
    elements: HashSet<ElementId>,
    operations: Vec<Operation>,
    identifiers: Vec<IdentifierEntry>,
    breakpoints: Mutex<HashSet<ElementId>>,
    displayed: Mutex<HashMap<ElementId, Option<Value>>>,
    diagnostics: Mutex<Vec<(ElementId, Diagnostic)>>,
}

impl DocRoot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            elements: (1..=4).map(e).collect(),
            operations: (0..3)
                .map(|handle| Operation {
                    handle: op(handle),
                    element: e(handle as u64 + 2),
                })
                .collect(),
            identifiers: vec![IdentifierEntry {
                handle: IdentifierHandle::new(0),
                name: "x".to_string(),
                elements: vec![e(2), e(4)],
            }],
            breakpoints: Mutex::default(),
            displayed: Mutex::default(),
            diagnostics: Mutex::default(),
        })
    }

    pub fn set_breakpoint(&self, element: u64) {
        self.breakpoints.lock().unwrap().insert(e(element));
    }

    pub fn displayed(&self, element: u64) -> Option<Option<Value>> {
        self.displayed.lock().unwrap().get(&e(element)).cloned()
    }

    pub fn diagnostics(&self) -> Vec<(ElementId, Diagnostic)> {
        self.diagnostics.lock().unwrap().clone()
    }
}

impl ProgramRoot for DocRoot {
    fn document_path(&self) -> Option<PathBuf> {
        None
    }

    fn contains(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        (element != e(1) && self.contains(element)).then(|| e(1))
    }

    fn has_instruction_breakpoint(&self, element: ElementId) -> bool {
        self.breakpoints.lock().unwrap().contains(&element)
    }

    fn operation_for_element(&self, element: ElementId) -> Option<Operation> {
        self.operations.iter().find(|o| o.element == element).copied()
    }

    fn operation_for_handle(&self, handle: OperationHandle) -> Option<Operation> {
        self.operations.iter().find(|o| o.handle == handle).copied()
    }

    fn identifier_by_handle(&self, handle: IdentifierHandle) -> Option<IdentifierEntry> {
        self.identifiers.iter().find(|i| i.handle == handle).cloned()
    }

    fn identifier_for_element(&self, element: ElementId) -> Option<IdentifierHandle> {
        self.identifiers
            .iter()
            .find(|i| i.elements.contains(&element))
            .map(|i| i.handle)
    }

    fn set_displayed_value(&self, element: ElementId, value: Option<&Value>) {
        self.displayed.lock().unwrap().insert(element, value.cloned());
    }

    fn attach_diagnostic(&self, element: ElementId, diagnostic: Diagnostic) {
        self.diagnostics.lock().unwrap().push((element, diagnostic));
    }
}

pub fn as_root(doc: &Arc<DocRoot>) -> Arc<dyn ProgramRoot> {
    doc.clone()
}

// Translator

/// Translator that holds every request until the test completes it.
#[derive(Default)]
pub struct FakeTranslator {
    pending: Mutex<Option<(TranslationRequest, TranslationListener)>>,
    pub requests: Mutex<Vec<TranslationRequest>>,
    pub aborts: Mutex<usize>,
}

impl FakeTranslator {
    /// Finish the pending translation, writing the module file on success.
    pub fn finish(&self, success: bool) {
        let (request, listener) = self
            .pending
            .lock()
            .unwrap()
            .take()
            .expect("no translation in flight");

        listener.started();
        for phase in [
            TranslationPhase::Translating,
            TranslationPhase::Compiling,
            TranslationPhase::Linking,
        ] {
            listener.phase_started(phase, 1);
        }
        if success {
            std::fs::write(&request.output_path, b"module").unwrap();
        } else {
            listener.error_detected(&Diagnostic::new(Some(e(3)), 101, "undefined name"));
        }
        listener.completed(success);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Translator for FakeTranslator {
    fn translate(&self, request: TranslationRequest, listener: TranslationListener) -> bool {
        self.requests.lock().unwrap().push(request.clone());
        *self.pending.lock().unwrap() = Some((request, listener));
        true
    }

    fn abort(&self) {
        *self.aborts.lock().unwrap() += 1;
        if let Some((_, listener)) = self.pending.lock().unwrap().take() {
            listener.aborted();
        }
    }
}

// Model

/// Everything the scripted model did, shared with the test.
pub struct ModelLog {
    pub calls: Vec<String>,
    pub breakpoints: BTreeSet<u32>,
    pub run_to: Option<OperationHandle>,
    pub start: Option<StartOptions>,
    pub sink: Option<ModelStatusSink>,
    pub values: HashMap<IdentifierHandle, Value>,
    pub live: i32,
    pub position: u32,
    /// Answer start/pause/resume/step/abort with the matching status report.
    pub auto: bool,
}

impl Default for ModelLog {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            breakpoints: BTreeSet::new(),
            run_to: None,
            start: None,
            sink: None,
            values: HashMap::from([(IdentifierHandle::new(0), Value::Integer(42))]),
            live: 0,
            position: 0,
            auto: true,
        }
    }
}

pub type SharedLog = Arc<Mutex<ModelLog>>;

thread_local! {
    static MODEL_LOG: RefCell<SharedLog> = RefCell::new(Arc::default());
}

/// Model whose behaviour is recorded in the calling thread's [`ModelLog`].
pub struct ScriptedModel {
    log: SharedLog,
}

impl ScriptedModel {
    pub fn attach() -> Self {
        let log = MODEL_LOG.with(|log| Arc::clone(&log.borrow()));
        log.lock().unwrap().live += 1;
        Self { log }
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, ModelLog> {
        let mut log = self.log.lock().unwrap();
        log.calls.push(call.to_string());
        log
    }
}

impl Drop for ScriptedModel {
    fn drop(&mut self) {
        self.log.lock().unwrap().live -= 1;
    }
}

impl Model for ScriptedModel {
    fn start(&mut self, options: StartOptions, status: ModelStatusSink) {
        let mut log = self.record("start");
        let paused = options.start_paused;
        log.position = 0;
        log.start = Some(options);
        log.sink = Some(status.clone());

        if log.auto {
            status.started();
            if paused {
                status.paused_at_operation(op(0));
            }
        }
    }

    fn pause(&mut self) {
        let log = self.record("pause");
        if let (true, Some(sink)) = (log.auto, &log.sink) {
            sink.paused_on_user_request(Some(op(1)));
        }
    }

    fn resume(&mut self) -> bool {
        let log = self.record("resume");
        if let (true, Some(sink)) = (log.auto, &log.sink) {
            sink.resumed();
        }
        true
    }

    fn single_step(&mut self) -> bool {
        let mut log = self.record("single_step");
        log.position += 1;
        let position = log.position;
        if let (true, Some(sink)) = (log.auto, &log.sink) {
            sink.resumed();
            sink.paused_at_operation(op(position));
        }
        true
    }

    fn abort(&mut self) {
        let log = self.record("abort");
        if let (true, Some(sink)) = (log.auto, &log.sink) {
            sink.aborted(AbortReason::UserRequest, None);
        }
    }

    fn set_break_at_operation(&mut self, handle: OperationHandle, now_set: bool) -> bool {
        let mut log = self.log.lock().unwrap();
        if handle.as_u32() >= 3 {
            return false;
        }
        if now_set {
            log.breakpoints.insert(handle.as_u32());
        } else {
            log.breakpoints.remove(&handle.as_u32());
        }
        true
    }

    fn set_run_to_location(&mut self, handle: Option<OperationHandle>) -> bool {
        self.log.lock().unwrap().run_to = handle;
        true
    }

    fn number_operation_handles(&self) -> u32 {
        3
    }

    fn number_threads(&self) -> u32 {
        2
    }

    fn identifiers(&self) -> Vec<IdentifierInfo> {
        vec![
            IdentifierInfo {
                handle: IdentifierHandle::new(0),
                name: "x".to_string(),
                is_variable: true,
            },
            IdentifierInfo {
                handle: IdentifierHandle::new(1),
                name: "f".to_string(),
                is_variable: false,
            },
        ]
    }

    fn value(&self, handle: IdentifierHandle) -> Option<Value> {
        self.log.lock().unwrap().values.get(&handle).cloned()
    }

    fn set_value(&mut self, handle: IdentifierHandle, value: &Value) -> bool {
        if handle != IdentifierHandle::new(0) {
            return false;
        }
        self.log.lock().unwrap().values.insert(handle, value.clone());
        true
    }
}

tessera_core::export_model!(ScriptedModel::attach());

// Loader

/// Loader that accepts any existing file and resolves the test's model entry points.
#[derive(Default)]
pub struct TestLoader {
    loaded: Option<PathBuf>,
}

impl ModuleLoader for TestLoader {
    fn load(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(Error::Io(io::Error::new(io::ErrorKind::NotFound, "no module file")));
        }
        self.loaded = Some(path.to_path_buf());
        Ok(())
    }

    fn resolve(&self, symbol: &str) -> Result<*const c_void> {
        if self.loaded.is_none() {
            return Err(Error::ModuleNotLoaded);
        }
        match symbol {
            ALLOCATOR_SYMBOL => Ok(tessera_allocate_model as AllocatorFn as *const c_void),
            DEALLOCATOR_SYMBOL => Ok(tessera_deallocate_model as DeallocatorFn as *const c_void),
            other => Err(Error::MissingSymbol(other.to_string())),
        }
    }

    fn unload(&mut self) -> Result<()> {
        self.loaded = None;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }
}

// Harness

/// A machine driven synchronously on the test thread.
pub struct Harness {
    pub machine: BuildExecuteStateMachine,
    pub events: Receiver<ControlEvent>,
    pub signals: broadcast::Receiver<MachineSignal>,
    pub translator: Arc<FakeTranslator>,
    pub arbiter: TranslatorOwnershipArbiter,
    pub model: SharedLog,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::default().with_seed(7).with_build_dir(dir.path().join("build"));
        Self::with_config(config, dir)
    }

    pub fn with_config(config: EngineConfig, dir: TempDir) -> Self {
        let model: SharedLog = Arc::default();
        MODEL_LOG.with(|log| *log.borrow_mut() = Arc::clone(&model));

        let translator = Arc::new(FakeTranslator::default());
        let arbiter = TranslatorOwnershipArbiter::new(translator.clone());
        let (machine, events) = BuildExecuteStateMachine::new(
            config,
            arbiter.clone(),
            Box::new(TestLoader::default()),
            Arc::new(TracingConsole),
        );
        let signals = machine.subscribe();

        Self {
            machine,
            events,
            signals,
            translator,
            arbiter,
            model,
            dir,
        }
    }

    /// Process every queued event, including those queued while processing.
    pub fn pump(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.machine.handle(event);
        }
    }

    pub fn finish_translation(&mut self, success: bool) {
        self.pump();
        self.translator.finish(success);
        self.pump();
    }

    /// Signals emitted since the last call.
    pub fn signals(&mut self) -> Vec<MachineSignal> {
        std::iter::from_fn(|| self.signals.try_recv().ok()).collect()
    }

    pub fn sink(&self) -> ModelStatusSink {
        self.model.lock().unwrap().sink.clone().expect("model not started")
    }

    pub fn calls(&self) -> Vec<String> {
        self.model.lock().unwrap().calls.clone()
    }

    pub fn live_models(&self) -> i32 {
        self.model.lock().unwrap().live
    }

    pub fn set_auto(&self, auto: bool) {
        self.model.lock().unwrap().auto = auto;
    }
}
