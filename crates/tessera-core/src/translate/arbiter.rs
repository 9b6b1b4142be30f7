//! Exclusive ownership of the shared translator.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::document::Diagnostic;
use crate::error::{Error, Result};

use super::types::{TranslationPhase, TranslationRequest, Translator, TranslatorClient};

/// Identity of a client registered with the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// When a client wants translation progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// Only while the client owns the translator.
    WhileOwner,
    /// Always, regardless of who owns the translator.
    Always,
}

struct Registration {
    id: ClientId,
    client: Arc<dyn TranslatorClient>,
    policy: NotifyPolicy,
}

#[derive(Default)]
struct ArbiterState {
    owner: Option<ClientId>,
    clients: Vec<Registration>,
}

impl ArbiterState {
    fn is_registered(&self, id: ClientId) -> bool {
        self.clients.iter().any(|r| r.id == id)
    }

    fn all_clients(&self) -> Vec<(ClientId, Arc<dyn TranslatorClient>)> {
        self.clients
            .iter()
            .map(|r| (r.id, Arc::clone(&r.client)))
            .collect()
    }

    /// Clients that receive progress events right now.
    fn progress_recipients(&self) -> Vec<Arc<dyn TranslatorClient>> {
        self.clients
            .iter()
            .filter(|r| r.policy == NotifyPolicy::Always || Some(r.id) == self.owner)
            .map(|r| Arc::clone(&r.client))
            .collect()
    }
}

struct Shared {
    translator: Arc<dyn Translator>,
    state: Mutex<ArbiterState>,
    /// Signalled whenever ownership is given up.
    released: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Brokers exclusive access to one [`Translator`] among many clients.
///
/// Cloning yields another handle onto the same arbiter. Notifications are
/// delivered synchronously, outside the internal lock, on the thread that
/// caused the ownership change. Changes racing on different threads may
/// therefore reach a client out of order (a stale `generator_idle` after
/// `generator_busy`). Clients treat notifications as hints and confirm with
/// [`try_to_own`](Self::try_to_own) or [`owner`](Self::owner).
#[derive(Clone)]
pub struct TranslatorOwnershipArbiter {
    shared: Arc<Shared>,
}

impl TranslatorOwnershipArbiter {
    /// Create an arbiter guarding `translator`.
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            shared: Arc::new(Shared {
                translator,
                state: Mutex::new(ArbiterState::default()),
                released: Condvar::new(),
            }),
        }
    }

    /// Register a potential owner.
    pub fn add_client(&self, client: Arc<dyn TranslatorClient>, policy: NotifyPolicy) -> ClientId {
        let id = ClientId::new();
        self.shared.lock().clients.push(Registration { id, client, policy });
        tracing::debug!("Translator client {} registered ({:?})", id, policy);
        id
    }

    /// Unregister a client.
    ///
    /// If the client owns the translator, the in-flight translation is
    /// aborted and ownership is released.
    pub fn remove_client(&self, id: ClientId) -> bool {
        let mut state = self.shared.lock();
        let Some(index) = state.clients.iter().position(|r| r.id == id) else {
            return false;
        };
        state.clients.remove(index);

        if state.owner != Some(id) {
            drop(state);
            // Wake a blocked wait_for_ownership of the removed client
            self.shared.released.notify_all();
            return true;
        }

        tracing::warn!("Translator owner {} removed while owning; aborting translation", id);
        state.owner = None;
        let recipients = state.all_clients();
        drop(state);

        self.shared.translator.abort();
        self.shared.released.notify_all();
        broadcast_ownership(&recipients, None);
        true
    }

    /// Take ownership if nobody holds it. Never blocks.
    ///
    /// Returns `true` if `id` owns the translator afterwards.
    pub fn try_to_own(&self, id: ClientId) -> bool {
        let mut state = self.shared.lock();
        if !state.is_registered(id) {
            return false;
        }
        match state.owner {
            Some(owner) => owner == id,
            None => {
                state.owner = Some(id);
                let recipients = state.all_clients();
                drop(state);

                tracing::debug!("Translator client {} took ownership", id);
                broadcast_ownership(&recipients, Some(id));
                true
            }
        }
    }

    /// Block until ownership can be granted to `id`.
    ///
    /// # Errors
    /// Returns [`Error::UnknownClient`] if the client is not (or no longer)
    /// registered.
    pub fn wait_for_ownership(&self, id: ClientId) -> Result<()> {
        let mut state = self.shared.lock();
        loop {
            if !state.is_registered(id) {
                return Err(Error::UnknownClient(id.to_string()));
            }
            match state.owner {
                Some(owner) if owner == id => return Ok(()),
                Some(_) => {
                    state = self
                        .shared
                        .released
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                None => break,
            }
        }

        state.owner = Some(id);
        let recipients = state.all_clients();
        drop(state);

        tracing::debug!("Translator client {} acquired ownership after waiting", id);
        broadcast_ownership(&recipients, Some(id));
        Ok(())
    }

    /// Give up ownership. Fails unless `id` is the current owner.
    pub fn release_ownership(&self, id: ClientId) -> bool {
        let mut state = self.shared.lock();
        if state.owner != Some(id) {
            return false;
        }
        state.owner = None;
        let recipients = state.all_clients();
        drop(state);

        tracing::debug!("Translator client {} released ownership", id);
        self.shared.released.notify_all();
        broadcast_ownership(&recipients, None);
        true
    }

    /// Current owner, if any.
    pub fn owner(&self) -> Option<ClientId> {
        self.shared.lock().owner
    }

    pub fn client_count(&self) -> usize {
        self.shared.lock().clients.len()
    }

    /// Start a translation on behalf of the owner.
    ///
    /// Returns the translator's own start result.
    ///
    /// # Errors
    /// Returns [`Error::NotOwner`] unless `id` owns the translator.
    pub fn translate(&self, id: ClientId, request: TranslationRequest) -> Result<bool> {
        if self.owner() != Some(id) {
            return Err(Error::NotOwner(id.to_string()));
        }

        tracing::info!("Translating into {}", request.output_path.display());
        let listener = TranslationListener {
            shared: Arc::clone(&self.shared),
        };
        Ok(self.shared.translator.translate(request, listener))
    }

    /// Abort the translation started by the owner.
    ///
    /// # Errors
    /// Returns [`Error::NotOwner`] unless `id` owns the translator.
    pub fn abort_translation(&self, id: ClientId) -> Result<()> {
        if self.owner() != Some(id) {
            return Err(Error::NotOwner(id.to_string()));
        }
        self.shared.translator.abort();
        Ok(())
    }
}

fn broadcast_ownership(recipients: &[(ClientId, Arc<dyn TranslatorClient>)], owner: Option<ClientId>) {
    for (id, client) in recipients {
        match owner {
            Some(owner) if owner == *id => client.client_owns_generator(),
            Some(_) => client.generator_busy(),
            None => client.generator_idle(),
        }
    }
}

/// Progress sink handed to the [`Translator`] for one translation.
///
/// Events reach the current owner and every [`NotifyPolicy::Always`] client.
#[derive(Clone)]
pub struct TranslationListener {
    shared: Arc<Shared>,
}

impl TranslationListener {
    fn recipients(&self) -> Vec<Arc<dyn TranslatorClient>> {
        self.shared.lock().progress_recipients()
    }

    pub fn started(&self) {
        for client in self.recipients() {
            client.translation_started();
        }
    }

    pub fn phase_started(&self, phase: TranslationPhase, steps: u32) {
        for client in self.recipients() {
            client.translation_phase_started(phase, steps);
        }
    }

    pub fn completed(&self, success: bool) {
        for client in self.recipients() {
            client.translation_completed(success);
        }
    }

    pub fn aborted(&self) {
        for client in self.recipients() {
            client.translation_aborted();
        }
    }

    pub fn error_detected(&self, diagnostic: &Diagnostic) {
        for client in self.recipients() {
            client.translation_error_detected(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use crate::document::{ElementId, IdentifierEntry, IdentifierHandle, Operation, OperationHandle, ProgramRoot};
    use crate::translate::{ExportMode, OutputType};
    use crate::value::Value;

    #[derive(Default)]
    struct RecordingClient {
        events: Mutex<Vec<String>>,
    }

    impl RecordingClient {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        fn push(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }
    }

    impl TranslatorClient for RecordingClient {
        fn client_owns_generator(&self) {
            self.push("owns");
        }
        fn generator_busy(&self) {
            self.push("busy");
        }
        fn generator_idle(&self) {
            self.push("idle");
        }
        fn translation_started(&self) {
            self.push("started");
        }
        fn translation_phase_started(&self, phase: TranslationPhase, steps: u32) {
            self.push(format!("phase:{}:{}", phase, steps));
        }
        fn translation_completed(&self, success: bool) {
            self.push(format!("completed:{}", success));
        }
        fn translation_aborted(&self) {
            self.push("aborted");
        }
        fn translation_error_detected(&self, diagnostic: &Diagnostic) {
            self.push(format!("error:{}", diagnostic.code));
        }
    }

    #[derive(Default)]
    struct StubTranslator {
        listener: Mutex<Option<TranslationListener>>,
        aborts: AtomicUsize,
    }

    impl Translator for StubTranslator {
        fn translate(&self, _request: TranslationRequest, listener: TranslationListener) -> bool {
            listener.started();
            *self.listener.lock().unwrap() = Some(listener);
            true
        }

        fn abort(&self) {
            self.aborts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NullRoot;

    impl ProgramRoot for NullRoot {
        fn document_path(&self) -> Option<PathBuf> {
            None
        }
        fn contains(&self, _element: ElementId) -> bool {
            false
        }
        fn parent(&self, _element: ElementId) -> Option<ElementId> {
            None
        }
        fn has_instruction_breakpoint(&self, _element: ElementId) -> bool {
            false
        }
        fn operation_for_element(&self, _element: ElementId) -> Option<Operation> {
            None
        }
        fn operation_for_handle(&self, _handle: OperationHandle) -> Option<Operation> {
            None
        }
        fn identifier_by_handle(&self, _handle: IdentifierHandle) -> Option<IdentifierEntry> {
            None
        }
        fn identifier_for_element(&self, _element: ElementId) -> Option<IdentifierHandle> {
            None
        }
        fn set_displayed_value(&self, _element: ElementId, _value: Option<&Value>) {}
        fn attach_diagnostic(&self, _element: ElementId, _diagnostic: Diagnostic) {}
    }

    fn request() -> TranslationRequest {
        TranslationRequest {
            root: Arc::new(NullRoot),
            output_path: PathBuf::from("/tmp/libmodel.so"),
            output_type: OutputType::DynamicLibrary,
            export_mode: ExportMode::Debug,
        }
    }

    fn setup() -> (TranslatorOwnershipArbiter, Arc<StubTranslator>) {
        let translator = Arc::new(StubTranslator::default());
        let arbiter = TranslatorOwnershipArbiter::new(translator.clone());
        (arbiter, translator)
    }

    #[test]
    fn test_try_to_own_is_exclusive() {
        let (arbiter, _) = setup();
        let a = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        let b = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);

        assert!(arbiter.try_to_own(a));
        assert!(!arbiter.try_to_own(b));
        assert_eq!(arbiter.owner(), Some(a));

        assert!(!arbiter.release_ownership(b));
        assert!(arbiter.release_ownership(a));
        assert!(arbiter.try_to_own(b));
        assert_eq!(arbiter.owner(), Some(b));
    }

    #[test]
    fn test_try_to_own_by_owner_does_not_rebroadcast() {
        let (arbiter, _) = setup();
        let client = Arc::new(RecordingClient::default());
        let a = arbiter.add_client(client.clone(), NotifyPolicy::WhileOwner);

        assert!(arbiter.try_to_own(a));
        assert_eq!(client.take(), vec!["owns"]);
        assert!(arbiter.try_to_own(a));
        assert!(client.take().is_empty());
    }

    #[test]
    fn test_unregistered_client_cannot_own() {
        let (arbiter, _) = setup();
        let a = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        assert!(arbiter.remove_client(a));
        assert!(!arbiter.try_to_own(a));
        assert!(matches!(arbiter.wait_for_ownership(a), Err(Error::UnknownClient(_))));
    }

    #[test]
    fn test_ownership_change_notifies_every_client_once() {
        let (arbiter, _) = setup();
        let first = Arc::new(RecordingClient::default());
        let second = Arc::new(RecordingClient::default());
        let third = Arc::new(RecordingClient::default());
        let a = arbiter.add_client(first.clone(), NotifyPolicy::WhileOwner);
        arbiter.add_client(second.clone(), NotifyPolicy::WhileOwner);
        arbiter.add_client(third.clone(), NotifyPolicy::Always);

        arbiter.try_to_own(a);
        assert_eq!(first.take(), vec!["owns"]);
        assert_eq!(second.take(), vec!["busy"]);
        assert_eq!(third.take(), vec!["busy"]);

        arbiter.release_ownership(a);
        assert_eq!(first.take(), vec!["idle"]);
        assert_eq!(second.take(), vec!["idle"]);
        assert_eq!(third.take(), vec!["idle"]);
    }

    #[test]
    fn test_progress_reaches_owner_and_always_clients() {
        let (arbiter, translator) = setup();
        let owner = Arc::new(RecordingClient::default());
        let bystander = Arc::new(RecordingClient::default());
        let watcher = Arc::new(RecordingClient::default());
        let a = arbiter.add_client(owner.clone(), NotifyPolicy::WhileOwner);
        arbiter.add_client(bystander.clone(), NotifyPolicy::WhileOwner);
        arbiter.add_client(watcher.clone(), NotifyPolicy::Always);

        arbiter.try_to_own(a);
        owner.take();
        bystander.take();
        watcher.take();

        assert!(arbiter.translate(a, request()).unwrap());
        let listener = translator.listener.lock().unwrap().clone().unwrap();
        listener.phase_started(TranslationPhase::Compiling, 3);
        listener.error_detected(&Diagnostic::new(None, 12, "bad"));
        listener.completed(false);

        let expected = vec!["started", "phase:compiling:3", "error:12", "completed:false"];
        assert_eq!(owner.take(), expected);
        assert_eq!(watcher.take(), expected);
        assert!(bystander.take().is_empty());
    }

    #[test]
    fn test_translate_requires_ownership() {
        let (arbiter, _) = setup();
        let a = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        assert!(matches!(arbiter.translate(a, request()), Err(Error::NotOwner(_))));
        assert!(matches!(arbiter.abort_translation(a), Err(Error::NotOwner(_))));
    }

    #[test]
    fn test_removing_owner_aborts_and_releases() {
        let (arbiter, translator) = setup();
        let other = Arc::new(RecordingClient::default());
        let a = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        arbiter.add_client(other.clone(), NotifyPolicy::WhileOwner);

        arbiter.try_to_own(a);
        arbiter.translate(a, request()).unwrap();
        other.take();

        assert!(arbiter.remove_client(a));
        assert_eq!(translator.aborts.load(Ordering::SeqCst), 1);
        assert_eq!(arbiter.owner(), None);
        assert_eq!(other.take(), vec!["idle"]);
        assert_eq!(arbiter.client_count(), 1);
    }

    #[test]
    fn test_wait_for_ownership_blocks_until_release() {
        let (arbiter, _) = setup();
        let a = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        let b = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        assert!(arbiter.try_to_own(a));

        let waiter = {
            let arbiter = arbiter.clone();
            thread::spawn(move || arbiter.wait_for_ownership(b))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(arbiter.owner(), Some(a));

        arbiter.release_ownership(a);
        waiter.join().unwrap().unwrap();
        assert_eq!(arbiter.owner(), Some(b));
    }

    #[test]
    fn test_wait_for_ownership_fails_when_waiter_removed() {
        let (arbiter, _) = setup();
        let a = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        let b = arbiter.add_client(Arc::new(RecordingClient::default()), NotifyPolicy::WhileOwner);
        arbiter.try_to_own(a);

        let waiter = {
            let arbiter = arbiter.clone();
            thread::spawn(move || arbiter.wait_for_ownership(b))
        };

        thread::sleep(Duration::from_millis(50));
        arbiter.remove_client(b);
        arbiter.release_ownership(a);

        assert!(matches!(waiter.join().unwrap(), Err(Error::UnknownClient(_))));
        assert_eq!(arbiter.owner(), None);
    }
}
