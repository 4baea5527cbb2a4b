//! Process-wide layer state: handle tables, atom tables and the connection
//! to the main process.

use crate::chain::SystemGetInfo;
use crate::downchain::{dispatch, Downchain};
use crate::error::{LayerError, Result};
use crate::handles::{
    ActionExtra, ActionInfo, ActionSetExtra, ActionSetInfo, DebugMessengerExtra, DebugMessengerInfo,
    HandleExtra, HandleKind, HandleTable, InstanceExtra, InstanceInfo, LocalHandleAllocator,
    SessionExtra, SessionInfo, SpaceExtra, SpaceInfo, SwapchainExtra, SwapchainInfo, Teardown,
};
use crate::main_as_overlay::MainHost;
use crate::sync::{lock, set_synchronize_every_call};
use crate::types::{
    ActionHandle, ActionSetHandle, DebugUtilsMessengerHandle, InstanceHandle, Path, SessionHandle,
    SpaceHandle, SwapchainHandle, SystemId, XrResult,
};
use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use xrov_config::{log_handle_warn, log_layer_debug, Config};
use xrov_ipc::{Endpoint, TransportError};

/// One table per handle kind.
#[derive(Default)]
pub struct HandleTables {
    pub instances: HandleTable<InstanceHandle, InstanceExtra>,
    pub sessions: HandleTable<SessionHandle, SessionExtra>,
    pub swapchains: HandleTable<SwapchainHandle, SwapchainExtra>,
    pub spaces: HandleTable<SpaceHandle, SpaceExtra>,
    pub action_sets: HandleTable<ActionSetHandle, ActionSetExtra>,
    pub actions: HandleTable<ActionHandle, ActionExtra>,
    pub messengers: HandleTable<DebugUtilsMessengerHandle, DebugMessengerExtra>,
}

/// Values the runtime handed out for strings and systems.
#[derive(Default)]
pub struct AtomTables {
    paths: Mutex<HashMap<Path, String>>,
    systems: Mutex<HashMap<SystemId, SystemGetInfo>>,
}

impl AtomTables {
    pub fn record_path(&self, path: Path, string: String) {
        lock(&self.paths).insert(path, string);
    }

    pub fn path_string(&self, path: Path) -> Option<String> {
        lock(&self.paths).get(&path).cloned()
    }

    pub fn record_system(&self, system: SystemId, info: SystemGetInfo) {
        lock(&self.systems).insert(system, info);
    }

    /// The `SystemGetInfo` that produced `system`.
    pub fn system_info(&self, system: SystemId) -> Option<SystemGetInfo> {
        lock(&self.systems).get(&system).cloned()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerOptions {
    pub shmem_size: usize,
    pub response_timeout: Option<Duration>,
    pub max_queued_events_per_overlay: usize,
    pub max_overlay_layers: usize,
    pub synchronize_every_call: bool,
    pub shmem_dir: PathBuf,
}

impl LayerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            shmem_size: config.rpc.shmem_size,
            response_timeout: config.rpc.response_timeout(),
            max_queued_events_per_overlay: config.events.max_queued_events_per_overlay.max(2),
            max_overlay_layers: config.events.max_overlay_layers,
            synchronize_every_call: config.sync.synchronize_every_call,
            shmem_dir: config.rpc.shmem_dir.clone(),
        }
    }

    /// Backing file for the shared region named `name`.
    pub fn connection_path(&self, name: &str) -> PathBuf {
        self.shmem_dir.join(format!("xrov-{name}.shm"))
    }
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything one process knows about the handles passing through it.
///
/// A process hosting the real session keeps its overlay bookkeeping in
/// [`MainHost`]; an overlay process holds an endpoint to the main process
/// once connected.
pub struct Layer {
    downchain: Arc<dyn Downchain>,
    pub(crate) tables: HandleTables,
    pub(crate) atoms: AtomTables,
    allocator: LocalHandleAllocator,
    pub(crate) options: LayerOptions,
    connection_to_main: Mutex<Option<Arc<Endpoint>>>,
    pub(crate) host: MainHost,
}

impl Layer {
    pub fn new(downchain: Arc<dyn Downchain>, options: LayerOptions) -> Self {
        Self::build(downchain, options, LocalHandleAllocator::for_current_process())
    }

    /// A layer whose local handles carry `namespace`, for running several
    /// simulated processes in one.
    pub fn with_namespace(downchain: Arc<dyn Downchain>, options: LayerOptions, namespace: u64) -> Self {
        Self::build(downchain, options, LocalHandleAllocator::with_namespace(namespace))
    }

    /// A layer configured from the global [`xrov_config::config`].
    pub fn from_config(downchain: Arc<dyn Downchain>) -> Self {
        let config = xrov_config::config().clone();
        xrov_config::logging::init_from_config(&config);
        Self::new(downchain, LayerOptions::from_config(&config))
    }

    fn build(downchain: Arc<dyn Downchain>, options: LayerOptions, allocator: LocalHandleAllocator) -> Self {
        if options.synchronize_every_call {
            set_synchronize_every_call(true);
        }
        log_layer_debug!("Layer initialized", namespace = allocator.namespace());
        Self {
            downchain,
            tables: HandleTables::default(),
            atoms: AtomTables::default(),
            allocator,
            options,
            connection_to_main: Mutex::new(None),
            host: MainHost::new(),
        }
    }

    pub fn tables(&self) -> &HandleTables {
        &self.tables
    }

    pub fn atoms(&self) -> &AtomTables {
        &self.atoms
    }

    pub fn options(&self) -> &LayerOptions {
        &self.options
    }

    pub fn namespace(&self) -> u64 {
        self.allocator.namespace()
    }

    pub(crate) fn downchain(&self) -> &Arc<dyn Downchain> {
        &self.downchain
    }

    pub(crate) fn allocate<K: HandleKind>(&self) -> K {
        self.allocator.allocate()
    }

    /// Route calls on proxied handles through `endpoint`.
    pub fn connect_to_main(&self, endpoint: Endpoint) {
        *lock(&self.connection_to_main) = Some(Arc::new(endpoint));
    }

    /// Drop the connection to the main process and wake its server.
    pub fn disconnect_from_main(&self) {
        if let Some(endpoint) = lock(&self.connection_to_main).take() {
            endpoint.channel().close();
        }
    }

    pub fn is_connected_to_main(&self) -> bool {
        lock(&self.connection_to_main).is_some()
    }

    pub(crate) fn main_endpoint(&self) -> Result<Arc<Endpoint>> {
        lock(&self.connection_to_main)
            .clone()
            .ok_or(LayerError::Transport(TransportError::PeerTerminated))
    }

    // Registration. Each child is recorded in its parent's extra so that
    // destroying the parent can take the children down first.

    pub(crate) fn register_session(&self, instance: &InstanceInfo, info: SessionInfo) -> Result<Arc<SessionInfo>> {
        let entry = self.tables.sessions.add(info.with_parent(instance.local))?;
        lock(&instance.extra.children).sessions.insert(entry.local);
        Ok(entry)
    }

    pub(crate) fn register_swapchain(&self, session: &SessionInfo, info: SwapchainInfo) -> Result<Arc<SwapchainInfo>> {
        let entry = self.tables.swapchains.add(info.with_parent(session.local))?;
        lock(&session.extra.children).swapchains.insert(entry.local);
        Ok(entry)
    }

    pub(crate) fn register_space(&self, session: &SessionInfo, info: SpaceInfo) -> Result<Arc<SpaceInfo>> {
        let entry = self.tables.spaces.add(info.with_parent(session.local))?;
        lock(&session.extra.children).spaces.insert(entry.local);
        Ok(entry)
    }

    pub(crate) fn register_action_set(&self, instance: &InstanceInfo, info: ActionSetInfo) -> Result<Arc<ActionSetInfo>> {
        let entry = self.tables.action_sets.add(info.with_parent(instance.local))?;
        lock(&instance.extra.children).action_sets.insert(entry.local);
        Ok(entry)
    }

    pub(crate) fn register_action(&self, action_set: &ActionSetInfo, info: ActionInfo) -> Result<Arc<ActionInfo>> {
        let entry = self.tables.actions.add(info.with_parent(action_set.local))?;
        lock(&action_set.extra.actions).insert(entry.local);
        Ok(entry)
    }

    pub(crate) fn register_messenger(&self, instance: &InstanceInfo, info: DebugMessengerInfo) -> Result<Arc<DebugMessengerInfo>> {
        let entry = self.tables.messengers.add(info.with_parent(instance.local))?;
        lock(&instance.extra.children).messengers.insert(entry.local);
        Ok(entry)
    }

    // Retirement: destroy the runtime object (where this process owns it),
    // invalidate the entry and unregister it from its table and parent.
    // Parents walk a snapshot of their children; each child unregisters
    // itself on success, so a failed child stays recorded.

    pub(crate) fn retire_swapchain(&self, local: SwapchainHandle) -> Result<XrResult> {
        let parent = self.tables.swapchains.get(local)?.parent();
        let result = retire_entry(&self.tables.swapchains, local)?;
        if let Some(session) = parent.and_then(|p| self.tables.sessions.get(p).ok()) {
            lock(&session.extra.children).swapchains.remove(&local);
        }
        Ok(result)
    }

    pub(crate) fn retire_space(&self, local: SpaceHandle) -> Result<XrResult> {
        let parent = self.tables.spaces.get(local)?.parent();
        let result = retire_entry(&self.tables.spaces, local)?;
        if let Some(session) = parent.and_then(|p| self.tables.sessions.get(p).ok()) {
            lock(&session.extra.children).spaces.remove(&local);
        }
        Ok(result)
    }

    pub(crate) fn retire_session(&self, local: SessionHandle) -> Result<XrResult> {
        let entry = self.tables.sessions.get(local)?;
        let (swapchains, spaces) = {
            let children = lock(&entry.extra.children);
            (snapshot(&children.swapchains), snapshot(&children.spaces))
        };
        for swapchain in swapchains {
            log_retire_failure(SwapchainHandle::API_NAME, swapchain.0, self.retire_swapchain(swapchain));
        }
        for space in spaces {
            log_retire_failure(SpaceHandle::API_NAME, space.0, self.retire_space(space));
        }

        self.destroy_placeholders(&entry);

        let parent = entry.parent();
        drop(entry);
        let result = retire_entry(&self.tables.sessions, local)?;
        if let Some(instance) = parent.and_then(|p| self.tables.instances.get(p).ok()) {
            lock(&instance.extra.children).sessions.remove(&local);
        }
        self.host.session_retired(local);
        Ok(result)
    }

    pub(crate) fn retire_action(&self, local: ActionHandle) -> Result<XrResult> {
        let parent = self.tables.actions.get(local)?.parent();
        let result = retire_entry(&self.tables.actions, local)?;
        if let Some(action_set) = parent.and_then(|p| self.tables.action_sets.get(p).ok()) {
            lock(&action_set.extra.actions).remove(&local);
        }
        Ok(result)
    }

    pub(crate) fn retire_action_set(&self, local: ActionSetHandle) -> Result<XrResult> {
        let entry = self.tables.action_sets.get(local)?;
        let actions = snapshot(&lock(&entry.extra.actions));
        for action in actions {
            log_retire_failure(ActionHandle::API_NAME, action.0, self.retire_action(action));
        }

        let parent = entry.parent();
        drop(entry);
        let result = retire_entry(&self.tables.action_sets, local)?;
        if let Some(instance) = parent.and_then(|p| self.tables.instances.get(p).ok()) {
            lock(&instance.extra.children).action_sets.remove(&local);
        }
        Ok(result)
    }

    pub(crate) fn retire_messenger(&self, local: DebugUtilsMessengerHandle) -> Result<XrResult> {
        let parent = self.tables.messengers.get(local)?.parent();
        let result = retire_entry(&self.tables.messengers, local)?;
        if let Some(instance) = parent.and_then(|p| self.tables.instances.get(p).ok()) {
            lock(&instance.extra.children).messengers.remove(&local);
        }
        Ok(result)
    }

    pub(crate) fn retire_instance(&self, local: InstanceHandle) -> Result<XrResult> {
        let entry = self.tables.instances.get(local)?;
        let (sessions, action_sets, messengers) = {
            let children = lock(&entry.extra.children);
            (
                snapshot(&children.sessions),
                snapshot(&children.action_sets),
                snapshot(&children.messengers),
            )
        };
        drop(entry);
        for session in sessions {
            log_retire_failure(SessionHandle::API_NAME, session.0, self.retire_session(session));
        }
        for action_set in action_sets {
            log_retire_failure(ActionSetHandle::API_NAME, action_set.0, self.retire_action_set(action_set));
        }
        for messenger in messengers {
            log_retire_failure(
                DebugUtilsMessengerHandle::API_NAME,
                messenger.0,
                self.retire_messenger(messenger),
            );
        }
        retire_entry(&self.tables.instances, local)
    }
}

fn snapshot<K: Copy>(set: &HashSet<K>) -> Vec<K> {
    set.iter().copied().collect()
}

/// Destroy and unregister one entry.
///
/// Virtualized kinds destroy their runtime object from the entry itself;
/// other kinds are destroyed here, and only a successful runtime destroy
/// invalidates the entry.
fn retire_entry<K: HandleKind, X: HandleExtra>(table: &HandleTable<K, X>, local: K) -> Result<XrResult> {
    let entry = table.get(local)?;
    let result = if K::VIRTUALIZED {
        match entry.destroy() {
            Teardown::Performed(result) => result,
            Teardown::AlreadyDestroyed => XrResult::SUCCESS,
        }
    } else {
        let downchain = entry.downchain()?;
        let result = dispatch(&downchain, |d| K::destroy_actual(d, entry.actual));
        if result.failed() {
            return Ok(result);
        }
        entry.destroy();
        result
    };
    drop(entry);
    table.remove(local)?;
    Ok(result)
}

fn log_retire_failure(kind: &'static str, handle: u64, outcome: Result<XrResult>) {
    match outcome {
        Ok(result) if result.failed() => {
            log_handle_warn!("Child destroy failed", kind = kind, handle = handle, result = result.name());
        }
        Err(err) => {
            let error = err.to_string();
            log_handle_warn!("Child destroy failed", kind = kind, handle = handle, error = error.as_str());
        }
        Ok(_) => {}
    }
}

static GLOBAL_LAYER: OnceCell<Arc<Layer>> = OnceCell::new();

/// Install the process's layer. The first install wins; later calls return
/// the layer already installed.
pub fn install(layer: Layer) -> Arc<Layer> {
    GLOBAL_LAYER.get_or_init(|| Arc::new(layer)).clone()
}

/// The installed layer, if any.
pub fn installed() -> Option<Arc<Layer>> {
    GLOBAL_LAYER.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InstanceCreateInfo;
    use crate::testing::FakeRuntime;

    #[test]
    fn test_options_follow_config() {
        let mut config = Config::default();
        config.events.max_queued_events_per_overlay = 4;
        config.sync.synchronize_every_call = false;
        let options = LayerOptions::from_config(&config);
        assert_eq!(options.max_queued_events_per_overlay, 4);
        assert_eq!(options.response_timeout, None);
        assert_eq!(options.shmem_dir, config.rpc.shmem_dir);
    }

    #[test]
    fn test_connection_path_lives_in_shmem_dir() {
        let options = LayerOptions {
            shmem_dir: PathBuf::from("/dev/shm"),
            ..LayerOptions::default()
        };
        assert_eq!(options.connection_path("main"), PathBuf::from("/dev/shm/xrov-main.shm"));
    }

    #[test]
    fn test_non_virtualized_destroy_keeps_entry_on_failure() {
        let runtime = Arc::new(FakeRuntime::new());
        let layer = Layer::with_namespace(runtime.clone(), LayerOptions::default(), 7);
        // Never created in the runtime, so its destroy fails.
        let instance = InstanceHandle(0x55);
        layer
            .tables
            .instances
            .add(crate::handles::HandleInfo::new(
                instance,
                instance,
                runtime.clone(),
                InstanceExtra::new(InstanceCreateInfo::default()),
            ))
            .unwrap();

        let result = layer.retire_instance(instance).unwrap();
        assert_eq!(result, XrResult::ERROR_HANDLE_INVALID);
        assert!(layer.tables.instances.get(instance).is_ok());
    }

    #[test]
    fn test_failed_instance_destroy_keeps_surviving_children() {
        let runtime = Arc::new(FakeRuntime::new());
        let layer = Layer::with_namespace(runtime.clone(), LayerOptions::default(), 7);
        let instance = InstanceHandle(0x55);
        let entry = layer
            .tables
            .instances
            .add(crate::handles::HandleInfo::new(
                instance,
                instance,
                runtime.clone(),
                InstanceExtra::new(InstanceCreateInfo::default()),
            ))
            .unwrap();

        let mut live = ActionSetHandle::NULL;
        runtime.create_action_set(instance, &Default::default(), &mut live);
        let stale = ActionSetHandle(0x66);
        for action_set in [live, stale] {
            let info = crate::handles::HandleInfo::new(
                action_set,
                instance,
                runtime.clone(),
                ActionSetExtra::new(Default::default()),
            );
            layer.register_action_set(&entry, info).unwrap();
        }

        let result = layer.retire_instance(instance).unwrap();
        assert_eq!(result, XrResult::ERROR_HANDLE_INVALID);
        assert!(layer.tables.instances.get(instance).is_ok());
        assert_eq!(layer.tables.action_sets.handles(), vec![stale]);
        let recorded: Vec<_> = lock(&entry.extra.children).action_sets.iter().copied().collect();
        assert_eq!(recorded, vec![stale]);
    }

    #[test]
    fn test_not_connected_is_a_transport_failure() {
        let layer = Layer::with_namespace(Arc::new(FakeRuntime::new()), LayerOptions::default(), 7);
        let err = layer.main_endpoint().err().unwrap();
        assert_eq!(err.to_result(), XrResult::ERROR_INITIALIZATION_FAILED);
    }
}
