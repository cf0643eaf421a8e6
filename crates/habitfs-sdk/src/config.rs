use habitfs_cache::CacheConfig;
use habitfs_index::IndexConfig;
use habitfs_sync::NotifierConfig;
use habitfs_tree::CopyConfig;
use habitfs_types::DeviceId;

/// Configuration for a [`crate::FolderStore`].
///
/// Everything is injected at construction; there is no global state. The
/// defaults suit a single-process embedding.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Identity of this session/device.
    pub device: DeviceId,
    /// Layered cache parameters.
    pub cache: CacheConfig,
    /// Path index lease.
    pub index: IndexConfig,
    /// Copy retry/backoff bounds.
    pub copy: CopyConfig,
    /// Invalidation broadcast parameters.
    pub notifier: NotifierConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            device: DeviceId::new(),
            cache: CacheConfig::default(),
            index: IndexConfig::default(),
            copy: CopyConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}
