//! Lazily-initialized, reloadable handle to a shared model client.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crisisbrief_shared::Result;

/// Builds a model client. Called at most once per load.
pub type Loader<T> = Arc<dyn Fn() -> Result<Arc<T>> + Send + Sync>;

struct HandleState<T: ?Sized> {
    loader: Loader<T>,
    instance: Option<Arc<T>>,
}

/// Owns one model client (generation backend, transcriber) for the pipeline.
///
/// The client is built on first use and then shared read-only. Readers
/// never block each other once it is loaded.
pub struct ModelHandle<T: ?Sized> {
    name: &'static str,
    state: RwLock<HandleState<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> ModelHandle<T> {
    /// A handle that runs `loader` on first [`get`](Self::get).
    pub fn lazy(name: &'static str, loader: Loader<T>) -> Self {
        Self {
            name,
            state: RwLock::new(HandleState {
                loader,
                instance: None,
            }),
        }
    }

    /// A handle that is already loaded with `instance`.
    pub fn ready(name: &'static str, instance: Arc<T>) -> Self {
        let shared = Arc::clone(&instance);
        let loader: Loader<T> = Arc::new(move || -> Result<Arc<T>> { Ok(Arc::clone(&shared)) });
        Self {
            name,
            state: RwLock::new(HandleState {
                loader,
                instance: Some(instance),
            }),
        }
    }

    /// The loaded instance, loading it first if needed.
    pub async fn get(&self) -> Result<Arc<T>> {
        {
            let state = self.state.read().await;
            if let Some(instance) = &state.instance {
                return Ok(Arc::clone(instance));
            }
        }

        let mut state = self.state.write().await;
        // Another caller may have loaded it while we waited for the lock.
        if let Some(instance) = &state.instance {
            return Ok(Arc::clone(instance));
        }
        debug!(handle = self.name, "loading model client");
        let instance = (state.loader)()?;
        state.instance = Some(Arc::clone(&instance));
        info!(handle = self.name, "model client loaded");
        Ok(instance)
    }

    /// Swap in a new loader and the instance it builds, under the writer lock.
    ///
    /// On loader failure the previous loader and instance stay in place.
    pub async fn reinitialize(&self, loader: Loader<T>) -> Result<()> {
        let mut state = self.state.write().await;
        let instance = loader()?;
        state.loader = loader;
        state.instance = Some(instance);
        info!(handle = self.name, "model client reinitialized");
        Ok(())
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.read().await.instance.is_some()
    }
}

impl<T: ?Sized> std::fmt::Debug for ModelHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").field("name", &self.name).finish_non_exhaustive()
    }
}
