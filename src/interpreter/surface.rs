//! Call surface loading for interpreter runs.

use crate::bridge::router::CallRouter;
use crate::error::Result;
use crate::facade::FacadeKind;
use crate::output::OutputRelay;
use crate::registry::FacadeRegistry;
use std::sync::Arc;

/// Makes the call surface available to a run before its entry executes.
pub trait SurfaceLoader: Send + Sync {
    /// Returns the router the run talks to. An error aborts the run.
    fn load(&self, role: &str) -> Result<Arc<CallRouter>>;
}

/// Loads the surface from the shared facade registry.
///
/// The preload list is constructed and started eagerly so that the first
/// poll from a script already sees readings; facades already started by an
/// earlier run are left alone.
pub struct RegistrySurfaceLoader {
    router: Arc<CallRouter>,
    preload: Vec<FacadeKind>,
}

impl RegistrySurfaceLoader {
    pub fn new(
        registry: Arc<FacadeRegistry>,
        relay: Arc<OutputRelay>,
        preload: Vec<FacadeKind>,
    ) -> Self {
        Self {
            router: Arc::new(CallRouter::new(registry, relay)),
            preload,
        }
    }

    pub fn router(&self) -> &Arc<CallRouter> {
        &self.router
    }
}

impl SurfaceLoader for RegistrySurfaceLoader {
    fn load(&self, role: &str) -> Result<Arc<CallRouter>> {
        for kind in &self.preload {
            let handle = self.router.registry().get(*kind)?;
            let facade = handle.as_facade();
            if !facade.is_started() {
                facade.start()?;
                tracing::debug!(role, facade = %kind, "preloaded facade");
            }
        }
        Ok(Arc::clone(&self.router))
    }
}
