//! Shared application state for Axum routers.

use std::sync::Arc;

use workspaces_core::WorkspacesConfig;
use workspaces_storage::{ControlPlaneClient, MirrorCache, WorkspaceLister};

use crate::config::ApiConfig;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Read-only mirror of public workspace views.
    pub cache: Arc<MirrorCache>,
    /// Access-scoped list query over the control plane.
    pub lister: WorkspaceLister,
    /// Write path for create and update.
    pub client: Arc<dyn ControlPlaneClient>,
    pub api_config: Arc<ApiConfig>,
    pub workspaces_config: Arc<WorkspacesConfig>,
}

impl AppState {
    pub fn new(
        cache: Arc<MirrorCache>,
        client: Arc<dyn ControlPlaneClient>,
        api_config: ApiConfig,
        workspaces_config: WorkspacesConfig,
    ) -> Self {
        let lister = WorkspaceLister::new(Arc::clone(&client), &workspaces_config);
        Self {
            cache,
            lister,
            client,
            api_config: Arc::new(api_config),
            workspaces_config: Arc::new(workspaces_config),
        }
    }
}

crate::impl_from_ref!(Arc<MirrorCache>, cache);
crate::impl_from_ref!(WorkspaceLister, lister);
crate::impl_from_ref!(Arc<dyn ControlPlaneClient>, client);
crate::impl_from_ref!(Arc<ApiConfig>, api_config);
crate::impl_from_ref!(Arc<WorkspacesConfig>, workspaces_config);
