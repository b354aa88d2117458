//! Workspace REST API Routes
//!
//! Reads come from the mirror cache (single workspace) or the access-scoped
//! list query (collections). Writes go straight to the control plane and
//! show up in the cache once the watch delivers them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use workspaces_core::{
    is_internal_label, to_internal, to_view, InternalWorkspace, Labels, ObjectKey, Workspace, WorkspaceList,
    WorkspacesConfig, LABEL_DISPLAY_NAME,
};
use workspaces_storage::{
    ControlPlaneClient, ListOptions, MirrorCache, WorkspaceLister, INDEX_DISPLAY_NAME,
    INDEX_OWNER_USERNAME,
};

use crate::{
    config::ApiConfig,
    error::{ApiError, ApiResult},
    middleware::Principal,
    state::AppState,
};

/// Longest DNS label accepted by the control plane.
const MAX_NAME_LEN: usize = 63;
const NAME_SUFFIX_LEN: usize = 5;

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /apis/workspaces.io/v1alpha1/namespaces/:namespace/workspaces/:name
pub async fn get_workspace(
    State(cache): State<Arc<MirrorCache>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Workspace>> {
    if !cache.is_synced() {
        return Err(ApiError::cache_not_synced());
    }
    let key = ObjectKey::new(namespace, name);
    let workspace = cache
        .get(&key)?
        .ok_or_else(|| ApiError::workspace_not_found(&key))?;
    Ok(Json(workspace))
}

/// GET /apis/workspaces.io/v1alpha1/workspaces
pub async fn list_workspaces(
    State(lister): State<WorkspaceLister>,
    State(config): State<Arc<ApiConfig>>,
    principal: Principal,
) -> ApiResult<Json<WorkspaceList>> {
    list_visible(&lister, &config, &principal, None).await
}

/// GET /apis/workspaces.io/v1alpha1/namespaces/:namespace/workspaces
pub async fn list_namespaced_workspaces(
    State(lister): State<WorkspaceLister>,
    State(config): State<Arc<ApiConfig>>,
    principal: Principal,
    Path(namespace): Path<String>,
) -> ApiResult<Json<WorkspaceList>> {
    list_visible(&lister, &config, &principal, Some(&namespace)).await
}

async fn list_visible(
    lister: &WorkspaceLister,
    config: &ApiConfig,
    principal: &Principal,
    namespace: Option<&str>,
) -> ApiResult<Json<WorkspaceList>> {
    let items = lister
        .list_views_as_user(principal.as_str(), namespace, config.list_timeout)
        .await?;
    tracing::debug!(principal = %principal.as_str(), namespace = ?namespace, count = items.len(), "Listed workspaces");
    Ok(Json(WorkspaceList { items }))
}

/// POST /apis/workspaces.io/v1alpha1/namespaces/:namespace/workspaces
///
/// The namespace of a view is its owner, so principals may only create in
/// their own namespace.
pub async fn create_workspace(
    State(client): State<Arc<dyn ControlPlaneClient>>,
    State(workspaces_config): State<Arc<WorkspacesConfig>>,
    principal: Principal,
    Path(namespace): Path<String>,
    Json(mut view): Json<Workspace>,
) -> ApiResult<impl IntoResponse> {
    ensure_owner(&principal, &namespace)?;
    check_body_namespace(&view, &namespace)?;
    if view.metadata.name.trim().is_empty() {
        return Err(ApiError::missing_field("metadata.name"));
    }
    if !view.spec.visibility.is_known() {
        return Err(ApiError::invalid_input(format!(
            "Unsupported visibility '{}'",
            view.spec.visibility
        )));
    }
    view.metadata.namespace = namespace;
    ensure_identity_free(
        client.as_ref(),
        &workspaces_config,
        &view.metadata.namespace,
        &view.metadata.name,
    )
    .await?;

    let mut internal = to_internal(&view).map_err(|e| ApiError::invalid_input(e.to_string()))?;
    internal.metadata.namespace = workspaces_config.workspaces_namespace.clone();
    internal.metadata.name = generate_workspace_name(&view.metadata.name);

    let created = client.internal_workspace_create(&internal).await?;
    tracing::info!(
        source = %created.metadata.key(),
        owner = %principal.as_str(),
        display_name = %created.spec.display_name,
        "Workspace created"
    );

    let view = to_view(&created).map_err(|e| ApiError::internal_error(e.to_string()))?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /apis/workspaces.io/v1alpha1/namespaces/:namespace/workspaces/:name
///
/// Applies visibility, external labels and display name to the internal
/// workspace owned by `namespace` whose display name is `name`.
pub async fn update_workspace(
    State(client): State<Arc<dyn ControlPlaneClient>>,
    State(workspaces_config): State<Arc<WorkspacesConfig>>,
    principal: Principal,
    Path((namespace, name)): Path<(String, String)>,
    Json(view): Json<Workspace>,
) -> ApiResult<Json<Workspace>> {
    ensure_owner(&principal, &namespace)?;
    check_body_namespace(&view, &namespace)?;
    if !view.spec.visibility.is_known() {
        return Err(ApiError::invalid_input(format!(
            "Unsupported visibility '{}'",
            view.spec.visibility
        )));
    }

    let mut matches =
        find_by_identity(client.as_ref(), &workspaces_config, &namespace, &name).await?;
    let mut source = match matches.len() {
        0 => return Err(ApiError::workspace_not_found(ObjectKey::new(namespace, name))),
        1 => matches.remove(0),
        n => {
            tracing::warn!(owner = %namespace, display_name = %name, matches = n, "Ambiguous workspace update target");
            return Err(ApiError::internal_error("Workspace identity is ambiguous"));
        }
    };

    let display_name = match view.metadata.name.trim() {
        "" => name.clone(),
        renamed => renamed.to_string(),
    };
    if display_name != name {
        ensure_identity_free(client.as_ref(), &workspaces_config, &namespace, &display_name)
            .await?;
    }

    let mut labels: Labels = source
        .metadata
        .labels
        .iter()
        .filter(|(key, _)| is_internal_label(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    labels.extend(
        view.metadata
            .labels
            .into_iter()
            .filter(|(key, _)| !is_internal_label(key)),
    );
    labels.insert(LABEL_DISPLAY_NAME.to_string(), display_name.clone());

    source.metadata.labels = labels;
    source.spec.visibility = view.spec.visibility;
    source.spec.display_name = display_name;

    let updated = client.internal_workspace_update(&source).await?;
    tracing::info!(
        source = %updated.metadata.key(),
        visibility = %updated.spec.visibility,
        "Workspace updated"
    );

    let view = to_view(&updated).map_err(|e| ApiError::internal_error(e.to_string()))?;
    Ok(Json(view))
}

// ============================================================================
// HELPERS
// ============================================================================

fn ensure_owner(principal: &Principal, namespace: &str) -> ApiResult<()> {
    if principal.as_str() == namespace {
        return Ok(());
    }
    Err(ApiError::forbidden(format!(
        "User '{}' cannot write workspaces in namespace '{}'",
        principal.as_str(),
        namespace
    ))
    .with_details(serde_json::json!({ "namespace": namespace })))
}

/// Internal workspaces whose view would be `owner/display_name`.
async fn find_by_identity(
    client: &dyn ControlPlaneClient,
    workspaces_config: &WorkspacesConfig,
    owner: &str,
    display_name: &str,
) -> ApiResult<Vec<InternalWorkspace>> {
    let options = ListOptions::new()
        .in_namespace(workspaces_config.workspaces_namespace.clone())
        .with_field(INDEX_OWNER_USERNAME, owner)
        .with_field(INDEX_DISPLAY_NAME, display_name);
    Ok(client.internal_workspace_list(&options).await?)
}

/// A view is identified by owner and display name; refuse to mint a second one.
async fn ensure_identity_free(
    client: &dyn ControlPlaneClient,
    workspaces_config: &WorkspacesConfig,
    owner: &str,
    display_name: &str,
) -> ApiResult<()> {
    if find_by_identity(client, workspaces_config, owner, display_name)
        .await?
        .is_empty()
    {
        return Ok(());
    }
    Err(ApiError::already_exists(ObjectKey::new(owner, display_name)))
}

fn check_body_namespace(view: &Workspace, namespace: &str) -> ApiResult<()> {
    let body_namespace = view.metadata.namespace.as_str();
    if body_namespace.is_empty() || body_namespace == namespace {
        return Ok(());
    }
    Err(ApiError::invalid_input(format!(
        "Body namespace '{}' does not match path namespace '{}'",
        body_namespace, namespace
    )))
}

/// DNS-label name derived from the display name plus a random suffix.
pub fn generate_workspace_name(display_name: &str) -> String {
    let mut base: String = display_name
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                c
            } else {
                '-'
            }
        })
        .collect();
    base.truncate(MAX_NAME_LEN - NAME_SUFFIX_LEN - 1);
    let base = base.trim_matches('-');
    let base = if base.is_empty() { "workspace" } else { base };

    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(NAME_SUFFIX_LEN)
        .collect();
    format!("{}-{}", base, suffix)
}

// ============================================================================
// ROUTER
// ============================================================================

/// Workspace routes, relative to the API group prefix.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/workspaces", get(list_workspaces))
        .route(
            "/namespaces/:namespace/workspaces",
            get(list_namespaced_workspaces).post(create_workspace),
        )
        .route(
            "/namespaces/:namespace/workspaces/:name",
            get(get_workspace).put(update_workspace),
        )
}
