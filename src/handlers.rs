use crate::auth::AuthService;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::services::{RecommendationService, ReviewService, ReviewSubmission};
use crate::session_cache::ValidatedSessionEntry;
use crate::store::{DocumentStore, PROVIDERS_COLLECTION};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use moka::future::Cache;
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Document store backing providers and reviews.
    pub store: Arc<dyn DocumentStore>,
    /// Identity provider client.
    pub auth: AuthService,
    /// Application configuration.
    pub config: Config,
    /// Token -> identity cache with checksum-validated entries.
    /// Key: bearer token, Value: serialized `ValidatedSessionEntry`.
    pub session_cache: Cache<String, String>,
}

/// The `/api/v1` route table. The caller supplies state and outer
/// middleware (rate limiting, body limits, CORS, tracing).
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/providers", get(list_providers))
        .route("/api/v1/providers/:uid", get(get_provider))
        .route(
            "/api/v1/providers/:uid/recommend",
            axum::routing::post(recommend_provider),
        )
        .route(
            "/api/v1/providers/:uid/reviews",
            get(list_provider_reviews).post(submit_provider_review),
        )
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-localpros-api",
            "version": "0.1.0"
        })),
    )
}

/// Resolves the request's `Authorization: Bearer` header to the identity
/// behind it, or `None` for anonymous requests.
///
/// Verified identities are cached by token; cached entries failing the
/// integrity check are discarded and the token re-verified.
pub async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<SessionIdentity>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = match value.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => token.to_string(),
        _ => {
            return Err(AppError::BadRequest(
                "Malformed Authorization header, expected a bearer token".to_string(),
            ));
        }
    };

    // Check cache first with validation
    if let Some(cached) = state.session_cache.get(&token).await {
        if let Some(valid_data) = ValidatedSessionEntry::deserialize_and_validate(&cached) {
            if let Ok(identity) = serde_json::from_str::<SessionIdentity>(&valid_data) {
                tracing::debug!("Session cache HIT (validated) for user {}", identity.user_id);
                return Ok(Some(identity));
            }
        } else {
            tracing::warn!("Session cache validation failed, re-verifying token");
        }
    }

    let identity = state.auth.verify_token(&token).await?;

    if let Some(ref identity) = identity {
        if let Ok(json_str) = serde_json::to_string(identity) {
            let entry = ValidatedSessionEntry::new(json_str);
            state.session_cache.insert(token, entry.serialize()).await;
        }
    }

    Ok(identity)
}

/// GET /api/v1/providers
///
/// Provider listing with optional filters: `service` (matched on the
/// slugified service category), `state` and `district` (exact), and `q`
/// (case-insensitive substring across the display fields).
///
/// # Arguments
///
/// * `state` - The application state.
/// * `params` - Query parameters carrying the filters.
///
/// # Returns
///
/// * `Result<Json<Vec<ProviderSummary>>, AppError>` - The matching providers or an error.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProviderQueryParams>,
) -> Result<Json<Vec<ProviderSummary>>, AppError> {
    tracing::info!("GET /providers - params: {:?}", params);

    let docs = state.store.list(PROVIDERS_COLLECTION).await?;

    let mut providers = Vec::new();
    for doc in docs {
        let provider: Provider = match serde_json::from_value(doc.data) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::warn!("Skipping malformed provider document {}: {}", doc.id, e);
                continue;
            }
        };
        if matches_filters(&provider, &params) {
            providers.push(ProviderSummary::from_parts(doc.id, provider));
        }
    }

    Ok(Json(providers))
}

fn matches_filters(provider: &Provider, params: &ProviderQueryParams) -> bool {
    if let Some(ref service) = params.service {
        if slugify_service(&provider.service) != slugify_service(service) {
            return false;
        }
    }
    if let Some(ref state) = params.state {
        if &provider.state != state {
            return false;
        }
    }
    if let Some(ref district) = params.district {
        if &provider.district != district {
            return false;
        }
    }
    if let Some(ref q) = params.q {
        let needle = q.to_lowercase();
        let matches = [
            &provider.name,
            &provider.service,
            &provider.state,
            &provider.district,
            &provider.locality,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle));
        if !matches {
            return false;
        }
    }
    true
}

/// GET /api/v1/providers/:uid
///
/// Provider detail: display fields, the persisted aggregates, the full
/// review list, and whether the calling session already recommended it.
/// The aggregates are read as stored; they are never recomputed from the
/// review list on a read.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `uid` - The provider's document id.
/// * `headers` - Request headers carrying the optional bearer token.
///
/// # Returns
///
/// * `Result<Json<ProviderDetailResponse>, AppError>` - The provider detail or an error.
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProviderDetailResponse>, AppError> {
    tracing::info!("GET /providers/{}", uid);

    // The read path stays available when the identity provider is down;
    // the session only drives the hasRecommended flag here.
    let session = match resolve_session(&state, &headers).await {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Session resolution failed on read path: {}", e);
            None
        }
    };

    let doc = state
        .store
        .get(PROVIDERS_COLLECTION, &uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Provider {} not found", uid)))?;
    let provider: Provider = serde_json::from_value(doc.data)
        .map_err(|e| AppError::InternalError(format!("Malformed provider document {}: {}", uid, e)))?;

    let reviews = ReviewService::new(state.store.clone())
        .list_reviews(&uid)
        .await?;

    let has_recommended = session
        .map(|s| provider.recommended_by.contains(&s.user_id))
        .unwrap_or(false);

    Ok(Json(ProviderDetailResponse {
        uid,
        name: provider.name,
        service: provider.service,
        locality: provider.locality,
        district: provider.district,
        state: provider.state,
        available_time: provider.available_time,
        phone: provider.phone,
        recommend_count: provider.recommend_count,
        avg_rating: provider.avg_rating.unwrap_or(0.0),
        has_recommended,
        reviews: reviews.into_iter().map(review_view).collect(),
    }))
}

fn review_view(stored: crate::services::StoredReview) -> ReviewView {
    ReviewView {
        id: stored.id,
        user_name: stored.review.user_name,
        rating: stored.review.rating,
        tags: stored.review.tags,
        comment: stored.review.comment,
        timestamp: stored.review.timestamp,
    }
}

/// POST /api/v1/providers/:uid/recommend
///
/// Records a one-per-user recommendation for the provider.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `uid` - The provider's document id.
/// * `headers` - Request headers carrying the bearer token.
///
/// # Returns
///
/// * `Result<Json<RecommendResponse>, AppError>` - The store-confirmed count or an error.
pub async fn recommend_provider(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RecommendResponse>, AppError> {
    tracing::info!("POST /providers/{}/recommend", uid);

    let session = resolve_session(&state, &headers).await?;
    let service = RecommendationService::new(state.store.clone());
    let recommend_count = service.recommend(&uid, session.as_ref()).await?;

    Ok(Json(RecommendResponse { recommend_count }))
}

/// GET /api/v1/providers/:uid/reviews
///
/// Lists a provider's reviews, oldest first.
pub async fn list_provider_reviews(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<Vec<ReviewView>>, AppError> {
    tracing::info!("GET /providers/{}/reviews", uid);

    if state
        .store
        .get(PROVIDERS_COLLECTION, &uid)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!("Provider {} not found", uid)));
    }

    let reviews = ReviewService::new(state.store.clone())
        .list_reviews(&uid)
        .await?;
    Ok(Json(reviews.into_iter().map(review_view).collect()))
}

/// POST /api/v1/providers/:uid/reviews
///
/// Submits a one-per-user review (rating 1..=5, tags from the fixed
/// vocabulary, optional comment) and returns the recomputed average.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `uid` - The provider's document id.
/// * `headers` - Request headers carrying the bearer token.
/// * `payload` - The review submission.
///
/// # Returns
///
/// * `Result<Json<SubmitReviewResponse>, AppError>` - The created review id and new average, or an error.
pub async fn submit_provider_review(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SubmitReviewRequest>,
) -> Result<Json<SubmitReviewResponse>, AppError> {
    tracing::info!("POST /providers/{}/reviews - rating: {}", uid, payload.rating);

    let session = resolve_session(&state, &headers).await?;
    let service = ReviewService::new(state.store.clone());
    let submitted = service
        .submit_review(
            &uid,
            session.as_ref(),
            ReviewSubmission {
                rating: payload.rating,
                tags: payload.tags,
                comment: payload.comment,
            },
        )
        .await?;

    Ok(Json(SubmitReviewResponse {
        review_id: submitted.review_id,
        avg_rating: submitted.avg_rating,
    }))
}
