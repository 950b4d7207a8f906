use crate::errors::{AppError, ResultExt};
use crate::models::{anonymous_user_name, Provider, Review, ReviewTag, SessionIdentity};
use crate::store::{
    reviews_collection, DocumentStore, DocumentUpdate, PROVIDERS_COLLECTION,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

// Provider document fields maintained by the services below.
const FIELD_RECOMMEND_COUNT: &str = "recommendCount";
const FIELD_RECOMMENDED_BY: &str = "recommendedBy";
const FIELD_AVG_RATING: &str = "avgRating";

// Review document fields consulted during aggregation.
const FIELD_USER_ID: &str = "userId";
const FIELD_RATING: &str = "rating";

fn provider_not_found(provider_uid: &str) -> AppError {
    AppError::NotFound(format!("Provider {} not found", provider_uid))
}

fn parse_provider(provider_uid: &str, data: Value) -> Result<Provider, AppError> {
    serde_json::from_value(data).map_err(|e| {
        AppError::InternalError(format!(
            "Malformed provider document {}: {}",
            provider_uid, e
        ))
    })
}

// ============ Recommendations ============

/// Records one-per-user "recommend" actions against providers.
///
/// Dedup is account-scoped: membership in the persisted `recommendedBy`
/// set decides, never a per-device flag, so a user cannot recommend the
/// same provider twice from different devices.
pub struct RecommendationService {
    store: Arc<dyn DocumentStore>,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Recommends a provider on behalf of the session's user.
    ///
    /// Fails with `Unauthenticated` for anonymous callers and
    /// `AlreadyRecommended` for repeat callers; neither mutates anything.
    /// On success the counter increment and the membership insert go to
    /// the store as one combined atomic update, and the count from the
    /// store's post-update document is returned. Callers display that
    /// count rather than summing locally.
    pub async fn recommend(
        &self,
        provider_uid: &str,
        session: Option<&SessionIdentity>,
    ) -> Result<i64, AppError> {
        let session = session.ok_or_else(|| {
            AppError::Unauthenticated("Please login to recommend this provider".to_string())
        })?;

        let doc = self
            .store
            .get(PROVIDERS_COLLECTION, provider_uid)
            .await?
            .ok_or_else(|| provider_not_found(provider_uid))?;
        let provider = parse_provider(provider_uid, doc.data)?;

        if provider
            .recommended_by
            .iter()
            .any(|uid| uid == &session.user_id)
        {
            return Err(AppError::AlreadyRecommended);
        }

        let update = DocumentUpdate::new()
            .increment(FIELD_RECOMMEND_COUNT, 1)
            .array_union(FIELD_RECOMMENDED_BY, json!(session.user_id.clone()));
        let updated = self
            .store
            .update(PROVIDERS_COLLECTION, provider_uid, update)
            .await?;

        let count = updated
            .data
            .get(FIELD_RECOMMEND_COUNT)
            .and_then(Value::as_i64)
            .unwrap_or(0);

        tracing::info!(
            "User {} recommended provider {} (count now {})",
            session.user_id,
            provider_uid,
            count
        );
        Ok(count)
    }
}

// ============ Reviews ============

/// A review as submitted by a caller, before validation.
#[derive(Debug, Clone)]
pub struct ReviewSubmission {
    pub rating: i64,
    pub tags: Vec<String>,
    pub comment: String,
}

/// The outcome of a successful review submission.
#[derive(Debug, Clone)]
pub struct SubmittedReview {
    pub review_id: String,
    pub avg_rating: f64,
}

/// A stored review together with its document id.
#[derive(Debug, Clone)]
pub struct StoredReview {
    pub id: String,
    pub review: Review,
}

/// Accepts one review per user per provider and keeps the provider's
/// `avgRating` consistent with the full review history.
pub struct ReviewService {
    store: Arc<dyn DocumentStore>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Submits a review for a provider on behalf of the session's user.
    ///
    /// Preconditions: an authenticated session and a rating in 1..=5;
    /// the provider must exist and the user must not have reviewed it
    /// before. Nothing is written when any precondition fails.
    ///
    /// On success the review is appended, then the average is recomputed
    /// over the full review set and persisted on the provider document as
    /// a second write. The two writes are not a transaction: a failure of
    /// the second leaves the stored average stale until the next
    /// submission recomputes it from the (correct) review list.
    pub async fn submit_review(
        &self,
        provider_uid: &str,
        session: Option<&SessionIdentity>,
        submission: ReviewSubmission,
    ) -> Result<SubmittedReview, AppError> {
        let session = session.ok_or_else(|| {
            AppError::Unauthenticated("Please login to write a review".to_string())
        })?;

        if !(1..=5).contains(&submission.rating) {
            return Err(AppError::InvalidRating(submission.rating));
        }

        if self
            .store
            .get(PROVIDERS_COLLECTION, provider_uid)
            .await?
            .is_none()
        {
            return Err(provider_not_found(provider_uid));
        }

        let collection = reviews_collection(provider_uid);
        let existing = self.store.list(&collection).await?;

        let already_reviewed = existing.iter().any(|doc| {
            doc.data.get(FIELD_USER_ID).and_then(Value::as_str) == Some(session.user_id.as_str())
        });
        if already_reviewed {
            return Err(AppError::DuplicateReview);
        }

        let review = Review {
            user_id: session.user_id.clone(),
            user_name: session
                .display_name
                .clone()
                .unwrap_or_else(anonymous_user_name),
            rating: submission.rating,
            tags: filter_tags(&submission.tags),
            comment: submission.comment,
            timestamp: Utc::now(),
        };
        let fields = serde_json::to_value(&review)
            .map_err(|e| AppError::InternalError(format!("Failed to encode review: {}", e)))?;
        let review_id = self.store.create(&collection, fields).await?;

        // Recomputed from the full set every time; the persisted value is
        // what readers display, never a per-read derivation.
        let existing_ratings: Vec<i64> = existing
            .iter()
            .filter_map(|doc| doc.data.get(FIELD_RATING).and_then(Value::as_i64))
            .collect();
        let avg_rating = recompute_average(&existing_ratings, submission.rating);

        self.store
            .update(
                PROVIDERS_COLLECTION,
                provider_uid,
                DocumentUpdate::new().set(FIELD_AVG_RATING, json!(avg_rating)),
            )
            .await
            .context("persisting recomputed average rating")?;

        tracing::info!(
            "User {} reviewed provider {} (rating {}, avg now {:.2})",
            session.user_id,
            provider_uid,
            submission.rating,
            avg_rating
        );
        Ok(SubmittedReview {
            review_id,
            avg_rating,
        })
    }

    /// Lists a provider's reviews, oldest first. Malformed review
    /// documents are skipped with a warning rather than failing the read.
    pub async fn list_reviews(&self, provider_uid: &str) -> Result<Vec<StoredReview>, AppError> {
        let docs = self.store.list(&reviews_collection(provider_uid)).await?;

        let mut reviews = Vec::with_capacity(docs.len());
        for doc in docs {
            match serde_json::from_value::<Review>(doc.data) {
                Ok(review) => reviews.push(StoredReview { id: doc.id, review }),
                Err(e) => {
                    tracing::warn!("Skipping malformed review document {}: {}", doc.id, e);
                }
            }
        }
        Ok(reviews)
    }
}

// ============ Pure helpers ============

/// Arithmetic mean over the full rating set:
/// `(sum(existing) + new_rating) / (count(existing) + 1)`.
pub fn recompute_average(existing_ratings: &[i64], new_rating: i64) -> f64 {
    let sum: i64 = existing_ratings.iter().sum::<i64>() + new_rating;
    sum as f64 / (existing_ratings.len() as f64 + 1.0)
}

/// Keeps recognized tags in submission order (deduplicated); anything
/// outside the fixed vocabulary is dropped with a warning.
pub fn filter_tags(tags: &[String]) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(tags.len());
    for raw in tags {
        match ReviewTag::parse(raw) {
            Some(tag) => {
                let canonical = tag.as_str().to_string();
                if !kept.contains(&canonical) {
                    kept.push(canonical);
                }
            }
            None => {
                tracing::warn!("Dropping unrecognized review tag: {:?}", raw);
            }
        }
    }
    kept
}
