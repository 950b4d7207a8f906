use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============ Store Documents ============

/// A listed service professional, as persisted in the `providers` collection.
///
/// The document id is the provider's `uid`; it is not repeated inside the
/// document. `recommend_count`, `recommended_by` and `avg_rating` are
/// maintained exclusively by the recommendation and review services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Display name of the professional.
    pub name: String,
    /// Offered service (e.g. "Plumber", "Electrician").
    pub service: String,
    /// Locality within the district.
    #[serde(default)]
    pub locality: String,
    /// District within the state.
    #[serde(default)]
    pub district: String,
    /// State.
    #[serde(default)]
    pub state: String,
    /// Free-text availability window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_time: Option<String>,
    /// Contact phone number (display string, not validated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Number of users who recommended this provider. Never decreases.
    #[serde(default)]
    pub recommend_count: i64,
    /// User ids that already recommended this provider.
    #[serde(default)]
    pub recommended_by: Vec<String>,
    /// Arithmetic mean of all review ratings. Absent until the first review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f64>,
}

/// One user's review of one provider, stored in the
/// `providers/{uid}/reviews` subcollection. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Id of the reviewing user.
    #[serde(default)]
    pub user_id: String,
    /// Display name of the reviewing user.
    #[serde(default = "anonymous_user_name")]
    pub user_name: String,
    /// Star rating, 1..=5.
    pub rating: i64,
    /// Tags drawn from the fixed vocabulary. May be empty.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-text comment. May be empty.
    #[serde(default)]
    pub comment: String,
    /// Creation time (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Display fallback for reviews whose author has no display name.
pub fn anonymous_user_name() -> String {
    "Anonymous".to_string()
}

/// The authenticated identity behind a request, resolved from a bearer
/// token by the identity provider. Passed into service calls as an
/// explicit snapshot; `None` means anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Opaque user id assigned by the identity provider.
    pub user_id: String,
    /// Display name, if the user set one.
    pub display_name: Option<String>,
}

// ============ Review Tags ============

/// Fixed vocabulary of review tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewTag {
    #[serde(rename = "Great Service")]
    GreatService,
    #[serde(rename = "Honest & Polite")]
    HonestPolite,
    #[serde(rename = "Knowledgeable")]
    Knowledgeable,
    #[serde(rename = "Rude")]
    Rude,
    #[serde(rename = "Not on Time")]
    NotOnTime,
    #[serde(rename = "Fake Service Registration")]
    FakeServiceRegistration,
}

impl ReviewTag {
    /// Every tag a review may carry, in display order.
    pub const ALL: [ReviewTag; 6] = [
        ReviewTag::GreatService,
        ReviewTag::HonestPolite,
        ReviewTag::Knowledgeable,
        ReviewTag::Rude,
        ReviewTag::NotOnTime,
        ReviewTag::FakeServiceRegistration,
    ];

    /// The exact string persisted on review documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewTag::GreatService => "Great Service",
            ReviewTag::HonestPolite => "Honest & Polite",
            ReviewTag::Knowledgeable => "Knowledgeable",
            ReviewTag::Rude => "Rude",
            ReviewTag::NotOnTime => "Not on Time",
            ReviewTag::FakeServiceRegistration => "Fake Service Registration",
        }
    }

    /// Parses a submitted tag string. `None` for anything outside the
    /// vocabulary.
    pub fn parse(raw: &str) -> Option<ReviewTag> {
        ReviewTag::ALL.iter().copied().find(|t| t.as_str() == raw)
    }
}

// ============ API Request/Response Models ============

/// Query parameters for the provider listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ProviderQueryParams {
    /// Service category, matched on its slug (e.g. "home-tutor").
    pub service: Option<String>,
    /// Exact state filter.
    pub state: Option<String>,
    /// Exact district filter.
    pub district: Option<String>,
    /// Case-insensitive substring search across the display fields.
    pub q: Option<String>,
}

/// One provider in a listing response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub uid: String,
    pub name: String,
    pub service: String,
    pub locality: String,
    pub district: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub recommend_count: i64,
    pub avg_rating: f64,
}

impl ProviderSummary {
    /// Builds a summary from a stored provider document.
    pub fn from_parts(uid: String, provider: Provider) -> Self {
        Self {
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
        }
    }
}

/// One review in a detail or listing response. The author's user id is
/// not exposed; only the display name is.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: String,
    pub user_name: String,
    pub rating: i64,
    pub tags: Vec<String>,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

/// Full provider detail, including its review history and whether the
/// calling session already recommended it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDetailResponse {
    pub uid: String,
    pub name: String,
    pub service: String,
    pub locality: String,
    pub district: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub recommend_count: i64,
    pub avg_rating: f64,
    pub has_recommended: bool,
    pub reviews: Vec<ReviewView>,
}

/// Request payload for submitting a review.
#[derive(Debug, Deserialize)]
pub struct SubmitReviewRequest {
    /// Star rating, 1..=5.
    pub rating: i64,
    /// Tags; unknown entries are dropped.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free-text comment; empty allowed.
    #[serde(default)]
    pub comment: String,
}

/// Response payload after a successful recommend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    /// The store-confirmed count after the increment.
    pub recommend_count: i64,
}

/// Response payload after a successful review submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewResponse {
    pub review_id: String,
    pub avg_rating: f64,
}

// ============ Helpers ============

/// Normalizes a service name to its category slug: lowercased, runs of
/// whitespace collapsed to single dashes ("Home Tutor" -> "home-tutor").
pub fn slugify_service(text: &str) -> String {
    let re = regex::Regex::new(r"\s+").unwrap();
    re.replace_all(text.trim().to_lowercase().as_str(), "-")
        .to_string()
}
