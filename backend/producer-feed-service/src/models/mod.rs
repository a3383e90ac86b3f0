mod profile;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use profile::AccountProfile;

/// Mean Earth radius used for great-circle distances
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Venue partitions. Each category lives in its own logical partition of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueCategory {
    Restaurant,
    Leisure,
    Wellness,
}

impl VenueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::Leisure => "leisure",
            Self::Wellness => "wellness",
        }
    }

    pub const ALL: [VenueCategory; 3] = [Self::Restaurant, Self::Leisure, Self::Wellness];

    /// Lower-cased spellings found in stored rows, including legacy collection-style names
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Restaurant => &["restaurant", "restaurants", "producer"],
            Self::Leisure => &["leisure", "leisureproducer", "loisir"],
            Self::Wellness => &["wellness", "wellnessproducer", "beautyproducer", "beauty"],
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.aliases().contains(&value.as_str()))
    }
}

impl std::fmt::Display for VenueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    User,
    Venue(VenueCategory),
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Venue(category) => category.as_str(),
        }
    }

    /// "user" or "venue". Ids are only unique within a role.
    pub fn role(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Venue(_) => "venue",
        }
    }
}

/// Reference to an account in one of the store partitions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountRef {
    pub id: String,
    pub kind: AccountKind,
}

impl AccountRef {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: AccountKind::User,
        }
    }

    pub fn venue(id: impl Into<String>, category: VenueCategory) -> Self {
        Self {
            id: id.into(),
            kind: AccountKind::Venue(category),
        }
    }

    pub fn venue_category(&self) -> Option<VenueCategory> {
        match self.kind {
            AccountKind::Venue(category) => Some(category),
            AccountKind::User => None,
        }
    }
}

/// Who wrote a post. Rows carrying neither reference are anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Author {
    User(String),
    Venue {
        id: String,
        category: Option<VenueCategory>,
    },
    Anonymous,
}

/// Identity used when comparing authors. User and venue ids live in different partitions
/// and may collide, so the partition is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthorKey {
    User(String),
    Venue(String),
}

impl Author {
    pub fn key(&self) -> Option<AuthorKey> {
        match self {
            Self::User(id) => Some(AuthorKey::User(id.clone())),
            Self::Venue { id, .. } => Some(AuthorKey::Venue(id.clone())),
            Self::Anonymous => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::User(id) | Self::Venue { id, .. } => Some(id),
            Self::Anonymous => None,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Returns `None` for coordinates outside the valid latitude/longitude ranges
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    /// Haversine great-circle distance in kilometres
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

/// A post as read from the store. The engine never mutates items.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub id: String,
    pub author: Author,
    pub content: String,
    pub media: Vec<String>,
    pub tags: Vec<String>,
    pub posted_at: DateTime<Utc>,
    /// Size of the like set at read time
    pub likes_count: u64,
    /// Size of the comment set at read time
    pub comments_count: u64,
    pub shares_count: u64,
    pub location: Option<GeoPoint>,
    pub target_venue_id: Option<String>,
    pub mentioned_venue_ids: Vec<String>,
    pub is_automated: bool,
}

/// Candidate pool selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedMode {
    OwnVenue,
    SocialMentions,
    FollowedAccounts,
    LocalTrends,
    Default,
}

impl FeedMode {
    /// Parse the `filter` query parameter
    pub fn from_filter(value: &str) -> Option<Self> {
        match value {
            "venue" => Some(Self::OwnVenue),
            "interactions" => Some(Self::SocialMentions),
            "followers" => Some(Self::FollowedAccounts),
            "localTrends" => Some(Self::LocalTrends),
            "default" | "" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OwnVenue => "venue",
            Self::SocialMentions => "interactions",
            Self::FollowedAccounts => "followers",
            Self::LocalTrends => "localTrends",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub requester: AccountRef,
    pub mode: FeedMode,
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
}

impl FeedRequest {
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.limit as usize
    }
}

/// How an end-user post on the interactions feed refers to the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    /// The venue's name appears in the text
    Mention,
    /// The post was written about the venue
    Target,
    /// The venue is in the post's tagged venues
    Tag,
}

/// Response element (matches the mobile client's feed item)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub posted_at: DateTime<Utc>,
    pub author_id: Option<String>,
    pub author_name: String,
    pub author_avatar: String,
    /// "user", "restaurant", "leisure", "wellness", "anonymous" or "unknown"
    pub author_category: String,
    pub is_user_post: bool,
    pub is_venue_post: bool,
    pub likes_count: u64,
    pub comments_count: u64,
    pub shares_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Set on social-mentions pages only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_type: Option<InteractionType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub total_pages: u64,
    pub current_page: u32,
    pub total: u64,
    pub has_more: bool,
    /// False when `total` is an approximation derived from the fetched window
    pub total_is_exact: bool,
}

impl FeedPage {
    pub fn empty(page: u32) -> Self {
        Self {
            items: Vec::new(),
            total_pages: 0,
            current_page: page,
            total: 0,
            has_more: false,
            total_is_exact: true,
        }
    }

    /// Build pagination metadata from an independently computed total
    pub fn new(items: Vec<FeedItem>, page: u32, limit: u32, total: u64, total_is_exact: bool) -> Self {
        let limit = u64::from(limit.max(1));
        let total_pages = total.div_ceil(limit);
        let has_more = u64::from(page) * limit < total;
        Self {
            items,
            total_pages,
            current_page: page,
            total,
            has_more,
            total_is_exact,
        }
    }
}
