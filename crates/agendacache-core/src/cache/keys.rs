use serde_json::Value;

/// Key holding the global last-sync timestamp.
pub const LAST_SYNC_KEY: &str = "lastSync";

/// How a cached payload is shaped, which decides its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// Ordered sequence; defaults to `[]`.
    List,
    /// Mapping; defaults to `{}`.
    Map,
    /// Single record; defaults to `null`.
    Scalar,
}

impl ValueShape {
    pub fn default_value(&self) -> Value {
        match self {
            ValueShape::List => Value::Array(Vec::new()),
            ValueShape::Map => Value::Object(serde_json::Map::new()),
            ValueShape::Scalar => Value::Null,
        }
    }
}

/// The closed set of cached collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Agendas,
    UrgentElements,
    CompletedElements,
    UserProfile,
    UserProfiles,
    AgendaData,
}

impl CacheKey {
    pub const ALL: [CacheKey; 6] = [
        CacheKey::Agendas,
        CacheKey::UrgentElements,
        CacheKey::CompletedElements,
        CacheKey::UserProfile,
        CacheKey::UserProfiles,
        CacheKey::AgendaData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Agendas => "agendas",
            CacheKey::UrgentElements => "urgentElements",
            CacheKey::CompletedElements => "completedElements",
            CacheKey::UserProfile => "userProfile",
            CacheKey::UserProfiles => "userProfiles",
            CacheKey::AgendaData => "agendaData",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            CacheKey::Agendas
            | CacheKey::UrgentElements
            | CacheKey::CompletedElements
            | CacheKey::UserProfiles => ValueShape::List,
            CacheKey::AgendaData => ValueShape::Map,
            CacheKey::UserProfile => ValueShape::Scalar,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default for an arbitrary key string; unknown keys default to `null`.
pub fn default_for(key: &str) -> Value {
    CacheKey::parse(key)
        .map(|k| k.shape().default_value())
        .unwrap_or(Value::Null)
}
