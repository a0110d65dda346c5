use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Profile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// Projected from `user_credits`; not a column of `profiles`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<i64>,
}

impl Profile {
    pub fn display_credits(&self) -> String {
        match self.credits {
            Some(1) => "1 credit".to_string(),
            Some(amount) => format!("{} credits", amount),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ProfileComment {
    pub id: String,
    pub profile_id: String,
    pub author_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Reaction {
    pub id: String,
    pub profile_id: String,
    pub author_id: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCredit {
    pub user_id: String,
    #[serde(default)]
    pub amount: i64,
}

/// Comments and reactions shown under a profile. Live-only, never cached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFeed {
    pub comments: Vec<ProfileComment>,
    pub reactions: Vec<Reaction>,
}

impl ProfileFeed {
    /// Reaction counts grouped by kind, most frequent first.
    pub fn reaction_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for reaction in &self.reactions {
            match counts.iter_mut().find(|(kind, _)| *kind == reaction.kind) {
                Some((_, n)) => *n += 1,
                None => counts.push((reaction.kind.clone(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reaction(kind: &str) -> Reaction {
        Reaction {
            id: format!("r-{}", kind),
            profile_id: "p".to_string(),
            author_id: "u".to_string(),
            kind: kind.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_reaction_counts() {
        let feed = ProfileFeed {
            comments: vec![],
            reactions: vec![reaction("fire"), reaction("heart"), reaction("fire")],
        };
        assert_eq!(
            feed.reaction_counts(),
            vec![("fire".to_string(), 2), ("heart".to_string(), 1)]
        );
    }

    #[test]
    fn test_display_credits() {
        let mut profile = Profile {
            id: "u1".to_string(),
            username: "sam".to_string(),
            avatar_url: None,
            bio: None,
            credits: None,
        };
        assert_eq!(profile.display_credits(), "-");
        profile.credits = Some(1);
        assert_eq!(profile.display_credits(), "1 credit");
        profile.credits = Some(40);
        assert_eq!(profile.display_credits(), "40 credits");
    }

    #[test]
    fn test_profile_without_credits_column() {
        let profile: Profile =
            serde_json::from_str(r#"{"id":"u1","username":"sam","avatar_url":null}"#).unwrap();
        assert_eq!(profile.credits, None);
        assert_eq!(profile.bio, None);
    }
}
