use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use super::{log_cache_write, DataSource, Live, RefreshTask, ScreenScope, SyncContext};
use crate::api::{fetch, fetch_one, ApiError, Query, Table};
use crate::models::{Profile, ProfileComment, ProfileFeed, Reaction, UserCredit};

/// How often the comment/reaction feed is re-fetched while visible.
pub const PROFILE_FEED_INTERVAL: Duration = Duration::from_secs(5);

/// A running feed refresh. Dropping it stops the refresh.
pub struct LiveFeed {
    pub updates: watch::Receiver<ProfileFeed>,
    _task: RefreshTask,
}

/// A user's profile with its social feed.
pub struct ProfileScreen {
    ctx: SyncContext,
    user_id: String,
    scope: ScreenScope,
    profile: Option<Profile>,
    feed: ProfileFeed,
    source: DataSource,
}

impl ProfileScreen {
    pub fn new(ctx: SyncContext, user_id: impl Into<String>) -> Self {
        Self {
            ctx,
            user_id: user_id.into(),
            scope: ScreenScope::new(),
            profile: None,
            feed: ProfileFeed::default(),
            source: DataSource::Cache,
        }
    }

    pub fn scope(&self) -> ScreenScope {
        self.scope.clone()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn feed(&self) -> &ProfileFeed {
        &self.feed
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    fn is_own(&self) -> bool {
        self.ctx.session.user_id().as_deref() == Some(self.user_id.as_str())
    }

    pub fn show_cached(&mut self) -> DataSource {
        self.load_cached();
        self.source = DataSource::Cache;
        self.source
    }

    pub async fn mount(&mut self) -> DataSource {
        self.show_cached();
        self.refresh().await
    }

    pub async fn refresh(&mut self) -> DataSource {
        let ctx = self.ctx.clone();
        let live = ctx
            .fetch_live("profile", fetch_profile(&ctx, &self.user_id))
            .await;

        if !self.scope.is_mounted() {
            debug!(user_id = %self.user_id, "Profile screen unmounted during refresh");
            return self.source;
        }

        self.source = match live {
            Live::Fresh((profile, feed)) => {
                info!(
                    user_id = %self.user_id,
                    comments = feed.comments.len(),
                    reactions = feed.reactions.len(),
                    "Profile fetched"
                );
                if let Some(ref profile) = profile {
                    self.write_through(profile);
                }
                self.profile = profile;
                self.feed = feed;
                DataSource::Network
            }
            Live::Skipped => DataSource::Offline,
            Live::Failed(kind) => {
                self.load_cached();
                DataSource::Fallback(kind)
            }
        };
        self.source
    }

    /// Re-fetch comments and reactions every `PROFILE_FEED_INTERVAL` until
    /// the returned handle is dropped or the screen unmounts.
    pub fn start_live_feed(&self) -> LiveFeed {
        self.start_live_feed_every(PROFILE_FEED_INTERVAL)
    }

    pub fn start_live_feed_every(&self, period: Duration) -> LiveFeed {
        let (tx, rx) = watch::channel(self.feed.clone());
        let tx = Arc::new(tx);
        let ctx = self.ctx.clone();
        let user_id = self.user_id.clone();

        let task = RefreshTask::spawn(period, self.scope.clone(), move || {
            let ctx = ctx.clone();
            let user_id = user_id.clone();
            let tx = Arc::clone(&tx);
            async move {
                if let Live::Fresh(feed) = ctx
                    .fetch_live("profile feed", fetch_feed(&ctx, &user_id))
                    .await
                {
                    tx.send_if_modified(|current| {
                        let changed = *current != feed;
                        *current = feed;
                        changed
                    });
                }
            }
        });

        LiveFeed {
            updates: rx,
            _task: task,
        }
    }

    /// Adopt the latest feed published by a `LiveFeed`.
    pub fn apply_feed(&mut self, feed: ProfileFeed) {
        if self.scope.is_mounted() {
            self.feed = feed;
        }
    }

    fn load_cached(&mut self) {
        if !self.scope.is_mounted() {
            return;
        }
        let cache = &self.ctx.cache;
        let own = if self.is_own() {
            cache.load_user_profile()
        } else {
            None
        };
        self.profile = own.or_else(|| cache.find_cached_profile(&self.user_id));
    }

    fn write_through(&self, profile: &Profile) {
        let cache = &self.ctx.cache;
        log_cache_write(
            "profile list",
            cache.upsert_user_profiles(std::slice::from_ref(profile)),
        );
        if self.is_own() {
            log_cache_write("user profile", cache.save_user_profile(profile));
        }
    }
}

async fn fetch_feed(ctx: &SyncContext, user_id: &str) -> Result<ProfileFeed, ApiError> {
    let backend = ctx.backend();
    let (comments, reactions) = tokio::try_join!(
        fetch::<ProfileComment>(
            backend,
            Table::ProfileComment,
            Query::new().eq("profile_id", user_id).order("created_at", false),
        ),
        fetch::<Reaction>(
            backend,
            Table::Reaction,
            Query::new().eq("profile_id", user_id).order("created_at", false),
        ),
    )?;
    Ok(ProfileFeed {
        comments,
        reactions,
    })
}

async fn fetch_profile(
    ctx: &SyncContext,
    user_id: &str,
) -> Result<(Option<Profile>, ProfileFeed), ApiError> {
    let backend = ctx.backend();
    let (profile, credits, feed) = tokio::try_join!(
        fetch_one::<Profile>(backend, Table::Profile, Query::new().eq("id", user_id)),
        fetch_one::<UserCredit>(backend, Table::UserCredit, Query::new().eq("user_id", user_id)),
        fetch_feed(ctx, user_id),
    )?;

    let profile = profile.map(|mut p| {
        p.credits = Some(credits.map(|c| c.amount).unwrap_or(0));
        p
    });
    Ok((profile, feed))
}
