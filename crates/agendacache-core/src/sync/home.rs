use std::collections::HashSet;

use tracing::{debug, info};

use super::{log_cache_write, DataSource, Live, ScreenScope, SyncContext};
use crate::api::{fetch, fetch_one, ApiError, Query, Table};
use crate::cache::CacheKey;
use crate::models::{
    sort_by_urgency, Agenda, AgendaElement, AgendaMember, CompletedElement, ElementView,
    Profile, UrgentElement, UserCredit,
};

/// Everything the home screen shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomeState {
    pub agendas: Vec<Agenda>,
    pub urgent: Vec<ElementView>,
    pub completed: Vec<ElementView>,
    pub profile: Option<Profile>,
}

/// Agendas the viewer belongs to, plus their urgent and completed items.
pub struct HomeScreen {
    ctx: SyncContext,
    scope: ScreenScope,
    state: HomeState,
    source: DataSource,
}

impl HomeScreen {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            scope: ScreenScope::new(),
            state: HomeState::default(),
            source: DataSource::Cache,
        }
    }

    pub fn scope(&self) -> ScreenScope {
        self.scope.clone()
    }

    pub fn state(&self) -> &HomeState {
        &self.state
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    /// Publish the cached snapshot without touching the network.
    pub fn show_cached(&mut self) -> DataSource {
        self.load_cached();
        self.source = DataSource::Cache;
        self.source
    }

    /// Show cached data, then try to replace it with live data.
    pub async fn mount(&mut self) -> DataSource {
        self.show_cached();
        self.refresh().await
    }

    /// Pull-to-refresh.
    pub async fn refresh(&mut self) -> DataSource {
        let ctx = self.ctx.clone();
        let live = ctx.fetch_live("home", fetch_home(&ctx)).await;

        if !self.scope.is_mounted() {
            debug!("Home screen unmounted during refresh, dropping result");
            return self.source;
        }

        self.source = match live {
            Live::Fresh(state) => {
                info!(
                    agendas = state.agendas.len(),
                    urgent = state.urgent.len(),
                    completed = state.completed.len(),
                    "Home data fetched"
                );
                self.write_through(&state);
                self.state = state;
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

    fn load_cached(&mut self) {
        if !self.scope.is_mounted() {
            return;
        }
        let cache = &self.ctx.cache;
        self.state = HomeState {
            agendas: cache.load_agendas(),
            urgent: cache.load_urgent_elements(),
            completed: cache.load_completed_elements(),
            profile: cache.load_user_profile(),
        };
        debug!(agendas = self.state.agendas.len(), "Home cache loaded");
    }

    fn write_through(&self, state: &HomeState) {
        let cache = &self.ctx.cache;
        log_cache_write("agendas", cache.save_agendas(&state.agendas));
        log_cache_write("urgent elements", cache.save_urgent_elements(&state.urgent));
        log_cache_write("completed elements", cache.save_completed_elements(&state.completed));
        if let Some(ref profile) = state.profile {
            log_cache_write("user profile", cache.save_user_profile(profile));
            log_cache_write(
                "profile list",
                cache.upsert_user_profiles(std::slice::from_ref(profile)),
            );
        } else {
            log_cache_write("user profile", cache.remove(CacheKey::UserProfile));
        }
    }
}

async fn fetch_home(ctx: &SyncContext) -> Result<HomeState, ApiError> {
    let me = ctx.viewer_id()?;
    let backend = ctx.backend();

    let memberships: Vec<AgendaMember> =
        fetch(backend, Table::AgendaMember, Query::new().eq("user_id", &me)).await?;
    let agenda_ids: Vec<String> = memberships.into_iter().map(|m| m.agenda_id).collect();

    let (agendas, elements, urgent, completed, profile, credits) = tokio::try_join!(
        fetch::<Agenda>(
            backend,
            Table::Agenda,
            Query::new()
                .in_list("id", agenda_ids.clone())
                .order("created_at", true),
        ),
        fetch::<AgendaElement>(
            backend,
            Table::AgendaElement,
            Query::new()
                .in_list("agenda_id", agenda_ids.clone())
                .order("deadline", true),
        ),
        fetch::<UrgentElement>(backend, Table::UrgentElement, Query::new().eq("user_id", &me)),
        fetch::<CompletedElement>(
            backend,
            Table::CompletedElement,
            Query::new().eq("user_id", &me)
        ),
        fetch_one::<Profile>(backend, Table::Profile, Query::new().eq("id", &me)),
        fetch_one::<UserCredit>(backend, Table::UserCredit, Query::new().eq("user_id", &me)),
    )?;

    let urgent_ids: HashSet<String> = urgent.into_iter().map(|u| u.element_id).collect();
    let completed_ids: HashSet<String> = completed.into_iter().map(|c| c.element_id).collect();

    let views: Vec<ElementView> = elements
        .into_iter()
        .map(|e| ElementView::annotate(e, &urgent_ids, &completed_ids))
        .collect();

    let mut urgent: Vec<ElementView> = views.iter().filter(|v| v.is_urgent).cloned().collect();
    let mut completed: Vec<ElementView> = views.into_iter().filter(|v| v.is_completed).collect();
    sort_by_urgency(&mut urgent);
    sort_by_urgency(&mut completed);

    let profile = profile.map(|mut p| {
        p.credits = Some(credits.map(|c| c.amount).unwrap_or(0));
        p
    });

    Ok(HomeState {
        agendas,
        urgent,
        completed,
        profile,
    })
}
