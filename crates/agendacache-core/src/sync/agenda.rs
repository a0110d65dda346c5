use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use super::{log_cache_write, DataSource, Live, ScreenScope, SyncContext};
use crate::api::{fetch, fetch_one, ApiError, Query, Table};
use crate::models::{
    Agenda, AgendaBundle, AgendaComment, AgendaEditor, AgendaElement, AgendaMember,
    AgendaSection, CompletedElement, Profile, SectionView, SectionWithElements, UrgentElement,
};

/// One agenda: sections, items, members and the viewer's annotations.
pub struct AgendaScreen {
    ctx: SyncContext,
    agenda_id: String,
    scope: ScreenScope,
    bundle: Option<AgendaBundle>,
    /// Live-only; not part of the cached bundle.
    comments: Vec<AgendaComment>,
    source: DataSource,
}

struct AgendaLive {
    bundle: AgendaBundle,
    comments: Vec<AgendaComment>,
}

impl AgendaScreen {
    pub fn new(ctx: SyncContext, agenda_id: impl Into<String>) -> Self {
        Self {
            ctx,
            agenda_id: agenda_id.into(),
            scope: ScreenScope::new(),
            bundle: None,
            comments: Vec::new(),
            source: DataSource::Cache,
        }
    }

    pub fn agenda_id(&self) -> &str {
        &self.agenda_id
    }

    pub fn scope(&self) -> ScreenScope {
        self.scope.clone()
    }

    pub fn bundle(&self) -> Option<&AgendaBundle> {
        self.bundle.as_ref()
    }

    pub fn comments(&self) -> &[AgendaComment] {
        &self.comments
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    /// Sections with sorted items, empty until something is loaded.
    pub fn sections(&self) -> Vec<SectionView> {
        self.bundle
            .as_ref()
            .map(AgendaBundle::section_views)
            .unwrap_or_default()
    }

    /// Cached bundle only; comments stay empty until a live fetch.
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
            .fetch_live("agenda", fetch_agenda(&ctx, &self.agenda_id))
            .await;

        if !self.scope.is_mounted() {
            debug!(agenda_id = %self.agenda_id, "Agenda screen unmounted during refresh");
            return self.source;
        }

        self.source = match live {
            Live::Fresh(AgendaLive { bundle, comments }) => {
                info!(
                    agenda_id = %self.agenda_id,
                    sections = bundle.sections.len(),
                    members = bundle.members.len(),
                    "Agenda fetched"
                );
                self.write_through(&bundle);
                self.bundle = Some(bundle);
                self.comments = comments;
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
        self.bundle = self.ctx.cache.get_agenda_data(&self.agenda_id);
        debug!(agenda_id = %self.agenda_id, hit = self.bundle.is_some(), "Agenda cache loaded");
    }

    fn write_through(&self, bundle: &AgendaBundle) {
        let cache = &self.ctx.cache;
        log_cache_write(
            "agenda bundle",
            cache.store_agenda_data(&self.agenda_id, bundle),
        );
        log_cache_write("agenda list", cache.upsert_cached_agenda(&bundle.agenda));
        if !bundle.members.is_empty() {
            log_cache_write("member profiles", cache.upsert_user_profiles(&bundle.members));
        }
    }
}

async fn fetch_agenda(ctx: &SyncContext, agenda_id: &str) -> Result<AgendaLive, ApiError> {
    let me = ctx.viewer_id()?;
    let backend = ctx.backend();
    let by_agenda = || Query::new().eq("agenda_id", agenda_id);

    let (agenda, sections, elements, members, editors, urgent, completed, comments) = tokio::try_join!(
        fetch_one::<Agenda>(backend, Table::Agenda, Query::new().eq("id", agenda_id)),
        fetch::<AgendaSection>(backend, Table::AgendaSection, by_agenda().order("position", true)),
        fetch::<AgendaElement>(backend, Table::AgendaElement, by_agenda().order("deadline", true)),
        fetch::<AgendaMember>(backend, Table::AgendaMember, by_agenda()),
        fetch::<AgendaEditor>(backend, Table::AgendaEditor, by_agenda()),
        fetch::<UrgentElement>(backend, Table::UrgentElement, Query::new().eq("user_id", &me)),
        fetch::<CompletedElement>(
            backend,
            Table::CompletedElement,
            Query::new().eq("user_id", &me)
        ),
        fetch::<AgendaComment>(
            backend,
            Table::AgendaComment,
            by_agenda().order("created_at", true)
        ),
    )?;

    let agenda = agenda.ok_or_else(|| ApiError::NotFound(format!("agenda {}", agenda_id)))?;

    let member_ids: Vec<String> = members.into_iter().map(|m| m.user_id).collect();
    let profiles: Vec<Profile> =
        fetch(backend, Table::Profile, Query::new().in_list("id", member_ids)).await?;

    let element_ids: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
    let annotation_map = |ids: Vec<String>| -> BTreeMap<String, bool> {
        ids.into_iter()
            .filter(|id| element_ids.contains(id.as_str()))
            .map(|id| (id, true))
            .collect()
    };
    let urgent = annotation_map(urgent.into_iter().map(|u| u.element_id).collect());
    let completed = annotation_map(completed.into_iter().map(|c| c.element_id).collect());

    let sections = sections
        .into_iter()
        .map(|section| {
            let elements = elements
                .iter()
                .filter(|e| e.section_id == section.id)
                .cloned()
                .collect();
            SectionWithElements { section, elements }
        })
        .collect();

    Ok(AgendaLive {
        bundle: AgendaBundle {
            agenda,
            sections,
            members: profiles,
            editor_ids: editors.into_iter().map(|e| e.user_id).collect(),
            completed,
            urgent,
        },
        comments,
    })
}
