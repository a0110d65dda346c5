use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::{
    generate_join_key, validate_agenda_name, validate_comment, validate_section_name,
    validate_title, ActionError, Actions, ValidationError,
};
use crate::api::{fetch, fetch_one, insert_one, upsert_one, ApiError, Query, Table};
use crate::models::{
    Agenda, AgendaComment, AgendaEditor, AgendaElement, AgendaSection, Annotation,
    SectionWithElements,
};
use crate::sync::log_cache_write;

impl Actions {
    /// Create an agenda owned by the viewer, who also becomes its first
    /// member and editor.
    pub async fn create_agenda(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Agenda, ActionError> {
        let name = validate_agenda_name(name)?;
        let me = self.viewer()?;
        let join_key = generate_join_key();
        let backend = self.ctx.backend();

        let row = json!({
            "name": name,
            "description": description.map(str::trim).filter(|d| !d.is_empty()),
            "owner_id": me,
            "join_key": join_key,
        });
        let agenda: Agenda = self.checked(
            "create agenda",
            insert_one::<_, Agenda>(backend, Table::Agenda, &row).await,
        )?;

        let membership = json!({ "agenda_id": agenda.id, "user_id": me });
        let joined = futures::future::try_join(
            backend.insert(Table::AgendaMember, membership.clone()),
            backend.insert(Table::AgendaEditor, membership),
        )
        .await;
        if let Err(e) = joined {
            // Nobody can reach an agenda without a membership row
            let by_id = Query::new().eq("id", &agenda.id);
            if let Err(cleanup) = backend.delete(Table::Agenda, &by_id).await {
                warn!(agenda_id = %agenda.id, error = %cleanup, "Failed to remove orphaned agenda");
            }
            return Err(self.report("create agenda", e));
        }

        log_cache_write("agenda list", self.ctx.cache.upsert_cached_agenda(&agenda));
        info!(agenda_id = %agenda.id, "Agenda created");
        Ok(agenda)
    }

    pub async fn join_agenda(&self, agenda_id: &str, join_key: &str) -> Result<Agenda, ActionError> {
        let join_key = join_key.trim();
        if join_key.is_empty() {
            return Err(ValidationError::WrongJoinKey.into());
        }
        let me = self.viewer()?;
        let agenda = self.load_agenda(agenda_id).await?;
        if agenda.join_key != join_key {
            return Err(ValidationError::WrongJoinKey.into());
        }

        let membership = json!({ "agenda_id": agenda.id, "user_id": me });
        match self
            .ctx
            .backend()
            .insert(Table::AgendaMember, membership)
            .await
        {
            Ok(_) => {}
            Err(ApiError::Conflict(_)) => return Err(ValidationError::AlreadyMember.into()),
            Err(e) => return Err(self.report("join agenda", e)),
        }

        log_cache_write("agenda list", self.ctx.cache.upsert_cached_agenda(&agenda));
        info!(agenda_id = %agenda.id, "Joined agenda");
        Ok(agenda)
    }

    pub async fn leave_agenda(&self, agenda_id: &str) -> Result<(), ActionError> {
        let me = self.viewer()?;
        let backend = self.ctx.backend();
        let mine = || Query::new().eq("agenda_id", agenda_id).eq("user_id", &me);

        self.checked(
            "leave agenda",
            futures::future::try_join(
                backend.delete(Table::AgendaMember, &mine()),
                backend.delete(Table::AgendaEditor, &mine()),
            )
            .await,
        )?;

        log_cache_write("left agenda", self.ctx.cache.forget_agenda(agenda_id));
        info!(agenda_id, "Left agenda");
        Ok(())
    }

    pub async fn delete_agenda(&self, agenda_id: &str) -> Result<(), ActionError> {
        let me = self.viewer()?;
        let agenda = self.load_agenda(agenda_id).await?;
        if !agenda.is_owned_by(&me) {
            return Err(ValidationError::NotOwner.into());
        }

        self.checked(
            "delete agenda",
            self.ctx
                .backend()
                .delete(Table::Agenda, &Query::new().eq("id", agenda_id))
                .await,
        )?;

        log_cache_write("deleted agenda", self.ctx.cache.forget_agenda(agenda_id));
        info!(agenda_id, "Agenda deleted");
        Ok(())
    }

    /// Append a section after the agenda's existing ones.
    pub async fn create_section(
        &self,
        agenda_id: &str,
        name: &str,
    ) -> Result<AgendaSection, ActionError> {
        let name = validate_section_name(name)?;
        let me = self.viewer()?;
        self.require_editor(agenda_id, &me).await?;
        let backend = self.ctx.backend();

        let existing: Vec<AgendaSection> = self.checked(
            "create section",
            fetch(
                backend,
                Table::AgendaSection,
                Query::new().eq("agenda_id", agenda_id),
            )
            .await,
        )?;
        let position = existing.iter().map(|s| s.position + 1).max().unwrap_or(0);

        let row = json!({ "agenda_id": agenda_id, "name": name, "position": position });
        let section: AgendaSection = self.checked(
            "create section",
            insert_one::<_, AgendaSection>(backend, Table::AgendaSection, &row).await,
        )?;

        let cached = self.ctx.cache.update_agenda_data(|bundle| {
            if bundle.agenda.id != section.agenda_id {
                return false;
            }
            bundle.sections.push(SectionWithElements {
                section: section.clone(),
                elements: Vec::new(),
            });
            true
        });
        log_cache_write("new section", cached.map(|_| ()));
        Ok(section)
    }

    pub async fn create_element(
        &self,
        agenda_id: &str,
        section_id: &str,
        title: &str,
        description: Option<&str>,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<AgendaElement, ActionError> {
        let title = validate_title(title)?;
        let me = self.viewer()?;
        self.require_editor(agenda_id, &me).await?;

        let row = json!({
            "agenda_id": agenda_id,
            "section_id": section_id,
            "title": title,
            "description": description.map(str::trim).filter(|d| !d.is_empty()),
            "deadline": deadline,
            "created_by": me,
        });
        let element: AgendaElement = self.checked(
            "create element",
            insert_one::<_, AgendaElement>(self.ctx.backend(), Table::AgendaElement, &row).await,
        )?;

        let cached = self.ctx.cache.update_agenda_data(|bundle| {
            match bundle
                .sections
                .iter_mut()
                .find(|s| s.section.id == element.section_id)
            {
                Some(section) => {
                    section.elements.push(element.clone());
                    true
                }
                None => false,
            }
        });
        log_cache_write("new element", cached.map(|_| ()));
        info!(element_id = %element.id, agenda_id, "Element created");
        Ok(element)
    }

    pub async fn delete_element(&self, element_id: &str) -> Result<(), ActionError> {
        let me = self.viewer()?;
        let backend = self.ctx.backend();

        let element: Option<AgendaElement> = self.checked(
            "delete element",
            fetch_one(
                backend,
                Table::AgendaElement,
                Query::new().eq("id", element_id),
            )
            .await,
        )?;
        let element = element
            .ok_or_else(|| ActionError::Api(ApiError::NotFound(format!("element {}", element_id))))?;
        self.require_editor(&element.agenda_id, &me).await?;

        self.checked(
            "delete element",
            backend
                .delete(Table::AgendaElement, &Query::new().eq("id", element_id))
                .await,
        )?;

        log_cache_write("deleted element", self.ctx.cache.forget_element(element_id));
        Ok(())
    }

    pub async fn set_urgent(&self, element_id: &str, urgent: bool) -> Result<(), ActionError> {
        self.set_annotation(element_id, Annotation::Urgent, urgent).await
    }

    pub async fn set_completed(&self, element_id: &str, completed: bool) -> Result<(), ActionError> {
        self.set_annotation(element_id, Annotation::Completed, completed)
            .await
    }

    async fn set_annotation(
        &self,
        element_id: &str,
        annotation: Annotation,
        on: bool,
    ) -> Result<(), ActionError> {
        let me = self.viewer()?;
        let backend = self.ctx.backend();
        let table = match annotation {
            Annotation::Urgent => Table::UrgentElement,
            Annotation::Completed => Table::CompletedElement,
        };

        let result = if on {
            let row = json!({ "user_id": me, "element_id": element_id });
            upsert_one(backend, table, &row).await
        } else {
            let query = Query::new().eq("user_id", &me).eq("element_id", element_id);
            backend.delete(table, &query).await
        };
        self.checked("annotate element", result)?;

        log_cache_write(
            "element annotation",
            self.ctx.cache.apply_annotation(element_id, annotation, on),
        );
        Ok(())
    }

    pub async fn add_agenda_comment(
        &self,
        agenda_id: &str,
        content: &str,
    ) -> Result<AgendaComment, ActionError> {
        let content = validate_comment(content)?;
        let me = self.viewer()?;
        let row = json!({ "agenda_id": agenda_id, "author_id": me, "content": content });
        self.checked(
            "comment on agenda",
            insert_one::<_, AgendaComment>(self.ctx.backend(), Table::AgendaComment, &row).await,
        )
    }

    async fn load_agenda(&self, agenda_id: &str) -> Result<Agenda, ActionError> {
        let agenda: Option<Agenda> = self.checked(
            "load agenda",
            fetch_one(
                self.ctx.backend(),
                Table::Agenda,
                Query::new().eq("id", agenda_id),
            )
            .await,
        )?;
        agenda.ok_or_else(|| ActionError::Api(ApiError::NotFound(format!("agenda {}", agenda_id))))
    }

    /// Owners and listed editors may change an agenda's contents.
    async fn require_editor(&self, agenda_id: &str, user_id: &str) -> Result<(), ActionError> {
        let backend = self.ctx.backend();
        let (agenda, editor) = self.checked(
            "check editor",
            tokio::try_join!(
                fetch_one::<Agenda>(backend, Table::Agenda, Query::new().eq("id", agenda_id)),
                fetch_one::<AgendaEditor>(
                    backend,
                    Table::AgendaEditor,
                    Query::new().eq("agenda_id", agenda_id).eq("user_id", user_id),
                ),
            ),
        )?;

        let agenda = agenda
            .ok_or_else(|| ActionError::Api(ApiError::NotFound(format!("agenda {}", agenda_id))))?;
        if agenda.is_owned_by(user_id) || editor.is_some() {
            Ok(())
        } else {
            Err(ValidationError::NotEditor.into())
        }
    }
}
