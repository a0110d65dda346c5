use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use agendacache_core::actions::{ActionError, Actions};
use agendacache_core::api::{Backend, ErrorKind, RestClient};
use agendacache_core::auth::{AuthService, SessionContext};
use agendacache_core::cache::{age_display, CacheManager};
use agendacache_core::connectivity::Connectivity;
use agendacache_core::models::{ElementView, Profile, ProfileFeed};
use agendacache_core::sync::{
    AgendaScreen, DataSource, HomeScreen, HomeState, ProfileScreen, SyncContext,
};
use agendacache_core::Config;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::Command;

pub struct App {
    config: Config,
    auth: AuthService,
    cache: Arc<CacheManager>,
    backend: Arc<dyn Backend>,
    session: SessionContext,
    connectivity: Connectivity,
}

fn action_failed(e: ActionError) -> anyhow::Error {
    anyhow!(e.user_message())
}

fn describe(source: DataSource) -> String {
    match source {
        DataSource::Network => "live".to_string(),
        DataSource::Cache => "cached".to_string(),
        DataSource::Offline => "offline, showing cached data".to_string(),
        DataSource::Fallback(ErrorKind::Authorization) => {
            "session expired, showing cached data; run `agendacache login`".to_string()
        }
        DataSource::Fallback(kind) => format!("refresh failed ({:?}), showing cached data", kind),
    }
}

fn print_home(state: &HomeState, source: DataSource) {
    println!("Agendas ({})", describe(source));
    for agenda in &state.agendas {
        println!("  {}  ({})", agenda.name, agenda.id);
    }
    if !state.urgent.is_empty() {
        println!("\nUrgent");
        for item in &state.urgent {
            println!("  {}", format_item(item));
        }
    }
    if !state.completed.is_empty() {
        println!("\nCompleted");
        for item in &state.completed {
            println!("  {}", format_item(item));
        }
    }
    if let Some(ref profile) = state.profile {
        println!();
        print_profile(profile);
    }
}

fn print_agenda(screen: &AgendaScreen, source: DataSource) {
    let Some(bundle) = screen.bundle() else {
        return;
    };
    println!("{} ({})", bundle.agenda.name, describe(source));
    if let Some(ref description) = bundle.agenda.description {
        println!("{}", description);
    }
    let members: Vec<&str> = bundle.members.iter().map(|m| m.username.as_str()).collect();
    println!("Members: {}", members.join(", "));

    for section in screen.sections() {
        println!("\n{}  ({})", section.section.name, section.section.id);
        for item in &section.items {
            println!("  {}", format_item(item));
        }
    }

    if !screen.comments().is_empty() {
        println!("\nComments");
        for comment in screen.comments() {
            println!("  {}: {}", comment.author_id, comment.content);
        }
    }
}

fn format_item(item: &ElementView) -> String {
    let mark = match (item.is_completed, item.is_urgent) {
        (true, _) => "[x]",
        (false, true) => "[!]",
        (false, false) => "[ ]",
    };
    let deadline = item
        .element
        .deadline
        .map(|d| format!("  due {}", d.format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    format!("{} {}{}  ({})", mark, item.element.title, deadline, item.element.id)
}

fn print_profile(profile: &Profile) {
    println!("{}  ({})", profile.username, profile.id);
    println!("  credits: {}", profile.display_credits());
    if let Some(ref bio) = profile.bio {
        println!("  {}", bio);
    }
}

fn print_feed(feed: &ProfileFeed) {
    let reactions: Vec<String> = feed
        .reaction_counts()
        .into_iter()
        .map(|(kind, n)| format!("{} x{}", kind, n))
        .collect();
    if !reactions.is_empty() {
        println!("  reactions: {}", reactions.join(", "));
    }
    for comment in &feed.comments {
        println!(
            "  {} {}: {}",
            comment.created_at.format("%Y-%m-%d"),
            comment.author_id,
            comment.content
        );
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

impl App {
    /// Load configuration, restore the last session, prune stale agenda
    /// cache entries and probe the backend.
    pub async fn new() -> Result<Self> {
        let mut config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        config.apply_env();

        let (url, anon_key) = config.backend()?;
        let session = SessionContext::new();
        let backend: Arc<dyn Backend> =
            Arc::new(RestClient::new(url, anon_key, session.clone())?);

        let base_dir = config.base_dir()?;
        let mut auth = AuthService::new(Arc::clone(&backend), session.clone(), base_dir);
        if auth.restore().await {
            config.last_user_id = session.user_id();
        }

        let cache_dir = config.cache_dir()?;
        debug!(?cache_dir, "Cache directory configured");
        let cache = Arc::new(CacheManager::open(cache_dir).context("Failed to open cache")?);
        match cache.cleanup_old_cache() {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, "Pruned stale agenda cache entries"),
            Err(e) => warn!(error = %e, "Agenda cache cleanup failed"),
        }

        let connectivity = Connectivity::offline();
        connectivity.probe(backend.as_ref()).await;

        Ok(Self {
            config,
            auth,
            cache,
            backend,
            session,
            connectivity,
        })
    }

    fn ctx(&self) -> SyncContext {
        SyncContext::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.backend),
            self.session.clone(),
            self.connectivity.clone(),
        )
    }

    fn actions(&self) -> Actions {
        Actions::new(self.ctx())
    }

    fn save_config(&self) {
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    pub async fn run(&mut self, command: Command, json: bool) -> Result<()> {
        match command {
            Command::Login { email } => self.login(email).await,
            Command::Signup { email, username } => self.signup(&email, &username).await,
            Command::Logout => self.logout().await,
            Command::Status => {
                self.status();
                Ok(())
            }
            Command::Agendas => self.agendas(json).await,
            Command::Agenda { id } => self.agenda(&id, json).await,
            Command::Profile { user_id, follow } => self.profile(user_id, follow).await,
            Command::Create { name, description } => {
                let agenda = self
                    .actions()
                    .create_agenda(&name, description.as_deref())
                    .await
                    .map_err(action_failed)?;
                println!("Created {} ({}), join key {}", agenda.name, agenda.id, agenda.join_key);
                Ok(())
            }
            Command::Join { id, key } => {
                let agenda = self
                    .actions()
                    .join_agenda(&id, &key)
                    .await
                    .map_err(action_failed)?;
                println!("Joined {}", agenda.name);
                Ok(())
            }
            Command::Leave { id } => {
                self.actions().leave_agenda(&id).await.map_err(action_failed)?;
                println!("Left agenda {}", id);
                Ok(())
            }
            Command::Delete { id } => {
                self.actions().delete_agenda(&id).await.map_err(action_failed)?;
                println!("Deleted agenda {}", id);
                Ok(())
            }
            Command::Section { agenda_id, name } => {
                let section = self
                    .actions()
                    .create_section(&agenda_id, &name)
                    .await
                    .map_err(action_failed)?;
                println!("Added section {} ({})", section.name, section.id);
                Ok(())
            }
            Command::Add {
                agenda_id,
                section_id,
                title,
                deadline,
            } => {
                let deadline = deadline
                    .map(|d| {
                        DateTime::parse_from_rfc3339(&d)
                            .map(|d| d.with_timezone(&Utc))
                            .with_context(|| format!("Invalid deadline: {}", d))
                    })
                    .transpose()?;
                let element = self
                    .actions()
                    .create_element(&agenda_id, &section_id, &title, None, deadline)
                    .await
                    .map_err(action_failed)?;
                println!("Added {} ({})", element.title, element.id);
                Ok(())
            }
            Command::Remove { element_id } => {
                self.actions()
                    .delete_element(&element_id)
                    .await
                    .map_err(action_failed)?;
                println!("Removed {}", element_id);
                Ok(())
            }
            Command::Urgent { element_id, off } => {
                self.actions()
                    .set_urgent(&element_id, !off)
                    .await
                    .map_err(action_failed)?;
                Ok(())
            }
            Command::Done { element_id, undo } => {
                self.actions()
                    .set_completed(&element_id, !undo)
                    .await
                    .map_err(action_failed)?;
                Ok(())
            }
            Command::Comment { agenda_id, text } => {
                self.actions()
                    .add_agenda_comment(&agenda_id, &text)
                    .await
                    .map_err(action_failed)?;
                Ok(())
            }
            Command::Cleanup => {
                let pruned = self.cache.cleanup_old_cache()?;
                println!("Pruned {} cached agenda(s)", pruned);
                Ok(())
            }
            Command::DeleteAccount { yes } => {
                if !yes {
                    bail!("This permanently deletes your account. Re-run with --yes to confirm.");
                }
                self.actions()
                    .delete_account(&mut self.auth)
                    .await
                    .map_err(action_failed)?;
                self.config.last_user_id = None;
                self.save_config();
                println!("Account deleted");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    async fn login(&mut self, email: Option<String>) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt("Email: ")?,
        };
        if email.is_empty() {
            bail!("Email required");
        }
        let password = rpassword::prompt_password("Password: ")?;

        let data = self.auth.sign_in(&email, &password).await.map_err(|e| {
            match e.kind() {
                ErrorKind::Authorization | ErrorKind::Constraint => {
                    anyhow!("Invalid email or password")
                }
                ErrorKind::Transient => {
                    anyhow!("Unable to connect to server. Check your internet connection.")
                }
                ErrorKind::Unknown => anyhow!("Login failed: {}", e),
            }
        })?;

        self.config.last_email = Some(email);
        self.config.last_user_id = Some(data.user_id);
        self.save_config();
        info!("Login successful");
        println!("Signed in");
        Ok(())
    }

    async fn signup(&mut self, email: &str, username: &str) -> Result<()> {
        let username = agendacache_core::actions::validate_username(username)
            .map_err(|e| anyhow!(e.to_string()))?;
        let password = rpassword::prompt_password("Choose a password: ")?;

        let signed_in = self.auth.sign_up(email, &password, &username).await?;
        self.config.last_email = Some(email.to_string());
        if signed_in {
            self.config.last_user_id = self.session.user_id();
            println!("Account created, signed in");
        } else {
            println!("Account created. Confirm your email, then run `agendacache login`.");
        }
        self.save_config();
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.actions()
            .sign_out(&mut self.auth)
            .await
            .map_err(action_failed)?;
        self.config.last_user_id = None;
        self.save_config();
        println!("Signed out");
        Ok(())
    }

    fn status(&self) {
        match self.session.session() {
            Some(data) => println!(
                "Signed in as {} (token valid {} more minutes)",
                data.email,
                data.minutes_until_expiry()
            ),
            None => println!("Signed out"),
        }
        println!(
            "Backend: {}",
            if self.connectivity.is_reachable() {
                "reachable"
            } else {
                "unreachable"
            }
        );
        println!("Last sync: {}", self.cache.last_sync_display());
        println!("Cached agendas: {}", self.cache.load_agendas().len());

        let now = Utc::now();
        for id in self.cache.cached_agenda_ids() {
            if let Some(entry) = self.cache.get_agenda_entry(&id) {
                println!(
                    "  {} ({}), cached {}",
                    entry.data.agenda.name,
                    id,
                    age_display(entry.timestamp, now)
                );
            }
        }
    }

    // =========================================================================
    // Screens
    // =========================================================================

    async fn agendas(&self, json: bool) -> Result<()> {
        let mut home = HomeScreen::new(self.ctx());
        if json {
            home.mount().await;
            println!("{}", serde_json::to_string_pretty(&home.state().agendas)?);
            return Ok(());
        }

        let cached = home.show_cached();
        let shown_cached = !home.state().agendas.is_empty();
        if shown_cached {
            print_home(home.state(), cached);
        }

        let before = home.state().clone();
        let source = home.refresh().await;
        if !shown_cached || home.state() != &before {
            if shown_cached {
                println!("\n-- refreshed");
            }
            print_home(home.state(), source);
        } else {
            println!("\n({})", describe(source));
        }
        Ok(())
    }

    async fn agenda(&self, id: &str, json: bool) -> Result<()> {
        let mut screen = AgendaScreen::new(self.ctx(), id);
        if json {
            let source = screen.mount().await;
            let Some(bundle) = screen.bundle() else {
                bail!("Agenda {} is not available ({})", id, describe(source));
            };
            println!("{}", serde_json::to_string_pretty(bundle)?);
            return Ok(());
        }

        let cached = screen.show_cached();
        let before = screen.bundle().cloned();
        if before.is_some() {
            print_agenda(&screen, cached);
        }

        let source = screen.refresh().await;
        if screen.bundle().is_none() {
            bail!("Agenda {} is not available ({})", id, describe(source));
        }
        if before.as_ref() != screen.bundle() || !screen.comments().is_empty() {
            if before.is_some() {
                println!("\n-- refreshed");
            }
            print_agenda(&screen, source);
        } else {
            println!("\n({})", describe(source));
        }
        Ok(())
    }

    async fn profile(&self, user_id: Option<String>, follow: Option<u64>) -> Result<()> {
        let user_id = user_id
            .or_else(|| self.session.user_id())
            .ok_or_else(|| anyhow!("Not signed in; pass a user id"))?;

        let mut screen = ProfileScreen::new(self.ctx(), user_id.clone());
        screen.show_cached();
        if let Some(profile) = screen.profile() {
            print_profile(profile);
            println!("(cached, refreshing)\n");
        }
        let source = screen.refresh().await;
        match screen.profile() {
            Some(profile) => print_profile(profile),
            None => println!("Profile {} not available ({})", user_id, describe(source)),
        }
        print_feed(screen.feed());

        let Some(seconds) = follow else {
            return Ok(());
        };
        if !source.is_live() {
            bail!("Cannot follow a profile while offline");
        }

        let mut feed = screen.start_live_feed();
        let until = tokio::time::sleep(Duration::from_secs(seconds));
        tokio::pin!(until);
        loop {
            tokio::select! {
                _ = &mut until => break,
                changed = feed.updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let latest = feed.updates.borrow_and_update().clone();
                    println!("-- updated {}", Utc::now().format("%H:%M:%S"));
                    print_feed(&latest);
                    screen.apply_feed(latest);
                }
            }
        }
        screen.scope().unmount();
        Ok(())
    }
}
