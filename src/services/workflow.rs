use crate::core::config::{ChatParams, Config};
use crate::core::preferences::StoryConfig;
use crate::core::state::{ApiKey, PendingIllustration, SceneNumber, SessionState, WizardStep};
use crate::services::illustration::Illustrator;
use crate::services::images::ImageClient;
use crate::services::llm::{ChatRequest, LlmClient};
use crate::services::outline::parse_outline;
use crate::services::presets::StylePresets;
use crate::services::prompt::{outline_prompt, story_prompt};
use crate::services::render::{render_document, RenderedDocument};
use crate::utils::text::strip_code_blocks;
use anyhow::Result;
use log::{debug, error, info, warn};
use std::fmt;

/// One user intent, handled in one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetCredential(String),
    Submit(StoryConfig),
    RequestIllustration { scene: u32 },
    RegenerateIllustration { scene: u32 },
    AcceptPlan,
    EditStory(String),
    BackToPlan,
    Finalize,
    BackToWriting,
    NewStory,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What a turn produced for the front end.
#[derive(Debug, Default)]
pub struct TurnReport {
    pub notices: Vec<Notice>,
    /// Set only by a successful `Finalize`.
    pub document: Option<RenderedDocument>,
}

impl TurnReport {
    fn push(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Error => error!("{}", message),
            NoticeLevel::Warning => warn!("{}", message),
            _ => info!("{}", message),
        }
        self.notices.push(Notice { level, message });
    }

    fn info(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Info, message);
    }

    fn success(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Success, message);
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Warning, message);
    }

    fn error(&mut self, message: impl Into<String>) {
        self.push(NoticeLevel::Error, message);
    }

    pub fn has_errors(&self) -> bool {
        self.notices.iter().any(|n| n.level == NoticeLevel::Error)
    }
}

/// Drives one wizard session: start, plan, writing, final.
///
/// Every external failure ends up as an error notice and the session keeps
/// its last valid state.
pub struct WorkflowManager {
    config: Config,
    llm: Box<dyn LlmClient>,
    images: Box<dyn ImageClient>,
    presets: Option<StylePresets>,
    session: SessionState,
}

impl WorkflowManager {
    pub fn new(
        config: Config,
        llm: Box<dyn LlmClient>,
        images: Box<dyn ImageClient>,
        presets: Option<StylePresets>,
    ) -> Self {
        Self {
            config,
            llm,
            images,
            presets,
            session: SessionState::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn step(&self) -> WizardStep {
        self.session.step
    }

    pub fn presets(&self) -> Option<&StylePresets> {
        self.presets.as_ref()
    }

    pub fn illustrations_available(&self) -> bool {
        self.presets.is_some()
    }

    /// Stored and allowed illustrations, when the story has them turned on.
    pub fn illustration_progress(&self) -> Option<(usize, usize)> {
        let prefs = self.session.preferences.as_ref()?;
        prefs.illustrations.as_ref()?;
        Some((self.session.images.len(), prefs.max_illustrations()))
    }

    /// Ollama runs locally; every other provider wants a key.
    pub fn needs_credential(&self) -> bool {
        self.config.llm.provider != "ollama"
    }

    pub fn has_credential(&self) -> bool {
        self.session.credential.is_some()
    }

    pub async fn handle(&mut self, action: Action) -> TurnReport {
        let mut report = TurnReport::default();
        let step = self.session.step;
        debug!("Handling {} at step {}", action_name(&action), step);

        match action {
            Action::SetCredential(raw) => match ApiKey::new(raw) {
                Some(key) => {
                    self.session.credential = Some(key);
                    report.success("API key set for this session");
                }
                None => report.error("The API key is empty"),
            },
            Action::NewStory => {
                self.session.new_story();
                report.info("Started a new story");
            }
            Action::Logout => {
                self.session.logout();
                report.info("Logged out; the API key was forgotten");
            }
            Action::Submit(prefs) => {
                self.submit(prefs, &mut report).await;
            }
            Action::RequestIllustration { scene } if step == WizardStep::Plan => {
                self.queue_illustration(scene, false, &mut report).await;
            }
            Action::RegenerateIllustration { scene } if step == WizardStep::Plan => {
                self.queue_illustration(scene, true, &mut report).await;
            }
            Action::AcceptPlan if step == WizardStep::Plan => {
                self.accept_plan(&mut report).await;
            }
            Action::EditStory(text) if step == WizardStep::Writing => {
                self.edit_story(text, &mut report);
            }
            Action::BackToPlan if step == WizardStep::Writing => {
                self.session.step = WizardStep::Plan;
            }
            Action::Finalize if step == WizardStep::Writing => {
                self.finalize(&mut report);
            }
            Action::BackToWriting if step == WizardStep::Final => {
                self.session.step = WizardStep::Writing;
            }
            other => {
                report.warning(format!(
                    "'{}' is not available at the {} step",
                    action_name(&other),
                    step
                ));
            }
        }

        report
    }

    fn credential_missing(&self, report: &mut TurnReport) -> bool {
        if self.needs_credential() && !self.has_credential() {
            report.error("Enter your API key first");
            return true;
        }
        false
    }

    async fn chat(&mut self, prompt: String, params: ChatParams) -> Result<String> {
        let model = self
            .session
            .preferences
            .as_ref()
            .map(|p| p.model.clone())
            .unwrap_or_else(|| self.config.llm.default_model());
        let request = ChatRequest {
            model,
            prompt,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .llm
            .chat(self.session.credential.as_ref(), &request)
            .await?;
        match response.usage {
            Some(usage) => self.session.ledger.add_chat(usage, &self.config.pricing),
            None => debug!("Chat response carried no token usage"),
        }
        Ok(response.text)
    }

    fn cost_notice(&self, report: &mut TurnReport) {
        let pricing = &self.config.pricing;
        report.info(format!(
            "Cost so far: {:.2} {}",
            self.session.ledger.cost_local(pricing),
            pricing.local_currency
        ));
    }

    async fn submit(&mut self, prefs: StoryConfig, report: &mut TurnReport) {
        if self.credential_missing(report) {
            return;
        }

        let mut prefs = prefs.normalized();
        if prefs.illustrations.is_some() && self.presets.is_none() {
            report.warning("No illustration styles are available, continuing without illustrations");
            prefs.illustrations = None;
        }
        let expected = prefs.chapter_count();

        // New preferences invalidate the plan, story and pictures at any step.
        self.session.clear_artifacts();
        self.session.step = WizardStep::Start;
        let prompt = outline_prompt(&prefs);
        self.session.preferences = Some(prefs);

        let params = self.config.generation.outline;
        let text = match self.chat(prompt, params).await {
            Ok(text) => text,
            Err(e) => {
                report.error(format!("Outline generation failed: {:#}", e));
                return;
            }
        };
        self.cost_notice(report);

        let outline = parse_outline(&text);
        if outline.is_empty() {
            report.error("The generated outline has no \"SCENE n:\" lines; try again");
            return;
        }
        if outline.len() != expected {
            report.warning(format!(
                "Asked for {} scenes, the outline has {}",
                expected,
                outline.len()
            ));
        }

        report.success(format!("Outline ready with {} scenes", outline.len()));
        self.session.outline = Some(outline);
        self.session.step = WizardStep::Plan;
    }

    async fn queue_illustration(&mut self, scene: u32, regenerate: bool, report: &mut TurnReport) {
        let Some(number) = SceneNumber::new(scene) else {
            report.warning("Scene numbers start at 1");
            return;
        };
        if regenerate {
            self.session.pending.regenerate = Some(number);
        } else {
            self.session.pending.generate = Some(number);
        }
        self.process_pending(report).await;
    }

    /// Consumes the pending slots. Both are empty afterwards, whatever happened.
    async fn process_pending(&mut self, report: &mut TurnReport) {
        let Some(pending) = self.session.pending.take() else {
            return;
        };
        let billed_before = self.session.ledger.images;
        let PendingIllustration { scene, regenerate } = pending;

        let illustrator = Illustrator::new(
            self.images.as_ref(),
            &self.config.images,
            self.presets.as_ref(),
        );
        let outcome = illustrator
            .illustrate(&mut self.session, pending, &self.config.pricing)
            .await;

        match outcome {
            Ok(_) => {
                let verb = if regenerate { "regenerated" } else { "ready" };
                match self.illustration_progress() {
                    Some((n, max)) => {
                        report.success(format!("Illustration for scene {} {} ({}/{})", scene, verb, n, max))
                    }
                    None => report.success(format!("Illustration for scene {} {}", scene, verb)),
                }
            }
            Err(e) if e.is_rejection() => report.warning(e.to_string()),
            Err(e) => report.error(e.to_string()),
        }

        if self.session.ledger.images != billed_before {
            self.cost_notice(report);
        }
    }

    async fn accept_plan(&mut self, report: &mut TurnReport) {
        if self.session.outline.as_ref().map_or(true, |o| o.is_empty()) {
            report.error("There is no outline to write from");
            return;
        }

        self.session.pending = Default::default();
        if self.illustration_progress().is_some() && self.session.images.is_empty() {
            report.warning("No illustrations were generated; the story will have none");
        }
        self.session.step = WizardStep::Writing;
        self.enter_writing(report).await;
    }

    /// Writes the story once per entry; an existing story is kept.
    async fn enter_writing(&mut self, report: &mut TurnReport) {
        if self.session.story.is_some() {
            return;
        }
        if self.credential_missing(report) {
            self.session.step = WizardStep::Plan;
            return;
        }

        let prompt = match (&self.session.preferences, &self.session.outline) {
            (Some(prefs), Some(outline)) => story_prompt(prefs, &outline.raw),
            _ => {
                report.error("Preferences or outline missing");
                self.session.step = WizardStep::Plan;
                return;
            }
        };

        let params = self.config.generation.story;
        match self.chat(prompt, params).await {
            Ok(text) => {
                self.cost_notice(report);
                let story = strip_code_blocks(&text).trim().to_string();
                if story.is_empty() {
                    report.error("The model returned an empty story");
                    self.session.step = WizardStep::Plan;
                    return;
                }
                report.success(format!("Story written ({} words)", story.split_whitespace().count()));
                self.session.story = Some(story);
            }
            Err(e) => {
                report.error(format!("Story generation failed: {:#}", e));
                self.session.step = WizardStep::Plan;
            }
        }
    }

    fn edit_story(&mut self, text: String, report: &mut TurnReport) {
        let text = text.trim().to_string();
        if text.is_empty() {
            report.warning("Ignoring an empty story; the previous text is kept");
            return;
        }
        if self.session.story.as_deref() != Some(text.as_str()) {
            self.session.story = Some(text);
            report.success("Story updated");
        }
    }

    /// Renders from the current story and images every time.
    fn finalize(&mut self, report: &mut TurnReport) {
        let Some(story) = self.session.story.as_deref() else {
            report.error("There is no story to render yet");
            return;
        };

        match render_document(story, &self.session.images, &self.config.document) {
            Ok(document) => {
                for w in &document.warnings {
                    report.warning(w.clone());
                }
                report.success(format!(
                    "Document ready: {} pages, {} illustrations",
                    document.page_count,
                    document.placements.len()
                ));
                report.info(format!(
                    "Session cost: {}",
                    self.session.ledger.summary(&self.config.pricing)
                ));
                self.session.step = WizardStep::Final;
                report.document = Some(document);
            }
            Err(e) => report.error(format!("Rendering failed: {:#}", e)),
        }
    }
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::SetCredential(_) => "set credential",
        Action::Submit(_) => "submit preferences",
        Action::RequestIllustration { .. } => "illustrate",
        Action::RegenerateIllustration { .. } => "regenerate illustration",
        Action::AcceptPlan => "accept plan",
        Action::EditStory(_) => "edit story",
        Action::BackToPlan => "back to plan",
        Action::Finalize => "finalize",
        Action::BackToWriting => "back to writing",
        Action::NewStory => "new story",
        Action::Logout => "logout",
    }
}
