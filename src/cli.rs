use crate::core::config::Config;
use crate::core::io::Storage;
use crate::core::preferences::StoryConfig;
use crate::core::state::WizardStep;
use crate::services::render::{RenderedDocument, PDF_MIME};
use crate::services::setup::{ask_credential, ask_scene, collect_preferences};
use crate::services::workflow::{Action, NoticeLevel, TurnReport, WorkflowManager};
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, InquireError, Select};
use log::{debug, info};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const STORY_FILE: &str = "story.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    CreateStory,
    ChangePreferences,
    Illustrate,
    Regenerate,
    WriteStory,
    EditStory,
    BackToPlan,
    CreatePdf,
    BackToWriting,
    NewStory,
    Logout,
    Quit,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Choice::CreateStory => "Create a story",
            Choice::ChangePreferences => "Change the story preferences",
            Choice::Illustrate => "Illustrate a scene",
            Choice::Regenerate => "Regenerate an illustration",
            Choice::WriteStory => "Accept the plan and write the story",
            Choice::EditStory => "Edit the story",
            Choice::BackToPlan => "Back to the plan",
            Choice::CreatePdf => "Create the PDF",
            Choice::BackToWriting => "Back to the story",
            Choice::NewStory => "Start a new story",
            Choice::Logout => "Log out",
            Choice::Quit => "Quit",
        };
        f.write_str(label)
    }
}

/// Where the story is exported for editing.
pub fn story_path(config: &Config) -> String {
    Path::new(&config.build_folder)
        .join(STORY_FILE)
        .to_string_lossy()
        .to_string()
}

/// Where the finished document lands.
pub fn pdf_path(config: &Config) -> String {
    Path::new(&config.output_folder)
        .join(&config.document.file_name)
        .to_string_lossy()
        .to_string()
}

pub async fn export_story(storage: &dyn Storage, config: &Config, story: &str) -> Result<String> {
    let path = story_path(config);
    storage.write(&path, story.as_bytes()).await?;
    Ok(path)
}

/// Reads the edited story back and removes the working copy.
pub async fn import_story(storage: &dyn Storage, config: &Config) -> Result<String> {
    let path = story_path(config);
    if !storage.exists(&path).await? {
        bail!("{} is missing; the story was left unchanged", path);
    }
    let text = storage.read_to_string(&path).await?;
    storage.delete(&path).await?;
    Ok(text)
}

pub async fn save_document(
    storage: &dyn Storage,
    config: &Config,
    document: &RenderedDocument,
) -> Result<String> {
    let path = pdf_path(config);
    storage.write(&path, &document.bytes).await?;
    info!("Wrote {} ({}, {} bytes)", path, PDF_MIME, document.bytes.len());
    Ok(path)
}

fn print_report(report: &TurnReport) {
    for notice in &report.notices {
        match notice.level {
            NoticeLevel::Info => println!("  {}", notice),
            NoticeLevel::Success => println!("✔ {}", notice),
            NoticeLevel::Warning => println!("! {}", notice),
            NoticeLevel::Error => eprintln!("✖ {}", notice),
        }
    }
}

async fn run_with_spinner(
    manager: &mut WorkflowManager,
    action: Action,
    message: &str,
) -> Result<TurnReport> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));

    let report = manager.handle(action).await;
    pb.finish_and_clear();
    print_report(&report);
    Ok(report)
}

async fn run_quiet(manager: &mut WorkflowManager, action: Action) -> TurnReport {
    let report = manager.handle(action).await;
    print_report(&report);
    report
}

fn is_interrupt(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<InquireError>(),
        Some(InquireError::OperationInterrupted)
    )
}

fn menu(step: WizardStep, manager: &WorkflowManager) -> Vec<Choice> {
    step_choices(
        step,
        manager.illustration_progress(),
        !manager.session().images.is_empty(),
    )
}

fn step_choices(step: WizardStep, progress: Option<(usize, usize)>, has_images: bool) -> Vec<Choice> {
    match step {
        WizardStep::Start => vec![Choice::CreateStory, Choice::Logout, Choice::Quit],
        WizardStep::Plan => {
            let mut choices = Vec::new();
            if let Some((done, max)) = progress {
                if done < max {
                    choices.push(Choice::Illustrate);
                }
                if has_images {
                    choices.push(Choice::Regenerate);
                }
            }
            choices.extend([
                Choice::WriteStory,
                Choice::ChangePreferences,
                Choice::NewStory,
                Choice::Quit,
            ]);
            choices
        }
        WizardStep::Writing => vec![
            Choice::CreatePdf,
            Choice::EditStory,
            Choice::BackToPlan,
            Choice::ChangePreferences,
            Choice::NewStory,
            Choice::Quit,
        ],
        WizardStep::Final => vec![
            Choice::BackToWriting,
            Choice::ChangePreferences,
            Choice::NewStory,
            Choice::Logout,
            Choice::Quit,
        ],
    }
}

fn show_plan(manager: &WorkflowManager) {
    let session = manager.session();
    let Some(outline) = session.outline.as_ref() else {
        return;
    };
    println!("\nStory plan:");
    for scene in &outline.scenes {
        let mark = if session.images.contains(scene.number) { "🖼" } else { " " };
        println!("{} {}", mark, scene.text);
    }
    if let Some((done, max)) = manager.illustration_progress() {
        println!("Illustrations: {}/{}", done, max);
    }
    println!();
}

fn show_story(manager: &WorkflowManager) {
    if let Some(story) = manager.session().story.as_deref() {
        let preview: String = story.lines().take(12).collect::<Vec<_>>().join("\n");
        println!("\n{}\n...\n({} words)\n", preview, story.split_whitespace().count());
    }
}

/// Interactive wizard. Returns when the user quits.
pub async fn run(manager: &mut WorkflowManager, storage: Arc<dyn Storage>) -> Result<()> {
    let mut last_prefs: Option<StoryConfig> = None;

    loop {
        if manager.needs_credential() && !manager.has_credential() {
            match ask_credential() {
                Ok(key) => {
                    run_quiet(manager, Action::SetCredential(key)).await;
                    continue;
                }
                Err(e) if is_interrupt(&e) => break,
                Err(e) => {
                    eprintln!("✖ {}", e);
                    continue;
                }
            }
        }

        let step = manager.step();
        debug!("Wizard at step {}", step);
        match step {
            WizardStep::Plan => show_plan(manager),
            WizardStep::Writing => show_story(manager),
            _ => {}
        }

        let choice = match Select::new("What next?", menu(step, manager)).prompt() {
            Ok(choice) => choice,
            Err(InquireError::OperationCanceled) => continue,
            Err(_) => break,
        };

        let outcome = handle_choice(manager, storage.as_ref(), choice, &mut last_prefs).await;
        match outcome {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if is_interrupt(&e) => break,
            Err(e) => eprintln!("✖ {:#}", e),
        }
    }

    let ledger = &manager.session().ledger;
    if ledger.images > 0 || ledger.prompt_tokens > 0 {
        println!("Session cost: {}", ledger.summary(&manager.config().pricing));
    }
    println!("Goodbye!");
    Ok(())
}

/// `Ok(false)` ends the loop.
async fn handle_choice(
    manager: &mut WorkflowManager,
    storage: &dyn Storage,
    choice: Choice,
    last_prefs: &mut Option<StoryConfig>,
) -> Result<bool> {
    match choice {
        Choice::CreateStory | Choice::ChangePreferences => {
            if choice == Choice::ChangePreferences {
                let proceed = Confirm::new("This discards the plan, the story and the pictures. Continue?")
                    .with_default(false)
                    .prompt()?;
                if !proceed {
                    return Ok(true);
                }
            }
            let prefs = collect_preferences(manager.config(), manager.presets(), last_prefs.as_ref())?;
            *last_prefs = Some(prefs.clone());
            run_with_spinner(manager, Action::Submit(prefs), "Writing the story plan...").await?;
        }
        Choice::Illustrate | Choice::Regenerate => {
            let count = manager.session().outline.as_ref().map_or(0, |o| o.len());
            let scene = ask_scene("Scene number:", count)?;
            let action = if choice == Choice::Illustrate {
                Action::RequestIllustration { scene }
            } else {
                Action::RegenerateIllustration { scene }
            };
            run_with_spinner(manager, action, "Drawing...").await?;
        }
        Choice::WriteStory => {
            run_with_spinner(manager, Action::AcceptPlan, "Writing the story...").await?;
        }
        Choice::EditStory => {
            let story = manager.session().story.clone().unwrap_or_default();
            let path = export_story(storage, manager.config(), &story).await?;
            println!("The story was saved to {}. Edit it and save the file.", path);
            let done = Confirm::new("Done editing?").with_default(true).prompt()?;
            if done {
                let text = import_story(storage, manager.config()).await?;
                run_quiet(manager, Action::EditStory(text)).await;
            }
        }
        Choice::BackToPlan => {
            run_quiet(manager, Action::BackToPlan).await;
        }
        Choice::CreatePdf => {
            let report = run_with_spinner(manager, Action::Finalize, "Laying out the PDF...").await?;
            if let Some(document) = report.document {
                let path = save_document(storage, manager.config(), &document).await?;
                println!("✔ Saved {} ({} pages)", path, document.page_count);
            }
        }
        Choice::BackToWriting => {
            run_quiet(manager, Action::BackToWriting).await;
        }
        Choice::NewStory => {
            run_quiet(manager, Action::NewStory).await;
        }
        Choice::Logout => {
            *last_prefs = None;
            run_quiet(manager, Action::Logout).await;
        }
        Choice::Quit => return Ok(false),
    }
    Ok(true)
}
