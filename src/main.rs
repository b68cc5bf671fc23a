use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use story_factory::cli;
use story_factory::core::config::Config;
use story_factory::core::io::{NativeStorage, Storage};
use story_factory::services::images::create_image_client;
use story_factory::services::llm::create_llm;
use story_factory::services::presets::StylePresets;
use story_factory::services::workflow::WorkflowManager;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // A missing config.yml means defaults; a broken one stops here.
    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            eprintln!("Please fix 'config.yml' or remove it to use the defaults.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    let presets = StylePresets::load_or_disable(Path::new(&config.images.presets_file));
    if presets.is_none() {
        println!("Illustration styles not found; stories will have no pictures.");
    }

    let llm = create_llm(&config.llm)?;
    let images = create_image_client(&config.images);
    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());

    let mut manager = WorkflowManager::new(config, llm, images, presets);
    cli::run(&mut manager, storage).await?;

    Ok(())
}
