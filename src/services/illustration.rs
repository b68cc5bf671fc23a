use crate::core::config::PricingConfig;
use crate::core::state::{PendingIllustration, SceneNumber, SessionState};
use crate::services::images::{GeneratedImage, ImageClient, ImageConfig, ImageRequest};
use crate::services::presets::StylePresets;
use crate::utils::text::{strip_formatting, strip_scene_markers};
use log::{info, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IllustrationError {
    #[error("Illustrations are turned off for this story")]
    Disabled,
    #[error("There is no outline to illustrate yet")]
    NoOutline,
    #[error("Scene {scene} is outside the outline (1-{len})")]
    SceneOutOfRange { scene: u32, len: usize },
    #[error("Scene {0} has no description to illustrate")]
    EmptyScene(SceneNumber),
    #[error("Illustration limit of {0} reached")]
    LimitReached(usize),
    #[error("Illustration for scene {scene} failed: {cause:#}")]
    Generation { scene: SceneNumber, cause: anyhow::Error },
}

impl IllustrationError {
    /// Local rejections never touch the network or the session.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, IllustrationError::Generation { .. })
    }
}

/// Image prompt: no lettering, the cleaned scene, then the style.
pub fn image_prompt(description: &str, style: &str, fragment: &str) -> String {
    format!(
        "ABSOLUTELY NO LETTERS, CAPTIONS, TEXT OR FRAMES.\n\
         This is an illustration for a storybook.\n\
         Scene description: {}.\n\
         Art style: {} - {}.",
        description.trim_end_matches('.'),
        style.to_lowercase(),
        fragment
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct IllustrationPlan {
    pub scene: SceneNumber,
    pub regenerate: bool,
    pub request: ImageRequest,
}

pub struct Illustrator<'a> {
    client: &'a dyn ImageClient,
    config: &'a ImageConfig,
    presets: Option<&'a StylePresets>,
}

impl<'a> Illustrator<'a> {
    pub fn new(
        client: &'a dyn ImageClient,
        config: &'a ImageConfig,
        presets: Option<&'a StylePresets>,
    ) -> Self {
        Self {
            client,
            config,
            presets,
        }
    }

    /// Validates against the session and builds the image request.
    pub fn plan(
        &self,
        session: &SessionState,
        pending: PendingIllustration,
    ) -> Result<IllustrationPlan, IllustrationError> {
        let presets = self.presets.ok_or(IllustrationError::Disabled)?;
        let settings = session
            .preferences
            .as_ref()
            .and_then(|p| p.illustrations.as_ref())
            .ok_or(IllustrationError::Disabled)?;
        let outline = session
            .outline
            .as_ref()
            .filter(|o| !o.is_empty())
            .ok_or(IllustrationError::NoOutline)?;

        let scene = outline
            .scene(pending.scene)
            .ok_or(IllustrationError::SceneOutOfRange {
                scene: pending.scene.get(),
                len: outline.len(),
            })?;

        let description = strip_formatting(&strip_scene_markers(&scene.text));
        if description.is_empty() {
            return Err(IllustrationError::EmptyScene(pending.scene));
        }

        let already_drawn = session.images.contains(pending.scene);
        let max = settings.max_count as usize;
        if !already_drawn && session.images.len() >= max {
            return Err(IllustrationError::LimitReached(max));
        }

        let fragment = presets.fragment(&settings.style).unwrap_or_else(|| {
            warn!("Unknown illustration style '{}', sending it without a preset", settings.style);
            ""
        });

        Ok(IllustrationPlan {
            scene: pending.scene,
            regenerate: pending.regenerate,
            request: ImageRequest {
                model: self.config.model.clone(),
                prompt: image_prompt(&description, &settings.style, fragment),
                size: self.config.size.clone(),
            },
        })
    }

    /// Plans, generates and stores one image.
    ///
    /// The image is billed as soon as the endpoint produced it. The stored
    /// bytes for the scene only change once the download succeeded.
    pub async fn illustrate(
        &self,
        session: &mut SessionState,
        pending: PendingIllustration,
        pricing: &PricingConfig,
    ) -> Result<IllustrationPlan, IllustrationError> {
        let plan = self.plan(session, pending)?;
        let scene = plan.scene;

        info!(
            "{} illustration for scene {}",
            if plan.regenerate { "Regenerating" } else { "Generating" },
            scene
        );

        let generated = self
            .client
            .generate(session.credential.as_ref(), &plan.request)
            .await
            .map_err(|cause| IllustrationError::Generation { scene, cause })?;
        session.ledger.add_images(1, pricing);

        let bytes = match generated {
            GeneratedImage::Inline(bytes) => bytes,
            GeneratedImage::Url(url) => self
                .client
                .download(&url)
                .await
                .map_err(|cause| IllustrationError::Generation { scene, cause })?,
        };

        session.images.insert(scene, bytes);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::preferences::StoryConfig;
    use crate::services::outline::parse_outline;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use url::Url;

    #[derive(Debug, Default)]
    struct MockImages {
        prompts: Arc<Mutex<Vec<String>>>,
        fail_generate: bool,
        fail_download: bool,
        inline: bool,
    }

    #[async_trait]
    impl ImageClient for MockImages {
        async fn generate(
            &self,
            _key: Option<&crate::core::state::ApiKey>,
            request: &ImageRequest,
        ) -> Result<GeneratedImage> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if self.fail_generate {
                return Err(anyhow!("content policy violation"));
            }
            if self.inline {
                Ok(GeneratedImage::Inline(vec![7, 7, 7]))
            } else {
                Ok(GeneratedImage::Url(Url::parse("https://img.example.com/x.png")?))
            }
        }

        async fn download(&self, _url: &Url) -> Result<Vec<u8>> {
            if self.fail_download {
                Err(anyhow!("timed out"))
            } else {
                Ok(vec![1, 2, 3])
            }
        }
    }

    fn presets() -> StylePresets {
        StylePresets::from_json(r#"{ "Watercolor": "soft watercolor washes" }"#).unwrap()
    }

    fn session(max: u8) -> SessionState {
        let mut session = SessionState::new();
        session.preferences = Some(StoryConfig::new("gpt-4o-mini").with_illustrations("Watercolor", max));
        session.outline = Some(parse_outline(
            "SCENE 1: The fox wakes up.\nSCENE 2: The fox meets an owl.\nSCENE 3:",
        ));
        session
    }

    fn pending(n: u32, regenerate: bool) -> PendingIllustration {
        PendingIllustration {
            scene: SceneNumber::new(n).unwrap(),
            regenerate,
        }
    }

    #[test]
    fn test_image_prompt_shape() {
        let prompt = image_prompt("The fox wakes up.", "Watercolor", "soft washes");
        assert!(prompt.starts_with("ABSOLUTELY NO LETTERS"));
        assert!(prompt.contains("Scene description: The fox wakes up."));
        assert!(prompt.contains("Art style: watercolor - soft washes."));
    }

    #[test]
    fn test_plan_strips_scene_marker() {
        let client = MockImages::default();
        let config = ImageConfig::default();
        let presets = presets();
        let illustrator = Illustrator::new(&client, &config, Some(&presets));

        let plan = illustrator.plan(&session(3), pending(2, false)).unwrap();
        assert!(plan.request.prompt.contains("Scene description: The fox meets an owl."));
        assert!(!plan.request.prompt.contains("SCENE 2"));
        assert_eq!(plan.request.size, "1024x1024");
    }

    #[test]
    fn test_plan_rejections() {
        let client = MockImages::default();
        let config = ImageConfig::default();
        let presets = presets();
        let illustrator = Illustrator::new(&client, &config, Some(&presets));

        let err = illustrator.plan(&session(3), pending(4, false)).unwrap_err();
        assert!(matches!(err, IllustrationError::SceneOutOfRange { scene: 4, len: 3 }));

        let err = illustrator.plan(&session(3), pending(3, false)).unwrap_err();
        assert!(matches!(err, IllustrationError::EmptyScene(_)));

        let mut full = session(1);
        full.images.insert(SceneNumber::new(1).unwrap(), vec![0]);
        let err = illustrator.plan(&full, pending(2, false)).unwrap_err();
        assert!(matches!(err, IllustrationError::LimitReached(1)));
        // Redrawing an existing scene is not a new illustration.
        assert!(illustrator.plan(&full, pending(1, true)).is_ok());

        let mut off = session(3);
        off.preferences = Some(StoryConfig::new("gpt-4o-mini"));
        assert!(matches!(
            illustrator.plan(&off, pending(1, false)).unwrap_err(),
            IllustrationError::Disabled
        ));

        let no_presets = Illustrator::new(&client, &config, None);
        assert!(matches!(
            no_presets.plan(&session(3), pending(1, false)).unwrap_err(),
            IllustrationError::Disabled
        ));
    }

    #[tokio::test]
    async fn test_illustrate_downloads_and_bills() {
        let client = MockImages::default();
        let config = ImageConfig::default();
        let presets = presets();
        let illustrator = Illustrator::new(&client, &config, Some(&presets));
        let pricing = PricingConfig::default();
        let mut session = session(3);

        illustrator
            .illustrate(&mut session, pending(1, false), &pricing)
            .await
            .unwrap();
        assert_eq!(session.images.get(SceneNumber::new(1).unwrap()), Some(&[1u8, 2, 3][..]));
        assert_eq!(session.ledger.images, 1);
    }

    #[tokio::test]
    async fn test_inline_image_needs_no_download() {
        let client = MockImages {
            inline: true,
            fail_download: true,
            ..Default::default()
        };
        let config = ImageConfig::default();
        let presets = presets();
        let illustrator = Illustrator::new(&client, &config, Some(&presets));
        let mut session = session(3);

        illustrator
            .illustrate(&mut session, pending(2, false), &PricingConfig::default())
            .await
            .unwrap();
        assert_eq!(session.images.get(SceneNumber::new(2).unwrap()), Some(&[7u8, 7, 7][..]));
    }

    #[tokio::test]
    async fn test_failed_download_keeps_previous_image() {
        let client = MockImages {
            fail_download: true,
            ..Default::default()
        };
        let config = ImageConfig::default();
        let presets = presets();
        let illustrator = Illustrator::new(&client, &config, Some(&presets));
        let mut session = session(3);
        let scene = SceneNumber::new(1).unwrap();
        session.images.insert(scene, vec![42]);

        let err = illustrator
            .illustrate(&mut session, pending(1, true), &PricingConfig::default())
            .await
            .unwrap_err();
        assert!(!err.is_rejection());
        assert_eq!(session.images.get(scene), Some(&[42u8][..]));
    }

    #[tokio::test]
    async fn test_failed_generation_is_not_billed() {
        let client = MockImages {
            fail_generate: true,
            ..Default::default()
        };
        let config = ImageConfig::default();
        let presets = presets();
        let illustrator = Illustrator::new(&client, &config, Some(&presets));
        let mut session = session(3);

        let err = illustrator
            .illustrate(&mut session, pending(1, false), &PricingConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("content policy violation"));
        assert_eq!(session.ledger.images, 0);
        assert!(session.images.is_empty());
    }
}
