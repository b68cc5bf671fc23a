use crate::core::config::PricingConfig;
use crate::core::preferences::StoryConfig;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// 1-based scene number shared by the outline, chapter headings and images.
///
/// The only key type for illustrations. Strings and integers are converted
/// here, never at the lookup site.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u32", into = "u32")]
pub struct SceneNumber(u32);

impl SceneNumber {
    pub fn new(n: u32) -> Option<Self> {
        (n > 0).then_some(Self(n))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Position in a 0-based sequence.
    pub fn index(&self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    /// The following scene, or `None` past `u32::MAX`.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl TryFrom<u32> for SceneNumber {
    type Error = anyhow::Error;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        SceneNumber::new(n).ok_or_else(|| anyhow!("Scene numbers start at 1"))
    }
}

impl TryFrom<usize> for SceneNumber {
    type Error = anyhow::Error;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        let n = u32::try_from(n).map_err(|_| anyhow!("Scene number {} is too large", n))?;
        SceneNumber::try_from(n)
    }
}

impl From<SceneNumber> for u32 {
    fn from(n: SceneNumber) -> u32 {
        n.0
    }
}

impl FromStr for SceneNumber {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u32 = s
            .trim()
            .parse()
            .map_err(|_| anyhow!("'{}' is not a scene number", s))?;
        SceneNumber::try_from(n)
    }
}

impl fmt::Display for SceneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Scene {
    pub number: SceneNumber,
    pub text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Outline {
    /// Model output as received; embedded verbatim in the story prompt.
    pub raw: String,
    pub scenes: Vec<Scene>,
}

impl Outline {
    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn scene(&self, number: SceneNumber) -> Option<&Scene> {
        self.scenes.get(number.index())
    }
}

/// Encoded image bytes (PNG/JPEG/...) keyed by scene.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneImages {
    images: BTreeMap<SceneNumber, Vec<u8>>,
}

impl SceneImages {
    pub fn insert(&mut self, scene: SceneNumber, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.images.insert(scene, bytes)
    }

    pub fn get(&self, scene: SceneNumber) -> Option<&[u8]> {
        self.images.get(&scene).map(|b| b.as_slice())
    }

    pub fn contains(&self, scene: SceneNumber) -> bool {
        self.images.contains_key(&scene)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn scenes(&self) -> impl Iterator<Item = SceneNumber> + '_ {
        self.images.keys().copied()
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Running cost estimate for the session. Only ever grows until a reset.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CostLedger {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub images: u64,
    /// Accumulated at the prices in effect when each call was billed.
    pub cost_usd: f64,
}

impl CostLedger {
    pub fn add_chat(&mut self, usage: TokenUsage, pricing: &PricingConfig) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.cost_usd += (usage.prompt_tokens as f64 / 1000.0) * pricing.input_per_1k
            + (usage.completion_tokens as f64 / 1000.0) * pricing.output_per_1k;
    }

    pub fn add_images(&mut self, count: u64, pricing: &PricingConfig) {
        self.images += count;
        self.cost_usd += count as f64 * pricing.image;
    }

    pub fn cost_local(&self, pricing: &PricingConfig) -> f64 {
        self.cost_usd * pricing.usd_to_local_rate
    }

    pub fn summary(&self, pricing: &PricingConfig) -> String {
        format!(
            "{:.2} {} ({} input tokens, {} output tokens, {} images)",
            self.cost_local(pricing),
            pricing.local_currency,
            self.prompt_tokens,
            self.completion_tokens,
            self.images
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WizardStep {
    #[default]
    Start,
    Plan,
    Writing,
    Final,
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Start => "start",
            WizardStep::Plan => "plan",
            WizardStep::Writing => "writing",
            WizardStep::Final => "final",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingIllustration {
    pub scene: SceneNumber,
    pub regenerate: bool,
}

/// One slot for "generate", one for "regenerate". Consumed once per turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PendingActions {
    pub generate: Option<SceneNumber>,
    pub regenerate: Option<SceneNumber>,
}

impl PendingActions {
    /// Generate wins over regenerate. Both slots are empty afterwards.
    pub fn take(&mut self) -> Option<PendingIllustration> {
        let generate = self.generate.take();
        let regenerate = self.regenerate.take();
        match (generate, regenerate) {
            (Some(scene), _) => Some(PendingIllustration {
                scene,
                regenerate: false,
            }),
            (None, Some(scene)) => Some(PendingIllustration {
                scene,
                regenerate: true,
            }),
            (None, None) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.generate.is_none() && self.regenerate.is_none()
    }
}

/// Secret for the generation endpoints. Kept in memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        (!key.is_empty()).then_some(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Everything one wizard session owns.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub credential: Option<ApiKey>,
    pub preferences: Option<StoryConfig>,
    pub outline: Option<Outline>,
    pub story: Option<String>,
    pub images: SceneImages,
    pub step: WizardStep,
    pub pending: PendingActions,
    pub ledger: CostLedger,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops what was generated from the previous preferences.
    pub fn clear_artifacts(&mut self) {
        self.outline = None;
        self.story = None;
        self.images.clear();
        self.pending = PendingActions::default();
    }

    /// Back to `start` with nothing but the credential.
    pub fn new_story(&mut self) {
        let credential = self.credential.take();
        *self = Self {
            credential,
            ..Self::default()
        };
    }

    pub fn logout(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_number_string_and_integer_keys_agree() {
        let mut images = SceneImages::default();
        let from_str: SceneNumber = " 2 ".parse().unwrap();
        images.insert(from_str, vec![1, 2, 3]);

        let from_int = SceneNumber::try_from(2u32).unwrap();
        assert_eq!(images.get(from_int), Some(&[1u8, 2, 3][..]));

        images.insert(SceneNumber::try_from(2usize).unwrap(), vec![9]);
        assert_eq!(images.len(), 1);
        assert_eq!(images.get(from_str), Some(&[9u8][..]));
    }

    #[test]
    fn test_scene_number_rejects_zero_and_garbage() {
        assert!(SceneNumber::new(0).is_none());
        assert!("0".parse::<SceneNumber>().is_err());
        assert!("two".parse::<SceneNumber>().is_err());
        assert!(serde_json::from_str::<SceneNumber>("0").is_err());
        assert_eq!(serde_json::from_str::<SceneNumber>("4").unwrap().get(), 4);
    }

    #[test]
    fn test_next_stops_at_the_last_number() {
        let first = SceneNumber::from_index(0);
        assert_eq!(first.next().map(|n| n.get()), Some(2));
        let last = SceneNumber::new(u32::MAX).unwrap();
        assert!(last.next().is_none());
    }

    #[test]
    fn test_pending_take_clears_both_slots() {
        let mut pending = PendingActions {
            generate: SceneNumber::new(1),
            regenerate: SceneNumber::new(3),
        };

        let first = pending.take().unwrap();
        assert_eq!(first.scene.get(), 1);
        assert!(!first.regenerate);
        assert!(pending.is_empty());
        assert_eq!(pending.take(), None);

        pending.regenerate = SceneNumber::new(2);
        let second = pending.take().unwrap();
        assert!(second.regenerate);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_ledger_accumulates() {
        let pricing = PricingConfig::default();
        let mut ledger = CostLedger::default();
        ledger.add_chat(
            TokenUsage {
                prompt_tokens: 1000,
                completion_tokens: 2000,
            },
            &pricing,
        );
        ledger.add_images(2, &pricing);

        assert_eq!(ledger.prompt_tokens, 1000);
        assert_eq!(ledger.completion_tokens, 2000);
        assert_eq!(ledger.images, 2);
        let expected_usd = 0.005 + 0.030 + 0.08;
        assert!((ledger.cost_usd - expected_usd).abs() < 1e-9);
        assert!((ledger.cost_local(&pricing) - expected_usd * 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_api_key_is_redacted() {
        let key = ApiKey::new("sk-secret").unwrap();
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
        assert!(ApiKey::new("   ").is_none());
    }

    #[test]
    fn test_new_story_keeps_only_credential() {
        let mut session = SessionState::new();
        session.credential = ApiKey::new("sk-1");
        session.story = Some("text".to_string());
        session.step = WizardStep::Final;
        session.images.insert(SceneNumber::new(1).unwrap(), vec![0]);
        session.ledger.images = 3;

        session.new_story();
        assert!(session.credential.is_some());
        assert!(session.story.is_none());
        assert!(session.images.is_empty());
        assert_eq!(session.ledger, CostLedger::default());
        assert_eq!(session.step, WizardStep::Start);

        session.logout();
        assert!(session.credential.is_none());
    }
}
