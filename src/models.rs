use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selecting this value in the environment dropdown switches the composer
/// over to the free-text `custom_environment` field.
pub const CUSTOM_ENVIRONMENT: &str = "Custom environment...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundBlur {
    #[default]
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    #[serde(rename = "HD")]
    Hd,
    #[serde(rename = "4K")]
    FourK,
    #[serde(rename = "8K")]
    EightK,
}

/// One snapshot of the image-mode DNA form. A fresh value is built for every
/// recomputation; the composed prompt is a pure function of it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSet {
    pub subject: Option<String>,
    pub style: Option<String>,
    pub details: Option<String>,
    pub environment: Option<String>,
    pub custom_environment: Option<String>,
    pub environment_details: Option<String>,
    pub time_of_day: Option<String>,
    pub camera_angle: Option<String>,
    pub lighting_style: Option<String>,
    pub background_blur: BackgroundBlur,
    pub palette: Option<String>,
    pub aspect_ratio: Option<String>,
    pub resolution: Resolution,
    pub has_reference_image: bool,
    pub remove_background: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SoundSettings {
    pub enabled: bool,
    pub language: Option<String>,
    pub voice_gender: Option<String>,
    pub speaking_style: Option<String>,
    pub mood: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DialogueSettings {
    pub enabled: bool,
    pub text: Option<String>,
}

/// Snapshot of the video-mode DNA form.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoAttributeSet {
    pub subject: Option<String>,
    pub action: Option<String>,
    pub style: Option<String>,
    pub environment: Option<String>,
    pub time_of_day: Option<String>,
    pub camera_movement: Option<String>,
    pub lighting_style: Option<String>,
    pub palette: Option<String>,
    pub details: Option<String>,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub sound: SoundSettings,
    pub dialogue: DialogueSettings,
}

/// One scene from a structured (storyboard-style) video prompt, as parsed
/// out of the model-generated JSON. Missing fields fall back to the video
/// snapshot's subject and style when the scene is illustrated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SceneSpec {
    pub character: Option<String>,
    pub description: Option<String>,
    pub steps: Vec<String>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    Generate,
    Edit,
    Scenes,
    Video,
}

/// Session-scoped record of one completed generation. Held in memory only;
/// nothing survives past the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub mode: GenerationMode,
    pub prompt: String,
    pub output_count: usize,
}
