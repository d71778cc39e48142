use crate::models::{
    AttributeSet, BackgroundBlur, Resolution, SceneSpec, VideoAttributeSet, CUSTOM_ENVIRONMENT,
};

/// Prefixed to the composed body when a reference image is present and the
/// user asked for the background to be stripped.
pub const BACKGROUND_REMOVAL_INSTRUCTION: &str = "Completely remove the background from this image, \
make it transparent, and focus only on the main subject. \
Then apply the following description to the subject:";

/// Sentence appended to every pose-variant edit prompt.
pub const REFERENCE_CONSISTENCY_NOTE: &str =
    "The subject must remain consistent with the reference image.";

/// The four pose variations requested sequentially when regenerating from a
/// reference image.
pub const POSE_VARIANTS: [&str; 4] = [
    "in a full-body standing pose",
    "in a relaxed seated pose",
    "in a walking pose, facing the camera",
    "as a close-up portrait shot",
];

/// Composes the image-mode prompt from one DNA snapshot.
///
/// Total and pure: every clause is appended only when its source field is
/// non-empty after trimming, so sparse snapshots degrade to sparser strings
/// rather than errors. Validation is the caller's concern.
pub fn compose_image_prompt(attrs: &AttributeSet) -> String {
    let style = trimmed(attrs.style.as_deref());
    let subject = trimmed(attrs.subject.as_deref());
    let mut body = format!("A depiction of {style} of {subject}");

    if let Some(details) = non_empty(attrs.details.as_deref()) {
        body.push_str(&format!(", {details}"));
    }

    let base_env = if attrs.environment.as_deref() == Some(CUSTOM_ENVIRONMENT) {
        trimmed(attrs.custom_environment.as_deref())
    } else {
        trimmed(attrs.environment.as_deref())
    };
    let final_environment = [base_env, trimmed(attrs.environment_details.as_deref())]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if !final_environment.is_empty() {
        body.push_str(&format!(", in {final_environment}"));
    }

    if let Some(time_of_day) = non_empty(attrs.time_of_day.as_deref()) {
        body.push_str(&format!(" at {time_of_day}"));
    }
    if let Some(camera_angle) = non_empty(attrs.camera_angle.as_deref()) {
        body.push_str(&format!(", viewpoint {camera_angle}"));
    }
    if let Some(lighting_style) = non_empty(attrs.lighting_style.as_deref()) {
        body.push_str(&format!(", lit by {lighting_style}"));
    }
    if let Some(blur) = blur_phrase(attrs.background_blur) {
        body.push_str(&format!(", {blur}"));
    }
    if let Some(palette) = non_empty(attrs.palette.as_deref()) {
        body.push_str(&format!(", with color palette {palette}"));
    }

    // For edits the ratio is handled by cropping the reference image, so the
    // clause is only emitted for fresh generations.
    if !attrs.has_reference_image {
        if let Some(aspect_ratio) = non_empty(attrs.aspect_ratio.as_deref()) {
            body.push_str(&format!(", aspect ratio {aspect_ratio}"));
        }
    }

    body.push_str(&format!(". {}.", resolution_phrase(attrs.resolution)));

    if attrs.has_reference_image && attrs.remove_background {
        format!("{BACKGROUND_REMOVAL_INSTRUCTION} {body}")
    } else {
        body
    }
}

/// Composes the video-mode prompt from one DNA snapshot.
pub fn compose_video_prompt(attrs: &VideoAttributeSet) -> String {
    let style = trimmed(attrs.style.as_deref());
    let subject = trimmed(attrs.subject.as_deref());
    let action = trimmed(attrs.action.as_deref());
    let mut prompt = format!("A {style} video of {subject}, {action}");

    if let Some(environment) = non_empty(attrs.environment.as_deref()) {
        prompt.push_str(&format!(", set in {environment}"));
    }
    if let Some(time_of_day) = non_empty(attrs.time_of_day.as_deref()) {
        prompt.push_str(&format!(" during {time_of_day}"));
    }
    if let Some(camera_movement) = non_empty(attrs.camera_movement.as_deref()) {
        prompt.push_str(&format!(", filmed with {camera_movement}"));
    }
    if let Some(lighting_style) = non_empty(attrs.lighting_style.as_deref()) {
        prompt.push_str(&format!(", with {lighting_style}"));
    }
    if let Some(palette) = non_empty(attrs.palette.as_deref()) {
        prompt.push_str(&format!(", featuring color palette {palette}"));
    }
    if let Some(details) = non_empty(attrs.details.as_deref()) {
        prompt.push_str(&format!(", {details}"));
    }

    if attrs.sound.enabled {
        let language = trimmed(attrs.sound.language.as_deref());
        let voice_gender = trimmed(attrs.sound.voice_gender.as_deref());
        let speaking_style = trimmed(attrs.sound.speaking_style.as_deref());
        let mood = trimmed(attrs.sound.mood.as_deref());
        prompt.push_str(&format!(
            ". Include audio narration in {language} with a {voice_gender} voice \
in a {speaking_style} style to convey a {mood} mood."
        ));
    }

    if attrs.dialogue.enabled {
        if let Some(text) = attrs.dialogue.text.as_deref() {
            if !text.trim().is_empty() {
                prompt.push_str(&format!(". Include the following dialogue: \"{text}\""));
            }
        }
    }

    let resolution = trimmed(attrs.resolution.as_deref());
    let aspect_ratio = trimmed(attrs.aspect_ratio.as_deref());
    prompt.push_str(&format!(
        " Resolution {resolution}, aspect ratio {aspect_ratio}."
    ));

    prompt
}

pub fn build_pose_prompt(final_prompt: &str, pose: &str) -> String {
    format!("{final_prompt}, {pose}. {REFERENCE_CONSISTENCY_NOTE}")
}

/// Builds the per-scene image prompt for a structured video storyboard.
/// Scenes missing a character or style borrow the fallbacks (the video
/// snapshot's subject and style).
pub fn build_scene_prompt(scene: &SceneSpec, fallback_subject: &str, fallback_style: &str) -> String {
    let character = non_empty(scene.character.as_deref()).unwrap_or(fallback_subject);
    let style = non_empty(scene.style.as_deref()).unwrap_or(fallback_style);
    let description = trimmed(scene.description.as_deref());
    let steps = scene
        .steps
        .iter()
        .map(|step| step.trim())
        .filter(|step| !step.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "A {style} visual of {character}. Scene description: {description}. Key actions: {steps}."
    )
}

fn blur_phrase(blur: BackgroundBlur) -> Option<&'static str> {
    match blur {
        BackgroundBlur::None => None,
        BackgroundBlur::Low => Some("with a blurred background at 20% intensity (light bokeh)"),
        BackgroundBlur::Medium => Some("with a blurred background at 75% intensity (medium bokeh)"),
        BackgroundBlur::High => Some("with a very strongly blurred background (strong bokeh)"),
    }
}

fn resolution_phrase(resolution: Resolution) -> &'static str {
    match resolution {
        Resolution::Hd => "high resolution, very detailed",
        Resolution::FourK => "4K quality, highly detailed, photorealistic",
        Resolution::EightK => {
            "8K quality, extremely high resolution, cinematic lighting, highly detailed"
        }
    }
}

fn trimmed(value: Option<&str>) -> &str {
    value.map(str::trim).unwrap_or("")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
