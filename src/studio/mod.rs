use std::sync::Mutex;

use chrono::Utc;
use futures::future;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    gemini::{GeminiClient, GeminiConfig, GenerateImageRequest, GenerateVideoRequest},
    imaging::{EncodedImage, NormalizeOutcome, Normalizer},
    models::{AttributeSet, GenerationMode, GenerationRecord, SceneSpec, VideoAttributeSet},
    prompt,
};

#[derive(Debug, Clone)]
pub struct ImageGeneration {
    pub prompt: String,
    pub images: Vec<EncodedImage>,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VideoGeneration {
    pub prompt: String,
    pub video_uri: String,
}

/// Ties the composer, the normalizer and the hosted service together into
/// the two flows the studio UI drives. History lives in memory for the
/// session only.
pub struct Studio {
    gemini: GeminiClient,
    normalizer: Normalizer,
    history: Mutex<Vec<GenerationRecord>>,
}

impl Studio {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            gemini: GeminiClient::new(config),
            normalizer: Normalizer::new(),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn from_env() -> Self {
        crate::load_env_files();
        Self::new(GeminiConfig::from_env())
    }

    /// Composes the prompt for the current snapshot and generates images.
    ///
    /// With a reference image the selected ratio is applied by center-cropping
    /// the reference, and the service is asked for the four pose variants
    /// sequentially (one completes before the next starts, which keeps the
    /// hosted rate limit happy). Without one, a single text-to-image call
    /// carries the ratio in the prompt and request parameters.
    pub async fn generate_image(
        &self,
        attrs: &AttributeSet,
        reference: Option<&EncodedImage>,
    ) -> AppResult<ImageGeneration> {
        let final_prompt = compose_with_reference_flag(attrs, reference.is_some());

        let generation = match reference {
            Some(reference) => {
                let processed = self.prepare_reference(attrs, reference).await?;
                self.generate_pose_variants(&final_prompt, processed).await?
            }
            None => {
                let response = self
                    .gemini
                    .generate_image(GenerateImageRequest {
                        prompt: final_prompt.clone(),
                        reference_image: None,
                        aspect_ratio: attrs.aspect_ratio.clone(),
                    })
                    .await?;
                ImageGeneration {
                    prompt: final_prompt,
                    images: response.images,
                    text: response.text,
                }
            }
        };

        self.record(
            if reference.is_some() {
                GenerationMode::Edit
            } else {
                GenerationMode::Generate
            },
            &generation.prompt,
            generation.images.len(),
        );
        Ok(generation)
    }

    /// Illustrates each scene of a structured video storyboard with one
    /// image, all requests in flight concurrently. The scenes are
    /// independent, so nothing orders one behind another (unlike the pose
    /// variants, which share a reference image and go out sequentially).
    pub async fn generate_scene_images(
        &self,
        attrs: &VideoAttributeSet,
        scenes: &[SceneSpec],
    ) -> AppResult<Vec<ImageGeneration>> {
        if scenes.is_empty() {
            return Err(AppError::msg("no scenes to illustrate"));
        }

        let fallback_subject = attrs.subject.as_deref().map(str::trim).unwrap_or("");
        let fallback_style = attrs.style.as_deref().map(str::trim).unwrap_or("");
        let prompts = scenes
            .iter()
            .map(|scene| prompt::build_scene_prompt(scene, fallback_subject, fallback_style))
            .collect::<Vec<_>>();

        let requests = prompts.iter().map(|scene_prompt| {
            self.gemini.generate_image(GenerateImageRequest {
                prompt: scene_prompt.clone(),
                reference_image: None,
                aspect_ratio: attrs.aspect_ratio.clone(),
            })
        });
        let responses = future::try_join_all(requests).await?;

        let mut generations = Vec::with_capacity(responses.len());
        for (scene_prompt, response) in prompts.into_iter().zip(responses) {
            if response.images.is_empty() {
                return Err(AppError::msg(format!(
                    "no image returned for scene: {scene_prompt}"
                )));
            }
            self.record(GenerationMode::Scenes, &scene_prompt, response.images.len());
            generations.push(ImageGeneration {
                prompt: scene_prompt,
                images: response.images,
                text: response.text,
            });
        }

        Ok(generations)
    }

    pub async fn generate_video(
        &self,
        attrs: &VideoAttributeSet,
        reference: Option<&EncodedImage>,
        progress: &(dyn Fn(&str) + Send + Sync),
    ) -> AppResult<VideoGeneration> {
        let final_prompt = prompt::compose_video_prompt(attrs);

        let video_uri = self
            .gemini
            .generate_video(
                GenerateVideoRequest {
                    prompt: final_prompt.clone(),
                    aspect_ratio: attrs.aspect_ratio.clone(),
                    resolution: attrs.resolution.clone(),
                    reference_image: reference.cloned(),
                },
                progress,
            )
            .await?;

        self.record(GenerationMode::Video, &final_prompt, 1);
        Ok(VideoGeneration {
            prompt: final_prompt,
            video_uri,
        })
    }

    pub fn history(&self) -> Vec<GenerationRecord> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    /// Center-crops the reference to the selected ratio. An unreadable
    /// reference falls back to the unprocessed original; a superseded
    /// normalization means a newer request owns the slot and this one stops.
    async fn prepare_reference(
        &self,
        attrs: &AttributeSet,
        reference: &EncodedImage,
    ) -> AppResult<EncodedImage> {
        let Some(ratio_label) = attrs.aspect_ratio.as_deref().filter(|v| !v.trim().is_empty())
        else {
            return Ok(reference.clone());
        };

        match self.normalizer.normalize(reference.clone(), ratio_label).await {
            Ok(NormalizeOutcome::Applied(image)) => Ok(image),
            Ok(NormalizeOutcome::Superseded) => Err(AppError::msg(
                "reference normalization superseded by a newer request",
            )),
            Err(AppError::Decode(error)) => {
                tracing::warn!(%error, "reference image could not be decoded, using it as-is");
                Ok(reference.clone())
            }
            Err(error) => Err(error),
        }
    }

    async fn generate_pose_variants(
        &self,
        final_prompt: &str,
        reference: EncodedImage,
    ) -> AppResult<ImageGeneration> {
        let mut images = Vec::with_capacity(prompt::POSE_VARIANTS.len());
        let mut text = None;

        for pose in prompt::POSE_VARIANTS {
            let pose_prompt = prompt::build_pose_prompt(final_prompt, pose);
            tracing::info!(pose, "requesting pose variant");
            let response = self
                .gemini
                .generate_image(GenerateImageRequest {
                    prompt: pose_prompt,
                    reference_image: Some(reference.clone()),
                    aspect_ratio: None,
                })
                .await?;

            let image = response
                .images
                .into_iter()
                .next()
                .ok_or_else(|| AppError::msg(format!("no image returned for pose: {pose}")))?;
            images.push(image);
            text = text.or(response.text);
        }

        Ok(ImageGeneration {
            prompt: final_prompt.to_string(),
            images,
            text,
        })
    }

    fn record(&self, mode: GenerationMode, prompt: &str, output_count: usize) {
        let record = GenerationRecord {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            mode,
            prompt: prompt.to_string(),
            output_count,
        };
        tracing::info!(id = %record.id, ?mode, output_count, "generation recorded");
        self.history.lock().expect("history lock poisoned").push(record);
    }
}

/// The prompt must agree with how the request is actually made, so the
/// reference flag is derived from the presence of a reference image rather
/// than trusted from the snapshot.
fn compose_with_reference_flag(attrs: &AttributeSet, has_reference: bool) -> String {
    let snapshot = AttributeSet {
        has_reference_image: has_reference,
        ..attrs.clone()
    };
    prompt::compose_image_prompt(&snapshot)
}
