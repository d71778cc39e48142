pub mod error;
pub mod gemini;
pub mod imaging;
pub mod models;
pub mod prompt;
pub mod studio;

pub use error::{AppError, AppResult};
pub use imaging::{normalize_aspect_ratio, EncodedImage, NormalizeOutcome, Normalizer};
pub use prompt::{compose_image_prompt, compose_video_prompt};
pub use studio::Studio;

/// Picks up `.env` files from the working directory and its parents, the
/// usual places a dev checkout keeps `GEMINI_API_KEY`.
pub fn load_env_files() {
    let _ = dotenvy::from_filename(".env");
    let _ = dotenvy::from_filename("../.env");
    let _ = dotenvy::from_filename("../../.env");
}
