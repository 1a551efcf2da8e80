pub mod image;
pub mod probe;
pub mod prompt;
pub mod synthesizer;
pub mod validate;

pub use image::{score_candidate, HttpImageProber, ImageMetadata, ImageProber, ImageSelector, SelectedImage};
pub use probe::{detect_format, parse_dimensions, ImageFormat};
pub use synthesizer::{RawSynthResponse, SynthesizedArticle, Synthesizer};
