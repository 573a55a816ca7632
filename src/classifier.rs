//! Scoring of fetched images and the shared process RNG.

use crate::images::FetchedImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Scores below this mark a classifier malfunction rather than a confident
/// negative; the whole post is rejected.
pub const FAILURE_SENTINEL: f64 = 0.02;

/// A fetched image annotated with its classifier score.
#[derive(Debug, Clone)]
pub struct ScoredImage {
    pub url: String,
    pub filepath: PathBuf,
    pub alt: String,
    pub height: Option<i32>,
    pub width: Option<i32>,
    pub score: f64,
}

/// Process-wide RNG handle shared by the classifier stub and the drop
/// filter, seeded once from OS entropy.
#[derive(Clone)]
pub struct SharedRng<R>(Arc<Mutex<R>>);

impl SharedRng<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: Rng> SharedRng<R> {
    pub fn new(rng: R) -> Self {
        Self(Arc::new(Mutex::new(rng)))
    }

    /// Uniform draw in [0, 1).
    pub fn draw(&self) -> f64 {
        let mut rng = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0.0..1.0)
    }
}

/// Binary image classifier contract: one score in [0, 1] per input image.
///
/// A real model is expected to preprocess each file by padding it to a
/// square, resizing to 512x512 and normalizing channels with mean
/// (0.485, 0.456, 0.406) / std (0.229, 0.224, 0.225) before inference.
pub trait Predictor: Send + Sync {
    fn predict(&self, images: &[FetchedImage]) -> Vec<f64>;
}

/// Stand-in predictor drawing uniform scores from the shared process RNG.
pub struct RandomPredictor<R> {
    rng: SharedRng<R>,
}

impl<R> RandomPredictor<R> {
    pub fn new(rng: SharedRng<R>) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> Predictor for RandomPredictor<R> {
    fn predict(&self, images: &[FetchedImage]) -> Vec<f64> {
        images.iter().map(|_| self.rng.draw()).collect()
    }
}

/// Scores a post's fetched images. Any sentinel score rejects the whole
/// post; its files come back as `Err` for the caller to clean up.
pub fn classify_images(
    predictor: &dyn Predictor,
    images: Vec<FetchedImage>,
) -> std::result::Result<Vec<ScoredImage>, Vec<PathBuf>> {
    let scores = predictor.predict(&images);
    if scores.iter().any(|score| *score < FAILURE_SENTINEL) {
        return Err(images.into_iter().map(|image| image.filepath).collect());
    }
    Ok(images
        .into_iter()
        .zip(scores)
        .map(|(image, score)| ScoredImage {
            url: image.url,
            filepath: image.filepath,
            alt: image.alt,
            height: image.height,
            width: image.width,
            score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct FixedPredictor(Vec<f64>);

    impl Predictor for FixedPredictor {
        fn predict(&self, images: &[FetchedImage]) -> Vec<f64> {
            assert_eq!(images.len(), self.0.len());
            self.0.clone()
        }
    }

    fn fetched(name: &str) -> FetchedImage {
        FetchedImage {
            url: format!("https://cdn/img/{name}@jpeg"),
            filepath: Path::new("archive").join(format!("{name}.jpeg")),
            alt: String::new(),
            height: None,
            width: None,
        }
    }

    #[test]
    fn attaches_one_score_per_image() {
        let scored = classify_images(
            &FixedPredictor(vec![0.9, 0.4]),
            vec![fetched("one"), fetched("two")],
        )
        .expect("no sentinel tripped");
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].score, 0.9);
        assert_eq!(scored[1].score, 0.4);
    }

    #[test]
    fn sentinel_score_rejects_the_whole_post() {
        let leftovers = classify_images(
            &FixedPredictor(vec![0.9, 0.01]),
            vec![fetched("one"), fetched("two")],
        )
        .expect_err("sentinel must reject");
        assert_eq!(leftovers.len(), 2);
        assert!(leftovers[0].ends_with("one.jpeg"));
    }

    #[test]
    fn random_predictor_scores_stay_in_range() {
        let predictor = RandomPredictor::new(SharedRng::new(StdRng::seed_from_u64(7)));
        let images: Vec<_> = (0..100).map(|i| fetched(&i.to_string())).collect();
        for score in predictor.predict(&images) {
            assert!((0.0..1.0).contains(&score));
        }
    }

    #[test]
    fn shared_rng_is_deterministic_for_a_seed() {
        let first = SharedRng::new(StdRng::seed_from_u64(7));
        let second = SharedRng::new(StdRng::seed_from_u64(7));
        assert_eq!(first.draw(), second.draw());
    }
}
