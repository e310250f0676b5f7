use crate::preprocess::sharpness;
use image::RgbaImage;

/// One sample from a window, with whatever the caller decoded from it.
#[derive(Debug, Clone)]
pub struct CandidateReading<V> {
    pub t: f64,
    pub crop: RgbaImage,
    pub value: V,
    pub confidence: f64,
}

/// Pick the highest-scoring candidate. Candidates arrive in time order and the
/// comparison is strict, so the earliest of several equal scores is kept.
/// NaN scores never win.
pub fn select_best<T, F>(candidates: impl IntoIterator<Item = T>, mut score: F) -> Option<(T, f64)>
where
    F: FnMut(&T) -> f64,
{
    let mut best: Option<(T, f64)> = None;
    for candidate in candidates {
        let s = score(&candidate);
        if s.is_nan() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, b)| s > *b) {
            best = Some((candidate, s));
        }
    }
    best
}

/// Decode-confidence policy, used for the counter region.
pub fn select_most_confident<V>(candidates: Vec<CandidateReading<V>>) -> Option<CandidateReading<V>> {
    select_best(candidates, |c| c.confidence).map(|(c, _)| c)
}

/// A crop chosen for legibility
#[derive(Debug, Clone)]
pub struct SharpestCrop {
    pub t: f64,
    pub crop: RgbaImage,
    pub sharpness: f64,
}

/// Sharpness policy, used for text regions: least motion-blurred capture wins.
pub fn select_sharpest(crops: Vec<(f64, RgbaImage)>) -> Option<SharpestCrop> {
    let scored = crops.into_iter().map(|(t, crop)| {
        let s = sharpness(&crop);
        (t, crop, s)
    });
    select_best(scored, |(_, _, s)| *s).map(|((t, crop, sharpness), _)| SharpestCrop {
        t,
        crop,
        sharpness,
    })
}
