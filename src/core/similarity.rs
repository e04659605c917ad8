use crate::core::asset::{GroupMember, ImageAsset, SimilarityGroup};
use crate::core::cache::FeatureCache;
use crate::core::features::{FeatureError, FeatureExtractor, FeatureVector};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("Operation cancelled")]
    Cancelled,
}

/// Receives the fraction of valid assets processed so far, in `[0, 1]`.
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Greedy single-pass clustering of assets by feature distance.
pub struct SimilarityEngine {
    threshold: f32,
    extractor: Arc<dyn FeatureExtractor>,
    cache: FeatureCache,
    cancellation_token: Arc<AtomicBool>,
}

impl SimilarityEngine {
    pub fn new(threshold: f32, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self {
            threshold,
            extractor,
            cache: FeatureCache::new(),
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.cancellation_token.clone()
    }

    pub fn cancel(&self) {
        self.cancellation_token.store(true, Ordering::Relaxed);
    }

    /// Partition `assets` into similarity groups.
    ///
    /// Assets are visited in the given order. Each unclaimed asset is compared
    /// with every later unclaimed asset from a different image set; all within
    /// the threshold join its group and are claimed. Claimed assets never
    /// start or join another group, so the result depends on input order.
    pub fn find_similar_groups(
        &self,
        assets: &[ImageAsset],
        progress_callback: Option<&ProgressCallback>,
    ) -> Result<Vec<SimilarityGroup>, SimilarityError> {
        let valid = self.resolve_feature_vectors(assets);
        let total = valid.len();

        log::info!("Analyzing similarities for {} valid assets...", total);
        log::debug!("Distance threshold: {}", self.threshold);

        let mut groups = Vec::new();
        let mut processed: HashSet<&Path> = HashSet::new();

        for (index, (asset, vector)) in valid.iter().enumerate() {
            if self.cancellation_token.load(Ordering::Relaxed) {
                return Err(SimilarityError::Cancelled);
            }

            if !processed.contains(asset.location()) {
                let mut members = Vec::new();
                let mut claimed = Vec::new();

                for (other, other_vector) in &valid[index + 1..] {
                    if processed.contains(other.location()) || asset.is_in_same_image_set(other) {
                        continue;
                    }

                    let distance = self.extractor.distance(vector, other_vector);
                    log::debug!(
                        "Distance between '{}' and '{}': {:.4}",
                        asset.display_name(),
                        other.display_name(),
                        distance
                    );

                    if distance <= self.threshold {
                        claimed.push(other.location());
                        members.push(GroupMember {
                            asset: (*other).clone(),
                            distance,
                        });
                    }
                }

                processed.insert(asset.location());

                if members.is_empty() {
                    log::debug!("No similar assets found for '{}'", asset.display_name());
                } else {
                    processed.extend(claimed);
                    log::debug!("Created group with {} assets", members.len() + 1);
                    groups.push(SimilarityGroup::new((*asset).clone(), members));
                }
            }

            if let Some(callback) = progress_callback {
                callback(processed.len() as f64 / total as f64);
            }
        }

        let grouped: usize = groups.iter().map(SimilarityGroup::len).sum();
        log::debug!("Total groups formed: {}", groups.len());
        log::debug!("Total assets processed: {}", processed.len());
        log::debug!("Assets not in any group: {}", total - grouped);

        Ok(groups)
    }

    /// Cached vector for `asset`, extracting and caching it on a miss.
    pub fn feature_vector(&self, asset: &ImageAsset) -> Result<FeatureVector, FeatureError> {
        if let Some(cached) = self.cache.get(asset.location()) {
            return Ok(cached);
        }

        let bytes = fs::read(asset.location())?;
        let vector = self.extractor.extract(&bytes)?;
        self.cache.set(asset.location(), vector.clone());
        Ok(vector)
    }

    /// Extract vectors in parallel, keeping scan order and dropping assets
    /// whose image could not be processed.
    fn resolve_feature_vectors<'a>(
        &self,
        assets: &'a [ImageAsset],
    ) -> Vec<(&'a ImageAsset, FeatureVector)> {
        let total = assets.len();
        let completed = AtomicUsize::new(0);
        log::info!("Generating feature prints for {} assets...", total);

        let results: Vec<_> = assets
            .par_iter()
            .map(|asset| {
                let result = self.feature_vector(asset);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % 10 == 0 {
                    log::info!("Processing {}/{} assets...", done, total);
                }
                (asset, result)
            })
            .collect();

        results
            .into_iter()
            .filter_map(|(asset, result)| match result {
                Ok(vector) => Some((asset, vector)),
                Err(e) => {
                    log::warn!(
                        "Could not generate feature print for {}: {}",
                        asset.display_name(),
                        e
                    );
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Each test image holds a single-character label; vectors carry the label
    /// and distances come from a fixed table.
    struct TableExtractor {
        distances: HashMap<(char, char), f32>,
        extractions: AtomicUsize,
    }

    impl TableExtractor {
        fn new(pairs: &[(char, char, f32)]) -> Self {
            let mut distances = HashMap::new();
            for &(a, b, d) in pairs {
                distances.insert((a, b), d);
                distances.insert((b, a), d);
            }
            Self {
                distances,
                extractions: AtomicUsize::new(0),
            }
        }
    }

    impl FeatureExtractor for TableExtractor {
        fn extract(&self, image_bytes: &[u8]) -> Result<FeatureVector, FeatureError> {
            self.extractions.fetch_add(1, Ordering::Relaxed);
            match image_bytes {
                [label] if label.is_ascii_alphabetic() => {
                    Ok(FeatureVector::new(vec![f32::from(*label)]))
                }
                _ => Err(FeatureError::Extraction {
                    message: "unreadable test image".to_string(),
                }),
            }
        }

        fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> f32 {
            let key = (a.as_slice()[0] as u8 as char, b.as_slice()[0] as u8 as char);
            self.distances.get(&key).copied().unwrap_or(100.0)
        }
    }

    struct Fixture {
        _temp_dir: TempDir,
        assets: Vec<ImageAsset>,
    }

    /// Creates one image set per `(set name, content)` entry, in order.
    fn fixture(entries: &[(&str, &[u8])]) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let assets = entries
            .iter()
            .enumerate()
            .map(|(i, (set, content))| {
                let dir = temp_dir
                    .path()
                    .join(format!("Catalog{i}.xcassets/{set}.imageset"));
                fs::create_dir_all(&dir).unwrap();
                let file = dir.join("image.png");
                fs::write(&file, content).unwrap();
                ImageAsset::new(file, 100 * (i as u64 + 1))
            })
            .collect();
        Fixture {
            _temp_dir: temp_dir,
            assets,
        }
    }

    fn names(group: &SimilarityGroup) -> Vec<String> {
        group.all_assets().map(|a| a.display_name()).collect()
    }

    #[test]
    fn test_primary_claims_by_distance_to_primary_only() {
        let fx = fixture(&[("A", b"A"), ("B", b"B"), ("C", b"C")]);
        let extractor = TableExtractor::new(&[('A', 'B', 1.0), ('A', 'C', 1.0), ('B', 'C', 10.0)]);
        let engine = SimilarityEngine::new(5.0, Arc::new(extractor));

        let groups = engine.find_similar_groups(&fx.assets, None).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0]), vec!["A", "B", "C"]);
        assert!(groups[0].members().iter().all(|m| m.distance == 1.0));
    }

    #[test]
    fn test_claimed_member_cannot_start_group() {
        // B is claimed by A even though B is closer to C.
        let fx = fixture(&[("A", b"A"), ("B", b"B"), ("C", b"C")]);
        let extractor = TableExtractor::new(&[('A', 'B', 4.0), ('A', 'C', 50.0), ('B', 'C', 0.5)]);
        let engine = SimilarityEngine::new(5.0, Arc::new(extractor));

        let groups = engine.find_similar_groups(&fx.assets, None).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0]), vec!["A", "B"]);
    }

    #[test]
    fn test_members_sorted_ascending() {
        let fx = fixture(&[("A", b"A"), ("B", b"B"), ("C", b"C"), ("D", b"D")]);
        let extractor = TableExtractor::new(&[
            ('A', 'B', 3.0),
            ('A', 'C', 1.0),
            ('A', 'D', 2.0),
        ]);
        let engine = SimilarityEngine::new(5.0, Arc::new(extractor));

        let groups = engine.find_similar_groups(&fx.assets, None).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0]), vec!["A", "C", "D", "B"]);
        let distances: Vec<f32> = groups[0].members().iter().map(|m| m.distance).collect();
        assert_eq!(distances, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_same_image_set_never_grouped() {
        let fx = fixture(&[("Icon", b"A"), ("Icon", b"B"), ("Other", b"C")]);
        let extractor = TableExtractor::new(&[('A', 'B', 0.0), ('A', 'C', 0.1), ('B', 'C', 0.1)]);
        let engine = SimilarityEngine::new(1.0, Arc::new(extractor));

        let groups = engine.find_similar_groups(&fx.assets, None).unwrap();

        assert_eq!(groups.len(), 1);
        for group in &groups {
            let assets: Vec<&ImageAsset> = group.all_assets().collect();
            for (i, a) in assets.iter().enumerate() {
                for b in &assets[i + 1..] {
                    assert!(!a.is_in_same_image_set(b));
                }
            }
        }
        assert_eq!(names(&groups[0]), vec!["Icon", "Other"]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let fx = fixture(&[("A", b"A"), ("B", b"B")]);
        let extractor = TableExtractor::new(&[('A', 'B', 0.25)]);
        let engine = SimilarityEngine::new(0.25, Arc::new(extractor));

        let groups = engine.find_similar_groups(&fx.assets, None).unwrap();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_unreadable_assets_are_dropped() {
        let fx = fixture(&[("A", b"A"), ("Broken", b"??"), ("B", b"B")]);
        let extractor = TableExtractor::new(&[('A', 'B', 0.0)]);
        let engine = SimilarityEngine::new(1.0, Arc::new(extractor));

        let groups = engine.find_similar_groups(&fx.assets, None).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(names(&groups[0]), vec!["A", "B"]);
    }

    #[test]
    fn test_missing_file_is_dropped() {
        let mut fx = fixture(&[("A", b"A"), ("B", b"B")]);
        fx.assets
            .insert(1, ImageAsset::new("/nonexistent/Gone.imageset/gone.png", 1));
        let extractor = TableExtractor::new(&[('A', 'B', 0.0)]);
        let engine = SimilarityEngine::new(1.0, Arc::new(extractor));

        let groups = engine.find_similar_groups(&fx.assets, None).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 2);
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_one() {
        let fx = fixture(&[("A", b"A"), ("B", b"B"), ("C", b"C"), ("D", b"D")]);
        let extractor = TableExtractor::new(&[('A', 'C', 0.5)]);
        let engine = SimilarityEngine::new(1.0, Arc::new(extractor));

        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&values);
        let callback: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p));

        engine
            .find_similar_groups(&fx.assets, Some(&callback))
            .unwrap();

        let values = values.lock().unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(*values.last().unwrap(), 1.0);
    }

    #[test]
    fn test_empty_input() {
        let engine = SimilarityEngine::new(1.0, Arc::new(TableExtractor::new(&[])));
        let groups = engine.find_similar_groups(&[], None).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_feature_vectors_are_cached() {
        let fx = fixture(&[("A", b"A"), ("B", b"B")]);
        let extractor = Arc::new(TableExtractor::new(&[('A', 'B', 0.0)]));
        let engine = SimilarityEngine::new(1.0, extractor.clone());

        engine.find_similar_groups(&fx.assets, None).unwrap();
        engine.find_similar_groups(&fx.assets, None).unwrap();

        assert_eq!(extractor.extractions.load(Ordering::Relaxed), 2);
        assert_eq!(engine.cache().len(), 2);
    }

    #[test]
    fn test_cancellation() {
        let fx = fixture(&[("A", b"A"), ("B", b"B")]);
        let engine = SimilarityEngine::new(1.0, Arc::new(TableExtractor::new(&[])));
        engine.cancel();

        let result = engine.find_similar_groups(&fx.assets, None);
        assert!(matches!(result, Err(SimilarityError::Cancelled)));
    }
}
