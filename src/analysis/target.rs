//! Target overlay derived from a quality profile.
//!
//! Every axis has exactly one rule in [`TARGET_RULES`] that turns the
//! profile's constraints into a raw target and an optional tolerance
//! band. Targets are normalized with the same catalog as the live
//! metrics so both land on one scale.

use crate::axes::AxisCatalog;
use crate::error::{CatalogError, RadarError, RadarResult};
use crate::models::{AxisId, QualityProfile, TargetPoint, TargetSnapshot};
use crate::providers::sources::validate_table;
use crate::providers::ProfileProvider;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reading-ease target when the profile names no grade level.
pub const DEFAULT_READABILITY_TARGET: f64 = 60.0;
pub const DEFAULT_READABILITY_TOLERANCE: f64 = 20.0;
/// Grade level assumed when the profile names none.
pub const DEFAULT_GRADE_LEVEL: f64 = 8.0;
/// Grade tolerance when a grade is given without one.
pub const DEFAULT_GRADE_TOLERANCE: f64 = 1.0;
/// Grade tolerance when the profile names no grade at all.
pub const DEFAULT_ACCESSIBILITY_TOLERANCE: f64 = 2.0;
pub const DEFAULT_PASSIVE_VOICE_PERCENT: f64 = 10.0;
/// Weak words per 100 words, by number of enabled weak-word flags.
pub const PRECISION_TARGET_STRICT: f64 = 0.5;
pub const PRECISION_TARGET_MODERATE: f64 = 2.0;
pub const PRECISION_TARGET_RELAXED: f64 = 5.0;
pub const DEFAULT_MAX_SENTENCE_LENGTH: f64 = 25.0;
pub const FLOW_TARGET: f64 = 8.0;
pub const FLOW_TOLERANCE: f64 = 3.0;

/// Goal for one axis, in raw units.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisTarget {
    pub raw_target: f64,
    pub tolerance_min: Option<f64>,
    pub tolerance_max: Option<f64>,
    pub description: String,
}

impl AxisTarget {
    /// Target with a symmetric band, lower bound clamped at 0.
    ///
    /// The band never inverts: `tolerance_min <= tolerance_max`.
    fn banded(raw_target: f64, tolerance: f64, description: String) -> Self {
        let tolerance = if tolerance.is_finite() { tolerance.abs() } else { 0.0 };
        let tolerance_min = (raw_target - tolerance).max(0.0);
        let upper = raw_target + tolerance;
        let upper = if upper.is_finite() { upper } else { raw_target };
        let tolerance_max = upper.max(tolerance_min);
        Self {
            raw_target,
            tolerance_min: Some(tolerance_min),
            tolerance_max: Some(tolerance_max),
            description,
        }
    }

    /// Target where anything from 0 up to the target is acceptable.
    fn ceiling(raw_target: f64, description: String) -> Self {
        Self {
            raw_target,
            tolerance_min: Some(0.0),
            tolerance_max: Some(raw_target),
            description,
        }
    }
}

/// Maps a profile onto one axis.
#[derive(Debug, Clone, Copy)]
pub struct TargetRule {
    pub axis: AxisId,
    pub derive: fn(&QualityProfile) -> AxisTarget,
}

pub const TARGET_RULES: &[TargetRule] = &[
    TargetRule {
        axis: AxisId::Readability,
        derive: readability_target,
    },
    TargetRule {
        axis: AxisId::Clarity,
        derive: clarity_target,
    },
    TargetRule {
        axis: AxisId::Precision,
        derive: precision_target,
    },
    TargetRule {
        axis: AxisId::Accessibility,
        derive: accessibility_target,
    },
    TargetRule {
        axis: AxisId::Density,
        derive: density_target,
    },
    TargetRule {
        axis: AxisId::Flow,
        derive: flow_target,
    },
];

pub fn rule_for(axis: AxisId) -> Option<&'static TargetRule> {
    TARGET_RULES.iter().find(|rule| rule.axis == axis)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn non_negative(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

fn readability_target(profile: &QualityProfile) -> AxisTarget {
    let reading_ease = non_negative(profile.target_grade_level)
        .map(|grade| (grade, 100.0 - grade * 5.0))
        .filter(|(_, ease)| ease.is_finite());

    match reading_ease {
        Some((grade, ease)) => {
            let tolerance =
                non_negative(profile.grade_tolerance).unwrap_or(DEFAULT_GRADE_TOLERANCE);
            AxisTarget::banded(
                ease.clamp(0.0, 100.0),
                tolerance * 5.0,
                format!("Reading ease for grade {}", grade),
            )
        }
        None => AxisTarget::banded(
            DEFAULT_READABILITY_TARGET,
            DEFAULT_READABILITY_TOLERANCE,
            "Default reading ease".to_string(),
        ),
    }
}

fn clarity_target(profile: &QualityProfile) -> AxisTarget {
    if profile.allow_passive_voice == Some(false) {
        return AxisTarget::ceiling(0.0, "No passive voice".to_string());
    }

    let allowed =
        non_negative(profile.max_passive_voice_percent).unwrap_or(DEFAULT_PASSIVE_VOICE_PERCENT);
    AxisTarget::ceiling(allowed, format!("At most {}% passive voice", allowed))
}

fn precision_target(profile: &QualityProfile) -> AxisTarget {
    let (target, label) = match profile.weak_word_flags() {
        0 => (PRECISION_TARGET_RELAXED, "relaxed"),
        1 => (PRECISION_TARGET_MODERATE, "moderate"),
        _ => (PRECISION_TARGET_STRICT, "strict"),
    };
    AxisTarget::ceiling(
        target,
        format!("At most {} weak words per 100 ({})", target, label),
    )
}

fn accessibility_target(profile: &QualityProfile) -> AxisTarget {
    match non_negative(profile.target_grade_level) {
        Some(grade) => AxisTarget::banded(
            grade,
            non_negative(profile.grade_tolerance).unwrap_or(DEFAULT_GRADE_TOLERANCE),
            format!("Grade level {}", grade),
        ),
        None => AxisTarget::banded(
            DEFAULT_GRADE_LEVEL,
            DEFAULT_ACCESSIBILITY_TOLERANCE,
            "Default grade level".to_string(),
        ),
    }
}

fn density_target(profile: &QualityProfile) -> AxisTarget {
    let longest = positive(profile.max_sentence_length).unwrap_or(DEFAULT_MAX_SENTENCE_LENGTH);
    AxisTarget::banded(
        longest * 0.6,
        longest * 0.2,
        format!("Sentences well under {} words", longest),
    )
}

fn flow_target(_profile: &QualityProfile) -> AxisTarget {
    AxisTarget::banded(
        FLOW_TARGET,
        FLOW_TOLERANCE,
        "Balanced sentence-length variety".to_string(),
    )
}

#[derive(Debug, Default)]
struct OverlayCache {
    entries: HashMap<String, Arc<TargetSnapshot>>,
    /// Per-profile invalidation counters.
    generations: HashMap<String, u64>,
    /// Bumped by `invalidate_all_caches`.
    epoch: u64,
}

impl OverlayCache {
    fn stamp(&self, profile_id: &str) -> (u64, u64) {
        (
            self.epoch,
            self.generations.get(profile_id).copied().unwrap_or(0),
        )
    }
}

/// Computes and caches one target overlay per profile id.
pub struct TargetMapper {
    catalog: Arc<AxisCatalog>,
    profiles: Arc<dyn ProfileProvider>,
    cache: RwLock<OverlayCache>,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TargetMapper {
    /// Create a mapper. Fails unless every axis has exactly one rule.
    pub fn new(
        catalog: Arc<AxisCatalog>,
        profiles: Arc<dyn ProfileProvider>,
    ) -> Result<Self, CatalogError> {
        validate_table(&catalog, TARGET_RULES, |rule| rule.axis, "target rule")?;

        Ok(Self {
            catalog,
            profiles,
            cache: RwLock::new(OverlayCache::default()),
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Overlay for `profile`, or `None` when no profile is selected.
    pub async fn get_overlay(
        &self,
        profile: Option<&QualityProfile>,
        cancel: &CancellationToken,
    ) -> RadarResult<Option<Arc<TargetSnapshot>>> {
        let Some(profile) = profile else {
            return Ok(None);
        };
        if cancel.is_cancelled() {
            return Err(RadarError::Cancelled);
        }

        if let Some(snapshot) = self.cached(&profile.id)? {
            debug!("Target overlay for '{}' served from cache", profile.id);
            return Ok(Some(snapshot));
        }

        let lock = self.lock_for(&profile.id)?;
        let result = self.compute_locked(profile, &lock, cancel).await;
        self.release_lock(&profile.id, lock);
        result.map(Some)
    }

    /// Single-flight section of `get_overlay`, run under the profile's lock.
    async fn compute_locked(
        &self,
        profile: &QualityProfile,
        lock: &Mutex<()>,
        cancel: &CancellationToken,
    ) -> RadarResult<Arc<TargetSnapshot>> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RadarError::Cancelled),
            guard = lock.lock() => guard,
        };

        if let Some(snapshot) = self.cached(&profile.id)? {
            return Ok(snapshot);
        }

        let stamp = self.read_cache()?.stamp(&profile.id);
        let snapshot = Arc::new(self.compute(profile, cancel).await?);

        let mut cache = self.write_cache()?;
        if cache.stamp(&profile.id) == stamp {
            cache
                .entries
                .insert(profile.id.clone(), Arc::clone(&snapshot));
        }
        info!(
            "Computed target overlay for profile '{}' ({} axes)",
            profile.id,
            snapshot.points.len()
        );

        Ok(snapshot)
    }

    /// Overlay for the profile the [`ProfileProvider`] reports as active.
    pub async fn active_overlay(
        &self,
        cancel: &CancellationToken,
    ) -> RadarResult<Option<Arc<TargetSnapshot>>> {
        let profile = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RadarError::Cancelled),
            profile = self.profiles.active_profile() => profile,
        };
        self.get_overlay(profile.as_ref(), cancel).await
    }

    /// Drop the overlay cached for one profile.
    pub fn invalidate_cache(&self, profile_id: &str) -> RadarResult<()> {
        let mut cache = self.write_cache()?;
        cache.entries.remove(profile_id);
        *cache.generations.entry(profile_id.to_string()).or_default() += 1;
        debug!("Target overlay for '{}' invalidated", profile_id);
        Ok(())
    }

    /// Drop every cached overlay.
    pub fn invalidate_all_caches(&self) -> RadarResult<()> {
        let mut cache = self.write_cache()?;
        cache.entries.clear();
        // The epoch bump already outdates every per-profile stamp.
        cache.generations.clear();
        cache.epoch = cache.epoch.wrapping_add(1);
        debug!("All target overlays invalidated");
        Ok(())
    }

    pub fn cached(&self, profile_id: &str) -> RadarResult<Option<Arc<TargetSnapshot>>> {
        Ok(self.read_cache()?.entries.get(profile_id).cloned())
    }

    async fn compute(
        &self,
        profile: &QualityProfile,
        cancel: &CancellationToken,
    ) -> RadarResult<TargetSnapshot> {
        let mut points = Vec::with_capacity(self.catalog.len());

        for axis in self.catalog.axes() {
            if cancel.is_cancelled() {
                return Err(RadarError::Cancelled);
            }

            // Validated at construction; the fallback keeps the snapshot full.
            let target = match rule_for(axis.id) {
                Some(rule) => (rule.derive)(profile),
                None => AxisTarget {
                    raw_target: 0.0,
                    tolerance_min: None,
                    tolerance_max: None,
                    description: String::new(),
                },
            };

            points.push(TargetPoint {
                axis_name: axis.name.clone(),
                normalized_value: self.catalog.normalize(axis, target.raw_target),
                raw_value: target.raw_target,
                tolerance_min: target.tolerance_min,
                tolerance_max: target.tolerance_max,
                description: Some(target.description),
            });

            tokio::task::yield_now().await;
        }

        if cancel.is_cancelled() {
            return Err(RadarError::Cancelled);
        }

        let profile_name = if profile.name.is_empty() {
            profile.id.clone()
        } else {
            profile.name.clone()
        };

        Ok(TargetSnapshot {
            profile_id: profile.id.clone(),
            profile_name,
            points,
            computed_at: Utc::now(),
        })
    }

    fn lock_for(&self, profile_id: &str) -> RadarResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| RadarError::CacheUnavailable("target"))?;
        Ok(Arc::clone(locks.entry(profile_id.to_string()).or_default()))
    }

    /// Drop the profile's lock entry once no other caller holds it.
    fn release_lock(&self, profile_id: &str, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        let idle = locks
            .get(profile_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) == 2);
        if idle {
            locks.remove(profile_id);
        }
    }

    fn read_cache(&self) -> RadarResult<std::sync::RwLockReadGuard<'_, OverlayCache>> {
        self.cache
            .read()
            .map_err(|_| RadarError::CacheUnavailable("target"))
    }

    fn write_cache(&self) -> RadarResult<std::sync::RwLockWriteGuard<'_, OverlayCache>> {
        self.cache
            .write()
            .map_err(|_| RadarError::CacheUnavailable("target"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticProfile;
    use std::task::Poll;
    use tokio_test::{assert_pending, assert_ready_err, task};

    fn mapper() -> TargetMapper {
        TargetMapper::new(
            Arc::new(AxisCatalog::standard()),
            Arc::new(StaticProfile::new(None)),
        )
        .unwrap()
    }

    async fn overlay(mapper: &TargetMapper, profile: &QualityProfile) -> Arc<TargetSnapshot> {
        mapper
            .get_overlay(Some(profile), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_rule_table_covers_standard_catalog() {
        let catalog = AxisCatalog::standard();
        assert!(validate_table(&catalog, TARGET_RULES, |r| r.axis, "target rule").is_ok());
        for id in AxisId::ALL {
            assert!(rule_for(id).is_some(), "no rule for {}", id);
        }
    }

    #[tokio::test]
    async fn test_passive_voice_disallowed() {
        let mut profile = QualityProfile::new("academic", "Academic");
        profile.allow_passive_voice = Some(false);
        profile.max_passive_voice_percent = Some(25.0);

        let snapshot = overlay(&mapper(), &profile).await;
        let clarity = snapshot.point("Clarity").unwrap();
        assert_eq!(clarity.raw_value, 0.0);
        assert_eq!(clarity.normalized_value, 100.0);
    }

    #[tokio::test]
    async fn test_passive_voice_allowance() {
        let mut profile = QualityProfile::new("blog", "Blog");
        profile.allow_passive_voice = Some(true);
        profile.max_passive_voice_percent = Some(15.0);

        let snapshot = overlay(&mapper(), &profile).await;
        let clarity = snapshot.point("Clarity").unwrap();
        assert_eq!(clarity.raw_value, 15.0);
        assert_eq!(clarity.normalized_value, 70.0);
        assert_eq!(clarity.tolerance_max, Some(15.0));
    }

    #[tokio::test]
    async fn test_grade_level_drives_readability_and_accessibility() {
        let mut profile = QualityProfile::new("general", "General audience");
        profile.target_grade_level = Some(8.0);
        profile.grade_tolerance = Some(2.0);

        let snapshot = overlay(&mapper(), &profile).await;

        let readability = snapshot.point("Readability").unwrap();
        assert_eq!(readability.raw_value, 60.0);
        assert_eq!(readability.normalized_value, 60.0);
        assert_eq!(readability.tolerance_min, Some(50.0));
        assert_eq!(readability.tolerance_max, Some(70.0));

        let accessibility = snapshot.point("Accessibility").unwrap();
        assert_eq!(accessibility.raw_value, 8.0);
        assert_eq!(accessibility.normalized_value, 100.0);
        assert_eq!(accessibility.tolerance_min, Some(6.0));
        assert_eq!(accessibility.tolerance_max, Some(10.0));
    }

    #[tokio::test]
    async fn test_precision_depends_on_weak_word_flags() {
        let mapper = mapper();

        let mut strict = QualityProfile::new("strict", "Strict");
        strict.flag_filler_words = Some(true);
        strict.flag_hedging_words = Some(true);
        let mut moderate = QualityProfile::new("moderate", "Moderate");
        moderate.flag_hedging_words = Some(true);
        let relaxed = QualityProfile::new("relaxed", "Relaxed");

        let raw = |s: Arc<TargetSnapshot>| s.point("Precision").unwrap().raw_value;
        assert_eq!(raw(overlay(&mapper, &strict).await), PRECISION_TARGET_STRICT);
        assert_eq!(raw(overlay(&mapper, &moderate).await), PRECISION_TARGET_MODERATE);
        assert_eq!(raw(overlay(&mapper, &relaxed).await), PRECISION_TARGET_RELAXED);
    }

    #[tokio::test]
    async fn test_density_from_max_sentence_length() {
        let mut profile = QualityProfile::new("news", "News");
        profile.max_sentence_length = Some(20.0);

        let snapshot = overlay(&mapper(), &profile).await;
        let density = snapshot.point("Density").unwrap();
        assert!((density.raw_value - 12.0).abs() < 1e-9);
        assert!((density.tolerance_min.unwrap() - 8.0).abs() < 1e-9);
        assert!((density.tolerance_max.unwrap() - 16.0).abs() < 1e-9);
        // 12 against the catalog's 15 +/- 15.
        assert!((density.normalized_value - 80.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_profile_falls_back_to_defaults() {
        let profile = QualityProfile::new("blank", "");
        let snapshot = overlay(&mapper(), &profile).await;

        assert_eq!(snapshot.points.len(), 6);
        assert_eq!(snapshot.profile_name, "blank");
        assert_eq!(
            snapshot.point("Readability").unwrap().raw_value,
            DEFAULT_READABILITY_TARGET
        );
        assert_eq!(
            snapshot.point("Accessibility").unwrap().raw_value,
            DEFAULT_GRADE_LEVEL
        );
        assert_eq!(snapshot.point("Density").unwrap().raw_value, 15.0);
        let flow = snapshot.point("Flow").unwrap();
        assert_eq!(flow.raw_value, FLOW_TARGET);
        assert_eq!(flow.normalized_value, 100.0);
        assert!(snapshot.points.iter().all(|p| p.description.is_some()));
    }

    #[tokio::test]
    async fn test_malformed_values_fall_back() {
        let mut profile = QualityProfile::new("odd", "Odd");
        profile.max_sentence_length = Some(-4.0);
        profile.target_grade_level = Some(f64::NAN);
        profile.max_passive_voice_percent = Some(-1.0);

        let snapshot = overlay(&mapper(), &profile).await;
        assert_eq!(snapshot.point("Density").unwrap().raw_value, 15.0);
        assert_eq!(
            snapshot.point("Readability").unwrap().raw_value,
            DEFAULT_READABILITY_TARGET
        );
        assert_eq!(
            snapshot.point("Clarity").unwrap().raw_value,
            DEFAULT_PASSIVE_VOICE_PERCENT
        );
    }

    #[tokio::test]
    async fn test_no_profile_means_no_overlay() {
        let result = mapper()
            .get_overlay(None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_overlays_are_cached_per_profile() {
        let mapper = mapper();
        let a = QualityProfile::new("a", "A");
        let b = QualityProfile::new("b", "B");

        let a1 = overlay(&mapper, &a).await;
        let a2 = overlay(&mapper, &a).await;
        let b1 = overlay(&mapper, &b).await;
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b1));

        mapper.invalidate_cache("a").unwrap();
        assert!(mapper.cached("a").unwrap().is_none());
        assert!(mapper.cached("b").unwrap().is_some());

        let a3 = overlay(&mapper, &a).await;
        assert!(!Arc::ptr_eq(&a1, &a3));

        mapper.invalidate_all_caches().unwrap();
        assert!(mapper.cached("a").unwrap().is_none());
        assert!(mapper.cached("b").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_overlay_is_not_cached() {
        let mapper = mapper();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = mapper
            .get_overlay(Some(&QualityProfile::new("a", "A")), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(mapper.cached("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_overlay() {
        let mapper = Arc::new(mapper());
        let profile = QualityProfile::new("shared", "Shared");

        let calls = (0..4).map(|_| {
            let mapper = Arc::clone(&mapper);
            let profile = profile.clone();
            async move {
                mapper
                    .get_overlay(Some(&profile), &CancellationToken::new())
                    .await
            }
        });
        let results: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert!(results.iter().all(|s| Arc::ptr_eq(s, &results[0])));
    }

    #[tokio::test]
    async fn test_active_overlay_uses_profile_provider() {
        let profiles = Arc::new(StaticProfile::new(None));
        let mapper = TargetMapper::new(Arc::new(AxisCatalog::standard()), profiles.clone()).unwrap();
        let cancel = CancellationToken::new();

        assert!(mapper.active_overlay(&cancel).await.unwrap().is_none());

        profiles.set(Some(QualityProfile::new("fiction", "Fiction")));
        let overlay = mapper.active_overlay(&cancel).await.unwrap().unwrap();
        assert_eq!(overlay.profile_id, "fiction");
        assert_eq!(overlay.profile_name, "Fiction");
    }

    #[tokio::test]
    async fn test_high_grade_level_keeps_band_ordered() {
        let mut profile = QualityProfile::new("expert", "Expert");
        profile.target_grade_level = Some(22.0);

        let snapshot = overlay(&mapper(), &profile).await;
        let readability = snapshot.point("Readability").unwrap();
        assert_eq!(readability.raw_value, 0.0);
        assert_eq!(readability.tolerance_min, Some(0.0));
        assert_eq!(readability.tolerance_max, Some(5.0));
        assert!(readability.accepts(readability.raw_value));
    }

    #[tokio::test]
    async fn test_huge_grade_level_falls_back_to_default_reading_ease() {
        let mut profile = QualityProfile::new("huge", "Huge");
        profile.target_grade_level = Some(1e308);
        profile.grade_tolerance = Some(1e308);

        let snapshot = overlay(&mapper(), &profile).await;
        let readability = snapshot.point("Readability").unwrap();
        assert_eq!(readability.raw_value, DEFAULT_READABILITY_TARGET);
        assert!(readability.accepts(readability.raw_value));

        for point in &snapshot.points {
            assert!(point.raw_value.is_finite(), "{}", point.axis_name);
            assert!(point.tolerance_min.unwrap().is_finite(), "{}", point.axis_name);
            assert!(point.tolerance_max.unwrap().is_finite(), "{}", point.axis_name);
            assert!(point.tolerance_min <= point.tolerance_max, "{}", point.axis_name);
        }
        let json = serde_json::to_string(&*snapshot).unwrap();
        assert!(!json.contains("null"));
    }

    #[tokio::test]
    async fn test_cancel_during_compute_is_not_cached() {
        let mapper = mapper();
        let profile = QualityProfile::new("a", "A");
        let cancel = CancellationToken::new();

        let mut task = task::spawn(mapper.get_overlay(Some(&profile), &cancel));
        // First axis done, parked at the yield between axes.
        assert_pending!(task.poll());

        cancel.cancel();
        let err = assert_ready_err!(task.poll());
        assert!(err.is_cancelled());
        drop(task);

        assert!(mapper.cached("a").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidation_during_compute_is_not_cached() {
        let mapper = mapper();
        let profile = QualityProfile::new("a", "A");
        let cancel = CancellationToken::new();

        let mut task = task::spawn(mapper.get_overlay(Some(&profile), &cancel));
        assert_pending!(task.poll());

        mapper.invalidate_cache("a").unwrap();
        let snapshot = loop {
            if let Poll::Ready(result) = task.poll() {
                break result.unwrap().unwrap();
            }
        };
        drop(task);

        assert_eq!(snapshot.profile_id, "a");
        assert!(mapper.cached("a").unwrap().is_none());

        let fresh = overlay(&mapper, &profile).await;
        assert!(Arc::ptr_eq(&fresh, &mapper.cached("a").unwrap().unwrap()));
    }

    #[tokio::test]
    async fn test_profiles_do_not_block_each_other() {
        let mapper = mapper();
        let a = QualityProfile::new("a", "A");
        let b = QualityProfile::new("b", "B");

        let lock_a = mapper.lock_for("a").unwrap();
        let held = lock_a.lock().await;

        let cancel_a = CancellationToken::new();
        let mut waiting = task::spawn(mapper.get_overlay(Some(&a), &cancel_a));
        assert_pending!(waiting.poll());

        let other = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            mapper.get_overlay(Some(&b), &CancellationToken::new()),
        )
        .await
        .expect("profile b waited on profile a")
        .unwrap()
        .unwrap();
        assert_eq!(other.profile_id, "b");
        assert!(mapper.cached("a").unwrap().is_none());

        drop(held);
        let snapshot = loop {
            if let Poll::Ready(result) = waiting.poll() {
                break result.unwrap().unwrap();
            }
        };
        assert_eq!(snapshot.profile_id, "a");
    }

    #[tokio::test]
    async fn test_bookkeeping_does_not_grow_with_profiles() {
        let mapper = mapper();
        for i in 0..10 {
            let id = format!("p{}", i);
            overlay(&mapper, &QualityProfile::new(id.clone(), "P")).await;
            mapper.invalidate_cache(&id).unwrap();
        }

        assert!(mapper.locks.lock().unwrap().is_empty());
        assert_eq!(mapper.read_cache().unwrap().generations.len(), 10);

        mapper.invalidate_all_caches().unwrap();
        assert!(mapper.read_cache().unwrap().generations.is_empty());
    }
}
