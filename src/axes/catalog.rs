//! The ordered set of quality axes and their normalization rules.

use crate::analysis::target::rule_for;
use crate::error::CatalogError;
use crate::models::{AxisDefinition, AxisId, Normalization, QualityProfile};
use std::collections::HashSet;

/// Immutable, validated list of radar axes in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisCatalog {
    axes: Vec<AxisDefinition>,
}

impl AxisCatalog {
    /// Build a catalog, sorting by `sort_order` and rejecting invalid axes.
    pub fn new(mut axes: Vec<AxisDefinition>) -> Result<Self, CatalogError> {
        if axes.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for axis in &axes {
            if !seen.insert(axis.id) {
                return Err(CatalogError::DuplicateAxis(axis.name.clone()));
            }
            validate_normalization(axis)?;
        }

        // Stable sort keeps insertion order for equal sort keys.
        axes.sort_by_key(|a| a.sort_order);
        Ok(Self { axes })
    }

    /// The six built-in axes, clockwise from the top.
    pub fn standard() -> Self {
        let axes = vec![
            AxisDefinition::new(
                AxisId::Readability,
                Normalization::Direct { max_value: 100.0 },
                0,
            )
            .with_description("Reading ease score")
            .with_unit("score"),
            AxisDefinition::new(AxisId::Clarity, Normalization::Inverse { max_value: 50.0 }, 1)
                .with_description("Share of sentences in passive voice")
                .with_unit("%"),
            AxisDefinition::new(AxisId::Precision, Normalization::Inverse { max_value: 10.0 }, 2)
                .with_description("Weak words per 100 words")
                .with_unit("per 100 words"),
            AxisDefinition::new(
                AxisId::Accessibility,
                Normalization::TargetCentered {
                    target: 8.0,
                    max_deviation: 8.0,
                },
                3,
            )
            .with_description("Reading grade level")
            .with_unit("grade"),
            AxisDefinition::new(
                AxisId::Density,
                Normalization::TargetCentered {
                    target: 15.0,
                    max_deviation: 15.0,
                },
                4,
            )
            .with_description("Average sentence length")
            .with_unit("words"),
            AxisDefinition::new(
                AxisId::Flow,
                Normalization::TargetCentered {
                    target: 8.0,
                    max_deviation: 8.0,
                },
                5,
            )
            .with_description("Sentence length variation")
            .with_unit("words"),
        ];

        Self { axes }
    }

    /// Axes in display order.
    pub fn axes(&self) -> &[AxisDefinition] {
        &self.axes
    }

    /// Case-insensitive lookup by display name or axis id.
    pub fn axis(&self, name: &str) -> Option<&AxisDefinition> {
        let name = name.trim();
        self.axes.iter().find(|a| {
            a.name.eq_ignore_ascii_case(name) || a.id.as_str().eq_ignore_ascii_case(name)
        })
    }

    pub fn axis_by_id(&self, id: AxisId) -> Option<&AxisDefinition> {
        self.axes.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Map a raw metric onto the 0-100 scale using the axis rule.
    pub fn normalize(&self, axis: &AxisDefinition, raw: f64) -> f64 {
        normalize(&axis.normalization, raw)
    }

    /// Copy of this catalog with targets and descriptions taken from `profile`.
    ///
    /// Only target-centered axes carry a target in their rule; the other
    /// axes get the profile's description but keep their scale.
    pub fn axes_for_profile(&self, profile: &QualityProfile) -> AxisCatalog {
        let axes = self
            .axes
            .iter()
            .map(|axis| {
                let mut axis = axis.clone();
                if let Some(rule) = rule_for(axis.id) {
                    let target = (rule.derive)(profile);
                    if let Normalization::TargetCentered { max_deviation, .. } = axis.normalization
                    {
                        axis.normalization = Normalization::TargetCentered {
                            target: target.raw_target,
                            max_deviation,
                        };
                    }
                    axis.description = Some(target.description);
                }
                axis
            })
            .collect();

        AxisCatalog { axes }
    }
}

/// Normalize a raw value with a single rule. Non-finite input scores 0.
pub fn normalize(rule: &Normalization, raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }

    let score = match *rule {
        Normalization::Direct { max_value } => raw / max_value * 100.0,
        Normalization::Inverse { max_value } => 100.0 - raw / max_value * 100.0,
        Normalization::TargetCentered {
            target,
            max_deviation,
        } => {
            if max_deviation == 0.0 {
                // Degenerate band: only an exact hit counts.
                if raw == target {
                    100.0
                } else {
                    0.0
                }
            } else {
                100.0 - (target - raw).abs() / max_deviation * 100.0
            }
        }
    };

    score.clamp(0.0, 100.0)
}

fn validate_normalization(axis: &AxisDefinition) -> Result<(), CatalogError> {
    let invalid = |message: String| CatalogError::InvalidParameter {
        axis: axis.name.clone(),
        message,
    };

    match axis.normalization {
        Normalization::Direct { max_value } | Normalization::Inverse { max_value } => {
            if !max_value.is_finite() || max_value <= 0.0 {
                return Err(invalid(format!("max_value must be > 0, got {}", max_value)));
            }
        }
        Normalization::TargetCentered {
            target,
            max_deviation,
        } => {
            if !target.is_finite() {
                return Err(invalid(format!("target must be finite, got {}", target)));
            }
            if !max_deviation.is_finite() || max_deviation < 0.0 {
                return Err(invalid(format!(
                    "max_deviation must be >= 0, got {}",
                    max_deviation
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECT: Normalization = Normalization::Direct { max_value: 100.0 };
    const INVERSE: Normalization = Normalization::Inverse { max_value: 50.0 };
    const CENTERED: Normalization = Normalization::TargetCentered {
        target: 15.0,
        max_deviation: 30.0,
    };

    #[test]
    fn test_direct_normalization() {
        assert_eq!(normalize(&DIRECT, 0.0), 0.0);
        assert_eq!(normalize(&DIRECT, 100.0), 100.0);
        assert_eq!(normalize(&DIRECT, 42.0), 42.0);
        assert_eq!(normalize(&DIRECT, -10.0), 0.0);
        assert_eq!(normalize(&DIRECT, 250.0), 100.0);
    }

    #[test]
    fn test_inverse_normalization() {
        assert_eq!(normalize(&INVERSE, 0.0), 100.0);
        assert_eq!(normalize(&INVERSE, 50.0), 0.0);
        assert_eq!(normalize(&INVERSE, 25.0), 50.0);
        assert_eq!(normalize(&INVERSE, 80.0), 0.0);
    }

    #[test]
    fn test_target_centered_normalization() {
        assert_eq!(normalize(&CENTERED, 15.0), 100.0);
        assert_eq!(normalize(&CENTERED, 0.0), 50.0);
        assert!((normalize(&CENTERED, 18.0) - 90.0).abs() < 1e-9);
        assert_eq!(normalize(&CENTERED, 45.0), 0.0);
        assert_eq!(normalize(&CENTERED, 90.0), 0.0);
    }

    #[test]
    fn test_degenerate_deviation() {
        let rule = Normalization::TargetCentered {
            target: 10.0,
            max_deviation: 0.0,
        };
        assert_eq!(normalize(&rule, 10.0), 100.0);
        assert_eq!(normalize(&rule, 10.5), 0.0);
    }

    #[test]
    fn test_non_finite_raw_scores_zero() {
        assert_eq!(normalize(&DIRECT, f64::NAN), 0.0);
        assert_eq!(normalize(&INVERSE, f64::INFINITY), 0.0);
    }

    #[test]
    fn test_standard_catalog_order() {
        let catalog = AxisCatalog::standard();
        let names: Vec<&str> = catalog.axes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Readability", "Clarity", "Precision", "Accessibility", "Density", "Flow"]
        );
        assert!(AxisCatalog::new(catalog.axes().to_vec()).is_ok());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let catalog = AxisCatalog::standard();
        assert_eq!(catalog.axis("clarity").map(|a| a.id), Some(AxisId::Clarity));
        assert_eq!(catalog.axis("DENSITY").map(|a| a.id), Some(AxisId::Density));
        assert!(catalog.axis("tone").is_none());
    }

    #[test]
    fn test_new_sorts_by_sort_order() {
        let catalog = AxisCatalog::new(vec![
            AxisDefinition::new(AxisId::Flow, CENTERED, 2),
            AxisDefinition::new(AxisId::Readability, DIRECT, 0),
            AxisDefinition::new(AxisId::Clarity, INVERSE, 1),
        ])
        .unwrap();
        let ids: Vec<AxisId> = catalog.axes().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![AxisId::Readability, AxisId::Clarity, AxisId::Flow]);
    }

    #[test]
    fn test_new_rejects_invalid_catalogs() {
        assert_eq!(AxisCatalog::new(vec![]), Err(CatalogError::Empty));

        let dup = AxisCatalog::new(vec![
            AxisDefinition::new(AxisId::Flow, CENTERED, 0),
            AxisDefinition::new(AxisId::Flow, CENTERED, 1),
        ]);
        assert_eq!(dup, Err(CatalogError::DuplicateAxis("Flow".to_string())));

        let zero_max = AxisCatalog::new(vec![AxisDefinition::new(
            AxisId::Readability,
            Normalization::Direct { max_value: 0.0 },
            0,
        )]);
        assert!(matches!(zero_max, Err(CatalogError::InvalidParameter { .. })));

        let negative = AxisCatalog::new(vec![AxisDefinition::new(
            AxisId::Density,
            Normalization::TargetCentered {
                target: 15.0,
                max_deviation: -1.0,
            },
            0,
        )]);
        assert!(matches!(negative, Err(CatalogError::InvalidParameter { .. })));

        let degenerate = AxisCatalog::new(vec![AxisDefinition::new(
            AxisId::Density,
            Normalization::TargetCentered {
                target: 15.0,
                max_deviation: 0.0,
            },
            0,
        )]);
        assert!(degenerate.is_ok());
    }

    #[test]
    fn test_axes_for_profile_is_a_copy() {
        let catalog = AxisCatalog::standard();
        let mut profile = QualityProfile::new("tech", "Technical");
        profile.max_sentence_length = Some(30.0);
        profile.target_grade_level = Some(12.0);

        let adjusted = catalog.axes_for_profile(&profile);

        let density = adjusted.axis_by_id(AxisId::Density).unwrap();
        assert_eq!(density.target_value(), Some(18.0));
        assert_eq!(density.max_deviation(), Some(15.0));
        assert_eq!(
            adjusted.axis_by_id(AxisId::Accessibility).unwrap().target_value(),
            Some(12.0)
        );
        assert!(adjusted
            .axis_by_id(AxisId::Readability)
            .unwrap()
            .description
            .is_some());

        // The original keeps its defaults.
        assert_eq!(
            catalog.axis_by_id(AxisId::Density).unwrap().target_value(),
            Some(15.0)
        );
        assert_eq!(adjusted.len(), catalog.len());
    }
}
