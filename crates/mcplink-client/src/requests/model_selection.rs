//! Translation of MCP model preferences into the host's selection shape.

use mcplink_core::{ModelPreferences, ModelSelectionPreferences, OptimizationTarget};

const NEUTRAL_WEIGHT: f64 = 0.5;
/// A priority must lead the others by this much to pick a target.
const DOMINANCE_MARGIN: f64 = 0.1;

pub fn translate_preferences(preferences: Option<&ModelPreferences>) -> ModelSelectionPreferences {
    let Some(preferences) = preferences else {
        return ModelSelectionPreferences {
            preferred_models: Vec::new(),
            cost_weight: NEUTRAL_WEIGHT,
            speed_weight: NEUTRAL_WEIGHT,
            quality_weight: NEUTRAL_WEIGHT,
            optimize_for: OptimizationTarget::Balanced,
        };
    };

    let preferred_models = preferences
        .hints
        .iter()
        .filter_map(|hint| hint.name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let cost_weight = weight(preferences.cost_priority);
    let speed_weight = weight(preferences.speed_priority);
    let quality_weight = weight(preferences.intelligence_priority);

    ModelSelectionPreferences {
        preferred_models,
        cost_weight,
        speed_weight,
        quality_weight,
        optimize_for: dominant(cost_weight, speed_weight, quality_weight),
    }
}

fn weight(priority: Option<f64>) -> f64 {
    match priority {
        Some(p) if p.is_finite() => p.clamp(0.0, 1.0),
        _ => NEUTRAL_WEIGHT,
    }
}

fn dominant(cost: f64, speed: f64, quality: f64) -> OptimizationTarget {
    let ranked = [
        (OptimizationTarget::Cost, cost),
        (OptimizationTarget::Speed, speed),
        (OptimizationTarget::Quality, quality),
    ];
    let (target, best) = ranked
        .iter()
        .copied()
        .fold((OptimizationTarget::Balanced, f64::MIN), |acc, item| {
            if item.1 > acc.1 {
                item
            } else {
                acc
            }
        });
    let leads = ranked
        .iter()
        .filter(|(t, _)| *t != target)
        .all(|(_, w)| best - w >= DOMINANCE_MARGIN);
    if leads {
        target
    } else {
        OptimizationTarget::Balanced
    }
}
