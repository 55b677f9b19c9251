use crate::cache::{ExplanationCache, step_key};
use crate::explain::Explainer;
use crate::tour::graph::{GraphMode, build_graph};
use crate::tour::grouping::{DEFAULT_PROXIMITY_THRESHOLD, group_units};
use crate::tour::models::{ChangeUnit, CodeRegion, LineRange, Tour, TourStep};
use crate::tour::order::order;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct TourOptions<'a> {
    pub intent: Option<&'a str>,
    pub proximity_threshold: usize,
    pub mode: GraphMode,
}

impl Default for TourOptions<'_> {
    fn default() -> Self {
        Self {
            intent: None,
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            mode: GraphMode::Diff,
        }
    }
}

/// Turn change units into an ordered, explained tour.
///
/// Units are grouped, one main step is made per unit, and the main steps are
/// ordered. Every distinct background region becomes one background step,
/// placed right before the first main step that depends on it. Explanations
/// come from `cache` when a record with the step's key exists, otherwise
/// from `explainer`; failures get a placeholder text and do not fail the build.
pub fn build_tour(
    units: Vec<ChangeUnit>,
    explainer: &dyn Explainer,
    cache: &mut ExplanationCache,
    options: &TourOptions,
) -> Tour {
    cache.reset_for_intent(options.intent);

    let groups = group_units(&units, options.proximity_threshold);
    let main_steps: Vec<TourStep> = groups
        .into_iter()
        .flat_map(|g| g.units)
        .enumerate()
        .map(|(i, unit)| TourStep::main(format!("main-{}", i + 1), unit))
        .collect();

    let main_steps = order(main_steps, options.mode);
    let graph = build_graph(&main_steps, options.mode);

    let mut steps = Vec::with_capacity(main_steps.len());
    let mut background_ids: HashMap<(String, LineRange), String> = HashMap::new();
    for mut step in main_steps {
        let regions: Vec<CodeRegion> = step
            .unit()
            .map(|u| u.background_regions.clone())
            .unwrap_or_default();
        for region in regions {
            let key = (region.file_path.clone(), region.range);
            let id = match background_ids.get(&key) {
                Some(id) => id.clone(),
                None => {
                    let id = format!("bg-{}", background_ids.len() + 1);
                    background_ids.insert(key, id.clone());
                    steps.push(TourStep::background(id.clone(), region));
                    id
                }
            };
            if !step.depends_on.contains(&id) {
                step.depends_on.push(id);
            }
        }
        steps.push(step);
    }

    let (mut fresh, mut cached, mut failed) = (0usize, 0usize, 0usize);
    for step in &mut steps {
        let key = step_key(step);
        if let Some(text) = cache.get(&key) {
            step.explanation = text.to_string();
            cached += 1;
            continue;
        }
        match explainer.explain(&step.target, options.intent) {
            Ok(text) => {
                step.explanation = text;
                cache.put(step);
                fresh += 1;
            }
            Err(e) => {
                warn!("Explanation failed for {}: {}", key, e);
                step.explanation = format!("(explanation unavailable: {e})");
                failed += 1;
            }
        }
    }

    info!(
        "Built tour: {} step(s), {} node(s), {} edge(s); explanations {} new, {} cached, {} failed",
        steps.len(),
        graph.nodes.len(),
        graph.edges.len(),
        fresh,
        cached,
        failed
    );

    Tour { steps, graph }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::{ExplainError, PlaceholderExplainer};
    use crate::tour::graph::fixtures::*;
    use crate::tour::models::{StepKind, StepTarget};
    use std::sync::Mutex;

    /// Counts calls and fails for one file.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    impl Explainer for Recording {
        fn explain(&self, target: &StepTarget, _intent: Option<&str>) -> Result<String, ExplainError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(target.file_path().to_string());
            if target.file_path() == "broken.js" {
                return Err(ExplainError::RequestFailed("boom".into()));
            }
            Ok(format!("explained #{}", calls.len()))
        }
    }

    fn with_region(mut unit: ChangeUnit, label: &str, start: usize) -> ChangeUnit {
        unit.background_regions.push(CodeRegion {
            file_path: unit.file_path.clone(),
            range: LineRange::new(start, start + 1),
            label: label.to_string(),
        });
        unit
    }

    #[test]
    fn test_background_steps_precede_first_dependent() {
        let units = vec![
            with_region(operation("a.js", Some(("run", 1, 20)), 5), "util", 40),
            with_region(operation("a.js", Some(("stop", 30, 35)), 31), "util", 40),
            global("a.js", "MAX", 50),
        ];
        let tour = build_tour(
            units,
            &PlaceholderExplainer,
            &mut ExplanationCache::new(),
            &TourOptions::default(),
        );

        let kinds: Vec<StepKind> = tour.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![StepKind::Main, StepKind::Background, StepKind::Main, StepKind::Main]
        );
        assert_eq!(tour.steps[1].id, "bg-1");
        assert_eq!(tour.steps[2].depends_on, vec!["bg-1"]);
        assert_eq!(tour.steps[3].depends_on, vec!["bg-1"]);
        assert!(tour.steps.iter().all(|s| !s.explanation.is_empty()));
        assert_eq!(tour.graph.nodes.len(), 3);
    }

    #[test]
    fn test_cache_hits_and_failures() {
        let units = vec![
            definition("ok.js", "f", 1, 3),
            definition("broken.js", "g", 1, 3),
        ];
        let explainer = Recording::default();
        let mut cache = ExplanationCache::new();
        let options = TourOptions {
            intent: Some("perf"),
            ..TourOptions::default()
        };

        let first = build_tour(units.clone(), &explainer, &mut cache, &options);
        assert!(first.steps[0].explanation.starts_with("(explanation unavailable"));
        assert_eq!(first.steps[1].explanation, "explained #2");
        assert_eq!(cache.len(), 1, "failures are not cached");

        let second = build_tour(units.clone(), &explainer, &mut cache, &options);
        assert_eq!(second.steps[1].explanation, "explained #2");
        assert_eq!(explainer.calls.lock().unwrap().len(), 3);

        let other = TourOptions {
            intent: Some("security"),
            ..TourOptions::default()
        };
        build_tour(units, &explainer, &mut cache, &other);
        assert_eq!(explainer.calls.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_empty_units() {
        let tour = build_tour(
            Vec::new(),
            &PlaceholderExplainer,
            &mut ExplanationCache::new(),
            &TourOptions::default(),
        );
        assert!(tour.steps.is_empty());
        assert!(tour.graph.nodes.is_empty());
    }
}
