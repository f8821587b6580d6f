use serde::{Deserialize, Serialize};

use crate::filter::{FilterConfig, RawFilter};
use crate::media::Plane;

/// Serializable, ordered filter list for one channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPipeline", into = "RawPipeline")]
pub struct PipelineConfig {
    pub filters: Vec<FilterConfig>,
}

impl PipelineConfig {
    pub fn new(filters: Vec<FilterConfig>) -> Self {
        Self { filters }
    }
}

#[derive(Serialize, Deserialize)]
struct RawPipeline {
    #[serde(default)]
    filters: Vec<RawFilter>,
}

impl From<RawPipeline> for PipelineConfig {
    /// Filters that fail to parse are skipped.
    fn from(raw: RawPipeline) -> Self {
        let filters = raw
            .filters
            .into_iter()
            .filter_map(|f| {
                let name = f.name.clone();
                match FilterConfig::try_from(f) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        log::warn!("Skipping filter '{name}': {e}");
                        None
                    }
                }
            })
            .collect();
        Self { filters }
    }
}

impl From<PipelineConfig> for RawPipeline {
    fn from(config: PipelineConfig) -> Self {
        Self {
            filters: config.filters.into_iter().map(RawFilter::from).collect(),
        }
    }
}

struct Stage {
    config: FilterConfig,
    output: Option<Plane>,
}

impl Stage {
    fn new(config: FilterConfig) -> Self {
        Self {
            config,
            output: None,
        }
    }
}

/// Runtime pipeline with per-stage memoized outputs.
///
/// Cached outputs are only valid for the input they were computed from;
/// call [`Pipeline::invalidate`] when the input changes.
pub struct Pipeline {
    stages: Vec<Stage>,
    stage_runs: usize,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            stages: config.filters.iter().cloned().map(Stage::new).collect(),
            stage_runs: 0,
        }
    }

    /// Diff against `config` slot by slot. A replaced slot drops its own output
    /// and every downstream output. Returns whether anything changed.
    pub fn update(&mut self, config: &PipelineConfig) -> bool {
        let mut first_changed = None;
        for (i, filter) in config.filters.iter().enumerate() {
            match self.stages.get_mut(i) {
                Some(stage) if stage.config == *filter => {}
                Some(stage) => {
                    *stage = Stage::new(filter.clone());
                    first_changed.get_or_insert(i);
                }
                None => {
                    self.stages.push(Stage::new(filter.clone()));
                    first_changed.get_or_insert(i);
                }
            }
        }

        let mut changed = false;
        if self.stages.len() > config.filters.len() {
            self.stages.truncate(config.filters.len());
            changed = true;
        }
        if let Some(start) = first_changed {
            for stage in &mut self.stages[start..] {
                stage.output = None;
            }
            changed = true;
        }
        changed
    }

    /// Run all stages, reusing memoized outputs up to the first stale stage.
    pub fn apply(&mut self, input: &Plane) -> Plane {
        for i in 0..self.stages.len() {
            let (done, rest) = self.stages.split_at_mut(i);
            let stage = &mut rest[0];
            if stage.output.is_some() {
                continue;
            }
            let source = done
                .last()
                .and_then(|s| s.output.as_ref())
                .unwrap_or(input);
            stage.output = Some(stage.config.apply(source));
            self.stage_runs += 1;
        }

        self.stages
            .last()
            .and_then(|s| s.output.clone())
            .unwrap_or_else(|| input.clone())
    }

    /// Drop every memoized output.
    pub fn invalidate(&mut self) {
        for stage in &mut self.stages {
            stage.output = None;
        }
    }

    /// Number of filter stages executed over this pipeline's lifetime.
    pub fn stage_runs(&self) -> usize {
        self.stage_runs
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.stages.iter().map(|s| s.config.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterKind, GammaParams, GaussianBlurParams};
    use serde_json::json;

    fn gamma(g: f64) -> FilterConfig {
        FilterConfig::new(FilterKind::GammaCorrection(GammaParams { gamma: g }))
    }

    fn blur(sigma: f64) -> FilterConfig {
        FilterConfig::new(FilterKind::GaussianBlur(GaussianBlurParams { sigma }))
    }

    fn input() -> Plane {
        Plane::from_fn(16, 16, |x, y| ((x * 5 + y * 3) % 16) as f32 / 15.0)
    }

    #[test]
    fn second_apply_hits_cache() {
        let config = PipelineConfig::new(vec![blur(1.0), gamma(2.0)]);
        let mut pipeline = Pipeline::new(&config);
        let first = pipeline.apply(&input());
        assert_eq!(pipeline.stage_runs(), 2);

        assert!(!pipeline.update(&config.clone()));
        let second = pipeline.apply(&input());
        assert_eq!(pipeline.stage_runs(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn changed_stage_recomputes_downstream_only() {
        let mut config = PipelineConfig::new(vec![blur(1.0), gamma(2.0), gamma(0.5)]);
        let mut pipeline = Pipeline::new(&config);
        pipeline.apply(&input());
        assert_eq!(pipeline.stage_runs(), 3);

        config.filters[1] = gamma(3.0);
        assert!(pipeline.update(&config));
        pipeline.apply(&input());
        // Stage 0 reused, stages 1 and 2 recomputed.
        assert_eq!(pipeline.stage_runs(), 5);
    }

    #[test]
    fn toggling_active_counts_as_change() {
        let mut config = PipelineConfig::new(vec![gamma(2.0)]);
        let mut pipeline = Pipeline::new(&config);
        let on = pipeline.apply(&input());

        config.filters[0].active = false;
        assert!(pipeline.update(&config));
        let off = pipeline.apply(&input());
        assert_eq!(off, input());
        assert_ne!(on, off);
    }

    #[test]
    fn truncation_removes_trailing_stages() {
        let mut pipeline = Pipeline::new(&PipelineConfig::new(vec![blur(1.0), gamma(2.0), gamma(0.5)]));
        pipeline.apply(&input());

        let shorter = PipelineConfig::new(vec![blur(1.0)]);
        assert!(pipeline.update(&shorter));
        assert_eq!(pipeline.len(), 1);
        assert_eq!(pipeline.config(), shorter);

        // Remaining stage output is still cached.
        let out = pipeline.apply(&input());
        assert_eq!(pipeline.stage_runs(), 3);
        assert_eq!(out, Pipeline::new(&shorter).apply(&input()));
    }

    #[test]
    fn append_runs_only_new_stage() {
        let mut pipeline = Pipeline::new(&PipelineConfig::new(vec![blur(1.0)]));
        pipeline.apply(&input());
        assert!(pipeline.update(&PipelineConfig::new(vec![blur(1.0), gamma(2.0)])));
        pipeline.apply(&input());
        assert_eq!(pipeline.stage_runs(), 2);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let mut pipeline = Pipeline::new(&PipelineConfig::default());
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.apply(&input()), input());
    }

    #[test]
    fn invalidate_forces_full_recompute() {
        let mut pipeline = Pipeline::new(&PipelineConfig::new(vec![blur(1.0), gamma(2.0)]));
        pipeline.apply(&input());
        pipeline.invalidate();
        pipeline.apply(&input());
        assert_eq!(pipeline.stage_runs(), 4);
    }

    #[test]
    fn unknown_filters_are_skipped_on_load() {
        let config: PipelineConfig = serde_json::from_value(json!({
            "filters": [
                {"name": "gamma_correction", "params": {"gamma": 2.0, "active": true}},
                {"name": "does_not_exist", "params": {}},
                {"name": "gaussian_blur", "params": {"sigma": 2.0}},
            ]
        }))
        .unwrap();
        assert_eq!(config, PipelineConfig::new(vec![gamma(2.0), blur(2.0)]));
    }

    #[test]
    fn config_json_round_trip() {
        let mut config = PipelineConfig::new(vec![blur(1.5), gamma(0.7)]);
        config.filters[1].active = false;
        let text = serde_json::to_string_pretty(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
