pub mod blur;
pub mod diffusion;
pub mod normalize;
pub mod vesselness;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::media::Plane;

/// Key under which the enabled flag travels inside the params mapping.
const ACTIVE_KEY: &str = "active";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
    #[error("invalid parameters for '{filter}': {reason}")]
    InvalidParams { filter: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalNormParams {
    pub kernel_size: f64,
    pub cutoff_percentile: f64,
}

impl Default for LocalNormParams {
    fn default() -> Self {
        Self {
            kernel_size: 31.0,
            cutoff_percentile: 80.0,
        }
    }
}

/// Percentages of the unit interval, not data percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidNormParams {
    pub lower: f64,
    pub upper: f64,
    pub new_lower: f64,
    pub new_upper: f64,
}

impl Default for SigmoidNormParams {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 100.0,
            new_lower: 49.0,
            new_upper: 51.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaParams {
    pub gamma: f64,
}

impl Default for GammaParams {
    fn default() -> Self {
        Self { gamma: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnsharpMaskParams {
    pub strength: f64,
    pub kernel_size: f64,
}

impl Default for UnsharpMaskParams {
    fn default() -> Self {
        Self {
            strength: 1.0,
            kernel_size: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianBlurParams {
    pub sigma: f64,
}

impl Default for GaussianBlurParams {
    fn default() -> Self {
        Self { sigma: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinMaxNormParams {
    pub in_min: f64,
    pub in_max: f64,
    pub out_min: f64,
    pub out_max: f64,
}

impl Default for MinMaxNormParams {
    fn default() -> Self {
        Self {
            in_min: 0.0,
            in_max: 1.0,
            out_min: 0.0,
            out_max: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnisotropicParams {
    pub step_size: f64,
    pub sensitivity: f64,
    pub n_iter: u32,
}

impl Default for AnisotropicParams {
    fn default() -> Self {
        Self {
            step_size: 0.15,
            sensitivity: 0.1,
            n_iter: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrangiParams {
    pub scale_min: f64,
    pub scale_max: f64,
    pub scale_step: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Default for FrangiParams {
    fn default() -> Self {
        Self {
            scale_min: 1.0,
            scale_max: 10.0,
            scale_step: 2.0,
            alpha: 0.5,
            beta: 0.5,
            gamma: 15.0,
        }
    }
}

/// The closed filter catalogue.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    LocalNorm(LocalNormParams),
    SigmoidNorm(SigmoidNormParams),
    GammaCorrection(GammaParams),
    UnsharpMask(UnsharpMaskParams),
    GaussianBlur(GaussianBlurParams),
    MinMaxNorm(MinMaxNormParams),
    AnisotropicDenoising(AnisotropicParams),
    Frangi(FrangiParams),
}

impl FilterKind {
    /// Serialized names, in catalogue order.
    pub const NAMES: [&'static str; 8] = [
        "local_norm",
        "sigmoid_norm",
        "gamma_correction",
        "unsharp_mask",
        "gaussian_blur",
        "minmax_norm",
        "anisotropic_denoising",
        "frangi",
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FilterKind::LocalNorm(_) => "local_norm",
            FilterKind::SigmoidNorm(_) => "sigmoid_norm",
            FilterKind::GammaCorrection(_) => "gamma_correction",
            FilterKind::UnsharpMask(_) => "unsharp_mask",
            FilterKind::GaussianBlur(_) => "gaussian_blur",
            FilterKind::MinMaxNorm(_) => "minmax_norm",
            FilterKind::AnisotropicDenoising(_) => "anisotropic_denoising",
            FilterKind::Frangi(_) => "frangi",
        }
    }

    /// A filter with default parameters.
    pub fn default_for(name: &str) -> Result<Self, FilterError> {
        Self::from_params(name, &Map::new()).map(|(kind, _)| kind)
    }

    /// Build a filter from its name and a params mapping. Missing parameters
    /// take their defaults; unrecognized keys are returned, not rejected.
    pub fn from_params(
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<(Self, Vec<String>), FilterError> {
        match name {
            "local_norm" => parse_params(name, params).map(|(p, u)| (Self::LocalNorm(p), u)),
            "sigmoid_norm" => parse_params(name, params).map(|(p, u)| (Self::SigmoidNorm(p), u)),
            "gamma_correction" => {
                parse_params(name, params).map(|(p, u)| (Self::GammaCorrection(p), u))
            }
            "unsharp_mask" => parse_params(name, params).map(|(p, u)| (Self::UnsharpMask(p), u)),
            "gaussian_blur" => parse_params(name, params).map(|(p, u)| (Self::GaussianBlur(p), u)),
            "minmax_norm" => parse_params(name, params).map(|(p, u)| (Self::MinMaxNorm(p), u)),
            "anisotropic_denoising" => {
                parse_params(name, params).map(|(p, u)| (Self::AnisotropicDenoising(p), u))
            }
            "frangi" => parse_params(name, params).map(|(p, u)| (Self::Frangi(p), u)),
            other => Err(FilterError::UnknownFilter(other.to_string())),
        }
    }

    /// Current parameters as a JSON mapping (without the active flag).
    pub fn params(&self) -> Map<String, Value> {
        match self {
            FilterKind::LocalNorm(p) => to_map(p),
            FilterKind::SigmoidNorm(p) => to_map(p),
            FilterKind::GammaCorrection(p) => to_map(p),
            FilterKind::UnsharpMask(p) => to_map(p),
            FilterKind::GaussianBlur(p) => to_map(p),
            FilterKind::MinMaxNorm(p) => to_map(p),
            FilterKind::AnisotropicDenoising(p) => to_map(p),
            FilterKind::Frangi(p) => to_map(p),
        }
    }

    /// Replace one named parameter, validating the new value.
    pub fn set_param(&mut self, key: &str, value: Value) -> Result<(), FilterError> {
        let mut params = self.params();
        if !params.contains_key(key) {
            return Err(FilterError::InvalidParams {
                filter: self.name().to_string(),
                reason: format!("unknown parameter '{key}'"),
            });
        }
        params.insert(key.to_string(), value);
        let (kind, _) = Self::from_params(self.name(), &params)?;
        *self = kind;
        Ok(())
    }

    pub fn apply(&self, plane: &Plane) -> Plane {
        match self {
            FilterKind::LocalNorm(p) => {
                normalize::local_norm(plane, p.kernel_size as f32, p.cutoff_percentile as f32)
            }
            FilterKind::SigmoidNorm(p) => {
                normalize::sigmoid_norm(plane, p.lower, p.upper, p.new_lower, p.new_upper)
            }
            FilterKind::GammaCorrection(p) => normalize::gamma_correction(plane, p.gamma as f32),
            FilterKind::UnsharpMask(p) => {
                blur::unsharp_mask(plane, p.strength as f32, p.kernel_size as f32)
            }
            FilterKind::GaussianBlur(p) => blur::gaussian_blur(plane, p.sigma as f32),
            FilterKind::MinMaxNorm(p) => normalize::minmax_norm(
                plane,
                p.in_min as f32,
                p.in_max as f32,
                p.out_min as f32,
                p.out_max as f32,
            ),
            FilterKind::AnisotropicDenoising(p) => diffusion::anisotropic_diffusion(
                plane,
                p.step_size as f32,
                p.sensitivity as f32,
                p.n_iter,
            ),
            FilterKind::Frangi(p) => {
                let sigmas = vesselness::scales(
                    p.scale_min as f32,
                    p.scale_max as f32,
                    p.scale_step as f32,
                );
                vesselness::frangi(plane, &sigmas, p.beta as f32, p.gamma as f32)
            }
        }
    }
}

fn parse_params<P>(name: &str, params: &Map<String, Value>) -> Result<(P, Vec<String>), FilterError>
where
    P: Default + Serialize + DeserializeOwned,
{
    let known = to_map(&P::default());
    let mut accepted = Map::new();
    let mut unknown = Vec::new();
    for (key, value) in params {
        if key == ACTIVE_KEY {
            continue;
        }
        if known.contains_key(key) {
            accepted.insert(key.clone(), value.clone());
        } else {
            unknown.push(key.clone());
        }
    }
    let parsed = serde_json::from_value(Value::Object(accepted)).map_err(|e| {
        FilterError::InvalidParams {
            filter: name.to_string(),
            reason: e.to_string(),
        }
    })?;
    Ok((parsed, unknown))
}

fn to_map<P: Serialize>(params: &P) -> Map<String, Value> {
    match serde_json::to_value(params) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// On-disk shape of a filter: `{name, params: {..., active}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFilter {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// One pipeline slot. An inactive filter keeps its slot but passes data through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFilter", into = "RawFilter")]
pub struct FilterConfig {
    pub kind: FilterKind,
    pub active: bool,
}

impl FilterConfig {
    pub fn new(kind: FilterKind) -> Self {
        Self { kind, active: true }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn apply(&self, plane: &Plane) -> Plane {
        if self.active {
            self.kind.apply(plane)
        } else {
            plane.clone()
        }
    }
}

impl TryFrom<RawFilter> for FilterConfig {
    type Error = FilterError;

    fn try_from(raw: RawFilter) -> Result<Self, Self::Error> {
        let active = raw
            .params
            .get(ACTIVE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let (kind, unknown) = FilterKind::from_params(&raw.name, &raw.params)?;
        if !unknown.is_empty() {
            log::warn!(
                "Ignoring unknown parameter(s) {:?} for filter '{}'",
                unknown,
                raw.name
            );
        }
        Ok(Self { kind, active })
    }
}

impl From<FilterConfig> for RawFilter {
    fn from(config: FilterConfig) -> Self {
        let mut params = config.kind.params();
        params.insert(ACTIVE_KEY.to_string(), Value::Bool(config.active));
        Self {
            name: config.kind.name().to_string(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_name_round_trips() {
        for name in FilterKind::NAMES {
            let kind = FilterKind::default_for(name).unwrap();
            assert_eq!(kind.name(), name);

            let config = FilterConfig::new(kind);
            let text = serde_json::to_string(&config).unwrap();
            let back: FilterConfig = serde_json::from_str(&text).unwrap();
            assert_eq!(back, config);
        }
    }

    #[test]
    fn serialized_shape_carries_active_in_params() {
        let mut config = FilterConfig::new(FilterKind::GammaCorrection(GammaParams { gamma: 2.0 }));
        config.active = false;
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({"name": "gamma_correction", "params": {"gamma": 2.0, "active": false}})
        );
    }

    #[test]
    fn unknown_name_fails() {
        let result: Result<FilterConfig, _> =
            serde_json::from_value(json!({"name": "median", "params": {}}));
        assert!(result.is_err());
        assert_eq!(
            FilterKind::default_for("median"),
            Err(FilterError::UnknownFilter("median".into()))
        );
    }

    #[test]
    fn unknown_params_are_reported_not_fatal() {
        let params = json!({"sigma": 3.0, "mode": "reflect"});
        let Value::Object(map) = params else {
            panic!("expected object");
        };
        let (kind, unknown) = FilterKind::from_params("gaussian_blur", &map).unwrap();
        assert_eq!(kind, FilterKind::GaussianBlur(GaussianBlurParams { sigma: 3.0 }));
        assert_eq!(unknown, vec!["mode".to_string()]);
    }

    #[test]
    fn missing_params_take_defaults() {
        let config: FilterConfig =
            serde_json::from_value(json!({"name": "local_norm", "params": {"kernel_size": 15}}))
                .unwrap();
        assert!(config.active);
        match config.kind {
            FilterKind::LocalNorm(p) => {
                assert_eq!(p.kernel_size, 15.0);
                assert_eq!(p.cutoff_percentile, 80.0);
            }
            _ => panic!("expected LocalNorm"),
        }
    }

    #[test]
    fn wrong_param_type_is_invalid() {
        let result: Result<FilterConfig, _> = serde_json::from_value(
            json!({"name": "anisotropic_denoising", "params": {"n_iter": "many"}}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn set_param_updates_single_value() {
        let mut kind = FilterKind::default_for("sigmoid_norm").unwrap();
        kind.set_param("new_upper", json!(75.0)).unwrap();
        match kind {
            FilterKind::SigmoidNorm(p) => {
                assert_eq!(p.new_upper, 75.0);
                assert_eq!(p.new_lower, 49.0);
            }
            _ => panic!("expected SigmoidNorm"),
        }
        assert!(kind.set_param("bogus", json!(1)).is_err());
        assert!(kind.set_param("lower", json!("low")).is_err());
    }

    #[test]
    fn inactive_filter_is_pass_through() {
        let plane = Plane::from_fn(4, 4, |x, y| (x + y) as f32 / 6.0);
        let mut config = FilterConfig::new(FilterKind::GammaCorrection(GammaParams { gamma: 3.0 }));
        assert_ne!(config.apply(&plane), plane);
        config.active = false;
        assert_eq!(config.apply(&plane), plane);
    }

    #[test]
    fn every_filter_preserves_shape() {
        let plane = Plane::from_fn(12, 9, |x, y| ((x * 7 + y * 3) % 11) as f32 / 10.0);
        for name in FilterKind::NAMES {
            let kind = FilterKind::default_for(name).unwrap();
            let out = kind.apply(&plane);
            assert_eq!((out.width, out.height), (12, 9), "{name}");
            assert!(out.data.iter().all(|v| v.is_finite()), "{name}");
        }
    }

    #[test]
    fn frangi_with_tiny_scale_step_finishes() {
        let plane = Plane::from_fn(12, 9, |x, y| ((x * 7 + y * 3) % 11) as f32 / 10.0);
        let mut kind = FilterKind::default_for("frangi").unwrap();
        kind.set_param("scale_step", json!(1e-8)).unwrap();
        let out = kind.apply(&plane);
        assert_eq!((out.width, out.height), (12, 9));
    }
}
