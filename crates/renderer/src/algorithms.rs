//! Registry of named scalar fields.
//!
//! An [`AlgorithmSpec`] names an entry and carries its numeric parameters.
//! [`resolve`] validates the spec against the closed [`Algorithm`] table and
//! binds it to a [`NoiseBank`], producing a [`FieldFunction`] that maps
//! normalized coordinates to a scalar in `[0, 1]`.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::{self, Deserializer, SeqAccess};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::FieldError;
use crate::noise::NoiseBank;

const MAX_OCTAVES: f64 = 32.0;

/// A scalar field sampled at normalized coordinates.
///
/// 1D fields ignore `v`; only colour renderers pass a non-zero `channel`.
pub trait Field {
    fn sample(&self, u: f64, v: f64, channel: usize) -> f64;
}

impl<F> Field for F
where
    F: Fn(f64, f64, usize) -> f64,
{
    fn sample(&self, u: f64, v: f64, channel: usize) -> f64 {
        self(u, v, channel)
    }
}

/// An algorithm name followed by its numeric configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmSpec {
    pub name: String,
    pub params: Vec<f64>,
}

impl AlgorithmSpec {
    pub fn new(name: impl Into<String>, params: impl Into<Vec<f64>>) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
        }
    }

    /// Spec for a parameterless entry.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }
}

impl fmt::Display for AlgorithmSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            f.write_str(if index == 0 { ":" } else { "," })?;
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

/// Parses `name` or `name:p0,p1,...`.
impl FromStr for AlgorithmSpec {
    type Err = FieldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let (name, params) = match raw.split_once(':') {
            Some((name, params)) => (name.trim(), Some(params)),
            None => (raw, None),
        };
        if name.is_empty() {
            return Err(FieldError::UnknownAlgorithm(String::new()));
        }
        let params = match params {
            None => Vec::new(),
            Some(list) => list
                .split(',')
                .map(|item| {
                    item.trim().parse::<f64>().map_err(|_| {
                        FieldError::invalid(name, format!("'{}' is not a number", item.trim()))
                    })
                })
                .collect::<Result<_, _>>()?,
        };
        Ok(Self::new(name, params))
    }
}

impl Serialize for AlgorithmSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.params.len() + 1))?;
        seq.serialize_element(&self.name)?;
        for param in &self.params {
            seq.serialize_element(param)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AlgorithmSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;
        impl<'de> de::Visitor<'de> for Visitor {
            type Value = AlgorithmSpec;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("an algorithm name, 'name:p0,p1,...', or [name, p0, p1, ...]")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse().map_err(E::custom)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let name: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let mut params = Vec::new();
                while let Some(param) = seq.next_element::<f64>()? {
                    params.push(param);
                }
                Ok(AlgorithmSpec { name, params })
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// Configuration shared by the multi-octave entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Octaves {
    pub amplitude: f64,
    pub frequency: f64,
    pub octaves: u32,
    pub persistence: f64,
}

impl Octaves {
    fn from_params(name: &str, params: &[f64]) -> Result<Self, FieldError> {
        let [amplitude, frequency, octaves, persistence] = params else {
            return Err(FieldError::invalid(
                name,
                format!(
                    "expected 4 parameters (amplitude, frequency, octaves, persistence), got {}",
                    params.len()
                ),
            ));
        };
        if params.iter().any(|p| !p.is_finite()) {
            return Err(FieldError::invalid(name, "parameters must be finite"));
        }
        if octaves.fract() != 0.0 || *octaves < 1.0 || *octaves > MAX_OCTAVES {
            return Err(FieldError::invalid(
                name,
                format!("octaves must be a whole number between 1 and {MAX_OCTAVES}, got {octaves}"),
            ));
        }
        Ok(Self {
            amplitude: *amplitude,
            frequency: *frequency,
            octaves: *octaves as u32,
            persistence: *persistence,
        })
    }

    /// Yields `(frequency, weight)` for each octave: frequency doubles and
    /// weight decays by `persistence` per step.
    fn steps(self) -> impl Iterator<Item = (f64, f64)> {
        (0..self.octaves).scan((self.frequency, self.amplitude), move |state, _| {
            let step = *state;
            state.0 *= 2.0;
            state.1 *= self.persistence;
            Some(step)
        })
    }

    /// `2 - 2^(1 - octaves)`: the sum of a halving geometric series.
    fn normalizer(self) -> f64 {
        2.0 - 2f64.powi(1 - self.octaves as i32)
    }
}

/// Closed table of registered field algorithms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Algorithm {
    Simple1d,
    SimplePow1d,
    Cos1d,
    AbsCos1d,
    InvAbsSin1d,
    Simple2d,
    Cos2d,
    Noise2d,
    Fractal2d(Octaves),
    MultFractal2d(Octaves),
}

impl Algorithm {
    /// Every registered name, in listing order.
    pub const NAMES: [&'static str; 10] = [
        "simple1d",
        "simplePow1d",
        "cos1d",
        "absCos1d",
        "invAbsSin1d",
        "simple2d",
        "cos2d",
        "noise2d",
        "fractal2d",
        "multFractal2d",
    ];

    /// Validates `spec` against the table.
    pub fn from_spec(spec: &AlgorithmSpec) -> Result<Self, FieldError> {
        let name = spec.name.as_str();
        let algorithm = match name {
            "simple1d" => Algorithm::Simple1d,
            "simplePow1d" => Algorithm::SimplePow1d,
            "cos1d" => Algorithm::Cos1d,
            "absCos1d" => Algorithm::AbsCos1d,
            "invAbsSin1d" => Algorithm::InvAbsSin1d,
            "simple2d" => Algorithm::Simple2d,
            "cos2d" => Algorithm::Cos2d,
            "noise2d" => Algorithm::Noise2d,
            "fractal2d" => return Ok(Algorithm::Fractal2d(Octaves::from_params(name, &spec.params)?)),
            "multFractal2d" => {
                return Ok(Algorithm::MultFractal2d(Octaves::from_params(name, &spec.params)?))
            }
            other => return Err(FieldError::UnknownAlgorithm(other.to_string())),
        };
        if !spec.params.is_empty() {
            return Err(FieldError::invalid(
                name,
                format!("takes no parameters, got {}", spec.params.len()),
            ));
        }
        Ok(algorithm)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Simple1d => "simple1d",
            Algorithm::SimplePow1d => "simplePow1d",
            Algorithm::Cos1d => "cos1d",
            Algorithm::AbsCos1d => "absCos1d",
            Algorithm::InvAbsSin1d => "invAbsSin1d",
            Algorithm::Simple2d => "simple2d",
            Algorithm::Cos2d => "cos2d",
            Algorithm::Noise2d => "noise2d",
            Algorithm::Fractal2d(_) => "fractal2d",
            Algorithm::MultFractal2d(_) => "multFractal2d",
        }
    }

    /// Parameter names expected after the algorithm name.
    pub fn parameters(name: &str) -> Option<&'static [&'static str]> {
        const OCTAVE_PARAMS: &[&str] = &["amplitude", "frequency", "octaves", "persistence"];
        match name {
            "fractal2d" | "multFractal2d" => Some(OCTAVE_PARAMS),
            other if Self::NAMES.contains(&other) => Some(&[]),
            _ => None,
        }
    }

    /// Human readable formula for listings.
    pub fn describe(name: &str) -> Option<&'static str> {
        let text = match name {
            "simple1d" => "f(x) = x",
            "simplePow1d" => "f(x) = (2x - 1)^2",
            "cos1d" => "f(x) = cos(x * 4pi) / 2 + 0.5",
            "absCos1d" => "f(x) = abs(cos(x * 2pi))",
            "invAbsSin1d" => "f(x) = -abs(sin(x * 2pi)) + 1",
            "simple2d" => "f(x, y) = x * y",
            "cos2d" => "f(x, y) = cos(x * 5pi) * cos(y * 5pi) / 2 + 0.5",
            "noise2d" => "f(x, y) = noise2D(20x, 20y) / 2 + 0.5",
            "fractal2d" => "f(x, y) = sum of noise octaves, normalized",
            "multFractal2d" => "f(x, y) = product of noise octaves, log-rescaled",
            _ => return None,
        };
        Some(text)
    }
}

/// A resolved algorithm bound to the noise sources it samples.
#[derive(Clone)]
pub struct FieldFunction {
    algorithm: Algorithm,
    noise: Arc<NoiseBank>,
}

impl FieldFunction {
    fn unit_noise(&self, u: f64, v: f64, channel: usize) -> f64 {
        self.noise.channel(channel).sample(u * 20.0, v * 20.0) / 2.0 + 0.5
    }
}

impl Field for FieldFunction {
    fn sample(&self, u: f64, v: f64, channel: usize) -> f64 {
        match self.algorithm {
            Algorithm::Simple1d => u,
            Algorithm::SimplePow1d => (u * 2.0 - 1.0).powi(2),
            Algorithm::Cos1d => (u * 4.0 * PI).cos() / 2.0 + 0.5,
            Algorithm::AbsCos1d => (u * 2.0 * PI).cos().abs(),
            Algorithm::InvAbsSin1d => 1.0 - (u * 2.0 * PI).sin().abs(),
            Algorithm::Simple2d => u * v,
            Algorithm::Cos2d => (u * 5.0 * PI).cos() * (v * 5.0 * PI).cos() / 2.0 + 0.5,
            Algorithm::Noise2d => self.unit_noise(u, v, channel),
            Algorithm::Fractal2d(octaves) => {
                let noise = self.noise.channel(channel);
                let (x, y) = (u * 10.0, v * 10.0);
                let sum: f64 = octaves
                    .steps()
                    .map(|(freq, weight)| noise.sample(x * freq, y * freq) * weight)
                    .sum();
                (sum / octaves.normalizer() / 2.0 + 0.5).clamp(0.0, 1.0)
            }
            Algorithm::MultFractal2d(octaves) => {
                let product: f64 = octaves
                    .steps()
                    .map(|(freq, weight)| self.unit_noise(u * freq, v * freq, channel) * weight)
                    .product();
                if product <= 0.0 {
                    return 0.0;
                }
                ((product / octaves.normalizer()).log2() / 12.0 + 1.5).clamp(0.0, 1.0)
            }
        }
    }
}

impl fmt::Debug for FieldFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldFunction")
            .field("algorithm", &self.algorithm)
            .field("seed", &self.noise.seed())
            .finish()
    }
}

/// Looks up `spec` in the registry and binds it to `noise`.
pub fn resolve(spec: &AlgorithmSpec, noise: &Arc<NoiseBank>) -> Result<FieldFunction, FieldError> {
    let algorithm = Algorithm::from_spec(spec)?;
    Ok(FieldFunction {
        algorithm,
        noise: Arc::clone(noise),
    })
}
