use std::fmt;
use std::time::Duration;

use renderer::{Algorithm, AlgorithmSpec, Dimension, FieldError, RendererKind};
use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse gallery: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid gallery: {0}")]
    Invalid(String),
}

/// Panel width used when neither the file nor the caller chooses one.
pub const DEFAULT_WIDTH: u32 = 800;

/// A page of field experiments rendered side by side.
#[derive(Debug, Clone, Deserialize)]
pub struct Gallery {
    pub version: u32,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
    /// How long the caller waits for each panel before giving up on it.
    #[serde(default, deserialize_with = "deserialize_duration_opt")]
    pub wait_timeout: Option<Duration>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub panels: Vec<Panel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Panel {
    pub title: String,
    pub renderer: String,
    pub algorithm: AlgorithmSpec,
    /// Height as a fraction of width.
    #[serde(default = "default_ratio")]
    pub ratio: f64,
}

fn default_ratio() -> f64 {
    0.6
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(v)
                .map(|secs| Some(Duration::from_secs(secs)))
                .map_err(|_| E::custom("duration must be non-negative"))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(v)
                .map(Some)
                .map_err(|_| E::custom("duration must be a non-negative number of seconds"))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Gallery {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: Gallery = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// The stock experiment page: 1D curves, 2D fields, then colour noise.
    pub fn builtin() -> Self {
        let row = |title: &str, algorithm: &str| Panel::new(title, "renderX", algorithm, 0.2);
        let plane = |title: &str, algorithm: &str| Panel::new(title, "renderXY", algorithm, 0.6);
        let color = |title: &str, algorithm: &str| Panel::new(title, "renderXYC", algorithm, 0.6);
        let octaves = |name: &str| AlgorithmSpec::new(name, vec![1.0, 0.1, 8.0, 1.0]);

        Self {
            version: 1,
            workers: None,
            seed: None,
            wait_timeout: None,
            width: None,
            panels: vec![
                row("f(x) = x", "simple1d"),
                row("f(x) = (2x - 1)^2", "simplePow1d"),
                row("f(x) = abs(cos(x * 2pi))", "absCos1d"),
                row("f(x) = cos(x * 4pi) / 2 + 0.5", "cos1d"),
                row("f(x) = -abs(sin(x * 2pi)) + 1", "invAbsSin1d"),
                plane("f(x, y) = x * y", "simple2d"),
                plane("f(x, y) = cos(x) * cos(y)", "cos2d"),
                plane("f(x, y) = noise2D(x, y)", "noise2d"),
                Panel {
                    algorithm: octaves("fractal2d"),
                    ..plane("f(x, y) = fractal2D(x, y)", "fractal2d")
                },
                Panel {
                    algorithm: octaves("multFractal2d"),
                    ..plane("f(x, y) = multFractal2D(x, y)", "multFractal2d")
                },
                color("rgb(x, y) = noise2D(x, y)", "noise2d"),
                Panel {
                    algorithm: octaves("fractal2d"),
                    ..color("rgb(x, y) = fractal2D(x, y)", "fractal2d")
                },
            ],
        }
    }

    pub fn width(&self) -> u32 {
        self.width.unwrap_or(DEFAULT_WIDTH)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported gallery version {}; expected 1",
                self.version
            )));
        }

        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }

        if self.panels.is_empty() {
            return Err(ConfigError::Invalid(
                "gallery must define at least one panel".into(),
            ));
        }

        for (index, panel) in self.panels.iter().enumerate() {
            let label = if panel.title.trim().is_empty() {
                format!("panel {index}")
            } else {
                format!("panel '{}'", panel.title)
            };

            panel
                .renderer
                .parse::<RendererKind>()
                .map_err(|err| ConfigError::Invalid(format!("{label}: {err}")))?;

            Algorithm::from_spec(&panel.algorithm)
                .map_err(|err| ConfigError::Invalid(format!("{label}: {err}")))?;

            if !panel.ratio.is_finite() || panel.ratio < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{label}: ratio must be a non-negative number"
                )));
            }

            panel
                .dimension(self.width())
                .map_err(|err| ConfigError::Invalid(format!("{label}: {err}")))?;
        }

        Ok(())
    }
}

impl Panel {
    pub fn new(title: &str, renderer: &str, algorithm: &str, ratio: f64) -> Self {
        Self {
            title: title.to_string(),
            renderer: renderer.to_string(),
            algorithm: AlgorithmSpec::named(algorithm),
            ratio,
        }
    }

    /// Pixel size at `width`; height is `floor(width * ratio)`.
    pub fn dimension(&self, width: u32) -> Result<Dimension, FieldError> {
        // The cast saturates; a saturated height never passes the size check.
        let height = (width as f64 * self.ratio).floor() as u32;
        let dimension = Dimension::new(width, height);
        dimension.byte_len()?;
        Ok(dimension)
    }

    /// File-name friendly form of the algorithm and renderer.
    pub fn slug(&self) -> String {
        let raw = format!("{}-{}", self.algorithm.name, self.renderer);
        raw.chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '-' })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
workers = 3
seed = 7
wait_timeout = "1m 30s"
width = 320

[[panels]]
title = "ramp"
renderer = "renderX"
algorithm = "simple1d"
ratio = 0.2

[[panels]]
title = "clouds"
renderer = "renderXYC"
algorithm = ["fractal2d", 1, 0.1, 8, 1]

[[panels]]
title = "stone"
renderer = "renderXY"
algorithm = "multFractal2d:1,0.1,6,0.9"
ratio = 1
"#;

    #[test]
    fn parses_sample_gallery() {
        let gallery = Gallery::from_toml_str(SAMPLE).expect("parse gallery");
        assert_eq!(gallery.workers, Some(3));
        assert_eq!(gallery.seed, Some(7));
        assert_eq!(gallery.wait_timeout, Some(Duration::from_secs(90)));
        assert_eq!(gallery.width(), 320);
        assert_eq!(gallery.panels.len(), 3);
        assert_eq!(
            gallery.panels[1].algorithm,
            AlgorithmSpec::new("fractal2d", vec![1.0, 0.1, 8.0, 1.0])
        );
        assert_eq!(gallery.panels[1].ratio, 0.6);
        assert_eq!(gallery.panels[2].algorithm.params, vec![1.0, 0.1, 6.0, 0.9]);
    }

    #[test]
    fn numeric_wait_timeout_is_seconds() {
        let gallery = Gallery::from_toml_str(
            r#"
version = 1
wait_timeout = 5

[[panels]]
title = "x"
renderer = "renderX"
algorithm = "simple1d"
"#,
        )
        .unwrap();
        assert_eq!(gallery.wait_timeout, Some(Duration::from_secs(5)));
        assert_eq!(gallery.width(), DEFAULT_WIDTH);
    }

    #[test]
    fn rejects_unknown_renderer() {
        let err = Gallery::from_toml_str(
            r#"
version = 1

[[panels]]
title = "bad"
renderer = "renderXYZ"
algorithm = "simple2d"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("renderXYZ")));
    }

    #[test]
    fn rejects_unknown_algorithm_and_bad_arity() {
        for algorithm in [r#""perlin""#, r#""fractal2d:1,2""#, r#"["simple2d", 4]"#] {
            let config = format!(
                "version = 1\n[[panels]]\ntitle = \"t\"\nrenderer = \"renderXY\"\nalgorithm = {algorithm}\n"
            );
            let err = Gallery::from_toml_str(&config).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{algorithm}");
        }
    }

    #[test]
    fn rejects_structural_problems() {
        assert!(matches!(
            Gallery::from_toml_str("version = 2\n[[panels]]\ntitle = \"t\"\nrenderer = \"renderX\"\nalgorithm = \"simple1d\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Gallery::from_toml_str("version = 1\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Gallery::from_toml_str("version = 1\nworkers = 0\n[[panels]]\ntitle = \"t\"\nrenderer = \"renderX\"\nalgorithm = \"simple1d\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Gallery::from_toml_str("version = 1\n[[panels]]\ntitle = \"t\"\nrenderer = \"renderX\"\nalgorithm = \"simple1d\"\nratio = -1.0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Gallery::from_toml_str("version = \"one\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn builtin_gallery_is_valid() {
        let gallery = Gallery::builtin();
        gallery.validate().unwrap();
        assert_eq!(gallery.panels.len(), 12);
        assert_eq!(gallery.panels[0].dimension(800), Ok(Dimension::new(800, 160)));
        assert_eq!(gallery.panels[5].dimension(800), Ok(Dimension::new(800, 480)));
        assert_eq!(gallery.panels[11].renderer, "renderXYC");
    }

    #[test]
    fn rejects_panels_too_large_to_allocate() {
        let huge_ratio = Gallery::from_toml_str(
            "version = 1\n[[panels]]\ntitle = \"tall\"\nrenderer = \"renderXY\"\nalgorithm = \"simple2d\"\nratio = 1e12\n",
        )
        .unwrap_err();
        assert!(matches!(huge_ratio, ConfigError::Invalid(msg) if msg.contains("pixel limit")));

        let huge_width = Gallery::from_toml_str(
            "version = 1\nwidth = 4294967295\n[[panels]]\ntitle = \"wide\"\nrenderer = \"renderX\"\nalgorithm = \"simple1d\"\n",
        )
        .unwrap_err();
        assert!(matches!(huge_width, ConfigError::Invalid(_)));

        let panel = Panel::new("t", "renderXY", "simple2d", 1e30);
        assert!(matches!(
            panel.dimension(2),
            Err(FieldError::TooLarge { width: 2, height: u32::MAX, .. })
        ));
        assert_eq!(panel.dimension(0), Ok(Dimension::new(0, 0)));
    }

    #[test]
    fn slug_is_file_safe() {
        let panel = Panel::new("t", "renderXYC", "multFractal2d", 0.6);
        assert_eq!(panel.slug(), "multfractal2d-renderxyc");
    }
}
