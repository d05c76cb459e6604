//! Configuration types for metric extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. File locations hang off a single
//! [`DataLayout`] root so a whole run can be pointed at another directory
//! with one setting.

use crate::error::ExtractError;
use crate::output::StageKind;
use crate::progress::ProgressCallback;
use crate::service::GenerationService;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default REST endpoint of the generation service.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Sampling parameters sent with every generation request.
///
/// The defaults make the model as deterministic as the API allows:
/// greedy decoding with a single candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Default: 0.0.
    pub temperature: f32,
    /// Default: 0.0.
    pub top_p: f32,
    /// Default: 1.
    pub top_k: u32,
    /// Default: 1.
    pub candidate_count: u32,
    /// Default: 8192.
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_p: 0.0,
            top_k: 1,
            candidate_count: 1,
            max_output_tokens: 8192,
        }
    }
}

/// Where inputs are read from and outputs written to.
///
/// Every path is derived from `root` (default `./data`):
///
/// ```text
/// data/
/// ├── test_doc.pdf                  single-document input
/// ├── pdfs/*.pdf                    batch input
/// ├── templates/                    system instructions per stage
/// ├── output/out_step_{1,2,3}.txt   three-stage outputs
/// ├── output_all_in_one/out_step.txt
/// └── generated_all_in_one/*.jsonl  flattened batch results
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLayout {
    pub root: PathBuf,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new("./data")
    }
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn test_document(&self) -> PathBuf {
        self.root.join("test_doc.pdf")
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join("pdfs")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn template(&self, stage: StageKind) -> PathBuf {
        self.templates_dir().join(stage.template_file())
    }

    pub fn chain_output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn single_shot_output_dir(&self) -> PathBuf {
        self.root.join("output_all_in_one")
    }

    /// Persisted output of `stage`.
    pub fn stage_output(&self, stage: StageKind) -> PathBuf {
        let dir = match stage {
            StageKind::SingleShot => self.single_shot_output_dir(),
            _ => self.chain_output_dir(),
        };
        dir.join(stage.output_file())
    }

    pub fn generated_dir(&self) -> PathBuf {
        self.root.join("generated_all_in_one")
    }

    /// JSONL path for a source PDF: same stem, `.jsonl` extension.
    pub fn generated_jsonl(&self, pdf: &Path) -> PathBuf {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.generated_dir().join(format!("{stem}.jsonl"))
    }

    pub fn ingredients(&self) -> PathBuf {
        self.chain_output_dir().join("ingredients.txt")
    }
}

/// Configuration for an extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use energy_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .data_dir("./reports")
///     .model("gemini-1.5-pro")
///     .build()
///     .unwrap();
/// assert_eq!(config.generation.max_output_tokens, 8192);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Input/output file locations.
    pub layout: DataLayout,

    /// Model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// API key for the generation service. If None, read from the
    /// environment when the service is built.
    pub api_key: Option<String>,

    /// Service endpoint. If None, uses [`DEFAULT_BASE_URL`].
    pub base_url: Option<String>,

    /// Pre-constructed generation service. Takes precedence over the
    /// model/key/endpoint settings.
    pub service: Option<Arc<dyn GenerationService>>,

    /// Sampling parameters.
    pub generation: GenerationSettings,

    /// Per-request timeout in seconds. Default: None (wait indefinitely).
    pub api_timeout_secs: Option<u64>,

    /// Reject stage 2/3 output whose metric count or code order differs from
    /// the stage input. Default: true.
    pub verify_alignment: bool,

    /// Receives per-document and per-stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            layout: DataLayout::default(),
            model: None,
            api_key: None,
            base_url: None,
            service: None,
            generation: GenerationSettings::default(),
            api_timeout_secs: None,
            verify_alignment: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("layout", &self.layout)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("service", &self.service.as_ref().map(|s| s.name().to_string()))
            .field("generation", &self.generation)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("verify_alignment", &self.verify_alignment)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model that will be requested.
    pub fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn data_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.layout = DataLayout::new(root);
        self
    }

    pub fn layout(mut self, layout: DataLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn GenerationService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn generation(mut self, settings: GenerationSettings) -> Self {
        self.config.generation = settings;
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.generation.max_output_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn verify_alignment(mut self, v: bool) -> Self {
        self.config.verify_alignment = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        let g = &c.generation;
        if !(0.0..=2.0).contains(&g.temperature) {
            return Err(ExtractError::InvalidConfig(format!(
                "temperature must be 0.0–2.0, got {}",
                g.temperature
            )));
        }
        if !(0.0..=1.0).contains(&g.top_p) {
            return Err(ExtractError::InvalidConfig(format!(
                "top_p must be 0.0–1.0, got {}",
                g.top_p
            )));
        }
        if g.top_k == 0 || g.candidate_count == 0 {
            return Err(ExtractError::InvalidConfig(
                "top_k and candidate_count must be ≥ 1".into(),
            ));
        }
        if g.max_output_tokens == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_output_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(ExtractError::InvalidConfig(
                "api timeout must be ≥ 1 second".into(),
            ));
        }
        if c.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ExtractError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_generation_settings_are_deterministic() {
        let g = GenerationSettings::default();
        assert_eq!(g.temperature, 0.0);
        assert_eq!(g.top_p, 0.0);
        assert_eq!(g.top_k, 1);
        assert_eq!(g.candidate_count, 1);
        assert_eq!(g.max_output_tokens, 8192);
    }

    #[test]
    fn layout_paths() {
        let l = DataLayout::new("/srv/data");
        assert_eq!(l.test_document(), PathBuf::from("/srv/data/test_doc.pdf"));
        assert_eq!(
            l.template(StageKind::Extract),
            PathBuf::from("/srv/data/templates/system_instructions_step_2.txt")
        );
        assert_eq!(
            l.stage_output(StageKind::Classify),
            PathBuf::from("/srv/data/output/out_step_3.txt")
        );
        assert_eq!(
            l.stage_output(StageKind::SingleShot),
            PathBuf::from("/srv/data/output_all_in_one/out_step.txt")
        );
        assert_eq!(
            l.generated_jsonl(Path::new("/in/acme_2023.pdf")),
            PathBuf::from("/srv/data/generated_all_in_one/acme_2023.jsonl")
        );
    }

    #[test]
    fn builder_rejects_zero_tokens() {
        let r = ExtractionConfig::builder().max_output_tokens(0).build();
        assert!(matches!(r, Err(ExtractError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_blank_model() {
        assert!(ExtractionConfig::builder().model("  ").build().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = ExtractionConfig::builder().api_key("secret-key").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn model_name_falls_back_to_default() {
        assert_eq!(ExtractionConfig::default().model_name(), DEFAULT_MODEL);
    }
}
