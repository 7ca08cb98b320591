//! Configuration for the image digest pipeline.
//!
//! All digest behaviour is controlled through [`DigestConfig`], built via its
//! [`DigestConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across tasks and to log exactly what a run was given.
//!
//! # Design choice: builder over constructor
//! A positional constructor breaks on every new field. The builder lets
//! callers set only what they care about and rely on documented defaults for
//! the rest.

use std::fmt;
use std::sync::Arc;

use crate::captioner::ImageCaptioner;
use crate::error::Feishu2MdError;

/// Fallback worker count when `DIGEST_CONCURRENCY` is unset or invalid.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Configuration for a digest run.
///
/// Built via [`DigestConfig::builder()`] or using
/// [`DigestConfig::default()`].
///
/// # Example
/// ```rust
/// use feishu2md::DigestConfig;
///
/// let config = DigestConfig::builder()
///     .concurrency(8)
///     .fallback_on_error(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DigestConfig {
    /// Pre-constructed captioning backend. Default: None.
    ///
    /// When None, the backend is resolved at digest time: if `OPENAI_API_KEY`
    /// is set, the OpenAI captioner is used (honouring `OPENAI_BASE_URL` and
    /// `OPENAI_MODEL`); otherwise the deterministic offline mock, which needs
    /// no network and no credentials.
    pub captioner: Option<Arc<dyn ImageCaptioner>>,

    /// Model identifier for an auto-resolved OpenAI captioner, e.g.
    /// "gpt-5.2". If None, `OPENAI_MODEL` or the built-in default applies.
    /// Ignored when [`DigestConfig::captioner`] is set.
    pub model: Option<String>,

    /// Number of concurrent caption workers. Default: 3, or
    /// `DIGEST_CONCURRENCY` when that is set to a positive integer.
    ///
    /// Caption calls are network-bound. The pipeline additionally caps the
    /// worker count at the number of caption tasks, so oversizing this for a
    /// small document wastes nothing.
    pub concurrency: usize,

    /// Substitute a deterministic fallback caption when a caption task
    /// fails. Default: true.
    ///
    /// When false, the first failed task aborts the run: workers stop
    /// claiming new tasks, the error is returned, and no output is written.
    pub fallback_on_error: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            captioner: None,
            model: None,
            concurrency: env_concurrency(),
            fallback_on_error: true,
        }
    }
}

impl fmt::Debug for DigestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestConfig")
            .field(
                "captioner",
                &self.captioner.as_ref().map(|_| "<dyn ImageCaptioner>"),
            )
            .field("model", &self.model)
            .field("concurrency", &self.concurrency)
            .field("fallback_on_error", &self.fallback_on_error)
            .finish()
    }
}

impl DigestConfig {
    /// Create a new builder for `DigestConfig`.
    pub fn builder() -> DigestConfigBuilder {
        DigestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`DigestConfig`].
#[derive(Debug)]
pub struct DigestConfigBuilder {
    config: DigestConfig,
}

impl DigestConfigBuilder {
    pub fn captioner(mut self, captioner: Arc<dyn ImageCaptioner>) -> Self {
        self.config.captioner = Some(captioner);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn fallback_on_error(mut self, v: bool) -> Self {
        self.config.fallback_on_error = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DigestConfig, Feishu2MdError> {
        if self.config.concurrency == 0 {
            return Err(Feishu2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

fn env_concurrency() -> usize {
    concurrency_from(std::env::var("DIGEST_CONCURRENCY").ok())
}

fn concurrency_from(raw: Option<String>) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .unwrap_or(DEFAULT_CONCURRENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captioner::MockCaptioner;

    #[test]
    fn builder_clamps_concurrency_to_one() {
        let config = DigestConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(config.concurrency, 1);
    }

    #[test]
    fn build_rejects_zero_concurrency_set_directly() {
        let mut builder = DigestConfig::builder();
        builder.config.concurrency = 0;
        assert!(builder.build().is_err());
    }

    #[test]
    fn defaults_enable_fallback() {
        let config = DigestConfig::builder().build().unwrap();
        assert!(config.fallback_on_error);
        assert!(config.captioner.is_none());
    }

    #[test]
    fn concurrency_env_parsing() {
        assert_eq!(concurrency_from(None), 3);
        assert_eq!(concurrency_from(Some("8".into())), 8);
        assert_eq!(concurrency_from(Some(" 2 ".into())), 2);
        assert_eq!(concurrency_from(Some("0".into())), 3);
        assert_eq!(concurrency_from(Some("-4".into())), 3);
        assert_eq!(concurrency_from(Some("many".into())), 3);
    }

    #[test]
    fn debug_hides_the_captioner() {
        let config = DigestConfig::builder()
            .captioner(Arc::new(MockCaptioner))
            .build()
            .unwrap();
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<dyn ImageCaptioner>"), "got: {rendered}");
    }
}
