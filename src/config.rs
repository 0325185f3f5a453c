use crate::error::{Error, Result};

/// Sentinel written before every document in a padded corpus.
pub const DEFAULT_PAD_SYMBOL: char = '\x0c';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Ascii,
}

/// What to do with bytes that are invalid for the declared encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    Strict,
    Replace,
    #[default]
    Ignore,
}

/// What the windower does with characters outside the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownSymbolPolicy {
    Fail,
    /// Strip them from the text before windowing, so contexts and targets
    /// stay aligned.
    #[default]
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Build the whole padded corpus once per pass and slice it.
    #[default]
    WholeCorpus,
    /// Build one file's examples at a time.
    PerFile,
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// File extension without the leading dot. Default: `py`.
    pub extension: String,
    pub encoding: TextEncoding,
    pub decode_policy: DecodePolicy,
    /// Worker threads for parallel reads. None means one per core.
    pub workers: Option<usize>,
    /// Skip files that fail to decode instead of aborting the load.
    pub skip_undecodable: bool,
    /// Share of discovered files to keep, in (0, 1].
    pub fraction: f64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extension: "py".to_string(),
            encoding: TextEncoding::Utf8,
            decode_policy: DecodePolicy::Ignore,
            workers: None,
            skip_undecodable: true,
            fraction: 1.0,
        }
    }
}

impl LoaderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    #[must_use]
    pub const fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub const fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    #[must_use]
    pub const fn with_skip_undecodable(mut self, skip: bool) -> Self {
        self.skip_undecodable = skip;
        self
    }

    #[must_use]
    pub const fn with_fraction(mut self, fraction: f64) -> Self {
        self.fraction = fraction;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() {
            return Err(Error::Configuration(
                "file extension must not be empty".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(Error::Configuration(
                "workers must be positive".to_string(),
            ));
        }
        if !(self.fraction > 0.0 && self.fraction <= 1.0) {
            return Err(Error::Configuration(format!(
                "fraction must be in (0, 1], got {}",
                self.fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Width of the context window. Default: 100.
    pub sequence_length: usize,
    /// Distance between consecutive window starts. Default: 1.
    pub step_size: usize,
    pub pad_symbol: char,
    /// Emit windows whose target is the pad symbol.
    pub train_on_pad: bool,
    pub unknown_symbols: UnknownSymbolPolicy,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sequence_length: 100,
            step_size: 1,
            pad_symbol: DEFAULT_PAD_SYMBOL,
            train_on_pad: false,
            unknown_symbols: UnknownSymbolPolicy::Skip,
        }
    }
}

impl WindowConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_sequence_length(mut self, len: usize) -> Self {
        self.sequence_length = len;
        self
    }

    #[must_use]
    pub const fn with_step_size(mut self, step: usize) -> Self {
        self.step_size = step;
        self
    }

    #[must_use]
    pub const fn with_pad_symbol(mut self, pad: char) -> Self {
        self.pad_symbol = pad;
        self
    }

    #[must_use]
    pub const fn with_train_on_pad(mut self, train_on_pad: bool) -> Self {
        self.train_on_pad = train_on_pad;
        self
    }

    #[must_use]
    pub const fn with_unknown_symbols(mut self, policy: UnknownSymbolPolicy) -> Self {
        self.unknown_symbols = policy;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sequence_length == 0 {
            return Err(Error::Configuration(
                "sequence_length must be positive".to_string(),
            ));
        }
        if self.step_size == 0 {
            return Err(Error::Configuration(
                "step_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Examples per batch. Default: 512.
    pub batch_size: usize,
    pub mode: BatchMode,
    /// Reshuffle the file list at the start of every pass.
    pub shuffle: bool,
    /// Seed for file-order shuffling. None draws from entropy.
    pub seed: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            mode: BatchMode::WholeCorpus,
            shuffle: true,
            seed: None,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    #[must_use]
    pub const fn with_mode(mut self, mode: BatchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub const fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(LoaderConfig::default().validate().is_ok());
        assert!(WindowConfig::default().validate().is_ok());
        assert!(BatchConfig::default().validate().is_ok());
        assert_eq!(WindowConfig::default().pad_symbol, '\x0c');
        assert_eq!(LoaderConfig::default().decode_policy, DecodePolicy::Ignore);
    }

    #[test]
    fn test_extension_dot_is_stripped() {
        let config = LoaderConfig::new().with_extension(".rs");
        assert_eq!(config.extension, "rs");
    }

    #[test]
    fn test_rejects_zero_step() {
        let err = WindowConfig::new().with_step_size(0).validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("step_size"));
    }

    #[test]
    fn test_rejects_zero_sequence_length() {
        assert!(WindowConfig::new()
            .with_sequence_length(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let err = BatchConfig::new().with_batch_size(0).validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rejects_bad_fraction_and_workers() {
        assert!(LoaderConfig::new().with_fraction(0.0).validate().is_err());
        assert!(LoaderConfig::new().with_fraction(1.5).validate().is_err());
        assert!(LoaderConfig::new().with_workers(0).validate().is_err());
        assert!(LoaderConfig::new().with_fraction(0.5).validate().is_ok());
    }
}
