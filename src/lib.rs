//! Character-level dataset builder and text sampler for source-code models.
//!
//! Source files are discovered and decoded by [`CorpusLoader`], joined behind
//! sentinel runs, cut into one-hot (context, next symbol) pairs by
//! [`Windower`] and served in fixed-size batches by [`BatchGenerator`].
//! At inference, [`Generator`] feeds the trailing window to a
//! [`NextSymbolModel`] and draws the next symbol with a [`Sampler`].

pub mod batch;
pub mod config;
pub mod corpus;
pub mod error;
pub mod maths;
pub mod model;
pub mod sampler;
pub mod utils;
pub mod vocab;
pub mod windower;

pub use batch::{BatchGenerator, GeneratorState};
pub use config::{
    BatchConfig, BatchMode, DecodePolicy, LoaderConfig, TextEncoding, UnknownSymbolPolicy,
    WindowConfig,
};
pub use corpus::{CorpusLoader, Document, FileList, PaddedCorpus, Padding};
pub use error::{Error, Result};
pub use model::{BigramModel, NextSymbolModel, UniformModel};
pub use sampler::{Generation, GenerationState, Generator, Sampler};
pub use utils::{load_examples, save_examples};
pub use vocab::Vocabulary;
pub use windower::{Examples, Features, Targets, Windower};
