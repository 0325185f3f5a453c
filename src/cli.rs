use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use char_codegen::{
    save_examples, BatchConfig, BatchGenerator, BatchMode, BigramModel, CorpusLoader,
    DecodePolicy, Generator, LoaderConfig, Sampler, TextEncoding, Vocabulary, WindowConfig,
    Windower,
};

#[derive(Parser, Debug)]
#[command(
    name = "char-codegen",
    version,
    about = "Turn a tree of source files into one-hot training data, and sample text."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode a corpus into <outfile>_X.npy and <outfile>_y.npy
    Vectorize(VectorizeArgs),

    /// Pull batches from the batch generator and report their shapes
    Batches(BatchesArgs),

    /// Extend a seed string using bigram counts from the corpus
    Generate(GenerateArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum EncodingArg {
    Utf8,
    Ascii,
}

impl From<EncodingArg> for TextEncoding {
    fn from(a: EncodingArg) -> Self {
        match a {
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Ascii => TextEncoding::Ascii,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DecodeErrorsArg {
    Strict,
    Replace,
    Ignore,
}

impl From<DecodeErrorsArg> for DecodePolicy {
    fn from(a: DecodeErrorsArg) -> Self {
        match a {
            DecodeErrorsArg::Strict => DecodePolicy::Strict,
            DecodeErrorsArg::Replace => DecodePolicy::Replace,
            DecodeErrorsArg::Ignore => DecodePolicy::Ignore,
        }
    }
}

#[derive(Args, Debug)]
pub struct CorpusArgs {
    /// Root directory of the source files
    pub source: PathBuf,

    /// Extension of the files to use
    #[arg(long, default_value = "py")]
    pub extension: String,

    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    pub encoding: EncodingArg,

    #[arg(long, value_enum, default_value_t = DecodeErrorsArg::Ignore)]
    pub decode_errors: DecodeErrorsArg,

    /// Abort on a file that fails strict decoding instead of skipping it
    #[arg(long)]
    pub fail_on_decode_error: bool,

    /// Threads for reading files (default: one per core)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Share of the discovered files to use
    #[arg(long, default_value_t = 1.0)]
    pub fraction: f64,
}

impl From<&CorpusArgs> for LoaderConfig {
    fn from(a: &CorpusArgs) -> Self {
        let config = LoaderConfig::new()
            .with_extension(a.extension.clone())
            .with_encoding(a.encoding.into())
            .with_decode_policy(a.decode_errors.into())
            .with_skip_undecodable(!a.fail_on_decode_error)
            .with_fraction(a.fraction);
        match a.workers {
            Some(workers) => config.with_workers(workers),
            None => config,
        }
    }
}

#[derive(Args, Debug)]
pub struct WindowArgs {
    #[arg(long, default_value_t = 100)]
    pub sequence_length: usize,

    #[arg(long, default_value_t = 1)]
    pub step_size: usize,

    /// Also emit windows whose target is the file separator
    #[arg(long)]
    pub train_on_pad: bool,
}

impl From<&WindowArgs> for WindowConfig {
    fn from(a: &WindowArgs) -> Self {
        WindowConfig::new()
            .with_sequence_length(a.sequence_length)
            .with_step_size(a.step_size)
            .with_train_on_pad(a.train_on_pad)
    }
}

#[derive(Args, Debug)]
pub struct VectorizeArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Output prefix; the parent directory must exist
    #[arg(long)]
    pub outfile: PathBuf,
}

#[derive(Args, Debug)]
pub struct BatchesArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub window: WindowArgs,

    #[arg(long, default_value_t = 512)]
    pub batch_size: usize,

    /// Number of batches to pull
    #[arg(long, default_value_t = 10)]
    pub count: usize,

    /// Stream one file at a time instead of building the whole corpus
    #[arg(long)]
    pub per_file: bool,

    /// Keep discovery order instead of reshuffling every pass
    #[arg(long)]
    pub no_shuffle: bool,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl From<&BatchesArgs> for BatchConfig {
    fn from(a: &BatchesArgs) -> Self {
        let mode = if a.per_file {
            BatchMode::PerFile
        } else {
            BatchMode::WholeCorpus
        };
        let config = BatchConfig::new()
            .with_batch_size(a.batch_size)
            .with_mode(mode)
            .with_shuffle(!a.no_shuffle);
        match a.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub window: WindowArgs,

    /// Text to continue
    #[arg(long, default_value = "import ")]
    pub prompt: String,

    /// Number of symbols to generate
    #[arg(long, default_value_t = 400)]
    pub length: usize,

    /// Sampling temperatures; one sample is printed per value
    #[arg(long, num_args = 1.., default_values_t = [0.2, 0.5, 1.0, 1.2])]
    pub temperature: Vec<f64>,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Vectorize(args) => run_vectorize(args),
            Commands::Batches(args) => run_batches(args),
            Commands::Generate(args) => run_generate(args),
        }
    }
}

fn prepare(corpus: &CorpusArgs, window: &WindowArgs) -> Result<(CorpusLoader, Windower)> {
    let loader = CorpusLoader::new(corpus.into()).context("Invalid corpus options")?;
    let windower =
        Windower::new(Vocabulary::printable(), window.into()).context("Invalid window options")?;
    Ok((loader, windower))
}

fn run_vectorize(args: VectorizeArgs) -> Result<()> {
    let (loader, windower) = prepare(&args.corpus, &args.window)?;
    let files = loader
        .discover(&args.corpus.source)
        .with_context(|| format!("Cannot scan '{}'", args.corpus.source.display()))?;

    let corpus = loader.concatenate(files.paths(), windower.padding())?;
    let examples = windower.build(&corpus)?;
    let (x_path, y_path) = save_examples(&examples, &args.outfile)?;

    println!(
        "{} files, {} symbols, {} examples",
        files.len(),
        corpus.len(),
        examples.len()
    );
    println!("X {:?} -> {}", examples.x.shape(), x_path.display());
    println!("y {:?} -> {}", examples.y.shape(), y_path.display());
    Ok(())
}

fn run_batches(args: BatchesArgs) -> Result<()> {
    let (loader, windower) = prepare(&args.corpus, &args.window)?;
    let files = loader
        .discover(&args.corpus.source)
        .with_context(|| format!("Cannot scan '{}'", args.corpus.source.display()))?;

    let mut batches = BatchGenerator::new(loader, windower, files, (&args).into())?;
    for batch in batches.by_ref().take(args.count) {
        let batch = batch?;
        println!("X {:?} y {:?}", batch.x.shape(), batch.y.shape());
    }

    let state = batches.state();
    println!(
        "pass {}, {} batches in pass, {} total",
        state.pass, state.batches_in_pass, state.batches_total
    );
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<()> {
    let (loader, windower) = prepare(&args.corpus, &args.window)?;
    let files = loader
        .discover(&args.corpus.source)
        .with_context(|| format!("Cannot scan '{}'", args.corpus.source.display()))?;

    let corpus = loader.concatenate(files.paths(), windower.padding())?;
    let model = BigramModel::fit(&windower.build(&corpus)?);

    for &temperature in &args.temperature {
        let sampler = match args.seed {
            Some(seed) => Sampler::seeded(temperature, seed),
            None => Sampler::from_entropy(temperature),
        }?;
        let mut generator = Generator::new(model.clone(), &windower, sampler)?;
        let text = generator.extend(&args.prompt, args.length)?;

        println!("----- temperature: {temperature}");
        println!("{text}");
    }
    Ok(())
}
