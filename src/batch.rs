use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{BatchConfig, BatchMode};
use crate::corpus::{CorpusLoader, FileList};
use crate::error::{Error, Result};
use crate::windower::{Examples, Windower};

/// Progress counters. `pass` is 1-based once the first pass has started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorState {
    pub pass: usize,
    pub batches_in_pass: usize,
    pub batches_total: usize,
}

// One walk over a snapshot of the file list.
#[derive(Debug)]
struct Pass {
    order: Vec<PathBuf>,
    next_file: usize,
    current: Option<Examples>,
    offset: usize,
}

impl Pass {
    // A trailing slice shorter than `batch_size` is never returned.
    fn take_batch(&mut self, batch_size: usize) -> Option<Examples> {
        let current = self.current.as_ref()?;
        if current.len() - self.offset < batch_size {
            return None;
        }
        let batch = current.slice(self.offset..self.offset + batch_size);
        self.offset += batch_size;
        Some(batch)
    }
}

/// Unbounded, pull-based source of fixed-shape training batches.
///
/// Each pass works on a snapshot of the file list taken when the pass starts,
/// so [`BatchGenerator::shuffle`] only affects the next pass.
#[derive(Debug)]
pub struct BatchGenerator {
    loader: CorpusLoader,
    windower: Windower,
    files: FileList,
    config: BatchConfig,
    rng: StdRng,
    pass: Option<Pass>,
    steps_per_pass: Option<usize>,
    state: GeneratorState,
}

impl BatchGenerator {
    pub fn new(
        loader: CorpusLoader,
        windower: Windower,
        files: FileList,
        config: BatchConfig,
    ) -> Result<Self> {
        config.validate()?;
        if files.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            loader,
            windower,
            files,
            config,
            rng,
            pass: None,
            steps_per_pass: None,
            state: GeneratorState::default(),
        })
    }

    pub fn files(&self) -> &FileList {
        &self.files
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Batches in one whole-corpus pass, known once the pass has been built.
    pub fn steps_per_pass(&self) -> Option<usize> {
        self.steps_per_pass
    }

    /// Reorders the file list uniformly at random. Takes effect at the next pass.
    pub fn shuffle(&mut self) {
        self.files.shuffle(&mut self.rng);
    }

    /// Abandons the in-flight pass; the next batch starts a fresh one.
    pub fn reset(&mut self) {
        self.pass = None;
        self.state.batches_in_pass = 0;
    }

    pub fn next_batch(&mut self) -> Result<Examples> {
        if self.files.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let mut pass = match self.pass.take() {
            Some(pass) => pass,
            None => self.begin_pass()?,
        };
        loop {
            if let Some(batch) = pass.take_batch(self.config.batch_size) {
                self.state.batches_in_pass += 1;
                self.state.batches_total += 1;
                tracing::debug!(
                    "Batch {} of pass {}",
                    self.state.batches_in_pass,
                    self.state.pass
                );
                self.pass = Some(pass);
                return Ok(batch);
            }

            if let Some(path) = pass.order.get(pass.next_file).cloned() {
                pass.next_file += 1;
                pass.offset = 0;
                match self.file_examples(&path) {
                    Ok(examples) => pass.current = examples,
                    Err(e) => {
                        // resume after the failing file on the next call
                        pass.current = None;
                        self.pass = Some(pass);
                        return Err(e);
                    }
                }
                continue;
            }

            if self.state.batches_in_pass == 0 {
                return Err(Error::EmptyCorpus);
            }
            tracing::info!(
                "Pass {} complete after {} batches",
                self.state.pass,
                self.state.batches_in_pass
            );
            pass = self.begin_pass()?;
        }
    }

    fn begin_pass(&mut self) -> Result<Pass> {
        if self.config.shuffle {
            self.shuffle();
        }
        self.state.pass += 1;
        self.state.batches_in_pass = 0;

        let order = self.files.paths().to_vec();
        tracing::info!(
            "Starting pass {} over {} files",
            self.state.pass,
            order.len()
        );

        match self.config.mode {
            BatchMode::WholeCorpus => {
                let corpus = self.loader.concatenate(&order, self.windower.padding())?;
                let examples = self.windower.build(&corpus)?;
                self.steps_per_pass = Some(examples.len() / self.config.batch_size);
                tracing::info!(
                    "Built {} examples ({} batches)",
                    examples.len(),
                    examples.len() / self.config.batch_size
                );
                Ok(Pass {
                    next_file: order.len(),
                    order,
                    current: Some(examples),
                    offset: 0,
                })
            }
            BatchMode::PerFile => Ok(Pass {
                order,
                next_file: 0,
                current: None,
                offset: 0,
            }),
        }
    }

    fn file_examples(&self, path: &Path) -> Result<Option<Examples>> {
        let Some(doc) = self.loader.read_or_skip(path)? else {
            return Ok(None);
        };
        let examples = self.windower.build_document(&doc)?;
        tracing::debug!("{}: {} examples", path.display(), examples.len());
        Ok(Some(examples))
    }
}

impl Iterator for BatchGenerator {
    type Item = Result<Examples>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoaderConfig, WindowConfig};
    use crate::vocab::Vocabulary;
    use std::fs;

    fn write_corpus(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, text).unwrap();
        }
        dir
    }

    fn generator(dir: &Path, seq_len: usize, config: BatchConfig) -> Result<BatchGenerator> {
        let loader = CorpusLoader::new(LoaderConfig::default())?;
        let files = loader.discover(dir)?;
        let windower = Windower::new(
            Vocabulary::printable(),
            WindowConfig::new().with_sequence_length(seq_len),
        )?;
        BatchGenerator::new(loader, windower, files, config)
    }

    #[test]
    fn test_empty_file_list() {
        let dir = write_corpus(&[("notes.txt", "not python")]);
        let result = generator(dir.path(), 2, BatchConfig::new());
        assert!(matches!(result, Err(Error::EmptyCorpus)));
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let dir = write_corpus(&[("a.py", "abc")]);
        let result = generator(dir.path(), 2, BatchConfig::new().with_batch_size(0));
        assert!(result.unwrap_err().is_configuration());
    }

    #[test]
    fn test_whole_corpus_batches_have_fixed_shape_and_wrap() {
        // 10 + 7 examples at S = 3
        let dir = write_corpus(&[("a.py", "0123456789"), ("pkg/b.py", "abcdefg")]);
        let config = BatchConfig::new()
            .with_batch_size(4)
            .with_shuffle(false)
            .with_seed(1);
        let mut batches = generator(dir.path(), 3, config).unwrap();

        for _ in 0..4 {
            let batch = batches.next().unwrap().unwrap();
            assert_eq!(batch.x.shape(), [4, 3, 100]);
            assert_eq!(batch.y.shape(), [4, 100]);
        }
        assert_eq!(batches.steps_per_pass(), Some(4));
        assert_eq!(batches.state().pass, 1);

        // 17 examples: the short fifth slice is dropped and a new pass begins
        let batch = batches.next().unwrap().unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batches.state().pass, 2);
        assert_eq!(batches.state().batches_in_pass, 1);
        assert_eq!(batches.state().batches_total, 5);
    }

    #[test]
    fn test_whole_corpus_order_is_stable_without_shuffle() {
        let dir = write_corpus(&[("a.py", "0123456789"), ("b.py", "abcdefg")]);
        let config = BatchConfig::new().with_batch_size(2).with_shuffle(false);
        let mut first = generator(dir.path(), 2, config.clone()).unwrap();
        let mut second = generator(dir.path(), 2, config).unwrap();
        for _ in 0..12 {
            assert_eq!(first.next().unwrap().unwrap(), second.next().unwrap().unwrap());
        }
    }

    #[test]
    fn test_whole_corpus_reshuffles_each_pass() {
        // S = 1: every file yields exactly one batch of its own symbol
        let names = ["a", "b", "c", "d", "e", "f"];
        let files: Vec<(String, String)> = names
            .iter()
            .map(|n| (format!("{n}.py"), n.repeat(4)))
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
        let dir = write_corpus(&refs);

        let config = BatchConfig::new().with_batch_size(4).with_seed(9);
        let mut batches = generator(dir.path(), 1, config).unwrap();
        let vocab = Vocabulary::printable();

        let mut pass_order = || -> String {
            (0..names.len())
                .map(|_| {
                    let batch = batches.next().unwrap().unwrap();
                    vocab.decode_one_hot(batch.y.row(0)).unwrap()
                })
                .collect()
        };
        let first = pass_order();
        let second = pass_order();

        let sorted = |s: &str| {
            let mut c: Vec<char> = s.chars().collect();
            c.sort();
            c.into_iter().collect::<String>()
        };
        assert_eq!(sorted(&first), "abcdef");
        assert_eq!(sorted(&second), "abcdef");
        assert_ne!(first, second);

        assert_eq!(batches.state().pass, 2);
        assert_eq!(batches.steps_per_pass(), Some(names.len()));
    }

    #[test]
    fn test_per_file_drops_short_remainder() {
        // S = 2: "abcde" gives 5 examples, "xy" gives 2
        let dir = write_corpus(&[("a.py", "abcde"), ("b.py", "xy")]);
        let config = BatchConfig::new()
            .with_batch_size(2)
            .with_mode(BatchMode::PerFile)
            .with_shuffle(false);
        let mut batches = generator(dir.path(), 2, config).unwrap();
        let vocab = Vocabulary::printable();

        let targets = |batch: &Examples| -> String {
            (0..batch.len())
                .map(|i| vocab.decode_one_hot(batch.y.row(i)).unwrap())
                .collect()
        };

        assert_eq!(targets(&batches.next().unwrap().unwrap()), "ab");
        assert_eq!(targets(&batches.next().unwrap().unwrap()), "cd");
        // 'e' is dropped rather than merged with the next file
        assert_eq!(targets(&batches.next().unwrap().unwrap()), "xy");
        assert_eq!(batches.state().pass, 1);
        assert_eq!(targets(&batches.next().unwrap().unwrap()), "ab");
        assert_eq!(batches.state().pass, 2);
        assert_eq!(batches.steps_per_pass(), None);
    }

    #[test]
    fn test_pass_without_batches_is_empty_corpus() {
        let dir = write_corpus(&[("a.py", "ab")]);
        let config = BatchConfig::new().with_batch_size(16);
        let mut batches = generator(dir.path(), 2, config.clone()).unwrap();
        assert!(matches!(batches.next(), Some(Err(Error::EmptyCorpus))));

        let mut streaming = generator(dir.path(), 2, config.with_mode(BatchMode::PerFile)).unwrap();
        assert!(matches!(streaming.next(), Some(Err(Error::EmptyCorpus))));
    }

    #[test]
    fn test_shuffle_keeps_in_flight_pass() {
        let dir = write_corpus(&[
            ("a.py", "aaaa"),
            ("b.py", "bbbb"),
            ("c.py", "cccc"),
            ("d.py", "dddd"),
        ]);
        let config = BatchConfig::new()
            .with_batch_size(4)
            .with_mode(BatchMode::PerFile)
            .with_shuffle(false)
            .with_seed(3);
        let mut batches = generator(dir.path(), 1, config).unwrap();
        let vocab = Vocabulary::printable();
        let first_symbol =
            |batch: &Examples| vocab.decode_one_hot(batch.y.row(0)).unwrap();

        assert_eq!(first_symbol(&batches.next().unwrap().unwrap()), 'a');
        let before: Vec<PathBuf> = batches.files().paths().to_vec();
        batches.shuffle();
        assert_ne!(batches.files().paths(), before.as_slice());

        // the running pass still follows its original order
        assert_eq!(first_symbol(&batches.next().unwrap().unwrap()), 'b');
        assert_eq!(first_symbol(&batches.next().unwrap().unwrap()), 'c');
        assert_eq!(first_symbol(&batches.next().unwrap().unwrap()), 'd');
    }

    #[test]
    fn test_reset_restarts_pass() {
        let dir = write_corpus(&[("a.py", "abcdef")]);
        let config = BatchConfig::new()
            .with_batch_size(2)
            .with_shuffle(false);
        let mut batches = generator(dir.path(), 1, config).unwrap();
        let first = batches.next().unwrap().unwrap();
        batches.next().unwrap().unwrap();
        batches.reset();
        assert_eq!(batches.next().unwrap().unwrap(), first);
        assert_eq!(batches.state().pass, 2);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let files: Vec<(String, String)> = (0..8)
            .map(|i| (format!("f{i}.py"), format!("{i}{i}{i}{i}{i}")))
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
        let dir = write_corpus(&refs);
        let config = BatchConfig::new()
            .with_batch_size(5)
            .with_mode(BatchMode::PerFile)
            .with_seed(99);

        let mut first = generator(dir.path(), 1, config.clone()).unwrap();
        let mut second = generator(dir.path(), 1, config).unwrap();
        for _ in 0..20 {
            assert_eq!(first.next().unwrap().unwrap(), second.next().unwrap().unwrap());
        }
    }
}
