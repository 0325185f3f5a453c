use std::ops::Range;

use crate::config::{UnknownSymbolPolicy, WindowConfig};
use crate::corpus::{Document, PaddedCorpus, Padding};
use crate::error::{Error, Result};
use crate::maths::one_hot_fill;
use crate::vocab::Vocabulary;

/// One-hot context windows, shape (rows, sequence_length, vocab_size).
/// Entries are 0 or 1, one byte each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    rows: usize,
    sequence_length: usize,
    vocab_size: usize,
    data: Vec<u8>,
}

impl Features {
    /// `indices` holds `sequence_length` symbol indices per row, row-major.
    pub fn from_indices(indices: &[usize], sequence_length: usize, vocab_size: usize) -> Self {
        let rows = indices.len() / sequence_length;
        let mut data = vec![0u8; rows * sequence_length * vocab_size];
        one_hot_fill(&mut data, &indices[..rows * sequence_length], vocab_size);
        Self {
            rows,
            sequence_length,
            vocab_size,
            data,
        }
    }

    pub fn from_raw(shape: [usize; 3], data: Vec<u8>) -> Result<Self> {
        let [rows, sequence_length, vocab_size] = shape;
        if data.len() != rows * sequence_length * vocab_size {
            return Err(Error::ArrayFormat(format!(
                "{} bytes do not fill shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Self {
            rows,
            sequence_length,
            vocab_size,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.rows, self.sequence_length, self.vocab_size]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Window `i` as `sequence_length` consecutive one-hot rows.
    pub fn window(&self, i: usize) -> &[u8] {
        let stride = self.sequence_length * self.vocab_size;
        &self.data[i * stride..(i + 1) * stride]
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        let stride = self.sequence_length * self.vocab_size;
        Self {
            rows: range.len(),
            sequence_length: self.sequence_length,
            vocab_size: self.vocab_size,
            data: self.data[range.start * stride..range.end * stride].to_vec(),
        }
    }
}

/// One-hot next-symbol targets, shape (rows, vocab_size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    rows: usize,
    vocab_size: usize,
    data: Vec<u8>,
}

impl Targets {
    pub fn from_indices(indices: &[usize], vocab_size: usize) -> Self {
        let mut data = vec![0u8; indices.len() * vocab_size];
        one_hot_fill(&mut data, indices, vocab_size);
        Self {
            rows: indices.len(),
            vocab_size,
            data,
        }
    }

    pub fn from_raw(shape: [usize; 2], data: Vec<u8>) -> Result<Self> {
        let [rows, vocab_size] = shape;
        if data.len() != rows * vocab_size {
            return Err(Error::ArrayFormat(format!(
                "{} bytes do not fill shape {:?}",
                data.len(),
                shape
            )));
        }
        Ok(Self {
            rows,
            vocab_size,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.vocab_size]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[u8] {
        &self.data[i * self.vocab_size..(i + 1) * self.vocab_size]
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            rows: range.len(),
            vocab_size: self.vocab_size,
            data: self.data[range.start * self.vocab_size..range.end * self.vocab_size].to_vec(),
        }
    }
}

/// Aligned `X` and `y`: row `i` of `y` is the symbol following window `i` of `x`.
/// A batch is the same type with `batch_size` rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Examples {
    pub x: Features,
    pub y: Targets,
}

impl Examples {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            x: self.x.slice(range.clone()),
            y: self.y.slice(range),
        }
    }
}

/// Slides a fixed-width window over padded text and one-hot encodes
/// (context, next symbol) pairs.
///
/// A window whose target is the pad symbol is never emitted unless
/// `train_on_pad` is set, so no example predicts a file's first symbol
/// from the tail of the previous file.
#[derive(Debug, Clone)]
pub struct Windower {
    vocab: Vocabulary,
    config: WindowConfig,
    pad_index: usize,
}

impl Windower {
    pub fn new(vocab: Vocabulary, config: WindowConfig) -> Result<Self> {
        config.validate()?;
        let pad_index = vocab.encode(config.pad_symbol).map_err(|_| {
            Error::Configuration(format!(
                "pad symbol {:?} is not in the vocabulary",
                config.pad_symbol
            ))
        })?;
        Ok(Self {
            vocab,
            config,
            pad_index,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn sequence_length(&self) -> usize {
        self.config.sequence_length
    }

    /// Sentinel run as wide as one window.
    pub fn padding(&self) -> Padding {
        Padding {
            symbol: self.config.pad_symbol,
            width: self.config.sequence_length,
        }
    }

    fn encode_symbols(&self, text: impl IntoIterator<Item = char>) -> Result<Vec<usize>> {
        let mut encoded = Vec::new();
        for c in text {
            match (self.vocab.encode(c), self.config.unknown_symbols) {
                (Ok(i), _) => encoded.push(i),
                (Err(_), UnknownSymbolPolicy::Skip) => {}
                (Err(e), UnknownSymbolPolicy::Fail) => return Err(e),
            }
        }
        Ok(encoded)
    }

    /// Retained window starts over already-encoded symbols.
    pub fn window_starts<'a>(&'a self, encoded: &'a [usize]) -> impl Iterator<Item = usize> + 'a {
        let seq_len = self.config.sequence_length;
        (0..encoded.len())
            .step_by(self.config.step_size)
            .take_while(move |&start| start + seq_len < encoded.len())
            .filter(move |&start| {
                self.config.train_on_pad || encoded[start + seq_len] != self.pad_index
            })
    }

    pub fn build(&self, corpus: &PaddedCorpus) -> Result<Examples> {
        self.build_chars(corpus.as_chars().iter().copied())
    }

    /// Examples for a single file, behind its own sentinel run.
    pub fn build_document(&self, doc: &Document) -> Result<Examples> {
        self.build_chars(self.padding().pad_document(doc))
    }

    fn build_chars(&self, text: impl IntoIterator<Item = char>) -> Result<Examples> {
        let seq_len = self.config.sequence_length;
        let vocab_size = self.vocab.size();
        let encoded = self.encode_symbols(text)?;

        let mut contexts = Vec::new();
        let mut targets = Vec::new();
        for start in self.window_starts(&encoded) {
            contexts.extend_from_slice(&encoded[start..start + seq_len]);
            targets.push(encoded[start + seq_len]);
        }

        Ok(Examples {
            x: Features::from_indices(&contexts, seq_len, vocab_size),
            y: Targets::from_indices(&targets, vocab_size),
        })
    }

    /// Number of examples `build_document` would emit, without encoding them.
    pub fn count(&self, doc: &Document) -> Result<usize> {
        let encoded = self.encode_symbols(self.padding().pad_document(doc))?;
        Ok(self.window_starts(&encoded).count())
    }

    /// The trailing window of `text` as a (1, sequence_length, V) tensor,
    /// left-padded with the pad symbol when `text` is shorter than a window.
    pub fn encode_context(&self, text: &str) -> Result<Features> {
        let seq_len = self.config.sequence_length;
        let encoded = self.encode_symbols(text.chars())?;

        let tail = &encoded[encoded.len().saturating_sub(seq_len)..];
        let mut window = vec![self.pad_index; seq_len - tail.len()];
        window.extend_from_slice(tail);

        Ok(Features::from_indices(&window, seq_len, self.vocab.size()))
    }
}
