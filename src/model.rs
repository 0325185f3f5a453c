use crate::error::{Error, Result};
use crate::windower::{Examples, Features};

/// The sequence model as seen from the data pipeline: encoded windows in,
/// one next-symbol distribution of length V per window out.
pub trait NextSymbolModel {
    fn vocab_size(&self) -> usize;

    fn predict(&mut self, x: &Features) -> Result<Vec<Vec<f32>>>;
}

fn check_width(model_vocab: usize, x: &Features) -> Result<()> {
    let [_, _, vocab_size] = x.shape();
    if vocab_size != model_vocab {
        return Err(Error::Configuration(format!(
            "model expects {model_vocab} symbols, input has {vocab_size}"
        )));
    }
    Ok(())
}

/// Every symbol equally likely.
#[derive(Debug, Clone)]
pub struct UniformModel {
    vocab_size: usize,
}

impl UniformModel {
    pub fn new(vocab_size: usize) -> Self {
        Self { vocab_size }
    }
}

impl NextSymbolModel for UniformModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn predict(&mut self, x: &Features) -> Result<Vec<Vec<f32>>> {
        check_width(self.vocab_size, x)?;
        let p = 1.0 / self.vocab_size as f32;
        Ok(vec![vec![p; self.vocab_size]; x.len()])
    }
}

/// Next-symbol counts keyed on the last symbol of the window, with add-one
/// smoothing. Stands in for a trained network when exercising generation.
#[derive(Debug, Clone)]
pub struct BigramModel {
    vocab_size: usize,
    // counts[prev * vocab_size + next]
    counts: Box<[u32]>,
}

impl BigramModel {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            counts: vec![1u32; vocab_size * vocab_size].into_boxed_slice(),
        }
    }

    pub fn fit(examples: &Examples) -> Self {
        let [_, seq_len, vocab_size] = examples.x.shape();
        let mut model = Self::new(vocab_size);
        for i in 0..examples.len() {
            let last = &examples.x.window(i)[(seq_len - 1) * vocab_size..];
            let prev = hot_index(last);
            let next = hot_index(examples.y.row(i));
            if let (Some(prev), Some(next)) = (prev, next) {
                model.counts[prev * vocab_size + next] += 1;
            }
        }
        model
    }

    fn distribution(&self, prev: usize) -> Vec<f32> {
        let row = &self.counts[prev * self.vocab_size..(prev + 1) * self.vocab_size];
        let total: u64 = row.iter().map(|&c| c as u64).sum();
        row.iter().map(|&c| (c as f64 / total as f64) as f32).collect()
    }
}

impl NextSymbolModel for BigramModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn predict(&mut self, x: &Features) -> Result<Vec<Vec<f32>>> {
        check_width(self.vocab_size, x)?;
        let [_, seq_len, vocab_size] = x.shape();
        (0..x.len())
            .map(|i| {
                let last = &x.window(i)[(seq_len - 1) * vocab_size..];
                hot_index(last)
                    .map(|prev| self.distribution(prev))
                    .ok_or_else(|| Error::ArrayFormat("window row is not one-hot".to_string()))
            })
            .collect()
    }
}

fn hot_index(row: &[u8]) -> Option<usize> {
    row.iter().position(|&v| v != 0)
}
