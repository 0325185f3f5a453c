use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::maths::{apply_temperature, check_distribution};
use crate::model::NextSymbolModel;
use crate::windower::Windower;

/// How far a model's output may drift from summing to one.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-3;

/// Draws one symbol index from a temperature-scaled distribution.
#[derive(Debug, Clone)]
pub struct Sampler<R> {
    temperature: f64,
    rng: R,
}

impl<R: Rng> Sampler<R> {
    pub fn new(temperature: f64, rng: R) -> Result<Self> {
        if !(temperature.is_finite() && temperature > 0.0) {
            return Err(Error::Configuration(format!(
                "temperature must be positive, got {temperature}"
            )));
        }
        Ok(Self { temperature, rng })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Rescales `ln p` by the temperature, renormalizes and makes a single
    /// categorical draw. Lower temperatures sharpen toward the arg-max.
    pub fn sample(&mut self, distribution: &[f32]) -> Result<usize> {
        check_distribution(distribution, DISTRIBUTION_TOLERANCE)?;
        let weights = apply_temperature(distribution, self.temperature);
        let dist = WeightedIndex::new(&weights)
            .map_err(|e| Error::InvalidDistribution(e.to_string()))?;
        Ok(dist.sample(&mut self.rng))
    }
}

impl Sampler<StdRng> {
    pub fn seeded(temperature: f64, seed: u64) -> Result<Self> {
        Self::new(temperature, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(temperature: f64) -> Result<Self> {
        Self::new(temperature, StdRng::from_entropy())
    }
}

/// Extends text one symbol at a time by feeding the trailing window to a
/// model and sampling its output.
pub struct Generator<'w, M, R> {
    model: M,
    windower: &'w Windower,
    sampler: Sampler<R>,
}

impl<'w, M: NextSymbolModel, R: Rng> Generator<'w, M, R> {
    pub fn new(model: M, windower: &'w Windower, sampler: Sampler<R>) -> Result<Self> {
        if model.vocab_size() != windower.vocabulary().size() {
            return Err(Error::Configuration(format!(
                "model predicts {} symbols, vocabulary has {}",
                model.vocab_size(),
                windower.vocabulary().size()
            )));
        }
        Ok(Self {
            model,
            windower,
            sampler,
        })
    }

    /// Lazily generates `n` symbols after `seed`. Dropping the iterator early
    /// cancels generation; symbols already yielded stay valid.
    pub fn steps(&mut self, seed: &str, n: usize) -> Generation<'_, 'w, M, R> {
        Generation {
            generator: self,
            context: seed.to_string(),
            generated: String::new(),
            remaining: n,
            state: GenerationState::Seeded,
        }
    }

    /// The `n` generated symbols only.
    pub fn continuation(&mut self, seed: &str, n: usize) -> Result<String> {
        let mut generation = self.steps(seed, n);
        for step in generation.by_ref() {
            step?;
        }
        Ok(generation.generated)
    }

    /// `seed` followed by `n` generated symbols.
    pub fn extend(&mut self, seed: &str, n: usize) -> Result<String> {
        Ok(format!("{seed}{}", self.continuation(seed, n)?))
    }

    fn next_symbol(&mut self, context: &str) -> Result<char> {
        let x = self.windower.encode_context(context)?;
        let distribution = self
            .model
            .predict(&x)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidDistribution("model returned no rows".to_string()))?;
        let index = self.sampler.sample(&distribution)?;
        self.windower.vocabulary().decode(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Seeded,
    Extending,
    Done,
}

pub struct Generation<'g, 'w, M, R> {
    generator: &'g mut Generator<'w, M, R>,
    context: String,
    generated: String,
    remaining: usize,
    state: GenerationState,
}

impl<M, R> Generation<'_, '_, M, R> {
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// Symbols produced so far.
    pub fn generated(&self) -> &str {
        &self.generated
    }
}

impl<M, R> Generation<'_, '_, M, R> {
    // Keeps only the trailing `sequence_length` in-vocabulary symbols, which
    // is all `encode_context` reads.
    fn trim_context(&mut self) {
        let vocab = self.generator.windower.vocabulary();
        let keep = self.generator.windower.sequence_length();
        let mut known = 0;
        let cut = self.context.char_indices().rev().find_map(|(i, c)| {
            if vocab.contains(c) {
                known += 1;
            }
            (known == keep).then_some(i)
        });
        if let Some(i) = cut {
            self.context.replace_range(..i, "");
        }
    }
}

impl<M: NextSymbolModel, R: Rng> Iterator for Generation<'_, '_, M, R> {
    type Item = Result<char>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == GenerationState::Done || self.remaining == 0 {
            self.state = GenerationState::Done;
            return None;
        }
        self.state = GenerationState::Extending;

        let symbol = match self.generator.next_symbol(&self.context) {
            Ok(symbol) => symbol,
            Err(e) => {
                self.state = GenerationState::Done;
                return Some(Err(e));
            }
        };
        self.context.push(symbol);
        self.generated.push(symbol);
        self.trim_context();

        self.remaining -= 1;
        if self.remaining == 0 {
            self.state = GenerationState::Done;
        }
        Some(Ok(symbol))
    }
}
