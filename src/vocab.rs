use crate::error::{Error, Result};

/// Python's `string.printable`: digits, letters, punctuation, whitespace.
pub const PRINTABLE: &str = concat!(
    "0123456789",
    "abcdefghijklmnopqrstuvwxyz",
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ",
    "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~",
    " \t\n\r\x0b\x0c",
);

#[derive(Debug, Clone)]
pub struct Vocabulary {
    symbols: Box<[char]>,
    // indices into `symbols`, ordered by symbol for binary search
    symbols_sorted: Box<[u32]>,
}

impl Vocabulary {
    pub fn new(symbols: impl IntoIterator<Item = char>) -> Result<Self> {
        let symbols: Box<[char]> = symbols.into_iter().collect();
        if symbols.is_empty() {
            return Err(Error::Configuration(
                "vocabulary must contain at least one symbol".to_string(),
            ));
        }

        let symbols_sorted = sorted_index(&symbols);

        if let Some(pair) = symbols_sorted
            .windows(2)
            .find(|pair| symbols[pair[0] as usize] == symbols[pair[1] as usize])
        {
            return Err(Error::Configuration(format!(
                "duplicate vocabulary symbol {:?}",
                symbols[pair[0] as usize]
            )));
        }

        Ok(Self {
            symbols,
            symbols_sorted,
        })
    }

    pub fn printable() -> Self {
        let symbols: Box<[char]> = PRINTABLE.chars().collect();
        let symbols_sorted = sorted_index(&symbols);
        Self {
            symbols,
            symbols_sorted,
        }
    }

    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    fn symbol_lookup(&self, symbol: char) -> Option<usize> {
        self.symbols_sorted
            .binary_search_by(|&probe| self.symbols[probe as usize].cmp(&symbol))
            .ok()
            .map(|i| self.symbols_sorted[i] as usize)
    }

    pub fn contains(&self, symbol: char) -> bool {
        self.symbol_lookup(symbol).is_some()
    }

    pub fn encode(&self, symbol: char) -> Result<usize> {
        self.symbol_lookup(symbol)
            .ok_or(Error::UnknownSymbol(symbol))
    }

    pub fn decode(&self, index: usize) -> Result<char> {
        self.symbols
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange {
                index,
                size: self.size(),
            })
    }

    pub fn encode_str(&self, text: &str) -> Result<Vec<usize>> {
        text.chars().map(|c| self.encode(c)).collect()
    }

    /// Drops every character the vocabulary cannot encode.
    pub fn retain_known(&self, text: &str) -> String {
        text.chars().filter(|&c| self.contains(c)).collect()
    }

    /// Symbol for a one-hot row of length `size()`.
    pub fn decode_one_hot(&self, row: &[u8]) -> Result<char> {
        if row.len() != self.size() {
            return Err(Error::ArrayFormat(format!(
                "one-hot row has {} entries, vocabulary has {}",
                row.len(),
                self.size()
            )));
        }
        let mut set = row.iter().enumerate().filter(|(_, &v)| v != 0);
        match (set.next(), set.next()) {
            (Some((index, _)), None) => self.decode(index),
            _ => Err(Error::ArrayFormat(
                "row is not a one-hot vector".to_string(),
            )),
        }
    }

    /// Text for a flat run of one-hot rows, e.g. one context window of `X`.
    pub fn decode_sequence(&self, rows: &[u8]) -> Result<String> {
        rows.chunks(self.size())
            .map(|row| self.decode_one_hot(row))
            .collect()
    }
}

fn sorted_index(symbols: &[char]) -> Box<[u32]> {
    let mut sorted = (0..symbols.len() as u32).collect::<Vec<u32>>();
    sorted.sort_unstable_by_key(|&i| symbols[i as usize]);
    sorted.into_boxed_slice()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::printable()
    }
}
