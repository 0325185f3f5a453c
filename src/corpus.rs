use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::config::{DecodePolicy, LoaderConfig, TextEncoding};
use crate::error::{Error, Result};

/// One decoded source file. The path is kept for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Sentinel run written before every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub symbol: char,
    pub width: usize,
}

impl Padding {
    pub fn apply(&self, text: &str) -> Vec<char> {
        std::iter::repeat(self.symbol)
            .take(self.width)
            .chain(text.chars())
            .collect()
    }

    /// Single-document padded form, as streamed one file at a time.
    pub fn pad_document(&self, doc: &Document) -> Vec<char> {
        self.apply(&doc.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpan {
    pub path: PathBuf,
    /// First position of the file's sentinel run.
    pub start: usize,
    /// First position of the file's own text.
    pub content_start: usize,
    pub end: usize,
}

/// Documents joined in file-list order, each preceded by a sentinel run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaddedCorpus {
    text: Vec<char>,
    spans: Vec<FileSpan>,
}

impl PaddedCorpus {
    pub fn from_documents(documents: &[Document], padding: Padding) -> Self {
        let mut corpus = PaddedCorpus::default();
        for doc in documents {
            let start = corpus.text.len();
            corpus.text.extend(padding.apply(&doc.text));
            corpus.spans.push(FileSpan {
                path: doc.path.clone(),
                start,
                content_start: start + padding.width,
                end: corpus.text.len(),
            });
        }
        corpus
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_chars(&self) -> &[char] {
        &self.text
    }

    pub fn spans(&self) -> &[FileSpan] {
        &self.spans
    }

    /// File that owns corpus position `pos`, sentinel run included.
    pub fn file_at(&self, pos: usize) -> Option<&Path> {
        let i = self.spans.partition_point(|span| span.end <= pos);
        self.spans
            .get(i)
            .filter(|span| span.start <= pos)
            .map(|span| span.path.as_path())
    }
}

/// Training-order state: the only piece of corpus state mutated after
/// construction, and only through [`FileList::shuffle`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList(Vec<PathBuf>);

impl FileList {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reorders the paths at random. With at least two distinct paths the
    /// new order always differs from the current one.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let fixed = self.0.windows(2).all(|pair| pair[0] == pair[1]);
        let before = self.0.clone();
        loop {
            self.0.shuffle(rng);
            if fixed || self.0 != before {
                break;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorpusLoader {
    config: LoaderConfig,
}

impl CorpusLoader {
    pub fn new(config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// All files under `root` with the configured extension, in path order,
    /// truncated to the configured fraction.
    pub fn discover(&self, root: impl AsRef<Path>) -> Result<FileList> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::DirectoryNotFound(root.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                // symlink loops and unreadable entries
                Err(e) => {
                    tracing::warn!("Skipping during discovery: {e}");
                    continue;
                }
            };
            if entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == self.config.extension.as_str())
            {
                files.push(entry.into_path());
            }
        }
        files.sort();

        let keep = (self.config.fraction * files.len() as f64) as usize;
        files.truncate(keep);

        tracing::info!(
            "Discovered {} .{} files under {}",
            files.len(),
            self.config.extension,
            root.display()
        );
        Ok(FileList::new(files))
    }

    pub fn read(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let text = decode(
            &bytes,
            self.config.encoding,
            self.config.decode_policy,
            path,
        )?;
        tracing::debug!("Read {} ({} chars)", path.display(), text.chars().count());
        Ok(Document::new(path, text))
    }

    /// Like [`CorpusLoader::read`], but a decode failure becomes `None` with a
    /// warning when `skip_undecodable` is set.
    pub fn read_or_skip(&self, path: impl AsRef<Path>) -> Result<Option<Document>> {
        match self.read(path) {
            Ok(doc) => Ok(Some(doc)),
            Err(Error::Decode { path, offset }) if self.config.skip_undecodable => {
                tracing::warn!(
                    "Skipping '{}': invalid byte at offset {}",
                    path.display(),
                    offset
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads every path on the worker pool. Output follows `paths` order.
    pub fn load(&self, paths: &[PathBuf]) -> Result<Vec<Document>> {
        let results: Vec<Result<Option<Document>>> = self.install(|| {
            paths
                .par_iter()
                .map(|path| self.read_or_skip(path))
                .collect()
        })?;

        let mut documents = Vec::with_capacity(results.len());
        for result in results {
            documents.extend(result?);
        }
        Ok(documents)
    }

    pub fn concatenate(&self, paths: &[PathBuf], padding: Padding) -> Result<PaddedCorpus> {
        let documents = self.load(paths)?;
        let corpus = PaddedCorpus::from_documents(&documents, padding);
        tracing::info!(
            "Concatenated {} files into {} symbols",
            documents.len(),
            corpus.len()
        );
        Ok(corpus)
    }

    fn install<T: Send>(&self, op: impl FnOnce() -> T + Send) -> Result<T> {
        match self.config.workers {
            None => Ok(op()),
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| Error::Configuration(format!("worker pool: {e}")))?;
                Ok(pool.install(op))
            }
        }
    }
}

fn decode(
    bytes: &[u8],
    encoding: TextEncoding,
    policy: DecodePolicy,
    path: &Path,
) -> Result<String> {
    let invalid_at = |offset: usize| Error::Decode {
        path: path.to_path_buf(),
        offset,
    };

    let mut text = String::with_capacity(bytes.len());
    match encoding {
        TextEncoding::Utf8 => {
            let mut offset = 0;
            for chunk in bytes.utf8_chunks() {
                text.push_str(chunk.valid());
                offset += chunk.valid().len();
                if !chunk.invalid().is_empty() {
                    match policy {
                        DecodePolicy::Strict => return Err(invalid_at(offset)),
                        DecodePolicy::Replace => text.push(char::REPLACEMENT_CHARACTER),
                        DecodePolicy::Ignore => {}
                    }
                    offset += chunk.invalid().len();
                }
            }
        }
        TextEncoding::Ascii => {
            for (offset, &b) in bytes.iter().enumerate() {
                if b.is_ascii() {
                    text.push(b as char);
                    continue;
                }
                match policy {
                    DecodePolicy::Strict => return Err(invalid_at(offset)),
                    DecodePolicy::Replace => text.push(char::REPLACEMENT_CHARACTER),
                    DecodePolicy::Ignore => {}
                }
            }
        }
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn padding() -> Padding {
        Padding {
            symbol: '\x0c',
            width: 2,
        }
    }

    fn decode_str(bytes: &[u8], encoding: TextEncoding, policy: DecodePolicy) -> Result<String> {
        decode(bytes, encoding, policy, Path::new("t.py"))
    }

    #[test]
    fn test_utf8_policies() {
        let bytes = b"ab\xffcd";
        assert_eq!(
            decode_str(bytes, TextEncoding::Utf8, DecodePolicy::Ignore).unwrap(),
            "abcd"
        );
        assert_eq!(
            decode_str(bytes, TextEncoding::Utf8, DecodePolicy::Replace).unwrap(),
            "ab\u{fffd}cd"
        );
        assert!(matches!(
            decode_str(bytes, TextEncoding::Utf8, DecodePolicy::Strict),
            Err(Error::Decode { offset: 2, .. })
        ));
    }

    #[test]
    fn test_ascii_policies() {
        let bytes = "aé".as_bytes();
        assert_eq!(
            decode_str(bytes, TextEncoding::Ascii, DecodePolicy::Ignore).unwrap(),
            "a"
        );
        assert_eq!(
            decode_str(bytes, TextEncoding::Ascii, DecodePolicy::Replace).unwrap(),
            "a\u{fffd}\u{fffd}"
        );
        assert!(decode_str(bytes, TextEncoding::Ascii, DecodePolicy::Strict).is_err());
        assert_eq!(
            decode_str(b"plain", TextEncoding::Ascii, DecodePolicy::Strict).unwrap(),
            "plain"
        );
    }

    #[test]
    fn test_padded_corpus_layout() {
        let docs = vec![Document::new("a.py", "ab"), Document::new("b.py", "cde")];
        let corpus = PaddedCorpus::from_documents(&docs, padding());

        assert_eq!(corpus.len(), 2 + 3 + 2 * 2);
        let text: String = corpus.as_chars().iter().collect();
        assert_eq!(text, "\x0c\x0cab\x0c\x0ccde");

        let spans = corpus.spans();
        assert_eq!(spans[1].start, 4);
        assert_eq!(spans[1].content_start, 6);
        assert_eq!(spans[1].end, 9);
    }

    #[test]
    fn test_file_at() {
        let docs = vec![Document::new("a.py", "ab"), Document::new("b.py", "cde")];
        let corpus = PaddedCorpus::from_documents(&docs, padding());
        assert_eq!(corpus.file_at(0), Some(Path::new("a.py")));
        assert_eq!(corpus.file_at(3), Some(Path::new("a.py")));
        assert_eq!(corpus.file_at(4), Some(Path::new("b.py")));
        assert_eq!(corpus.file_at(8), Some(Path::new("b.py")));
        assert_eq!(corpus.file_at(9), None);
    }

    #[test]
    fn test_shuffle_preserves_paths() {
        let paths: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("{i}.py"))).collect();
        let mut files = FileList::new(paths.clone());
        files.shuffle(&mut StdRng::seed_from_u64(7));

        assert_ne!(files.paths(), paths.as_slice());
        let mut sorted = files.paths().to_vec();
        sorted.sort();
        let mut expected = paths;
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_shuffle_always_moves_two_paths() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut files = FileList::new(vec![PathBuf::from("a.py"), PathBuf::from("b.py")]);
        for _ in 0..10 {
            let before = files.clone();
            files.shuffle(&mut rng);
            assert_ne!(files, before);
        }

        let mut same = FileList::new(vec![PathBuf::from("a.py"); 3]);
        same.shuffle(&mut rng);
        assert_eq!(same.len(), 3);
    }

    #[test]
    fn test_read_or_skip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.py");
        std::fs::write(&path, b"\xfe").unwrap();

        let config = LoaderConfig::new().with_decode_policy(DecodePolicy::Strict);
        let loader = CorpusLoader::new(config.clone()).unwrap();
        assert!(loader.read_or_skip(&path).unwrap().is_none());

        let loader = CorpusLoader::new(config.with_skip_undecodable(false)).unwrap();
        assert!(loader.read_or_skip(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_ignores_symlink_loop() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), b"x = 1\n").unwrap();
        std::os::unix::fs::symlink(".", dir.path().join("loop")).unwrap();

        let loader = CorpusLoader::new(LoaderConfig::default()).unwrap();
        let files = loader.discover(dir.path()).unwrap();
        assert_eq!(files.paths(), &[dir.path().join("a.py")]);
    }

    #[test]
    fn test_missing_root() {
        let loader = CorpusLoader::new(LoaderConfig::default()).unwrap();
        assert!(matches!(
            loader.discover("/definitely/not/here"),
            Err(Error::DirectoryNotFound(_))
        ));
    }
}
