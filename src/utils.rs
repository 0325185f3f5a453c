//! `.npy` persistence for encoded datasets, so `X` and `y` can be loaded
//! directly with `numpy.load`.

use bytemuck::{Pod, Zeroable};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::windower::{Examples, Features, Targets};

const NPY_MAGIC: [u8; 6] = *b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub struct NpyPreamble {
    pub magic: [u8; 6],
    pub major: u8,
    pub minor: u8,
    pub header_len: u16, // little-endian on disk
}

pub fn read_file_to_struct<T: Pod>(file: &mut impl Read) -> io::Result<T> {
    let mut buffer = vec![0u8; std::mem::size_of::<T>()];
    file.read_exact(&mut buffer)?;
    Ok(bytemuck::pod_read_unaligned(&buffer))
}

pub fn read_variable_length_data<T: Pod>(file: &mut impl Read, size: usize) -> io::Result<Vec<T>> {
    let mut buffer = vec![0u8; size * std::mem::size_of::<T>()];
    file.read_exact(&mut buffer)?;
    Ok(bytemuck::pod_collect_to_vec(&buffer))
}

fn header_text(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape = match dims.as_slice() {
        [single] => format!("({single},)"),
        _ => format!("({})", dims.join(", ")),
    };
    let mut header = format!("{{'descr': '|b1', 'fortran_order': False, 'shape': {shape}, }}");

    let preamble = std::mem::size_of::<NpyPreamble>();
    let unpadded = preamble + header.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    header
}

/// Writes a boolean array of the given shape in NPY 1.0 format.
pub fn write_array(path: &Path, shape: &[usize], data: &[u8]) -> Result<()> {
    if shape.iter().product::<usize>() != data.len() {
        return Err(Error::ArrayFormat(format!(
            "{} bytes do not fill shape {:?}",
            data.len(),
            shape
        )));
    }
    let header = header_text(shape);
    let header_len = u16::try_from(header.len())
        .map_err(|_| Error::ArrayFormat("npy header too long".to_string()))?;

    let preamble = NpyPreamble {
        magic: NPY_MAGIC,
        major: 1,
        minor: 0,
        header_len: header_len.to_le(),
    };

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(bytemuck::bytes_of(&preamble))?;
    out.write_all(header.as_bytes())?;
    out.write_all(data)?;
    out.flush()?;
    Ok(())
}

fn parse_shape(header: &str) -> Result<Vec<usize>> {
    let bad = || Error::ArrayFormat(format!("unsupported npy header: {}", header.trim()));

    if !(header.contains("'|b1'") || header.contains("'|u1'")) {
        return Err(bad());
    }
    if !header.contains("'fortran_order': False") {
        return Err(bad());
    }
    let start = header.find("'shape': (").ok_or_else(bad)? + "'shape': (".len();
    let end = start + header[start..].find(')').ok_or_else(bad)?;
    header[start..end]
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| d.parse::<usize>().map_err(|_| bad()))
        .collect()
}

/// Reads a one-byte-per-entry NPY 1.0 array, returning its shape and data.
pub fn read_array(path: &Path) -> Result<(Vec<usize>, Vec<u8>)> {
    let mut file = BufReader::new(File::open(path)?);

    let preamble = read_file_to_struct::<NpyPreamble>(&mut file)?;
    if preamble.magic != NPY_MAGIC {
        return Err(Error::ArrayFormat(format!(
            "{} is not an npy file",
            path.display()
        )));
    }
    if preamble.major != 1 {
        return Err(Error::ArrayFormat(format!(
            "npy version {}.{} is not supported",
            preamble.major, preamble.minor
        )));
    }

    let header_len = u16::from_le(preamble.header_len) as usize;
    let header = read_variable_length_data::<u8>(&mut file, header_len)?;
    let header = String::from_utf8_lossy(&header);
    let shape = parse_shape(&header)?;

    let len = shape.iter().product();
    let data = read_variable_length_data::<u8>(&mut file, len)?;
    Ok((shape, data))
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Saves `X` to `<prefix>_X.npy` and `y` to `<prefix>_y.npy`.
pub fn save_examples(examples: &Examples, prefix: &Path) -> Result<(PathBuf, PathBuf)> {
    let parent = match prefix.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(Error::DirectoryNotFound(parent.to_path_buf()));
    }

    let x_path = with_suffix(prefix, "_X.npy");
    let y_path = with_suffix(prefix, "_y.npy");
    write_array(&x_path, &examples.x.shape(), examples.x.as_bytes())?;
    write_array(&y_path, &examples.y.shape(), examples.y.as_bytes())?;

    tracing::info!(
        "Saved {} examples to {} and {}",
        examples.len(),
        x_path.display(),
        y_path.display()
    );
    Ok((x_path, y_path))
}

pub fn load_examples(prefix: &Path) -> Result<Examples> {
    let (x_shape, x_data) = read_array(&with_suffix(prefix, "_X.npy"))?;
    let (y_shape, y_data) = read_array(&with_suffix(prefix, "_y.npy"))?;

    let (x_shape, y_shape) = match (x_shape.as_slice(), y_shape.as_slice()) {
        (&[n, s, v], &[m, w]) if n == m && v == w => ([n, s, v], [m, w]),
        _ => {
            return Err(Error::ArrayFormat(format!(
                "X shape {x_shape:?} does not match y shape {y_shape:?}"
            )))
        }
    };

    Ok(Examples {
        x: Features::from_raw(x_shape, x_data)?,
        y: Targets::from_raw(y_shape, y_data)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preamble_is_ten_bytes() {
        assert_eq!(std::mem::size_of::<NpyPreamble>(), 10);
    }

    #[test]
    fn test_header_is_aligned() {
        for shape in [vec![0, 100], vec![12345, 100, 100], vec![7]] {
            let header = header_text(&shape);
            assert_eq!((10 + header.len()) % NPY_ALIGN, 0);
            assert!(header.ends_with('\n'));
        }
        assert!(header_text(&[7]).contains("'shape': (7,)"));
    }

    #[test]
    fn test_parse_shape() {
        let header = header_text(&[3, 4, 5]);
        assert_eq!(parse_shape(&header).unwrap(), vec![3, 4, 5]);
        assert!(parse_shape("{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }").is_err());
        assert!(parse_shape("{'descr': '|b1', 'fortran_order': True, 'shape': (3,), }").is_err());
    }

    #[test]
    fn test_write_read_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.npy");
        let data = vec![0, 1, 0, 0, 0, 1];
        write_array(&path, &[2, 3], &data).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        assert_eq!(bytes.len() % NPY_ALIGN, data.len());

        let (shape, back) = read_array(&path).unwrap();
        assert_eq!(shape, vec![2, 3]);
        assert_eq!(back, data);
    }

    #[test]
    fn test_write_rejects_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_array(&dir.path().join("a.npy"), &[2, 2], &[0, 1, 0]).is_err());
    }

    #[test]
    fn test_read_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.npy");
        std::fs::write(&path, b"definitely not numpy").unwrap();
        assert!(matches!(read_array(&path), Err(Error::ArrayFormat(_))));
    }

    #[test]
    fn test_save_requires_existing_directory() {
        let examples = Examples {
            x: Features::from_indices(&[], 2, 3),
            y: Targets::from_indices(&[], 3),
        };
        let result = save_examples(&examples, Path::new("/no/such/dir/data"));
        assert!(matches!(result, Err(Error::DirectoryNotFound(_))));
    }
}
