/// Read / write float images as raw binary.
///
/// Images are flat streams of little-endian `f32`, one value per pixel. Where
/// an image holds several values per pixel (counts in each bin, thickness of
/// each material) they are stored as consecutive planes, one plane per bin
/// or material.

use std::fs::File;
use std::io::{Write, Read, BufWriter, BufReader};
use std::path::Path;

use nalgebra::SVector;

pub fn write(data: impl Iterator<Item = f32>, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    buf.flush()
}

type IORes<T> = std::io::Result<T>;
pub fn read<'a>(path: &Path) -> IORes<impl Iterator<Item = IORes<f32>> + 'a> {
    let file = File::open(path)?;
    let mut buf = BufReader::new(file);
    let mut buffer = [0; 4];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(f32::from_le_bytes(buffer))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Read a multi-plane image and regroup it into one `N`-vector per pixel
pub fn read_planes<const N: usize>(path: &Path) -> IORes<Vec<SVector<f64, N>>> {
    let values = read(path)?.collect::<IORes<Vec<f32>>>()?;
    if values.len() % N != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} holds {} values, which is not a whole number of {N}-plane pixels", path.display(), values.len()),
        ))
    }
    let n_pixels = values.len() / N;
    Ok((0..n_pixels)
       .map(|p| SVector::<f64, N>::from_fn(|plane, _| values[plane * n_pixels + p] as f64))
       .collect())
}

/// Write one `N`-vector per pixel as `N` consecutive planes
pub fn write_planes<const N: usize>(pixels: &[SVector<f64, N>], path: &Path) -> IORes<()> {
    write((0..N).flat_map(|plane| pixels.iter().map(move |pixel| pixel[plane] as f32)), path)
}
