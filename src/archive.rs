//! Packaging of file trees into gzip'd tar archives.

use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;

/// Errors returned while packaging a tree.
///
/// `E` is the error type of the file sequence being consumed, so a failure
/// to read the tree mid-stream stays distinguishable from a failure to
/// write the archive itself.
#[derive(Error, Debug)]
pub enum PackageError<E> {
    /// The file sequence failed while being read.
    #[error("file tree stream failed: {0}")]
    Source(E),
    /// Writing the tar or gzip stream failed.
    #[error("archive stream write failed: {0}")]
    Encoding(#[from] std::io::Error),
}

/// Package a sequence of `(path, contents)` files into a gzip'd tar.
///
/// The sequence is consumed exactly once, in order; identical input
/// ordering produces identical bytes. Entries are written as regular files
/// with mode 0644.
pub fn package_tree<E, I>(files: I) -> Result<Vec<u8>, PackageError<E>>
where
    I: IntoIterator<Item = Result<(String, Vec<u8>), E>>,
{
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for file in files {
        let (path, contents) = file.map_err(PackageError::Source)?;

        let mut header = tar::Header::new_gnu();
        header.set_mode(0o644);
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, &path, contents.as_slice())?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}
