//! Virtual files backed by host files.

use std::{
    fs::{File, OpenOptions},
    io,
    os::unix::fs::FileExt,
    path::Path,
};
use tunnel_proto::Errno;

/// The files the guest reaches through `READ_FILE`, `WRITE_FILE` and `SIZE_FILE`, keyed by their
/// position in the machine configuration.
#[derive(Debug, Default)]
pub(crate) struct FileTable {
    files: Vec<File>,
}

impl FileTable {
    /// Open every path for reading and writing.
    pub(crate) fn open<P: AsRef<Path>>(paths: &[P]) -> io::Result<Self> {
        let files = paths
            .iter()
            .map(|p| OpenOptions::new().read(true).write(true).open(p))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { files })
    }

    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    fn get(&self, index: u64) -> Result<&File, Errno> {
        usize::try_from(index).ok().and_then(|i| self.files.get(i)).ok_or(Errno::EBADF)
    }

    pub(crate) fn read_at(&self, index: u64, buf: &mut [u8], offset: u64) -> Result<usize, Errno> {
        Ok(self.get(index)?.read_at(buf, offset)?)
    }

    pub(crate) fn write_at(&self, index: u64, buf: &[u8], offset: u64) -> Result<usize, Errno> {
        Ok(self.get(index)?.write_at(buf, offset)?)
    }

    pub(crate) fn size(&self, index: u64) -> Result<u64, Errno> {
        Ok(self.get(index)?.metadata()?.len())
    }
}
