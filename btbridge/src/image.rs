//! Firmware image sources for an OTA session.
//!
//! The engine pulls the image packet by packet, so a source only has to
//! answer positioned reads; nothing requires the whole image in memory.

use {
    crate::error::{Error, Result},
    std::{
        fs::File,
        io::{Read, Seek, SeekFrom},
        path::Path,
    },
};

/// Random-access image bytes.
pub trait ImageSource {
    /// Image length in bytes.
    fn len(&self) -> u32;

    /// Whether the image is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from `offset`. The range must lie inside the image.
    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<()>;
}

fn check_range(len: u32, offset: u32, want: usize) -> Result<()> {
    let end = u64::from(offset) + want as u64;
    if end > u64::from(len) {
        return Err(Error::Config(format!(
            "read of {want} bytes at {offset:#x} past image end {len:#x}"
        )));
    }
    Ok(())
}

/// Image held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryImage {
    data: Vec<u8>,
}

impl MemoryImage {
    /// Wrap image bytes. Images over 4 GiB are rejected.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        u32::try_from(data.len())
            .map_err(|_| Error::Config("image larger than 4 GiB".to_string()))?;
        Ok(Self { data })
    }

    /// Image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ImageSource for MemoryImage {
    #[allow(clippy::cast_possible_truncation)] // checked in `new`
    fn len(&self) -> u32 {
        self.data.len() as u32
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        check_range(self.len(), offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

/// Image streamed from a file.
#[derive(Debug)]
pub struct FileImage {
    file: File,
    len: u32,
}

impl FileImage {
    /// Open an image file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let len = u32::try_from(file.metadata()?.len()).map_err(|_| {
            Error::Config(format!(
                "{} is larger than 4 GiB",
                path.as_ref().display()
            ))
        })?;
        Ok(Self { file, len })
    }
}

impl ImageSource for FileImage {
    fn len(&self) -> u32 {
        self.len
    }

    fn read_at(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        check_range(self.len, offset, buf.len())?;
        self.file
            .seek(SeekFrom::Start(u64::from(offset)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_image_reads() {
        let mut image = MemoryImage::new((0u8..=255).collect()).unwrap();
        let mut buf = [0u8; 4];
        image.read_at(252, &mut buf).unwrap();
        assert_eq!(buf, [252, 253, 254, 255]);
        assert!(image.read_at(253, &mut buf).is_err());
        assert!(!image.is_empty());
    }

    #[test]
    fn test_file_image_reads() {
        let path = std::env::temp_dir().join(format!("btbridge-image-{}.bin", std::process::id()));
        {
            let mut file = File::create(&path).unwrap();
            file.write_all(&[1, 2, 3, 4, 5, 6]).unwrap();
        }
        let mut image = FileImage::open(&path).unwrap();
        assert_eq!(image.len(), 6);
        let mut buf = [0u8; 3];
        image.read_at(3, &mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6]);
        assert!(image.read_at(4, &mut buf).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
