//! 只读内存映射文件
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::ptr;

use memmap2::Mmap;
use tracing::debug;

use crate::error::{Error, Result};

/// 以只读方式映射的文件
///
/// 映射由该值独占，`close` 或 drop 时解除，且只会解除一次。
/// 空文件不建立映射，数据指针为空、长度为 0。
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    map: Option<Mmap>,
}

impl MappedFile {
    /// 打开并映射文件；可能阻塞于文件系统 I/O
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source: io::Error| Error::Io { path: path.to_path_buf(), source };

        let file = File::open(path).map_err(io_err)?;
        let meta = file.metadata().map_err(io_err)?;
        if !meta.is_file() {
            return Err(io_err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file")));
        }

        let map = if meta.len() == 0 {
            None
        } else {
            // SAFETY: 只读映射；调用方不得在映射存活期间截断该文件
            Some(
                unsafe { Mmap::map(&file) }
                    .map_err(|source| Error::Map { path: path.to_path_buf(), source })?,
            )
        };
        debug!(path = %path.display(), size = meta.len(), "file mapped");
        Ok(Self { path: path.to_path_buf(), map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 映射起始地址；空文件为空指针
    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ref().map_or(ptr::null(), |m| m.as_ptr())
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// 显式解除映射
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        // Mmap 随字段析构解除映射
        debug!(path = %self.path.display(), mapped = self.map.is_some(), "file unmapped");
    }
}
