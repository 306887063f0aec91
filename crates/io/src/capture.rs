//! Capture files: concatenated plaintext frames, optionally gzip-wrapped.
//!
//! There is no header, footer or length prefix. The reader is told the frame
//! size up front and hands out one buffer per frame until the stream ends.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use flate2::bufread::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("unable to open {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Lazy frame iterator over one capture file.
///
/// Clean end of file and a short trailing frame both end the iteration. A read
/// error is yielded once and ends it too.
pub struct CaptureReader {
    inner: Box<dyn Read + Send>,
    path: PathBuf,
    frame_size: usize,
    compressed: bool,
    frames: u64,
    done: bool,
}

impl CaptureReader {
    pub fn open(path: impl AsRef<Path>, frame_size: usize) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|source| CaptureError::Open { path: path.to_path_buf(), source })?;
        Self::from_reader(BufReader::new(file), frame_size, path)
    }

    /// Wraps any buffered source; `origin` only labels errors and logs.
    pub fn from_reader<R>(mut reader: R, frame_size: usize, origin: &Path) -> Result<Self, CaptureError>
    where
        R: BufRead + Send + 'static,
    {
        let head = reader
            .fill_buf()
            .map_err(|source| CaptureError::Read { path: origin.to_path_buf(), source })?;
        let compressed = head.starts_with(&GZIP_MAGIC);
        let inner: Box<dyn Read + Send> = if compressed {
            Box::new(MultiGzDecoder::new(reader))
        } else {
            Box::new(reader)
        };
        debug!(path = %origin.display(), compressed, frame_size, "capture opened");
        Ok(Self {
            inner,
            path: origin.to_path_buf(),
            frame_size,
            compressed,
            frames: 0,
            done: false,
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Frames handed out so far.
    pub fn frames_read(&self) -> u64 {
        self.frames
    }
}

impl Iterator for CaptureReader {
    type Item = Result<Bytes, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.frame_size == 0 {
            return None;
        }
        let mut frame = BytesMut::zeroed(self.frame_size);
        let mut filled = 0;
        while filled < self.frame_size {
            match self.inner.read(&mut frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.done = true;
                    return Some(Err(CaptureError::Read { path: self.path.clone(), source }));
                }
            }
        }
        if filled < self.frame_size {
            self.done = true;
            if filled > 0 {
                debug!(path = %self.path.display(), trailing = filled, "ignoring short trailing frame");
            }
            return None;
        }
        self.frames += 1;
        Some(Ok(frame.freeze()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Plain,
    Gzip,
}

impl CaptureFormat {
    /// `.gz` files are written compressed, everything else raw.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => CaptureFormat::Gzip,
            _ => CaptureFormat::Plain,
        }
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

/// Records plaintext frames in the format [`CaptureReader`] reads back.
pub struct CaptureWriter {
    sink: Sink,
    path: PathBuf,
    frames: u64,
}

impl CaptureWriter {
    pub fn create(path: impl AsRef<Path>, format: CaptureFormat) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|source| CaptureError::Open { path: path.to_path_buf(), source })?;
        let out = BufWriter::new(file);
        let sink = match format {
            CaptureFormat::Plain => Sink::Plain(out),
            CaptureFormat::Gzip => Sink::Gzip(GzEncoder::new(out, Compression::default())),
        };
        Ok(Self { sink, path: path.to_path_buf(), frames: 0 })
    }

    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), CaptureError> {
        let res = match &mut self.sink {
            Sink::Plain(w) => w.write_all(frame),
            Sink::Gzip(w) => w.write_all(frame),
        };
        res.map_err(|source| CaptureError::Write { path: self.path.clone(), source })?;
        self.frames += 1;
        Ok(())
    }

    /// Flushes (and for gzip, writes the trailer). Returns the frame count.
    pub fn finish(self) -> Result<u64, CaptureError> {
        let res = match self.sink {
            Sink::Plain(mut w) => w.flush(),
            Sink::Gzip(w) => w.finish().and_then(|mut inner| inner.flush()),
        };
        res.map_err(|source| CaptureError::Write { path: self.path.clone(), source })?;
        debug!(path = %self.path.display(), frames = self.frames, "capture closed");
        Ok(self.frames)
    }
}
