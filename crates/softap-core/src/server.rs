//! Static file server.
//!
//! Resolves a request URI to a file under the content root, picks a content
//! type from the extension, and streams the file in fixed-size chunks.
//!
//! The server holds no mutable state: the buffer and the file handle live on
//! the stack of one `handle` call, so concurrent requests never interfere.

use std::io::{self, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ServeError;
use crate::mime;
use crate::platform::{FileSystem, RequestHandler, ResponseSink};

/// Size of the transfer buffer and upper bound of every data chunk.
pub const CHUNK_SIZE: usize = 1024;

/// URI served for a request to `/`.
pub const INDEX_URI: &str = "/index.html";

/// Map a request URI to a filesystem path under `content_root`.
///
/// `/` is rewritten to [`INDEX_URI`]; every other URI is appended verbatim.
/// `..` segments are not normalized here, so confinement to the content root
/// depends on the filesystem (SPIFFS has a flat namespace and no parent
/// directories).
pub fn resolve_path(content_root: &str, uri: &str) -> String {
    let uri = if uri == "/" { INDEX_URI } else { uri };
    format!("{content_root}{uri}")
}

/// Serves files from a mounted filesystem.
pub struct StaticFileServer<F> {
    fs: Arc<F>,
    content_root: String,
}

impl<F: FileSystem> StaticFileServer<F> {
    pub fn new(fs: Arc<F>, content_root: impl Into<String>) -> Self {
        Self {
            fs,
            content_root: content_root.into(),
        }
    }

    pub fn content_root(&self) -> &str {
        &self.content_root
    }

    pub fn filesystem(&self) -> &Arc<F> {
        &self.fs
    }

    /// Serve `uri` into `sink`.
    ///
    /// On a missing file nothing is written to the sink. Otherwise the
    /// content type is set, the file is sent as data chunks of at most
    /// [`CHUNK_SIZE`] bytes, and one empty chunk terminates the body.
    pub fn serve(&self, uri: &str, sink: &mut dyn ResponseSink) -> Result<u64, ServeError> {
        debug!(uri, "static file request");

        let path = resolve_path(&self.content_root, uri);
        let content_type = mime::content_type_for(&path);

        let file = match self.fs.open(&path) {
            Ok(file) => file,
            Err(source) => {
                warn!(%path, error = %source, "cannot open file");
                return Err(ServeError::NotFound { path, source });
            }
        };

        sink.set_content_type(content_type)?;
        let sent = stream_chunks(file, sink)?;

        debug!(%path, content_type, bytes = sent, "file served");
        Ok(sent)
    }
}

impl<F: FileSystem> RequestHandler for StaticFileServer<F> {
    fn handle(&self, uri: &str, sink: &mut dyn ResponseSink) -> Result<(), ServeError> {
        self.serve(uri, sink).map(|_| ())
    }
}

/// Copy `file` into `sink` chunk by chunk, then send the terminal chunk.
///
/// Takes the file by value so it is dropped (closed) on every return path.
/// Returns the number of body bytes sent.
pub fn stream_chunks<R: Read>(mut file: R, sink: &mut dyn ResponseSink) -> Result<u64, ServeError> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut sent = 0u64;

    loop {
        let n = read_full(&mut file, &mut buf).map_err(ServeError::Read)?;
        if n > 0 {
            sink.send_chunk(&buf[..n])?;
            sent += n as u64;
        }
        if n < CHUNK_SIZE {
            break;
        }
    }

    sink.send_chunk(&[])?;
    Ok(sent)
}

/// Fill `buf` as far as the reader allows. A short count means end of file.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
