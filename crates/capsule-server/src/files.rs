//! Static file serving.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use capsule_core::{DocumentBuilder, ResponseWriter, Status, WriteError, DEFAULT_MIME_TYPE};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::{Handler, Request};

const FILE_CHUNK: usize = 16 * 1024;

// Characters escaped when emitting directory-listing links.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%');

/// Serves a directory tree as Gemini content.
///
/// Requests map onto files under the root. A directory is redirected to its
/// trailing-slash form, then served from its `index.gmi` if one exists,
/// otherwise as a generated listing. Paths containing `..` are refused
/// outright.
pub struct FileSystemHandler {
    root: PathBuf,
}

impl FileSystemHandler {
    pub fn new(root: impl Into<PathBuf>) -> FileSystemHandler {
        FileSystemHandler { root: root.into() }
    }

    async fn serve_file(
        &self,
        w: &mut ResponseWriter,
        path: &Path,
    ) -> Result<(), WriteError> {
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(err) => {
                warn!(
                    target: "capsule::files",
                    path = %path.display(),
                    reason = %err,
                    "file open failed"
                );
                return w.set_header(Status::TEMPORARY_FAILURE, "file open failed").await;
            }
        };
        w.set_header(Status::SUCCESS, &mime_for(path)).await?;
        let mut buf = vec![0u8; FILE_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            w.write(&buf[..n]).await?;
        }
    }

    async fn serve_listing(
        &self,
        w: &mut ResponseWriter,
        url_path: &str,
        dir: &Path,
    ) -> Result<(), WriteError> {
        let mut entries = Vec::new();
        let mut reader = match fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(err) => {
                warn!(
                    target: "capsule::files",
                    path = %dir.display(),
                    reason = %err,
                    "readdir failed"
                );
                return w.set_header(Status::TEMPORARY_FAILURE, "readdir failed").await;
            }
        };
        loop {
            match reader.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|file_type| file_type.is_dir())
                        .unwrap_or(false);
                    entries.push((name, is_dir));
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        target: "capsule::files",
                        path = %dir.display(),
                        reason = %err,
                        "readdir failed"
                    );
                    return w.set_header(Status::TEMPORARY_FAILURE, "readdir failed").await;
                }
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut doc = DocumentBuilder::new();
        doc.h1(&format!("Index of {url_path}"));
        doc.line("");
        doc.link("../");
        for (name, is_dir) in entries {
            let mut link = utf8_percent_encode(&name, PATH_SEGMENT).to_string();
            if is_dir {
                link.push('/');
            }
            doc.link(&link);
        }
        w.set_header(Status::SUCCESS, DEFAULT_MIME_TYPE).await?;
        w.write(doc.build().as_bytes()).await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for FileSystemHandler {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError> {
        let raw_path = r.url.path();
        // Refuse anything that even looks like a traversal attempt.
        if raw_path.contains("..") {
            return w.set_header(Status::BAD_REQUEST, "").await;
        }
        let decoded = match percent_decode_str(raw_path).decode_utf8() {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => return w.set_header(Status::BAD_REQUEST, "request malformed").await,
        };
        if decoded.contains("..") {
            return w.set_header(Status::BAD_REQUEST, "").await;
        }
        let url_path = if decoded.starts_with('/') {
            decoded
        } else {
            format!("/{decoded}")
        };

        let full = self.root.join(url_path.trim_start_matches('/'));
        let metadata = match fs::metadata(&full).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(
                    target: "capsule::files",
                    path = %url_path,
                    url = %r.url,
                    reason = %err,
                    "file open failed"
                );
                return w.set_header(Status::TEMPORARY_FAILURE, "file open failed").await;
            }
        };

        if !metadata.is_dir() {
            return self.serve_file(w, &full).await;
        }

        // Directories are canonically addressed with a trailing slash so
        // relative links inside them resolve.
        if !url_path.ends_with('/') {
            return w
                .set_header(Status::REDIRECT_PERMANENT, &format!("{url_path}/"))
                .await;
        }
        let index = full.join("index.gmi");
        match fs::metadata(&index).await {
            Ok(_) => self.serve_file(w, &index).await,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.serve_listing(w, &url_path, &full).await
            }
            Err(err) => {
                warn!(
                    target: "capsule::files",
                    path = %url_path,
                    reason = %err,
                    "file stat failed"
                );
                w.set_header(Status::TEMPORARY_FAILURE, "file stat failed").await
            }
        }
    }
}

fn mime_for(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("gmi") | Some("gemini") => DEFAULT_MIME_TYPE.to_string(),
        _ => mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
    }
}
