//! File upload side channel.
//!
//! Files are posted to the chat backend over HTTP; the socket only ever
//! carries the resulting URL in a `message:file` command.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use thiserror::Error;
use ticketdesk_shared::try_error_message;

/// Largest file accepted for upload (10 MiB).
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// MIME types accepted for upload.
pub const ALLOWED_FILE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "audio/webm",
    "audio/mp3",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// A file picked by the user, fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidFile {
    #[error("{name} is too large ({size} bytes, max 10 MiB)")]
    TooLarge { name: String, size: usize },
    #[error("{name} has an unsupported type: {mime}")]
    UnsupportedType { name: String, mime: String },
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Check size and type before anything is shown or sent.
    pub fn validate(&self) -> Result<(), InvalidFile> {
        if self.size() > MAX_FILE_SIZE {
            return Err(InvalidFile::TooLarge {
                name: self.name.clone(),
                size: self.size(),
            });
        }
        if !ALLOWED_FILE_TYPES.contains(&self.mime.as_str()) {
            return Err(InvalidFile::UnsupportedType {
                name: self.name.clone(),
                mime: self.mime.clone(),
            });
        }
        Ok(())
    }
}

/// Guess a MIME type from a file extension, for the types we accept.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "webm" => "audio/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

/// Everything the upload endpoint needs besides the file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file: FileUpload,
    pub chatbot_id: String,
    pub session_id: String,
    pub client_id: String,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upload rejected ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Deserialize(String),
}

#[async_trait]
pub trait Uploader: Send + Sync + 'static {
    /// Upload a file and return the URL it is served from.
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Multipart uploader for the chat backend's upload endpoint.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: Client,
    url: String,
}

impl HttpUploader {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let UploadRequest {
            file,
            chatbot_id,
            session_id,
            client_id,
        } = request;
        tracing::debug!("uploading {} ({} bytes) to {}", file.name, file.size(), self.url);

        let part = multipart::Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.mime)
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("chatbotId", chatbot_id)
            .text("session_id", session_id)
            .text("client_id", client_id);

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| UploadError::Network(format!("failed to read body: {e}")))?;

        parse_response(status, is_success, &text)
    }
}

fn parse_response(status: u16, is_success: bool, body: &str) -> Result<String, UploadError> {
    if !is_success {
        let message = try_error_message(body).unwrap_or_else(|| format!("status {status}"));
        return Err(UploadError::Http { status, message });
    }
    let parsed: UploadResponse =
        serde_json::from_str(body).map_err(|e| UploadError::Deserialize(e.to_string()))?;
    Ok(parsed.url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_file() {
        let file = FileUpload::new("cat.png", "image/png", vec![0; 1024]);
        assert_eq!(file.validate(), Ok(()));
    }

    #[test]
    fn rejects_oversized_file() {
        let file = FileUpload::new("big.pdf", "application/pdf", vec![0; MAX_FILE_SIZE + 1]);
        assert!(matches!(file.validate(), Err(InvalidFile::TooLarge { .. })));

        let exact = FileUpload::new("ok.pdf", "application/pdf", vec![0; MAX_FILE_SIZE]);
        assert_eq!(exact.validate(), Ok(()));
    }

    #[test]
    fn rejects_unknown_type() {
        let file = FileUpload::new("run.exe", "application/x-msdownload", vec![1, 2, 3]);
        assert_eq!(
            file.validate(),
            Err(InvalidFile::UnsupportedType {
                name: "run.exe".into(),
                mime: "application/x-msdownload".into()
            })
        );
    }

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a/b/photo.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("notes.txt")), Some("text/plain"));
        assert_eq!(mime_for_path(Path::new("archive.zip")), None);
        assert_eq!(mime_for_path(Path::new("README")), None);
    }

    #[test]
    fn success_body_yields_url() {
        let url = parse_response(200, true, r#"{"url":"https://cdn.example.com/f/1.png"}"#);
        assert_eq!(url.unwrap(), "https://cdn.example.com/f/1.png");
    }

    #[test]
    fn error_body_message_is_surfaced() {
        match parse_response(413, false, r#"{"message":"File too large"}"#) {
            Err(UploadError::Http { status, message }) => {
                assert_eq!(status, 413);
                assert_eq!(message, "File too large");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            parse_response(502, false, "<html>bad gateway</html>"),
            Err(UploadError::Http { status: 502, .. })
        ));
    }

    #[test]
    fn malformed_success_body_is_an_error() {
        assert!(matches!(
            parse_response(200, true, "ok"),
            Err(UploadError::Deserialize(_))
        ));
    }
}
