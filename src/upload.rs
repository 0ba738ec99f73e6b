//! Multipart uploads.
//!
//! An [`UploadRequest`] wraps an ordinary [`RequestDescriptor`] and attaches a
//! [`MultipartForm`]. The form travels through the same retry, refresh and
//! interceptor pipeline as any call; the reqwest transport rebuilds a
//! `reqwest::multipart::Form` from it on every attempt, since a built form
//! cannot be cloned.

use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;

use crate::error::NetworkError;
use crate::types::{RequestDescriptor, Response};

/// One file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub data: Bytes,
    /// Form field name.
    pub name: String,
    pub file_name: String,
    pub mime_type: String,
}

impl UploadFile {
    pub fn new(
        data: impl Into<Bytes>,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
        }
    }

    /// JPEG image under the `image` field.
    pub fn image(data: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Self::new(data, "image", file_name, "image/jpeg")
    }

    /// Arbitrary file under the `file` field, content type guessed from the name.
    pub fn file(data: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let mime_type = guess_mime(&file_name);
        Self::new(data, "file", file_name, mime_type)
    }

    /// Read a file from disk under the `file` field.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, NetworkError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| NetworkError::Io(format!("failed to read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::file(data, file_name))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }
}

fn guess_mime(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Text fields and file parts of a `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub fields: BTreeMap<String, String>,
    pub files: Vec<UploadFile>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject content types that do not parse as a MIME type.
    pub fn validate(&self) -> Result<(), NetworkError> {
        for file in &self.files {
            file.mime_type
                .parse::<mime_guess::mime::Mime>()
                .map_err(|e| {
                    NetworkError::Configuration(format!(
                        "invalid content type {:?} for part {:?}: {e}",
                        file.mime_type, file.name
                    ))
                })?;
        }
        Ok(())
    }

    /// Field values plus file contents, excluding multipart framing.
    pub fn payload_len(&self) -> u64 {
        let fields: usize = self.fields.values().map(String::len).sum();
        let files: usize = self.files.iter().map(|f| f.data.len()).sum();
        (fields + files) as u64
    }

    /// Build a fresh `reqwest` form: fields first, then files.
    pub fn to_reqwest_form(&self) -> Result<reqwest::multipart::Form, reqwest::Error> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        for file in &self.files {
            let part = reqwest::multipart::Part::bytes(file.data.to_vec())
                .file_name(file.file_name.clone())
                .mime_str(&file.mime_type)?;
            form = form.part(file.name.clone(), part);
        }
        Ok(form)
    }
}

/// A call whose body is a multipart form.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub descriptor: RequestDescriptor,
    pub form: MultipartForm,
}

impl UploadRequest {
    /// `POST` with auth required.
    pub fn new(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::from_descriptor(RequestDescriptor::post(domain_key, path).requires_auth(true))
    }

    pub fn from_descriptor(descriptor: RequestDescriptor) -> Self {
        Self {
            descriptor,
            form: MultipartForm::new(),
        }
    }

    pub fn with_file(mut self, file: UploadFile) -> Self {
        self.form.files.push(file);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.fields.insert(name.into(), value.into());
        self
    }

    /// The descriptor actually sent. Any caller-set content type is dropped;
    /// the transport sets the multipart one with its boundary.
    pub fn into_descriptor(self) -> Result<RequestDescriptor, NetworkError> {
        self.form.validate()?;
        let mut descriptor = self.descriptor;
        descriptor
            .headers
            .retain(|k, _| !k.eq_ignore_ascii_case("content-type"));
        Ok(descriptor.with_multipart(self.form))
    }
}

/// Decoded response of an upload.
#[derive(Debug, Clone)]
pub struct UploadResponse<T> {
    pub response: Response<T>,
    /// Field and file bytes sent, excluding multipart framing.
    pub total_bytes_sent: u64,
}
