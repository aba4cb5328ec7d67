//! Request bodies that can be replayed
//!
//! `reqwest::multipart::Form` is consumed on send, so forms are described
//! here and turned into a fresh reqwest form for every attempt.

use super::ClientError;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Serialize;

/// Body of an outbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Bytes),
    Multipart(MultipartForm),
}

impl RequestBody {
    /// JSON-encode `body`, or send nothing when it is absent
    pub fn json<B: Serialize + ?Sized>(body: Option<&B>) -> Result<Self, ClientError> {
        match body {
            Some(body) => Ok(Self::Json(Bytes::from(serde_json::to_vec(body)?))),
            None => Ok(Self::Empty),
        }
    }

    pub const fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

/// A file to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Set the MIME type sent with the file part
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One named field of a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, attachment: Attachment },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// Ordered description of a multipart form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(FormPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Append a file field
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.parts.push(FormPart::File {
            name: name.into(),
            attachment,
        });
        self
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|part| part.name() == name)
    }

    /// Text value of the first field called `name`
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub(crate) fn to_form(&self) -> Result<Form, ClientError> {
        let mut form = Form::new();
        for part in &self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
                FormPart::File { name, attachment } => {
                    let mut file = Part::bytes(attachment.bytes.to_vec())
                        .file_name(attachment.file_name.clone());
                    if let Some(content_type) = &attachment.content_type {
                        file = file.mime_str(content_type).map_err(|e| {
                            ClientError::Configuration(format!(
                                "invalid content type {content_type}: {e}"
                            ))
                        })?;
                    }
                    form.part(name.clone(), file)
                }
            };
        }
        Ok(form)
    }
}
