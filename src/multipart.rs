use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;

use crate::error::ApiError;
use crate::media::{MediaError, Upload};

/// Text fields larger than this are rejected outright.
const TEXT_FIELD_LIMIT: usize = 1024;

/// A fully buffered multipart form: file parts in arrival order plus
/// plain text fields.
#[derive(Debug, Default)]
pub struct Form {
    files: Vec<(String, Upload)>,
    texts: Vec<(String, String)>,
}

impl Form {
    /// Reads every part. A file part exceeding `max_file_bytes` stops the
    /// read with `TooLarge` without buffering the rest of it.
    pub async fn read(mut payload: Multipart, max_file_bytes: usize) -> Result<Self, ApiError> {
        let mut form = Form::default();
        while let Some(mut field) = payload.try_next().await.map_err(|e| {
            log::warn!("multipart error: {e}");
            ApiError::bad_request("Malformed multipart body")
        })? {
            let disposition = field.content_disposition();
            let Some(name) = disposition.get_name().map(str::to_string) else { continue };
            let file_name = disposition.get_filename().map(str::to_string);
            let declared_mime = field.content_type().map(|m| m.essence_str().to_string());

            let limit = if file_name.is_some() { max_file_bytes } else { TEXT_FIELD_LIMIT };
            let mut bytes: Vec<u8> = Vec::new();
            while let Some(chunk) = field.try_next().await.map_err(|e| {
                log::warn!("multipart stream read error: {e}");
                ApiError::bad_request("Malformed multipart body")
            })? {
                if bytes.len() + chunk.len() > limit {
                    return Err(match file_name {
                        Some(_) => MediaError::TooLarge { max_bytes: limit }.into(),
                        None => ApiError::bad_request(format!("Field '{name}' is too long")),
                    });
                }
                bytes.extend_from_slice(&chunk);
            }

            match file_name {
                Some(file_name) => form.files.push((name, Upload { file_name, declared_mime, bytes })),
                None => {
                    let text = String::from_utf8(bytes)
                        .map_err(|_| ApiError::bad_request(format!("Field '{name}' is not valid UTF-8")))?;
                    form.texts.push((name, text));
                }
            }
        }
        Ok(form)
    }

    /// All files sent under `name`, in order.
    pub fn files(&self, name: &str) -> Vec<&Upload> {
        self.files.iter().filter(|(n, _)| n == name).map(|(_, u)| u).collect()
    }

    pub fn file(&self, name: &str) -> Option<&Upload> {
        self.files.iter().find(|(n, _)| n == name).map(|(_, u)| u)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.iter().find(|(n, _)| n == name).map(|(_, t)| t.trim())
    }

    /// Numeric text field; missing or unparsable values yield `default`.
    pub fn number<T: std::str::FromStr>(&self, name: &str, default: T) -> T {
        self.text(name).and_then(|t| t.parse().ok()).unwrap_or(default)
    }
}
