//! Uploaded documents, checked before anything reaches the artifact store.

use itrack_core::PipelineError;
use itrack_settings::PipelineSettings;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

/// Size and type limits for uploads.
#[derive(Clone, Debug)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl UploadPolicy {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_bytes: settings.max_artifact_bytes,
            allowed_types: settings.allowed_artifact_types.clone(),
        }
    }

    pub fn check(&self, upload: &Upload) -> Result<(), PipelineError> {
        if upload.bytes.is_empty() {
            return Err(PipelineError::Validation(format!(
                "{} is empty",
                display_name(upload)
            )));
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(PipelineError::Validation(format!(
                "{} exceeds the {} byte limit",
                display_name(upload),
                self.max_bytes
            )));
        }
        let mime = upload.mime_type.trim().to_ascii_lowercase();
        if !self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(&mime)) {
            return Err(PipelineError::Validation(format!(
                "file type {mime} is not allowed"
            )));
        }
        Ok(())
    }
}

fn display_name(upload: &Upload) -> &str {
    if upload.file_name.trim().is_empty() {
        "upload"
    } else {
        upload.file_name.as_str()
    }
}
