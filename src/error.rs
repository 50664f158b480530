use exif::Error as ExifError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXIF error: {0}")]
    Exif(#[from] ExifError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Raised by the proposal writer when an entry would map a photo to the
    /// wrong scan. Callers must halt the batch.
    #[error("Corrupt proposal entry '{original}': {reason}")]
    CorruptProposal { original: String, reason: String },

    #[error("Invalid analysis: {0}")]
    InvalidAnalysis(String),

    #[error("ExifTool error: {0}")]
    ExifTool(String),

    #[error("Generic error: {0}")]
    Generic(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Whether the error must stop the whole batch rather than a single entry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::CorruptProposal { .. }
                | AppError::DirectoryNotFound(_)
                | AppError::Config(_)
                | AppError::Pattern(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corruption_guard_is_fatal() {
        let err = AppError::CorruptProposal {
            original: "IMG_1_b.jpg".into(),
            reason: "back scan suffix".into(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("IMG_1_b.jpg"));
    }

    #[test]
    fn collaborator_failures_are_entry_level() {
        assert!(!AppError::ExifTool("exit status 1".into()).is_fatal());
        assert!(!AppError::InvalidAnalysis("no JSON".into()).is_fatal());
    }
}
