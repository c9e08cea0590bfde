use anyhow::{Context, Result};
use baton::models::file::UploadedFile;
use std::fs;
use std::path::Path;

/// MIME type from the file extension, `application/octet-stream` when unknown
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub fn read_file(path: &Path) -> Result<UploadedFile> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(name, guess_mime_type(path), bytes))
}

pub fn read_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<UploadedFile>> {
    paths.iter().map(|path| read_file(path.as_ref())).collect()
}
