// ============================================================================
// FILE I/O — native dialogs and byte-level helpers
// ============================================================================

use rfd::FileDialog;
use std::path::{Path, PathBuf};

/// Extensions the source-image picker offers. The submission path accepts
/// PNG and JPEG only, so the picker does not offer more.
const SOURCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Native open dialog for the source photo.
pub fn pick_source_image() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", SOURCE_EXTENSIONS)
        .set_title("Open photo")
        .pick_file()
}

/// Native save dialog for the inpainted result; returns the chosen path.
pub fn pick_result_path() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("PNG image", &["png"])
        .set_file_name("inpainted.png")
        .set_title("Save result")
        .save_file()
}

/// Read a file, refusing anything over `max_mb` before it reaches the
/// decoder.
pub fn read_file_capped(path: &Path, max_mb: u64) -> Result<Vec<u8>, String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    if meta.len() > max_mb * 1024 * 1024 {
        return Err(format!(
            "{} is {:.1} MB, over the {} MB limit",
            path.display(),
            meta.len() as f64 / (1024.0 * 1024.0),
            max_mb
        ));
    }
    std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Write result bytes, creating parent directories as needed.
pub fn write_result(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| format!("{}: {}", parent.display(), e))?;
        }
    }
    std::fs::write(path, bytes).map_err(|e| format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_cap_is_enforced() {
        let dir = std::env::temp_dir().join("inpaintfe-io-cap-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("big.bin");
        std::fs::write(&path, vec![0u8; 2 * 1024 * 1024]).unwrap();

        assert!(read_file_capped(&path, 1).is_err());
        assert_eq!(read_file_capped(&path, 3).unwrap().len(), 2 * 1024 * 1024);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn write_result_creates_parent_dirs() {
        let dir = std::env::temp_dir().join("inpaintfe-io-write-test").join("nested");
        let path = dir.join("out.png");
        write_result(&path, b"data").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        let _ = std::fs::remove_dir_all(std::env::temp_dir().join("inpaintfe-io-write-test"));
    }
}
