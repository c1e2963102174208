use std::path::Path;
use walkdir::WalkDir;

use crate::errors::AppError;

pub const MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "mp3", "wav", "flac", "aac", "ogg", "m4a",
];

pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Every media file below `dir`, sorted by path.
pub fn collect_media_files(dir: &Path) -> Result<Vec<String>, AppError> {
    if !dir.is_dir() {
        return Err(AppError::NotFound(format!("folder {}", dir.display())));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("[Library] Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_media_file(path) {
            continue;
        }

        match path.to_str() {
            Some(path_str) => files.push(path_str.to_string()),
            None => log::warn!("[Library] Skipping non UTF-8 path {:?}", path),
        }
    }

    files.sort();
    log::info!("[Library] Found {} media files in {:?}", files.len(), dir);
    Ok(files)
}

/// Playlist name offered for a scanned folder.
pub fn suggest_playlist_name(dir: &Path) -> String {
    dir.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| dir.display().to_string())
}

/// File name shown for an item added by path.
pub fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("tapedeck-library-{}", uuid::Uuid::new_v4()))
            .join("Season 1");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_collect_filters_and_sorts() {
        let dir = scratch_dir();
        fs::create_dir_all(dir.join("extras")).unwrap();
        for name in ["b.MKV", "a.mp4", "notes.txt", "extras/c.flac", "cover.jpg"] {
            fs::write(dir.join(name), b"").unwrap();
        }

        let files = collect_media_files(&dir).unwrap();
        let names: Vec<String> = files.iter().map(|f| display_name(f)).collect();
        assert_eq!(names, vec!["a.mp4", "b.MKV", "c.flac"]);
        assert_eq!(suggest_playlist_name(&dir), "Season 1");

        let _ = fs::remove_dir_all(dir.parent().unwrap());
    }

    #[test]
    fn test_missing_folder() {
        let missing = std::env::temp_dir().join(format!("tapedeck-missing-{}", uuid::Uuid::new_v4()));
        assert!(matches!(
            collect_media_files(&missing),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("/videos/Pilot.mkv"), "Pilot.mkv");
        assert_eq!(display_name("Pilot.mkv"), "Pilot.mkv");
        assert!(is_media_file(Path::new("x.OGG")));
        assert!(!is_media_file(Path::new("x")));
    }
}
