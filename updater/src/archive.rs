//! 아카이브 설치 (zip 전용)

use crate::UpdaterError;
use std::path::{Path, PathBuf};

/// `archive`를 `destination` 디렉터리에 풀어 기존 파일을 덮어쓴다.
///
/// 압축 해제는 블로킹 스레드에서 돌려 호출 측 진행률 보고를 막지 않는다.
pub async fn unpack(archive: &Path, destination: &Path) -> Result<(), UpdaterError> {
    if !archive.is_file() {
        return Err(UpdaterError::InvalidPath {
            path: archive.display().to_string(),
            message: "The compressed item must be a local file path.".to_string(),
        });
    }
    if destination.is_file() {
        return Err(UpdaterError::InvalidPath {
            path: destination.display().to_string(),
            message: "The destination must be a local directory path.".to_string(),
        });
    }

    let is_zip = archive
        .extension()
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if !is_zip {
        return Err(UpdaterError::UnsupportedArchive {
            path: archive.display().to_string(),
        });
    }

    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|e| UpdaterError::from_io(&e, "create destination", destination))?;

    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    tracing::info!("[Archive] Extracting {} → {}", archive.display(), destination.display());

    tokio::task::spawn_blocking(move || extract_zip(&archive, &destination))
        .await
        .map_err(|e| UpdaterError::FileSystemError {
            operation: "extract".to_string(),
            path: String::new(),
            message: format!("extraction task failed: {}", e),
        })?
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<(), UpdaterError> {
    let zip_err = |e: zip::result::ZipError| UpdaterError::FileSystemError {
        operation: "read zip".to_string(),
        path: archive_path.display().to_string(),
        message: e.to_string(),
    };

    let file = std::fs::File::open(archive_path)
        .map_err(|e| UpdaterError::from_io(&e, "open archive", archive_path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(zip_err)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_err)?;
        // 대상 디렉터리를 벗어나는 엔트리는 건너뛴다
        let Some(relative) = entry.enclosed_name().map(PathBuf::from) else {
            tracing::warn!("[Archive] Skipping unsafe entry: {}", entry.name());
            continue;
        };
        let out_path = destination.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| UpdaterError::from_io(&e, "create directory", &out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| UpdaterError::from_io(&e, "create directory", parent))?;
        }
        let mut outfile = std::fs::File::create(&out_path)
            .map_err(|e| UpdaterError::from_io(&e, "create file", &out_path))?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| UpdaterError::from_io(&e, "write file", &out_path))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                .map_err(|e| UpdaterError::from_io(&e, "set permissions", &out_path))?;
        }
    }

    Ok(())
}
