//! Archive extraction policy
//!
//! Zip archives are unpacked in-process. 7z and RAR archives go through
//! optional external tools found by [`ToolLocator`]; their absence is reported
//! as [`DownloadError::MissingExtractionCapability`] rather than a generic
//! extraction failure.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::downloader::core::{DownloadError, FileOperation, Result};
use crate::install::safety::normalize_lexically;
use crate::install::tools::{ExtractionTool, ToolLocator};

/// 7-Zip prints this when a RAR entry uses a method it cannot decode
const UNSUPPORTED_METHOD_MARKER: &str = "unsupported method";

/// Supported archive families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    SevenZip,
    Rar,
    Unknown,
}

impl ArchiveKind {
    /// Detect from the leading bytes of the file
    pub fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
            Some(ArchiveKind::Zip)
        } else if header.starts_with(&[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C]) {
            Some(ArchiveKind::SevenZip)
        } else if header.starts_with(b"Rar!\x1A\x07") {
            Some(ArchiveKind::Rar)
        } else {
            None
        }
    }

    /// Detect from the file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

        match ext.as_deref() {
            Some("zip") => ArchiveKind::Zip,
            Some("7z") => ArchiveKind::SevenZip,
            Some("rar") => ArchiveKind::Rar,
            _ => ArchiveKind::Unknown,
        }
    }

    /// Content first, extension second
    pub fn detect(path: &Path) -> Self {
        let mut header = [0u8; 8];
        let read = File::open(path).and_then(|mut file| file.read(&mut header));
        match read {
            Ok(n) => Self::from_magic(&header[..n]).unwrap_or_else(|| Self::from_path(path)),
            Err(e) => {
                debug!("Could not sniff {}: {}", path.display(), e);
                Self::from_path(path)
            }
        }
    }
}

/// Captured result of running an external tool
#[derive(Debug)]
struct ToolRun {
    success: bool,
    output: String,
}

/// Dispatches archives to the right extraction capability
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    tools: ToolLocator,
}

impl ArchiveExtractor {
    pub fn new(tools: ToolLocator) -> Self {
        Self { tools }
    }

    /// Extract `archive` into the existing directory `dest`
    ///
    /// Returns the detected kind. Unknown formats are attempted as zip.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<ArchiveKind> {
        let kind = ArchiveKind::detect(archive);
        debug!("Extracting {} as {:?} into {}", archive.display(), kind, dest.display());

        match kind {
            ArchiveKind::Zip | ArchiveKind::Unknown => {
                let archive = archive.to_path_buf();
                let dest = dest.to_path_buf();
                tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
                    .await
                    .map_err(|e| DownloadError::TaskFailed {
                        reason: format!("zip extraction task: {}", e),
                    })??;
            }
            ArchiveKind::SevenZip => self.extract_7z(archive, dest).await?,
            ArchiveKind::Rar => self.extract_rar(archive, dest).await?,
        }

        Ok(kind)
    }

    async fn extract_7z(&self, archive: &Path, dest: &Path) -> Result<()> {
        let seven_zip = self.require(ExtractionTool::SevenZip)?;
        let run = run_seven_zip(&seven_zip, archive, dest).await?;
        if run.success {
            Ok(())
        } else {
            Err(tool_failure(archive, ExtractionTool::SevenZip, &run))
        }
    }

    /// 7-Zip first; unar only when 7-Zip hits an unsupported RAR method
    async fn extract_rar(&self, archive: &Path, dest: &Path) -> Result<()> {
        let Some(seven_zip) = self.tools.locate(ExtractionTool::SevenZip) else {
            return match self.tools.locate(ExtractionTool::Unar) {
                Some(unar) => self.run_unar_checked(&unar, archive, dest).await,
                None => Err(DownloadError::MissingExtractionCapability {
                    tool: ExtractionTool::SevenZip,
                }),
            };
        };

        let run = run_seven_zip(&seven_zip, archive, dest).await?;
        if run.success {
            return Ok(());
        }

        if !run.output.to_ascii_lowercase().contains(UNSUPPORTED_METHOD_MARKER) {
            return Err(tool_failure(archive, ExtractionTool::SevenZip, &run));
        }

        warn!("7-Zip cannot decode {}, falling back to unar", archive.display());
        let unar = self.require(ExtractionTool::Unar)?;
        clear_dir(dest)?;
        self.run_unar_checked(&unar, archive, dest).await
    }

    async fn run_unar_checked(&self, unar: &Path, archive: &Path, dest: &Path) -> Result<()> {
        let mut command = Command::new(unar);
        command
            .arg("-o")
            .arg(dest)
            .arg("-f")
            .arg("-D")
            .arg(archive);
        let run = run_tool(command, ExtractionTool::Unar, archive).await?;
        if run.success {
            Ok(())
        } else {
            Err(tool_failure(archive, ExtractionTool::Unar, &run))
        }
    }

    fn require(&self, tool: ExtractionTool) -> Result<PathBuf> {
        self.tools
            .locate(tool)
            .ok_or(DownloadError::MissingExtractionCapability { tool })
    }
}

async fn run_seven_zip(exe: &Path, archive: &Path, dest: &Path) -> Result<ToolRun> {
    let mut command = Command::new(exe);
    command
        .arg("x")
        .arg("-y")
        .arg(format!("-o{}", dest.display()))
        .arg(archive);
    run_tool(command, ExtractionTool::SevenZip, archive).await
}

async fn run_tool(mut command: Command, tool: ExtractionTool, archive: &Path) -> Result<ToolRun> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    let output = match output {
        Ok(output) => output,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(DownloadError::MissingExtractionCapability { tool });
        }
        Err(err) => {
            return Err(DownloadError::Extraction {
                archive: archive.to_path_buf(),
                reason: format!("failed to launch {}: {}", tool, err),
            });
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(ToolRun {
        success: output.status.success(),
        output: text,
    })
}

fn tool_failure(archive: &Path, tool: ExtractionTool, run: &ToolRun) -> DownloadError {
    let detail = run
        .output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .unwrap_or("no output");
    DownloadError::Extraction {
        archive: archive.to_path_buf(),
        reason: format!("{} failed: {}", tool, detail),
    }
}

/// Remove partial output of a failed attempt before retrying with another tool
fn clear_dir(dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| DownloadError::fs(dir, FileOperation::Read, e))?;
    for entry in entries.flatten() {
        let path = entry.path();
        let removed = match entry.file_type() {
            Ok(ft) if ft.is_dir() => std::fs::remove_dir_all(&path),
            _ => std::fs::remove_file(&path),
        };
        removed.map_err(|e| DownloadError::fs(&path, FileOperation::Delete, e))?;
    }
    Ok(())
}

fn zip_error(archive: &Path, reason: impl std::fmt::Display) -> DownloadError {
    DownloadError::Extraction {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn is_symlink_mode(mode: u32) -> bool {
    mode & 0o170000 == 0o120000
}

/// Reject an entry whose path under `dest` passes through an existing symlink
///
/// Earlier entries may have planted links; writing through one would land
/// outside `dest` before the tree validator ever runs.
fn reject_linked_path(dest: &Path, relative: &Path) -> Result<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(DownloadError::PathSafetyViolation {
                    entry: relative.to_path_buf(),
                    reason: format!("archive entry is written through the symlink {}", current.display()),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => return Err(DownloadError::fs(&current, FileOperation::Metadata, e)),
        }
    }
    Ok(())
}

/// Unpack a zip archive
///
/// An entry name that is absolute or climbs out with `..` aborts the whole
/// extraction, as does an entry whose path runs through a symlink created by
/// an earlier entry. Symlink entries are recreated as symlinks on unix so the
/// tree validator sees where they point.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| zip_error(archive_path, e))?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| zip_error(archive_path, e))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| zip_error(archive_path, e))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(DownloadError::PathSafetyViolation {
                entry: PathBuf::from(entry.name()),
                reason: "archive entry path escapes the extraction root".to_string(),
            });
        };
        let relative = normalize_lexically(&relative);
        reject_linked_path(dest, &relative)?;
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| zip_error(archive_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| zip_error(archive_path, e))?;
        }

        if entry.unix_mode().is_some_and(is_symlink_mode) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .map_err(|e| zip_error(archive_path, e))?;
            write_symlink(&target, &out_path).map_err(|e| zip_error(archive_path, e))?;
            continue;
        }

        let mut out_file = File::create(&out_path).map_err(|e| zip_error(archive_path, e))?;
        std::io::copy(&mut entry, &mut out_file).map_err(|e| zip_error(archive_path, e))?;
    }

    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn write_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    debug!("Skipping symlink entry {} -> {}", link.display(), target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::tools::ToolPaths;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        let bytes = writer.finish().unwrap().into_inner();
        std::fs::write(path, bytes).unwrap();
    }

    fn no_tools() -> ArchiveExtractor {
        ArchiveExtractor::new(ToolLocator::new(ToolPaths::none()))
    }

    #[test]
    fn magic_bytes_win_over_extension() {
        let dir = tempdir().unwrap();
        let disguised = dir.path().join("mod.rar");
        write_zip(&disguised, &[("a.otr", b"x")]);
        assert_eq!(ArchiveKind::detect(&disguised), ArchiveKind::Zip);

        let seven = dir.path().join("mod.bin");
        std::fs::write(&seven, [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C, 0, 4]).unwrap();
        assert_eq!(ArchiveKind::detect(&seven), ArchiveKind::SevenZip);

        let rar = dir.path().join("mod.dat");
        std::fs::write(&rar, b"Rar!\x1A\x07\x01\x00").unwrap();
        assert_eq!(ArchiveKind::detect(&rar), ArchiveKind::Rar);
    }

    #[test]
    fn extension_used_when_content_is_unrecognised() {
        assert_eq!(ArchiveKind::from_path(Path::new("Mod.7Z")), ArchiveKind::SevenZip);
        assert_eq!(ArchiveKind::from_path(Path::new("mod.rar")), ArchiveKind::Rar);
        assert_eq!(ArchiveKind::from_path(Path::new("mod.tar")), ArchiveKind::Unknown);
    }

    #[tokio::test]
    async fn extracts_nested_zip_entries() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("CoolMod.zip");
        write_zip(&archive, &[("CoolMod.otr", b"one"), ("extras/readme.txt", b"two")]);
        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let kind = no_tools().extract(&archive, &dest).await.unwrap();

        assert_eq!(kind, ArchiveKind::Zip);
        assert_eq!(std::fs::read(dest.join("CoolMod.otr")).unwrap(), b"one");
        assert_eq!(std::fs::read(dest.join("extras/readme.txt")).unwrap(), b"two");
    }

    #[tokio::test]
    async fn zip_slip_entry_aborts_extraction() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("good.otr", b"ok"), ("../../evil.otr", b"pwned")]);
        let dest = dir.path().join("nested/out");
        std::fs::create_dir_all(&dest).unwrap();

        let err = no_tools().extract(&archive, &dest).await.unwrap_err();

        assert!(matches!(err, DownloadError::PathSafetyViolation { .. }));
        assert!(!dir.path().join("evil.otr").exists());
    }

    #[tokio::test]
    async fn seven_zip_without_tool_is_missing_capability() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("mod.7z");
        std::fs::write(&archive, [b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C, 0, 4]).unwrap();

        let err = no_tools().extract(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(
            err,
            DownloadError::MissingExtractionCapability { tool: ExtractionTool::SevenZip }
        ));
    }

    #[tokio::test]
    async fn rar_without_any_tool_names_seven_zip() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("mod.rar");
        std::fs::write(&archive, b"Rar!\x1A\x07\x01\x00").unwrap();

        let err = no_tools().extract(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(
            err,
            DownloadError::MissingExtractionCapability { tool: ExtractionTool::SevenZip }
        ));
    }

    #[tokio::test]
    async fn garbage_with_unknown_extension_is_generic_failure() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("mod.bin");
        std::fs::write(&archive, b"definitely not an archive").unwrap();

        let err = no_tools().extract(&archive, dir.path()).await.unwrap_err();

        assert!(matches!(err, DownloadError::Extraction { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn entries_behind_an_earlier_symlink_are_never_written() {
        let outside = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let archive = dir.path().join("linked.zip");

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let target = outside.path().display().to_string();
        writer.add_symlink("evil", target, SimpleFileOptions::default()).unwrap();
        writer.start_file("evil/planted.otr", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"pwned").unwrap();
        std::fs::write(&archive, writer.finish().unwrap().into_inner()).unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        let err = no_tools().extract(&archive, &dest).await.unwrap_err();

        assert!(matches!(err, DownloadError::PathSafetyViolation { .. }));
        assert!(!outside.path().join("planted.otr").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_entry_cannot_overwrite_through_a_same_named_symlink() {
        let outside = tempdir().unwrap();
        let victim = outside.path().join("victim.otr");
        std::fs::write(&victim, b"original").unwrap();
        let dir = tempdir().unwrap();
        let archive = dir.path().join("clobber.zip");

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let target = victim.display().to_string();
        writer.add_symlink("mod.otr", target, SimpleFileOptions::default()).unwrap();
        writer.start_file("./mod.otr", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"pwned").unwrap();
        std::fs::write(&archive, writer.finish().unwrap().into_inner()).unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        let err = no_tools().extract(&archive, &dest).await.unwrap_err();

        assert!(matches!(err, DownloadError::PathSafetyViolation { .. }));
        assert_eq!(std::fs::read(&victim).unwrap(), b"original");
    }

    #[cfg(unix)]
    mod fake_tools {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn rar_fixture(dir: &Path) -> PathBuf {
            let archive = dir.join("mod.rar");
            std::fs::write(&archive, b"Rar!\x1A\x07\x01\x00").unwrap();
            archive
        }

        #[tokio::test]
        async fn rar_falls_back_to_unar_on_unsupported_method() {
            let bin = tempdir().unwrap();
            let seven = script(
                bin.path(),
                "7z",
                "echo 'ERROR: Unsupported Method : CoolMod.otr' >&2\nexit 2",
            );
            let unar = script(bin.path(), "unar", "mkdir -p \"$2\" && echo data > \"$2/CoolMod.otr\"");
            let extractor = ArchiveExtractor::new(ToolLocator::new(ToolPaths {
                seven_zip: vec![seven],
                unar: vec![unar],
            }));

            let work = tempdir().unwrap();
            let archive = rar_fixture(work.path());
            let dest = work.path().join("out");
            std::fs::create_dir(&dest).unwrap();

            extractor.extract(&archive, &dest).await.unwrap();

            assert!(dest.join("CoolMod.otr").exists());
        }

        #[tokio::test]
        async fn rar_other_failures_do_not_fall_back() {
            let bin = tempdir().unwrap();
            let seven = script(bin.path(), "7z", "echo 'ERROR: Data Error' >&2\nexit 2");
            let unar = script(bin.path(), "unar", "mkdir -p \"$2\" && echo data > \"$2/CoolMod.otr\"");
            let extractor = ArchiveExtractor::new(ToolLocator::new(ToolPaths {
                seven_zip: vec![seven],
                unar: vec![unar],
            }));

            let work = tempdir().unwrap();
            let archive = rar_fixture(work.path());
            let dest = work.path().join("out");
            std::fs::create_dir(&dest).unwrap();

            let err = extractor.extract(&archive, &dest).await.unwrap_err();

            match err {
                DownloadError::Extraction { reason, .. } => assert!(reason.contains("Data Error")),
                other => panic!("expected extraction failure, got {other:?}"),
            }
            assert!(!dest.join("CoolMod.otr").exists());
        }

        #[tokio::test]
        async fn rar_goes_straight_to_unar_without_seven_zip() {
            let bin = tempdir().unwrap();
            let unar = script(bin.path(), "unar", "mkdir -p \"$2\" && echo data > \"$2/CoolMod.otr\"");
            let extractor = ArchiveExtractor::new(ToolLocator::new(ToolPaths {
                seven_zip: vec![],
                unar: vec![unar],
            }));

            let work = tempdir().unwrap();
            let archive = rar_fixture(work.path());
            let dest = work.path().join("out");
            std::fs::create_dir(&dest).unwrap();

            let kind = extractor.extract(&archive, &dest).await.unwrap();

            assert_eq!(kind, ArchiveKind::Rar);
            assert!(dest.join("CoolMod.otr").exists());
        }

        #[tokio::test]
        async fn unar_failure_without_seven_zip_is_extraction_error() {
            let bin = tempdir().unwrap();
            let unar = script(bin.path(), "unar", "echo 'Failed! (Archive parsing failed)' >&2\nexit 1");
            let extractor = ArchiveExtractor::new(ToolLocator::new(ToolPaths {
                seven_zip: vec![],
                unar: vec![unar],
            }));

            let work = tempdir().unwrap();
            let archive = rar_fixture(work.path());

            let err = extractor.extract(&archive, work.path()).await.unwrap_err();

            match err {
                DownloadError::Extraction { reason, .. } => assert!(reason.contains("Archive parsing failed")),
                other => panic!("expected extraction failure, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn unsupported_method_without_unar_names_unar() {
            let bin = tempdir().unwrap();
            let seven = script(bin.path(), "7z", "echo 'ERROR: Unsupported Method' >&2\nexit 2");
            let extractor = ArchiveExtractor::new(ToolLocator::new(ToolPaths {
                seven_zip: vec![seven],
                unar: vec![],
            }));

            let work = tempdir().unwrap();
            let archive = rar_fixture(work.path());

            let err = extractor.extract(&archive, work.path()).await.unwrap_err();

            assert!(matches!(
                err,
                DownloadError::MissingExtractionCapability { tool: ExtractionTool::Unar }
            ));
        }
    }
}
