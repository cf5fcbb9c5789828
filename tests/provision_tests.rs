//! End-to-end provisioning scenarios against a real temp install directory.

use std::cell::RefCell;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use vrx_provision::config::{ExtractionMode, ProvisionConfig};
use vrx_provision::install::{
    Exit, InstallationManager, Invocation, MemoryBundle, ProcessRunner, ProvisionError, Result,
};

/// Records every invocation and reports success without running anything.
#[derive(Default)]
struct Recorder {
    calls: RefCell<Vec<(bool, Invocation)>>,
}

impl Recorder {
    fn programs(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|(_, inv)| {
                let mut words = vec![inv.program.to_string_lossy().into_owned()];
                words.extend(inv.args.iter().map(|a| a.to_string_lossy().into_owned()));
                words.join(" ")
            })
            .collect()
    }
}

impl ProcessRunner for Recorder {
    fn run(&self, inv: &Invocation) -> Result<Exit> {
        self.calls.borrow_mut().push((false, inv.clone()));
        Ok(Exit::Code(0))
    }

    fn spawn_detached(&self, inv: &Invocation) -> Result<()> {
        self.calls.borrow_mut().push((true, inv.clone()));
        Ok(())
    }
}

const SHIM: &[u8] = b"#!/bin/sh\nexec \"$@\"\n";

fn binary_zip() -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    zip.add_directory("lib/", options).unwrap();
    zip.start_file("lib/libc.so", options).unwrap();
    zip.write_all(b"not really a libc").unwrap();
    zip.start_file("busybox", options).unwrap();
    zip.write_all(SHIM).unwrap();
    zip.finish().unwrap().into_inner()
}

fn resource_tgz() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let files: &[(&str, &[u8])] = &[
        ("usr/share/X11/xkb/rules/base", b"rules"),
        ("usr/bin/xkbcomp", b"#!/bin/sh\n"),
        ("usr/bin/xhost", b"#!/bin/sh\n"),
        ("usr/bin/xli", b"#!/bin/sh\n"),
        ("usr/bin/xsel", b"#!/bin/sh\n"),
    ];
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn full_bundle() -> MemoryBundle {
    MemoryBundle::new()
        .with("binaries-armeabi-v7a.zip", binary_zip())
        .with("data-1.tgz", resource_tgz())
}

fn config_for(dir: &Path, extraction: ExtractionMode) -> ProvisionConfig {
    let mut config = ProvisionConfig {
        install_dir: dir.to_path_buf(),
        ..ProvisionConfig::default()
    };
    config.resources.extraction = extraction;
    config
}

#[test]
fn test_first_run_builtin_then_idempotent() {
    let temp = TempDir::new().unwrap();
    let config = config_for(temp.path(), ExtractionMode::Builtin);
    let recorder = Recorder::default();
    let manager = InstallationManager::with_runner(&config, full_bundle(), &recorder);

    let first = manager.try_verify().unwrap();
    assert_eq!(first.binaries_extracted, Some(3));
    assert!(first.resources_extracted);
    assert_eq!(first.permission_fixups, 5);
    assert!(temp.path().join("busybox").is_file());
    assert_eq!(fs::read(temp.path().join("lib/libc.so")).unwrap(), b"not really a libc");
    assert!(temp.path().join("usr/share/X11").is_dir());
    assert!(temp.path().join("data-1.tgz").is_file());

    // Second run: nothing extracted, primary fix-up still issued.
    recorder.calls.borrow_mut().clear();
    let second = manager.try_verify().unwrap();
    assert_eq!(second.binaries_extracted, None);
    assert!(!second.resources_extracted);
    assert_eq!(recorder.programs().len(), 1);
}

#[test]
fn test_invocation_shape() {
    let temp = TempDir::new().unwrap();
    let config = config_for(temp.path(), ExtractionMode::Wait);
    let recorder = Recorder::default();
    let manager = InstallationManager::with_runner(&config, full_bundle(), &recorder);

    let x11 = temp.path().join("usr/share/X11");
    assert!(manager.verify_installation());
    assert!(!x11.exists());

    let dir = temp.path().display().to_string();
    assert_eq!(
        recorder.programs(),
        vec![
            format!("chmod 0755 {dir}/busybox"),
            format!("{dir}/busybox tar -xf data-1.tgz"),
            format!("chmod 0755 {dir}/usr/bin/xkbcomp"),
            format!("chmod 0755 {dir}/usr/bin/xhost"),
            format!("chmod 0755 {dir}/usr/bin/xli"),
            format!("chmod 0755 {dir}/usr/bin/xsel"),
        ]
    );
    for (detached, inv) in recorder.calls.borrow().iter() {
        assert!(!detached);
        assert_eq!(inv.cwd.as_deref(), Some(temp.path()));
    }
}

#[test]
fn test_detached_extraction_is_spawned_not_waited() {
    let temp = TempDir::new().unwrap();
    let config = config_for(temp.path(), ExtractionMode::Detached);
    let recorder = Recorder::default();
    let manager = InstallationManager::with_runner(&config, full_bundle(), &recorder);

    assert!(manager.verify_installation());

    // Fix-ups run right behind the spawned extraction, without waiting on it.
    let dir = temp.path().display().to_string();
    assert_eq!(
        recorder.programs(),
        vec![
            format!("chmod 0755 {dir}/busybox"),
            format!("{dir}/busybox tar -xf data-1.tgz"),
            format!("chmod 0755 {dir}/usr/bin/xkbcomp"),
            format!("chmod 0755 {dir}/usr/bin/xhost"),
            format!("chmod 0755 {dir}/usr/bin/xli"),
            format!("chmod 0755 {dir}/usr/bin/xsel"),
        ]
    );
    let detached: Vec<bool> = recorder.calls.borrow().iter().map(|(d, _)| *d).collect();
    assert_eq!(detached, vec![false, true, false, false, false, false]);
}

#[test]
fn test_truncated_binary_archive_stops_before_resources() {
    let temp = TempDir::new().unwrap();
    let config = config_for(temp.path(), ExtractionMode::Wait);
    let mut zip = binary_zip();
    // Cut inside the primary binary's data
    let at = zip.windows(SHIM.len()).position(|w| w == SHIM).unwrap();
    zip.truncate(at + 4);
    let bundle = MemoryBundle::new()
        .with("binaries-armeabi-v7a.zip", zip)
        .with("data-1.tgz", resource_tgz());
    let recorder = Recorder::default();
    let manager = InstallationManager::with_runner(&config, bundle, &recorder);

    assert!(!manager.verify_installation());
    assert!(recorder.calls.borrow().is_empty());
    assert!(!temp.path().join("busybox").exists());
    assert!(!temp.path().join("data-1.tgz").exists());
}

#[test]
fn test_missing_resource_archive_fails_without_tar() {
    let temp = TempDir::new().unwrap();
    let config = config_for(temp.path(), ExtractionMode::Wait);
    let bundle = MemoryBundle::new().with("binaries-armeabi-v7a.zip", binary_zip());
    let recorder = Recorder::default();
    let manager = InstallationManager::with_runner(&config, bundle, &recorder);

    let err = manager.try_verify().unwrap_err();

    assert!(matches!(err, ProvisionError::AssetNotFound { ref name } if name == "data-1.tgz"));
    assert_eq!(recorder.programs().len(), 1);
    assert!(recorder.programs()[0].starts_with("chmod"));
    assert!(temp.path().join("busybox").is_file());
}

#[cfg(unix)]
#[test]
fn test_first_run_with_system_tools() {
    use std::os::unix::fs::PermissionsExt;
    use vrx_provision::install::detection::inspect_binaries;

    let temp = TempDir::new().unwrap();
    let config = config_for(temp.path(), ExtractionMode::Wait);
    let manager = InstallationManager::new(&config, full_bundle());

    assert!(manager.verify_installation());

    let mode = fs::metadata(temp.path().join("busybox")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);
    assert!(temp.path().join("usr/share/X11/xkb/rules/base").is_file());
    assert!(inspect_binaries(&config).iter().all(|b| b.present && b.executable));

    // Idempotent on real tools too
    assert!(manager.verify_installation());
}
