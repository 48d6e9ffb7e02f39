use crate::model::example::MelodyTranscriptionExample;
use anyhow::{Result, anyhow};
use log::{debug, warn};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const MIDI_EXTENSIONS: [&str; 2] = ["mid", "midi"];

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub checked: usize,
    pub mismatched: Vec<PathBuf>,
    /// Files that could not be read, decoded or re-encoded, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty() && self.failed.is_empty()
    }
}

/// Where the entry for `uid` lives inside `dir`.
///
/// Uids are opaque, so `%`, path separators and NUL are percent-escaped to keep the file a direct
/// child of `dir`. The uid itself is stored in the stream, so nothing is lost.
pub fn archive_path<P: AsRef<Path>>(dir: P, uid: &str) -> Result<PathBuf> {
    let mut name = String::with_capacity(uid.len() + 4);
    for c in uid.chars() {
        match c {
            '%' => name.push_str("%25"),
            '/' => name.push_str("%2F"),
            '\\' => name.push_str("%5C"),
            '\0' => name.push_str("%00"),
            c => name.push(c),
        }
    }
    name.push_str(".mid");

    let mut components = Path::new(&name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.as_ref().join(name)),
        _ => Err(anyhow!("uid '{}' cannot be used as a file name", uid)),
    }
}

fn is_midi(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MIDI_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn midi_files<P: AsRef<Path>>(dir: P) -> impl Iterator<Item = Result<PathBuf>> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() && is_midi(entry.path()) => {
                Some(Ok(entry.into_path()))
            }
            Ok(_) => None,
            Err(e) => Some(Err(anyhow!("Failed to walk archive: {}", e))),
        })
}

fn read_entry(path: &Path) -> Result<(Vec<u8>, MelodyTranscriptionExample)> {
    let bytes = fs::read(path)
        .map_err(|e| anyhow!("Failed to read MIDI file {}: {}", path.display(), e))?;
    let example = MelodyTranscriptionExample::from_bytes(&bytes)
        .map_err(|e| anyhow!("Failed to decode {}: {}", path.display(), e))?;

    Ok((bytes, example))
}

/// Lazily decodes every `.mid`/`.midi` file under `dir`, in file name order.
///
/// Entries are keyed by the uid stored in the stream, or by the file stem when the stream carries
/// none.
pub fn iter_archive<P: AsRef<Path>>(
    dir: P,
) -> impl Iterator<Item = Result<(String, MelodyTranscriptionExample)>> {
    midi_files(dir).map(|path| {
        let path = path?;
        let (_, example) = read_entry(&path)?;

        let uid = match example.uid() {
            Some(uid) => uid.to_string(),
            None => path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
                .ok_or_else(|| anyhow!("No usable uid for {}", path.display()))?,
        };

        debug!("Loaded archive entry '{}' from {}", uid, path.display());
        Ok((uid.clone(), example.with_uid(uid)))
    })
}

/// Checks that every file under `dir` decodes and re-encodes to exactly the bytes on disk.
pub fn verify_archive<P: AsRef<Path>>(dir: P) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();

    for path in midi_files(dir) {
        let path = path?;
        report.checked += 1;

        let reencoded = read_entry(&path).and_then(|(bytes, example)| {
            let reencoded = example
                .to_bytes()
                .map_err(|e| anyhow!("Failed to re-encode {}: {}", path.display(), e))?;
            Ok((bytes, reencoded))
        });

        let (bytes, reencoded) = match reencoded {
            Ok(pair) => pair,
            Err(e) => {
                warn!("{}..!", e);
                report.failed.push((path, e.to_string()));
                continue;
            }
        };

        if reencoded != bytes {
            warn!(
                "{} does not re-encode to the same bytes ({} on disk, {} re-encoded)..!",
                path.display(),
                bytes.len(),
                reencoded.len()
            );
            report.mismatched.push(path);
        }
    }

    Ok(report)
}
