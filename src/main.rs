use anyhow::{Result, anyhow, bail};
use clap::Parser;
use log::{debug, info, warn};
use melody_transcription::{
    Args, Command, MelodyTranscriptionExample, archive_path, load_records, parse_split,
    verify_archive,
};
use std::fs;
use std::path::Path;

fn read_midi(path: &Path) -> Result<MelodyTranscriptionExample> {
    let bytes = fs::read(path)
        .map_err(|e| anyhow!("Failed to read MIDI file {}: {}", path.display(), e))?;
    Ok(MelodyTranscriptionExample::from_bytes(&bytes)?)
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read JSON file {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Decode { midi } => {
            let example = read_midi(&midi)?;
            println!("{}", serde_json::to_string_pretty(&example)?);
        }
        Command::Inspect { midi, max } => {
            info!("Decoding MIDI file: '{}'...", midi.display());
            let example = read_midi(&midi)?;

            info!(
                "Example '{}': segment [{:.3}s, {:.3}s] with {} notes",
                example.uid().unwrap_or("<no uid>"),
                example.segment_start(),
                example.segment_end(),
                example.notes().len()
            );

            for (i, note) in example.notes().iter().take(max).enumerate() {
                let offset = note
                    .offset()
                    .map(|off| format!("{:.3}", off))
                    .unwrap_or_else(|| "<unspecified>".into());
                info!(
                    "Note {}: pitch={} onset={:.3} offset={}",
                    i,
                    note.pitch(),
                    note.onset(),
                    offset
                );
            }
        }
        Command::Encode { json, out } => {
            let example = MelodyTranscriptionExample::try_from(read_json(&json)?)?;
            let bytes = example.to_bytes()?;
            fs::write(&out, &bytes)
                .map_err(|e| anyhow!("Failed to write {}: {}", out.display(), e))?;
            info!("Wrote {} bytes to '{}'", bytes.len(), out.display());
        }
        Command::Import {
            records,
            out_dir,
            split,
        } => {
            let split = match split.as_deref() {
                Some(s) => Some(parse_split(s).ok_or_else(|| anyhow!("Unknown split '{}'", s))?),
                None => None,
            };

            let examples = load_records(&read_json(&records)?, split)?;
            fs::create_dir_all(&out_dir)
                .map_err(|e| anyhow!("Failed to create {}: {}", out_dir.display(), e))?;

            for example in &examples {
                let path = archive_path(&out_dir, example.uid().unwrap_or_default())?;
                fs::write(&path, example.to_bytes()?)
                    .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
                debug!("Wrote '{}'", path.display());
            }

            info!(
                "Imported {} example(s) into '{}'",
                examples.len(),
                out_dir.display()
            );
        }
        Command::Verify { dir } => {
            info!("Verifying archive: '{}'...", dir.display());
            let report = verify_archive(&dir)?;
            if !report.is_clean() {
                for path in &report.mismatched {
                    warn!("Mismatch: {}", path.display());
                }
                for (path, reason) in &report.failed {
                    warn!("Failed: {} ({})", path.display(), reason);
                }
                bail!(
                    "{} of {} file(s) did not round-trip and {} could not be decoded..!",
                    report.mismatched.len(),
                    report.checked,
                    report.failed.len()
                );
            }

            info!("All {} file(s) round-trip byte-for-byte..!", report.checked);
        }
    }

    Ok(())
}
