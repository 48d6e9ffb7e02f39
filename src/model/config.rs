use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "melody_transcription",
    about = "Convert monophonic melody transcriptions to and from MIDI without loss."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a MIDI file's transcription as JSON.
    Decode {
        /// Path to the MIDI file.
        midi: PathBuf,
    },

    /// Log the segment and notes of a MIDI file.
    Inspect {
        /// Path to the MIDI file.
        midi: PathBuf,

        /// Maximum notes to print.
        #[arg(long, default_value_t = 80)]
        max: usize,
    },

    /// Encode a JSON transcription record as a MIDI file.
    Encode {
        /// Path to the JSON record.
        json: PathBuf,

        /// Where to write the MIDI file.
        out: PathBuf,
    },

    /// Encode a JSON collection of records keyed by uid into `<uid>.mid` files.
    Import {
        /// Path to the JSON records.
        records: PathBuf,

        /// Directory that receives the MIDI files.
        out_dir: PathBuf,

        /// Only import records from this split: train|valid|test.
        #[arg(short, long)]
        split: Option<String>,
    },

    /// Check that every MIDI file in a directory re-encodes to identical bytes.
    Verify {
        /// Archive directory to scan recursively.
        dir: PathBuf,
    },
}
