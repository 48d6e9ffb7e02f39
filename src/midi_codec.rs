use crate::error::{Error, Result};
use crate::model::example::MelodyTranscriptionExample;
use crate::model::note::Note;
use log::{debug, warn};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::HashMap;

/// One tick is exactly one millisecond: 1000 ticks per beat at one beat per second.
pub const TICKS_PER_SECOND: u64 = 1_000;
pub const TICKS_PER_BEAT: u16 = 1_000;
pub const MICROS_PER_BEAT: u32 = 1_000_000;

pub const CHANNEL: u8 = 0;
pub const NOTE_VELOCITY: u8 = 100;
pub const SEGMENT_START_MARKER: &[u8] = b"segment_start";
pub const SEGMENT_END_MARKER: &[u8] = b"segment_end";

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_SECOND: f64 = 1_000_000.0;
const MAX_DELTA_TICKS: u64 = (1 << 28) - 1;
// Decoding scales ticks by the tempo (1e6 us/beat) before converting to f64, which is only
// exact below 2^53, so ticks must stay under 2^53 / 1e6 (about 104 days).
const MAX_TICKS: f64 = 9_007_199_254.0;

/// Tie-break for events sharing a tick. A note ending at `t` is written before the next note
/// beginning at `t`, and the segment encloses both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    SegmentStart,
    NoteEnd,
    NoteBegin,
    SegmentEnd,
}

struct TimedEvent<'a> {
    tick: u64,
    rank: Rank,
    kind: TrackEventKind<'a>,
}

#[derive(Default)]
struct Quantizer {
    rounded: usize,
}

impl Quantizer {
    fn ticks(&mut self, seconds: f64) -> Result<u64> {
        let ticks = (seconds * TICKS_PER_SECOND as f64).round();
        if !(0.0..=MAX_TICKS).contains(&ticks) {
            return Err(Error::Codec(format!(
                "{seconds}s cannot be represented as a tick count"
            )));
        }

        let ticks = ticks as u64;
        if ticks as f64 / TICKS_PER_SECOND as f64 != seconds {
            self.rounded += 1;
        }

        Ok(ticks)
    }
}

/// Writes `example` as a single-track SMF.
///
/// Times are rounded to the nearest millisecond tick. Examples whose times are already whole
/// milliseconds decode back to bit-identical values; anything else is rounded once, after
/// which decoding and re-encoding are stable.
pub fn encode(example: &MelodyTranscriptionExample) -> Result<Vec<u8>> {
    let mut quantizer = Quantizer::default();

    let start_tick = quantizer.ticks(example.segment_start())?;
    let end_tick = quantizer.ticks(example.segment_end())?;
    if start_tick >= end_tick {
        return Err(Error::Codec(format!(
            "segment [{}, {}] collapses to a single tick",
            example.segment_start(),
            example.segment_end()
        )));
    }

    let mut events: Vec<TimedEvent> = vec![
        TimedEvent {
            tick: start_tick,
            rank: Rank::SegmentStart,
            kind: TrackEventKind::Meta(MetaMessage::Marker(SEGMENT_START_MARKER)),
        },
        TimedEvent {
            tick: end_tick,
            rank: Rank::SegmentEnd,
            kind: TrackEventKind::Meta(MetaMessage::Marker(SEGMENT_END_MARKER)),
        },
    ];

    let mut prev_onset: Option<u64> = None;
    for (i, note) in example.notes().iter().enumerate() {
        let key = u7::from(note.pitch());
        let onset = quantizer.ticks(note.onset())?;

        if let Some(prev) = prev_onset
            && onset <= prev
        {
            return Err(Error::Codec(format!(
                "note {i} at {}s collapses onto the previous onset at tick {prev}",
                note.onset()
            )));
        }
        prev_onset = Some(onset);

        events.push(TimedEvent {
            tick: onset,
            rank: Rank::NoteBegin,
            kind: TrackEventKind::Midi {
                channel: u4::from(CHANNEL),
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::from(NOTE_VELOCITY),
                },
            },
        });

        // Notes without an offset get no NoteOff so that decoding leaves them open.
        if let Some(offset) = note.offset() {
            let offset = quantizer.ticks(offset)?;
            if offset <= onset {
                return Err(Error::Codec(format!(
                    "note {i} at {}s is shorter than one tick",
                    note.onset()
                )));
            }

            events.push(TimedEvent {
                tick: offset,
                rank: Rank::NoteEnd,
                kind: TrackEventKind::Midi {
                    channel: u4::from(CHANNEL),
                    message: MidiMessage::NoteOff {
                        key,
                        vel: u7::from(0),
                    },
                },
            });
        }
    }

    // Stable, so equal (tick, rank) pairs keep note order.
    events.sort_by_key(|event| (event.tick, event.rank));

    let mut track: Vec<TrackEvent> = Vec::with_capacity(events.len() + 3);
    if let Some(uid) = example.uid() {
        track.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(uid.as_bytes())),
        });
    }
    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(MICROS_PER_BEAT))),
    });

    let mut last_tick: u64 = 0;
    for event in events {
        let delta = event.tick - last_tick;
        if delta > MAX_DELTA_TICKS {
            return Err(Error::Codec(format!(
                "gap of {delta} ticks before tick {} exceeds the MIDI delta-time limit",
                event.tick
            )));
        }

        track.push(TrackEvent {
            delta: u28::from(delta as u32),
            kind: event.kind,
        });
        last_tick = event.tick;
    }

    track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    if quantizer.rounded > 0 {
        warn!(
            "Rounded {} time value(s) to the nearest {}ms tick, decoding will not reproduce them exactly..!",
            quantizer.rounded,
            1_000 / TICKS_PER_SECOND
        );
    }

    let smf = Smf {
        header: Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::from(TICKS_PER_BEAT)),
        ),
        tracks: vec![track],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| Error::Codec(format!("failed to write MIDI: {}", e)))?;

    debug!(
        "Encoded {} notes over ticks {}..={} into {} bytes",
        example.notes().len(),
        start_tick,
        end_tick,
        bytes.len()
    );

    Ok(bytes)
}

struct NoteInterval {
    key: u8,
    start_tick: u64,
    end_tick: Option<u64>,
}

#[derive(Debug, Clone)]
struct TempoSegment {
    start_tick: u64,
    mpqn: u32,
    /// Elapsed microseconds at `start_tick`, multiplied by the ticks per beat.
    scaled_micros_at_start: u128,
}

/// Tick to seconds conversion that stays in integers until a single final division.
struct TempoMap {
    ticks_per_beat: u64,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn new(ticks_per_beat: u64, mut changes: Vec<(u64, u32)>) -> Self {
        changes.sort_by_key(|(tick, _)| *tick);

        let mut segments: Vec<TempoSegment> = Vec::with_capacity(changes.len());
        let mut last_tick: u64 = 0;
        let mut last_mpqn: u32 = DEFAULT_MPQN;
        let mut accum: u128 = 0;

        for (tick, mpqn) in changes {
            accum += (tick - last_tick) as u128 * last_mpqn as u128;
            segments.push(TempoSegment {
                start_tick: tick,
                mpqn,
                scaled_micros_at_start: accum,
            });
            last_tick = tick;
            last_mpqn = mpqn;
        }

        Self {
            ticks_per_beat,
            segments,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        let scaled = match self.segments.iter().rfind(|seg| seg.start_tick <= tick) {
            Some(seg) => {
                seg.scaled_micros_at_start + (tick - seg.start_tick) as u128 * seg.mpqn as u128
            }
            None => tick as u128 * DEFAULT_MPQN as u128,
        };

        scaled as f64 / (self.ticks_per_beat as f64 * MICROSECONDS_PER_SECOND)
    }
}

/// Parses an SMF and validates the transcription it carries.
///
/// Every track is merged, so files that keep the tempo map on a separate conductor track decode
/// the same as single-track files.
pub fn decode(bytes: &[u8]) -> Result<MelodyTranscriptionExample> {
    let smf =
        Smf::parse(bytes).map_err(|e| Error::Codec(format!("failed to parse MIDI: {:?}", e)))?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            return Err(Error::Codec(
                "SMPTE timecode MIDI timing is not supported".into(),
            ));
        }
    };

    if ticks_per_beat == 0 {
        return Err(Error::Codec("header declares zero ticks per beat".into()));
    }

    if matches!(smf.header.format, Format::Sequential) {
        return Err(Error::Codec(
            "sequential (format 2) MIDI files are not supported".into(),
        ));
    }

    debug!(
        "MIDI format: {:?}, tracks: {}, ticks per beat: {}",
        smf.header.format,
        smf.tracks.len(),
        ticks_per_beat
    );

    let mut tempo_changes: Vec<(u64, u32)> = vec![(0, DEFAULT_MPQN)];
    let mut uid: Option<String> = None;
    let mut segment_start: Option<u64> = None;
    let mut segment_end: Option<u64> = None;
    let mut intervals: Vec<NoteInterval> = Vec::new();
    let mut open_notes: HashMap<(u8, u8), Vec<usize>> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        let mut terminated = false;

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::Tempo(micro) => {
                        let mpqn: u32 = micro.as_int();
                        if mpqn == 0 {
                            return Err(Error::Codec(format!(
                                "zero tempo at tick {abs_tick} (track {track_idx})"
                            )));
                        }
                        tempo_changes.push((abs_tick, mpqn));
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick, mpqn, track_idx
                        );
                    }
                    MetaMessage::TrackName(name) => {
                        // An empty name is still a uid, encode writes it for `with_uid("")`.
                        if uid.is_none() {
                            let name = String::from_utf8(name.to_vec()).map_err(|_| {
                                Error::Codec(format!("track {track_idx} name is not valid UTF-8"))
                            })?;
                            debug!("uid: {}", name);
                            uid = Some(name);
                        }
                    }
                    MetaMessage::Marker(text) if *text == SEGMENT_START_MARKER => {
                        set_marker(&mut segment_start, abs_tick, "segment_start")?;
                    }
                    MetaMessage::Marker(text) if *text == SEGMENT_END_MARKER => {
                        set_marker(&mut segment_end, abs_tick, "segment_end")?;
                    }
                    MetaMessage::EndOfTrack => {
                        terminated = true;
                        break;
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open_notes
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push(intervals.len());
                            intervals.push(NoteInterval {
                                key: key.as_int(),
                                start_tick: abs_tick,
                                end_tick: None,
                            });
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            close_note(&mut open_notes, &mut intervals, ch, key.as_int(), abs_tick);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if !terminated {
            return Err(Error::Codec(format!(
                "track {track_idx} ends without an end-of-track marker"
            )));
        }
    }

    let open_count = open_notes.values().map(Vec::len).sum::<usize>();
    if open_count > 0 {
        debug!("{} note(s) have no NoteOff, leaving their offsets unspecified", open_count);
    }

    let (Some(start_tick), Some(end_tick)) = (segment_start, segment_end) else {
        return Err(Error::Codec(
            "stream does not declare both segment_start and segment_end markers".into(),
        ));
    };

    let tempo = TempoMap::new(ticks_per_beat, tempo_changes);

    intervals.sort_by_key(|interval| interval.start_tick);
    let notes = intervals
        .iter()
        .map(|interval| {
            Note::new(
                tempo.seconds_at(interval.start_tick),
                interval.key,
                interval.end_tick.map(|tick| tempo.seconds_at(tick)),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let example = MelodyTranscriptionExample::new(
        tempo.seconds_at(start_tick),
        tempo.seconds_at(end_tick),
        notes,
    )?;

    Ok(match uid {
        Some(uid) => example.with_uid(uid),
        None => example,
    })
}

fn set_marker(slot: &mut Option<u64>, tick: u64, name: &str) -> Result<()> {
    if let Some(previous) = slot {
        return Err(Error::Codec(format!(
            "duplicate {name} marker at tick {tick} (first at tick {previous})"
        )));
    }

    *slot = Some(tick);
    Ok(())
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<usize>>,
    intervals: &mut [NoteInterval],
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    match open_notes.get_mut(&(ch, midi_num)).and_then(Vec::pop) {
        Some(idx) => intervals[idx].end_tick = Some(abs_tick),
        None => debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        ),
    }
}
