//! tonewheel CLI — plays a built-in demo song, or renders it to WAV.
//!
//! Usage:
//!   tw-cli
//!   tw-cli --wav output.wav
//!   tw-cli --seconds 12

use std::io::Write;
use std::{env, fs};

use tw_core::{track_id, Event, EventPayload, Song, TrackSpec};
use tw_host::Host;

fn main() {
    let args: Vec<String> = env::args().collect();

    let wav_path = args
        .iter()
        .position(|a| a == "--wav")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let seconds: u32 = args
        .iter()
        .position(|a| a == "--seconds")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(12);

    let mut host = Host::new();
    host.load_song(demo_song()).unwrap_or_else(|e| {
        eprintln!("Failed to load demo song: {}", e);
        std::process::exit(1);
    });

    let song = host.song();
    println!("Title:    {}", song.title);
    println!("Tempo:    {} BPM", song.tempo_bpm);
    println!("Tracks:   {}", song.tracks.len());
    println!("Events:   {}", song.events.len());
    println!();

    match wav_path {
        Some(path) => render_to_wav(&host, &path, seconds),
        None => play_audio(&mut host),
    }
}

fn play_audio(host: &mut Host) {
    host.play();
    println!("Playing...");

    while host.is_playing() {
        if let Some(pos) = host.position_seconds() {
            print!("\r{:6.2}s", pos);
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    println!("\rDone.   ");
}

fn render_to_wav(host: &Host, path: &str, seconds: u32) {
    let sample_rate: u32 = 44100;
    println!("Rendering to {} at {} Hz...", path, sample_rate);

    let wav = host.render_to_wav(sample_rate, seconds).unwrap_or_else(|e| {
        eprintln!("Render failed: {}", e);
        std::process::exit(1);
    });

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });
    println!("Wrote {} bytes.", wav.len());
}

/// A short three-track demo: bass line, FM chords, and a plucked melody.
fn demo_song() -> Song {
    let mut song = Song::new("tonewheel demo");
    song.tempo_bpm = 100.0;

    song.add_track(
        TrackSpec::new(track_id("bass"), "subtractive")
            .with_param("cutoff", 0.35)
            .with_param("sustain", 0.8)
            .with_param("release", 0.2),
    );
    song.add_track(
        TrackSpec::new(track_id("keys"), "fm")
            .with_param("ratio", 0.5)
            .with_param("index", 0.25),
    );
    song.add_track(TrackSpec::new(track_id("melody"), "pluck").with_param("damping", 0.2));

    let beat = 60.0 / song.tempo_bpm;

    // Bass: root notes on every beat
    for bar in 0..4usize {
        let root = [36, 36, 39, 34][bar];
        for b in 0..4 {
            let t = (bar * 4 + b) as f64 * beat;
            note(&mut song, "bass", t, root, 0.9, beat * 0.9);
        }
    }

    // Keys: one chord per bar
    for bar in 0..4usize {
        let chord: [u8; 3] = [[60, 63, 67], [60, 63, 67], [63, 67, 70], [58, 62, 65]][bar];
        let t = bar as f64 * 4.0 * beat;
        for n in chord {
            note(&mut song, "keys", t, n, 0.5, 3.5 * beat);
        }
    }

    // Melody: plucked eighth notes
    let scale = [72u8, 75, 77, 79, 82, 79, 77, 75];
    for (i, &n) in scale.iter().cycle().take(32).enumerate() {
        let t = i as f64 * beat / 2.0;
        note(&mut song, "melody", t, n, 0.7, beat / 2.0);
    }

    song
}

fn note(song: &mut Song, track: &str, time: f64, pitch: u8, velocity: f32, length: f64) {
    song.push_event(Event::new(
        time,
        track_id(track),
        EventPayload::NoteOn { note: pitch, velocity },
    ));
    song.push_event(Event::new(
        time + length,
        track_id(track),
        EventPayload::NoteOff { note: pitch },
    ));
}
