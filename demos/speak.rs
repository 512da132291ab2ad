use std::path::PathBuf;
use std::time::{Duration, Instant};

use fastspeech_rs::{
    engines::fastspeech::{FastSpeechEngine, FastSpeechInferenceParams},
    SynthesisEngine,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut engine = FastSpeechEngine::new();
    let model_path = PathBuf::from("models/fastspeech");

    let load_start = Instant::now();
    engine.load_model(&model_path)?;
    println!("Models loaded in {:.2?}", load_start.elapsed());
    println!(
        "Vocabulary size: {}",
        engine.vocabulary_size().unwrap_or(0)
    );

    let text = "Hello! This is FastSpeech 2 speaking through MelGAN. \
                It turns 1 line of text into 22050 hertz audio.";

    let params = FastSpeechInferenceParams {
        speaker_id: 1,
        speed_ratio: 1.0,
    };
    let mut scheduler = engine.scheduler(params)?;

    let synth_start = Instant::now();
    scheduler.speak(text);

    // Stand-in for the host's per-frame update: poll until the buffer lands.
    let buffer = loop {
        if let Some(buffer) = scheduler.poll() {
            break buffer;
        }
        std::thread::sleep(Duration::from_millis(16));
    };
    let synth_dur = synth_start.elapsed();

    let speedup = buffer.duration_secs() / synth_dur.as_secs_f64();
    println!(
        "Synthesized {:.2}s audio in {:.2?} ({:.1}x real-time)",
        buffer.duration_secs(),
        synth_dur,
        speedup
    );

    buffer.write_wav(&PathBuf::from("output.wav"))?;
    println!("Saved to output.wav");

    scheduler.shutdown();
    engine.unload_model();
    Ok(())
}
