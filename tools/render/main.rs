use anyhow::{Context, Result};
use ebur128::{EbuR128, Mode};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::PathBuf;
use vxchain::{param_queue, ParamEvent, VocalChain};

const BLOCK: usize = 512;

// Usage: vx_render <input.wav> <output.wav> [preset] [state.bin] [automation.json]
//
// Automation is a JSON array of `{"address", "value", "offset"}` events where
// `offset` counts frames from the start of the file.
fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .context("usage: vx_render <input.wav> <output.wav> [preset] [state.bin] [automation.json]")?;
    let output = args
        .next()
        .map(PathBuf::from)
        .context("missing output path")?;
    let preset = args.next().filter(|p| !p.is_empty() && p != "-");
    let state = args.next().filter(|p| !p.is_empty() && p != "-").map(PathBuf::from);
    let automation = args.next().map(PathBuf::from);

    let reader = WavReader::open(&input)
        .with_context(|| format!("failed to open input WAV '{}'", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 || channels > vxchain::chain::MAX_CHANNELS {
        anyhow::bail!("unsupported channel count {}", channels);
    }
    let interleaved = read_samples(reader)?;
    let frames = interleaved.len() / channels;

    let mut chain = VocalChain::new(spec.sample_rate as f32, channels);
    if let Some(name) = preset.as_deref() {
        chain
            .apply_factory_preset(name)
            .with_context(|| format!("failed to apply preset '{}'", name))?;
    }
    if let Some(path) = state.as_ref() {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read state '{}'", path.display()))?;
        chain
            .restore_state(&bytes)
            .with_context(|| format!("failed to restore state '{}'", path.display()))?;
    }
    let mut events: Vec<ParamEvent> = match automation.as_ref() {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read automation '{}'", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("malformed automation '{}'", path.display()))?
        }
        None => Vec::new(),
    };
    events.sort_by_key(|e| e.offset);

    // Deinterleave
    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for frame in interleaved.chunks_exact(channels) {
        for (ch, &s) in planar.iter_mut().zip(frame) {
            ch.push(s);
        }
    }

    let (mut sender, mut receiver) = param_queue(events.len().max(16));
    let mut next_event = 0;
    let mut limiter_gr_db = 0.0f32;
    let mut start = 0;
    while start < frames {
        let end = (start + BLOCK).min(frames);
        while next_event < events.len() && (events[next_event].offset as usize) < end {
            let mut event = events[next_event];
            event.offset = event.offset.saturating_sub(start as u32);
            if sender.send(event).is_err() {
                break;
            }
            next_event += 1;
        }

        let mut block: Vec<&mut [f32]> = planar.iter_mut().map(|ch| &mut ch[start..end]).collect();
        chain.process_block_with_events(&mut block, &mut receiver);
        limiter_gr_db = limiter_gr_db.min(chain.meters().get_limiter_reduction_db());
        start = end;
    }

    let mut out = Vec::with_capacity(frames * channels);
    for i in 0..frames {
        out.extend(planar.iter().map(|ch| ch[i]));
    }

    let out_spec = WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&output, out_spec)
        .with_context(|| format!("failed to create output WAV '{}'", output.display()))?;
    for &s in &out {
        writer.write_sample(s)?;
    }
    writer.finalize()?;

    let mut meter = EbuR128::new(spec.channels as u32, spec.sample_rate, Mode::I | Mode::TRUE_PEAK)
        .context("failed to create loudness meter")?;
    meter.add_frames_f32(&out)?;
    let lufs = meter.loudness_global()?;
    let mut true_peak = 0.0f64;
    for ch in 0..spec.channels as u32 {
        true_peak = true_peak.max(meter.true_peak(ch)?);
    }
    let true_peak_db = if true_peak > 0.0 {
        20.0 * true_peak.log10()
    } else {
        f64::NEG_INFINITY
    };

    println!("Render summary for '{}':", input.display());
    println!("  output            : {}", output.display());
    println!("  frames processed  : {}", frames);
    println!("  latency           : {} samples", chain.latency_samples());
    println!("  events applied    : {}", next_event);
    println!("  integrated        : {:.1} LUFS", lufs);
    println!("  true peak         : {:.2} dBTP", true_peak_db);
    println!("  max limiter GR    : {:.2} dB", limiter_gr_db);
    Ok(())
}

fn read_samples(reader: WavReader<std::io::BufReader<std::fs::File>>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map_err(Into::into))
            .collect(),
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| Ok(s? as f32 * scale))
                .collect()
        }
    }
}
