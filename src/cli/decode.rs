use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use flac::process::decode::Decoder;
use flac::structs::metadata::StreamInfo;

use super::command::{AudioFormat, Cli, DecodeArgs};
use crate::input::InputReader;
use crate::wav::WAVWriter;

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Decoding FLAC stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let input = InputReader::new(&args.input)?;
    let is_pipe = input.is_pipe();

    let mut decoder = Decoder::new(input)?;
    if cli.strict {
        decoder.set_fail_level(Level::Warn);
    }

    let info = decoder.stream_info().clone();
    log::info!(
        "{} Hz, {} channel(s), {} bits per sample",
        info.sample_rate,
        info.n_channels,
        info.bits_per_sample
    );

    let base_path = match (&args.output_path, is_pipe) {
        (Some(path), _) => path.clone(),
        (None, false) => args.input.clone(),
        (None, true) => PathBuf::from("flac-pipe"),
    };

    let output_path = base_path.with_extension(match args.format {
        AudioFormat::Wav => "wav",
        AudioFormat::Pcm => "pcm",
    });
    log::info!("Writing {}", output_path.display());

    let mut writer = match args.format {
        AudioFormat::Wav => AudioWriter::create_wav(output_path, &info)?,
        AudioFormat::Pcm => AudioWriter::create_pcm(output_path)?,
    };

    let pb = multi.map(|multi| create_progress_bar(multi, &info));
    let start_time = Instant::now();

    while let Some(pcm) = decoder.next_frame()? {
        writer.write_pcm_bytes(&pcm)?;

        if let Some(ref pb) = pb {
            pb.set_position(decoder.samples_decoded());
        }
    }

    writer.finish()?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    let audio_secs = decoder.samples_decoded() as f64 / info.sample_rate as f64;
    log::info!(
        "Decoded {} frames ({} samples, {:.2} s of audio) in {:.3} s ({:.1}x realtime)",
        decoder.frames_decoded(),
        decoder.samples_decoded(),
        audio_secs,
        elapsed,
        if elapsed > 0.0 { audio_secs / elapsed } else { 0.0 },
    );

    Ok(())
}

pub enum AudioWriter {
    Pcm(BufWriter<File>),
    Wav(WAVWriter<File>),
}

impl AudioWriter {
    pub fn create_pcm(path: PathBuf) -> Result<Self> {
        let pcm_writer = BufWriter::new(File::create(path)?);
        Ok(AudioWriter::Pcm(pcm_writer))
    }

    pub fn create_wav(path: PathBuf, info: &StreamInfo) -> Result<Self> {
        let mut wav_writer = WAVWriter::new(File::create(path)?);
        wav_writer.configure_audio_format(
            info.sample_rate,
            info.n_channels as u32,
            info.bits_per_sample,
        )?;
        wav_writer.write_header()?;
        Ok(AudioWriter::Wav(wav_writer))
    }

    pub fn write_pcm_bytes(&mut self, pcm: &[u8]) -> Result<()> {
        match self {
            AudioWriter::Pcm(pcm_writer) => pcm_writer.write_all(pcm)?,
            AudioWriter::Wav(wav_writer) => wav_writer.write_pcm_bytes(pcm)?,
        }
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        match self {
            AudioWriter::Pcm(pcm_writer) => pcm_writer.flush()?,
            AudioWriter::Wav(wav_writer) => wav_writer.finish()?,
        }
        Ok(())
    }
}

fn create_progress_bar(multi: &MultiProgress, info: &StreamInfo) -> ProgressBar {
    if info.total_samples > 0 {
        let pb = multi.add(ProgressBar::new(info.total_samples));
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} samples ({percent}%) | elapsed: {elapsed_precise}",
        ) {
            pb.set_style(style);
        }
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_message("Decoding...");
        pb
    }
}
