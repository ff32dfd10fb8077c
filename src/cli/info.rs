use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use flac::process::decode::Decoder;
use flac::structs::metadata::{StreamInfo, VorbisComment};

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing FLAC stream: {}", args.input.display());

    let input = InputReader::new(&args.input)?;
    let mut decoder = Decoder::new(input)?;
    if cli.strict {
        decoder.set_fail_level(Level::Warn);
    }

    println!();
    println!("FLAC Stream Information");
    println!("=======================");
    println!();

    display_stream_info(decoder.stream_info());

    if let Some(comment) = decoder.vorbis_comment() {
        display_vorbis_comment(comment);
    }

    if args.verify {
        verify_stream(&mut decoder, multi)?;
    }

    Ok(())
}

fn display_stream_info(info: &StreamInfo) {
    println!("Stream Information");
    println!("  Sample rate               {} Hz", info.sample_rate);
    println!("  Channels                  {}", info.n_channels);
    println!("  Bits per sample           {}", info.bits_per_sample);

    if info.min_block == info.max_block {
        println!("  Block size                {} samples", info.min_block);
    } else {
        println!(
            "  Block size                {} - {} samples",
            info.min_block, info.max_block
        );
    }

    if info.min_frame != 0 || info.max_frame != 0 {
        println!(
            "  Frame size                {} - {} bytes",
            info.min_frame, info.max_frame
        );
    }

    if info.total_samples != 0 {
        let duration_secs = info.total_samples as f64 / info.sample_rate as f64;
        println!(
            "  Total samples             {} ({})",
            info.total_samples,
            time_str(duration_secs)
        );
    } else {
        println!("  Total samples             unknown");
    }

    let md5 = info
        .md5
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>();
    if info.md5_unknown() {
        println!("  MD5                       unknown");
    } else {
        println!("  MD5                       {md5}");
    }
    println!();
}

fn display_vorbis_comment(comment: &VorbisComment) {
    println!("Vorbis Comments");
    println!("  Vendor                    {}", comment.vendor);
    for entry in &comment.comments {
        println!("  {entry}");
    }
    println!();
}

fn verify_stream<R: std::io::Read>(
    decoder: &mut Decoder<R>,
    multi: Option<&MultiProgress>,
) -> Result<()> {
    let pb = multi.map(|multi| {
        let pb = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Verifying frames...");
        pb
    });

    let mut pcm_bytes = 0usize;
    while let Some(pcm) = decoder.next_frame()? {
        pcm_bytes += pcm.len();

        if decoder.frames_decoded().is_multiple_of(100)
            && let Some(ref pb) = pb
        {
            pb.set_message(format!("Verifying frames...       {}", decoder.frames_decoded()));
            pb.tick();
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    println!("Verification Summary");
    println!("  Frames decoded            {}", decoder.frames_decoded());
    println!("  Samples decoded           {}", decoder.samples_decoded());

    let size_mb = pcm_bytes as f64 / 1_000_000.0;
    println!("  PCM output                {size_mb:.2} MB ({pcm_bytes} bytes)");

    if decoder.stream_info().md5_unknown() {
        println!("  MD5                       not stored, skipped");
    } else {
        println!("  MD5                       OK");
    }
    println!();

    Ok(())
}

fn time_str(duration_secs: f64) -> String {
    let total = duration_secs.round() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
