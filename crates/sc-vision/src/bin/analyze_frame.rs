//! Run a single saved screenshot through region cropping and every reader.
//! Usage: cargo run -p sc-vision --features cli --bin analyze_frame -- <screenshot.png> <profile.json> [templates_dir] [output_dir]

use anyhow::{Context, Result};
use sc_vision::preprocess::sharpness;
use sc_vision::{
    names, read_queue, read_selection, CounterDecoder, DecoderConfig, PreprocessConfig,
    RecognizerRegistry, RegionExtractor,
};
use std::path::PathBuf;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "Usage: {} <screenshot.png> <profile.json> [templates_dir] [output_dir]",
            args[0]
        );
        std::process::exit(1);
    }

    let input_path = PathBuf::from(&args[1]);
    let profile_path = PathBuf::from(&args[2]);
    let templates_dir = PathBuf::from(args.get(3).map_or("assets/templates", String::as_str));
    let output_dir = PathBuf::from(args.get(4).map_or("./debug_output", String::as_str));
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    println!("Loading image: {}", input_path.display());
    let img = image::open(&input_path)
        .with_context(|| format!("Failed to open {}", input_path.display()))?
        .to_rgba8();
    println!("Image size: {}x{}", img.width(), img.height());

    let regions = RegionExtractor::load(&profile_path)?;
    let selected = RecognizerRegistry::default().select(std::env::var("OCR_ENGINE").ok().as_deref());
    let recognizer = selected.recognizer.as_ref();
    let preprocess = PreprocessConfig::default();

    println!("\n=== Regions ({}) ===", regions.profile_name());
    for name in [names::SUPPLY, names::SELECTION_PANEL, names::PRODUCTION_QUEUE] {
        match regions.crop(&img, name) {
            Some(crop) => {
                println!(
                    "{}: {}x{} sharpness={:.1}",
                    name,
                    crop.width(),
                    crop.height(),
                    sharpness(&crop)
                );
                let _ = crop.save(output_dir.join(format!("{}_crop.png", name)));
            }
            None => println!("{}: NOT FOUND", name),
        }
    }

    println!("\n=== Readers (ocr: {}) ===", selected.name);
    if let Some(crop) = regions.crop(&img, names::SUPPLY) {
        let decoder = CounterDecoder::load(&templates_dir, DecoderConfig::default())?;
        let gray = image::imageops::grayscale(&crop);
        match decoder.locate_divider(&gray) {
            Some(d) => println!(
                "Divider: x={} conf={:.3} (split floor {:.2})",
                d.x,
                d.confidence,
                decoder.config().divider_min_confidence
            ),
            None => println!("Divider: crop smaller than template"),
        }
        println!("Supply: {:?}", decoder.decode(&crop, recognizer));
    }

    if let Some(crop) = regions.crop(&img, names::SELECTION_PANEL) {
        println!("Selection: {:?}", read_selection(&crop, recognizer, &preprocess));
    }

    if let Some(crop) = regions.crop(&img, names::PRODUCTION_QUEUE) {
        println!("Queue: {:?}", read_queue(&crop, recognizer, &preprocess));
    }

    println!("\nDebug images saved to: {}", output_dir.display());
    Ok(())
}
