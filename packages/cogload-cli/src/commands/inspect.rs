use crate::cli::InspectArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;
use cogload_rs::{AnalysisConfig, ChannelResolver, ReaderFactory, RecordingMetadata};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct RegionChannels {
    region: String,
    configured: Vec<String>,
    matched: Vec<String>,
}

#[derive(Serialize)]
struct InspectOutput {
    format: String,
    #[serde(flatten)]
    metadata: RecordingMetadata,
    regions: Vec<RegionChannels>,
}

pub fn execute(args: InspectArgs) -> i32 {
    let config = match settings::resolve(&args.analysis) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let options = config.reader_options();
    let reader = match ReaderFactory::open(Path::new(&args.file), &options) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let metadata = reader.metadata().clone();
    let regions = resolve_regions(&metadata.channels, &config);
    let info = InspectOutput {
        format: reader.format_name().to_string(),
        metadata,
        regions,
    };

    if args.json {
        match output::to_json(&info, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        print_text(&info);
    }

    exit_codes::SUCCESS
}

/// Which of the recording's channels each region would use, after the
/// channel limit.
fn resolve_regions(channels: &[String], config: &AnalysisConfig) -> Vec<RegionChannels> {
    let limit = config.max_channels.unwrap_or(channels.len()).min(channels.len());
    let usable = &channels[..limit];
    let resolver = ChannelResolver::new(usable, config.match_case_insensitive);
    resolver
        .resolve_regions(&config.regions)
        .iter()
        .map(|(region, indices)| RegionChannels {
            region: region.to_string(),
            configured: config.regions.labels(region).to_vec(),
            matched: indices.iter().map(|&i| usable[i].clone()).collect(),
        })
        .collect()
}

fn print_text(info: &InspectOutput) {
    let m = &info.metadata;
    println!("File: {} ({})", m.file_name, info.format);
    println!("Size: {} bytes", m.file_size);
    match m.sampling_rate {
        Some(fs) => println!("Sampling rate: {} Hz", fs),
        None => println!("Sampling rate: unknown (pass --sr)"),
    }
    match m.duration_secs {
        Some(d) => println!("Samples: {} ({:.1} s)", m.num_samples, d),
        None => println!("Samples: {}", m.num_samples),
    }
    if let Some(ref start) = m.start_time {
        println!("Start: {}", start);
    }
    println!("Channels ({}): {}", m.num_channels, m.channels.join(", "));
    println!();
    for region in &info.regions {
        if region.matched.is_empty() {
            println!("{:<12} no matching channels", format!("{}:", region.region));
        } else {
            println!(
                "{:<12} {}",
                format!("{}:", region.region),
                region.matched.join(", ")
            );
        }
    }
}
