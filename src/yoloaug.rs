use clap::Parser;
use cvyolo::augment::AugmentationSpec;
use cvyolo::config::AugmentArgs;
use cvyolo::pipeline::run_augmentation;
use log::{error, info};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = AugmentArgs::parse();

    if !args.input_directory.is_dir() {
        error!(
            "The specified input_directory does not exist: {}",
            args.input_directory.display()
        );
        std::process::exit(1);
    }

    let spec = match &args.augmentations {
        Some(path) => match AugmentationSpec::from_json_file(path) {
            Ok(spec) => spec,
            Err(e) => {
                error!("Failed to load augmentations: {}", e);
                std::process::exit(1);
            }
        },
        None => AugmentationSpec::default(),
    };

    info!("Starting the augmentation process...");
    match run_augmentation(&args.augment_options(), &spec) {
        Ok(stats) => stats.print_summary(),
        Err(e) => {
            error!("Failed to augment dataset: {}", e);
            std::process::exit(1);
        }
    }
}
