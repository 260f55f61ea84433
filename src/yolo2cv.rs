use clap::Parser;
use cvyolo::config::UploadArgs;
use cvyolo::service::CustomVisionClient;
use cvyolo::transfer::upload_directory;
use log::{error, info};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = UploadArgs::parse();

    if !args.input_directory.is_dir() {
        error!(
            "The specified input_directory does not exist: {}",
            args.input_directory.display()
        );
        std::process::exit(1);
    }

    let client = CustomVisionClient::new(
        &args.service.endpoint,
        &args.service.training_key,
        &args.service.project_id,
    );

    info!("Uploading {:?}...", args.input_directory);
    match upload_directory(&client, &args.input_directory, args.upload_options()) {
        Ok(summary) => {
            info!("Service assigned {} image ids", summary.image_ids.len());
            summary.stats.print_summary();
            if summary.stats.samples_failed > 0 {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Failed to upload dataset: {}", e);
            std::process::exit(1);
        }
    }
}
