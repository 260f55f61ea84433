use clap::Parser;
use cvyolo::config::DownloadArgs;
use cvyolo::service::CustomVisionClient;
use cvyolo::transfer::download_project;
use log::{error, info};

fn main() {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = DownloadArgs::parse();

    let client = CustomVisionClient::new(
        &args.service.endpoint,
        &args.service.training_key,
        &args.service.project_id,
    );

    info!("Downloading project {}...", args.service.project_id);
    match download_project(&client, &args.output_directory) {
        Ok(stats) => stats.print_summary(),
        Err(e) => {
            error!("Failed to download project: {}", e);
            std::process::exit(1);
        }
    }
}
