#![allow(clippy::too_many_arguments)]

use eframe::egui;
use inpaintfe::app::InpaintFEApp;
use inpaintfe::{cli, logger};

fn main() -> Result<(), eframe::Error> {
    // -- CLI / headless mode -------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        std::process::exit(cli::run(args) as i32);
    }

    // -- GUI mode ------------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1180.0, 720.0])
            .with_min_inner_size([900.0, 640.0])
            .with_title("InpaintFE"),
        ..Default::default()
    };

    eframe::run_native(
        "InpaintFE",
        options,
        Box::new(|cc| Box::new(InpaintFEApp::new(cc))),
    )
}
