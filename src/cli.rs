// ============================================================================
// InpaintFE CLI — headless inpainting via command-line arguments
// ============================================================================
//
// Usage examples:
//   inpaintfe --image photo.png --mask mask.png --prompt "a red barn" --output out.png
//   inpaintfe -i photo.png -m mask.png -p "clear sky" -o out.png --seed 42
//   inpaintfe --check-health
//
// No GUI is opened in CLI mode. The request runs synchronously on the
// current thread. The mask must be a PNG whose dimensions match the photo
// exactly; the GUI rescales its editing surface automatically, the CLI
// deliberately does not.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;
use crate::io;
use crate::ops::inpaint::{InpaintClient, InpaintJob, InpaintParams};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// InpaintFE headless inpainting client.
///
/// Send a photo and a mask to the inpainting service and save the result —
/// no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "inpaintfe",
    about = "InpaintFE headless inpainting client",
    long_about = "Submit a photo plus a mask PNG to the configured inpainting service\n\
                  and write the generated image, without opening the GUI.\n\n\
                  The mask must be a PNG with the same pixel dimensions as the photo;\n\
                  painted (opaque) pixels mark the region to regenerate.\n\n\
                  Example:\n  \
                  inpaintfe --image photo.png --mask mask.png --prompt \"a red barn\" --output out.png"
)]
pub struct CliArgs {
    /// Source photo (PNG or JPEG).
    #[arg(short, long, value_name = "FILE")]
    pub image: Option<PathBuf>,

    /// Mask PNG. Must match the photo's dimensions exactly.
    #[arg(short, long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Text prompt describing what should replace the masked area (max 500 chars).
    #[arg(short, long, default_value = "")]
    pub prompt: String,

    /// Where to write the generated PNG.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Fixed random seed for reproducible generations (0 to 2147483647).
    #[arg(long, value_name = "N")]
    pub seed: Option<i64>,

    /// How strongly the masked area is repainted (0.0 to 1.0).
    #[arg(long, default_value_t = 0.8, value_name = "0-1")]
    pub strength: f32,

    /// Prompt guidance scale (1.0 to 20.0).
    #[arg(long, default_value_t = 7.5, value_name = "1-20")]
    pub guidance_scale: f32,

    /// Only probe the inpainting service and report whether it is reachable.
    #[arg(long)]
    pub check_health: bool,

    /// Print request timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process
    /// arguments. Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--image" || a == "-i" || a == "--check-health")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the headless request and return an OS exit code.
/// `0` = success, `1` = validation or service failure.
pub fn run(args: CliArgs) -> u8 {
    let settings = Settings::load();
    let client = InpaintClient::new(settings.clone());

    if args.check_health {
        return if client.health_check() {
            println!("ok: {}", settings.api_url);
            0
        } else {
            eprintln!("unreachable: {}", settings.api_url);
            1
        };
    }

    let (Some(image_path), Some(mask_path), Some(output_path)) =
        (&args.image, &args.mask, &args.output)
    else {
        eprintln!("error: --image, --mask, and --output are all required (or use --check-health).");
        return 1;
    };

    let image = match io::read_file_capped(image_path, settings.max_file_size_mb) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };
    let mask = match io::read_file_capped(mask_path, settings.max_file_size_mb) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    let params = InpaintParams {
        prompt: args.prompt.clone(),
        seed: args.seed,
        strength: args.strength,
        guidance_scale: args.guidance_scale,
    };

    let job = match InpaintJob::build(&image, &mask, params, &settings) {
        Ok(job) => job,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    if args.verbose {
        println!(
            "submitting {}x{} to {} (mock_mode: {})",
            job.width,
            job.height,
            settings.api_url,
            settings.mock_mode()
        );
    }

    let start = std::time::Instant::now();
    match client.inpaint(&job) {
        Ok(bytes) => {
            if let Err(e) = io::write_result(output_path, &bytes) {
                eprintln!("error: {}", e);
                return 1;
            }
            if args.verbose {
                println!(
                    "→ {} ({} bytes, {:.1}s)",
                    output_path.display(),
                    bytes.len(),
                    start.elapsed().as_secs_f64()
                );
            } else {
                println!("→ {}", output_path.display());
            }
            0
        }
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}
