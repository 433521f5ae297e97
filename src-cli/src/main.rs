use std::path::PathBuf;

use clap::{Parser, Subcommand};

use plancraft_lib::{ConfigUpdate, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "plancraft")]
#[command(about = "Turn a floor plan into whitebox renders from the command line")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file, build its whitebox and render a gallery
    Run {
        /// CAD drawing (.dxf) or raster floor plan
        file: PathBuf,
        /// Camera views to render (main, side, topA)
        #[arg(long, value_delimiter = ',', default_value = "main,side")]
        views: Vec<String>,
        /// Style key (modern, wabi, custom)
        #[arg(long, default_value = "modern")]
        style: String,
        /// Extra prompt text appended to the style
        #[arg(long)]
        prompt: Option<String>,
        /// Structure adherence, 0 to 1
        #[arg(long, default_value_t = plancraft_core::pipeline::DEFAULT_STRENGTH)]
        strength: f32,
        /// Directory rendered images are written to
        #[arg(long, default_value = "renders")]
        out: PathBuf,
        /// Refinement instruction applied to the first image
        #[arg(long)]
        refine: Option<String>,
        /// Override the backend base URL
        #[arg(long)]
        api: Option<String>,
    },
    /// Show or update persisted settings
    Config {
        /// Backend base URL
        #[arg(long)]
        api: Option<String>,
        /// Delay between task status checks, in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        /// Failed status checks in a row before processing is declared failed
        #[arg(long)]
        max_poll_failures: Option<u32>,
        /// Send refinement instructions to the backend (true) or only acknowledge them
        #[arg(long)]
        refinement: Option<bool>,
    },
}

fn main() {
    let args = Args::parse();

    let result = match args.command {
        Command::Run {
            file,
            views,
            style,
            prompt,
            strength,
            out,
            refine,
            api,
        } => plancraft_lib::run(RunOptions {
            file,
            views,
            style,
            prompt,
            strength,
            out,
            refine,
            api,
        }),
        Command::Config {
            api,
            poll_interval_ms,
            max_poll_failures,
            refinement,
        } => plancraft_lib::configure(ConfigUpdate {
            api,
            poll_interval_ms,
            max_poll_failures,
            refinement,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
