use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pdfpick")]
#[command(about = "Pick pages out of a PDF: thumbnails, range selection and extraction")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Thumbnail resolution, overrides the config file
    #[arg(long, global = true)]
    pub dpi: Option<f32>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as MCP server over stdio, holding one page-selection session
    Mcp,

    /// Rasterize every page and list the thumbnails
    Pages {
        /// PDF file to load
        path: PathBuf,

        /// Copy the thumbnails here instead of discarding them on exit
        #[arg(short, long)]
        keep: Option<PathBuf>,
    },

    /// Select page ranges and save them as a new PDF
    #[command(alias = "cat")]
    Extract {
        /// PDF file to extract from
        path: PathBuf,

        /// Page ranges (e.g., "1-3,5,7")
        pages: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}
