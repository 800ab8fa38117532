use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use heatmap::gpkg::{GpkgConverter, layer_listing};

/// Convert a GeoPackage layer to GeoJSON.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// GeoPackage to read
    input: PathBuf,

    /// Output file, defaults to INPUT with a `.geojson` extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Layer to convert, defaults to the first feature layer
    #[arg(short, long)]
    layer: Option<String>,

    /// Print the available layers and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut converter = GpkgConverter::open(&args.input).await?;

    if args.list {
        print!("{}", layer_listing(&converter.list_layers().await?));
        return Ok(());
    }

    let export = converter
        .export(args.output.as_deref(), args.layer.as_deref())
        .await
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    if export.first_layer {
        println!("No layer specified, using the first layer: {}", export.layer);
    }

    println!(
        "Converted {} features from '{}' to {}",
        export.features,
        export.layer,
        export.output.display()
    );

    Ok(())
}
