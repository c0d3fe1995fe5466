use wrapped::config;
use wrapped::export::ExportDataset;
use wrapped::report::{ReportOptions, WrappedReport};

fn main() -> anyhow::Result<()> {
    parse_args(std::env::args().skip(1).collect())?;
    wrapped::logging::init_tracing()?;

    let config = config::load_config()?;
    let dataset = ExportDataset::load(&config)?;
    let report = WrappedReport::build(
        &dataset,
        &ReportOptions {
            year: config.year,
            top_k: config.top_k,
        },
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_args(args: Vec<String>) -> anyhow::Result<()> {
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
    }
    Ok(())
}

fn print_help() {
    println!("wrapped: listening statistics from a streaming-service data export");
    println!("  Prints the report as JSON on stdout; warnings go to stderr.");
    println!();
    println!("  WRAPPED_CONFIG_DIR  directory holding config.json");
    println!("  WRAPPED_DATA_DIR    export root (default ../data)");
    println!("  WRAPPED_YEAR        restrict every section to one year");
    println!("  RUST_LOG            log filter (default info)");
}
