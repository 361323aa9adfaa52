use std::fs;

use incontext_engine::demonstration::run_demonstration;
use incontext_engine::interpreter::RealmConfig;
use incontext_engine::receiver::EvaluationMode;

fn main() {
    let exit_code = match run(std::env::args().skip(1).collect()) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{error}");
            2
        }
    };
    std::process::exit(exit_code);
}

#[derive(Debug, Default)]
struct Options {
    config_path: Option<String>,
    mode: Option<EvaluationMode>,
    include_rejected: bool,
    events: bool,
}

fn run(args: Vec<String>) -> Result<i32, String> {
    let options = match parse_args(&args)? {
        Some(options) => options,
        None => {
            println!("{}", usage());
            return Ok(0);
        }
    };

    let mut config = match &options.config_path {
        Some(path) => load_config(path)?,
        None => RealmConfig::default(),
    };
    if let Some(mode) = options.mode {
        config.mode = mode;
    }

    let report = run_demonstration(config, options.include_rejected)
        .map_err(|error| format!("demonstration failed: {error:#}"))?;

    for line in &report.lines {
        println!("{line}");
    }
    if options.include_rejected {
        println!("Rejected call sites ({})", report.mode.as_str());
        for line in &report.rejected_lines {
            println!("{line}");
        }
        for rejection in &report.rejections {
            println!("{}", rejection.trace_line());
        }
    }
    if options.events {
        for event in &report.events {
            println!(
                "{}",
                serde_json::to_string(event)
                    .map_err(|error| format!("failed to encode trace event: {error}"))?
            );
        }
    }
    println!("transcript sha256: {}", report.transcript_sha256);
    Ok(0)
}

/// `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--mode" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| "--mode requires strict|sloppy".to_string())?;
                let mode = EvaluationMode::parse(value)
                    .ok_or_else(|| format!("unknown mode '{value}'\n\n{}", usage()))?;
                options.mode = Some(mode);
            }
            "--config" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| "--config requires a path".to_string())?;
                options.config_path = Some(value.clone());
            }
            "--include-rejected" => options.include_rejected = true,
            "--events" => options.events = true,
            "help" | "--help" | "-h" => return Ok(None),
            flag => return Err(format!("unknown flag '{flag}'\n\n{}", usage())),
        }
        index += 1;
    }
    Ok(Some(options))
}

fn load_config(path: &str) -> Result<RealmConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed to read config {path}: {error}"))?;
    serde_json::from_str(&raw).map_err(|error| format!("failed to parse config {path}: {error}"))
}

fn usage() -> String {
    [
        "incontext_trace usage:",
        "  incontext_trace [--mode strict|sloppy] [--include-rejected] [--events] [--config <path>]",
        "",
        "  --mode              receiver fallback for plain calls (default strict)",
        "  --include-rejected  also run the call sites that fail under strict evaluation",
        "  --events            print structured trace events as JSON lines",
        "  --config            load a JSON RealmConfig",
        "",
        "exit codes:",
        "  0   trace completed",
        "  2   CLI/input error or demonstration failure",
    ]
    .join("\n")
}
