fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    args.iter()
        .find_map(|a| a.strip_prefix(prefix.as_str()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tour-engine --tour-smoke[=home|scanner|profile|all] [--user=<id>] [--config=<path>]");
    eprintln!("  tour-engine --preview=<home|scanner|profile> [--config=<path>]");
    eprintln!("  tour-engine --reset-flags --user=<id> [--config=<path>]");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Shared by every mode. Without it, ./tour.toml is used when present.
    let config = arg_value(&args, "--config").map(std::path::PathBuf::from);
    let user = arg_value(&args, "--user");

    // Non-interactive tour smoke (simulated screens, deterministic).
    // Writes `tour_smoke_transcript.log` under the log folder and exits 0/1.
    // Usage: --tour-smoke or --tour-smoke=home|scanner|profile|all
    if let Some(arg) = args
        .iter()
        .find(|a| a.as_str() == "--tour-smoke" || a.starts_with("--tour-smoke="))
    {
        let target = arg
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty());
        tour_engine::run_tour_smoke(target, config, user);
        return;
    }

    // Single-frame overlay preview, printed to stdout.
    if let Some(screen) = arg_value(&args, "--preview") {
        tour_engine::run_preview(screen, config);
        return;
    }

    // Administrative flag reset.
    if args.iter().any(|a| a == "--reset-flags") {
        tour_engine::run_reset_flags(user, config);
        return;
    }

    print_usage();
    std::process::exit(2);
}
