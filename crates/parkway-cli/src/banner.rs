use parkway_config::AppConfig;

/// Print the startup banner with a config summary.
pub fn print_banner(config: &AppConfig, migrations: usize) {
    let version = env!("CARGO_PKG_VERSION");

    let url = format!("http://{}:{}", config.server.host, config.server.port);
    let database = config.database.path.to_string_lossy().to_string();
    let source = match &config.database.migrations_dir {
        Some(dir) => dir.to_string_lossy().to_string(),
        None => "embedded".to_string(),
    };
    let schema = format!(
        "{migrations} migration{} ({source})",
        if migrations == 1 { "" } else { "s" }
    );
    let grace = format!("{}s grace", config.server.shutdown_grace_secs);

    // Layout
    let width: usize = 64;
    let label_w: usize = 12;
    let value_w = width - label_w - 4; // "│ " + label + " " + value + "│"

    let title = format!("{} v{version}", config.app_name);
    let title_dashes = width.saturating_sub(title.chars().count() + 7);
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));

    let row = |l: &str, r: &str| {
        let r: String = r.chars().take(value_w).collect();
        format!("│ {:<label_w$} {:<value_w$}│", l, r)
    };

    println!("{top}");
    println!("{}", row("", ""));
    println!("{}", row("Listening", &url));
    println!("{}", row("Database", &database));
    println!("{}", row("Schema", &schema));
    println!("{}", row("Shutdown", &grace));
    println!("{}", row("", "Press Ctrl+C to stop"));
    println!("{}", row("", ""));
    println!("{bottom}");
}
