use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use colored::*;
use netaudit::{
    config::{AuditConfig, OutputFormat},
    credentials::Credentials,
    discovery::{HostScanner, TcpConnectProbe},
    inventory::{CollectionPlan, InventoryCollector},
    output::{print_summary, sink_for},
    session::{WinRmConfig, WinRmTransport},
    CollectionCoordinator, CoordinatorOptions,
};
use tokio_util::sync::CancellationToken;

// Ulimit adjustment for Unix systems
#[cfg(unix)]
fn adjust_ulimit_size(ulimit: Option<u64>) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            println!(
                "{} {}",
                "[~] Automatically increasing ulimit value to".bright_blue(),
                limit.to_string().bright_cyan().bold()
            );
        } else {
            eprintln!("{}", "[!] ERROR: Failed to set ulimit value.".bright_red());
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(_) => {
            eprintln!("{}", "[!] WARNING: Could not get file descriptor limit".bright_yellow());
            65535
        }
    }
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_ulimit: Option<u64>) -> u64 {
    65535
}

fn build_cli() -> Command {
    Command::new("netaudit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Discover Windows hosts on a subnet and collect software, USB device and device-event inventory over WinRM")
        .after_help(
            "Credentials are read from NETAUDIT_USERNAME / NETAUDIT_PASSWORD (or USERNAME / PASSWORD), \
             optionally via a .env file in the working directory.",
        )
        .arg(
            Arg::new("target")
                .value_name("CIDR")
                .help("Network to audit, e.g. 192.168.1.0/24 (default from config)")
                .index(1),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Remote management port, used for liveness and sessions")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("tls")
                .long("tls")
                .help("Connect to the management endpoint over https")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan-parallelism")
                .long("scan-parallelism")
                .value_name("COUNT")
                .help("Concurrent liveness probes")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("collect-parallelism")
                .short('j')
                .long("collect-parallelism")
                .value_name("COUNT")
                .help("Hosts collected concurrently")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("probe-timeout")
                .long("probe-timeout")
                .value_name("MS")
                .help("Liveness probe timeout in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("operation-timeout")
                .long("operation-timeout")
                .value_name("MS")
                .help("Timeout for each remote operation in milliseconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("event-window")
                .short('n')
                .long("event-window")
                .value_name("N")
                .help("Most recent device events collected per host")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("retries")
                .long("retries")
                .value_name("COUNT")
                .help("Extra connect attempts after a transport failure")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("deadline")
                .long("deadline")
                .value_name("SECONDS")
                .help("Stop starting new hosts after this many seconds")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory the report files are written to"),
        )
        .arg(
            Arg::new("output-format")
                .short('f')
                .long("output-format")
                .value_name("FORMAT")
                .help("Report format")
                .value_parser(["csv", "json"]),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file (default ~/.netaudit.toml)"),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Automatically increase ulimit to this value")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Command-line values win over the config file
fn apply_overrides(config: &mut AuditConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    if let Some(target) = matches.get_one::<String>("target") {
        config.target = target.clone();
    }
    if let Some(&port) = matches.get_one::<u16>("port") {
        config.port = port;
    }
    if matches.get_flag("tls") {
        config.use_tls = true;
    }
    if let Some(&n) = matches.get_one::<usize>("scan-parallelism") {
        config.scan_parallelism = n;
    }
    if let Some(&n) = matches.get_one::<usize>("collect-parallelism") {
        config.collect_parallelism = n;
    }
    if let Some(&ms) = matches.get_one::<u64>("probe-timeout") {
        config.probe_timeout = ms;
    }
    if let Some(&ms) = matches.get_one::<u64>("operation-timeout") {
        config.operation_timeout = ms;
    }
    if let Some(&n) = matches.get_one::<usize>("event-window") {
        config.event_window = n;
    }
    if let Some(&n) = matches.get_one::<u32>("retries") {
        config.connect_retries = n;
    }
    if let Some(&secs) = matches.get_one::<u64>("deadline") {
        config.deadline = Some(secs);
    }
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(format) = matches.get_one::<String>("output-format") {
        config.output_format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = build_cli().get_matches();

    let mut config = if let Some(config_file) = matches.get_one::<String>("config") {
        match AuditConfig::from_toml_file(config_file) {
            Ok(config) => {
                println!("[~] Loaded config from {}", config_file);
                config
            }
            Err(e) => {
                eprintln!("{} {}", "[!]".bright_red(), e);
                process::exit(2);
            }
        }
    } else {
        AuditConfig::load_default_config()
    };
    apply_overrides(&mut config, &matches)?;

    if let Err(e) = config.validate() {
        eprintln!("{} {}", "[!]".bright_red(), e);
        process::exit(2);
    }
    let range = config.address_range()?;

    let credentials = match Credentials::from_env() {
        Ok(credentials) => Arc::new(credentials),
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(2);
        }
    };

    let fd_limit = adjust_ulimit_size(matches.get_one::<u64>("ulimit").copied());
    if let Some(parallelism) = config.fit_scan_parallelism(fd_limit) {
        println!(
            "{} {} {}",
            "[~] Lowering scan parallelism to".bright_blue(),
            parallelism.to_string().bright_cyan().bold(),
            format!("(file descriptor limit {})", fd_limit).bright_blue()
        );
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "[!] Interrupted, finishing hosts in progress".bright_yellow());
                cancel.cancel();
            }
        });
    }
    if let Some(deadline) = config.deadline_duration() {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            log::warn!("Run deadline of {:?} reached", deadline);
            cancel.cancel();
        });
    }

    println!(
        "{} {} {} {}",
        "[~] Probing".bright_blue(),
        range.to_string().bright_cyan(),
        "on port".bright_blue(),
        config.port.to_string().bright_cyan()
    );
    let probe = TcpConnectProbe::new(config.port, config.probe_timeout_duration());
    let hosts = HostScanner::with_parallelism(probe, config.scan_parallelism)
        .scan_until(&range, &cancel)
        .await;
    println!(
        "{} {} reachable hosts",
        "[✓]".bright_green(),
        hosts.len().to_string().bright_white().bold()
    );

    let transport = Arc::new(WinRmTransport::new(WinRmConfig {
        port: config.port,
        use_tls: config.use_tls,
        operation_timeout: config.operation_timeout_duration(),
    })?);
    // The run-wide deadline above already covers collection
    let options = CoordinatorOptions {
        deadline: None,
        ..CoordinatorOptions::from_config(&config)
    };
    let coordinator = CollectionCoordinator::new(
        transport,
        credentials,
        InventoryCollector::new(CollectionPlan::from_config(&config)),
        options,
    );

    let mut report = coordinator.run_until(&hosts, cancel).await;
    report.normalize();
    print_summary(&report.summary());

    let sink = sink_for(config.output_format, &config.output_dir);
    if let Err(e) = sink.write(&report) {
        eprintln!("{} {}", "[!] Failed to write report:".bright_red(), e);
        process::exit(1);
    }
    for path in sink.outputs() {
        println!("{} {}", "[✓] Wrote".bright_green(), path.display().to_string().bright_cyan());
    }

    Ok(())
}
