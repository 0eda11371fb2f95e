use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use foxess_cloud::api::{
    RealTimeApiVersion, ReportDimension, ReportQuery, ScalarValue, ScheduleGroup,
    SchedulerSetRequest,
};
use foxess_cloud::coordinator::{
    DeviceDetailCoordinator, RealTimeCoordinator, SchedulerCoordinator, has_scheduler,
};
use foxess_cloud::logging::{get_logger, init_logging};
use foxess_cloud::projection::{
    DeviceInfo, Projection, api_call_projection, check_group_numbers, check_setting_value,
    detail_projections, project_all, realtime_projections, scheduler_projections,
};
use foxess_cloud::{ApiCallTracker, Config, FoxessClient, FoxessError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Command line access to the FoxESS Cloud OpenAPI
#[derive(Parser, Debug)]
#[command(version = env!("APP_VERSION"), about, long_about = None)]
struct Cli {
    /// FoxESS Cloud API key; overrides the configuration file
    #[arg(long, env = "FOXESS_API_KEY", global = true, hide_env_values = true)]
    api_key: Option<String>,

    /// Configuration file; default locations are searched when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the FoxESS Cloud base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log request payloads and errno/message pairs
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List inverters linked to the account
    ListInverters {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
        /// Follow pages until the whole list is fetched
        #[arg(long)]
        all: bool,
    },
    /// Read a device setting
    GetSetting {
        #[arg(long)]
        sn: String,
        #[arg(long)]
        key: String,
    },
    /// Write a device setting; numeric values are sent as numbers
    SetSetting {
        #[arg(long)]
        sn: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// Show device detail
    DeviceDetail {
        #[arg(long)]
        sn: String,
    },
    /// Show battery SOC limits
    BatterySoc {
        #[arg(long)]
        sn: String,
    },
    /// Show generation totals
    Generation {
        #[arg(long)]
        sn: String,
    },
    /// Query the production report
    ProductionReport {
        #[arg(long)]
        sn: String,
        /// year, month or day
        #[arg(long)]
        dimension: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        day: Option<u32>,
        #[arg(long, num_args = 0..)]
        variables: Vec<String>,
    },
    /// Real-time data for one or more devices
    RealTime {
        #[arg(long, num_args = 1.., required = true)]
        sns: Vec<String>,
        #[arg(long, num_args = 0..)]
        variables: Vec<String>,
        #[arg(long, default_value = "v1")]
        api_version: String,
    },
    /// Real-time data for a single device keyed by variable name
    RealTimeSnapshot {
        #[arg(long)]
        sn: String,
        #[arg(long, num_args = 0..)]
        variables: Vec<String>,
        #[arg(long, default_value = "v1")]
        api_version: String,
    },
    /// Show scheduler time segments
    Scheduler {
        #[arg(long)]
        sn: String,
    },
    /// Replace the schedule with a single time segment
    SchedulerSetOne {
        #[arg(long)]
        sn: String,
        #[arg(long, default_value_t = 1)]
        group_enable: u8,
        #[arg(long)]
        start_hour: u8,
        #[arg(long)]
        start_minute: u8,
        #[arg(long)]
        end_hour: u8,
        #[arg(long)]
        end_minute: u8,
        /// e.g. SelfUse, ForceCharge, ForceDischarge, PeakShaving
        #[arg(long)]
        work_mode: String,
        #[arg(long)]
        min_soc_on_grid: i64,
        #[arg(long)]
        fd_soc: i64,
        #[arg(long)]
        fd_pwr: f64,
        #[arg(long)]
        max_soc: i64,
    },
    /// Remove every scheduler time segment
    SchedulerClear {
        #[arg(long)]
        sn: String,
    },
    /// Poll the configured device on the coordinator intervals until Ctrl-C
    Monitor {
        /// Device serial; defaults to device.serial from the configuration
        #[arg(long)]
        sn: Option<String>,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    if let Some(key) = &cli.api_key {
        config.api.api_key = key.trim().to_string();
    }
    if let Some(url) = &cli.base_url {
        config.api.base_url = url.clone();
    }
    if cli.debug {
        config.api.debug = true;
        config.logging.level = "DEBUG".to_string();
    }
    if config.api.api_key.is_empty() {
        anyhow::bail!("An API key is required (--api-key, FOXESS_API_KEY or api.api_key)");
    }
    config
        .validate_connection()
        .context("Invalid configuration")?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> foxess_cloud::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code_for(err: &FoxessError) -> ExitCode {
    if err.is_auth() {
        eprintln!("Auth failed: {}", err);
        ExitCode::from(2)
    } else if err.is_connection() {
        eprintln!("Connection error: {}", err);
        ExitCode::from(3)
    } else {
        eprintln!("{}", err);
        ExitCode::from(4)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    let tracker = Arc::new(ApiCallTracker::new());
    let client = Arc::new(FoxessClient::from_config(&config.api)?.with_call_tracker(tracker));

    match run(cli.command, client, &config).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => Ok(exit_code_for(&err)),
    }
}

async fn run(
    command: Commands,
    client: Arc<FoxessClient>,
    config: &Config,
) -> foxess_cloud::Result<()> {
    match command {
        Commands::ListInverters {
            page,
            page_size,
            all,
        } => {
            let inverters = if all {
                client.list_all_inverters(page_size).await?
            } else {
                client.list_inverters(page, page_size).await?
            };
            print_json(&inverters)
        }
        Commands::GetSetting { sn, key } => print_json(&client.get_setting(&sn, &key).await?),
        Commands::SetSetting { sn, key, value } => {
            let value = ScalarValue::coerce(&value);
            check_setting_value(&key, &value)?;
            let result = client.set_setting(&sn, &key, value).await?;
            print_json(&result)
        }
        Commands::DeviceDetail { sn } => print_json(&client.get_device_detail(&sn).await?),
        Commands::BatterySoc { sn } => print_json(&client.get_battery_soc(&sn).await?),
        Commands::Generation { sn } => print_json(&client.get_generation(&sn).await?),
        Commands::ProductionReport {
            sn,
            dimension,
            year,
            month,
            day,
            variables,
        } => {
            let dimension: ReportDimension = dimension.parse()?;
            let mut query = ReportQuery::new(sn, dimension, year).with_variables(variables);
            query.month = month;
            query.day = day;
            print_json(&client.get_production_report(&query).await?)
        }
        Commands::RealTime {
            sns,
            variables,
            api_version,
        } => {
            let version: RealTimeApiVersion = api_version.parse()?;
            print_json(&client.get_real_time_data(&sns, &variables, version).await?)
        }
        Commands::RealTimeSnapshot {
            sn,
            variables,
            api_version,
        } => {
            let version: RealTimeApiVersion = api_version.parse()?;
            print_json(&client.get_real_time_snapshot(&sn, &variables, version).await?)
        }
        Commands::Scheduler { sn } => print_json(&client.get_scheduler(&sn).await?),
        Commands::SchedulerSetOne {
            sn,
            group_enable,
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            work_mode,
            min_soc_on_grid,
            fd_soc,
            fd_pwr,
            max_soc,
        } => {
            let group = ScheduleGroup {
                enable: group_enable,
                start_hour,
                start_minute,
                end_hour,
                end_minute,
                work_mode,
                min_soc_on_grid,
                fd_soc,
                fd_pwr,
                max_soc,
            };
            check_group_numbers(&group)?;
            client
                .set_scheduler(&SchedulerSetRequest::single(sn, group))
                .await?;
            println!("OK");
            Ok(())
        }
        Commands::SchedulerClear { sn } => {
            client.set_scheduler(&SchedulerSetRequest::clear(sn)).await?;
            println!("OK");
            Ok(())
        }
        Commands::Monitor { sn } => {
            let sn = sn.unwrap_or_else(|| config.device.serial.clone());
            if sn.trim().is_empty() {
                return Err(FoxessError::validation(
                    "device.serial",
                    "A device serial is required (--sn or device.serial)",
                ));
            }
            monitor(client, &sn, config).await
        }
    }
}

/// Print one line of `key=value` pairs for the enabled projections
fn print_projected<T>(label: &str, table: &[Projection<T>], source: &T) {
    let fields: Vec<String> = project_all(table, source)
        .into_iter()
        .filter(|(projection, _)| projection.enabled_by_default)
        .filter_map(|(projection, value)| {
            value.map(|v| match projection.unit {
                Some(unit) => format!("{}={} {}", projection.key, v, unit),
                None => format!("{}={}", projection.key, v),
            })
        })
        .collect();
    println!("[{}] {}", label, fields.join(", "));
}

/// Refresh errors other than authentication are logged and retried on the
/// next tick
fn keep_going(err: FoxessError) -> foxess_cloud::Result<()> {
    if err.is_auth() {
        return Err(err);
    }
    get_logger("monitor").warn(&err.to_string());
    Ok(())
}

async fn monitor(client: Arc<FoxessClient>, sn: &str, config: &Config) -> foxess_cloud::Result<()> {
    monitor_until(client, sn, config, tokio::signal::ctrl_c()).await
}

/// Run the refresh loop until `shutdown` resolves
///
/// `shutdown` is created once and polled across iterations, so a signal
/// delivered while a refresh is in flight is seen on the next pass.
async fn monitor_until<F: Future>(
    client: Arc<FoxessClient>,
    sn: &str,
    config: &Config,
    shutdown: F,
) -> foxess_cloud::Result<()> {
    tokio::pin!(shutdown);
    let logger = get_logger("monitor");
    let detail = DeviceDetailCoordinator::new(client.clone(), sn, config.refresh.detail_interval());
    let realtime = RealTimeCoordinator::from_config(client.clone(), sn, &config.refresh)?;

    let first_detail = detail.refresh().await?;
    let scheduler = has_scheduler(Some(first_detail.as_ref())).then(|| {
        SchedulerCoordinator::new(client.clone(), sn, config.refresh.scheduler_interval())
    });
    logger.info(&format!(
        "Monitoring {} ({}), real-time every {}s, scheduler {}",
        config.device_name(),
        sn,
        realtime.update_interval().as_secs(),
        if scheduler.is_some() {
            "enabled"
        } else {
            "not supported"
        }
    ));

    let detail_table = detail_projections();
    let realtime_table = realtime_projections();
    let scheduler_table = scheduler_projections();
    let calls = api_call_projection();

    let name = Some(config.device_name())
        .filter(|n| !n.is_empty())
        .unwrap_or(sn);
    let device = DeviceInfo::from_detail(sn, name, Some(first_detail.as_ref()));
    println!(
        "[device] {} {} (model {}, software {})",
        device.manufacturer,
        device.name,
        device.model.as_deref().unwrap_or("unknown"),
        device.sw_version.as_deref().unwrap_or("unknown")
    );
    print_projected("detail", &detail_table, first_detail.as_ref());

    let mut detail_tick = tokio::time::interval(detail.update_interval());
    let mut realtime_tick = tokio::time::interval(realtime.update_interval());
    let mut scheduler_tick = tokio::time::interval(
        scheduler
            .as_ref()
            .map_or(config.refresh.scheduler_interval(), |s| s.update_interval()),
    );
    // The detail was just fetched
    detail_tick.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                logger.info("Interrupted, stopping monitor");
                return Ok(());
            }
            _ = detail_tick.tick() => match detail.refresh().await {
                Ok(d) => print_projected("detail", &detail_table, d.as_ref()),
                Err(err) => keep_going(err)?,
            },
            _ = realtime_tick.tick() => {
                match realtime.refresh().await {
                    Ok(snapshot) => print_projected("realtime", &realtime_table, snapshot.as_ref()),
                    Err(err) => keep_going(err)?,
                }
                if let Some(tracker) = client.call_tracker() {
                    print_projected("api", std::slice::from_ref(&calls), tracker.as_ref());
                }
            }
            _ = scheduler_tick.tick(), if scheduler.is_some() => {
                if let Some(scheduler) = &scheduler {
                    match scheduler.refresh().await {
                        Ok(view) => print_projected("scheduler", &scheduler_table, view.as_ref()),
                        Err(err) => keep_going(err)?,
                    }
                }
            }
        }
    }
}
