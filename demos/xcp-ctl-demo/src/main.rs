//-----------------------------------------------------------------------------
// xcp-ctl-demo
// Minimal command-line glue around the xcp_master core: connects to a slave over Ethernet,
// reads its identification, plans and runs a short DAQ measurement for a handful of named
// variables, records it to a .xmraw file and prints the replayed frame count. This binary is
// the "glue layer" spec.md section 6 describes -- CLI args, config loading, logging setup --
// none of which belongs in the core crate itself.
//
// Run:
// cargo r -p xcp-ctl-demo -- -d 127.0.0.1:5555 -m Counter.Sin -t 2000

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use xcp_master::config::Config;
use xcp_master::daq::planner::{self, PlannerLimits};
use xcp_master::policy::{AcquisitionPolicy, NoOpPolicy};
use xcp_master::recorder::{RecorderPolicy, RecorderStrictness, RecorderWriter};
use xcp_master::session::XcpSession;
use xcp_master::transport::eth::EthTransport;
use xcp_master::types::{DataType, Measurement};

#[derive(Parser, Debug)]
#[command(version, about = "XCP master CLI: connect, identify, measure, record", long_about = None)]
struct Args {
    /// Configuration file (TOML/JSON); unset sections fall back to defaults
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Log level (Off=0, Error=1, Warn=2, Info=3, Debug=4, Trace=5)
    #[arg(short, long, default_value_t = 3)]
    log_level: u8,

    /// XCP slave address
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    dest_addr: String,

    /// Variable name to measure (address:ext:size, e.g. 1000:0:4), may repeat
    #[arg(short, long, value_delimiter = ' ', num_args = 0..)]
    measure: Vec<String>,

    /// Measurement duration in ms
    #[arg(short, long, default_value_t = 2000)]
    time_ms: u64,

    /// Record the measurement to this .xmraw file stem
    #[arg(short, long)]
    record: Option<String>,
}

trait ToLogLevelFilter {
    fn to_log_level_filter(self) -> log::LevelFilter;
}

impl ToLogLevelFilter for u8 {
    fn to_log_level_filter(self) -> log::LevelFilter {
        match self {
            0 => log::LevelFilter::Off,
            1 => log::LevelFilter::Error,
            2 => log::LevelFilter::Warn,
            3 => log::LevelFilter::Info,
            4 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Parses one `address:ext:size` triple from the command line into a Measurement whose name is
/// the triple itself (a real glue layer would resolve names through an A2L reader, out of scope
/// for this core per spec.md section 1).
fn parse_measurement(spec: &str) -> Result<Measurement> {
    let mut parts = spec.split(':');
    let addr = u32::from_str_radix(parts.next().context("missing address")?.trim_start_matches("0x"), 16)
        .or_else(|_| spec.split(':').next().unwrap().parse::<u32>())
        .context("invalid address")?;
    let ext: u8 = parts.next().unwrap_or("0").parse().context("invalid extension")?;
    let size: usize = parts.next().unwrap_or("4").parse().context("invalid size")?;
    let data_type = match size {
        1 => DataType::U8,
        2 => DataType::U16,
        8 => DataType::U64,
        _ => DataType::U32,
    };
    Ok(Measurement { name: spec.to_string(), address: addr, ext, data_type })
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        None => Ok(Config::default()),
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading config file {p}"))?;
            #[cfg(feature = "serde-config")]
            {
                serde_json::from_str(&text).with_context(|| format!("parsing config file {p} as JSON"))
            }
            #[cfg(not(feature = "serde-config"))]
            {
                let _ = text;
                anyhow::bail!("reading a config file requires the serde-config feature")
            }
        }
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = load_config(args.config.as_deref())?;

    let dest_addr: SocketAddr = args.dest_addr.parse().context("invalid --dest-addr")?;
    let timeout_ms = (cfg.transport.timeout_seconds * 1000.0) as u64;

    let mut eth_cfg = cfg.transport.eth.clone();
    eth_cfg.host = dest_addr.ip().to_string();
    eth_cfg.port = dest_addr.port();

    let recorder_policy = match &args.record {
        Some(stem) => {
            let writer = RecorderWriter::create(stem, 64, 256, 4, RecorderStrictness::Lenient)?;
            info!("recording to {stem}.xmraw");
            Some(Arc::new(RecorderPolicy::new(writer)))
        }
        None => None,
    };
    let policy: Arc<dyn xcp_master::policy::AcquisitionPolicy> = match &recorder_policy {
        Some(p) => p.clone(),
        None => Arc::new(NoOpPolicy),
    };
    let transport = EthTransport::connect(&eth_cfg, timeout_ms, policy, 255, 1500).context("opening Ethernet transport")?;
    let session = XcpSession::new(Arc::new(transport), cfg.general.max_retries, None);

    info!("connecting to {dest_addr}");
    session.connect(0)?;
    let id = session.get_id_string(1).unwrap_or_else(|e| {
        warn!("GET_ID failed: {e}");
        String::new()
    });
    let props = session.slave_properties().expect("connect() always populates slave properties on success");
    info!(
        "connected: id=\"{id}\" max_cto={} max_dto={} byte_order={:?}",
        props.max_cto, props.max_dto, props.byte_order
    );

    if !args.measure.is_empty() {
        let measurements: Vec<Measurement> = args.measure.iter().map(|s| parse_measurement(s)).collect::<Result<_>>()?;
        let limits = PlannerLimits { bin_capacity: props.max_dto as usize - 2, bin_capacity_first: props.max_dto as usize - 2 - 4 };
        let odts = planner::plan(&measurements, limits).context("planning DAQ layout")?;
        info!("planned {} ODT(s) for {} measurement(s)", odts.len(), measurements.len());

        let mut lists = vec![xcp_master::types::DaqList {
            name: "demo".into(),
            event_channel: 0,
            direction: xcp_master::types::DaqDirection::Daq,
            enable_timestamps: true,
            prescaler: 1,
            priority: 0,
            measurements,
            planned_odts: odts,
            first_pid: None,
        }];
        session.configure_daq_lists(&mut lists)?;
        session.start_daq_lists(&[0])?;

        std::thread::sleep(Duration::from_millis(args.time_ms));
        session.stop_all_daq_lists()?;
    }

    session.disconnect()?;
    if let Some(p) = &recorder_policy {
        p.finalize();
    }
    info!("disconnected");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .target(env_logger::Target::Stdout)
        .filter_level(args.log_level.to_log_level_filter())
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    match run(args) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            if let Some(xcp_master::XcpCoreError::Timeout(_)) = e.downcast_ref::<xcp_master::XcpCoreError>() {
                eprintln!("error: {e}");
                ExitCode::from(2)
            } else {
                eprintln!("error: {e}");
                ExitCode::from(1)
            }
        }
    }
}
