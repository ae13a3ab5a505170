use clap::Parser;
use core::cell::RefCell;
use dmc_core::mk_static;
use dmc_core::utils::{
    EmbassyClock, MotionProfile, MotorCommand, SystemController, MOTOR_CHANNEL, REPORT_CHANNEL,
};
use embassy_executor::{Executor, Spawner};
use static_cell::StaticCell;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod demo;
mod sim;

use sim::SimBus;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// I2C address of the sorter motor
    #[clap(long, value_parser = parse_address, default_value = "0x60")]
    sorter: u8,
    /// I2C address of the eject motor
    #[clap(long, value_parser = parse_address, default_value = "0x65")]
    eject: u8,
    /// addresses that answer on the simulated bus
    #[clap(long, value_parser = parse_address, value_delimiter = ',', default_value = "0x60,0x65")]
    devices: Vec<u8>,
    /// latch an overcurrent on every Nth fault read of a driving motor
    #[clap(long)]
    fault_every: Option<u32>,
    /// fail every bus transfer after this many
    #[clap(long)]
    fail_after: Option<u32>,
    /// give up a rotation after this many fault retries
    #[clap(long)]
    max_fault_retries: Option<u32>,
    /// JSON-lines command script to run instead of the built-in demo
    #[clap(long)]
    script: Option<PathBuf>,
}

fn parse_address(s: &str) -> Result<u8, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|e| format!("invalid I2C address {s:?}: {e}"))
}

#[embassy_executor::task]
async fn motor_task(mut ctrl: SystemController<'static, SimBus, EmbassyClock>) -> ! {
    ctrl.motor_ch().await
}

#[embassy_executor::task]
async fn main_task(
    spawner: Spawner,
    opts: Opts,
    commands: Vec<MotorCommand>,
) {
    // Simulated bus setup
    let bus = SimBus::new(&opts.devices, opts.fault_every, opts.fail_after);
    let i2c_bus: &'static RefCell<SimBus> = mk_static!(RefCell<SimBus>, RefCell::new(bus));

    let profile = MotionProfile {
        max_fault_retries: opts.max_fault_retries,
        ..MotionProfile::default()
    };
    let sys_ctrl = SystemController::new(
        i2c_bus,
        EmbassyClock,
        Some(opts.sorter),
        Some(opts.eject),
        Some(profile),
    );
    if sys_ctrl.sorter.is_none() || sys_ctrl.eject.is_none() {
        error!("motor initialization failed, terminating");
        std::process::exit(1);
    }
    spawner.spawn(motor_task(sys_ctrl)).unwrap();

    info!("Running {} motor commands", commands.len());
    for command in commands {
        MOTOR_CHANNEL.sender().send(command).await;
        let report = REPORT_CHANNEL.receiver().receive().await;
        match report.result {
            Ok(_) => info!(
                "report: {}",
                serde_json::to_string(&report).unwrap_or_else(|_| format!("{:?}", report))
            ),
            Err(failure) if failure.is_fatal() => {
                error!(?failure, ?command, "unrecoverable motor failure, terminating");
                std::process::exit(1);
            }
            Err(failure) => warn!(?failure, ?command, "motor command failed"),
        }
    }

    info!("Sequence finished");
    std::process::exit(0);
}

static EXECUTOR: StaticCell<Executor> = StaticCell::new();

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts: Opts = Opts::parse();
    let commands = match &opts.script {
        Some(path) => match demo::load_script(path) {
            Ok(commands) => commands,
            Err(e) => {
                error!("failed to load script {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => demo::demo_sequence(),
    };

    let executor = EXECUTOR.init(Executor::new());
    executor.run(|spawner| {
        spawner.spawn(main_task(spawner, opts, commands)).unwrap();
    });
}
