//! Runs one device command on a worker thread.
//!
//! The main thread drains the session log while the worker runs. A line typed on stdin asks the
//! running operation to stop.

use anyhow::{Context, Result, anyhow, bail};
use indicatif::MultiProgress;
use picboot_lib::log::LogSink;
use picboot_lib::progress::no_op_progress_callback;
use picboot_lib::{
    AddressRange, Bootloader, DeviceProfile, HexImage, LogReceiver, MemoryBlock, QueueLogSink,
    SessionHandle, log_queue,
};
use std::io::{self, BufRead, IsTerminal};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::cli::{Commands, Settings};
use crate::progress::create_progress_callback;

const LOG_QUEUE_CAPACITY: usize = 64;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub fn run_command(settings: Settings, command: Commands) -> Result<()> {
    let (sink, logs) = log_queue(LOG_QUEUE_CAPACITY);
    // log lines go through the bars only when bars are drawn
    let multi_progress = (!settings.quiet && io::stdout().is_terminal()).then(MultiProgress::new);
    let progress = if settings.quiet {
        no_op_progress_callback()
    } else {
        create_progress_callback(multi_progress.as_ref())
    };

    let mut bootloader = Bootloader::new(sink.clone()).with_progress(progress);
    bootloader
        .open(&settings.port, settings.baud, settings.timeout)
        .with_context(|| format!("Can't open selected serial port {}", settings.port))?;
    tracing::info!(
        "{} opened at {} baud for {}",
        settings.port,
        settings.baud,
        settings.profile.name
    );

    spawn_cancel_listener(bootloader.handle());

    let worker = thread::spawn(move || {
        let result = dispatch(&mut bootloader, &settings, &command, &sink);
        sink.push("Command finished.".to_string());
        (bootloader, result)
    });

    while !worker.is_finished() {
        print_logs(&logs, multi_progress.as_ref());
        thread::sleep(POLL_INTERVAL);
    }
    let (mut bootloader, result) = worker
        .join()
        .map_err(|_| anyhow!("Worker thread panicked"))?;
    print_logs(&logs, multi_progress.as_ref());

    while !bootloader.try_close() {
        thread::sleep(POLL_INTERVAL);
    }
    result
}

fn dispatch(
    bootloader: &mut Bootloader,
    settings: &Settings,
    command: &Commands,
    sink: &Arc<QueueLogSink>,
) -> Result<()> {
    let profile = &settings.profile;
    match command {
        Commands::Erase => {
            for range in &settings.ranges {
                bootloader.erase_region(profile, *range)?;
            }
            Ok(())
        }
        Commands::Read(args) => {
            let mut image = HexImage::new(Vec::new());
            for range in &settings.ranges {
                let data = bootloader.read_region(profile, *range)?;
                image.blocks.push(MemoryBlock::new(range.first, data));
            }
            image
                .save_to_file(&args.output, profile.bytes_per_addr)
                .with_context(|| format!("Failed to save {}", args.output))?;
            sink.push(format!("Saved to {}", args.output));
            Ok(())
        }
        Commands::Write(args) => write_file(bootloader, profile, &settings.ranges, args, sink),
        Commands::Run => Ok(bootloader.start_app(profile)?),
        Commands::Devices => bail!("'devices' does not talk to a device"),
    }
}

fn write_file(
    bootloader: &mut Bootloader,
    profile: &DeviceProfile,
    ranges: &[AddressRange],
    args: &crate::cli::WriteArgs,
    sink: &Arc<QueueLogSink>,
) -> Result<()> {
    let mut image =
        HexImage::for_ranges(ranges, profile.bytes_per_addr).with_log_sink(sink.clone());
    let report = image
        .load_from_file(&args.input, profile.bytes_per_addr)
        .with_context(|| format!("Failed to load {}", args.input))?;
    if !report.is_clean() {
        if !args.force {
            sink.push(format!(
                "ERROR: {} problem(s) found while loading {}, use --force to write anyway",
                report.issues.len(),
                args.input
            ));
            bail!("{} has errors", args.input);
        }
        sink.push(format!(
            "Writing despite {} problem(s) in {}",
            report.issues.len(),
            args.input
        ));
    }

    for block in &image.blocks {
        let units = block.units(profile.bytes_per_addr);
        let range = AddressRange::new(block.first_addr, block.first_addr + units - 1);
        bootloader.write_region(profile, range, &block.data)?;
    }
    Ok(())
}

fn print_logs(logs: &LogReceiver, multi_progress: Option<&MultiProgress>) {
    for line in logs.drain() {
        match multi_progress {
            Some(multi) if multi.println(&line).is_ok() => {}
            _ => println!("{}", line),
        }
    }
}

fn spawn_cancel_listener(handle: SessionHandle) {
    thread::spawn(move || {
        let mut line = String::new();
        if matches!(io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
            tracing::debug!("cancel requested from stdin");
            handle.request_cancel();
        }
    });
}

/// Print the profiles of the loaded file.
pub fn list_devices(config: &crate::config::DevicesConfig) -> Result<()> {
    for device in &config.devices {
        match device.to_profile() {
            Ok(profile) => {
                let ranges: Vec<String> =
                    profile.prog_ranges.iter().map(|r| r.to_string()).collect();
                println!(
                    "{}: {} baud, prog [{}], data {}",
                    profile.name,
                    profile.baud,
                    ranges.join(", "),
                    profile.data_range
                );
            }
            Err(e) => println!("{}: invalid profile ({:#})", device.name, e),
        }
    }
    Ok(())
}
