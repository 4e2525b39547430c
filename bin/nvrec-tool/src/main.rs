use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{error, info};
use nvrec_core::{RecordId, StoreError};
use nvrec_flash::{FlashRegion, RegionConfig, WaitPolicy};
use nvrec_host::{SimFlash, StdDelay};
use nvrec_store::{selftest, RecordStore};

type HostStore = RecordStore<SimFlash, StdDelay>;

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("{}: {}", s, e))
}

fn parse_id(s: &str) -> Result<RecordId, String> {
    let idx: usize = s.parse().map_err(|e| format!("{}: {}", s, e))?;
    RecordId::try_from(idx).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(about = "Inspect and edit a tagged-record flash image")]
struct Cli {
    #[arg(long, default_value = "nvrec-flash.bin")] image: PathBuf,
    #[arg(long, value_parser = parse_u32, default_value = "0x77000")] start: u32,
    #[arg(long, default_value_t = 1)] pages: u32,
    #[arg(long, default_value_t = 2)] poll_ms: u32,
    #[arg(long, default_value_t = 250)] max_polls: u32,
    #[command(subcommand)] cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one record
    Get { #[arg(value_parser = parse_id)] id: RecordId },
    /// Set one record and persist it
    Set {
        #[arg(value_parser = parse_id)] id: RecordId,
        #[arg(value_parser = parse_u32)] value: u32,
        /// Change the mirror only; the value is lost when the tool exits
        #[arg(long)] no_sync: bool,
    },
    /// Mark one record absent and persist it
    Clear { #[arg(value_parser = parse_id)] id: RecordId },
    /// Print every record
    Dump,
    /// Erase the whole region
    Erase,
    /// Write a known pattern, persist, reload and compare
    SelfTest,
}

fn open(cli: &Cli) -> anyhow::Result<HostStore> {
    let config = RegionConfig { start_addr: cli.start, pages: cli.pages, ..RegionConfig::default() };
    let size = (config.page_size as usize) * (config.pages as usize);
    let flash = SimFlash::load_image(&cli.image, config.start_addr, size)?;
    let policy = WaitPolicy { poll_interval_ms: cli.poll_ms, max_polls: cli.max_polls };

    let region = FlashRegion::new(flash, StdDelay, config, policy);
    match RecordStore::storage_init(region) {
        Ok(store) => {
            info!("completion wait budget {}ms", store.region().policy().budget_ms());
            Ok(store)
        }
        Err(StoreError::DeviceInit) => {
            error!("flash driver failed to come up, aborting");
            Err(StoreError::DeviceInit.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn persist(cli: &Cli, store: HostStore) -> anyhow::Result<()> {
    let (flash, _) = store.into_region().into_parts();
    flash.save_image(&cli.image)?;
    info!("image saved to {}", cli.image.display());
    Ok(())
}

fn show(id: RecordId, value: Option<u32>) {
    match value {
        Some(v) => println!("{} {} 0x{:08x} ({})", "[OK]".green(), id, v, v),
        None => println!("{} {} <absent>", "[--]".yellow(), id),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!(">>> NVREC TOOL: {} @ 0x{:08x} ({} page) <<<", cli.image.display(), cli.start, cli.pages);

    let mut store = open(&cli)?;

    match cli.cmd {
        Command::Get { id } => show(id, store.get(id)),
        Command::Dump => {
            for (id, value) in store.iter() {
                show(id, value);
            }
        }
        Command::Set { id, value, no_sync } => {
            store.set(id, value);
            if no_sync {
                println!("{} {} set in RAM only", "[!!]".red(), id);
                return Ok(());
            }
            store.synchronize()?;
            show(id, store.get(id));
            persist(&cli, store)?;
        }
        Command::Clear { id } => {
            store.clear(id);
            store.synchronize()?;
            show(id, None);
            persist(&cli, store)?;
        }
        Command::Erase => {
            store.erase_region()?;
            println!("{} region erased", "[OK]".green());
            persist(&cli, store)?;
        }
        Command::SelfTest => {
            selftest::read_all(&store);
            let report = selftest::write_and_verify(&mut store)?;
            if report.passed() {
                println!("{} {} records matched", "[PASS]".green(), report.matched);
            } else {
                println!("{} {} matched, {} mismatched", "[FAIL]".red(), report.matched, report.mismatched);
            }
            persist(&cli, store)?;
            if !report.passed() {
                anyhow::bail!("self-test failed");
            }
        }
    }

    Ok(())
}
